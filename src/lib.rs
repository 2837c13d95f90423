//! OpenAPI introspector - OpenAPI documents from registered routes and declared types.
//!
//! Routes are described as [`route::RouteRegistration`]s and types as
//! [`catalog::TypeDecl`]s. The engine resolves every type a route mentions into a
//! schema, deduplicates and names the shared ones, and assembles a deterministic
//! document: the same inputs always produce byte-identical output.
//!
//! # Architecture
//!
//! 1. [`type_expr`] - Use-site type expressions (`Vec<Page<User>>`, `Option<u64>`)
//! 2. [`catalog`] - Named declarations and the [`catalog::TypeSource`] lookup seam
//! 3. [`type_extractor`] - Classifies a type and resolves one level of its shape
//! 4. [`registry`] - Deduplicates types, breaks cycles and names components
//! 5. [`route`] - Validates a registration and binds its parameters, body and responses
//! 6. [`assembler`] - Groups operations by path and fixes the output order
//! 7. [`engine`] - The whole pass, with per-route error collection
//! 8. [`openapi`] and [`serializer`] - OpenAPI 3.0 projection and YAML/JSON output
//!
//! Hosts feed the engine through [`manifest`] (YAML/JSON route and type manifests)
//! and [`source`] (type declarations read from Rust source with `syn`).
//!
//! # Example Usage
//!
//! ```no_run
//! use openapi_introspect::{
//!     catalog::{FieldDecl, TypeCatalog, TypeDecl},
//!     config::{ApiInfo, EngineConfig},
//!     engine::generate,
//!     openapi::OpenApiDocument,
//!     route::{HttpMethod, ParameterLocation, RouteRegistration},
//!     serializer::serialize_yaml,
//!     type_expr::TypeExpr,
//! };
//!
//! let mut catalog = TypeCatalog::new();
//! catalog.insert(TypeDecl::object(
//!     "User",
//!     vec![FieldDecl::new("id", TypeExpr::parse("u64").unwrap())],
//! ));
//!
//! let routes = vec![RouteRegistration::new(HttpMethod::Get, "/users/{id}")
//!     .with_parameter("id", ParameterLocation::Path, TypeExpr::parse("u64").unwrap())
//!     .with_response("200", Some(TypeExpr::named("User")))];
//!
//! let generated = generate(&routes, &catalog, &EngineConfig::default()).unwrap();
//! let document = OpenApiDocument::new(ApiInfo::default(), &generated.document);
//! println!("{}", serialize_yaml(&document).unwrap());
//! ```
//!
//! # Command-Line Interface
//!
//! For command-line usage, see the [`cli`] module.

pub mod assembler;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod openapi;
pub mod registry;
pub mod route;
pub mod schema;
pub mod serializer;
pub mod source;
pub mod type_expr;
pub mod type_extractor;
