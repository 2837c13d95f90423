//! Route and type manifests.
//!
//! A manifest is a YAML or JSON file listing the routes to document and,
//! optionally, type declarations and engine options:
//!
//! ```yaml
//! info: { title: Shop, version: 2.1.0 }
//! config: { promoteAllObjects: false }
//! types:
//!   - name: shop::User
//!     fields:
//!       - { name: id, type: u64 }
//!       - { name: email, type: Option<String> }
//! routes:
//!   - path: /users/{id}
//!     method: get
//!     parameters: [{ name: id, in: path, type: u64 }]
//!     responses: { 200: User, 404: ~ }
//! ```

use crate::catalog::{DeclBody, DiscriminatorDecl, FieldDecl, TypeCatalog, TypeDecl};
use crate::config::{ApiInfo, EngineConfig};
use crate::error::{Error, Result};
use crate::route::{HttpMethod, ParameterDecl, ParameterLocation, ResponseDecl, RouteRegistration};
use crate::type_expr::TypeExpr;
use indexmap::IndexMap;
use log::debug;
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;

/// A route manifest as written on disk. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Manifest {
    /// Document title and version; command-line flags may override them
    #[serde(default)]
    pub info: Option<ApiInfo>,
    /// Engine options
    #[serde(default)]
    pub config: EngineConfig,
    /// Type declarations; these win over declarations read from source
    #[serde(default)]
    pub types: Vec<TypeEntry>,
    /// Routes in registration order
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
}

/// A declared type. At most one of `fields`, `enum`, `alias` and `opaque` may be set;
/// a type with none of them is an empty object.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TypeEntry {
    /// Qualified name, e.g. `shop::User`
    pub name: String,
    /// Generic parameter names
    #[serde(default)]
    pub generics: Vec<String>,
    /// Object fields in wire order
    #[serde(default)]
    pub fields: Option<Vec<FieldEntry>>,
    /// Enum literals
    #[serde(default, rename = "enum")]
    pub literals: Option<Vec<String>>,
    /// Target type expression of a transparent alias
    #[serde(default)]
    pub alias: Option<String>,
    /// Reason the type cannot be described; any use of it is rejected
    #[serde(default)]
    pub opaque: Option<String>,
    /// Variant type expressions of a polymorphic base
    #[serde(default)]
    pub subtypes: Vec<String>,
    /// Bases this type is a variant of
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub discriminator: Option<DiscriminatorEntry>,
    #[serde(default = "default_true")]
    pub additional_properties: bool,
}

/// One object field: wire name plus a type expression in Rust syntax.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub skip: bool,
}

/// Tag property of a polymorphic base.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscriminatorEntry {
    pub property: String,
    /// Tag value → subtype expression
    #[serde(default)]
    pub mapping: IndexMap<String, String>,
}

/// One route. Types are written in Rust syntax and resolved against the catalog.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RouteEntry {
    /// Path template; `{id}`, `:id` and `*id` placeholders are accepted
    pub path: String,
    /// Method name, case-insensitive
    pub method: HttpMethod,
    #[serde(default)]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterEntry>,
    /// Request body type
    #[serde(default)]
    pub body: Option<String>,
    /// Status code → response type; `null` means no content
    #[serde(default)]
    pub responses: IndexMap<StatusCode, Option<ResponseEntry>>,
}

/// A path, query, header, cookie or body parameter.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterEntry {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A response entry: either a bare type or a type with a description.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResponseEntry {
    /// `200: User`
    Type(String),
    /// `200: { type: User, description: ... }`
    Detailed {
        #[serde(default, rename = "type")]
        ty: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
}

/// A response status key. YAML writes `200:` as an integer, JSON as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatusCode(pub String);

impl<'de> Deserialize<'de> for StatusCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct StatusVisitor;

        impl<'de> Visitor<'de> for StatusVisitor {
            type Value = StatusCode;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an HTTP status code or `default`")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<StatusCode, E> {
                Ok(StatusCode(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<StatusCode, E> {
                if v < 0 {
                    return Err(E::custom(format!("negative status code {}", v)));
                }
                Ok(StatusCode(v.to_string()))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<StatusCode, E> {
                Ok(StatusCode(v.to_string()))
            }
        }

        deserializer.deserialize_any(StatusVisitor)
    }
}

fn default_true() -> bool {
    true
}

fn parse_type(text: &str, context: impl fmt::Display) -> Result<TypeExpr> {
    TypeExpr::parse(text).map_err(|e| Error::Manifest(format!("{}: {}", context, e)))
}

impl Manifest {
    /// Load a manifest, choosing JSON for `.json` files and YAML otherwise.
    pub fn load(path: &Path) -> Result<Manifest> {
        debug!("Loading manifest: {}", path.display());
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Parse a YAML manifest.
    pub fn from_yaml_str(content: &str) -> Result<Manifest> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Parse a JSON manifest.
    pub fn from_json_str(content: &str) -> Result<Manifest> {
        Ok(serde_json::from_str(content)?)
    }

    /// Convert every type entry, failing on the first malformed one.
    pub fn type_decls(&self) -> Result<Vec<TypeDecl>> {
        self.types.iter().map(TypeEntry::to_decl).collect()
    }

    /// The declared types as a catalog, in manifest order.
    pub fn catalog(&self) -> Result<TypeCatalog> {
        let mut catalog = TypeCatalog::new();
        for decl in self.type_decls()? {
            catalog.insert(decl);
        }
        Ok(catalog)
    }

    /// Convert every route entry into a registration, in manifest order.
    pub fn registrations(&self) -> Result<Vec<RouteRegistration>> {
        self.routes.iter().map(RouteEntry::to_registration).collect()
    }
}

impl TypeEntry {
    /// Build the declaration, rejecting entries that set more than one body kind.
    pub fn to_decl(&self) -> Result<TypeDecl> {
        let context = format!("type `{}`", self.name);
        let shapes = [
            self.fields.is_some(),
            self.literals.is_some(),
            self.alias.is_some(),
            self.opaque.is_some(),
        ];
        if shapes.iter().filter(|set| **set).count() > 1 {
            return Err(Error::Manifest(format!(
                "{}: only one of `fields`, `enum`, `alias` and `opaque` may be given",
                context
            )));
        }

        let body = if let Some(literals) = &self.literals {
            DeclBody::Enum {
                literals: literals.clone(),
            }
        } else if let Some(alias) = &self.alias {
            DeclBody::Alias(parse_type(alias, &context)?)
        } else if let Some(reason) = &self.opaque {
            DeclBody::Opaque {
                reason: reason.clone(),
            }
        } else {
            let mut fields = Vec::new();
            for field in self.fields.iter().flatten() {
                fields.push(FieldDecl {
                    name: field.name.clone(),
                    ty: parse_type(&field.ty, format!("{}, field `{}`", context, field.name))?,
                    nullable: field.nullable,
                    skip: field.skip,
                });
            }
            DeclBody::Object {
                fields,
                additional_properties: self.additional_properties,
            }
        };

        let mut decl = TypeDecl::with_body(self.name.clone(), body);
        decl.generics = self.generics.clone();
        decl.supertypes = self.extends.clone();
        decl.subtypes = self
            .subtypes
            .iter()
            .map(|s| parse_type(s, &context))
            .collect::<Result<_>>()?;
        if let Some(discriminator) = &self.discriminator {
            let mapping = discriminator
                .mapping
                .iter()
                .map(|(value, ty)| -> Result<(String, TypeExpr)> {
                    Ok((value.clone(), parse_type(ty, &context)?))
                })
                .collect::<Result<_>>()?;
            decl.discriminator = Some(DiscriminatorDecl {
                property: discriminator.property.clone(),
                mapping,
            });
        }
        Ok(decl)
    }
}

impl RouteEntry {
    /// Parse every type expression of the route into a registration.
    pub fn to_registration(&self) -> Result<RouteRegistration> {
        let context = format!("route {} {}", self.method, self.path);
        let mut route = RouteRegistration::new(self.method, self.path.clone());
        route.operation_id = self.operation_id.clone();
        route.summary = self.summary.clone();
        route.description = self.description.clone();
        route.tags = self.tags.clone();

        for param in &self.parameters {
            route.parameters.push(ParameterDecl {
                name: param.name.clone(),
                location: param.location,
                ty: parse_type(&param.ty, format!("{}, parameter `{}`", context, param.name))?,
                required: param.required,
                description: param.description.clone(),
            });
        }
        if let Some(body) = &self.body {
            route.body = Some(parse_type(body, format!("{}, body", context))?);
        }
        for (status, entry) in &self.responses {
            let (ty, description) = match entry {
                None => (None, None),
                Some(ResponseEntry::Type(ty)) => (Some(ty.as_str()), None),
                Some(ResponseEntry::Detailed { ty, description }) => {
                    (ty.as_deref(), description.clone())
                }
            };
            let ty = match ty {
                Some(text) => Some(parse_type(
                    text,
                    format!("{}, response {}", context, status.0),
                )?),
                None => None,
            };
            route.responses.push(ResponseDecl {
                status: status.0.clone(),
                ty,
                description,
            });
        }
        Ok(route)
    }
}
