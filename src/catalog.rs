//! Named type declarations and the lookup capability the engine consumes.
//!
//! The engine never inspects the host's object model directly. Hosts (the source
//! scanner, the manifest loader, or an embedding application) describe their types
//! as [`TypeDecl`]s and expose them through the [`TypeSource`] trait.

use crate::type_expr::TypeExpr;
use indexmap::IndexMap;
use log::{debug, warn};

/// A named type declared by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    /// Fully-qualified name, `::`-separated (e.g. `shop::models::User`)
    pub name: String,
    /// Generic parameter names in declaration order
    pub generics: Vec<String>,
    /// What the type looks like on the wire
    pub body: DeclBody,
    /// Explicitly declared subtypes, in declaration order
    pub subtypes: Vec<TypeExpr>,
    /// Declared supertypes (qualified or short names)
    pub supertypes: Vec<String>,
    /// Set only on polymorphic bases whose variants carry a tag property
    pub discriminator: Option<DiscriminatorDecl>,
}

/// The shape of a declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclBody {
    /// A record with named fields in declaration order
    Object {
        fields: Vec<FieldDecl>,
        /// `false` when unknown properties are rejected
        additional_properties: bool,
    },
    /// A closed set of string literals
    Enum {
        literals: Vec<String>,
    },
    /// A transparent alias (`type Id = u64`, newtype structs)
    Alias(TypeExpr),
    /// A declaration the host could not describe; referencing it is an error
    Opaque { reason: String },
}

/// A field of an object declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    /// Name as it appears on the wire (after any rename)
    pub name: String,
    /// Declared type; generic parameters are substituted at resolution time
    pub ty: TypeExpr,
    /// Explicitly nullable, in addition to an `Option` type
    pub nullable: bool,
    /// Transient/ignored by the host's serialization
    pub skip: bool,
}

/// How a polymorphic base tells its variants apart.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscriminatorDecl {
    /// Name of the tag property on the wire
    pub property: String,
    /// Discriminator value → subtype, in declaration order
    pub mapping: Vec<(String, TypeExpr)>,
}

impl TypeDecl {
    /// An object declaration with no generics or polymorphism.
    pub fn object(name: impl Into<String>, fields: Vec<FieldDecl>) -> Self {
        Self::with_body(
            name,
            DeclBody::Object {
                fields,
                additional_properties: true,
            },
        )
    }

    /// An enum declaration.
    pub fn enumeration(name: impl Into<String>, literals: Vec<String>) -> Self {
        Self::with_body(name, DeclBody::Enum { literals })
    }

    /// A declaration with the given body and nothing else set.
    pub fn with_body(name: impl Into<String>, body: DeclBody) -> Self {
        Self {
            name: name.into(),
            generics: Vec::new(),
            body,
            subtypes: Vec::new(),
            supertypes: Vec::new(),
            discriminator: None,
        }
    }

    /// The last path segment of the qualified name.
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }
}

impl FieldDecl {
    /// A required, serialized field.
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            skip: false,
        }
    }

    /// A field is required unless it is nullable or `Option`-typed.
    pub fn is_required(&self) -> bool {
        !(self.nullable || self.ty.is_optional())
    }
}

/// Read-only access to the host's type declarations.
pub trait TypeSource {
    /// Find the declaration a use-site name refers to.
    fn lookup(&self, name: &str) -> Option<&TypeDecl>;

    /// All subtypes of `decl`: declared ones first, then types naming it as a supertype.
    fn subtypes_of(&self, decl: &TypeDecl) -> Vec<TypeExpr>;
}

/// In-memory [`TypeSource`] keyed by qualified name, in registration order.
#[derive(Debug, Default, Clone)]
pub struct TypeCatalog {
    decls: IndexMap<String, TypeDecl>,
}

impl TypeCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declaration, replacing any earlier one with the same qualified name.
    pub fn insert(&mut self, decl: TypeDecl) -> Option<TypeDecl> {
        debug!("Registering type declaration: {}", decl.name);
        let short = decl.short_name().to_string();
        if self
            .decls
            .keys()
            .any(|k| k != &decl.name && short_name(k) == short)
        {
            warn!(
                "Type name `{}` is declared more than once; short names resolve to the first",
                short
            );
        }
        self.decls.insert(decl.name.clone(), decl)
    }

    /// Register declarations that are not already present.
    pub fn extend_missing(&mut self, decls: impl IntoIterator<Item = TypeDecl>) {
        for decl in decls {
            if self.decls.contains_key(&decl.name) {
                debug!("Keeping existing declaration for {}", decl.name);
                continue;
            }
            self.insert(decl);
        }
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Declarations in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDecl> {
        self.decls.values()
    }
}

impl TypeSource for TypeCatalog {
    fn lookup(&self, name: &str) -> Option<&TypeDecl> {
        if let Some(decl) = self.decls.get(name) {
            return Some(decl);
        }
        let suffix = format!("::{}", name);
        self.decls.values().find(|d| d.name.ends_with(&suffix))
    }

    fn subtypes_of(&self, decl: &TypeDecl) -> Vec<TypeExpr> {
        let mut subtypes = decl.subtypes.clone();
        for candidate in self.decls.values() {
            let extends = candidate
                .supertypes
                .iter()
                .filter_map(|s| self.lookup(s))
                .any(|base| base.name == decl.name);
            if !extends {
                continue;
            }
            let already_listed = subtypes.iter().any(|s| match s {
                TypeExpr::Named { name, .. } => {
                    self.lookup(name).map(|d| d.name.as_str()) == Some(candidate.name.as_str())
                }
                _ => false,
            });
            if !already_listed {
                subtypes.push(TypeExpr::named(candidate.name.clone()));
            }
        }
        subtypes
    }
}

pub(crate) fn short_name(name: &str) -> &str {
    name.rsplit("::").next().unwrap_or(name)
}
