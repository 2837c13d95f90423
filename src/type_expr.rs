//! Use-site type expressions.
//!
//! A [`TypeExpr`] is how the host refers to a type wherever one is used: a field, a
//! parameter, a request body or a response. Expressions are written in Rust type
//! syntax and parsed with `syn`, so `Page<User>`, `Vec<Option<String>>` and
//! `HashMap<String, Order>` all work as expected. Named types are looked up later in
//! a [`TypeSource`](crate::catalog::TypeSource); this module only classifies the
//! structural shapes (primitives, sequences, maps, nullability) that need no lookup.

use crate::error::{Error, Result};
use log::debug;
use std::collections::HashMap;
use std::fmt;

/// A type as written at a use site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeExpr {
    /// A scalar with a fixed schema
    Primitive(Primitive),
    /// A sequence of elements
    Array(Box<TypeExpr>),
    /// A string-keyed map
    Map(Box<TypeExpr>),
    /// A nullable value (`Option<T>`)
    Optional(Box<TypeExpr>),
    /// A declared type, optionally instantiated with generic arguments
    Named { name: String, args: Vec<TypeExpr> },
    /// A shape that has no data-model meaning; carries the written form and the reason
    Unsupported { written: String, reason: String },
}

/// JSON primitive kinds. `Null` is the unit type `()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    String,
    Integer,
    Number,
    Boolean,
    Null,
}

/// A primitive type together with the name it was written as.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Primitive {
    /// Name as written (`u64`, `DateTime`); also the canonical identity
    pub name: String,
    pub kind: PrimitiveKind,
    /// OpenAPI `format`, when the scalar has one
    pub format: Option<&'static str>,
}

impl PrimitiveKind {
    /// The OpenAPI `type` keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveKind::String => "string",
            PrimitiveKind::Integer => "integer",
            PrimitiveKind::Number => "number",
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Null => "null",
        }
    }
}

impl TypeExpr {
    /// Parse a type written in Rust syntax.
    pub fn parse(text: &str) -> Result<TypeExpr> {
        let ty: syn::Type = syn::parse_str(text).map_err(|e| Error::TypeSyntax {
            text: text.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::from_syn(&ty))
    }

    /// A plain named type without generic arguments.
    pub fn named(name: impl Into<String>) -> TypeExpr {
        TypeExpr::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Convert a `syn` type into a type expression.
    ///
    /// Declared types are named by their path as written, minus any leading
    /// `crate`, `self` or `super`.
    pub fn from_syn(ty: &syn::Type) -> TypeExpr {
        Self::from_syn_with(ty, &written_name)
    }

    /// Like [`from_syn`](Self::from_syn), but `naming` decides the name of every
    /// declared type path. Used to resolve paths relative to the module they
    /// appear in.
    pub fn from_syn_with(ty: &syn::Type, naming: &dyn Fn(&syn::Path) -> String) -> TypeExpr {
        match ty {
            syn::Type::Path(type_path) => {
                if type_path.qself.is_some() {
                    return unsupported(ty, "qualified associated type");
                }
                Self::from_path(&type_path.path, ty, naming)
            }
            syn::Type::Reference(reference) => Self::from_syn_with(&reference.elem, naming),
            syn::Type::Paren(paren) => Self::from_syn_with(&paren.elem, naming),
            syn::Type::Group(group) => Self::from_syn_with(&group.elem, naming),
            syn::Type::Slice(slice) => {
                TypeExpr::Array(Box::new(Self::from_syn_with(&slice.elem, naming)))
            }
            syn::Type::Array(array) => {
                TypeExpr::Array(Box::new(Self::from_syn_with(&array.elem, naming)))
            }
            syn::Type::Tuple(tuple) if tuple.elems.is_empty() => TypeExpr::Primitive(Primitive {
                name: "()".to_string(),
                kind: PrimitiveKind::Null,
                format: None,
            }),
            syn::Type::Tuple(_) => unsupported(ty, "tuple"),
            syn::Type::BareFn(_) => unsupported(ty, "function pointer"),
            syn::Type::TraitObject(_) => unsupported(ty, "trait object"),
            syn::Type::ImplTrait(_) => unsupported(ty, "impl Trait"),
            syn::Type::Ptr(_) => unsupported(ty, "raw pointer"),
            syn::Type::Never(_) => unsupported(ty, "never type"),
            _ => unsupported(ty, "unrecognized type syntax"),
        }
    }

    fn from_path(
        path: &syn::Path,
        ty: &syn::Type,
        naming: &dyn Fn(&syn::Path) -> String,
    ) -> TypeExpr {
        let Some(last) = path.segments.last() else {
            return unsupported(ty, "empty path");
        };
        let ident = last.ident.to_string();
        let args = type_arguments(&last.arguments, naming);

        match (ident.as_str(), args.as_slice()) {
            ("Option", [inner]) => return TypeExpr::Optional(Box::new(inner.clone())),
            ("Vec" | "VecDeque" | "LinkedList" | "HashSet" | "BTreeSet" | "IndexSet", [inner]) => {
                return TypeExpr::Array(Box::new(inner.clone()));
            }
            ("Box" | "Rc" | "Arc" | "Cow", [inner]) => return inner.clone(),
            ("HashMap" | "BTreeMap" | "IndexMap", [key, value]) => {
                return match key {
                    TypeExpr::Primitive(p) if p.kind == PrimitiveKind::String => {
                        TypeExpr::Map(Box::new(value.clone()))
                    }
                    _ => unsupported(ty, "map key is not a string"),
                };
            }
            _ => {}
        }

        // `DateTime<Utc>` and friends carry a timezone argument that does not change the schema
        if let Some(primitive) = parse_primitive(&ident) {
            return TypeExpr::Primitive(primitive);
        }

        TypeExpr::Named {
            name: naming(path),
            args,
        }
    }

    /// Whether the outermost layer is `Option<T>`.
    pub fn is_optional(&self) -> bool {
        matches!(self, TypeExpr::Optional(_))
    }

    /// Strip any `Option` layers.
    pub fn unwrap_optional(&self) -> &TypeExpr {
        match self {
            TypeExpr::Optional(inner) => inner.unwrap_optional(),
            other => other,
        }
    }

    /// Replace generic parameter names bound in `env`.
    pub fn substitute(&self, env: &HashMap<String, TypeExpr>) -> TypeExpr {
        match self {
            TypeExpr::Named { name, args } if args.is_empty() => match env.get(name) {
                Some(bound) => bound.clone(),
                None => self.clone(),
            },
            TypeExpr::Named { name, args } => TypeExpr::Named {
                name: name.clone(),
                args: args.iter().map(|a| a.substitute(env)).collect(),
            },
            TypeExpr::Array(inner) => TypeExpr::Array(Box::new(inner.substitute(env))),
            TypeExpr::Map(inner) => TypeExpr::Map(Box::new(inner.substitute(env))),
            TypeExpr::Optional(inner) => TypeExpr::Optional(Box::new(inner.substitute(env))),
            TypeExpr::Primitive(_) | TypeExpr::Unsupported { .. } => self.clone(),
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Primitive(p) => write!(f, "{}", p.name),
            TypeExpr::Array(inner) => write!(f, "Vec<{}>", inner),
            TypeExpr::Map(inner) => write!(f, "Map<String, {}>", inner),
            TypeExpr::Optional(inner) => write!(f, "Option<{}>", inner),
            TypeExpr::Named { name, args } if args.is_empty() => write!(f, "{}", name),
            TypeExpr::Named { name, args } => {
                let args = args.iter().map(|a| a.to_string()).collect::<Vec<_>>();
                write!(f, "{}<{}>", name, args.join(", "))
            }
            TypeExpr::Unsupported { written, .. } => write!(f, "{}", written),
        }
    }
}

fn unsupported(ty: &syn::Type, reason: &str) -> TypeExpr {
    let written = quote_type(ty);
    debug!("Unsupported type syntax `{}`: {}", written, reason);
    TypeExpr::Unsupported {
        written,
        reason: reason.to_string(),
    }
}

/// Render a type back to source text without pulling in `quote`.
fn quote_type(ty: &syn::Type) -> String {
    match ty {
        syn::Type::BareFn(_) => "fn(..)".to_string(),
        syn::Type::TraitObject(_) => "dyn ..".to_string(),
        syn::Type::ImplTrait(_) => "impl ..".to_string(),
        syn::Type::Ptr(_) => "*..".to_string(),
        syn::Type::Never(_) => "!".to_string(),
        syn::Type::Tuple(tuple) => format!("({})", vec![".."; tuple.elems.len()].join(", ")),
        syn::Type::Path(type_path) => type_path
            .path
            .segments
            .iter()
            .map(|s| s.ident.to_string())
            .collect::<Vec<_>>()
            .join("::"),
        _ => "<type>".to_string(),
    }
}

/// A path as written, without its `crate`, `self` or `super` anchors.
fn written_name(path: &syn::Path) -> String {
    path.segments
        .iter()
        .map(|s| s.ident.to_string())
        .filter(|s| s != "crate" && s != "self" && s != "super")
        .collect::<Vec<_>>()
        .join("::")
}

/// Generic type arguments of a path segment; lifetimes and const arguments are ignored.
fn type_arguments(
    arguments: &syn::PathArguments,
    naming: &dyn Fn(&syn::Path) -> String,
) -> Vec<TypeExpr> {
    match arguments {
        syn::PathArguments::AngleBracketed(args) => args
            .args
            .iter()
            .filter_map(|arg| match arg {
                syn::GenericArgument::Type(inner) => Some(TypeExpr::from_syn_with(inner, naming)),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Map a scalar type name to its JSON primitive.
pub fn parse_primitive(type_name: &str) -> Option<Primitive> {
    let (kind, format) = match type_name {
        "String" | "str" | "char" => (PrimitiveKind::String, None),
        "i8" | "i16" | "i32" | "u8" | "u16" | "u32" => (PrimitiveKind::Integer, Some("int32")),
        "i64" | "i128" | "isize" | "u64" | "u128" | "usize" => {
            (PrimitiveKind::Integer, Some("int64"))
        }
        "f32" => (PrimitiveKind::Number, Some("float")),
        "f64" => (PrimitiveKind::Number, Some("double")),
        "bool" => (PrimitiveKind::Boolean, None),
        "DateTime" | "NaiveDateTime" | "OffsetDateTime" | "PrimitiveDateTime" | "SystemTime" => {
            (PrimitiveKind::String, Some("date-time"))
        }
        "NaiveDate" | "Date" => (PrimitiveKind::String, Some("date")),
        "NaiveTime" | "Time" => (PrimitiveKind::String, Some("time")),
        "Uuid" => (PrimitiveKind::String, Some("uuid")),
        "Url" => (PrimitiveKind::String, Some("uri")),
        _ => return None,
    };
    Some(Primitive {
        name: type_name.to_string(),
        kind,
        format,
    })
}
