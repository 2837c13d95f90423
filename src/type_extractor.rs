//! Type Model Extractor: turns one type expression into a [`SchemaNode`].
//!
//! The extractor holds no state across types. Wherever a nested type appears (a
//! field, an element, a variant) it calls back into a `nested` resolver, which in
//! practice is the [`SchemaRegistry`](crate::registry::SchemaRegistry), so that
//! memoization and cycle breaking stay in one place.

use crate::catalog::{short_name, DeclBody, TypeDecl, TypeSource};
use crate::error::UnsupportedTypeError;
use crate::schema::{Discriminator, Property, SchemaNode};
use crate::type_expr::TypeExpr;
use indexmap::IndexMap;
use log::{debug, warn};
use std::collections::HashMap;

/// Alias chains longer than this are assumed to be cyclic.
const MAX_ALIAS_DEPTH: usize = 32;

/// Callback used to resolve nested types.
pub type Nested<'n> = dyn FnMut(&TypeExpr) -> Result<SchemaNode, UnsupportedTypeError> + 'n;

/// Stateless classifier over a [`TypeSource`]; cheap to copy.
#[derive(Clone, Copy)]
pub struct TypeModelExtractor<'a> {
    source: &'a dyn TypeSource,
}

/// The outermost shape of a type expression, with aliases followed.
#[derive(Debug)]
pub enum Classified<'a> {
    Primitive(SchemaNode),
    Array(TypeExpr),
    Map(TypeExpr),
    Optional(TypeExpr),
    Declared(Instance<'a>),
}

/// A declared type reified with concrete generic arguments.
#[derive(Debug, Clone)]
pub struct Instance<'a> {
    pub decl: &'a TypeDecl,
    /// Concrete arguments, one per generic parameter of `decl`
    pub args: Vec<TypeExpr>,
    /// Canonical identity: qualified name plus canonical argument identities
    pub key: String,
}

impl<'a> TypeModelExtractor<'a> {
    /// Create an extractor that looks declarations up in `source`.
    pub fn new(source: &'a dyn TypeSource) -> Self {
        Self { source }
    }

    /// Resolve a type completely, delegating nested types to `nested`.
    pub fn resolve(
        &self,
        expr: &TypeExpr,
        nested: &mut Nested<'_>,
    ) -> Result<SchemaNode, UnsupportedTypeError> {
        match self.classify(expr)? {
            Classified::Primitive(node) => Ok(node),
            Classified::Array(element) => Ok(SchemaNode::ArrayOf(Box::new(nested(&element)?))),
            Classified::Map(value) => Ok(SchemaNode::MapOf(Box::new(nested(&value)?))),
            Classified::Optional(inner) => nested(&inner),
            Classified::Declared(instance) => self.resolve_body(&instance, nested),
        }
    }

    /// Classify the outermost layer of `expr`.
    pub fn classify(&self, expr: &TypeExpr) -> Result<Classified<'a>, UnsupportedTypeError> {
        self.classify_at_depth(expr, 0)
    }

    fn classify_at_depth(
        &self,
        expr: &TypeExpr,
        depth: usize,
    ) -> Result<Classified<'a>, UnsupportedTypeError> {
        match expr {
            TypeExpr::Primitive(p) => Ok(Classified::Primitive(SchemaNode::primitive(
                p.kind, p.format,
            ))),
            TypeExpr::Array(inner) => Ok(Classified::Array((**inner).clone())),
            TypeExpr::Map(inner) => Ok(Classified::Map((**inner).clone())),
            TypeExpr::Optional(inner) => Ok(Classified::Optional((**inner).clone())),
            TypeExpr::Unsupported { written, reason } => {
                Err(UnsupportedTypeError::new(written.clone(), reason.clone()))
            }
            TypeExpr::Named { .. } => {
                if depth > MAX_ALIAS_DEPTH {
                    return Err(UnsupportedTypeError::new(
                        expr.to_string(),
                        "alias chain does not terminate",
                    ));
                }
                let (decl, env) = self.declaration(expr)?;
                match &decl.body {
                    DeclBody::Alias(target) => {
                        self.classify_at_depth(&target.substitute(&env), depth + 1)
                    }
                    DeclBody::Opaque { reason } => {
                        Err(UnsupportedTypeError::new(decl.name.clone(), reason.clone()))
                    }
                    DeclBody::Object { .. } | DeclBody::Enum { .. } => {
                        let args = decl
                            .generics
                            .iter()
                            .map(|g| env.get(g).cloned().unwrap_or_else(|| TypeExpr::named(g)))
                            .collect::<Vec<_>>();
                        let key = self.instance_key(decl, &args, depth)?;
                        Ok(Classified::Declared(Instance { decl, args, key }))
                    }
                }
            }
        }
    }

    /// Look up the declaration for a named expression and bind its generic parameters.
    fn declaration(
        &self,
        expr: &TypeExpr,
    ) -> Result<(&'a TypeDecl, HashMap<String, TypeExpr>), UnsupportedTypeError> {
        let TypeExpr::Named { name, args } = expr else {
            return Err(UnsupportedTypeError::new(expr.to_string(), "not a named type"));
        };
        let source = self.source;
        let decl = source
            .lookup(name)
            .ok_or_else(|| UnsupportedTypeError::new(name.clone(), "no declaration found"))?;
        if decl.generics.len() != args.len() {
            return Err(UnsupportedTypeError::new(
                expr.to_string(),
                format!(
                    "`{}` expects {} generic argument(s), found {}",
                    decl.name,
                    decl.generics.len(),
                    args.len()
                ),
            ));
        }
        let env = decl
            .generics
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();
        Ok((decl, env))
    }

    /// Canonical identity of a concrete type expression.
    pub fn canonical_key(&self, expr: &TypeExpr) -> Result<String, UnsupportedTypeError> {
        self.key_at_depth(expr, 0)
    }

    fn key_at_depth(&self, expr: &TypeExpr, depth: usize) -> Result<String, UnsupportedTypeError> {
        match expr {
            TypeExpr::Primitive(p) => Ok(p.name.clone()),
            TypeExpr::Array(inner) => Ok(format!("Vec<{}>", self.key_at_depth(inner, depth)?)),
            TypeExpr::Map(inner) => Ok(format!(
                "Map<String, {}>",
                self.key_at_depth(inner, depth)?
            )),
            TypeExpr::Optional(inner) => Ok(format!(
                "Option<{}>",
                self.key_at_depth(inner, depth)?
            )),
            TypeExpr::Unsupported { written, reason } => {
                Err(UnsupportedTypeError::new(written.clone(), reason.clone()))
            }
            TypeExpr::Named { .. } => {
                if depth > MAX_ALIAS_DEPTH {
                    return Err(UnsupportedTypeError::new(
                        expr.to_string(),
                        "alias chain does not terminate",
                    ));
                }
                let (decl, env) = self.declaration(expr)?;
                match &decl.body {
                    DeclBody::Alias(target) => {
                        self.key_at_depth(&target.substitute(&env), depth + 1)
                    }
                    _ => {
                        let args = decl
                            .generics
                            .iter()
                            .filter_map(|g| env.get(g).cloned())
                            .collect::<Vec<_>>();
                        self.instance_key(decl, &args, depth)
                    }
                }
            }
        }
    }

    fn instance_key(
        &self,
        decl: &TypeDecl,
        args: &[TypeExpr],
        depth: usize,
    ) -> Result<String, UnsupportedTypeError> {
        if args.is_empty() {
            return Ok(decl.name.clone());
        }
        let keys = args
            .iter()
            .map(|a| self.key_at_depth(a, depth + 1))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("{}<{}>", decl.name, keys.join(", ")))
    }

    /// Resolve the body of a declared type.
    ///
    /// A declaration with known subtypes becomes a union of those subtypes;
    /// otherwise objects and enums map to their own shapes.
    pub fn resolve_body(
        &self,
        instance: &Instance<'a>,
        nested: &mut Nested<'_>,
    ) -> Result<SchemaNode, UnsupportedTypeError> {
        let decl = instance.decl;
        debug!("Resolving body of {}", instance.key);

        let env: HashMap<String, TypeExpr> = decl
            .generics
            .iter()
            .cloned()
            .zip(instance.args.iter().cloned())
            .collect();

        let subtypes = self.source.subtypes_of(decl);
        if !subtypes.is_empty() {
            return self.resolve_union(instance, &subtypes, &env, nested);
        }

        match &decl.body {
            DeclBody::Object {
                fields,
                additional_properties,
            } => {
                let mut properties = IndexMap::new();
                for field in fields {
                    if field.skip {
                        debug!("Skipping transient field {}.{}", decl.name, field.name);
                        continue;
                    }
                    let ty = field.ty.substitute(&env);
                    let schema = nested(ty.unwrap_optional()).inspect_err(|e| {
                        debug!("Field {}.{} failed: {}", decl.name, field.name, e)
                    })?;
                    let property = Property {
                        schema,
                        required: field.is_required(),
                    };
                    if properties.insert(field.name.clone(), property).is_some() {
                        warn!(
                            "Property `{}` appears twice on `{}`; the later field wins",
                            field.name, decl.name
                        );
                    }
                }
                Ok(SchemaNode::ObjectType {
                    properties,
                    additional_properties: *additional_properties,
                })
            }
            DeclBody::Enum { literals } => {
                Ok(SchemaNode::EnumType(literals.iter().cloned().collect()))
            }
            DeclBody::Alias(_) | DeclBody::Opaque { .. } => Err(UnsupportedTypeError::new(
                instance.key.clone(),
                "declaration has no resolvable body",
            )),
        }
    }

    fn resolve_union(
        &self,
        instance: &Instance<'a>,
        subtypes: &[TypeExpr],
        env: &HashMap<String, TypeExpr>,
        nested: &mut Nested<'_>,
    ) -> Result<SchemaNode, UnsupportedTypeError> {
        let subtypes: Vec<TypeExpr> = subtypes.iter().map(|s| s.substitute(env)).collect();

        let mut variants = Vec::with_capacity(subtypes.len());
        for subtype in &subtypes {
            variants.push(nested(subtype)?);
        }

        let discriminator = match &instance.decl.discriminator {
            None => None,
            Some(decl) => {
                let keys = subtypes
                    .iter()
                    .map(|s| self.canonical_key(s))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut mapping = IndexMap::new();
                for (value, target) in &decl.mapping {
                    let target_key = self.canonical_key(&target.substitute(env))?;
                    let index = keys.iter().position(|k| *k == target_key).ok_or_else(|| {
                        UnsupportedTypeError::new(
                            instance.key.clone(),
                            format!(
                                "discriminator value `{}` maps to `{}`, not a declared subtype",
                                value, target
                            ),
                        )
                    })?;
                    mapping.insert(value.clone(), index);
                }
                Some(Discriminator {
                    property_name: decl.property.clone(),
                    mapping,
                })
            }
        };

        Ok(SchemaNode::UnionType {
            variants,
            discriminator,
        })
    }
}

/// Human-readable component name derived from a canonical key.
///
/// Module paths are dropped and generic arguments are joined with `_`, so
/// `models::Page<models::User>` becomes `Page_User`.
pub fn display_name(key: &str) -> String {
    key.split(|c| matches!(c, '<' | '>' | ',' | ' '))
        .filter(|token| !token.is_empty())
        .map(|token| {
            short_name(token)
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
                .collect::<String>()
        })
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DiscriminatorDecl, FieldDecl, TypeCatalog};
    use crate::type_expr::PrimitiveKind;

    fn ty(text: &str) -> TypeExpr {
        TypeExpr::parse(text).unwrap()
    }

    /// Resolves nested types by reference to their canonical key, like the registry does
    fn by_reference<'a>(
        extractor: TypeModelExtractor<'a>,
    ) -> impl FnMut(&TypeExpr) -> Result<SchemaNode, UnsupportedTypeError> + 'a {
        move |expr| match extractor.classify(expr)? {
            Classified::Declared(instance) => Ok(SchemaNode::Reference(instance.key)),
            Classified::Primitive(node) => Ok(node),
            Classified::Array(e) => Ok(SchemaNode::ArrayOf(Box::new(SchemaNode::Reference(
                extractor.canonical_key(&e)?,
            )))),
            Classified::Map(e) => Ok(SchemaNode::MapOf(Box::new(SchemaNode::Reference(
                extractor.canonical_key(&e)?,
            )))),
            Classified::Optional(e) => Ok(SchemaNode::Reference(extractor.canonical_key(&e)?)),
        }
    }

    fn catalog() -> TypeCatalog {
        let mut catalog = TypeCatalog::new();
        catalog.insert(TypeDecl::object(
            "shop::User",
            vec![
                FieldDecl::new("id", ty("u64")),
                FieldDecl::new("email", ty("Option<String>")),
                FieldDecl::new("status", ty("Status")),
                FieldDecl {
                    skip: true,
                    ..FieldDecl::new("password_hash", ty("String"))
                },
            ],
        ));
        catalog.insert(TypeDecl::enumeration(
            "shop::Status",
            vec!["active".to_string(), "banned".to_string(), "active".to_string()],
        ));
        let mut page = TypeDecl::object(
            "shop::Page",
            vec![
                FieldDecl::new("items", ty("Vec<T>")),
                FieldDecl::new("next", ty("Option<String>")),
            ],
        );
        page.generics = vec!["T".to_string()];
        catalog.insert(page);
        catalog.insert(TypeDecl::with_body("shop::UserId", DeclBody::Alias(ty("u64"))));
        catalog.insert(TypeDecl::with_body(
            "shop::Callback",
            DeclBody::Opaque {
                reason: "externally tagged data enum".to_string(),
            },
        ));
        catalog
    }

    #[test]
    fn test_primitive_resolves_directly() {
        let catalog = catalog();
        let extractor = TypeModelExtractor::new(&catalog);
        let mut nested = by_reference(extractor);
        let node = extractor.resolve(&ty("i64"), &mut nested).unwrap();
        assert_eq!(
            node,
            SchemaNode::primitive(PrimitiveKind::Integer, Some("int64"))
        );
    }

    #[test]
    fn test_alias_is_transparent() {
        let catalog = catalog();
        let extractor = TypeModelExtractor::new(&catalog);
        let mut nested = by_reference(extractor);
        let node = extractor.resolve(&ty("UserId"), &mut nested).unwrap();
        assert_eq!(
            node,
            SchemaNode::primitive(PrimitiveKind::Integer, Some("int64"))
        );
    }

    #[test]
    fn test_object_fields_required_and_transient() {
        let catalog = catalog();
        let extractor = TypeModelExtractor::new(&catalog);
        let mut nested = by_reference(extractor);
        let node = extractor.resolve(&ty("User"), &mut nested).unwrap();

        let SchemaNode::ObjectType { properties, .. } = node else {
            panic!("Expected object");
        };
        let names: Vec<&str> = properties.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["id", "email", "status"]);
        assert!(properties["id"].required);
        assert!(!properties["email"].required);
        assert_eq!(
            properties["status"].schema,
            SchemaNode::Reference("shop::Status".to_string())
        );
    }

    #[test]
    fn test_enum_literals_keep_declaration_order() {
        let catalog = catalog();
        let extractor = TypeModelExtractor::new(&catalog);
        let mut nested = by_reference(extractor);
        let SchemaNode::EnumType(literals) = extractor.resolve(&ty("Status"), &mut nested).unwrap()
        else {
            panic!("Expected enum");
        };
        assert_eq!(literals.into_iter().collect::<Vec<_>>(), vec!["active", "banned"]);
    }

    #[test]
    fn test_generic_instantiations_have_distinct_keys() {
        let catalog = catalog();
        let extractor = TypeModelExtractor::new(&catalog);
        let users = extractor.canonical_key(&ty("Page<User>")).unwrap();
        let ids = extractor.canonical_key(&ty("Page<UserId>")).unwrap();
        let nested_page = extractor.canonical_key(&ty("Page<Vec<User>>")).unwrap();

        assert_eq!(users, "shop::Page<shop::User>");
        assert_eq!(ids, "shop::Page<u64>");
        assert_eq!(nested_page, "shop::Page<Vec<shop::User>>");
        assert_eq!(display_name(&users), "Page_User");
        assert_eq!(display_name(&nested_page), "Page_Vec_User");
    }

    #[test]
    fn test_generic_field_is_substituted() {
        let catalog = catalog();
        let extractor = TypeModelExtractor::new(&catalog);
        let mut nested = by_reference(extractor);
        let SchemaNode::ObjectType { properties, .. } =
            extractor.resolve(&ty("Page<User>"), &mut nested).unwrap()
        else {
            panic!("Expected object");
        };
        assert_eq!(
            properties["items"].schema,
            SchemaNode::ArrayOf(Box::new(SchemaNode::Reference("shop::User".to_string())))
        );
    }

    #[test]
    fn test_generic_arity_mismatch() {
        let catalog = catalog();
        let extractor = TypeModelExtractor::new(&catalog);
        let err = extractor.classify(&ty("Page")).unwrap_err();
        assert!(err.reason.contains("expects 1 generic argument(s), found 0"));
    }

    #[test]
    fn test_unsupported_and_unknown_types() {
        let catalog = catalog();
        let extractor = TypeModelExtractor::new(&catalog);

        let err = extractor.classify(&ty("fn() -> u32")).unwrap_err();
        assert_eq!(err.reason, "function pointer");

        let err = extractor.classify(&ty("Missing")).unwrap_err();
        assert_eq!(err.identity, "Missing");
        assert_eq!(err.reason, "no declaration found");

        let err = extractor.classify(&ty("Callback")).unwrap_err();
        assert_eq!(err.identity, "shop::Callback");
    }

    #[test]
    fn test_polymorphic_base_becomes_union() {
        let mut catalog = TypeCatalog::new();
        let mut shape = TypeDecl::object("Shape", vec![]);
        shape.subtypes = vec![ty("Circle"), ty("Square")];
        shape.discriminator = Some(DiscriminatorDecl {
            property: "kind".to_string(),
            mapping: vec![
                ("square".to_string(), ty("Square")),
                ("circle".to_string(), ty("Circle")),
            ],
        });
        catalog.insert(shape);
        catalog.insert(TypeDecl::object("Circle", vec![FieldDecl::new("r", ty("f64"))]));
        catalog.insert(TypeDecl::object("Square", vec![FieldDecl::new("side", ty("f64"))]));

        let extractor = TypeModelExtractor::new(&catalog);
        let mut nested = by_reference(extractor);
        let node = extractor.resolve(&ty("Shape"), &mut nested).unwrap();

        let SchemaNode::UnionType {
            variants,
            discriminator,
        } = node
        else {
            panic!("Expected union");
        };
        assert_eq!(
            variants,
            vec![
                SchemaNode::Reference("Circle".to_string()),
                SchemaNode::Reference("Square".to_string())
            ]
        );
        let discriminator = discriminator.unwrap();
        assert_eq!(discriminator.property_name, "kind");
        assert_eq!(discriminator.mapping["square"], 1);
        assert_eq!(discriminator.mapping["circle"], 0);
    }

    #[test]
    fn test_discriminator_to_foreign_type_fails() {
        let mut catalog = TypeCatalog::new();
        let mut shape = TypeDecl::object("Shape", vec![]);
        shape.subtypes = vec![ty("Circle")];
        shape.discriminator = Some(DiscriminatorDecl {
            property: "kind".to_string(),
            mapping: vec![("user".to_string(), ty("User"))],
        });
        catalog.insert(shape);
        catalog.insert(TypeDecl::object("Circle", vec![]));
        catalog.insert(TypeDecl::object("User", vec![]));

        let extractor = TypeModelExtractor::new(&catalog);
        let mut nested = by_reference(extractor);
        let err = extractor.resolve(&ty("Shape"), &mut nested).unwrap_err();
        assert!(err.reason.contains("not a declared subtype"));
    }

    #[test]
    fn test_alias_cycle_is_unsupported() {
        let mut catalog = TypeCatalog::new();
        catalog.insert(TypeDecl::with_body("A", DeclBody::Alias(ty("B"))));
        catalog.insert(TypeDecl::with_body("B", DeclBody::Alias(ty("A"))));
        let extractor = TypeModelExtractor::new(&catalog);
        let err = extractor.classify(&ty("A")).unwrap_err();
        assert_eq!(err.reason, "alias chain does not terminate");
    }
}
