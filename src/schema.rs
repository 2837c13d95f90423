use crate::type_expr::PrimitiveKind;
use indexmap::{IndexMap, IndexSet};

/// Internal schema model, independent of any output dialect.
///
/// Below the top level a tree never contains a cycle: recursive types are
/// registered as components and reached through [`SchemaNode::Reference`].
///
/// While the registry is still collecting types, a reference carries the
/// canonical identity key of its target (e.g. `models::Page<models::User>`);
/// after assembly it carries the component name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaNode {
    /// A JSON scalar with an optional format hint (`int64`, `date-time`, ...)
    Primitive {
        kind: PrimitiveKind,
        format: Option<String>,
    },
    ArrayOf(Box<SchemaNode>),
    /// String-keyed map
    MapOf(Box<SchemaNode>),
    /// Properties keep field declaration order
    ObjectType {
        properties: IndexMap<String, Property>,
        additional_properties: bool,
    },
    /// String literals, duplicates removed, first occurrence wins
    EnumType(IndexSet<String>),
    /// Exactly one of the variants matches
    UnionType {
        variants: Vec<SchemaNode>,
        discriminator: Option<Discriminator>,
    },
    Reference(String),
}

/// One property of an object schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub schema: SchemaNode,
    /// Listed in the object's `required` array
    pub required: bool,
}

/// Tag property of a union and the variant each tag value selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discriminator {
    pub property_name: String,
    /// Discriminator value → index into the union's variants
    pub mapping: IndexMap<String, usize>,
}

impl SchemaNode {
    /// Shorthand for a [`SchemaNode::Primitive`].
    pub fn primitive(kind: PrimitiveKind, format: Option<&str>) -> Self {
        SchemaNode::Primitive {
            kind,
            format: format.map(|f| f.to_string()),
        }
    }

    /// Whether this is the `null` primitive (the unit type).
    pub fn is_null(&self) -> bool {
        matches!(
            self,
            SchemaNode::Primitive {
                kind: PrimitiveKind::Null,
                ..
            }
        )
    }

    /// Apply `f` to every reference in the tree, depth-first in property order.
    pub fn visit_references<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            SchemaNode::Reference(target) => f(target),
            SchemaNode::ArrayOf(inner) | SchemaNode::MapOf(inner) => {
                inner.visit_references(&mut *f)
            }
            SchemaNode::ObjectType { properties, .. } => {
                for property in properties.values() {
                    property.schema.visit_references(&mut *f);
                }
            }
            SchemaNode::UnionType { variants, .. } => {
                for variant in variants {
                    variant.visit_references(&mut *f);
                }
            }
            SchemaNode::Primitive { .. } | SchemaNode::EnumType(_) => {}
        }
    }

    /// Rebuild the tree, replacing each reference with whatever `f` returns for it.
    pub fn map_references(&self, f: &mut impl FnMut(&str) -> SchemaNode) -> SchemaNode {
        match self {
            SchemaNode::Reference(target) => f(target),
            SchemaNode::ArrayOf(inner) => {
                SchemaNode::ArrayOf(Box::new(inner.map_references(&mut *f)))
            }
            SchemaNode::MapOf(inner) => SchemaNode::MapOf(Box::new(inner.map_references(&mut *f))),
            SchemaNode::ObjectType {
                properties,
                additional_properties,
            } => SchemaNode::ObjectType {
                properties: properties
                    .iter()
                    .map(|(name, p)| {
                        (
                            name.clone(),
                            Property {
                                schema: p.schema.map_references(&mut *f),
                                required: p.required,
                            },
                        )
                    })
                    .collect(),
                additional_properties: *additional_properties,
            },
            SchemaNode::UnionType {
                variants,
                discriminator,
            } => SchemaNode::UnionType {
                variants: variants.iter().map(|v| v.map_references(&mut *f)).collect(),
                discriminator: discriminator.clone(),
            },
            SchemaNode::Primitive { .. } | SchemaNode::EnumType(_) => self.clone(),
        }
    }
}
