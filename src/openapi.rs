use crate::assembler::Document;
use crate::config::ApiInfo;
use crate::route::{OperationModel, ParameterBinding};
use crate::schema::SchemaNode;
use crate::type_expr::PrimitiveKind;
use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Version written to the `openapi` field
pub const OPENAPI_VERSION: &str = "3.0.3";

const JSON_MEDIA_TYPE: &str = "application/json";

/// Complete OpenAPI document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiDocument {
    /// OpenAPI version
    pub openapi: String,
    /// API info
    pub info: ApiInfo,
    /// API paths
    pub paths: IndexMap<String, PathItem>,
    /// Components (schemas)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
}

/// OpenAPI PathItem object: lowercase method → operation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PathItem {
    #[serde(flatten)]
    pub operations: IndexMap<String, Operation>,
}

/// OpenAPI Operation object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "operationId", skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    /// Path, query, header and cookie parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(rename = "requestBody", skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    /// Status code → response
    pub responses: IndexMap<String, Response>,
}

/// OpenAPI Parameter object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// Parameter location (path, query, header, cookie)
    #[serde(rename = "in")]
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    pub schema: Schema,
}

/// OpenAPI RequestBody object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    /// Content types and their schemas
    pub content: IndexMap<String, MediaType>,
}

/// OpenAPI MediaType object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaType {
    pub schema: Schema,
}

/// OpenAPI Response object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<IndexMap<String, MediaType>>,
}

/// OpenAPI Components object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Components {
    /// Schema definitions, in first-seen order
    pub schemas: IndexMap<String, Schema>,
}

/// OpenAPI Schema object (the subset the document model produces)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Reference to a component schema
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// The type of the schema (string, integer, object, array, etc.)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    /// Format for primitive types (e.g., "int32", "int64", "date-time")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Items schema for array types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    /// Properties for object types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, Schema>>,
    /// Required property names for object types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(
        rename = "additionalProperties",
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_properties: Option<AdditionalProperties>,
    /// Enum values for enum types
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(rename = "oneOf", skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<DiscriminatorObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
}

/// `additionalProperties`: either a flag or the schema of map values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<Schema>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscriminatorObject {
    #[serde(rename = "propertyName")]
    pub property_name: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub mapping: IndexMap<String, String>,
}

/// `#/components/schemas/<name>`
pub fn component_ref(name: &str) -> String {
    format!("#/components/schemas/{}", name)
}

impl OpenApiDocument {
    /// Project an assembled document into OpenAPI form.
    pub fn new(info: ApiInfo, document: &Document) -> Self {
        debug!("Building final OpenAPI document");

        let paths = document
            .paths
            .iter()
            .map(|(path, item)| {
                let operations = item
                    .operations
                    .iter()
                    .map(|(method, op)| (method.as_lower().to_string(), operation(op)))
                    .collect();
                (path.clone(), PathItem { operations })
            })
            .collect();

        let components = if document.components.is_empty() {
            None
        } else {
            Some(Components {
                schemas: document
                    .components
                    .iter()
                    .map(|(name, node)| (name.clone(), schema(node)))
                    .collect(),
            })
        };

        Self {
            openapi: OPENAPI_VERSION.to_string(),
            info,
            paths,
            components,
        }
    }
}

fn operation(op: &OperationModel) -> Operation {
    Operation {
        tags: op.tags.clone(),
        summary: op.summary.clone(),
        description: op.description.clone(),
        operation_id: op.operation_id.clone(),
        parameters: op.parameters.iter().map(parameter).collect(),
        request_body: op.request_body.as_ref().map(|body| RequestBody {
            description: body.description.clone(),
            required: body.required,
            content: json_content(&body.schema),
        }),
        responses: op
            .responses
            .iter()
            .map(|(status, response)| {
                (
                    status.clone(),
                    Response {
                        description: response.description.clone(),
                        content: response.schema.as_ref().map(json_content),
                    },
                )
            })
            .collect(),
    }
}

fn parameter(binding: &ParameterBinding) -> Parameter {
    Parameter {
        name: binding.name.clone(),
        location: binding.location.to_string(),
        description: binding.description.clone(),
        required: binding.required,
        schema: schema(&binding.schema),
    }
}

fn json_content(node: &SchemaNode) -> IndexMap<String, MediaType> {
    let mut content = IndexMap::new();
    content.insert(
        JSON_MEDIA_TYPE.to_string(),
        MediaType {
            schema: schema(node),
        },
    );
    content
}

/// Convert a schema node whose references already carry component names.
pub fn schema(node: &SchemaNode) -> Schema {
    match node {
        SchemaNode::Primitive {
            kind: PrimitiveKind::Null,
            ..
        } => Schema {
            nullable: Some(true),
            ..Schema::default()
        },
        SchemaNode::Primitive { kind, format } => Schema {
            schema_type: Some(kind.as_str().to_string()),
            format: format.clone(),
            ..Schema::default()
        },
        SchemaNode::ArrayOf(items) => Schema {
            schema_type: Some("array".to_string()),
            items: Some(Box::new(schema(items))),
            ..Schema::default()
        },
        SchemaNode::MapOf(values) => Schema {
            schema_type: Some("object".to_string()),
            additional_properties: Some(AdditionalProperties::Schema(Box::new(schema(values)))),
            ..Schema::default()
        },
        SchemaNode::ObjectType {
            properties,
            additional_properties,
        } => {
            let required: Vec<String> = properties
                .iter()
                .filter(|(_, p)| p.required)
                .map(|(name, _)| name.clone())
                .collect();
            Schema {
                schema_type: Some("object".to_string()),
                properties: Some(
                    properties
                        .iter()
                        .map(|(name, p)| (name.clone(), schema(&p.schema)))
                        .collect(),
                ),
                required: (!required.is_empty()).then_some(required),
                additional_properties: (!additional_properties)
                    .then_some(AdditionalProperties::Allowed(false)),
                ..Schema::default()
            }
        }
        SchemaNode::EnumType(literals) => Schema {
            schema_type: Some("string".to_string()),
            enum_values: Some(literals.iter().cloned().collect()),
            ..Schema::default()
        },
        SchemaNode::UnionType {
            variants,
            discriminator,
        } => Schema {
            one_of: Some(variants.iter().map(schema).collect()),
            discriminator: discriminator.as_ref().map(|d| DiscriminatorObject {
                property_name: d.property_name.clone(),
                mapping: d
                    .mapping
                    .iter()
                    .filter_map(|(value, index)| match variants.get(*index) {
                        Some(SchemaNode::Reference(name)) => {
                            Some((value.clone(), component_ref(name)))
                        }
                        _ => {
                            warn!(
                                "Dropping discriminator value `{}`: variant has no name",
                                value
                            );
                            None
                        }
                    })
                    .collect(),
            }),
            ..Schema::default()
        },
        SchemaNode::Reference(name) => Schema {
            reference: Some(component_ref(name)),
            ..Schema::default()
        },
    }
}
