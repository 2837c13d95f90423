use crate::route::HttpMethod;
use serde::{Deserialize, Serialize};

/// Engine options.
///
/// Deserialized from the manifest's `config` section (camelCase keys, every key
/// optional); command-line flags are applied on top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Emit object types as named components even when used once. Enums, cyclic
    /// types and discriminator targets are components either way.
    pub promote_all_objects: bool,
    /// How operations without an explicit operationId are named
    pub operation_id_strategy: OperationIdStrategy,
    /// Method order within a path; unlisted methods follow alphabetically.
    /// Empty means the canonical GET, PUT, POST, DELETE, PATCH order.
    pub method_ordering: Vec<HttpMethod>,
    /// Treat every per-route error as fatal for the whole run
    pub strict: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            promote_all_objects: true,
            operation_id_strategy: OperationIdStrategy::PathMethod,
            method_ordering: Vec::new(),
            strict: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationIdStrategy {
    /// `<method>_<path>` unless the route overrides it
    #[default]
    PathMethod,
    /// Only routes with an explicit operationId get one
    ExplicitOnly,
}

impl EngineConfig {
    /// The effective method ordering.
    pub fn method_ordering(&self) -> &[HttpMethod] {
        if self.method_ordering.is_empty() {
            &HttpMethod::CANONICAL_ORDER
        } else {
            &self.method_ordering
        }
    }
}

/// The document's `info` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiInfo {
    pub title: String,
    /// Version of the described API, not of the OpenAPI format
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for ApiInfo {
    fn default() -> Self {
        Self {
            title: "Generated API".to_string(),
            version: "1.0.0".to_string(),
            description: None,
        }
    }
}
