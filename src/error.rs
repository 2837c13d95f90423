use crate::route::{HttpMethod, ParameterLocation};
use thiserror::Error;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A type shape the extractor cannot classify.
///
/// `identity` is the innermost type that failed; the enclosing operation is
/// attached by [`RouteError::UnsupportedType`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported type `{identity}`: {reason}")]
pub struct UnsupportedTypeError {
    /// Canonical identity, or the written form when the type has none
    pub identity: String,
    /// Short description of the offending shape, e.g. `function pointer`
    pub reason: String,
}

impl UnsupportedTypeError {
    /// Create an error for `identity`.
    pub fn new(identity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            reason: reason.into(),
        }
    }
}

/// Errors scoped to a single route registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error(
        "{method} {path}: path placeholders and path bindings disagree \
         (missing bindings: [{}], unbound bindings: [{}], duplicated: [{}])",
        .missing.join(", "),
        .unbound.join(", "),
        .duplicated.join(", ")
    )]
    PathBindingMismatch {
        method: HttpMethod,
        path: String,
        /// Placeholders with no `path` binding
        missing: Vec<String>,
        /// `path` bindings with no placeholder
        unbound: Vec<String>,
        /// Placeholders matched by more than one binding, or repeated in the template
        duplicated: Vec<String>,
    },

    #[error("{method} {path}: {source}")]
    UnsupportedType {
        method: HttpMethod,
        path: String,
        #[source]
        source: UnsupportedTypeError,
    },

    #[error("{method} {path}: more than one request body declared")]
    MultipleBodies { method: HttpMethod, path: String },

    #[error("{method} {path}: parameter `{name}` declared twice in {location}")]
    DuplicateParameter {
        method: HttpMethod,
        path: String,
        name: String,
        location: ParameterLocation,
    },
}

impl RouteError {
    /// The `(method, path)` the error is attributed to.
    pub fn route(&self) -> (HttpMethod, &str) {
        match self {
            RouteError::PathBindingMismatch { method, path, .. }
            | RouteError::UnsupportedType { method, path, .. }
            | RouteError::MultipleBodies { method, path }
            | RouteError::DuplicateParameter { method, path, .. } => (*method, path.as_str()),
        }
    }
}

/// Errors and warnings raised while assembling the document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    /// Fatal: no document is produced.
    #[error("duplicate operation {method} {path}")]
    DuplicateOperation { method: HttpMethod, path: String },

    /// Non-fatal: resolved by suffixing the later component name.
    #[error(
        "component name `{name}` is used by both `{existing}` and `{identity}`; \
         the latter is emitted as `{assigned}`"
    )]
    CanonicalNameCollision {
        name: String,
        existing: String,
        identity: String,
        assigned: String,
    },

    /// Non-fatal: the later operation gets a suffixed operationId.
    #[error("{method} {path}: operationId `{operation_id}` is already taken; using `{assigned}`")]
    DuplicateOperationId {
        method: HttpMethod,
        path: String,
        operation_id: String,
        assigned: String,
    },
}

impl AssemblyError {
    /// Whether the error aborts document production.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AssemblyError::DuplicateOperation { .. })
    }
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    /// Strict mode: every route error of the pass, in registration order.
    #[error("{} route(s) rejected:\n{}", .0.len(), join_lines(.0))]
    Rejected(Vec<RouteError>),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error("invalid type expression `{text}`: {message}")]
    TypeSyntax { text: String, message: String },

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn join_lines(errors: &[RouteError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}
