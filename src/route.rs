//! Route registrations and the Route Model Extractor.

use crate::config::{EngineConfig, OperationIdStrategy};
use crate::error::{RouteError, UnsupportedTypeError};
use crate::registry::SchemaRegistry;
use crate::schema::SchemaNode;
use crate::type_expr::TypeExpr;
use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// HTTP methods supported by the document model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Patch,
    Options,
    Head,
    Trace,
}

impl HttpMethod {
    /// Default method order within a path
    pub const CANONICAL_ORDER: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Put,
        HttpMethod::Post,
        HttpMethod::Delete,
        HttpMethod::Patch,
    ];

    /// Uppercase name, as used in log and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::Trace => "TRACE",
        }
    }

    /// Lowercase name, as used for OpenAPI path item keys
    pub fn as_lower(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Put => "put",
            HttpMethod::Post => "post",
            HttpMethod::Delete => "delete",
            HttpMethod::Patch => "patch",
            HttpMethod::Options => "options",
            HttpMethod::Head => "head",
            HttpMethod::Trace => "trace",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "PUT" => Ok(HttpMethod::Put),
            "POST" => Ok(HttpMethod::Post),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            "OPTIONS" => Ok(HttpMethod::Options),
            "HEAD" => Ok(HttpMethod::Head),
            "TRACE" => Ok(HttpMethod::Trace),
            _ => Err(format!("unknown HTTP method `{}`", s)),
        }
    }
}

impl Serialize for HttpMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_lower())
    }
}

impl<'de> Deserialize<'de> for HttpMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Where a parameter is carried in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
    /// The request body; at most one per route
    Body,
}

impl ParameterLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::Cookie => "cookie",
            ParameterLocation::Body => "body",
        }
    }
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One endpoint as declared by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRegistration {
    pub method: HttpMethod,
    /// Path template; `{id}`, `:id` and `*id` placeholders are accepted
    pub path: String,
    /// Explicit operationId; otherwise the configured strategy applies
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Bindings in declaration order
    pub parameters: Vec<ParameterDecl>,
    /// Request body type, unless a `body` parameter declares it
    pub body: Option<TypeExpr>,
    /// Status code (or `default`) → response type; `None` means no content
    pub responses: Vec<ResponseDecl>,
}

/// A declared parameter binding, before type resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDecl {
    /// Must match a placeholder for path parameters
    pub name: String,
    pub location: ParameterLocation,
    pub ty: TypeExpr,
    /// Defaults to "not `Option`"; path parameters are always required
    pub required: Option<bool>,
    pub description: Option<String>,
}

/// A declared response, before type resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseDecl {
    /// Status code or `default`
    pub status: String,
    /// `None` for responses without content
    pub ty: Option<TypeExpr>,
    /// Defaults to the standard reason phrase of the status
    pub description: Option<String>,
}

impl RouteRegistration {
    /// A registration with no bindings, body or responses.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            operation_id: None,
            summary: None,
            description: None,
            tags: Vec::new(),
            parameters: Vec::new(),
            body: None,
            responses: Vec::new(),
        }
    }

    /// Set an explicit operationId.
    pub fn with_operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = Some(operation_id.into());
        self
    }

    /// Add a parameter whose requiredness follows from its type.
    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        location: ParameterLocation,
        ty: TypeExpr,
    ) -> Self {
        self.parameters.push(ParameterDecl {
            name: name.into(),
            location,
            ty,
            required: None,
            description: None,
        });
        self
    }

    /// Set the request body type.
    pub fn with_body(mut self, ty: TypeExpr) -> Self {
        self.body = Some(ty);
        self
    }

    /// Add a response; `None` declares a response without content.
    pub fn with_response(mut self, status: impl Into<String>, ty: Option<TypeExpr>) -> Self {
        self.responses.push(ResponseDecl {
            status: status.into(),
            ty,
            description: None,
        });
        self
    }
}

/// A parameter or request body with its resolved schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterBinding {
    pub name: String,
    pub location: ParameterLocation,
    /// Resolved schema; identity references until the document is assembled
    pub schema: SchemaNode,
    /// Always `true` for path parameters
    pub required: bool,
    pub description: Option<String>,
}

/// A resolved response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub description: String,
    /// `None` for responses without content
    pub schema: Option<SchemaNode>,
}

/// One fully extracted operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationModel {
    /// Normalized path template (`{name}` placeholders)
    pub path: String,
    pub method: HttpMethod,
    /// `None` only under the explicit-only strategy
    pub operation_id: Option<String>,
    /// Whether `operation_id` came from the registration rather than the default rule
    pub explicit_operation_id: bool,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Path, query, header and cookie bindings in declaration order
    pub parameters: Vec<ParameterBinding>,
    /// The single body binding, if any
    pub request_body: Option<ParameterBinding>,
    /// Ordered by status code, `default` last
    pub responses: IndexMap<String, Response>,
}

impl OperationModel {
    /// Every schema the operation refers to, in document order.
    pub fn schemas(&self) -> impl Iterator<Item = &SchemaNode> {
        self.parameters
            .iter()
            .map(|p| &p.schema)
            .chain(self.request_body.iter().map(|b| &b.schema))
            .chain(self.responses.values().filter_map(|r| r.schema.as_ref()))
    }
}

/// A path template split into its normalized form and placeholder names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    /// The template with every placeholder written as `{name}`
    pub normalized: String,
    /// Placeholder names in template order, repeats included
    pub placeholders: Vec<String>,
}

impl PathTemplate {
    /// Split a template on `/`; empty segments are dropped.
    pub fn parse(path: &str) -> Self {
        let mut placeholders = Vec::new();
        let mut segments = Vec::new();

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if let Some(name) = segment
                .strip_prefix(':')
                .or_else(|| segment.strip_prefix('*'))
            {
                placeholders.push(name.to_string());
                segments.push(format!("{{{}}}", name));
                continue;
            }

            let mut normalized = String::with_capacity(segment.len());
            let mut rest = segment;
            while let Some(open) = rest.find('{') {
                let Some(close) = rest[open..].find('}') else {
                    break;
                };
                let inner = &rest[open + 1..open + close];
                // `{id:\d+}` carries a pattern after the name
                let name = inner.split(':').next().unwrap_or(inner).trim();
                normalized.push_str(&rest[..open]);
                normalized.push_str(&format!("{{{}}}", name));
                placeholders.push(name.to_string());
                rest = &rest[open + close + 1..];
            }
            normalized.push_str(rest);
            segments.push(normalized);
        }

        Self {
            normalized: format!("/{}", segments.join("/")),
            placeholders,
        }
    }
}

/// `<method>_<path underscored>`, e.g. `get_users_id` for `GET /users/{id}`.
pub fn default_operation_id(method: HttpMethod, normalized_path: &str) -> String {
    let mut path = String::with_capacity(normalized_path.len());
    for c in normalized_path.chars() {
        if c.is_ascii_alphanumeric() {
            path.push(c);
        } else if !path.is_empty() && !path.ends_with('_') {
            path.push('_');
        }
    }
    let path = path.trim_end_matches('_');
    if path.is_empty() {
        format!("{}_root", method.as_lower())
    } else {
        format!("{}_{}", method.as_lower(), path)
    }
}

/// Extract one route into an [`OperationModel`], resolving its types through `registry`.
///
/// Structural problems (path bindings, duplicate parameters, multiple bodies) are
/// detected before any type is resolved.
pub fn extract(
    route: &RouteRegistration,
    registry: &mut SchemaRegistry<'_>,
    config: &EngineConfig,
) -> Result<OperationModel, RouteError> {
    debug!("Extracting {} {}", route.method, route.path);
    let template = PathTemplate::parse(&route.path);

    check_path_bindings(route, &template)?;
    check_duplicate_parameters(route)?;

    let body_params: Vec<&ParameterDecl> = route
        .parameters
        .iter()
        .filter(|p| p.location == ParameterLocation::Body)
        .collect();
    if body_params.len() + usize::from(route.body.is_some()) > 1 {
        return Err(RouteError::MultipleBodies {
            method: route.method,
            path: route.path.clone(),
        });
    }

    let unsupported = |source: UnsupportedTypeError| RouteError::UnsupportedType {
        method: route.method,
        path: route.path.clone(),
        source,
    };

    let mut parameters = Vec::new();
    for param in route
        .parameters
        .iter()
        .filter(|p| p.location != ParameterLocation::Body)
    {
        let schema = registry
            .intern_parameter(param.ty.unwrap_optional())
            .map_err(unsupported)?;
        let required = match param.location {
            ParameterLocation::Path => {
                if param.required == Some(false) || param.ty.is_optional() {
                    warn!(
                        "{} {}: path parameter `{}` is always required",
                        route.method, route.path, param.name
                    );
                }
                true
            }
            _ => param.required.unwrap_or(!param.ty.is_optional()),
        };
        parameters.push(ParameterBinding {
            name: param.name.clone(),
            location: param.location,
            schema,
            required,
            description: param.description.clone(),
        });
    }

    let body = match (body_params.first(), &route.body) {
        (Some(param), _) => Some((
            param.name.clone(),
            &param.ty,
            param.required,
            param.description.clone(),
        )),
        (None, Some(ty)) => Some(("body".to_string(), ty, None, None)),
        (None, None) => None,
    };
    let request_body = match body {
        Some((name, ty, required, description)) => Some(ParameterBinding {
            name,
            location: ParameterLocation::Body,
            schema: registry.intern(ty.unwrap_optional()).map_err(unsupported)?,
            required: required.unwrap_or(!ty.is_optional()),
            description,
        }),
        None => None,
    };

    let mut responses = IndexMap::new();
    for decl in &route.responses {
        let schema = match &decl.ty {
            Some(ty) => Some(registry.intern(ty.unwrap_optional()).map_err(unsupported)?),
            None => None,
        }
        .filter(|s| !s.is_null());
        let response = Response {
            description: decl
                .description
                .clone()
                .unwrap_or_else(|| status_description(&decl.status).to_string()),
            schema,
        };
        if responses.insert(decl.status.clone(), response).is_some() {
            warn!(
                "{} {}: response {} declared twice; the later one wins",
                route.method, route.path, decl.status
            );
        }
    }
    if responses.is_empty() {
        responses.insert(
            "200".to_string(),
            Response {
                description: status_description("200").to_string(),
                schema: None,
            },
        );
    }
    responses.sort_by(|a, _, b, _| status_sort_key(a).cmp(&status_sort_key(b)));

    let (operation_id, explicit_operation_id) =
        match (&route.operation_id, config.operation_id_strategy) {
            (Some(id), _) => (Some(id.clone()), true),
            (None, OperationIdStrategy::PathMethod) => {
                (Some(default_operation_id(route.method, &template.normalized)), false)
            }
            (None, OperationIdStrategy::ExplicitOnly) => (None, false),
        };

    Ok(OperationModel {
        path: template.normalized,
        method: route.method,
        operation_id,
        explicit_operation_id,
        summary: route.summary.clone(),
        description: route.description.clone(),
        tags: route.tags.clone(),
        parameters,
        request_body,
        responses,
    })
}

fn check_path_bindings(
    route: &RouteRegistration,
    template: &PathTemplate,
) -> Result<(), RouteError> {
    let bindings: Vec<&str> = route
        .parameters
        .iter()
        .filter(|p| p.location == ParameterLocation::Path)
        .map(|p| p.name.as_str())
        .collect();

    let mut missing = Vec::new();
    let mut duplicated = Vec::new();
    let mut seen = HashSet::new();
    for placeholder in &template.placeholders {
        if !seen.insert(placeholder.as_str()) {
            push_unique(&mut duplicated, placeholder);
            continue;
        }
        match bindings.iter().filter(|b| **b == placeholder.as_str()).count() {
            0 => missing.push(placeholder.clone()),
            1 => {}
            _ => push_unique(&mut duplicated, placeholder),
        }
    }

    let mut unbound = Vec::new();
    for binding in &bindings {
        if !template.placeholders.iter().any(|p| p == binding) {
            push_unique(&mut unbound, binding);
        }
    }

    if missing.is_empty() && unbound.is_empty() && duplicated.is_empty() {
        return Ok(());
    }
    Err(RouteError::PathBindingMismatch {
        method: route.method,
        path: route.path.clone(),
        missing,
        unbound,
        duplicated,
    })
}

fn check_duplicate_parameters(route: &RouteRegistration) -> Result<(), RouteError> {
    let mut seen = HashSet::new();
    for param in &route.parameters {
        // Path duplicates are reported as binding mismatches; bodies as MultipleBodies
        if matches!(param.location, ParameterLocation::Path | ParameterLocation::Body) {
            continue;
        }
        let key = match param.location {
            // Header names are case-insensitive
            ParameterLocation::Header => param.name.to_ascii_lowercase(),
            _ => param.name.clone(),
        };
        if !seen.insert((param.location, key)) {
            return Err(RouteError::DuplicateParameter {
                method: route.method,
                path: route.path.clone(),
                name: param.name.clone(),
                location: param.location,
            });
        }
    }
    Ok(())
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

/// Numeric codes first in ascending order, then wildcards like `4XX`, then `default`.
fn status_sort_key(status: &str) -> (u8, String) {
    if status.eq_ignore_ascii_case("default") {
        (2, String::new())
    } else if status.chars().all(|c| c.is_ascii_digit()) {
        (0, format!("{:0>3}", status))
    } else {
        (1, status.to_ascii_uppercase())
    }
}

fn status_description(status: &str) -> &'static str {
    match status {
        "200" => "Successful response",
        "201" => "Created",
        "202" => "Accepted",
        "204" => "No content",
        "400" => "Bad request",
        "401" => "Unauthorized",
        "403" => "Forbidden",
        "404" => "Not found",
        "409" => "Conflict",
        "422" => "Unprocessable entity",
        "500" => "Internal server error",
        "default" => "Unexpected error",
        _ => "Response",
    }
}
