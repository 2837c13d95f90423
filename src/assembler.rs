//! Document Assembler: groups operations by path and fixes the output order.

use crate::config::EngineConfig;
use crate::error::AssemblyError;
use crate::registry::{ComponentTable, SchemaRegistry};
use crate::route::{HttpMethod, OperationModel};
use crate::schema::SchemaNode;
use indexmap::IndexMap;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};

/// The assembled document: operations grouped by path plus the component table.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Paths in first-registration order
    pub paths: IndexMap<String, PathItem>,
    /// Named components in first-seen order
    pub components: IndexMap<String, SchemaNode>,
}

/// All operations of one path, in method order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathItem {
    pub operations: IndexMap<HttpMethod, OperationModel>,
}

/// A document together with the non-fatal diagnostics raised while building it.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub document: Document,
    /// Name collisions and other recoverable conditions, in the order raised
    pub warnings: Vec<AssemblyError>,
}

impl Document {
    /// Look up one operation by normalized path and method.
    pub fn operation(&self, path: &str, method: HttpMethod) -> Option<&OperationModel> {
        self.paths.get(path)?.operations.get(&method)
    }

    /// Number of operations across all paths.
    pub fn operation_count(&self) -> usize {
        self.paths.values().map(|p| p.operations.len()).sum()
    }
}

/// Assemble the extracted operations and the registry's components into a [`Document`].
///
/// Two operations on the same `(path, method)` abort assembly before anything
/// else happens.
pub fn assemble(
    operations: Vec<OperationModel>,
    registry: SchemaRegistry<'_>,
    config: &EngineConfig,
) -> Result<Assembly, AssemblyError> {
    check_duplicates(&operations)?;

    let table = registry.finish(operations.iter().flat_map(|op| op.schemas()));
    let mut operations: Vec<OperationModel> = operations
        .into_iter()
        .map(|op| materialize_operation(&table, op))
        .collect();

    let (components, mut warnings) = table.into_parts();
    warnings.extend(dedup_operation_ids(&mut operations));

    let mut paths: IndexMap<String, PathItem> = IndexMap::new();
    for op in operations {
        paths
            .entry(op.path.clone())
            .or_default()
            .operations
            .insert(op.method, op);
    }

    let ordering = config.method_ordering();
    for item in paths.values_mut() {
        item.operations
            .sort_by(|a, _, b, _| method_rank(ordering, *a).cmp(&method_rank(ordering, *b)));
    }

    info!(
        "Assembled {} path(s) and {} component(s)",
        paths.len(),
        components.len()
    );
    Ok(Assembly {
        document: Document { paths, components },
        warnings,
    })
}

fn check_duplicates(operations: &[OperationModel]) -> Result<(), AssemblyError> {
    let mut seen = HashSet::new();
    for op in operations {
        if !seen.insert((op.path.as_str(), op.method)) {
            return Err(AssemblyError::DuplicateOperation {
                method: op.method,
                path: op.path.clone(),
            });
        }
    }
    Ok(())
}

/// Listed methods first in list order, the rest alphabetically.
fn method_rank(ordering: &[HttpMethod], method: HttpMethod) -> (usize, &'static str) {
    match ordering.iter().position(|m| *m == method) {
        Some(index) => (index, ""),
        None => (ordering.len(), method.as_str()),
    }
}

fn materialize_operation(table: &ComponentTable, mut op: OperationModel) -> OperationModel {
    for param in &mut op.parameters {
        param.schema = table.materialize(&param.schema);
    }
    if let Some(body) = &mut op.request_body {
        body.schema = table.materialize(&body.schema);
    }
    for response in op.responses.values_mut() {
        if let Some(schema) = &response.schema {
            response.schema = Some(table.materialize(schema));
        }
    }
    op
}

/// Give every operation a unique operationId.
///
/// The first operation with an explicit id keeps it; when nobody set it
/// explicitly, the first default owner keeps it. Everyone else gets `_2`, `_3`...
fn dedup_operation_ids(operations: &mut [OperationModel]) -> Vec<AssemblyError> {
    let mut owners: HashMap<String, usize> = HashMap::new();
    for (index, op) in operations.iter().enumerate() {
        let Some(id) = &op.operation_id else {
            continue;
        };
        match owners.get(id).copied() {
            None => {
                owners.insert(id.clone(), index);
            }
            Some(owner) if op.explicit_operation_id && !operations[owner].explicit_operation_id => {
                owners.insert(id.clone(), index);
            }
            Some(_) => {}
        }
    }

    let mut taken: HashSet<String> = operations
        .iter()
        .filter_map(|op| op.operation_id.clone())
        .collect();
    let mut warnings = Vec::new();
    for (index, op) in operations.iter_mut().enumerate() {
        let Some(id) = op.operation_id.clone() else {
            continue;
        };
        if owners.get(&id) == Some(&index) {
            continue;
        }
        let mut counter = 2;
        let mut assigned = format!("{}_{}", id, counter);
        while taken.contains(&assigned) {
            counter += 1;
            assigned = format!("{}_{}", id, counter);
        }
        taken.insert(assigned.clone());
        let warning = AssemblyError::DuplicateOperationId {
            method: op.method,
            path: op.path.clone(),
            operation_id: id,
            assigned: assigned.clone(),
        };
        warn!("{}", warning);
        warnings.push(warning);
        op.operation_id = Some(assigned);
    }
    debug!("{} operationId collision(s) resolved", warnings.len());
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDecl, TypeCatalog, TypeDecl};
    use crate::route::{extract, ParameterLocation, RouteRegistration};
    use crate::type_expr::TypeExpr;
    use pretty_assertions::assert_eq;

    fn ty(text: &str) -> TypeExpr {
        TypeExpr::parse(text).unwrap()
    }

    fn catalog() -> TypeCatalog {
        let mut catalog = TypeCatalog::new();
        catalog.insert(TypeDecl::object(
            "Widget",
            vec![
                FieldDecl::new("id", ty("u64")),
                FieldDecl::new("parts", ty("Vec<Part>")),
            ],
        ));
        catalog.insert(TypeDecl::object("Part", vec![FieldDecl::new("sku", ty("String"))]));
        catalog
    }

    fn build(
        catalog: &TypeCatalog,
        routes: &[RouteRegistration],
        config: &EngineConfig,
    ) -> Result<Assembly, AssemblyError> {
        let mut registry = SchemaRegistry::new(catalog, config.promote_all_objects);
        let operations = routes
            .iter()
            .map(|r| extract(r, &mut registry, config).unwrap())
            .collect();
        assemble(operations, registry, config)
    }

    #[test]
    fn test_methods_follow_canonical_order() {
        let routes: Vec<RouteRegistration> = [
            HttpMethod::Head,
            HttpMethod::Patch,
            HttpMethod::Options,
            HttpMethod::Post,
            HttpMethod::Get,
            HttpMethod::Delete,
            HttpMethod::Put,
        ]
        .into_iter()
        .map(|m| RouteRegistration::new(m, "/widgets"))
        .collect();

        let assembly = build(&catalog(), &routes, &EngineConfig::default()).unwrap();
        let methods: Vec<HttpMethod> = assembly.document.paths["/widgets"]
            .operations
            .keys()
            .copied()
            .collect();
        assert_eq!(
            methods,
            vec![
                HttpMethod::Get,
                HttpMethod::Put,
                HttpMethod::Post,
                HttpMethod::Delete,
                HttpMethod::Patch,
                HttpMethod::Head,
                HttpMethod::Options,
            ]
        );
    }

    #[test]
    fn test_custom_method_ordering() {
        let routes = vec![
            RouteRegistration::new(HttpMethod::Get, "/widgets"),
            RouteRegistration::new(HttpMethod::Delete, "/widgets"),
            RouteRegistration::new(HttpMethod::Post, "/widgets"),
        ];
        let config = EngineConfig {
            method_ordering: vec![HttpMethod::Post],
            ..EngineConfig::default()
        };
        let assembly = build(&catalog(), &routes, &config).unwrap();
        let methods: Vec<HttpMethod> = assembly.document.paths["/widgets"]
            .operations
            .keys()
            .copied()
            .collect();
        assert_eq!(
            methods,
            vec![HttpMethod::Post, HttpMethod::Delete, HttpMethod::Get]
        );
    }

    #[test]
    fn test_duplicate_operation_is_fatal() {
        let routes = vec![
            RouteRegistration::new(HttpMethod::Post, "/widgets").with_operation_id("a"),
            RouteRegistration::new(HttpMethod::Post, "/widgets").with_operation_id("b"),
        ];
        let err = build(&catalog(), &routes, &EngineConfig::default()).unwrap_err();
        assert_eq!(
            err,
            AssemblyError::DuplicateOperation {
                method: HttpMethod::Post,
                path: "/widgets".to_string(),
            }
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_duplicate_detected_across_template_styles() {
        let routes = vec![
            RouteRegistration::new(HttpMethod::Get, "/widgets/:id").with_parameter(
                "id",
                ParameterLocation::Path,
                ty("u64"),
            ),
            RouteRegistration::new(HttpMethod::Get, "/widgets/{id}").with_parameter(
                "id",
                ParameterLocation::Path,
                ty("u64"),
            ),
        ];
        assert!(build(&catalog(), &routes, &EngineConfig::default()).is_err());
    }

    #[test]
    fn test_paths_grouped_in_first_seen_order() {
        let routes = vec![
            RouteRegistration::new(HttpMethod::Post, "/widgets"),
            RouteRegistration::new(HttpMethod::Get, "/parts"),
            RouteRegistration::new(HttpMethod::Get, "/widgets"),
        ];
        let assembly = build(&catalog(), &routes, &EngineConfig::default()).unwrap();
        let paths: Vec<&String> = assembly.document.paths.keys().collect();
        assert_eq!(paths, vec!["/widgets", "/parts"]);
        assert_eq!(assembly.document.operation_count(), 3);
    }

    #[test]
    fn test_components_in_first_seen_order_and_references_rewritten() {
        let routes = vec![
            RouteRegistration::new(HttpMethod::Get, "/parts")
                .with_response("200", Some(ty("Vec<Part>"))),
            RouteRegistration::new(HttpMethod::Post, "/widgets")
                .with_body(ty("Widget"))
                .with_response("201", Some(ty("Widget"))),
        ];
        let assembly = build(&catalog(), &routes, &EngineConfig::default()).unwrap();
        let document = assembly.document;

        assert_eq!(
            document.components.keys().collect::<Vec<_>>(),
            vec!["Part", "Widget"]
        );
        let op = document.operation("/widgets", HttpMethod::Post).unwrap();
        assert_eq!(
            op.request_body.as_ref().unwrap().schema,
            SchemaNode::Reference("Widget".to_string())
        );
        let parts = document.operation("/parts", HttpMethod::Get).unwrap();
        assert_eq!(
            parts.responses["200"].schema,
            Some(SchemaNode::ArrayOf(Box::new(SchemaNode::Reference(
                "Part".to_string()
            ))))
        );
    }

    #[test]
    fn test_explicit_operation_id_wins_collision() {
        let routes = vec![
            RouteRegistration::new(HttpMethod::Get, "/widgets"),
            RouteRegistration::new(HttpMethod::Get, "/parts").with_operation_id("get_widgets"),
            RouteRegistration::new(HttpMethod::Post, "/parts").with_operation_id("get_widgets"),
        ];
        let assembly = build(&catalog(), &routes, &EngineConfig::default()).unwrap();
        let document = &assembly.document;

        let id = |path: &str, method| {
            document
                .operation(path, method)
                .unwrap()
                .operation_id
                .clone()
                .unwrap()
        };
        assert_eq!(id("/parts", HttpMethod::Get), "get_widgets");
        assert_eq!(id("/widgets", HttpMethod::Get), "get_widgets_2");
        assert_eq!(id("/parts", HttpMethod::Post), "get_widgets_3");
        assert_eq!(assembly.warnings.len(), 2);
        assert!(assembly.warnings.iter().all(|w| !w.is_fatal()));
    }
}
