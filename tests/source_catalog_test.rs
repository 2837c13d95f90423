// Types spread over several files and modules, resolved through one catalog
use openapi_introspect::catalog::{DeclBody, TypeCatalog, TypeSource};
use openapi_introspect::config::EngineConfig;
use openapi_introspect::engine::generate;
use openapi_introspect::error::AssemblyError;
use openapi_introspect::route::{HttpMethod, RouteRegistration};
use openapi_introspect::schema::SchemaNode;
use openapi_introspect::source::SourceScanner;
use openapi_introspect::type_expr::TypeExpr;
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

fn project() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::create_dir_all(root.join("src/billing")).unwrap();
    fs::write(
        root.join("src/lib.rs"),
        "pub mod auth;\npub mod billing;\npub type AccountId = u64;\n",
    )
    .unwrap();
    fs::write(
        root.join("src/auth.rs"),
        r#"
        #[derive(Serialize)]
        pub struct User {
            pub login: String,
        }
        "#,
    )
    .unwrap();
    fs::write(
        root.join("src/billing/mod.rs"),
        r#"
        pub mod invoices;

        #[derive(Serialize)]
        #[serde(deny_unknown_fields)]
        pub struct User {
            pub account: crate::AccountId,
            pub invoices: Vec<invoices::Invoice>,
        }
        "#,
    )
    .unwrap();
    fs::write(
        root.join("src/billing/invoices.rs"),
        r#"
        #[derive(Serialize)]
        pub struct Invoice {
            pub total: f64,
            pub owner: Option<crate::billing::User>,
        }
        "#,
    )
    .unwrap();
    temp_dir
}

fn catalog(root: &TempDir) -> TypeCatalog {
    let mut catalog = TypeCatalog::new();
    catalog.extend_missing(
        SourceScanner::new(root.path().to_path_buf())
            .load()
            .unwrap()
            .decls,
    );
    catalog
}

#[test]
fn test_declarations_are_module_qualified() {
    let root = project();
    let catalog = catalog(&root);

    let names: Vec<&str> = catalog.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "auth::User",
            "billing::invoices::Invoice",
            "billing::User",
            "AccountId"
        ]
    );
    assert!(matches!(
        catalog.lookup("billing::User").unwrap().body,
        DeclBody::Object {
            additional_properties: false,
            ..
        }
    ));
}

#[test]
fn test_same_short_name_in_two_modules_gets_suffixed() {
    let root = project();
    let catalog = catalog(&root);
    let routes = vec![
        RouteRegistration::new(HttpMethod::Get, "/me")
            .with_response("200", Some(TypeExpr::named("auth::User"))),
        RouteRegistration::new(HttpMethod::Get, "/accounts")
            .with_response("200", Some(TypeExpr::named("billing::User"))),
    ];

    let generated = generate(&routes, &catalog, &EngineConfig::default()).unwrap();
    let components: Vec<&String> = generated.document.components.keys().collect();
    assert_eq!(components, vec!["User", "User2", "Invoice"]);

    assert_eq!(generated.warnings.len(), 1);
    match &generated.warnings[0] {
        AssemblyError::CanonicalNameCollision { name, assigned, .. } => {
            assert_eq!(name, "User");
            assert_eq!(assigned, "User2");
        }
        other => panic!("Expected a name collision, got {:?}", other),
    }
}

#[test]
fn test_cross_file_cycle_is_broken_by_reference() {
    let root = project();
    let catalog = catalog(&root);
    let routes = vec![RouteRegistration::new(HttpMethod::Get, "/accounts")
        .with_response("200", Some(TypeExpr::named("billing::User")))];

    let generated = generate(&routes, &catalog, &EngineConfig::default()).unwrap();
    let invoice = &generated.document.components["Invoice"];
    match invoice {
        SchemaNode::ObjectType { properties, .. } => {
            assert_eq!(
                properties["owner"].schema,
                SchemaNode::Reference("User".to_string())
            );
            assert!(!properties["owner"].required);
        }
        other => panic!("Expected object, got {:?}", other),
    }
}

#[test]
fn test_relative_paths_resolve_to_the_nearest_declaration() {
    let root = project();
    fs::write(
        root.path().join("src/billing/invoices.rs"),
        r#"
        use super::User as Payer;

        #[derive(Serialize)]
        pub struct Invoice {
            pub total: f64,
            pub owner: Option<super::User>,
            pub payer: Payer,
        }

        #[derive(Serialize)]
        pub struct Receipt {
            pub invoice: Invoice,
        }
        "#,
    )
    .unwrap();
    let catalog = catalog(&root);
    let routes = vec![
        RouteRegistration::new(HttpMethod::Get, "/receipts")
            .with_response("200", Some(TypeExpr::named("billing::invoices::Receipt"))),
    ];

    let generated = generate(&routes, &catalog, &EngineConfig::default()).unwrap();
    let components: Vec<&String> = generated.document.components.keys().collect();
    assert_eq!(components, vec!["Receipt", "Invoice", "User"]);
    assert!(generated.warnings.is_empty());

    match &generated.document.components["User"] {
        SchemaNode::ObjectType { properties, .. } => {
            let names: Vec<&String> = properties.keys().collect();
            assert_eq!(names, vec!["account", "invoices"]);
        }
        other => panic!("Expected object, got {:?}", other),
    }
    match &generated.document.components["Invoice"] {
        SchemaNode::ObjectType { properties, .. } => {
            assert_eq!(
                properties["payer"].schema,
                SchemaNode::Reference("User".to_string())
            );
        }
        other => panic!("Expected object, got {:?}", other),
    }
}
