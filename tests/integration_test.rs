use clap::Parser;
use openapi_introspect::{
    catalog::TypeCatalog,
    cli::{render, CliArgs},
    config::EngineConfig,
    engine::generate,
    error::{AssemblyError, Error, RouteError},
    manifest::Manifest,
    route::HttpMethod,
    source::SourceScanner,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;

/// Helper function to create a temporary test project
fn create_test_project(files: Vec<(&str, &str)>) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    for (path, content) in files {
        let file_path = temp_dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(&file_path, content).expect("Failed to write test file");
    }

    temp_dir
}

fn shop_project() -> TempDir {
    create_test_project(vec![
        ("src/models.rs", include_str!("fixtures/shop_models.rs")),
        ("api.yaml", include_str!("fixtures/shop.yaml")),
    ])
}

fn cli_args(project: &Path, extra: &[&str]) -> CliArgs {
    let manifest = project.join("api.yaml");
    let mut argv = vec![
        "openapi-introspect".to_string(),
        manifest.display().to_string(),
        "--source".to_string(),
        project.display().to_string(),
    ];
    argv.extend(extra.iter().map(|s| s.to_string()));
    CliArgs::try_parse_from(argv).expect("Failed to parse arguments")
}

fn render_json(project: &Path) -> Value {
    let json = render(&cli_args(project, &["-f", "json"])).expect("Generation failed");
    serde_json::from_str(&json).expect("Output is not valid JSON")
}

#[test]
fn test_manifest_and_source_end_to_end() {
    let project = shop_project();
    let doc = render_json(project.path());

    assert_eq!(doc["openapi"], "3.0.3");
    assert_eq!(doc["info"], json!({"title": "Shop", "version": "1.0.0"}));

    let paths: Vec<&String> = doc["paths"].as_object().unwrap().keys().collect();
    assert_eq!(paths, vec!["/users", "/users/{id}", "/categories"]);
    let user_methods: Vec<&String> = doc["paths"]["/users"].as_object().unwrap().keys().collect();
    assert_eq!(user_methods, vec!["get", "post"]);

    let list = &doc["paths"]["/users"]["get"];
    assert_eq!(list["operationId"], "get_users");
    assert_eq!(
        list["parameters"][0],
        json!({"name": "limit", "in": "query", "required": false,
               "schema": {"type": "integer", "format": "int32"}})
    );
    assert_eq!(
        list["responses"]["200"]["content"]["application/json"]["schema"]["$ref"],
        "#/components/schemas/Page_User"
    );

    let get = &doc["paths"]["/users/{id}"]["get"];
    assert_eq!(get["operationId"], "get_users_id");
    assert_eq!(get["parameters"][0]["in"], "path");
    assert_eq!(get["parameters"][0]["required"], true);
    assert_eq!(get["responses"]["404"], json!({"description": "Not found"}));

    let create = &doc["paths"]["/users"]["post"];
    assert_eq!(create["requestBody"]["required"], true);
    assert_eq!(
        create["requestBody"]["content"]["application/json"]["schema"]["$ref"],
        "#/components/schemas/NewUser"
    );
}

#[test]
fn test_components_follow_serde_shape() {
    let project = shop_project();
    let doc = render_json(project.path());
    let schemas = &doc["components"]["schemas"];

    let names: Vec<&String> = schemas.as_object().unwrap().keys().collect();
    assert_eq!(names, vec!["Page_User", "User", "Status", "NewUser", "Category"]);

    let user = &schemas["User"];
    let properties: Vec<&String> = user["properties"].as_object().unwrap().keys().collect();
    assert_eq!(properties, vec!["userId", "displayName", "email", "status"]);
    assert_eq!(user["required"], json!(["userId", "displayName", "status"]));
    assert_eq!(
        user["properties"]["status"],
        json!({"$ref": "#/components/schemas/Status"})
    );

    assert_eq!(schemas["Status"]["enum"], json!(["active", "on_hold"]));
    assert_eq!(
        schemas["Page_User"]["properties"]["items"],
        json!({"type": "array", "items": {"$ref": "#/components/schemas/User"}})
    );
    assert_eq!(
        schemas["Category"]["properties"]["children"]["items"]["$ref"],
        "#/components/schemas/Category"
    );
    assert!(schemas.get("Webhook").is_none());
}

#[test]
fn test_output_is_byte_identical_across_runs() {
    let project = shop_project();
    let first = render(&cli_args(project.path(), &[])).unwrap();
    let second = render(&cli_args(project.path(), &[])).unwrap();
    assert_eq!(first, second);
    assert!(first.starts_with("openapi: 3.0.3\n"));
}

#[test]
fn test_strict_mode_fails_with_every_route_error() {
    let project = shop_project();
    let err = render(&cli_args(project.path(), &["--strict"])).unwrap_err();
    let message = err.to_string();

    assert!(message.starts_with("2 route(s) rejected"), "{}", message);
    assert!(message.contains("POST /webhooks"));
    assert!(message.contains("DELETE /orders/{id}"));
}

#[test]
fn test_inline_single_use_keeps_shared_types_and_enums() {
    let project = shop_project();
    let json = render(&cli_args(project.path(), &["-f", "json", "--inline-single-use"])).unwrap();
    let doc: Value = serde_json::from_str(&json).unwrap();

    let names: Vec<&String> = doc["components"]["schemas"]
        .as_object()
        .unwrap()
        .keys()
        .collect();
    assert_eq!(names, vec!["User", "Status", "Category"]);
    assert_eq!(
        doc["paths"]["/users"]["post"]["requestBody"]["content"]["application/json"]["schema"]
            ["properties"]["display_name"]["type"],
        "string"
    );
}

#[test]
fn test_route_errors_are_reported_per_route() {
    let project = shop_project();
    let manifest = Manifest::load(&project.path().join("api.yaml")).unwrap();
    let mut catalog = manifest.catalog().unwrap();
    catalog.extend_missing(SourceScanner::new(project.path().to_path_buf()).load().unwrap().decls);

    let generated = generate(
        &manifest.registrations().unwrap(),
        &catalog,
        &EngineConfig::default(),
    )
    .unwrap();

    assert_eq!(generated.document.operation_count(), 4);
    assert_eq!(generated.rejected.len(), 2);
    assert!(matches!(
        &generated.rejected[0],
        RouteError::UnsupportedType { method: HttpMethod::Post, source, .. }
            if source.reason == "function pointer"
    ));
    match &generated.rejected[1] {
        RouteError::PathBindingMismatch { path, missing, .. } => {
            assert_eq!(path, "/orders/{id}");
            assert_eq!(missing, &vec!["id".to_string()]);
        }
        other => panic!("Expected PathBindingMismatch, got {:?}", other),
    }
}

#[test]
fn test_duplicate_operation_produces_no_document() {
    let manifest = Manifest::from_yaml_str(
        r#"
routes:
  - { path: "/items/:id", method: get, parameters: [{ name: id, in: path, type: u64 }] }
  - { path: "/items/{id}", method: GET, parameters: [{ name: id, in: path, type: String }] }
"#,
    )
    .unwrap();

    let err = generate(
        &manifest.registrations().unwrap(),
        &TypeCatalog::new(),
        &EngineConfig::default(),
    )
    .unwrap_err();
    match err {
        Error::Assembly(AssemblyError::DuplicateOperation { method, path }) => {
            assert_eq!(method, HttpMethod::Get);
            assert_eq!(path, "/items/{id}");
        }
        other => panic!("Expected DuplicateOperation, got {:?}", other),
    }
}

#[test]
fn test_manifest_types_take_precedence_over_source() {
    let project = create_test_project(vec![
        ("src/models.rs", "pub struct Token { pub secret: String }"),
        (
            "api.yaml",
            r#"
types:
  - name: models::Token
    fields:
      - { name: value, type: String }
routes:
  - { path: /token, method: post, responses: { 201: Token } }
"#,
        ),
    ]);
    let doc = render_json(project.path());
    let properties: Vec<&String> = doc["components"]["schemas"]["Token"]["properties"]
        .as_object()
        .unwrap()
        .keys()
        .collect();
    assert_eq!(properties, vec!["value"]);
}
