use crate::catalog::TypeCatalog;
use crate::config::OperationIdStrategy;
use crate::engine::{generate, Generated};
use crate::manifest::Manifest;
use crate::openapi::OpenApiDocument;
use crate::serializer::{serialize_json, serialize_yaml, write_to_file};
use crate::source::SourceScanner;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info, warn};
use std::path::PathBuf;

/// OpenAPI introspector - generate an OpenAPI document from a route manifest and Rust types
#[derive(Parser, Debug)]
#[command(name = "openapi-introspect")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the route manifest (YAML or JSON)
    #[arg(value_name = "MANIFEST")]
    pub manifest_path: PathBuf,

    /// Rust project directory to read type declarations from (repeatable)
    #[arg(short = 's', long = "source", value_name = "DIR")]
    pub source_dirs: Vec<PathBuf>,

    /// Output format (yaml or json)
    #[arg(short = 'f', long = "format", value_enum, default_value = "yaml")]
    pub output_format: OutputFormat,

    /// Output file path (if not specified, outputs to stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_path: Option<PathBuf>,

    /// Fail on any route error instead of leaving the route out
    #[arg(long = "strict")]
    pub strict: bool,

    /// How operations without an explicit operationId are named
    #[arg(long = "operation-ids", value_enum)]
    pub operation_ids: Option<OperationIdMode>,

    /// Inline object types that are referenced only once
    #[arg(long = "inline-single-use")]
    pub inline_single_use: bool,

    /// Overrides the manifest's API title
    #[arg(long = "title")]
    pub title: Option<String>,

    /// Overrides the manifest's API version
    #[arg(long = "api-version")]
    pub api_version: Option<String>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OperationIdMode {
    /// `<method>_<path>` for every operation without an explicit id
    PathMethod,
    /// Only explicit operationIds are emitted
    ExplicitOnly,
}

impl From<OperationIdMode> for OperationIdStrategy {
    fn from(mode: OperationIdMode) -> Self {
        match mode {
            OperationIdMode::PathMethod => OperationIdStrategy::PathMethod,
            OperationIdMode::ExplicitOnly => OperationIdStrategy::ExplicitOnly,
        }
    }
}

/// Validate and log already-parsed arguments
pub fn parse_args_from_parsed(args: CliArgs) -> Result<CliArgs> {
    debug!("Parsed arguments: {:?}", args);

    if !args.manifest_path.is_file() {
        anyhow::bail!(
            "Manifest does not exist or is not a file: {}",
            args.manifest_path.display()
        );
    }
    for dir in &args.source_dirs {
        if !dir.is_dir() {
            anyhow::bail!("Source path is not a directory: {}", dir.display());
        }
    }

    info!("Manifest: {}", args.manifest_path.display());
    for dir in &args.source_dirs {
        info!("Source directory: {}", dir.display());
    }
    info!("Output format: {:?}", args.output_format);
    if let Some(ref output) = args.output_path {
        info!("Output file: {}", output.display());
    } else {
        info!("Output: stdout");
    }

    Ok(args)
}

/// Build the document and serialize it in the requested format.
pub fn render(args: &CliArgs) -> Result<String> {
    // Step 1: Load the manifest
    info!("Loading manifest...");
    let manifest = Manifest::load(&args.manifest_path)
        .with_context(|| format!("Failed to load manifest: {}", args.manifest_path.display()))?;
    let routes = manifest.registrations()?;
    info!("Manifest declares {} route(s) and {} type(s)", routes.len(), manifest.types.len());

    // Step 2: Build the type catalog; manifest declarations take precedence
    let mut catalog: TypeCatalog = manifest.catalog()?;
    for dir in &args.source_dirs {
        info!("Reading type declarations from {}...", dir.display());
        let types = SourceScanner::new(dir.clone()).load()?;
        info!(
            "Parsed {} of {} file(s), {} declaration(s)",
            types.files_parsed,
            types.files_scanned,
            types.decls.len()
        );
        catalog.extend_missing(types.decls);
    }
    debug!("Type catalog holds {} declaration(s)", catalog.len());

    // Step 3: Apply command-line overrides
    let mut config = manifest.config.clone();
    if args.strict {
        config.strict = true;
    }
    if let Some(mode) = args.operation_ids {
        config.operation_id_strategy = mode.into();
    }
    if args.inline_single_use {
        config.promote_all_objects = false;
    }
    let mut api_info = manifest.info.clone().unwrap_or_default();
    if let Some(title) = &args.title {
        api_info.title = title.clone();
    }
    if let Some(version) = &args.api_version {
        api_info.version = version.clone();
    }

    // Step 4: Extract and assemble
    info!("Generating document...");
    let Generated {
        document,
        rejected,
        warnings,
    } = generate(&routes, &catalog, &config)?;
    for error in &rejected {
        warn!("Route left out of the document: {}", error);
    }
    for warning in &warnings {
        warn!("{}", warning);
    }

    // Step 5: Serialize
    info!("Serializing to {:?} format...", args.output_format);
    let openapi = OpenApiDocument::new(api_info, &document);
    let content = match args.output_format {
        OutputFormat::Yaml => serialize_yaml(&openapi)?,
        OutputFormat::Json => serialize_json(&openapi)?,
    };

    info!("Summary:");
    info!("  - Operations: {}", document.operation_count());
    info!("  - Components: {}", document.components.len());
    info!("  - Routes left out: {}", rejected.len());
    info!("  - Warnings: {}", warnings.len());
    Ok(content)
}

/// Run the main workflow
pub fn run(args: CliArgs) -> Result<()> {
    info!("Starting OpenAPI document generation...");
    let content = render(&args)?;

    if let Some(output_path) = &args.output_path {
        info!("Writing output to: {}", output_path.display());
        write_to_file(&content, output_path)?;
        info!("Successfully wrote OpenAPI document to {}", output_path.display());
    } else {
        print!("{}", content);
    }

    info!("Generation complete!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::try_parse_from([
            "openapi-introspect",
            "api.yaml",
            "-s",
            "server",
            "--source",
            "models",
            "-f",
            "json",
            "--strict",
            "--operation-ids",
            "explicit-only",
            "--inline-single-use",
            "--api-version",
            "3.0.0",
        ])
        .unwrap();

        assert_eq!(
            args.source_dirs,
            vec![PathBuf::from("server"), PathBuf::from("models")]
        );
        assert!(matches!(args.output_format, OutputFormat::Json));
        assert!(args.strict);
        assert_eq!(args.operation_ids, Some(OperationIdMode::ExplicitOnly));
        assert!(args.inline_single_use);
        assert_eq!(args.api_version.as_deref(), Some("3.0.0"));
        assert!(args.title.is_none());
    }

    #[test]
    fn test_missing_manifest_rejected() {
        let args =
            CliArgs::try_parse_from(["openapi-introspect", "/no/such/manifest.yaml"]).unwrap();
        assert!(parse_args_from_parsed(args).is_err());
    }

    #[test]
    fn test_render_applies_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = temp_dir.path().join("api.yaml");
        fs::write(
            &manifest,
            "info: { title: Shop, version: 1.0.0 }\nroutes:\n  - { path: /health, method: get }\n",
        )
        .unwrap();

        let args = CliArgs::try_parse_from([
            "openapi-introspect",
            manifest.to_str().unwrap(),
            "--title",
            "Storefront",
            "--operation-ids",
            "explicit-only",
        ])
        .unwrap();
        let yaml = render(&args).unwrap();

        assert!(yaml.contains("title: Storefront"));
        assert!(yaml.contains("version: 1.0.0"));
        assert!(!yaml.contains("operationId"));
    }
}
