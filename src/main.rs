//! OpenAPI introspector - command-line tool for generating OpenAPI documents.
//!
//! Reads a route manifest, resolves the types it names against the manifest's own
//! declarations and any Rust source directories given with `--source`, and writes
//! an OpenAPI 3.0 document.
//!
//! # Usage
//!
//! ```bash
//! openapi-introspect [OPTIONS] <MANIFEST>
//! ```
//!
//! # Examples
//!
//! Generate YAML documentation with types read from a project:
//! ```bash
//! openapi-introspect api.yaml --source ./my-api-project -o openapi.yaml
//! ```
//!
//! Generate JSON and fail on any route that cannot be documented:
//! ```bash
//! openapi-introspect api.yaml -s ./my-api-project -f json --strict
//! ```

use anyhow::Result;
use clap::Parser;
use log::info;
use openapi_introspect::cli;

fn main() -> Result<()> {
    // Parse first so the verbose flag can pick the log level
    let args = cli::CliArgs::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    info!("OpenAPI introspector starting...");

    let args = cli::parse_args_from_parsed(args)?;
    cli::run(args)?;

    info!("OpenAPI document generation completed successfully");

    Ok(())
}
