//! One-call pipeline from route registrations to a [`Document`].

use crate::assembler::{assemble, Assembly, Document};
use crate::catalog::TypeSource;
use crate::config::EngineConfig;
use crate::error::{AssemblyError, Error, Result, RouteError};
use crate::registry::SchemaRegistry;
use crate::route::{extract, RouteRegistration};
use log::{debug, info, warn};

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct Generated {
    /// Operations of every surviving route plus the components they reach
    pub document: Document,
    /// Routes excluded from the document, in registration order
    pub rejected: Vec<RouteError>,
    /// Non-fatal assembly diagnostics
    pub warnings: Vec<AssemblyError>,
}

/// Extract every route, then assemble the survivors.
///
/// Per-route errors are collected over the whole pass. In strict mode any of
/// them fails the run with [`Error::Rejected`]; otherwise the offending routes
/// are left out of the document. Assembly errors are always fatal.
pub fn generate(
    routes: &[RouteRegistration],
    source: &dyn TypeSource,
    config: &EngineConfig,
) -> Result<Generated> {
    info!("Extracting {} route(s)", routes.len());
    let mut registry = SchemaRegistry::new(source, config.promote_all_objects);
    let mut operations = Vec::with_capacity(routes.len());
    let mut rejected = Vec::new();

    for route in routes {
        match extract(route, &mut registry, config) {
            Ok(op) => operations.push(op),
            Err(e) => {
                warn!("Excluding route: {}", e);
                rejected.push(e);
            }
        }
    }
    debug!(
        "{} operation(s) extracted, {} rejected, {} type slot(s)",
        operations.len(),
        rejected.len(),
        registry.len()
    );

    if config.strict && !rejected.is_empty() {
        return Err(Error::Rejected(rejected));
    }

    let Assembly { document, warnings } = assemble(operations, registry, config)?;
    Ok(Generated {
        document,
        rejected,
        warnings,
    })
}
