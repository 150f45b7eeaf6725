//! Definition loading errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or resolving a service definition.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// The definition file could not be read.
    #[error("Failed to read definition file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The definition file is not valid JSON or has the wrong shape.
    #[error("Failed to parse definition file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The requested `package.service` is absent from the catalog.
    #[error("Service not found: {package}.{service}")]
    ServiceNotFound { package: String, service: String },
}
