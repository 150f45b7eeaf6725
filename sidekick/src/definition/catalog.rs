//! Catalog types and loading.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::DefinitionError;

/// One RPC service inside a package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Service name (e.g. `ImageConverter`).
    pub name: String,
    /// Human-readable description, surfaced in status snapshots.
    #[serde(default)]
    pub description: String,
    /// Names of the methods the service exposes.
    pub methods: Vec<String>,
}

/// A named group of services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDefinition {
    /// Package name (e.g. `system`).
    pub name: String,
    /// Services declared under this package.
    pub services: Vec<ServiceDefinition>,
}

/// The parsed contents of a definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCatalog {
    pub packages: Vec<PackageDefinition>,
}

/// A resolved `package.service` entry.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub package: String,
    pub name: String,
    pub description: String,
    pub methods: Vec<String>,
}

impl ServiceSpec {
    /// Returns true if the service declares the named method.
    pub fn has_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }
}

impl ServiceCatalog {
    /// Loads a catalog from a JSON definition file.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::Read`] if the file cannot be read and
    /// [`DefinitionError::Parse`] if it is not a valid catalog document.
    pub fn load(path: &Path) -> Result<Self, DefinitionError> {
        let raw = fs::read_to_string(path).map_err(|source| DefinitionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| DefinitionError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolves a `package.service` pair to its definition.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::ServiceNotFound`] if either the package or
    /// the service is absent.
    pub fn resolve(&self, package: &str, service: &str) -> Result<ServiceSpec, DefinitionError> {
        self.packages
            .iter()
            .find(|p| p.name == package)
            .and_then(|p| p.services.iter().find(|s| s.name == service))
            .map(|s| ServiceSpec {
                package: package.to_string(),
                name: s.name.clone(),
                description: s.description.clone(),
                methods: s.methods.clone(),
            })
            .ok_or_else(|| DefinitionError::ServiceNotFound {
                package: package.to_string(),
                service: service.to_string(),
            })
    }
}
