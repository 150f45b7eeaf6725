//! Run manifest: which services to start, and from what.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// One service to start at launch.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestService {
    pub package: String,
    pub service: String,
    /// Sidecar executable backing the service.
    pub binary: PathBuf,
    /// Fixed port; allocated dynamically when absent.
    #[serde(default)]
    pub port: Option<u16>,
}

/// The parsed manifest file.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    /// Service definition file the services are resolved against.
    pub definition: PathBuf,
    pub services: Vec<ManifestService>,
}

impl Manifest {
    /// Loads a manifest from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse manifest {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_manifest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{
                "definition": "services.json",
                "services": [
                    {
                        "package": "system",
                        "service": "ImageConverter",
                        "binary": "./builds/system",
                        "port": 50051
                    },
                    {
                        "package": "system",
                        "service": "FileSpaceAnalyzer",
                        "binary": "./builds/system"
                    }
                ]
            }"#,
        )
        .unwrap();

        let manifest = Manifest::load(file.path()).unwrap();
        assert_eq!(manifest.definition, PathBuf::from("services.json"));
        assert_eq!(manifest.services.len(), 2);
        assert_eq!(manifest.services[0].port, Some(50051));
        assert_eq!(manifest.services[1].port, None);
    }

    #[test]
    fn test_load_missing_manifest() {
        let err = Manifest::load(Path::new("/no/such/manifest.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read manifest"));
    }
}
