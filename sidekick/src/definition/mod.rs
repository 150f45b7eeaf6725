//! Service definition catalog.
//!
//! Sidecar services expose their RPC method surface through a JSON
//! definition file. The supervisor loads the file, resolves the named
//! `package.service`, and uses the resolved method list to dispatch calls -
//! unknown methods are rejected at the wire instead of being discovered at
//! runtime through reflection.
//!
//! # Definition format
//!
//! ```json
//! {
//!   "packages": [
//!     {
//!       "name": "system",
//!       "services": [
//!         {
//!           "name": "ImageConverter",
//!           "description": "Converts images between formats",
//!           "methods": ["convert", "healthCheck", "heartbeat"]
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```

mod catalog;
mod error;

pub use catalog::{PackageDefinition, ServiceCatalog, ServiceDefinition, ServiceSpec};
pub use error::DefinitionError;
