//! `sidekick check` - validate a definition file.

use std::path::Path;

use sidekick::definition::ServiceCatalog;

/// Loads the definition and prints its contents.
pub fn execute(definition: &Path) -> anyhow::Result<()> {
    let catalog = ServiceCatalog::load(definition)?;

    let mut total = 0;
    for package in &catalog.packages {
        for service in &package.services {
            total += 1;
            println!(
                "{}.{}  [{}]",
                package.name,
                service.name,
                service.methods.join(", ")
            );
            if !service.description.is_empty() {
                println!("    {}", service.description);
            }
        }
    }
    println!("{total} service(s) in {}", definition.display());
    Ok(())
}
