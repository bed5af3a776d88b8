//! `featurelink descriptors`.

use std::path::Path;

use anyhow::Result;
use featurelink_codegen::DescriptorWriter;
use featurelink_config::Config;

/// List the descriptors under the configured metadata directory.
pub(crate) fn list_descriptors(config: &Config, workspace_root: &Path) -> Result<()> {
    let writer = DescriptorWriter::new(workspace_root.join(&config.codegen.metadata_dir));
    let descriptors = writer.list()?;
    if descriptors.is_empty() {
        println!("No descriptors in {}", writer.root().display());
        return Ok(());
    }

    for (type_name, descriptor) in &descriptors {
        println!("{type_name}");
        println!("  artifact: {}", descriptor.artifact().unwrap_or("none"));
        for package in &descriptor.packages {
            println!("  package:  {package}");
        }
        for exposed in &descriptor.exposed_types {
            println!("  exposes:  {exposed}");
        }
    }
    Ok(())
}
