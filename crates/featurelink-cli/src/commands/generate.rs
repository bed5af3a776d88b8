//! `featurelink generate`.

use std::path::Path;

use anyhow::Result;
use featurelink_codegen::{DescriptorGenerator, GenerationContext, GenerationOutcome};
use featurelink_config::Config;
use featurelink_core::FeatureSpec;
use featurelink_runtime::feature_spec;
use featurelink_telemetry::RunContext;

/// Generate descriptors for every configured feature and print a summary.
///
/// Exits non-zero when any feature failed.
pub(crate) async fn run_generate(config: &Config, workspace_root: &Path) -> Result<()> {
    let features: Vec<FeatureSpec> = config.featurelink.features.iter().map(feature_spec).collect();
    if features.is_empty() {
        println!("No features configured.");
        return Ok(());
    }

    let run = RunContext::new("generate").with_metadata("features", features.len().to_string());
    let generator = DescriptorGenerator::from_config(config, workspace_root)?;
    let mut ctx = GenerationContext::new();
    let report = run.instrument(generator.generate(&mut ctx, &features)).await;
    run.complete();

    for feature in &report.features {
        match &feature.outcome {
            GenerationOutcome::Generated {
                descriptor,
                written,
            } => {
                println!("  generated  {}  ({})", written.type_name, feature.source);
                match descriptor.artifact() {
                    Some(artifact) => println!("             artifact: {artifact}"),
                    None => println!("             artifact: none"),
                }
                println!(
                    "             {} package(s), {} exposed type(s)",
                    descriptor.packages.len(),
                    descriptor.exposed_types.len()
                );
            },
            GenerationOutcome::DuplicateSource => {
                println!("  skipped    {}  (already processed)", feature.source);
            },
            GenerationOutcome::DuplicateName { type_name } => {
                println!("  skipped    {}  ({type_name} already generated)", feature.source);
            },
            GenerationOutcome::Failed { error } => {
                println!("  failed     {}  {error}", feature.source);
            },
        }
    }

    let failed = report.failed();
    if failed > 0 {
        anyhow::bail!("{failed} feature(s) failed to generate");
    }
    Ok(())
}
