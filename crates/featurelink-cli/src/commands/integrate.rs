//! `featurelink integrate`: a startup integration dry run.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use featurelink_config::Config;
use featurelink_core::{CodeSpace, LayeredCodeSpace, Registry, TypeCatalog};
use featurelink_runtime::{
    FeatureOutcome, IntegrationEngine, ModuleDirectory, WasmLimits, WasmLoader,
};
use featurelink_telemetry::RunContext;

/// Integrate the configured features into a fresh host, print what was
/// bound, then tear everything down.
pub(crate) async fn run_integrate(config: &Config, workspace_root: &Path) -> Result<()> {
    if !config.featurelink.enabled {
        println!("Integration is disabled ([featurelink] enabled = false).");
        return Ok(());
    }

    let runtime = &config.runtime;
    let loader = Arc::new(WasmLoader::new(WasmLimits {
        call_timeout: Duration::from_secs(runtime.call_timeout_secs),
        memory_max_pages: runtime.memory_max_pages,
    }));
    let host_modules = Arc::new(ModuleDirectory::new(
        workspace_root.join(&runtime.host_output_dir),
        runtime.compiled_extension.clone(),
        loader,
    ));
    let catalog: Arc<dyn CodeSpace> = Arc::new(TypeCatalog::new("host"));
    let modules: Arc<dyn CodeSpace> = Arc::clone(&host_modules) as Arc<dyn CodeSpace>;
    let code_space: Arc<dyn CodeSpace> =
        Arc::new(LayeredCodeSpace::new(vec![catalog, modules]));
    let host = Registry::root("host", code_space);

    let engine = IntegrationEngine::from_config(config, workspace_root);
    let run = RunContext::new("integrate");
    let report = run
        .instrument(engine.integrate_configured(&host, config))
        .await;
    run.complete();

    for feature in &report.features {
        match &feature.outcome {
            FeatureOutcome::Integrated { path, bindings } => {
                println!("  integrated  {}  via {path}", feature.source);
                for binding in bindings {
                    println!("              {} -> {}", binding.binding_name, binding.source_type);
                }
            },
            FeatureOutcome::Failed { error } => {
                println!("  skipped     {}  {error}", feature.source);
            },
        }
    }
    println!(
        "\n{} integrated, {} skipped",
        report.integrated(),
        report.failed()
    );

    engine.shutdown();
    host.close();
    host_modules.close();
    Ok(())
}
