//! Descriptor generation against fake fetch and build collaborators.

use std::path::Path;
use std::sync::Arc;

use featurelink_codegen::{
    DescriptorGenerator, GenerationContext, GenerationOutcome, GeneratorSettings, SourceDialect,
    SourceScanner,
};
use featurelink_core::FeatureSpec;
use featurelink_runtime::{DescriptorSource, MetadataDirectory};
use featurelink_test::{FakeFetcher, ScriptedBuilder, init_test_logging, test_feature};

const INVOICES: &str = "pub const PACKAGE: &str = \"a.billing\";\n\n#[service]\npub struct Invoices {\n    total: u64,\n}\n";
const LEDGER: &str = "pub const PACKAGE: &str = \"a.billing.ledger\";\n\npub trait Ledger {}\n";
const OUTSIDER: &str = "pub const PACKAGE: &str = \"a.billingx\";\n\n#[component]\npub struct Outsider;\n";

fn write(root: &Path, path: &str, body: &str) {
    let path = root.join(path);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

/// A feature checkout holding three sources, and a built artifact.
fn feature_tree(root: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let checkout = root.join("checkout");
    write(&checkout, "src/invoices.rs", INVOICES);
    write(&checkout, "src/ledger/mod.rs", LEDGER);
    write(&checkout, "src/outsider.rs", OUTSIDER);
    let artifact = root.join("built/billing.wasm");
    write(root, "built/billing.wasm", "\0asm");
    (checkout, artifact)
}

fn generator(
    project: &Path,
    fetcher: Arc<FakeFetcher>,
    builder: Arc<ScriptedBuilder>,
) -> DescriptorGenerator {
    DescriptorGenerator::new(
        GeneratorSettings::new(project),
        SourceScanner::new(SourceDialect::rust().unwrap()),
        fetcher,
        builder,
    )
}

#[tokio::test]
async fn generates_descriptor_readable_by_runtime() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("host");
    let (checkout, artifact) = feature_tree(dir.path());
    let fetcher = Arc::new(FakeFetcher::new().with_workspace("https://example/billing.git", &checkout));
    let builder = Arc::new(ScriptedBuilder::succeeding(&artifact));
    let generator = generator(&project, Arc::clone(&fetcher), Arc::clone(&builder));

    let report = generator
        .generate(
            &mut GenerationContext::new(),
            &[test_feature("https://example/billing.git", &["a.billing"])],
        )
        .await;

    let GenerationOutcome::Generated { descriptor, written } = &report.features[0].outcome else {
        panic!("unexpected outcome: {:?}", report.features[0].outcome);
    };
    assert_eq!(written.type_name, "generated.BillingDescriptor");
    assert_eq!(
        descriptor.exposed_types.iter().collect::<Vec<_>>(),
        ["a.billing.Invoices", "a.billing.ledger.Ledger"]
    );
    assert_eq!(descriptor.packages.iter().collect::<Vec<_>>(), ["a.billing"]);

    let location = descriptor.artifact().unwrap();
    assert!(location.starts_with("target/featurelink/features/Billing-"));
    assert!(location.ends_with(".wasm"));
    assert_eq!(std::fs::read(project.join(location)).unwrap(), b"\0asm");

    let generated = project.join("target/featurelink/generated");
    assert_eq!(
        std::fs::read(generated.join("a/billing/Invoices.rs")).unwrap(),
        INVOICES.as_bytes()
    );
    assert_eq!(
        std::fs::read(generated.join("a/billing/ledger/Ledger.rs")).unwrap(),
        LEDGER.as_bytes()
    );
    assert!(!generated.join("a/billingx").exists());

    let metadata = MetadataDirectory::new(project.join("target/featurelink/metadata"));
    let read = metadata.lookup("generated.BillingDescriptor").unwrap().unwrap();
    assert_eq!(&read, descriptor);
    assert_eq!(builder.calls()[0].1, std::time::Duration::from_secs(600));
}

#[tokio::test]
async fn markers_select_sources_without_packages() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("host");
    let (checkout, _) = feature_tree(dir.path());
    let generator = generator(
        &project,
        Arc::new(FakeFetcher::new().with_workspace("https://example/billing.git", &checkout)),
        Arc::new(ScriptedBuilder::failing()),
    );

    let report = generator
        .generate(
            &mut GenerationContext::new(),
            &[test_feature("https://example/billing.git", &[])],
        )
        .await;

    let (written, descriptor) = report.descriptors().next().unwrap();
    assert_eq!(
        descriptor.exposed_types.iter().collect::<Vec<_>>(),
        ["a.billing.Invoices", "a.billingx.Outsider"]
    );
    assert_eq!(
        descriptor.packages.iter().collect::<Vec<_>>(),
        ["a.billing", "a.billingx"]
    );
    assert_eq!(written.type_name, "generated.InvoicesDescriptor");
    assert_eq!(descriptor.artifact_location, None);
}

#[tokio::test]
async fn repeated_source_is_processed_once() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let (checkout, artifact) = feature_tree(dir.path());
    let fetcher = Arc::new(FakeFetcher::new().with_workspace("https://example/billing.git", &checkout));
    let builder = Arc::new(ScriptedBuilder::succeeding(&artifact));
    let generator = generator(&dir.path().join("host"), Arc::clone(&fetcher), Arc::clone(&builder));
    let feature = test_feature("https://example/billing.git", &["a.billing"]);

    let mut ctx = GenerationContext::new();
    let first = generator.generate(&mut ctx, std::slice::from_ref(&feature)).await;
    let second = generator.generate(&mut ctx, &[feature]).await;

    assert!(matches!(
        first.features[0].outcome,
        GenerationOutcome::Generated { .. }
    ));
    assert!(matches!(
        second.features[0].outcome,
        GenerationOutcome::DuplicateSource
    ));
    assert_eq!(fetcher.calls().len(), 1);
    assert_eq!(builder.calls().len(), 1);
}

#[tokio::test]
async fn colliding_feature_names_keep_the_first() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let (checkout, artifact) = feature_tree(dir.path());
    let fetcher = Arc::new(
        FakeFetcher::new()
            .with_workspace("https://example/billing.git", &checkout)
            .with_workspace("https://mirror/billing-fork.git", &checkout),
    );
    let builder = Arc::new(ScriptedBuilder::succeeding(&artifact));
    let generator = generator(&dir.path().join("host"), Arc::clone(&fetcher), Arc::clone(&builder));

    let report = generator
        .generate(
            &mut GenerationContext::new(),
            &[
                test_feature("https://example/billing.git", &["a.billing"]),
                test_feature("https://mirror/billing-fork.git", &["x.billing"]),
            ],
        )
        .await;

    assert!(matches!(
        report.features[0].outcome,
        GenerationOutcome::Generated { .. }
    ));
    assert!(matches!(
        &report.features[1].outcome,
        GenerationOutcome::DuplicateName { type_name } if type_name == "generated.BillingDescriptor"
    ));
    assert_eq!(fetcher.calls().len(), 2);
    assert_eq!(builder.calls().len(), 1);
}

#[tokio::test]
async fn fetch_failure_does_not_stop_the_run() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let (checkout, artifact) = feature_tree(dir.path());
    let generator = generator(
        &dir.path().join("host"),
        Arc::new(FakeFetcher::new().with_workspace("https://example/billing.git", &checkout)),
        Arc::new(ScriptedBuilder::succeeding(&artifact)),
    );

    let report = generator
        .generate(
            &mut GenerationContext::new(),
            &[
                FeatureSpec::new("https://example/unknown.git"),
                test_feature("https://example/billing.git", &["a.billing"]),
            ],
        )
        .await;

    assert_eq!(report.failed(), 1);
    assert_eq!(report.descriptors().count(), 1);
}
