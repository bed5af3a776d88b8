//! `featurelink fetch`.

use anyhow::Result;
use featurelink_config::Config;
use featurelink_toolchain::{Fetcher, GitFetcher};

/// Fetch `source` at `branch` into the runtime cache and print the path.
pub(crate) async fn run_fetch(config: &Config, source: &str, branch: &str) -> Result<()> {
    let fetcher = GitFetcher::new(config.runtime.cache_dir());
    let workspace = fetcher.fetch(source, branch).await?;
    println!("{}", workspace.display());
    Ok(())
}
