//! Sharing a feature's compiled output with the host directly.

use std::collections::BTreeSet;
use std::path::Path;

use featurelink_core::names::package_allowed;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Package of a module at `relative` (`a/b/Service.wasm` is in `a.b`).
fn package_of(relative: &Path) -> Option<String> {
    let parent = relative.parent()?;
    let segments: Vec<_> = parent
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!segments.is_empty()).then(|| segments.join("."))
}

/// Copy compiled units with `extension` from `from` into `to`, keeping their
/// package layout.
///
/// Only units whose package matches one of `packages` are copied; an empty
/// filter copies everything. Returns `None` when the fast path is
/// unavailable: `from` does not exist or `to` cannot be created. Otherwise
/// returns the packages of the units copied. Individual copy failures are
/// logged and skipped.
pub fn copy_compiled_output<S: AsRef<str>>(
    from: &Path,
    to: &Path,
    extension: &str,
    packages: &[S],
) -> Option<BTreeSet<String>> {
    if !from.is_dir() {
        debug!(dir = %from.display(), "No compiled output, fast path unavailable");
        return None;
    }
    if let Err(e) = std::fs::create_dir_all(to) {
        warn!(dir = %to.display(), error = %e, "Cannot create host compiled output, fast path unavailable");
        return None;
    }

    let extension = extension.trim_start_matches('.');
    let mut copied = BTreeSet::new();
    for entry in WalkDir::new(from).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %from.display(), error = %e, "Skipping unreadable compiled output entry");
                continue;
            },
        };
        if !entry.file_type().is_file()
            || entry.path().extension().is_none_or(|ext| ext != extension)
        {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let package = package_of(relative);
        if !packages.is_empty() && !package_allowed(package.as_deref(), packages) {
            continue;
        }

        let target = to.join(relative);
        let result = target
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| std::fs::copy(entry.path(), &target));
        match result {
            Ok(_) => {
                debug!(unit = %relative.display(), "Copied compiled unit");
                if let Some(package) = package {
                    copied.insert(package);
                }
            },
            Err(e) => warn!(unit = %entry.path().display(), error = %e, "Failed to copy compiled unit"),
        }
    }
    Some(copied)
}
