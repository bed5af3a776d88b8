//! Teardown tracking for integrated features.
//!
//! Each successfully integrated feature leaves behind one nested registry and
//! at most one isolation unit. They are recorded here together and closed on
//! host shutdown: every registry first, then every unit. Errors are logged
//! and never escalate.
//!
//! While a feature is being integrated its resources live in a
//! [`FeatureScope`]. Dropping the scope without committing it closes them
//! straight away, so a feature that fails halfway leaves nothing open and
//! nothing tracked.

use std::sync::{Arc, Mutex};

use featurelink_core::Registry;
use tracing::{debug, info, warn};

use crate::isolation::IsolationUnit;

struct TrackedFeature {
    source: String,
    registry: Arc<Registry>,
    unit: Option<Arc<dyn IsolationUnit>>,
}

/// Append-only record of what to close on shutdown.
///
/// Safe to shut down from a different thread than the one that integrated.
#[derive(Default)]
pub struct TeardownTracker {
    features: Mutex<Vec<TrackedFeature>>,
}

impl std::fmt::Debug for TeardownTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeardownTracker")
            .field("tracked", &self.len())
            .finish()
    }
}

impl TeardownTracker {
    /// An empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&self, feature: TrackedFeature) {
        match self.features.lock() {
            Ok(mut features) => features.push(feature),
            Err(_) => {
                warn!(feature = %feature.source, "Teardown tracker poisoned, closing feature now");
                close_all(vec![feature]);
            },
        }
    }

    /// Number of tracked features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every tracked registry, then every tracked isolation unit.
    ///
    /// Idempotent: the tracker is emptied.
    pub fn shutdown(&self) {
        let features = match self.features.lock() {
            Ok(mut features) => std::mem::take(&mut *features),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        if features.is_empty() {
            return;
        }
        info!(count = features.len(), "Tearing down integrated features");
        close_all(features);
    }
}

fn close_all(features: Vec<TrackedFeature>) {
    for feature in &features {
        feature.registry.close();
        debug!(feature = %feature.source, registry = feature.registry.name(), "Closed feature registry");
    }
    for feature in &features {
        if let Some(unit) = &feature.unit
            && let Err(e) = unit.close()
        {
            warn!(
                feature = %feature.source,
                artifact = %unit.artifact().display(),
                error = %e,
                "Failed to close isolation unit"
            );
        }
    }
}

/// Resources of a feature that is still being integrated.
pub struct FeatureScope {
    source: String,
    registry: Option<Arc<Registry>>,
    unit: Option<Arc<dyn IsolationUnit>>,
}

impl FeatureScope {
    /// Start a scope for the feature fetched from `source`.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            registry: None,
            unit: None,
        }
    }

    /// Take ownership of the feature's isolation unit.
    pub fn adopt_unit(&mut self, unit: Arc<dyn IsolationUnit>) {
        self.unit = Some(unit);
    }

    /// Take ownership of the feature's nested registry.
    pub fn adopt_registry(&mut self, registry: Arc<Registry>) {
        self.registry = Some(registry);
    }

    /// Hand everything over to `tracker`.
    ///
    /// A scope without a registry has nothing worth tracking; its unit, if
    /// any, is closed instead.
    pub fn commit(mut self, tracker: &TeardownTracker) {
        let unit = self.unit.take();
        match self.registry.take() {
            Some(registry) => tracker.track(TrackedFeature {
                source: std::mem::take(&mut self.source),
                registry,
                unit,
            }),
            None => {
                if let Some(unit) = unit
                    && let Err(e) = unit.close()
                {
                    warn!(feature = %self.source, error = %e, "Failed to close isolation unit");
                }
            },
        }
    }
}

impl Drop for FeatureScope {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.take() {
            registry.close();
        }
        if let Some(unit) = self.unit.take() {
            debug!(feature = %self.source, "Releasing isolation unit of failed feature");
            if let Err(e) = unit.close() {
                warn!(feature = %self.source, error = %e, "Failed to close isolation unit");
            }
        }
    }
}
