//! Run context for correlating the log lines of one command or startup.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use tracing::instrument::Instrumented;
use uuid::Uuid;

/// Identifies one integration or generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// What the run does, e.g. `"generate"`.
    pub operation: String,
    /// Extra fields shown in the run's completion line.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RunContext {
    /// Start a run of `operation` now.
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            operation: operation.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Add metadata.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Milliseconds since the run started.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    /// First eight characters of the run id.
    #[must_use]
    pub fn short_id(&self) -> String {
        self.run_id.simple().to_string().chars().take(8).collect()
    }

    /// A span carrying the run id and operation.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "run",
            run_id = %self.short_id(),
            operation = %self.operation,
        )
    }

    /// Run `future` inside this run's span. The span is entered only while
    /// the future is polled.
    pub fn instrument<F: std::future::Future>(&self, future: F) -> Instrumented<F> {
        future.instrument(self.span())
    }

    /// Log the run's completion line.
    pub fn complete(&self) {
        let _span = self.span().entered();
        tracing::info!(
            elapsed_ms = self.elapsed_ms(),
            metadata = ?self.metadata,
            "Run completed"
        );
    }
}

/// Keeps the run's span entered and logs completion on drop.
///
/// For synchronous work only; async runs use [`RunContext::instrument`].
pub struct RunGuard {
    context: RunContext,
    _span: tracing::span::EnteredSpan,
}

impl RunGuard {
    /// Enter `context`'s span.
    #[must_use]
    pub fn new(context: RunContext) -> Self {
        let span = context.span().entered();
        tracing::debug!(started_at = %context.started_at, "Run started");
        Self {
            context,
            _span: span,
        }
    }

    /// The run's context.
    #[must_use]
    pub fn context(&self) -> &RunContext {
        &self.context
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        tracing::info!(
            elapsed_ms = self.context.elapsed_ms(),
            metadata = ?self.context.metadata,
            "Run completed"
        );
    }
}
