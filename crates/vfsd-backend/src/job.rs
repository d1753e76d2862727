//! Per-operation context and flags.

use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Progress callback: `(bytes_done, bytes_total)`.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// State every outstanding operation carries.
#[derive(Clone, Default)]
pub struct JobContext {
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl JobContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn report_progress(&self, current: u64, total: u64) {
        if let Some(progress) = &self.progress {
            progress(current, total);
        }
    }
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Flags for query-info style verbs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryInfoFlags {
    /// Operate on a redirect reference itself instead of its target.
    pub nofollow_symlinks: bool,
}

/// Flags for move, copy and push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyFlags {
    pub overwrite: bool,
    pub backup: bool,
    pub nofollow_symlinks: bool,
    /// Do not let the caller fall back to copy+delete when a move fails.
    pub no_fallback_for_move: bool,
}

impl CopyFlags {
    pub fn overwrite() -> Self {
        Self {
            overwrite: true,
            ..Self::default()
        }
    }
}

/// Arguments of the replace verb.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceOptions {
    /// Entity tag the caller last saw; the write fails if it changed.
    pub etag: Option<String>,
    pub make_backup: bool,
}
