//! Progress reporting and cancellation support.
//!
//! Every job publishes [`JobProgress`] snapshots: on each state transition
//! and after every processed sample. Callers observe them either through the
//! watch channel held by [`JobHandle`](crate::JobHandle) or by attaching a
//! push-style [`ProgressCallback`] to
//! [`SamplingOptions`](crate::SamplingOptions). Cancellation is cooperative:
//! the sampling loop polls a [`CancellationToken`] once per iteration.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use framesift::{CancellationToken, JobProgress, ProgressCallback, SamplingOptions};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, progress: &JobProgress) {
//!         println!(
//!             "[{:?}] {}/{} ({}%)",
//!             progress.state,
//!             progress.samples_processed,
//!             progress.total_estimated_samples,
//!             progress.progress_percent,
//!         );
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = SamplingOptions::new()
//!     .with_progress(Arc::new(PrintProgress))
//!     .with_cancellation(token.clone());
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use crate::job::JobState;

/// A snapshot of one job's progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobProgress {
    /// Current lifecycle state.
    pub state: JobState,
    /// Samples captured so far.
    pub samples_processed: u64,
    /// Progress denominator, known once metadata has loaded.
    pub total_estimated_samples: u64,
    /// Completion percentage in `[0, 100]`, based on the last sample time.
    pub progress_percent: u8,
    /// Timestamp of the most recently captured sample.
    pub current_timestamp: Option<Duration>,
    /// Frames handed to the upload dispatcher so far.
    pub uploads_dispatched: u64,
    /// Wall-clock time since the job started.
    pub elapsed: Duration,
}

impl JobProgress {
    pub(crate) fn idle() -> Self {
        Self {
            state: JobState::Idle,
            samples_processed: 0,
            total_estimated_samples: 0,
            progress_percent: 0,
            current_timestamp: None,
            uploads_dispatched: 0,
            elapsed: Duration::ZERO,
        }
    }
}

/// Trait for receiving progress updates while a job runs.
///
/// Implementations must be [`Send`] and [`Sync`] because callbacks are invoked
/// from the job's worker task.
///
/// Progress callbacks are **infallible**: they observe but cannot halt the
/// job. Use [`CancellationToken`] for cooperative cancellation.
pub trait ProgressCallback: Send + Sync {
    /// Called once per processed sample and on every state transition.
    fn on_progress(&self, progress: &JobProgress);
}

/// Discards all progress notifications. Used when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _progress: &JobProgress) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone this token and share it between threads; call
/// [`cancel`](CancellationToken::cancel) from anywhere to request
/// cancellation. The sampling loop checks
/// [`is_cancelled`](CancellationToken::is_cancelled) before each seek, so an
/// in-flight seek or capture always runs to completion.
///
/// # Example
///
/// ```
/// use framesift::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.clone().cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    ///
    /// All clones of this token observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
