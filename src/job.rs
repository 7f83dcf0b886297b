//! Job lifecycle state and the per-job context.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::progress::{CancellationToken, JobProgress, ProgressCallback};

/// Lifecycle of one video job.
///
/// `Idle → MetadataLoading → Sampling → Completed | Failed | Cancelled`.
/// `MetadataLoading` may also go straight to `Failed`. The three terminal
/// states are sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Created, not started.
    Idle,
    /// Opening the video and reading its metadata.
    MetadataLoading,
    /// The sampling loop is running.
    Sampling,
    /// The timeline was exhausted.
    Completed,
    /// Loading, seeking or capturing failed.
    Failed,
    /// The caller cancelled the job.
    Cancelled,
}

impl JobState {
    /// `true` for `Completed`, `Failed` and `Cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// Whether the state machine allows `self → next`.
    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Idle, JobState::MetadataLoading)
                | (JobState::MetadataLoading, JobState::Sampling)
                | (JobState::MetadataLoading, JobState::Failed)
                | (JobState::Sampling, JobState::Completed)
                | (JobState::Sampling, JobState::Failed)
                | (JobState::Sampling, JobState::Cancelled)
        )
    }
}

/// Counters, state and cancellation flag for one job.
///
/// Owned and mutated only by the job's worker; observers read published
/// [`JobProgress`] snapshots.
pub(crate) struct JobContext {
    progress: JobProgress,
    sender: watch::Sender<JobProgress>,
    callback: Arc<dyn ProgressCallback>,
    cancellation: CancellationToken,
    caller_cancellation: CancellationToken,
    started: Instant,
    duration_seconds: f64,
}

impl JobContext {
    pub(crate) fn new(
        sender: watch::Sender<JobProgress>,
        callback: Arc<dyn ProgressCallback>,
        cancellation: CancellationToken,
        caller_cancellation: CancellationToken,
    ) -> Self {
        Self {
            progress: JobProgress::idle(),
            sender,
            callback,
            cancellation,
            caller_cancellation,
            started: Instant::now(),
            duration_seconds: 0.0,
        }
    }

    pub(crate) fn snapshot(&self) -> JobProgress {
        self.progress
    }

    pub(crate) fn state(&self) -> JobState {
        self.progress.state
    }

    /// Either this job's own token or the one supplied in the options.
    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancellation.is_cancelled() || self.caller_cancellation.is_cancelled()
    }

    /// Move to `next` and publish. Invalid transitions are ignored.
    pub(crate) fn transition(&mut self, next: JobState) -> bool {
        let current = self.progress.state;
        if !current.can_transition_to(next) {
            log::warn!("Ignoring invalid job transition {current:?} -> {next:?}");
            return false;
        }
        log::debug!("Job state {current:?} -> {next:?}");
        self.progress.state = next;
        if next == JobState::Completed {
            self.progress.progress_percent = 100;
        }
        self.publish();
        true
    }

    /// Record loaded metadata. Set once; later calls are ignored.
    pub(crate) fn set_metadata(&mut self, duration_seconds: f64, total_estimated_samples: u64) {
        if self.progress.state != JobState::MetadataLoading {
            return;
        }
        self.duration_seconds = duration_seconds;
        self.progress.total_estimated_samples = total_estimated_samples;
    }

    /// Count one processed sample and publish.
    pub(crate) fn record_sample(&mut self, timestamp: Duration, percent: u8) {
        self.progress.samples_processed += 1;
        self.progress.current_timestamp = Some(timestamp);
        self.progress.progress_percent = self.progress.progress_percent.max(percent);
        self.publish();
    }

    pub(crate) fn record_dispatch(&mut self) {
        self.progress.uploads_dispatched += 1;
    }

    pub(crate) fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    fn publish(&mut self) {
        self.progress.elapsed = self.started.elapsed();
        // Nobody listening is fine: observers are optional.
        let _ = self.sender.send(self.progress);
        self.callback.on_progress(&self.progress);
    }
}
