//! The job control surface.
//!
//! [`JobController`] is the only entry point callers need: it resolves the
//! user, enforces a single active job, and spawns the job worker on the
//! current Tokio runtime. The returned [`JobHandle`] exposes the progress
//! stream, cancellation, and the final [`JobReport`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framesift::{
//!     InferenceClient, JobController, JpegEncoder, SamplingOptions, StaticIdentity,
//!     UploadDispatcher, UploadOptions, UserIdentity,
//! };
//!
//! # async fn example() -> Result<(), framesift::FrameSiftError> {
//! let client = InferenceClient::new(UploadOptions::new("http://localhost:8000/upload")?)?;
//! let dispatcher = UploadDispatcher::spawn(Arc::new(client), Arc::new(JpegEncoder));
//!
//! let identity = StaticIdentity::new(UserIdentity::new("user-1"));
//! let controller = JobController::new(Arc::new(identity), dispatcher.handle());
//!
//! let handle = controller.start_file("input.mp4", SamplingOptions::new())?;
//! let report = handle.wait().await;
//! println!("{:?}: {} samples", report.state, report.samples_processed);
//!
//! drop(controller);
//! let stats = dispatcher.shutdown().await;
//! println!("{} frames uploaded", stats.succeeded);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;

use crate::{
    configuration::SamplingOptions,
    decoder::{FfmpegDecoder, MediaDecoder, VideoInfo, VideoSource},
    dispatcher::DispatchHandle,
    error::FrameSiftError,
    identity::{self, IdentityProvider, UserIdentity},
    job::{JobContext, JobState},
    progress::{CancellationToken, JobProgress},
    scheduler::{SampleScheduler, SchedulerOutcome, StepFailure, estimated_sample_count, run_blocking},
};

/// Final outcome of one job.
#[derive(Debug)]
pub struct JobReport {
    /// Terminal state: `Completed`, `Failed` or `Cancelled`.
    pub state: JobState,
    /// Samples captured before the job ended.
    pub samples_processed: u64,
    /// Progress denominator computed at metadata load.
    pub total_estimated_samples: u64,
    /// Frames handed to the upload dispatcher.
    pub uploads_dispatched: u64,
    /// Wall-clock duration of the job.
    pub elapsed: Duration,
    /// Metadata, if the video loaded.
    pub info: Option<VideoInfo>,
    /// The cause of a `Failed` job.
    pub error: Option<FrameSiftError>,
}

impl JobReport {
    fn from_progress(
        progress: JobProgress,
        info: Option<VideoInfo>,
        error: Option<FrameSiftError>,
    ) -> Self {
        Self {
            state: progress.state,
            samples_processed: progress.samples_processed,
            total_estimated_samples: progress.total_estimated_samples,
            uploads_dispatched: progress.uploads_dispatched,
            elapsed: progress.elapsed,
            info,
            error,
        }
    }

    /// `true` when the timeline was exhausted.
    pub fn is_completed(&self) -> bool {
        self.state == JobState::Completed
    }

    /// One-line, human-readable summary for the terminal notification.
    pub fn summary(&self) -> String {
        match (&self.state, &self.error) {
            (JobState::Completed, _) => format!(
                "Analysed {} samples, {} frames sent for inference",
                self.samples_processed, self.uploads_dispatched
            ),
            (JobState::Cancelled, _) => format!(
                "Cancelled after {} of {} samples",
                self.samples_processed, self.total_estimated_samples
            ),
            (_, Some(error)) => error.to_string(),
            (state, None) => format!("Job ended in state {state:?}"),
        }
    }
}

/// Handle to a running job.
#[derive(Debug)]
pub struct JobHandle {
    receiver: watch::Receiver<JobProgress>,
    cancellation: CancellationToken,
    task: JoinHandle<JobReport>,
}

impl JobHandle {
    /// Latest published snapshot.
    pub fn progress(&self) -> JobProgress {
        *self.receiver.borrow()
    }

    /// A new receiver for the progress channel.
    pub fn subscribe(&self) -> watch::Receiver<JobProgress> {
        self.receiver.clone()
    }

    /// Progress as a [`Stream`](tokio_stream::Stream). Yields the current
    /// snapshot first, then every change until the job ends.
    pub fn progress_stream(&self) -> WatchStream<JobProgress> {
        WatchStream::new(self.receiver.clone())
    }

    /// Request cancellation. Takes effect at the next iteration boundary.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Wait for the job to reach a terminal state.
    pub async fn wait(self) -> JobReport {
        let last = *self.receiver.borrow();
        match self.task.await {
            Ok(report) => report,
            Err(error) => {
                log::error!("Job worker did not finish: {error}");
                let mut progress = last;
                progress.state = JobState::Failed;
                JobReport::from_progress(
                    progress,
                    None,
                    Some(FrameSiftError::WorkerPanicked(error.to_string())),
                )
            }
        }
    }
}

/// Shared between the controller and the job worker; cleared when the worker
/// ends by any path.
#[derive(Debug, Default)]
struct ActiveJob {
    running: AtomicBool,
    cancellation: Mutex<Option<CancellationToken>>,
}

struct ActiveGuard {
    slot: Arc<ActiveJob>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.slot
            .cancellation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.slot.running.store(false, Ordering::Release);
    }
}

/// Starts and cancels jobs. At most one job is active at a time.
pub struct JobController {
    identity: Arc<dyn IdentityProvider>,
    dispatch: DispatchHandle,
    active: Arc<ActiveJob>,
}

impl JobController {
    /// Create a controller that attributes uploads through `identity` and
    /// sends frames through `dispatch`.
    pub fn new(identity: Arc<dyn IdentityProvider>, dispatch: DispatchHandle) -> Self {
        Self {
            identity,
            dispatch,
            active: Arc::new(ActiveJob::default()),
        }
    }

    /// Start a job over the video file at `path`.
    ///
    /// # Errors
    ///
    /// See [`start_job`](JobController::start_job).
    pub fn start_file<P: AsRef<Path>>(
        &self,
        path: P,
        options: SamplingOptions,
    ) -> Result<JobHandle, FrameSiftError> {
        self.start_job(FfmpegDecoder::new(path), options)
    }

    /// Start a job over `source`.
    ///
    /// The source is owned by the job from here on and dropped exactly once,
    /// including when this call fails.
    ///
    /// # Errors
    ///
    /// - [`FrameSiftError::InvalidConfiguration`] if `options` do not validate
    ///   or no Tokio runtime is running.
    /// - [`FrameSiftError::AuthRequired`] if no user identity resolves.
    /// - [`FrameSiftError::JobAlreadyActive`] if a job is still running.
    pub fn start_job<S>(
        &self,
        source: S,
        options: SamplingOptions,
    ) -> Result<JobHandle, FrameSiftError>
    where
        S: VideoSource + 'static,
    {
        options.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|error| {
            FrameSiftError::InvalidConfiguration(format!("no Tokio runtime: {error}"))
        })?;

        let Some(user) = identity::resolve(self.identity.as_ref()) else {
            log::warn!("Refusing to start job: no signed-in user");
            return Err(FrameSiftError::AuthRequired);
        };

        if self
            .active
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("Refusing to start job: another job is active");
            return Err(FrameSiftError::JobAlreadyActive);
        }
        let guard = ActiveGuard {
            slot: self.active.clone(),
        };
        let cancellation = CancellationToken::new();
        *self
            .active
            .cancellation
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(cancellation.clone());

        let (sender, receiver) = watch::channel(JobProgress::idle());
        let context = JobContext::new(
            sender,
            options.progress.clone(),
            cancellation.clone(),
            options.cancellation.clone(),
        );

        let worker = JobWorker {
            options,
            user,
            dispatch: self.dispatch.clone(),
        };
        let task = runtime.spawn(worker.run(Box::new(source), context, guard));

        Ok(JobHandle {
            receiver,
            cancellation,
            task,
        })
    }

    /// Cancel the active job, if any. Returns whether a job was signalled.
    pub fn cancel_job(&self) -> bool {
        let slot = self
            .active
            .cancellation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(token) => {
                log::info!("Cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a job is currently running.
    pub fn is_active(&self) -> bool {
        self.active.running.load(Ordering::Acquire)
    }
}

struct JobWorker {
    options: SamplingOptions,
    user: UserIdentity,
    dispatch: DispatchHandle,
}

impl JobWorker {
    async fn run(
        self,
        source: Box<dyn VideoSource>,
        mut context: JobContext,
        _guard: ActiveGuard,
    ) -> JobReport {
        log::info!("Job started for user {}", self.user.id);
        context.transition(JobState::MetadataLoading);

        let loaded = run_blocking(source, None, |decoder| decoder.load()).await;
        let (source, info) = match loaded {
            Ok((source, Ok(info))) => (source, info),
            Ok((source, Err(error))) => {
                drop(source);
                return Self::fail(context, None, error);
            }
            Err(StepFailure::Panicked(reason)) => {
                return Self::fail(context, None, FrameSiftError::WorkerPanicked(reason));
            }
            Err(StepFailure::TimedOut(limit)) => {
                let reason = format!("metadata load exceeded {limit:?}");
                return Self::fail(context, None, FrameSiftError::WorkerPanicked(reason));
            }
        };

        let duration_seconds = info.duration_seconds();
        let total = estimated_sample_count(
            duration_seconds,
            self.options.sample_interval_frames,
            self.options.nominal_frames_per_second,
        );
        context.set_metadata(duration_seconds, total);
        context.transition(JobState::Sampling);
        log::info!(
            "Sampling {:.2}s of video every {:.3}s ({total} samples estimated)",
            duration_seconds,
            self.options.sample_spacing_seconds()
        );

        let scheduler = SampleScheduler::new(&self.options, &self.dispatch, &self.user);
        let outcome = scheduler.run(source, &mut context).await;

        match outcome {
            SchedulerOutcome::Completed => {
                context.transition(JobState::Completed);
                let report = JobReport::from_progress(context.snapshot(), Some(info), None);
                log::info!("Job completed: {}", report.summary());
                report
            }
            SchedulerOutcome::Cancelled => {
                context.transition(JobState::Cancelled);
                let report = JobReport::from_progress(context.snapshot(), Some(info), None);
                log::info!("Job cancelled: {}", report.summary());
                report
            }
            SchedulerOutcome::Failed(error) => Self::fail(context, Some(info), error),
        }
    }

    fn fail(mut context: JobContext, info: Option<VideoInfo>, error: FrameSiftError) -> JobReport {
        context.transition(JobState::Failed);
        log::error!("Job failed: {error}");
        JobReport::from_progress(context.snapshot(), info, Some(error))
    }
}
