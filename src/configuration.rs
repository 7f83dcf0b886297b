//! Job configuration.
//!
//! [`SamplingOptions`] controls the sampling cadence of a job and threads the
//! progress callback and cancellation token through the controller without
//! polluting every function signature. [`UploadOptions`] configures the HTTP
//! client used by [`InferenceClient`](crate::InferenceClient).
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use framesift::SamplingOptions;
//!
//! let options = SamplingOptions::new()
//!     .with_upload_every(5)
//!     .with_quality(0.9)
//!     .with_yield_delay(Duration::ZERO);
//!
//! assert!(options.validate().is_ok());
//! assert!((options.sample_spacing_seconds() - 1.0 / 3.0).abs() < 1e-9);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::FrameSiftError;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Nominal frame rate assumed when converting a frame interval to seconds.
pub const NOMINAL_FRAMES_PER_SECOND: f64 = 30.0;

/// Default number of nominal frames between two consecutive samples.
pub const DEFAULT_SAMPLE_INTERVAL_FRAMES: u32 = 10;

/// Default upload cadence: every 20th sample is transmitted.
pub const DEFAULT_UPLOAD_EVERY: u64 = 20;

/// Default lossy encoding quality, in `(0.0, 1.0]`.
pub const DEFAULT_QUALITY: f32 = 0.8;

/// Default cooperative pause between two sample iterations.
pub const DEFAULT_YIELD_DELAY: Duration = Duration::from_millis(10);

/// Sampling settings for one job.
#[derive(Clone)]
pub struct SamplingOptions {
    pub(crate) sample_interval_frames: u32,
    pub(crate) nominal_frames_per_second: f64,
    pub(crate) upload_every: u64,
    pub(crate) quality: f32,
    pub(crate) yield_delay: Duration,
    pub(crate) seek_timeout: Option<Duration>,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: CancellationToken,
}

impl Debug for SamplingOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SamplingOptions")
            .field("sample_interval_frames", &self.sample_interval_frames)
            .field("nominal_frames_per_second", &self.nominal_frames_per_second)
            .field("upload_every", &self.upload_every)
            .field("quality", &self.quality)
            .field("yield_delay", &self.yield_delay)
            .field("seek_timeout", &self.seek_timeout)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplingOptions {
    /// Create options with the default cadence.
    ///
    /// Defaults: a sample every 10 nominal frames at 30 fps, an upload every
    /// 20th sample, quality 0.8, a 10 ms yield between samples, no seek
    /// timeout, no progress callback.
    pub fn new() -> Self {
        Self {
            sample_interval_frames: DEFAULT_SAMPLE_INTERVAL_FRAMES,
            nominal_frames_per_second: NOMINAL_FRAMES_PER_SECOND,
            upload_every: DEFAULT_UPLOAD_EVERY,
            quality: DEFAULT_QUALITY,
            yield_delay: DEFAULT_YIELD_DELAY,
            seek_timeout: None,
            progress: Arc::new(NoOpProgress),
            cancellation: CancellationToken::new(),
        }
    }

    /// Set the number of nominal frames between two samples.
    #[must_use]
    pub fn with_sample_interval_frames(mut self, frames: u32) -> Self {
        self.sample_interval_frames = frames;
        self
    }

    /// Override the nominal frame rate used to space samples in time.
    #[must_use]
    pub fn with_nominal_frames_per_second(mut self, fps: f64) -> Self {
        self.nominal_frames_per_second = fps;
        self
    }

    /// Transmit every `n`th sample upstream.
    #[must_use]
    pub fn with_upload_every(mut self, n: u64) -> Self {
        self.upload_every = n;
        self
    }

    /// Set the lossy encoding quality in `(0.0, 1.0]`.
    #[must_use]
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    /// Set the pause inserted between two sample iterations.
    #[must_use]
    pub fn with_yield_delay(mut self, delay: Duration) -> Self {
        self.yield_delay = delay;
        self
    }

    /// Fail the job when a single seek takes longer than `timeout`.
    #[must_use]
    pub fn with_seek_timeout(mut self, timeout: Duration) -> Self {
        self.seek_timeout = Some(timeout);
        self
    }

    /// Attach a progress callback, invoked once per sample and on every
    /// state transition.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Also stop the job when `token` is cancelled.
    ///
    /// Clones of these options share the token, so once it is cancelled
    /// every job started from them stops at its first sample.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Number of nominal frames between two samples.
    pub fn sample_interval_frames(&self) -> u32 {
        self.sample_interval_frames
    }

    /// Upload cadence.
    pub fn upload_every(&self) -> u64 {
        self.upload_every
    }

    /// Lossy encoding quality.
    pub fn quality(&self) -> f32 {
        self.quality
    }

    /// Time between two consecutive samples, in seconds.
    pub fn sample_spacing_seconds(&self) -> f64 {
        self.sample_interval_frames as f64 / self.nominal_frames_per_second
    }

    /// Check that the options describe a terminating, well-formed job.
    ///
    /// # Errors
    ///
    /// Returns [`FrameSiftError::InvalidConfiguration`] for a zero interval or
    /// cadence, a non-positive frame rate, or a quality outside `(0, 1]`.
    pub fn validate(&self) -> Result<(), FrameSiftError> {
        if self.sample_interval_frames == 0 {
            return Err(FrameSiftError::InvalidConfiguration(
                "sample interval must be greater than zero".to_string(),
            ));
        }
        if !(self.nominal_frames_per_second.is_finite() && self.nominal_frames_per_second > 0.0) {
            return Err(FrameSiftError::InvalidConfiguration(format!(
                "nominal frame rate must be positive, got {}",
                self.nominal_frames_per_second
            )));
        }
        if self.upload_every == 0 {
            return Err(FrameSiftError::InvalidConfiguration(
                "upload cadence must be greater than zero".to_string(),
            ));
        }
        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(FrameSiftError::InvalidConfiguration(format!(
                "quality must be in (0, 1], got {}",
                self.quality
            )));
        }
        Ok(())
    }
}

/// Default HTTP request timeout for a single frame upload.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings for the HTTP inference client.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub(crate) endpoint: Url,
    pub(crate) timeout: Duration,
    pub(crate) auth_token: Option<String>,
}

impl UploadOptions {
    /// Create options for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameSiftError::InvalidConfiguration`] if `endpoint` is not
    /// an absolute `http`/`https` URL.
    pub fn new(endpoint: &str) -> Result<Self, FrameSiftError> {
        let endpoint = Url::parse(endpoint).map_err(|error| {
            FrameSiftError::InvalidConfiguration(format!("invalid endpoint {endpoint}: {error}"))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(FrameSiftError::InvalidConfiguration(format!(
                "endpoint must use http or https, got {}",
                endpoint.scheme()
            )));
        }

        Ok(Self {
            endpoint,
            timeout: DEFAULT_UPLOAD_TIMEOUT,
            auth_token: None,
        })
    }

    /// Set the per-request timeout. A timed-out upload is an ordinary
    /// per-frame failure.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send `Authorization: Bearer <token>` with every upload.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// The endpoint frames are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}
