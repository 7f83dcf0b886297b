//! Video decoding and frame capture.
//!
//! [`MediaDecoder`] and [`FrameCapturer`] are the two seams the sampling loop
//! drives. [`FfmpegDecoder`] implements both on top of FFmpeg: it opens the
//! file, locates the best video stream, and on every [`seek`](MediaDecoder::seek)
//! decodes forward until the frame at the requested timestamp is ready.
//! Dropping the decoder releases the demuxer and codec contexts.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use framesift::{FfmpegDecoder, FrameCapturer, FrameSiftError, MediaDecoder};
//!
//! let mut decoder = FfmpegDecoder::new("input.mp4");
//! let info = decoder.load()?;
//! println!("{}x{}, {:?}", info.width, info.height, info.duration);
//!
//! decoder.seek(Duration::from_secs(1))?;
//! let pixels = decoder.capture()?;
//! assert_eq!(pixels.width(), info.width);
//! # Ok::<(), FrameSiftError>(())
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    mem,
    path::{Path, PathBuf},
    time::Duration,
};

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};

use crate::{configuration::NOMINAL_FRAMES_PER_SECOND, error::FrameSiftError, frame::PixelBuffer};

/// Forward gaps larger than this are served by a container seek instead of
/// decoding through every intermediate frame.
const RESEEK_DISTANCE_SECONDS: f64 = 5.0;

/// Consecutive unreadable packets tolerated before a seek is abandoned.
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 64;

/// Metadata reported once a video has loaded.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct VideoInfo {
    /// Total duration of the video. Zero when the container does not know it.
    pub duration: Duration,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Average frame rate of the stream (may be approximate for VFR content).
    pub frames_per_second: f64,
    /// Codec name (e.g. `"h264"`).
    pub codec: String,
}

impl VideoInfo {
    /// Duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

/// Seek-driven access to one video resource.
///
/// Seeking mutates the decoder position and takes `&mut self`, so seeks are
/// serialized by construction.
pub trait MediaDecoder {
    /// Open the resource and read its metadata.
    ///
    /// # Errors
    ///
    /// Returns [`FrameSiftError::Decode`] or [`FrameSiftError::NoVideoStream`]
    /// if the resource cannot be parsed as a playable video.
    fn load(&mut self) -> Result<VideoInfo, FrameSiftError>;

    /// Block until the frame at `timestamp` (or the nearest representable
    /// frame) is ready to be captured.
    ///
    /// # Errors
    ///
    /// Returns [`FrameSiftError::Seek`] if the timestamp is out of range or the
    /// resource errors during the seek.
    fn seek(&mut self, timestamp: Duration) -> Result<(), FrameSiftError>;
}

/// Rasterizes the decoder's current frame.
pub trait FrameCapturer {
    /// Read the current frame into a buffer sized to the reported video
    /// dimensions. The buffer is reused by the next capture.
    ///
    /// # Errors
    ///
    /// Returns [`FrameSiftError::Capture`] when no frame is ready, i.e. when
    /// the previous seek did not succeed.
    fn capture(&mut self) -> Result<&PixelBuffer, FrameSiftError>;
}

/// A video resource a job can own: decodable, capturable, and movable onto
/// the blocking worker pool.
pub trait VideoSource: MediaDecoder + FrameCapturer + Send {}

impl<T: MediaDecoder + FrameCapturer + Send> VideoSource for T {}

/// FFmpeg-backed [`MediaDecoder`] and [`FrameCapturer`].
///
/// Created with [`FfmpegDecoder::new`]; nothing is opened until
/// [`load`](MediaDecoder::load).
pub struct FfmpegDecoder {
    path: PathBuf,
    opened: Option<OpenedVideo>,
}

struct OpenedVideo {
    input: Input,
    decoder: VideoDecoder,
    stream_index: usize,
    time_base: Rational,
    info: VideoInfo,
    /// Most recently decoded frame; `position` is its timestamp.
    current: VideoFrame,
    scratch: VideoFrame,
    scaled: VideoFrame,
    /// Reused across captures; rebuilt when the decoded format or size changes.
    scaler: Option<ScalingContext>,
    position: Option<f64>,
    last_target: Option<f64>,
    eof_sent: bool,
    frame_ready: bool,
    pixels: PixelBuffer,
}

impl Debug for FfmpegDecoder {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FfmpegDecoder")
            .field("path", &self.path)
            .field("info", &self.opened.as_ref().map(|opened| &opened.info))
            .finish_non_exhaustive()
    }
}

impl FfmpegDecoder {
    /// Prepare a decoder for the video at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            opened: None,
        }
    }

    /// Path of the underlying video.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode_error(&self, reason: impl Into<String>) -> FrameSiftError {
        FrameSiftError::Decode {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

impl MediaDecoder for FfmpegDecoder {
    fn load(&mut self) -> Result<VideoInfo, FrameSiftError> {
        if let Some(opened) = &self.opened {
            return Ok(opened.info.clone());
        }

        log::debug!("Opening video: {}", self.path.display());

        ffmpeg_next::init()
            .map_err(|error| self.decode_error(format!("FFmpeg initialisation failed: {error}")))?;

        let input = ffmpeg_next::format::input(&self.path)
            .map_err(|error| self.decode_error(error.to_string()))?;

        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or(FrameSiftError::NoVideoStream)?;
        let stream_index = stream.index();
        let time_base = stream.time_base();

        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|error| {
                self.decode_error(format!(
                    "Failed to create video decoder for stream {stream_index}: {error}"
                ))
            })?;

        let frame_rate = stream.avg_frame_rate();
        let frames_per_second = if frame_rate.denominator() != 0 && frame_rate.numerator() > 0 {
            frame_rate.numerator() as f64 / frame_rate.denominator() as f64
        } else {
            let rate = stream.rate();
            if rate.denominator() != 0 && rate.numerator() > 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                0.0
            }
        };

        let container_micros = input.duration();
        let duration = if container_micros > 0 {
            Duration::from_micros(container_micros as u64)
        } else if stream.duration() > 0 && time_base.denominator() != 0 {
            Duration::from_secs_f64(pts_to_seconds(stream.duration(), time_base))
        } else {
            Duration::ZERO
        };

        let codec = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let info = VideoInfo {
            duration,
            width: decoder.width(),
            height: decoder.height(),
            frames_per_second,
            codec,
        };

        if info.width == 0 || info.height == 0 {
            return Err(self.decode_error("video stream reports zero dimensions"));
        }

        log::info!(
            "Loaded video: {} ({}x{}, {:.2} fps, duration={:.2}s, codec={})",
            self.path.display(),
            info.width,
            info.height,
            info.frames_per_second,
            info.duration_seconds(),
            info.codec,
        );

        self.opened = Some(OpenedVideo {
            input,
            decoder,
            stream_index,
            time_base,
            pixels: PixelBuffer::black(info.width, info.height),
            info: info.clone(),
            current: VideoFrame::empty(),
            scratch: VideoFrame::empty(),
            scaled: VideoFrame::empty(),
            scaler: None,
            position: None,
            last_target: None,
            eof_sent: false,
            frame_ready: false,
        });

        Ok(info)
    }

    fn seek(&mut self, timestamp: Duration) -> Result<(), FrameSiftError> {
        match self.opened.as_mut() {
            Some(opened) => opened.seek_to(timestamp),
            None => Err(FrameSiftError::Seek {
                timestamp,
                reason: "video has not been loaded".to_string(),
            }),
        }
    }
}

impl FrameCapturer for FfmpegDecoder {
    fn capture(&mut self) -> Result<&PixelBuffer, FrameSiftError> {
        let opened = self
            .opened
            .as_mut()
            .ok_or_else(|| FrameSiftError::Capture("video has not been loaded".to_string()))?;
        opened.rasterize()
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        if self.opened.is_some() {
            log::debug!("Released video: {}", self.path.display());
        }
    }
}

impl OpenedVideo {
    fn frame_tolerance(&self) -> f64 {
        let fps = if self.info.frames_per_second > 0.0 {
            self.info.frames_per_second
        } else {
            NOMINAL_FRAMES_PER_SECOND
        };
        0.5 / fps
    }

    fn seek_to(&mut self, timestamp: Duration) -> Result<(), FrameSiftError> {
        let target = timestamp.as_secs_f64();
        let duration = self.info.duration_seconds();
        self.frame_ready = false;

        if duration > 0.0 && target > duration {
            return Err(FrameSiftError::Seek {
                timestamp,
                reason: format!("beyond the end of the video ({duration:.3}s)"),
            });
        }

        let tolerance = self.frame_tolerance();
        let backwards = self.last_target.is_some_and(|last| target < last);
        let needs_container_seek = backwards
            || match self.position {
                None => true,
                Some(position) => target - position > RESEEK_DISTANCE_SECONDS,
            };
        self.last_target = Some(target);

        if needs_container_seek {
            // `Input::seek` without a stream index expects AV_TIME_BASE units.
            let micros = (target * 1_000_000.0) as i64;
            self.input
                .seek(micros, ..micros)
                .map_err(|error| FrameSiftError::Seek {
                    timestamp,
                    reason: error.to_string(),
                })?;
            self.decoder.flush();
            self.eof_sent = false;
            self.position = None;
            log::trace!("Container seek to {target:.3}s");
        }

        // Frames may be sparser than samples: the current frame is then the
        // nearest representable position.
        if self
            .position
            .is_some_and(|position| position + tolerance >= target)
        {
            self.frame_ready = true;
            return Ok(());
        }

        if self.decode_until(target, tolerance, timestamp)? {
            self.frame_ready = true;
            Ok(())
        } else {
            Err(FrameSiftError::Seek {
                timestamp,
                reason: "no decodable frame at or before this position".to_string(),
            })
        }
    }

    /// Decode forward until a frame at or after `target` is current.
    ///
    /// Returns `false` only if the stream ended without any decodable frame.
    /// At end of stream the last decoded frame stays current.
    fn decode_until(
        &mut self,
        target: f64,
        tolerance: f64,
        timestamp: Duration,
    ) -> Result<bool, FrameSiftError> {
        let seek_error = |error: FfmpegError| FrameSiftError::Seek {
            timestamp,
            reason: error.to_string(),
        };
        let mut read_errors = 0_u32;

        loop {
            if self.decoder.receive_frame(&mut self.scratch).is_ok() {
                mem::swap(&mut self.current, &mut self.scratch);
                let pts = self
                    .current
                    .timestamp()
                    .or_else(|| self.current.pts())
                    .unwrap_or(0);
                let seconds = pts_to_seconds(pts, self.time_base);
                self.position = Some(seconds);

                if seconds + tolerance >= target {
                    return Ok(true);
                }
                continue;
            }

            if self.eof_sent {
                return Ok(self.position.is_some());
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    read_errors = 0;
                    if packet.stream() == self.stream_index {
                        self.decoder.send_packet(&packet).map_err(seek_error)?;
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.decoder.send_eof().map_err(seek_error)?;
                    self.eof_sent = true;
                }
                Err(error) => {
                    read_errors += 1;
                    if read_errors > MAX_CONSECUTIVE_READ_ERRORS {
                        return Err(seek_error(error));
                    }
                    log::trace!("Skipping unreadable packet: {error}");
                }
            }
        }
    }

    fn rasterize(&mut self) -> Result<&PixelBuffer, FrameSiftError> {
        if !self.frame_ready {
            return Err(FrameSiftError::Capture(
                "no frame is ready; the last seek did not succeed".to_string(),
            ));
        }

        let width = self.info.width;
        let height = self.info.height;
        let source_format = self.current.format();
        let source_width = self.current.width();
        let source_height = self.current.height();

        let reusable = self.scaler.as_ref().is_some_and(|scaler| {
            let input = scaler.input();
            input.format == source_format
                && input.width == source_width
                && input.height == source_height
        });
        if !reusable {
            log::trace!("Building scaler for {source_format:?} {source_width}x{source_height}");
            let scaler = ScalingContext::get(
                source_format,
                source_width,
                source_height,
                Pixel::RGB24,
                width,
                height,
                ScalingFlags::BILINEAR,
            )
            .map_err(|error| FrameSiftError::Capture(error.to_string()))?;
            self.scaler = Some(scaler);
        }
        let Some(scaler) = self.scaler.as_mut() else {
            return Err(FrameSiftError::Capture("scaler unavailable".to_string()));
        };
        scaler
            .run(&self.current, &mut self.scaled)
            .map_err(|error| FrameSiftError::Capture(error.to_string()))?;

        let stride = self.scaled.stride(0);
        self.pixels
            .fill_from_plane(width, height, self.scaled.data(0), stride);
        Ok(&self.pixels)
    }
}

/// Rescale a PTS value from stream time base to seconds.
fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pts_rescaling() {
        let time_base = Rational::new(1, 90_000);
        assert!((pts_to_seconds(90_000, time_base) - 1.0).abs() < 1e-9);
        assert!((pts_to_seconds(30_000, time_base) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn seek_before_load_fails() {
        let mut decoder = FfmpegDecoder::new("never-opened.mp4");
        let error = decoder.seek(Duration::ZERO).unwrap_err();
        assert!(matches!(error, FrameSiftError::Seek { .. }));
        assert!(matches!(
            decoder.capture().unwrap_err(),
            FrameSiftError::Capture(_)
        ));
    }

    #[test]
    fn load_missing_file_is_decode_error() {
        let mut decoder = FfmpegDecoder::new("this_file_does_not_exist.mp4");
        let error = decoder.load().unwrap_err();
        assert!(matches!(error, FrameSiftError::Decode { .. }));
        assert!(error.to_string().contains("Failed to load video"));
    }
}
