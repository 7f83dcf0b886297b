//! FFmpeg decoder integration tests.
//!
//! Fixture-backed tests require files from `tests/fixtures/generate_fixtures.sh`
//! and return early when they are absent.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use framesift::{
    DirectorySink, FfmpegDecoder, FfmpegLogLevel, FrameCapturer, FrameSiftError, JobController,
    JobState, JpegEncoder, MediaDecoder, SamplingOptions, StaticIdentity, UploadDispatcher,
};

use common::test_user;

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";
const SAMPLE_AUDIO_ONLY: &str = "tests/fixtures/sample_audio_only.m4a";

fn quiet_ffmpeg() {
    framesift::set_ffmpeg_log_level(FfmpegLogLevel::Quiet);
}

// ── Load errors ────────────────────────────────────────────────────

#[test]
fn load_nonexistent_file() {
    quiet_ffmpeg();
    let mut decoder = FfmpegDecoder::new("this_file_does_not_exist.mp4");
    let error = decoder.load().unwrap_err();

    assert!(matches!(error, FrameSiftError::Decode { .. }));
    let error_message = error.to_string();
    assert!(
        error_message.contains("Failed to load video"),
        "Error message should mention the load failure: {error_message}",
    );
}

#[test]
fn load_invalid_file() {
    quiet_ffmpeg();
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let invalid_file_path = temporary_directory.path().join("invalid.mp4");
    std::fs::write(&invalid_file_path, b"this is not a media file")
        .expect("Failed to write invalid file");

    let mut decoder = FfmpegDecoder::new(&invalid_file_path);
    assert!(decoder.load().is_err(), "Expected error for invalid media file");
}

#[test]
fn load_audio_only_file() {
    if !Path::new(SAMPLE_AUDIO_ONLY).exists() {
        return;
    }
    quiet_ffmpeg();

    let mut decoder = FfmpegDecoder::new(SAMPLE_AUDIO_ONLY);
    assert!(matches!(
        decoder.load().unwrap_err(),
        FrameSiftError::NoVideoStream
    ));
}

// ── Seek and capture ───────────────────────────────────────────────

#[test]
fn load_reports_metadata() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }
    quiet_ffmpeg();

    let mut decoder = FfmpegDecoder::new(SAMPLE_VIDEO);
    let info = decoder.load().expect("Failed to load test video");
    assert_eq!(info.width, 640);
    assert_eq!(info.height, 360);
    assert!((info.frames_per_second - 30.0).abs() < 0.5);
    assert!((info.duration_seconds() - 5.0).abs() < 0.2);

    // Loading twice reuses the open demuxer.
    assert_eq!(decoder.load().unwrap(), info);
}

#[test]
fn seek_and_capture_forward_and_back() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }
    quiet_ffmpeg();

    let mut decoder = FfmpegDecoder::new(SAMPLE_VIDEO);
    let info = decoder.load().expect("Failed to load test video");

    for timestamp in [0.0, 1.0 / 3.0, 2.0, 4.5, 1.0] {
        decoder
            .seek(Duration::from_secs_f64(timestamp))
            .unwrap_or_else(|error| panic!("seek to {timestamp}s failed: {error}"));
        let pixels = decoder.capture().expect("capture failed");
        assert_eq!(pixels.width(), info.width);
        assert_eq!(pixels.height(), info.height);
        assert_eq!(pixels.as_bytes().len(), 640 * 360 * 3);
    }
}

#[test]
fn revisiting_a_timestamp_captures_identical_pixels() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }
    quiet_ffmpeg();

    let mut decoder = FfmpegDecoder::new(SAMPLE_VIDEO);
    decoder.load().expect("Failed to load test video");

    decoder.seek(Duration::from_secs(1)).unwrap();
    let first = decoder.capture().unwrap().clone();
    decoder.seek(Duration::from_secs(3)).unwrap();
    let later = decoder.capture().unwrap().clone();
    decoder.seek(Duration::from_secs(1)).unwrap();
    let again = decoder.capture().unwrap().clone();

    assert_eq!(later.as_bytes().len(), first.as_bytes().len());
    assert_eq!(again, first);
}

#[test]
fn seek_beyond_end_fails() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }
    quiet_ffmpeg();

    let mut decoder = FfmpegDecoder::new(SAMPLE_VIDEO);
    decoder.load().expect("Failed to load test video");
    let error = decoder.seek(Duration::from_secs(3600)).unwrap_err();
    assert!(matches!(error, FrameSiftError::Seek { .. }));

    // A failed seek leaves nothing to capture.
    assert!(matches!(
        decoder.capture().unwrap_err(),
        FrameSiftError::Capture(_)
    ));
}

// ── End to end ─────────────────────────────────────────────────────

#[tokio::test]
async fn sample_video_job_writes_every_fifth_frame() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }
    quiet_ffmpeg();

    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let sink = DirectorySink::new(directory.path()).expect("Failed to create sink");
    let dispatcher = UploadDispatcher::spawn(Arc::new(sink), Arc::new(JpegEncoder));
    let controller =
        JobController::new(Arc::new(StaticIdentity::new(test_user())), dispatcher.handle());

    let options = SamplingOptions::new()
        .with_upload_every(5)
        .with_yield_delay(Duration::ZERO);
    let report = controller
        .start_file(SAMPLE_VIDEO, options)
        .expect("Failed to start job")
        .wait()
        .await;

    assert_eq!(report.state, JobState::Completed, "{}", report.summary());
    assert!(report.samples_processed >= 14);
    assert_eq!(report.uploads_dispatched, report.samples_processed / 5);

    drop(controller);
    let stats = dispatcher.shutdown().await;
    assert_eq!(stats.succeeded, report.uploads_dispatched);

    for frame_number in [5, 10] {
        let path = directory.path().join(format!("frame_{frame_number}.jpg"));
        let image = image::open(&path).expect("uploaded frame missing");
        assert_eq!(image.width(), 640);
    }
}
