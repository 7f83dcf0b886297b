use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use framesift::{
    DirectorySink, FfmpegDecoder, FfmpegLogLevel, FrameSink, InferenceClient, JobController,
    JobProgress, JobState, JpegEncoder, MediaDecoder, ProgressCallback, SamplingOptions,
    StaticIdentity, UploadDispatcher, UploadOptions, UserIdentity,
    configuration::{DEFAULT_QUALITY, DEFAULT_SAMPLE_INTERVAL_FRAMES, DEFAULT_UPLOAD_EVERY},
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing_subscriber::EnvFilter;

const CLI_AFTER_HELP: &str = "Examples:\n  framesift run input.mp4 --endpoint http://localhost:8000/upload --user-uuid 0b7c1e9a --progress\n  framesift run input.mp4 --user-uuid 0b7c1e9a --save-frames frames --every 5\n  framesift probe input.mp4 --json\n  framesift completions zsh > _framesift";

const EXIT_FAILED: i32 = 1;
const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Parser)]
#[command(
    name = "framesift",
    version,
    about = "Sample frames from a video and send them for inference",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long, global = true, default_value = "error")]
    ffmpeg_log_level: String,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sample a video and stream every Nth frame to the inference endpoint.
    #[command(
        about = "Run a sampling job",
        after_help = "Examples:\n  framesift run input.mp4 --endpoint http://localhost:8000/upload --user-uuid 0b7c1e9a\n  framesift run input.mp4 --user-uuid 0b7c1e9a --save-frames frames"
    )]
    Run {
        /// Input video path.
        input: PathBuf,

        /// Inference endpoint receiving multipart uploads.
        #[arg(long, env = "FRAMESIFT_ENDPOINT")]
        endpoint: Option<String>,

        /// Subject identifier attached to every upload.
        #[arg(long, env = "FRAMESIFT_USER_UUID")]
        user_uuid: Option<String>,

        /// Email attached to every upload.
        #[arg(long, env = "FRAMESIFT_USER_EMAIL")]
        user_email: Option<String>,

        /// Bearer token for the inference endpoint.
        #[arg(long, env = "FRAMESIFT_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Upload every Nth sample.
        #[arg(long, default_value_t = DEFAULT_UPLOAD_EVERY)]
        every: u64,

        /// Nominal frames (at 30 fps) between two samples.
        #[arg(long, default_value_t = DEFAULT_SAMPLE_INTERVAL_FRAMES)]
        interval: u32,

        /// JPEG quality in (0, 1].
        #[arg(long, default_value_t = DEFAULT_QUALITY)]
        quality: f32,

        /// Show a progress bar.
        #[arg(long)]
        progress: bool,

        /// Write upload-eligible frames to this directory instead of posting them.
        #[arg(long)]
        save_frames: Option<PathBuf>,

        /// Fail the job when a single seek takes longer than this many seconds.
        #[arg(long, value_parser = parse_seconds)]
        seek_timeout: Option<Duration>,

        /// Per-request upload timeout in seconds.
        #[arg(long, value_parser = parse_seconds)]
        upload_timeout: Option<Duration>,
    },

    /// Print video metadata.
    #[command(
        about = "Print video metadata",
        visible_alias = "info",
        after_help = "Examples:\n  framesift probe input.mp4\n  framesift probe input.mp4 --json"
    )]
    Probe {
        /// Input video path.
        input: PathBuf,

        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse a positive number of seconds, e.g. `2` or `0.5`.
fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid number of seconds: {value}"))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(format!("duration must be positive, got {value}"));
    }
    Ok(Duration::from_secs_f64(seconds))
}

fn exit_code_for(state: JobState) -> i32 {
    match state {
        JobState::Completed => 0,
        JobState::Cancelled => EXIT_CANCELLED,
        _ => EXIT_FAILED,
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "framesift=debug" } else { "framesift=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    // A subscriber may already be installed when embedded; keep that one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}",
        )?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, progress: &JobProgress) {
        if self.bar.length() != Some(progress.total_estimated_samples) {
            self.bar.set_length(progress.total_estimated_samples);
        }
        self.bar.set_position(progress.samples_processed);
        self.bar.set_message(format!(
            "{}% ({} sent)",
            progress.progress_percent, progress.uploads_dispatched
        ));
    }
}

struct RunArguments {
    input: PathBuf,
    endpoint: Option<String>,
    user_uuid: Option<String>,
    user_email: Option<String>,
    token: Option<String>,
    every: u64,
    interval: u32,
    quality: f32,
    progress: bool,
    save_frames: Option<PathBuf>,
    seek_timeout: Option<Duration>,
    upload_timeout: Option<Duration>,
}

fn build_sink(arguments: &RunArguments) -> Result<Arc<dyn FrameSink>, Box<dyn std::error::Error>> {
    if let Some(directory) = &arguments.save_frames {
        if arguments.endpoint.is_some() {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                "--save-frames given; frames will not be posted to --endpoint".yellow()
            );
        }
        return Ok(Arc::new(DirectorySink::new(directory)?));
    }

    let endpoint = arguments
        .endpoint
        .as_deref()
        .ok_or("--endpoint (or FRAMESIFT_ENDPOINT) is required unless --save-frames is given")?;
    let mut options = UploadOptions::new(endpoint)?;
    if let Some(timeout) = arguments.upload_timeout {
        options = options.with_timeout(timeout);
    }
    if let Some(token) = &arguments.token {
        options = options.with_auth_token(token.clone());
    }
    Ok(Arc::new(InferenceClient::new(options)?))
}

async fn run_job(arguments: RunArguments) -> Result<i32, Box<dyn std::error::Error>> {
    let sink = build_sink(&arguments)?;
    let dispatcher = UploadDispatcher::spawn(sink, Arc::new(JpegEncoder));

    let identity = match arguments.user_uuid.as_deref() {
        Some(id) => {
            let user = UserIdentity::new(id);
            let user = match &arguments.user_email {
                Some(email) => user.with_email(email.clone()),
                None => user,
            };
            StaticIdentity::new(user)
        }
        None => StaticIdentity::anonymous(),
    };
    let controller = JobController::new(Arc::new(identity), dispatcher.handle());

    let mut options = SamplingOptions::new()
        .with_upload_every(arguments.every)
        .with_sample_interval_frames(arguments.interval)
        .with_quality(arguments.quality);
    if let Some(timeout) = arguments.seek_timeout {
        options = options.with_seek_timeout(timeout);
    }
    let terminal = if arguments.progress {
        let terminal = Arc::new(TerminalProgress::new()?);
        options = options.with_progress(terminal.clone());
        Some(terminal)
    } else {
        None
    };

    let handle = controller.start_file(&arguments.input, options)?;

    let wait = handle.wait();
    tokio::pin!(wait);
    let mut interrupted = false;
    let report = loop {
        tokio::select! {
            report = &mut wait => break report,
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                if signal.is_ok() && controller.cancel_job() {
                    eprintln!(
                        "{} {}",
                        "warning:".yellow().bold(),
                        "interrupt received, stopping after the current sample".yellow()
                    );
                }
            }
        }
    };

    if let Some(terminal) = &terminal {
        terminal.finish();
    }

    drop(controller);
    let stats = dispatcher.shutdown().await;

    match report.state {
        JobState::Completed => println!(
            "{} {}",
            "success:".green().bold(),
            report.summary().green()
        ),
        JobState::Cancelled => eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            report.summary().yellow()
        ),
        _ => eprintln!("{} {}", "error:".red().bold(), report.summary().red()),
    }
    println!(
        "uploads: {} dispatched, {} succeeded, {} failed, {} skipped",
        stats.dispatched, stats.succeeded, stats.failed, stats.skipped
    );

    Ok(exit_code_for(report.state))
}

fn probe(input: &Path, as_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut decoder = FfmpegDecoder::new(input);
    let info = decoder.load()?;
    let options = SamplingOptions::new();
    let samples = framesift::scheduler::estimated_sample_count(
        info.duration_seconds(),
        options.sample_interval_frames(),
        framesift::configuration::NOMINAL_FRAMES_PER_SECOND,
    );

    if as_json {
        let payload = json!({
            "path": input.display().to_string(),
            "duration_seconds": info.duration_seconds(),
            "width": info.width,
            "height": info.height,
            "fps": info.frames_per_second,
            "codec": info.codec,
            "estimated_samples": samples,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("File: {}", input.display());
        println!("Duration: {:.3}s", info.duration_seconds());
        println!("Resolution: {}x{}", info.width, info.height);
        println!("Frame rate: {:.3} fps", info.frames_per_second);
        println!("Codec: {}", info.codec);
        println!("Samples at default cadence: {samples}");
    }
    Ok(())
}

async fn run() -> Result<i32, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let level: FfmpegLogLevel = cli.global.ffmpeg_log_level.parse()?;
    framesift::set_ffmpeg_log_level(level);

    match cli.command {
        Commands::Run {
            input,
            endpoint,
            user_uuid,
            user_email,
            token,
            every,
            interval,
            quality,
            progress,
            save_frames,
            seek_timeout,
            upload_timeout,
        } => {
            run_job(RunArguments {
                input,
                endpoint,
                user_uuid,
                user_email,
                token,
                every,
                interval,
                quality,
                progress,
                save_frames,
                seek_timeout,
                upload_timeout,
            })
            .await
        }
        Commands::Probe { input, json } => {
            probe(&input, json)?;
            Ok(0)
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framesift", &mut std::io::stdout());
            Ok(0)
        }
    }
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("error: {error}");
            std::process::exit(EXIT_FAILED);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands, JobState, exit_code_for, parse_seconds};
    use clap::Parser;

    #[test]
    fn parse_seconds_accepts_fractions() {
        assert_eq!(parse_seconds("2").unwrap().as_millis(), 2000);
        assert_eq!(parse_seconds(" 0.5 ").unwrap().as_millis(), 500);
        assert!(parse_seconds("0").is_err());
        assert!(parse_seconds("-1").is_err());
        assert!(parse_seconds("soon").is_err());
    }

    #[test]
    fn exit_codes_follow_terminal_state() {
        assert_eq!(exit_code_for(JobState::Completed), 0);
        assert_eq!(exit_code_for(JobState::Failed), 1);
        assert_eq!(exit_code_for(JobState::Cancelled), 130);
    }

    #[test]
    fn run_defaults() {
        let cli = Cli::try_parse_from([
            "framesift",
            "run",
            "input.mp4",
            "--endpoint",
            "http://localhost:8000/upload",
            "--user-uuid",
            "user-1",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                every,
                interval,
                seek_timeout,
                ..
            } => {
                assert_eq!(every, 20);
                assert_eq!(interval, 10);
                assert!(seek_timeout.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.global.ffmpeg_log_level, "error");
    }
}
