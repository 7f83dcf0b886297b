//! FFmpeg console verbosity.
//!
//! FFmpeg writes its own diagnostics to stderr, independently of the `log`
//! facade used by this crate. Decoding a damaged upload can produce pages of
//! warnings per sample, so callers usually want to turn it down.
//!
//! ```no_run
//! use framesift::FfmpegLogLevel;
//!
//! framesift::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! assert_eq!(framesift::ffmpeg_log_level(), Some(FfmpegLogLevel::Error));
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use ffmpeg_next::util::log::Level;

/// FFmpeg verbosity, quietest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FfmpegLogLevel {
    /// No output.
    Quiet,
    /// Unrecoverable errors only.
    Fatal,
    /// Recoverable errors.
    #[default]
    Error,
    /// Warnings, FFmpeg's own default.
    Warning,
    /// Informational messages.
    Info,
    /// Decoder internals.
    Debug,
}

impl FfmpegLogLevel {
    const NAMES: [(&'static str, FfmpegLogLevel); 6] = [
        ("quiet", FfmpegLogLevel::Quiet),
        ("fatal", FfmpegLogLevel::Fatal),
        ("error", FfmpegLogLevel::Error),
        ("warning", FfmpegLogLevel::Warning),
        ("info", FfmpegLogLevel::Info),
        ("debug", FfmpegLogLevel::Debug),
    ];

    fn as_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Debug => Level::Debug,
        }
    }

    /// Levels FFmpeg knows but this enum folds together map to the nearest
    /// quieter variant.
    fn from_level(level: Level) -> Self {
        match level {
            Level::Quiet => FfmpegLogLevel::Quiet,
            Level::Panic | Level::Fatal => FfmpegLogLevel::Fatal,
            Level::Error => FfmpegLogLevel::Error,
            Level::Warning => FfmpegLogLevel::Warning,
            Level::Info | Level::Verbose => FfmpegLogLevel::Info,
            Level::Debug | Level::Trace => FfmpegLogLevel::Debug,
        }
    }

    /// Lower-case name accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(_, level)| *level == self)
            .map(|(name, _)| *name)
            .unwrap_or("error")
    }
}

impl Display for FfmpegLogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.trim().to_ascii_lowercase();
        let lowered = if lowered == "warn" { "warning".to_string() } else { lowered };
        Self::NAMES
            .iter()
            .find(|(name, _)| *name == lowered)
            .map(|(_, level)| *level)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::NAMES.iter().map(|(name, _)| *name).collect();
                format!("unknown FFmpeg log level '{value}' (expected one of {})", known.join(", "))
            })
    }
}

/// Set FFmpeg's console verbosity. Does not affect `log` output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.as_level());
}

/// FFmpeg's current console verbosity, if it maps to a known level.
pub fn ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    ffmpeg_next::util::log::get_level()
        .ok()
        .map(FfmpegLogLevel::from_level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("Quiet".parse::<FfmpegLogLevel>(), Ok(FfmpegLogLevel::Quiet));
        assert_eq!("warn".parse::<FfmpegLogLevel>(), Ok(FfmpegLogLevel::Warning));
        assert_eq!(" debug ".parse::<FfmpegLogLevel>(), Ok(FfmpegLogLevel::Debug));
        assert!("loud".parse::<FfmpegLogLevel>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for (_, level) in FfmpegLogLevel::NAMES {
            assert_eq!(level.to_string().parse::<FfmpegLogLevel>(), Ok(level));
        }
    }

    #[test]
    fn folded_levels_map_downwards() {
        assert_eq!(FfmpegLogLevel::from_level(Level::Panic), FfmpegLogLevel::Fatal);
        assert_eq!(FfmpegLogLevel::from_level(Level::Verbose), FfmpegLogLevel::Info);
        assert_eq!(FfmpegLogLevel::from_level(Level::Trace), FfmpegLogLevel::Debug);
    }
}
