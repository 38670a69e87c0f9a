use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use dlnademux::utils::config::SnapPolicy;

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = env!("CARGO_PKG_VERSION"),
    author     = env!("CARGO_PKG_AUTHORS"),
    about      = "Tools for inspecting and demultiplexing media streams for DLNA renderers",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Demuxer configuration file (YAML).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of video timestamps sampled for frame-rate estimation.
    #[arg(long, global = true, value_name = "COUNT")]
    pub window: Option<usize>,

    /// Frame-rate snapping policy.
    #[arg(long, global = true, value_enum)]
    pub snap_policy: Option<SnapPolicyArg>,

    /// Skip deep probing of the container at start-up.
    #[arg(long, global = true)]
    pub fast: bool,

    /// Container engine to use instead of detecting it from the input.
    #[arg(long, global = true, value_name = "NAME")]
    pub engine: Option<String>,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print container, stream and chapter information
    Info(InfoArgs),

    /// Demultiplex the selected streams with corrected timestamps.
    Demux(DemuxArgs),

    /// Extract DTS hidden in a 16-bit PCM or WAV input.
    Dts(DtsArgs),
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input container (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct DemuxArgs {
    /// Input container (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Base path for elementary stream files, written as <PATH>.<index>.<ext>.
    #[arg(long, value_name = "PATH")]
    pub output_path: Option<PathBuf>,

    /// Write the produced buffers with corrected timestamps as a YAML trace.
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Audio stream to select, by index or as 0x<native id>.
    #[arg(long, value_name = "ID")]
    pub audio: Option<String>,

    /// Video stream to select, by index or as 0x<native id>.
    #[arg(long, value_name = "ID")]
    pub video: Option<String>,

    /// Subtitle stream to select, by index or as 0x<native id>.
    #[arg(long, value_name = "ID")]
    pub subtitle: Option<String>,

    /// Start position in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub start: Option<f64>,
}

#[derive(Debug, Args)]
pub struct DtsArgs {
    /// Input PCM or WAV file (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output path for the extracted DTS stream.
    #[arg(long, value_name = "PATH")]
    pub output_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum SnapPolicyArg {
    /// Standard rates first, then ratios of the declared rate.
    Standard,
    /// Ratios of the declared rate only.
    DeclaredOnly,
}

impl From<SnapPolicyArg> for SnapPolicy {
    fn from(arg: SnapPolicyArg) -> Self {
        match arg {
            SnapPolicyArg::Standard => SnapPolicy::Standard,
            SnapPolicyArg::DeclaredOnly => SnapPolicy::DeclaredOnly,
        }
    }
}

impl Cli {
    /// Level at which absorbed anomalies become fatal.
    pub fn fail_level(&self) -> log::Level {
        if self.strict {
            log::Level::Warn
        } else {
            log::Level::Error
        }
    }
}
