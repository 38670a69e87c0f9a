#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum DemuxError {
    #[error("Demuxer has not been started")]
    NotStarted,

    #[error("Unable to find stream information: {0}")]
    StreamInfo(#[source] EngineError),

    #[error("Seek to {target} failed: {source}")]
    Seek {
        target: crate::structs::time::Time,
        #[source]
        source: EngineError,
    },

    #[error("Packet for stream {index} outside the {streams} declared streams")]
    StreamOutOfRange { index: i32, streams: usize },

    #[error(transparent)]
    Dts(#[from] DtsError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Container has no streams")]
    NoStreams,

    #[error("Unsupported container: {0}")]
    Unsupported(String),

    #[error("Malformed container: {0}")]
    Malformed(String),

    #[error("Seeking is not supported by this container")]
    SeekUnsupported,

    #[error("Seek target {0} lies outside the container")]
    SeekOutOfRange(crate::structs::time::Time),
}

#[derive(thiserror::Error, Debug)]
pub enum DtsError {
    #[error("Lost DTS sync, {0} bytes kept for the next packet")]
    SyncLost(usize),

    #[error("DTS accumulator overflow, {dropped} buffered bytes dropped")]
    AccumulatorOverflow { dropped: usize },

    #[error("Insufficient data for DTS header: {0} bytes")]
    InsufficientHeader(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("measurement_window must be between {min} and {max}. Got {actual}")]
    MeasurementWindow {
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("jump_threshold_ms must be positive. Got {0}")]
    JumpThreshold(i64),

    #[error("video_sync_threshold_ms must be positive. Got {0}")]
    VideoSyncThreshold(i64),

    #[error("max_in_flight must be at least 1")]
    MaxInFlight,
}
