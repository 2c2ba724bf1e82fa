use thiserror::Error;

use crate::shared::reader_config::ConfigError;

/// Every way a capture session can fail.
///
/// Engine-specific errors are flattened into the message so the variants
/// stay independent of the backend in use.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReaderError {
    #[error("failed to open capture device: {0}")]
    DeviceOpen(String),
    #[error("no decodable video stream in input")]
    NoVideoStream,
    #[error("failed to set up decoder: {0}")]
    CodecSetup(String),
    #[error("failed to allocate {0}")]
    Allocation(&'static str),
    #[error("filter graph error: {0}")]
    FilterGraph(String),
    #[error("failed to create scaler: {0}")]
    ScalerInit(String),
    #[error("failed to submit packet to decoder: {0}")]
    DecodeSubmit(String),
    #[error("failed to receive frame from decoder: {0}")]
    DecodeReceive(String),
    #[error("failed to feed the filter graph: {0}")]
    FilterPush(String),
    #[error("failed to pull filtered frame: {0}")]
    FilterPull(String),
    #[error("end of stream")]
    EndOfStream,
    #[error("failed to scale frame: {0}")]
    Scale(String),
    #[error("failed to read packet: {0}")]
    Demux(String),
    #[error("output buffer too small: need {required} bytes, got {actual}")]
    BufferTooSmall { required: usize, actual: usize },
    #[error("invalid reader state: {0}")]
    InvalidState(&'static str),
    #[error("configuration error: {0}")]
    Config(String),
}

impl ReaderError {
    /// True for outcomes after which the session yields no more frames.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, ReaderError::EndOfStream)
    }
}

impl From<ConfigError> for ReaderError {
    fn from(e: ConfigError) -> Self {
        ReaderError::Config(e.to_string())
    }
}
