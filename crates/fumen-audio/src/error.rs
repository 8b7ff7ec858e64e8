use std::path::PathBuf;

use thiserror::Error;

use crate::backend::SourceId;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio backend unavailable: {0}")]
    AudioBackendUnavailable(String),

    #[error("Audio backend error: {0}")]
    Backend(String),

    #[error("Unknown audio source {0}")]
    UnknownSource(SourceId),

    #[error("Failed to open audio file: {path}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode audio stream: {0}")]
    StreamDecodeFailure(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Pitch must be positive, got {0}")]
    InvalidPitch(String),

    #[error("No stream named {0:?}")]
    UnknownStream(String),

    #[error("Audio streaming thread panicked")]
    WorkerPanicked,

    #[error("Failed to access config file: {path}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid audio config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_backend_names_the_cause() {
        let err = AudioError::AudioBackendUnavailable("no output device available".to_string());
        assert_eq!(err.to_string(), "Audio backend unavailable: no output device available");
    }
}
