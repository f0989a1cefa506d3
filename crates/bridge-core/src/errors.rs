use crate::{fetcher::FetchError, transcoder::TranscodeError};

/// Core error type for the bridge.
///
/// Adapter crates map their SDK errors into this type so the dispatcher can log
/// every failure the same way, whichever platform it came from.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("transcode error: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("platform error: {0}")]
    Platform(String),

    #[error("external error: {0}")]
    External(String),
}

impl From<FetchError> for Error {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Io(io) => Error::Io(io),
            other => Error::Transport(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
