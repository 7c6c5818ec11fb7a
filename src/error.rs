use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DecodeError>;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid layout: {reason}")]
    InvalidLayout { reason: String },

    #[error("WAV export failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("cannot plot {}: {reason}", path.display())]
    Plot { path: PathBuf, reason: String },
}

impl DecodeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DecodeError::Io {
            path: path.into(),
            source,
        }
    }
}
