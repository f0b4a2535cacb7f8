use crate::modality::Modality;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Unsupported file type")]
    UnsupportedType(String),

    #[error("Unsupported {modality} technique: {technique}")]
    UnsupportedTechnique { modality: Modality, technique: String },

    #[error("Failed to load {path}: {reason}")]
    Load { path: String, reason: String },

    #[error("{technique} failed: {reason}")]
    Technique { technique: String, reason: String },

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] crate::ffmpeg::FfmpegError),
}

impl MediaError {
    pub fn load(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        MediaError::Load {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn technique(technique: impl ToString, reason: impl ToString) -> Self {
        MediaError::Technique {
            technique: technique.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
