use std::path::PathBuf;

use lumen_contracts::regions::InvalidRegionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read image {path}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("image encode failed")]
    ImageEncode(#[source] image::ImageError),

    #[error(transparent)]
    InvalidRegion(#[from] InvalidRegionError),

    /// Parallel wire arrays drifted out of step. Always an assembler bug,
    /// never a user-input problem.
    #[error("parallel reference arrays out of step while building {context}")]
    ArrayLengthMismatch { context: &'static str },

    #[error("missing required field `{0}`")]
    MissingRequiredField(&'static str),

    #[error("remote service returned {status}: {body_excerpt}")]
    RemoteService { status: u16, body_excerpt: String },

    #[error("response archive contained no image entry")]
    MissingImage,

    #[error("request transport failed")]
    Transport(#[source] reqwest::Error),

    #[error("response archive is unreadable")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
