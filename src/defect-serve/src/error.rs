use image::ImageError;
use thiserror::Error;

use crate::engine::ScoreError;
use crate::media::UnsupportedMediaType;
use crate::normalize::DecodeError;
use crate::store::StoreError;

/// Failure of a step after the media type was accepted.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error("cannot encode image: {0}")]
    Encode(#[source] ImageError),

    #[error("cannot persist record: {0}")]
    Persist(#[source] StoreError),
}

/// Errors surfaced by [`Detector`](crate::Detector).
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid file format. Please upload a JPEG or PNG image.")]
    UnsupportedMediaType(#[from] UnsupportedMediaType),

    #[error("Error processing image: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Error retrieving history: {0}")]
    StoreUnavailable(#[source] StoreError),
}

impl Error {
    /// Whether the caller, rather than the service, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::UnsupportedMediaType(_))
    }
}
