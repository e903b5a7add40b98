//! Defect detection for single uploaded images.
//!
//! An upload is validated against the JPEG/PNG allow-list, normalized into a
//! fixed 150x150 RGB tensor, scored by a binary classifier and recorded in a
//! [`RecordStore`]. [`Detector`] ties the stages together and also answers
//! history queries.

pub mod clock;
pub mod detector;
pub mod encode;
pub mod engine;
pub mod error;
pub mod media;
pub mod normalize;
pub mod record;
pub mod store;
pub mod timer;

#[cfg(test)]
mod fixtures;

pub use clock::{Clock, SystemClock};
pub use detector::{recent_records, Detector, HISTORY_LIMIT};
pub use engine::{FnScorer, InferenceEngine, ScoreError, Scorer, Verdict};
pub use error::{Error, ProcessingError};
pub use media::{MediaType, UnsupportedMediaType};
pub use normalize::{DecodeError, NormalizedImage, NormalizedTensor};
pub use record::{Record, StoredRecord};
pub use store::{JsonlStore, MemoryStore, RecordStore, StoreError};
pub use timer::Timer;

#[cfg(feature = "tensorflow")]
pub use engine::savedmodel::{ModelConfig, SavedModelScorer};
