//! Binary classification on top of a swappable scoring function.

use log::debug;
use std::sync::Arc;
use thiserror::Error;

use crate::normalize::NormalizedTensor;
use crate::Timer;

#[cfg(feature = "tensorflow")]
pub mod savedmodel;

/// Probability above which an image is labelled defective.
pub const DEFECT_THRESHOLD: f32 = 0.5;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("model returned an invalid probability: {0}")]
    InvalidProbability(f32),

    #[error("model returned no output")]
    EmptyOutput,

    #[error("model backend failure: {0}")]
    Backend(String),
}

/// Maps one normalized tensor, presented as a batch of one, to the
/// probability that the subject is defective.
///
/// Implementations must be deterministic. They are shared across request
/// threads, so any internal state has to be synchronized by the implementor.
pub trait Scorer: Send + Sync {
    fn score(&self, tensor: &NormalizedTensor) -> Result<f32, ScoreError>;
}

/// Adapts a plain function into a [`Scorer`].
pub struct FnScorer<F>(pub F);

impl<F> Scorer for FnScorer<F>
where
    F: Fn(&NormalizedTensor) -> f32 + Send + Sync,
{
    fn score(&self, tensor: &NormalizedTensor) -> Result<f32, ScoreError> {
        Ok((self.0)(tensor))
    }
}

/// Label and confidence derived from a single probability.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Verdict {
    pub is_defective: bool,
    /// Probability mass on the chosen label, never below 0.5.
    pub confidence: f32,
}

impl Verdict {
    /// `p == 0.5` is non-defective.
    pub fn from_probability(p: f32) -> Self {
        let is_defective = p > DEFECT_THRESHOLD;
        let confidence = if is_defective { p } else { 1.0 - p };

        Verdict {
            is_defective,
            confidence,
        }
    }
}

#[derive(Clone)]
pub struct InferenceEngine {
    scorer: Arc<dyn Scorer>,
}

impl InferenceEngine {
    pub fn new(scorer: Arc<dyn Scorer>) -> Self {
        InferenceEngine { scorer }
    }

    /// Run a single forward pass. Failures are not retried.
    pub fn classify(&self, tensor: &NormalizedTensor) -> Result<Verdict, ScoreError> {
        let t = Timer::start("Running model");

        let p = self.scorer.score(tensor)?;

        t.stop();

        if !(0.0..=1.0).contains(&p) {
            return Err(ScoreError::InvalidProbability(p));
        }

        let verdict = Verdict::from_probability(p);
        debug!(
            "probability {} -> defective: {}, confidence: {}",
            p, verdict.is_defective, verdict.confidence
        );

        Ok(verdict)
    }
}
