//! Legacy affinity-pairing seam.
//!
//! The semantic pairing itself lives behind [`AffinityClassifier`]; the
//! engine only supplies the day's question plus each participant's certified
//! answer, and validates whatever pairing comes back. Retired from the daily
//! schedule but kept operational for reruns over historical cohorts.

use crate::matching::domain::{AiMatching, Gender, ParticipantId};

/// One certified answer handed to the classifier.
#[derive(Debug, Clone)]
pub struct ParticipantAnswer {
    pub participant_id: ParticipantId,
    pub gender: Option<Gender>,
    pub answer: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("affinity classifier unavailable: {0}")]
    Unavailable(String),
    #[error("affinity classifier returned a malformed pairing: {0}")]
    Malformed(String),
}

/// Produces similar/opposite pairs from the day's answers.
///
/// Implementations must pair every participant in `answers`; the engine
/// rejects results that skip anyone or break gender balance.
pub trait AffinityClassifier: Send + Sync {
    fn classify(
        &self,
        question: &str,
        answers: &[ParticipantAnswer],
    ) -> Result<AiMatching, ClassifierError>;
}
