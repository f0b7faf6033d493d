use chrono::NaiveDate;

use super::domain::{Cohort, CohortId, MatchingResult, Participant, ReadingSubmission};
use super::schedule::DailyQuestion;

/// Storage abstraction over the external document store so the matching
/// pipeline can be exercised against in-memory collaborators.
///
/// `confirm_daily_featured` and `overwrite_daily_featured` are the only two
/// mutation paths for a cohort's per-date results. Implementations must apply
/// them as one atomic read-whole-map / set-one-key / write-whole-map step per
/// cohort document, so concurrent writers targeting different dates cannot
/// lose each other's keys.
pub trait DocumentStore: Send + Sync {
    fn cohort(&self, id: &CohortId) -> Result<Option<Cohort>, StoreError>;
    fn participants_by_cohort(&self, id: &CohortId) -> Result<Vec<Participant>, StoreError>;
    fn submissions_by_cohort(&self, id: &CohortId) -> Result<Vec<ReadingSubmission>, StoreError>;
    fn daily_questions(&self, id: &CohortId) -> Result<Vec<DailyQuestion>, StoreError>;

    /// Store a confirmed result under one date key. Fails with
    /// [`StoreError::Conflict`] when the date already holds a result.
    fn confirm_daily_featured(
        &self,
        id: &CohortId,
        date: NaiveDate,
        result: MatchingResult,
    ) -> Result<(), StoreError>;

    /// Forced variant used by the repair path: replaces whatever is stored
    /// under the date key.
    fn overwrite_daily_featured(
        &self,
        id: &CohortId,
        date: NaiveDate,
        result: MatchingResult,
    ) -> Result<(), StoreError>;

    /// Immutable backup record keyed `{cohort}-{date}`, written once at
    /// confirmation time.
    fn backup_result(
        &self,
        id: &CohortId,
        date: NaiveDate,
    ) -> Result<Option<MatchingResult>, StoreError>;

    fn write_backup(
        &self,
        id: &CohortId,
        date: NaiveDate,
        result: MatchingResult,
    ) -> Result<(), StoreError>;
}

/// Error enumeration for document-store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found")]
    NotFound,
    #[error("document already exists")]
    Conflict,
    #[error("document store unavailable: {0}")]
    Unavailable(String),
}
