//! Daily profile matching for a reading cohort.
//!
//! The pipeline for one day: the 2 AM [`window`] decides which logical date
//! is being matched, the [`ledger`] determines who certified and how often,
//! the [`engine`] assigns profile-books (random v2 or legacy AI v1), and
//! [`unlock`] decides what each viewer may actually open. Persistence goes
//! through the [`store::DocumentStore`] seam.

pub mod domain;
pub mod engine;
pub mod ledger;
pub mod router;
pub mod schedule;
pub mod store;
pub mod unlock;
pub mod validation;
pub mod window;

pub use domain::{
    AiAssignment, AiMatching, Cohort, CohortId, Gender, MatchingResult, Participant,
    ParticipantId, RandomAssignment, RandomMatching, ReadingSubmission, SubmissionStatus,
};
pub use engine::{
    AffinityClassifier, AssignmentShortfall, ClassifierError, ExclusionPolicy, MatchingConfig,
    MatchingError, MatchingRunReport, ParticipantAnswer, ProfileMatchingEngine, ResultDefect,
    SizeFormula,
};
pub use ledger::SubmissionLedger;
pub use schedule::{DailyQuestion, DailyQuestionSchedule, ScheduleError};
pub use store::{DocumentStore, StoreError};
pub use router::{matching_router, MatchingApi, MatchingPolicy};
pub use unlock::{resolve_visible_profiles, visibility, visible_profiles, ProfileVisibility, VisibleProfiles};
