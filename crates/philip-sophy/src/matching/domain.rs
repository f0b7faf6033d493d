use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for participants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for cohorts (one run of the program).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CohortId(pub String);

impl fmt::Display for CohortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// A program participant. Admins and ghosts stay on the roster but are
/// soft-excluded from matching pools via the flags; participants are never
/// hard-deleted during a cohort's run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub cohort_id: CohortId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub is_administrator: bool,
    #[serde(default)]
    pub is_super_admin: bool,
    #[serde(default)]
    pub is_ghost: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    /// Whether a submission with this status counts toward certification.
    /// Drafts were never submitted and rejected attempts did not certify.
    pub const fn is_counted(self) -> bool {
        matches!(self, SubmissionStatus::Pending | SubmissionStatus::Approved)
    }

    pub const fn label(self) -> &'static str {
        match self {
            SubmissionStatus::Draft => "draft",
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }
}

/// One attempt by a participant to certify reading for a logical day.
///
/// `submission_date` is the logical day under the 2 AM cutoff, not the
/// wall-clock calendar date of `submitted_at` (see [`super::window`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingSubmission {
    pub participant_id: ParticipantId,
    pub cohort_id: CohortId,
    pub submission_date: NaiveDate,
    pub status: SubmissionStatus,
    pub submitted_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

/// One run of the program with its own roster and date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    pub id: CohortId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// First reading day; may differ from `start_date` (e.g. orientation day).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_start_date: Option<NaiveDate>,
    /// Once reached, every certified viewer sees all of yesterday's certified
    /// participants instead of their formulaic set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_unlock_date: Option<NaiveDate>,
    pub is_active: bool,
    /// At most one matching result per date key; read-mostly once the date
    /// has passed.
    #[serde(default)]
    pub daily_featured: BTreeMap<NaiveDate, MatchingResult>,
}

impl Cohort {
    pub fn program_start(&self) -> NaiveDate {
        self.program_start_date.unwrap_or(self.start_date)
    }
}

/// The stored output of one matching run for one date, discriminated by the
/// `matchingVersion` tag so legacy (`ai`) and current (`random`) documents
/// deserialize into distinct variants instead of being shape-probed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "matchingVersion", rename_all = "lowercase")]
pub enum MatchingResult {
    Random(RandomMatching),
    Ai(AiMatching),
}

impl MatchingResult {
    pub const fn version_label(&self) -> &'static str {
        match self {
            MatchingResult::Random(_) => "random",
            MatchingResult::Ai(_) => "ai",
        }
    }

    /// Every profile-book ID this result grants to `viewer`, in stored order.
    /// For the legacy variant that is the similar pair followed by the
    /// opposite pair.
    pub fn assigned_to(&self, viewer: &ParticipantId) -> Vec<ParticipantId> {
        match self {
            MatchingResult::Random(matching) => matching
                .assignments
                .get(viewer)
                .map(|assignment| assignment.assigned.clone())
                .unwrap_or_default(),
            MatchingResult::Ai(matching) => matching
                .assignments
                .get(viewer)
                .map(|assignment| {
                    assignment
                        .similar
                        .iter()
                        .chain(assignment.opposite.iter())
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn contains_viewer(&self, viewer: &ParticipantId) -> bool {
        match self {
            MatchingResult::Random(matching) => matching.assignments.contains_key(viewer),
            MatchingResult::Ai(matching) => matching.assignments.contains_key(viewer),
        }
    }
}

/// Current (v2) scheme: a size-formula-driven random set per participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomMatching {
    pub assignments: BTreeMap<ParticipantId, RandomAssignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomAssignment {
    pub assigned: Vec<ParticipantId>,
}

/// Legacy (v1) scheme: externally computed semantic pairs, each gender
/// balanced (one male + one female).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiMatching {
    pub assignments: BTreeMap<ParticipantId, AiAssignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiAssignment {
    pub similar: [ParticipantId; 2],
    pub opposite: [ParticipantId; 2],
}
