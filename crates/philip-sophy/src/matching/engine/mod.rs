//! The daily profile-book matching engine.
//!
//! One invocation walks collect-roster -> compute-eligibility -> assign
//! (random or AI) -> persist. Everything is computed in memory first; the
//! only write is a single transactional update of one date key in the
//! cohort's `daily_featured` map, plus the immutable backup record written at
//! confirmation time. All mutation of stored results funnels through
//! [`ProfileMatchingEngine::confirm`] and
//! [`ProfileMatchingEngine::overwrite_from_backup`].

mod ai;
mod random;

pub use ai::{AffinityClassifier, ClassifierError, ParticipantAnswer};

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{
    Cohort, CohortId, MatchingResult, Participant, ParticipantId, RandomAssignment,
    RandomMatching, ReadingSubmission,
};
use super::ledger::SubmissionLedger;
use super::schedule::{DailyQuestionSchedule, ScheduleError};
use super::store::{DocumentStore, StoreError};
use super::validation::{
    validate_for_matching, validate_result_balance, RosterValidationError, UnbalancedPair,
};

/// `target = 2 x (cumulative certified + offset)`.
///
/// The legacy generators disagreed on the offset (1 in the scheduled random
/// matcher, 2 in the regeneration scripts), so it is an explicit parameter
/// with no buried default at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeFormula {
    pub offset: u32,
}

impl SizeFormula {
    pub const fn target(&self, cumulative_certified: usize) -> usize {
        2 * (cumulative_certified + self.offset as usize)
    }
}

impl Default for SizeFormula {
    fn default() -> Self {
        Self { offset: 1 }
    }
}

/// Who is removed from a matching pool. The two generators in production
/// applied different rules; both are preserved as named policies because
/// unifying them silently would change who appears in profile-books.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionPolicy {
    /// Current random generator: only super admins (and ghosts) sit out.
    SuperAdminsOnly,
    /// Legacy AI path: every administrator sits out.
    AllAdministrators,
}

impl ExclusionPolicy {
    pub fn excludes(&self, participant: &Participant) -> bool {
        if participant.is_ghost || participant.is_super_admin {
            return true;
        }
        matches!(self, ExclusionPolicy::AllAdministrators) && participant.is_administrator
    }

    pub const fn label(&self) -> &'static str {
        match self {
            ExclusionPolicy::SuperAdminsOnly => "super_admins_only",
            ExclusionPolicy::AllAdministrators => "all_administrators",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchingConfig {
    pub formula: SizeFormula,
    pub random_exclusion: ExclusionPolicy,
    pub ai_exclusion: ExclusionPolicy,
    /// Minimum eligible participants for any run.
    pub min_participants: usize,
    /// Minimum per-gender count for gender-balanced (AI) matching.
    pub min_per_gender: usize,
    /// Profile-books received on this many dates strictly before the target
    /// are avoided when the candidate pool allows it.
    pub recent_window_days: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            formula: SizeFormula::default(),
            random_exclusion: ExclusionPolicy::SuperAdminsOnly,
            ai_exclusion: ExclusionPolicy::AllAdministrators,
            min_participants: 4,
            min_per_gender: 3,
            recent_window_days: 3,
        }
    }
}

/// A participant who received fewer profile-books than the formula asked
/// for because the candidate pool ran out. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentShortfall {
    pub participant: ParticipantId,
    pub target: usize,
    pub assigned: usize,
}

/// Outcome of one (unpersisted) matching run.
#[derive(Debug, Clone, Serialize)]
pub struct MatchingRunReport {
    pub cohort_id: CohortId,
    pub target_date: NaiveDate,
    pub eligible_count: usize,
    pub result: MatchingResult,
    pub shortfalls: Vec<AssignmentShortfall>,
}

/// Structural defect in a stored or proposed result. Detected post hoc by
/// [`ProfileMatchingEngine::audit_stored`]; recovery goes through the backup
/// overwrite, never through silent correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultDefect {
    SelfAssignment { participant: ParticipantId },
    DuplicateAssignment { participant: ParticipantId },
    OddAssignmentCount { participant: ParticipantId, len: usize },
    /// A legacy `ai`-tagged document under a date the current scheme owns.
    LegacyShape,
}

impl fmt::Display for ResultDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultDefect::SelfAssignment { participant } => {
                write!(f, "{participant} is assigned to themselves")
            }
            ResultDefect::DuplicateAssignment { participant } => {
                write!(f, "{participant} has duplicate assigned IDs")
            }
            ResultDefect::OddAssignmentCount { participant, len } => {
                write!(f, "{participant} has an odd assignment count ({len})")
            }
            ResultDefect::LegacyShape => {
                f.write_str("stored result carries the legacy ai shape")
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    #[error("cohort {0} not found")]
    CohortNotFound(CohortId),
    #[error("not enough certified participants: {found} found, {required} required")]
    InsufficientParticipants { found: usize, required: usize },
    #[error(transparent)]
    Roster(#[from] RosterValidationError),
    #[error("{} pair(s) violate gender balance", pairs.len())]
    UnbalancedResult { pairs: Vec<UnbalancedPair> },
    #[error("result has {} structural defect(s)", defects.len())]
    CorruptResult { defects: Vec<ResultDefect> },
    #[error("profiles unlocked on {unlock_date}; daily matching is no longer scheduled")]
    ProfilesUnlocked { unlock_date: NaiveDate },
    #[error("no matching result stored for {date}")]
    NoResultForDate { date: NaiveDate },
    #[error("no backup record for cohort {cohort_id} on {date}")]
    BackupMissing { cohort_id: CohortId, date: NaiveDate },
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Engine producing one [`MatchingResult`] per cohort and target date.
pub struct ProfileMatchingEngine<S> {
    store: Arc<S>,
    config: MatchingConfig,
}

impl<S: DocumentStore> ProfileMatchingEngine<S> {
    pub fn new(store: Arc<S>, config: MatchingConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Run the current random policy for one target date without persisting.
    ///
    /// Rerunning with a different RNG state produces a different valid
    /// assignment; rerolling a bad draw is a supported operator path.
    pub fn preview_random(
        &self,
        cohort_id: &CohortId,
        target_date: NaiveDate,
        rng: &mut impl Rng,
    ) -> Result<MatchingRunReport, MatchingError> {
        let context = self.load_context(cohort_id)?;

        // The unlock state supersedes the daily formula; scheduled runs stop
        // once everyone can browse yesterday's certified set.
        if let Some(unlock_date) = context.cohort.profile_unlock_date {
            if target_date >= unlock_date {
                return Err(MatchingError::ProfilesUnlocked { unlock_date });
            }
        }

        let eligible = context.eligible(self.config.random_exclusion, target_date);

        if eligible.len() < self.config.min_participants {
            return Err(MatchingError::InsufficientParticipants {
                found: eligible.len(),
                required: self.config.min_participants,
            });
        }

        info!(
            cohort = %cohort_id,
            date = %target_date,
            eligible = eligible.len(),
            policy = self.config.random_exclusion.label(),
            "starting random matching run"
        );

        let recent = recent_assignments(
            &context.cohort,
            target_date,
            self.config.recent_window_days,
        );

        let mut assignments = BTreeMap::new();
        let mut shortfalls = Vec::new();

        for participant in &eligible {
            let certified = context
                .ledger
                .cumulative_count_before(&participant.id, target_date);
            let target = self.config.formula.target(certified);

            let others: Vec<&Participant> = eligible
                .iter()
                .filter(|candidate| candidate.id != participant.id)
                .copied()
                .collect();

            let recently_seen = recent.get(&participant.id);
            let fresh: Vec<&Participant> = others
                .iter()
                .filter(|candidate| {
                    !recently_seen.is_some_and(|seen| seen.contains(&candidate.id))
                })
                .copied()
                .collect();

            // Avoid repeats from the recent window only while enough fresh
            // candidates remain; a full-length list beats novelty.
            let pool = if fresh.len() >= target { &fresh } else { &others };

            let selected = random::select_with_gender_preference(pool, target, rng);
            if selected.len() < target {
                warn!(
                    participant = %participant.id,
                    target,
                    assigned = selected.len(),
                    "candidate pool smaller than target"
                );
                shortfalls.push(AssignmentShortfall {
                    participant: participant.id.clone(),
                    target,
                    assigned: selected.len(),
                });
            }

            assignments.insert(
                participant.id.clone(),
                RandomAssignment {
                    assigned: selected.iter().map(|p| p.id.clone()).collect(),
                },
            );
        }

        info!(
            cohort = %cohort_id,
            date = %target_date,
            assigned = assignments.len(),
            shortfalls = shortfalls.len(),
            "random matching run complete"
        );

        Ok(MatchingRunReport {
            cohort_id: cohort_id.clone(),
            target_date,
            eligible_count: eligible.len(),
            result: MatchingResult::Random(RandomMatching { assignments }),
            shortfalls,
        })
    }

    /// Run the legacy AI policy: the pairing itself comes from the injected
    /// classifier; this engine only gathers inputs and enforces invariants
    /// on whatever comes back.
    pub fn preview_ai(
        &self,
        cohort_id: &CohortId,
        target_date: NaiveDate,
        classifier: &dyn AffinityClassifier,
    ) -> Result<MatchingRunReport, MatchingError> {
        let context = self.load_context(cohort_id)?;
        let eligible = context.eligible(self.config.ai_exclusion, target_date);

        if eligible.len() < self.config.min_participants {
            return Err(MatchingError::InsufficientParticipants {
                found: eligible.len(),
                required: self.config.min_participants,
            });
        }

        let roster: Vec<Participant> = eligible.iter().map(|p| (*p).clone()).collect();
        validate_for_matching(&roster, self.config.min_per_gender)?;

        let schedule = DailyQuestionSchedule::new(self.store.daily_questions(cohort_id)?)?;
        let question = schedule.question_for_date(target_date, context.cohort.program_start());

        let answers = context.answers_on(target_date, &eligible);

        info!(
            cohort = %cohort_id,
            date = %target_date,
            eligible = eligible.len(),
            policy = self.config.ai_exclusion.label(),
            "requesting affinity pairing"
        );

        let ai_result = classifier.classify(&question.text, &answers)?;

        let skipped: Vec<String> = eligible
            .iter()
            .filter(|p| !ai_result.assignments.contains_key(&p.id))
            .map(|p| p.id.to_string())
            .collect();
        if !skipped.is_empty() {
            return Err(MatchingError::Classifier(ClassifierError::Malformed(
                format!("pairing skipped participant(s): {}", skipped.join(", ")),
            )));
        }

        if let Err(pairs) = validate_result_balance(&ai_result, &roster) {
            return Err(MatchingError::UnbalancedResult { pairs });
        }

        let result = MatchingResult::Ai(ai_result);
        let defects = structural_defects(&result);
        if !defects.is_empty() {
            return Err(MatchingError::CorruptResult { defects });
        }

        Ok(MatchingRunReport {
            cohort_id: cohort_id.clone(),
            target_date,
            eligible_count: eligible.len(),
            result,
            shortfalls: Vec::new(),
        })
    }

    /// Persist a result under one date key and write the immutable backup.
    ///
    /// Refuses structurally defective results at the boundary, and refuses
    /// to clobber an already-confirmed date (the repair path exists for
    /// that).
    pub fn confirm(
        &self,
        cohort_id: &CohortId,
        date: NaiveDate,
        result: MatchingResult,
    ) -> Result<(), MatchingError> {
        let defects = structural_defects(&result);
        if !defects.is_empty() {
            return Err(MatchingError::CorruptResult { defects });
        }

        self.store
            .confirm_daily_featured(cohort_id, date, result.clone())?;
        self.store.write_backup(cohort_id, date, result)?;

        info!(cohort = %cohort_id, %date, "matching result confirmed and backed up");
        Ok(())
    }

    /// Force-replace a date key from its confirmation-time backup. Used when
    /// the stored entry turned out stale or corrupt.
    pub fn overwrite_from_backup(
        &self,
        cohort_id: &CohortId,
        date: NaiveDate,
    ) -> Result<MatchingResult, MatchingError> {
        let backup = self
            .store
            .backup_result(cohort_id, date)?
            .ok_or_else(|| MatchingError::BackupMissing {
                cohort_id: cohort_id.clone(),
                date,
            })?;

        self.store
            .overwrite_daily_featured(cohort_id, date, backup.clone())?;

        warn!(
            cohort = %cohort_id,
            %date,
            version = backup.version_label(),
            "stored matching result overwritten from backup"
        );
        Ok(backup)
    }

    /// Inspect the stored result for one date and report defects. Besides
    /// the structural checks this flags odd-length books (usually a trimmed
    /// or hand-edited document, though a pool-limited shortfall produces
    /// them too, so they are reported for review rather than treated as
    /// fatal) and legacy `ai`-tagged documents, which only predate the
    /// current scheme and are due for regeneration.
    pub fn audit_stored(
        &self,
        cohort_id: &CohortId,
        date: NaiveDate,
    ) -> Result<Vec<ResultDefect>, MatchingError> {
        let cohort = self.load_cohort(cohort_id)?;
        let result = cohort
            .daily_featured
            .get(&date)
            .ok_or(MatchingError::NoResultForDate { date })?;

        let mut defects = structural_defects(result);
        match result {
            MatchingResult::Random(matching) => {
                for (viewer, assignment) in &matching.assignments {
                    if assignment.assigned.len() % 2 != 0 {
                        defects.push(ResultDefect::OddAssignmentCount {
                            participant: viewer.clone(),
                            len: assignment.assigned.len(),
                        });
                    }
                }
            }
            MatchingResult::Ai(_) => defects.push(ResultDefect::LegacyShape),
        }
        Ok(defects)
    }

    fn load_cohort(&self, cohort_id: &CohortId) -> Result<Cohort, MatchingError> {
        self.store
            .cohort(cohort_id)?
            .ok_or_else(|| MatchingError::CohortNotFound(cohort_id.clone()))
    }

    fn load_context(&self, cohort_id: &CohortId) -> Result<RunContext, MatchingError> {
        let cohort = self.load_cohort(cohort_id)?;
        let participants = self.store.participants_by_cohort(cohort_id)?;
        let submissions = self.store.submissions_by_cohort(cohort_id)?;
        let ledger = SubmissionLedger::from_submissions(&submissions);
        Ok(RunContext {
            cohort,
            participants,
            submissions,
            ledger,
        })
    }
}

struct RunContext {
    cohort: Cohort,
    participants: Vec<Participant>,
    submissions: Vec<ReadingSubmission>,
    ledger: SubmissionLedger,
}

impl RunContext {
    /// Certified-on-target-date roster after the exclusion policy.
    fn eligible(&self, policy: ExclusionPolicy, target_date: NaiveDate) -> Vec<&Participant> {
        self.participants
            .iter()
            .filter(|p| !policy.excludes(p))
            .filter(|p| self.ledger.submitted_on(&p.id, target_date))
            .collect()
    }

    /// Latest certified answer per eligible participant for the target date.
    fn answers_on(
        &self,
        target_date: NaiveDate,
        eligible: &[&Participant],
    ) -> Vec<ParticipantAnswer> {
        let ids: HashSet<&ParticipantId> = eligible.iter().map(|p| &p.id).collect();
        let mut latest: HashMap<&ParticipantId, &ReadingSubmission> = HashMap::new();
        for row in &self.submissions {
            if row.submission_date != target_date || !row.status.is_counted() {
                continue;
            }
            if !ids.contains(&row.participant_id) {
                continue;
            }
            latest
                .entry(&row.participant_id)
                .and_modify(|current| {
                    if row.submitted_at > current.submitted_at {
                        *current = row;
                    }
                })
                .or_insert(row);
        }

        eligible
            .iter()
            .filter_map(|p| latest.get(&p.id).map(|row| (p, row)))
            .map(|(p, row)| ParticipantAnswer {
                participant_id: p.id.clone(),
                gender: p.gender,
                answer: row.answer.clone().unwrap_or_default(),
            })
            .collect()
    }
}

/// Profile-books each participant received in the results stored for the
/// `window_days` dates strictly before the target date.
fn recent_assignments(
    cohort: &Cohort,
    target_date: NaiveDate,
    window_days: u64,
) -> HashMap<ParticipantId, BTreeSet<ParticipantId>> {
    let mut recent: HashMap<ParticipantId, BTreeSet<ParticipantId>> = HashMap::new();
    if window_days == 0 {
        return recent;
    }

    let window = match target_date.checked_sub_days(Days::new(window_days)) {
        Some(floor) => cohort.daily_featured.range(floor..target_date),
        None => cohort.daily_featured.range(..target_date),
    };

    for (_, result) in window {
        match result {
            MatchingResult::Random(matching) => {
                for (viewer, assignment) in &matching.assignments {
                    recent
                        .entry(viewer.clone())
                        .or_default()
                        .extend(assignment.assigned.iter().cloned());
                }
            }
            MatchingResult::Ai(matching) => {
                for (viewer, assignment) in &matching.assignments {
                    let entry = recent.entry(viewer.clone()).or_default();
                    entry.extend(assignment.similar.iter().cloned());
                    entry.extend(assignment.opposite.iter().cloned());
                }
            }
        }
    }

    recent
}

/// Check one result for the invariants every stored result must satisfy:
/// no self-assignment, no duplicates within one list. Parity is not checked
/// here; pool-limited shortfalls legitimately produce odd lists, so odd
/// lengths are reported by [`ProfileMatchingEngine::audit_stored`] instead.
pub fn structural_defects(result: &MatchingResult) -> Vec<ResultDefect> {
    let mut defects = Vec::new();

    let lists: Vec<(&ParticipantId, Vec<&ParticipantId>)> = match result {
        MatchingResult::Random(matching) => matching
            .assignments
            .iter()
            .map(|(viewer, assignment)| (viewer, assignment.assigned.iter().collect()))
            .collect(),
        MatchingResult::Ai(matching) => matching
            .assignments
            .iter()
            .map(|(viewer, assignment)| {
                let ids = assignment
                    .similar
                    .iter()
                    .chain(assignment.opposite.iter())
                    .collect();
                (viewer, ids)
            })
            .collect(),
    };

    for (viewer, ids) in lists {
        if ids.iter().any(|id| *id == viewer) {
            defects.push(ResultDefect::SelfAssignment {
                participant: viewer.clone(),
            });
        }

        let unique: HashSet<&&ParticipantId> = ids.iter().collect();
        if unique.len() != ids.len() {
            defects.push(ResultDefect::DuplicateAssignment {
                participant: viewer.clone(),
            });
        }
    }

    defects
}
