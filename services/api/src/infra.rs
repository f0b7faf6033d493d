use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use philip_sophy::config::MatchingSettings;
use philip_sophy::error::AppError;
use philip_sophy::matching::domain::{
    Cohort, CohortId, MatchingResult, Participant, ReadingSubmission,
};
use philip_sophy::matching::engine::{ExclusionPolicy, MatchingConfig, SizeFormula};
use philip_sophy::matching::schedule::DailyQuestion;
use philip_sophy::matching::store::{DocumentStore, StoreError};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Everything the matching pipeline reads for one cohort, as exported from
/// the production document store.
#[derive(Debug, Deserialize)]
pub(crate) struct CohortSnapshot {
    pub(crate) cohort: Cohort,
    #[serde(default)]
    pub(crate) participants: Vec<Participant>,
    #[serde(default)]
    pub(crate) submissions: Vec<ReadingSubmission>,
    #[serde(default)]
    pub(crate) questions: Vec<DailyQuestion>,
    /// Confirmation-time backup records for this cohort, keyed by date.
    #[serde(default)]
    pub(crate) backups: BTreeMap<NaiveDate, MatchingResult>,
}

pub(crate) fn load_snapshot(path: &Path) -> Result<CohortSnapshot, AppError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Document store backed by process memory. Serves local runs and demos;
/// the per-cohort result map is updated under one lock so the atomic
/// read-map/set-key/write-map contract holds.
#[derive(Default)]
pub(crate) struct InMemoryDocumentStore {
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    cohorts: HashMap<CohortId, Cohort>,
    participants: HashMap<CohortId, Vec<Participant>>,
    submissions: HashMap<CohortId, Vec<ReadingSubmission>>,
    questions: HashMap<CohortId, Vec<DailyQuestion>>,
    backups: HashMap<(CohortId, NaiveDate), MatchingResult>,
}

impl InMemoryDocumentStore {
    pub(crate) fn load(&self, snapshot: CohortSnapshot) {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let id = snapshot.cohort.id.clone();
        state.cohorts.insert(id.clone(), snapshot.cohort);
        state.participants.insert(id.clone(), snapshot.participants);
        state.submissions.insert(id.clone(), snapshot.submissions);
        state.questions.insert(id.clone(), snapshot.questions);
        for (date, result) in snapshot.backups {
            state.backups.insert((id.clone(), date), result);
        }
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn cohort(&self, id: &CohortId) -> Result<Option<Cohort>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.cohorts.get(id).cloned())
    }

    fn participants_by_cohort(&self, id: &CohortId) -> Result<Vec<Participant>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.participants.get(id).cloned().unwrap_or_default())
    }

    fn submissions_by_cohort(&self, id: &CohortId) -> Result<Vec<ReadingSubmission>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.submissions.get(id).cloned().unwrap_or_default())
    }

    fn daily_questions(&self, id: &CohortId) -> Result<Vec<DailyQuestion>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.questions.get(id).cloned().unwrap_or_default())
    }

    fn confirm_daily_featured(
        &self,
        id: &CohortId,
        date: NaiveDate,
        result: MatchingResult,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let cohort = state.cohorts.get_mut(id).ok_or(StoreError::NotFound)?;
        if cohort.daily_featured.contains_key(&date) {
            return Err(StoreError::Conflict);
        }
        cohort.daily_featured.insert(date, result);
        Ok(())
    }

    fn overwrite_daily_featured(
        &self,
        id: &CohortId,
        date: NaiveDate,
        result: MatchingResult,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let cohort = state.cohorts.get_mut(id).ok_or(StoreError::NotFound)?;
        cohort.daily_featured.insert(date, result);
        Ok(())
    }

    fn backup_result(
        &self,
        id: &CohortId,
        date: NaiveDate,
    ) -> Result<Option<MatchingResult>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.backups.get(&(id.clone(), date)).cloned())
    }

    fn write_backup(
        &self,
        id: &CohortId,
        date: NaiveDate,
        result: MatchingResult,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let key = (id.clone(), date);
        if state.backups.contains_key(&key) {
            return Err(StoreError::Conflict);
        }
        state.backups.insert(key, result);
        Ok(())
    }
}

pub(crate) fn matching_config(settings: &MatchingSettings) -> MatchingConfig {
    MatchingConfig {
        formula: SizeFormula {
            offset: settings.size_offset,
        },
        random_exclusion: ExclusionPolicy::SuperAdminsOnly,
        ai_exclusion: ExclusionPolicy::AllAdministrators,
        min_participants: settings.min_participants,
        min_per_gender: settings.min_per_gender,
        ..MatchingConfig::default()
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
