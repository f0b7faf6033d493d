use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{Local, NaiveDate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use serde_json::json;

use super::domain::{CohortId, MatchingResult, ParticipantId};
use super::engine::{
    AffinityClassifier, ClassifierError, MatchingError, ProfileMatchingEngine,
};
use super::schedule::DailyQuestionSchedule;
use super::store::{DocumentStore, StoreError};
use super::unlock::resolve_visible_profiles;
use super::validation::RosterValidationError;
use super::window;

/// Shared handler state: the engine plus the optional legacy classifier.
pub struct MatchingApi<S> {
    engine: ProfileMatchingEngine<S>,
    classifier: Option<Arc<dyn AffinityClassifier>>,
}

impl<S> MatchingApi<S> {
    pub fn new(
        engine: ProfileMatchingEngine<S>,
        classifier: Option<Arc<dyn AffinityClassifier>>,
    ) -> Self {
        Self { engine, classifier }
    }

    pub fn engine(&self) -> &ProfileMatchingEngine<S> {
        &self.engine
    }
}

/// Router builder exposing the matching and library endpoints.
pub fn matching_router<S>(api: Arc<MatchingApi<S>>) -> Router
where
    S: DocumentStore + 'static,
{
    Router::new()
        .route("/api/v1/matching/run", post(run_handler::<S>))
        .route("/api/v1/matching/confirm", post(confirm_handler::<S>))
        .route("/api/v1/matching/repair", post(repair_handler::<S>))
        .route(
            "/api/v1/library/:cohort_id/:participant_id",
            get(library_handler::<S>),
        )
        .route("/api/v1/questions/:cohort_id", get(question_handler::<S>))
        .with_state(api)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchingPolicy {
    #[default]
    Random,
    Ai,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub cohort_id: String,
    #[serde(default)]
    pub policy: MatchingPolicy,
    /// Logical date to match; defaults to yesterday per the 2 AM window.
    pub target_date: Option<NaiveDate>,
    /// Fixed RNG seed for reproducible reruns (random policy only).
    pub seed: Option<u64>,
}

pub(crate) async fn run_handler<S>(
    State(api): State<Arc<MatchingApi<S>>>,
    axum::Json(request): axum::Json<RunRequest>,
) -> Response
where
    S: DocumentStore + 'static,
{
    let cohort_id = CohortId(request.cohort_id);

    let target_date = match request.target_date {
        Some(date) => date,
        None => match window::matching_target_date(Local::now().naive_local()) {
            Some(date) => date,
            None => {
                let payload = json!({
                    "error": "matching is paused during the overnight grace window",
                });
                return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload))
                    .into_response();
            }
        },
    };

    let outcome = match request.policy {
        MatchingPolicy::Random => {
            let mut rng = match request.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            api.engine.preview_random(&cohort_id, target_date, &mut rng)
        }
        MatchingPolicy::Ai => match &api.classifier {
            Some(classifier) => {
                api.engine
                    .preview_ai(&cohort_id, target_date, classifier.as_ref())
            }
            None => {
                let payload = json!({
                    "error": "no affinity classifier is configured",
                });
                return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload))
                    .into_response();
            }
        },
    };

    match outcome {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub cohort_id: String,
    pub date: NaiveDate,
    pub result: MatchingResult,
}

pub(crate) async fn confirm_handler<S>(
    State(api): State<Arc<MatchingApi<S>>>,
    axum::Json(request): axum::Json<ConfirmRequest>,
) -> Response
where
    S: DocumentStore + 'static,
{
    let cohort_id = CohortId(request.cohort_id);
    match api.engine.confirm(&cohort_id, request.date, request.result) {
        Ok(()) => {
            let payload = json!({
                "cohort_id": cohort_id.0,
                "date": request.date,
                "status": "confirmed",
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub struct RepairRequest {
    pub cohort_id: String,
    pub date: NaiveDate,
}

pub(crate) async fn repair_handler<S>(
    State(api): State<Arc<MatchingApi<S>>>,
    axum::Json(request): axum::Json<RepairRequest>,
) -> Response
where
    S: DocumentStore + 'static,
{
    let cohort_id = CohortId(request.cohort_id);
    match api.engine.overwrite_from_backup(&cohort_id, request.date) {
        Ok(restored) => {
            let payload = json!({
                "cohort_id": cohort_id.0,
                "date": request.date,
                "status": "repaired",
                "matchingVersion": restored.version_label(),
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub struct LibraryQuery {
    /// Logical date of the request; the caller applies the 2 AM window.
    pub today: NaiveDate,
}

pub(crate) async fn library_handler<S>(
    State(api): State<Arc<MatchingApi<S>>>,
    Path((cohort_id, participant_id)): Path<(String, String)>,
    Query(query): Query<LibraryQuery>,
) -> Response
where
    S: DocumentStore + 'static,
{
    let cohort_id = CohortId(cohort_id);
    let viewer = ParticipantId(participant_id);

    match resolve_visible_profiles(
        api.engine.store().as_ref(),
        &cohort_id,
        &viewer,
        query.today,
    ) {
        Ok(visible) => {
            let payload = json!({
                "visibility": visible.visibility.label(),
                "profiles": visible.profiles,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub struct QuestionQuery {
    pub date: NaiveDate,
}

pub(crate) async fn question_handler<S>(
    State(api): State<Arc<MatchingApi<S>>>,
    Path(cohort_id): Path<String>,
    Query(query): Query<QuestionQuery>,
) -> Response
where
    S: DocumentStore + 'static,
{
    let cohort_id = CohortId(cohort_id);
    let store = api.engine.store();

    let cohort = match store.cohort(&cohort_id) {
        Ok(Some(cohort)) => cohort,
        Ok(None) => return error_response(MatchingError::CohortNotFound(cohort_id)),
        Err(error) => return error_response(MatchingError::Store(error)),
    };

    let schedule = match store
        .daily_questions(&cohort_id)
        .map_err(MatchingError::Store)
        .and_then(|questions| DailyQuestionSchedule::new(questions).map_err(Into::into))
    {
        Ok(schedule) => schedule,
        Err(error) => return error_response(error),
    };

    let question = schedule.question_for_date(query.date, cohort.program_start());
    let payload = json!({
        "date": query.date,
        "category": question.category,
        "text": question.text,
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

/// Map engine errors onto HTTP statuses. Validation failures carry the full
/// offender list so the caller sees everything in one response.
fn error_response(error: MatchingError) -> Response {
    let (status, payload) = match &error {
        MatchingError::CohortNotFound(_)
        | MatchingError::NoResultForDate { .. }
        | MatchingError::BackupMissing { .. }
        | MatchingError::Store(StoreError::NotFound) => (
            StatusCode::NOT_FOUND,
            json!({ "error": error.to_string() }),
        ),
        MatchingError::Store(StoreError::Conflict) => (
            StatusCode::CONFLICT,
            json!({ "error": "a confirmed result already exists for this date" }),
        ),
        MatchingError::InsufficientParticipants { found, required } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": error.to_string(),
                "found": found,
                "required": required,
            }),
        ),
        MatchingError::Roster(RosterValidationError::MissingGenderData { participants }) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": error.to_string(),
                "participants": participants,
            }),
        ),
        MatchingError::Roster(RosterValidationError::InsufficientGenderPool {
            male,
            female,
            required,
        }) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": error.to_string(),
                "male": male,
                "female": female,
                "required": required,
            }),
        ),
        MatchingError::UnbalancedResult { pairs } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": error.to_string(),
                "pairs": pairs,
            }),
        ),
        MatchingError::CorruptResult { defects } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": error.to_string(),
                "defects": defects,
            }),
        ),
        MatchingError::ProfilesUnlocked { .. } | MatchingError::Schedule(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": error.to_string() }),
        ),
        MatchingError::Classifier(ClassifierError::Unavailable(_))
        | MatchingError::Classifier(ClassifierError::Malformed(_)) => (
            StatusCode::BAD_GATEWAY,
            json!({ "error": error.to_string() }),
        ),
        MatchingError::Store(StoreError::Unavailable(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": error.to_string() }),
        ),
    };

    (status, axum::Json(payload)).into_response()
}
