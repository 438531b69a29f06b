//! Axum route handlers for the Quiz API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::quiz_result::QuizResultRow;
use crate::quiz::engine::{EngineState, Prompt, StageEvent};
use crate::quiz::pipeline::{Predictions, QuizSession, Stage};
use crate::quiz::sessions::SharedSession;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    /// Free text; "yes", "not sure" and "no" are recognised, anything else counts as "no".
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

/// Snapshot of a session for the UI.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: Uuid,
    pub stage: Stage,
    pub stage_title: &'static str,
    pub state: EngineState,
    pub question: Option<Prompt>,
    pub context: String,
    pub progress: f64,
    pub tie_break_round: u32,
    pub tied_labels: Vec<String>,
    pub predictions: Predictions,
    pub quiz_complete: bool,
}

impl SessionView {
    fn of(session: &QuizSession) -> Self {
        Self {
            session_id: session.id,
            stage: session.stage(),
            stage_title: session.stage().title(),
            state: session.engine_state(),
            question: session.current_question().cloned(),
            context: session.context_line(),
            progress: session.progress(),
            tie_break_round: session.tie_break_round(),
            tied_labels: session.tied_labels().to_vec(),
            predictions: session.predictions().clone(),
            quiz_complete: session.is_done(),
        }
    }
}

/// Flat rendering of a `StageEvent`, in the shape the quiz page consumes.
#[derive(Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub is_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub needs_tie_break: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tied_labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_question: Option<Prompt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_question: Option<Prompt>,
}

impl From<StageEvent> for StageResult {
    fn from(event: StageEvent) -> Self {
        match event {
            StageEvent::NextQuestion(prompt) => StageResult {
                next_question: Some(prompt),
                ..Default::default()
            },
            StageEvent::TieBreak {
                tied_labels,
                next_question,
            } => StageResult {
                needs_tie_break: true,
                tied_labels: Some(tied_labels),
                next_question: Some(next_question),
                ..Default::default()
            },
            StageEvent::Confirmation(prompt) => StageResult {
                confirmation_question: Some(prompt),
                ..Default::default()
            },
            StageEvent::Complete { prediction } | StageEvent::AlreadyComplete { prediction } => {
                StageResult {
                    is_complete: true,
                    prediction,
                    ..Default::default()
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    /// Stage the answer was applied to.
    pub answered_stage: Stage,
    pub result: StageResult,
    pub session: SessionView,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/quiz/sessions
///
/// Starts a new three-stage quiz for the user and returns the first question.
pub async fn handle_start_session(
    State(state): State<AppState>,
    Json(request): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    if request.user_id.is_nil() {
        return Err(AppError::Validation("user_id cannot be nil".to_string()));
    }

    let rng = state.session_rng().await;
    let mut session = QuizSession::start(
        request.user_id,
        state.catalog.clone(),
        state.ranker.clone(),
        rng,
    );
    // nothing to ask when the catalog produced no questions at all
    persist_if_done(&state, &mut session).await?;

    let view = SessionView::of(&session);
    if !session.is_done() {
        state.sessions.insert(session).await;
    }
    info!(
        "Quiz session {} created ({} live)",
        view.session_id,
        state.sessions.len().await
    );
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/v1/quiz/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let shared = find_session(&state, session_id).await?;
    let session = shared.lock().await;
    Ok(Json(SessionView::of(&session)))
}

/// POST /api/v1/quiz/sessions/:id/answers
///
/// Applies one answer. Once the role stage finishes the predictions are
/// persisted through the configured result store and the session is closed.
/// If the store fails, the finished session stays open and the next answer
/// retries the save.
pub async fn handle_submit_answer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    let shared = find_session(&state, session_id).await?;
    let mut session = shared.lock().await;

    let update = session.submit(&request.answer);
    if update.finished {
        info!("Quiz session {session_id} answered its last question");
    }
    persist_if_done(&state, &mut session).await?;

    Ok(Json(AnswerResponse {
        answered_stage: update.stage,
        result: update.event.into(),
        session: SessionView::of(&session),
    }))
}

/// DELETE /api/v1/quiz/sessions/:id
pub async fn handle_delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .sessions
        .remove(session_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/quiz/results?user_id=
///
/// Latest persisted predictions for the user.
pub async fn handle_latest_result(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<QuizResultRow>, AppError> {
    let result = state
        .results
        .latest_for_user(params.user_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("No quiz result for user {}", params.user_id))
        })?;
    Ok(Json(result))
}

/// Saves a finished session's result exactly once, then drops the session
/// from the registry. A failed save leaves both untouched.
async fn persist_if_done(state: &AppState, session: &mut QuizSession) -> Result<(), AppError> {
    if !session.needs_persist() {
        return Ok(());
    }
    info!("Quiz session {} complete; persisting predictions", session.id);
    state
        .results
        .save(&QuizResultRow::from_session(session))
        .await?;
    session.mark_persisted();
    state.sessions.remove(session.id).await;
    Ok(())
}

async fn find_session(state: &AppState, session_id: Uuid) -> Result<SharedSession, AppError> {
    state
        .sessions
        .get(session_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))
}
