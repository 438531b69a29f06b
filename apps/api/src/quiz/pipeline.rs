//! Three-stage quiz pipeline: cluster → domain → role.
//!
//! A `QuizSession` owns one `QuizEngine` at a time. When a stage terminates,
//! its winning label scopes the catalog for the next stage and a fresh engine
//! replaces the old one. Nothing is shared between stage engines.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::quiz::answer::Answer;
use crate::quiz::catalog::QuestionCatalog;
use crate::quiz::engine::{EngineState, Prompt, QuizEngine, StageEvent};
use crate::quiz::ranking::Ranker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Cluster,
    Domain,
    Role,
    Done,
}

impl Stage {
    pub const QUESTION_STAGES: [Stage; 3] = [Stage::Cluster, Stage::Domain, Stage::Role];

    pub fn next(self) -> Stage {
        match self {
            Stage::Cluster => Stage::Domain,
            Stage::Domain => Stage::Role,
            Stage::Role | Stage::Done => Stage::Done,
        }
    }

    /// Zero-based position among the question stages (3 for `Done`).
    pub fn position(self) -> usize {
        match self {
            Stage::Cluster => 0,
            Stage::Domain => 1,
            Stage::Role => 2,
            Stage::Done => 3,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Stage::Cluster => "Stage 1: Discover Your Tech Cluster",
            Stage::Domain => "Stage 2: Find Your Domain",
            Stage::Role => "Stage 3: Identify Your Role",
            Stage::Done => "Quiz Complete!",
        }
    }
}

/// Winning label of each stage so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predictions {
    pub cluster: Option<String>,
    pub domain: Option<String>,
    pub role: Option<String>,
}

impl Predictions {
    fn record(&mut self, stage: Stage, label: Option<String>) {
        match stage {
            Stage::Cluster => self.cluster = label,
            Stage::Domain => self.domain = label,
            Stage::Role => self.role = label,
            Stage::Done => {}
        }
    }
}

/// One answered question, kept for the persisted result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub stage: Stage,
    pub question: String,
    pub label: String,
    pub answer: Answer,
}

/// Outcome of submitting one answer to a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpdate {
    /// Stage the answer was submitted to.
    pub stage: Stage,
    pub event: StageEvent,
    /// True when this answer finished the whole quiz.
    pub finished: bool,
}

pub struct QuizSession {
    pub id: Uuid,
    pub user_id: Uuid,
    stage: Stage,
    engine: QuizEngine,
    predictions: Predictions,
    tie_break_round: u32,
    tied_labels: Vec<String>,
    transcript: Vec<TranscriptEntry>,
    catalog: Arc<QuestionCatalog>,
    ranker: Arc<dyn Ranker>,
    rng: StdRng,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    persisted: bool,
}

impl QuizSession {
    /// Starts a session at the cluster stage. Stages that complete on
    /// construction (no labels or no questions) are skipped through.
    pub fn start(
        user_id: Uuid,
        catalog: Arc<QuestionCatalog>,
        ranker: Arc<dyn Ranker>,
        mut rng: StdRng,
    ) -> Self {
        let engine = build_engine(&catalog, &ranker, &mut rng, Stage::Cluster, None);
        let mut session = Self {
            id: Uuid::new_v4(),
            user_id,
            stage: Stage::Cluster,
            engine,
            predictions: Predictions::default(),
            tie_break_round: 0,
            tied_labels: Vec::new(),
            transcript: Vec::new(),
            catalog,
            ranker,
            rng,
            started_at: Utc::now(),
            completed_at: None,
            persisted: false,
        };
        info!("Quiz session {} started for user {}", session.id, user_id);
        session.advance_completed_stages();
        session
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn predictions(&self) -> &Predictions {
        &self.predictions
    }

    /// Labels of the most recent tie-break in the current stage.
    pub fn tied_labels(&self) -> &[String] {
        &self.tied_labels
    }

    pub fn tie_break_round(&self) -> u32 {
        self.tie_break_round
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Done, but the result has not reached the result store yet.
    pub fn needs_persist(&self) -> bool {
        self.is_done() && !self.persisted
    }

    pub fn mark_persisted(&mut self) {
        self.persisted = true;
    }

    pub fn engine_state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn current_question(&self) -> Option<&Prompt> {
        if self.is_done() {
            return None;
        }
        self.engine.current_question()
    }

    /// Submits an answer to the current stage and, if it terminates, moves
    /// on to the next one.
    pub fn submit(&mut self, raw_answer: &str) -> SessionUpdate {
        let stage = self.stage;
        if self.is_done() {
            return SessionUpdate {
                stage,
                event: StageEvent::AlreadyComplete {
                    prediction: self.predictions.role.clone(),
                },
                finished: false,
            };
        }

        if let Some(prompt) = self.engine.current_question() {
            self.transcript.push(TranscriptEntry {
                stage,
                question: prompt.question.clone(),
                label: prompt.label.clone(),
                answer: Answer::parse_lenient(raw_answer),
            });
        }

        let event = self.engine.answer(raw_answer);
        match &event {
            StageEvent::TieBreak { tied_labels, .. } => {
                self.tie_break_round += 1;
                self.tied_labels = tied_labels.clone();
            }
            StageEvent::Complete { .. } => self.advance_completed_stages(),
            _ => {}
        }

        SessionUpdate {
            stage,
            event,
            finished: self.is_done(),
        }
    }

    /// Records the predictions of completed engines and builds the next
    /// stage's engine until one is waiting for an answer or the quiz is done.
    fn advance_completed_stages(&mut self) {
        while !self.is_done() && self.engine.is_complete() {
            let prediction = self.engine.prediction().map(str::to_owned);
            info!(
                "Session {} finished {:?} stage: {:?}",
                self.id, self.stage, prediction
            );
            self.predictions.record(self.stage, prediction.clone());
            self.stage = self.stage.next();
            self.tie_break_round = 0;
            self.tied_labels.clear();

            if self.is_done() {
                self.completed_at = Some(Utc::now());
                break;
            }
            self.engine = build_engine(
                &self.catalog,
                &self.ranker,
                &mut self.rng,
                self.stage,
                prediction.as_deref(),
            );
        }
    }

    /// Overall completion, 0–100. Each question stage is an equal share; the
    /// current stage contributes the answered fraction of its open round.
    pub fn progress(&self) -> f64 {
        if self.is_done() {
            return 100.0;
        }
        let share = 100.0 / Stage::QUESTION_STAGES.len() as f64;
        let completed = self.stage.position() as f64 * share;
        let round_len = self.engine.round_len();
        if round_len == 0 {
            return completed;
        }
        completed + share * (self.engine.round_index() as f64 / round_len as f64)
    }

    /// Short caption for the current question.
    pub fn context_line(&self) -> String {
        if self.is_done() {
            return String::new();
        }
        match self.engine.state() {
            EngineState::TieBreak => format!(
                "Tie-break round {} between: {}",
                self.tie_break_round,
                self.tied_labels.join(", ")
            ),
            EngineState::Confirming => "Final confirmation question".to_string(),
            EngineState::Asking => format!(
                "Question {} of {}",
                self.engine.round_index() + 1,
                self.engine.round_len()
            ),
            EngineState::Complete => String::new(),
        }
    }
}

fn build_engine(
    catalog: &QuestionCatalog,
    ranker: &Arc<dyn Ranker>,
    rng: &mut StdRng,
    stage: Stage,
    parent: Option<&str>,
) -> QuizEngine {
    let pool = catalog.pool_for(stage, parent);
    if pool.is_empty() {
        warn!("{:?} stage has no labels under {:?}; it completes without a prediction", stage, parent);
    } else {
        info!("Building {:?} stage over {} labels", stage, pool.len());
    }
    QuizEngine::new(pool, Arc::clone(ranker), StdRng::seed_from_u64(rng.gen()))
}
