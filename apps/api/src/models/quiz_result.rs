use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::quiz::pipeline::QuizSession;

/// Final predictions of a completed quiz session.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuizResultRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub cluster: Option<String>,
    pub domain: Option<String>,
    pub role: Option<String>,
    /// Answered questions, in order, as a JSON array.
    pub transcript: Value,
    pub completed_at: DateTime<Utc>,
}

impl QuizResultRow {
    pub fn from_session(session: &QuizSession) -> Self {
        let predictions = session.predictions();
        Self {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            session_id: session.id,
            cluster: predictions.cluster.clone(),
            domain: predictions.domain.clone(),
            role: predictions.role.clone(),
            transcript: serde_json::to_value(session.transcript()).unwrap_or(Value::Null),
            completed_at: session.completed_at.unwrap_or_else(Utc::now),
        }
    }
}
