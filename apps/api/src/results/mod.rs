//! Result persistence — pluggable, trait-based store for finished quizzes.
//!
//! Default: `PgResultStore` when `DATABASE_URL` is set.
//! Fallback: `MemoryResultStore` (process-local, also used by tests).
//!
//! `AppState` holds an `Arc<dyn ResultStore>`, chosen at startup via config.

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::quiz_result::QuizResultRow;

#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save(&self, result: &QuizResultRow) -> Result<(), AppError>;

    async fn latest_for_user(&self, user_id: Uuid) -> Result<Option<QuizResultRow>, AppError>;

    /// Backend name, for startup logs.
    fn backend(&self) -> &'static str;
}

// ────────────────────────────────────────────────────────────────────────────
// PgResultStore
// ────────────────────────────────────────────────────────────────────────────

pub struct PgResultStore(pub PgPool);

#[async_trait]
impl ResultStore for PgResultStore {
    async fn save(&self, result: &QuizResultRow) -> Result<(), AppError> {
        // Append-only: a retaken quiz adds a row, older results stay
        sqlx::query(
            r#"
            INSERT INTO quiz_results
                (id, user_id, session_id, cluster, domain, role, transcript, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(result.id)
        .bind(result.user_id)
        .bind(result.session_id)
        .bind(&result.cluster)
        .bind(&result.domain)
        .bind(&result.role)
        .bind(&result.transcript)
        .bind(result.completed_at)
        .execute(&self.0)
        .await?;

        info!(
            "Stored quiz result {} for user {}",
            result.id, result.user_id
        );
        Ok(())
    }

    async fn latest_for_user(&self, user_id: Uuid) -> Result<Option<QuizResultRow>, AppError> {
        let row = sqlx::query_as::<_, QuizResultRow>(
            "SELECT * FROM quiz_results WHERE user_id = $1 ORDER BY completed_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.0)
        .await?;
        Ok(row)
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MemoryResultStore
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryResultStore {
    rows: RwLock<Vec<QuizResultRow>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn save(&self, result: &QuizResultRow) -> Result<(), AppError> {
        self.rows.write().await.push(result.clone());
        Ok(())
    }

    async fn latest_for_user(&self, user_id: Uuid) -> Result<Option<QuizResultRow>, AppError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| r.user_id == user_id)
            .max_by_key(|r| r.completed_at)
            .cloned())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
