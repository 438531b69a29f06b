use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;

use crate::quiz::catalog::QuestionCatalog;
use crate::quiz::ranking::Ranker;
use crate::quiz::sessions::SessionRegistry;
use crate::results::ResultStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<QuestionCatalog>,
    pub sessions: SessionRegistry,
    /// Pluggable re-ranker consulted on rejected confirmations. Default: NoiseRanker.
    pub ranker: Arc<dyn Ranker>,
    /// Pluggable result store. Postgres when DATABASE_URL is set, memory otherwise.
    pub results: Arc<dyn ResultStore>,
    /// Seeds each new session's RNG. Seeded from QUIZ_RNG_SEED when set.
    pub seeder: Arc<Mutex<StdRng>>,
}

impl AppState {
    /// A fresh RNG for one quiz session.
    pub async fn session_rng(&self) -> StdRng {
        let seed: u64 = self.seeder.lock().await.gen();
        StdRng::seed_from_u64(seed)
    }
}
