mod config;
mod db;
mod errors;
mod models;
mod quiz;
mod results;
mod routes;
mod state;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::quiz::catalog::QuestionCatalog;
use crate::quiz::ranking::{NoiseRanker, Ranker};
use crate::quiz::sessions::SessionRegistry;
use crate::results::{MemoryResultStore, PgResultStore, ResultStore};
use crate::routes::build_router;
use crate::state::AppState;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting SkillPath quiz API v{}", env!("CARGO_PKG_VERSION"));

    // Load quiz content
    let catalog = Arc::new(QuestionCatalog::load(&config.quiz_data_dir)?);

    // Result store: Postgres when configured, in-process otherwise
    let results: Arc<dyn ResultStore> = match &config.database_url {
        Some(url) => Arc::new(PgResultStore(create_pool(url).await?)),
        None => {
            warn!("DATABASE_URL not set; quiz results are kept in memory only");
            Arc::new(MemoryResultStore::new())
        }
    };
    info!("Result store: {}", results.backend());

    // Re-ranker for rejected confirmations (placeholder until a trained model exists)
    let ranker: Arc<dyn Ranker> = Arc::new(NoiseRanker);
    info!("Ranker: {}", ranker.name());

    let seeder = match config.quiz_rng_seed {
        Some(seed) => {
            info!("Quiz RNG seeded with {seed}");
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    };

    // Build app state
    let state = AppState {
        catalog,
        sessions: SessionRegistry::new(),
        ranker,
        results,
        seeder: Arc::new(Mutex::new(seeder)),
    };

    // Sweep abandoned sessions
    {
        let sessions = state.sessions.clone();
        let max_idle = config.session_idle_timeout;
        info!("Idle quiz sessions expire after {}s", max_idle.as_secs());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                sessions.sweep_idle(max_idle).await;
            }
        });
    }

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
