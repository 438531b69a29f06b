use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

use crate::quiz::pipeline::QuizSession;

pub type SharedSession = Arc<Mutex<QuizSession>>;

struct Entry {
    session: SharedSession,
    last_touched: Instant,
}

/// In-memory registry of live quiz sessions.
///
/// Each session sits behind its own mutex so answers to one session are
/// applied strictly one at a time while other sessions proceed freely.
/// Sessions leave the registry once their result is persisted, on explicit
/// delete, or when idle past the sweep timeout.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, Entry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: QuizSession) -> SharedSession {
        let id = session.id;
        let shared = Arc::new(Mutex::new(session));
        let entry = Entry {
            session: Arc::clone(&shared),
            last_touched: Instant::now(),
        };
        self.sessions.write().await.insert(id, entry);
        shared
    }

    /// Looks up a session and refreshes its idle clock.
    pub async fn get(&self, id: Uuid) -> Option<SharedSession> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id)?;
        entry.last_touched = Instant::now();
        Some(Arc::clone(&entry.session))
    }

    pub async fn remove(&self, id: Uuid) -> Option<SharedSession> {
        self.sessions.write().await.remove(&id).map(|e| e.session)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drops sessions untouched for longer than `max_idle`. Returns how many went.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_touched.elapsed() <= max_idle);
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!("Evicted {evicted} idle quiz sessions ({} live)", sessions.len());
        }
        evicted
    }
}
