//! In-memory credential slot for the single connected page.
//!
//! The relay is a single-tenant demo: at most one page-scoped token is live
//! at a time, held in volatile memory with no expiry tracking. The slot is a
//! mutex-guarded `Option` so connect/disconnect/publish all go through one
//! writer path.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct PageSession {
    pub page_token: String,
    pub connected_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    slot: Arc<Mutex<Option<PageSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a freshly acquired page token, replacing any previous session.
    pub async fn connect(&self, page_token: String) {
        let mut slot = self.slot.lock().await;
        *slot = Some(PageSession {
            page_token,
            connected_at: Utc::now(),
        });
    }

    /// Clear the stored session. Returns whether a session was present.
    pub async fn disconnect(&self) -> bool {
        let mut slot = self.slot.lock().await;
        slot.take().is_some()
    }

    /// Current page token, if connected.
    pub async fn page_token(&self) -> Option<String> {
        let slot = self.slot.lock().await;
        slot.as_ref().map(|s| s.page_token.clone())
    }
}
