//! Process-wide table of live sessions.
//!
//! The map only holds actor addresses. Creating a session loads its content outside the
//! lock and re-checks under the write lock, so two racing joins still end up talking to
//! the same actor.

use crate::config::Timings;
use crate::content::ContentProvider;
use crate::error::SessionError;
use crate::persistence::ResultStore;
use crate::session::{Session, SessionActor, SessionHandle};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct Registry {
    sessions: Arc<RwLock<HashMap<SessionId, SessionHandle>>>,
    content: Arc<dyn ContentProvider>,
    store: Arc<dyn ResultStore>,
    timings: Timings,
}

impl Registry {
    pub fn new(
        content: Arc<dyn ContentProvider>,
        store: Arc<dyn ResultStore>,
        timings: Timings,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            content,
            store,
            timings,
        }
    }

    /// Returns the live session, creating it from the content provider when absent.
    pub async fn create_or_get(&self, session_id: &str) -> Result<SessionHandle, SessionError> {
        if let Some(handle) = self.live(session_id).await {
            return Ok(handle);
        }

        let content = self.content.load(session_id)?;

        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(session_id).filter(|h| !h.is_closed()) {
            return Ok(handle.clone());
        }

        let mut rng = StdRng::from_entropy();
        let session = Session::new(session_id.to_string(), content, &mut rng);
        let handle = SessionActor::spawn(session, rng, self.clone());
        sessions.insert(session_id.to_string(), handle.clone());
        info!(
            "Created session {} ({} active)",
            session_id,
            sessions.len()
        );
        Ok(handle)
    }

    pub async fn get(&self, session_id: &str) -> Result<SessionHandle, SessionError> {
        self.live(session_id)
            .await
            .ok_or_else(|| SessionError::NotFound("Session".to_string()))
    }

    async fn live(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            info!("Removed session {} from the registry", session_id);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn timings(&self) -> Timings {
        self.timings
    }

    pub fn store(&self) -> Arc<dyn ResultStore> {
        Arc::clone(&self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::content;
    use crate::content::StaticContent;
    use crate::persistence::MemoryStore;
    use shared::Format;

    fn registry() -> Registry {
        Registry::new(
            Arc::new(StaticContent::new().with_session("s1", content(Format::Crossword, 1))),
            Arc::new(MemoryStore::new()),
            Timings::default(),
        )
    }

    #[tokio::test]
    async fn test_create_or_get_is_idempotent() {
        let registry = registry();

        let first = registry.create_or_get("s1").await.unwrap();
        let second = registry.create_or_get("s1").await.unwrap();
        assert_eq!(first.session_id(), second.session_id());
        assert_eq!(registry.len().await, 1);

        first.snapshot().await.unwrap();
        second.snapshot().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_sessions() {
        let registry = registry();

        assert_eq!(
            registry.create_or_get("missing").await.unwrap_err(),
            SessionError::NotFound("Session".to_string())
        );
        assert_eq!(
            registry.get("s1").await.unwrap_err(),
            SessionError::NotFound("Session".to_string())
        );
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = registry();
        registry.create_or_get("s1").await.unwrap();

        assert!(registry.remove("s1").await);
        assert!(!registry.remove("s1").await);
        assert!(registry.get("s1").await.is_err());
    }
}
