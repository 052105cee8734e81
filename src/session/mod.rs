use log::{ debug, info };
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{ Duration, Instant };
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::RelayError;
use crate::models::relay::GenerationRequest;

const NO_QUERY_MESSAGE: &str =
    "No query available. Please send a POST request to /api/query first.";

struct PendingSession {
    request: Arc<GenerationRequest>,
    expires_at: Instant,
}

#[derive(Default)]
struct Slots {
    current: Option<Arc<GenerationRequest>>,
    pending: HashMap<Uuid, PendingSession>,
}

/// Hands a submitted request over to the stream endpoint.
///
/// Holds two views of every submission: the process-wide "current" slot
/// (last write wins, never cleared) and a table keyed by the id returned to
/// the submitter, whose entries are removed on first read or after `ttl`.
/// Readers always receive an `Arc` snapshot, so a later submission never
/// changes a request that a relay session already holds.
pub struct SessionStore {
    slots: Mutex<Slots>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { slots: Mutex::new(Slots::default()), ttl }
    }

    /// Validates and stores a request, replacing the current slot.
    pub async fn submit(
        &self,
        model: &str,
        prompt: &str
    ) -> Result<Uuid, RelayError> {
        let request = Arc::new(GenerationRequest::new(model, prompt)?);
        let id = Uuid::new_v4();
        let now = Instant::now();

        let mut slots = self.slots.lock().await;
        let before = slots.pending.len();
        slots.pending.retain(|_, session| session.expires_at > now);
        let expired = before - slots.pending.len();
        if expired > 0 {
            debug!("Expired {} unconsumed session(s)", expired);
        }

        slots.pending.insert(id, PendingSession {
            request: Arc::clone(&request),
            expires_at: now + self.ttl,
        });
        slots.current = Some(request);

        info!("Query received for model '{}' (session {})", model, id);
        Ok(id)
    }

    /// Returns the most recent submission without clearing it.
    pub async fn take_current(&self) -> Result<Arc<GenerationRequest>, RelayError> {
        self.slots
            .lock().await
            .current.clone()
            .ok_or_else(|| RelayError::Unavailable(NO_QUERY_MESSAGE.into()))
    }

    /// Consumes the request submitted under `id`. A second call with the same id fails.
    pub async fn take_session(&self, id: &Uuid) -> Result<Arc<GenerationRequest>, RelayError> {
        let mut slots = self.slots.lock().await;
        match slots.pending.remove(id) {
            Some(session) if session.expires_at > Instant::now() => Ok(session.request),
            Some(_) => Err(RelayError::Unavailable(format!("Session {} has expired", id))),
            None => Err(RelayError::Unavailable(format!("Unknown session {}", id))),
        }
    }

    pub async fn current_model(&self) -> Option<String> {
        self.slots.lock().await.current.as_ref().map(|r| r.model.clone())
    }

    pub async fn pending_count(&self) -> usize {
        self.slots.lock().await.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn take_current_before_submit_is_unavailable() {
        let store = store();
        assert!(matches!(store.take_current().await, Err(RelayError::Unavailable(_))));
    }

    #[tokio::test]
    async fn submit_rejects_empty_fields_without_mutating() {
        let store = store();
        assert!(matches!(store.submit("", "hi").await, Err(RelayError::InvalidInput(_))));
        assert!(matches!(store.submit("llama2", "").await, Err(RelayError::InvalidInput(_))));
        assert!(store.take_current().await.is_err());
        assert_eq!(store.pending_count().await, 0);
    }

    #[tokio::test]
    async fn last_write_wins() {
        let store = store();
        store.submit("llama2", "A").await.unwrap();
        store.submit("mistral", "B").await.unwrap();

        let current = store.take_current().await.unwrap();
        assert_eq!(current.model, "mistral");
        assert_eq!(current.prompt, "B");
    }

    #[tokio::test]
    async fn take_current_does_not_clear() {
        let store = store();
        store.submit("llama2", "hi").await.unwrap();
        let first = store.take_current().await.unwrap();
        let second = store.take_current().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn snapshot_survives_overwrite() {
        let store = store();
        store.submit("llama2", "A").await.unwrap();
        let snapshot = store.take_current().await.unwrap();
        store.submit("llama2", "B").await.unwrap();

        assert_eq!(snapshot.prompt, "A");
        assert_eq!(store.take_current().await.unwrap().prompt, "B");
    }

    #[tokio::test]
    async fn keyed_session_is_consumed_once() {
        let store = store();
        let a = store.submit("llama2", "A").await.unwrap();
        let b = store.submit("llama2", "B").await.unwrap();

        assert_eq!(store.take_session(&a).await.unwrap().prompt, "A");
        assert!(matches!(store.take_session(&a).await, Err(RelayError::Unavailable(_))));
        assert_eq!(store.take_session(&b).await.unwrap().prompt, "B");
        assert_eq!(store.pending_count().await, 0);
    }

    #[tokio::test]
    async fn expired_sessions_are_rejected_and_swept() {
        let store = SessionStore::new(Duration::from_millis(10));
        let id = store.submit("llama2", "A").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(matches!(store.take_session(&id).await, Err(RelayError::Unavailable(_))));

        let stale = store.submit("llama2", "B").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        store.submit("llama2", "C").await.unwrap();
        assert_eq!(store.pending_count().await, 1);
        assert!(store.take_session(&stale).await.is_err());
    }

    #[tokio::test]
    async fn current_model_tracks_latest_submission() {
        let store = store();
        assert_eq!(store.current_model().await, None);
        store.submit("llama2", "hi").await.unwrap();
        assert_eq!(store.current_model().await.as_deref(), Some("llama2"));
    }
}
