//! Session store with exclusive per-phone access

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::Session;
use crate::config::DEFAULT_SESSION_TTL_SECS;

/// Prune idle entries once every this many lock calls
const PRUNE_INTERVAL: u64 = 256;

/// Exclusive handle to one phone number's session
///
/// Held for the whole handling of an event, so two deliveries for the same
/// number never interleave their read-modify-write of the session.
pub type SessionGuard = OwnedMutexGuard<Session>;

/// Sessions keyed by phone number
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<AsyncMutex<Session>>>>,
    ttl: Duration,
    accesses: AtomicU64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_SESSION_TTL_SECS))
    }
}

impl SessionStore {
    /// Create a store whose sessions reset after `ttl` of inactivity
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            accesses: AtomicU64::new(0),
        }
    }

    /// Wait for exclusive access to the session of `phone`
    ///
    /// A session idle for longer than the TTL is reset before it is returned.
    pub async fn lock(&self, phone: &str) -> SessionGuard {
        let slot = {
            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            if self.accesses.fetch_add(1, Ordering::Relaxed) % PRUNE_INTERVAL == PRUNE_INTERVAL - 1 {
                self.prune(&mut sessions);
            }
            Arc::clone(sessions.entry(phone.to_string()).or_default())
        };

        let mut session = slot.lock_owned().await;
        if session.is_expired(self.ttl) && !session.is_idle() {
            tracing::info!(phone, "session expired, resetting");
            session.reset();
        }
        session.touch();
        session
    }

    /// Number of phone numbers with a tracked session
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no sessions are tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop sessions nobody holds that are idle or expired
    fn prune(&self, sessions: &mut HashMap<String, Arc<AsyncMutex<Session>>>) {
        let before = sessions.len();
        sessions.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            slot.try_lock()
                .map(|s| !(s.is_idle() || s.is_expired(self.ttl)))
                .unwrap_or(true)
        });
        let pruned = before - sessions.len();
        if pruned > 0 {
            tracing::debug!(pruned, "pruned idle sessions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MediaKind, PendingUpload};

    #[tokio::test]
    async fn test_state_survives_between_locks() {
        let store = SessionStore::default();
        {
            let mut session = store.lock("1555").await;
            session.searching = true;
        }
        let session = store.lock("1555").await;
        assert!(session.searching);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_per_phone() {
        let store = SessionStore::default();
        let mut a = store.lock("a").await;
        a.searching = true;
        // A different number does not wait on `a`
        let b = store.lock("b").await;
        assert!(!b.searching);
    }

    #[tokio::test]
    async fn test_same_phone_is_exclusive() {
        let store = Arc::new(SessionStore::default());
        let guard = store.lock("1555").await;

        let contender = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut session = store.lock("1555").await;
                session.searching = true;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guard);

        contender.await.unwrap();
        assert!(store.lock("1555").await.searching);
    }

    #[tokio::test]
    async fn test_idle_session_expires() {
        let store = SessionStore::new(Duration::from_millis(5));
        {
            let mut session = store.lock("1555").await;
            session.pending_upload =
                Some(PendingUpload::new("m1", MediaKind::Image, "a.jpg", "image/jpeg"));
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        let session = store.lock("1555").await;
        assert!(session.pending_upload.is_none());
    }

    #[tokio::test]
    async fn test_prune_drops_idle_sessions() {
        let store = SessionStore::default();
        for i in 0..PRUNE_INTERVAL {
            let _ = store.lock(&format!("p{i}")).await;
        }
        // The last call pruned the idle entries created before it
        assert!(store.len() <= 1);
    }
}
