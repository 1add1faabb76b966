//! Analysis session tracking.
//!
//! Each session owns one [`RangeCache`] behind an async mutex, so concurrent
//! requests for the same session are serialised while different sessions
//! never share state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::cache::{CacheKey, RangeCache};

/// One analysis session.
#[derive(Debug)]
pub struct Session {
    pub session_id: String,
    pub key: CacheKey,
    pub created_at: DateTime<Utc>,
    cache: Mutex<RangeCache>,
}

impl Session {
    /// The session's cache. Hold the guard for the whole `ensure` call.
    pub fn cache(&self) -> &Mutex<RangeCache> {
        &self.cache
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            source: self.key.source.to_string(),
            timezone: self.key.timezone.name().to_string(),
            created_at: self.created_at,
        }
    }
}

/// Serializable session metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub source: String,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
}

/// In-memory session registry.
#[derive(Clone, Default)]
pub struct SessionTracker {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with an empty cache and return its ID.
    pub fn create_session(&self, key: CacheKey) -> String {
        self.create_session_with_cache(key, RangeCache::new())
    }

    /// Create a session around an existing cache (e.g. one restored from a
    /// snapshot).
    pub fn create_session_with_cache(&self, key: CacheKey, cache: RangeCache) -> String {
        let session_id = Uuid::new_v4().to_string();
        let session = Session {
            session_id: session_id.clone(),
            key,
            created_at: Utc::now(),
            cache: Mutex::new(cache),
        };
        self.sessions
            .write()
            .insert(session_id.clone(), Arc::new(session));
        log::info!("Created session {}", session_id);
        session_id
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Remove a session; returns whether it existed.
    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().remove(session_id).is_some();
        if removed {
            log::info!("Removed session {}", session_id);
        }
        removed
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self.sessions.read().values().map(|s| s.info()).collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        infos
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceIdentity;

    fn key(url: &str) -> CacheKey {
        CacheKey::new(SourceIdentity::parse(url).unwrap(), "UTC".parse().unwrap())
    }

    #[test]
    fn test_sessions_are_independent() {
        let tracker = SessionTracker::new();
        let a = tracker.create_session(key("a.example.org"));
        let b = tracker.create_session(key("b.example.org"));
        assert_ne!(a, b);
        assert_eq!(tracker.len(), 2);
        let session = tracker.get(&a).unwrap();
        assert_eq!(session.key.source.as_str(), "https://a.example.org");
        assert!(!Arc::ptr_eq(&session, &tracker.get(&b).unwrap()));
    }

    #[test]
    fn test_remove_session() {
        let tracker = SessionTracker::new();
        let id = tracker.create_session(key("a.example.org"));
        assert!(tracker.remove(&id));
        assert!(!tracker.remove(&id));
        assert!(tracker.get(&id).is_none());
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn test_cache_guard_is_exclusive() {
        let tracker = SessionTracker::new();
        let id = tracker.create_session(key("a.example.org"));
        let session = tracker.get(&id).unwrap();
        let guard = session.cache().lock().await;
        assert!(session.cache().try_lock().is_err());
        drop(guard);
        assert!(session.cache().try_lock().is_ok());
    }
}
