//! Upload session store with TTL expiry, bounded capacity and claims.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cardsmith_types::DocumentFormat;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::clock::{SharedClock, SystemClock};
use crate::config::{CapacityPolicy, StoreConfig};
use crate::error::{Error, Result};
use crate::ttl::ExpirationIndex;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque identifier of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| Error::InvalidId(s.to_string()))
    }
}

/// An uploaded document waiting for generation.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub id: SessionId,
    /// Raw document bytes. Cheap to clone.
    pub payload: Bytes,
    pub format: DocumentFormat,
    pub original_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Store statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Current number of live sessions.
    pub size: usize,
    /// Maximum capacity, if bounded.
    pub capacity: Option<usize>,
    /// Sessions currently claimed by a generation.
    pub in_flight: usize,
    /// Sessions tracked by the expiration index.
    pub ttl_tracked: usize,
}

struct Entry {
    session: UploadSession,
    in_flight: bool,
}

/// Inner state protected by the lock.
struct StoreInner {
    /// Sessions in insertion order. Lookups use `peek` so order never changes,
    /// which makes the least-recently-used end the oldest session.
    sessions: LruCache<SessionId, Entry>,

    /// Expiry deadlines.
    expirations: ExpirationIndex<SessionId>,
}

impl StoreInner {
    fn delete(&mut self, id: &SessionId) -> Option<Entry> {
        self.expirations.cancel(id);
        self.sessions.pop(id)
    }

    fn purge_due(&mut self, now: DateTime<Utc>) -> usize {
        let due = self.expirations.drain_due(now);
        let mut count = 0;
        for id in due {
            // The entry may already be gone if a remove raced the deadline.
            if self.sessions.pop(&id).is_some() {
                debug!(session_id = %id, "Session expired");
                count += 1;
            }
        }
        count
    }

    /// Look up a live session, treating past-deadline entries as absent.
    fn live_mut(&mut self, id: &SessionId, now: DateTime<Utc>) -> Option<&mut Entry> {
        if self.expirations.is_expired(id, now) {
            return None;
        }
        self.sessions.peek_mut(id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// Keyed, in-memory storage for uploaded documents.
///
/// Each session lives for a fixed TTL from creation. Expired sessions are
/// never returned: lookups check the deadline, and [`purge_expired`] (or the
/// reaper from [`spawn_reaper`]) deletes them. Once removed, a session id is
/// never reused.
///
/// Cloning the store is cheap and yields a handle to the same sessions.
///
/// [`purge_expired`]: SessionStore::purge_expired
/// [`spawn_reaper`]: SessionStore::spawn_reaper
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<StoreInner>>,
    config: StoreConfig,
    clock: SharedClock,
}

impl SessionStore {
    /// Create a store backed by the system clock.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a store with an explicit clock.
    pub fn with_clock(config: StoreConfig, clock: SharedClock) -> Self {
        let sessions = LruCache::unbounded();
        let inner = StoreInner {
            sessions,
            expirations: ExpirationIndex::new(),
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
            config,
            clock,
        }
    }

    /// Get the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Store an upload and return its new id.
    ///
    /// The session expires `ttl` after this call. When the store is full,
    /// expired sessions are purged first; if it is still full the capacity
    /// policy decides between evicting the oldest unclaimed session and
    /// returning [`Error::CapacityExceeded`].
    pub fn put(
        &self,
        payload: impl Into<Bytes>,
        format: DocumentFormat,
        original_name: impl Into<String>,
    ) -> Result<SessionId> {
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(self.config.ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = now
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut inner = self.inner.write();

        if let Some(capacity) = self.config.max_sessions
            && inner.sessions.len() >= capacity
        {
            inner.purge_due(now);
            if inner.sessions.len() >= capacity {
                self.make_room(&mut inner, capacity)?;
            }
        }

        let mut id = SessionId::new();
        while inner.sessions.contains(&id) {
            id = SessionId::new();
        }

        let session = UploadSession {
            id,
            payload: payload.into(),
            format,
            original_name: original_name.into(),
            created_at: now,
            expires_at,
        };
        let size = session.payload.len();

        inner.sessions.put(
            id,
            Entry {
                session,
                in_flight: false,
            },
        );
        inner.expirations.schedule(id, expires_at);

        debug!(
            session_id = %id,
            format = %format,
            bytes = size,
            live = inner.sessions.len(),
            "Session stored"
        );

        Ok(id)
    }

    fn make_room(&self, inner: &mut StoreInner, capacity: usize) -> Result<()> {
        match self.config.on_full {
            CapacityPolicy::Reject => Err(Error::CapacityExceeded { capacity }),
            CapacityPolicy::EvictOldest => {
                // `iter()` runs newest to oldest.
                let victim = inner
                    .sessions
                    .iter()
                    .rev()
                    .find(|(_, entry)| !entry.in_flight)
                    .map(|(id, _)| *id);

                match victim {
                    Some(id) => {
                        debug!(session_id = %id, "Evicting oldest session to make room");
                        inner.delete(&id);
                        Ok(())
                    }
                    None => Err(Error::CapacityExceeded { capacity }),
                }
            }
        }
    }

    /// Look up a live session.
    ///
    /// Does not extend the session's lifetime.
    pub fn get(&self, id: &SessionId) -> Result<UploadSession> {
        let now = self.clock.now();
        let inner = self.inner.read();

        if inner.expirations.is_expired(id, now) {
            trace!(session_id = %id, "Session missing or expired");
            return Err(Error::NotFound(id.to_string()));
        }

        inner
            .sessions
            .peek(id)
            .map(|entry| entry.session.clone())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Check whether a live session exists.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.get(id).is_ok()
    }

    /// Delete a session and cancel its expiry.
    ///
    /// Removing an unknown or already-removed id is a no-op.
    pub fn remove(&self, id: &SessionId) {
        let mut inner = self.inner.write();
        if inner.delete(id).is_some() {
            debug!(session_id = %id, "Session removed");
        }
    }

    /// Claim a live session for generation.
    ///
    /// At most one claim per session exists at a time. The returned guard
    /// either retires the session ([`SessionClaim::retire`]) or, when dropped,
    /// releases it so the same id can be claimed again until it expires.
    pub fn claim(&self, id: &SessionId) -> Result<SessionClaim> {
        let now = self.clock.now();
        let mut inner = self.inner.write();

        let entry = inner
            .live_mut(id, now)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if entry.in_flight {
            return Err(Error::Busy(id.to_string()));
        }
        entry.in_flight = true;

        trace!(session_id = %id, "Session claimed");

        Ok(SessionClaim {
            store: self.clone(),
            session: entry.session.clone(),
            settled: false,
        })
    }

    fn release(&self, id: &SessionId) {
        let mut inner = self.inner.write();
        if let Some(entry) = inner.sessions.peek_mut(id) {
            entry.in_flight = false;
            trace!(session_id = %id, "Session claim released");
        }
    }

    /// Delete every session whose deadline has passed.
    ///
    /// Returns the number of sessions deleted.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let count = self.inner.write().purge_due(now);
        if count > 0 {
            debug!(count, "Purged expired sessions");
        }
        count
    }

    /// Start a background task that purges expired sessions every
    /// `cleanup_interval`. The task stops when the handle is aborted or the
    /// runtime shuts down.
    pub fn spawn_reaper(&self) -> tokio::task::JoinHandle<()> {
        self.spawn_reaper_every(self.config.cleanup_interval)
    }

    /// Like [`spawn_reaper`](Self::spawn_reaper) with an explicit interval.
    pub fn spawn_reaper_every(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.purge_expired();
            }
        })
    }

    /// Get the current number of stored sessions, including any expired
    /// sessions not yet purged.
    pub fn len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().sessions.is_empty()
    }

    /// Get store statistics.
    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        StoreStats {
            size: inner.sessions.len(),
            capacity: self.config.max_sessions,
            in_flight: inner.sessions.iter().filter(|(_, e)| e.in_flight).count(),
            ttl_tracked: inner.expirations.len(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Claim
// ─────────────────────────────────────────────────────────────────────────────

/// Exclusive hold on a session for the duration of one generation.
pub struct SessionClaim {
    store: SessionStore,
    session: UploadSession,
    settled: bool,
}

impl SessionClaim {
    /// The claimed session.
    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    /// The claimed session's id.
    pub fn id(&self) -> &SessionId {
        &self.session.id
    }

    /// Consume the session: it is removed from the store.
    pub fn retire(mut self) {
        self.settled = true;
        self.store.remove(&self.session.id);
    }

    /// Give the session back for a later retry.
    pub fn release(mut self) {
        self.settled = true;
        self.store.release(&self.session.id);
    }
}

impl Drop for SessionClaim {
    fn drop(&mut self) {
        if !self.settled {
            self.store.release(&self.session.id);
        }
    }
}

impl std::fmt::Debug for SessionClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClaim")
            .field("session_id", &self.session.id)
            .field("settled", &self.settled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store_with_clock(config: StoreConfig) -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = SessionStore::with_clock(config, clock.clone());
        (store, clock)
    }

    #[test]
    fn test_put_and_get() {
        let (store, _) = store_with_clock(StoreConfig::new());

        let id = store
            .put(vec![1u8, 2, 3], DocumentFormat::Pdf, "notes.pdf")
            .unwrap();

        let session = store.get(&id).unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.payload.as_ref(), &[1, 2, 3]);
        assert_eq!(session.format, DocumentFormat::Pdf);
        assert_eq!(session.original_name, "notes.pdf");
        assert_eq!(
            session.expires_at - session.created_at,
            chrono::Duration::minutes(30)
        );
    }

    #[test]
    fn test_not_found() {
        let (store, _) = store_with_clock(StoreConfig::new());
        let result = store.get(&SessionId::new());
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_distinct_ids_for_distinct_uploads() {
        let (store, _) = store_with_clock(StoreConfig::new());

        let a = store.put(b"first".to_vec(), DocumentFormat::Pdf, "a.pdf").unwrap();
        let b = store.put(b"second".to_vec(), DocumentFormat::Docx, "b.docx").unwrap();

        assert_ne!(a, b);
        assert_eq!(store.get(&a).unwrap().payload.as_ref(), b"first");
        assert_eq!(store.get(&b).unwrap().payload.as_ref(), b"second");
    }

    #[test]
    fn test_ttl_expiry_is_lazy_and_isolated() {
        let (store, clock) = store_with_clock(StoreConfig::new().with_ttl(Duration::from_secs(60)));

        let old = store.put(b"old".to_vec(), DocumentFormat::Pdf, "old.pdf").unwrap();
        clock.advance(Duration::from_secs(45));
        let fresh = store.put(b"new".to_vec(), DocumentFormat::Pdf, "new.pdf").unwrap();

        clock.advance(Duration::from_secs(15));

        // Deadline reached: gone even though no purge has run.
        assert!(matches!(store.get(&old), Err(Error::NotFound(_))));
        assert!(matches!(store.claim(&old), Err(Error::NotFound(_))));
        // Unrelated session unaffected.
        assert_eq!(store.get(&fresh).unwrap().payload.as_ref(), b"new");
    }

    #[test]
    fn test_purge_expired_only_removes_due_sessions() {
        let (store, clock) = store_with_clock(StoreConfig::new().with_ttl(Duration::from_secs(60)));

        let a = store.put(b"a".to_vec(), DocumentFormat::Pdf, "a.pdf").unwrap();
        clock.advance(Duration::from_secs(30));
        let b = store.put(b"b".to_vec(), DocumentFormat::Pdf, "b.pdf").unwrap();
        clock.advance(Duration::from_secs(31));

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(!store.contains(&a));
        assert!(store.contains(&b));

        // Expired sessions never come back.
        assert!(store.get(&a).is_err());
        assert_eq!(store.purge_expired(), 0);
    }

    #[test]
    fn test_remove_is_idempotent_and_cancels_expiry() {
        let (store, clock) = store_with_clock(StoreConfig::new());

        let id = store.put(b"x".to_vec(), DocumentFormat::Docx, "x.docx").unwrap();
        store.remove(&id);
        store.remove(&id);
        store.remove(&SessionId::new());

        assert!(store.is_empty());
        assert_eq!(store.stats().ttl_tracked, 0);

        clock.advance(Duration::from_secs(3600));
        assert_eq!(store.purge_expired(), 0);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let (store, _) = store_with_clock(StoreConfig::new());
        let id = store.put(b"x".to_vec(), DocumentFormat::Pdf, "x.pdf").unwrap();

        let claim = store.claim(&id).unwrap();
        assert_eq!(claim.id(), &id);
        assert!(matches!(store.claim(&id), Err(Error::Busy(_))));
        // Lookups still see the session while it is claimed.
        assert!(store.get(&id).is_ok());
        assert_eq!(store.stats().in_flight, 1);

        drop(claim);
        assert!(store.claim(&id).is_ok());
    }

    #[test]
    fn test_release_allows_retry() {
        let (store, _) = store_with_clock(StoreConfig::new());
        let id = store.put(b"x".to_vec(), DocumentFormat::Pdf, "x.pdf").unwrap();

        store.claim(&id).unwrap().release();
        let claim = store.claim(&id).unwrap();
        assert_eq!(claim.session().payload.as_ref(), b"x");
    }

    #[test]
    fn test_retire_consumes_session() {
        let (store, _) = store_with_clock(StoreConfig::new());
        let id = store.put(b"x".to_vec(), DocumentFormat::Pdf, "x.pdf").unwrap();

        store.claim(&id).unwrap().retire();

        assert!(matches!(store.get(&id), Err(Error::NotFound(_))));
        assert!(matches!(store.claim(&id), Err(Error::NotFound(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_retire_after_expiry_is_harmless() {
        let (store, clock) = store_with_clock(StoreConfig::new().with_ttl(Duration::from_secs(10)));
        let id = store.put(b"x".to_vec(), DocumentFormat::Pdf, "x.pdf").unwrap();
        let claim = store.claim(&id).unwrap();

        clock.advance(Duration::from_secs(11));
        assert_eq!(store.purge_expired(), 1);

        claim.retire();
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_reject() {
        let config = StoreConfig::new()
            .with_max_sessions(2)
            .with_capacity_policy(CapacityPolicy::Reject);
        let (store, _) = store_with_clock(config);

        store.put(b"1".to_vec(), DocumentFormat::Pdf, "1.pdf").unwrap();
        store.put(b"2".to_vec(), DocumentFormat::Pdf, "2.pdf").unwrap();

        let result = store.put(b"3".to_vec(), DocumentFormat::Pdf, "3.pdf");
        assert!(matches!(result, Err(Error::CapacityExceeded { capacity: 2 })));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_capacity_reject_purges_expired_first() {
        let config = StoreConfig::new()
            .with_ttl(Duration::from_secs(10))
            .with_max_sessions(1)
            .with_capacity_policy(CapacityPolicy::Reject);
        let (store, clock) = store_with_clock(config);

        store.put(b"1".to_vec(), DocumentFormat::Pdf, "1.pdf").unwrap();
        clock.advance(Duration::from_secs(10));

        assert!(store.put(b"2".to_vec(), DocumentFormat::Pdf, "2.pdf").is_ok());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_oldest_unclaimed() {
        let config = StoreConfig::new()
            .with_max_sessions(3)
            .with_capacity_policy(CapacityPolicy::EvictOldest);
        let (store, _) = store_with_clock(config);

        let first = store.put(b"1".to_vec(), DocumentFormat::Pdf, "1.pdf").unwrap();
        let second = store.put(b"2".to_vec(), DocumentFormat::Pdf, "2.pdf").unwrap();
        let third = store.put(b"3".to_vec(), DocumentFormat::Pdf, "3.pdf").unwrap();

        // Lookups do not refresh age.
        store.get(&first).unwrap();
        // The oldest session is in flight, so it is skipped.
        let _claim = store.claim(&first).unwrap();

        let fourth = store.put(b"4".to_vec(), DocumentFormat::Pdf, "4.pdf").unwrap();

        assert_eq!(store.len(), 3);
        assert!(store.contains(&first));
        assert!(!store.contains(&second));
        assert!(store.contains(&third));
        assert!(store.contains(&fourth));
    }

    #[test]
    fn test_capacity_all_claimed_rejects() {
        let config = StoreConfig::new()
            .with_max_sessions(1)
            .with_capacity_policy(CapacityPolicy::EvictOldest);
        let (store, _) = store_with_clock(config);

        let id = store.put(b"1".to_vec(), DocumentFormat::Pdf, "1.pdf").unwrap();
        let _claim = store.claim(&id).unwrap();

        let result = store.put(b"2".to_vec(), DocumentFormat::Pdf, "2.pdf");
        assert!(matches!(result, Err(Error::CapacityExceeded { .. })));
    }

    #[test]
    fn test_unbounded_store() {
        let (store, _) = store_with_clock(StoreConfig::new().unbounded());
        for i in 0..(crate::DEFAULT_MAX_SESSIONS + 10) {
            store
                .put(vec![i as u8], DocumentFormat::Pdf, format!("{i}.pdf"))
                .unwrap();
        }
        assert_eq!(store.len(), crate::DEFAULT_MAX_SESSIONS + 10);
        assert_eq!(store.stats().capacity, None);
    }

    #[test]
    fn test_session_id_parsing() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);

        let err = "not-a-uuid".parse::<SessionId>().unwrap_err();
        assert!(matches!(err, Error::InvalidId(_)));
    }

    #[tokio::test]
    async fn test_reaper_purges_in_background() {
        let (store, clock) = store_with_clock(StoreConfig::new().with_ttl(Duration::from_secs(5)));
        store.put(b"x".to_vec(), DocumentFormat::Pdf, "x.pdf").unwrap();
        clock.advance(Duration::from_secs(6));

        let handle = store.spawn_reaper_every(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert!(store.is_empty());
    }
}
