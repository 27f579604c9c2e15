//! Configuration for the session store.

use std::time::Duration;

/// Default session lifetime (30 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Default maximum number of live sessions.
/// At the 50 MB upload ceiling this bounds payload memory to ~12.5 GB worst case;
/// typical uploads are well under 5 MB.
pub const DEFAULT_MAX_SESSIONS: usize = 256;

/// Default interval for the background reaper.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// What `put` does when the store is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapacityPolicy {
    /// Refuse the new upload.
    Reject,
    /// Drop the oldest session that is not claimed.
    #[default]
    EvictOldest,
}

/// Configuration for the session store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Lifetime of a session, measured from creation.
    pub ttl: Duration,

    /// Maximum number of live sessions. `None` means unbounded.
    pub max_sessions: Option<usize>,

    /// Behavior when `max_sessions` is reached.
    pub on_full: CapacityPolicy,

    /// Interval for the reaper task started with `spawn_reaper`.
    pub cleanup_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_sessions: Some(DEFAULT_MAX_SESSIONS),
            on_full: CapacityPolicy::default(),
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the maximum number of live sessions.
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = Some(max);
        self
    }

    /// Remove the capacity bound.
    pub fn unbounded(mut self) -> Self {
        self.max_sessions = None;
        self
    }

    /// Set the capacity policy.
    pub fn with_capacity_policy(mut self, policy: CapacityPolicy) -> Self {
        self.on_full = policy;
        self
    }

    /// Set the reaper interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}
