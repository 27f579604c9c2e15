//! Ephemeral session store for uploaded documents.
//!
//! An upload is parked here under an opaque [`SessionId`] until a later,
//! separate generation request picks it up. Sessions:
//! - expire a fixed TTL after creation (lazily on lookup, eagerly via the reaper)
//! - are bounded in number, with an explicit [`CapacityPolicy`]
//! - can be claimed by at most one in-flight generation at a time
//!
//! Time comes from an injected [`Clock`], so expiry is deterministic in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use cardsmith_session::{SessionStore, StoreConfig};
//!
//! let store = SessionStore::new(StoreConfig::default());
//! let id = store.put(bytes, DocumentFormat::Pdf, "notes.pdf")?;
//! let claim = store.claim(&id)?;
//! // ... generate ...
//! claim.retire();
//! ```

mod clock;
mod config;
mod error;
mod store;
mod ttl;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{
    CapacityPolicy, DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_SESSIONS, DEFAULT_TTL, StoreConfig,
};
pub use error::{Error, Result};
pub use store::{SessionClaim, SessionId, SessionStore, StoreStats, UploadSession};
pub use ttl::ExpirationIndex;
