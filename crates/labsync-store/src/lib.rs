//! labsync Store
//!
//! Persistence for the workshop engine: a synchronous local key-value cache, a
//! remote mirror reached only from a background task, and the [`SessionStore`]
//! that ties the two together.
//!
//! # Architecture
//!
//! ```text
//! caller ──read/write/update──► CachedSessionStore ──► SessionCell ──► LocalStore
//!                                      │
//!                                      └──enqueue──► SyncWorker ──► RemoteStore
//! ```
//!
//! The local cache is authoritative for the instance. Remote failures are logged and
//! swallowed; cross-instance writes resolve last-writer-wins.

#![warn(unreachable_pub)]

mod error;
mod http;
pub mod keys;
mod local;
mod remote;
mod session;
mod sync;

pub use error::{RemoteError, StorageError};
pub use http::HttpRemoteStore;
pub use local::{FileLocalStore, LocalStore, LocalStoreExt, MemoryLocalStore};
pub use remote::{MemoryRemote, OfflineRemote, RemoteStore};
pub use session::{CachedSessionStore, SessionStore};
pub use sync::{SessionCell, SyncHandle, SyncJob, SyncWorker};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
