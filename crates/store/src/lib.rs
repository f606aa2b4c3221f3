//! Shared-store coordination primitives.
//!
//! Everything here is built on the [`KeyValueStore`] seam:
//!
//! - **State**: session state persistence, single-key or sharded, with TTL
//! - **Locks**: per-session mutual exclusion with self-expiring tokens
//! - **Queue**: FIFO work queue without acknowledgment
//! - **Cache**: secondary cache for intermediate results
//!
//! # Example
//!
//! ```ignore
//! use sessionflow_store::{InMemoryStore, LockManager, StateStore};
//!
//! let kv = InMemoryStore::new_arc();
//! let locks = LockManager::new(kv.clone());
//! let states = StateStore::new(kv);
//!
//! if let Some(token) = locks.acquire(&id, DEFAULT_LOCK_TTL, DEFAULT_LOCK_WAIT).await {
//!     states.set_sharded(&id, &state, DEFAULT_STATE_TTL).await?;
//!     locks.release(&id, &token).await;
//! }
//! ```

pub mod cache;
pub mod kv;
pub mod lock;
pub mod memory;
pub mod queue;
pub mod state;
pub mod testing;

pub use cache::{CacheConfig, DEFAULT_RESULT_TTL, ResultCache};
pub use kv::KeyValueStore;
pub use lock::{DEFAULT_LOCK_TTL, DEFAULT_LOCK_WAIT, LockManager, LockToken, lock_key};
pub use memory::InMemoryStore;
pub use queue::{DEFAULT_QUEUE_NAME, DequeueMode, QueueItem, WorkQueue};
pub use state::{DEFAULT_STATE_TTL, PersistenceMode, StateStore};
