//! Session lifecycle notifications.
//!
//! This crate broadcasts START/COMPLETE/ERROR events for each session over
//! the shared store's pub/sub. Key features:
//!
//! - **Event types**: [`SessionEvent`] with a wire-stable JSON shape
//! - **Event bus**: best-effort publish, per-session subscribe
//!
//! # Example
//!
//! ```ignore
//! use sessionflow_events::{EventBus, SessionEvent, ALL_NODES};
//! use sessionflow_store::InMemoryStore;
//!
//! let bus = EventBus::new(InMemoryStore::new_arc());
//! let mut sub = bus.subscribe(&session_id).await?;
//!
//! bus.publish(&SessionEvent::start(session_id.clone(), ALL_NODES)).await;
//!
//! let event = sub.recv().await?;
//! println!("{} {}", event.node, event.status.as_str());
//! ```

pub mod bus;
pub mod error;
pub mod event;

pub use bus::{EventBus, EventSubscription, channel_name};
pub use error::{Error, Result};
pub use event::{ALL_NODES, EventStatus, SessionEvent};
