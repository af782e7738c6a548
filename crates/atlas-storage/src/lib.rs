//! # Atlas Storage
//!
//! Durable state for the agent, kept in a single embedded SQLite file.
//!
//! | Table | Module | Used for |
//! |---|---|---|
//! | `kv_store` | [`kv`] | log chat id, notes, feature toggles, PM relay map |
//! | `control_state` | [`control`] | in-flight restart/update actions |
//! | `forward_rules` | [`forward`] | chat-to-chat forwarding rules |
//!
//! All access is serialized through one connection behind a mutex. Every
//! method is an independent statement; no multi-statement transactions are
//! used.
//!
//! ```rust,ignore
//! let store = Store::open("atlas.db")?;
//! store.set("log_chat_id", "-100123")?;
//! let pending = store.pending_action()?;
//! ```

pub mod control;
pub mod error;
pub mod forward;
pub mod kv;
mod store;

pub use control::{ControlAction, ControlRecord, ControlStatus};
pub use error::{StorageError, StorageResult};
pub use forward::{ForwardRule, RuleId};
pub use store::Store;
