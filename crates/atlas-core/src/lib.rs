//! # Atlas Core
//!
//! Shared vocabulary for every Atlas crate: who sent an event, what the event
//! looks like, and the narrow transport boundary the rest of the agent talks
//! through.
//!
//! Atlas connects to a messaging network as up to two identities at once:
//!
//! | Identity | Prefix | Processes |
//! |---|---|---|
//! | [`Identity::Primary`] | `.` | messages it sent itself (outgoing) |
//! | [`Identity::Secondary`] | `/` | messages others sent to it (incoming) |
//!
//! The actual network SDK lives outside this repository. It is plugged in by
//! implementing [`Connector`] (to establish a [`Session`]) and [`Client`] (to
//! send, edit and forward messages).
//!
//! # Feature Flags
//!
//! - `testing`: exposes [`testing`] with a recording [`MockClient`](testing::MockClient)
//!   and event builders for use in downstream test suites.

pub mod client;
pub mod error;
pub mod event;
pub mod identity;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{BoxedClient, Client, Connector, Credentials, Document, Session};
pub use error::{ClientError, ClientResult};
pub use event::{ChatId, MessageEvent, MessageId, UserId};
pub use identity::{Identity, RunMode};
