//! Session lifecycle for the sales desk: login, persisted resume, silent
//! refresh and the keepalive loop that decides between renewing a token
//! and letting it die.
//!
//! The [`SessionKeepAlive`] service owns the current [`Session`] and its
//! bearer token, persists it through a [`SessionStore`], and watches the
//! operator through an activity monitor so an abandoned desk does not hold
//! a session (or a unit lock) forever.

#![deny(clippy::all)]

mod error;
mod keepalive;
mod session;
mod store;

pub use error::SessionError;
pub use keepalive::KeepAliveConfig;
pub use keepalive::LogoutReason;
pub use keepalive::SessionEvent;
pub use keepalive::SessionKeepAlive;
pub use session::Profile;
pub use session::Session;
pub use store::FileSessionStore;
pub use store::MemorySessionStore;
pub use store::SessionStore;

/// Convenience alias used across this crate.
pub type Result<T> = std::result::Result<T, SessionError>;
