//! Exclusive unit-edit leases for the sales desk.
//!
//! Two sessions must never edit the same unit at once. The backend
//! enforces that with a time-bounded lock per unit; this crate wraps the
//! lock operations in a [`LeaseClient`] and wraps an entire editing
//! window in a [`UnitEditGuard`] that counts the window down, prompts for
//! renewal, and always gives the unit back.

#![deny(clippy::all)]

mod client;
mod error;
mod guard;
mod state;

pub use client::LeaseClient;
pub use error::LeaseError;
pub use guard::GuardEvent;
pub use guard::UnitEditGuard;
pub use state::LeaseGrant;
pub use state::LeaseState;
pub use state::LeaseStatus;
pub use state::LeaseView;
pub use state::UnitKey;

/// Convenience alias used across this crate.
pub type Result<T> = std::result::Result<T, LeaseError>;
