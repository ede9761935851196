//! REST client for the salesdesk backend.
//!
//! This crate owns the wire vocabulary (Portuguese field names stay behind
//! serde renames), the HTTP transport with its bearer-token slot and
//! activity instrumentation, and the error taxonomy the session and lease
//! layers make decisions on. `MockApi` mirrors the real client for tests.

#![deny(clippy::all)]

mod client;
mod config;
mod error;
mod mock;
mod types;

pub use client::Api;
pub use client::BearerSlot;
pub use client::HttpApi;
pub use config::ApiConfig;
pub use error::ApiError;
pub use error::ErrorCategory;
pub use mock::MockApi;
pub use types::AuthResponse;
pub use types::LoginRequest;
pub use types::RefreshRequest;
pub use types::UnitLockRequest;
pub use types::UnitLockResponse;
pub use types::UnitLockStatus;

pub type Result<T> = std::result::Result<T, ApiError>;
