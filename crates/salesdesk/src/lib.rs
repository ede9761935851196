//! Sales desk CLI: session-backed reservation editing under exclusive
//! unit locks.
//!
//! The binary in `main.rs` is a thin shell; everything it does lives
//! here so the pieces stay testable.

#![deny(clippy::all)]

pub mod app;
pub mod commands;
pub mod handlers;
pub mod telemetry;
pub mod ui;
