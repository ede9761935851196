//! Timing and coordination primitives for salesdesk.
//!
//! This crate provides the building blocks the session and lease layers are
//! assembled from: a countdown clock that emits per-second ticks, a
//! single-flight gate that collapses concurrent renewal attempts into one
//! request, and an activity monitor that turns raw user interaction into a
//! debounced activity signal and an idle-timeout trigger.

#![deny(clippy::all)]

mod activity;
mod clock;
mod countdown;
mod singleflight;

pub use activity::ActivityConfig;
pub use activity::ActivityEvent;
pub use activity::ActivityMonitor;
pub use activity::ActivitySink;
pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use countdown::Countdown;
pub use countdown::CountdownEvent;
pub use singleflight::Singleflight;
