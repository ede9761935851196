//! User-activity observation: debounced pulses and an idle timeout.
//!
//! Interaction sources (the HTTP layer, command handlers) report raw events
//! through [`ActivityMonitor::record`]. The monitor coalesces them into at
//! most one [`ActivityEvent::Pulse`] per debounce window, keeps the raw
//! last-activity timestamp readable for renewal gating, and emits a single
//! [`ActivityEvent::IdleTimeout`] when no raw event arrives for the idle
//! window. What to do about an idle user is the subscriber's decision; the
//! monitor only reports.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use crate::clock::Clock;

/// Raw events inside this window collapse into one pulse.
const DEBOUNCE_WINDOW: Duration = Duration::from_secs(30);

/// Without any raw event for this long, the user counts as gone.
const IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// How often the idle watcher re-reads the clock.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Events published by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    /// Debounced activity: the user did something after a quiet stretch.
    Pulse,
    /// No raw event for the whole idle window. Emitted once, then re-armed
    /// only by new activity.
    IdleTimeout,
}

/// Somewhere raw activity can be reported to. Lets the HTTP layer ping the
/// monitor without depending on its concrete type.
pub trait ActivitySink: Send + Sync {
    fn record(&self);
}

#[derive(Debug, Clone, Copy)]
pub struct ActivityConfig {
    pub debounce: Duration,
    pub idle_timeout: Duration,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            debounce: DEBOUNCE_WINDOW,
            idle_timeout: IDLE_TIMEOUT,
        }
    }
}

struct MonitorState {
    watching: bool,
    last_activity_at: DateTime<Utc>,
    last_pulse_at: Option<DateTime<Utc>>,
    idle_fired: bool,
}

struct MonitorInner {
    clock: Arc<dyn Clock>,
    debounce: chrono::Duration,
    idle_timeout: chrono::Duration,
    state: Mutex<MonitorState>,
    events: broadcast::Sender<ActivityEvent>,
}

impl MonitorInner {
    fn record(&self) {
        let now = self.clock.now();
        let pulse_due = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !state.watching {
                return;
            }
            state.last_activity_at = now;
            state.idle_fired = false;
            let due = match state.last_pulse_at {
                None => true,
                Some(prev) => now - prev >= self.debounce,
            };
            if due {
                state.last_pulse_at = Some(now);
            }
            due
        };
        if pulse_due {
            let _ = self.events.send(ActivityEvent::Pulse);
        }
    }
}

/// Observes raw interaction events while monitoring is active.
pub struct ActivityMonitor {
    inner: Arc<MonitorInner>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ActivityMonitor {
    pub fn new(clock: Arc<dyn Clock>, config: ActivityConfig) -> Self {
        let now = clock.now();
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(MonitorInner {
                clock,
                debounce: chrono::Duration::from_std(config.debounce)
                    .unwrap_or_else(|_| chrono::Duration::seconds(30)),
                idle_timeout: chrono::Duration::from_std(config.idle_timeout)
                    .unwrap_or_else(|_| chrono::Duration::minutes(15)),
                state: Mutex::new(MonitorState {
                    watching: false,
                    last_activity_at: now,
                    last_pulse_at: None,
                    idle_fired: false,
                }),
                events,
            }),
            watcher: Mutex::new(None),
        }
    }

    /// Begin observing. Restarting an active monitor replaces the previous
    /// watcher instead of stacking a second one.
    pub fn start_monitoring(&self) {
        self.stop_monitoring();
        {
            let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            state.watching = true;
            state.last_activity_at = self.inner.clock.now();
            state.last_pulse_at = None;
            state.idle_fired = false;
        }
        let task = tokio::spawn(idle_watch(Arc::clone(&self.inner)));
        *self.watcher.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
    }

    /// Stop observing. Raw events are ignored until the next start.
    pub fn stop_monitoring(&self) {
        if let Some(task) = self
            .watcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .watching = false;
    }

    /// Report one raw interaction event.
    pub fn record(&self) {
        self.inner.record();
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .watching
    }

    /// Timestamp of the most recent raw event. Updated on every `record`,
    /// not just on pulses.
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_activity_at
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.inner.events.subscribe()
    }
}

impl Drop for ActivityMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

impl ActivitySink for ActivityMonitor {
    fn record(&self) {
        ActivityMonitor::record(self);
    }
}

async fn idle_watch(inner: Arc<MonitorInner>) {
    let mut interval = tokio::time::interval(IDLE_CHECK_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let fired = {
            let mut state = inner.state.lock().unwrap_or_else(|e| e.into_inner());
            if !state.watching {
                break;
            }
            let idle_for = inner.clock.now() - state.last_activity_at;
            if !state.idle_fired && idle_for >= inner.idle_timeout {
                state.idle_fired = true;
                Some(idle_for.num_seconds())
            } else {
                None
            }
        };
        if let Some(idle_secs) = fired {
            warn!(idle_secs, "idle timeout reached");
            let _ = inner.events.send(ActivityEvent::IdleTimeout);
        }
    }
}
