//! The guarded edit flow: one unit, one lease, one countdown, and a
//! release on every way out.
//!
//! `UnitEditGuard::enter` runs the resume-on-reload protocol the edit
//! screens need. A reloaded screen finds its own lock still held and
//! adopts the server's remaining time instead of re-acquiring; a foreign
//! lock is a conflict before any acquire is attempted. While the guard
//! lives, a countdown mirrors the server-side TTL and raises a one-shot
//! renewal prompt near the end of the window. When the window closes
//! without a renewal the guard releases the lease on its own and any
//! unsaved edits are gone, exactly like the legacy screens.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info};

use salesdesk_core::{Countdown, CountdownEvent};

use crate::client::LeaseClient;
use crate::error::LeaseError;
use crate::state::{LeaseGrant, LeaseState, LeaseView, UnitKey};

/// Prompt for renewal once remaining time falls to this.
const RENEW_PROMPT_THRESHOLD_SECS: u64 = 60;

/// What the edit flow sees while it holds a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardEvent {
    /// Once per second while the lease runs.
    Tick { remaining_seconds: u64 },
    /// The window is nearly over; ask the operator whether to extend.
    /// Fires once per granted window.
    RenewPrompt { remaining_seconds: u64 },
    /// The window closed; the lease has already been given back.
    Expired,
}

/// State shared between the guard handle and its relay task.
struct Shared {
    view: Mutex<LeaseView>,
    prompt_armed: AtomicBool,
    remaining: AtomicI64,
    released: AtomicBool,
}

impl Shared {
    fn set_state(&self, state: LeaseState) {
        self.view.lock().unwrap_or_else(|e| e.into_inner()).state = state;
    }
}

/// Holds one unit's edit lease for as long as it lives.
pub struct UnitEditGuard {
    client: Arc<LeaseClient>,
    key: UnitKey,
    countdown: Countdown,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for UnitEditGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitEditGuard")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl UnitEditGuard {
    /// Enter the edit flow for `key`.
    ///
    /// Order matters: status first, so a session that still holds the
    /// unit (a reloaded screen) adopts the server's remaining time rather
    /// than acquiring again, and a unit held by someone else fails fast
    /// without touching the lock.
    pub async fn enter(
        client: Arc<LeaseClient>,
        key: UnitKey,
    ) -> Result<(Self, mpsc::UnboundedReceiver<GuardEvent>), LeaseError> {
        let status = client.status(&key).await?;

        let grant = if status.held && status.held_by_me {
            info!(unit = %key, remaining_secs = status.remaining_seconds, "resuming own unit lock");
            let now = client.clock_now();
            let remaining = status.remaining_seconds.max(0);
            LeaseGrant {
                remaining_seconds: remaining,
                acquired_at: now,
                expires_at: status
                    .expires_at
                    .unwrap_or_else(|| now + chrono::Duration::seconds(remaining)),
            }
        } else if status.held {
            return Err(LeaseError::Conflict {
                unit: key.to_string(),
                remaining_seconds: status.remaining_seconds,
                message: None,
            });
        } else {
            // A lost race surfaces here as the same Conflict.
            let grant = client.acquire(&key).await?;
            info!(unit = %key, ttl_secs = grant.remaining_seconds, "unit lock acquired");
            grant
        };

        let shared = Arc::new(Shared {
            view: Mutex::new(LeaseView::held(key.clone(), &grant)),
            prompt_armed: AtomicBool::new(true),
            remaining: AtomicI64::new(grant.remaining_seconds),
            released: AtomicBool::new(false),
        });

        let (countdown, ticks) = Countdown::new();
        countdown.start(grant.remaining_seconds.max(0) as u64);

        let (events, receiver) = mpsc::unbounded_channel();
        tokio::spawn(relay(
            ticks,
            events,
            Arc::clone(&client),
            key.clone(),
            Arc::clone(&shared),
        ));

        Ok((
            Self {
                client,
                key,
                countdown,
                shared,
            },
            receiver,
        ))
    }

    /// Extend the window back to a full TTL and re-arm the renewal
    /// prompt. On `Gone` the lease instance is finished; the guard marks
    /// itself expired and there is nothing left to release.
    pub async fn renew(&self) -> Result<i64, LeaseError> {
        self.shared.set_state(LeaseState::Pending);
        match self.client.renew(&self.key).await {
            Ok(grant) => {
                {
                    let mut view = self.shared.view.lock().unwrap_or_else(|e| e.into_inner());
                    view.state = LeaseState::Held;
                    view.ttl_seconds = grant.remaining_seconds;
                    view.expires_at = Some(grant.expires_at);
                }
                self.shared
                    .remaining
                    .store(grant.remaining_seconds, Ordering::SeqCst);
                self.shared.prompt_armed.store(true, Ordering::SeqCst);
                self.countdown
                    .reset(Some(grant.remaining_seconds.max(0) as u64));
                Ok(grant.remaining_seconds)
            }
            Err(LeaseError::Gone { unit }) => {
                self.shared.released.store(true, Ordering::SeqCst);
                self.shared.set_state(LeaseState::Expired);
                Err(LeaseError::Gone { unit })
            }
            Err(e) => {
                // Transient failure: the lease is still ours.
                self.shared.set_state(LeaseState::Held);
                Err(e)
            }
        }
    }

    /// The edit was saved; give the unit back.
    pub async fn finish(self) {
        self.leave().await;
    }

    /// The edit was abandoned; give the unit back.
    pub async fn cancel(self) {
        self.leave().await;
    }

    async fn leave(&self) {
        if self.shared.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.set_state(LeaseState::Releasing);
        self.countdown.pause();
        self.client.release(&self.key).await;
        self.shared.set_state(LeaseState::Unlocked);
    }

    pub fn key(&self) -> &UnitKey {
        &self.key
    }

    /// Snapshot of the lease view. Live remaining time is in
    /// [`UnitEditGuard::remaining_seconds`].
    pub fn view(&self) -> LeaseView {
        self.shared
            .view
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Seconds left as of the latest countdown tick.
    pub fn remaining_seconds(&self) -> i64 {
        self.shared.remaining.load(Ordering::SeqCst)
    }
}

impl Drop for UnitEditGuard {
    fn drop(&mut self) {
        // Window-close path: release without waiting, if a runtime is
        // still there to carry it.
        if self.shared.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let client = Arc::clone(&self.client);
        let key = self.key.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                client.release(&key).await;
            });
        }
    }
}

/// Turns countdown events into guard events and closes out the window.
/// Exits when the countdown goes away or the lease expires.
async fn relay(
    mut ticks: mpsc::UnboundedReceiver<CountdownEvent>,
    events: mpsc::UnboundedSender<GuardEvent>,
    client: Arc<LeaseClient>,
    key: UnitKey,
    shared: Arc<Shared>,
) {
    while let Some(event) = ticks.recv().await {
        match event {
            CountdownEvent::Tick(secs) => {
                shared.remaining.store(secs as i64, Ordering::SeqCst);
                let prompt = secs <= RENEW_PROMPT_THRESHOLD_SECS
                    && shared.prompt_armed.swap(false, Ordering::SeqCst);
                let guard_event = if prompt {
                    GuardEvent::RenewPrompt {
                        remaining_seconds: secs,
                    }
                } else {
                    GuardEvent::Tick {
                        remaining_seconds: secs,
                    }
                };
                if events.send(guard_event).is_err() {
                    break;
                }
            }
            CountdownEvent::Timeout => {
                shared.remaining.store(0, Ordering::SeqCst);
                info!(unit = %key, "editing window closed, releasing unit");
                if !shared.released.swap(true, Ordering::SeqCst) {
                    client.release(&key).await;
                }
                shared.set_state(LeaseState::Expired);
                let _ = events.send(GuardEvent::Expired);
                break;
            }
        }
    }
    debug!(unit = %key, "guard relay finished");
}
