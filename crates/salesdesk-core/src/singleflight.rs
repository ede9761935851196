//! Single-flight gate for a shared asynchronous operation.
//!
//! Several triggers can decide "the token must be refreshed now" at the
//! same instant: the periodic poll, a 401 interceptor, a user action. The
//! gate guarantees at most one underlying invocation is outstanding; every
//! caller that arrives while one is in flight waits for it and observes the
//! same outcome. Nothing is retried here: a failure is broadcast as-is and
//! the gate returns to idle.

use std::future::Future;
use std::sync::Mutex;

use tokio::sync::oneshot;

enum FlightState<T, E> {
    Idle,
    InFlight {
        waiters: Vec<oneshot::Sender<Result<T, E>>>,
    },
}

/// At-most-one-in-flight coordinator for an async operation producing
/// `Result<T, E>`.
pub struct Singleflight<T, E> {
    state: Mutex<FlightState<T, E>>,
}

impl<T, E> Default for Singleflight<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Singleflight<T, E> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FlightState::Idle),
        }
    }

    /// Returns true while an invocation is outstanding.
    pub fn in_flight(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(|e| e.into_inner()),
            FlightState::InFlight { .. }
        )
    }
}

impl<T: Clone, E: Clone> Singleflight<T, E> {
    /// Run `op`, or join an invocation already in flight.
    ///
    /// The first caller while idle becomes the leader and actually invokes
    /// `op`; callers arriving before it resolves are enqueued and receive a
    /// clone of the leader's outcome in arrival order. If the leader's
    /// future is dropped mid-flight the waiters contend again, which is why
    /// `op` is `Fn` rather than `FnOnce`.
    pub async fn execute<F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        loop {
            let waiter = {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                match &mut *state {
                    FlightState::Idle => {
                        *state = FlightState::InFlight {
                            waiters: Vec::new(),
                        };
                        None
                    }
                    FlightState::InFlight { waiters } => {
                        let (tx, rx) = oneshot::channel();
                        waiters.push(tx);
                        Some(rx)
                    }
                }
            };

            match waiter {
                Some(rx) => match rx.await {
                    Ok(outcome) => return outcome,
                    // Leader dropped before resolving; contend again.
                    Err(_) => continue,
                },
                None => {
                    let reset = ResetOnDrop { flight: self };
                    let outcome = op().await;
                    std::mem::forget(reset);

                    let waiters = {
                        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                        match std::mem::replace(&mut *state, FlightState::Idle) {
                            FlightState::InFlight { waiters } => waiters,
                            FlightState::Idle => Vec::new(),
                        }
                    };
                    for tx in waiters {
                        let _ = tx.send(outcome.clone());
                    }
                    return outcome;
                }
            }
        }
    }
}

/// Restores the idle state if the leader's future is dropped mid-flight.
/// Dropping the queued senders wakes every waiter with a recv error, which
/// sends them back around the `execute` loop.
struct ResetOnDrop<'a, T, E> {
    flight: &'a Singleflight<T, E>,
}

impl<T, E> Drop for ResetOnDrop<'_, T, E> {
    fn drop(&mut self) {
        let mut state = self.flight.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = FlightState::Idle;
    }
}
