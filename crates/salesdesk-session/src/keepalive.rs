//! Periodic session polling, silent renewal and forced logout.
//!
//! Every 30 seconds the keepalive compares the access-token expiry against
//! the clock and the operator's last activity, then does the least
//! surprising thing: refresh silently while the user is around, warn once
//! when the session is about to die under an idle user, and log out the
//! moment the token is actually gone. All renewal triggers (the poll, the
//! 401 recovery path, user actions) funnel through one single-flight gate
//! so the backend sees at most one refresh at a time.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use salesdesk_api::{Api, ApiError, BearerSlot, LoginRequest};
use salesdesk_core::{ActivityEvent, ActivityMonitor, Clock, Singleflight};

use crate::error::SessionError;
use crate::session::{Profile, Session};
use crate::store::SessionStore;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_REFRESH_THRESHOLD_SECS: u64 = 60;
const DEFAULT_WARN_THRESHOLD_SECS: u64 = 120;
const DEFAULT_ACTIVITY_GATE_SECS: u64 = 600;

#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    /// Cadence of the expiry check.
    pub poll_interval: Duration,
    /// Refresh once remaining lifetime drops below this.
    pub refresh_threshold: Duration,
    /// Upper bound of the idle-warning window; also the level a poll must
    /// see to re-arm the warning.
    pub warn_threshold: Duration,
    /// How recent activity must be for a silent refresh.
    pub activity_gate: Duration,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl KeepAliveConfig {
    pub fn from_env() -> Self {
        Self {
            poll_interval: Duration::from_secs(
                env::var("SALESDESK_POLL_INTERVAL")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            ),
            refresh_threshold: Duration::from_secs(
                env::var("SALESDESK_REFRESH_THRESHOLD")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_REFRESH_THRESHOLD_SECS),
            ),
            warn_threshold: Duration::from_secs(
                env::var("SALESDESK_WARN_THRESHOLD")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_WARN_THRESHOLD_SECS),
            ),
            activity_gate: Duration::from_secs(
                env::var("SALESDESK_ACTIVITY_GATE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_ACTIVITY_GATE_SECS),
            ),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    pub fn with_warn_threshold(mut self, threshold: Duration) -> Self {
        self.warn_threshold = threshold;
        self
    }

    pub fn with_activity_gate(mut self, gate: Duration) -> Self {
        self.activity_gate = gate;
        self
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    Expired,
    RefreshFailed,
    Idle,
    UserRequest,
}

impl LogoutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogoutReason::Expired => "expired",
            LogoutReason::RefreshFailed => "refresh failed",
            LogoutReason::Idle => "idle timeout",
            LogoutReason::UserRequest => "user request",
        }
    }
}

impl std::fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observable session lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Refreshed { access_expires_at: DateTime<Utc> },
    IdleWarning { remaining_seconds: i64 },
    LoggedOut { reason: LogoutReason },
}

/// What one poll cycle should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollDecision {
    ForceLogout,
    Refresh,
    LetExpire,
    WarnIdle,
    Healthy,
}

/// The poll decision, as a pure function of the observed durations.
///
/// Windows are strict: remaining exactly at a threshold falls through to
/// `Healthy`, matching the comparisons the rest of the product was
/// validated against.
fn decide(
    remaining: chrono::Duration,
    idle_for: chrono::Duration,
    warned: bool,
    config: &KeepAliveConfig,
) -> PollDecision {
    let refresh_threshold = chrono_secs(config.refresh_threshold);
    let warn_threshold = chrono_secs(config.warn_threshold);
    let activity_gate = chrono_secs(config.activity_gate);

    if remaining <= chrono::Duration::zero() {
        return PollDecision::ForceLogout;
    }
    if remaining < refresh_threshold {
        return if idle_for <= activity_gate {
            PollDecision::Refresh
        } else {
            PollDecision::LetExpire
        };
    }
    if remaining > refresh_threshold
        && remaining < warn_threshold
        && idle_for > activity_gate
        && !warned
    {
        return PollDecision::WarnIdle;
    }
    PollDecision::Healthy
}

fn chrono_secs(duration: Duration) -> chrono::Duration {
    chrono::Duration::seconds(duration.as_secs() as i64)
}

/// Keeps one session alive while the operator is, and ends it otherwise.
pub struct SessionKeepAlive {
    api: Arc<dyn Api>,
    store: Arc<dyn SessionStore>,
    monitor: Arc<ActivityMonitor>,
    bearer: BearerSlot,
    clock: Arc<dyn Clock>,
    config: KeepAliveConfig,
    session: Mutex<Option<Session>>,
    profile: Mutex<Option<Profile>>,
    warned: AtomicBool,
    refresher: Singleflight<DateTime<Utc>, ApiError>,
    events: broadcast::Sender<SessionEvent>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionKeepAlive {
    pub fn new(
        api: Arc<dyn Api>,
        store: Arc<dyn SessionStore>,
        monitor: Arc<ActivityMonitor>,
        bearer: BearerSlot,
        clock: Arc<dyn Clock>,
        config: KeepAliveConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            api,
            store,
            monitor,
            bearer,
            clock,
            config,
            session: Mutex::new(None),
            profile: Mutex::new(None),
            warned: AtomicBool::new(false),
            refresher: Singleflight::new(),
            events,
            poll_task: Mutex::new(None),
        }
    }

    /// Authenticate and begin a session: bearer set, session persisted,
    /// activity monitoring armed.
    pub async fn login(&self, username: &str, password: &str) -> Result<Profile, SessionError> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let auth = self.api.login(&request).await?;
        let session = Session::from_auth(auth, self.clock.now());
        info!(session = %session.id, user = %session.username, "logged in");

        self.bearer.set(&session.access_token);
        if let Err(e) = self.store.save(&session) {
            // Persistence is best-effort; the in-memory session still works.
            warn!(error = %e, "failed to persist session");
        }
        let profile = session.profile();
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = Some(session);
        *self.profile.lock().unwrap_or_else(|e| e.into_inner()) = Some(profile.clone());
        self.warned.store(false, Ordering::SeqCst);
        self.monitor.start_monitoring();
        Ok(profile)
    }

    /// Pick up a persisted session after a process restart. Returns `None`
    /// when there is nothing usable; a stale session is cleared on the way
    /// out.
    pub fn resume(&self) -> Option<Profile> {
        let session = self.store.load()?;
        if !session.refresh_usable(self.clock.now()) {
            debug!(session = %session.id, "stored session beyond refresh expiry");
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "failed to clear stale session");
            }
            return None;
        }

        info!(session = %session.id, user = %session.username, "session resumed");
        self.bearer.set(&session.access_token);
        let profile = session.profile();
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = Some(session);
        *self.profile.lock().unwrap_or_else(|e| e.into_inner()) = Some(profile.clone());
        self.warned.store(false, Ordering::SeqCst);
        self.monitor.start_monitoring();
        Some(profile)
    }

    /// End the session: tokens dropped, store and cached profile cleared,
    /// monitoring stopped. Idempotent; only the call that actually ends a
    /// session emits the event.
    pub fn logout(&self, reason: LogoutReason) {
        let ended = self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(session) = ended else {
            return;
        };
        info!(session = %session.id, reason = %reason, "session ended");

        *self.profile.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.bearer.clear();
        self.monitor.stop_monitoring();
        self.warned.store(false, Ordering::SeqCst);
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear stored session");
        }
        let _ = self.events.send(SessionEvent::LoggedOut { reason });
    }

    /// One poll cycle. The interval loop calls this; tests drive it
    /// directly.
    pub async fn poll_once(&self) {
        let snapshot = self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let Some(session) = snapshot else {
            return;
        };

        let now = self.clock.now();
        let remaining = session.remaining(now);
        let idle_for = now - self.monitor.last_activity_at();

        // A comfortable margin re-arms the idle warning for the next
        // end-of-life approach.
        if remaining > chrono_secs(self.config.warn_threshold) {
            self.warned.store(false, Ordering::SeqCst);
        }

        match decide(
            remaining,
            idle_for,
            self.warned.load(Ordering::SeqCst),
            &self.config,
        ) {
            PollDecision::ForceLogout => {
                info!(session = %session.id, "access token expired");
                self.logout(LogoutReason::Expired);
            }
            PollDecision::Refresh => {
                // A failure already forced the logout inside refresh().
                let _ = self.refresh().await;
            }
            PollDecision::LetExpire => {
                debug!(
                    remaining_secs = remaining.num_seconds(),
                    "operator inactive, letting the token run out"
                );
            }
            PollDecision::WarnIdle => {
                self.warned.store(true, Ordering::SeqCst);
                let _ = self.events.send(SessionEvent::IdleWarning {
                    remaining_seconds: remaining.num_seconds(),
                });
            }
            PollDecision::Healthy => {}
        }
    }

    /// Renew the token pair now. Concurrent callers collapse into one
    /// backend call and share its outcome; any failure ends the session.
    pub async fn refresh(&self) -> Result<DateTime<Utc>, ApiError> {
        let outcome = self.refresher.execute(|| self.perform_refresh()).await;
        if let Err(e) = &outcome {
            warn!(error = %e, "session refresh failed");
            self.logout(LogoutReason::RefreshFailed);
        }
        outcome
    }

    async fn perform_refresh(&self) -> Result<DateTime<Utc>, ApiError> {
        let (refresh_token, session_id) = {
            let guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
            match guard.as_ref() {
                Some(session) => (session.refresh_token.clone(), session.id),
                None => return Err(ApiError::Unauthorized),
            }
        };

        let auth = self.api.refresh(&refresh_token).await?;
        let expires_at = auth.access_expires_at;

        let updated = {
            let mut guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
            match guard.as_mut() {
                Some(session) => {
                    session.adopt(auth);
                    session.last_activity_at = self.monitor.last_activity_at();
                    self.bearer.set(&session.access_token);
                    Some(session.clone())
                }
                None => None,
            }
        };
        if let Some(session) = &updated {
            if let Err(e) = self.store.save(session) {
                warn!(error = %e, "failed to persist refreshed session");
            }
        }

        self.warned.store(false, Ordering::SeqCst);
        info!(session = %session_id, "access token refreshed");
        let _ = self.events.send(SessionEvent::Refreshed {
            access_expires_at: expires_at,
        });
        Ok(expires_at)
    }

    /// Spawn the poll loop. A second start while it runs is a no-op;
    /// `shutdown` (or drop) ends it.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.poll_task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = slot.as_ref() {
            if !task.is_finished() {
                return;
            }
        }
        let keepalive = Arc::clone(self);
        *slot = Some(tokio::spawn(async move { keepalive.run().await }));
    }

    pub fn shutdown(&self) {
        if let Some(task) = self
            .poll_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }

    async fn run(&self) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut activity = self.monitor.subscribe();

        loop {
            tokio::select! {
                _ = interval.tick() => self.poll_once().await,
                event = activity.recv() => match event {
                    Ok(ActivityEvent::Pulse) => {
                        self.warned.store(false, Ordering::SeqCst);
                    }
                    Ok(ActivityEvent::IdleTimeout) => {
                        self.logout(LogoutReason::Idle);
                    }
                    // The monitor outlives us; lagged receivers just skip.
                    Err(_) => {}
                },
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Cached operator identity; `None` once logged out.
    pub fn profile(&self) -> Option<Profile> {
        self.profile
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Plain permission predicate for the presentation layer. A logged-out
    /// operator has no permissions.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.profile
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|p| p.has_permission(permission))
            .unwrap_or(false)
    }

    /// Remaining access-token lifetime, if logged in.
    pub fn remaining(&self) -> Option<chrono::Duration> {
        let now = self.clock.now();
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| s.remaining(now))
    }
}

impl Drop for SessionKeepAlive {
    fn drop(&mut self) {
        self.shutdown();
    }
}
