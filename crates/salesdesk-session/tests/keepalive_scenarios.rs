//! End-to-end keepalive loop scenarios
//!
//! Drives the spawned poll loop against a scripted backend and a manual
//! clock. Paused tokio time lets the 30-second cadence run in
//! microseconds while the desk clock only moves when a test says so.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;

use salesdesk_api::{ApiError, BearerSlot, MockApi};
use salesdesk_core::{ActivityConfig, ActivityMonitor, Clock, ManualClock};
use salesdesk_session::{
    KeepAliveConfig, LogoutReason, MemorySessionStore, SessionEvent, SessionKeepAlive,
};

struct Scenario {
    keepalive: Arc<SessionKeepAlive>,
    api: MockApi,
    clock: Arc<ManualClock>,
    monitor: Arc<ActivityMonitor>,
}

fn scenario() -> Scenario {
    let api = MockApi::new();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let monitor = Arc::new(ActivityMonitor::new(
        clock.clone() as Arc<dyn Clock>,
        ActivityConfig::default(),
    ));
    let keepalive = Arc::new(SessionKeepAlive::new(
        Arc::new(api.clone()),
        Arc::new(MemorySessionStore::new()),
        monitor.clone(),
        BearerSlot::new(),
        clock.clone(),
        KeepAliveConfig {
            poll_interval: Duration::from_secs(30),
            refresh_threshold: Duration::from_secs(60),
            warn_threshold: Duration::from_secs(120),
            activity_gate: Duration::from_secs(600),
        },
    ));
    Scenario {
        keepalive,
        api,
        clock,
        monitor,
    }
}

fn auth_json(now: DateTime<Utc>, access_secs: i64, tag: &str) -> serde_json::Value {
    json!({
        "token": format!("a-{tag}"),
        "expiracao": (now + chrono::Duration::seconds(access_secs)).to_rfc3339(),
        "refreshToken": format!("r-{tag}"),
        "refreshExpiracao": (now + chrono::Duration::seconds(86_400)).to_rfc3339(),
        "usuario": "maria.souza",
        "permissoes": ["RESERVA_EDITAR"]
    })
}

// =============================================================================
// Silent renewal
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_loop_renews_a_token_under_an_active_operator() {
    let mut s = scenario();
    s.api.set_response("login", auth_json(s.clock.now(), 300, "1"));
    s.keepalive.login("maria.souza", "s3cret").await.unwrap();
    let mut events = s.keepalive.subscribe();
    s.keepalive.start();

    // 40s of token left, desk touched just now.
    s.clock.advance(Duration::from_secs(260));
    s.monitor.record();
    s.api
        .set_response("refresh", auth_json(s.clock.now(), 300, "2"));

    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::Refreshed { .. }
    ));
    assert_eq!(s.api.call_count("refresh"), 1);
    assert!(s.keepalive.is_logged_in());
    s.keepalive.shutdown();
}

// =============================================================================
// Natural expiry
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_loop_logs_out_when_the_token_expires() {
    let mut s = scenario();
    s.api.set_response("login", auth_json(s.clock.now(), 300, "1"));
    s.keepalive.login("maria.souza", "s3cret").await.unwrap();
    let mut events = s.keepalive.subscribe();
    s.keepalive.start();

    // Nobody touches the desk; the token runs out.
    s.clock.advance(Duration::from_secs(301));

    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::LoggedOut {
            reason: LogoutReason::Expired
        }
    );
    assert_eq!(s.api.call_count("refresh"), 0);
    assert!(!s.keepalive.is_logged_in());
    s.keepalive.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_loop_ends_the_session_when_refresh_is_rejected() {
    let mut s = scenario();
    s.api.set_response("login", auth_json(s.clock.now(), 300, "1"));
    s.keepalive.login("maria.souza", "s3cret").await.unwrap();
    let mut events = s.keepalive.subscribe();
    s.keepalive.start();

    s.clock.advance(Duration::from_secs(260));
    s.monitor.record();
    s.api.set_error(
        "refresh",
        ApiError::Server {
            status: 503,
            message: "manutencao".to_string(),
        },
    );

    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::LoggedOut {
            reason: LogoutReason::RefreshFailed
        }
    );
    assert!(!s.keepalive.is_logged_in());
    s.keepalive.shutdown();
}

// =============================================================================
// Idle timeout
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_loop_logs_out_an_abandoned_desk_before_token_expiry() {
    let mut s = scenario();
    // Long-lived token: only the idle timeout can end this session.
    s.api.set_response("login", auth_json(s.clock.now(), 3600, "1"));
    s.keepalive.login("maria.souza", "s3cret").await.unwrap();
    let mut events = s.keepalive.subscribe();
    s.keepalive.start();

    s.clock.advance(Duration::from_secs(901));

    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::LoggedOut {
            reason: LogoutReason::Idle
        }
    );
    assert!(!s.keepalive.is_logged_in());
    assert!(!s.monitor.is_monitoring());
    s.keepalive.shutdown();
}

// =============================================================================
// Idle warning and recovery
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_warning_then_activity_leads_to_renewal_not_logout() {
    let mut s = scenario();
    s.api.set_response("login", auth_json(s.clock.now(), 900, "1"));
    s.keepalive.login("maria.souza", "s3cret").await.unwrap();
    let mut events = s.keepalive.subscribe();
    s.keepalive.start();

    // Remaining 110s, idle 790s: the warning goes out.
    s.clock.advance(Duration::from_secs(790));
    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::IdleWarning { .. }
    ));

    // The operator comes back, and the next sub-threshold poll renews.
    s.monitor.record();
    s.api
        .set_response("refresh", auth_json(s.clock.now(), 900, "2"));
    s.clock.advance(Duration::from_secs(56));

    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::Refreshed { .. }
    ));
    assert_eq!(s.api.call_count("refresh"), 1);
    assert!(s.keepalive.is_logged_in());
    s.keepalive.shutdown();
}
