//! End-to-end edit flow scenarios
//!
//! Exercises the whole guard lifecycle against a scripted backend:
//! acquire and resume variants of entry, the renewal prompt, expiry with
//! auto-release, and every exit path giving the unit back. Paused tokio
//! time drives the one-second countdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use salesdesk_api::{ApiError, BearerSlot, MockApi};
use salesdesk_core::{ActivityConfig, ActivityMonitor, Clock, ManualClock};
use salesdesk_lease::{GuardEvent, LeaseClient, LeaseError, LeaseState, UnitEditGuard, UnitKey};
use salesdesk_session::{KeepAliveConfig, MemorySessionStore, SessionKeepAlive};

struct Backend {
    api: MockApi,
    client: Arc<LeaseClient>,
}

async fn backend() -> Backend {
    let mut api = MockApi::new();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let monitor = Arc::new(ActivityMonitor::new(
        clock.clone() as Arc<dyn Clock>,
        ActivityConfig::default(),
    ));
    let keepalive = Arc::new(SessionKeepAlive::new(
        Arc::new(api.clone()),
        Arc::new(MemorySessionStore::new()),
        monitor,
        BearerSlot::new(),
        clock.clone(),
        KeepAliveConfig {
            poll_interval: Duration::from_secs(30),
            refresh_threshold: Duration::from_secs(60),
            warn_threshold: Duration::from_secs(120),
            activity_gate: Duration::from_secs(600),
        },
    ));
    api.set_response(
        "login",
        json!({
            "token": "a-1",
            "expiracao": (clock.now() + chrono::Duration::seconds(86_400)).to_rfc3339(),
            "refreshToken": "r-1",
            "refreshExpiracao": (clock.now() + chrono::Duration::seconds(172_800)).to_rfc3339(),
            "usuario": "maria.souza",
            "permissoes": ["RESERVA_EDITAR"]
        }),
    );
    keepalive
        .login("maria.souza", "s3cret")
        .await
        .expect("login");
    let client = Arc::new(LeaseClient::new(Arc::new(api.clone()), keepalive, clock));
    Backend { api, client }
}

fn key() -> UnitKey {
    UnitKey::new("EMP01", "B", "204")
}

fn unlocked_status() -> serde_json::Value {
    json!({
        "bloqueado": false,
        "bloqueadoPorMim": false,
        "tempoRestanteSegundos": 0
    })
}

fn granted(ttl: i64) -> serde_json::Value {
    json!({
        "bloqueado": true,
        "tempoRestanteSegundos": ttl
    })
}

// =============================================================================
// Entering the edit flow
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_fresh_unit_is_acquired_and_counts_down() {
    let mut b = backend().await;
    b.api.set_response("unit_lock_status", unlocked_status());
    b.api.set_response("acquire_unit_lock", granted(300));

    let (guard, mut events) = UnitEditGuard::enter(b.client.clone(), key()).await.unwrap();

    assert_eq!(guard.view().state, LeaseState::Held);
    assert_eq!(guard.remaining_seconds(), 300);
    assert_eq!(
        events.recv().await,
        Some(GuardEvent::Tick {
            remaining_seconds: 299
        })
    );
    assert_eq!(b.api.call_count("acquire_unit_lock"), 1);

    guard.finish().await;
    assert_eq!(b.api.call_count("release_unit_lock"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reloaded_screen_adopts_its_own_lock() {
    let mut b = backend().await;
    b.api.set_response(
        "unit_lock_status",
        json!({
            "bloqueado": true,
            "bloqueadoPorMim": true,
            "tempoRestanteSegundos": 140
        }),
    );

    let (guard, mut events) = UnitEditGuard::enter(b.client.clone(), key()).await.unwrap();

    // The server's remaining time is adopted; no second acquire.
    assert_eq!(b.api.call_count("acquire_unit_lock"), 0);
    assert_eq!(guard.remaining_seconds(), 140);
    assert_eq!(
        events.recv().await,
        Some(GuardEvent::Tick {
            remaining_seconds: 139
        })
    );

    guard.cancel().await;
    assert_eq!(b.api.call_count("release_unit_lock"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_foreign_lock_is_a_conflict_without_acquiring() {
    let mut b = backend().await;
    b.api.set_response(
        "unit_lock_status",
        json!({
            "bloqueado": true,
            "bloqueadoPorMim": false,
            "tempoRestanteSegundos": 95
        }),
    );

    let err = UnitEditGuard::enter(b.client.clone(), key())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        LeaseError::Conflict {
            unit: "EMP01/B/204".to_string(),
            remaining_seconds: 95,
            message: None,
        }
    );
    assert_eq!(b.api.call_count("acquire_unit_lock"), 0);
    assert_eq!(b.api.call_count("release_unit_lock"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_lost_race_keeps_the_backend_message() {
    let mut b = backend().await;
    b.api.set_response("unit_lock_status", unlocked_status());
    b.api.set_error(
        "acquire_unit_lock",
        ApiError::Conflict {
            remaining_seconds: 280,
            message: Some("Unidade em edição por outro usuário".to_string()),
        },
    );

    let err = UnitEditGuard::enter(b.client.clone(), key())
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "EMP01/B/204: Unidade em edição por outro usuário"
    );
}

// =============================================================================
// Renewal prompt
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_renewal_prompt_fires_once_and_rearms_on_renew() {
    let mut b = backend().await;
    b.api.set_response("unit_lock_status", unlocked_status());
    b.api.set_response("acquire_unit_lock", granted(62));

    let (guard, mut events) = UnitEditGuard::enter(b.client.clone(), key()).await.unwrap();

    assert_eq!(
        events.recv().await,
        Some(GuardEvent::Tick {
            remaining_seconds: 61
        })
    );
    assert_eq!(
        events.recv().await,
        Some(GuardEvent::RenewPrompt {
            remaining_seconds: 60
        })
    );
    // Disarmed: the next tick is plain.
    assert_eq!(
        events.recv().await,
        Some(GuardEvent::Tick {
            remaining_seconds: 59
        })
    );

    // The operator accepts the prompt.
    b.api.set_response("renew_unit_lock", granted(300));
    assert_eq!(guard.renew().await.unwrap(), 300);
    assert_eq!(guard.remaining_seconds(), 300);

    // A full window later the prompt may fire again.
    for expected in (61..=299).rev() {
        assert_eq!(
            events.recv().await,
            Some(GuardEvent::Tick {
                remaining_seconds: expected
            })
        );
    }
    assert_eq!(
        events.recv().await,
        Some(GuardEvent::RenewPrompt {
            remaining_seconds: 60
        })
    );

    guard.finish().await;
}

#[tokio::test(start_paused = true)]
async fn test_adopted_short_window_prompts_immediately() {
    let mut b = backend().await;
    b.api.set_response(
        "unit_lock_status",
        json!({
            "bloqueado": true,
            "bloqueadoPorMim": true,
            "tempoRestanteSegundos": 30
        }),
    );

    let (guard, mut events) = UnitEditGuard::enter(b.client.clone(), key()).await.unwrap();

    assert_eq!(
        events.recv().await,
        Some(GuardEvent::RenewPrompt {
            remaining_seconds: 29
        })
    );
    guard.cancel().await;
}

#[tokio::test(start_paused = true)]
async fn test_renew_after_server_forgot_the_lock_is_terminal() {
    let mut b = backend().await;
    b.api.set_response("unit_lock_status", unlocked_status());
    b.api.set_response("acquire_unit_lock", granted(300));
    b.api.set_error("renew_unit_lock", ApiError::NotFound);

    let (guard, _events) = UnitEditGuard::enter(b.client.clone(), key()).await.unwrap();

    let err = guard.renew().await.unwrap_err();
    assert!(matches!(err, LeaseError::Gone { .. }));
    assert_eq!(guard.view().state, LeaseState::Expired);

    // Nothing left to release on the way out.
    guard.finish().await;
    assert_eq!(b.api.call_count("release_unit_lock"), 0);
}

// =============================================================================
// Expiry
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_expiry_releases_and_reports() {
    let mut b = backend().await;
    b.api.set_response("unit_lock_status", unlocked_status());
    b.api.set_response("acquire_unit_lock", granted(2));

    let (guard, mut events) = UnitEditGuard::enter(b.client.clone(), key()).await.unwrap();

    // 1s left is already inside the prompt window.
    assert_eq!(
        events.recv().await,
        Some(GuardEvent::RenewPrompt {
            remaining_seconds: 1
        })
    );
    assert_eq!(
        events.recv().await,
        Some(GuardEvent::Tick {
            remaining_seconds: 0
        })
    );
    assert_eq!(events.recv().await, Some(GuardEvent::Expired));

    assert_eq!(b.api.call_count("release_unit_lock"), 1);
    assert_eq!(guard.view().state, LeaseState::Expired);
    assert_eq!(guard.remaining_seconds(), 0);

    // The guard knows the lease is gone; dropping it releases nothing.
    drop(guard);
    tokio::task::yield_now().await;
    assert_eq!(b.api.call_count("release_unit_lock"), 1);
}

// =============================================================================
// Exit paths
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_dropping_the_guard_releases_in_the_background() {
    let mut b = backend().await;
    b.api.set_response("unit_lock_status", unlocked_status());
    b.api.set_response("acquire_unit_lock", granted(300));

    let (guard, _events) = UnitEditGuard::enter(b.client.clone(), key()).await.unwrap();
    drop(guard);

    // Let the spawned release run.
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    assert_eq!(b.api.call_count("release_unit_lock"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_release_happens_once_across_exit_paths() {
    let mut b = backend().await;
    b.api.set_response("unit_lock_status", unlocked_status());
    b.api.set_response("acquire_unit_lock", granted(300));

    let (guard, _events) = UnitEditGuard::enter(b.client.clone(), key()).await.unwrap();
    guard.finish().await;

    tokio::task::yield_now().await;
    assert_eq!(b.api.call_count("release_unit_lock"), 1);
}
