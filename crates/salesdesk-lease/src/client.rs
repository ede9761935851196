//! Lease operations against the reservation backend, with the session's
//! authorization gate wrapped around every call.

use std::future::Future;
use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, warn};

use salesdesk_api::{Api, ApiError, UnitLockResponse};
use salesdesk_core::Clock;
use salesdesk_session::{LogoutReason, SessionKeepAlive};

use crate::error::LeaseError;
use crate::state::{LeaseGrant, LeaseStatus, UnitKey};

/// Acquires, queries, renews and releases exclusive unit-edit leases.
///
/// A stale bearer token is healed in place: on the first `Unauthorized`
/// the client refreshes through the keepalive's single-flight gate and
/// retries once. A second rejection means the session is dead.
pub struct LeaseClient {
    api: Arc<dyn Api>,
    keepalive: Arc<SessionKeepAlive>,
    clock: Arc<dyn Clock>,
}

impl LeaseClient {
    pub fn new(
        api: Arc<dyn Api>,
        keepalive: Arc<SessionKeepAlive>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api,
            keepalive,
            clock,
        }
    }

    pub(crate) fn clock_now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Read-only server snapshot for one unit.
    pub async fn status(&self, key: &UnitKey) -> Result<LeaseStatus, LeaseError> {
        let request = key.to_request();
        let status = self
            .authorized(|| self.api.unit_lock_status(&request))
            .await?;
        let expires_at = status
            .expires_at
            .or_else(|| self.expiry_from_remaining(status.remaining_seconds));
        Ok(LeaseStatus {
            held: status.locked,
            held_by_me: status.locked_by_me,
            remaining_seconds: status.remaining_seconds,
            expires_at,
        })
    }

    /// Take the lease. `Conflict` when another session already holds it.
    pub async fn acquire(&self, key: &UnitKey) -> Result<LeaseGrant, LeaseError> {
        let request = key.to_request();
        let response = self
            .authorized(|| self.api.acquire_unit_lock(&request))
            .await
            .map_err(|e| self.conflict_for(key, e))?;
        debug!(unit = %key, ttl_secs = response.remaining_seconds, "unit lock acquired");
        Ok(self.grant_from(response))
    }

    /// Extend a held lease back to a full window. `Gone` when the server
    /// no longer knows it; that lease instance is over, do not retry.
    pub async fn renew(&self, key: &UnitKey) -> Result<LeaseGrant, LeaseError> {
        let request = key.to_request();
        let response = self
            .authorized(|| self.api.renew_unit_lock(&request))
            .await
            .map_err(|e| match e {
                ApiError::NotFound => LeaseError::Gone {
                    unit: key.to_string(),
                },
                other => self.conflict_for(key, other),
            })?;
        debug!(unit = %key, ttl_secs = response.remaining_seconds, "unit lock renewed");
        Ok(self.grant_from(response))
    }

    /// Give the lease back. Never fails from the caller's point of view;
    /// release runs during teardown where nothing useful can be done with
    /// an error.
    pub async fn release(&self, key: &UnitKey) {
        let request = key.to_request();
        match self
            .authorized(|| self.api.release_unit_lock(&request))
            .await
        {
            Ok(()) => debug!(unit = %key, "unit lock released"),
            Err(ApiError::NotFound) => {
                debug!(unit = %key, "unit lock already gone")
            }
            Err(e) => warn!(unit = %key, error = %e, "failed to release unit lock"),
        }
    }

    /// Runs a backend call, healing a stale token once. A second
    /// `Unauthorized` ends the session.
    async fn authorized<T, F, Fut>(&self, call: F) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        match call().await {
            Err(ApiError::Unauthorized) => {
                debug!("backend rejected token, refreshing session");
                self.keepalive.refresh().await?;
                match call().await {
                    Err(ApiError::Unauthorized) => {
                        self.keepalive.logout(LogoutReason::Expired);
                        Err(ApiError::Unauthorized)
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    fn conflict_for(&self, key: &UnitKey, error: ApiError) -> LeaseError {
        match error {
            ApiError::Conflict {
                remaining_seconds,
                message,
            } => LeaseError::Conflict {
                unit: key.to_string(),
                remaining_seconds,
                message,
            },
            other => LeaseError::Api(other),
        }
    }

    fn grant_from(&self, response: UnitLockResponse) -> LeaseGrant {
        let now = self.clock.now();
        let remaining = response.remaining_seconds.max(0);
        LeaseGrant {
            remaining_seconds: remaining,
            acquired_at: now,
            expires_at: response
                .expires_at
                .unwrap_or_else(|| now + Duration::seconds(remaining)),
        }
    }

    fn expiry_from_remaining(&self, remaining_seconds: i64) -> Option<chrono::DateTime<chrono::Utc>> {
        if remaining_seconds > 0 {
            Some(self.clock.now() + Duration::seconds(remaining_seconds))
        } else {
            None
        }
    }
}
