//! Client-side view of one unit's edit lease.
//!
//! The backend never reveals who holds a lock, only whether it is held and
//! whether it is ours (`bloqueadoPorMim`). Everything here models this
//! session's own view; foreign holders exist only as a boolean.

use chrono::{DateTime, Utc};
use salesdesk_api::UnitLockRequest;

/// Identifies one sellable unit: development, block, unit number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitKey {
    pub development_code: String,
    pub block: String,
    pub unit_code: String,
}

impl UnitKey {
    pub fn new(
        development_code: impl Into<String>,
        block: impl Into<String>,
        unit_code: impl Into<String>,
    ) -> Self {
        Self {
            development_code: development_code.into(),
            block: block.into(),
            unit_code: unit_code.into(),
        }
    }

    pub(crate) fn to_request(&self) -> UnitLockRequest {
        UnitLockRequest {
            development_code: self.development_code.clone(),
            block: self.block.clone(),
            unit_code: self.unit_code.clone(),
        }
    }
}

impl std::fmt::Display for UnitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.development_code, self.block, self.unit_code
        )
    }
}

/// Where this session stands with respect to one unit's lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Unlocked,
    Pending,
    Held,
    HeldByOther,
    Expired,
    Releasing,
}

impl LeaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseState::Unlocked => "unlocked",
            LeaseState::Pending => "pending",
            LeaseState::Held => "held",
            LeaseState::HeldByOther => "held by other",
            LeaseState::Expired => "expired",
            LeaseState::Releasing => "releasing",
        }
    }
}

impl std::fmt::Display for LeaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Server-reported lock status, normalized away from wire names.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaseStatus {
    pub held: bool,
    pub held_by_me: bool,
    pub remaining_seconds: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

impl LeaseStatus {
    /// How this snapshot reads from the session's side.
    pub fn state(&self) -> LeaseState {
        if !self.held {
            LeaseState::Unlocked
        } else if self.held_by_me {
            LeaseState::Held
        } else {
            LeaseState::HeldByOther
        }
    }
}

/// Outcome of a successful acquire or renew.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaseGrant {
    pub remaining_seconds: i64,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The guard's snapshot of its lease. Live remaining time comes from the
/// countdown, not from here.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaseView {
    pub key: UnitKey,
    pub state: LeaseState,
    pub acquired_at: Option<DateTime<Utc>>,
    pub ttl_seconds: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

impl LeaseView {
    pub(crate) fn held(key: UnitKey, grant: &LeaseGrant) -> Self {
        Self {
            key,
            state: LeaseState::Held,
            acquired_at: Some(grant.acquired_at),
            ttl_seconds: grant.remaining_seconds,
            expires_at: Some(grant.expires_at),
        }
    }
}
