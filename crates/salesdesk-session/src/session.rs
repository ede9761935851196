//! The authenticated session model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use salesdesk_api::AuthResponse;

/// One authenticated session: the token pair plus what the backend told us
/// about the operator at login.
///
/// Invariant: `access_expires_at <= refresh_expires_at`. The backend
/// guarantees it; once the refresh token is gone the session cannot be
/// renewed and must end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Client-side instance id, for log correlation only.
    pub id: Uuid,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub username: String,
    pub permissions: Vec<String>,
    /// Last time the operator did something. Maintained live by the
    /// activity monitor; snapshotted here whenever the session is
    /// persisted.
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    /// Build a fresh session from a login response.
    pub fn from_auth(auth: AuthResponse, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            access_token: auth.access_token,
            access_expires_at: auth.access_expires_at,
            refresh_token: auth.refresh_token,
            refresh_expires_at: auth.refresh_expires_at,
            username: auth.username,
            permissions: auth.permissions,
            last_activity_at: now,
        }
    }

    /// Adopt the pair returned by a refresh. The backend rotates the
    /// refresh token, so both tokens are replaced wholesale.
    pub fn adopt(&mut self, auth: AuthResponse) {
        self.access_token = auth.access_token;
        self.access_expires_at = auth.access_expires_at;
        self.refresh_token = auth.refresh_token;
        self.refresh_expires_at = auth.refresh_expires_at;
    }

    /// Time until the access token expires. Negative once it has.
    pub fn remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.access_expires_at - now
    }

    /// Whether the refresh token can still be redeemed.
    pub fn refresh_usable(&self, now: DateTime<Utc>) -> bool {
        now < self.refresh_expires_at
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    pub fn profile(&self) -> Profile {
        Profile {
            username: self.username.clone(),
            permissions: self.permissions.clone(),
        }
    }
}

/// Operator identity shown by the presentation layer. Cached next to the
/// session and cleared with it on logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    pub permissions: Vec<String>,
}

impl Profile {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(access_secs: i64, refresh_secs: i64) -> (AuthResponse, DateTime<Utc>) {
        let now = Utc::now();
        (
            AuthResponse {
                access_token: "a-1".to_string(),
                access_expires_at: now + chrono::Duration::seconds(access_secs),
                refresh_token: "r-1".to_string(),
                refresh_expires_at: now + chrono::Duration::seconds(refresh_secs),
                username: "maria.souza".to_string(),
                permissions: vec!["RESERVA_EDITAR".to_string()],
            },
            now,
        )
    }

    #[test]
    fn test_from_auth_carries_identity_and_tokens() {
        let (auth, now) = auth(300, 86_400);
        let session = Session::from_auth(auth, now);

        assert_eq!(session.username, "maria.souza");
        assert_eq!(session.access_token, "a-1");
        assert_eq!(session.remaining(now), chrono::Duration::seconds(300));
        assert!(session.refresh_usable(now));
        assert_eq!(session.last_activity_at, now);
    }

    #[test]
    fn test_adopt_replaces_both_tokens() {
        let (first, now) = auth(300, 86_400);
        let mut session = Session::from_auth(first, now);
        let before_id = session.id;

        let rotated = AuthResponse {
            access_token: "a-2".to_string(),
            access_expires_at: now + chrono::Duration::seconds(900),
            refresh_token: "r-2".to_string(),
            refresh_expires_at: now + chrono::Duration::seconds(90_000),
            username: "maria.souza".to_string(),
            permissions: vec![],
        };
        session.adopt(rotated);

        assert_eq!(session.access_token, "a-2");
        assert_eq!(session.refresh_token, "r-2");
        assert_eq!(session.remaining(now), chrono::Duration::seconds(900));
        // Identity survives a refresh.
        assert_eq!(session.id, before_id);
        assert_eq!(session.username, "maria.souza");
    }

    #[test]
    fn test_remaining_goes_negative_after_expiry() {
        let (auth, now) = auth(300, 86_400);
        let session = Session::from_auth(auth, now);

        let later = now + chrono::Duration::seconds(301);
        assert!(session.remaining(later) < chrono::Duration::zero());
    }

    #[test]
    fn test_refresh_usable_ends_at_refresh_expiry() {
        let (auth, now) = auth(300, 600);
        let session = Session::from_auth(auth, now);

        assert!(session.refresh_usable(now + chrono::Duration::seconds(599)));
        assert!(!session.refresh_usable(now + chrono::Duration::seconds(600)));
    }

    #[test]
    fn test_permission_predicate_is_exact_match() {
        let (auth, now) = auth(300, 600);
        let session = Session::from_auth(auth, now);

        assert!(session.has_permission("RESERVA_EDITAR"));
        assert!(!session.has_permission("RESERVA"));
        assert!(!session.has_permission("ADMIN"));
    }

    #[test]
    fn test_session_serde_round_trip() {
        let (auth, now) = auth(300, 86_400);
        let session = Session::from_auth(auth, now);

        let json = serde_json::to_string(&session).unwrap();
        let parsed: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, session);
    }
}
