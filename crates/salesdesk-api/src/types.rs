//! Wire types for the legacy backend.
//!
//! The backend speaks Portuguese on the wire; the `#[serde(rename)]`
//! attributes are the single place that vocabulary appears. Everything
//! above this module works with the English field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies one sellable unit: development, block, unit code.
///
/// Used as the body of every lock operation and as query parameters for
/// the status probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitLockRequest {
    #[serde(rename = "codEmpreendimento")]
    pub development_code: String,
    #[serde(rename = "bloco")]
    pub block: String,
    #[serde(rename = "unidade")]
    pub unit_code: String,
}

/// Response to acquire and renew operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitLockResponse {
    #[serde(rename = "bloqueado")]
    pub locked: bool,
    #[serde(rename = "tempoRestanteSegundos")]
    pub remaining_seconds: i64,
    #[serde(rename = "dataHoraExpiracao")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(rename = "mensagem", default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response to the read-only status probe.
///
/// `locked_by_me` is computed server-side from the caller's session; the
/// backend never discloses who else holds a lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitLockStatus {
    #[serde(rename = "bloqueado")]
    pub locked: bool,
    #[serde(rename = "tempoRestanteSegundos")]
    pub remaining_seconds: i64,
    #[serde(rename = "dataHoraExpiracao")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(rename = "bloqueadoPorMim")]
    pub locked_by_me: bool,
}

/// Credentials for `POST /auth/login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(rename = "usuario")]
    pub username: String,
    #[serde(rename = "senha")]
    pub password: String,
}

/// Body of `POST /auth/refresh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Token pair returned by both auth endpoints.
///
/// The refresh endpoint may rotate the refresh token; callers must adopt
/// whatever pair comes back rather than keeping the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(rename = "token")]
    pub access_token: String,
    #[serde(rename = "expiracao")]
    pub access_expires_at: DateTime<Utc>,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    #[serde(rename = "refreshExpiracao")]
    pub refresh_expires_at: DateTime<Utc>,
    #[serde(rename = "usuario")]
    pub username: String,
    #[serde(rename = "permissoes", default)]
    pub permissions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unit_lock_request_serializes_to_wire_names() {
        let request = UnitLockRequest {
            development_code: "EMP01".to_string(),
            block: "B".to_string(),
            unit_code: "204".to_string(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "codEmpreendimento": "EMP01",
                "bloco": "B",
                "unidade": "204"
            })
        );
    }

    #[test]
    fn test_unit_lock_response_parses_acquire_payload() {
        let body = json!({
            "bloqueado": true,
            "tempoRestanteSegundos": 300,
            "dataHoraExpiracao": "2024-11-05T14:30:00Z",
            "mensagem": "Unidade bloqueada com sucesso"
        });

        let parsed: UnitLockResponse = serde_json::from_value(body).unwrap();
        assert!(parsed.locked);
        assert_eq!(parsed.remaining_seconds, 300);
        assert!(parsed.expires_at.is_some());
        assert_eq!(
            parsed.message.as_deref(),
            Some("Unidade bloqueada com sucesso")
        );
    }

    #[test]
    fn test_unit_lock_response_message_is_optional() {
        let body = json!({
            "bloqueado": true,
            "tempoRestanteSegundos": 120,
            "dataHoraExpiracao": null
        });

        let parsed: UnitLockResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.message, None);
        assert_eq!(parsed.expires_at, None);
    }

    #[test]
    fn test_unit_lock_status_parses_foreign_holder() {
        let body = json!({
            "bloqueado": true,
            "tempoRestanteSegundos": 185,
            "dataHoraExpiracao": "2024-11-05T14:30:00Z",
            "bloqueadoPorMim": false
        });

        let parsed: UnitLockStatus = serde_json::from_value(body).unwrap();
        assert!(parsed.locked);
        assert!(!parsed.locked_by_me);
        assert_eq!(parsed.remaining_seconds, 185);
    }

    #[test]
    fn test_auth_response_parses_login_payload() {
        let body = json!({
            "token": "eyJhbGciOi.header.sig",
            "expiracao": "2024-11-05T15:00:00Z",
            "refreshToken": "r-123",
            "refreshExpiracao": "2024-11-06T14:00:00Z",
            "usuario": "maria.souza",
            "permissoes": ["RESERVA_EDITAR", "RESERVA_VISUALIZAR"]
        });

        let parsed: AuthResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.username, "maria.souza");
        assert_eq!(parsed.permissions.len(), 2);
        assert!(parsed.access_expires_at < parsed.refresh_expires_at);
    }

    #[test]
    fn test_auth_response_permissions_default_empty() {
        let body = json!({
            "token": "t",
            "expiracao": "2024-11-05T15:00:00Z",
            "refreshToken": "r",
            "refreshExpiracao": "2024-11-06T14:00:00Z",
            "usuario": "ops"
        });

        let parsed: AuthResponse = serde_json::from_value(body).unwrap();
        assert!(parsed.permissions.is_empty());
    }

    #[test]
    fn test_login_request_uses_wire_names() {
        let request = LoginRequest {
            username: "maria.souza".to_string(),
            password: "s3cret".to_string(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({ "usuario": "maria.souza", "senha": "s3cret" }));
    }
}
