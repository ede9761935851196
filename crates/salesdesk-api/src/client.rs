//! The `Api` trait and its HTTP implementation.
//!
//! `HttpApi` owns the transport concerns: base URL joining, timeouts,
//! bearer-token attachment and HTTP-status-to-error mapping. Business
//! endpoints count as user activity and carry the bearer token; the two
//! auth endpoints carry neither, so a token refresh can never recurse into
//! itself or keep the session alive on its own.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use salesdesk_core::ActivitySink;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::types::{
    AuthResponse, LoginRequest, RefreshRequest, UnitLockRequest, UnitLockResponse, UnitLockStatus,
};

/// Backend surface the session and lease layers are written against.
#[async_trait]
pub trait Api: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError>;
    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ApiError>;
    async fn acquire_unit_lock(&self, unit: &UnitLockRequest)
        -> Result<UnitLockResponse, ApiError>;
    async fn unit_lock_status(&self, unit: &UnitLockRequest) -> Result<UnitLockStatus, ApiError>;
    async fn renew_unit_lock(&self, unit: &UnitLockRequest) -> Result<UnitLockResponse, ApiError>;
    async fn release_unit_lock(&self, unit: &UnitLockRequest) -> Result<(), ApiError>;
}

/// Shared slot for the current access token.
///
/// The keepalive writes it on login and refresh, clears it on logout; the
/// HTTP client reads it per request. Cheap to clone, all clones share the
/// same slot.
#[derive(Debug, Clone, Default)]
pub struct BearerSlot {
    token: Arc<RwLock<Option<String>>>,
}

impl BearerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: impl Into<String>) {
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(token.into());
    }

    pub fn clear(&self) {
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    pub fn get(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// `Api` implementation over reqwest.
pub struct HttpApi {
    http: reqwest::Client,
    base_url: String,
    bearer: BearerSlot,
    activity: Option<Arc<dyn ActivitySink>>,
}

impl HttpApi {
    pub fn new(config: &ApiConfig, bearer: BearerSlot) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ApiError::Network {
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer,
            activity: None,
        })
    }

    /// Report every business call to the given sink as raw user activity.
    pub fn with_activity_sink(mut self, sink: Arc<dyn ActivitySink>) -> Self {
        self.activity = Some(sink);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a business request: counts as activity, carries the bearer
    /// token when one is set. Whether the token is valid is the server's
    /// call, not ours.
    async fn dispatch(
        &self,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        if let Some(sink) = &self.activity {
            sink.record();
        }
        let request = match self.bearer.get() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        self.send(path, request).await
    }

    /// Send an auth request: no bearer, no activity instrumentation.
    async fn dispatch_silent(
        &self,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        self.send(path, request).await
    }

    async fn send(
        &self,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        let response = request.send().await.map_err(ApiError::from)?;
        let status = response.status();
        debug!(path, status = status.as_u16(), "backend call");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_from_status(status.as_u16(), &body))
    }
}

#[async_trait]
impl Api for HttpApi {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        let builder = self.http.post(self.url("/auth/login")).json(request);
        let response = self.dispatch_silent("/auth/login", builder).await?;
        response.json().await.map_err(ApiError::from)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ApiError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        let builder = self.http.post(self.url("/auth/refresh")).json(&body);
        let response = self.dispatch_silent("/auth/refresh", builder).await?;
        response.json().await.map_err(ApiError::from)
    }

    async fn acquire_unit_lock(
        &self,
        unit: &UnitLockRequest,
    ) -> Result<UnitLockResponse, ApiError> {
        let path = "/reservas/unidades/bloquear";
        let builder = self.http.post(self.url(path)).json(unit);
        let response = self.dispatch(path, builder).await?;
        response.json().await.map_err(ApiError::from)
    }

    async fn unit_lock_status(&self, unit: &UnitLockRequest) -> Result<UnitLockStatus, ApiError> {
        let path = "/reservas/unidades/status-bloqueio";
        let builder = self.http.get(self.url(path)).query(&[
            ("codEmpreendimento", unit.development_code.as_str()),
            ("bloco", unit.block.as_str()),
            ("unidade", unit.unit_code.as_str()),
        ]);
        let response = self.dispatch(path, builder).await?;
        response.json().await.map_err(ApiError::from)
    }

    async fn renew_unit_lock(&self, unit: &UnitLockRequest) -> Result<UnitLockResponse, ApiError> {
        let path = "/reservas/unidades/renovar-bloqueio";
        let builder = self.http.put(self.url(path)).json(unit);
        let response = self.dispatch(path, builder).await?;
        response.json().await.map_err(ApiError::from)
    }

    async fn release_unit_lock(&self, unit: &UnitLockRequest) -> Result<(), ApiError> {
        let path = "/reservas/unidades/liberar-bloqueio";
        let builder = self.http.delete(self.url(path)).json(unit);
        self.dispatch(path, builder).await?;
        Ok(())
    }
}

fn error_from_status(status: u16, body: &str) -> ApiError {
    match status {
        401 => ApiError::Unauthorized,
        403 => ApiError::Forbidden,
        404 => ApiError::NotFound,
        409 => {
            let (remaining_seconds, message) = conflict_details(body);
            ApiError::Conflict {
                remaining_seconds,
                message,
            }
        }
        _ => ApiError::Server {
            status,
            message: truncate_body(body),
        },
    }
}

/// Best-effort extraction from a 409 body. Old backend builds answer with
/// an HTML error page instead of JSON, hence the tolerance.
fn conflict_details(body: &str) -> (i64, Option<String>) {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return (0, None),
    };
    let remaining = value
        .get("tempoRestanteSegundos")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    let message = value
        .get("mensagem")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    (remaining, message)
}

fn truncate_body(body: &str) -> String {
    const MAX_CHARS: usize = 200;
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        trimmed.to_string()
    } else {
        let mut cut: String = trimmed.chars().take(MAX_CHARS).collect();
        cut.push_str("...");
        cut
    }
}
