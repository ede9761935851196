use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::Api;
use crate::error::ApiError;
use crate::types::{
    AuthResponse, LoginRequest, UnitLockRequest, UnitLockResponse, UnitLockStatus,
};

type Scripted = Result<Value, ApiError>;
type CallRecord = Vec<(String, Value)>;

/// A mock implementation of `Api` for testing.
///
/// Responses are scripted per endpoint name, either as a sticky response
/// that answers every call or as a queue of one-shots consumed first. All
/// calls are recorded with their wire-shaped parameters for assertions.
///
/// # Example
///
/// ```ignore
/// use salesdesk_api::MockApi;
/// use serde_json::json;
///
/// let mut mock = MockApi::new();
/// mock.set_response(
///     "unit_lock_status",
///     json!({ "bloqueado": false, "tempoRestanteSegundos": 0,
///             "dataHoraExpiracao": null, "bloqueadoPorMim": false }),
/// );
/// ```
#[derive(Clone, Default)]
pub struct MockApi {
    sticky: Arc<Mutex<HashMap<String, Scripted>>>,
    queued: Arc<Mutex<HashMap<String, VecDeque<Scripted>>>>,
    calls: Arc<Mutex<CallRecord>>,
}

impl MockApi {
    /// Creates a new MockApi with no scripted responses. Calling an
    /// unscripted endpoint fails with a decode error naming it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sticky success response for an endpoint.
    pub fn set_response(&mut self, endpoint: &str, response: Value) {
        self.sticky
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), Ok(response));
    }

    /// Sets the sticky error response for an endpoint.
    pub fn set_error(&mut self, endpoint: &str, error: ApiError) {
        self.sticky
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), Err(error));
    }

    /// Queues a one-shot success response, consumed before the sticky one.
    pub fn queue_response(&mut self, endpoint: &str, response: Value) {
        self.queued
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(Ok(response));
    }

    /// Queues a one-shot error response, consumed before the sticky one.
    pub fn queue_error(&mut self, endpoint: &str, error: ApiError) {
        self.queued
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(Err(error));
    }

    /// Returns all calls made to this mock.
    pub fn get_calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    /// Returns the number of times an endpoint was called.
    pub fn call_count(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == endpoint)
            .count()
    }

    /// Returns the parameters of the most recent call to an endpoint.
    pub fn last_call(&self, endpoint: &str) -> Option<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(name, _)| name == endpoint)
            .map(|(_, params)| params.clone())
    }

    /// Returns all parameters passed to calls of an endpoint.
    pub fn params_for(&self, endpoint: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == endpoint)
            .map(|(_, params)| params.clone())
            .collect()
    }

    /// Clears recorded calls and scripted responses.
    pub fn reset(&mut self) {
        self.calls.lock().unwrap().clear();
        self.sticky.lock().unwrap().clear();
        self.queued.lock().unwrap().clear();
    }

    fn respond(&self, endpoint: &str, params: Value) -> Scripted {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.to_string(), params));

        if let Some(scripted) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(endpoint)
            .and_then(|queue| queue.pop_front())
        {
            return scripted;
        }
        if let Some(scripted) = self.sticky.lock().unwrap().get(endpoint) {
            return scripted.clone();
        }
        Err(ApiError::Decode {
            message: format!("no scripted response for '{endpoint}'"),
        })
    }

    fn respond_as<T: DeserializeOwned>(&self, endpoint: &str, params: Value) -> Result<T, ApiError> {
        let value = self.respond(endpoint, params)?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl Api for MockApi {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        let params = serde_json::to_value(request).unwrap_or(Value::Null);
        self.respond_as("login", params)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ApiError> {
        let params = serde_json::json!({ "refreshToken": refresh_token });
        self.respond_as("refresh", params)
    }

    async fn acquire_unit_lock(
        &self,
        unit: &UnitLockRequest,
    ) -> Result<UnitLockResponse, ApiError> {
        let params = serde_json::to_value(unit).unwrap_or(Value::Null);
        self.respond_as("acquire_unit_lock", params)
    }

    async fn unit_lock_status(&self, unit: &UnitLockRequest) -> Result<UnitLockStatus, ApiError> {
        let params = serde_json::to_value(unit).unwrap_or(Value::Null);
        self.respond_as("unit_lock_status", params)
    }

    async fn renew_unit_lock(&self, unit: &UnitLockRequest) -> Result<UnitLockResponse, ApiError> {
        let params = serde_json::to_value(unit).unwrap_or(Value::Null);
        self.respond_as("renew_unit_lock", params)
    }

    async fn release_unit_lock(&self, unit: &UnitLockRequest) -> Result<(), ApiError> {
        let params = serde_json::to_value(unit).unwrap_or(Value::Null);
        self.respond("release_unit_lock", params).map(|_| ())
    }
}
