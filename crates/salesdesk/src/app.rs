//! Builds the service graph behind every command: one HTTP client with a
//! shared bearer slot, one activity monitor feeding it, the session
//! keepalive, and the lease client layered on top.

use std::sync::Arc;

use tracing::debug;

use salesdesk_api::{Api, ApiConfig, ApiError, BearerSlot, HttpApi};
use salesdesk_core::{ActivityConfig, ActivityMonitor, ActivitySink, Clock, SystemClock};
use salesdesk_lease::LeaseClient;
use salesdesk_session::{FileSessionStore, KeepAliveConfig, SessionKeepAlive};

pub struct App {
    pub keepalive: Arc<SessionKeepAlive>,
    pub lease: Arc<LeaseClient>,
    pub monitor: Arc<ActivityMonitor>,
}

impl App {
    pub fn build(api_url: Option<String>) -> Result<Self, ApiError> {
        let mut config = ApiConfig::from_env();
        if let Some(url) = api_url {
            config = config.with_base_url(url);
        }
        debug!(base_url = %config.base_url, "building service graph");

        let bearer = BearerSlot::new();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let monitor = Arc::new(ActivityMonitor::new(
            Arc::clone(&clock),
            ActivityConfig::default(),
        ));
        let api: Arc<dyn Api> = Arc::new(
            HttpApi::new(&config, bearer.clone())?
                .with_activity_sink(monitor.clone() as Arc<dyn ActivitySink>),
        );
        let store = Arc::new(FileSessionStore::new());
        let keepalive = Arc::new(SessionKeepAlive::new(
            Arc::clone(&api),
            store,
            Arc::clone(&monitor),
            bearer,
            Arc::clone(&clock),
            KeepAliveConfig::from_env(),
        ));
        let lease = Arc::new(LeaseClient::new(api, Arc::clone(&keepalive), clock));

        Ok(Self {
            keepalive,
            lease,
            monitor,
        })
    }
}
