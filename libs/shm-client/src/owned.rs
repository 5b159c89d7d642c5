//! The user's purchased services: tree reconstruction, status-driven
//! background refresh, stop/delete and connection artifacts.
//!
//! Two timers may be pending at once. The progress timer refetches at most
//! twice (1 s, then 3 s after the previous fetch settles) while something is
//! in PROGRESS. The unpaid timer refetches every 5 s for as long as anything
//! is NOT PAID. Both are re-armed after every applied fetch and aborted on
//! shutdown.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::ShmApi;
use crate::category::Category;
use crate::models::service::{any_with_status, build_forest, find_service};
use crate::models::{OwnedService, ServiceStatus};
use crate::notify::Notifier;
use crate::ordering::OrderListener;

pub const PROGRESS_DELAYS: [Duration; 2] = [Duration::from_secs(1), Duration::from_secs(3)];
pub const UNPAID_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionArtifact {
    /// Raw client config (WireGuard/AmneziaWG).
    VpnConfig(String),
    /// Proxy subscription link.
    Subscription(String),
}

impl ConnectionArtifact {
    pub fn as_str(&self) -> &str {
        match self {
            ConnectionArtifact::VpnConfig(config) => config,
            ConnectionArtifact::Subscription(url) => url,
        }
    }
}

pub fn config_file_name(user_service_id: u64) -> String {
    format!("vpn{}.conf", user_service_id)
}

#[derive(Default)]
struct State {
    services: Vec<OwnedService>,
    loading: bool,
    issued: u64,
    applied: u64,
    progress_attempts: usize,
    progress_timer: Option<JoinHandle<()>>,
    unpaid_timer: Option<JoinHandle<()>>,
    closed: bool,
}

struct Inner {
    api: Arc<dyn ShmApi>,
    notifier: Notifier,
    state: Mutex<State>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn fetch(self: Arc<Self>, background: bool) -> Vec<OwnedService> {
        let seq = {
            let mut state = self.lock();
            if state.closed {
                return state.services.clone();
            }
            state.issued += 1;
            if !background {
                state.loading = true;
            }
            state.issued
        };

        let result = self.api.owned_services().await;

        let mut state = self.lock();
        if !background {
            state.loading = false;
        }
        if seq < state.applied {
            debug!("Discarding stale services response #{} (have #{})", seq, state.applied);
            return state.services.clone();
        }

        let fetched = match result {
            Ok(services) => {
                state.applied = seq;
                state.services = build_forest(services);
                state.services.clone()
            }
            Err(e) => {
                warn!("Failed to fetch services: {}", e);
                if !background {
                    self.notifier.error("Failed to load services");
                }
                state.services.clone()
            }
        };

        self.reschedule(&mut state);
        fetched
    }

    fn reschedule(self: &Arc<Self>, state: &mut State) {
        if state.closed {
            return;
        }

        if let Some(timer) = state.progress_timer.take() {
            timer.abort();
        }
        if any_with_status(&state.services, &ServiceStatus::Progress) {
            if let Some(&delay) = PROGRESS_DELAYS.get(state.progress_attempts) {
                let inner = Arc::clone(self);
                state.progress_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    {
                        let mut state = inner.lock();
                        state.progress_timer = None;
                        state.progress_attempts += 1;
                    }
                    inner.fetch(true).await;
                }));
            }
        } else {
            state.progress_attempts = 0;
        }

        if let Some(timer) = state.unpaid_timer.take() {
            timer.abort();
        }
        if any_with_status(&state.services, &ServiceStatus::NotPaid) {
            let inner = Arc::clone(self);
            state.unpaid_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(UNPAID_INTERVAL).await;
                inner.lock().unpaid_timer = None;
                inner.fetch(true).await;
            }));
        }
    }

    async fn refresh(self: Arc<Self>) -> Vec<OwnedService> {
        self.lock().progress_attempts = 0;
        self.fetch(false).await
    }

    fn shutdown(&self) {
        let mut state = self.lock();
        state.closed = true;
        for timer in [state.progress_timer.take(), state.unpaid_timer.take()]
            .into_iter()
            .flatten()
        {
            timer.abort();
        }
    }
}

pub struct OwnedServicesWorkflow {
    inner: Arc<Inner>,
}

impl OwnedServicesWorkflow {
    pub fn new(api: Arc<dyn ShmApi>, notifier: Notifier) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                notifier,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// `background` fetches leave the loading flag alone.
    pub async fn fetch(&self, background: bool) -> Vec<OwnedService> {
        Arc::clone(&self.inner).fetch(background).await
    }

    /// User-initiated refresh; also resets the progress retry budget.
    pub async fn refresh(&self) -> Vec<OwnedService> {
        Arc::clone(&self.inner).refresh().await
    }

    /// A handle other workflows can use to trigger a refresh without owning
    /// this one.
    pub fn refresh_handle(&self) -> RefreshHandle {
        RefreshHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn services(&self) -> Vec<OwnedService> {
        self.inner.lock().services.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().loading
    }

    pub fn progress_attempts(&self) -> usize {
        self.inner.lock().progress_attempts
    }

    pub fn timers_pending(&self) -> (bool, bool) {
        let state = self.inner.lock();
        (state.progress_timer.is_some(), state.unpaid_timer.is_some())
    }

    pub fn find(&self, user_service_id: u64) -> Option<OwnedService> {
        find_service(&self.inner.lock().services, user_service_id).cloned()
    }

    /// Root services bucketed by category.
    pub fn grouped(&self) -> BTreeMap<Category, Vec<OwnedService>> {
        let mut groups: BTreeMap<Category, Vec<OwnedService>> = BTreeMap::new();
        for service in self.inner.lock().services.iter() {
            groups.entry(service.category()).or_default().push(service.clone());
        }
        groups
    }

    pub async fn stop(&self, user_service_id: u64) -> bool {
        let Some(service) = self.find(user_service_id) else {
            self.inner.notifier.error("Service not found");
            return false;
        };
        if !service.status.can_stop() {
            self.inner
                .notifier
                .error(format!("Service in status {} cannot be stopped", service.status));
            return false;
        }

        match self.inner.api.stop_service(user_service_id).await {
            Ok(()) => {
                info!("Stopped service {}", user_service_id);
                self.inner.notifier.success("Service stopped");
                self.refresh().await;
                true
            }
            Err(e) => {
                warn!("Failed to stop service {}: {}", user_service_id, e);
                self.inner.notifier.error("Failed to stop service");
                false
            }
        }
    }

    pub async fn delete(&self, user_service_id: u64) -> bool {
        let Some(service) = self.find(user_service_id) else {
            self.inner.notifier.error("Service not found");
            return false;
        };
        if !service.status.can_delete() {
            self.inner
                .notifier
                .error(format!("Service in status {} cannot be deleted", service.status));
            return false;
        }

        match self.inner.api.delete_service(user_service_id).await {
            Ok(()) => {
                info!("Deleted service {}", user_service_id);
                self.inner.notifier.success("Service deleted");
                self.refresh().await;
                true
            }
            Err(e) => {
                warn!("Failed to delete service {}: {}", user_service_id, e);
                self.inner.notifier.error("Failed to delete service");
                false
            }
        }
    }

    /// Best effort: any failure yields `None` without a notice.
    pub async fn connection(&self, service: &OwnedService) -> Option<ConnectionArtifact> {
        let id = service.user_service_id;
        match service.category() {
            Category::Vpn => match self.inner.api.storage_text(&format!("vpn{}", id)).await {
                Ok(config) if !config.trim().is_empty() => Some(ConnectionArtifact::VpnConfig(config)),
                Ok(_) => None,
                Err(e) => {
                    debug!("No VPN config for service {}: {}", id, e);
                    None
                }
            },
            Category::Proxy => {
                for key in [format!("vpn_mrzb_{}", id), format!("vpn_remna_{}", id)] {
                    match self.inner.api.storage_json(&key).await {
                        Ok(body) => {
                            return subscription_url(&body).map(ConnectionArtifact::Subscription);
                        }
                        Err(e) => debug!("No subscription under {}: {}", key, e),
                    }
                }
                None
            }
            _ => None,
        }
    }

    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl Drop for OwnedServicesWorkflow {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

fn subscription_url(body: &Value) -> Option<String> {
    body.get("subscription_url")
        .or_else(|| body.pointer("/response/subscriptionUrl"))
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

/// Weak refresh trigger; does nothing once the workflow is gone.
#[derive(Clone)]
pub struct RefreshHandle {
    inner: Weak<Inner>,
}

impl RefreshHandle {
    pub async fn refresh(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.refresh().await;
        }
    }
}

#[async_trait]
impl OrderListener for RefreshHandle {
    async fn on_ordered(&self) {
        self.refresh().await;
    }
}
