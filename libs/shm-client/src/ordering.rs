//! Catalog browsing, top-up computation and order placement.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

use crate::api::ShmApi;
use crate::category::Category;
use crate::models::{OrderableService, PaySystem};
use crate::notify::Notifier;

/// Representation error of the `f64` subtraction, in minor units. Anything
/// below this is not a real fraction of a cent.
const CENT_EPSILON: f64 = 1e-6;

/// Amount to pay so that `balance` covers `cost`, rounded up to the next
/// minor unit.
pub fn required_top_up(cost: f64, balance: f64) -> f64 {
    let cents = ((cost - balance) * 100.0 - CENT_EPSILON).ceil();
    if cents > 0.0 { cents / 100.0 } else { 0.0 }
}

/// Opens an external page, e.g. a payment form, outside the portal.
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str);
}

/// Invoked after a successful order so owned services can be refetched.
#[async_trait]
pub trait OrderListener: Send + Sync {
    async fn on_ordered(&self);
}

#[derive(Debug, Clone, Default)]
pub struct OrderingState {
    pub catalog: Vec<OrderableService>,
    pub loading: bool,
    pub balance: f64,
    pub selected: Option<OrderableService>,
    pub pay_systems: Vec<PaySystem>,
    pub pay_systems_loaded: bool,
    pay_systems_loading: bool,
    pub selected_pay_system: Option<String>,
    pub pay_amount: f64,
}

impl OrderingState {
    pub fn min_top_up(&self) -> f64 {
        self.selected
            .as_ref()
            .map(|s| required_top_up(s.cost, self.balance))
            .unwrap_or(0.0)
    }

    pub fn needs_top_up(&self) -> bool {
        self.selected.as_ref().is_some_and(|s| self.balance < s.cost)
    }
}

pub struct OrderingWorkflow {
    api: Arc<dyn ShmApi>,
    notifier: Notifier,
    opener: Arc<dyn UrlOpener>,
    listener: Option<Arc<dyn OrderListener>>,
    state: Mutex<OrderingState>,
}

impl OrderingWorkflow {
    pub fn new(api: Arc<dyn ShmApi>, notifier: Notifier, opener: Arc<dyn UrlOpener>) -> Self {
        Self {
            api,
            notifier,
            opener,
            listener: None,
            state: Mutex::new(OrderingState::default()),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn OrderListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    fn lock(&self) -> MutexGuard<'_, OrderingState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> OrderingState {
        self.lock().clone()
    }

    pub fn set_balance(&self, balance: f64) {
        let mut state = self.lock();
        state.balance = balance;
        if let Some(cost) = state.selected.as_ref().map(|s| s.cost) {
            state.pay_amount = required_top_up(cost, balance);
        }
    }

    /// Loads the catalog and the current balance. A failed catalog load
    /// leaves the list empty.
    pub async fn list_orderable(&self) -> Vec<OrderableService> {
        self.lock().loading = true;

        let catalog = match self.api.orderable_services().await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!("Failed to load catalog: {}", e);
                self.notifier.error("Failed to load available services");
                Vec::new()
            }
        };

        match self.api.current_user().await {
            Ok(user) => self.set_balance(user.balance),
            Err(e) => warn!("Failed to load balance: {}", e),
        }

        let mut state = self.lock();
        state.catalog = catalog.clone();
        state.loading = false;
        catalog
    }

    /// Catalog bucketed by category, cheapest first.
    pub fn grouped(&self) -> BTreeMap<Category, Vec<OrderableService>> {
        group_by_category(&self.lock().catalog)
    }

    pub fn find(&self, service_id: u64) -> Option<OrderableService> {
        self.lock()
            .catalog
            .iter()
            .find(|s| s.service_id == service_id)
            .cloned()
    }

    pub async fn select_service(&self, service: OrderableService) {
        let needs_pay_systems = {
            let mut state = self.lock();
            state.pay_amount = required_top_up(service.cost, state.balance);
            let short = state.balance < service.cost;
            state.selected = Some(service);
            short
        };

        if needs_pay_systems {
            self.load_pay_systems().await;
        }
    }

    pub fn clear_selection(&self) {
        self.lock().selected = None;
    }

    /// Loads payment systems at most once and preselects the first.
    pub async fn load_pay_systems(&self) {
        {
            let mut state = self.lock();
            if state.pay_systems_loaded || state.pay_systems_loading {
                return;
            }
            state.pay_systems_loading = true;
        }

        let result = self.api.pay_systems().await;

        let mut state = self.lock();
        state.pay_systems_loading = false;
        match result {
            Ok(systems) => {
                state.selected_pay_system = systems.first().map(|ps| ps.name.clone());
                state.pay_systems = systems;
                state.pay_systems_loaded = true;
            }
            Err(e) => {
                warn!("Failed to load payment systems: {}", e);
                self.notifier.error("Failed to load payment systems");
            }
        }
    }

    pub fn select_pay_system(&self, name: &str) -> bool {
        let mut state = self.lock();
        if state.pay_systems.iter().any(|ps| ps.name == name) {
            state.selected_pay_system = Some(name.to_string());
            true
        } else {
            false
        }
    }

    /// Sets the amount to pay, never below the required top-up.
    pub fn set_pay_amount(&self, amount: f64) -> f64 {
        let mut state = self.lock();
        let floor = state.min_top_up();
        state.pay_amount = if amount.is_finite() && amount > floor { amount } else { floor };
        state.pay_amount
    }

    pub async fn order(&self) -> bool {
        let Some(service) = self.lock().selected.clone() else {
            return false;
        };

        match self.api.order_service(service.service_id).await {
            Ok(()) => {
                info!("Ordered service {} ({})", service.service_id, service.name);
                self.notifier.success(format!("Service \"{}\" ordered", service.name));
                self.finish_order().await;
                true
            }
            Err(e) => {
                warn!("Order of {} failed: {}", service.service_id, e);
                self.notifier.error("Failed to order service");
                false
            }
        }
    }

    /// Places the order and sends the user to the payment page for the
    /// chosen amount.
    pub async fn order_and_pay(&self) -> bool {
        let (service, pay_system, amount) = {
            let state = self.lock();
            let Some(service) = state.selected.clone() else {
                return false;
            };
            let pay_system = state
                .selected_pay_system
                .as_deref()
                .and_then(|name| state.pay_systems.iter().find(|ps| ps.name == name))
                .cloned();
            (service, pay_system, state.pay_amount)
        };

        let Some(pay_system) = pay_system else {
            self.notifier.error("Select a payment system");
            return false;
        };

        match self.api.order_service(service.service_id).await {
            Ok(()) => {
                let url = pay_system.payment_url(amount);
                info!("Ordered service {}, opening payment via {}", service.service_id, pay_system.name);
                self.opener.open(&url);
                self.notifier.success(format!(
                    "Service \"{}\" ordered. Complete the payment to activate it",
                    service.name
                ));
                self.finish_order().await;
                true
            }
            Err(e) => {
                warn!("Order of {} failed: {}", service.service_id, e);
                self.notifier.error("Failed to order service");
                false
            }
        }
    }

    async fn finish_order(&self) {
        if let Some(listener) = &self.listener {
            listener.on_ordered().await;
        }
        self.clear_selection();
    }
}

pub fn group_by_category(services: &[OrderableService]) -> BTreeMap<Category, Vec<OrderableService>> {
    let mut groups: BTreeMap<Category, Vec<OrderableService>> = BTreeMap::new();
    for service in services {
        groups.entry(service.category()).or_default().push(service.clone());
    }
    for bucket in groups.values_mut() {
        bucket.sort_by(|a, b| a.cost.total_cmp(&b.cost));
    }
    groups
}
