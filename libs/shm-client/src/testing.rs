//! Fixtures and an in-memory `ShmApi` for workflow tests.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::api::ShmApi;
use crate::models::{
    Forecast, OrderableService, OwnedService, PaySystem, Payment, ProfileUpdate, Promo,
    ServiceInfo, ServiceStatus, User,
};
use crate::widget::WidgetAssertion;
use crate::{Result, ShmError};

pub fn user(balance: f64) -> User {
    User {
        user_id: 1,
        login: "alice".into(),
        gid: None,
        full_name: None,
        phone: None,
        balance,
        bonus: None,
        credit: None,
        discount: None,
    }
}

pub fn owned(id: u64, parent: Option<u64>, status: ServiceStatus) -> OwnedService {
    OwnedService {
        user_service_id: id,
        service_id: 100 + id,
        name: None,
        service: ServiceInfo {
            category: "vpn".into(),
            cost: 100.0,
            name: format!("Service {}", id),
        },
        status,
        expire: None,
        created: Some("2026-01-01 00:00:00".into()),
        parent,
        settings: None,
        children: Vec::new(),
    }
}

pub fn orderable(id: u64, category: &str, cost: f64) -> OrderableService {
    OrderableService {
        service_id: id,
        name: format!("Plan {}", id),
        category: category.into(),
        cost,
        period: 1.0,
        descr: None,
    }
}

pub fn pay_system(name: &str) -> PaySystem {
    PaySystem {
        name: name.into(),
        shm_url: format!("https://pay.example.com/{}?amount=", name),
        title: None,
        recurring: None,
    }
}

fn failure() -> ShmError {
    ShmError::Status {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: "boom".into(),
    }
}

fn guard<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap()
}

#[derive(Default)]
pub struct FakeApi {
    pub user: Mutex<Option<User>>,
    pub login_session: Mutex<Option<String>>,
    pub telegram_session: Mutex<Option<String>>,
    pub fail_telegram: AtomicBool,
    pub fail_register: AtomicBool,
    pub services: Mutex<Vec<OwnedService>>,
    pub queued_services: Mutex<VecDeque<(Duration, Vec<OwnedService>)>>,
    pub fail_services: AtomicBool,
    pub fail_mutations: AtomicBool,
    pub catalog: Mutex<Vec<OrderableService>>,
    pub fail_catalog: AtomicBool,
    pub pay_systems: Mutex<Vec<PaySystem>>,
    pub fail_pay_systems: AtomicBool,
    pub storage_text: Mutex<HashMap<String, String>>,
    pub storage_json: Mutex<HashMap<String, Value>>,
    pub calls: Mutex<Vec<String>>,
    pub service_fetches: Mutex<Vec<Instant>>,
    pub registrations: Mutex<Vec<(String, Option<String>)>>,
    pub widget_partners: Mutex<Vec<Option<String>>>,
    pub ordered: Mutex<Vec<u64>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_services(&self, services: Vec<OwnedService>) {
        *guard(&self.services) = services;
    }

    pub fn calls_to(&self, name: &str) -> usize {
        guard(&self.calls).iter().filter(|c| *c == name).count()
    }

    pub fn fetch_times(&self) -> Vec<Instant> {
        guard(&self.service_fetches).clone()
    }

    fn record(&self, name: &str) {
        guard(&self.calls).push(name.to_string());
    }

    fn mutation(&self, name: &str) -> Result<()> {
        self.record(name);
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(failure());
        }
        Ok(())
    }
}

#[async_trait]
impl ShmApi for FakeApi {
    async fn current_user(&self) -> Result<User> {
        self.record("current_user");
        guard(&self.user).clone().ok_or(ShmError::Unauthorized)
    }

    async fn login(&self, _login: &str, _password: &str) -> Result<String> {
        self.record("login");
        guard(&self.login_session).clone().ok_or(ShmError::Unauthorized)
    }

    async fn register(&self, login: &str, _password: &str, partner_id: Option<&str>) -> Result<()> {
        self.record("register");
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(failure());
        }
        guard(&self.registrations).push((login.to_string(), partner_id.map(str::to_string)));
        Ok(())
    }

    async fn telegram_webapp_auth(&self, _init_data: &str, _profile: &str) -> Result<Option<String>> {
        self.record("telegram_webapp_auth");
        if self.fail_telegram.load(Ordering::SeqCst) {
            return Err(ShmError::Unauthorized);
        }
        Ok(guard(&self.telegram_session).clone())
    }

    async fn telegram_widget_auth(
        &self,
        _assertion: &WidgetAssertion,
        partner_id: Option<&str>,
    ) -> Result<Option<String>> {
        self.record("telegram_widget_auth");
        if self.fail_telegram.load(Ordering::SeqCst) {
            return Err(ShmError::Unauthorized);
        }
        guard(&self.widget_partners).push(partner_id.map(str::to_string));
        Ok(guard(&self.telegram_session).clone())
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        self.mutation("update_profile")?;
        let mut user = guard(&self.user).clone().ok_or(ShmError::Unauthorized)?;
        if let Some(name) = &update.full_name {
            user.full_name = Some(name.clone());
        }
        if let Some(phone) = &update.phone {
            user.phone = Some(phone.clone());
        }
        *guard(&self.user) = Some(user.clone());
        Ok(user)
    }

    async fn change_password(&self, _password: &str) -> Result<()> {
        self.mutation("change_password")
    }

    async fn owned_services(&self) -> Result<Vec<OwnedService>> {
        self.record("owned_services");
        guard(&self.service_fetches).push(Instant::now());
        let queued = guard(&self.queued_services).pop_front();
        if let Some((delay, services)) = queued {
            tokio::time::sleep(delay).await;
            return Ok(services);
        }
        if self.fail_services.load(Ordering::SeqCst) {
            return Err(failure());
        }
        Ok(guard(&self.services).clone())
    }

    async fn stop_service(&self, _user_service_id: u64) -> Result<()> {
        self.mutation("stop_service")
    }

    async fn delete_service(&self, _user_service_id: u64) -> Result<()> {
        self.mutation("delete_service")
    }

    async fn payments(&self) -> Result<Vec<Payment>> {
        self.record("payments");
        Err(failure())
    }

    async fn pay_systems(&self) -> Result<Vec<PaySystem>> {
        self.record("pay_systems");
        if self.fail_pay_systems.load(Ordering::SeqCst) {
            return Err(failure());
        }
        Ok(guard(&self.pay_systems).clone())
    }

    async fn forecast(&self) -> Result<Forecast> {
        self.record("forecast");
        Ok(Forecast::default())
    }

    async fn delete_autopayment(&self, _pay_system: &str) -> Result<()> {
        self.mutation("delete_autopayment")
    }

    async fn orderable_services(&self) -> Result<Vec<OrderableService>> {
        self.record("orderable_services");
        if self.fail_catalog.load(Ordering::SeqCst) {
            return Err(failure());
        }
        Ok(guard(&self.catalog).clone())
    }

    async fn order_service(&self, service_id: u64) -> Result<()> {
        self.mutation("order_service")?;
        guard(&self.ordered).push(service_id);
        Ok(())
    }

    async fn storage_text(&self, name: &str) -> Result<String> {
        self.record(&format!("storage:{}", name));
        guard(&self.storage_text).get(name).cloned().ok_or_else(failure)
    }

    async fn storage_json(&self, name: &str) -> Result<Value> {
        self.record(&format!("storage:{}", name));
        guard(&self.storage_json).get(name).cloned().ok_or_else(failure)
    }

    async fn apply_promo(&self, code: &str) -> Result<Value> {
        self.mutation("apply_promo")?;
        Ok(serde_json::json!({ "code": code }))
    }

    async fn promos(&self) -> Result<Vec<Promo>> {
        self.record("promos");
        Ok(Vec::new())
    }
}
