use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde_json::{Value, json};
use urlencoding::encode;

use crate::gateway::{CallKind, Gateway};
use crate::models::{
    Forecast, OrderableService, OwnedService, PaySystem, Payment, ProfileUpdate, Promo, User,
};
use crate::widget::WidgetAssertion;
use crate::{Result, ShmError};

/// Every backend operation the portal uses. Workflows depend on this trait,
/// never on the HTTP gateway directly.
#[async_trait]
pub trait ShmApi: Send + Sync {
    async fn current_user(&self) -> Result<User>;

    /// Returns the issued session id.
    async fn login(&self, login: &str, password: &str) -> Result<String>;

    async fn register(&self, login: &str, password: &str, partner_id: Option<&str>) -> Result<()>;

    /// Returns the session id when the backend issues one in the body.
    async fn telegram_webapp_auth(&self, init_data: &str, profile: &str) -> Result<Option<String>>;

    async fn telegram_widget_auth(
        &self,
        assertion: &WidgetAssertion,
        partner_id: Option<&str>,
    ) -> Result<Option<String>>;

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<User>;

    async fn change_password(&self, password: &str) -> Result<()>;

    async fn owned_services(&self) -> Result<Vec<OwnedService>>;

    async fn stop_service(&self, user_service_id: u64) -> Result<()>;

    async fn delete_service(&self, user_service_id: u64) -> Result<()>;

    async fn payments(&self) -> Result<Vec<Payment>>;

    async fn pay_systems(&self) -> Result<Vec<PaySystem>>;

    async fn forecast(&self) -> Result<Forecast>;

    async fn delete_autopayment(&self, pay_system: &str) -> Result<()>;

    async fn orderable_services(&self) -> Result<Vec<OrderableService>>;

    async fn order_service(&self, service_id: u64) -> Result<()>;

    /// Raw storage blob, e.g. a WireGuard config.
    async fn storage_text(&self, name: &str) -> Result<String>;

    /// Storage blob requested as JSON.
    async fn storage_json(&self, name: &str) -> Result<Value>;

    async fn apply_promo(&self, code: &str) -> Result<Value>;

    async fn promos(&self) -> Result<Vec<Promo>>;
}

const LOGIN_KEYS: &[&str] = &["session_id", "id"];
const TELEGRAM_KEYS: &[&str] = &["session_id"];

/// First of `keys` found at the top level or inside a `data` envelope.
fn session_id(body: &Value, keys: &[&str]) -> Option<String> {
    let lookup = |v: &Value| {
        keys.iter().find_map(|key| match v.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    };
    lookup(body).or_else(|| {
        body.get("data")
            .and_then(|data| match data {
                Value::Array(items) => items.first(),
                other => Some(other),
            })
            .and_then(lookup)
    })
}

#[derive(Serialize)]
struct Credentials<'a> {
    login: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct Registration<'a> {
    login: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    partner_id: Option<&'a str>,
}

#[async_trait]
impl ShmApi for Gateway {
    async fn current_user(&self) -> Result<User> {
        self.one("/user").await
    }

    async fn login(&self, login: &str, password: &str) -> Result<String> {
        let body: Value = self
            .json(Method::POST, "/user/auth", Some(&Credentials { login, password }), CallKind::Auth)
            .await?;
        session_id(&body, LOGIN_KEYS).ok_or(ShmError::MissingSession)
    }

    async fn register(&self, login: &str, password: &str, partner_id: Option<&str>) -> Result<()> {
        let body = Registration {
            login,
            password,
            partner_id,
        };
        self.call(Method::PUT, "/user", Some(&body), CallKind::Auth).await
    }

    async fn telegram_webapp_auth(&self, init_data: &str, profile: &str) -> Result<Option<String>> {
        let body = json!({ "initData": init_data, "profile": profile });
        let response: Value = self
            .json(Method::POST, "/telegram/webapp/auth", Some(&body), CallKind::Auth)
            .await?;
        Ok(session_id(&response, TELEGRAM_KEYS))
    }

    async fn telegram_widget_auth(
        &self,
        assertion: &WidgetAssertion,
        partner_id: Option<&str>,
    ) -> Result<Option<String>> {
        let body = assertion.to_auth_request(partner_id)?;
        let response: Value = self
            .json(Method::POST, "/telegram/web/auth", Some(&body), CallKind::Auth)
            .await?;
        Ok(session_id(&response, TELEGRAM_KEYS))
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        let envelope: crate::envelope::Envelope<User> = self
            .json(Method::POST, "/user", Some(update), CallKind::Regular)
            .await?;
        envelope.into_one()
    }

    async fn change_password(&self, password: &str) -> Result<()> {
        let body = json!({ "password": password });
        self.call(Method::POST, "/user/passwd", Some(&body), CallKind::Regular)
            .await
    }

    async fn owned_services(&self) -> Result<Vec<OwnedService>> {
        self.many("/user/service").await
    }

    async fn stop_service(&self, user_service_id: u64) -> Result<()> {
        let body = json!({ "user_service_id": user_service_id });
        self.call(Method::POST, "/user/service/stop", Some(&body), CallKind::Regular)
            .await
    }

    async fn delete_service(&self, user_service_id: u64) -> Result<()> {
        let path = format!("/user/service?user_service_id={}", user_service_id);
        self.call::<()>(Method::DELETE, &path, None, CallKind::Regular)
            .await
    }

    async fn payments(&self) -> Result<Vec<Payment>> {
        self.many("/user/pay").await
    }

    async fn pay_systems(&self) -> Result<Vec<PaySystem>> {
        self.many("/user/pay/paysystems").await
    }

    async fn forecast(&self) -> Result<Forecast> {
        self.one("/user/pay/forecast").await
    }

    async fn delete_autopayment(&self, pay_system: &str) -> Result<()> {
        let path = format!("/user/autopayment?pay_system={}", encode(pay_system));
        self.call::<()>(Method::DELETE, &path, None, CallKind::Regular)
            .await
    }

    async fn orderable_services(&self) -> Result<Vec<OrderableService>> {
        self.many("/service/order").await
    }

    async fn order_service(&self, service_id: u64) -> Result<()> {
        let body = json!({ "service_id": service_id });
        self.call(Method::PUT, "/service/order", Some(&body), CallKind::Regular)
            .await
    }

    async fn storage_text(&self, name: &str) -> Result<String> {
        self.text(&format!("/storage/manage/{}", encode(name))).await
    }

    async fn storage_json(&self, name: &str) -> Result<Value> {
        let path = format!("/storage/manage/{}?format=json", encode(name));
        self.json::<Value, ()>(Method::GET, &path, None, CallKind::Regular)
            .await
    }

    async fn apply_promo(&self, code: &str) -> Result<Value> {
        let path = format!("/promo/apply/{}", encode(code));
        self.json::<Value, ()>(Method::GET, &path, None, CallKind::Regular)
            .await
    }

    async fn promos(&self) -> Result<Vec<Promo>> {
        self.many("/promo").await
    }
}
