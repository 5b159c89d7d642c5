//! Telegram Login Widget bridge.
//!
//! The widget calls back a globally named function exactly once. Here that
//! callback is a named entry in the bridge: `dispatch` forwards the signed
//! assertion as a typed event, and dropping the registration removes the name
//! so late invocations land nowhere.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::Result;

pub const WIDGET_SCRIPT_URL: &str = "https://telegram.org/js/telegram-widget.js?22";

/// User assertion signed by Telegram. Unknown fields are kept so the payload
/// is forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetAssertion {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub auth_date: i64,
    pub hash: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WidgetAssertion {
    /// Body for `/telegram/web/auth`: the assertion plus the registration
    /// fallback flag and the pending partner id.
    pub fn to_auth_request(&self, partner_id: Option<&str>) -> Result<Value> {
        let mut body = serde_json::to_value(self)?;
        if let Value::Object(fields) = &mut body {
            fields.insert("register_if_not_exists".into(), Value::from(1));
            if let Some(partner_id) = partner_id {
                fields.insert("partner_id".into(), Value::from(partner_id));
            }
        }
        Ok(body)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WidgetEvent {
    Authorized(WidgetAssertion),
}

type Callbacks = HashMap<String, mpsc::Sender<WidgetEvent>>;

#[derive(Debug, Clone, Default)]
pub struct WidgetBridge {
    callbacks: Arc<Mutex<Callbacks>>,
}

impl WidgetBridge {
    pub fn new() -> Self {
        Self::default()
    }

    fn callbacks(&self) -> MutexGuard<'_, Callbacks> {
        self.callbacks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self) -> (WidgetRegistration, mpsc::Receiver<WidgetEvent>) {
        let name = format!("TelegramLoginWidget_{}", Uuid::new_v4().simple());
        let (tx, rx) = mpsc::channel(1);
        self.callbacks().insert(name.clone(), tx);
        debug!("Registered widget callback {}", name);

        let registration = WidgetRegistration {
            name,
            bridge: self.clone(),
        };
        (registration, rx)
    }

    /// Delivers the callback's single invocation. Returns false when the name
    /// is unknown, already used or torn down.
    pub fn dispatch(&self, name: &str, assertion: WidgetAssertion) -> bool {
        let Some(tx) = self.callbacks().remove(name) else {
            warn!("Widget callback {} is not registered", name);
            return false;
        };
        tx.try_send(WidgetEvent::Authorized(assertion)).is_ok()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.callbacks().contains_key(name)
    }
}

/// Scoped registration; the callback name is released on drop.
#[derive(Debug)]
pub struct WidgetRegistration {
    name: String,
    bridge: WidgetBridge,
}

impl WidgetRegistration {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<script>` tag that renders the login button and calls back into this
    /// registration.
    pub fn script_tag(&self, bot_name: &str) -> String {
        format!(
            concat!(
                r#"<script async src="{src}" data-telegram-login="{bot}" "#,
                r#"data-size="large" data-radius="8" data-onauth="{name}(user)" "#,
                r#"data-userpic="true" data-request-access="write"></script>"#
            ),
            src = WIDGET_SCRIPT_URL,
            bot = bot_name,
            name = self.name,
        )
    }
}

impl Drop for WidgetRegistration {
    fn drop(&mut self) {
        self.bridge.callbacks().remove(&self.name);
    }
}
