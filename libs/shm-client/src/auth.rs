//! Login, registration and the two Telegram sign-in paths.
//!
//! Every path ends in the same place: store the session, fetch the current
//! user, flip the state. Failures leave the workflow unauthenticated with a
//! single notice; nothing propagates past this module.

use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};
use url::form_urlencoded;

use crate::api::ShmApi;
use crate::models::User;
use crate::notify::Notifier;
use crate::partner::PartnerAttribution;
use crate::session::SessionStore;
use crate::state::AppStore;
use crate::widget::WidgetAssertion;
use crate::{Result, ShmError};

#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated(User),
}

/// Host-provided context of an embedded Telegram Mini App.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostContext {
    pub init_data: String,
    pub photo_url: Option<String>,
}

impl HostContext {
    /// Parses the URL-encoded init payload; the photo comes from its `user`
    /// JSON field. Blank payloads mean "not embedded".
    pub fn from_init_data(init_data: &str) -> Option<Self> {
        let init_data = init_data.trim();
        if init_data.is_empty() {
            return None;
        }

        #[derive(Deserialize)]
        struct HostUser {
            photo_url: Option<String>,
        }

        let photo_url = form_urlencoded::parse(init_data.as_bytes())
            .find(|(key, _)| key == "user")
            .and_then(|(_, user)| serde_json::from_str::<HostUser>(&user).ok())
            .and_then(|user| user.photo_url);

        Some(Self {
            init_data: init_data.to_string(),
            photo_url,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct TelegramSettings {
    pub bot_name: Option<String>,
    pub bot_auth_enable: bool,
    pub webapp_auth_enable: bool,
    pub profile: String,
}

impl TelegramSettings {
    pub fn embedded_auth_allowed(&self, host: Option<&HostContext>) -> bool {
        host.is_some() && self.webapp_auth_enable
    }

    pub fn widget_allowed(&self, host: Option<&HostContext>) -> bool {
        host.is_none()
            && self.bot_auth_enable
            && self.bot_name.as_deref().is_some_and(|n| !n.trim().is_empty())
    }
}

const INVALID_CREDENTIALS: &str = "Invalid login or password";
const TELEGRAM_FAILED: &str = "Telegram sign-in failed";

pub struct AuthWorkflow {
    api: Arc<dyn ShmApi>,
    session: SessionStore,
    partner: PartnerAttribution,
    store: AppStore,
    notifier: Notifier,
    state: Mutex<AuthState>,
    embedded_attempted: AtomicBool,
}

impl AuthWorkflow {
    pub fn new(
        api: Arc<dyn ShmApi>,
        session: SessionStore,
        partner: PartnerAttribution,
        store: AppStore,
        notifier: Notifier,
    ) -> Self {
        Self {
            api,
            session,
            partner,
            store,
            notifier,
            state: Mutex::new(AuthState::Unauthenticated),
            embedded_attempted: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> AuthState {
        self.lock().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(*self.lock(), AuthState::Authenticated(_))
    }

    fn transition(&self, next: AuthState) {
        let user = match &next {
            AuthState::Authenticated(user) => Some(user.clone()),
            _ => None,
        };
        *self.lock() = next;
        self.store.set_user(user);
    }

    /// Shared tail of every sign-in path.
    async fn complete(&self, session_id: Option<String>, photo_url: Option<&str>) -> Result<User> {
        if let Some(session_id) = &session_id {
            self.session.set(session_id);
        }
        let user = match self.api.current_user().await {
            Ok(user) => user,
            Err(e) => {
                // A session nobody could read a user with is not kept.
                if session_id.is_some() {
                    self.session.clear();
                }
                return Err(e);
            }
        };
        if let Some(photo) = photo_url {
            self.store.set_telegram_photo(Some(photo.to_string()));
        }
        self.transition(AuthState::Authenticated(user.clone()));
        Ok(user)
    }

    fn fail(&self, message: &str, error: &ShmError) {
        warn!("Authentication failed: {}", error);
        self.transition(AuthState::Unauthenticated);
        self.notifier.error(message);
    }

    pub async fn login(&self, login: &str, password: &str) -> bool {
        if login.trim().is_empty() || password.is_empty() {
            self.notifier.error("Fill in all fields");
            return false;
        }

        self.transition(AuthState::Authenticating);
        let result = async {
            let session_id = self.api.login(login, password).await?;
            self.complete(Some(session_id), None).await
        }
        .await;

        match result {
            Ok(user) => {
                info!("Logged in as {}", user.login);
                self.notifier.success("Signed in");
                true
            }
            Err(e) => {
                self.fail(INVALID_CREDENTIALS, &e);
                false
            }
        }
    }

    /// Registration does not sign in; on success the caller goes back to the
    /// login form with the same login.
    pub async fn register(&self, login: &str, password: &str, confirmation: &str) -> bool {
        if login.trim().is_empty() || password.is_empty() || confirmation.is_empty() {
            self.notifier.error("Fill in all fields");
            return false;
        }
        if password != confirmation {
            self.notifier.error("Passwords do not match");
            return false;
        }

        let partner_id = self.partner.read();
        match self.api.register(login, password, partner_id.as_deref()).await {
            Ok(()) => {
                if partner_id.is_some() {
                    self.partner.clear();
                }
                info!("Registered {}", login);
                self.transition(AuthState::Unauthenticated);
                self.notifier.success("Registration complete. Please sign in.");
                true
            }
            Err(e) => {
                self.fail("Registration failed", &e);
                false
            }
        }
    }

    /// One-shot sign-in from the embedded host context. Later calls are no-ops.
    pub async fn auto_auth_embedded(&self, host: &HostContext, settings: &TelegramSettings) -> bool {
        if !settings.embedded_auth_allowed(Some(host)) {
            return false;
        }
        if self.embedded_attempted.swap(true, Ordering::SeqCst) {
            return self.is_authenticated();
        }

        self.transition(AuthState::Authenticating);
        let result = async {
            let session_id = self
                .api
                .telegram_webapp_auth(&host.init_data, &settings.profile)
                .await?;
            self.complete(session_id, host.photo_url.as_deref()).await
        }
        .await;

        match result {
            Ok(user) => {
                info!("Signed in {} from the embedded context", user.login);
                self.notifier.success("Signed in with Telegram");
                true
            }
            Err(e) => {
                self.fail(TELEGRAM_FAILED, &e);
                false
            }
        }
    }

    /// Handles the widget callback's assertion.
    pub async fn widget_auth(&self, assertion: &WidgetAssertion) -> bool {
        self.transition(AuthState::Authenticating);
        let partner_id = self.partner.read();

        let result = async {
            let session_id = self
                .api
                .telegram_widget_auth(assertion, partner_id.as_deref())
                .await?;
            if partner_id.is_some() {
                self.partner.clear();
            }
            self.complete(session_id, assertion.photo_url.as_deref()).await
        }
        .await;

        match result {
            Ok(user) => {
                info!("Signed in {} with the login widget", user.login);
                self.notifier.success("Signed in with Telegram");
                true
            }
            Err(e) => {
                self.fail(TELEGRAM_FAILED, &e);
                false
            }
        }
    }

    /// Start-up check: a stored session is only trusted once `/user` answers.
    pub async fn restore(&self) -> bool {
        let restored = if self.session.is_present() {
            match self.api.current_user().await {
                Ok(user) => {
                    self.transition(AuthState::Authenticated(user));
                    true
                }
                Err(e) => {
                    warn!("Stored session rejected: {}", e);
                    self.session.clear();
                    self.transition(AuthState::Unauthenticated);
                    false
                }
            }
        } else {
            false
        };
        self.store.set_loading(false);
        restored
    }

    /// Re-reads the current user, replacing the snapshot wholesale.
    pub async fn refresh_user(&self) -> Option<User> {
        match self.api.current_user().await {
            Ok(user) => {
                self.transition(AuthState::Authenticated(user.clone()));
                Some(user)
            }
            Err(e) => {
                warn!("Failed to refresh user: {}", e);
                None
            }
        }
    }

    pub fn logout(&self) {
        self.session.clear();
        self.store.logout();
        *self.lock() = AuthState::Unauthenticated;
    }

    /// The gateway dropped the session after a 401.
    pub fn on_session_cleared(&self) {
        self.transition(AuthState::Unauthenticated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{Level, Notice, drain};
    use crate::store::MemoryStore;
    use crate::testing::{FakeApi, user};
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;
    use url::Url;

    struct Harness {
        api: Arc<FakeApi>,
        auth: AuthWorkflow,
        session: SessionStore,
        partner: PartnerAttribution,
        store: AppStore,
        notices: UnboundedReceiver<Notice>,
    }

    fn harness() -> Harness {
        let storage = Arc::new(MemoryStore::new());
        let api = Arc::new(FakeApi::new());
        let session = SessionStore::new(storage.clone());
        let partner = PartnerAttribution::new(storage.clone());
        let store = AppStore::new(storage);
        let (notifier, notices) = Notifier::channel();
        let auth = AuthWorkflow::new(
            api.clone(),
            session.clone(),
            partner.clone(),
            store.clone(),
            notifier,
        );
        Harness {
            api,
            auth,
            session,
            partner,
            store,
            notices,
        }
    }

    fn telegram() -> TelegramSettings {
        TelegramSettings {
            bot_name: Some("shm_bot".into()),
            bot_auth_enable: true,
            webapp_auth_enable: true,
            profile: "telegram_bot".into(),
        }
    }

    fn assertion() -> WidgetAssertion {
        serde_json::from_value(json!({
            "id": 42,
            "first_name": "Ann",
            "photo_url": "https://t.me/i/ann.jpg",
            "auth_date": 1700000000,
            "hash": "cafe"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn login_stores_session_and_user() {
        let mut h = harness();
        *h.api.login_session.lock().unwrap() = Some("sess-1".into());
        *h.api.user.lock().unwrap() = Some(user(50.0));

        assert!(h.auth.login("alice", "secret").await);

        assert_eq!(h.session.get().as_deref(), Some("sess-1"));
        assert_eq!(h.auth.state(), AuthState::Authenticated(user(50.0)));
        assert!(h.store.is_authenticated());
        assert_eq!(drain(&mut h.notices)[0].level, Level::Success);
    }

    #[tokio::test]
    async fn failed_login_is_generic_and_stays_unauthenticated() {
        let mut h = harness();

        assert!(!h.auth.login("alice", "wrong").await);

        assert_eq!(h.auth.state(), AuthState::Unauthenticated);
        let notices = drain(&mut h.notices);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].message, INVALID_CREDENTIALS);
    }

    #[tokio::test]
    async fn session_is_dropped_when_user_fetch_fails() {
        let mut h = harness();
        *h.api.login_session.lock().unwrap() = Some("sess-1".into());

        assert!(!h.auth.login("alice", "secret").await);

        assert_eq!(h.auth.state(), AuthState::Unauthenticated);
        assert_eq!(h.session.get(), None);
        assert_eq!(drain(&mut h.notices).len(), 1);
        assert!(!h.auth.restore().await);
        assert_eq!(h.api.calls_to("current_user"), 1);
    }

    #[tokio::test]
    async fn widget_session_is_dropped_when_user_fetch_fails() {
        let h = harness();
        *h.api.telegram_session.lock().unwrap() = Some("tg-1".into());

        assert!(!h.auth.widget_auth(&assertion()).await);

        assert_eq!(h.session.get(), None);
        assert_eq!(h.store.snapshot().telegram_photo, None);
    }

    #[tokio::test]
    async fn validation_rejects_without_network() {
        let mut h = harness();

        assert!(!h.auth.login("", "secret").await);
        assert!(!h.auth.register("bob", "one", "two").await);
        assert!(!h.auth.register("bob", "", "").await);

        assert!(h.api.calls.lock().unwrap().is_empty());
        assert_eq!(drain(&mut h.notices).len(), 3);
    }

    #[tokio::test]
    async fn registration_consumes_partner_once_and_does_not_sign_in() {
        let h = harness();
        h.partner
            .capture(&Url::parse("https://my.example.com/?partner_id=77").unwrap());

        assert!(h.auth.register("bob", "pw", "pw").await);
        assert!(h.auth.register("carol", "pw", "pw").await);

        let registrations = h.api.registrations.lock().unwrap().clone();
        assert_eq!(registrations[0], ("bob".to_string(), Some("77".to_string())));
        assert_eq!(registrations[1], ("carol".to_string(), None));
        assert_eq!(h.partner.read(), None);
        assert_eq!(h.auth.state(), AuthState::Unauthenticated);
        assert_eq!(h.session.get(), None);
    }

    #[tokio::test]
    async fn failed_registration_keeps_partner() {
        let h = harness();
        h.partner
            .capture(&Url::parse("https://my.example.com/?partner_id=77").unwrap());
        h.api.fail_register.store(true, Ordering::SeqCst);

        assert!(!h.auth.register("bob", "pw", "pw").await);
        assert_eq!(h.partner.read().as_deref(), Some("77"));
    }

    #[tokio::test]
    async fn login_never_consumes_partner() {
        let h = harness();
        h.partner
            .capture(&Url::parse("https://my.example.com/?partner_id=77").unwrap());
        *h.api.login_session.lock().unwrap() = Some("s".into());
        *h.api.user.lock().unwrap() = Some(user(0.0));

        assert!(h.auth.login("alice", "pw").await);
        assert_eq!(h.partner.read().as_deref(), Some("77"));
    }

    #[tokio::test]
    async fn embedded_auth_runs_once_and_caches_photo() {
        let h = harness();
        *h.api.telegram_session.lock().unwrap() = Some("tg-sess".into());
        *h.api.user.lock().unwrap() = Some(user(0.0));
        let host = HostContext::from_init_data(
            "query_id=AA&user=%7B%22id%22%3A42%2C%22photo_url%22%3A%22https%3A%2F%2Ft.me%2Fi%2Fa.jpg%22%7D&hash=ff",
        )
        .unwrap();

        assert!(h.auth.auto_auth_embedded(&host, &telegram()).await);
        assert!(h.auth.auto_auth_embedded(&host, &telegram()).await);

        assert_eq!(h.api.calls_to("telegram_webapp_auth"), 1);
        assert_eq!(h.session.get().as_deref(), Some("tg-sess"));
        assert_eq!(h.store.snapshot().telegram_photo.as_deref(), Some("https://t.me/i/a.jpg"));
    }

    #[tokio::test]
    async fn embedded_auth_respects_flag() {
        let h = harness();
        let host = HostContext::from_init_data("user=%7B%7D&hash=1").unwrap();
        let settings = TelegramSettings {
            webapp_auth_enable: false,
            ..telegram()
        };

        assert!(!h.auth.auto_auth_embedded(&host, &settings).await);
        assert!(h.api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn widget_auth_consumes_partner() {
        let h = harness();
        h.partner
            .capture(&Url::parse("https://my.example.com/?partner_id=5").unwrap());
        *h.api.telegram_session.lock().unwrap() = Some("w-sess".into());
        *h.api.user.lock().unwrap() = Some(user(0.0));

        assert!(h.auth.widget_auth(&assertion()).await);

        assert_eq!(*h.api.widget_partners.lock().unwrap(), vec![Some("5".to_string())]);
        assert_eq!(h.partner.read(), None);
        assert_eq!(h.store.snapshot().telegram_photo.as_deref(), Some("https://t.me/i/ann.jpg"));
    }

    #[tokio::test]
    async fn widget_failure_notifies_once() {
        let mut h = harness();
        h.api.fail_telegram.store(true, Ordering::SeqCst);

        assert!(!h.auth.widget_auth(&assertion()).await);

        assert_eq!(h.auth.state(), AuthState::Unauthenticated);
        assert_eq!(drain(&mut h.notices).len(), 1);
    }

    #[tokio::test]
    async fn restore_drops_rejected_session() {
        let h = harness();
        h.session.set("stale");

        assert!(!h.auth.restore().await);
        assert_eq!(h.session.get(), None);
        assert!(!h.store.snapshot().is_loading);
    }

    #[tokio::test]
    async fn logout_clears_everything_without_network() {
        let h = harness();
        *h.api.login_session.lock().unwrap() = Some("s".into());
        *h.api.user.lock().unwrap() = Some(user(0.0));
        h.auth.login("alice", "pw").await;
        h.store.set_telegram_photo(Some("p".into()));
        let calls_before = h.api.calls.lock().unwrap().len();

        h.auth.logout();

        assert_eq!(h.session.get(), None);
        assert_eq!(h.auth.state(), AuthState::Unauthenticated);
        assert!(h.store.snapshot().telegram_photo.is_none());
        assert!(!h.store.is_authenticated());
        assert_eq!(h.api.calls.lock().unwrap().len(), calls_before);
    }

    #[test]
    fn environment_gates() {
        let host = HostContext::from_init_data("hash=1");
        assert!(telegram().embedded_auth_allowed(host.as_ref()));
        assert!(!telegram().widget_allowed(host.as_ref()));
        assert!(telegram().widget_allowed(None));
        assert!(HostContext::from_init_data("   ").is_none());

        let no_bot = TelegramSettings {
            bot_name: None,
            ..telegram()
        };
        assert!(!no_bot.widget_allowed(None));
    }
}
