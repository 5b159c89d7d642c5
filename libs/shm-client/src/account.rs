//! Profile, password, payment history and promo codes.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::ShmApi;
use crate::models::{Forecast, PaySystem, Payment, ProfileUpdate, Promo, User};
use crate::notify::Notifier;
use crate::ordering::UrlOpener;
use crate::state::AppStore;

pub struct AccountWorkflow {
    api: Arc<dyn ShmApi>,
    store: AppStore,
    notifier: Notifier,
    opener: Arc<dyn UrlOpener>,
}

impl AccountWorkflow {
    pub fn new(
        api: Arc<dyn ShmApi>,
        store: AppStore,
        notifier: Notifier,
        opener: Arc<dyn UrlOpener>,
    ) -> Self {
        Self {
            api,
            store,
            notifier,
            opener,
        }
    }

    /// Fetches the current user and replaces the stored one.
    pub async fn profile(&self) -> Option<User> {
        match self.api.current_user().await {
            Ok(user) => {
                self.store.set_user(Some(user.clone()));
                Some(user)
            }
            Err(e) => {
                warn!("Failed to load profile: {}", e);
                self.notifier.error("Failed to load profile");
                None
            }
        }
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Option<User> {
        if update.is_empty() {
            self.notifier.error("Nothing to update");
            return None;
        }

        match self.api.update_profile(update).await {
            Ok(user) => {
                info!("Profile updated for {}", user.login);
                self.store.set_user(Some(user.clone()));
                self.notifier.success("Profile updated");
                Some(user)
            }
            Err(e) => {
                warn!("Failed to update profile: {}", e);
                self.notifier.error("Failed to update profile");
                None
            }
        }
    }

    pub async fn change_password(&self, password: &str, confirmation: &str) -> bool {
        if password.is_empty() {
            self.notifier.error("Password must not be empty");
            return false;
        }
        if password != confirmation {
            self.notifier.error("Passwords do not match");
            return false;
        }

        match self.api.change_password(password).await {
            Ok(()) => {
                self.notifier.success("Password changed");
                true
            }
            Err(e) => {
                warn!("Failed to change password: {}", e);
                self.notifier.error("Failed to change password");
                false
            }
        }
    }

    pub async fn payments(&self) -> Vec<Payment> {
        self.api.payments().await.unwrap_or_else(|e| {
            warn!("Failed to load payments: {}", e);
            self.notifier.error("Failed to load payments");
            Vec::new()
        })
    }

    pub async fn pay_systems(&self) -> Vec<PaySystem> {
        self.api.pay_systems().await.unwrap_or_else(|e| {
            warn!("Failed to load payment systems: {}", e);
            self.notifier.error("Failed to load payment systems");
            Vec::new()
        })
    }

    pub async fn forecast(&self) -> Option<Forecast> {
        match self.api.forecast().await {
            Ok(forecast) => Some(forecast),
            Err(e) => {
                warn!("Failed to load forecast: {}", e);
                self.notifier.error("Failed to load forecast");
                None
            }
        }
    }

    pub async fn delete_autopayment(&self, pay_system: &str) -> bool {
        match self.api.delete_autopayment(pay_system).await {
            Ok(()) => {
                info!("Autopayment via {} removed", pay_system);
                self.notifier.success("Autopayment removed");
                true
            }
            Err(e) => {
                warn!("Failed to remove autopayment {}: {}", pay_system, e);
                self.notifier.error("Failed to remove autopayment");
                false
            }
        }
    }

    /// Applies a promo code and refreshes the balance it may have changed.
    pub async fn apply_promo(&self, code: &str) -> Option<Value> {
        let code = code.trim();
        if code.is_empty() {
            self.notifier.error("Enter a promo code");
            return None;
        }

        match self.api.apply_promo(code).await {
            Ok(result) => {
                self.notifier.success("Promo code applied");
                if let Ok(user) = self.api.current_user().await {
                    self.store.set_user(Some(user));
                }
                Some(result)
            }
            Err(e) => {
                warn!("Failed to apply promo {}: {}", code, e);
                self.notifier.error("Failed to apply promo code");
                None
            }
        }
    }

    pub async fn promos(&self) -> Vec<Promo> {
        self.api.promos().await.unwrap_or_else(|e| {
            warn!("Failed to load promo codes: {}", e);
            self.notifier.error("Failed to load promo codes");
            Vec::new()
        })
    }

    /// Opens the payment form of `pay_system` for `amount`.
    pub fn top_up(&self, pay_system: &PaySystem, amount: f64) -> bool {
        if amount.is_nan() || amount <= 0.0 {
            self.notifier.error("Amount must be positive");
            return false;
        }
        self.opener.open(&pay_system.payment_url(amount));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{Level, Notice, drain};
    use crate::store::MemoryStore;
    use crate::testing::{FakeApi, pay_system, user};
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc::UnboundedReceiver;

    #[derive(Default)]
    struct RecordingOpener {
        opened: Mutex<Vec<String>>,
    }

    impl UrlOpener for RecordingOpener {
        fn open(&self, url: &str) {
            self.opened.lock().unwrap().push(url.to_string());
        }
    }

    struct Harness {
        api: Arc<FakeApi>,
        store: AppStore,
        opener: Arc<RecordingOpener>,
        notices: UnboundedReceiver<Notice>,
        account: AccountWorkflow,
    }

    fn harness() -> Harness {
        let api = Arc::new(FakeApi::new());
        *api.user.lock().unwrap() = Some(user(10.0));
        let store = AppStore::new(Arc::new(MemoryStore::new()));
        let opener = Arc::new(RecordingOpener::default());
        let (notifier, notices) = Notifier::channel();
        let account = AccountWorkflow::new(api.clone(), store.clone(), notifier, opener.clone());
        Harness {
            api,
            store,
            opener,
            notices,
            account,
        }
    }

    #[tokio::test]
    async fn profile_replaces_stored_user() {
        let h = harness();

        let fetched = h.account.profile().await;

        assert_eq!(fetched, Some(user(10.0)));
        assert_eq!(h.store.user(), Some(user(10.0)));
    }

    #[tokio::test]
    async fn update_profile_stores_response() {
        let mut h = harness();
        let update = ProfileUpdate {
            full_name: Some("Alice Liddell".into()),
            phone: None,
        };

        let updated = h.account.update_profile(&update).await.unwrap();

        assert_eq!(updated.full_name.as_deref(), Some("Alice Liddell"));
        assert_eq!(h.store.user().unwrap().full_name.as_deref(), Some("Alice Liddell"));
        assert_eq!(drain(&mut h.notices)[0].level, Level::Success);
    }

    #[tokio::test]
    async fn empty_update_is_rejected_locally() {
        let h = harness();

        assert!(h.account.update_profile(&ProfileUpdate::default()).await.is_none());
        assert_eq!(h.api.calls_to("update_profile"), 0);
    }

    #[tokio::test]
    async fn password_change_is_validated_before_network() {
        let mut h = harness();

        assert!(!h.account.change_password("", "").await);
        assert!(!h.account.change_password("secret1", "secret2").await);
        assert_eq!(h.api.calls_to("change_password"), 0);
        assert_eq!(drain(&mut h.notices).len(), 2);

        assert!(h.account.change_password("secret1", "secret1").await);
        assert_eq!(h.api.calls_to("change_password"), 1);
    }

    #[tokio::test]
    async fn failed_lists_are_empty_with_one_notice() {
        let mut h = harness();
        h.api.fail_pay_systems.store(true, Ordering::SeqCst);

        assert!(h.account.payments().await.is_empty());
        assert!(h.account.pay_systems().await.is_empty());

        let notices = drain(&mut h.notices);
        assert_eq!(notices.len(), 2);
        assert!(notices.iter().all(|n| n.level == Level::Error));
    }

    #[tokio::test]
    async fn promo_refreshes_balance() {
        let h = harness();
        *h.api.user.lock().unwrap() = Some(user(60.0));

        let result = h.account.apply_promo(" SPRING ").await;

        assert_eq!(result, Some(serde_json::json!({ "code": "SPRING" })));
        assert_eq!(h.store.user().map(|u| u.balance), Some(60.0));
    }

    #[tokio::test]
    async fn failed_autopayment_removal_notifies() {
        let mut h = harness();
        h.api.fail_mutations.store(true, Ordering::SeqCst);

        assert!(!h.account.delete_autopayment("yookassa").await);

        let notices = drain(&mut h.notices);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].message, "Failed to remove autopayment");
    }

    #[test]
    fn top_up_opens_payment_url() {
        let h = harness();

        assert!(!h.account.top_up(&pay_system("cryptocloud"), 0.0));
        assert!(h.account.top_up(&pay_system("cryptocloud"), 250.0));

        assert_eq!(
            *h.opener.opened.lock().unwrap(),
            vec!["https://pay.example.com/cryptocloud?amount=250".to_string()]
        );
    }
}
