use anyhow::{Context, Result};
use console::style;
use shm_client::account::AccountWorkflow;
use shm_client::api::ShmApi;
use shm_client::auth::{AuthWorkflow, HostContext, TelegramSettings};
use shm_client::gateway::{Gateway, Navigation};
use shm_client::notify::{Notice, Notifier, drain};
use shm_client::ordering::{OrderingWorkflow, UrlOpener};
use shm_client::owned::OwnedServicesWorkflow;
use shm_client::partner::PartnerAttribution;
use shm_client::session::SessionStore;
use shm_client::state::AppStore;
use shm_client::store::{CookieStore, FileStore};
use shm_client::widget::WidgetBridge;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;

use crate::config::PortalConfig;
use crate::render;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Inside the Telegram Mini App.
    BottomNavigation,
    /// Standalone, with header.
    Sidebar,
}

impl Layout {
    pub fn for_host(host: Option<&HostContext>) -> Self {
        if host.is_some() {
            Layout::BottomNavigation
        } else {
            Layout::Sidebar
        }
    }
}

/// Payment pages cannot be opened from a terminal; print the link instead.
struct ConsoleOpener;

impl UrlOpener for ConsoleOpener {
    fn open(&self, url: &str) {
        println!("{} {}", style("Open to continue:").bold(), style(url).underlined());
    }
}

pub struct Shell {
    pub config: PortalConfig,
    pub telegram: TelegramSettings,
    pub host: Option<HostContext>,
    pub layout: Layout,
    pub store: AppStore,
    pub partner: PartnerAttribution,
    pub auth: Arc<AuthWorkflow>,
    pub ordering: OrderingWorkflow,
    pub owned: OwnedServicesWorkflow,
    pub account: AccountWorkflow,
    pub bridge: WidgetBridge,
    notices: UnboundedReceiver<Notice>,
    navigation_task: JoinHandle<()>,
}

impl Shell {
    pub fn new(config: PortalConfig, init_data: Option<&str>) -> Result<Self> {
        std::fs::create_dir_all(&config.state_dir)
            .with_context(|| format!("Failed to create state dir {}", config.state_dir.display()))?;
        let cookies: Arc<dyn CookieStore> = Arc::new(
            FileStore::open(config.cookie_path())
                .with_context(|| format!("Failed to open {}", config.cookie_path().display()))?,
        );

        let session = SessionStore::new(cookies.clone());
        let partner = PartnerAttribution::new(cookies.clone());
        let store = AppStore::new(cookies);
        let gateway = Gateway::new(&config.api_url, session.clone());
        let api: Arc<dyn ShmApi> = Arc::new(gateway.clone());
        let (notifier, notices) = Notifier::channel();
        let opener: Arc<dyn UrlOpener> = Arc::new(ConsoleOpener);

        let auth = Arc::new(AuthWorkflow::new(
            api.clone(),
            session,
            partner.clone(),
            store.clone(),
            notifier.clone(),
        ));
        let owned = OwnedServicesWorkflow::new(api.clone(), notifier.clone());
        let ordering = OrderingWorkflow::new(api.clone(), notifier.clone(), opener.clone())
            .with_listener(Arc::new(owned.refresh_handle()));
        let account = AccountWorkflow::new(api, store.clone(), notifier, opener);

        let navigation_task = spawn_navigation_listener(&gateway, auth.clone());

        let host = init_data.and_then(HostContext::from_init_data);
        let layout = Layout::for_host(host.as_ref());
        let telegram = config.telegram_settings();
        info!("Portal starting against {} ({:?} layout)", gateway.base_url(), layout);

        Ok(Self {
            config,
            telegram,
            host,
            layout,
            store,
            partner,
            auth,
            ordering,
            owned,
            account,
            bridge: WidgetBridge::new(),
            notices,
            navigation_task,
        })
    }

    /// Entry sequence: remember the partner, then sign in from the embedded
    /// context or fall back to the stored session.
    pub async fn start(&self, landing_url: Option<&str>) -> bool {
        if let Some(landing) = landing_url {
            match Url::parse(landing) {
                Ok(url) => {
                    let cleaned = self.partner.capture(&url);
                    if cleaned != url {
                        info!("Partner attribution captured, location is now {}", cleaned);
                    }
                }
                Err(e) => warn!("Ignoring malformed landing URL {}: {}", landing, e),
            }
        }

        if let Some(host) = &self.host {
            if self.telegram.embedded_auth_allowed(Some(host))
                && self.auth.auto_auth_embedded(host, &self.telegram).await
            {
                self.store.set_loading(false);
                return true;
            }
        }

        self.auth.restore().await
    }

    pub fn header(&self) {
        render::header(&self.config.app_name, self.layout, self.store.user().as_ref());
    }

    pub fn flush_notices(&mut self) {
        for notice in drain(&mut self.notices) {
            render::notice(&notice);
        }
    }
}

impl Drop for Shell {
    fn drop(&mut self) {
        self.navigation_task.abort();
        self.owned.shutdown();
    }
}

/// Reacts to the gateway dropping the session mid-command.
fn spawn_navigation_listener(gateway: &Gateway, auth: Arc<AuthWorkflow>) -> JoinHandle<()> {
    let mut rx = gateway.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(Navigation::Entry) => {
                    warn!("Session expired, back to sign-in");
                    auth.on_session_cleared();
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelegramConfig;

    fn config(dir: &std::path::Path) -> PortalConfig {
        PortalConfig {
            app_name: "SHM".into(),
            api_url: "http://127.0.0.1:9".into(),
            state_dir: dir.join("state"),
            telegram: TelegramConfig::default(),
        }
    }

    #[test]
    fn layout_follows_environment() {
        let host = HostContext::from_init_data("query_id=AA&auth_date=1").unwrap();
        assert_eq!(Layout::for_host(Some(&host)), Layout::BottomNavigation);
        assert_eq!(Layout::for_host(None), Layout::Sidebar);
    }

    #[tokio::test]
    async fn landing_partner_is_captured_without_session() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Shell::new(config(dir.path()), None).unwrap();

        let restored = shell
            .start(Some("https://portal.example.com/register?partner_id=42&lang=en"))
            .await;

        assert!(!restored);
        assert_eq!(shell.partner.read().as_deref(), Some("42"));
        assert!(!shell.store.snapshot().is_loading);
        assert!(dir.path().join("state").join("cookies.json").exists());
    }

    #[tokio::test]
    async fn blank_init_data_means_standalone() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Shell::new(config(dir.path()), Some("  ")).unwrap();

        assert!(shell.host.is_none());
        assert_eq!(shell.layout, Layout::Sidebar);
    }
}
