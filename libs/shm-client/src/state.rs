//! Application state container shared by the workflows and the shell.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::User;
use crate::store::CookieStore;

pub const TELEGRAM_PHOTO_KEY: &str = "shm_telegram_photo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub path: &'static str,
    pub label: &'static str,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeConfig {
    pub primary_color: String,
    pub allow_user_theme_change: bool,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            primary_color: "#228be6".to_string(),
            allow_user_theme_change: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub user: Option<User>,
    pub is_authenticated: bool,
    /// True until the initial session check has finished.
    pub is_loading: bool,
    pub menu_items: Vec<MenuItem>,
    pub theme: ThemeConfig,
    pub telegram_photo: Option<String>,
}

impl AppState {
    fn new(telegram_photo: Option<String>) -> Self {
        Self {
            user: None,
            is_authenticated: false,
            is_loading: true,
            menu_items: default_menu(),
            theme: ThemeConfig::default(),
            telegram_photo,
        }
    }

    pub fn enabled_menu(&self) -> impl Iterator<Item = &MenuItem> {
        self.menu_items.iter().filter(|item| item.enabled)
    }
}

fn default_menu() -> Vec<MenuItem> {
    vec![
        MenuItem { path: "/", label: "Profile", enabled: true },
        MenuItem { path: "/services", label: "Services", enabled: true },
        MenuItem { path: "/payments", label: "Payments", enabled: true },
        MenuItem { path: "/withdrawals", label: "Withdrawals", enabled: true },
    ]
}

#[derive(Clone)]
pub struct AppStore {
    state: Arc<RwLock<AppState>>,
    storage: Arc<dyn CookieStore>,
}

impl AppStore {
    pub fn new(storage: Arc<dyn CookieStore>) -> Self {
        let photo = storage.get(TELEGRAM_PHOTO_KEY);
        Self {
            state: Arc::new(RwLock::new(AppState::new(photo))),
            storage,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AppState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, AppState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> AppState {
        self.read().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.read().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_authenticated
    }

    pub fn set_user(&self, user: Option<User>) {
        let mut state = self.write();
        state.is_authenticated = user.is_some();
        state.user = user;
    }

    pub fn set_loading(&self, loading: bool) {
        self.write().is_loading = loading;
    }

    pub fn set_theme(&self, theme: ThemeConfig) {
        self.write().theme = theme;
    }

    pub fn set_menu_enabled(&self, path: &str, enabled: bool) {
        if let Some(item) = self.write().menu_items.iter_mut().find(|i| i.path == path) {
            item.enabled = enabled;
        }
    }

    pub fn set_telegram_photo(&self, photo: Option<String>) {
        match &photo {
            Some(url) => self.storage.set(TELEGRAM_PHOTO_KEY, url, None),
            None => self.storage.remove(TELEGRAM_PHOTO_KEY),
        }
        self.write().telegram_photo = photo;
    }

    /// Drops the user and the cached photo. The session credential is owned
    /// by the session store and cleared by the caller.
    pub fn logout(&self) {
        self.storage.remove(TELEGRAM_PHOTO_KEY);
        let mut state = self.write();
        state.user = None;
        state.is_authenticated = false;
        state.telegram_photo = None;
    }
}
