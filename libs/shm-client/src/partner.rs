use chrono::Duration;
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::store::CookieStore;

pub const PARTNER_PARAM: &str = "partner_id";
pub const PARTNER_COOKIE: &str = "partner_id";
pub const PARTNER_TTL_DAYS: i64 = 30;

/// Referral attribution captured from the landing URL, consumed by the first
/// successful registration.
#[derive(Clone)]
pub struct PartnerAttribution {
    store: Arc<dyn CookieStore>,
}

impl PartnerAttribution {
    pub fn new(store: Arc<dyn CookieStore>) -> Self {
        Self { store }
    }

    /// Stores `partner_id` from `landing` and returns the location with the
    /// parameter stripped. Other query pairs and the fragment are kept.
    pub fn capture(&self, landing: &Url) -> Url {
        let mut captured = None;
        let retained: Vec<(String, String)> = landing
            .query_pairs()
            .filter_map(|(key, value)| {
                if key == PARTNER_PARAM {
                    captured = Some(value.into_owned());
                    None
                } else {
                    Some((key.into_owned(), value.into_owned()))
                }
            })
            .collect();

        let Some(partner_id) = captured else {
            return landing.clone();
        };

        if !partner_id.is_empty() {
            info!("Captured partner id {} from landing url", partner_id);
            self.store
                .set(PARTNER_COOKIE, &partner_id, Some(Duration::days(PARTNER_TTL_DAYS)));
        }

        let mut cleaned = landing.clone();
        if retained.is_empty() {
            cleaned.set_query(None);
        } else {
            cleaned.query_pairs_mut().clear().extend_pairs(retained);
        }
        cleaned
    }

    pub fn read(&self) -> Option<String> {
        self.store.get(PARTNER_COOKIE)
    }

    pub fn clear(&self) {
        self.store.remove(PARTNER_COOKIE);
    }
}
