pub mod payment;
pub mod service;
pub mod user;

pub use payment::{Forecast, ForecastItem, PaySystem, Payment, Promo};
pub use service::{OrderableService, OwnedService, ServiceInfo, ServiceStatus};
pub use user::{ProfileUpdate, User};

/// Amounts arrive as numbers from most backends and as numeric strings from
/// some older ones.
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    pub fn amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(opt_amount(deserializer)?.unwrap_or(0.0))
    }

    pub fn opt_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        match Option::<NumberOrText>::deserialize(deserializer)? {
            None => Ok(None),
            Some(NumberOrText::Number(n)) => Ok(Some(n)),
            Some(NumberOrText::Text(s)) if s.trim().is_empty() => Ok(None),
            Some(NumberOrText::Text(s)) => s.trim().parse().map(Some).map_err(de::Error::custom),
        }
    }
}
