use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lenient;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaySystem {
    pub name: String,
    /// Payment page prefix; the amount is appended verbatim.
    pub shm_url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub recurring: Option<Value>,
}

impl PaySystem {
    pub fn payment_url(&self, amount: f64) -> String {
        format!("{}{}", self.shm_url, amount)
    }

    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub money: f64,
    #[serde(default)]
    pub pay_system_id: Option<String>,
    #[serde(default)]
    pub comment: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastItem {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub total: f64,
    #[serde(default)]
    pub expire: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    #[serde(default, deserialize_with = "lenient::amount")]
    pub total: f64,
    #[serde(default)]
    pub items: Vec<ForecastItem>,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub dept: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promo {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
