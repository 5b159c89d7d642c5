use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

use super::lenient;
use crate::category::{Category, normalize};

/// Lifecycle status of an owned service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceStatus {
    Active,
    NotPaid,
    Block,
    Progress,
    Error,
    Init,
    Unknown(String),
}

impl ServiceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ServiceStatus::Active => "ACTIVE",
            ServiceStatus::NotPaid => "NOT PAID",
            ServiceStatus::Block => "BLOCK",
            ServiceStatus::Progress => "PROGRESS",
            ServiceStatus::Error => "ERROR",
            ServiceStatus::Init => "INIT",
            ServiceStatus::Unknown(raw) => raw,
        }
    }

    pub fn can_stop(&self) -> bool {
        matches!(self, ServiceStatus::Active)
    }

    pub fn can_delete(&self) -> bool {
        matches!(
            self,
            ServiceStatus::Block | ServiceStatus::NotPaid | ServiceStatus::Error
        )
    }
}

impl From<String> for ServiceStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "ACTIVE" => ServiceStatus::Active,
            "NOT PAID" => ServiceStatus::NotPaid,
            "BLOCK" => ServiceStatus::Block,
            "PROGRESS" => ServiceStatus::Progress,
            "ERROR" => ServiceStatus::Error,
            "INIT" => ServiceStatus::Init,
            _ => ServiceStatus::Unknown(raw),
        }
    }
}

impl From<ServiceStatus> for String {
    fn from(status: ServiceStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog entry available for purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderableService {
    pub service_id: u64,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub cost: f64,
    /// Billing period in months.
    #[serde(default, deserialize_with = "lenient::amount")]
    pub period: f64,
    #[serde(default)]
    pub descr: Option<String>,
}

impl OrderableService {
    pub fn category(&self) -> Category {
        normalize(&self.category)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(default)]
    pub category: String,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub cost: f64,
    #[serde(default)]
    pub name: String,
}

/// A purchased service instance. `children` is rebuilt on every fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedService {
    pub user_service_id: u64,
    pub service_id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub service: ServiceInfo,
    pub status: ServiceStatus,
    #[serde(default)]
    pub expire: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub parent: Option<u64>,
    #[serde(default)]
    pub settings: Option<Value>,
    #[serde(default, skip_deserializing)]
    pub children: Vec<OwnedService>,
}

impl OwnedService {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.service.name)
    }

    pub fn category(&self) -> Category {
        normalize(&self.service.category)
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.expire.as_deref().and_then(parse_timestamp)
    }

    /// True if this service or any descendant has `status`.
    pub fn any_with_status(&self, status: &ServiceStatus) -> bool {
        &self.status == status || self.children.iter().any(|c| c.any_with_status(status))
    }

    pub fn find(&self, user_service_id: u64) -> Option<&OwnedService> {
        if self.user_service_id == user_service_id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(user_service_id))
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn any_with_status(services: &[OwnedService], status: &ServiceStatus) -> bool {
    services.iter().any(|s| s.any_with_status(status))
}

pub fn find_service(services: &[OwnedService], user_service_id: u64) -> Option<&OwnedService> {
    services.iter().find_map(|s| s.find(user_service_id))
}

/// Rebuilds the parent/child forest. Every input service ends up exactly once:
/// a parent that is missing, null or self-referencing makes a root, and parent
/// cycles are broken by promoting their members to roots.
pub fn build_forest(services: Vec<OwnedService>) -> Vec<OwnedService> {
    let ids: HashSet<u64> = services.iter().map(|s| s.user_service_id).collect();
    let mut by_parent: HashMap<u64, Vec<OwnedService>> = HashMap::new();
    let mut roots = Vec::new();

    for mut service in services {
        service.children.clear();
        let parent = service
            .parent
            .filter(|p| *p != service.user_service_id && ids.contains(p));
        match parent {
            Some(parent) => by_parent.entry(parent).or_default().push(service),
            None => roots.push(service),
        }
    }

    let mut forest: Vec<OwnedService> = roots
        .into_iter()
        .map(|root| attach(root, &mut by_parent))
        .collect();

    while let Some(key) = by_parent.keys().min().copied() {
        if let Some(orphans) = by_parent.remove(&key) {
            forest.extend(orphans.into_iter().map(|s| attach(s, &mut by_parent)));
        }
    }

    forest
}

fn attach(mut node: OwnedService, by_parent: &mut HashMap<u64, Vec<OwnedService>>) -> OwnedService {
    if let Some(children) = by_parent.remove(&node.user_service_id) {
        node.children = children
            .into_iter()
            .map(|child| attach(child, by_parent))
            .collect();
    }
    node
}
