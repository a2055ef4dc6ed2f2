use crate::entities::{plan_entity, user_subscription_entity};
use serde::{Deserialize, Serialize};

/// Admin input for a new plan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPlan {
    pub name: String,
    pub description: Option<String>,
    /// kopecks
    pub price: i64,
    pub duration_days: i32,
    pub traffic_limit_gb: i32,
    pub device_limit: i32,
    pub squad_uuids: Vec<String>,
    pub sort_order: i32,
}

#[derive(Debug, Clone)]
pub struct PurchaseOutcome {
    pub plan: plan_entity::Model,
    pub subscription: user_subscription_entity::Model,
    pub new_balance: i64,
    /// true when an existing subscription was extended
    pub extended: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub checked: u64,
    pub updated: u64,
    pub deactivated: u64,
    pub imported: u64,
    pub errors: u64,
}

impl SyncReport {
    pub fn merge(&mut self, other: &SyncReport) {
        self.checked += other.checked;
        self.updated += other.updated;
        self.deactivated += other.deactivated;
        self.imported += other.imported;
        self.errors += other.errors;
    }
}
