use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub users_total: u64,
    pub users_new_today: u64,
    pub users_banned: u64,
    pub active_subscriptions: u64,
    pub trial_subscriptions: u64,
    pub revenue_total: i64,
    pub revenue_today: i64,
    pub open_tickets: u64,
}
