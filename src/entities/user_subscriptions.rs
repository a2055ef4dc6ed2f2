use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_subscriptions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    /// None for rows imported from the panel or trials
    pub subscription_id: Option<i32>,
    pub remnawave_uuid: Option<String>,
    pub short_uuid: Option<String>,
    pub subscription_url: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub traffic_limit_gb: i32,
    pub squad_uuids: Option<String>,
    pub is_active: bool,
    pub is_trial: bool,
    pub auto_renew: bool,
    /// set once the 24h reminder went out for the current term
    pub expiry_notified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn days_left(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_days().max(0)
    }
}
