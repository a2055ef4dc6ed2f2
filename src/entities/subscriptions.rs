use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Plan sold in the bot
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    /// kopecks
    pub price: i64,
    pub duration_days: i32,
    /// 0 means unlimited
    pub traffic_limit_gb: i32,
    pub device_limit: i32,
    /// comma separated internal squad uuids
    pub squad_uuids: Option<String>,
    pub is_active: bool,
    pub is_trial: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn squads(&self) -> Vec<String> {
        crate::utils::split_uuid_list(self.squad_uuids.as_deref())
    }
}
