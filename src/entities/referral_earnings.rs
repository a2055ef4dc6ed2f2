use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
#[serde(rename_all = "snake_case")]
pub enum ReferralEarningKind {
    #[sea_orm(string_value = "first_reward")]
    FirstReward,
    #[sea_orm(string_value = "commission")]
    Commission,
    /// bonus for the invited user on their first qualifying top-up
    #[sea_orm(string_value = "referred_bonus")]
    ReferredBonus,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "referral_earnings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// inviting user; `ReferredBonus` rows were credited to `referred_id`
    pub referrer_id: i32,
    pub referred_id: i32,
    pub amount: i64,
    pub kind: ReferralEarningKind,
    /// top-up that triggered the reward
    pub payment_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
