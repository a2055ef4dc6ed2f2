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
pub enum PaymentKind {
    #[sea_orm(string_value = "topup")]
    Topup,
    #[sea_orm(string_value = "subscription_purchase")]
    SubscriptionPurchase,
    #[sea_orm(string_value = "referral_reward")]
    ReferralReward,
    #[sea_orm(string_value = "promocode")]
    Promocode,
    #[sea_orm(string_value = "lucky_game")]
    LuckyGame,
    #[sea_orm(string_value = "admin_adjustment")]
    AdminAdjustment,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "telegram_stars")]
    TelegramStars,
    #[sea_orm(string_value = "tribute")]
    Tribute,
    #[sea_orm(string_value = "balance")]
    Balance,
    #[sea_orm(string_value = "promocode")]
    Promocode,
    #[sea_orm(string_value = "referral")]
    Referral,
    #[sea_orm(string_value = "lucky_game")]
    LuckyGame,
    #[sea_orm(string_value = "admin")]
    Admin,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// Balance ledger row. Positive amounts credit, negative debit.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub amount: i64,
    pub kind: PaymentKind,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub description: Option<String>,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl PaymentMethod {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::TelegramStars => "Telegram Stars",
            PaymentMethod::Tribute => "Tribute",
            PaymentMethod::Balance => "Баланс",
            PaymentMethod::Promocode => "Промокод",
            PaymentMethod::Referral => "Реферальная программа",
            PaymentMethod::LuckyGame => "Игра удачи",
            PaymentMethod::Admin => "Администратор",
        }
    }
}
