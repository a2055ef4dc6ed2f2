use crate::entities::payment_entity;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Message for a user credited by the referral program, delivered after commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralNotification {
    pub telegram_id: i64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct TopupOutcome {
    pub payment: payment_entity::Model,
    pub new_balance: i64,
    pub notifications: Vec<ReferralNotification>,
    /// the external id was already credited; nothing changed
    pub duplicate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarsInvoice {
    pub title: String,
    pub description: String,
    pub payload: String,
    pub stars: u32,
    /// kopecks credited once paid
    pub amount: i64,
}

/// Fields of Telegram's `successful_payment` the bot relies on
#[derive(Debug, Clone)]
pub struct SuccessfulStarPayment {
    pub telegram_id: i64,
    pub telegram_payment_charge_id: String,
    pub total_amount: u32,
    pub currency: String,
    pub invoice_payload: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevenueStats {
    pub total: i64,
    pub today: i64,
    pub month: i64,
    pub stars_total: i64,
    pub tribute_total: i64,
    pub topups_count: u64,
}

/// Tribute webhook body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TributeWebhook {
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub sent_at: Option<String>,
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TributeDonation {
    pub donation_request_id: i64,
    #[serde(default)]
    pub donation_name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// minor units of `currency`
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    pub telegram_user_id: i64,
    #[serde(default)]
    pub period: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TributeOutcome {
    Credited {
        telegram_id: i64,
        amount: i64,
        new_balance: i64,
        notifications: Vec<ReferralNotification>,
    },
    Duplicate,
    Ignored(String),
}
