use crate::entities::PromocodeKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPromocode {
    pub code: String,
    pub kind: PromocodeKind,
    pub value: i64,
    /// 0 means unlimited
    pub max_uses: i32,
    pub valid_days: Option<i64>,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome {
    BalanceCredited { amount: i64, new_balance: i64 },
    SubscriptionExtended {
        days: i64,
        expires_at: chrono::DateTime<chrono::Utc>,
    },
}
