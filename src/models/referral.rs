use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralStats {
    pub invited: u64,
    /// invited users who already brought the first reward
    pub paid_referrals: u64,
    pub total_earned: i64,
    pub referral_link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralEntry {
    pub display_name: String,
    pub joined_at: chrono::DateTime<chrono::Utc>,
    pub earned: i64,
    pub first_reward_paid: bool,
}
