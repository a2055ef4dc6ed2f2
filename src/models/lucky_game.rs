use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LuckyGameResult {
    pub prize_name: String,
    pub reward: i64,
    pub new_balance: i64,
    pub next_play_at: DateTime<Utc>,
}
