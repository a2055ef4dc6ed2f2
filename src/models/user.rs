use serde::{Deserialize, Serialize};

/// Sender data taken from an incoming Telegram update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramProfile {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
}

impl TelegramProfile {
    pub fn new(telegram_id: i64) -> Self {
        Self {
            telegram_id,
            ..Default::default()
        }
    }

    pub fn from_teloxide(user: &teloxide::types::User) -> Self {
        Self {
            telegram_id: user.id.0 as i64,
            username: user.username.clone(),
            first_name: Some(user.first_name.clone()).filter(|s| !s.is_empty()),
            last_name: user.last_name.clone(),
            language_code: user.language_code.clone(),
        }
    }
}

/// Extracts the referral code from a `/start ref_<code>` payload
pub fn parse_referral_payload(payload: Option<&str>) -> Option<String> {
    let code = payload?.trim().strip_prefix("ref_")?;
    if code.is_empty() {
        None
    } else {
        Some(code.to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_referral_payload() {
        assert_eq!(
            parse_referral_payload(Some("ref_abc123")),
            Some("ABC123".to_string())
        );
        assert_eq!(parse_referral_payload(Some("ref_")), None);
        assert_eq!(parse_referral_payload(Some("promo")), None);
        assert_eq!(parse_referral_payload(None), None);
    }
}
