use crate::entities::user_entity;
use crate::error::{AppError, AppResult};
use rand::Rng;
use regex::Regex;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};
use std::sync::OnceLock;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Random code over an alphabet without look-alike characters (0/O, 1/I)
pub fn generate_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// 8-character referral code not yet used by any user
pub async fn generate_unique_referral_code<C: ConnectionTrait>(db: &C) -> AppResult<String> {
    for _ in 0..10 {
        let code = generate_code(8);
        let exists = user_entity::Entity::find()
            .filter(user_entity::Column::ReferralCode.eq(code.as_str()))
            .count(db)
            .await?;
        if exists == 0 {
            return Ok(code);
        }
    }
    Err(AppError::InternalError(
        "could not generate a unique referral code".into(),
    ))
}

fn promocode_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z0-9_-]{3,32}$").expect("static regex"))
}

/// Trims and upper-cases a promocode, rejecting anything outside `[A-Z0-9_-]{3,32}`
pub fn normalize_promocode(raw: &str) -> AppResult<String> {
    let code = raw.trim().to_uppercase();
    if !promocode_regex().is_match(&code) {
        return Err(AppError::ValidationError(
            "Промокод должен состоять из 3-32 латинских букв, цифр, _ или -".into(),
        ));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_code_uses_alphabet() {
        let code = generate_code(8);
        assert_eq!(code.len(), 8);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_normalize_promocode() {
        assert_eq!(normalize_promocode("  summer_25 ").unwrap(), "SUMMER_25");
        assert!(normalize_promocode("ab").is_err());
        assert!(normalize_promocode("скидка").is_err());
        assert!(normalize_promocode(&"A".repeat(33)).is_err());
    }

    #[tokio::test]
    async fn test_referral_code_is_unique_on_empty_db() {
        let db = crate::database::connection::test_pool().await;
        let code = generate_unique_referral_code(&db).await.unwrap();
        assert_eq!(code.len(), 8);
    }
}
