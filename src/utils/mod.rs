pub mod code_generator;
pub mod money;
pub mod pagination;
pub mod signature;

pub use code_generator::{generate_code, generate_unique_referral_code, normalize_promocode};
pub use money::{format_money, parse_rubles};
pub use pagination::{PaginatedResponse, PaginationInfo, PaginationParams};
pub use signature::{hmac_sha256_hex, verify_hmac_sha256_hex};

/// "a, b,,c" -> ["a", "b", "c"]
pub fn split_uuid_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

pub fn join_uuid_list(items: &[String]) -> Option<String> {
    if items.is_empty() {
        None
    } else {
        Some(items.join(","))
    }
}

/// Escapes text for Telegram HTML parse mode
pub fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub const BYTES_IN_GB: i64 = 1024 * 1024 * 1024;

pub fn gb_to_bytes(gb: i32) -> i64 {
    i64::from(gb.max(0)) * BYTES_IN_GB
}

pub fn bytes_to_gb(bytes: i64) -> i32 {
    (bytes.max(0) / BYTES_IN_GB) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_list_helpers() {
        assert_eq!(split_uuid_list(Some("a, b,,c")), vec!["a", "b", "c"]);
        assert!(split_uuid_list(None).is_empty());
        assert_eq!(join_uuid_list(&["a".into(), "b".into()]), Some("a,b".into()));
        assert_eq!(join_uuid_list(&[]), None);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>&</b>"), "&lt;b&gt;&amp;&lt;/b&gt;");
    }

    #[test]
    fn test_traffic_conversion() {
        assert_eq!(gb_to_bytes(0), 0);
        assert_eq!(gb_to_bytes(10), 10 * BYTES_IN_GB);
        assert_eq!(bytes_to_gb(gb_to_bytes(50)), 50);
    }
}
