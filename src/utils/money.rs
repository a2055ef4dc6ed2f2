/// Kopecks to a human string: 19900 -> "199 ₽", 19950 -> "199.50 ₽"
pub fn format_money(kopecks: i64) -> String {
    let sign = if kopecks < 0 { "-" } else { "" };
    let abs = kopecks.unsigned_abs();
    let rub = abs / 100;
    let kop = abs % 100;
    if kop == 0 {
        format!("{sign}{rub} ₽")
    } else {
        format!("{sign}{rub}.{kop:02} ₽")
    }
}

/// Parses user input in rubles ("150", "150.5", "150,50") into kopecks.
/// Returns None for garbage, negative values and more than two decimals.
pub fn parse_rubles(raw: &str) -> Option<i64> {
    let cleaned: String = raw
        .trim()
        .trim_end_matches('₽')
        .trim()
        .replace(',', ".")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let (int_part, frac_part) = match cleaned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (cleaned.as_str(), ""),
    };
    if int_part.is_empty() || frac_part.len() > 2 {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let rub: i64 = int_part.parse().ok()?;
    let kop: i64 = match frac_part.len() {
        0 => 0,
        1 => frac_part.parse::<i64>().ok()? * 10,
        _ => frac_part.parse().ok()?,
    };
    rub.checked_mul(100)?.checked_add(kop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(19_900), "199 ₽");
        assert_eq!(format_money(19_950), "199.50 ₽");
        assert_eq!(format_money(5), "0.05 ₽");
        assert_eq!(format_money(-1_000), "-10 ₽");
    }

    #[test]
    fn test_parse_rubles() {
        assert_eq!(parse_rubles("150"), Some(15_000));
        assert_eq!(parse_rubles("150.5"), Some(15_050));
        assert_eq!(parse_rubles("150,05"), Some(15_005));
        assert_eq!(parse_rubles(" 1 000 ₽"), Some(100_000));
        assert_eq!(parse_rubles("-5"), None);
        assert_eq!(parse_rubles("1.234"), None);
        assert_eq!(parse_rubles("abc"), None);
        assert_eq!(parse_rubles(""), None);
    }
}
