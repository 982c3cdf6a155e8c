//! Chilean RUT normalization and check-digit verification.

use std::sync::LazyLock;

use regex::Regex;

static RUT_SHAPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9.\-kK]+$").unwrap());

/// True if the input (after trimming) only contains digits, dots, dashes and `k`/`K`.
pub fn is_rut_shaped(input: &str) -> bool {
    let trimmed = input.trim();
    RUT_SHAPE.is_match(trimmed) && trimmed.chars().any(|c| c.is_ascii_digit())
}

/// Strip dots, dashes and whitespace, then upper-case (`12.345.678-k` -> `12345678K`).
pub fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '.' | '-') && !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Módulo-11 check digit for the numeric body of a RUT.
pub fn check_digit(body: u64) -> char {
    let mut sum = 0u64;
    let mut factor = 2u64;
    let mut rest = body;
    while rest > 0 {
        sum += (rest % 10) * factor;
        rest /= 10;
        factor = if factor == 7 { 2 } else { factor + 1 };
    }
    match 11 - (sum % 11) {
        11 => '0',
        10 => 'K',
        digit => char::from_digit(digit as u32, 10).unwrap_or('0'),
    }
}

/// Verify the check digit of an already normalized RUT.
pub fn has_valid_check_digit(normalized: &str) -> bool {
    let mut chars = normalized.chars();
    let Some(given) = chars.next_back() else {
        return false;
    };
    let body = chars.as_str();
    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    match body.parse::<u64>() {
        Ok(number) => check_digit(number) == given,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_separators_and_uppercases() {
        assert_eq!(normalize(" 12.345.678-k "), "12345678K");
        assert_eq!(normalize("7654321-0"), "76543210");
    }

    #[test]
    fn shape_accepts_formatted_and_rejects_names() {
        assert!(is_rut_shaped("12.345.678-5"));
        assert!(is_rut_shaped(" 123456785 "));
        assert!(!is_rut_shaped("jperez"));
        assert!(!is_rut_shaped("---"));
        assert!(!is_rut_shaped(""));
    }

    #[test]
    fn check_digit_matches_known_ruts() {
        assert_eq!(check_digit(12_345_678), '5');
        assert_eq!(check_digit(11_111_111), '1');
        assert!(has_valid_check_digit("123456785"));
        assert!(!has_valid_check_digit("123456780"));
    }

    #[test]
    fn check_digit_handles_k_and_zero() {
        let with_k = (1..100_000u64).find(|n| check_digit(*n) == 'K').expect("some K");
        assert!(has_valid_check_digit(&format!("{with_k}K")));
        let with_zero = (1..100_000u64).find(|n| check_digit(*n) == '0').expect("some 0");
        assert!(has_valid_check_digit(&format!("{with_zero}0")));
    }

    #[test]
    fn malformed_bodies_fail_verification() {
        assert!(!has_valid_check_digit(""));
        assert!(!has_valid_check_digit("K"));
        assert!(!has_valid_check_digit("12A45K"));
    }
}
