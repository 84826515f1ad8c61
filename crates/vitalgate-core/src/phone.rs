//! Customer phone extraction from free-form device identifier fields.
//!
//! Analyzers let staff type the customer's phone number into an ID field.
//! The raw value arrives padded, prefixed with a country code, or with
//! punctuation; this module reduces it to the canonical 10-digit local form.
//!
//! ```
//! use vitalgate_core::phone::extract_phone;
//!
//! assert_eq!(extract_phone("+84 965 385 123").as_deref(), Some("0965385123"));
//! assert_eq!(extract_phone("0000000000000000"), None);
//! ```

use crate::constants::{PHONE_COUNTRY_CODE, PHONE_LOCAL_LENGTH, PHONE_VALID_PREFIXES};

/// Normalize a raw identifier into a canonical local phone number.
///
/// Returns `None` when the identifier is empty, the all-zero "no entry"
/// sentinel, or does not reduce to 10 digits with an accepted prefix. The
/// caller keeps the measurement either way.
#[must_use]
pub fn extract_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.bytes().all(|b| b == b'0') {
        return None;
    }

    let mut national = digits.trim_start_matches('0');
    if national.len() > PHONE_LOCAL_LENGTH && national.starts_with(PHONE_COUNTRY_CODE) {
        national = national[PHONE_COUNTRY_CODE.len()..].trim_start_matches('0');
    }

    if national.len() != PHONE_LOCAL_LENGTH - 1 {
        return None;
    }

    let phone = format!("0{national}");
    PHONE_VALID_PREFIXES
        .iter()
        .any(|prefix| phone.starts_with(prefix))
        .then_some(phone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("0965385123")]
    #[case("965385123")]
    #[case("84965385123")]
    #[case("+84965385123")]
    #[case("+84 (0) 965-385-123")]
    #[case("000965385123")]
    fn test_canonical_forms(#[case] raw: &str) {
        assert_eq!(extract_phone(raw).as_deref(), Some("0965385123"));
    }

    #[rstest]
    #[case("0000000000000000")]
    #[case("")]
    #[case("abc")]
    #[case("0")]
    fn test_no_entry_sentinels(#[case] raw: &str) {
        assert_eq!(extract_phone(raw), None);
    }

    #[rstest]
    #[case("0165385123")] // prefix not in whitelist
    #[case("12345")] // too short
    #[case("0901234567000000")] // padded device default
    #[case("4412345678901")] // foreign country code
    fn test_rejected(#[case] raw: &str) {
        assert_eq!(extract_phone(raw), None);
    }

    #[rstest]
    #[case("0281234567", "0281234567")]
    #[case("0381234567", "0381234567")]
    #[case("0512345678", "0512345678")]
    #[case("0712345678", "0712345678")]
    #[case("0812345678", "0812345678")]
    fn test_all_prefixes(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(extract_phone(raw).as_deref(), Some(expected));
    }

    proptest! {
        #[test]
        fn prop_never_panics(raw in ".{0,40}") {
            let _ = extract_phone(&raw);
        }

        #[test]
        fn prop_result_is_canonical(raw in "[0-9+ ()-]{0,20}") {
            if let Some(phone) = extract_phone(&raw) {
                prop_assert_eq!(phone.len(), 10);
                prop_assert!(phone.starts_with('0'));
                prop_assert!(phone.bytes().all(|b| b.is_ascii_digit()));
                prop_assert_eq!(extract_phone(&phone), Some(phone.clone()));
            }
        }
    }
}
