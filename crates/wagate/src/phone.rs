//! Phone number normalization and structural validation.

/// Converts raw user input into the canonical address used by the messaging
/// session (`<digits>@c.us`).
#[derive(Debug, Clone)]
pub struct PhoneFormatter {
    country_code: String,
    address_suffix: String,
}

impl Default for PhoneFormatter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_COUNTRY_CODE, Self::DEFAULT_ADDRESS_SUFFIX)
    }
}

impl PhoneFormatter {
    pub const DEFAULT_COUNTRY_CODE: &'static str = "62";
    pub const DEFAULT_ADDRESS_SUFFIX: &'static str = "@c.us";

    pub fn new(country_code: impl Into<String>, address_suffix: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
            address_suffix: address_suffix.into(),
        }
    }

    pub fn address_suffix(&self) -> &str {
        &self.address_suffix
    }

    /// Normalize a raw phone number.
    ///
    /// Strips every non-digit character, swaps a single leading `0` for the
    /// country code, then appends the address suffix. Never fails: garbage in
    /// yields a well-formed but meaningless address.
    pub fn normalize(&self, raw: &str) -> String {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

        let mut formatted = match digits.strip_prefix('0') {
            Some(rest) => format!("{}{}", self.country_code, rest),
            None => digits,
        };

        if !formatted.ends_with(&self.address_suffix) {
            formatted.push_str(&self.address_suffix);
        }

        formatted
    }
}

/// Structural check on the *raw* input: exactly 12 characters.
///
/// This is a length heuristic only. It does not look at digits, country code
/// or suffix.
pub fn is_valid_phone_number(raw: &str) -> bool {
    raw.chars().count() == 12
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_non_digits() {
        let f = PhoneFormatter::default();
        assert_eq!(f.normalize("+62 812-3456-7890"), "6281234567890@c.us");
    }

    #[test]
    fn leading_zero_becomes_country_code() {
        let f = PhoneFormatter::default();
        assert_eq!(f.normalize("0811111111"), f.normalize("62811111111"));
        assert_eq!(f.normalize("0811111111"), "62811111111@c.us");
    }

    #[test]
    fn only_first_zero_is_replaced() {
        let f = PhoneFormatter::default();
        assert_eq!(f.normalize("00811"), "620811@c.us");
    }

    #[test]
    fn normalize_is_idempotent() {
        let f = PhoneFormatter::default();
        for raw in ["0811111111", "62811111111", "+62 (811) 111-111", "", "abc"] {
            let once = f.normalize(raw);
            assert_eq!(f.normalize(&once), once, "input: {raw:?}");
        }
    }

    #[test]
    fn suffix_appears_exactly_once() {
        let f = PhoneFormatter::default();
        for raw in ["0811", "62811@c.us", "62811@c.us@c.us", "", "@c.us"] {
            let out = f.normalize(raw);
            assert!(out.ends_with("@c.us"));
            assert_eq!(out.matches("@c.us").count(), 1, "input: {raw:?}");
        }
    }

    #[test]
    fn empty_input_yields_bare_suffix() {
        let f = PhoneFormatter::default();
        assert_eq!(f.normalize(""), "@c.us");
    }

    #[test]
    fn custom_country_code() {
        let f = PhoneFormatter::new("44", "@c.us");
        assert_eq!(f.normalize("07700900123"), "447700900123@c.us");
    }

    #[test]
    fn validator_accepts_only_length_twelve() {
        for len in 0..20 {
            let raw = "8".repeat(len);
            assert_eq!(is_valid_phone_number(&raw), len == 12, "len {len}");
        }
    }

    #[test]
    fn validator_ignores_content() {
        assert!(is_valid_phone_number("abcdefghijkl"));
        assert!(!is_valid_phone_number("62811111111@c.us"));
    }
}
