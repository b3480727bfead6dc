//! Contact detail validation.

use std::sync::LazyLock;

use regex::Regex;

/// Optional `+`, a leading digit 1-9, 2 to 15 digits in total.
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("valid phone regex"));

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+$").expect("valid email regex")
});

pub fn is_valid_phone(input: &str) -> bool {
    PHONE.is_match(input)
}

pub fn is_valid_email(input: &str) -> bool {
    EMAIL.is_match(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phones() {
        for ok in ["+14155552671", "14155552671", "12", "+123456789012345"] {
            assert!(is_valid_phone(ok), "{ok} should be valid");
        }
        for bad in [
            "",
            "+",
            "1",
            "0123456",
            "+0123456",
            "1234567890123456",
            "+1 415 555",
            "abc",
            "+1-415",
        ] {
            assert!(!is_valid_phone(bad), "{bad} should be invalid");
        }
    }

    #[test]
    fn emails() {
        for ok in ["a@b.co", "first.last+tag@mail-host.example.org", "x_y@z.io"] {
            assert!(is_valid_email(ok), "{ok} should be valid");
        }
        for bad in ["", "plain", "@b.co", "a@b", "a@.co", "a b@c.de", "a@b.co "] {
            assert!(!is_valid_email(bad), "{bad} should be invalid");
        }
    }
}
