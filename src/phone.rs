//! Phone number normalization for phone sign-in.
//!
//! Input is whatever the user typed ("(555) 123-4567", "+91 98765 43210").
//! Output is an E.164 string the identity provider accepts.

use crate::error::SessionError;

/// Digits in a bare national number that gets the default country code.
const NATIONAL_DIGITS: usize = 10;
/// Accepted digit count after `+`. 15 is the E.164 maximum.
const MIN_INTERNATIONAL_DIGITS: usize = 10;
const MAX_INTERNATIONAL_DIGITS: usize = 15;

/// Normalize user input to `+<digits>`.
///
/// - A leading `+` means the country code is already present.
/// - Without `+`, only a bare 10-digit number is accepted; it gets
///   `default_country_code` prepended.
pub fn normalize_phone_number(
    input: &str,
    default_country_code: &str,
) -> Result<String, SessionError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SessionError::Validation(
            "Phone number is required".to_string(),
        ));
    }

    let explicit_country = trimmed.starts_with('+') || trimmed.starts_with("00");
    let mut digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if trimmed.starts_with("00") {
        digits.drain(..2);
    }

    if !explicit_country {
        if digits.len() != NATIONAL_DIGITS {
            return Err(SessionError::Validation(format!(
                "Phone number must be {} digits or include a country code (e.g. +1 555 123 4567)",
                NATIONAL_DIGITS
            )));
        }
        let country: String = default_country_code
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        digits = format!("{}{}", country, digits);
    }

    if !(MIN_INTERNATIONAL_DIGITS..=MAX_INTERNATIONAL_DIGITS).contains(&digits.len()) {
        return Err(SessionError::Validation(format!(
            "Phone number must have {} to {} digits including country code",
            MIN_INTERNATIONAL_DIGITS, MAX_INTERNATIONAL_DIGITS
        )));
    }

    Ok(format!("+{}", digits))
}

/// Check that a verification code is exactly six ASCII digits.
pub fn validate_verification_code(code: &str) -> Result<&str, SessionError> {
    let code = code.trim();
    if code.len() == 6 && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(code)
    } else {
        Err(SessionError::Validation(
            "Enter the 6-digit code sent to your phone".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_ten_digits_gets_default_country() {
        assert_eq!(
            normalize_phone_number("9876543210", "91").unwrap(),
            "+919876543210"
        );
        assert_eq!(
            normalize_phone_number("(555) 123-4567", "1").unwrap(),
            "+15551234567"
        );
    }

    #[test]
    fn test_explicit_country_code_kept() {
        assert_eq!(
            normalize_phone_number("+919876543210", "1").unwrap(),
            "+919876543210"
        );
        assert_eq!(
            normalize_phone_number(" +44 20 7946 0958 ", "1").unwrap(),
            "+442079460958"
        );
        assert_eq!(
            normalize_phone_number("0044 20 7946 0958", "1").unwrap(),
            "+442079460958"
        );
    }

    #[test]
    fn test_rejects_implausible_numbers() {
        for input in ["", "   ", "123", "919876543210", "+12345", "+1234567890123456"] {
            let err = normalize_phone_number(input, "1").unwrap_err();
            assert!(err.is_validation(), "{input:?} should fail validation");
        }
    }

    #[test]
    fn test_verification_code_shape() {
        assert_eq!(validate_verification_code(" 123456 ").unwrap(), "123456");
        assert!(validate_verification_code("12345").is_err());
        assert!(validate_verification_code("1234567").is_err());
        assert!(validate_verification_code("12a456").is_err());
    }
}
