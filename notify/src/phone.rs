//! Ugandan phone number normalisation.

use crate::error::NotifyError;

/// Normalise a Ugandan number to `+256XXXXXXXXX`.
///
/// Accepts `0772123456`, `772123456`, `256772123456` and `+256 772 123 456`
/// style input. Other international numbers are passed through with a
/// leading `+`.
pub fn format_ug_phone(raw: &str) -> Result<String, NotifyError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 9 {
        return Err(NotifyError::InvalidPhone(raw.to_string()));
    }

    let formatted = if let Some(rest) = digits.strip_prefix("256") {
        format!("+256{rest}")
    } else if let Some(rest) = digits.strip_prefix('0') {
        format!("+256{rest}")
    } else if digits.len() == 9 {
        format!("+256{digits}")
    } else {
        format!("+{digits}")
    };
    Ok(formatted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_formats() {
        assert_eq!(format_ug_phone("0772123456").unwrap(), "+256772123456");
        assert_eq!(format_ug_phone("772123456").unwrap(), "+256772123456");
        assert_eq!(format_ug_phone("256772123456").unwrap(), "+256772123456");
        assert_eq!(format_ug_phone("+256 772 123-456").unwrap(), "+256772123456");
    }

    #[test]
    fn test_foreign_passthrough() {
        assert_eq!(format_ug_phone("+254712345678").unwrap(), "+254712345678");
    }

    #[test]
    fn test_rejects_short() {
        assert!(format_ug_phone("12345").is_err());
        assert!(format_ug_phone("").is_err());
    }
}
