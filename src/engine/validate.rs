use crate::error::AppError;

/// Trimmed value of a mandatory text field.
pub fn required(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

pub fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

pub fn email(value: &str) -> Result<String, AppError> {
    let email = required("email", value)?.to_lowercase();
    let plausible = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
        }
        None => false,
    };

    if !plausible || email.chars().any(char::is_whitespace) {
        return Err(AppError::BadRequest(format!("{value} is not a valid email")));
    }
    Ok(email)
}

/// Accepts an optional leading `+` followed by 7 to 15 digits; spaces,
/// dashes and parentheses are ignored.
pub fn phone(field: &str, value: &str) -> Result<String, AppError> {
    let phone = required(field, value)?;
    let body = phone.strip_prefix('+').unwrap_or(&phone);
    let mut digits = 0;

    for c in body.chars() {
        match c {
            '0'..='9' => digits += 1,
            ' ' | '-' | '(' | ')' => {}
            _ => {
                return Err(AppError::BadRequest(format!(
                    "{field} contains invalid character {c:?}"
                )));
            }
        }
    }

    if !(7..=15).contains(&digits) {
        return Err(AppError::BadRequest(format!(
            "{field} must contain between 7 and 15 digits"
        )));
    }
    Ok(phone)
}

/// Digits-only form of a validated phone number, used as its uniqueness key.
pub fn phone_key(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

pub fn non_negative(field: &str, value: f64) -> Result<f64, AppError> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::BadRequest(format!("{field} must be >= 0")));
    }
    Ok(value)
}

pub fn positive(field: &str, value: f64) -> Result<f64, AppError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(AppError::BadRequest(format!("{field} must be > 0")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::{email, non_negative, phone, phone_key, positive, required};

    #[test]
    fn required_trims() {
        assert_eq!(required("name", "  Ada ").unwrap(), "Ada");
        assert!(required("name", "   ").is_err());
    }

    #[test]
    fn email_is_lowercased_and_checked() {
        assert_eq!(email(" Ada@Example.COM ").unwrap(), "ada@example.com");
        assert!(email("ada.example.com").is_err());
        assert!(email("ada@localhost").is_err());
        assert!(email("@example.com").is_err());
    }

    #[test]
    fn phone_accepts_common_formats() {
        assert!(phone("phone", "+49 151 1234-5678").is_ok());
        assert!(phone("phone", "(030) 1234567").is_ok());
        assert!(phone("phone", "12345").is_err());
        assert!(phone("phone", "+49 151 CALL-ME").is_err());
    }

    #[test]
    fn phone_key_ignores_formatting() {
        assert_eq!(phone_key("+49 151 1234-5678"), "4915112345678");
        assert_eq!(phone_key("+4915112345678"), phone_key("+49 (151) 1234 5678"));
    }

    #[test]
    fn amounts_reject_nan_and_negatives() {
        assert!(non_negative("fee", 0.0).is_ok());
        assert!(non_negative("fee", -0.01).is_err());
        assert!(positive("weight", 0.0).is_err());
        assert!(positive("weight", f64::NAN).is_err());
    }
}
