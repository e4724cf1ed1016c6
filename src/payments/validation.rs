//! Input checks that run before any outbound call.

use serde_json::Value;

use crate::error::{RelayError, Result, ValidationCode};

/// Tokens client SDKs and sample code send when tokenization never ran.
const PLACEHOLDER_TOKENS: &[&str] = &[
    "undefined",
    "null",
    "nonce",
    "token",
    "placeholder",
    "test",
    "your_nonce_here",
    "cnon:placeholder",
];

/// Real Square tokens are much longer than this.
pub const MIN_TOKEN_LEN: usize = 10;

pub const DEFAULT_CURRENCY: &str = "USD";

/// Return the trimmed value of a required field, or `MISSING_FIELD`.
pub fn require<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(RelayError::missing_field(field)),
    }
}

/// Treat blank strings as absent.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Reject empty, placeholder and truncated one-time tokens.
pub fn validate_source_token(token: &str) -> Result<&str> {
    let trimmed = token.trim();
    let lowered = trimmed.to_ascii_lowercase();

    if trimmed.is_empty() || PLACEHOLDER_TOKENS.contains(&lowered.as_str()) {
        return Err(RelayError::validation(
            ValidationCode::MissingNonce,
            "A card token from the payment form is required",
        ));
    }
    if trimmed.chars().count() < MIN_TOKEN_LEN {
        return Err(RelayError::validation(
            ValidationCode::MissingNonce,
            format!("Card token is too short (minimum {MIN_TOKEN_LEN} characters)"),
        ));
    }
    Ok(trimmed)
}

/// Parse an amount in minor units from a JSON integer or numeric string.
pub fn parse_amount(raw: Option<&Value>) -> Result<i64> {
    let bad = || {
        RelayError::validation(
            ValidationCode::BadAmount,
            "Amount must be a positive integer in minor currency units",
        )
    };

    let amount = match raw {
        Some(Value::Number(n)) => n.as_i64().ok_or_else(bad)?,
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| bad())?,
        _ => return Err(bad()),
    };

    if amount <= 0 {
        return Err(bad());
    }
    Ok(amount)
}

/// Default to USD and require a three-letter code.
pub fn normalize_currency(raw: Option<&str>) -> Result<String> {
    let Some(currency) = non_blank(raw) else {
        return Ok(DEFAULT_CURRENCY.to_string());
    };
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(RelayError::validation(
            ValidationCode::BadCurrency,
            format!("Unsupported currency code: {currency}"),
        ));
    }
    Ok(currency.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_rejects_blank() {
        assert_eq!(require("user_id", Some(" u1 ")).unwrap(), "u1");
        let err = require("user_id", Some("  ")).unwrap_err();
        assert_eq!(err.validation_code(), Some(ValidationCode::MissingField));
        assert!(require("user_id", None).is_err());
    }

    #[test]
    fn test_placeholder_tokens_rejected() {
        for token in ["undefined", "NULL", " Your_Nonce_Here ", "cnon:placeholder", ""] {
            let err = validate_source_token(token).unwrap_err();
            assert_eq!(err.validation_code(), Some(ValidationCode::MissingNonce), "{token}");
        }
    }

    #[test]
    fn test_short_token_rejected() {
        let err = validate_source_token("short").unwrap_err();
        assert_eq!(err.validation_code(), Some(ValidationCode::MissingNonce));
        assert_eq!(validate_source_token("cnon:card-nonce-ok").unwrap(), "cnon:card-nonce-ok");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(Some(&json!(1000))).unwrap(), 1000);
        assert_eq!(parse_amount(Some(&json!(" 250 "))).unwrap(), 250);

        for raw in [json!(0), json!(-5), json!("ten"), json!(10.5), json!(null), json!("")] {
            let err = parse_amount(Some(&raw)).unwrap_err();
            assert_eq!(err.validation_code(), Some(ValidationCode::BadAmount), "{raw}");
        }
        assert!(parse_amount(None).is_err());
    }

    #[test]
    fn test_currency() {
        assert_eq!(normalize_currency(None).unwrap(), "USD");
        assert_eq!(normalize_currency(Some("cad")).unwrap(), "CAD");
        let err = normalize_currency(Some("US1")).unwrap_err();
        assert_eq!(err.validation_code(), Some(ValidationCode::BadCurrency));
        assert!(normalize_currency(Some("dollars")).is_err());
    }
}
