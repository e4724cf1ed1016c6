//! Idempotency keys for processor calls.
//!
//! A client retrying the same logical action must send the same key, so keys
//! are derived from the intent itself (UUIDv5) unless the caller brings one.

use uuid::Uuid;

use crate::error::{RelayError, Result, ValidationCode};

/// Longest key Square accepts on its create endpoints.
pub const MAX_KEY_LEN: usize = 45;

const NAMESPACE: Uuid = Uuid::from_u128(0x5c1f_7e0a_2d4b_4c8e_9a61_3b0f_d2e7_a914);

/// Key for a deterministic intent string.
pub fn derive_key(intent: &str) -> String {
    Uuid::new_v5(&NAMESPACE, intent.as_bytes()).to_string()
}

/// The forwarded profile fields are part of the intent: Square rejects a
/// reused key whose request body differs from the first use.
pub fn customer_key(
    user_id: &str,
    given_name: Option<&str>,
    family_name: Option<&str>,
    email: Option<&str>,
) -> String {
    let given = given_name.unwrap_or_default();
    let family = family_name.unwrap_or_default();
    let email = email.unwrap_or_default();
    derive_key(&format!("customer:{user_id}:{given}:{family}:{email}"))
}

pub fn card_key(customer_id: &str, nonce: &str) -> String {
    derive_key(&format!("card:{customer_id}:{nonce}"))
}

/// A single-use token can fund exactly one payment, so the token, amount
/// and currency identify the intent.
pub fn token_payment_key(source_id: &str, amount: i64, currency: &str) -> String {
    derive_key(&format!("payment:token:{source_id}:{amount}:{currency}"))
}

/// Fresh key for intents that cannot be told apart from a deliberate repeat.
pub fn random_key() -> String {
    Uuid::new_v4().to_string()
}

/// Check a caller-supplied key. It is used verbatim, never trimmed.
pub fn validate_caller_key(key: &str) -> Result<&str> {
    let len = key.chars().count();
    if len == 0 || len > MAX_KEY_LEN {
        return Err(RelayError::validation(
            ValidationCode::BadIdempotencyKey,
            format!("idempotency_key must be 1 to {MAX_KEY_LEN} characters"),
        ));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_keys_are_stable() {
        assert_eq!(customer_key("u1", None, None, None), customer_key("u1", None, None, None));
        assert_ne!(customer_key("u1", None, None, None), customer_key("u2", None, None, None));
        assert_eq!(card_key("c1", "cnon:abc"), card_key("c1", "cnon:abc"));
    }

    #[test]
    fn test_customer_key_follows_forwarded_fields() {
        let first = customer_key("u1", Some("Ada"), None, Some("ada@example.com"));
        let same = customer_key("u1", Some("Ada"), None, Some("ada@example.com"));
        let changed = customer_key("u1", Some("Ada"), None, Some("ada@work.example"));

        assert_eq!(first, same);
        assert_ne!(first, changed);
    }

    #[test]
    fn test_intents_do_not_collide() {
        assert_ne!(
            token_payment_key("cnon:abc", 1000, "USD"),
            token_payment_key("cnon:abc", 1001, "USD")
        );
        assert_ne!(
            token_payment_key("cnon:abc", 1000, "USD"),
            token_payment_key("cnon:abc", 1000, "CAD")
        );
    }

    #[test]
    fn test_keys_fit_square_limit() {
        let long_user = "a-very-long-user-id-from-the-auth-provider";
        assert!(customer_key(long_user, Some("Ada"), None, None).len() <= MAX_KEY_LEN);
        assert!(random_key().len() <= MAX_KEY_LEN);
        assert_ne!(random_key(), random_key());
    }

    #[test]
    fn test_caller_key_bounds() {
        assert_eq!(validate_caller_key(" k ").unwrap(), " k ");
        assert!(validate_caller_key("").is_err());
        let too_long = "x".repeat(MAX_KEY_LEN + 1);
        let err = validate_caller_key(&too_long).unwrap_err();
        assert_eq!(err.validation_code(), Some(ValidationCode::BadIdempotencyKey));
        assert!(validate_caller_key(&"x".repeat(MAX_KEY_LEN)).is_ok());
    }
}
