//! Alias generation and validation.

use rand::Rng;
use serde_json::json;

use crate::error::AppError;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Longest operator-chosen alias.
pub const MAX_ALIAS_LEN: usize = 64;

/// Aliases that would shadow service paths.
const RESERVED_ALIASES: &[&str] = &["stats", "health", "admin", "api", "404.html"];

/// Generates a random alias of `length` ASCII letters.
pub fn generate_alias(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Validates an operator-chosen alias.
///
/// # Rules
///
/// - 1 to 64 characters
/// - ASCII letters, digits, `-`, `_` and `.`
/// - cannot start with `-` or `.`
/// - cannot be a reserved path
///
/// # Errors
///
/// Returns [`AppError::Validation`] naming the violated rule.
pub fn validate_alias(alias: &str) -> Result<(), AppError> {
    if alias.is_empty() || alias.len() > MAX_ALIAS_LEN {
        return Err(AppError::bad_request(
            format!("Alias must be 1-{MAX_ALIAS_LEN} characters"),
            json!({ "provided_length": alias.len() }),
        ));
    }

    if !alias
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(AppError::bad_request(
            "Alias can only contain letters, digits, '-', '_' and '.'",
            json!({ "alias": alias }),
        ));
    }

    if alias.starts_with('-') || alias.starts_with('.') {
        return Err(AppError::bad_request(
            "Alias cannot start with '-' or '.'",
            json!({ "alias": alias }),
        ));
    }

    if RESERVED_ALIASES.contains(&alias) {
        return Err(AppError::bad_request(
            "This alias is reserved",
            json!({ "alias": alias }),
        ));
    }

    Ok(())
}
