use crate::errors::{ErrorKind, ZeoliteError, ZeoliteResult};

/// Name of the default scope every database starts with.
pub const DEFAULT_SCOPE: &str = "_default";

/// Name of the default collection inside the default scope.
pub const DEFAULT_COLLECTION: &str = "_default";

/// Maximum length of a collection or scope name.
pub const MAX_NAME_LENGTH: usize = 251;

fn is_valid_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '%'
}

fn validate_name(name: &str, what: &str) -> ZeoliteResult<()> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        log::error!("Invalid {} name '{}': must be 1-{} characters", what, name, MAX_NAME_LENGTH);
        return Err(ZeoliteError::new(
            &format!("Invalid {} name '{}': must be 1-{} characters", what, name, MAX_NAME_LENGTH),
            ErrorKind::InvalidParameter,
        ));
    }
    if name.starts_with('_') || name.starts_with('%') {
        log::error!("Invalid {} name '{}': cannot start with '_' or '%'", what, name);
        return Err(ZeoliteError::new(
            &format!("Invalid {} name '{}': cannot start with '_' or '%'", what, name),
            ErrorKind::InvalidParameter,
        ));
    }
    if let Some(c) = name.chars().find(|c| !is_valid_name_char(*c)) {
        log::error!("Invalid {} name '{}': illegal character '{}'", what, name, c);
        return Err(ZeoliteError::new(
            &format!("Invalid {} name '{}': illegal character '{}'", what, name, c),
            ErrorKind::InvalidParameter,
        ));
    }
    Ok(())
}

/// Validates a collection name.
///
/// Legal names are 1-251 characters from `[A-Za-z0-9_%-]` and must not start
/// with `_` or `%`. The reserved default name is exempt.
pub fn validate_collection_name(name: &str) -> ZeoliteResult<()> {
    if name == DEFAULT_COLLECTION {
        return Ok(());
    }
    validate_name(name, "collection")
}

/// Validates a scope name, with the same rule as collection names.
pub fn validate_scope_name(name: &str) -> ZeoliteResult<()> {
    if name == DEFAULT_SCOPE {
        return Ok(());
    }
    validate_name(name, "scope")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_collection_names() {
        assert!(validate_collection_name("users").is_ok());
        assert!(validate_collection_name("users-2024").is_ok());
        assert!(validate_collection_name("a").is_ok());
        assert!(validate_collection_name("UPPER_lower%9").is_ok());
    }

    #[test]
    fn test_default_names_are_exempt() {
        assert!(validate_collection_name(DEFAULT_COLLECTION).is_ok());
        assert!(validate_scope_name(DEFAULT_SCOPE).is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = validate_collection_name("").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_too_long_name_rejected() {
        let name = "a".repeat(MAX_NAME_LENGTH + 1);
        assert!(validate_collection_name(&name).is_err());
        let name = "a".repeat(MAX_NAME_LENGTH);
        assert!(validate_collection_name(&name).is_ok());
    }

    #[test]
    fn test_leading_underscore_rejected() {
        assert!(validate_collection_name("_users").is_err());
        assert!(validate_collection_name("%users").is_err());
        assert!(validate_scope_name("_custom").is_err());
    }

    #[test]
    fn test_illegal_characters_rejected() {
        assert!(validate_collection_name("users collection").is_err());
        assert!(validate_collection_name("users/2024").is_err());
        assert!(validate_collection_name("users.docs").is_err());
    }
}
