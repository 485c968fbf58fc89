//! Account name validation and filesystem-safe names for log paths.

use std::collections::HashSet;

/// Account name validation errors with helpful messages
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AccountNameError {
    #[error("Account name is too short (minimum {min} characters)")]
    TooShort { min: usize },

    #[error("Account name is too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("Account name cannot start or end with whitespace")]
    InvalidWhitespace,

    #[error("Account name contains invalid characters: {chars}")]
    InvalidCharacters { chars: String },

    #[error("Account name contains path separators (/ or \\)")]
    PathTraversal,

    #[error("Account name is a reserved name")]
    Reserved,
}

/// Account name validation rules
#[derive(Debug, Clone)]
pub struct AccountNameRules {
    pub min_length: usize,
    pub max_length: usize,
    pub allow_spaces: bool,
}

impl Default for AccountNameRules {
    fn default() -> Self {
        AccountNameRules {
            min_length: 2,
            max_length: 16,
            allow_spaces: true,
        }
    }
}

/// Characters that may not appear in a file or directory name on any platform
/// the shard runs on.
pub const NOT_PATH_SAFE: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Names that are device files on Windows, plus staff-impersonation names.
fn reserved_names() -> HashSet<&'static str> {
    [
        "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7",
        "com8", "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
        "admin", "administrator", "gm", "seer", "counselor", "system",
    ]
    .iter()
    .copied()
    .collect()
}

/// Validate an account name according to the given rules
pub fn validate_account_name(name: &str, rules: &AccountNameRules) -> Result<String, AccountNameError> {
    let trimmed = name.trim();

    if trimmed != name {
        return Err(AccountNameError::InvalidWhitespace);
    }
    let length = trimmed.chars().count();
    if length < rules.min_length {
        return Err(AccountNameError::TooShort {
            min: rules.min_length,
        });
    }
    if length > rules.max_length {
        return Err(AccountNameError::TooLong {
            max: rules.max_length,
        });
    }

    if reserved_names().contains(trimmed.to_lowercase().as_str()) {
        return Err(AccountNameError::Reserved);
    }

    if trimmed.contains("..") || trimmed.contains('/') || trimmed.contains('\\') {
        return Err(AccountNameError::PathTraversal);
    }

    let invalid: Vec<char> = trimmed
        .chars()
        .filter(|&ch| {
            let ok = ch.is_ascii_alphanumeric()
                || ch == '_'
                || ch == '-'
                || ch == '.'
                || (ch == ' ' && rules.allow_spaces);
            !ok
        })
        .collect();
    if !invalid.is_empty() {
        let mut seen = HashSet::new();
        let chars: String = invalid.into_iter().filter(|c| seen.insert(*c)).collect();
        return Err(AccountNameError::InvalidCharacters { chars });
    }

    Ok(trimmed.to_string())
}

pub fn validate_default_account_name(name: &str) -> Result<String, AccountNameError> {
    validate_account_name(name, &AccountNameRules::default())
}

/// Make `text` usable as a single path component: trimmed, with every
/// character in [`NOT_PATH_SAFE`] replaced by `_`. Empty input becomes `empty`.
pub fn safe_path_component(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "empty".to_string();
    }
    trimmed
        .chars()
        .map(|c| if NOT_PATH_SAFE.contains(&c) { '_' } else { c })
        .collect()
}

/// Per-account log file name. The leading underscore keeps names like `con`
/// or `prn` from opening a device.
pub fn account_log_name(account: &str) -> String {
    format!("_{}.log", safe_path_component(account))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_name_validation() {
        assert!(validate_default_account_name("adam").is_ok());
        assert!(validate_default_account_name("Lord British").is_ok());
        assert!(validate_default_account_name("pix-ie_2.0").is_ok());

        assert_eq!(
            validate_default_account_name(" adam"),
            Err(AccountNameError::InvalidWhitespace)
        );
        assert_eq!(
            validate_default_account_name("a"),
            Err(AccountNameError::TooShort { min: 2 })
        );
        assert_eq!(
            validate_default_account_name("a-very-long-account"),
            Err(AccountNameError::TooLong { max: 16 })
        );
        assert_eq!(validate_default_account_name("CON"), Err(AccountNameError::Reserved));
        assert_eq!(
            validate_default_account_name("../etc"),
            Err(AccountNameError::PathTraversal)
        );
        assert!(matches!(
            validate_default_account_name("who?"),
            Err(AccountNameError::InvalidCharacters { chars }) if chars == "?"
        ));
    }

    #[test]
    fn test_spaces_can_be_disallowed() {
        let rules = AccountNameRules {
            allow_spaces: false,
            ..AccountNameRules::default()
        };
        assert!(validate_account_name("Lord British", &rules).is_err());
    }

    #[test]
    fn test_safe_path_component() {
        assert_eq!(safe_path_component("adam"), "adam");
        assert_eq!(safe_path_component(" a:b/c*d? "), "a_b_c_d_");
        assert_eq!(safe_path_component("<\"|>\\"), "_____");
        assert_eq!(safe_path_component("   "), "empty");
    }

    #[test]
    fn test_account_log_name() {
        assert_eq!(account_log_name("con"), "_con.log");
        assert_eq!(account_log_name("x/y"), "_x_y.log");
    }
}
