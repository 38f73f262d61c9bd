//! Environment variable utilities
//!
//! Used by `SelectConfig::from_env()` and the sample programs.
//!
//! ```ignore
//! use bal_core::env::{env_get, env_get_bool};
//!
//! let max_entries: usize = env_get("BAL_MAX_ENTRIES", 1023);
//! let flush = env_get_bool("BAL_LOG_FLUSH", false);
//! ```

use std::str::FromStr;

/// Parse `key` as `T`, or return `default` when unset or unparsable.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Parse `key` as a boolean.
///
/// "1", "true", "yes", "on" (any case) are true; "0", "false", "no",
/// "off" are false; anything else, or unset, yields `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// `Some(T)` if `key` is set and parses, `None` otherwise.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// String value of `key`, or `default`.
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__BAL_TEST_UNSET_VAR__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn test_env_get_opt_none() {
        let val: Option<u64> = env_get_opt("__BAL_TEST_UNSET_VAR__");
        assert!(val.is_none());
    }

    #[test]
    fn test_env_get_str_default() {
        assert_eq!(env_get_str("__BAL_TEST_UNSET_VAR__", "select"), "select");
    }

    #[test]
    fn test_env_get_with_set_var() {
        std::env::set_var("__BAL_TEST_NUM__", " 512 ");
        let val: usize = env_get("__BAL_TEST_NUM__", 0);
        assert_eq!(val, 512);
        std::env::remove_var("__BAL_TEST_NUM__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        std::env::set_var("__BAL_TEST_BOOL__", "YES");
        assert!(env_get_bool("__BAL_TEST_BOOL__", false));

        std::env::set_var("__BAL_TEST_BOOL__", "off");
        assert!(!env_get_bool("__BAL_TEST_BOOL__", true));

        // unrecognized keeps the default either way
        std::env::set_var("__BAL_TEST_BOOL__", "maybe");
        assert!(env_get_bool("__BAL_TEST_BOOL__", true));
        assert!(!env_get_bool("__BAL_TEST_BOOL__", false));

        std::env::remove_var("__BAL_TEST_BOOL__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__BAL_TEST_INVALID__", "lots");
        let val: usize = env_get("__BAL_TEST_INVALID__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__BAL_TEST_INVALID__");
    }
}
