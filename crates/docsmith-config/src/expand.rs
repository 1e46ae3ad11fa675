//! Environment variable expansion for configuration strings.

use crate::ConfigError;

/// Expand `${VAR}` and `${VAR:-default}` references in a string.
///
/// Values without `${` are returned unchanged, so bare `$VAR` text survives.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |var| -> Result<Option<String>, UnsetVar> {
        std::env::var(var)
            .map(Some)
            .map_err(|_| UnsetVar(var.to_owned()))
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{}}} not set", e.cause.0),
    })
}

/// Lookup failure carrying the variable name.
struct UnsetVar(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_with_default_uses_value() {
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::set_var("DOCSMITH_EXPAND_SET", "https://kroki.internal");
        }
        let result = expand_env("${DOCSMITH_EXPAND_SET:-https://kroki.io}", "diagrams.kroki_url");
        assert_eq!(result.unwrap(), "https://kroki.internal");
        unsafe {
            std::env::remove_var("DOCSMITH_EXPAND_SET");
        }
    }

    #[test]
    fn test_expand_with_default_uses_default() {
        let result = expand_env("${DOCSMITH_EXPAND_UNSET:-.cache/tmp}", "cache.dir").unwrap();
        assert_eq!(result, ".cache/tmp");
    }

    #[test]
    fn test_expand_embedded_var() {
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::set_var("DOCSMITH_EXPAND_HOST", "kroki.example.com");
        }
        let result = expand_env("https://${DOCSMITH_EXPAND_HOST}:8000", "diagrams.kroki_url");
        assert_eq!(result.unwrap(), "https://kroki.example.com:8000");
        unsafe {
            std::env::remove_var("DOCSMITH_EXPAND_HOST");
        }
    }

    #[test]
    fn test_expand_missing_var_error() {
        let err = expand_env("${DOCSMITH_EXPAND_MISSING}", "cache.dir").unwrap_err();
        assert!(matches!(err, ConfigError::EnvVar { .. }));
        assert!(err.to_string().contains("DOCSMITH_EXPAND_MISSING"));
        assert!(err.to_string().contains("cache.dir"));
    }

    #[test]
    fn test_bare_dollar_not_expanded() {
        assert_eq!(expand_env("build/$out", "cache.dir").unwrap(), "build/$out");
    }
}
