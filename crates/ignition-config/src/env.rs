//! Environment variable access.
//!
//! All bootstrap decisions read from an [`Environment`] snapshot rather than
//! from `std::env` directly, so a run sees one consistent view of the process
//! environment and tests can inject their own variables.

use std::collections::HashMap;

/// The fixed prefix every application honours.
pub const DEFAULT_PREFIX: &str = "APP";

/// A snapshot of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Captures the current process environment.
    ///
    /// Variables whose name or value is not valid Unicode are skipped.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    /// Builds an environment from explicit key/value pairs.
    ///
    /// # Example
    ///
    /// ```
    /// use ignition_config::Environment;
    ///
    /// let env = Environment::from_pairs([("APP_DEBUG", "1")]);
    /// assert_eq!(env.get("APP_DEBUG"), Some("1"));
    /// ```
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns the value of `key`, treating empty values as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Sets a variable in this snapshot (the process environment is untouched).
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Returns `true` if `key` holds a truthy debug flag (`"true"` or `"1"`).
    pub fn flag(&self, key: &str) -> bool {
        self.get(key)
            .map(str::to_lowercase)
            .is_some_and(|v| v == "true" || v == "1")
    }

    /// Looks `suffix` up under each prefix in order, returning the first hit.
    ///
    /// With prefixes `["APP", "MY_SVC"]` and suffix `"CONFIG_PATH"` this checks
    /// `APP_CONFIG_PATH` then `MY_SVC_CONFIG_PATH`.
    pub fn first<'a>(&'a self, prefixes: &[String], suffix: &str) -> Option<&'a str> {
        prefixes
            .iter()
            .find_map(|prefix| self.get(&format!("{prefix}_{suffix}")))
    }

    /// Iterates over every variable starting with `prefix_`.
    pub(crate) fn with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.vars
            .iter()
            .filter(move |(k, _)| {
                k.strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('_'))
            })
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Derives an environment prefix from an application name.
///
/// `-`, `.` and spaces become `_` and the result is uppercased.
///
/// # Example
///
/// ```
/// assert_eq!(ignition_config::sanitize_prefix("my-svc.v2 beta"), "MY_SVC_V2_BETA");
/// ```
pub fn sanitize_prefix(app_name: &str) -> String {
    app_name
        .chars()
        .map(|c| match c {
            '-' | '.' | ' ' => '_',
            other => other,
        })
        .collect::<String>()
        .to_uppercase()
}

/// Returns `["APP"]`, followed by the sanitized app prefix when it differs.
pub fn env_prefixes(app_name: &str) -> Vec<String> {
    let mut prefixes = vec![DEFAULT_PREFIX.to_string()];
    let own = sanitize_prefix(app_name);
    if !own.is_empty() && own != DEFAULT_PREFIX {
        prefixes.push(own);
    }
    prefixes
}

/// Parse a boolean from a string.
pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_ignores_empty_values() {
        let env = Environment::from_pairs([("APP_NAME", ""), ("APP_VERSION", "1.2.3")]);
        assert_eq!(env.get("APP_NAME"), None);
        assert_eq!(env.get("APP_VERSION"), Some("1.2.3"));
    }

    #[test]
    fn test_flag() {
        let env = Environment::from_pairs([
            ("A", "true"),
            ("B", "1"),
            ("C", "TRUE"),
            ("D", "yes"),
            ("E", "0"),
        ]);
        assert!(env.flag("A"));
        assert!(env.flag("B"));
        assert!(env.flag("C"));
        assert!(!env.flag("D"));
        assert!(!env.flag("E"));
        assert!(!env.flag("MISSING"));
    }

    #[test]
    fn test_first_respects_prefix_order() {
        let env = Environment::from_pairs([
            ("APP_CONFIG_PATH", "a.yaml"),
            ("SVC_CONFIG_PATH", "b.yaml"),
        ]);
        let prefixes = vec!["APP".to_string(), "SVC".to_string()];
        assert_eq!(env.first(&prefixes, "CONFIG_PATH"), Some("a.yaml"));

        let env = Environment::from_pairs([("SVC_CONFIG_PATH", "b.yaml")]);
        assert_eq!(env.first(&prefixes, "CONFIG_PATH"), Some("b.yaml"));
    }

    #[test]
    fn test_with_prefix_requires_separator() {
        let env = Environment::from_pairs([("APP_FOO", "1"), ("APPLE", "2"), ("XAPP_FOO", "3")]);
        let keys: Vec<_> = env.with_prefix("APP").map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["APP_FOO"]);
    }

    #[test]
    fn test_sanitize_prefix() {
        assert_eq!(sanitize_prefix("billing-api"), "BILLING_API");
        assert_eq!(sanitize_prefix("svc.v2"), "SVC_V2");
        assert_eq!(sanitize_prefix("my app"), "MY_APP");
    }

    #[test]
    fn test_env_prefixes() {
        assert_eq!(env_prefixes("billing-api"), vec!["APP", "BILLING_API"]);
        assert_eq!(env_prefixes("app"), vec!["APP"]);
        assert_eq!(env_prefixes(""), vec!["APP"]);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("On"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }
}
