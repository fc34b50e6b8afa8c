//! Conventional configuration resolution.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::env::{env_prefixes, Environment};
use crate::{ConfigError, ConfigLoader, Validate};

/// Base names tried for conventional configuration files, in order.
const BASE_NAMES: [&str; 1] = ["config"];

/// Extensions tried for conventional configuration files, in order.
const EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Suffix of the variables naming an explicit configuration file.
const CONFIG_PATH_SUFFIX: &str = "CONFIG_PATH";

/// Resolves an application's configuration from files and the environment.
///
/// Layers are applied in this order, each overriding fields set by the
/// previous one:
///
/// 1. `config.{yaml,yml,json}` then `<app-name>.{yaml,yml,json}` in the
///    search directory. Missing files are skipped.
/// 2. The files named by `APP_CONFIG_PATH` and `<PREFIX>_CONFIG_PATH`.
///    These must exist.
/// 3. Variables under `APP_` and, when distinct, `<PREFIX>_`.
///
/// The result is validated exactly once.
///
/// # Example
///
/// ```
/// use ignition_config::{ConfigResolver, Environment, Validate};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// struct Settings {
///     foo: String,
/// }
///
/// impl Validate for Settings {}
///
/// let env = Environment::from_pairs([("APP_FOO", "bar")]);
/// let resolver = ConfigResolver::new("demo", env).search_dir("/nonexistent");
/// let settings: Settings = resolver.resolve(Settings::default()).unwrap();
/// assert_eq!(settings.foo, "bar");
/// ```
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    app_name: String,
    env: Environment,
    search_dir: PathBuf,
}

impl ConfigResolver {
    /// Create a resolver for `app_name`, searching the working directory.
    pub fn new(app_name: impl Into<String>, env: Environment) -> Self {
        Self {
            app_name: app_name.into(),
            env,
            search_dir: PathBuf::from("."),
        }
    }

    /// Set the directory conventional files are looked up in.
    #[must_use]
    pub fn search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = dir.into();
        self
    }

    /// Returns the application name.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Conventional file candidates, in the order they are tried.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let app_name = self.app_name.as_str();
        BASE_NAMES
            .iter()
            .copied()
            .chain((!app_name.is_empty() && app_name != "config").then_some(app_name))
            .flat_map(|base| {
                EXTENSIONS
                    .iter()
                    .map(move |ext| self.search_dir.join(format!("{base}.{ext}")))
            })
            .collect()
    }

    /// Environment prefixes, in the order they are applied.
    pub fn env_prefixes(&self) -> Vec<String> {
        env_prefixes(&self.app_name)
    }

    /// Explicit configuration paths named by the environment.
    pub fn override_paths(&self) -> Vec<PathBuf> {
        self.env_prefixes()
            .iter()
            .filter_map(|prefix| self.env.get(&format!("{prefix}_{CONFIG_PATH_SUFFIX}")))
            .map(PathBuf::from)
            .collect()
    }

    /// Resolve the configuration on top of `base`.
    pub fn resolve<C>(&self, base: C) -> Result<C, ConfigError>
    where
        C: Serialize + DeserializeOwned + Validate,
    {
        let mut loader = ConfigLoader::new(base)?;

        for path in self.candidates() {
            if !path.is_file() {
                continue;
            }
            loader = loader.with_file(&path)?;
            log_loaded(&path);
        }

        for path in self.override_paths() {
            loader = loader.with_file(&path)?;
            log_loaded(&path);
        }

        for prefix in self.env_prefixes() {
            loader = loader.with_env(&prefix, &self.env)?;
        }

        loader.load()
    }
}

fn log_loaded(path: &Path) {
    tracing::debug!(path = %path.display(), "config file loaded");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_candidates_order() {
        let resolver = ConfigResolver::new("billing-api", Environment::default());
        assert_eq!(
            names(&resolver.candidates()),
            vec![
                "config.yaml",
                "config.yml",
                "config.json",
                "billing-api.yaml",
                "billing-api.yml",
                "billing-api.json",
            ]
        );
    }

    #[test]
    fn test_candidates_without_app_name() {
        let resolver = ConfigResolver::new("", Environment::default());
        assert_eq!(
            names(&resolver.candidates()),
            vec!["config.yaml", "config.yml", "config.json"]
        );
    }

    #[test]
    fn test_candidates_use_search_dir() {
        let resolver = ConfigResolver::new("svc", Environment::default()).search_dir("/etc/svc");
        assert!(resolver
            .candidates()
            .iter()
            .all(|p| p.starts_with("/etc/svc")));
    }

    #[test]
    fn test_override_paths_order() {
        let env = Environment::from_pairs([
            ("BILLING_API_CONFIG_PATH", "/b.yaml"),
            ("APP_CONFIG_PATH", "/a.yaml"),
        ]);
        let resolver = ConfigResolver::new("billing-api", env);
        assert_eq!(
            resolver.override_paths(),
            vec![PathBuf::from("/a.yaml"), PathBuf::from("/b.yaml")]
        );
    }

    #[test]
    fn test_env_prefixes() {
        let resolver = ConfigResolver::new("billing-api", Environment::default());
        assert_eq!(resolver.env_prefixes(), vec!["APP", "BILLING_API"]);
        assert_eq!(resolver.app_name(), "billing-api");
    }
}
