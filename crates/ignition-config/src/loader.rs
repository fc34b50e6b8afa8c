//! Layered configuration loader.
//!
//! The [`ConfigLoader`] accumulates configuration layers as a JSON value tree
//! and decodes the result into the caller's configuration type once every
//! layer has been applied. Later layers override earlier ones field by field.

use std::fs;
use std::marker::PhantomData;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::env::{parse_bool, Environment};
use crate::{ConfigError, Validate};

/// A supported configuration file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// YAML (`.yaml`, `.yml`).
    Yaml,
    /// JSON (`.json`).
    Json,
    /// TOML (`.toml`).
    Toml,
}

impl Format {
    /// Detects the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        Self::from_name(&ext)
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))
    }

    /// Looks a format up by name or extension.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Yaml => "YAML",
            Self::Json => "JSON",
            Self::Toml => "TOML",
        }
    }

    fn parse(self, content: &str, origin: &str) -> Result<Value, ConfigError> {
        let value = match self {
            Self::Yaml => {
                // An empty YAML document means "no overrides".
                if content.trim().is_empty() {
                    return Ok(Value::Object(Map::new()));
                }
                serde_yaml::from_str(content)
                    .map_err(|e| ConfigError::parse(self.label(), origin, e))?
            }
            Self::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::parse(self.label(), origin, e))?,
            Self::Toml => toml::from_str(content)
                .map_err(|e| ConfigError::parse(self.label(), origin, e))?,
        };
        Ok(value)
    }
}

/// Configuration loader with layered approach.
///
/// Layers are applied in call order on top of the base value:
/// 1. The base (usually `C::default()`)
/// 2. Configuration files or strings (YAML, JSON or TOML)
/// 3. Environment variables under one or more prefixes
///
/// # Example
///
/// ```
/// use ignition_config::{ConfigLoader, Environment, Validate};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// struct Settings {
///     name: String,
///     port: u16,
/// }
///
/// impl Validate for Settings {}
///
/// let env = Environment::from_pairs([("APP_PORT", "8080")]);
/// let settings: Settings = ConfigLoader::new(Settings::default())
///     .unwrap()
///     .with_string("name: demo\nport: 80", "yaml")
///     .unwrap()
///     .with_env("APP", &env)
///     .unwrap()
///     .load()
///     .unwrap();
///
/// assert_eq!(settings.name, "demo");
/// assert_eq!(settings.port, 8080);
/// ```
#[derive(Debug)]
pub struct ConfigLoader<C> {
    value: Value,
    _config: PhantomData<fn() -> C>,
}

impl<C> ConfigLoader<C>
where
    C: Serialize + DeserializeOwned + Validate,
{
    /// Create a loader seeded with `base`.
    pub fn new(base: C) -> Result<Self, ConfigError> {
        let value = serde_json::to_value(&base).map_err(ConfigError::Decode)?;
        Ok(Self {
            value,
            _config: PhantomData,
        })
    }

    /// Load configuration from a file.
    ///
    /// The format is determined by the file extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The file does not exist ([`ConfigError::FileNotFound`])
    /// - The file cannot be read
    /// - The extension is not a supported format
    /// - The content is malformed
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.is_file() {
            return Err(ConfigError::file_not_found(path));
        }

        let format = Format::from_path(path)?;
        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let layer = format.parse(&content, &path.display().to_string())?;
        self.apply(layer);

        Ok(self)
    }

    /// Load configuration from an optional file.
    ///
    /// If the file exists, loads it. If not, silently continues.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().is_file() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the named format.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let format =
            Format::from_name(format).ok_or_else(|| ConfigError::UnsupportedFormat(format.into()))?;
        let layer = format.parse(content, "<string>")?;
        self.apply(layer);
        Ok(self)
    }

    /// Apply environment variable overrides under `prefix`.
    ///
    /// Every field of the current value tree maps to a variable named
    /// `PREFIX_FIELD`, nested fields joined with `_`
    /// (`server.read_timeout` becomes `APP_SERVER_READ_TIMEOUT`). Values are
    /// coerced to the type the field already holds; unset or empty
    /// variables leave the field untouched.
    pub fn with_env(mut self, prefix: &str, env: &Environment) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        if self.value.is_null() || env.with_prefix(&prefix).next().is_none() {
            return Ok(self);
        }
        apply_env(&mut self.value, &prefix, env)?;
        Ok(self)
    }

    /// Finalize, decode and validate the configuration.
    ///
    /// [`Validate::validate`] is invoked exactly once, after every layer.
    pub fn load(self) -> Result<C, ConfigError> {
        let config: C = serde_json::from_value(self.value).map_err(ConfigError::Decode)?;
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Finalize without validation.
    pub fn load_unvalidated(self) -> Result<C, ConfigError> {
        serde_json::from_value(self.value).map_err(ConfigError::Decode)
    }

    // A base that serializes to null (`()`) has no fields for a layer to
    // fill. Layers are still parsed so malformed files keep failing.
    fn apply(&mut self, layer: Value) {
        if !self.value.is_null() {
            merge(&mut self.value, layer);
        }
    }
}

// Objects merge key by key; anything else is replaced.
fn merge(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

fn apply_env(node: &mut Value, name: &str, env: &Environment) -> Result<(), ConfigError> {
    match node {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let var = format!("{name}_{}", key.to_uppercase());
                apply_env(child, &var, env)?;
            }
            Ok(())
        }
        leaf => {
            if let Some(raw) = env.get(name) {
                *leaf = coerce(leaf, name, raw)?;
            }
            Ok(())
        }
    }
}

fn coerce(current: &Value, var: &str, raw: &str) -> Result<Value, ConfigError> {
    let value = match current {
        Value::String(_) => Value::String(raw.to_string()),
        Value::Bool(_) => Value::Bool(
            parse_bool(raw).ok_or_else(|| ConfigError::env_parse(var, "expected boolean"))?,
        ),
        Value::Number(_) => raw
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| raw.parse::<u64>().map(Value::from))
            .ok()
            .or_else(|| {
                raw.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
            })
            .ok_or_else(|| ConfigError::env_parse(var, "expected number"))?,
        Value::Array(_) => match serde_json::from_str::<Value>(raw) {
            Ok(array @ Value::Array(_)) => array,
            _ => Value::Array(
                raw.split(',')
                    .map(|s| Value::String(s.trim().to_string()))
                    .collect(),
            ),
        },
        // Unset optional field. JSON literals keep their type, anything else
        // is taken as a string.
        Value::Null | Value::Object(_) => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        }
    };
    Ok(value)
}
