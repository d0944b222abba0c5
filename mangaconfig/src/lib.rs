//! # MangaShelf Configuration Module
//!
//! This module provides configuration management for MangaShelf, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Typed getters and setters for configuration values
//! - Thread-safe singleton access pattern
//!
//! ## Usage
//!
//! ```no_run
//! use mangaconfig::get_config;
//!
//! let config = get_config();
//! let level = config.get_log_min_level()?;
//! let cache_dir = config.get_cache_dir()?;
//!
//! config.set_log_enable_console(false)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex},
};
use tracing::info;

// Embedded default configuration
const DEFAULT_CONFIG: &str = include_str!("mangashelf.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load MangaShelf configuration"));
}

const ENV_CONFIG_DIR: &str = "MANGASHELF_CONFIG";
const ENV_PREFIX: &str = "MANGASHELF_CONFIG__";
const CONFIG_DIR_NAME: &str = ".mangashelf";

const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;
const DEFAULT_CACHE_DIR: &str = "cache";

/// Generates a getter/setter pair for `u64` values with a default
#[macro_export]
macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        fn $getter(&self) -> anyhow::Result<u64> {
            match self.get_value($path) {
                Ok(serde_yaml::Value::Number(n)) if n.is_u64() => Ok(n.as_u64().unwrap_or($default)),
                Ok(serde_yaml::Value::String(s)) => Ok(s.trim().parse().unwrap_or($default)),
                _ => Ok($default),
            }
        }

        fn $setter(&self, value: u64) -> anyhow::Result<()> {
            self.set_value($path, serde_yaml::Value::Number(serde_yaml::Number::from(value)))
        }
    };
}

/// Generates a getter/setter pair for `usize` values with a default
#[macro_export]
macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        fn $getter(&self) -> anyhow::Result<usize> {
            match self.get_value($path) {
                Ok(serde_yaml::Value::Number(n)) if n.is_u64() => {
                    Ok(n.as_u64().map(|v| v as usize).unwrap_or($default))
                }
                Ok(serde_yaml::Value::String(s)) => Ok(s.trim().parse().unwrap_or($default)),
                _ => Ok($default),
            }
        }

        fn $setter(&self, value: usize) -> anyhow::Result<()> {
            self.set_value(
                $path,
                serde_yaml::Value::Number(serde_yaml::Number::from(value as u64)),
            )
        }
    };
}

/// Generates a getter/setter pair for `bool` values with a default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Configuration manager for MangaShelf
///
/// Holds the merged YAML tree behind a mutex and persists every change to
/// `config.yaml` inside the configuration directory.
///
/// # Examples
///
/// ```no_run
/// use mangaconfig::get_config;
///
/// let config = get_config();
/// let level = config.get_log_min_level()?;
/// println!("log level: {}", level);
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.data.lock().unwrap().clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        // 1. Provided directory
        if !directory.is_empty() {
            return directory.to_string();
        }

        // 2. Environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        // 3. Current directory
        if Path::new(CONFIG_DIR_NAME).exists() {
            return CONFIG_DIR_NAME.to_string();
        }

        // 4. Home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        CONFIG_DIR_NAME.to_string()
    }

    /// Creates the directory if needed and checks read/write access
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `MANGASHELF_CONFIG` environment variable
    /// 3. `.mangashelf` in the current directory
    /// 4. `.mangashelf` in the user's home directory
    ///
    /// The directory is created if it doesn't exist, and validated for
    /// read/write permissions.
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file = %path, "Loaded config file");
            data
        } else {
            info!(config_file = %path, "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        merge_yaml(&mut default_value, &external_value);
        let mut config_value = Self::lower_keys_value(default_value);

        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Returns the configuration directory in use
    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let data = self.data.lock().unwrap();
        let yaml = serde_yaml::to_string(&*data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// `path` is an array of keys, e.g. `&["content", "base_url"]`.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        Self::set_value_internal(&mut data, path, value)?;
        drop(data);
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// Returns an error if any segment of the path does not exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock().unwrap();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                if let Some(next) = map.get(&Value::String(key.to_lowercase())) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a mapping", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    /// Reads a string value, falling back to `default` when missing or not a string
    pub fn get_string_or(&self, path: &[&str], default: &str) -> String {
        match self.get_value(path) {
            Ok(Value::String(s)) => s,
            Ok(Value::Number(n)) => n.to_string(),
            _ => default.to_string(),
        }
    }

    /// Reads a list of strings; scalars are accepted as a one-element list
    pub fn get_string_list(&self, path: &[&str]) -> Result<Vec<String>> {
        match self.get_value(path)? {
            Value::Sequence(items) => Ok(items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect()),
            Value::String(s) if !s.is_empty() => Ok(vec![s]),
            Value::Null => Ok(Vec::new()),
            _ => Err(anyhow!("{} is not a list", path.join("."))),
        }
    }

    /// Replaces a list of strings
    pub fn set_string_list(&self, path: &[&str], values: &[String]) -> Result<()> {
        let seq = values.iter().cloned().map(Value::String).collect();
        self.set_value(path, Value::Sequence(seq))
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                let _ = Self::set_value_internal(config, &key_path, yaml_value);
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let new_val = Self::lower_keys_value(v);
                    if let Value::String(s) = k {
                        new_map.insert(Value::String(s.to_lowercase()), new_val);
                    } else {
                        new_map.insert(k, new_val);
                    }
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Resolves a relative or absolute path and creates the directory if needed
    fn resolve_and_create_dir(&self, dir_path: &str) -> Result<String> {
        let path = Path::new(dir_path);

        let absolute_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(path)
        };

        if !absolute_path.exists() {
            fs::create_dir_all(&absolute_path)?;
            info!(directory = %absolute_path.display(), "Created managed directory");
        }

        Ok(absolute_path.to_string_lossy().to_string())
    }

    /// Gets a directory managed by the configuration
    ///
    /// The directory may be absolute or relative to the configuration
    /// directory; it is created if missing. When the key is not set, `default`
    /// is written back to the configuration.
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<String> {
        let dir_path = match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => {
                self.set_managed_dir(path, default.to_string())?;
                default.to_string()
            }
        };
        self.resolve_and_create_dir(&dir_path)
    }

    /// Sets a directory managed by the configuration
    pub fn set_managed_dir(&self, path: &[&str], directory: String) -> Result<()> {
        self.set_value(path, Value::String(directory))
    }

    /// Directory holding the persistent resolution cache
    pub fn get_cache_dir(&self) -> Result<String> {
        self.get_managed_dir(&["cache", "directory"], DEFAULT_CACHE_DIR)
    }

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    /// Minimum log level (`TRACE`, `DEBUG`, `INFO`, `WARN`, `ERROR`)
    pub fn get_log_min_level(&self) -> Result<String> {
        match self.get_value(&["host", "logger", "min_level"]) {
            Ok(Value::String(s)) => Ok(s),
            _ => Ok(DEFAULT_LOG_MIN_LEVEL.to_string()),
        }
    }

    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }
}

/// Returns the global configuration instance, loaded lazily on first access
///
/// # Examples
///
/// ```no_run
/// use mangaconfig::get_config;
///
/// let config = get_config();
/// let level = config.get_log_min_level();
/// ```
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Merges external YAML configuration into default configuration
///
/// Mappings merge key by key; scalars and sequences from `external` replace
/// the default value.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_loaded() -> Result<()> {
        let dir = tempdir()?;
        let config = Config::load_config(dir.path().to_str().unwrap())?;

        assert_eq!(config.get_log_min_level()?, "INFO");
        assert!(config.get_log_enable_console()?);
        let candidates = config.get_string_list(&["content", "candidates"])?;
        assert!(candidates.contains(&"one-piece".to_string()));
        assert!(dir.path().join("config.yaml").exists());
        Ok(())
    }

    #[test]
    fn test_external_file_is_merged() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("config.yaml"),
            "content:\n  Base_URL: https://cdn.example.org/manga\n",
        )?;

        let config = Config::load_config(dir.path().to_str().unwrap())?;

        assert_eq!(
            config.get_string_or(&["content", "base_url"], ""),
            "https://cdn.example.org/manga"
        );
        // Untouched siblings keep their defaults
        assert_eq!(config.get_string_or(&["content", "sidecar_index"], ""), "index.json");
        Ok(())
    }

    #[test]
    fn test_set_value_persists() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().to_str().unwrap();
        {
            let config = Config::load_config(path)?;
            config.set_string_list(&["cache", "bypass"], &["cua_thu".to_string()])?;
            config.set_log_min_level("DEBUG".to_string())?;
        }

        let reloaded = Config::load_config(path)?;
        assert_eq!(reloaded.get_string_list(&["cache", "bypass"])?, vec!["cua_thu"]);
        assert_eq!(reloaded.get_log_min_level()?, "DEBUG");
        Ok(())
    }

    #[test]
    fn test_missing_path_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        let config = Config::load_config(dir.path().to_str().unwrap())?;
        assert!(config.get_value(&["content", "nope"]).is_err());
        assert_eq!(config.get_string_or(&["content", "nope"], "fallback"), "fallback");
        Ok(())
    }

    #[test]
    fn test_managed_dir_is_relative_to_config_dir() -> Result<()> {
        let dir = tempdir()?;
        let config = Config::load_config(dir.path().to_str().unwrap())?;
        let cache_dir = config.get_cache_dir()?;
        assert_eq!(Path::new(&cache_dir), dir.path().join("cache"));
        assert!(Path::new(&cache_dir).is_dir());
        Ok(())
    }

    #[test]
    fn test_merge_yaml_replaces_sequences() {
        let mut default: Value = serde_yaml::from_str("a:\n  b: [1, 2]\n  c: x\n").unwrap();
        let external: Value = serde_yaml::from_str("a:\n  b: [3]\n").unwrap();
        merge_yaml(&mut default, &external);
        let expected: Value = serde_yaml::from_str("a:\n  b: [3]\n  c: x\n").unwrap();
        assert_eq!(default, expected);
    }
}
