//! # ONVIF client configuration
//!
//! This crate provides the configuration layer of the ONVIF client:
//! - Loading configuration from a YAML file
//! - Merging with the embedded default configuration
//! - Environment variable overrides
//! - Typed getters and setters for every client option
//! - Named device profiles (host, port, credentials)
//!
//! ## Usage
//!
//! ```no_run
//! use onvifconfig::get_config;
//!
//! let config = get_config();
//!
//! let digest = config.get_digest()?;
//! let wsdl_dir = config.get_wsdl_dir()?;
//!
//! config.set_adjust_clock(true)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde::Deserialize;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = include_str!("onvif.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load ONVIF client configuration"));
}

const ENV_CONFIG_DIR: &str = "ONVIF_CONFIG";
const ENV_PREFIX: &str = "ONVIF_CONFIG__";

const DEFAULT_WSDL_DIR: &str = "wsdl";
const DEFAULT_DIGEST: bool = true;
const DEFAULT_ADJUST_CLOCK: bool = false;
const DEFAULT_DAEMON: bool = false;
const DEFAULT_PULLPOINT: bool = true;
const DEFAULT_DISABLE_CACHE: bool = false;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_ONVIF_PORT: u16 = 80;

/// Generates a getter/setter pair for a bool value with a default
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

/// Generates a getter/setter pair for a u64 value with a default
macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<u64> {
            match self.get_value($path) {
                Ok(Value::Number(n)) => Ok(n.as_u64().unwrap_or($default)),
                Ok(Value::String(s)) => Ok(s.trim().parse().unwrap_or_else(|_| {
                    warn!(value = %s, default = $default, "Invalid number in configuration");
                    $default
                })),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: u64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Connection parameters of a named device stored under `devices:`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceProfile {
    pub host: String,
    #[serde(default = "default_onvif_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

fn default_onvif_port() -> u16 {
    DEFAULT_ONVIF_PORT
}

/// Configuration manager for the ONVIF client
///
/// Values live in a YAML tree guarded by a mutex. Every setter persists the
/// whole tree back to `config.yaml`.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(".onvif").exists() {
            return ".onvif".to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(".onvif");
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        ".onvif".to_string()
    }

    /// Creates the directory if needed and checks it is readable and writable
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
    /// 2. The `ONVIF_CONFIG` environment variable
    /// 3. `.onvif` in the current directory
    /// 4. `.onvif` in the user's home directory
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// The embedded defaults are merged with `config.yaml` (if present),
    /// keys are lower-cased, `ONVIF_CONFIG__*` environment overrides are
    /// applied and the merged result is written back.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut config_value = lower_keys_value(serde_yaml::from_str(DEFAULT_CONFIG)?);

        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file = %path, "Loaded config file");
            data
        } else {
            info!(config_file = %path, "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        let external_value = lower_keys_value(serde_yaml::from_slice(&yaml_data)?);
        merge_yaml(&mut config_value, &external_value);

        apply_env_overrides(&mut config_value, env::vars());

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    fn data(&self) -> Result<MutexGuard<'_, Value>> {
        self.data
            .lock()
            .map_err(|_| anyhow!("configuration lock poisoned"))
    }

    /// Directory holding `config.yaml`
    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let yaml = {
            let data = self.data()?;
            serde_yaml::to_string(&*data)?
        };
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// * `path` - keys from the root, e.g. `&["client", "digest"]`
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data()?;
            set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    /// Gets a configuration value at the specified path
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data()?;
        get_value_internal(&data, path)
    }

    /// Resolves a path relative to the configuration directory
    fn resolve_path(&self, dir_path: &str) -> PathBuf {
        let path = Path::new(dir_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(path)
        }
    }

    /// Directory holding the ONVIF WSDL documents
    ///
    /// Relative paths are resolved against the configuration directory. The
    /// directory is not created: a missing WSDL directory is reported by the
    /// client when a service is built.
    pub fn get_wsdl_dir(&self) -> Result<PathBuf> {
        let dir = match self.get_value(&["client", "wsdl_dir"]) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => DEFAULT_WSDL_DIR.to_string(),
        };
        Ok(self.resolve_path(&dir))
    }

    pub fn set_wsdl_dir(&self, directory: String) -> Result<()> {
        self.set_value(&["client", "wsdl_dir"], Value::String(directory))
    }

    /// Location handed to the SOAP transport for its parsed-WSDL cache
    pub fn get_cache_location(&self) -> Result<Option<PathBuf>> {
        match self.get_value(&["client", "cache", "location"]) {
            Ok(Value::String(s)) if !s.is_empty() => Ok(Some(self.resolve_path(&s))),
            _ => Ok(None),
        }
    }

    pub fn set_cache_location(&self, location: String) -> Result<()> {
        self.set_value(&["client", "cache", "location"], Value::String(location))
    }

    /// Cache expiry in days, `None` when the transport default applies
    pub fn get_cache_duration_days(&self) -> Result<Option<u32>> {
        match self.get_value(&["client", "cache", "duration_days"]) {
            Ok(Value::Number(n)) => Ok(n.as_u64().and_then(|d| u32::try_from(d).ok())),
            Ok(Value::String(s)) => Ok(s.trim().parse().ok()),
            _ => Ok(None),
        }
    }

    pub fn set_cache_duration_days(&self, days: Option<u32>) -> Result<()> {
        let value = match days {
            Some(d) => Value::Number(Number::from(d)),
            None => Value::Null,
        };
        self.set_value(&["client", "cache", "duration_days"], value)
    }

    impl_bool_config!(get_digest, set_digest, &["client", "digest"], DEFAULT_DIGEST);

    impl_bool_config!(
        get_adjust_clock,
        set_adjust_clock,
        &["client", "adjust_clock"],
        DEFAULT_ADJUST_CLOCK
    );

    impl_bool_config!(get_daemon, set_daemon, &["client", "daemon"], DEFAULT_DAEMON);

    impl_bool_config!(
        get_pullpoint,
        set_pullpoint,
        &["client", "pullpoint"],
        DEFAULT_PULLPOINT
    );

    impl_bool_config!(
        get_disable_cache,
        set_disable_cache,
        &["client", "cache", "disable"],
        DEFAULT_DISABLE_CACHE
    );

    impl_u64_config!(
        get_http_timeout_secs,
        set_http_timeout_secs,
        &["client", "http_timeout_secs"],
        DEFAULT_HTTP_TIMEOUT_SECS
    );

    /// Reads the named device profile under `devices.<name>`
    pub fn get_device(&self, name: &str) -> Result<DeviceProfile> {
        let value = self.get_value(&["devices", name])?;
        serde_yaml::from_value(value).map_err(|e| anyhow!("Invalid device profile {name}: {e}"))
    }

    /// Stores a named device profile
    pub fn set_device(&self, name: &str, profile: &DeviceProfile) -> Result<()> {
        let mut map = Mapping::new();
        map.insert("host".into(), Value::String(profile.host.clone()));
        map.insert("port".into(), Value::Number(Number::from(profile.port)));
        map.insert("user".into(), Value::String(profile.user.clone()));
        map.insert("password".into(), Value::String(profile.password.clone()));
        self.set_value(&["devices", name], Value::Mapping(map))
    }

    /// Names of every stored device profile
    pub fn device_names(&self) -> Result<Vec<String>> {
        match self.get_value(&["devices"]) {
            Ok(Value::Mapping(map)) => Ok(map
                .keys()
                .filter_map(|k| k.as_str().map(str::to_string))
                .collect()),
            _ => Ok(Vec::new()),
        }
    }
}

/// Returns the global configuration instance, loaded on first access
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
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
            set_value_internal(entry, &path[1..], value)?;
        }
        Ok(())
    } else {
        Err(anyhow!("Current node is not a map"))
    }
}

fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
    let mut current = data;
    for (i, key) in path.iter().enumerate() {
        if let Value::Mapping(map) = current {
            match map.get(Value::String(key.to_lowercase())) {
                Some(next) => current = next,
                None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
            }
        } else {
            return Err(anyhow!("Path {} is not a mapping", path[..i].join(".")));
        }
    }
    Ok(current.clone())
}

/// Applies `ONVIF_CONFIG__A__B=value` variables onto the tree
fn apply_env_overrides<I>(config: &mut Value, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let key_path = stripped.split("__").collect::<Vec<_>>();
            let yaml_value = convert_env_value(&value);
            if let Err(err) = set_value_internal(config, &key_path, yaml_value) {
                warn!(variable = %key, "Ignoring environment override: {}", err);
            }
        }
    }
}

fn convert_env_value(value: &str) -> Value {
    serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut new_map = Mapping::new();
            for (k, v) in map {
                let key = match k {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                };
                new_map.insert(key, lower_keys_value(v));
            }
            Value::Mapping(new_map)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        _ => value,
    }
}

/// Merges external YAML configuration into the defaults
///
/// Mappings are merged key by key, scalars and sequences are replaced.
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

    fn load_in(dir: &tempfile::TempDir) -> Config {
        Config::load_config(dir.path().to_str().unwrap()).unwrap()
    }

    #[test]
    fn defaults_are_loaded_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_in(&dir);

        assert!(config.get_digest().unwrap());
        assert!(!config.get_adjust_clock().unwrap());
        assert!(config.get_pullpoint().unwrap());
        assert_eq!(config.get_http_timeout_secs().unwrap(), 30);
        assert_eq!(config.get_cache_duration_days().unwrap(), None);
        assert_eq!(config.get_wsdl_dir().unwrap(), dir.path().join("wsdl"));
        assert!(dir.path().join("config.yaml").exists());
    }

    #[test]
    fn external_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.yaml"),
            "Client:\n  Digest: false\n  WSDL_DIR: /opt/onvif/wsdl\n  cache:\n    duration_days: 7\n",
        )
        .unwrap();

        let config = load_in(&dir);
        assert!(!config.get_digest().unwrap());
        assert_eq!(config.get_wsdl_dir().unwrap(), PathBuf::from("/opt/onvif/wsdl"));
        assert_eq!(config.get_cache_duration_days().unwrap(), Some(7));
        // untouched defaults survive the merge
        assert!(config.get_pullpoint().unwrap());
    }

    #[test]
    fn setters_are_written_back() {
        let dir = tempfile::tempdir().unwrap();
        {
            let config = load_in(&dir);
            config.set_adjust_clock(true).unwrap();
            config.set_http_timeout_secs(5).unwrap();
            config
                .set_device(
                    "garage",
                    &DeviceProfile {
                        host: "10.0.0.5".into(),
                        port: 8080,
                        user: "admin".into(),
                        password: "secret".into(),
                    },
                )
                .unwrap();
        }

        let reloaded = load_in(&dir);
        assert!(reloaded.get_adjust_clock().unwrap());
        assert_eq!(reloaded.get_http_timeout_secs().unwrap(), 5);
        let device = reloaded.get_device("garage").unwrap();
        assert_eq!(device.host, "10.0.0.5");
        assert_eq!(device.port, 8080);
        assert_eq!(reloaded.device_names().unwrap(), vec!["garage".to_string()]);
    }

    #[test]
    fn device_profile_port_defaults_to_80() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_in(&dir);
        let mut map = Mapping::new();
        map.insert("host".into(), Value::String("cam.local".into()));
        config
            .set_value(&["devices", "lobby"], Value::Mapping(map))
            .unwrap();

        let device = config.get_device("lobby").unwrap();
        assert_eq!(device.port, 80);
        assert!(device.user.is_empty());
        assert!(config.get_device("missing").is_err());
    }

    #[test]
    fn env_overrides_follow_double_underscore_paths() {
        let mut value: Value = serde_yaml::from_str(DEFAULT_CONFIG).unwrap();
        apply_env_overrides(
            &mut value,
            vec![
                ("ONVIF_CONFIG__CLIENT__DAEMON".to_string(), "true".to_string()),
                ("ONVIF_CONFIG__CLIENT__CACHE__LOCATION".to_string(), "/var/cache/onvif".to_string()),
                ("UNRELATED".to_string(), "1".to_string()),
            ],
        );

        assert_eq!(
            get_value_internal(&value, &["client", "daemon"]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            get_value_internal(&value, &["client", "cache", "location"]).unwrap(),
            Value::String("/var/cache/onvif".into())
        );
        assert!(get_value_internal(&value, &["unrelated"]).is_err());
    }

    #[test]
    fn merge_replaces_scalars_and_keeps_missing_keys() {
        let mut default: Value = serde_yaml::from_str("a: 1\nb:\n  c: 2\n  d: 3\n").unwrap();
        let external: Value = serde_yaml::from_str("b:\n  c: 20\ne: 5\n").unwrap();
        merge_yaml(&mut default, &external);

        assert_eq!(get_value_internal(&default, &["a"]).unwrap(), Value::from(1));
        assert_eq!(get_value_internal(&default, &["b", "c"]).unwrap(), Value::from(20));
        assert_eq!(get_value_internal(&default, &["b", "d"]).unwrap(), Value::from(3));
        assert_eq!(get_value_internal(&default, &["e"]).unwrap(), Value::from(5));
    }
}
