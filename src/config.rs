// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::ParentPolicy;
use crate::error::{LoaderError, Result};
use crate::locking::{DEFAULT_LOCK_TIMEOUT_SECS, LOCK_TIMEOUT_ENV, LockTimeoutValue};
use crate::provider::ShutdownPolicy;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_PREFIX: &str = "UNITLOADER";
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LoaderConfig {
    #[serde(default)]
    pub locking: LockingConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub domain: DomainConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockingConfig {
    /// Seconds (`30`, `30s`), milliseconds (`250ms`) or `infinite`.
    #[serde(default = "default_timeout")]
    pub timeout: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

fn default_timeout() -> String {
    DEFAULT_LOCK_TIMEOUT_SECS.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl LockingConfig {
    /// Effective lock budget. `UNITLOADER_LOCK_TIMEOUT` wins over the
    /// configured value.
    pub fn timeout_value(&self) -> Result<LockTimeoutValue> {
        match std::env::var(LOCK_TIMEOUT_ENV) {
            Ok(value) => parse_timeout(LOCK_TIMEOUT_ENV, &value),
            Err(_) => self.configured_timeout(),
        }
    }

    fn configured_timeout(&self) -> Result<LockTimeoutValue> {
        parse_timeout("locking.timeout", &self.timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

fn parse_timeout(origin: &str, value: &str) -> Result<LockTimeoutValue> {
    LockTimeoutValue::from_str(value).map_err(|e| match e {
        LoaderError::ConfigError(msg) => LoaderError::ConfigError(format!("{origin}: {msg}")),
        other => other,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_cache_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainConfig {
    #[serde(default = "default_parent_policy")]
    pub default_parent_policy: String,

    #[serde(default)]
    pub shutdown: ShutdownPolicy,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            default_parent_policy: default_parent_policy(),
            shutdown: ShutdownPolicy::default(),
        }
    }
}

fn default_parent_policy() -> String {
    "before".to_string()
}

impl DomainConfig {
    pub fn parent_policy(&self) -> Result<ParentPolicy> {
        ParentPolicy::from_str(&self.default_parent_policy)
    }
}

impl LoaderConfig {
    /// Loads defaults, then `path` if it exists, then `UNITLOADER_*`
    /// environment overrides (`UNITLOADER_LOCKING__TIMEOUT=30`).
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            log::debug!("Loading configuration from {}", path.display());
        } else {
            log::debug!("Config file not found at {}, using defaults", path.display());
        }

        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| LoaderError::ConfigError(format!("Failed to load configuration: {e}")))?;

        let config: LoaderConfig = settings.try_deserialize().map_err(|e| {
            LoaderError::ConfigError(format!("Failed to parse configuration: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: LoaderConfig = toml::from_str(contents)
            .map_err(|e| LoaderError::ConfigError(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| LoaderError::ConfigError(format!("Failed to serialize config: {e}")))
    }

    fn validate(&self) -> Result<()> {
        self.locking.configured_timeout()?;
        self.domain.parent_policy()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    struct EnvGuard(&'static str);

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            unsafe { std::env::set_var(key, value) };
            Self(key)
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            unsafe { std::env::remove_var(self.0) };
        }
    }

    #[test]
    #[serial]
    fn test_default_config() {
        let config = LoaderConfig::default();
        assert_eq!(config.locking.timeout, "120");
        assert_eq!(config.locking.poll_interval(), Duration::from_millis(100));
        assert!(config.cache.enabled);
        assert_eq!(config.domain.shutdown, ShutdownPolicy::Unregister);
        assert_eq!(config.domain.parent_policy().unwrap(), ParentPolicy::before());

        assert_eq!(
            config.locking.timeout_value().unwrap(),
            LockTimeoutValue::from_secs(120)
        );
    }

    #[test]
    #[serial]
    fn test_load_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = LoaderConfig::load(&temp_dir.path().join("unitloader.toml")).unwrap();
        assert_eq!(config, LoaderConfig::default());
    }

    #[test]
    #[serial]
    fn test_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("unitloader.toml");
        fs::write(
            &path,
            r#"
[locking]
timeout = "infinite"

[domain]
shutdown = "garbage-collect"
"#,
        )
        .unwrap();

        let config = LoaderConfig::load(&path).unwrap();
        assert_eq!(config.locking.timeout, "infinite");
        assert_eq!(config.locking.poll_interval_ms, 100);
        assert!(config.cache.enabled);
        assert_eq!(config.domain.shutdown, ShutdownPolicy::GarbageCollect);

        assert!(config.locking.timeout_value().unwrap().is_infinite());
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("unitloader.toml");
        fs::write(&path, "[cache]\nenabled = true\n").unwrap();

        let _cache = EnvGuard::set("UNITLOADER_CACHE__ENABLED", "false");
        let _poll = EnvGuard::set("UNITLOADER_LOCKING__POLL_INTERVAL_MS", "25");
        let config = LoaderConfig::load(&path).unwrap();
        assert!(!config.cache.enabled);
        assert_eq!(config.locking.poll_interval_ms, 25);
    }

    #[test]
    #[serial]
    fn test_lock_timeout_env_wins() {
        let config = LoaderConfig::from_toml_str("[locking]\ntimeout = \"30\"\n").unwrap();
        assert_eq!(
            config.locking.timeout_value().unwrap(),
            LockTimeoutValue::from_secs(30)
        );

        let _timeout = EnvGuard::set(LOCK_TIMEOUT_ENV, "500ms");
        assert_eq!(
            config.locking.timeout_value().unwrap(),
            LockTimeoutValue::from_millis(500)
        );
    }

    #[test]
    #[serial]
    fn test_invalid_lock_timeout_env() {
        let _timeout = EnvGuard::set(LOCK_TIMEOUT_ENV, "soon");
        let err = LockingConfig::default().timeout_value().unwrap_err();
        assert!(matches!(
            err,
            LoaderError::ConfigError(ref msg) if msg.starts_with(LOCK_TIMEOUT_ENV)
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(LoaderConfig::from_toml_str("[locking]\ntimeout = \"later\"\n").is_err());
        assert!(
            LoaderConfig::from_toml_str("[domain]\ndefault_parent_policy = \"sideways\"\n")
                .is_err()
        );
        assert!(LoaderConfig::from_toml_str("[domain]\nshutdown = \"never\"\n").is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = LoaderConfig::default();
        config.domain.default_parent_policy = "after".to_string();
        config.cache.enabled = false;

        let reloaded = LoaderConfig::from_toml_str(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(reloaded, config);
        assert_eq!(
            reloaded.domain.parent_policy().unwrap(),
            ParentPolicy::after()
        );
    }
}
