// Varseal - Configuration
//
// Layered configuration loading with figment.
//
// Sources, highest precedence first:
//   1. Environment variables (`VARSEAL_*`, `__` separates sections)
//   2. Project-level `.varseal/config.toml`
//   3. User-level `~/.config/varseal/config.toml`
//   4. Built-in defaults
//
// `VARSEAL_LEGACY__HEAL_ON_READ=false` maps to `legacy.heal_on_read`.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enclave::{KeyringProvider, DEFAULT_KEYRING_SERVICE, DEFAULT_KEYRING_USER};
use crate::store::HookOptions;

const ENV_PREFIX: &str = "VARSEAL_";
const LOCAL_CONFIG: &str = ".varseal/config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(#[from] figment::Error),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct VarsealConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub legacy: LegacyConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding the database file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Database file name, relative to `data_dir`.
    #[serde(default = "default_db_file")]
    pub db_file: String,
}

fn default_data_dir() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("varseal")
}

fn default_db_file() -> String {
    "varseal.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_file: default_db_file(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KeysConfig {
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,

    #[serde(default = "default_keyring_user")]
    pub keyring_user: String,
}

fn default_keyring_service() -> String {
    DEFAULT_KEYRING_SERVICE.to_string()
}

fn default_keyring_user() -> String {
    DEFAULT_KEYRING_USER.to_string()
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            keyring_service: default_keyring_service(),
            keyring_user: default_keyring_user(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LegacyConfig {
    /// Clear an undecodable VCS document as soon as a read notices it.
    #[serde(default = "default_heal_on_read")]
    pub heal_on_read: bool,
}

const fn default_heal_on_read() -> bool {
    true
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            heal_on_read: default_heal_on_read(),
        }
    }
}

impl VarsealConfig {
    /// Load configuration from every source.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Build the provider chain with the standard file locations.
    pub fn figment() -> Figment {
        Self::figment_from(Self::global_config_path().as_deref(), Path::new(LOCAL_CONFIG))
    }

    /// Build the provider chain from explicit file locations. Missing files are skipped.
    pub fn figment_from(global: Option<&Path>, local: &Path) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global) = global.filter(|p| p.exists()) {
            figment = figment.merge(Toml::file(global));
        }

        if local.exists() {
            figment = figment.merge(Toml::file(local));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|p| p.join("varseal").join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.db_file.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.db_file".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.keys.keyring_service.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "keys.keyring_service".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.db_file)
    }

    pub fn key_provider(&self) -> KeyringProvider {
        KeyringProvider::new(&self.keys.keyring_service, &self.keys.keyring_user)
    }

    pub fn hook_options(&self) -> HookOptions {
        HookOptions {
            heal_legacy_on_read: self.legacy.heal_on_read,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
