//! # Persisted Device Settings
//!
//! The user-provisioned record the device boots from: WiFi credentials, the
//! refresh interval and up to five coins. It is written once by the setup
//! portal and read on every wake; nothing else survives a deep sleep.
//!
//! ## File format
//! Flat TOML key/value text, mirroring the fields of the setup form:
//!
//! ```toml
//! ssid = "home"
//! password = "hunter2"
//! refresh = 15
//! coin1 = "bitcoin"
//! coin2 = "ethereum"
//! coin3 = "---"
//! coin4 = "---"
//! coin5 = "---"
//! ```
//!
//! `"---"` marks an unused slot. A file that parses but has no coins or a zero
//! refresh interval is rejected as invalid.

use crate::coins::{MAX_COINS, UNSET};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};
use thiserror::Error;

/// Errors from loading, validating or persisting settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// No settings have been provisioned yet
    #[error("no settings stored")]
    Missing,

    /// Settings parsed but violate an invariant
    #[error("invalid settings: {0}")]
    Invalid(String),

    /// The backing store could not be read or written
    #[error("settings storage IO: {0}")]
    Io(#[from] io::Error),

    #[error("settings parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("settings encode error: {0}")]
    Encode(#[from] toml::ser::Error),
}

impl SettingsError {
    /// True when the store itself failed, as opposed to its content.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, SettingsError::Io(_) | SettingsError::Encode(_))
    }
}

/// Validated settings. Construct through [`Configuration::new`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Configuration {
    pub ssid: String,
    pub password: String,
    pub refresh_minutes: u32,
    /// Ordered, non-empty, at most [`MAX_COINS`]
    pub coins: Vec<String>,
}

impl Configuration {
    pub fn new(
        ssid: impl Into<String>,
        password: impl Into<String>,
        refresh_minutes: u32,
        coins: Vec<String>,
    ) -> Result<Self, SettingsError> {
        let config = Self {
            ssid: ssid.into(),
            password: password.into(),
            refresh_minutes,
            coins,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.refresh_minutes == 0 {
            return Err(SettingsError::Invalid(
                "refresh interval must be positive".to_string(),
            ));
        }
        if self.coins.is_empty() {
            return Err(SettingsError::Invalid("no coins selected".to_string()));
        }
        if self.coins.len() > MAX_COINS {
            return Err(SettingsError::Invalid(format!(
                "at most {} coins, got {}",
                MAX_COINS,
                self.coins.len()
            )));
        }
        Ok(())
    }

    /// Deep-sleep length between refreshes.
    pub fn sleep_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.refresh_minutes) * 60)
    }
}

/// On-disk shape of the settings file.
#[derive(Debug, Deserialize, Serialize)]
struct StoredSettings {
    ssid: String,
    password: String,
    refresh: u32,
    #[serde(default = "unset")]
    coin1: String,
    #[serde(default = "unset")]
    coin2: String,
    #[serde(default = "unset")]
    coin3: String,
    #[serde(default = "unset")]
    coin4: String,
    #[serde(default = "unset")]
    coin5: String,
}

fn unset() -> String {
    UNSET.to_string()
}

impl StoredSettings {
    fn from_configuration(config: &Configuration) -> Self {
        let slot = |i: usize| config.coins.get(i).cloned().unwrap_or_else(unset);
        Self {
            ssid: config.ssid.clone(),
            password: config.password.clone(),
            refresh: config.refresh_minutes,
            coin1: slot(0),
            coin2: slot(1),
            coin3: slot(2),
            coin4: slot(3),
            coin5: slot(4),
        }
    }

    fn into_configuration(self) -> Result<Configuration, SettingsError> {
        let coins = [self.coin1, self.coin2, self.coin3, self.coin4, self.coin5]
            .into_iter()
            .map(|coin| coin.trim().to_string())
            .filter(|coin| !coin.is_empty() && coin != UNSET)
            .collect();
        Configuration::new(self.ssid, self.password, self.refresh, coins)
    }
}

/// Parse settings file content.
pub fn parse(contents: &str) -> Result<Configuration, SettingsError> {
    toml::from_str::<StoredSettings>(contents)?.into_configuration()
}

/// Render settings as file content.
pub fn encode(config: &Configuration) -> Result<String, SettingsError> {
    Ok(toml::to_string(&StoredSettings::from_configuration(config))?)
}

/// Durable home of the [`Configuration`].
pub trait ConfigStore {
    fn load(&mut self) -> Result<Configuration, SettingsError>;
    fn save(&mut self, config: &Configuration) -> Result<(), SettingsError>;
    /// Remove the stored settings. Deleting absent settings succeeds.
    fn delete(&mut self) -> Result<(), SettingsError>;
}

/// Settings stored in a single file.
#[derive(Clone, Debug)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&mut self) -> Result<Configuration, SettingsError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(SettingsError::Missing),
            Err(e) => return Err(e.into()),
        };
        parse(&contents)
    }

    fn save(&mut self, config: &Configuration) -> Result<(), SettingsError> {
        config.validate()?;
        fs::write(&self.path, encode(config)?)?;
        info!("Settings saved to {}", self.path.display());
        Ok(())
    }

    fn delete(&mut self) -> Result<(), SettingsError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Settings deleted from {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Configuration {
        Configuration::new(
            "x",
            "y",
            30,
            vec!["bitcoin".to_string(), "ethereum".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            Configuration::new("x", "y", 0, vec!["bitcoin".to_string()]),
            Err(SettingsError::Invalid(_))
        ));
        assert!(matches!(
            Configuration::new("x", "y", 15, vec![]),
            Err(SettingsError::Invalid(_))
        ));
        let six = (0..6).map(|i| format!("coin{i}")).collect();
        assert!(Configuration::new("x", "y", 15, six).is_err());
    }

    #[test]
    fn test_unset_slots_are_dropped() {
        let config = parse(
            "ssid = \"x\"\npassword = \"y\"\nrefresh = 15\ncoin1 = \"---\"\ncoin2 = \"solana\"\n",
        )
        .unwrap();
        assert_eq!(config.coins, vec!["solana".to_string()]);
        assert_eq!(config.sleep_duration(), Duration::from_secs(900));
    }

    #[test]
    fn test_all_slots_unset_is_invalid() {
        let result = parse("ssid = \"x\"\npassword = \"y\"\nrefresh = 15\n");
        assert!(matches!(result, Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn test_encode_writes_every_slot() {
        let text = encode(&sample()).unwrap();
        assert!(text.contains("coin1 = \"bitcoin\""));
        assert!(text.contains("coin5 = \"---\""));
        assert!(text.contains("refresh = 30"));
    }

    #[test]
    fn test_file_store_lifecycle() {
        let dir = TempDir::new().unwrap();
        let mut store = FileConfigStore::new(dir.path().join("settings.toml"));

        assert!(matches!(store.load(), Err(SettingsError::Missing)));

        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());

        store.delete().unwrap();
        assert!(matches!(store.load(), Err(SettingsError::Missing)));
        // Deleting twice is fine
        store.delete().unwrap();
    }

    #[test]
    fn test_garbage_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "this is = = not toml").unwrap();

        let mut store = FileConfigStore::new(&path);
        let err = store.load().unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
        assert!(!err.is_storage_failure());
    }

    #[test]
    fn test_unwritable_location_is_storage_failure() {
        let dir = TempDir::new().unwrap();
        let mut store = FileConfigStore::new(dir.path().join("missing-dir").join("settings.toml"));
        let err = store.save(&sample()).unwrap_err();
        assert!(err.is_storage_failure());
    }
}
