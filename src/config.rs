//! # Configuration Management
//!
//! This module handles loading and parsing the installation configuration from
//! the ticker-config.toml file: GPIO wiring, timing of the awake window, the
//! price API endpoint and the credentials of the setup access point.
//!
//! This is *not* the user's WiFi and coin selection. Those are provisioned
//! through the setup portal and live in the settings file (see
//! [`crate::settings`]).

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_PATH: &str = "ticker-config.toml";

/// Application configuration loaded from ticker-config.toml
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
}

/// Awake-time behaviour of the device
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Where the provisioned settings are persisted
    pub settings_path: String,
    /// How long the price stays interactive (coin cycling) before sleeping
    pub linger_seconds: u64,
    /// How long a fetch error stays on screen before sleeping
    pub error_display_seconds: u64,
    /// One-second association polls before giving up on WiFi
    pub connect_retries: u32,
}

/// Price feed endpoint
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

/// Setup access point and web form
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PortalConfig {
    pub ap_ssid: String,
    pub ap_password: String,
    /// Listen address on the device
    pub bind_address: String,
    /// Listen address in `--stdout` development mode
    pub dev_bind_address: String,
}

/// Station networking
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Wireless interface managed through NetworkManager
    pub interface: String,
}

/// GPIO wiring (BCM numbering) and button timing
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Cycle-coin button
    pub button_a_pin: u8,
    /// Sleep / reset button
    pub button_b_pin: u8,
    /// Switched supply of the WiFi module, if wired
    pub radio_power_pin: Option<u8>,
    pub debounce_ms: u64,
    pub long_press_ms: u64,
    /// SPI device node the panel is attached to
    pub spi_device: String,
    pub dc_pin: u32,
    pub rst_pin: u32,
    pub busy_pin: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            settings_path: "settings.toml".to_string(),
            linger_seconds: 10,
            error_display_seconds: 10,
            connect_retries: 15,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        PortalConfig {
            ap_ssid: "PicoCryptoTicker".to_string(),
            ap_password: "password".to_string(),
            bind_address: "0.0.0.0:80".to_string(),
            dev_bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            interface: "wlan0".to_string(),
        }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        HardwareConfig {
            button_a_pin: 14,
            button_b_pin: 15,
            radio_power_pin: Some(23),
            debounce_ms: 50,
            long_press_ms: 2000,
            spi_device: "/dev/spidev0.0".to_string(),
            dc_pin: 25,
            rst_pin: 17,
            busy_pin: 24,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl AppConfig {
    /// Load configuration from ticker-config.toml
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_PATH)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.as_ref().display());
                    config
                }
                Err(e) => {
                    warn!("Invalid config file format: {}", e);
                    warn!("Using default configuration");
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found, using default configuration");
                Self::default()
            }
        }
    }

    /// Save current configuration to the given path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }
}
