//! # Network Lifecycle
//!
//! Radio power, station association and the setup access point, behind the
//! [`Network`] trait the controller talks to.
//!
//! [`NmcliNetwork`] drives NetworkManager through the `nmcli` CLI, which is
//! what a Raspberry Pi OS image ships with. Association runs as a child
//! process so the controller can poll [`Network::link_status`] once a second
//! and keep the display updated. [`HostNetwork`] is the development stand-in.

use log::{debug, info, warn};
use std::io;
use std::process::{Child, Command, Stdio};
use thiserror::Error;

/// Gateway address NetworkManager gives a shared-mode hotspot.
pub const HOTSPOT_FALLBACK_ADDRESS: &str = "10.42.0.1";

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("failed to run network tool: {0}")]
    Io(#[from] io::Error),

    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },
}

/// Result of polling station association.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Connecting,
    Connected(String),
    Failed,
}

pub trait Network {
    fn power_up(&mut self) -> Result<(), NetworkError>;
    fn power_down(&mut self) -> Result<(), NetworkError>;
    /// Start associating; progress is reported by [`Network::link_status`].
    fn begin_station(&mut self, ssid: &str, password: &str) -> Result<(), NetworkError>;
    fn link_status(&mut self) -> LinkStatus;
    fn disconnect(&mut self) -> Result<(), NetworkError>;
    /// Bring up the setup access point and return the address clients reach
    /// the device on.
    fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<String, NetworkError>;
}

/// Switched supply of the WiFi module.
pub trait PowerRail {
    fn set_powered(&mut self, on: bool) -> Result<(), NetworkError>;
}

/// For boards where the radio is always powered.
#[derive(Debug, Default)]
pub struct NoRail;

impl PowerRail for NoRail {
    fn set_powered(&mut self, _on: bool) -> Result<(), NetworkError> {
        Ok(())
    }
}

/// NetworkManager-backed network.
pub struct NmcliNetwork {
    interface: String,
    rail: Box<dyn PowerRail>,
    station: Option<Child>,
}

impl NmcliNetwork {
    pub fn new(interface: &str, rail: Box<dyn PowerRail>) -> Self {
        Self {
            interface: interface.to_string(),
            rail,
            station: None,
        }
    }

    fn nmcli(&self, args: &[&str]) -> Result<String, NetworkError> {
        debug!("nmcli {}", args.join(" "));
        let output = Command::new("nmcli").args(args).output()?;
        if !output.status.success() {
            return Err(NetworkError::Command {
                command: format!("nmcli {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn address(&self) -> Option<String> {
        let output = self
            .nmcli(&["-g", "IP4.ADDRESS", "device", "show", &self.interface])
            .ok()?;
        parse_ipv4_address(&output)
    }

    fn reap_station(&mut self) {
        if let Some(mut child) = self.station.take() {
            if let Ok(None) = child.try_wait() {
                let _ = child.kill();
            }
            let _ = child.wait();
        }
    }
}

impl Network for NmcliNetwork {
    fn power_up(&mut self) -> Result<(), NetworkError> {
        self.rail.set_powered(true)?;
        self.nmcli(&["radio", "wifi", "on"])?;
        info!("WiFi radio on");
        Ok(())
    }

    fn power_down(&mut self) -> Result<(), NetworkError> {
        self.reap_station();
        let radio = self.nmcli(&["radio", "wifi", "off"]).map(|_| ());
        self.rail.set_powered(false)?;
        info!("WiFi radio off");
        radio
    }

    fn begin_station(&mut self, ssid: &str, password: &str) -> Result<(), NetworkError> {
        self.reap_station();
        info!("Connecting to {}", ssid);
        let child = Command::new("nmcli")
            .args(["device", "wifi", "connect", ssid, "password", password])
            .args(["ifname", &self.interface])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        self.station = Some(child);
        Ok(())
    }

    fn link_status(&mut self) -> LinkStatus {
        let Some(child) = self.station.as_mut() else {
            return match self.address() {
                Some(ip) => LinkStatus::Connected(ip),
                None => LinkStatus::Failed,
            };
        };

        match child.try_wait() {
            Ok(None) => LinkStatus::Connecting,
            Ok(Some(status)) if status.success() => {
                self.station = None;
                match self.address() {
                    Some(ip) => LinkStatus::Connected(ip),
                    None => LinkStatus::Connecting,
                }
            }
            Ok(Some(status)) => {
                warn!("nmcli connect exited with {}", status);
                self.station = None;
                LinkStatus::Failed
            }
            Err(e) => {
                warn!("could not poll nmcli: {}", e);
                self.station = None;
                LinkStatus::Failed
            }
        }
    }

    fn disconnect(&mut self) -> Result<(), NetworkError> {
        self.reap_station();
        self.nmcli(&["device", "disconnect", &self.interface])?;
        info!("WiFi disconnected");
        Ok(())
    }

    fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<String, NetworkError> {
        self.nmcli(&[
            "device",
            "wifi",
            "hotspot",
            "ifname",
            &self.interface,
            "ssid",
            ssid,
            "password",
            password,
        ])?;
        let address = self
            .address()
            .unwrap_or_else(|| HOTSPOT_FALLBACK_ADDRESS.to_string());
        info!("Access point '{}' up at {}", ssid, address);
        Ok(address)
    }
}

impl Drop for NmcliNetwork {
    fn drop(&mut self) {
        self.reap_station();
    }
}

/// `192.168.1.23/24` → `192.168.1.23`; first address wins.
pub fn parse_ipv4_address(output: &str) -> Option<String> {
    output
        .lines()
        .flat_map(|line| line.split('|'))
        .map(str::trim)
        .find(|entry| !entry.is_empty())
        .map(|entry| entry.split('/').next().unwrap_or(entry).to_string())
}

/// Development network: always associates, the access point is the portal's
/// local listen address.
#[derive(Debug)]
pub struct HostNetwork {
    ap_address: String,
}

impl HostNetwork {
    pub fn new(ap_address: &str) -> Self {
        Self {
            ap_address: ap_address.to_string(),
        }
    }
}

impl Network for HostNetwork {
    fn power_up(&mut self) -> Result<(), NetworkError> {
        info!("(simulated) radio on");
        Ok(())
    }

    fn power_down(&mut self) -> Result<(), NetworkError> {
        info!("(simulated) radio off");
        Ok(())
    }

    fn begin_station(&mut self, ssid: &str, _password: &str) -> Result<(), NetworkError> {
        info!("(simulated) joining {}", ssid);
        Ok(())
    }

    fn link_status(&mut self) -> LinkStatus {
        LinkStatus::Connected("127.0.0.1".to_string())
    }

    fn disconnect(&mut self) -> Result<(), NetworkError> {
        info!("(simulated) disconnected");
        Ok(())
    }

    fn start_access_point(&mut self, ssid: &str, _password: &str) -> Result<String, NetworkError> {
        info!("(simulated) access point '{}'", ssid);
        Ok(self.ap_address.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4_address() {
        assert_eq!(
            parse_ipv4_address("192.168.1.23/24\n"),
            Some("192.168.1.23".to_string())
        );
        assert_eq!(
            parse_ipv4_address("10.42.0.1/24 | 10.0.0.5/8\n"),
            Some("10.42.0.1".to_string())
        );
        assert_eq!(parse_ipv4_address("\n"), None);
        assert_eq!(parse_ipv4_address(""), None);
    }

    #[test]
    fn test_host_network_always_connects() {
        let mut net = HostNetwork::new("127.0.0.1:8080");
        net.power_up().unwrap();
        net.begin_station("home", "pw").unwrap();
        assert_eq!(
            net.link_status(),
            LinkStatus::Connected("127.0.0.1".to_string())
        );
        assert_eq!(
            net.start_access_point("PicoCryptoTicker", "password").unwrap(),
            "127.0.0.1:8080"
        );
    }

    #[test]
    fn test_no_rail_is_noop() {
        assert!(NoRail.set_powered(true).is_ok());
        assert!(NoRail.set_powered(false).is_ok());
    }
}
