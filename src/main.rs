//! # Crypto Ticker Application Entry Point
//!
//! Wires the collaborators together and runs one wake cycle of the device.
//! It supports both production mode (e-paper panel, GPIO buttons,
//! NetworkManager) and development mode (`--stdout`: terminal output, buttons
//! typed on stdin, simulated network).
//!
//! When the controller is done the process either re-executes itself at once
//! (reset) or after the refresh interval (deep sleep).

#[cfg(all(target_os = "linux", feature = "hardware"))]
mod hw_gpio;
#[cfg(all(target_os = "linux", feature = "hardware"))]
mod hw_panel;

use anyhow::Context;
use crypto_ticker_lib::config::AppConfig;
use crypto_ticker_lib::controller::{Collaborators, ControllerOptions, DeviceController};
use crypto_ticker_lib::display::{Display, TerminalDisplay};
use crypto_ticker_lib::input::{ButtonId, ButtonInput, InputEvent, LatchedLines, SimulatedButtons};
use crypto_ticker_lib::network::{HostNetwork, Network};
use crypto_ticker_lib::platform::{Platform, PowerAction, ProcessPlatform, SystemClock};
use crypto_ticker_lib::portal::HttpPortal;
use crypto_ticker_lib::price::CoinGeckoFeed;
use crypto_ticker_lib::settings::FileConfigStore;
use log::{info, warn};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;
use std::{env, io, thread};

/// Command line options.
#[derive(Debug, Default, PartialEq)]
struct Args {
    /// Development mode: render to stdout, buttons from stdin
    development: bool,
    config_path: Option<PathBuf>,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut parsed = Args::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--stdout" => parsed.development = true,
                "--config" => {
                    let path = args.next().context("--config needs a path")?;
                    parsed.config_path = Some(PathBuf::from(path));
                }
                other => anyhow::bail!("unknown argument '{other}'"),
            }
        }
        Ok(parsed)
    }
}

/// Build the controller around the given device-specific collaborators.
fn controller(
    config: &AppConfig,
    display: Box<dyn Display>,
    network: Box<dyn Network>,
    portal_address: &str,
    events: Receiver<InputEvent>,
) -> anyhow::Result<DeviceController> {
    let feed = CoinGeckoFeed::new(&config.api.base_url, config.api.timeout())
        .context("build price client")?;
    let io = Collaborators {
        store: Box::new(FileConfigStore::new(&config.device.settings_path)),
        display,
        network,
        feed: Box::new(feed),
        portal: Box::new(HttpPortal::new(portal_address)),
        clock: Box::new(SystemClock),
    };
    Ok(DeviceController::new(io, events, ControllerOptions::from(config)))
}

/// Type `a` + Enter for the cycle button, `b` for sleep, `B` to hold the
/// sleep button long enough for a factory reset.
fn spawn_stdin_buttons(buttons: SimulatedButtons, long_press: Duration) -> io::Result<()> {
    thread::Builder::new()
        .name("stdin-buttons".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match line.trim() {
                    "a" => buttons.tap(ButtonId::Cycle),
                    "b" => buttons.tap(ButtonId::Sleep),
                    "B" => buttons.hold(ButtonId::Sleep, long_press + Duration::from_millis(200)),
                    "" => {}
                    other => warn!("unknown key '{}' (use a, b or B)", other),
                }
            }
        })?;
    Ok(())
}

fn run_development(config: &AppConfig) -> anyhow::Result<PowerAction> {
    info!("Development mode: a = next coin, b = sleep, B = factory reset");

    let (edge_tx, edge_rx) = mpsc::channel();
    let (event_tx, event_rx) = mpsc::channel();
    let lines = LatchedLines::new();

    ButtonInput::from_config(&config.hardware)
        .spawn(edge_rx, lines.clone(), event_tx)
        .context("start button worker")?;
    spawn_stdin_buttons(
        SimulatedButtons::new(lines, edge_tx),
        Duration::from_millis(config.hardware.long_press_ms),
    )
    .context("start stdin reader")?;

    let address = &config.portal.dev_bind_address;
    let device = controller(
        config,
        Box::new(TerminalDisplay::new()),
        Box::new(HostNetwork::new(address)),
        address,
        event_rx,
    )?;
    Ok(device.run())
}

#[cfg(all(target_os = "linux", feature = "hardware"))]
fn run_device(config: &AppConfig) -> anyhow::Result<PowerAction> {
    use crypto_ticker_lib::network::{NmcliNetwork, NoRail, PowerRail};

    let hw = &config.hardware;
    let (edge_tx, edge_rx) = mpsc::channel();
    let (event_tx, event_rx) = mpsc::channel();

    let buttons = hw_gpio::GpioButtons::new(hw, edge_tx).context("set up buttons")?;
    ButtonInput::from_config(hw)
        .spawn(edge_rx, buttons.lines(), event_tx)
        .context("start button worker")?;

    let rail: Box<dyn PowerRail> = match hw.radio_power_pin {
        Some(pin) => Box::new(hw_gpio::GpioRail::new(pin).context("set up radio power pin")?),
        None => Box::new(NoRail),
    };
    let panel = hw_panel::open(hw).context("open e-paper panel")?;

    let device = controller(
        config,
        Box::new(panel),
        Box::new(NmcliNetwork::new(&config.network.interface, rail)),
        &config.portal.bind_address,
        event_rx,
    )?;
    let action = device.run();
    drop(buttons);
    Ok(action)
}

#[cfg(not(all(target_os = "linux", feature = "hardware")))]
fn run_device(config: &AppConfig) -> anyhow::Result<PowerAction> {
    warn!("E-paper support not enabled. Rebuild with --features hardware on Linux.");
    warn!("Running in development mode instead.");
    run_development(config)
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse(env::args().skip(1))?;
    let config = match &args.config_path {
        Some(path) => AppConfig::load_from_path(path),
        None => AppConfig::load(),
    };

    let action = if args.development {
        run_development(&config)?
    } else {
        run_device(&config)?
    };

    ProcessPlatform::new().perform(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> anyhow::Result<Args> {
        Args::parse(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(args(&[]).unwrap(), Args::default());
        assert!(args(&["--stdout"]).unwrap().development);
        assert_eq!(
            args(&["--config", "/etc/ticker.toml"]).unwrap().config_path,
            Some(PathBuf::from("/etc/ticker.toml"))
        );
    }

    #[test]
    fn test_parse_args_rejects_bad_input() {
        assert!(args(&["--config"]).is_err());
        assert!(args(&["--fast"]).is_err());
    }
}
