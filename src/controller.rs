//! # Device Lifecycle
//!
//! [`DeviceController`] owns the device-wide state machine:
//!
//! ```text
//!            ┌──────── no / invalid settings ───────┐
//!   Init ────┤                                      ├──> Configuring ──> Reset
//!            └──── settings ──> Running { 0 } ──────┘
//!                                   │   ▲ cycle
//!                                   ▼   │
//!                                 Sleeping ──> DeepSleep(refresh)
//! ```
//!
//! A deep sleep is a power cycle: `run` consumes the controller and hands back
//! a [`PowerAction`] which the binary performs. The next process starts from
//! `Init` again, so the coin index and the price snapshot never survive it.
//!
//! Button events arrive on an mpsc channel from the input worker and are
//! only looked at while the controller waits (association polls, dwell
//! times, the linger window and portal polling). A long press on the
//! sleep/reset button is a factory reset from any state; a short press asks
//! for sleep and only counts while `Running`.

use crate::button::ButtonEvent;
use crate::config::AppConfig;
use crate::display::{Display, Screen};
use crate::input::{ButtonId, InputEvent};
use crate::network::{LinkStatus, Network};
use crate::platform::{Clock, PowerAction};
use crate::portal::ConfigPortal;
use crate::price::{FeedError, PriceFeed, PriceSnapshot};
use crate::settings::{ConfigStore, Configuration, SettingsError};
use log::{debug, error, info, warn};
use std::sync::mpsc::Receiver;
use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    Init,
    Configuring,
    Running { coin_index: usize },
    Sleeping,
}

/// Failures the controller handles itself. None of them escape `run`.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("could not join WiFi network '{0}'")]
    NetworkAssociationFailed(String),

    #[error("price fetch failed: {0}")]
    FetchFailed(#[from] FeedError),

    #[error("configuration missing or invalid: {0}")]
    ConfigurationMissingOrInvalid(SettingsError),

    #[error("settings storage unavailable: {0}")]
    StorageUnavailable(SettingsError),
}

impl From<SettingsError> for DeviceError {
    fn from(e: SettingsError) -> Self {
        if e.is_storage_failure() {
            DeviceError::StorageUnavailable(e)
        } else {
            DeviceError::ConfigurationMissingOrInvalid(e)
        }
    }
}

/// What a button event means to the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    CycleCoin,
    Sleep,
    FactoryReset,
}

impl Command {
    pub fn from_event(event: &InputEvent) -> Option<Self> {
        match (event.button, event.event) {
            (ButtonId::Cycle, ButtonEvent::Released) => Some(Command::CycleCoin),
            (ButtonId::Sleep, ButtonEvent::Released) => Some(Command::Sleep),
            (ButtonId::Sleep, ButtonEvent::LongPress) => Some(Command::FactoryReset),
            _ => None,
        }
    }
}

/// Timing and identity knobs.
#[derive(Clone, Debug)]
pub struct ControllerOptions {
    /// Interactive window after a successful render
    pub linger: Duration,
    /// How long a fetch error stays up before sleeping
    pub error_display: Duration,
    pub connect_retries: u32,
    pub connect_poll: Duration,
    /// "WiFi Connected!" dwell
    pub connected_notice: Duration,
    /// "Settings Saved!" dwell
    pub saved_notice: Duration,
    /// "Resetting device..." dwell
    pub reset_notice: Duration,
    /// Dwell of association and storage failure screens
    pub failure_notice: Duration,
    /// "Entering sleep mode..." dwell
    pub sleep_notice: Duration,
    /// Granularity of event checks while waiting
    pub event_poll: Duration,
    pub ap_ssid: String,
    pub ap_password: String,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ControllerOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            linger: Duration::from_secs(config.device.linger_seconds),
            error_display: Duration::from_secs(config.device.error_display_seconds),
            connect_retries: config.device.connect_retries,
            connect_poll: Duration::from_secs(1),
            connected_notice: Duration::from_secs(2),
            saved_notice: Duration::from_secs(3),
            reset_notice: Duration::from_secs(2),
            failure_notice: Duration::from_secs(5),
            sleep_notice: Duration::from_secs(2),
            event_poll: Duration::from_millis(50),
            ap_ssid: config.portal.ap_ssid.clone(),
            ap_password: config.portal.ap_password.clone(),
        }
    }
}

/// Everything the controller talks to.
pub struct Collaborators {
    pub store: Box<dyn ConfigStore>,
    pub display: Box<dyn Display>,
    pub network: Box<dyn Network>,
    pub feed: Box<dyn PriceFeed>,
    pub portal: Box<dyn ConfigPortal>,
    pub clock: Box<dyn Clock>,
}

/// Why a wait was cut short.
#[derive(Debug)]
enum Halt {
    Sleep,
    Power(PowerAction),
}

enum Transition {
    To(DeviceState),
    Power(PowerAction),
}

impl From<Halt> for Transition {
    fn from(halt: Halt) -> Self {
        match halt {
            Halt::Sleep => Transition::To(DeviceState::Sleeping),
            Halt::Power(action) => Transition::Power(action),
        }
    }
}

pub struct DeviceController {
    state: DeviceState,
    options: ControllerOptions,
    configuration: Option<Configuration>,
    snapshot: Option<PriceSnapshot>,
    events: Receiver<InputEvent>,
    io: Collaborators,
    radio_on: bool,
}

impl DeviceController {
    pub fn new(
        io: Collaborators,
        events: Receiver<InputEvent>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            state: DeviceState::Init,
            options,
            configuration: None,
            snapshot: None,
            events,
            io,
            radio_on: false,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn configuration(&self) -> Option<&Configuration> {
        self.configuration.as_ref()
    }

    /// Run until the device has to power-cycle.
    pub fn run(mut self) -> PowerAction {
        loop {
            if let Some(action) = self.step() {
                return action;
            }
        }
    }

    /// Advance one state. Returns the power action once the controller is
    /// finished; it must not be stepped again after that.
    pub fn step(&mut self) -> Option<PowerAction> {
        let transition = match self.state {
            DeviceState::Init => self.run_init(),
            DeviceState::Configuring => self.run_configuring(),
            DeviceState::Running { .. } => self.run_cycle(),
            DeviceState::Sleeping => Transition::Power(self.enter_sleeping()),
        };

        match transition {
            Transition::To(next) => {
                info!("{:?} -> {:?}", self.state, next);
                self.state = next;
                None
            }
            Transition::Power(action) => {
                info!("{:?} finished with {:?}", self.state, action);
                Some(action)
            }
        }
    }

    fn run_init(&mut self) -> Transition {
        // Stores may hand back records that were never validated.
        let loaded = self
            .io
            .store
            .load()
            .and_then(|config| config.validate().map(|()| config));
        match loaded {
            Ok(config) => {
                info!(
                    "Loaded settings: {} coin(s), refresh every {} min",
                    config.coins.len(),
                    config.refresh_minutes
                );
                self.configuration = Some(config);
                Transition::To(DeviceState::Running { coin_index: 0 })
            }
            Err(SettingsError::Missing) => {
                info!("No settings stored, entering setup");
                Transition::To(DeviceState::Configuring)
            }
            Err(e) => {
                warn!("{}", DeviceError::from(e));
                Transition::To(DeviceState::Configuring)
            }
        }
    }

    fn run_configuring(&mut self) -> Transition {
        self.power_radio_up();

        let ssid = self.options.ap_ssid.clone();
        let password = self.options.ap_password.clone();
        let address = match self.io.network.start_access_point(&ssid, &password) {
            Ok(address) => address,
            Err(e) => {
                error!("access point failed: {}", e);
                return self.fail_and_reset(&[
                    "Config Mode",
                    "Access point failed.",
                    "Resetting...",
                ]);
            }
        };
        if let Err(e) = self.io.portal.open() {
            error!("setup portal failed: {}", e);
            return self.fail_and_reset(&["Config Mode", "Setup page failed.", "Resetting..."]);
        }

        self.show(&Screen::message(&[
            "Config Mode",
            &format!("Connect to '{ssid}'"),
            &format!("Go to {address}"),
        ]));

        loop {
            match self.io.portal.poll() {
                Ok(Some(config)) => return Transition::Power(self.persist(config)),
                Ok(None) => {}
                Err(e) => warn!("setup portal: {}", e),
            }
            if let Err(halt) = self.wait(self.options.event_poll) {
                return halt.into();
            }
        }
    }

    fn persist(&mut self, config: Configuration) -> PowerAction {
        match self.io.store.save(&config) {
            Ok(()) => {
                self.show(&Screen::message(&["Settings Saved!", "Rebooting..."]));
                if let Some(action) = self.dwell(self.options.saved_notice) {
                    return action;
                }
            }
            Err(e) => {
                error!("{}", DeviceError::from(e));
                self.show(&Screen::message(&[
                    "Save Failed",
                    "Storage unavailable.",
                    "Resetting...",
                ]));
                if let Some(action) = self.dwell(self.options.failure_notice) {
                    return action;
                }
            }
        }
        self.shutdown_radio();
        PowerAction::Reset
    }

    fn run_cycle(&mut self) -> Transition {
        let Some(config) = self.configuration.clone() else {
            warn!("running without settings");
            return Transition::To(DeviceState::Configuring);
        };

        self.power_radio_up();
        match self.connect(&config) {
            Ok(Some(_ip)) => {}
            Ok(None) => return Transition::Power(self.association_failed(&config.ssid)),
            Err(halt) => return halt.into(),
        }

        match self.io.feed.fetch(&config.coins) {
            Ok(snapshot) => {
                // Prices are in hand; the radio is not needed for the linger.
                self.shutdown_radio();
                // A cycle press while connecting may already have moved the index.
                let index = match self.state {
                    DeviceState::Running { coin_index } => coin_index,
                    _ => 0,
                };
                self.show(&Screen::for_coin(&snapshot, &config.coins[index]));
                self.snapshot = Some(snapshot);

                match self.wait(self.options.linger) {
                    Ok(()) => Transition::To(DeviceState::Sleeping),
                    Err(halt) => halt.into(),
                }
            }
            Err(e) => {
                warn!("{}", DeviceError::from(e));
                self.show(&Screen::message(&["API Error", "Could not fetch prices."]));
                match self.wait(self.options.error_display) {
                    Ok(()) => Transition::To(DeviceState::Sleeping),
                    Err(halt) => halt.into(),
                }
            }
        }
    }

    /// Poll association. `Ok(None)` when the retries ran out or the link
    /// failed outright.
    fn connect(&mut self, config: &Configuration) -> Result<Option<String>, Halt> {
        if let Err(e) = self.io.network.begin_station(&config.ssid, &config.password) {
            warn!("could not start association: {}", e);
            return Ok(None);
        }

        let mut retries_left = self.options.connect_retries;
        let status = loop {
            match self.io.network.link_status() {
                LinkStatus::Connecting if retries_left > 0 => {
                    retries_left -= 1;
                    self.show(&Screen::message(&[
                        "Connecting to WiFi...",
                        &format!("SSID: {}", config.ssid),
                        &format!("Retries left: {retries_left}"),
                    ]));
                    self.wait(self.options.connect_poll)?;
                }
                status => break status,
            }
        };

        match status {
            LinkStatus::Connected(ip) => {
                info!("WiFi connected, IP {}", ip);
                self.show(&Screen::message(&["WiFi Connected!", &format!("IP: {ip}")]));
                self.wait(self.options.connected_notice)?;
                Ok(Some(ip))
            }
            _ => Ok(None),
        }
    }

    fn association_failed(&mut self, ssid: &str) -> PowerAction {
        error!("{}", DeviceError::NetworkAssociationFailed(ssid.to_string()));
        self.show(&Screen::message(&[
            "WiFi Connection Failed",
            "Check credentials.",
            "Resetting to re-enter.",
        ]));
        if let Some(action) = self.dwell(self.options.failure_notice) {
            return action;
        }
        self.delete_settings();
        self.shutdown_radio();
        PowerAction::Reset
    }

    fn fail_and_reset(&mut self, lines: &[&str]) -> Transition {
        self.show(&Screen::message(lines));
        if let Some(action) = self.dwell(self.options.failure_notice) {
            return Transition::Power(action);
        }
        self.shutdown_radio();
        Transition::Power(PowerAction::Reset)
    }

    fn factory_reset(&mut self) -> PowerAction {
        info!("Factory reset requested");
        self.show(&Screen::message(&["Resetting device...", "Deleting settings."]));
        let dwell = self.options.reset_notice;
        self.io.clock.delay(dwell);
        self.delete_settings();
        self.shutdown_radio();
        PowerAction::Reset
    }

    fn delete_settings(&mut self) {
        if let Err(e) = self.io.store.delete() {
            error!("{}", DeviceError::from(e));
            self.show(&Screen::message(&["Reset Failed", "Storage unavailable."]));
            let dwell = self.options.failure_notice;
            self.io.clock.delay(dwell);
        }
        self.configuration = None;
    }

    fn enter_sleeping(&mut self) -> PowerAction {
        let Some((minutes, sleep_for)) = self
            .configuration
            .as_ref()
            .map(|c| (c.refresh_minutes, c.sleep_duration()))
        else {
            warn!("sleep requested without settings");
            self.shutdown_radio();
            return PowerAction::Reset;
        };

        self.show(&Screen::message(&[
            "Entering sleep mode...",
            &format!("Waking in {minutes} min"),
        ]));
        if let Some(action) = self.dwell(self.options.sleep_notice) {
            return action;
        }

        self.shutdown_radio();
        self.io.display.sleep();
        PowerAction::DeepSleep(sleep_for)
    }

    fn power_radio_up(&mut self) {
        if let Err(e) = self.io.network.power_up() {
            warn!("radio power-up failed: {}", e);
        }
        self.radio_on = true;
    }

    /// Disconnect, then cut radio power. Idempotent.
    fn shutdown_radio(&mut self) {
        if !self.radio_on {
            return;
        }
        if let Err(e) = self.io.network.disconnect() {
            warn!("disconnect failed: {}", e);
        }
        if let Err(e) = self.io.network.power_down() {
            warn!("radio power-down failed: {}", e);
        }
        self.radio_on = false;
    }

    fn show(&mut self, screen: &Screen) {
        self.io.display.clear();
        self.io.display.render(screen);
    }

    /// Block for `duration`, handling button events as they come in.
    fn wait(&mut self, duration: Duration) -> Result<(), Halt> {
        let deadline = self.io.clock.now() + duration;
        loop {
            self.drain_events()?;
            let now = self.io.clock.now();
            if now >= deadline {
                return Ok(());
            }
            let step = self.options.event_poll.min(deadline - now);
            self.io.clock.delay(step);
        }
    }

    /// Hold a notice on screen for `duration`. Only a factory reset cuts it
    /// short; its power action is returned.
    fn dwell(&mut self, duration: Duration) -> Option<PowerAction> {
        let deadline = self.io.clock.now() + duration;
        loop {
            let remaining = deadline.saturating_duration_since(self.io.clock.now());
            match self.wait(remaining) {
                Ok(()) => return None,
                Err(Halt::Power(action)) => return Some(action),
                Err(Halt::Sleep) => debug!("sleep request ignored during notice"),
            }
        }
    }

    fn drain_events(&mut self) -> Result<(), Halt> {
        while let Ok(event) = self.events.try_recv() {
            debug!("{} button {:?} in {:?}", event.button, event.event, self.state);
            if let Some(command) = Command::from_event(&event) {
                self.handle_command(command)?;
            }
        }
        Ok(())
    }

    fn handle_command(&mut self, command: Command) -> Result<(), Halt> {
        match (command, self.state) {
            (Command::FactoryReset, _) => Err(Halt::Power(self.factory_reset())),
            (Command::Sleep, DeviceState::Running { .. }) => {
                info!("Sleep requested");
                Err(Halt::Sleep)
            }
            (Command::Sleep, state) => {
                debug!("sleep request ignored in {:?}", state);
                Ok(())
            }
            (Command::CycleCoin, DeviceState::Running { coin_index }) => {
                self.cycle_coin(coin_index);
                Ok(())
            }
            (Command::CycleCoin, _) => Ok(()),
        }
    }

    fn cycle_coin(&mut self, coin_index: usize) {
        let Some(config) = self.configuration.as_ref() else {
            return;
        };
        let next = (coin_index + 1) % config.coins.len();
        let coin = config.coins[next].clone();
        info!("Showing coin {} ({})", next, coin);
        self.state = DeviceState::Running { coin_index: next };

        if let Some(screen) = self.snapshot.as_ref().map(|s| Screen::for_coin(s, &coin)) {
            self.show(&screen);
        }
    }
}
