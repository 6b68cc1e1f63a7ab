//! In-memory collaborators for controller tests. Each fake shares its state
//! through `Rc` handles so a test can inspect it after the controller has
//! taken ownership of the boxed trait object.

use crate::button::ButtonEvent;
use crate::controller::{Collaborators, ControllerOptions, DeviceController, DeviceState};
use crate::display::{Display, PriceView, Screen};
use crate::input::{ButtonId, InputEvent};
use crate::network::{LinkStatus, Network, NetworkError};
use crate::platform::{Clock, PowerAction};
use crate::portal::{ConfigPortal, PortalError};
use crate::price::{FeedError, PriceFeed, PriceSnapshot, Quote};
use crate::settings::{ConfigStore, Configuration, SettingsError};
use chrono::Local;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::rc::Rc;
use std::sync::mpsc::{self, Sender};
use std::time::{Duration, Instant};

pub fn configuration(coins: &[&str], refresh_minutes: u32) -> Configuration {
    Configuration::new(
        "x",
        "y",
        refresh_minutes,
        coins.iter().map(|c| c.to_string()).collect(),
    )
    .unwrap()
}

pub fn quote(usd: f64, change: f64) -> Quote {
    Quote {
        usd: Some(usd),
        usd_24h_change: Some(change),
    }
}

#[derive(Default)]
pub struct StoreState {
    pub config: Option<Configuration>,
    pub fail_reads: bool,
    pub fail_writes: bool,
    pub saves: u32,
    pub deletes: u32,
}

#[derive(Clone, Default)]
pub struct FakeStore(pub Rc<RefCell<StoreState>>);

impl ConfigStore for FakeStore {
    fn load(&mut self) -> Result<Configuration, SettingsError> {
        let state = self.0.borrow();
        if state.fail_reads {
            return Err(io::Error::new(io::ErrorKind::Other, "card not mounted").into());
        }
        state.config.clone().ok_or(SettingsError::Missing)
    }

    fn save(&mut self, config: &Configuration) -> Result<(), SettingsError> {
        let mut state = self.0.borrow_mut();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only").into());
        }
        state.saves += 1;
        state.config = Some(config.clone());
        Ok(())
    }

    fn delete(&mut self) -> Result<(), SettingsError> {
        let mut state = self.0.borrow_mut();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only").into());
        }
        state.deletes += 1;
        state.config = None;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakeDisplay {
    pub screens: Rc<RefCell<Vec<Screen>>>,
    pub sleeps: Rc<Cell<u32>>,
}

impl FakeDisplay {
    pub fn prices(&self) -> Vec<PriceView> {
        self.screens
            .borrow()
            .iter()
            .filter_map(|screen| match screen {
                Screen::Price(view) => Some(view.clone()),
                Screen::Message(_) => None,
            })
            .collect()
    }

    pub fn showed(&self, line: &str) -> bool {
        self.screens.borrow().iter().any(|screen| match screen {
            Screen::Message(lines) => lines.iter().any(|l| l == line),
            Screen::Price(_) => false,
        })
    }
}

impl Display for FakeDisplay {
    fn clear(&mut self) {}

    fn render(&mut self, screen: &Screen) {
        self.screens.borrow_mut().push(screen.clone());
    }

    fn sleep(&mut self) {
        self.sleeps.set(self.sleeps.get() + 1);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetOp {
    PowerUp,
    PowerDown,
    BeginStation(String),
    LinkStatus,
    Disconnect,
    StartAccessPoint(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Association {
    Connects,
    NeverConnects,
    Rejected,
}

#[derive(Clone)]
pub struct FakeNetwork {
    pub ops: Rc<RefCell<Vec<NetOp>>>,
    pub association: Rc<Cell<Association>>,
}

impl Default for FakeNetwork {
    fn default() -> Self {
        Self {
            ops: Rc::default(),
            association: Rc::new(Cell::new(Association::Connects)),
        }
    }
}

impl FakeNetwork {
    pub fn count(&self, op: &NetOp) -> usize {
        self.ops.borrow().iter().filter(|o| *o == op).count()
    }

    pub fn position(&self, op: &NetOp) -> Option<usize> {
        self.ops.borrow().iter().position(|o| o == op)
    }

    fn log(&self, op: NetOp) {
        self.ops.borrow_mut().push(op);
    }
}

impl Network for FakeNetwork {
    fn power_up(&mut self) -> Result<(), NetworkError> {
        self.log(NetOp::PowerUp);
        Ok(())
    }

    fn power_down(&mut self) -> Result<(), NetworkError> {
        self.log(NetOp::PowerDown);
        Ok(())
    }

    fn begin_station(&mut self, ssid: &str, _password: &str) -> Result<(), NetworkError> {
        self.log(NetOp::BeginStation(ssid.to_string()));
        Ok(())
    }

    fn link_status(&mut self) -> LinkStatus {
        self.log(NetOp::LinkStatus);
        match self.association.get() {
            Association::Connects => LinkStatus::Connected("192.168.1.50".to_string()),
            Association::NeverConnects => LinkStatus::Connecting,
            Association::Rejected => LinkStatus::Failed,
        }
    }

    fn disconnect(&mut self) -> Result<(), NetworkError> {
        self.log(NetOp::Disconnect);
        Ok(())
    }

    fn start_access_point(&mut self, ssid: &str, _password: &str) -> Result<String, NetworkError> {
        self.log(NetOp::StartAccessPoint(ssid.to_string()));
        Ok("192.168.4.1".to_string())
    }
}

/// Price feed that can also inject button events while a fetch is "in
/// flight", the way a user would press buttons during the request.
#[derive(Clone, Default)]
pub struct FakeFeed {
    pub quotes: Rc<RefCell<Option<HashMap<String, Quote>>>>,
    pub fetches: Rc<Cell<u32>>,
    pub during_fetch: Rc<RefCell<Vec<InputEvent>>>,
    pub events: Rc<RefCell<Option<Sender<InputEvent>>>>,
}

impl PriceFeed for FakeFeed {
    fn fetch(&mut self, _coin_ids: &[String]) -> Result<PriceSnapshot, FeedError> {
        self.fetches.set(self.fetches.get() + 1);
        if let Some(sender) = self.events.borrow().as_ref() {
            for event in self.during_fetch.borrow_mut().drain(..) {
                sender.send(event).unwrap();
            }
        }
        match self.quotes.borrow().clone() {
            Some(quotes) => Ok(PriceSnapshot::new(quotes, Local::now())),
            None => Err(serde_json::from_str::<serde_json::Value>("rate limited")
                .unwrap_err()
                .into()),
        }
    }
}

/// Portal that hands out a submission after a number of empty polls.
#[derive(Clone, Default)]
pub struct FakePortal {
    pub opens: Rc<Cell<u32>>,
    pub polls: Rc<Cell<u32>>,
    pub submissions: Rc<RefCell<VecDeque<(u32, Configuration)>>>,
}

impl ConfigPortal for FakePortal {
    fn open(&mut self) -> Result<(), PortalError> {
        self.opens.set(self.opens.get() + 1);
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<Configuration>, PortalError> {
        let polls = self.polls.get() + 1;
        self.polls.set(polls);
        let mut queue = self.submissions.borrow_mut();
        let ready = queue.front().is_some_and(|(after, _)| polls > *after);
        if ready {
            Ok(queue.pop_front().map(|(_, config)| config))
        } else {
            Ok(None)
        }
    }
}

/// Virtual time: `delay` advances instantly.
#[derive(Clone)]
pub struct FakeClock {
    pub now: Rc<Cell<Instant>>,
    pub start: Instant,
}

impl Default for FakeClock {
    fn default() -> Self {
        let start = Instant::now();
        Self {
            now: Rc::new(Cell::new(start)),
            start,
        }
    }
}

impl FakeClock {
    pub fn elapsed(&self) -> Duration {
        self.now.get() - self.start
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn delay(&mut self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}

/// All fakes plus the event sender of the controller under test.
#[derive(Default)]
pub struct Rig {
    pub store: FakeStore,
    pub display: FakeDisplay,
    pub network: FakeNetwork,
    pub feed: FakeFeed,
    pub portal: FakePortal,
    pub clock: FakeClock,
    pub events: Option<Sender<InputEvent>>,
}

impl Rig {
    pub fn with_config(config: Configuration) -> Self {
        let rig = Self::default();
        rig.store.0.borrow_mut().config = Some(config);
        rig
    }

    pub fn serve_quotes(&self, quotes: &[(&str, Quote)]) {
        let map = quotes
            .iter()
            .map(|(id, quote)| (id.to_string(), *quote))
            .collect();
        *self.feed.quotes.borrow_mut() = Some(map);
    }

    /// A fresh controller over the shared fakes, as after a power cycle.
    pub fn boot(&mut self) -> DeviceController {
        let (tx, rx) = mpsc::channel();
        *self.feed.events.borrow_mut() = Some(tx.clone());
        self.events = Some(tx);

        let io = Collaborators {
            store: Box::new(self.store.clone()),
            display: Box::new(self.display.clone()),
            network: Box::new(self.network.clone()),
            feed: Box::new(self.feed.clone()),
            portal: Box::new(self.portal.clone()),
            clock: Box::new(self.clock.clone()),
        };
        DeviceController::new(io, rx, ControllerOptions::default())
    }

    /// Queue an event for the next suspension point.
    pub fn press(&self, button: ButtonId, event: ButtonEvent) {
        if let Some(events) = &self.events {
            events.send(InputEvent { button, event }).unwrap();
        }
    }

    /// Deliver an event while the next price fetch is running.
    pub fn press_during_fetch(&self, button: ButtonId, event: ButtonEvent) {
        self.feed
            .during_fetch
            .borrow_mut()
            .push(InputEvent { button, event });
    }
}

/// Step until the controller finishes, recording every state it passed
/// through. Panics if it does not finish within `limit` steps.
pub fn run_recording(
    controller: &mut DeviceController,
    limit: usize,
) -> (Vec<DeviceState>, PowerAction) {
    let mut states = vec![controller.state()];
    for _ in 0..limit {
        if let Some(action) = controller.step() {
            return (states, action);
        }
        states.push(controller.state());
    }
    panic!("controller did not finish within {limit} steps: {states:?}");
}
