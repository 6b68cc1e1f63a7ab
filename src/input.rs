//! # Button Input Worker
//!
//! Owns both [`ButtonChannel`]s and moves events out of interrupt context.
//!
//! ## Threading model
//! - Edge interrupts (GPIO library callback or the stdin simulator) only push a
//!   [`RawEdge`] into an mpsc queue. They never block, sample or render.
//! - One worker thread owns the channels, waits on that queue with a timeout
//!   equal to the earliest pending debounce/long-press deadline, samples lines
//!   through a [`LineSampler`] and forwards [`InputEvent`]s to the controller
//!   through a second, single-consumer channel.
//!
//! Nothing is shared between threads except the two queues, so the channel
//! state machines need no locking.

use crate::button::{ButtonChannel, ButtonEvent, Level};
use crate::config::HardwareConfig;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// The two physical buttons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ButtonId {
    /// Short press shows the next configured coin.
    Cycle,
    /// Short press requests sleep, long press is the factory reset.
    Sleep,
}

impl std::fmt::Display for ButtonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ButtonId::Cycle => write!(f, "cycle"),
            ButtonId::Sleep => write!(f, "sleep/reset"),
        }
    }
}

/// An unprocessed edge reported from interrupt context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawEdge {
    pub button: ButtonId,
    pub at: Instant,
}

/// A debounced event tagged with the button it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputEvent {
    pub button: ButtonId,
    pub event: ButtonEvent,
}

/// Reads the instantaneous level of a button line.
pub trait LineSampler {
    fn level(&mut self, button: ButtonId) -> Level;
}

/// Both button channels plus the worker loop that drives them.
#[derive(Clone, Debug)]
pub struct ButtonInput {
    cycle: ButtonChannel,
    sleep: ButtonChannel,
}

impl ButtonInput {
    pub fn new(cycle: ButtonChannel, sleep: ButtonChannel) -> Self {
        Self { cycle, sleep }
    }

    /// Cycle button without long press, sleep button with the configured
    /// long-press threshold.
    pub fn from_config(hw: &HardwareConfig) -> Self {
        let debounce = Duration::from_millis(hw.debounce_ms);
        Self::new(
            ButtonChannel::new(None).with_debounce(debounce),
            ButtonChannel::new(Some(Duration::from_millis(hw.long_press_ms)))
                .with_debounce(debounce),
        )
    }

    pub fn channel(&self, button: ButtonId) -> &ButtonChannel {
        match button {
            ButtonId::Cycle => &self.cycle,
            ButtonId::Sleep => &self.sleep,
        }
    }

    fn channel_mut(&mut self, button: ButtonId) -> &mut ButtonChannel {
        match button {
            ButtonId::Cycle => &mut self.cycle,
            ButtonId::Sleep => &mut self.sleep,
        }
    }

    pub fn handle_edge(&mut self, edge: RawEdge) {
        self.channel_mut(edge.button).on_edge(edge.at);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.cycle.next_deadline(), self.sleep.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Service elapsed timers on both channels.
    pub fn service(&mut self, now: Instant, sampler: &mut impl LineSampler) -> Vec<InputEvent> {
        let mut out = Vec::new();
        for button in [ButtonId::Cycle, ButtonId::Sleep] {
            let events = self
                .channel_mut(button)
                .poll(now, || sampler.level(button));
            out.extend(events.into_iter().map(|event| InputEvent { button, event }));
        }
        out
    }

    /// Worker loop. Returns when every edge sender or the event receiver is gone.
    pub fn run(
        mut self,
        edges: Receiver<RawEdge>,
        mut sampler: impl LineSampler,
        events: Sender<InputEvent>,
    ) {
        loop {
            let received = match self.next_deadline() {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    match edges.recv_timeout(timeout) {
                        Ok(edge) => Some(edge),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match edges.recv() {
                    Ok(edge) => Some(edge),
                    Err(_) => break,
                },
            };

            if let Some(edge) = received {
                self.handle_edge(edge);
            }

            for event in self.service(Instant::now(), &mut sampler) {
                debug!("{} button: {:?}", event.button, event.event);
                if events.send(event).is_err() {
                    return;
                }
            }
        }
        info!("button input worker stopped");
    }

    /// Run the worker on its own thread.
    pub fn spawn<S>(
        self,
        edges: Receiver<RawEdge>,
        sampler: S,
        events: Sender<InputEvent>,
    ) -> std::io::Result<thread::JoinHandle<()>>
    where
        S: LineSampler + Send + 'static,
    {
        thread::Builder::new()
            .name("button-input".to_string())
            .spawn(move || self.run(edges, sampler, events))
    }
}

/// Line levels latched from the most recent report, for interrupt sources
/// that deliver the new level with the edge and for simulated buttons.
#[derive(Clone, Debug, Default)]
pub struct LatchedLines {
    held: Arc<[AtomicBool; 2]>,
}

impl LatchedLines {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(button: ButtonId) -> usize {
        match button {
            ButtonId::Cycle => 0,
            ButtonId::Sleep => 1,
        }
    }

    pub fn set_held(&self, button: ButtonId, held: bool) {
        self.held[Self::slot(button)].store(held, Ordering::SeqCst);
    }
}

impl LineSampler for LatchedLines {
    fn level(&mut self, button: ButtonId) -> Level {
        // Active-low wiring: a held button reads Low.
        if self.held[Self::slot(button)].load(Ordering::SeqCst) {
            Level::Low
        } else {
            Level::High
        }
    }
}

/// Presses simulated buttons, reporting edges the way an interrupt would.
#[derive(Clone, Debug)]
pub struct SimulatedButtons {
    lines: LatchedLines,
    edges: Sender<RawEdge>,
}

impl SimulatedButtons {
    pub fn new(lines: LatchedLines, edges: Sender<RawEdge>) -> Self {
        Self { lines, edges }
    }

    pub fn press(&self, button: ButtonId) {
        self.lines.set_held(button, true);
        let _ = self.edges.send(RawEdge {
            button,
            at: Instant::now(),
        });
    }

    pub fn release(&self, button: ButtonId) {
        self.lines.set_held(button, false);
        let _ = self.edges.send(RawEdge {
            button,
            at: Instant::now(),
        });
    }

    /// Hold the button for `duration`, then let go.
    pub fn hold(&self, button: ButtonId, duration: Duration) {
        self.press(button);
        thread::sleep(duration);
        self.release(button);
    }

    pub fn tap(&self, button: ButtonId) {
        self.hold(button, Duration::from_millis(120));
    }
}
