//! # Debounced Button Channel
//!
//! Turns the raw, bouncing edges of one push-button line into a clean stream of
//! [`ButtonEvent`]s. Each channel is a small explicit state machine:
//!
//! ```text
//!   Idle ──(settled active)──▶ Pressed ──(threshold elapsed)──▶ LongPressed
//!    ▲                            │                                 │
//!    └────(settled inactive)──────┴─────────(settled inactive)──────┘
//! ```
//!
//! Orthogonal to the phase there are two one-shot timers:
//! - **debounce** (50 ms): restarted on every raw edge, so a burst of contact
//!   bounce collapses into a single settle evaluation
//! - **long press**: armed when a press is confirmed, only on channels that
//!   were configured with a threshold
//!
//! The channel never reads the hardware itself. Whoever owns it reports edges
//! with [`ButtonChannel::on_edge`] and, when a deadline passes, hands in the
//! sampled line level through [`ButtonChannel::poll`]. That keeps the protocol
//! deterministic and testable with synthetic timestamps.

use log::debug;
use std::time::{Duration, Instant};

/// Settle time applied after every raw edge.
pub const DEBOUNCE: Duration = Duration::from_millis(50);

/// Hold time after which a press counts as a long press.
pub const DEFAULT_LONG_PRESS: Duration = Duration::from_millis(2000);

/// Electrical level of a digital input line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    High,
    Low,
}

/// Which level means "pressed" on this line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Polarity {
    /// Button pulls the line to ground; the normal wiring with a pull-up.
    ActiveLow,
    ActiveHigh,
}

impl Polarity {
    pub fn is_active(self, level: Level) -> bool {
        matches!(
            (self, level),
            (Polarity::ActiveLow, Level::Low) | (Polarity::ActiveHigh, Level::High)
        )
    }
}

/// Debounced view of the switch contacts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebouncedState {
    Up,
    Down,
}

/// Semantic events produced by a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonEvent {
    /// A press has been confirmed after debouncing.
    Pressed,
    /// A short press ended. Not emitted when the press already fired `LongPress`.
    Released,
    /// The button has been held for the configured threshold.
    LongPress,
}

/// Identifies which of a channel's timers has elapsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    Debounce,
    LongPress,
}

/// A cancelable one-shot deadline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OneShot {
    deadline: Option<Instant>,
}

impl OneShot {
    /// Arm the timer, replacing any pending deadline.
    pub fn arm(&mut self, at: Instant, period: Duration) {
        self.deadline = Some(at + period);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Pressed { since: Instant },
    LongPressed { since: Instant },
}

/// Debounce and long-press protocol for a single button line.
#[derive(Clone, Debug)]
pub struct ButtonChannel {
    polarity: Polarity,
    debounce_period: Duration,
    long_press_threshold: Option<Duration>,
    phase: Phase,
    debounce: OneShot,
    long_press: OneShot,
    settle_evaluations: u32,
}

impl ButtonChannel {
    /// Create an active-low channel. `long_press_threshold` of `None` means the
    /// channel only ever reports short presses.
    pub fn new(long_press_threshold: Option<Duration>) -> Self {
        Self {
            polarity: Polarity::ActiveLow,
            debounce_period: DEBOUNCE,
            long_press_threshold,
            phase: Phase::Idle,
            debounce: OneShot::default(),
            long_press: OneShot::default(),
            settle_evaluations: 0,
        }
    }

    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    pub fn with_debounce(mut self, period: Duration) -> Self {
        self.debounce_period = period;
        self
    }

    /// Report a raw edge (either direction). Restarts the settle timer.
    pub fn on_edge(&mut self, now: Instant) {
        if self.debounce.is_pending() {
            debug!("edge during debounce window, restarting settle timer");
        }
        self.debounce.arm(now, self.debounce_period);
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.debounce.deadline(), self.long_press.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// The timer that should be serviced at `now`, earliest deadline first.
    pub fn due(&self, now: Instant) -> Option<TimerKind> {
        let debounce = self
            .debounce
            .deadline()
            .filter(|_| self.debounce.is_due(now));
        let long_press = self
            .long_press
            .deadline()
            .filter(|_| self.long_press.is_due(now));
        match (debounce, long_press) {
            (Some(d), Some(l)) if l < d => Some(TimerKind::LongPress),
            (Some(_), _) => Some(TimerKind::Debounce),
            (None, Some(_)) => Some(TimerKind::LongPress),
            (None, None) => None,
        }
    }

    /// Service every elapsed timer. `sample` is called at most once per
    /// elapsed debounce timer to read the current line level.
    pub fn poll(&mut self, now: Instant, mut sample: impl FnMut() -> Level) -> Vec<ButtonEvent> {
        let mut events = Vec::new();
        while let Some(kind) = self.due(now) {
            let event = match kind {
                TimerKind::Debounce => {
                    let at = self.debounce.deadline().unwrap_or(now);
                    self.debounce.cancel();
                    self.on_settled(at, sample())
                }
                TimerKind::LongPress => {
                    self.long_press.cancel();
                    self.on_long_press_elapsed()
                }
            };
            events.extend(event);
        }
        events
    }

    /// Evaluate the settled line level. Only a confirmed change of the latched
    /// state produces an event.
    pub fn on_settled(&mut self, at: Instant, level: Level) -> Option<ButtonEvent> {
        self.settle_evaluations += 1;
        let active = self.polarity.is_active(level);

        match (self.phase, active) {
            (Phase::Idle, true) => {
                self.phase = Phase::Pressed { since: at };
                if let Some(threshold) = self.long_press_threshold {
                    self.long_press.arm(at, threshold);
                }
                Some(ButtonEvent::Pressed)
            }
            (Phase::Pressed { .. }, false) => {
                self.phase = Phase::Idle;
                self.long_press.cancel();
                Some(ButtonEvent::Released)
            }
            (Phase::LongPressed { .. }, false) => {
                debug!("release after long press, short press suppressed");
                self.phase = Phase::Idle;
                self.long_press.cancel();
                None
            }
            _ => None,
        }
    }

    /// Long-press timer expiry. Ignored unless the button is still held.
    pub fn on_long_press_elapsed(&mut self) -> Option<ButtonEvent> {
        match self.phase {
            Phase::Pressed { since } => {
                self.phase = Phase::LongPressed { since };
                Some(ButtonEvent::LongPress)
            }
            _ => None,
        }
    }

    pub fn is_pressed(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    pub fn debounced_state(&self) -> DebouncedState {
        if self.is_pressed() {
            DebouncedState::Down
        } else {
            DebouncedState::Up
        }
    }

    /// When the current press was confirmed. `None` while released.
    pub fn press_started_at(&self) -> Option<Instant> {
        match self.phase {
            Phase::Pressed { since } | Phase::LongPressed { since } => Some(since),
            Phase::Idle => None,
        }
    }

    /// True between a fired long press and the following release.
    pub fn suppress_short_press(&self) -> bool {
        matches!(self.phase, Phase::LongPressed { .. })
    }

    pub fn long_press_threshold(&self) -> Option<Duration> {
        self.long_press_threshold
    }

    pub fn pending_debounce(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    pub fn pending_long_press(&self) -> Option<Instant> {
        self.long_press.deadline()
    }

    /// Number of settle evaluations performed so far.
    pub fn settle_evaluations(&self) -> u32 {
        self.settle_evaluations
    }
}
