//! Button protocol tests driven by simulated, bouncing lines.
//!
//! A [`Line`] is a list of `(ms, level)` transitions. [`drive`] replays it
//! against a channel one millisecond at a time, reporting an edge for every
//! transition and letting the channel sample the line whenever its debounce
//! timer elapses, which is what the input worker does on the device.

use crate::button::{ButtonChannel, ButtonEvent, Level, DEFAULT_LONG_PRESS};
use std::time::{Duration, Instant};

struct Line {
    transitions: Vec<(u64, Level)>,
}

impl Line {
    fn level_at(&self, ms: u64) -> Level {
        self.transitions
            .iter()
            .take_while(|(at, _)| *at <= ms)
            .last()
            .map_or(Level::High, |(_, level)| *level)
    }
}

fn drive(channel: &mut ButtonChannel, line: &Line, until_ms: u64) -> Vec<ButtonEvent> {
    let t0 = Instant::now();
    let mut events = Vec::new();
    for ms in 0..=until_ms {
        let now = t0 + Duration::from_millis(ms);
        if line.transitions.iter().any(|(at, _)| *at == ms) {
            channel.on_edge(now);
        }
        events.extend(channel.poll(now, || line.level_at(ms)));
    }
    events
}

/// Contact bounce: alternate levels separated by `gaps`, ending on `settle`.
/// `gaps` must have an even length so the levels strictly alternate.
fn bounce(start: u64, gaps: &[u64], settle: Level) -> Vec<(u64, Level)> {
    let other = match settle {
        Level::Low => Level::High,
        Level::High => Level::Low,
    };
    let mut at = start;
    let mut out = Vec::with_capacity(gaps.len() + 1);
    for (i, gap) in gaps.iter().enumerate() {
        out.push((at, if i % 2 == 0 { settle } else { other }));
        at += gap;
    }
    out.push((at, settle));
    out
}

/// Deterministic pseudo-random bounce gaps, each shorter than the debounce
/// window.
fn gap_patterns(count: usize) -> Vec<Vec<u64>> {
    let mut seed: u64 = 0x2545_F491;
    let mut next = move || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        seed >> 33
    };
    (0..count)
        .map(|_| {
            let bounces = (next() % 4) as usize * 2 + 2;
            (0..bounces).map(|_| 1 + next() % 20).collect()
        })
        .collect()
}

#[test]
fn bouncy_press_and_release_gives_one_release_without_long_press() {
    for gaps in gap_patterns(25) {
        let mut transitions = bounce(100, &gaps, Level::Low);
        transitions.extend(bounce(700, &gaps, Level::High));
        let line = Line { transitions };

        let mut channel = ButtonChannel::new(None);
        let events = drive(&mut channel, &line, 1500);

        assert_eq!(
            events,
            vec![ButtonEvent::Pressed, ButtonEvent::Released],
            "gaps {gaps:?}"
        );
        assert!(!channel.is_pressed());
    }
}

#[test]
fn short_press_on_long_press_channel_releases_normally() {
    let line = Line {
        transitions: bounce(100, &[3, 5], Level::Low)
            .into_iter()
            .chain(bounce(900, &[2, 4], Level::High))
            .collect(),
    };
    let mut channel = ButtonChannel::new(Some(DEFAULT_LONG_PRESS));

    let events = drive(&mut channel, &line, 1500);
    assert_eq!(events, vec![ButtonEvent::Pressed, ButtonEvent::Released]);
    assert_eq!(channel.pending_long_press(), None);
}

#[test]
fn held_past_threshold_gives_one_long_press_and_no_release() {
    let line = Line {
        transitions: vec![(100, Level::Low), (3000, Level::High)],
    };
    let mut channel = ButtonChannel::new(Some(DEFAULT_LONG_PRESS));

    let events = drive(&mut channel, &line, 3200);
    assert_eq!(events, vec![ButtonEvent::Pressed, ButtonEvent::LongPress]);
    assert!(!channel.suppress_short_press());
    assert!(!channel.is_pressed());
}

#[test]
fn suppression_lasts_for_exactly_one_release() {
    let line = Line {
        transitions: vec![
            // Long hold
            (100, Level::Low),
            (2500, Level::High),
            // Then a short tap
            (3000, Level::Low),
            (3200, Level::High),
        ],
    };
    let mut channel = ButtonChannel::new(Some(DEFAULT_LONG_PRESS));

    let events = drive(&mut channel, &line, 3500);
    assert_eq!(
        events,
        vec![
            ButtonEvent::Pressed,
            ButtonEvent::LongPress,
            ButtonEvent::Pressed,
            ButtonEvent::Released,
        ]
    );
}

#[test]
fn suppression_flag_is_visible_while_held() {
    let line = Line {
        transitions: vec![(0, Level::Low)],
    };
    let mut channel = ButtonChannel::new(Some(DEFAULT_LONG_PRESS));

    drive(&mut channel, &line, 2100);
    assert!(channel.suppress_short_press());
    assert!(channel.is_pressed());
}

#[test]
fn two_edges_inside_the_window_settle_once() {
    let line = Line {
        transitions: vec![(0, Level::Low), (30, Level::High)],
    };
    let mut channel = ButtonChannel::new(None);

    let events = drive(&mut channel, &line, 300);
    assert_eq!(channel.settle_evaluations(), 1);
    // The line settled back where it started: nothing to report.
    assert!(events.is_empty());
}

#[test]
fn stuck_line_stays_latched_pressed() {
    let line = Line {
        transitions: vec![(10, Level::Low)],
    };
    let mut channel = ButtonChannel::new(None);

    let events = drive(&mut channel, &line, 5000);
    assert_eq!(events, vec![ButtonEvent::Pressed]);
    assert!(channel.is_pressed());
    assert_eq!(channel.next_deadline(), None);
}
