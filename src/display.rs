//! # Display Boundary
//!
//! The controller describes *what* to show as a [`Screen`]; implementations
//! of [`Display`] decide how to put it on glass. Rendering is synchronous and
//! treated as always succeeding: panel drivers log their own failures rather
//! than handing them back to the state machine.
//!
//! Two implementations ship with the crate:
//! - [`TerminalDisplay`] prints to stdout (development mode, `--stdout`)
//! - `EinkDisplay` in [`crate::epd2in66b`] drives the tri-colour panel

use crate::coins;
use crate::price::{PriceSnapshot, Quote};
use chrono::{DateTime, Local};

/// Placeholder for a missing value.
pub const NOT_AVAILABLE: &str = "N/A";

/// Something the device can show.
#[derive(Clone, Debug, PartialEq)]
pub enum Screen {
    /// Up to three lines of plain text
    Message(Vec<String>),
    /// Price of one coin
    Price(PriceView),
}

impl Screen {
    pub fn message(lines: &[&str]) -> Self {
        Screen::Message(lines.iter().map(|line| line.to_string()).collect())
    }

    /// The price screen for `coin_id`, or a notice when the snapshot has no
    /// entry for it.
    pub fn for_coin(snapshot: &PriceSnapshot, coin_id: &str) -> Self {
        match snapshot.quote(coin_id) {
            Some(quote) => Screen::Price(PriceView::new(coin_id, quote, snapshot.fetched_at)),
            None => Screen::Message(vec![format!("No data for {coin_id}")]),
        }
    }
}

/// Pre-formatted strings for a price screen.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceView {
    pub name: String,
    pub price: String,
    pub change: String,
    /// Drawn in the accent colour when true
    pub change_negative: bool,
    pub updated: String,
}

impl PriceView {
    pub fn new(coin_id: &str, quote: &Quote, fetched_at: DateTime<Local>) -> Self {
        Self {
            name: coins::friendly_name(coin_id).to_string(),
            price: quote.usd.map_or_else(|| NOT_AVAILABLE.to_string(), format_usd),
            change: quote
                .usd_24h_change
                .map_or_else(|| NOT_AVAILABLE.to_string(), format_change),
            change_negative: quote.usd_24h_change.is_some_and(|change| change < 0.0),
            updated: format!("Updated {}", fetched_at.format("%H:%M")),
        }
    }
}

/// `65000.5` → `$65,000.50`
pub fn format_usd(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((&fixed, "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}${grouped}.{cents}")
}

/// `-2.3` → `-2.30%`, `1.2` → `+1.20%`
pub fn format_change(value: f64) -> String {
    format!("{value:+.2}%")
}

/// Output device for screens.
pub trait Display {
    /// Blank the drawing surface before the next render.
    fn clear(&mut self);
    fn render(&mut self, screen: &Screen);
    /// Put the panel into its low-power state ahead of deep sleep.
    fn sleep(&mut self) {}
}

/// Prints screens to the terminal.
#[derive(Debug, Default)]
pub struct TerminalDisplay;

impl TerminalDisplay {
    pub fn new() -> Self {
        Self
    }
}

/// Text box drawn by [`TerminalDisplay`].
pub fn draw_ascii(screen: &Screen) -> String {
    let lines: Vec<String> = match screen {
        Screen::Message(lines) => lines.clone(),
        Screen::Price(view) => {
            let marker = if view.change_negative { " ▼" } else { "" };
            vec![
                view.name.clone(),
                view.price.clone(),
                format!("{}{}", view.change, marker),
                view.updated.clone(),
            ]
        }
    };

    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let border = "─".repeat(width + 2);
    let mut out = format!("┌{border}┐\n");
    for line in &lines {
        out.push_str(&format!("│ {:<width$} │\n", line, width = width));
    }
    out.push_str(&format!("└{border}┘"));
    out
}

impl Display for TerminalDisplay {
    fn clear(&mut self) {}

    fn render(&mut self, screen: &Screen) {
        println!("{}", draw_ascii(screen));
    }

    fn sleep(&mut self) {
        println!("(display asleep)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_format_usd() {
        assert_eq!(format_usd(65000.5), "$65,000.50");
        assert_eq!(format_usd(0.1234), "$0.12");
        assert_eq!(format_usd(999.999), "$1,000.00");
        assert_eq!(format_usd(1234567.0), "$1,234,567.00");
        assert_eq!(format_usd(-42.0), "-$42.00");
    }

    #[test]
    fn test_format_change() {
        assert_eq!(format_change(-2.3), "-2.30%");
        assert_eq!(format_change(1.2), "+1.20%");
        assert_eq!(format_change(0.0), "+0.00%");
    }

    #[test]
    fn test_price_view_for_bitcoin() {
        let quote = Quote {
            usd: Some(65000.5),
            usd_24h_change: Some(-2.3),
        };
        let view = PriceView::new("bitcoin", &quote, Local::now());
        assert_eq!(view.name, "Bitcoin");
        assert_eq!(view.price, "$65,000.50");
        assert_eq!(view.change, "-2.30%");
        assert!(view.change_negative);
        assert!(view.updated.starts_with("Updated "));
    }

    #[test]
    fn test_missing_fields_show_not_available() {
        let view = PriceView::new("mystery", &Quote::default(), Local::now());
        assert_eq!(view.name, "Unknown Coin");
        assert_eq!(view.price, NOT_AVAILABLE);
        assert_eq!(view.change, NOT_AVAILABLE);
        assert!(!view.change_negative);
    }

    #[test]
    fn test_missing_coin_is_message() {
        let snapshot = PriceSnapshot::new(HashMap::new(), Local::now());
        assert_eq!(
            Screen::for_coin(&snapshot, "tron"),
            Screen::message(&["No data for tron"])
        );
    }

    #[test]
    fn test_ascii_box() {
        let out = draw_ascii(&Screen::message(&["API Error", "Could not fetch prices."]));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("│ API Error "));
        assert!(lines
            .iter()
            .all(|l| l.chars().count() == lines[0].chars().count()));
    }
}
