//! # Crypto Ticker Core Library
//!
//! Control logic for a battery-powered crypto price ticker: two buttons, a
//! tri-colour e-paper panel, a WiFi radio that is only powered while needed,
//! and long deep sleeps between refreshes.
//!
//! ## Design Philosophy
//!
//! ### Power
//! The device is awake for seconds and asleep for minutes. A deep sleep is a
//! full power cycle, so the only state that survives it is the settings file.
//! Every wake starts from scratch: load settings, join WiFi, fetch once,
//! render, linger briefly for button presses, sleep.
//!
//! ### Input
//! Button edges are debounced per channel with a 50 ms settle timer and
//! classified into `Pressed`, `Released` and `LongPress`. Interrupt context
//! only enqueues raw edges; a worker thread owns the channel state and hands
//! clean events to the controller over a single-consumer queue.
//!
//! ### Collaborators
//! Display, network, price feed, settings store, setup portal and clock are
//! traits, so the state machine runs unchanged against the panel, against the
//! terminal in development mode, and against fakes in tests.
//!
//! ## Modules
//! - [`button`], [`input`]: debounced button channels and the input worker
//! - [`controller`]: the `Init → Configuring | Running → Sleeping` lifecycle
//! - [`settings`]: persisted WiFi/coin/refresh settings
//! - [`config`]: installation config (`ticker-config.toml`)
//! - [`price`], [`coins`]: CoinGecko client and coin catalog
//! - [`display`], [`render`], [`epd2in66b`]: screens and the panel driver
//! - [`network`], [`portal`], [`platform`]: radio, setup form, power control

pub mod button;
pub mod coins;
pub mod config;
pub mod controller;
pub mod display;
pub mod epd2in66b;
pub mod input;
pub mod network;
pub mod platform;
pub mod portal;
pub mod price;
pub mod render;
pub mod settings;

#[cfg(test)]
mod tests;
