//! # Test Suite for the Crypto Ticker
//!
//! Unit tests live next to the code they cover. This module holds the
//! cross-module tests: the button protocol driven through realistic bounce
//! patterns and the device lifecycle driven against in-memory collaborators
//! on a virtual clock.

mod button_tests;
mod fakes;
