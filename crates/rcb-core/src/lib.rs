//! Core domain + application logic for the Racó notice bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and the FIB API
//! live behind ports (traits) implemented in adapter crates.

pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod feed;
pub mod fibapi;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod notice;
pub mod scheduler;
pub mod security;
pub mod store;
pub mod tokens;
pub mod upstream;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
