//! Outbound messaging abstractions (Telegram is the only adapter).

pub mod port;
pub mod throttled;
