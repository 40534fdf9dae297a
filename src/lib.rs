#![deny(unreachable_pub)]

//! Runtime trading safety core for an intraday breakout stack.
//!
//! Four monitors gate whether new trading risk may be taken and watch what
//! is already on: feed trustworthiness ([`DataQualityMonitor`]), session and
//! liquidity classification ([`MarketHoursMonitor`]), the authoritative
//! exposure/loss ledger ([`RiskManager`]), and per-tick position alerting
//! ([`PositionTracker`]). An order-management loop owns and drives all four,
//! usually through a [`SafetyContext`].
//!
//! Everything is synchronous, single-writer and in-memory: queries
//! recompute from stored state plus an injected [`clock::Clock`], expected
//! business outcomes are typed return values with human-readable reasons,
//! and configuration errors fail at construction.

pub mod clock;
mod errors;
pub mod safety;
pub mod types;

// Re-exports
pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use errors::ConfigError;
pub use safety::*;
pub use types::{Bar, Direction, Position};
