//! The runtime trading safety core.
//!
//! Four collaborating monitors, composed by the order-management loop:
//!
//! ```text
//! +--------------------+   +--------------------+   +-------------+
//! | DataQualityMonitor |   | MarketHoursMonitor |   | RiskManager |
//! +--------------------+   +--------------------+   +-------------+
//!          \                        |                      /
//!           \                       v                     /
//!            +--------------> SafetyContext <------------+
//!                          pre_entry_check()
//!
//! +-----------------+
//! | PositionTracker |  <- per-tick alerting for open positions
//! +-----------------+
//! ```
//!
//! Before a position is opened the caller conjoins the three gates (the
//! context does this in fail-closed order); on fill it calls
//! `RiskManager::add_position`, on every tick of an open position
//! `PositionTracker::check_position_alerts`, and on close
//! `RiskManager::remove_position`. Everything is synchronous and
//! single-writer: queries recompute from stored state and the injected
//! clock, and nothing here spawns a thread or blocks.

mod data_quality;
mod gate;
mod market_hours;
pub mod risk;
mod tracker;

pub use data_quality::{DataQualityConfig, DataQualityMonitor, FeedHealth, FeedStatus};
pub use gate::{BlockReason, ClosedCause, GateDecision, SafetyContext};
pub use market_hours::{
    Liquidity, MarketConditions, MarketHoursMonitor, Session, SessionCalendar,
};
pub use risk::{
    ClosedPosition, PnlTotals, PositionRejected, RiskLimits, RiskManager, RiskMetrics, WeekKey,
};
pub use tracker::{Alert, AlertType, HoldLimits, PositionTracker, TrackerConfig};

#[cfg(test)]
mod tests;
