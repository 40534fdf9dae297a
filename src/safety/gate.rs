//! Gate decisions and the explicit safety context.
//!
//! Every monitor answers "may new risk be taken?" with a [`GateDecision`]
//! whose block reasons form one closed enum — callers match exhaustively
//! instead of parsing strings, and every blocking decision still carries a
//! human-readable reason through `Display`.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::clock::SharedClock;
use crate::safety::data_quality::{DataQualityMonitor, FeedHealth};
use crate::safety::market_hours::{MarketHoursMonitor, Session};
use crate::safety::risk::RiskManager;
use crate::safety::tracker::PositionTracker;

/// Why a closed market is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedCause {
    Weekend,
    Holiday,
    NoLiquidity,
}

impl ClosedCause {
    /// Display string for the cause.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClosedCause::Weekend => "weekend",
            ClosedCause::Holiday => "holiday",
            ClosedCause::NoLiquidity => "no liquidity",
        }
    }
}

/// Why a gate refused to allow new risk.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockReason {
    /// The market-data feed is not live for this instrument.
    FeedNotLive {
        instrument: String,
        health: FeedHealth,
        /// Seconds since the last receipt, if the feed was ever seen.
        age_secs: Option<i64>,
    },
    /// The market is closed (weekend, holiday, or no liquidity).
    MarketClosed {
        instrument: String,
        session: Session,
        cause: ClosedCause,
    },
    /// The emergency stop has been latched.
    EmergencyStop,
    /// Today's realized dollar loss is at or beyond the daily limit.
    DailyLossDollars { loss: f64, limit: f64 },
    /// Today's realized R loss is at or beyond the daily limit.
    DailyLossR { loss: f64, limit: f64 },
    /// This week's realized dollar loss is at or beyond the weekly limit.
    WeeklyLossDollars { loss: f64, limit: f64 },
    /// This week's realized R loss is at or beyond the weekly limit.
    WeeklyLossR { loss: f64, limit: f64 },
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::FeedNotLive {
                instrument,
                health,
                age_secs,
            } => match age_secs {
                Some(age) => write!(
                    f,
                    "market data for {instrument} is {health} (last bar {age}s ago)"
                ),
                None => write!(f, "market data for {instrument} is {health}: never received a bar"),
            },
            BlockReason::MarketClosed {
                instrument,
                session,
                cause,
            } => write!(
                f,
                "market closed for {instrument}: {} ({session} session)",
                cause.as_str()
            ),
            BlockReason::EmergencyStop => write!(f, "emergency stop is active"),
            BlockReason::DailyLossDollars { loss, limit } => {
                write!(f, "daily loss limit breached: ${loss:.2} >= ${limit:.2}")
            }
            BlockReason::DailyLossR { loss, limit } => {
                write!(f, "daily loss limit breached: {loss:.2}R >= {limit:.2}R")
            }
            BlockReason::WeeklyLossDollars { loss, limit } => {
                write!(f, "weekly loss limit breached: ${loss:.2} >= ${limit:.2}")
            }
            BlockReason::WeeklyLossR { loss, limit } => {
                write!(f, "weekly loss limit breached: {loss:.2}R >= {limit:.2}R")
            }
        }
    }
}

/// Outcome of a safety gate: allow, or block with a typed reason.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Allow,
    Block(BlockReason),
}

impl GateDecision {
    /// Construct a blocking decision.
    pub fn block(reason: BlockReason) -> Self {
        GateDecision::Block(reason)
    }

    /// May the caller proceed?
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }

    /// The block reason, if any.
    pub fn reason(&self) -> Option<&BlockReason> {
        match self {
            GateDecision::Allow => None,
            GateDecision::Block(reason) => Some(reason),
        }
    }

    /// Consume the decision, yielding the block reason if any.
    pub fn into_reason(self) -> Option<BlockReason> {
        match self {
            GateDecision::Allow => None,
            GateDecision::Block(reason) => Some(reason),
        }
    }
}

impl std::fmt::Display for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateDecision::Allow => write!(f, "allowed"),
            GateDecision::Block(reason) => write!(f, "blocked: {reason}"),
        }
    }
}

/// The explicit composition of the four safety monitors.
///
/// No globals and no hidden reset: the owning loop constructs one context
/// from configuration and passes it by reference. The fields are public —
/// the feed handler drives `data_quality`, the order-management loop drives
/// `risk` and `tracker` directly — and [`Self::pre_entry_check`] is the
/// conjunction consulted before any new position is opened.
pub struct SafetyContext {
    pub data_quality: DataQualityMonitor,
    pub market_hours: MarketHoursMonitor,
    pub risk: RiskManager,
    pub tracker: PositionTracker,
    clock: SharedClock,
}

impl SafetyContext {
    /// Assemble a context from independently constructed monitors.
    pub fn new(
        data_quality: DataQualityMonitor,
        market_hours: MarketHoursMonitor,
        risk: RiskManager,
        tracker: PositionTracker,
        clock: SharedClock,
    ) -> Self {
        Self {
            data_quality,
            market_hours,
            risk,
            tracker,
            clock,
        }
    }

    /// May a new position be opened on `instrument` right now?
    ///
    /// Conjoins the three gates in fail-closed order — feed quality, market
    /// hours, risk — and returns the first block. A block is logged at
    /// `warn` here so individual monitors stay pure queries.
    pub fn pre_entry_check(&self, instrument: &str) -> GateDecision {
        let decision = self.evaluate(instrument, self.clock.now());
        if let Some(reason) = decision.reason() {
            warn!(instrument, %reason, "entry blocked");
        }
        decision
    }

    fn evaluate(&self, instrument: &str, now: DateTime<Utc>) -> GateDecision {
        let feed = self.data_quality.is_safe_to_trade(instrument);
        if !feed.is_allowed() {
            return feed;
        }
        let conditions = self.market_hours.get_market_conditions(instrument, now);
        let hours = conditions.gate_decision();
        if !hours.is_allowed() {
            return hours;
        }
        self.risk.is_trading_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_predicates() {
        assert!(GateDecision::Allow.is_allowed());
        assert!(GateDecision::Allow.reason().is_none());

        let blocked = GateDecision::block(BlockReason::EmergencyStop);
        assert!(!blocked.is_allowed());
        assert_eq!(blocked.reason(), Some(&BlockReason::EmergencyStop));
        assert_eq!(blocked.into_reason(), Some(BlockReason::EmergencyStop));
    }

    #[test]
    fn test_reason_strings_name_the_limit() {
        let reason = BlockReason::DailyLossDollars {
            loss: 512.0,
            limit: 500.0,
        };
        assert_eq!(
            format!("{reason}"),
            "daily loss limit breached: $512.00 >= $500.00"
        );

        let reason = BlockReason::WeeklyLossR {
            loss: 8.5,
            limit: 8.0,
        };
        assert_eq!(
            format!("{reason}"),
            "weekly loss limit breached: 8.50R >= 8.00R"
        );
    }

    #[test]
    fn test_feed_reason_with_and_without_age() {
        let stale = BlockReason::FeedNotLive {
            instrument: "XAUUSD".to_string(),
            health: FeedHealth::Stale,
            age_secs: Some(75),
        };
        assert_eq!(
            format!("{stale}"),
            "market data for XAUUSD is stale (last bar 75s ago)"
        );

        let unknown = BlockReason::FeedNotLive {
            instrument: "XAUUSD".to_string(),
            health: FeedHealth::Unknown,
            age_secs: None,
        };
        assert!(format!("{unknown}").contains("never received"));
    }
}
