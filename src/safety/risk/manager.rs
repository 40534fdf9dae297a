//! The transactional risk gate and ledger owner.
//!
//! `RiskManager` is the single authority over position exposure: positions
//! enter the active set only through `add_position`, leave it only through
//! `remove_position`, and every exit lands exactly once in the append-only
//! ledger that backs the daily and weekly loss gates. The emergency stop is
//! latched for the lifetime of the instance; there is no reset.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::clock::SharedClock;
use crate::errors::ConfigError;
use crate::safety::gate::{BlockReason, GateDecision};
use crate::safety::risk::ledger::{ClosedPosition, Ledger, PnlTotals, WeekKey};
use crate::safety::risk::limits::RiskLimits;
use crate::types::Position;

/// Why a position operation was refused.
///
/// These are expected business outcomes, not errors in the exceptional
/// sense: the order-management loop branches on them and every variant
/// carries a human-readable reason through `Display`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PositionRejected {
    /// The trading gate is closed (emergency stop or a loss limit).
    #[error("trading blocked: {0}")]
    TradingBlocked(BlockReason),

    /// The concurrent-position cap is already reached.
    #[error("too many open positions: {active} active, limit {limit}")]
    TooManyPositions { active: usize, limit: usize },

    /// The position risks more than the per-position account fraction.
    #[error(
        "position risk too large: {risk_pct:.2}% of account exceeds {limit_pct:.2}% limit"
    )]
    RiskTooLarge { risk_pct: f64, limit_pct: f64 },

    /// A position with this id is already active.
    #[error("duplicate position id: {id}")]
    DuplicateId { id: String },

    /// The position (or exit) fails basic consistency checks.
    #[error("malformed position: bad {field}")]
    Malformed { field: &'static str },

    /// No active position has this id.
    #[error("unknown position id: {id}")]
    UnknownPosition { id: String },
}

/// Point-in-time risk snapshot for external dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct RiskMetrics {
    pub timestamp: DateTime<Utc>,
    pub daily: PnlTotals,
    pub weekly: PnlTotals,
    pub active_positions: usize,
    pub max_concurrent_positions: usize,
    /// Total initial risk dollars across the active set.
    pub open_risk_dollars: f64,
    pub emergency_stop: bool,
    pub account_size: f64,
}

/// Authoritative ledger and gate for position exposure and realized losses.
pub struct RiskManager {
    limits: RiskLimits,
    account_size: f64,
    timezone: FixedOffset,
    clock: SharedClock,
    active: HashMap<String, Position>,
    ledger: Ledger,
    emergency_stop: bool,
}

impl RiskManager {
    /// Create a risk manager.
    ///
    /// Fails if the limits are inconsistent or the account size is not a
    /// positive number — configuration errors belong at construction, not
    /// in the trading loop.
    pub fn new(
        limits: RiskLimits,
        account_size: f64,
        timezone: FixedOffset,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        limits.validate()?;
        if !account_size.is_finite() || account_size <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "account_size",
                value: account_size,
            });
        }
        Ok(Self {
            limits,
            account_size,
            timezone,
            clock,
            active: HashMap::new(),
            ledger: Ledger::new(),
            emergency_stop: false,
        })
    }

    /// Get the configured limits.
    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Get the account size.
    pub fn account_size(&self) -> f64 {
        self.account_size
    }

    /// May new risk be taken right now?
    ///
    /// Checked in strict precedence order: the emergency stop is absolute;
    /// then today's realized loss against either daily limit; then this ISO
    /// week's realized loss against either weekly limit.
    pub fn is_trading_allowed(&self) -> GateDecision {
        if self.emergency_stop {
            return GateDecision::block(BlockReason::EmergencyStop);
        }

        let now = self.clock.now();
        let local_date = now.with_timezone(&self.timezone).date_naive();

        let daily = self.ledger.daily_totals(local_date);
        if daily.loss_dollars() >= self.limits.daily_loss_dollars {
            return GateDecision::block(BlockReason::DailyLossDollars {
                loss: daily.loss_dollars(),
                limit: self.limits.daily_loss_dollars,
            });
        }
        if daily.loss_r() >= self.limits.daily_loss_r {
            return GateDecision::block(BlockReason::DailyLossR {
                loss: daily.loss_r(),
                limit: self.limits.daily_loss_r,
            });
        }

        let weekly = self.ledger.weekly_totals(WeekKey::from_date(local_date));
        if weekly.loss_dollars() >= self.limits.weekly_loss_dollars {
            return GateDecision::block(BlockReason::WeeklyLossDollars {
                loss: weekly.loss_dollars(),
                limit: self.limits.weekly_loss_dollars,
            });
        }
        if weekly.loss_r() >= self.limits.weekly_loss_r {
            return GateDecision::block(BlockReason::WeeklyLossR {
                loss: weekly.loss_r(),
                limit: self.limits.weekly_loss_r,
            });
        }

        GateDecision::Allow
    }

    /// Admit a filled position into the active set.
    ///
    /// All-or-nothing: a rejection leaves no trace. Rejections are expected
    /// outcomes and each is logged at `warn` with its reason.
    pub fn add_position(&mut self, position: Position) -> Result<(), PositionRejected> {
        let outcome = self.check_admission(&position);
        match outcome {
            Ok(()) => {
                info!(
                    position_id = %position.position_id,
                    instrument = %position.instrument,
                    direction = %position.direction,
                    entry = position.entry_price,
                    stop = position.stop_price,
                    risk_dollars = position.risk_dollars,
                    "position admitted"
                );
                self.active
                    .insert(position.position_id.clone(), position);
                Ok(())
            }
            Err(rejection) => {
                warn!(
                    position_id = %position.position_id,
                    reason = %rejection,
                    "position rejected"
                );
                Err(rejection)
            }
        }
    }

    /// Settle an active position and append its outcome to the ledger.
    ///
    /// An unknown id is rejected and logged, never silently dropped. On
    /// success the entry is returned as written to the ledger.
    pub fn remove_position(
        &mut self,
        position_id: &str,
        exit_price: f64,
        exit_time: DateTime<Utc>,
    ) -> Result<ClosedPosition, PositionRejected> {
        if !exit_price.is_finite() || exit_price <= 0.0 {
            warn!(position_id, exit_price, "rejected close with bad exit price");
            return Err(PositionRejected::Malformed {
                field: "exit_price",
            });
        }
        let Some(position) = self.active.remove(position_id) else {
            warn!(position_id, "attempted to close unknown position");
            return Err(PositionRejected::UnknownPosition {
                id: position_id.to_string(),
            });
        };

        let closed = ClosedPosition::settle(position, exit_price, exit_time, self.timezone);
        info!(
            position_id,
            exit_price,
            realized_r = closed.realized_r,
            realized_dollars = closed.realized_dollars,
            exit_date = %closed.exit_date,
            "position closed"
        );
        self.ledger.append(closed.clone());
        Ok(closed)
    }

    /// Realized totals for the trading-local calendar date containing
    /// `reference`.
    pub fn get_daily_pnl(&self, reference: DateTime<Utc>) -> PnlTotals {
        let date = reference.with_timezone(&self.timezone).date_naive();
        self.ledger.daily_totals(date)
    }

    /// Realized totals for the ISO week containing `reference`.
    pub fn get_weekly_pnl(&self, reference: DateTime<Utc>) -> PnlTotals {
        let date = reference.with_timezone(&self.timezone).date_naive();
        self.ledger.weekly_totals(WeekKey::from_date(date))
    }

    /// Latch the emergency stop for the remaining lifetime of this instance.
    ///
    /// Idempotent; there is no reset. Active positions are NOT closed —
    /// blocking new risk and liquidating existing risk are separate
    /// concerns, so the still-open ids are returned for the caller to act
    /// on.
    pub fn emergency_stop_all(&mut self) -> Vec<String> {
        if !self.emergency_stop {
            self.emergency_stop = true;
            error!(
                active_positions = self.active.len(),
                "EMERGENCY STOP: no new risk will be accepted"
            );
        } else {
            debug!("emergency stop already latched");
        }
        self.active.keys().cloned().collect()
    }

    /// Has the emergency stop been latched?
    pub fn is_emergency_stopped(&self) -> bool {
        self.emergency_stop
    }

    /// Point-in-time snapshot for dashboards.
    pub fn get_risk_metrics(&self) -> RiskMetrics {
        let now = self.clock.now();
        RiskMetrics {
            timestamp: now,
            daily: self.get_daily_pnl(now),
            weekly: self.get_weekly_pnl(now),
            active_positions: self.active.len(),
            max_concurrent_positions: self.limits.max_concurrent_positions,
            open_risk_dollars: self.open_risk_dollars(),
            emergency_stop: self.emergency_stop,
            account_size: self.account_size,
        }
    }

    /// Currently active positions, in no particular order.
    pub fn active_positions(&self) -> impl Iterator<Item = &Position> {
        self.active.values()
    }

    /// Number of currently active positions.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Total initial risk dollars across the active set.
    pub fn open_risk_dollars(&self) -> f64 {
        self.active.values().map(|p| p.risk_dollars).sum()
    }

    /// The closed-position ledger, oldest first.
    pub fn closed_positions(&self) -> &[ClosedPosition] {
        self.ledger.entries()
    }

    fn check_admission(&self, position: &Position) -> Result<(), PositionRejected> {
        if let Err(field) = position.validate() {
            return Err(PositionRejected::Malformed { field });
        }
        if let Some(reason) = self.is_trading_allowed().into_reason() {
            return Err(PositionRejected::TradingBlocked(reason));
        }
        if self.active.len() >= self.limits.max_concurrent_positions {
            return Err(PositionRejected::TooManyPositions {
                active: self.active.len(),
                limit: self.limits.max_concurrent_positions,
            });
        }
        let risk_fraction = position.risk_dollars / self.account_size;
        if risk_fraction > self.limits.max_position_size_pct {
            return Err(PositionRejected::RiskTooLarge {
                risk_pct: risk_fraction * 100.0,
                limit_pct: self.limits.max_position_size_pct * 100.0,
            });
        }
        if self.active.contains_key(&position.position_id) {
            return Err(PositionRejected::DuplicateId {
                id: position.position_id.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::types::Direction;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn utc_offset() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn manager_at(clock: &ManualClock, limits: RiskLimits) -> RiskManager {
        RiskManager::new(limits, 10_000.0, utc_offset(), Arc::new(clock.clone())).unwrap()
    }

    fn position(id: &str, risk_dollars: f64) -> Position {
        Position {
            position_id: id.to_string(),
            instrument: "XAUUSD".to_string(),
            direction: Direction::Long,
            entry_price: 2650.0,
            stop_price: 2645.0,
            target_price: 2665.0,
            size: 1.0,
            entry_time: Utc.with_ymd_and_hms(2024, 3, 4, 13, 30, 0).unwrap(),
            risk_r: 1.0,
            risk_dollars,
        }
    }

    fn start_clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 4, 14, 0, 0).unwrap())
    }

    #[test]
    fn test_construction_rejects_bad_account_size() {
        let clock = start_clock();
        let result = RiskManager::new(
            RiskLimits::default(),
            0.0,
            utc_offset(),
            Arc::new(clock),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_trading_allowed_when_fresh() {
        let clock = start_clock();
        let manager = manager_at(&clock, RiskLimits::default());
        assert!(manager.is_trading_allowed().is_allowed());
    }

    #[test]
    fn test_concurrent_cap_rejects_exactly_the_excess() {
        let clock = start_clock();
        let mut manager = manager_at(&clock, RiskLimits::default().with_max_concurrent(2));

        assert!(manager.add_position(position("a", 100.0)).is_ok());
        assert!(manager.add_position(position("b", 100.0)).is_ok());

        let rejected = manager.add_position(position("c", 100.0)).unwrap_err();
        assert!(matches!(
            rejected,
            PositionRejected::TooManyPositions {
                active: 2,
                limit: 2
            }
        ));

        // Closing one frees exactly one slot.
        let exit = clock.now();
        manager.remove_position("a", 2655.0, exit).unwrap();
        assert!(manager.add_position(position("c", 100.0)).is_ok());
        assert_eq!(manager.active_count(), 2);
    }

    #[test]
    fn test_oversized_risk_rejected() {
        let clock = start_clock();
        // 2% of a $10k account = $200 max risk per position.
        let mut manager = manager_at(&clock, RiskLimits::default());
        let rejected = manager.add_position(position("big", 250.0)).unwrap_err();
        assert!(matches!(rejected, PositionRejected::RiskTooLarge { .. }));
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_duplicate_id_rejected_without_mutation() {
        let clock = start_clock();
        let mut manager = manager_at(&clock, RiskLimits::default());
        manager.add_position(position("a", 100.0)).unwrap();

        let rejected = manager.add_position(position("a", 50.0)).unwrap_err();
        assert!(matches!(rejected, PositionRejected::DuplicateId { .. }));
        assert_eq!(manager.active_count(), 1);
        // The original position is untouched.
        let active = manager.active_positions().next().unwrap();
        assert!((active.risk_dollars - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_malformed_position_rejected() {
        let clock = start_clock();
        let mut manager = manager_at(&clock, RiskLimits::default());
        let mut bad = position("a", 100.0);
        bad.stop_price = 2660.0; // stop above entry on a long
        assert!(matches!(
            manager.add_position(bad),
            Err(PositionRejected::Malformed {
                field: "stop_price"
            })
        ));
    }

    #[test]
    fn test_unknown_close_rejected() {
        let clock = start_clock();
        let mut manager = manager_at(&clock, RiskLimits::default());
        let result = manager.remove_position("ghost", 2650.0, clock.now());
        assert!(matches!(
            result,
            Err(PositionRejected::UnknownPosition { .. })
        ));
    }

    #[test]
    fn test_loss_contributes_to_daily_pnl_exactly_once() {
        let clock = start_clock();
        let mut manager = manager_at(&clock, RiskLimits::default());
        manager.add_position(position("a", 100.0)).unwrap();

        let exit = clock.now();
        let closed = manager.remove_position("a", 2645.0, exit).unwrap();
        assert!((closed.realized_dollars + 100.0).abs() < 1e-9);

        let daily = manager.get_daily_pnl(exit);
        assert_eq!(daily.trades, 1);
        assert!((daily.dollars + 100.0).abs() < 1e-9);

        // Repeated queries do not re-attribute.
        let again = manager.get_daily_pnl(exit);
        assert_eq!(again.trades, 1);
        assert!((again.dollars + 100.0).abs() < 1e-9);

        // The previous and following days are untouched.
        let yesterday = manager.get_daily_pnl(exit - chrono::Duration::days(1));
        assert_eq!(yesterday.trades, 0);
    }

    #[test]
    fn test_five_losses_trip_the_daily_dollar_limit() {
        let clock = start_clock();
        let limits = RiskLimits::default()
            .with_daily_loss(500.0, 50.0)
            .with_weekly_loss(10_000.0, 100.0)
            .with_max_concurrent(10);
        let mut manager = manager_at(&clock, limits);

        // Five round trips, each risking and losing $100.
        for i in 0..5 {
            let id = format!("trip-{i}");
            manager.add_position(position(&id, 100.0)).unwrap();
            manager.remove_position(&id, 2645.0, clock.now()).unwrap();
        }

        let decision = manager.is_trading_allowed();
        assert!(!decision.is_allowed());
        let reason = format!("{decision}");
        assert!(reason.contains("daily loss"), "reason was: {reason}");
        assert!(reason.contains("500"), "reason was: {reason}");

        let rejected = manager.add_position(position("six", 100.0)).unwrap_err();
        assert!(matches!(
            rejected,
            PositionRejected::TradingBlocked(BlockReason::DailyLossDollars { .. })
        ));
    }

    #[test]
    fn test_daily_r_limit_blocks_independently_of_dollars() {
        let clock = start_clock();
        let limits = RiskLimits::default()
            .with_daily_loss(1_000_000.0, 2.0)
            .with_weekly_loss(2_000_000.0, 100.0)
            .with_max_concurrent(10);
        let mut manager = manager_at(&clock, limits);

        for i in 0..2 {
            let id = format!("trip-{i}");
            manager.add_position(position(&id, 100.0)).unwrap();
            manager.remove_position(&id, 2645.0, clock.now()).unwrap();
        }

        let decision = manager.is_trading_allowed();
        let reason = format!("{decision}");
        assert!(reason.contains('R'), "reason was: {reason}");
        assert!(!decision.is_allowed());
    }

    #[test]
    fn test_daily_block_lifts_next_local_day_but_weekly_holds() {
        let clock = start_clock();
        let limits = RiskLimits::default()
            .with_daily_loss(200.0, 50.0)
            .with_weekly_loss(300.0, 100.0)
            .with_max_concurrent(10);
        let mut manager = manager_at(&clock, limits);

        for i in 0..2 {
            let id = format!("trip-{i}");
            manager.add_position(position(&id, 100.0)).unwrap();
            manager.remove_position(&id, 2645.0, clock.now()).unwrap();
        }
        assert!(!manager.is_trading_allowed().is_allowed());

        // Next day the daily window resets, but another loss would now trip
        // the weekly limit, so one more trade is allowed first.
        clock.advance(chrono::Duration::days(1));
        assert!(manager.is_trading_allowed().is_allowed());

        manager.add_position(position("monday", 100.0)).unwrap();
        manager
            .remove_position("monday", 2645.0, clock.now())
            .unwrap();
        let decision = manager.is_trading_allowed();
        assert!(!decision.is_allowed());
        assert!(format!("{decision}").contains("weekly"));
    }

    #[test]
    fn test_wins_do_not_block() {
        let clock = start_clock();
        let mut manager = manager_at(&clock, RiskLimits::default());
        manager.add_position(position("a", 100.0)).unwrap();
        manager.remove_position("a", 2665.0, clock.now()).unwrap();

        let daily = manager.get_daily_pnl(clock.now());
        assert!(daily.dollars > 0.0);
        assert!(manager.is_trading_allowed().is_allowed());
    }

    #[test]
    fn test_emergency_stop_is_permanent_and_first_in_precedence() {
        let clock = start_clock();
        let mut manager = manager_at(&clock, RiskLimits::default());
        manager.add_position(position("a", 100.0)).unwrap();

        let still_open = manager.emergency_stop_all();
        assert_eq!(still_open, vec!["a".to_string()]);
        // Open positions are deliberately not closed.
        assert_eq!(manager.active_count(), 1);

        assert!(matches!(
            manager.is_trading_allowed().into_reason(),
            Some(BlockReason::EmergencyStop)
        ));

        // Idempotent, and still latched days later.
        manager.emergency_stop_all();
        clock.advance(chrono::Duration::days(30));
        assert!(!manager.is_trading_allowed().is_allowed());

        // Existing risk can still be settled.
        assert!(manager.remove_position("a", 2645.0, clock.now()).is_ok());
    }

    #[test]
    fn test_realized_r_recomputes_from_ledger_fields() {
        let clock = start_clock();
        let mut manager = manager_at(&clock, RiskLimits::default());
        manager.add_position(position("a", 100.0)).unwrap();

        let closed = manager
            .remove_position("a", 2657.5, clock.now())
            .unwrap();

        // Recompute from the stored entry/exit/stop/direction.
        let p = &closed.position;
        let risk = p.entry_price - p.stop_price;
        let recomputed = (closed.exit_price - p.entry_price) / risk;
        assert!((recomputed - closed.realized_r).abs() < 1e-12);
    }

    #[test]
    fn test_risk_metrics_snapshot() {
        let clock = start_clock();
        let mut manager = manager_at(&clock, RiskLimits::default());
        manager.add_position(position("a", 100.0)).unwrap();
        manager.add_position(position("b", 50.0)).unwrap();

        let metrics = manager.get_risk_metrics();
        assert_eq!(metrics.active_positions, 2);
        assert!((metrics.open_risk_dollars - 150.0).abs() < 1e-9);
        assert!(!metrics.emergency_stop);
        assert_eq!(metrics.timestamp, clock.now());

        // Snapshot serializes for the dashboard surface.
        let json = serde_json::to_string(&metrics).unwrap();
        assert!(json.contains("\"active_positions\":2"));
    }
}
