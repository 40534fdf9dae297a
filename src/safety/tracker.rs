//! Open-position alerting against structural levels and hold time.
//!
//! Not a risk gate: each call classifies one position against the current
//! price and clock and returns any newly raised alerts for the notification
//! surface. The tracker's only state is the deduplication ledger enforcing
//! the invariant that at most one unacknowledged alert exists per
//! `(position_id, alert_type)` — repeated identical calls never duplicate, and an
//! acknowledged alert stays suppressed until its condition clears.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::clock::SharedClock;
use crate::errors::ConfigError;
use crate::types::{Direction, Position};

/// Alert thresholds.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Favorable excursion in R at which to suggest moving the stop to
    /// breakeven.
    pub breakeven_trigger_r: f64,
    /// Absolute price distance from the stop that counts as "approaching".
    pub stop_proximity_points: f64,
    /// Absolute price distance from the target that counts as "near".
    pub target_proximity_points: f64,
    /// Fraction of the maximum hold after which the time alert fires.
    pub time_warning_fraction: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            breakeven_trigger_r: 1.0,
            stop_proximity_points: 1.5,
            target_proximity_points: 3.0,
            time_warning_fraction: 0.9,
        }
    }
}

impl TrackerConfig {
    /// Builder method to set the breakeven trigger.
    pub fn with_breakeven_trigger_r(mut self, r: f64) -> Self {
        self.breakeven_trigger_r = r;
        self
    }

    /// Builder method to set the stop proximity tolerance.
    pub fn with_stop_proximity(mut self, points: f64) -> Self {
        self.stop_proximity_points = points;
        self
    }

    /// Builder method to set the target proximity tolerance.
    pub fn with_target_proximity(mut self, points: f64) -> Self {
        self.target_proximity_points = points;
        self
    }

    /// Validate the thresholds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("breakeven_trigger_r", self.breakeven_trigger_r),
            ("stop_proximity_points", self.stop_proximity_points),
            ("target_proximity_points", self.target_proximity_points),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        if !self.time_warning_fraction.is_finite()
            || self.time_warning_fraction <= 0.0
            || self.time_warning_fraction > 1.0
        {
            return Err(ConfigError::FractionOutOfRange {
                name: "time_warning_fraction",
                value: self.time_warning_fraction,
            });
        }
        Ok(())
    }
}

/// Per-strategy maximum hold durations.
///
/// Breakout strategies ride a single session, so hold limits are hours-scale
/// and vary by strategy family; unknown strategies fall back to the default.
#[derive(Debug, Clone)]
pub struct HoldLimits {
    /// Fallback for strategies without an explicit entry.
    pub default_max_hold: Duration,
    /// Per-strategy overrides, keyed by strategy name.
    pub per_strategy: HashMap<String, Duration>,
}

impl Default for HoldLimits {
    fn default() -> Self {
        Self {
            default_max_hold: Duration::from_secs(4 * 3600),
            per_strategy: HashMap::new(),
        }
    }
}

impl HoldLimits {
    /// Builder method to set the fallback hold limit.
    pub fn with_default_max_hold(mut self, max_hold: Duration) -> Self {
        self.default_max_hold = max_hold;
        self
    }

    /// Builder method to set one strategy's hold limit.
    pub fn with_strategy(mut self, strategy: impl Into<String>, max_hold: Duration) -> Self {
        self.per_strategy.insert(strategy.into(), max_hold);
        self
    }

    /// The maximum hold for a strategy.
    pub fn max_hold(&self, strategy: &str) -> Duration {
        self.per_strategy
            .get(strategy)
            .copied()
            .unwrap_or(self.default_max_hold)
    }

    /// Validate the table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_max_hold.is_zero() {
            return Err(ConfigError::NonPositive {
                name: "default_max_hold",
                value: 0.0,
            });
        }
        if self.per_strategy.values().any(|d| d.is_zero()) {
            return Err(ConfigError::NonPositive {
                name: "per_strategy max_hold",
                value: 0.0,
            });
        }
        Ok(())
    }
}

/// Kind of position alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AlertType {
    /// Favorable excursion reached the breakeven trigger.
    BreakevenReminder,
    /// Price is within tolerance of the stop.
    StopApproaching,
    /// Price is within tolerance of the target.
    TargetNear,
    /// Hold time passed the warning fraction of the strategy limit.
    TimeLimit,
}

impl AlertType {
    /// Display name for the alert kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::BreakevenReminder => "breakeven_reminder",
            AlertType::StopApproaching => "stop_approaching",
            AlertType::TargetNear => "target_near",
            AlertType::TimeLimit => "time_limit",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An alert raised for an open position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub position_id: String,
    pub alert_type: AlertType,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}

/// Stateless-per-call position alerting with deduplication.
pub struct PositionTracker {
    config: TrackerConfig,
    hold_limits: HoldLimits,
    clock: SharedClock,
    /// One record per (position, alert type); the dedup ledger.
    alerts: HashMap<(String, AlertType), Alert>,
}

impl PositionTracker {
    /// Create a tracker.
    pub fn new(
        config: TrackerConfig,
        hold_limits: HoldLimits,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        hold_limits.validate()?;
        Ok(Self {
            config,
            hold_limits,
            clock,
            alerts: HashMap::new(),
        })
    }

    /// Get the configured thresholds.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Get the hold-limit table.
    pub fn hold_limits(&self) -> &HoldLimits {
        &self.hold_limits
    }

    /// Evaluate one open position against the current price and clock.
    ///
    /// Returns only the alerts newly raised by this call. A condition that
    /// already has a live record (acknowledged or not) raises nothing; a
    /// condition that has cleared releases its acknowledged record so a
    /// later re-trigger alerts again.
    pub fn check_position_alerts(
        &mut self,
        position: &Position,
        current_price: f64,
        strategy_name: &str,
    ) -> Vec<Alert> {
        let now = self.clock.now();
        let mut raised = Vec::new();

        for (kind, triggered, message) in self.evaluate(position, current_price, strategy_name, now)
        {
            let key = (position.position_id.clone(), kind);
            if triggered {
                if !self.alerts.contains_key(&key) {
                    let alert = Alert {
                        position_id: position.position_id.clone(),
                        alert_type: kind,
                        message,
                        timestamp: now,
                        acknowledged: false,
                    };
                    debug!(
                        position_id = %position.position_id,
                        alert_type = kind.as_str(),
                        message = %alert.message,
                        "alert raised"
                    );
                    self.alerts.insert(key, alert.clone());
                    raised.push(alert);
                }
            } else if self
                .alerts
                .get(&key)
                .is_some_and(|alert| alert.acknowledged)
            {
                // Condition cleared: drop the acknowledged record so the
                // next trigger raises a fresh alert. Unacknowledged records
                // stay pending for the operator.
                self.alerts.remove(&key);
            }
        }

        raised
    }

    /// Acknowledge the live alert for `(position_id, alert_type)`.
    ///
    /// Suppresses further identical alerts until the condition clears.
    /// Returns whether an unacknowledged alert was found.
    pub fn acknowledge_alert(&mut self, position_id: &str, alert_type: AlertType) -> bool {
        match self.alerts.get_mut(&(position_id.to_string(), alert_type)) {
            Some(alert) if !alert.acknowledged => {
                alert.acknowledged = true;
                true
            }
            _ => false,
        }
    }

    /// All currently unacknowledged alerts, oldest first.
    pub fn get_unacknowledged_alerts(&self) -> Vec<Alert> {
        let mut pending: Vec<Alert> = self
            .alerts
            .values()
            .filter(|alert| !alert.acknowledged)
            .cloned()
            .collect();
        pending.sort_by_key(|alert| alert.timestamp);
        pending
    }

    /// Purge alert records older than `max_age`, acknowledged or not.
    pub fn clear_old_alerts(&mut self, max_age: Duration) {
        let now = self.clock.now();
        self.alerts.retain(|_, alert| {
            (now - alert.timestamp)
                .to_std()
                .map_or(true, |age| age <= max_age)
        });
    }

    /// Drop all records for a position (call after it closes).
    pub fn clear_position(&mut self, position_id: &str) {
        self.alerts.retain(|(id, _), _| id != position_id);
    }

    /// Total live alert records, acknowledged included.
    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }

    fn evaluate(
        &self,
        position: &Position,
        price: f64,
        strategy: &str,
        now: DateTime<Utc>,
    ) -> [(AlertType, bool, String); 4] {
        let excursion_r = position.r_multiple(price);
        let breakeven = excursion_r >= self.config.breakeven_trigger_r;
        let breakeven_msg = format!(
            "{} {} {:+.1}R at {:.1} (entry {:.1}): consider moving stop to breakeven",
            position.instrument, position.direction, excursion_r, price, position.entry_price
        );

        // Signed distance to the level from the side the price approaches
        // it: positive while the level is still ahead.
        let stop_distance = match position.direction {
            Direction::Long => price - position.stop_price,
            Direction::Short => position.stop_price - price,
        };
        let stop_near = stop_distance <= self.config.stop_proximity_points;
        let stop_msg = format!(
            "{} at {:.1}: within {:.1} of stop {:.1}",
            position.instrument, price, self.config.stop_proximity_points, position.stop_price
        );

        let target_distance = match position.direction {
            Direction::Long => position.target_price - price,
            Direction::Short => price - position.target_price,
        };
        let target_near = target_distance <= self.config.target_proximity_points;
        let target_msg = format!(
            "{} at {:.1}: within {:.1} of target {:.1}",
            position.instrument, price, self.config.target_proximity_points, position.target_price
        );

        let max_hold = self.hold_limits.max_hold(strategy);
        let warn_after = max_hold.mul_f64(self.config.time_warning_fraction);
        let held = (now - position.entry_time).to_std().unwrap_or(Duration::ZERO);
        let overtime = held > warn_after;
        let time_msg = format!(
            "{} held {}m of {}m {} limit",
            position.instrument,
            held.as_secs() / 60,
            max_hold.as_secs() / 60,
            strategy
        );

        [
            (AlertType::BreakevenReminder, breakeven, breakeven_msg),
            (AlertType::StopApproaching, stop_near, stop_msg),
            (AlertType::TargetNear, target_near, target_msg),
            (AlertType::TimeLimit, overtime, time_msg),
        ]
    }
}
