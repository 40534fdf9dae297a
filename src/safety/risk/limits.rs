//! Immutable exposure and loss limits.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Risk limits enforced by the risk manager.
///
/// All dollar and R limits are expressed as positive loss magnitudes; a
/// realized loss at or beyond a limit blocks new risk. Immutable after
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Maximum realized loss per trading-local calendar day, in dollars.
    pub daily_loss_dollars: f64,
    /// Maximum realized loss per trading-local calendar day, in R.
    pub daily_loss_r: f64,
    /// Maximum realized loss per ISO week, in dollars.
    pub weekly_loss_dollars: f64,
    /// Maximum realized loss per ISO week, in R.
    pub weekly_loss_r: f64,
    /// Maximum number of simultaneously open positions.
    pub max_concurrent_positions: usize,
    /// Maximum initial risk per position as a fraction of account size.
    /// Example: 0.02 means no position may risk more than 2% of the account.
    pub max_position_size_pct: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            daily_loss_dollars: 500.0,
            daily_loss_r: 3.0,
            weekly_loss_dollars: 1_500.0,
            weekly_loss_r: 8.0,
            max_concurrent_positions: 3,
            max_position_size_pct: 0.02,
        }
    }
}

impl RiskLimits {
    /// Builder method to set the daily loss limits.
    pub fn with_daily_loss(mut self, dollars: f64, r: f64) -> Self {
        self.daily_loss_dollars = dollars;
        self.daily_loss_r = r;
        self
    }

    /// Builder method to set the weekly loss limits.
    pub fn with_weekly_loss(mut self, dollars: f64, r: f64) -> Self {
        self.weekly_loss_dollars = dollars;
        self.weekly_loss_r = r;
        self
    }

    /// Builder method to set the concurrent-position cap.
    pub fn with_max_concurrent(mut self, count: usize) -> Self {
        self.max_concurrent_positions = count;
        self
    }

    /// Builder method to set the per-position size cap.
    pub fn with_max_position_size_pct(mut self, pct: f64) -> Self {
        self.max_position_size_pct = pct;
        self
    }

    /// Validate that the limits are internally consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("daily_loss_dollars", self.daily_loss_dollars),
            ("daily_loss_r", self.daily_loss_r),
            ("weekly_loss_dollars", self.weekly_loss_dollars),
            ("weekly_loss_r", self.weekly_loss_r),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        if self.max_concurrent_positions == 0 {
            return Err(ConfigError::ZeroCount {
                name: "max_concurrent_positions",
            });
        }
        if !self.max_position_size_pct.is_finite()
            || self.max_position_size_pct <= 0.0
            || self.max_position_size_pct > 1.0
        {
            return Err(ConfigError::FractionOutOfRange {
                name: "max_position_size_pct",
                value: self.max_position_size_pct,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits_validate() {
        assert!(RiskLimits::default().validate().is_ok());
    }

    #[test]
    fn test_non_positive_loss_limit_rejected() {
        let limits = RiskLimits::default().with_daily_loss(0.0, 3.0);
        assert!(matches!(
            limits.validate(),
            Err(ConfigError::NonPositive {
                name: "daily_loss_dollars",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_concurrent_positions_rejected() {
        let limits = RiskLimits::default().with_max_concurrent(0);
        assert!(limits.validate().is_err());
    }

    #[test]
    fn test_size_pct_must_be_fraction() {
        assert!(RiskLimits::default()
            .with_max_position_size_pct(1.5)
            .validate()
            .is_err());
        assert!(RiskLimits::default()
            .with_max_position_size_pct(0.0)
            .validate()
            .is_err());
        assert!(RiskLimits::default()
            .with_max_position_size_pct(1.0)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_limits_deserialize_from_config_layer() {
        let raw = r#"{
            "daily_loss_dollars": 500.0,
            "daily_loss_r": 3.0,
            "weekly_loss_dollars": 1500.0,
            "weekly_loss_r": 8.0,
            "max_concurrent_positions": 2,
            "max_position_size_pct": 0.01
        }"#;
        let limits: RiskLimits = serde_json::from_str(raw).unwrap();
        assert_eq!(limits.max_concurrent_positions, 2);
        assert!(limits.validate().is_ok());
    }
}
