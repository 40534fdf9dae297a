//! Market-data feed trustworthiness classification.
//!
//! Tracks, per instrument, when the last bar arrived and how many cadence
//! gaps the feed has produced, and classifies the feed as live, delayed or
//! stale from the age of the last receipt. The classification is the first
//! gate consulted before new risk is taken and it fails closed: an
//! instrument we have never heard from is unsafe, not neutral.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::clock::SharedClock;
use crate::errors::ConfigError;
use crate::safety::gate::{BlockReason, GateDecision};
use crate::types::Bar;

/// Configuration for feed freshness and gap detection.
#[derive(Debug, Clone)]
pub struct DataQualityConfig {
    /// Receipt age below which the feed is `Live`.
    pub live_threshold: Duration,
    /// Receipt age below which the feed is `Delayed` (and `Stale` beyond).
    pub delayed_threshold: Duration,
    /// Expected interval between consecutive bars.
    pub bar_cadence: Duration,
    /// Multiplier on the cadence before a bar-to-bar delta counts as a gap.
    /// 1.5 tolerates normal publisher jitter while catching a missed bar.
    pub gap_tolerance: f64,
}

impl Default for DataQualityConfig {
    fn default() -> Self {
        Self {
            live_threshold: Duration::from_secs(10),
            delayed_threshold: Duration::from_secs(60),
            bar_cadence: Duration::from_secs(60),
            gap_tolerance: 1.5,
        }
    }
}

impl DataQualityConfig {
    /// Builder method to set the live threshold.
    pub fn with_live_threshold(mut self, threshold: Duration) -> Self {
        self.live_threshold = threshold;
        self
    }

    /// Builder method to set the delayed threshold.
    pub fn with_delayed_threshold(mut self, threshold: Duration) -> Self {
        self.delayed_threshold = threshold;
        self
    }

    /// Builder method to set the expected bar cadence.
    pub fn with_bar_cadence(mut self, cadence: Duration) -> Self {
        self.bar_cadence = cadence;
        self
    }

    /// Validate that thresholds are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.live_threshold.is_zero() {
            return Err(ConfigError::NonPositive {
                name: "live_threshold",
                value: 0.0,
            });
        }
        if self.live_threshold >= self.delayed_threshold {
            return Err(ConfigError::ThresholdOrder {
                lesser: "live_threshold",
                lesser_value: self.live_threshold,
                greater: "delayed_threshold",
                greater_value: self.delayed_threshold,
            });
        }
        if self.bar_cadence.is_zero() {
            return Err(ConfigError::NonPositive {
                name: "bar_cadence",
                value: 0.0,
            });
        }
        if !self.gap_tolerance.is_finite() || self.gap_tolerance < 1.0 {
            return Err(ConfigError::NonPositive {
                name: "gap_tolerance",
                value: self.gap_tolerance,
            });
        }
        Ok(())
    }
}

/// Freshness classification of an instrument's feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FeedHealth {
    /// Receiving data at full cadence.
    Live,
    /// Data arriving but behind the live threshold.
    Delayed,
    /// No data within the delayed threshold.
    Stale,
    /// Never received a bar for this instrument.
    Unknown,
}

impl FeedHealth {
    /// Display string for the health state.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedHealth::Live => "live",
            FeedHealth::Delayed => "delayed",
            FeedHealth::Stale => "stale",
            FeedHealth::Unknown => "unknown",
        }
    }

    /// Only a live feed is safe to open new risk against.
    pub fn is_live(&self) -> bool {
        matches!(self, FeedHealth::Live)
    }
}

impl std::fmt::Display for FeedHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time snapshot of one instrument's feed state.
#[derive(Debug, Clone, Serialize)]
pub struct FeedStatus {
    pub instrument: String,
    pub health: FeedHealth,
    /// Timestamp carried by the most recent bar, if any.
    pub last_bar_timestamp: Option<DateTime<Utc>>,
    /// Wall-clock instant the most recent bar was received, if any.
    pub last_receipt: Option<DateTime<Utc>>,
    /// Cumulative count of cadence gaps since the feed was first seen.
    pub gaps_detected: u64,
}

/// Rolling per-instrument feed record. Never deleted once created.
#[derive(Debug, Clone)]
struct FeedRecord {
    last_bar_timestamp: DateTime<Utc>,
    last_receipt: DateTime<Utc>,
    gaps_detected: u64,
}

/// Classifies the trustworthiness of each instrument's market-data feed.
pub struct DataQualityMonitor {
    config: DataQualityConfig,
    clock: SharedClock,
    feeds: HashMap<String, FeedRecord>,
}

impl DataQualityMonitor {
    /// Create a monitor with the given thresholds and clock.
    pub fn new(config: DataQualityConfig, clock: SharedClock) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            feeds: HashMap::new(),
        })
    }

    /// Get the configured thresholds.
    pub fn config(&self) -> &DataQualityConfig {
        &self.config
    }

    /// Ingest a bar for an instrument.
    ///
    /// Records the receipt instant from the injected clock and counts a gap
    /// when the bar-to-bar timestamp delta exceeds the cadence threshold.
    /// Unknown instruments are created implicitly; nothing here fails.
    pub fn update_bar(&mut self, instrument: &str, bar_timestamp: DateTime<Utc>, bar: &Bar) {
        let now = self.clock.now();
        let gap_threshold = self.config.bar_cadence.mul_f64(self.config.gap_tolerance);

        match self.feeds.get_mut(instrument) {
            Some(record) => {
                let delta = bar_timestamp - record.last_bar_timestamp;
                let gapped = match delta.to_std() {
                    Ok(delta) => delta > gap_threshold,
                    // Negative delta: the feed went backwards, which is
                    // message loss as far as the cadence contract goes.
                    Err(_) => true,
                };
                if gapped {
                    record.gaps_detected += 1;
                    debug!(
                        instrument,
                        delta_secs = delta.num_seconds(),
                        gaps = record.gaps_detected,
                        close = bar.close,
                        "bar cadence gap detected"
                    );
                }
                record.last_bar_timestamp = bar_timestamp;
                record.last_receipt = now;
            }
            None => {
                self.feeds.insert(
                    instrument.to_string(),
                    FeedRecord {
                        last_bar_timestamp: bar_timestamp,
                        last_receipt: now,
                        gaps_detected: 0,
                    },
                );
            }
        }
    }

    /// Classify an instrument's feed from the age of the last receipt.
    pub fn get_status(&self, instrument: &str) -> FeedStatus {
        match self.feeds.get(instrument) {
            Some(record) => FeedStatus {
                instrument: instrument.to_string(),
                health: self.classify_age(record.last_receipt),
                last_bar_timestamp: Some(record.last_bar_timestamp),
                last_receipt: Some(record.last_receipt),
                gaps_detected: record.gaps_detected,
            },
            None => FeedStatus {
                instrument: instrument.to_string(),
                health: FeedHealth::Unknown,
                last_bar_timestamp: None,
                last_receipt: None,
                gaps_detected: 0,
            },
        }
    }

    /// Gate decision for opening new risk on this instrument.
    ///
    /// Allows only a `Live` feed. Absence of data blocks; it is never
    /// treated as neutral.
    pub fn is_safe_to_trade(&self, instrument: &str) -> GateDecision {
        let status = self.get_status(instrument);
        if status.health.is_live() {
            return GateDecision::Allow;
        }
        let age = status
            .last_receipt
            .map(|receipt| (self.clock.now() - receipt).num_seconds().max(0));
        GateDecision::block(BlockReason::FeedNotLive {
            instrument: instrument.to_string(),
            health: status.health,
            age_secs: age,
        })
    }

    /// Cumulative gaps detected for an instrument (0 if never seen).
    pub fn gaps_detected(&self, instrument: &str) -> u64 {
        self.feeds
            .get(instrument)
            .map_or(0, |record| record.gaps_detected)
    }

    /// Time since the last receipt for an instrument, if ever seen.
    pub fn time_since_last_update(&self, instrument: &str) -> Option<Duration> {
        self.feeds
            .get(instrument)
            .and_then(|record| (self.clock.now() - record.last_receipt).to_std().ok())
    }

    /// All instruments this monitor has ever seen.
    pub fn tracked_instruments(&self) -> Vec<&str> {
        self.feeds.keys().map(|key| key.as_str()).collect()
    }

    fn classify_age(&self, last_receipt: DateTime<Utc>) -> FeedHealth {
        let age = match (self.clock.now() - last_receipt).to_std() {
            Ok(age) => age,
            // A receipt from the future means the clock moved; treat as fresh.
            Err(_) => return FeedHealth::Live,
        };
        if age < self.config.live_threshold {
            FeedHealth::Live
        } else if age < self.config.delayed_threshold {
            FeedHealth::Delayed
        } else {
            FeedHealth::Stale
        }
    }
}
