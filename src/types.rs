//! Shared vocabulary types for the safety core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single OHLCV bar as delivered by the market-data feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Create a bar, checking the fields are usable numbers.
    ///
    /// Returns `Err` with the offending field name for NaN/infinite prices,
    /// a high below the low, or negative volume.
    pub fn new(
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, &'static str> {
        for (name, value) in [
            ("open", open),
            ("high", high),
            ("low", low),
            ("close", close),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(name);
            }
        }
        if high < low {
            return Err("high");
        }
        if !volume.is_finite() || volume < 0.0 {
            return Err("volume");
        }
        Ok(Self {
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

/// Side of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for long, -1.0 for short. Multiplying a raw price move by this
    /// sign yields the favorable-excursion move.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// Display string for the direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open position as handed over by the order-management layer on fill.
///
/// Immutable once created. The risk manager owns the active instance from a
/// successful `add_position` until `remove_position`; the position tracker
/// only ever borrows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Unique identifier assigned by the order-management layer.
    pub position_id: String,
    /// Instrument symbol.
    pub instrument: String,
    /// Long or short.
    pub direction: Direction,
    /// Fill price.
    pub entry_price: f64,
    /// Structural stop level.
    pub stop_price: f64,
    /// Target level.
    pub target_price: f64,
    /// Position size in contracts/units.
    pub size: f64,
    /// When the position was opened.
    pub entry_time: DateTime<Utc>,
    /// Initial risk expressed in R (normally 1.0).
    pub risk_r: f64,
    /// Initial risk expressed in account dollars.
    pub risk_dollars: f64,
}

impl Position {
    /// Entry-to-stop distance in price points. Positive for a well-formed
    /// position regardless of direction.
    pub fn risk_points(&self) -> f64 {
        match self.direction {
            Direction::Long => self.entry_price - self.stop_price,
            Direction::Short => self.stop_price - self.entry_price,
        }
    }

    /// Favorable excursion at `price`, in R-multiples of the initial risk.
    ///
    /// Positive when the position is in profit: for a long this grows as
    /// price rises above entry, for a short as it falls below.
    pub fn r_multiple(&self, price: f64) -> f64 {
        self.direction.sign() * (price - self.entry_price) / self.risk_points()
    }

    /// Check the position is internally consistent.
    ///
    /// A malformed position is a programmer error in the order-management
    /// layer; it is rejected before it can reach the active set or the
    /// ledger. Returns the offending field name.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.position_id.is_empty() {
            return Err("position_id");
        }
        if self.instrument.is_empty() {
            return Err("instrument");
        }
        for (name, value) in [
            ("entry_price", self.entry_price),
            ("stop_price", self.stop_price),
            ("target_price", self.target_price),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(name);
            }
        }
        // Stop must sit on the losing side of entry, target on the winning side.
        if self.risk_points() <= 0.0 {
            return Err("stop_price");
        }
        if self.direction.sign() * (self.target_price - self.entry_price) <= 0.0 {
            return Err("target_price");
        }
        if !self.size.is_finite() || self.size <= 0.0 {
            return Err("size");
        }
        if !self.risk_r.is_finite() || self.risk_r <= 0.0 {
            return Err("risk_r");
        }
        if !self.risk_dollars.is_finite() || self.risk_dollars <= 0.0 {
            return Err("risk_dollars");
        }
        Ok(())
    }
}
