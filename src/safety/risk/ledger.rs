//! Append-only ledger of realized position outcomes.
//!
//! Every closed position becomes exactly one entry, keyed at close time by
//! the exit instant's trading-local calendar date and ISO week. Entries are
//! never mutated or removed; daily and weekly P&L are sums over the matching
//! keys.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

use crate::types::{Direction, Position};

/// An ISO year/week ledger key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct WeekKey {
    pub year: i32,
    pub week: u32,
}

impl WeekKey {
    /// The ISO week containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }
}

impl std::fmt::Display for WeekKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

/// A position's realized outcome. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct ClosedPosition {
    /// The position as it was opened.
    pub position: Position,
    pub exit_price: f64,
    pub exit_time: DateTime<Utc>,
    /// Realized result in R-multiples of the initial risk.
    pub realized_r: f64,
    /// Realized result in account dollars.
    pub realized_dollars: f64,
    /// Trading-local calendar date of the exit — the daily aggregation key.
    pub exit_date: NaiveDate,
    /// ISO week of the exit date — the weekly aggregation key.
    pub exit_week: WeekKey,
}

impl ClosedPosition {
    /// Settle a position at `exit_price`/`exit_time`.
    ///
    /// Realized R is `(exit − entry) / risk` for a long and
    /// `(entry − exit) / risk` for a short, where risk is the entry-to-stop
    /// distance; dollars scale through the position's per-unit
    /// `risk_dollars / risk_r` ratio. The aggregation keys come from the
    /// exit instant viewed in the trading timezone.
    pub fn settle(
        position: Position,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        timezone: FixedOffset,
    ) -> Self {
        let move_points = match position.direction {
            Direction::Long => exit_price - position.entry_price,
            Direction::Short => position.entry_price - exit_price,
        };
        let realized_r = move_points / position.risk_points();
        let realized_dollars = realized_r * position.risk_dollars / position.risk_r;
        let exit_date = exit_time.with_timezone(&timezone).date_naive();

        Self {
            position,
            exit_price,
            exit_time,
            realized_r,
            realized_dollars,
            exit_date,
            exit_week: WeekKey::from_date(exit_date),
        }
    }
}

/// Realized P&L aggregated over a ledger slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PnlTotals {
    pub dollars: f64,
    pub r: f64,
    pub trades: usize,
}

impl PnlTotals {
    fn absorb(&mut self, entry: &ClosedPosition) {
        self.dollars += entry.realized_dollars;
        self.r += entry.realized_r;
        self.trades += 1;
    }

    /// The loss magnitude in dollars (zero when net positive).
    pub fn loss_dollars(&self) -> f64 {
        (-self.dollars).max(0.0)
    }

    /// The loss magnitude in R (zero when net positive).
    pub fn loss_r(&self) -> f64 {
        (-self.r).max(0.0)
    }
}

/// The append-only closed-position ledger.
#[derive(Debug, Default)]
pub struct Ledger {
    entries: Vec<ClosedPosition>,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one settled position. The only mutation the ledger supports.
    pub fn append(&mut self, entry: ClosedPosition) {
        self.entries.push(entry);
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[ClosedPosition] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Realized totals for one trading-local calendar date.
    pub fn daily_totals(&self, date: NaiveDate) -> PnlTotals {
        let mut totals = PnlTotals::default();
        for entry in self.entries.iter().filter(|e| e.exit_date == date) {
            totals.absorb(entry);
        }
        totals
    }

    /// Realized totals for one ISO week.
    pub fn weekly_totals(&self, week: WeekKey) -> PnlTotals {
        let mut totals = PnlTotals::default();
        for entry in self.entries.iter().filter(|e| e.exit_week == week) {
            totals.absorb(entry);
        }
        totals
    }
}
