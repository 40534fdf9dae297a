//! Trading-session and liquidity classification from wall-clock time.
//!
//! The session calendar is static configuration: three fixed session opens
//! partition the trading-local day into Asia, London and New York, and a
//! holiday set plus the weekend mark days the market is closed. Every query
//! recomputes from its timestamp argument; the monitor holds no mutable
//! state.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::safety::gate::{BlockReason, ClosedCause, GateDecision};

/// A named trading session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Session {
    Asia,
    London,
    NewYork,
}

impl Session {
    /// Display string for the session.
    pub fn as_str(&self) -> &'static str {
        match self {
            Session::Asia => "asia",
            Session::London => "london",
            Session::NewYork => "new_york",
        }
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Liquidity classification for an instrument at an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Liquidity {
    Excellent,
    Good,
    Thin,
    Closed,
}

impl Liquidity {
    /// Display string for the liquidity level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Liquidity::Excellent => "excellent",
            Liquidity::Good => "good",
            Liquidity::Thin => "thin",
            Liquidity::Closed => "closed",
        }
    }

    /// Is the market closed?
    pub fn is_closed(&self) -> bool {
        matches!(self, Liquidity::Closed)
    }
}

impl std::fmt::Display for Liquidity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static session/holiday calendar in the trading timezone.
#[derive(Debug, Clone)]
pub struct SessionCalendar {
    /// Trading-local timezone as a fixed offset from UTC.
    pub timezone: FixedOffset,
    /// London session open (trading-local).
    pub london_open: NaiveTime,
    /// New York session open (trading-local).
    pub newyork_open: NaiveTime,
    /// Asia session open (trading-local).
    pub asia_open: NaiveTime,
    /// Exchange holidays (trading-local calendar dates).
    pub holidays: BTreeSet<NaiveDate>,
    /// Default liquidity per session.
    pub session_liquidity: HashMap<Session, Liquidity>,
    /// Per-instrument liquidity overrides, consulted before the default map.
    pub instrument_liquidity: HashMap<String, HashMap<Session, Liquidity>>,
}

impl Default for SessionCalendar {
    fn default() -> Self {
        let mut session_liquidity = HashMap::new();
        session_liquidity.insert(Session::Asia, Liquidity::Thin);
        session_liquidity.insert(Session::London, Liquidity::Good);
        session_liquidity.insert(Session::NewYork, Liquidity::Excellent);

        Self {
            timezone: FixedOffset::east_opt(0).expect("zero offset is valid"),
            london_open: NaiveTime::from_hms_opt(7, 0, 0).expect("valid time"),
            newyork_open: NaiveTime::from_hms_opt(13, 0, 0).expect("valid time"),
            asia_open: NaiveTime::from_hms_opt(22, 0, 0).expect("valid time"),
            holidays: BTreeSet::new(),
            session_liquidity,
            instrument_liquidity: HashMap::new(),
        }
    }
}

impl SessionCalendar {
    /// Builder method to set the trading timezone as whole hours east of UTC.
    pub fn with_utc_offset_hours(mut self, hours: i32) -> Result<Self, ConfigError> {
        let seconds = hours * 3600;
        self.timezone =
            FixedOffset::east_opt(seconds).ok_or(ConfigError::InvalidTimezone {
                offset_seconds: seconds,
            })?;
        Ok(self)
    }

    /// Builder method to add a holiday.
    pub fn with_holiday(mut self, date: NaiveDate) -> Self {
        self.holidays.insert(date);
        self
    }

    /// Builder method to override the default liquidity for a session.
    pub fn with_session_liquidity(mut self, session: Session, level: Liquidity) -> Self {
        self.session_liquidity.insert(session, level);
        self
    }

    /// Builder method to override liquidity for one instrument in one session.
    pub fn with_instrument_liquidity(
        mut self,
        instrument: impl Into<String>,
        session: Session,
        level: Liquidity,
    ) -> Self {
        self.instrument_liquidity
            .entry(instrument.into())
            .or_default()
            .insert(session, level);
        self
    }

    /// Validate that the three opens partition the day.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let opens = [self.london_open, self.newyork_open, self.asia_open];
        for (i, a) in opens.iter().enumerate() {
            for b in opens.iter().skip(i + 1) {
                if a == b {
                    return Err(ConfigError::InvalidCalendar(format!(
                        "duplicate session open at {a}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Aggregated market state for one instrument at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct MarketConditions {
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    pub session: Session,
    pub liquidity: Liquidity,
    pub is_weekend: bool,
    pub is_holiday: bool,
}

impl MarketConditions {
    /// Safe to open new risk: false iff the market is closed for the
    /// weekend, a holiday, or otherwise.
    pub fn is_safe_to_trade(&self) -> bool {
        !(self.liquidity.is_closed() || self.is_weekend || self.is_holiday)
    }

    /// Gate decision form of [`Self::is_safe_to_trade`], with a typed cause.
    pub fn gate_decision(&self) -> GateDecision {
        if self.is_safe_to_trade() {
            return GateDecision::Allow;
        }
        let cause = if self.is_holiday {
            ClosedCause::Holiday
        } else if self.is_weekend {
            ClosedCause::Weekend
        } else {
            ClosedCause::NoLiquidity
        };
        GateDecision::block(BlockReason::MarketClosed {
            instrument: self.instrument.clone(),
            session: self.session,
            cause,
        })
    }
}

/// Classifies trading session and liquidity from wall-clock time.
#[derive(Debug, Clone)]
pub struct MarketHoursMonitor {
    calendar: SessionCalendar,
}

impl MarketHoursMonitor {
    /// Create a monitor over a validated calendar.
    pub fn new(calendar: SessionCalendar) -> Result<Self, ConfigError> {
        calendar.validate()?;
        Ok(Self { calendar })
    }

    /// Get the configured calendar.
    pub fn calendar(&self) -> &SessionCalendar {
        &self.calendar
    }

    /// Map an instant to its trading session.
    ///
    /// Pure function of the trading-local time-of-day against the fixed
    /// session opens, wrapping across midnight.
    pub fn get_current_session(&self, timestamp: DateTime<Utc>) -> Session {
        let local_time = timestamp.with_timezone(&self.calendar.timezone).time();
        let mut opens = self.session_opens();
        opens.sort_by_key(|entry| entry.0);

        // The session whose open is the latest one at or before this time;
        // before the first open of the day we are still in yesterday's last
        // session.
        let mut current = opens
            .last()
            .map(|(_, session)| *session)
            .expect("three sessions are always configured");
        for (open, session) in opens {
            if local_time >= open {
                current = session;
            }
        }
        current
    }

    /// Liquidity for an instrument at an instant.
    ///
    /// Closed on weekends and holidays; otherwise the session-derived level,
    /// with any per-instrument override taking precedence.
    pub fn get_liquidity_level(&self, instrument: &str, timestamp: DateTime<Utc>) -> Liquidity {
        let local = timestamp.with_timezone(&self.calendar.timezone);
        if is_weekend(local.weekday()) || self.is_holiday(local.date_naive()) {
            return Liquidity::Closed;
        }
        let session = self.get_current_session(timestamp);
        if let Some(level) = self
            .calendar
            .instrument_liquidity
            .get(instrument)
            .and_then(|overrides| overrides.get(&session))
        {
            return *level;
        }
        *self
            .calendar
            .session_liquidity
            .get(&session)
            .unwrap_or(&Liquidity::Thin)
    }

    /// Aggregate session, liquidity and closure flags for an instrument.
    pub fn get_market_conditions(
        &self,
        instrument: &str,
        timestamp: DateTime<Utc>,
    ) -> MarketConditions {
        let local = timestamp.with_timezone(&self.calendar.timezone);
        MarketConditions {
            instrument: instrument.to_string(),
            timestamp,
            session: self.get_current_session(timestamp),
            liquidity: self.get_liquidity_level(instrument, timestamp),
            is_weekend: is_weekend(local.weekday()),
            is_holiday: self.is_holiday(local.date_naive()),
        }
    }

    /// The next session to open strictly after `timestamp`, and how long
    /// until it does. Supports pre-session scheduling warnings.
    pub fn get_next_session(&self, timestamp: DateTime<Utc>) -> (Session, Duration) {
        let local = timestamp.with_timezone(&self.calendar.timezone);
        let local_time = local.time();
        let mut opens = self.session_opens();
        opens.sort_by_key(|entry| entry.0);

        let today = local.date_naive();
        let (open_date, open_time, session) = match opens
            .iter()
            .find(|(open, _)| *open > local_time)
        {
            Some((open, session)) => (today, *open, *session),
            // Past the last open of the day: the next boundary is
            // tomorrow's earliest open.
            None => {
                let (open, session) = opens[0];
                (today.succ_opt().expect("date within chrono range"), open, session)
            }
        };

        let open_local = open_date
            .and_time(open_time)
            .and_local_timezone(self.calendar.timezone)
            .single()
            .expect("fixed offsets have no ambiguous local times");
        let remaining = (open_local.with_timezone(&Utc) - timestamp)
            .to_std()
            .unwrap_or(Duration::ZERO);
        (session, remaining)
    }

    fn session_opens(&self) -> Vec<(NaiveTime, Session)> {
        vec![
            (self.calendar.london_open, Session::London),
            (self.calendar.newyork_open, Session::NewYork),
            (self.calendar.asia_open, Session::Asia),
        ]
    }

    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.calendar.holidays.contains(&date)
    }
}

fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}
