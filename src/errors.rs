use thiserror::Error;

/// Construction-time configuration errors.
///
/// These are the only failures surfaced as `Err` by this crate: a monitor
/// built from an invalid configuration must not come up at all. Expected
/// business outcomes (blocked gates, rejected position operations) are
/// first-class return values, not errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A limit or threshold that must be strictly positive was not.
    #[error("{name} must be positive (got {value})")]
    NonPositive { name: &'static str, value: f64 },

    /// A fraction-valued parameter fell outside (0, 1].
    #[error("{name} must be within (0, 1] (got {value})")]
    FractionOutOfRange { name: &'static str, value: f64 },

    /// Two thresholds are ordered the wrong way round.
    #[error("{lesser} ({lesser_value:?}) must be below {greater} ({greater_value:?})")]
    ThresholdOrder {
        lesser: &'static str,
        lesser_value: std::time::Duration,
        greater: &'static str,
        greater_value: std::time::Duration,
    },

    /// A count-valued limit was zero.
    #[error("{name} must be at least 1")]
    ZeroCount { name: &'static str },

    /// The session calendar does not partition the day.
    #[error("session calendar invalid: {0}")]
    InvalidCalendar(String),

    /// The trading timezone offset could not be built.
    #[error("invalid trading timezone offset: {offset_seconds} seconds east of UTC")]
    InvalidTimezone { offset_seconds: i32 },
}
