use thiserror::Error;

use crate::{day_type::DayType, period::Period, season::SeasonType};

pub type Result<T = (), E = TariffError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TariffError {
    /// Plan data is malformed. This is a plan bug, not a user error.
    #[error("invalid plan configuration: {0}")]
    Configuration(String),

    /// The classified tuple has no entry in the plan's rate table.
    #[error("no rate for season `{season}`, day type `{day_type}` and period `{period}`")]
    RateNotFound { season: SeasonType, day_type: DayType, period: Period },

    #[error("invalid usage input `{field}`: {reason}")]
    InvalidUsageInput { field: String, reason: String },

    #[error("unknown plan `{0}`")]
    UnknownPlan(String),

    /// Raised by individual holiday sources. The calendar recovers from it locally.
    #[error("holidays for {year} are unavailable: {reason}")]
    CalendarUnavailable { year: i32, reason: String },
}

impl TariffError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn invalid_usage(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUsageInput { field: field.into(), reason: reason.into() }
    }

    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::RateNotFound { .. })
    }
}
