use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Built-in Taipower time-of-use periods.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    #[display("peak")]
    Peak,

    #[display("semi_peak")]
    SemiPeak,

    #[display("off_peak")]
    OffPeak,

    /// Single flat period used by non-TOU plans.
    #[display("flat")]
    Flat,
}

impl PeriodType {
    pub const ALL: [Self; 4] = [Self::Peak, Self::SemiPeak, Self::OffPeak, Self::Flat];
}

/// Period label: one of the built-ins, or any label a custom plan introduces.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Period {
    BuiltIn(PeriodType),
    Custom(String),
}

impl Period {
    pub const PEAK: Self = Self::BuiltIn(PeriodType::Peak);
    pub const SEMI_PEAK: Self = Self::BuiltIn(PeriodType::SemiPeak);
    pub const OFF_PEAK: Self = Self::BuiltIn(PeriodType::OffPeak);
    pub const FLAT: Self = Self::BuiltIn(PeriodType::Flat);

    #[must_use]
    pub const fn built_in(&self) -> Option<PeriodType> {
        match self {
            Self::BuiltIn(period) => Some(*period),
            Self::Custom(_) => None,
        }
    }
}

impl From<PeriodType> for Period {
    fn from(period: PeriodType) -> Self {
        Self::BuiltIn(period)
    }
}

impl From<&str> for Period {
    fn from(label: &str) -> Self {
        PeriodType::ALL
            .into_iter()
            .find(|period| period.to_string() == label)
            .map_or_else(|| Self::Custom(label.to_owned()), Self::BuiltIn)
    }
}

impl From<String> for Period {
    fn from(label: String) -> Self {
        Self::from(label.as_str())
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BuiltIn(period) => Display::fmt(period, f),
            Self::Custom(label) => f.write_str(label),
        }
    }
}
