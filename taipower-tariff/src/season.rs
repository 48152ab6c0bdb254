use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use chrono::{Datelike, NaiveDate};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::error::{Result, TariffError};

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
pub enum SeasonType {
    #[display("summer")]
    Summer,

    #[display("non_summer")]
    NonSummer,
}

/// Year-agnostic calendar day, written as `MM-DD`.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, SerializeDisplay, DeserializeFromStr)]
pub struct MonthDay {
    month: u32,
    day: u32,
}

impl MonthDay {
    pub fn new(month: u32, day: u32) -> Result<Self> {
        // 2000 is a leap year, so `02-29` is accepted.
        if NaiveDate::from_ymd_opt(2000, month, day).is_none() {
            return Err(TariffError::configuration(format!(
                "`{month:02}-{day:02}` is not a valid month and day"
            )));
        }
        Ok(Self { month, day })
    }

    #[must_use]
    pub fn of(date: NaiveDate) -> Self {
        Self { month: date.month(), day: date.day() }
    }

    /// The same month and day in the given year, if it exists.
    #[must_use]
    pub fn in_year(self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
    }
}

impl Display for MonthDay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

impl FromStr for MonthDay {
    type Err = TariffError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TariffError::configuration(format!("expected `MM-DD`, got `{s}`"));
        let (month, day) = s.trim().split_once('-').ok_or_else(invalid)?;
        Self::new(month.parse().map_err(|_| invalid())?, day.parse().map_err(|_| invalid())?)
    }
}

/// Summer window bounded by two inclusive month-day cutoffs.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SeasonStrategy {
    pub summer_start: MonthDay,
    pub summer_end: MonthDay,
}

impl SeasonStrategy {
    /// June through September, used by residential and low-voltage plans.
    pub const CALENDAR_YEAR: Self = Self {
        summer_start: MonthDay { month: 6, day: 1 },
        summer_end: MonthDay { month: 9, day: 30 },
    };

    /// Mid-May through mid-October, used by high-voltage plans.
    pub const HIGH_VOLTAGE: Self = Self {
        summer_start: MonthDay { month: 5, day: 16 },
        summer_end: MonthDay { month: 10, day: 15 },
    };

    #[must_use]
    pub const fn new(summer_start: MonthDay, summer_end: MonthDay) -> Self {
        Self { summer_start, summer_end }
    }

    #[must_use]
    pub fn classify(&self, date: NaiveDate) -> SeasonType {
        let today = MonthDay::of(date);
        let is_summer = if self.summer_start <= self.summer_end {
            (self.summer_start <= today) && (today <= self.summer_end)
        } else {
            (today >= self.summer_start) || (today <= self.summer_end)
        };
        if is_summer { SeasonType::Summer } else { SeasonType::NonSummer }
    }

    /// Split `start..end` into consecutive single-season runs of whole days.
    ///
    /// Each returned item is the season and the number of days it covers.
    #[must_use]
    pub fn segments(&self, start: NaiveDate, end: NaiveDate) -> Vec<(SeasonType, u64)> {
        start
            .iter_days()
            .take_while(|date| *date < end)
            .chunk_by(|date| self.classify(*date))
            .into_iter()
            .map(|(season, days)| (season, days.count() as u64))
            .collect()
    }
}

impl Default for SeasonStrategy {
    fn default() -> Self {
        Self::CALENDAR_YEAR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_calendar_year_boundaries_are_inclusive() {
        let strategy = SeasonStrategy::CALENDAR_YEAR;
        assert_eq!(strategy.classify(date(2025, 5, 31)), SeasonType::NonSummer);
        assert_eq!(strategy.classify(date(2025, 6, 1)), SeasonType::Summer);
        assert_eq!(strategy.classify(date(2025, 9, 30)), SeasonType::Summer);
        assert_eq!(strategy.classify(date(2025, 10, 1)), SeasonType::NonSummer);
    }

    #[test]
    fn test_high_voltage_window() {
        let strategy = SeasonStrategy::HIGH_VOLTAGE;
        assert_eq!(strategy.classify(date(2024, 5, 15)), SeasonType::NonSummer);
        assert_eq!(strategy.classify(date(2024, 5, 16)), SeasonType::Summer);
        assert_eq!(strategy.classify(date(2024, 10, 15)), SeasonType::Summer);
        assert_eq!(strategy.classify(date(2024, 10, 16)), SeasonType::NonSummer);
    }

    #[test]
    fn test_high_voltage_window_every_day_of_leap_year() {
        let strategy = SeasonStrategy::HIGH_VOLTAGE;
        for day in date(2024, 1, 1).iter_days().take_while(|day| day.year() == 2024) {
            let expected = (date(2024, 5, 16)..=date(2024, 10, 15)).contains(&day);
            assert_eq!(strategy.classify(day) == SeasonType::Summer, expected, "{day}");
        }
    }

    #[test]
    fn test_invariant_under_year_shift() {
        let strategy = SeasonStrategy::CALENDAR_YEAR;
        for day in date(2023, 1, 1).iter_days().take_while(|day| day.year() == 2023) {
            for year in [1999, 2024, 2031] {
                let shifted = date(year, day.month(), day.day());
                assert_eq!(strategy.classify(day), strategy.classify(shifted));
            }
        }
    }

    #[test]
    fn test_wrapping_window() {
        let strategy = SeasonStrategy::new("11-01".parse().unwrap(), "02-28".parse().unwrap());
        assert_eq!(strategy.classify(date(2025, 12, 25)), SeasonType::Summer);
        assert_eq!(strategy.classify(date(2025, 1, 10)), SeasonType::Summer);
        assert_eq!(strategy.classify(date(2025, 3, 1)), SeasonType::NonSummer);
    }

    #[test]
    fn test_segments_across_summer_start() {
        let segments = SeasonStrategy::CALENDAR_YEAR.segments(date(2025, 5, 1), date(2025, 7, 1));
        assert_eq!(segments, vec![(SeasonType::NonSummer, 31), (SeasonType::Summer, 30)]);
    }

    #[test]
    fn test_parse_month_day() {
        assert_eq!("05-16".parse::<MonthDay>().unwrap(), MonthDay::new(5, 16).unwrap());
        assert!("02-30".parse::<MonthDay>().is_err());
        assert!("0516".parse::<MonthDay>().is_err());
    }
}
