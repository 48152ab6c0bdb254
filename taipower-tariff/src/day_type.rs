use std::fmt::Debug;

use chrono::{Datelike, NaiveDate, Weekday};
use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};

use crate::calendar::HolidayCalendar;

#[derive(Debug, Hash, Ord, PartialOrd, Serialize, Deserialize, EnumSetType, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum DayType {
    #[display("weekday")]
    Weekday,

    #[display("saturday")]
    Saturday,

    /// Sundays and public holidays share one bucket.
    #[display("sunday_holiday")]
    SundayHoliday,
}

/// Maps a calendar date onto a [`DayType`] bucket.
pub trait DayTypeStrategy: Debug + Send + Sync {
    fn classify(&self, date: NaiveDate, calendar: &dyn HolidayCalendar) -> DayType;

    /// Every bucket this strategy can produce. A plan must carry a schedule for each of them.
    fn day_types(&self) -> EnumSet<DayType>;
}

/// Taipower's rule: holidays and Sundays, then Saturdays, then everything else.
#[derive(Copy, Clone, Debug, Default)]
pub struct TaiwanDayTypes;

impl DayTypeStrategy for TaiwanDayTypes {
    fn classify(&self, date: NaiveDate, calendar: &dyn HolidayCalendar) -> DayType {
        if calendar.is_holiday(date) {
            return DayType::SundayHoliday;
        }
        match date.weekday() {
            Weekday::Sun => DayType::SundayHoliday,
            Weekday::Sat => DayType::Saturday,
            _ => DayType::Weekday,
        }
    }

    fn day_types(&self) -> EnumSet<DayType> {
        EnumSet::all()
    }
}

/// Two buckets only: weekends and holidays fold into [`DayType::SundayHoliday`].
#[derive(Copy, Clone, Debug, Default)]
pub struct WeekdayWeekend;

impl DayTypeStrategy for WeekdayWeekend {
    fn classify(&self, date: NaiveDate, calendar: &dyn HolidayCalendar) -> DayType {
        match date.weekday() {
            Weekday::Sat | Weekday::Sun => DayType::SundayHoliday,
            _ if calendar.is_holiday(date) => DayType::SundayHoliday,
            _ => DayType::Weekday,
        }
    }

    fn day_types(&self) -> EnumSet<DayType> {
        DayType::Weekday | DayType::SundayHoliday
    }
}

/// Explicit weekday table for custom plans, with an optional holiday override.
#[derive(Copy, Clone, Debug)]
pub struct FixedWeekdayMap {
    /// Indexed by [`Weekday::num_days_from_monday`].
    by_weekday: [DayType; 7],
    holiday: Option<DayType>,
}

impl FixedWeekdayMap {
    pub const fn new(by_weekday: [DayType; 7], holiday: Option<DayType>) -> Self {
        Self { by_weekday, holiday }
    }
}

impl DayTypeStrategy for FixedWeekdayMap {
    fn classify(&self, date: NaiveDate, calendar: &dyn HolidayCalendar) -> DayType {
        if let Some(holiday) = self.holiday
            && calendar.is_holiday(date)
        {
            return holiday;
        }
        self.by_weekday[date.weekday().num_days_from_monday() as usize]
    }

    fn day_types(&self) -> EnumSet<DayType> {
        self.by_weekday.iter().copied().chain(self.holiday).collect()
    }
}

/// Named strategies that plan data can refer to.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayTypeRule {
    #[default]
    Taiwan,
    WeekdayWeekend,
}

impl DayTypeRule {
    #[must_use]
    pub fn into_strategy(self) -> std::sync::Arc<dyn DayTypeStrategy> {
        match self {
            Self::Taiwan => std::sync::Arc::new(TaiwanDayTypes),
            Self::WeekdayWeekend => std::sync::Arc::new(WeekdayWeekend),
        }
    }
}
