//! Batch classification of timestamps into `(season, day type, period)`.

use std::collections::{BTreeSet, HashMap};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::{
    calendar::HolidayCalendar,
    day_type::DayType,
    error::Result,
    period::Period,
    profile::TariffProfile,
    schedule::DaySchedule,
    season::SeasonType,
};

/// Classification of a single timestamp.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct Context {
    pub season: SeasonType,
    pub day_type: DayType,
    pub period: Period,
}

/// Column-wise classification of a batch, aligned with the input timestamps.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Classification {
    pub seasons: Vec<SeasonType>,
    pub day_types: Vec<DayType>,
    pub periods: Vec<Period>,
}

impl Classification {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            seasons: Vec::with_capacity(capacity),
            day_types: Vec::with_capacity(capacity),
            periods: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.periods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Context> {
        Some(Context {
            season: *self.seasons.get(index)?,
            day_type: *self.day_types.get(index)?,
            period: self.periods.get(index)?.clone(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (SeasonType, DayType, &Period)> {
        self.seasons
            .iter()
            .zip(&self.day_types)
            .zip(&self.periods)
            .map(|((season, day_type), period)| (*season, *day_type, period))
    }
}

/// Date-level resolution shared by every timestamp falling on the date.
struct ResolvedDate<'a> {
    season: SeasonType,
    day_type: DayType,
    schedule: &'a DaySchedule,
}

impl TariffProfile {
    /// Classify a single timestamp.
    pub fn context(&self, timestamp: NaiveDateTime, calendar: &dyn HolidayCalendar) -> Result<Context> {
        let date = timestamp.date();
        let season = self.season(date);
        let day_type = self.day_type(date, calendar);
        let period = self.schedule(season, day_type)?.period_at(timestamp.time()).clone();
        Ok(Context { season, day_type, period })
    }

    /// Classify a batch of timestamps in any order.
    ///
    /// Season and day type are resolved once per distinct date, so the calendar sees one lookup per
    /// date regardless of how many timestamps share it. Only the period is resolved per timestamp.
    #[instrument(skip_all, fields(n_timestamps = timestamps.len()))]
    pub fn evaluate(
        &self,
        timestamps: &[NaiveDateTime],
        calendar: &dyn HolidayCalendar,
    ) -> Result<Classification> {
        let dates: BTreeSet<NaiveDate> = timestamps.iter().map(NaiveDateTime::date).collect();
        calendar.preload(&dates.iter().map(NaiveDate::year).collect());

        let resolved = dates
            .into_iter()
            .map(|date| {
                let season = self.season(date);
                let day_type = self.day_type(date, calendar);
                let schedule = self.schedule(season, day_type)?;
                Ok((date, ResolvedDate { season, day_type, schedule }))
            })
            .collect::<Result<HashMap<_, _>>>()?;
        debug!(n_dates = resolved.len(), "resolved dates");

        let mut classification = Classification::with_capacity(timestamps.len());
        for timestamp in timestamps {
            let date = &resolved[&timestamp.date()];
            classification.seasons.push(date.season);
            classification.day_types.push(date.day_type);
            classification.periods.push(date.schedule.period_at(timestamp.time()).clone());
        }
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use chrono::{NaiveTime, TimeDelta};

    use super::*;
    use crate::{
        calendar::CustomCalendar,
        day_type::TaiwanDayTypes,
        schedule::{MinuteOfDay, TimeSlot},
        season::SeasonStrategy,
    };

    /// Counts every holiday lookup it answers.
    #[derive(Default)]
    struct CountingCalendar {
        lookups: AtomicUsize,
        preloads: AtomicUsize,
    }

    impl HolidayCalendar for CountingCalendar {
        fn is_holiday(&self, _date: NaiveDate) -> bool {
            self.lookups.fetch_add(1, Ordering::Relaxed);
            false
        }

        fn preload(&self, years: &BTreeSet<i32>) {
            self.preloads.fetch_add(years.len(), Ordering::Relaxed);
        }
    }

    fn profile() -> TariffProfile {
        let peak = DaySchedule::new(
            vec![TimeSlot::new(MinuteOfDay::hm(9, 0).unwrap(), MinuteOfDay::END_OF_DAY, Period::PEAK)],
            Period::OFF_PEAK,
        )
        .unwrap();
        let off_peak = DaySchedule::uniform(Period::OFF_PEAK);
        let mut schedules = HashMap::new();
        for season in [SeasonType::Summer, SeasonType::NonSummer] {
            schedules.insert((season, DayType::Weekday), peak.clone());
            schedules.insert((season, DayType::Saturday), off_peak.clone());
            schedules.insert((season, DayType::SundayHoliday), off_peak.clone());
        }
        TariffProfile::new(SeasonStrategy::CALENDAR_YEAR, Arc::new(TaiwanDayTypes), schedules).unwrap()
    }

    fn at(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap())
    }

    #[test]
    fn test_context() -> Result {
        let calendar = CustomCalendar::default();
        let context = profile().context(at(2025, 7, 15, 14), &calendar)?;
        assert_eq!(
            context,
            Context { season: SeasonType::Summer, day_type: DayType::Weekday, period: Period::PEAK },
        );
        Ok(())
    }

    #[test]
    fn test_holiday_weekday_is_off_peak() -> Result {
        let calendar = CustomCalendar::new([NaiveDate::from_ymd_opt(2025, 10, 10).unwrap()]);
        let context = profile().context(at(2025, 10, 10, 14), &calendar)?;
        assert_eq!(context.day_type, DayType::SundayHoliday);
        assert_eq!(context.period, Period::OFF_PEAK);
        Ok(())
    }

    #[test]
    fn test_batch_matches_single_and_keeps_input_order() -> Result {
        let calendar = CustomCalendar::default();
        let profile = profile();
        let timestamps = vec![at(2025, 7, 20, 10), at(2025, 1, 6, 7), at(2025, 7, 15, 14), at(2025, 7, 15, 3)];
        let classification = profile.evaluate(&timestamps, &calendar)?;
        assert_eq!(classification.len(), timestamps.len());
        for (index, timestamp) in timestamps.iter().enumerate() {
            assert_eq!(classification.get(index), Some(profile.context(*timestamp, &calendar)?));
        }
        Ok(())
    }

    #[test]
    fn test_calendar_lookups_scale_with_unique_dates() -> Result {
        let calendar = CountingCalendar::default();
        let start = at(2024, 12, 1, 0);
        let timestamps = (0..90 * 96)
            .map(|index| start + TimeDelta::minutes(15 * index))
            .collect::<Vec<_>>();
        let classification = profile().evaluate(&timestamps, &calendar)?;
        assert_eq!(classification.len(), 90 * 96);
        assert_eq!(calendar.lookups.load(Ordering::Relaxed), 90);
        assert_eq!(calendar.preloads.load(Ordering::Relaxed), 2);
        Ok(())
    }

    #[test]
    fn test_empty_batch() -> Result {
        let classification = profile().evaluate(&[], &CustomCalendar::default())?;
        assert!(classification.is_empty());
        Ok(())
    }
}
