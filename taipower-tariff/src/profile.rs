use std::{collections::HashMap, fmt::Debug, sync::Arc};

use chrono::NaiveDate;

use crate::{
    calendar::HolidayCalendar,
    day_type::{DayType, DayTypeStrategy, TaiwanDayTypes},
    error::{Result, TariffError},
    schedule::DaySchedule,
    season::{SeasonStrategy, SeasonType},
};

/// Season rule, day-type rule and a daily schedule for each `(season, day type)`.
///
/// Immutable once built. Construction checks that every bucket the day-type strategy can produce
/// has a schedule in both seasons, and that every schedule is free of ambiguous overlaps.
#[derive(Clone, Debug)]
pub struct TariffProfile {
    seasons: SeasonStrategy,
    day_types: Arc<dyn DayTypeStrategy>,
    schedules: HashMap<(SeasonType, DayType), DaySchedule>,
}

impl TariffProfile {
    pub fn new(
        seasons: SeasonStrategy,
        day_types: Arc<dyn DayTypeStrategy>,
        schedules: HashMap<(SeasonType, DayType), DaySchedule>,
    ) -> Result<Self> {
        for schedule in schedules.values() {
            schedule.validate()?;
        }
        for season in [SeasonType::Summer, SeasonType::NonSummer] {
            for day_type in day_types.day_types() {
                if !schedules.contains_key(&(season, day_type)) {
                    return Err(TariffError::configuration(format!(
                        "missing the {season} {day_type} schedule"
                    )));
                }
            }
        }
        Ok(Self { seasons, day_types, schedules })
    }

    /// One schedule for every day of the year, as used by the tiered plans.
    pub fn uniform(seasons: SeasonStrategy, schedule: &DaySchedule) -> Self {
        let schedules = [SeasonType::Summer, SeasonType::NonSummer]
            .into_iter()
            .flat_map(|season| {
                enumset::EnumSet::<DayType>::all()
                    .into_iter()
                    .map(move |day_type| ((season, day_type), schedule.clone()))
            })
            .collect();
        Self { seasons, day_types: Arc::new(TaiwanDayTypes), schedules }
    }

    #[must_use]
    pub const fn seasons(&self) -> &SeasonStrategy {
        &self.seasons
    }

    #[must_use]
    pub fn season(&self, date: NaiveDate) -> SeasonType {
        self.seasons.classify(date)
    }

    #[must_use]
    pub fn day_type(&self, date: NaiveDate, calendar: &dyn HolidayCalendar) -> DayType {
        self.day_types.classify(date, calendar)
    }

    pub fn schedules(&self) -> impl Iterator<Item = (SeasonType, DayType, &DaySchedule)> {
        self.schedules.iter().map(|((season, day_type), schedule)| (*season, *day_type, schedule))
    }

    pub fn schedule(&self, season: SeasonType, day_type: DayType) -> Result<&DaySchedule> {
        self.schedules.get(&(season, day_type)).ok_or_else(|| {
            TariffError::configuration(format!("missing the {season} {day_type} schedule"))
        })
    }
}
