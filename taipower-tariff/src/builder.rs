//! Hand-assembled plans for tariffs that are not built in.

use std::{collections::HashMap, sync::Arc};

use bon::bon;
use enumset::EnumSet;

use crate::{
    day_type::{DayType, DayTypeStrategy, TaiwanDayTypes},
    error::Result,
    period::Period,
    plan::{BillingRules, PlanCategory, PlanMetadata, TariffPlan},
    profile::TariffProfile,
    rates::TariffRate,
    schedule::DaySchedule,
    season::{SeasonStrategy, SeasonType},
};

#[bon]
impl TariffPlan {
    /// Assemble and validate a custom plan.
    ///
    /// Schedules given per season apply to every day type of the strategy, and are overridden by
    /// the per-`(season, day type)` ones. With no schedules at all, the whole year is flat.
    #[builder(finish_fn = build)]
    pub fn custom(
        #[builder(into)] id: String,
        #[builder(into, default)] name: String,
        #[builder(default)] seasons: SeasonStrategy,
        #[builder(default = Arc::new(TaiwanDayTypes) as Arc<dyn DayTypeStrategy>)]
        day_types: Arc<dyn DayTypeStrategy>,
        #[builder(default)] season_schedules: HashMap<SeasonType, DaySchedule>,
        #[builder(default)] schedules: HashMap<(SeasonType, DayType), DaySchedule>,
        rates: TariffRate,
        #[builder(default)] billing: BillingRules,
    ) -> Result<Self> {
        let profile = if season_schedules.is_empty() && schedules.is_empty() {
            TariffProfile::uniform(seasons, &DaySchedule::uniform(Period::FLAT))
        } else {
            let day_type_set: EnumSet<DayType> = day_types.day_types();
            let mut merged: HashMap<_, _> = season_schedules
                .into_iter()
                .flat_map(|(season, schedule)| {
                    day_type_set.iter().map(move |day_type| ((season, day_type), schedule.clone()))
                })
                .collect();
            merged.extend(schedules);
            TariffProfile::new(seasons, day_types, merged)?
        };
        let metadata = PlanMetadata {
            name_en: name.clone(),
            name_zh: name,
            id,
            aliases: Vec::new(),
            category: PlanCategory::Custom,
        };
        Self::new(metadata, profile, rates, billing)
    }
}
