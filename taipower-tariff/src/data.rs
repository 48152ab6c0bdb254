//! Plan definitions as written in TOML.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use taipower_quantities::{cost::Cost, energy::KilowattHours, rate::KilowattHourRate};

use crate::{
    cycle::BillingCycle,
    day_type::{DayType, DayTypeRule},
    error::{Result, TariffError},
    period::Period,
    plan::{
        BasicFeeSchedule,
        BillingRules,
        CapacityFormula,
        MinimumUsageRule,
        PenaltyRule,
        PlanMetadata,
        PowerFactorRule,
        SeasonalPrice,
        TariffPlan,
        UsageSurcharge,
    },
    profile::TariffProfile,
    rates::{Bracket, TariffRate, TieredRates, TouRates},
    schedule::DaySchedule,
    season::{SeasonStrategy, SeasonType},
};

#[derive(Deserialize)]
pub struct PlanFile {
    #[serde(rename = "plan", default)]
    pub plans: Vec<PlanDefinition>,
}

impl PlanFile {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|error| TariffError::configuration(error.to_string()))
    }
}

#[derive(Deserialize)]
pub struct PlanDefinition {
    #[serde(flatten)]
    pub metadata: PlanMetadata,

    #[serde(default)]
    pub seasons: SeasonDefinition,

    #[serde(default)]
    pub day_types: DayTypeRule,

    /// No schedules means the whole year is one flat period.
    #[serde(default)]
    pub schedules: BTreeMap<SeasonType, BTreeMap<DayType, DaySchedule>>,

    #[serde(default)]
    pub rates: Vec<RateDefinition>,

    #[serde(default)]
    pub tiers: BTreeMap<SeasonType, Vec<BracketDefinition>>,

    #[serde(default)]
    pub billing: BillingDefinition,
}

#[derive(Copy, Clone, Deserialize)]
#[serde(untagged)]
pub enum SeasonDefinition {
    Preset(SeasonPreset),
    Window(SeasonStrategy),
}

impl Default for SeasonDefinition {
    fn default() -> Self {
        Self::Preset(SeasonPreset::CalendarYear)
    }
}

impl From<SeasonDefinition> for SeasonStrategy {
    fn from(definition: SeasonDefinition) -> Self {
        match definition {
            SeasonDefinition::Preset(SeasonPreset::CalendarYear) => Self::CALENDAR_YEAR,
            SeasonDefinition::Preset(SeasonPreset::HighVoltage) => Self::HIGH_VOLTAGE,
            SeasonDefinition::Window(window) => window,
        }
    }
}

#[derive(Copy, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonPreset {
    CalendarYear,
    HighVoltage,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateDefinition {
    pub season: SeasonType,

    /// Applies to every day type when omitted.
    pub day_type: Option<DayType>,

    pub period: Period,
    pub rate: KilowattHourRate,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BracketDefinition {
    /// Monthly upper bound, omitted for the last bracket.
    pub up_to: Option<KilowattHours>,

    pub rate: KilowattHourRate,
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BillingDefinition {
    pub cycle: BillingCycle,
    pub per_household: Option<Cost>,
    pub formula: CapacityFormula,
    pub weekend_allowance: f64,
    pub capacity_prices: BTreeMap<String, SeasonalPrice>,
    pub penalty: Option<PenaltyRule>,
    pub power_factor: Option<PowerFactorRule>,
    pub surcharge: Option<UsageSurcharge>,
    pub minimum_monthly_fee: Option<Cost>,
    pub minimum_usage: Vec<MinimumUsageRule>,
}

impl Default for BillingDefinition {
    fn default() -> Self {
        Self {
            cycle: BillingCycle::default(),
            per_household: None,
            formula: CapacityFormula::default(),
            weekend_allowance: 0.5,
            capacity_prices: BTreeMap::new(),
            penalty: None,
            power_factor: None,
            surcharge: None,
            minimum_monthly_fee: None,
            minimum_usage: Vec::new(),
        }
    }
}

impl From<BillingDefinition> for BillingRules {
    fn from(definition: BillingDefinition) -> Self {
        Self {
            basic_fee: BasicFeeSchedule {
                per_household: definition.per_household,
                capacity_prices: definition.capacity_prices,
                formula: definition.formula,
                weekend_allowance: definition.weekend_allowance,
            },
            penalty: definition.penalty,
            power_factor: definition.power_factor,
            surcharge: definition.surcharge,
            minimum_monthly_fee: definition.minimum_monthly_fee,
            minimum_usage: definition.minimum_usage,
            default_cycle: definition.cycle,
        }
    }
}

impl TryFrom<PlanDefinition> for TariffPlan {
    type Error = TariffError;

    fn try_from(definition: PlanDefinition) -> Result<Self> {
        let id = definition.metadata.id.clone();
        let in_plan = |error: TariffError| match error {
            TariffError::Configuration(message) => {
                TariffError::configuration(format!("`{id}`: {message}"))
            }
            error => error,
        };

        let seasons = SeasonStrategy::from(definition.seasons);
        let profile = if definition.schedules.is_empty() {
            TariffProfile::uniform(seasons, &DaySchedule::uniform(Period::FLAT))
        } else {
            let schedules: HashMap<_, _> = definition
                .schedules
                .into_iter()
                .flat_map(|(season, by_day_type)| {
                    by_day_type.into_iter().map(move |(day_type, schedule)| ((season, day_type), schedule))
                })
                .collect();
            TariffProfile::new(seasons, definition.day_types.into_strategy(), schedules).map_err(&in_plan)?
        };

        let rates = match (definition.rates.is_empty(), definition.tiers.is_empty()) {
            (false, false) => {
                return Err(in_plan(TariffError::configuration("both `rates` and `tiers` are given")));
            }
            (true, false) => {
                let by_season = definition
                    .tiers
                    .into_iter()
                    .map(|(season, brackets)| {
                        let brackets = brackets
                            .into_iter()
                            .map(|bracket| Bracket { upper_bound: bracket.up_to, rate: bracket.rate })
                            .collect();
                        (season, brackets)
                    })
                    .collect();
                TariffRate::Tiered(TieredRates::new(by_season).map_err(&in_plan)?)
            }
            _ => {
                let mut rates = TouRates::default();
                for entry in definition.rates {
                    rates.insert(entry.season, entry.day_type, entry.period, entry.rate);
                }
                TariffRate::TimeOfUse(rates)
            }
        };

        Self::new(definition.metadata, profile, rates, definition.billing.into()).map_err(in_plan)
    }
}

/// Parse and validate every plan in a TOML document.
pub fn load_plans(text: &str) -> Result<Vec<TariffPlan>> {
    PlanFile::parse(text)?.plans.into_iter().map(TariffPlan::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::MeterPhase;

    const MINIMAL: &str = r#"
        [[plan]]
        id = "flat_test"
        name_zh = "測試"
        name_en = "Test"

        [plan.tiers]
        summer = [{ up_to = 100, rate = 2.0 }, { rate = 3.0 }]
        non_summer = [{ rate = 1.0 }]
    "#;

    #[test]
    fn test_minimal_tiered_plan() -> Result {
        let plans = load_plans(MINIMAL)?;
        assert_eq!(plans.len(), 1);
        assert!(plans[0].is_tiered());
        assert_eq!(plans[0].billing.default_cycle, BillingCycle::Monthly);
        assert!((plans[0].billing.basic_fee.weekend_allowance - 0.5).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn test_missing_rate_is_rejected() {
        let text = r#"
            [[plan]]
            id = "broken"
            name_zh = "壞"
            name_en = "Broken"

            [plan.schedules.summer.weekday]
            slots = [{ start = "09:00", end = "24:00", period = "peak" }]
            default_period = "off_peak"

            [plan.schedules.summer.saturday]
            default_period = "off_peak"
            slots = []

            [plan.schedules.summer.sunday_holiday]
            default_period = "off_peak"
            slots = []

            [plan.schedules.non_summer.weekday]
            default_period = "off_peak"
            slots = []

            [plan.schedules.non_summer.saturday]
            default_period = "off_peak"
            slots = []

            [plan.schedules.non_summer.sunday_holiday]
            default_period = "off_peak"
            slots = []

            [[plan.rates]]
            season = "summer"
            period = "off_peak"
            rate = 2.0

            [[plan.rates]]
            season = "non_summer"
            period = "off_peak"
            rate = 2.0
        "#;
        let error = load_plans(text).unwrap_err();
        assert!(error.is_configuration(), "{error}");
    }

    #[test]
    fn test_overlapping_slots_are_rejected() {
        let text = r#"
            [[plan]]
            id = "overlap"
            name_zh = "重疊"
            name_en = "Overlap"

            [plan.schedules.summer.weekday]
            slots = [
                { start = "09:00", end = "17:00", period = "peak" },
                { start = "16:00", end = "18:00", period = "semi_peak" },
            ]
            default_period = "off_peak"

            [[plan.rates]]
            season = "summer"
            period = "peak"
            rate = 2.0
        "#;
        let error = load_plans(text).unwrap_err();
        assert!(error.to_string().contains("overlap"), "{error}");
    }

    #[test]
    fn test_rates_and_tiers_are_exclusive() {
        let text = r#"
            [[plan]]
            id = "both"
            name_zh = "兩者"
            name_en = "Both"

            [[plan.rates]]
            season = "summer"
            period = "flat"
            rate = 2.0

            [plan.tiers]
            summer = [{ rate = 3.0 }]
        "#;
        assert!(load_plans(text).is_err());
    }

    #[test]
    fn test_custom_season_window() -> Result {
        let text = r#"
            [[plan]]
            id = "window"
            name_zh = "窗"
            name_en = "Window"
            seasons = { summer_start = "07-01", summer_end = "08-31" }

            [plan.tiers]
            summer = [{ rate = 3.0 }]
            non_summer = [{ rate = 1.0 }]
        "#;
        let plans = load_plans(text)?;
        let july = chrono::NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let june = chrono::NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        assert_eq!(plans[0].profile.season(july), SeasonType::Summer);
        assert_eq!(plans[0].profile.season(june), SeasonType::NonSummer);
        Ok(())
    }

    #[test]
    fn test_minimum_usage_rules() -> Result {
        let text = r#"
            [[plan]]
            id = "metered"
            name_zh = "最低度數"
            name_en = "Metered"

            [plan.tiers]
            summer = [{ rate = 2.0 }]
            non_summer = [{ rate = 2.0 }]

            [[plan.billing.minimum_usage]]
            phase = "single"
            voltage = 110
            kwh_per_ampere = 1.0

            [[plan.billing.minimum_usage]]
            phase = "three"
            voltage = 380
            kwh_per_ampere = 2.0
            over = { above = 30, kwh_per_ampere = 3.0 }
        "#;
        let plans = load_plans(text)?;
        let rules = &plans[0].billing.minimum_usage;
        assert_eq!(rules.len(), 2);
        assert!(rules[0].applies_to(MeterPhase::Single, 110));
        assert!(!rules[0].applies_to(MeterPhase::Single, 220));
        assert_eq!(rules[1].monthly_minimum(30.0), KilowattHours::new(60.0));
        assert_eq!(rules[1].monthly_minimum(40.0), KilowattHours::new(120.0));
        Ok(())
    }
}
