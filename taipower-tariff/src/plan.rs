use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use taipower_quantities::{cost::Cost, energy::KilowattHours, rate::{KilowattHourRate, KilowattRate}};

use crate::{
    calendar::HolidayCalendar,
    cycle::BillingCycle,
    engine::Context,
    error::{Result, TariffError},
    profile::TariffProfile,
    rates::TariffRate,
    season::SeasonType,
};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum PlanCategory {
    #[default]
    #[display("residential")]
    Residential,

    #[display("lighting")]
    Lighting,

    #[display("low_voltage")]
    LowVoltage,

    #[display("high_voltage")]
    HighVoltage,

    #[display("custom")]
    Custom,
}

/// Identity of a plan, as shown to users and used by the name lookup.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PlanMetadata {
    pub id: String,
    pub name_zh: String,
    pub name_en: String,

    #[serde(default)]
    pub aliases: Vec<String>,

    #[serde(default)]
    pub category: PlanCategory,
}

/// Price per contracted kW for one capacity class.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeasonalPrice {
    pub summer: KilowattRate,
    pub non_summer: KilowattRate,
}

impl SeasonalPrice {
    #[must_use]
    pub const fn flat(price: f64) -> Self {
        Self { summer: KilowattRate::new(price), non_summer: KilowattRate::new(price) }
    }

    #[must_use]
    pub const fn get(&self, season: SeasonType) -> KilowattRate {
        match season {
            SeasonType::Summer => self.summer,
            SeasonType::NonSummer => self.non_summer,
        }
    }
}

/// How contracted capacities turn into the monthly basic fee.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityFormula {
    /// Every declared class is billed at its own price.
    #[default]
    Additive,

    /// Regular, non-summer, and the Saturday semi-peak and off-peak share above the allowance.
    TwoStage,

    /// Regular, semi-peak, and the Saturday semi-peak and off-peak share above the allowance.
    ThreeStage,
}

/// Monthly fixed charges of a plan.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicFeeSchedule {
    /// Per meter, per month.
    pub per_household: Option<Cost>,

    /// Capacity class name → price per kW.
    pub capacity_prices: BTreeMap<String, SeasonalPrice>,

    pub formula: CapacityFormula,

    /// Share of the regular and second-stage capacity granted free to weekend classes.
    pub weekend_allowance: f64,
}

impl BasicFeeSchedule {
    pub const REGULAR: &'static str = "regular";
    pub const NON_SUMMER: &'static str = "non_summer";
    pub const SEMI_PEAK: &'static str = "semi_peak";
    pub const SATURDAY_SEMI_PEAK: &'static str = "saturday_semi_peak";
    pub const OFF_PEAK: &'static str = "off_peak";

    #[must_use]
    pub fn price(&self, class: &str, season: SeasonType) -> Option<KilowattRate> {
        self.capacity_prices.get(class).map(|price| price.get(season))
    }
}

/// Over-contract penalty multipliers.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyRule {
    /// Share of the contract billed at the low multiplier.
    pub threshold_ratio: f64,
    pub low_multiplier: f64,
    pub high_multiplier: f64,
}

impl Default for PenaltyRule {
    fn default() -> Self {
        Self { threshold_ratio: 0.1, low_multiplier: 2.0, high_multiplier: 3.0 }
    }
}

/// What the power-factor adjustment percentage applies to.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentBase {
    #[default]
    Basic,
    Energy,
    Total,
}

/// Linear power-factor adjustment around a baseline.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerFactorRule {
    pub baseline_percent: f64,

    /// Power factors above the ceiling earn no further discount.
    pub ceiling_percent: f64,

    /// Adjustment per percentage point of deviation, in percent.
    pub step_percent: f64,

    pub applies_to: AdjustmentBase,
}

impl Default for PowerFactorRule {
    fn default() -> Self {
        Self { baseline_percent: 80.0, ceiling_percent: 95.0, step_percent: 0.1, applies_to: AdjustmentBase::Basic }
    }
}

/// Extra charge on monthly usage above a threshold.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageSurcharge {
    pub threshold: KilowattHours,
    pub rate: KilowattHourRate,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum MeterPhase {
    #[display("single")]
    Single,

    #[display("three")]
    Three,
}

/// Rated current above which a steeper per-ampere minimum applies.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmpereStep {
    pub above: f64,
    pub kwh_per_ampere: f64,
}

/// Minimum monthly usage billed to meters of one phase and voltage.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MinimumUsageRule {
    pub phase: MeterPhase,
    pub voltage: u16,

    /// Monthly kWh per rated ampere.
    pub kwh_per_ampere: f64,

    pub over: Option<AmpereStep>,
}

impl MinimumUsageRule {
    #[must_use]
    pub fn applies_to(&self, phase: MeterPhase, voltage: u16) -> bool {
        self.phase == phase && self.voltage == voltage
    }

    /// The whole rated current is billed at the steeper rate once it exceeds the step.
    #[must_use]
    pub fn monthly_minimum(&self, ampere: f64) -> KilowattHours {
        let kwh_per_ampere = match self.over {
            Some(step) if ampere > step.above => step.kwh_per_ampere,
            _ => self.kwh_per_ampere,
        };
        KilowattHours::new(ampere * kwh_per_ampere)
    }
}

/// Everything beyond the energy charge.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BillingRules {
    pub basic_fee: BasicFeeSchedule,
    pub penalty: Option<PenaltyRule>,
    pub power_factor: Option<PowerFactorRule>,
    pub surcharge: Option<UsageSurcharge>,
    pub minimum_monthly_fee: Option<Cost>,

    /// First matching rule wins. Empty when the plan bills actual usage only.
    pub minimum_usage: Vec<MinimumUsageRule>,

    pub default_cycle: BillingCycle,
}

/// A complete tariff: profile, rates and billing rules. Immutable and freely shared.
#[derive(Clone, Debug)]
pub struct TariffPlan {
    pub metadata: PlanMetadata,
    pub profile: TariffProfile,
    pub rates: TariffRate,
    pub billing: BillingRules,
}

/// A classified timestamp together with its unit rate, if the plan is time-of-use.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PricingContext {
    #[serde(flatten)]
    pub context: Context,
    pub rate: Option<KilowattHourRate>,
}

impl TariffPlan {
    pub fn new(
        metadata: PlanMetadata,
        profile: TariffProfile,
        rates: TariffRate,
        billing: BillingRules,
    ) -> Result<Self> {
        if metadata.id.trim().is_empty() {
            return Err(TariffError::configuration("a plan needs an id"));
        }
        if let TariffRate::TimeOfUse(tou) = &rates {
            if tou.is_empty() {
                return Err(TariffError::configuration(format!("`{}` has no rates", metadata.id)));
            }
            // Every reachable classification must be priced.
            for (season, day_type, schedule) in profile.schedules() {
                for period in schedule.periods() {
                    tou.rate(season, day_type, period)?;
                }
            }
        }
        if billing.basic_fee.weekend_allowance < 0.0 {
            return Err(TariffError::configuration(format!(
                "`{}` has a negative weekend allowance",
                metadata.id
            )));
        }
        for rule in &billing.minimum_usage {
            let per_ampere = [Some(rule.kwh_per_ampere), rule.over.map(|step| step.kwh_per_ampere)];
            if per_ampere.into_iter().flatten().any(|kwh| !kwh.is_finite() || kwh < 0.0) {
                return Err(TariffError::configuration(format!(
                    "`{}` has an invalid minimum usage for {} phase {} V meters",
                    metadata.id, rule.phase, rule.voltage,
                )));
            }
        }
        Ok(Self { metadata, profile, rates, billing })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    #[must_use]
    pub const fn is_tiered(&self) -> bool {
        matches!(self.rates, TariffRate::Tiered(_))
    }

    /// Classify a timestamp and look up its time-of-use rate.
    pub fn pricing_context(
        &self,
        timestamp: NaiveDateTime,
        calendar: &dyn HolidayCalendar,
    ) -> Result<PricingContext> {
        let context = self.profile.context(timestamp, calendar)?;
        let rate = match &self.rates {
            TariffRate::TimeOfUse(rates) => {
                Some(rates.rate(context.season, context.day_type, &context.period)?)
            }
            TariffRate::Tiered(_) => None,
        };
        Ok(PricingContext { context, rate })
    }
}
