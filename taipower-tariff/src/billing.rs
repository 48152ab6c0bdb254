//! Bill assembly: energy charge, basic fee, demand penalty, power-factor adjustment and surcharges.

use std::{borrow::Cow, collections::BTreeMap};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use taipower_quantities::{
    cost::Cost,
    energy::KilowattHours,
    power::Kilowatts,
    rate::KilowattRate,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    calendar::HolidayCalendar,
    cycle::BillingCycle,
    day_type::DayType,
    energy::LineItem,
    error::{Result, TariffError},
    period::{Period, PeriodType},
    plan::{
        AdjustmentBase,
        BasicFeeSchedule,
        CapacityFormula,
        MeterPhase,
        PenaltyRule,
        PowerFactorRule,
        TariffPlan,
    },
    season::SeasonType,
    usage::{DemandSeries, UsageRecord, UsageSeries},
};

/// Demand is averaged over clock-aligned windows of this length.
pub const DEMAND_WINDOW_MINUTES: u32 = 15;

/// Rated meter of a low-voltage customer.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct MeterSpec {
    pub phase: MeterPhase,
    pub voltage: u16,
    pub ampere: f64,
}

/// How demand turns into the over-contract demand.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverContractMode {
    /// Overall peak above the regular capacity.
    #[default]
    Regular,

    /// Peak of every demand category above the capacities cumulated up to that category.
    ///
    /// Only for the two-stage and three-stage capacity formulas.
    Staged,
}

/// Customer-side inputs beyond the usage series.
///
/// Everything is optional: with no contract capacities the bill is the energy charge plus any
/// per-household fee.
#[derive(Clone, Debug, bon::Builder)]
pub struct BillingInputs {
    /// Capacity class → contracted kW.
    #[builder(default)]
    pub contract_capacities: BTreeMap<String, Kilowatts>,

    /// Average power factor, in percent.
    pub power_factor: Option<f64>,

    pub demand: Option<DemandSeries>,

    /// Scales the peak of demand series sampled coarser than the demand window.
    #[builder(default = 1.0)]
    pub demand_adjustment_factor: f64,

    /// Overrides the plan's default cycle.
    pub cycle: Option<BillingCycle>,

    #[builder(default = 1)]
    pub households: u32,

    /// Known over-contract demand, used instead of the demand series.
    pub over_contract: Option<Kilowatts>,

    #[builder(default)]
    pub over_contract_mode: OverContractMode,

    /// Needed by plans that bill a minimum usage.
    pub meter: Option<MeterSpec>,
}

impl Default for BillingInputs {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BillingInputs {
    #[must_use]
    pub fn with_capacity(mut self, class: impl Into<String>, kw: f64) -> Self {
        self.contract_capacities.insert(class.into(), Kilowatts::new(kw));
        self
    }

    #[must_use]
    pub fn capacity(&self, class: &str) -> Kilowatts {
        self.contract_capacities.get(class).copied().unwrap_or_default()
    }

    fn validate(&self, schedule: &BasicFeeSchedule) -> Result {
        for (class, kw) in &self.contract_capacities {
            let field = || format!("contract_capacities.{class}");
            if !kw.is_finite() || *kw < Kilowatts::ZERO {
                return Err(TariffError::invalid_usage(field(), format!("{kw} is not a valid capacity")));
            }
            if !schedule.capacity_prices.contains_key(class) {
                return Err(TariffError::invalid_usage(field(), "the plan has no such capacity class"));
            }
        }
        if let Some(power_factor) = self.power_factor
            && (power_factor.is_nan() || power_factor <= 0.0 || power_factor > 100.0)
        {
            return Err(TariffError::invalid_usage(
                "power_factor",
                format!("{power_factor} is outside (0, 100]"),
            ));
        }
        if !self.demand_adjustment_factor.is_finite() || self.demand_adjustment_factor <= 0.0 {
            return Err(TariffError::invalid_usage(
                "demand_adjustment_factor",
                format!("{} must be a positive number", self.demand_adjustment_factor),
            ));
        }
        if let Some(over) = self.over_contract
            && (!over.is_finite() || over < Kilowatts::ZERO)
        {
            return Err(TariffError::invalid_usage("over_contract", format!("{over} is not a valid demand")));
        }
        if self.over_contract_mode == OverContractMode::Staged
            && !matches!(schedule.formula, CapacityFormula::TwoStage | CapacityFormula::ThreeStage)
        {
            return Err(TariffError::invalid_usage(
                "over_contract_mode",
                "staged over-contract demand needs a two-stage or three-stage plan",
            ));
        }
        if let Some(meter) = self.meter
            && (!meter.ampere.is_finite() || meter.ampere <= 0.0)
        {
            return Err(TariffError::invalid_usage("meter.ampere", format!("{} must be positive", meter.ampere)));
        }
        Ok(())
    }
}

/// Non-fatal findings attached to a [`Bill`].
#[derive(Clone, Debug, PartialEq, Serialize, derive_more::Display)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BillWarning {
    #[display("demand is sampled every {median_minutes} minutes, peaks are scaled by {factor}")]
    CoarseDemand { median_minutes: i64, factor: f64 },

    #[display("the period starting {start} was raised to the minimum charge of {minimum}")]
    MinimumCharge { start: NaiveDate, minimum: Cost },

    #[display("the usage of {usage} in the period starting {start} is billed as {minimum}")]
    MinimumUsage { start: NaiveDate, usage: KilowattHours, minimum: KilowattHours },
}

/// Peak-demand bucket matched against the staged capacities.
#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandCategory {
    Peak,
    SemiPeak,
    SaturdaySemiPeak,
    OffPeak,
}

impl DemandCategory {
    /// Custom and flat periods fall into no category.
    #[must_use]
    pub const fn of(day_type: DayType, period: &Period) -> Option<Self> {
        match (day_type, period.built_in()) {
            (_, Some(PeriodType::Peak)) => Some(Self::Peak),
            (DayType::Saturday, Some(PeriodType::SemiPeak)) => Some(Self::SaturdaySemiPeak),
            (_, Some(PeriodType::SemiPeak)) => Some(Self::SemiPeak),
            (_, Some(PeriodType::OffPeak)) => Some(Self::OffPeak),
            (_, Some(PeriodType::Flat) | None) => None,
        }
    }
}

/// One billing period of a [`Bill`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthlyBillBreakdown {
    pub start: NaiveDate,

    /// Exclusive.
    pub end: NaiveDate,

    /// Season of the period's first day, which prices the capacity.
    pub season: SeasonType,

    pub usage: KilowattHours,
    pub peak_demand: Option<Kilowatts>,
    pub energy_cost: Cost,
    pub basic_fee: Cost,
    pub penalty: Cost,

    /// Negative for a discount.
    pub pf_adjustment: Cost,

    pub surcharge: Cost,
    pub total: Cost,
    pub line_items: Vec<LineItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Bill {
    pub plan_id: String,
    pub cycle: BillingCycle,
    pub periods: BTreeMap<NaiveDate, MonthlyBillBreakdown>,
    pub warnings: Vec<BillWarning>,
}

impl Bill {
    /// Sum of the period totals, rounded to cents.
    #[must_use]
    pub fn total(&self) -> Cost {
        self.periods.values().map(|period| period.total).sum::<Cost>().round_cents()
    }
}

impl TariffPlan {
    /// Full bill per billing period.
    #[instrument(skip_all, fields(plan = self.id(), n_records = usage.len()))]
    pub fn calculate_bill(
        &self,
        usage: &UsageSeries,
        inputs: &BillingInputs,
        calendar: &dyn HolidayCalendar,
    ) -> Result<Bill> {
        inputs.validate(&self.billing.basic_fee)?;
        let cycle = inputs.cycle.unwrap_or(self.billing.default_cycle);
        let months = f64::from(cycle.months());
        let mut warnings = Vec::new();

        let usage = match self.minimum_usage(inputs) {
            Some(minimum) => Cow::Owned(raise_to_minimum(usage, minimum, cycle, &mut warnings)?),
            None => Cow::Borrowed(usage),
        };

        let (peaks, staged_peaks) = match &inputs.demand {
            Some(demand) if !demand.is_empty() => {
                let scale = demand_scale(demand, inputs.demand_adjustment_factor, &mut warnings);
                let peaks: BTreeMap<_, _> =
                    peak_demand(demand, cycle).into_iter().map(|(start, peak)| (start, peak * scale)).collect();
                let staged_peaks = match inputs.over_contract_mode {
                    OverContractMode::Regular => BTreeMap::new(),
                    OverContractMode::Staged => self.category_peaks(demand, cycle, scale, calendar)?,
                };
                (peaks, staged_peaks)
            }
            _ => (BTreeMap::new(), BTreeMap::new()),
        };

        let mut periods = BTreeMap::new();
        for (start, energy) in self.energy(&usage, cycle, calendar)? {
            let season = self.profile.season(start);
            let basic_fee = self.basic_fee(inputs, season)? * months;
            let peak_demand = peaks.get(&start).copied();
            let over = match (inputs.over_contract, inputs.over_contract_mode) {
                (Some(over), _) => Some(over),
                (None, OverContractMode::Regular) => {
                    peak_demand.map(|peak| peak - inputs.capacity(BasicFeeSchedule::REGULAR))
                }
                (None, OverContractMode::Staged) => staged_peaks
                    .get(&start)
                    .map(|peaks| staged_over_contract(self.billing.basic_fee.formula, peaks, inputs)),
            };
            let penalty = self.penalty(inputs, season, over);
            let surcharge = self.billing.surcharge.map_or(Cost::ZERO, |surcharge| {
                (energy.usage - surcharge.threshold * months).positive_part() * surcharge.rate
            });
            let pf_adjustment = match (self.billing.power_factor, inputs.power_factor) {
                (Some(rule), Some(power_factor)) if !inputs.contract_capacities.is_empty() => {
                    let base = match rule.applies_to {
                        AdjustmentBase::Basic => basic_fee,
                        AdjustmentBase::Energy => energy.cost,
                        AdjustmentBase::Total => basic_fee + energy.cost + surcharge,
                    };
                    power_factor_adjustment(&rule, power_factor, base)
                }
                _ => Cost::ZERO,
            };

            let mut total = energy.cost + basic_fee + penalty + pf_adjustment + surcharge;
            if let Some(minimum) = self.billing.minimum_monthly_fee.map(|fee| fee * months)
                && total < minimum
            {
                warn!(%start, %total, %minimum, "raising to the minimum charge");
                warnings.push(BillWarning::MinimumCharge { start, minimum });
                total = minimum;
            }
            debug!(%start, %season, energy = %energy.cost, %basic_fee, %penalty, %pf_adjustment, %surcharge, %total);

            periods.insert(
                start,
                MonthlyBillBreakdown {
                    start,
                    end: energy.end,
                    season,
                    usage: energy.usage,
                    peak_demand,
                    energy_cost: energy.cost,
                    basic_fee,
                    penalty,
                    pf_adjustment,
                    surcharge,
                    total,
                    line_items: energy.line_items,
                },
            );
        }

        info!(n_periods = periods.len(), n_warnings = warnings.len(), "calculated the bill");
        Ok(Bill { plan_id: self.id().to_owned(), cycle, periods, warnings })
    }

    /// Monthly basic fee: per-household fee plus the capacity charge.
    pub fn basic_fee(&self, inputs: &BillingInputs, season: SeasonType) -> Result<Cost> {
        let schedule = &self.billing.basic_fee;
        let household = schedule.per_household.map_or(Cost::ZERO, |fee| fee * f64::from(inputs.households));
        if inputs.contract_capacities.is_empty() {
            return Ok(household);
        }

        let charge = |class: &str, kw: Kilowatts| -> Result<Cost> {
            if kw == Kilowatts::ZERO {
                return Ok(Cost::ZERO);
            }
            let price = schedule.price(class, season).ok_or_else(|| {
                TariffError::configuration(format!("`{}` has no `{class}` capacity price", self.id()))
            })?;
            Ok(kw * price)
        };
        let weekend = |first: Kilowatts, second: Kilowatts| {
            let weekend = inputs.capacity(BasicFeeSchedule::SATURDAY_SEMI_PEAK)
                + inputs.capacity(BasicFeeSchedule::OFF_PEAK);
            (weekend - (first + second) * schedule.weekend_allowance).positive_part()
        };

        let capacity = match schedule.formula {
            CapacityFormula::Additive => inputs
                .contract_capacities
                .iter()
                .map(|(class, kw)| charge(class, *kw))
                .sum::<Result<Cost>>()?,

            CapacityFormula::TwoStage => {
                let regular = inputs.capacity(BasicFeeSchedule::REGULAR);
                let non_summer = inputs.capacity(BasicFeeSchedule::NON_SUMMER);
                let second_stage = match season {
                    SeasonType::Summer => Cost::ZERO,
                    SeasonType::NonSummer => charge(BasicFeeSchedule::NON_SUMMER, non_summer)?,
                };
                charge(BasicFeeSchedule::REGULAR, regular)?
                    + second_stage
                    + charge(BasicFeeSchedule::SATURDAY_SEMI_PEAK, weekend(regular, non_summer))?
            }

            CapacityFormula::ThreeStage => {
                let regular = inputs.capacity(BasicFeeSchedule::REGULAR);
                let semi_peak = inputs.capacity(BasicFeeSchedule::SEMI_PEAK);
                charge(BasicFeeSchedule::REGULAR, regular)?
                    + charge(BasicFeeSchedule::SEMI_PEAK, semi_peak)?
                    + charge(BasicFeeSchedule::SATURDAY_SEMI_PEAK, weekend(regular, semi_peak))?
            }
        };
        Ok(household + capacity)
    }

    fn penalty(&self, inputs: &BillingInputs, season: SeasonType, over: Option<Kilowatts>) -> Cost {
        let (Some(rule), Some(over)) = (&self.billing.penalty, over) else {
            return Cost::ZERO;
        };
        let contract = inputs.capacity(BasicFeeSchedule::REGULAR);
        if contract <= Kilowatts::ZERO {
            return Cost::ZERO;
        }
        let Some(price) = self.billing.basic_fee.price(BasicFeeSchedule::REGULAR, season) else {
            return Cost::ZERO;
        };
        demand_penalty(rule, over, contract, price)
    }

    /// Monthly minimum usage for the customer's meter, if the plan bills one.
    fn minimum_usage(&self, inputs: &BillingInputs) -> Option<KilowattHours> {
        let meter = inputs.meter?;
        self.billing
            .minimum_usage
            .iter()
            .find(|rule| rule.applies_to(meter.phase, meter.voltage))
            .map(|rule| rule.monthly_minimum(meter.ampere))
            .filter(|minimum| *minimum > KilowattHours::ZERO)
    }

    /// Highest window-averaged demand per billing period and demand category.
    fn category_peaks(
        &self,
        demand: &DemandSeries,
        cycle: BillingCycle,
        scale: f64,
        calendar: &dyn HolidayCalendar,
    ) -> Result<BTreeMap<NaiveDate, BTreeMap<DemandCategory, Kilowatts>>> {
        let windows = window_averages(demand);
        let starts = windows.keys().copied().collect_vec();
        let classification = self.profile.evaluate(&starts, calendar)?;
        let mut peaks = BTreeMap::<NaiveDate, BTreeMap<DemandCategory, Kilowatts>>::new();
        for ((start, average), (_, day_type, period)) in windows.into_iter().zip(classification.iter()) {
            let Some(category) = DemandCategory::of(day_type, period) else {
                continue;
            };
            let average = average * scale;
            peaks
                .entry(cycle.period_start(start.date()))
                .or_default()
                .entry(category)
                .and_modify(|peak| *peak = (*peak).max(average))
                .or_insert(average);
        }
        Ok(peaks)
    }
}

/// Over-contract demand of staged capacities.
///
/// Every category may draw on the capacities of the categories before it. Demand already charged
/// in an earlier category is not charged again.
#[must_use]
pub fn staged_over_contract(
    formula: CapacityFormula,
    peaks: &BTreeMap<DemandCategory, Kilowatts>,
    inputs: &BillingInputs,
) -> Kilowatts {
    let peak = |category: DemandCategory| peaks.get(&category).copied().unwrap_or_default();
    let regular = inputs.capacity(BasicFeeSchedule::REGULAR);
    let saturday = inputs.capacity(BasicFeeSchedule::SATURDAY_SEMI_PEAK);
    let off_peak = inputs.capacity(BasicFeeSchedule::OFF_PEAK);

    if formula == CapacityFormula::ThreeStage {
        let semi_peak = inputs.capacity(BasicFeeSchedule::SEMI_PEAK);
        let peak_over = (peak(DemandCategory::Peak) - regular).positive_part();
        let semi_over = (peak(DemandCategory::SemiPeak) - (regular + semi_peak)).positive_part();
        let saturday_over =
            (peak(DemandCategory::SaturdaySemiPeak) - (regular + semi_peak + saturday)).positive_part();
        let off_over =
            (peak(DemandCategory::OffPeak) - (regular + semi_peak + saturday + off_peak)).positive_part();

        let semi_over = (semi_over - peak_over).positive_part();
        let saturday_over = (saturday_over - peak_over.max(semi_over)).positive_part();
        let off_over = (off_over - peak_over.max(semi_over).max(saturday_over)).positive_part();
        return peak_over.max(semi_over).max(saturday_over).max(off_over);
    }

    let non_summer = inputs.capacity(BasicFeeSchedule::NON_SUMMER);
    let peak_over = (peak(DemandCategory::Peak) - (regular + non_summer)).positive_part();
    let saturday_over =
        (peak(DemandCategory::SaturdaySemiPeak) - (regular + non_summer + saturday)).positive_part();
    let off_over =
        (peak(DemandCategory::OffPeak) - (regular + non_summer + saturday + off_peak)).positive_part();

    let saturday_over = (saturday_over - peak_over).positive_part();
    let off_over = (off_over - peak_over.max(saturday_over)).positive_part();
    peak_over.max(saturday_over).max(off_over)
}

/// Bill at least `minimum × cycle months` per billing period.
///
/// Short periods are scaled up proportionally. A period without consumption gets the whole
/// minimum on its first record.
fn raise_to_minimum(
    usage: &UsageSeries,
    minimum: KilowattHours,
    cycle: BillingCycle,
    warnings: &mut Vec<BillWarning>,
) -> Result<UsageSeries> {
    let required = minimum * f64::from(cycle.months());
    let mut records: Vec<UsageRecord> = usage.records().to_vec();
    let same_period = |lhs: &UsageRecord, rhs: &UsageRecord| {
        cycle.period_start(lhs.timestamp.date()) == cycle.period_start(rhs.timestamp.date())
    };
    for group in records.chunk_by_mut(same_period) {
        let billed: KilowattHours = group.iter().map(|record| record.kwh).sum();
        if billed >= required {
            continue;
        }
        let Some(first) = group.first_mut() else {
            continue;
        };
        let start = cycle.period_start(first.timestamp.date());
        if billed > KilowattHours::ZERO {
            let factor = required.get() / billed.get();
            for record in group.iter_mut() {
                record.kwh = record.kwh * factor;
            }
        } else {
            first.kwh = required;
        }
        debug!(%start, %billed, %required, "raised to the minimum usage");
        warnings.push(BillWarning::MinimumUsage { start, usage: billed, minimum: required });
    }
    UsageSeries::new(records)
}

/// Two-tier over-contract penalty.
///
/// Demand up to `threshold_ratio` of the contract above it is charged at the low multiplier, the
/// rest at the high one.
#[must_use]
pub fn demand_penalty(rule: &PenaltyRule, over: Kilowatts, contract: Kilowatts, price: KilowattRate) -> Cost {
    let over = over.positive_part();
    let threshold = contract * rule.threshold_ratio;
    let low = over.min(threshold);
    let high = (over - threshold).positive_part();
    low * price * rule.low_multiplier + high * price * rule.high_multiplier
}

/// Linear adjustment: positive below the baseline, a discount above it up to the ceiling.
#[must_use]
pub fn power_factor_adjustment(rule: &PowerFactorRule, power_factor: f64, base: Cost) -> Cost {
    let effective = power_factor.min(rule.ceiling_percent);
    base * ((rule.baseline_percent - effective) * rule.step_percent / 100.0)
}

/// Average demand of every clock-aligned window holding at least one record.
fn window_averages(demand: &DemandSeries) -> BTreeMap<NaiveDateTime, Kilowatts> {
    let mut windows = BTreeMap::<NaiveDateTime, (Kilowatts, u32)>::new();
    for record in demand.records() {
        let (sum, count) = windows.entry(window_start(record.timestamp)).or_default();
        *sum += record.kw;
        *count += 1;
    }
    windows.into_iter().map(|(start, (sum, count))| (start, sum / f64::from(count))).collect()
}

/// Highest window-averaged demand per billing period.
#[must_use]
pub fn peak_demand(demand: &DemandSeries, cycle: BillingCycle) -> BTreeMap<NaiveDate, Kilowatts> {
    let mut peaks = BTreeMap::<NaiveDate, Kilowatts>::new();
    for (start, average) in window_averages(demand) {
        peaks
            .entry(cycle.period_start(start.date()))
            .and_modify(|peak| *peak = (*peak).max(average))
            .or_insert(average);
    }
    peaks
}

/// The adjustment factor for series sampled coarser than the demand window, otherwise 1.
fn demand_scale(demand: &DemandSeries, factor: f64, warnings: &mut Vec<BillWarning>) -> f64 {
    match demand.median_interval() {
        Some(median) if median > TimeDelta::minutes(i64::from(DEMAND_WINDOW_MINUTES)) => {
            let warning = BillWarning::CoarseDemand { median_minutes: median.num_minutes(), factor };
            warn!("{warning}");
            warnings.push(warning);
            factor
        }
        _ => 1.0,
    }
}

fn window_start(timestamp: NaiveDateTime) -> NaiveDateTime {
    let minute_of_day = timestamp.hour() * 60 + timestamp.minute();
    let window = minute_of_day / DEMAND_WINDOW_MINUTES * DEMAND_WINDOW_MINUTES;
    timestamp.date().and_time(NaiveTime::MIN) + TimeDelta::minutes(i64::from(window))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{
        calendar::CustomCalendar,
        plan::MinimumUsageRule,
        registry::PlanRegistry,
        usage::{DemandRecord, UsageRecord},
    };

    fn at(month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, month, day).unwrap().and_hms_opt(hour, minute, 0).unwrap()
    }

    fn july_usage() -> UsageSeries {
        UsageSeries::new([UsageRecord::new(at(7, 15, 14, 0), 1000.0)]).unwrap()
    }

    #[test]
    fn test_penalty_scenario() {
        let penalty = demand_penalty(
            &PenaltyRule::default(),
            Kilowatts::new(30.0),
            Kilowatts::new(200.0),
            KilowattRate::new(236.20),
        );
        assert_abs_diff_eq!(penalty.get(), 16534.0, epsilon = 1e-6);
    }

    #[test]
    fn test_penalty_boundaries() {
        let rule = PenaltyRule::default();
        let contract = Kilowatts::new(200.0);
        let price = KilowattRate::new(100.0);
        assert_eq!(demand_penalty(&rule, Kilowatts::ZERO, contract, price), Cost::ZERO);
        assert_eq!(demand_penalty(&rule, Kilowatts::new(-5.0), contract, price), Cost::ZERO);
        // Exactly at the threshold everything is charged at the low multiplier.
        assert_abs_diff_eq!(demand_penalty(&rule, Kilowatts::new(20.0), contract, price).get(), 4000.0);
        assert_abs_diff_eq!(demand_penalty(&rule, Kilowatts::new(21.0), contract, price).get(), 4300.0);
    }

    #[test]
    fn test_power_factor_sign_and_ceiling() {
        let rule = PowerFactorRule::default();
        let base = Cost::new(10_000.0);
        assert_abs_diff_eq!(power_factor_adjustment(&rule, 80.0, base).get(), 0.0);
        assert_abs_diff_eq!(power_factor_adjustment(&rule, 70.0, base).get(), 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(power_factor_adjustment(&rule, 90.0, base).get(), -100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(
            power_factor_adjustment(&rule, 99.0, base).get(),
            power_factor_adjustment(&rule, 95.0, base).get(),
        );
    }

    #[test]
    fn test_peak_demand_averages_clock_windows() -> Result {
        let demand = DemandSeries::new([
            DemandRecord::new(at(7, 1, 10, 0), 100.0),
            DemandRecord::new(at(7, 1, 10, 5), 300.0),
            DemandRecord::new(at(7, 1, 10, 14), 200.0),
            DemandRecord::new(at(7, 1, 10, 15), 250.0),
            DemandRecord::new(at(8, 1, 0, 0), 50.0),
        ])?;
        let peaks = peak_demand(&demand, BillingCycle::Monthly);
        assert_eq!(peaks[&NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()], Kilowatts::new(250.0));
        assert_eq!(peaks[&NaiveDate::from_ymd_opt(2025, 8, 1).unwrap()], Kilowatts::new(50.0));
        Ok(())
    }

    #[test]
    fn test_residential_has_household_fee_only() -> Result {
        let registry = PlanRegistry::builtin()?;
        let plan = registry.get("residential_simple_2_tier")?;
        let usage = UsageSeries::new([UsageRecord::new(at(7, 15, 14, 0), 1.5)])?;
        let bill = plan.calculate_bill(&usage, &BillingInputs::default(), &CustomCalendar::default())?;
        let july = &bill.periods[&NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()];
        assert_abs_diff_eq!(july.energy_cost.get(), 7.74, epsilon = 1e-9);
        assert_abs_diff_eq!(july.basic_fee.get(), 75.0);
        assert_eq!(july.penalty, Cost::ZERO);
        assert_eq!(july.pf_adjustment, Cost::ZERO);
        assert_abs_diff_eq!(july.total.get(), 82.74, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_surcharge_above_threshold() -> Result {
        let registry = PlanRegistry::builtin()?;
        let plan = registry.get("residential_simple_2_tier")?;
        let usage = UsageSeries::new([UsageRecord::new(at(7, 15, 14, 0), 2100.0)])?;
        let bill = plan.calculate_bill(&usage, &BillingInputs::default(), &CustomCalendar::default())?;
        let july = &bill.periods[&NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()];
        assert_abs_diff_eq!(july.surcharge.get(), 104.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_no_capacity_leaves_energy_only() -> Result {
        let registry = PlanRegistry::builtin()?;
        let plan = registry.get("high_voltage_2_tier")?;
        let inputs = BillingInputs::builder().power_factor(90.0).build();
        let bill = plan.calculate_bill(&july_usage(), &inputs, &CustomCalendar::default())?;
        let july = &bill.periods[&NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()];
        assert_eq!(july.basic_fee, Cost::ZERO);
        assert_eq!(july.penalty, Cost::ZERO);
        assert_eq!(july.pf_adjustment, Cost::ZERO);
        assert_eq!(july.total, july.energy_cost);
        Ok(())
    }

    #[test]
    fn test_high_voltage_bill() -> Result {
        let registry = PlanRegistry::builtin()?;
        let plan = registry.get("high_voltage_2_tier")?;
        let demand = DemandSeries::new(
            (0..4).map(|quarter| DemandRecord::new(at(7, 15, 14, quarter * 15), if quarter == 2 { 230.0 } else { 150.0 })),
        )?;
        let inputs = BillingInputs::builder()
            .demand(demand)
            .power_factor(90.0)
            .build()
            .with_capacity(BasicFeeSchedule::REGULAR, 200.0);
        let bill = plan.calculate_bill(&july_usage(), &inputs, &CustomCalendar::default())?;
        let july = &bill.periods[&NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()];
        assert_eq!(july.season, SeasonType::Summer);
        assert_eq!(july.peak_demand, Some(Kilowatts::new(230.0)));
        assert_abs_diff_eq!(july.basic_fee.get(), 200.0 * 236.20, epsilon = 1e-6);
        assert_abs_diff_eq!(july.penalty.get(), 16534.0, epsilon = 1e-6);
        assert_abs_diff_eq!(july.pf_adjustment.get(), -0.01 * 200.0 * 236.20, epsilon = 1e-6);
        assert!(bill.warnings.is_empty());
        Ok(())
    }

    #[test]
    fn test_two_stage_weekend_allowance() -> Result {
        let registry = PlanRegistry::builtin()?;
        let plan = registry.get("high_voltage_2_tier")?;
        let inputs = BillingInputs::default()
            .with_capacity(BasicFeeSchedule::REGULAR, 200.0)
            .with_capacity(BasicFeeSchedule::OFF_PEAK, 150.0);
        // Half of the regular capacity covers 100 of the 150 off-peak kW.
        let fee = plan.basic_fee(&inputs, SeasonType::Summer)?;
        assert_abs_diff_eq!(fee.get(), 200.0 * 236.20 + 50.0 * 47.20, epsilon = 1e-6);
        let fee = plan.basic_fee(&inputs, SeasonType::NonSummer)?;
        assert_abs_diff_eq!(fee.get(), 200.0 * 173.20 + 50.0 * 47.20, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_manual_over_contract() -> Result {
        let registry = PlanRegistry::builtin()?;
        let plan = registry.get("high_voltage_2_tier")?;
        let inputs = BillingInputs::builder()
            .over_contract(Kilowatts::new(30.0))
            .build()
            .with_capacity(BasicFeeSchedule::REGULAR, 200.0);
        let bill = plan.calculate_bill(&july_usage(), &inputs, &CustomCalendar::default())?;
        assert_abs_diff_eq!(bill.periods.values().next().unwrap().penalty.get(), 16534.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_coarse_demand_is_scaled_with_warning() -> Result {
        let registry = PlanRegistry::builtin()?;
        let plan = registry.get("high_voltage_2_tier")?;
        let demand = DemandSeries::new((0..4).map(|hour| DemandRecord::new(at(7, 15, 10 + hour, 0), 200.0)))?;
        let inputs = BillingInputs::builder()
            .demand(demand)
            .demand_adjustment_factor(1.1)
            .build()
            .with_capacity(BasicFeeSchedule::REGULAR, 200.0);
        let bill = plan.calculate_bill(&july_usage(), &inputs, &CustomCalendar::default())?;
        let july = bill.periods.values().next().unwrap();
        assert_abs_diff_eq!(july.peak_demand.unwrap().get(), 220.0, epsilon = 1e-9);
        assert_abs_diff_eq!(july.penalty.get(), 20.0 * 236.20 * 2.0, epsilon = 1e-6);
        assert!(matches!(bill.warnings[..], [BillWarning::CoarseDemand { median_minutes: 60, .. }]));
        Ok(())
    }

    #[test]
    fn test_bimonthly_basic_fee_is_doubled() -> Result {
        let registry = PlanRegistry::builtin()?;
        let plan = registry.get("residential_simple_2_tier")?;
        let inputs = BillingInputs::builder().cycle(BillingCycle::OddMonth).households(2).build();
        let bill = plan.calculate_bill(&july_usage(), &inputs, &CustomCalendar::default())?;
        let period = &bill.periods[&NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()];
        assert_abs_diff_eq!(period.basic_fee.get(), 75.0 * 2.0 * 2.0);
        Ok(())
    }

    #[test]
    fn test_minimum_charge() -> Result {
        let registry = PlanRegistry::builtin()?;
        let mut plan = registry.get("residential_non_tou")?.clone();
        plan.billing.minimum_monthly_fee = Some(Cost::new(100.0));
        let usage = UsageSeries::new([UsageRecord::new(at(7, 15, 14, 0), 1.0)])?;
        let bill = plan.calculate_bill(&usage, &BillingInputs::default(), &CustomCalendar::default())?;
        assert_abs_diff_eq!(bill.total().get(), 100.0);
        assert!(matches!(bill.warnings[..], [BillWarning::MinimumCharge { .. }]));
        Ok(())
    }

    #[test]
    fn test_invalid_inputs() -> Result {
        let registry = PlanRegistry::builtin()?;
        let plan = registry.get("high_voltage_2_tier")?;
        let calendar = CustomCalendar::default();

        let inputs = BillingInputs::builder().power_factor(120.0).build();
        let error = plan.calculate_bill(&july_usage(), &inputs, &calendar).unwrap_err();
        assert!(matches!(error, TariffError::InvalidUsageInput { ref field, .. } if field == "power_factor"));

        let inputs = BillingInputs::default().with_capacity("bogus", 10.0);
        assert!(plan.calculate_bill(&july_usage(), &inputs, &calendar).is_err());
        Ok(())
    }

    #[test]
    fn test_total_is_rounded_to_cents() -> Result {
        let registry = PlanRegistry::builtin()?;
        let plan = registry.get("residential_non_tou")?;
        let usage = UsageSeries::new([UsageRecord::new(at(7, 15, 14, 0), 0.333)])?;
        let bill = plan.calculate_bill(&usage, &BillingInputs::default(), &CustomCalendar::default())?;
        assert_abs_diff_eq!(bill.periods.values().next().unwrap().total.get(), 0.333 * 1.78, epsilon = 1e-9);
        assert_eq!(bill.total(), Cost::new(0.59));
        Ok(())
    }

    fn metered_plan() -> Result<TariffPlan> {
        let registry = PlanRegistry::builtin()?;
        let mut plan = registry.get("residential_non_tou")?.clone();
        plan.billing.minimum_usage = vec![MinimumUsageRule {
            phase: MeterPhase::Single,
            voltage: 110,
            kwh_per_ampere: 1.0,
            over: None,
        }];
        Ok(plan)
    }

    #[test]
    fn test_minimum_usage_scales_short_period() -> Result {
        let plan = metered_plan()?;
        let usage = UsageSeries::new([
            UsageRecord::new(at(7, 15, 14, 0), 2.0),
            UsageRecord::new(at(7, 16, 14, 0), 3.0),
            UsageRecord::new(at(8, 1, 0, 0), 0.0),
            UsageRecord::new(at(9, 1, 0, 0), 50.0),
        ])?;
        let meter = MeterSpec { phase: MeterPhase::Single, voltage: 110, ampere: 10.0 };
        let inputs = BillingInputs::builder().meter(meter).build();
        let bill = plan.calculate_bill(&usage, &inputs, &CustomCalendar::default())?;

        let july = &bill.periods[&NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()];
        assert_abs_diff_eq!(july.usage.get(), 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(july.energy_cost.get(), 10.0 * 1.78, epsilon = 1e-9);
        let august = &bill.periods[&NaiveDate::from_ymd_opt(2025, 8, 1).unwrap()];
        assert_abs_diff_eq!(august.usage.get(), 10.0, epsilon = 1e-9);
        let september = &bill.periods[&NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()];
        assert_abs_diff_eq!(september.usage.get(), 50.0, epsilon = 1e-9);

        assert_eq!(bill.warnings.len(), 2);
        assert!(matches!(
            bill.warnings[0],
            BillWarning::MinimumUsage { usage, minimum, .. } if usage == KilowattHours::new(5.0) && minimum == KilowattHours::new(10.0)
        ));
        Ok(())
    }

    #[test]
    fn test_minimum_usage_needs_a_matching_meter() -> Result {
        let plan = metered_plan()?;
        let usage = UsageSeries::new([UsageRecord::new(at(7, 15, 14, 0), 2.0)])?;
        let calendar = CustomCalendar::default();

        let bill = plan.calculate_bill(&usage, &BillingInputs::default(), &calendar)?;
        assert_abs_diff_eq!(bill.periods.values().next().unwrap().usage.get(), 2.0);

        let meter = MeterSpec { phase: MeterPhase::Three, voltage: 380, ampere: 10.0 };
        let bill = plan.calculate_bill(&usage, &BillingInputs::builder().meter(meter).build(), &calendar)?;
        assert_abs_diff_eq!(bill.periods.values().next().unwrap().usage.get(), 2.0);
        assert!(bill.warnings.is_empty());

        let meter = MeterSpec { phase: MeterPhase::Single, voltage: 110, ampere: 0.0 };
        assert!(plan.calculate_bill(&usage, &BillingInputs::builder().meter(meter).build(), &calendar).is_err());
        Ok(())
    }

    #[test]
    fn test_staged_over_contract_two_stage() {
        let inputs = BillingInputs::default()
            .with_capacity(BasicFeeSchedule::REGULAR, 200.0)
            .with_capacity(BasicFeeSchedule::SATURDAY_SEMI_PEAK, 50.0)
            .with_capacity(BasicFeeSchedule::OFF_PEAK, 100.0);
        let peaks = BTreeMap::from([
            (DemandCategory::Peak, Kilowatts::new(210.0)),
            (DemandCategory::SaturdaySemiPeak, Kilowatts::new(270.0)),
            (DemandCategory::OffPeak, Kilowatts::new(400.0)),
        ]);
        // 10 kW over at peak, 20 − 10 on Saturday, 50 − 10 off-peak.
        assert_eq!(staged_over_contract(CapacityFormula::TwoStage, &peaks, &inputs), Kilowatts::new(40.0));

        let within = BTreeMap::from([(DemandCategory::OffPeak, Kilowatts::new(350.0))]);
        assert_eq!(staged_over_contract(CapacityFormula::TwoStage, &within, &inputs), Kilowatts::ZERO);
    }

    #[test]
    fn test_staged_over_contract_three_stage() {
        let inputs = BillingInputs::default()
            .with_capacity(BasicFeeSchedule::REGULAR, 200.0)
            .with_capacity(BasicFeeSchedule::SEMI_PEAK, 50.0);
        let peaks = BTreeMap::from([
            (DemandCategory::Peak, Kilowatts::new(190.0)),
            (DemandCategory::SemiPeak, Kilowatts::new(280.0)),
            (DemandCategory::SaturdaySemiPeak, Kilowatts::new(260.0)),
            (DemandCategory::OffPeak, Kilowatts::new(300.0)),
        ]);
        assert_eq!(staged_over_contract(CapacityFormula::ThreeStage, &peaks, &inputs), Kilowatts::new(30.0));
    }

    #[test]
    fn test_staged_penalty_uses_category_peaks() -> Result {
        let registry = PlanRegistry::builtin()?;
        let plan = registry.get("high_voltage_2_tier")?;
        let demand = DemandSeries::new([
            DemandRecord::new(at(7, 15, 3, 0), 400.0),
            DemandRecord::new(at(7, 15, 14, 0), 210.0),
            DemandRecord::new(at(7, 19, 10, 0), 270.0),
        ])?;
        let inputs = |mode| {
            BillingInputs::builder()
                .demand(demand.clone())
                .over_contract_mode(mode)
                .build()
                .with_capacity(BasicFeeSchedule::REGULAR, 200.0)
                .with_capacity(BasicFeeSchedule::SATURDAY_SEMI_PEAK, 50.0)
                .with_capacity(BasicFeeSchedule::OFF_PEAK, 100.0)
        };
        let calendar = CustomCalendar::default();

        let bill = plan.calculate_bill(&july_usage(), &inputs(OverContractMode::Staged), &calendar)?;
        let july = bill.periods.values().next().unwrap();
        assert_eq!(july.peak_demand, Some(Kilowatts::new(400.0)));
        assert_abs_diff_eq!(july.penalty.get(), 20.0 * 236.20 * 2.0 + 20.0 * 236.20 * 3.0, epsilon = 1e-6);

        let bill = plan.calculate_bill(&july_usage(), &inputs(OverContractMode::Regular), &calendar)?;
        let july = bill.periods.values().next().unwrap();
        assert_abs_diff_eq!(july.penalty.get(), 20.0 * 236.20 * 2.0 + 180.0 * 236.20 * 3.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_staged_mode_needs_staged_formula() -> Result {
        let registry = PlanRegistry::builtin()?;
        let plan = registry.get("residential_simple_2_tier")?;
        let inputs = BillingInputs::builder().over_contract_mode(OverContractMode::Staged).build();
        let error = plan.calculate_bill(&july_usage(), &inputs, &CustomCalendar::default()).unwrap_err();
        assert!(matches!(error, TariffError::InvalidUsageInput { ref field, .. } if field == "over_contract_mode"));
        Ok(())
    }

    #[test]
    fn test_demand_categories() {
        assert_eq!(DemandCategory::of(DayType::Saturday, &Period::SEMI_PEAK), Some(DemandCategory::SaturdaySemiPeak));
        assert_eq!(DemandCategory::of(DayType::Weekday, &Period::SEMI_PEAK), Some(DemandCategory::SemiPeak));
        assert_eq!(DemandCategory::of(DayType::Saturday, &Period::OFF_PEAK), Some(DemandCategory::OffPeak));
        assert_eq!(DemandCategory::of(DayType::Weekday, &Period::FLAT), None);
    }
}
