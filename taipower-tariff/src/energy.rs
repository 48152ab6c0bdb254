//! Energy charges: time-of-use rates per record, or progressive brackets per billing period.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use taipower_quantities::{cost::Cost, energy::KilowattHours};
use tracing::{debug, instrument};

use crate::{
    calendar::HolidayCalendar,
    cycle::BillingCycle,
    day_type::DayType,
    error::Result,
    period::Period,
    plan::TariffPlan,
    rates::{TariffRate, TieredRates, TouRates},
    season::SeasonType,
    usage::UsageSeries,
};

/// Period label reported for tiered plans.
pub const TIERED_LABEL: &str = "tiered";

/// Usage and cost of one `(season, day type, period)` within a billing period.
///
/// Tiered plans report one item per season with no day type.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LineItem {
    pub season: SeasonType,
    pub day_type: Option<DayType>,
    pub period: Period,
    pub usage: KilowattHours,
    pub cost: Cost,
}

/// Energy charge of one billing period.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PeriodEnergy {
    pub start: NaiveDate,

    /// Exclusive.
    pub end: NaiveDate,

    pub usage: KilowattHours,
    pub cost: Cost,
    pub line_items: Vec<LineItem>,
}

/// Row of [`TariffPlan::monthly_breakdown`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BreakdownRow {
    pub month: NaiveDate,
    pub season: SeasonType,
    pub period: Period,
    pub usage: KilowattHours,
    pub cost: Cost,

    /// Fraction of the month's usage, when shares are requested.
    pub usage_share: Option<f64>,

    /// Fraction of the month's cost, when shares are requested.
    pub cost_share: Option<f64>,
}

type LineKey = (SeasonType, Option<DayType>, Period);

#[derive(Default)]
struct Accumulator(BTreeMap<LineKey, (KilowattHours, Cost)>);

impl Accumulator {
    fn add(&mut self, key: LineKey, usage: KilowattHours, cost: Cost) {
        let (total_usage, total_cost) = self.0.entry(key).or_default();
        *total_usage += usage;
        *total_cost += cost;
    }

    fn finish(self, start: NaiveDate, end: NaiveDate) -> PeriodEnergy {
        let line_items: Vec<LineItem> = self
            .0
            .into_iter()
            .map(|((season, day_type, period), (usage, cost))| LineItem {
                season,
                day_type,
                period,
                usage,
                cost,
            })
            .collect();
        PeriodEnergy {
            start,
            end,
            usage: line_items.iter().map(|item| item.usage).sum(),
            cost: line_items.iter().map(|item| item.cost).sum(),
            line_items,
        }
    }
}

impl TariffPlan {
    /// Energy charge per billing period, keyed by the period's first day.
    #[instrument(skip_all, fields(plan = self.id(), n_records = usage.len(), %cycle))]
    pub fn energy(
        &self,
        usage: &UsageSeries,
        cycle: BillingCycle,
        calendar: &dyn HolidayCalendar,
    ) -> Result<BTreeMap<NaiveDate, PeriodEnergy>> {
        usage.require_non_empty()?;
        match &self.rates {
            TariffRate::TimeOfUse(rates) => self.time_of_use_energy(rates, usage, cycle, calendar),
            TariffRate::Tiered(rates) => self.tiered_energy(rates, usage, cycle),
        }
    }

    /// Total energy cost per billing period.
    pub fn calculate_costs(
        &self,
        usage: &UsageSeries,
        cycle: BillingCycle,
        calendar: &dyn HolidayCalendar,
    ) -> Result<BTreeMap<NaiveDate, Cost>> {
        Ok(self
            .energy(usage, cycle, calendar)?
            .into_iter()
            .map(|(start, energy)| (start, energy.cost))
            .collect())
    }

    /// Usage and cost per `(month, season, period)` for time-of-use plans, and per
    /// `(billing period, season)` labelled [`TIERED_LABEL`] for tiered plans.
    pub fn monthly_breakdown(
        &self,
        usage: &UsageSeries,
        cycle: BillingCycle,
        calendar: &dyn HolidayCalendar,
        include_shares: bool,
    ) -> Result<Vec<BreakdownRow>> {
        usage.require_non_empty()?;
        let periods = match &self.rates {
            TariffRate::TimeOfUse(rates) => {
                self.time_of_use_energy(rates, usage, BillingCycle::Monthly, calendar)?
            }
            TariffRate::Tiered(rates) => self.tiered_energy(rates, usage, cycle)?,
        };

        let mut rows = Vec::new();
        for (month, energy) in periods {
            let mut by_period = BTreeMap::<(SeasonType, Period), (KilowattHours, Cost)>::new();
            for item in energy.line_items {
                let (usage, cost) = by_period.entry((item.season, item.period)).or_default();
                *usage += item.usage;
                *cost += item.cost;
            }
            rows.extend(by_period.into_iter().map(|((season, period), (usage, cost))| {
                BreakdownRow {
                    month,
                    season,
                    period,
                    usage,
                    cost,
                    usage_share: include_shares.then(|| share(usage.get(), energy.usage.get())),
                    cost_share: include_shares.then(|| share(cost.get(), energy.cost.get())),
                }
            }));
        }
        Ok(rows)
    }

    fn time_of_use_energy(
        &self,
        rates: &TouRates,
        usage: &UsageSeries,
        cycle: BillingCycle,
        calendar: &dyn HolidayCalendar,
    ) -> Result<BTreeMap<NaiveDate, PeriodEnergy>> {
        let classification = self.profile.evaluate(&usage.timestamps(), calendar)?;
        let mut periods = BTreeMap::<NaiveDate, Accumulator>::new();
        for (record, (season, day_type, period)) in usage.records().iter().zip(classification.iter()) {
            let rate = rates.rate(season, day_type, period)?;
            periods.entry(cycle.period_start(record.timestamp.date())).or_default().add(
                (season, Some(day_type), period.clone()),
                record.kwh,
                record.kwh * rate,
            );
        }
        Ok(periods
            .into_iter()
            .map(|(start, accumulator)| (start, accumulator.finish(start, cycle.period_end(start))))
            .collect())
    }

    /// Progressive brackets over each billing period's total.
    ///
    /// Bracket bounds scale with the cycle length. When the season flips inside a period, usage
    /// and bounds are apportioned by whole days: a segment covering `d` of the period's `n` days
    /// gets exactly `d / n` of both, with no rounding, and the flip date counts towards the new
    /// season.
    fn tiered_energy(
        &self,
        rates: &TieredRates,
        usage: &UsageSeries,
        cycle: BillingCycle,
    ) -> Result<BTreeMap<NaiveDate, PeriodEnergy>> {
        let mut totals = BTreeMap::<NaiveDate, KilowattHours>::new();
        for record in usage.records() {
            *totals.entry(cycle.period_start(record.timestamp.date())).or_default() += record.kwh;
        }
        let months = f64::from(cycle.months());

        totals
            .into_iter()
            .map(|(start, total)| {
                let end = cycle.period_end(start);
                let segments = self.profile.seasons().segments(start, end);
                let n_days: u64 = segments.iter().map(|(_, days)| days).sum();
                if segments.len() > 1 {
                    debug!(%start, ?segments, "apportioning across the season change");
                }
                let mut accumulator = Accumulator::default();
                for (season, days) in segments {
                    #[expect(clippy::cast_precision_loss)]
                    let fraction = days as f64 / n_days as f64;
                    let usage = total * fraction;
                    let cost = rates.cost(season, usage, months * fraction)?;
                    accumulator.add((season, None, Period::Custom(TIERED_LABEL.to_owned())), usage, cost);
                }
                Ok((start, accumulator.finish(start, end)))
            })
            .collect()
    }
}

fn share(part: f64, total: f64) -> f64 {
    if total > 0.0 { part / total } else { 0.0 }
}
