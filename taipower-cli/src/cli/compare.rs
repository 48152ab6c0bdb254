use clap::Parser;
use taipower_tariff::{
    BillingInputs,
    HolidayCalendar,
    PlanRegistry,
    TaiwanCalendar,
    TariffPlan,
    UsageSeries,
    quantities::{cost::Cost, energy::KilowattHours},
};

use crate::{cli::plan::UsageArgs, prelude::*, tables::build_comparison_table};

#[derive(Parser)]
pub struct CompareArgs {
    #[clap(flatten)]
    usage: UsageArgs,

    /// Plans to compare, all built-in plans by default. Repeat for more plans.
    #[clap(long = "plan", short = 'p')]
    plans: Vec<String>,
}

impl CompareArgs {
    pub fn run(&self, registry: &PlanRegistry, calendar: &TaiwanCalendar) -> Result {
        let plans: Vec<&TariffPlan> = if self.plans.is_empty() {
            registry.plans().iter().collect()
        } else {
            self.plans.iter().map(|name| registry.get(name)).collect::<Result<_, _>>()?
        };
        let usage = self.usage.read()?;
        let comparisons = compare(&plans, &usage, &self.usage, calendar)?;
        if let Some(cheapest) = comparisons.first() {
            info!(id = %cheapest.id, total = %cheapest.total, "cheapest plan");
        }
        println!("{}", build_comparison_table(&comparisons));
        Ok(())
    }
}

/// Bill of one plan for the compared usage, with no contract capacities.
#[derive(Clone, Debug)]
pub struct Comparison {
    pub id: String,
    pub name: String,
    pub usage: KilowattHours,
    pub energy_cost: Cost,
    pub total: Cost,
}

impl Comparison {
    /// Total per kWh.
    #[must_use]
    pub fn average_rate(&self) -> Option<f64> {
        (self.usage > KilowattHours::ZERO).then(|| self.total.get() / self.usage.get())
    }
}

/// Bill the usage on every plan, cheapest first.
fn compare(
    plans: &[&TariffPlan],
    usage: &UsageSeries,
    usage_args: &UsageArgs,
    calendar: &dyn HolidayCalendar,
) -> Result<Vec<Comparison>> {
    let mut comparisons = plans
        .iter()
        .map(|plan| -> Result<_> {
            let inputs = BillingInputs::builder().cycle(usage_args.cycle(plan)).build();
            let bill = plan.calculate_bill(usage, &inputs, calendar)?;
            Ok(Comparison {
                id: plan.id().to_owned(),
                name: plan.metadata.name_zh.clone(),
                usage: bill.periods.values().map(|period| period.usage).sum(),
                energy_cost: bill.periods.values().map(|period| period.energy_cost).sum(),
                total: bill.total(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    comparisons.sort_by_key(|comparison| comparison.total);
    Ok(comparisons)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use approx::assert_abs_diff_eq;
    use chrono::{NaiveDate, TimeDelta};
    use itertools::Itertools;
    use taipower_tariff::{CustomCalendar, UsageRecord};

    use super::*;

    #[test]
    fn test_compare_builtin_plans() -> Result {
        let registry = PlanRegistry::builtin()?;
        let plans: Vec<_> = registry.plans().iter().collect();
        let start = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let usage = UsageSeries::new((0..24 * 31).map(|hour| UsageRecord::new(start + TimeDelta::hours(hour), 0.5)))?;
        let usage_args = UsageArgs { path: PathBuf::new(), cycle: None };

        let comparisons = compare(&plans, &usage, &usage_args, &CustomCalendar::default())?;
        assert_eq!(comparisons.len(), plans.len());
        assert!(comparisons.iter().tuple_windows().all(|(previous, next)| previous.total <= next.total));
        for comparison in &comparisons {
            assert_abs_diff_eq!(comparison.usage.get(), 372.0, epsilon = 1e-9);
            assert!(comparison.total >= comparison.energy_cost, "{}", comparison.id);
        }
        Ok(())
    }
}
