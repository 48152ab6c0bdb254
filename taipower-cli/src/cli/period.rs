use chrono::NaiveDateTime;
use clap::Parser;
use taipower_tariff::{PlanRegistry, TaiwanCalendar};

use crate::{cli::plan::PlanArgs, input::parse_timestamp, prelude::*, tables::build_pricing_table};

#[derive(Parser)]
pub struct PeriodArgs {
    #[clap(flatten)]
    plan: PlanArgs,

    /// Local Taiwan time, for example `2025-07-15 14:00`.
    #[clap(required = true, value_parser = parse_timestamp)]
    timestamps: Vec<NaiveDateTime>,
}

impl PeriodArgs {
    pub fn run(&self, registry: &PlanRegistry, calendar: &TaiwanCalendar) -> Result {
        let plan = self.plan.resolve(registry)?;
        let pricings = self
            .timestamps
            .iter()
            .map(|timestamp| -> Result<_> { Ok((*timestamp, plan.pricing_context(*timestamp, calendar)?)) })
            .collect::<Result<Vec<_>>>()?;
        println!("{}", build_pricing_table(&pricings));
        Ok(())
    }
}
