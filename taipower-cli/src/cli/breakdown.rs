use clap::Parser;
use taipower_tariff::{PlanRegistry, TaiwanCalendar};

use crate::{
    cli::plan::{PlanArgs, UsageArgs},
    prelude::*,
    tables::build_breakdown_table,
};

#[derive(Parser)]
pub struct BreakdownArgs {
    #[clap(flatten)]
    plan: PlanArgs,

    #[clap(flatten)]
    usage: UsageArgs,

    /// Add each row's share of the monthly usage and cost.
    #[clap(long)]
    shares: bool,

    /// Print JSON instead of a table.
    #[clap(long)]
    json: bool,
}

impl BreakdownArgs {
    pub fn run(&self, registry: &PlanRegistry, calendar: &TaiwanCalendar) -> Result {
        let plan = self.plan.resolve(registry)?;
        let usage = self.usage.read()?;
        let rows = plan.monthly_breakdown(&usage, self.usage.cycle(plan), calendar, self.shares)?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else {
            println!("{}", build_breakdown_table(&rows));
        }
        Ok(())
    }
}
