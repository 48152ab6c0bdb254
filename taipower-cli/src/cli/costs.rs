use clap::Parser;
use taipower_tariff::{PlanRegistry, TaiwanCalendar};

use crate::{
    cli::plan::{PlanArgs, UsageArgs},
    prelude::*,
    tables::build_costs_table,
};

#[derive(Parser)]
pub struct CostsArgs {
    #[clap(flatten)]
    plan: PlanArgs,

    #[clap(flatten)]
    usage: UsageArgs,
}

impl CostsArgs {
    pub fn run(&self, registry: &PlanRegistry, calendar: &TaiwanCalendar) -> Result {
        let plan = self.plan.resolve(registry)?;
        let usage = self.usage.read()?;
        let energy = plan.energy(&usage, self.usage.cycle(plan), calendar)?;
        println!("{}", build_costs_table(&energy));
        Ok(())
    }
}
