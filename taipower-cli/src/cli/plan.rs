use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use taipower_tariff::{BillingCycle, PlanRegistry, TariffPlan, UsageSeries};

use crate::{input::read_usage, prelude::*};

/// Plan selection, by id, Chinese or English name, or alias.
#[derive(Parser)]
pub struct PlanArgs {
    #[clap(long, short, env = "TAIPOWER_PLAN")]
    pub plan: String,
}

impl PlanArgs {
    pub fn resolve<'a>(&self, registry: &'a PlanRegistry) -> Result<&'a TariffPlan> {
        let plan = registry.get(&self.plan)?;
        info!(id = plan.id(), name = %plan.metadata.name_zh, "selected the plan");
        Ok(plan)
    }
}

#[derive(Parser)]
pub struct UsageArgs {
    /// CSV or JSON file with `timestamp` and `kwh` columns.
    #[clap(long = "usage", short = 'u')]
    pub path: PathBuf,

    /// Meter-reading cycle, defaults to the plan's.
    #[clap(long, value_enum)]
    pub cycle: Option<CycleArg>,
}

impl UsageArgs {
    pub fn read(&self) -> Result<UsageSeries> {
        read_usage(&self.path)
    }

    pub fn cycle(&self, plan: &TariffPlan) -> BillingCycle {
        self.cycle.map_or(plan.billing.default_cycle, BillingCycle::from)
    }
}

#[derive(Copy, Clone, ValueEnum)]
pub enum CycleArg {
    Monthly,
    OddMonth,
    EvenMonth,
}

impl From<CycleArg> for BillingCycle {
    fn from(cycle: CycleArg) -> Self {
        match cycle {
            CycleArg::Monthly => Self::Monthly,
            CycleArg::OddMonth => Self::OddMonth,
            CycleArg::EvenMonth => Self::EvenMonth,
        }
    }
}
