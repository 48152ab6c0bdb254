use std::{path::PathBuf, str::FromStr};

use clap::Parser;
use itertools::Itertools;
use taipower_tariff::{
    BillingInputs,
    MeterPhase,
    MeterSpec,
    OverContractMode,
    PlanRegistry,
    TaiwanCalendar,
    quantities::power::Kilowatts,
};

use crate::{
    cli::plan::{PlanArgs, UsageArgs},
    input::read_demand,
    prelude::*,
    tables::{build_bill_table, build_line_items_table},
};

#[derive(Parser)]
pub struct BillArgs {
    #[clap(flatten)]
    plan: PlanArgs,

    #[clap(flatten)]
    usage: UsageArgs,

    /// Contracted capacity as `class=kW`, for example `regular=200`. Repeat for more classes.
    #[clap(long = "capacity", short = 'c')]
    capacities: Vec<ContractCapacity>,

    /// CSV or JSON file with `timestamp` and `kw` columns.
    #[clap(long = "demand", short = 'd')]
    demand_path: Option<PathBuf>,

    /// Multiplier applied to peaks of demand series coarser than 15 minutes.
    #[clap(long, default_value = "1.0")]
    demand_factor: f64,

    /// Demand above the contract in kW, instead of deriving it from the demand series.
    #[clap(long)]
    over_contract: Option<f64>,

    /// Match the peak of every demand category against the staged capacities up to it.
    #[clap(long, conflicts_with = "over_contract")]
    staged: bool,

    /// Rated meter as `phase/volts/amperes`, for example `single/110/30`.
    #[clap(long)]
    meter: Option<MeterArg>,

    /// Power factor in percent.
    #[clap(long = "power-factor")]
    power_factor: Option<f64>,

    #[clap(long, default_value = "1")]
    households: u32,

    /// Also show the line items of every billing period.
    #[clap(long)]
    itemize: bool,

    /// Print JSON instead of tables.
    #[clap(long)]
    json: bool,
}

impl BillArgs {
    pub fn run(&self, registry: &PlanRegistry, calendar: &TaiwanCalendar) -> Result {
        let plan = self.plan.resolve(registry)?;
        let usage = self.usage.read()?;
        let demand = self.demand_path.as_deref().map(read_demand).transpose()?;
        let inputs = BillingInputs::builder()
            .contract_capacities(
                self.capacities.iter().map(|capacity| (capacity.class.clone(), capacity.kw)).collect(),
            )
            .maybe_power_factor(self.power_factor)
            .maybe_demand(demand)
            .demand_adjustment_factor(self.demand_factor)
            .cycle(self.usage.cycle(plan))
            .households(self.households)
            .maybe_over_contract(self.over_contract.map(Kilowatts::new))
            .over_contract_mode(if self.staged { OverContractMode::Staged } else { OverContractMode::Regular })
            .maybe_meter(self.meter.map(|meter| meter.0))
            .build();

        let bill = plan.calculate_bill(&usage, &inputs, calendar)?;
        for warning in &bill.warnings {
            warn!("{warning}");
        }
        if self.json {
            println!("{}", serde_json::to_string_pretty(&bill)?);
            return Ok(());
        }
        println!("{}", build_bill_table(&bill));
        if self.itemize {
            for period in bill.periods.values() {
                println!("{}..{}", period.start, period.end);
                println!("{}", build_line_items_table(&period.line_items));
            }
        }
        info!(total = %bill.total(), "calculated the bill");
        Ok(())
    }
}

/// A `class=kW` pair.
#[derive(Clone, Debug, PartialEq)]
pub struct ContractCapacity {
    class: String,
    kw: Kilowatts,
}

impl FromStr for ContractCapacity {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let (class, kw) = text.split_once('=').context("expected `class=kW`")?;
        let class = class.trim();
        ensure!(!class.is_empty(), "the capacity class is empty");
        let kw = kw.trim().parse::<f64>().with_context(|| format!("`{kw}` is not a number"))?;
        Ok(Self { class: class.to_owned(), kw: Kilowatts::new(kw) })
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MeterArg(MeterSpec);

impl FromStr for MeterArg {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let [phase, voltage, ampere] =
            text.split('/').map(str::trim).collect_array().context("expected `phase/volts/amperes`")?;
        let phase = match phase.to_lowercase().as_str() {
            "single" | "1" => MeterPhase::Single,
            "three" | "3" => MeterPhase::Three,
            _ => bail!("`{phase}` is neither `single` nor `three`"),
        };
        let voltage = voltage.parse().with_context(|| format!("`{voltage}` is not a voltage"))?;
        let ampere = ampere.parse().with_context(|| format!("`{ampere}` is not a current"))?;
        Ok(Self(MeterSpec { phase, voltage, ampere }))
    }
}
