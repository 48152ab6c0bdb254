mod bill;
mod breakdown;
mod calendar;
mod compare;
mod costs;
mod holidays;
mod period;
mod plan;

use clap::{Parser, Subcommand};

pub use self::{calendar::CalendarArgs, compare::Comparison};
use crate::cli::{
    bill::BillArgs,
    breakdown::BreakdownArgs,
    compare::CompareArgs,
    costs::CostsArgs,
    holidays::HolidaysArgs,
    period::PeriodArgs,
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[clap(flatten)]
    pub calendar: CalendarArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the built-in plans.
    #[clap(name = "plans")]
    Plans,

    /// Classify a single timestamp and show its rate.
    #[clap(name = "period")]
    Period(Box<PeriodArgs>),

    /// Energy cost per billing period for a usage file.
    #[clap(name = "costs")]
    Costs(Box<CostsArgs>),

    /// Usage and cost per month, season and period.
    #[clap(name = "breakdown")]
    Breakdown(Box<BreakdownArgs>),

    /// Full bill: energy, basic fee, penalty, power factor adjustment and surcharges.
    #[clap(name = "bill")]
    Bill(Box<BillArgs>),

    /// Compare the bill of the same usage across plans.
    #[clap(name = "compare")]
    Compare(Box<CompareArgs>),

    /// Show the resolved public holidays of a year.
    #[clap(name = "holidays")]
    Holidays(Box<HolidaysArgs>),
}
