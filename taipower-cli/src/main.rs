#![allow(clippy::doc_markdown)]
#![doc = include_str!("../../README.md")]

mod cli;
mod fmt;
mod input;
mod prelude;
mod tables;

use clap::{Parser, crate_version};
use taipower_tariff::PlanRegistry;

use crate::{
    cli::{Args, Command},
    prelude::*,
    tables::build_plans_table,
};

fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().without_time().compact().with_writer(std::io::stderr).init();
    info!(version = crate_version!(), "starting…");

    let args = Args::parse();
    let registry = PlanRegistry::builtin().context("failed to load the built-in plans")?;
    let calendar = args.calendar.calendar();

    match args.command {
        Command::Plans => {
            println!("{}", build_plans_table(registry.plans()));
        }
        Command::Period(args) => args.run(&registry, &calendar)?,
        Command::Costs(args) => args.run(&registry, &calendar)?,
        Command::Breakdown(args) => args.run(&registry, &calendar)?,
        Command::Bill(args) => args.run(&registry, &calendar)?,
        Command::Compare(args) => args.run(&registry, &calendar)?,
        Command::Holidays(args) => args.run(&calendar)?,
    }

    info!("done!");
    Ok(())
}
