use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime};
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};
use itertools::Itertools;
use taipower_tariff::{
    Bill,
    BreakdownRow,
    LineItem,
    Period,
    PeriodEnergy,
    PeriodType,
    PricingContext,
    TariffPlan,
    quantities::{cost::Cost, energy::KilowattHours, rate::KilowattHourRate},
};

use crate::{
    cli::Comparison,
    fmt::{Share, SignedCost},
};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table
}

const fn period_color(period: &Period) -> Color {
    match period.built_in() {
        Some(PeriodType::Peak) => Color::Red,
        Some(PeriodType::SemiPeak) => Color::DarkYellow,
        Some(PeriodType::OffPeak) => Color::Green,
        Some(PeriodType::Flat) | None => Color::Reset,
    }
}

fn right(content: impl ToString) -> Cell {
    Cell::new(content).set_alignment(CellAlignment::Right)
}

fn average_rate(cost: Cost, usage: KilowattHours) -> Cell {
    if usage > KilowattHours::ZERO {
        right(KilowattHourRate::new(cost.get() / usage.get()))
    } else {
        Cell::new("-").add_attribute(Attribute::Dim)
    }
}

fn signed_cost(cost: Cost) -> Cell {
    right(SignedCost(cost)).fg(if cost > Cost::ZERO {
        Color::Red
    } else if cost < Cost::ZERO {
        Color::Green
    } else {
        Color::Reset
    })
}

pub fn build_plans_table(plans: &[TariffPlan]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["ID", "名稱", "Name", "Category", "Pricing", "Cycle"]);
    for plan in plans {
        table.add_row(vec![
            Cell::new(plan.id()).add_attribute(Attribute::Bold),
            Cell::new(&plan.metadata.name_zh),
            Cell::new(&plan.metadata.name_en),
            Cell::new(plan.metadata.category).add_attribute(Attribute::Dim),
            Cell::new(if plan.is_tiered() { "tiered" } else { "time-of-use" }),
            Cell::new(plan.billing.default_cycle).add_attribute(Attribute::Dim),
        ]);
    }
    table
}

pub fn build_pricing_table(pricings: &[(NaiveDateTime, PricingContext)]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Timestamp", "Weekday", "Season", "Day type", "Period", "Rate"]);
    for (timestamp, pricing) in pricings {
        let context = &pricing.context;
        table.add_row(vec![
            Cell::new(timestamp.format("%Y-%m-%d %H:%M")),
            Cell::new(timestamp.format("%a")).add_attribute(Attribute::Dim),
            Cell::new(context.season),
            Cell::new(context.day_type),
            Cell::new(&context.period).fg(period_color(&context.period)),
            pricing.rate.map_or_else(|| Cell::new("tiered").add_attribute(Attribute::Dim), right),
        ]);
    }
    table
}

pub fn build_costs_table(periods: &BTreeMap<NaiveDate, PeriodEnergy>) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Start", "End", "Usage", "Cost", "Average"]);
    for period in periods.values() {
        table.add_row(vec![
            Cell::new(period.start),
            Cell::new(period.end).add_attribute(Attribute::Dim),
            right(period.usage),
            right(period.cost).add_attribute(Attribute::Bold),
            average_rate(period.cost, period.usage),
        ]);
    }
    let usage: KilowattHours = periods.values().map(|period| period.usage).sum();
    let cost: Cost = periods.values().map(|period| period.cost).sum();
    table.add_row(vec![
        Cell::new("Total").add_attribute(Attribute::Bold),
        Cell::new(""),
        right(usage),
        right(cost).add_attribute(Attribute::Bold),
        average_rate(cost, usage),
    ]);
    table
}

pub fn build_breakdown_table(rows: &[BreakdownRow]) -> Table {
    let with_shares = rows.iter().any(|row| row.usage_share.is_some());
    let mut table = new_table();
    let mut header = vec!["Month", "Season", "Period", "Usage", "Cost"];
    if with_shares {
        header.extend(["Usage share", "Cost share"]);
    }
    table.set_header(header);

    for (month, group) in &rows.iter().chunk_by(|row| row.month) {
        for (index, row) in group.enumerate() {
            let mut cells = vec![
                if index == 0 {
                    Cell::new(month.format("%Y-%m"))
                } else {
                    Cell::new(month.format("%Y-%m")).add_attribute(Attribute::Dim)
                },
                Cell::new(row.season),
                Cell::new(&row.period).fg(period_color(&row.period)),
                right(row.usage),
                right(row.cost),
            ];
            if with_shares {
                cells.extend([row.usage_share, row.cost_share].map(|share| right(Share(share))));
            }
            table.add_row(cells);
        }
    }
    table
}

pub fn build_bill_table(bill: &Bill) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        "Start", "End", "Season", "Usage", "Peak", "Energy", "Basic", "Penalty", "PF", "Surcharge", "Total",
    ]);
    for period in bill.periods.values() {
        table.add_row(vec![
            Cell::new(period.start),
            Cell::new(period.end).add_attribute(Attribute::Dim),
            Cell::new(period.season),
            right(period.usage),
            period.peak_demand.map_or_else(|| Cell::new(""), right),
            right(period.energy_cost),
            right(period.basic_fee),
            signed_cost(period.penalty),
            signed_cost(period.pf_adjustment),
            signed_cost(period.surcharge),
            right(period.total).add_attribute(Attribute::Bold),
        ]);
    }
    table.add_row(vec![
        Cell::new(&bill.plan_id).add_attribute(Attribute::Dim),
        Cell::new(bill.cycle).add_attribute(Attribute::Dim),
        Cell::new(""),
        right(bill.periods.values().map(|period| period.usage).sum::<KilowattHours>()),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        right(bill.total()).add_attribute(Attribute::Bold),
    ]);
    table
}

pub fn build_line_items_table(items: &[LineItem]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Season", "Day type", "Period", "Usage", "Cost", "Average"]);
    for item in items {
        table.add_row(vec![
            Cell::new(item.season),
            item.day_type.map_or_else(|| Cell::new(""), Cell::new),
            Cell::new(&item.period).fg(period_color(&item.period)),
            right(item.usage),
            right(item.cost),
            average_rate(item.cost, item.usage),
        ]);
    }
    table
}

pub fn build_comparison_table(comparisons: &[Comparison]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["#", "ID", "名稱", "Usage", "Energy", "Total", "Average"]);
    for (rank, comparison) in comparisons.iter().enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1).add_attribute(Attribute::Dim),
            Cell::new(&comparison.id),
            Cell::new(&comparison.name),
            right(comparison.usage),
            right(comparison.energy_cost),
            right(comparison.total).fg(if rank == 0 { Color::Green } else { Color::Reset }),
            comparison.average_rate().map_or_else(|| Cell::new("-"), |rate| right(KilowattHourRate::new(rate))),
        ]);
    }
    table
}

pub fn build_holidays_table(holidays: &BTreeSet<NaiveDate>) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Date", "Weekday"]);
    for date in holidays {
        table.add_row(vec![Cell::new(date), Cell::new(date.format("%a")).add_attribute(Attribute::Dim)]);
    }
    table
}
