use chrono::{Datelike, Local};
use clap::Parser;
use taipower_tariff::TaiwanCalendar;

use crate::{prelude::*, tables::build_holidays_table};

#[derive(Parser)]
pub struct HolidaysArgs {
    /// Defaults to the current year.
    year: Option<i32>,
}

impl HolidaysArgs {
    pub fn run(&self, calendar: &TaiwanCalendar) -> Result {
        let year = self.year.unwrap_or_else(|| Local::now().year());
        let holidays = calendar.holidays(year);
        info!(year, n_holidays = holidays.len(), "resolved the holidays");
        println!("{}", build_holidays_table(&holidays));
        Ok(())
    }
}
