use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Meter-reading cycle.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    Hash,
    PartialEq,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    #[default]
    #[display("monthly")]
    Monthly,

    /// Meters read in odd months: periods are December–January, February–March, and so on.
    #[display("odd_month")]
    OddMonth,

    /// Meters read in even months: periods are January–February, March–April, and so on.
    #[display("even_month")]
    EvenMonth,
}

impl BillingCycle {
    #[must_use]
    pub const fn months(self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::OddMonth | Self::EvenMonth => 2,
        }
    }

    /// First day of the billing period containing `date`.
    #[must_use]
    pub fn period_start(self, date: NaiveDate) -> NaiveDate {
        let month_start = first_of_month(date);
        let starts_here = match self {
            Self::Monthly => true,
            Self::OddMonth => date.month() % 2 == 0,
            Self::EvenMonth => date.month() % 2 == 1,
        };
        if starts_here { month_start } else { first_of_month(month_start - Days::new(1)) }
    }

    /// Exclusive end of the billing period starting at `start`.
    #[must_use]
    pub fn period_end(self, start: NaiveDate) -> NaiveDate {
        start + Months::new(self.months())
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}
