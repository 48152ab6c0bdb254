//! Taiwan electricity tariffs: timestamp classification, energy charges and bills.
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use taipower_tariff::{
//!     BillingCycle, BillingInputs, PlanRegistry, TaiwanCalendar, UsageRecord, UsageSeries,
//! };
//!
//! # fn main() -> taipower_tariff::Result {
//! let registry = PlanRegistry::builtin()?;
//! let plan = registry.get("簡易型二段式")?;
//! let calendar = TaiwanCalendar::offline(None);
//! let timestamp = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap().and_hms_opt(14, 0, 0).unwrap();
//! let usage = UsageSeries::new([UsageRecord::new(timestamp, 1.5)])?;
//! let costs = plan.calculate_costs(&usage, BillingCycle::Monthly, &calendar)?;
//! let bill = plan.calculate_bill(&usage, &BillingInputs::default(), &calendar)?;
//! # Ok(())
//! # }
//! ```

pub mod billing;
pub mod builder;
pub mod calendar;
pub mod cycle;
pub mod data;
pub mod day_type;
pub mod energy;
pub mod engine;
pub mod error;
pub mod period;
pub mod plan;
pub mod profile;
pub mod rates;
pub mod registry;
pub mod schedule;
pub mod season;
pub mod usage;

pub use taipower_quantities as quantities;

pub use self::{
    billing::{Bill, BillWarning, BillingInputs, DemandCategory, MeterSpec, MonthlyBillBreakdown, OverContractMode},
    calendar::{CustomCalendar, HolidayCalendar, TaiwanCalendar},
    cycle::BillingCycle,
    day_type::{DayType, DayTypeStrategy},
    energy::{BreakdownRow, LineItem, PeriodEnergy},
    engine::{Classification, Context},
    error::{Result, TariffError},
    period::{Period, PeriodType},
    plan::{MeterPhase, MinimumUsageRule, PricingContext, TariffPlan},
    profile::TariffProfile,
    rates::TariffRate,
    registry::PlanRegistry,
    schedule::{DaySchedule, MinuteOfDay, TimeSlot},
    season::{SeasonStrategy, SeasonType},
    usage::{DemandRecord, DemandSeries, UsageRecord, UsageSeries},
};
