use chrono::{NaiveDateTime, TimeDelta};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use taipower_quantities::{energy::KilowattHours, power::Kilowatts};

use crate::error::{Result, TariffError};

/// Energy consumed in the interval starting at `timestamp`, local Taiwan time.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: NaiveDateTime,
    pub kwh: KilowattHours,
}

impl UsageRecord {
    pub const fn new(timestamp: NaiveDateTime, kwh: f64) -> Self {
        Self { timestamp, kwh: KilowattHours::new(kwh) }
    }
}

/// Validated usage series: sorted by timestamp, one record per timestamp.
///
/// Records sharing a timestamp are summed, not overwritten.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UsageSeries {
    records: Vec<UsageRecord>,
}

impl UsageSeries {
    pub fn new(records: impl IntoIterator<Item = UsageRecord>) -> Result<Self> {
        let mut records = records.into_iter().collect_vec();
        for (index, record) in records.iter().enumerate() {
            check_reading(index, record.timestamp, record.kwh.get(), "kwh")?;
        }
        records.sort_by_key(|record| record.timestamp);
        let records = records
            .into_iter()
            .coalesce(|previous, next| {
                if previous.timestamp == next.timestamp {
                    Ok(UsageRecord { timestamp: previous.timestamp, kwh: previous.kwh + next.kwh })
                } else {
                    Err((previous, next))
                }
            })
            .collect();
        Ok(Self { records })
    }

    /// Fail with [`TariffError::InvalidUsageInput`] when there is nothing to bill.
    pub fn require_non_empty(&self) -> Result<&Self> {
        if self.records.is_empty() {
            return Err(TariffError::invalid_usage("usage", "the series is empty"));
        }
        Ok(self)
    }

    #[must_use]
    pub fn records(&self) -> &[UsageRecord] {
        &self.records
    }

    #[must_use]
    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.records.iter().map(|record| record.timestamp).collect()
    }

    #[must_use]
    pub fn total(&self) -> KilowattHours {
        self.records.iter().map(|record| record.kwh).sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Average power drawn in the interval starting at `timestamp`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DemandRecord {
    pub timestamp: NaiveDateTime,
    pub kw: Kilowatts,
}

impl DemandRecord {
    pub const fn new(timestamp: NaiveDateTime, kw: f64) -> Self {
        Self { timestamp, kw: Kilowatts::new(kw) }
    }
}

/// Validated demand series, sorted by timestamp.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DemandSeries {
    records: Vec<DemandRecord>,
}

impl DemandSeries {
    pub fn new(records: impl IntoIterator<Item = DemandRecord>) -> Result<Self> {
        let mut records = records.into_iter().collect_vec();
        for (index, record) in records.iter().enumerate() {
            check_reading(index, record.timestamp, record.kw.get(), "demand_kw")?;
        }
        records.sort_by_key(|record| record.timestamp);
        Ok(Self { records })
    }

    #[must_use]
    pub fn records(&self) -> &[DemandRecord] {
        &self.records
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Median spacing between consecutive distinct timestamps.
    #[must_use]
    pub fn median_interval(&self) -> Option<TimeDelta> {
        let mut intervals = self
            .records
            .iter()
            .tuple_windows()
            .map(|(previous, next)| next.timestamp - previous.timestamp)
            .filter(|interval| *interval > TimeDelta::zero())
            .collect_vec();
        if intervals.is_empty() {
            return None;
        }
        intervals.sort_unstable();
        Some(intervals[intervals.len() / 2])
    }
}

fn check_reading(index: usize, timestamp: NaiveDateTime, value: f64, field: &str) -> Result {
    if !value.is_finite() {
        return Err(TariffError::invalid_usage(
            format!("{field}[{index}]"),
            format!("{value} at {timestamp} is not a finite number"),
        ));
    }
    if value < 0.0 {
        return Err(TariffError::invalid_usage(
            format!("{field}[{index}]"),
            format!("{value} at {timestamp} is negative"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, day).unwrap().and_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn test_sorts_and_sums_duplicates() -> Result {
        let series = UsageSeries::new([
            UsageRecord::new(at(2, 0, 0), 1.0),
            UsageRecord::new(at(1, 0, 0), 0.5),
            UsageRecord::new(at(2, 0, 0), 2.0),
        ])?;
        assert_eq!(
            series.records(),
            &[UsageRecord::new(at(1, 0, 0), 0.5), UsageRecord::new(at(2, 0, 0), 3.0)],
        );
        assert_eq!(series.total(), KilowattHours::new(3.5));
        Ok(())
    }

    #[test]
    fn test_rejects_negative_usage() {
        let error = UsageSeries::new([UsageRecord::new(at(1, 0, 0), 1.0), UsageRecord::new(at(1, 1, 0), -0.1)])
            .unwrap_err();
        assert!(matches!(error, TariffError::InvalidUsageInput { ref field, .. } if field == "kwh[1]"));
    }

    #[test]
    fn test_rejects_nan() {
        assert!(UsageSeries::new([UsageRecord::new(at(1, 0, 0), f64::NAN)]).is_err());
        assert!(DemandSeries::new([DemandRecord::new(at(1, 0, 0), f64::INFINITY)]).is_err());
    }

    #[test]
    fn test_require_non_empty() {
        assert!(UsageSeries::default().require_non_empty().is_err());
    }

    #[test]
    fn test_median_interval() -> Result {
        let series = DemandSeries::new([
            DemandRecord::new(at(1, 0, 0), 1.0),
            DemandRecord::new(at(1, 1, 0), 1.0),
            DemandRecord::new(at(1, 2, 0), 1.0),
            DemandRecord::new(at(1, 2, 15), 1.0),
        ])?;
        assert_eq!(series.median_interval(), Some(TimeDelta::hours(1)));
        Ok(())
    }
}
