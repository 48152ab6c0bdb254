//! Usage and demand series from CSV or JSON files.
//!
//! CSV files need a header row. JSON files hold either an array of objects, or an object mapping
//! timestamps onto readings. Column names are matched case-insensitively against a few common
//! spellings, Chinese ones included.

use std::{fs, path::Path};

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde_json::Value;
use taipower_tariff::{DemandRecord, DemandSeries, UsageRecord, UsageSeries};

use crate::prelude::*;

const TIMESTAMP_COLUMNS: &[&str] = &["timestamp", "datetime", "time", "date", "時間", "日期時間"];

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// Taiwan has no daylight saving time.
const TAIPEI_OFFSET_SECONDS: i32 = 8 * 3600;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Reading {
    Energy,
    Power,
}

impl Reading {
    const fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Energy => &["kwh", "usage_kwh", "usage", "value", "用電度數", "用電量"],
            Self::Power => &["kw", "demand_kw", "demand", "value", "需量"],
        }
    }
}

pub fn read_usage(path: &Path) -> Result<UsageSeries> {
    let readings = read_readings(path, Reading::Energy)?;
    let series = UsageSeries::new(readings.into_iter().map(|(timestamp, kwh)| UsageRecord::new(timestamp, kwh)))?;
    info!(path = %path.display(), n_records = series.len(), total = %series.total(), "read the usage");
    Ok(series)
}

pub fn read_demand(path: &Path) -> Result<DemandSeries> {
    let readings = read_readings(path, Reading::Power)?;
    let series = DemandSeries::new(readings.into_iter().map(|(timestamp, kw)| DemandRecord::new(timestamp, kw)))?;
    info!(path = %path.display(), n_records = series.records().len(), "read the demand");
    Ok(series)
}

fn read_readings(path: &Path, reading: Reading) -> Result<Vec<(NaiveDateTime, f64)>> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read `{}`", path.display()))?;
    let is_json = path.extension().is_some_and(|extension| extension.eq_ignore_ascii_case("json"))
        || text.trim_start_matches('\u{feff}').trim_start().starts_with(['[', '{']);
    let readings = if is_json { parse_json(&text, reading) } else { parse_csv(&text, reading) };
    readings.with_context(|| format!("failed to parse `{}`", path.display()))
}

fn parse_csv(text: &str, reading: Reading) -> Result<Vec<(NaiveDateTime, f64)>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(text.as_bytes());
    let headers = reader.headers().context("failed to read the header row")?.clone();
    let find = |candidates: &[&str]| headers.iter().position(|header| is_column(header, candidates));
    let timestamp_index = find(TIMESTAMP_COLUMNS).context("no timestamp column")?;
    let value_index = find(reading.columns())
        .with_context(|| format!("no column among {:?}", reading.columns()))?;

    let mut readings = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("failed to read row #{}", row + 1))?;
        let (Some(timestamp), Some(value)) = (record.get(timestamp_index), record.get(value_index)) else {
            bail!("row #{} is too short", row + 1);
        };
        let timestamp = parse_timestamp(timestamp).with_context(|| format!("row #{}", row + 1))?;
        let value = value.parse::<f64>().with_context(|| format!("row #{}: `{value}` is not a number", row + 1))?;
        readings.push((timestamp, value));
    }
    Ok(readings)
}

fn parse_json(text: &str, reading: Reading) -> Result<Vec<(NaiveDateTime, f64)>> {
    match serde_json::from_str::<Value>(text.trim_start_matches('\u{feff}'))? {
        Value::Object(map) => map
            .iter()
            .map(|(timestamp, value)| -> Result<_> {
                Ok((parse_timestamp(timestamp)?, json_number(value)?))
            })
            .collect(),
        Value::Array(rows) => rows
            .iter()
            .enumerate()
            .map(|(index, row)| -> Result<_> {
                let Value::Object(row) = row else {
                    bail!("item #{index} is not an object");
                };
                let field = |candidates: &[&str]| {
                    row.iter().find(|(key, _)| is_column(key, candidates)).map(|(_, value)| value)
                };
                let timestamp = field(TIMESTAMP_COLUMNS)
                    .and_then(Value::as_str)
                    .with_context(|| format!("item #{index} has no timestamp"))?;
                let value = field(reading.columns())
                    .with_context(|| format!("item #{index} has none of {:?}", reading.columns()))?;
                Ok((parse_timestamp(timestamp)?, json_number(value)?))
            })
            .collect(),
        _ => bail!("expected an array or an object"),
    }
}

fn json_number(value: &Value) -> Result<f64> {
    match value {
        Value::Number(number) => number.as_f64().context("the number does not fit into `f64`"),
        Value::String(text) => text.trim().parse().with_context(|| format!("`{text}` is not a number")),
        _ => bail!("`{value}` is not a number"),
    }
}

fn is_column(header: &str, candidates: &[&str]) -> bool {
    let header = header.trim_start_matches('\u{feff}').trim().to_lowercase();
    candidates.contains(&header.as_str())
}

/// Parse a local timestamp. Offset-aware timestamps are converted to Taiwan time.
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    let text = text.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        let taipei = FixedOffset::east_opt(TAIPEI_OFFSET_SECONDS).context("invalid offset")?;
        return Ok(timestamp.with_timezone(&taipei).naive_local());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .with_context(|| format!("`{text}` is not a recognized timestamp"))
}
