use std::{
    collections::BTreeSet,
    fs,
    path::PathBuf,
    thread,
    time::Duration,
};

use chrono::{Datelike, Local, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use ureq::Agent;

use crate::error::{Result, TariffError};

/// One tier of the holiday fallback chain.
pub trait HolidaySource: Send + Sync {
    fn name(&self) -> &'static str;

    fn load(&self, year: i32) -> Result<BTreeSet<NaiveDate>>;
}

/// Entry of the `ruyut/TaiwanCalendar` dataset.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct DayEntry {
    /// `YYYYMMDD`.
    date: String,

    #[serde(rename = "isHoliday", default)]
    is_holiday: bool,

    #[serde(default)]
    description: String,
}

fn extract_holidays(entries: &[DayEntry]) -> BTreeSet<NaiveDate> {
    entries
        .iter()
        .filter(|entry| entry.is_holiday)
        .filter_map(|entry| {
            let date = NaiveDate::parse_from_str(&entry.date, "%Y%m%d").ok()?;
            // Plain Saturdays are flagged as days off, but they are not holidays.
            (date.weekday() != Weekday::Sat || !entry.description.is_empty()).then_some(date)
        })
        .collect()
}

fn sundays(year: i32) -> impl Iterator<Item = NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, 1, Weekday::Sun, 1)
        .into_iter()
        .flat_map(|first| first.iter_weeks())
        .take_while(move |date| date.year() == year)
}

fn unavailable(year: i32, reason: impl ToString) -> TariffError {
    TariffError::CalendarUnavailable { year, reason: reason.to_string() }
}

/// Year files previously downloaded from the dataset.
#[derive(Clone, Debug)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, year: i32) -> PathBuf {
        self.dir.join(format!("{year}.json"))
    }

    fn store(&self, year: i32, entries: &[DayEntry]) -> Result {
        fs::create_dir_all(&self.dir).map_err(|error| unavailable(year, error))?;
        let body = serde_json::to_vec(entries).map_err(|error| unavailable(year, error))?;
        fs::write(self.path(year), body).map_err(|error| unavailable(year, error))
    }
}

impl HolidaySource for DiskCache {
    fn name(&self) -> &'static str {
        "disk cache"
    }

    fn load(&self, year: i32) -> Result<BTreeSet<NaiveDate>> {
        let body = fs::read(self.path(year)).map_err(|error| unavailable(year, error))?;
        let entries: Vec<DayEntry> =
            serde_json::from_slice(&body).map_err(|error| unavailable(year, error))?;
        Ok(extract_holidays(&entries))
    }
}

/// The public `ruyut/TaiwanCalendar` dataset on GitHub.
pub struct RemoteDataset {
    client: Agent,
    cache: Option<DiskCache>,
}

impl RemoteDataset {
    const N_ATTEMPTS: u32 = 3;

    pub fn new(cache: Option<DiskCache>) -> Self {
        let client =
            Agent::config_builder().timeout_global(Some(Duration::from_secs(10))).build().into();
        Self { client, cache }
    }

    #[instrument(skip(self))]
    fn fetch(&self, year: i32) -> Result<Vec<DayEntry>> {
        let url =
            format!("https://raw.githubusercontent.com/ruyut/TaiwanCalendar/master/data/{year}.json");
        let mut delay = Duration::from_secs(1);
        let mut attempt = 1;
        loop {
            debug!(attempt, "fetching…");
            match self.client.get(&url).call() {
                Ok(mut response) => {
                    return response
                        .body_mut()
                        .read_json::<Vec<DayEntry>>()
                        .map_err(|error| unavailable(year, error));
                }
                Err(ureq::Error::StatusCode(404)) => {
                    return Err(unavailable(year, "not published"));
                }
                Err(error) if attempt >= Self::N_ATTEMPTS => {
                    return Err(unavailable(year, error));
                }
                Err(error) => {
                    warn!(attempt, %error, "retrying…");
                    thread::sleep(delay);
                    delay *= 2;
                    attempt += 1;
                }
            }
        }
    }
}

impl HolidaySource for RemoteDataset {
    fn name(&self) -> &'static str {
        "remote dataset"
    }

    fn load(&self, year: i32) -> Result<BTreeSet<NaiveDate>> {
        // The dataset only covers the past and the upcoming year.
        if year > Local::now().year() + 1 {
            return Err(unavailable(year, "too far in the future"));
        }
        let entries = self.fetch(year)?;
        if let Some(cache) = &self.cache
            && let Err(error) = cache.store(year, &entries)
        {
            warn!(%error, "failed to write the holiday cache");
        }
        Ok(extract_holidays(&entries))
    }
}

/// Sundays, fixed solar holidays and the embedded lunar festivals.
#[derive(Copy, Clone, Debug, Default)]
pub struct LunarRules;

impl LunarRules {
    const FIXED: [(u32, u32); 6] = [(1, 1), (2, 28), (4, 4), (4, 5), (5, 1), (10, 10)];

    /// Solar dates of the Lunar New Year, the Dragon Boat and the Mid-Autumn festivals.
    const FESTIVALS: [(i32, (u32, u32), (u32, u32), (u32, u32)); 11] = [
        (2020, (1, 25), (6, 25), (10, 1)),
        (2021, (2, 12), (6, 14), (9, 21)),
        (2022, (2, 1), (6, 3), (9, 10)),
        (2023, (1, 22), (6, 22), (9, 29)),
        (2024, (2, 10), (6, 10), (9, 17)),
        (2025, (1, 29), (5, 31), (10, 6)),
        (2026, (2, 17), (6, 19), (9, 25)),
        (2027, (2, 6), (6, 9), (9, 15)),
        (2028, (1, 26), (5, 28), (10, 3)),
        (2029, (2, 13), (6, 16), (9, 22)),
        (2030, (2, 3), (6, 5), (9, 12)),
    ];
}

impl HolidaySource for LunarRules {
    fn name(&self) -> &'static str {
        "lunar rules"
    }

    fn load(&self, year: i32) -> Result<BTreeSet<NaiveDate>> {
        let (_, new_year, dragon_boat, mid_autumn) = Self::FESTIVALS
            .iter()
            .find(|(festival_year, ..)| *festival_year == year)
            .ok_or_else(|| unavailable(year, "no lunar festival table"))?;
        let festival = |(month, day): (u32, u32)| NaiveDate::from_ymd_opt(year, month, day);
        let spring_festival = festival(*new_year).into_iter().flat_map(|first| first.iter_days().take(3));
        Ok(sundays(year)
            .chain(Self::FIXED.into_iter().filter_map(festival))
            .chain(spring_festival)
            .chain(festival(*dragon_boat))
            .chain(festival(*mid_autumn))
            .collect())
    }
}

/// Sundays and a handful of fixed dates. Always succeeds.
#[derive(Copy, Clone, Debug, Default)]
pub struct StaticPreset;

impl StaticPreset {
    const FIXED: [(u32, u32); 8] =
        [(1, 1), (2, 28), (4, 4), (5, 1), (9, 28), (10, 10), (10, 25), (12, 25)];
}

impl HolidaySource for StaticPreset {
    fn name(&self) -> &'static str {
        "static preset"
    }

    fn load(&self, year: i32) -> Result<BTreeSet<NaiveDate>> {
        Ok(sundays(year)
            .chain(
                Self::FIXED
                    .into_iter()
                    .filter_map(|(month, day)| NaiveDate::from_ymd_opt(year, month, day)),
            )
            .collect())
    }
}
