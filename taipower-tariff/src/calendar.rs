//! Holiday calendars.
//!
//! The engine only asks [`HolidayCalendar::is_holiday`]. [`TaiwanCalendar`] answers it from a
//! per-year cache, filled on first access from a chain of [`HolidaySource`]s.

mod sources;

use std::{
    collections::{BTreeSet, HashMap},
    path::PathBuf,
    sync::Arc,
};

use chrono::{Datelike, NaiveDate};
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

pub use self::sources::{DiskCache, HolidaySource, LunarRules, RemoteDataset, StaticPreset};

/// Holiday lookup capability consumed by the classification engine.
pub trait HolidayCalendar: Send + Sync {
    fn is_holiday(&self, date: NaiveDate) -> bool;

    /// Warm up the given years. A performance hint with no effect on results.
    fn preload(&self, _years: &BTreeSet<i32>) {}
}

impl<T: HolidayCalendar + ?Sized> HolidayCalendar for Arc<T> {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        (**self).is_holiday(date)
    }

    fn preload(&self, years: &BTreeSet<i32>) {
        (**self).preload(years);
    }
}

/// Fixed set of holiday dates.
#[derive(Clone, Debug, Default)]
pub struct CustomCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl CustomCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self { holidays: holidays.into_iter().collect() }
    }

    #[must_use]
    pub const fn holidays(&self) -> &BTreeSet<NaiveDate> {
        &self.holidays
    }
}

impl HolidayCalendar for CustomCalendar {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }
}

/// Taiwan public holidays with a per-year, append-only cache.
///
/// Each year is resolved once, by the first source in the chain that succeeds:
///
/// 1. JSON files in the local cache directory,
/// 2. the public `TaiwanCalendar` dataset (written back into the cache),
/// 3. fixed solar holidays plus the embedded lunar festival table,
/// 4. a static preset of fixed dates.
///
/// When every source fails the year has no holidays and a warning is logged.
pub struct TaiwanCalendar {
    sources: Vec<Box<dyn HolidaySource>>,
    years: RwLock<HashMap<i32, Arc<BTreeSet<NaiveDate>>>>,
}

impl TaiwanCalendar {
    /// Full chain, including the network.
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        let cache = cache_dir.or_else(Self::default_cache_dir).map(DiskCache::new);
        let mut sources: Vec<Box<dyn HolidaySource>> = Vec::new();
        if let Some(cache) = &cache {
            sources.push(Box::new(cache.clone()));
        }
        sources.push(Box::new(RemoteDataset::new(cache)));
        sources.push(Box::new(LunarRules));
        sources.push(Box::new(StaticPreset));
        Self::from_sources(sources)
    }

    /// Same chain without the network source.
    pub fn offline(cache_dir: Option<PathBuf>) -> Self {
        let mut sources: Vec<Box<dyn HolidaySource>> = Vec::new();
        if let Some(cache_dir) = cache_dir {
            sources.push(Box::new(DiskCache::new(cache_dir)));
        }
        sources.push(Box::new(LunarRules));
        sources.push(Box::new(StaticPreset));
        Self::from_sources(sources)
    }

    pub fn from_sources(sources: Vec<Box<dyn HolidaySource>>) -> Self {
        Self { sources, years: RwLock::new(HashMap::new()) }
    }

    #[must_use]
    pub fn default_cache_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("taipower").join("holidays"))
    }

    /// Holidays of the given year, loading them on first access.
    pub fn holidays(&self, year: i32) -> Arc<BTreeSet<NaiveDate>> {
        if let Some(holidays) = self.years.read().get(&year) {
            return Arc::clone(holidays);
        }
        let holidays = Arc::new(self.load(year));
        Arc::clone(self.years.write().entry(year).or_insert(holidays))
    }

    #[instrument(skip(self))]
    fn load(&self, year: i32) -> BTreeSet<NaiveDate> {
        for source in &self.sources {
            match source.load(year) {
                Ok(holidays) => {
                    info!(source = source.name(), n_holidays = holidays.len(), "loaded");
                    return holidays;
                }
                Err(error) => {
                    debug!(source = source.name(), %error, "falling back");
                }
            }
        }
        warn!("all holiday sources failed, treating every date as a non-holiday");
        BTreeSet::new()
    }
}

impl HolidayCalendar for TaiwanCalendar {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays(date.year()).contains(&date)
    }

    fn preload(&self, years: &BTreeSet<i32>) {
        let n_holidays: usize = years.iter().map(|year| self.holidays(*year).len()).sum();
        debug!(?years, n_holidays, "preloaded");
    }
}
