use std::path::PathBuf;

use clap::Parser;
use taipower_tariff::TaiwanCalendar;

#[derive(Parser)]
pub struct CalendarArgs {
    /// Cache directory, holiday lists are kept in its `holidays` subdirectory.
    #[clap(long = "cache-dir", env = "TAIPOWER_CACHE_DIR", global = true)]
    cache_dir: Option<PathBuf>,

    /// Never fetch holiday lists from the network.
    #[clap(long, env = "TAIPOWER_OFFLINE", global = true)]
    offline: bool,
}

impl CalendarArgs {
    pub fn calendar(&self) -> TaiwanCalendar {
        let cache_dir = self.cache_dir.as_ref().map(|dir| dir.join("holidays"));
        if self.offline {
            TaiwanCalendar::offline(cache_dir.or_else(TaiwanCalendar::default_cache_dir))
        } else {
            TaiwanCalendar::new(cache_dir)
        }
    }
}
