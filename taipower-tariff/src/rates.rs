use std::collections::{BTreeMap, HashMap};

use taipower_quantities::{cost::Cost, energy::KilowattHours, rate::KilowattHourRate};

use crate::{
    day_type::DayType,
    error::{Result, TariffError},
    period::Period,
    season::SeasonType,
};

/// Either a time-of-use table or progressive brackets.
#[derive(Clone, Debug)]
pub enum TariffRate {
    TimeOfUse(TouRates),
    Tiered(TieredRates),
}

/// `(season, day type, period) → rate`, with optional day-type wildcards.
#[derive(Clone, Debug, Default)]
pub struct TouRates {
    exact: HashMap<(SeasonType, DayType), HashMap<Period, KilowattHourRate>>,
    any_day: HashMap<SeasonType, HashMap<Period, KilowattHourRate>>,
}

impl TouRates {
    /// Set the rate for one day type, or for every day type when `day_type` is [`None`].
    pub fn insert(
        &mut self,
        season: SeasonType,
        day_type: Option<DayType>,
        period: Period,
        rate: KilowattHourRate,
    ) -> &mut Self {
        let by_period = match day_type {
            Some(day_type) => self.exact.entry((season, day_type)).or_default(),
            None => self.any_day.entry(season).or_default(),
        };
        by_period.insert(period, rate);
        self
    }

    #[must_use]
    pub fn with(
        mut self,
        season: SeasonType,
        day_type: Option<DayType>,
        period: impl Into<Period>,
        rate: f64,
    ) -> Self {
        self.insert(season, day_type, period.into(), KilowattHourRate::new(rate));
        self
    }

    /// Exact entries take precedence over wildcards.
    pub fn rate(
        &self,
        season: SeasonType,
        day_type: DayType,
        period: &Period,
    ) -> Result<KilowattHourRate> {
        self.exact
            .get(&(season, day_type))
            .and_then(|by_period| by_period.get(period))
            .or_else(|| self.any_day.get(&season).and_then(|by_period| by_period.get(period)))
            .copied()
            .ok_or_else(|| TariffError::RateNotFound { season, day_type, period: period.clone() })
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.any_day.is_empty()
    }
}

/// Progressive bracket. [`None`] marks the unbounded last bracket.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bracket {
    pub upper_bound: Option<KilowattHours>,
    pub rate: KilowattHourRate,
}

impl Bracket {
    pub const fn new(upper_bound: Option<f64>, rate: f64) -> Self {
        Self {
            upper_bound: match upper_bound {
                Some(upper_bound) => Some(KilowattHours::new(upper_bound)),
                None => None,
            },
            rate: KilowattHourRate::new(rate),
        }
    }
}

/// Ordered brackets per season, monthly bounds.
#[derive(Clone, Debug)]
pub struct TieredRates {
    by_season: BTreeMap<SeasonType, Vec<Bracket>>,
}

impl TieredRates {
    pub fn new(by_season: BTreeMap<SeasonType, Vec<Bracket>>) -> Result<Self> {
        for (season, brackets) in &by_season {
            let Some((last, bounded)) = brackets.split_last() else {
                return Err(TariffError::configuration(format!("no {season} brackets")));
            };
            if last.upper_bound.is_some() {
                return Err(TariffError::configuration(format!(
                    "the last {season} bracket must be unbounded"
                )));
            }
            let mut lower = KilowattHours::ZERO;
            for bracket in bounded {
                let Some(upper) = bracket.upper_bound else {
                    return Err(TariffError::configuration(format!(
                        "only the last {season} bracket may be unbounded"
                    )));
                };
                if upper <= lower {
                    return Err(TariffError::configuration(format!(
                        "{season} bracket bounds must be strictly increasing"
                    )));
                }
                lower = upper;
            }
        }
        Ok(Self { by_season })
    }

    pub fn brackets(&self, season: SeasonType) -> Result<&[Bracket]> {
        self.by_season
            .get(&season)
            .map(Vec::as_slice)
            .ok_or_else(|| TariffError::configuration(format!("no {season} brackets")))
    }

    /// Walk the brackets with bounds scaled by `bound_scale`.
    ///
    /// A kWh sitting exactly on a bound belongs to the lower bracket.
    pub fn cost(&self, season: SeasonType, usage: KilowattHours, bound_scale: f64) -> Result<Cost> {
        let mut remaining = usage;
        let mut lower = KilowattHours::ZERO;
        let mut cost = Cost::ZERO;
        for bracket in self.brackets(season)? {
            if remaining <= KilowattHours::ZERO {
                break;
            }
            let consumed = match bracket.upper_bound {
                Some(upper) => {
                    let upper = upper * bound_scale;
                    let consumed = remaining.min(upper - lower);
                    lower = upper;
                    consumed
                }
                None => remaining,
            };
            cost += consumed * bracket.rate;
            remaining -= consumed;
        }
        Ok(cost)
    }
}
