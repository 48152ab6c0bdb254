use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::{
    error::{Result, TariffError},
    period::Period,
};

/// Minutes since local midnight, `0..=1440`.
///
/// `1440` is written `24:00` and stands for midnight of the following day.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, SerializeDisplay, DeserializeFromStr)]
pub struct MinuteOfDay(u16);

impl MinuteOfDay {
    pub const MIDNIGHT: Self = Self(0);
    pub const END_OF_DAY: Self = Self(1440);

    pub fn new(minute: u16) -> Result<Self> {
        if minute > Self::END_OF_DAY.0 {
            return Err(TariffError::configuration(format!("minute {minute} is past the end of day")));
        }
        Ok(Self(minute))
    }

    pub fn hm(hour: u16, minute: u16) -> Result<Self> {
        if minute >= 60 {
            return Err(TariffError::configuration(format!("invalid minute {minute}")));
        }
        hour.checked_mul(60)
            .and_then(|minutes| minutes.checked_add(minute))
            .ok_or_else(|| TariffError::configuration(format!("{hour}:{minute:02} is past the end of day")))
            .and_then(Self::new)
    }

    #[must_use]
    pub fn of(time: NaiveTime) -> Self {
        #[expect(clippy::cast_possible_truncation)]
        Self((time.hour() * 60 + time.minute()) as u16)
    }

    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl Display for MinuteOfDay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl FromStr for MinuteOfDay {
    type Err = TariffError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TariffError::configuration(format!("expected `HH:MM`, got `{s}`"));
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        Self::hm(hour.parse().map_err(|_| invalid())?, minute.parse().map_err(|_| invalid())?)
    }
}

/// Half-open `[start, end)` slot. A slot with `start > end` wraps across midnight.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: MinuteOfDay,
    pub end: MinuteOfDay,
    pub period: Period,
}

impl TimeSlot {
    pub fn new(start: MinuteOfDay, end: MinuteOfDay, period: impl Into<Period>) -> Self {
        Self { start, end, period: period.into() }
    }

    #[must_use]
    pub fn wraps(&self) -> bool {
        self.start > self.end
    }

    #[must_use]
    pub fn contains(&self, minute: MinuteOfDay) -> bool {
        if self.wraps() {
            (minute >= self.start) || (minute < self.end)
        } else {
            (self.start <= minute) && (minute < self.end)
        }
    }

    fn validate(&self) -> Result {
        if self.start == self.end {
            return Err(TariffError::configuration(format!(
                "slot {}–{} is empty",
                self.start, self.end
            )));
        }
        if self.start == MinuteOfDay::END_OF_DAY {
            return Err(TariffError::configuration("a slot cannot start at 24:00"));
        }
        Ok(())
    }
}

/// Ordered slots for one `(season, day type)`, with a fallback period for uncovered minutes.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDaySchedule")]
pub struct DaySchedule {
    slots: Vec<TimeSlot>,
    default_period: Period,

    /// Overlapping slots are allowed and resolved by declaration order.
    priority_ordered: bool,
}

#[derive(Deserialize)]
struct RawDaySchedule {
    #[serde(default)]
    slots: Vec<TimeSlot>,
    default_period: Period,
    #[serde(default)]
    priority_ordered: bool,
}

impl TryFrom<RawDaySchedule> for DaySchedule {
    type Error = TariffError;

    fn try_from(raw: RawDaySchedule) -> Result<Self> {
        let schedule =
            Self { slots: raw.slots, default_period: raw.default_period, priority_ordered: raw.priority_ordered };
        schedule.validate()?;
        Ok(schedule)
    }
}

impl DaySchedule {
    pub fn new(slots: Vec<TimeSlot>, default_period: impl Into<Period>) -> Result<Self> {
        let schedule = Self { slots, default_period: default_period.into(), priority_ordered: false };
        schedule.validate()?;
        Ok(schedule)
    }

    /// Schedule in which earlier slots take precedence over later overlapping ones.
    pub fn priority_ordered(slots: Vec<TimeSlot>, default_period: impl Into<Period>) -> Result<Self> {
        let schedule = Self { slots, default_period: default_period.into(), priority_ordered: true };
        schedule.validate()?;
        Ok(schedule)
    }

    /// The whole day in one period.
    pub fn uniform(period: impl Into<Period>) -> Self {
        Self { slots: Vec::new(), default_period: period.into(), priority_ordered: false }
    }

    #[must_use]
    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    #[must_use]
    pub const fn default_period(&self) -> &Period {
        &self.default_period
    }

    /// Every period the schedule can yield, slot periods first.
    pub fn periods(&self) -> impl Iterator<Item = &Period> {
        self.slots.iter().map(|slot| &slot.period).chain([&self.default_period])
    }

    #[must_use]
    pub fn period_at(&self, time: NaiveTime) -> &Period {
        self.period_at_minute(MinuteOfDay::of(time))
    }

    /// The first slot containing the minute wins.
    #[must_use]
    pub fn period_at_minute(&self, minute: MinuteOfDay) -> &Period {
        self.slots
            .iter()
            .find(|slot| slot.contains(minute))
            .map_or(&self.default_period, |slot| &slot.period)
    }

    /// Reject empty slots, and overlapping slots unless the schedule is priority-ordered.
    pub fn validate(&self) -> Result {
        for slot in &self.slots {
            slot.validate()?;
        }
        if self.priority_ordered {
            return Ok(());
        }
        let mut owners: [Option<usize>; 1440] = [None; 1440];
        for (index, slot) in self.slots.iter().enumerate() {
            for minute in 0..MinuteOfDay::END_OF_DAY.0 {
                if !slot.contains(MinuteOfDay(minute)) {
                    continue;
                }
                let owner = &mut owners[usize::from(minute)];
                if let Some(other) = owner {
                    let other = &self.slots[*other];
                    return Err(TariffError::configuration(format!(
                        "slots {}–{} and {}–{} overlap at {}",
                        other.start,
                        other.end,
                        slot.start,
                        slot.end,
                        MinuteOfDay(minute),
                    )));
                }
                *owner = Some(index);
            }
        }
        Ok(())
    }
}
