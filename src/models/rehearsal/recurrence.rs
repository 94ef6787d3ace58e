use async_graphql::{Enum, InputObject, SimpleObject};
use serde::{Deserialize, Serialize};
use time::{Date, Duration, Month, OffsetDateTime};

use crate::error::{CadenceError, CadenceResult};
use crate::models::DateTime;

/// The largest series a single pattern may expand to.
pub const MAX_OCCURRENCES: usize = 366;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Enum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

impl Default for Frequency {
    fn default() -> Self {
        Frequency::Weekly
    }
}

/// How a recurring rehearsal repeats.
#[derive(Clone, Debug, PartialEq, SimpleObject, InputObject, Serialize, Deserialize)]
#[graphql(input_name = "RecurringPatternInput")]
#[serde(rename_all = "camelCase")]
pub struct RecurringPattern {
    /// How often the rehearsal repeats
    #[serde(default)]
    pub frequency: Frequency,
    /// How many periods pass between repetitions
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// The weekdays rehearsals fall on (0 is Sunday) for weekly patterns
    #[serde(default)]
    pub days_of_week: Vec<u8>,
    /// No occurrence starts after this time
    pub end_date: Option<DateTime>,
    /// At most this many occurrences are produced
    pub count: Option<u32>,
}

fn default_interval() -> u32 {
    1
}

/// One concrete rehearsal in a series.
#[derive(Clone, Copy, Debug, PartialEq, Eq, SimpleObject)]
pub struct Occurrence {
    pub start_time: DateTime,
    pub end_time: DateTime,
}

impl RecurringPattern {
    /// Expands the pattern into the concrete series that starts with the
    /// given rehearsal times. Every occurrence keeps the template's duration.
    pub fn occurrences(&self, start: DateTime, end: DateTime) -> CadenceResult<Vec<Occurrence>> {
        if self.end_date.is_none() && self.count.is_none() {
            return Err(CadenceError::InvalidPattern(
                "a recurring rehearsal needs an end date or an occurrence count".to_owned(),
            ));
        }

        let duration = end.0 - start.0;
        let end_date = self.end_date;
        let limit = self
            .count
            .map(|count| count as usize)
            .unwrap_or(usize::MAX)
            .min(MAX_OCCURRENCES + 1);

        let occurrences: Vec<Occurrence> = self
            .candidate_starts(start.0)?
            .take_while(|candidate| end_date.map_or(true, |end_date| *candidate <= end_date.0))
            .take(limit)
            .map(|candidate| Occurrence {
                start_time: DateTime(candidate),
                end_time: DateTime(candidate + duration),
            })
            .collect();

        if occurrences.is_empty() {
            Err(CadenceError::InvalidPattern(
                "the pattern would produce no rehearsals".to_owned(),
            ))
        } else if occurrences.len() > MAX_OCCURRENCES {
            Err(CadenceError::InvalidPattern(format!(
                "the pattern would produce more than {} rehearsals",
                MAX_OCCURRENCES
            )))
        } else {
            Ok(occurrences)
        }
    }

    /// Every start time the pattern allows, in order, without termination.
    fn candidate_starts(
        &self,
        start: OffsetDateTime,
    ) -> CadenceResult<Box<dyn Iterator<Item = OffsetDateTime>>> {
        if self.interval < 1 {
            return Err(CadenceError::InvalidPattern(
                "the interval must be at least 1".to_owned(),
            ));
        }
        let interval = self.interval as i64;

        let candidates: Box<dyn Iterator<Item = OffsetDateTime>> = match self.frequency {
            Frequency::Daily => Box::new(
                (0..).map_while(move |step: i64| start.checked_add(Duration::days(step * interval))),
            ),
            Frequency::Weekly => Box::new(weekday_starts(start, self.weekdays()?, 7 * interval)),
            Frequency::Biweekly => Box::new(weekday_starts(start, self.weekdays()?, 14 * interval)),
            Frequency::Monthly => Box::new(
                (0..)
                    .map_while(move |step: i64| shift_months(start.date(), step * interval))
                    .flatten()
                    .map(move |date| start.replace_date(date)),
            ),
        };

        Ok(candidates)
    }

    /// The selected weekdays, sorted and without duplicates.
    fn weekdays(&self) -> CadenceResult<Vec<i64>> {
        if self.days_of_week.is_empty() {
            return Err(CadenceError::InvalidPattern(
                "weekly patterns need at least one day of the week".to_owned(),
            ));
        }
        if let Some(day) = self.days_of_week.iter().find(|day| **day > 6) {
            return Err(CadenceError::InvalidPattern(format!(
                "{} is not a day of the week (0-6)",
                day
            )));
        }

        let mut days: Vec<i64> = self.days_of_week.iter().map(|day| *day as i64).collect();
        days.sort_unstable();
        days.dedup();

        Ok(days)
    }
}

/// Start times on the given weekdays, in periods of `period_days` anchored
/// on the Sunday of the week containing `start`.
fn weekday_starts(
    start: OffsetDateTime,
    days: Vec<i64>,
    period_days: i64,
) -> impl Iterator<Item = OffsetDateTime> {
    let sunday = start.date() - Duration::days(start.weekday().number_days_from_sunday() as i64);

    (0..)
        .map_while(move |period: i64| sunday.checked_add(Duration::days(period * period_days)))
        .flat_map(move |period_start| {
            days.clone()
                .into_iter()
                .filter_map(move |day| period_start.checked_add(Duration::days(day)))
        })
        .map(move |date| start.replace_date(date))
        .skip_while(move |candidate| *candidate < start)
}

/// The same day of the month `months` later. The outer `None` means the
/// calendar ran out; the inner one means that month lacks the day.
fn shift_months(date: Date, months: i64) -> Option<Option<Date>> {
    let month_index = date.year() as i64 * 12 + (u8::from(date.month()) as i64 - 1) + months;
    let year = i32::try_from(month_index.div_euclid(12)).ok()?;
    if year > Date::MAX.year() {
        return None;
    }
    let month = Month::try_from((month_index.rem_euclid(12) + 1) as u8).ok()?;

    Some(Date::from_calendar_date(year, month, date.day()).ok())
}
