//! Day buckets for month, week and day views.
//!
//! Everything here is a pure function of its inputs. A month always renders as 42 cells, six
//! Sunday-started weeks, so the view never changes height between months.
//!
//! # Example
//!
//! ```
//! # use taskwatch::calendar::CalendarGridBuilder;
//! # use chrono::NaiveDate;
//! let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
//! let grid = CalendarGridBuilder::default().build(&[], 2, 2026, today).unwrap();
//!
//! assert_eq!(grid.cells.len(), 42);
//! // February 2026 starts on a Sunday, so there is no leading padding.
//! assert_eq!(grid.cells[0].date, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
//! assert_eq!(grid.cells.iter().filter(|cell| cell.is_current_month).count(), 28);
//! ```
use std::collections::BTreeMap;

use chrono::{Datelike, FixedOffset, NaiveDate, Offset, TimeDelta, Utc};
use thiserror::Error;

use crate::event::ScheduledEvent;

pub const GRID_CELLS: usize = 42;
const WEEK_DAYS: i64 = 7;

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum CalendarError {
    #[error("Invalid month {month} of year {year}")]
    InvalidMonth { month: u32, year: i32 },
    #[error("Date out of the supported range")]
    OutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarDayCell {
    pub date: NaiveDate,
    pub day_number: u32,
    pub is_current_month: bool,
    pub is_today: bool,
    /// Ordered by start time, then id.
    pub events: Vec<ScheduledEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarGrid {
    pub year: i32,
    pub month: u32,
    pub cells: Vec<CalendarDayCell>,
}

impl CalendarGrid {
    /// The grid as six rows of seven days.
    pub fn weeks(&self) -> impl Iterator<Item = &[CalendarDayCell]> {
        self.cells.chunks(WEEK_DAYS as usize)
    }
}

/// Buckets events by the calendar date of their start time in a display offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarGridBuilder {
    offset: FixedOffset,
}

impl Default for CalendarGridBuilder {
    fn default() -> Self {
        Self { offset: Utc.fix() }
    }
}

impl CalendarGridBuilder {
    pub fn with_offset(self, offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// The 42-cell month view of `month` (1 to 12) of `year`.
    ///
    /// Leading cells come from the end of the previous month and trailing cells from the start
    /// of the next one; both are marked as outside the current month and carry no events.
    pub fn build(
        &self,
        events: &[ScheduledEvent],
        month: u32,
        year: i32,
        today: NaiveDate,
    ) -> Result<CalendarGrid, CalendarError> {
        let first =
            NaiveDate::from_ymd_opt(year, month, 1).ok_or(CalendarError::InvalidMonth { month, year })?;
        let leading = i64::from(first.weekday().num_days_from_sunday());
        let start = first
            .checked_sub_signed(TimeDelta::days(leading))
            .ok_or(CalendarError::OutOfRange)?;

        let mut buckets = self.events_by_date(events, year, month);
        let cells = (0..GRID_CELLS as i64)
            .map(|offset| {
                let date = add_days(start, offset)?;
                let is_current_month = date.month() == month && date.year() == year;
                let events = if is_current_month {
                    buckets.remove(&date).unwrap_or_default()
                } else {
                    Vec::new()
                };
                Ok(CalendarDayCell {
                    date,
                    day_number: date.day(),
                    is_current_month,
                    is_today: date == today,
                    events,
                })
            })
            .collect::<Result<Vec<_>, CalendarError>>()?;

        Ok(CalendarGrid { year, month, cells })
    }

    /// The seven days of the Sunday-started week containing `date`.
    ///
    /// Every day carries its events; `is_current_month` refers to the month of `date`.
    pub fn week(
        &self,
        events: &[ScheduledEvent],
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Vec<CalendarDayCell>, CalendarError> {
        let start = add_days(date, -i64::from(date.weekday().num_days_from_sunday()))?;
        let mut buckets = self.bucket(events, |_| true);
        (0..WEEK_DAYS)
            .map(|offset| {
                let day = add_days(start, offset)?;
                Ok(CalendarDayCell {
                    date: day,
                    day_number: day.day(),
                    is_current_month: day.month() == date.month() && day.year() == date.year(),
                    is_today: day == today,
                    events: buckets.remove(&day).unwrap_or_default(),
                })
            })
            .collect()
    }

    /// The events of a single day, ordered by start time.
    pub fn day(&self, events: &[ScheduledEvent], date: NaiveDate) -> Vec<ScheduledEvent> {
        self.bucket(events, |day| day == date)
            .remove(&date)
            .unwrap_or_default()
    }

    /// The events of a month grouped by date. Days without events are absent.
    pub fn events_by_date(
        &self,
        events: &[ScheduledEvent],
        year: i32,
        month: u32,
    ) -> BTreeMap<NaiveDate, Vec<ScheduledEvent>> {
        self.bucket(events, |day| day.year() == year && day.month() == month)
    }

    fn local_date(&self, event: &ScheduledEvent) -> NaiveDate {
        event.start_time.with_timezone(&self.offset).date_naive()
    }

    fn bucket(
        &self,
        events: &[ScheduledEvent],
        keep: impl Fn(NaiveDate) -> bool,
    ) -> BTreeMap<NaiveDate, Vec<ScheduledEvent>> {
        let mut buckets: BTreeMap<NaiveDate, Vec<ScheduledEvent>> = BTreeMap::new();
        for event in events {
            let date = self.local_date(event);
            if keep(date) {
                buckets.entry(date).or_default().push(event.clone());
            }
        }
        for bucket in buckets.values_mut() {
            bucket.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        }
        buckets
    }
}

fn add_days(date: NaiveDate, days: i64) -> Result<NaiveDate, CalendarError> {
    date.checked_add_signed(TimeDelta::days(days))
        .ok_or(CalendarError::OutOfRange)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Weekday};

    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn every_month_has_42_aligned_cells() {
        let builder = CalendarGridBuilder::default();
        let today = date(2026, 10, 18);

        for year in [1999, 2000, 2023, 2024, 2026, 2100] {
            for month in 1..=12 {
                let grid = builder.build(&[], month, year, today).unwrap();
                let first = date(year, month, 1);

                assert_eq!(grid.cells.len(), GRID_CELLS);
                assert_eq!(grid.cells[0].date.weekday(), Weekday::Sun);
                let leading = first.weekday().num_days_from_sunday() as usize;
                assert_eq!(grid.cells[leading].date, first);
                assert!(grid.cells[leading].is_current_month);
                assert!(grid.cells[..leading].iter().all(|cell| !cell.is_current_month));
                for pair in grid.cells.windows(2) {
                    assert_eq!(pair[1].date, pair[0].date.succ_opt().unwrap());
                }
                assert!(!grid.cells[GRID_CELLS - 1].is_current_month);
            }
        }
    }

    #[test]
    fn february_lengths() {
        let builder = CalendarGridBuilder::default();
        let today = date(2026, 1, 1);
        let count = |year| {
            builder
                .build(&[], 2, year, today)
                .unwrap()
                .cells
                .iter()
                .filter(|cell| cell.is_current_month)
                .count()
        };

        assert_eq!(count(2024), 29);
        assert_eq!(count(2023), 28);
        assert_eq!(count(1900), 28);
        assert_eq!(count(2000), 29);
    }

    #[test]
    fn invalid_month() {
        let builder = CalendarGridBuilder::default();
        let today = date(2026, 1, 1);
        assert_eq!(
            builder.build(&[], 13, 2026, today),
            Err(CalendarError::InvalidMonth { month: 13, year: 2026 })
        );
        assert!(builder.build(&[], 0, 2026, today).is_err());
    }

    #[test]
    fn events_land_in_their_day_sorted() {
        let events = vec![
            ScheduledEvent::raw_event("late", at(2026, 10, 18, 15)),
            ScheduledEvent::raw_event("b", at(2026, 10, 18, 9)),
            ScheduledEvent::raw_event("a", at(2026, 10, 18, 9)),
            ScheduledEvent::raw_event("other-month", at(2026, 11, 2, 9)),
        ];
        let grid = CalendarGridBuilder::default()
            .build(&events, 10, 2026, date(2026, 10, 18))
            .unwrap();

        let today = grid.cells.iter().find(|cell| cell.is_today).unwrap();
        assert_eq!(today.day_number, 18);
        let ids: Vec<_> = today.events.iter().map(|event| event.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "late"]);

        // November 2nd is shown as trailing padding, without events.
        let padding = grid.cells.iter().find(|cell| cell.date == date(2026, 11, 2)).unwrap();
        assert!(!padding.is_current_month);
        assert!(padding.events.is_empty());
        assert_eq!(grid.cells.iter().map(|cell| cell.events.len()).sum::<usize>(), 3);
    }

    #[test]
    fn offset_moves_events_across_midnight() {
        let events = vec![ScheduledEvent::raw_event("e1", at(2026, 10, 18, 20))];
        let builder =
            CalendarGridBuilder::default().with_offset(FixedOffset::east_opt(8 * 3600).unwrap());

        assert!(builder.day(&events, date(2026, 10, 18)).is_empty());
        assert_eq!(builder.day(&events, date(2026, 10, 19)).len(), 1);
    }

    #[test]
    fn build_is_idempotent() {
        let events = vec![
            ScheduledEvent::raw_event("e1", at(2024, 2, 29, 10)),
            ScheduledEvent::raw_event("e2", at(2024, 2, 1, 10)),
        ];
        let builder = CalendarGridBuilder::default();
        let today = date(2024, 2, 29);

        let first = builder.build(&events, 2, 2024, today).unwrap();
        let mut reversed = events.clone();
        reversed.reverse();
        assert_eq!(first, builder.build(&events, 2, 2024, today).unwrap());
        assert_eq!(first, builder.build(&reversed, 2, 2024, today).unwrap());
        assert_eq!(first.weeks().count(), 6);
    }

    #[test]
    fn week_view() {
        let events = vec![
            ScheduledEvent::raw_event("sat", at(2026, 10, 31, 10)),
            ScheduledEvent::raw_event("sun", at(2026, 11, 1, 10)),
        ];
        let week = CalendarGridBuilder::default()
            .week(&events, date(2026, 10, 28), date(2026, 10, 28))
            .unwrap();

        assert_eq!(week.len(), 7);
        assert_eq!(week[0].date, date(2026, 10, 25));
        assert!(week[3].is_today);
        assert_eq!(week[6].events[0].id, "sat");
        assert!(week.iter().all(|cell| cell.is_current_month));
    }

    #[test]
    fn month_grouping() {
        let events = vec![
            ScheduledEvent::raw_event("e1", at(2026, 10, 1, 10)),
            ScheduledEvent::raw_event("e2", at(2026, 10, 1, 8)),
            ScheduledEvent::raw_event("e3", at(2026, 9, 30, 8)),
        ];
        let grouped = CalendarGridBuilder::default().events_by_date(&events, 2026, 10);

        assert_eq!(grouped.len(), 1);
        let ids: Vec<_> = grouped[&date(2026, 10, 1)]
            .iter()
            .map(|event| event.id.as_str())
            .collect();
        assert_eq!(ids, vec!["e2", "e1"]);
    }
}
