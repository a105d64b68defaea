//! The school's lesson calendar: local time zone, closed weekday and the grid
//! of bookable start times.

use chrono::{
  DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike,
  Utc, Weekday,
};
use serde::Deserialize;

use crate::{Error, Result};

/// Calendar rules applied to every booking request.
///
/// Defaults: UTC+2, closed on Sunday, 30-minute slots from 08:00 to 17:00
/// inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LessonSchedule {
  /// Offset of the school's local time from UTC, in minutes.
  pub utc_offset_minutes: i32,
  pub closed_day:         Weekday,
  /// First bookable start time.
  pub opens_at:           NaiveTime,
  /// Last bookable start time.
  pub last_start:         NaiveTime,
  pub slot_minutes:       u32,
}

impl Default for LessonSchedule {
  fn default() -> Self {
    Self {
      utc_offset_minutes: 120,
      closed_day:         Weekday::Sun,
      opens_at:           NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
      last_start:         NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
      slot_minutes:       30,
    }
  }
}

impl LessonSchedule {
  /// Reject configurations that cannot produce a grid.
  pub fn validate(&self) -> Result<()> {
    self.offset()?;
    if self.slot_minutes == 0 {
      return Err(Error::Validation("slot_minutes must be positive".into()));
    }
    if self.opens_at > self.last_start {
      return Err(Error::Validation("opens_at is after last_start".into()));
    }
    Ok(())
  }

  pub fn offset(&self) -> Result<FixedOffset> {
    FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
      Error::Validation(format!(
        "utc offset out of range: {} minutes",
        self.utc_offset_minutes
      ))
    })
  }

  /// Combine a local calendar date and time-of-day into an instant.
  pub fn resolve(&self, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>> {
    let local = self
      .offset()?
      .from_local_datetime(&date.and_time(time))
      .single()
      .ok_or_else(|| Error::Validation(format!("ambiguous local time {date} {time}")))?;
    Ok(local.with_timezone(&Utc))
  }

  pub fn is_closed(&self, date: NaiveDate) -> bool {
    date.weekday() == self.closed_day
  }

  /// Whether `time` is one of the grid's start times.
  pub fn is_on_grid(&self, time: NaiveTime) -> bool {
    if time < self.opens_at || time > self.last_start || time.nanosecond() != 0 {
      return false;
    }
    let since_open = (time - self.opens_at).num_seconds();
    since_open % (self.step_minutes() * 60) == 0
  }

  /// Slot length used for grid arithmetic. An unvalidated zero length is
  /// treated as one minute rather than dividing by zero.
  fn step_minutes(&self) -> i64 { i64::from(self.slot_minutes.max(1)) }

  /// Every start time of a day, in order.
  pub fn slots(&self) -> Vec<NaiveTime> {
    let step = chrono::Duration::minutes(self.step_minutes());
    let mut out = Vec::new();
    let mut t = self.opens_at;
    while t <= self.last_start {
      out.push(t);
      let (next, wrapped) = t.overflowing_add_signed(step);
      if wrapped != 0 {
        break;
      }
      t = next;
    }
    out
  }
}
