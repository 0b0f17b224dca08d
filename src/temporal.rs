//! Time-range selection and playback.
//!
//! The controller owns no data. It turns the current selection into request
//! params for the views and tells the app when playback wants a refresh.

use crate::query::Params;
use chrono::{Days, NaiveDate};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Days covered by a freshly selected custom range
const DEFAULT_CUSTOM_DAYS: u64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum TimeRange {
  #[default]
  Realtime,
  LastHour,
  Today,
  LastWeek,
  LastMonth,
  Custom,
}

impl TimeRange {
  pub const ALL: [TimeRange; 6] = [
    TimeRange::Realtime,
    TimeRange::LastHour,
    TimeRange::Today,
    TimeRange::LastWeek,
    TimeRange::LastMonth,
    TimeRange::Custom,
  ];

  /// Value of the `timeRange` query parameter
  pub fn as_param(self) -> &'static str {
    match self {
      TimeRange::Realtime => "realtime",
      TimeRange::LastHour => "last_hour",
      TimeRange::Today => "today",
      TimeRange::LastWeek => "last_week",
      TimeRange::LastMonth => "last_month",
      TimeRange::Custom => "custom",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      TimeRange::Realtime => "Real-time",
      TimeRange::LastHour => "Last Hour",
      TimeRange::Today => "Today",
      TimeRange::LastWeek => "Last Week",
      TimeRange::LastMonth => "Last Month",
      TimeRange::Custom => "Custom Range",
    }
  }

  /// Short description shown next to the selector
  pub fn hint(self) -> &'static str {
    match self {
      TimeRange::Realtime => "Live data updates",
      TimeRange::LastHour => "Past 60 minutes",
      TimeRange::Today => "Since midnight",
      TimeRange::LastWeek => "Past 7 days",
      TimeRange::LastMonth => "Past 30 days",
      TimeRange::Custom => "Selected dates",
    }
  }

  pub fn next(self) -> Self {
    let i = Self::ALL.iter().position(|r| *r == self).unwrap_or(0);
    Self::ALL[(i + 1) % Self::ALL.len()]
  }

  pub fn prev(self) -> Self {
    let i = Self::ALL.iter().position(|r| *r == self).unwrap_or(0);
    Self::ALL[(i + Self::ALL.len() - 1) % Self::ALL.len()]
  }
}

/// Playback speed. Higher multipliers step more slowly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackSpeed {
  Half,
  #[default]
  One,
  Two,
  Five,
}

impl PlaybackSpeed {
  const ALL: [PlaybackSpeed; 4] = [
    PlaybackSpeed::Half,
    PlaybackSpeed::One,
    PlaybackSpeed::Two,
    PlaybackSpeed::Five,
  ];

  pub fn multiplier(self) -> f64 {
    match self {
      PlaybackSpeed::Half => 0.5,
      PlaybackSpeed::One => 1.0,
      PlaybackSpeed::Two => 2.0,
      PlaybackSpeed::Five => 5.0,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      PlaybackSpeed::Half => "0.5x",
      PlaybackSpeed::One => "1x",
      PlaybackSpeed::Two => "2x",
      PlaybackSpeed::Five => "5x",
    }
  }

  pub fn faster(self) -> Self {
    let i = Self::ALL.iter().position(|s| *s == self).unwrap_or(1);
    Self::ALL[(i + 1).min(Self::ALL.len() - 1)]
  }

  pub fn slower(self) -> Self {
    let i = Self::ALL.iter().position(|s| *s == self).unwrap_or(1);
    Self::ALL[i.saturating_sub(1)]
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Playback {
  #[default]
  Stopped,
  Playing,
}

/// Inclusive date range used by `TimeRange::Custom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomRange {
  pub start: NaiveDate,
  pub end: NaiveDate,
}

impl CustomRange {
  /// The week leading up to `today`.
  pub fn ending(today: NaiveDate) -> Self {
    let start = today
      .checked_sub_days(Days::new(DEFAULT_CUSTOM_DAYS))
      .unwrap_or(today);
    Self { start, end: today }
  }

  pub fn start_param(&self) -> String {
    self.start.format(DATE_FORMAT).to_string()
  }

  pub fn end_param(&self) -> String {
    self.end.format(DATE_FORMAT).to_string()
  }
}

#[derive(Debug, Clone)]
pub struct TemporalController {
  range: TimeRange,
  custom: CustomRange,
  playback: Playback,
  speed: PlaybackSpeed,
  base: Duration,
  last_step: Option<Instant>,
}

impl TemporalController {
  pub fn new(range: TimeRange, base: Duration, today: NaiveDate) -> Self {
    Self {
      range,
      custom: CustomRange::ending(today),
      playback: Playback::Stopped,
      speed: PlaybackSpeed::One,
      base,
      last_step: None,
    }
  }

  pub fn range(&self) -> TimeRange {
    self.range
  }

  pub fn custom(&self) -> CustomRange {
    self.custom
  }

  pub fn is_playing(&self) -> bool {
    self.playback == Playback::Playing
  }

  pub fn speed(&self) -> PlaybackSpeed {
    self.speed
  }

  /// Select a range. Picking `Custom` resets the dates to the week before
  /// `today`. Returns whether the selection changed.
  pub fn select(&mut self, range: TimeRange, today: NaiveDate) -> bool {
    if range == self.range {
      return false;
    }
    self.range = range;
    if range == TimeRange::Custom {
      self.custom = CustomRange::ending(today);
    }
    true
  }

  pub fn cycle_next(&mut self, today: NaiveDate) {
    self.select(self.range.next(), today);
  }

  pub fn cycle_prev(&mut self, today: NaiveDate) {
    self.select(self.range.prev(), today);
  }

  /// Move the custom start by `days`, never past the end.
  pub fn shift_custom_start(&mut self, days: i64) -> bool {
    match shift(self.custom.start, days) {
      Some(start) if start <= self.custom.end && start != self.custom.start => {
        self.custom.start = start;
        true
      }
      _ => false,
    }
  }

  /// Move the custom end by `days`, never before the start.
  pub fn shift_custom_end(&mut self, days: i64) -> bool {
    match shift(self.custom.end, days) {
      Some(end) if end >= self.custom.start && end != self.custom.end => {
        self.custom.end = end;
        true
      }
      _ => false,
    }
  }

  pub fn toggle_playback(&mut self, now: Instant) -> Playback {
    self.playback = match self.playback {
      Playback::Stopped => {
        self.last_step = Some(now);
        Playback::Playing
      }
      Playback::Playing => {
        self.last_step = None;
        Playback::Stopped
      }
    };
    self.playback
  }

  pub fn faster(&mut self) {
    self.speed = self.speed.faster();
  }

  pub fn slower(&mut self) {
    self.speed = self.speed.slower();
  }

  /// Refresh cadence while playing; `None` when stopped.
  pub fn playback_interval(&self) -> Option<Duration> {
    match self.playback {
      Playback::Playing => Some(self.base.mul_f64(self.speed.multiplier())),
      Playback::Stopped => None,
    }
  }

  /// Whether a playback step is due. Advances the step clock when it is.
  pub fn poll_playback(&mut self, now: Instant) -> bool {
    let Some(interval) = self.playback_interval() else {
      return false;
    };
    match self.last_step {
      Some(last) if now.duration_since(last) < interval => false,
      _ => {
        self.last_step = Some(now);
        true
      }
    }
  }

  /// `timeRange`, plus `from`/`date` bounds for a custom range.
  pub fn range_params(&self) -> Params {
    let mut params = Params::new();
    params.insert("timeRange".to_string(), self.range.as_param().into());
    if self.range == TimeRange::Custom {
      params.insert("from".to_string(), self.custom.start_param().into());
      params.insert("date".to_string(), self.custom.end_param().into());
    }
    params
  }

  /// Range params that always carry a reference `date`.
  pub fn dated_params(&self, today: NaiveDate) -> Params {
    let mut params = self.range_params();
    params
      .entry("date".to_string())
      .or_insert_with(|| today.format(DATE_FORMAT).to_string().into());
    params
  }
}

fn shift(date: NaiveDate, days: i64) -> Option<NaiveDate> {
  let magnitude = Days::new(days.unsigned_abs());
  if days >= 0 {
    date.checked_add_days(magnitude)
  } else {
    date.checked_sub_days(magnitude)
  }
}
