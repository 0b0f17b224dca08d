use crate::config::DashboardConfig;
use crate::query::QueryCache;
use crate::temporal::TemporalController;
use chrono::NaiveDate;
use crossterm::event::KeyEvent;
use ratatui::prelude::*;

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone)]
pub struct ShortcutInfo {
  pub key: &'static str,
  pub label: &'static str,
  pub priority: u8, // Lower = shown first
}

impl ShortcutInfo {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// What a view gets to work with while it is active
pub struct ViewContext<'a> {
  pub cache: &'a mut QueryCache,
  pub temporal: &'a TemporalController,
  pub config: &'a DashboardConfig,
  pub today: NaiveDate,
}

/// Trait for a dashboard screen
///
/// Views declare their queries in `tick()` from the current selection and
/// render purely from what the cache holds. They never talk to the network
/// themselves.
pub trait View {
  /// Tab label
  fn title(&self) -> &'static str;

  /// Declare queries for the current selection. Called on every tick while
  /// the view is on screen, right after the cache applied new responses.
  fn tick(&mut self, ctx: &mut ViewContext<'_>);

  /// Handle a key event. Returns `true` if the view consumed it.
  fn handle_key(&mut self, key: KeyEvent, ctx: &mut ViewContext<'_>) -> bool;

  /// Render the view to the frame
  fn render(&mut self, frame: &mut Frame, area: Rect, cache: &QueryCache);

  /// Refetch everything this view shows
  fn refetch(&mut self, cache: &mut QueryCache);

  /// Drop subscriptions when the view leaves the screen
  fn suspend(&mut self);

  /// Get keyboard shortcuts to display in the header
  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![ShortcutInfo::new("r", "refetch").with_priority(10)]
  }
}
