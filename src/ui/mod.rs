pub mod renderfns;
pub mod view;
pub mod views;

use crate::query::{QueryCache, QueryState};
use crate::temporal::TemporalController;
use ratatui::prelude::*;
use ratatui::widgets::{Block, ListState, Paragraph, Wrap};
use renderfns::{draw_footer, draw_header, draw_temporal_bar, truncate};
use view::{ShortcutInfo, View};

/// Shortcuts handled by the app regardless of the active view
const GLOBAL_SHORTCUTS: [ShortcutInfo; 4] = [
  ShortcutInfo::new("R", "refresh all").with_priority(20),
  ShortcutInfo::new("t", "time range").with_priority(30),
  ShortcutInfo::new("p", "play").with_priority(40),
  ShortcutInfo::new("q", "quit").with_priority(90),
];

/// Everything outside the active view that the frame shows
pub struct Screen<'a> {
  pub title: &'a str,
  pub tabs: &'a [&'static str],
  pub active: usize,
  pub temporal: &'a TemporalController,
  pub cache: &'a QueryCache,
  pub authenticated: bool,
}

/// Main draw function
pub fn draw(frame: &mut Frame, screen: &Screen<'_>, view: &mut dyn View) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Length(2), // Time range and playback
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Footer
    ])
    .split(frame.area());

  let mut shortcuts = view.shortcuts();
  shortcuts.extend(GLOBAL_SHORTCUTS);
  draw_header(
    frame,
    chunks[0],
    screen.title,
    screen.tabs,
    screen.active,
    &shortcuts,
  );
  draw_temporal_bar(frame, chunks[1], screen.temporal);

  view.render(frame, chunks[2], screen.cache);

  let breadcrumb = vec![
    view.title().to_string(),
    screen.temporal.range().label().to_string(),
  ];
  let stats = screen.cache.stats();
  let status = format!(
    "{} queries · {} fetching · {}",
    stats.entries,
    stats.fetching,
    if screen.authenticated {
      "signed in"
    } else {
      "anonymous"
    }
  );
  draw_footer(frame, chunks[3], &breadcrumb, &status);
}

/// Ensure the list selection is valid for the given length
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  if len == 0 {
    state.select(None);
  } else {
    match state.selected() {
      Some(i) if i >= len => state.select(Some(len - 1)),
      None => state.select(Some(0)),
      _ => {}
    }
  }
}

/// Panel title reflecting the query state
pub fn panel_title<T>(name: &str, state: &QueryState<'_, T>, refreshing: bool) -> String {
  match state {
    QueryState::Loading => format!(" {} (loading...) ", name),
    QueryState::Error(e) => format!(" {} (error: {}) ", name, truncate(e, 48)),
    _ if refreshing => format!(" {} (refreshing...) ", name),
    _ => format!(" {} ", name),
  }
}

/// Render the placeholder for a panel without data. Returns `false` when
/// there is data and the caller should draw it instead.
pub fn render_placeholder<T>(
  frame: &mut Frame,
  area: Rect,
  block: Block<'_>,
  state: &QueryState<'_, T>,
  idle_hint: &str,
) -> bool {
  let (content, color) = match state {
    QueryState::Success(_) => return false,
    QueryState::Loading => ("Loading...".to_string(), Color::DarkGray),
    QueryState::Error(e) => (format!("{}\n\nPress 'r' to retry.", e), Color::Red),
    QueryState::Idle => (idle_hint.to_string(), Color::DarkGray),
  };

  let paragraph = Paragraph::new(content)
    .block(block)
    .wrap(Wrap { trim: true })
    .style(Style::default().fg(color));
  frame.render_widget(paragraph, area);
  true
}
