use crate::api::types::{AlertFeed, DashboardStats, DASHBOARD_ALERTS, DASHBOARD_STATS};
use crate::query::{Query, QueryCache, QueryState, RequestDescriptor};
use crate::temporal::TimeRange;
use crate::ui::renderfns::{format_count, status_color, truncate};
use crate::ui::view::{View, ViewContext};
use crate::ui::{panel_title, render_placeholder};
use chrono::{DateTime, Local};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{BarChart, Block, Borders, Gauge, List, ListItem, Paragraph};
use tokio::time::Instant;

/// Real-time statistics and system alerts
pub struct StatsView {
  stats: Query<DashboardStats>,
  alerts: Query<AlertFeed>,
  /// Whether the stats query may run for the current time range
  live: bool,
  last_updated: Option<DateTime<Local>>,
  seen_fetch: Option<Instant>,
}

impl StatsView {
  pub fn new() -> Self {
    Self {
      stats: Query::new(),
      alerts: Query::new(),
      live: true,
      last_updated: None,
      seen_fetch: None,
    }
  }

  /// Stats are only served live, so the query is off for other ranges.
  pub fn stats_request(ctx: &ViewContext<'_>) -> RequestDescriptor {
    RequestDescriptor::new(DASHBOARD_STATS)
      .poll_every(Some(ctx.config.stats_poll_interval()))
      .enabled(ctx.temporal.range() == TimeRange::Realtime)
  }

  pub fn alerts_request(ctx: &ViewContext<'_>) -> RequestDescriptor {
    RequestDescriptor::new(DASHBOARD_ALERTS).poll_every(Some(ctx.config.alerts_poll_interval()))
  }

  fn render_cards(&self, frame: &mut Frame, area: Rect, stats: &DashboardStats) {
    let cards = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Ratio(1, 4); 4])
      .split(area);

    let values = [
      ("Active Routes", stats.active_routes.to_string(), "Transit lines running", Color::Blue),
      (
        "Total Passengers",
        format_count(stats.total_passengers),
        "Today",
        Color::Green,
      ),
      (
        "Busy Stations",
        stats.busy_stations.to_string(),
        "High occupancy",
        Color::Yellow,
      ),
      (
        "Busy Attractions",
        stats.busy_attractions.to_string(),
        "Popular right now",
        Color::Magenta,
      ),
    ];

    for ((title, value, subtitle, color), area) in values.into_iter().zip(cards.iter()) {
      let text = vec![
        Line::from(Span::styled(value, Style::default().fg(color).bold())),
        Line::from(Span::styled(subtitle, Style::default().fg(Color::DarkGray))),
      ];
      let card = Paragraph::new(text).alignment(Alignment::Center).block(
        Block::default()
          .title(format!(" {} ", title))
          .borders(Borders::ALL)
          .border_style(Style::default().fg(color)),
      );
      frame.render_widget(card, *area);
    }
  }

  fn render_performance(&self, frame: &mut Frame, area: Rect, stats: &DashboardStats) {
    let block = Block::default()
      .title(" Performance ")
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(2),
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(0),
      ])
      .split(inner);

    let gauges = [
      ("System Efficiency", stats.efficiency_rate, Color::Green),
      ("On-time Performance", stats.on_time_percentage, Color::Cyan),
    ];
    for ((label, value, color), area) in gauges.into_iter().zip(rows.iter()) {
      let gauge = Gauge::default()
        .block(Block::default().title(label))
        .gauge_style(Style::default().fg(color))
        .percent(percent(value))
        .label(format!("{:.1}%", value));
      frame.render_widget(gauge, *area);
    }

    let delay_color = if stats.avg_delay > 5.0 {
      Color::Red
    } else if stats.avg_delay > 2.0 {
      Color::Yellow
    } else {
      Color::Green
    };
    let delay = Paragraph::new(Line::from(vec![
      Span::styled("Average Delay ", Style::default().fg(Color::DarkGray)),
      Span::styled(
        format!("{:.1} min", stats.avg_delay),
        Style::default().fg(delay_color).bold(),
      ),
    ]));
    frame.render_widget(delay, rows[2]);
  }

  fn render_distribution(&self, frame: &mut Frame, area: Rect, stats: &DashboardStats) {
    let labels: Vec<String> = stats
      .transit_distribution
      .keys()
      .map(|k| k.to_uppercase())
      .collect();
    let bars: Vec<(&str, u64)> = labels
      .iter()
      .map(String::as_str)
      .zip(stats.transit_distribution.values().map(|v| v.max(0.0).round() as u64))
      .collect();

    let chart = BarChart::default()
      .block(
        Block::default()
          .title(" Transit Distribution (%) ")
          .borders(Borders::ALL)
          .border_style(Style::default().fg(Color::Blue)),
      )
      .data(bars.as_slice())
      .bar_width(6)
      .bar_gap(2)
      .bar_style(Style::default().fg(Color::Cyan))
      .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));

    frame.render_widget(chart, area);
  }

  fn render_alerts(&self, frame: &mut Frame, area: Rect, cache: &QueryCache) {
    let state = self.alerts.state(cache);
    let title = panel_title("Alerts", &state, self.alerts.is_fetching(cache));
    let block = Block::default()
      .title(title)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if render_placeholder(frame, area, block.clone(), &state, "No alerts.") {
      return;
    }
    let Some(feed) = state.data() else {
      return;
    };
    if feed.alerts.is_empty() {
      let empty = Paragraph::new("No active alerts.")
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(empty, area);
      return;
    }

    let items: Vec<ListItem> = feed
      .alerts
      .iter()
      .map(|alert| {
        let mut spans = vec![
          Span::styled(
            format!("{:<9}", truncate(&alert.severity, 9)),
            Style::default().fg(status_color(&alert.severity)).bold(),
          ),
          Span::styled(
            format!("{} ", truncate(&alert.title, 40)),
            Style::default().fg(Color::White),
          ),
          Span::styled(
            format!("[{}] ", truncate(&alert.location, 30)),
            Style::default().fg(Color::Cyan),
          ),
          Span::styled(
            truncate(&alert.message, 70),
            Style::default().fg(Color::DarkGray),
          ),
        ];
        if let Some(duration) = &alert.estimated_duration {
          spans.push(Span::styled(
            format!(" ({})", duration),
            Style::default().fg(Color::DarkGray),
          ));
        }
        ListItem::new(Line::from(spans))
      })
      .collect();

    let list = List::new(items).block(block.title_bottom(format!(" {} active ", feed.count)));
    frame.render_widget(list, area);
  }
}

impl View for StatsView {
  fn title(&self) -> &'static str {
    "Dashboard"
  }

  fn tick(&mut self, ctx: &mut ViewContext<'_>) {
    let stats = Self::stats_request(ctx);
    self.live = stats.enabled;
    self.stats.declare(ctx.cache, stats);
    self.alerts.declare(ctx.cache, Self::alerts_request(ctx));

    let fetched = self.stats.fetched_at(ctx.cache);
    if fetched.is_some() && fetched != self.seen_fetch {
      self.seen_fetch = fetched;
      self.last_updated = Some(Local::now());
    }
  }

  fn handle_key(&mut self, key: KeyEvent, ctx: &mut ViewContext<'_>) -> bool {
    match key.code {
      KeyCode::Char('r') => {
        self.refetch(ctx.cache);
        true
      }
      _ => false,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, cache: &QueryCache) {
    let rows = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(4),
        Constraint::Min(8),
        Constraint::Percentage(35),
      ])
      .split(area);

    let state = self.stats.state(cache);
    let mut title = panel_title("Real-time Statistics", &state, self.stats.is_fetching(cache));
    if !self.live {
      title.push_str("(paused outside Real-time) ");
    }
    let updated = match self.last_updated {
      Some(at) => format!(" Last updated: {} ", at.format("%H:%M:%S")),
      None => String::new(),
    };
    let block = Block::default()
      .title(title)
      .title_bottom(updated)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let top = rows[0].union(rows[1]);
    let hint = "Real-time statistics are only available in Real-time mode. Press 't' to change the time range.";
    match state {
      QueryState::Success(stats) => {
        let inner = block.inner(top);
        frame.render_widget(block, top);
        let parts = Layout::default()
          .direction(Direction::Vertical)
          .constraints([Constraint::Length(4), Constraint::Min(0)])
          .split(inner);
        let middle = Layout::default()
          .direction(Direction::Horizontal)
          .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
          .split(parts[1]);

        self.render_cards(frame, parts[0], stats);
        self.render_performance(frame, middle[0], stats);
        self.render_distribution(frame, middle[1], stats);
      }
      other => {
        render_placeholder(frame, top, block, &other, hint);
      }
    }

    self.render_alerts(frame, rows[2], cache);
  }

  fn refetch(&mut self, cache: &mut QueryCache) {
    self.stats.refetch(cache);
    self.alerts.refetch(cache);
    if self.live {
      self.last_updated = Some(Local::now());
    }
  }

  fn suspend(&mut self) {
    self.stats.release();
    self.alerts.release();
    self.seen_fetch = None;
  }
}

/// Clamp a percentage value for a gauge
fn percent(value: f64) -> u16 {
  value.clamp(0.0, 100.0).round() as u16
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::ApiError;
  use crate::config::DashboardConfig;
  use crate::query::{CacheOptions, Fetcher, Params};
  use crate::temporal::TemporalController;
  use chrono::NaiveDate;
  use futures::future::BoxFuture;
  use futures::FutureExt;
  use serde_json::{json, Value};
  use std::collections::HashMap;
  use std::sync::{Arc, Mutex};
  use std::time::Duration;

  #[derive(Default)]
  struct CountingFetcher {
    calls: Mutex<HashMap<String, usize>>,
  }

  impl CountingFetcher {
    fn calls(&self, endpoint: &str) -> usize {
      self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }
  }

  impl Fetcher for CountingFetcher {
    fn fetch(&self, endpoint: &str, _params: &Params) -> BoxFuture<'static, Result<Value, ApiError>> {
      *self.calls.lock().unwrap().entry(endpoint.to_string()).or_default() += 1;
      let body = match endpoint {
        DASHBOARD_STATS => json!({ "active_routes": 24, "total_passengers": 125430 }),
        _ => json!({ "alerts": [], "count": 0 }),
      };
      async move { Ok(body) }.boxed()
    }
  }

  async fn settle(cache: &mut QueryCache) {
    for _ in 0..10 {
      tokio::task::yield_now().await;
    }
    cache.tick();
  }

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
  }

  #[tokio::test(start_paused = true)]
  async fn test_stats_disabled_outside_realtime() {
    let fetcher = Arc::new(CountingFetcher::default());
    let mut cache = QueryCache::new(fetcher.clone(), CacheOptions::default());
    let temporal = TemporalController::new(TimeRange::LastWeek, Duration::from_secs(1), today());
    let config = DashboardConfig::default();
    let mut view = StatsView::new();

    let mut ctx = ViewContext {
      cache: &mut cache,
      temporal: &temporal,
      config: &config,
      today: today(),
    };
    view.tick(&mut ctx);
    settle(ctx.cache).await;
    view.refetch(ctx.cache);
    tokio::time::advance(Duration::from_secs(90)).await;
    settle(ctx.cache).await;
    view.tick(&mut ctx);

    assert_eq!(fetcher.calls(DASHBOARD_STATS), 0);
    assert!(fetcher.calls(DASHBOARD_ALERTS) >= 1);
    assert!(matches!(view.stats.state(ctx.cache), QueryState::Idle));
    assert!(view.last_updated.is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_stats_poll_every_thirty_seconds_in_realtime() {
    let fetcher = Arc::new(CountingFetcher::default());
    let mut cache = QueryCache::new(fetcher.clone(), CacheOptions::default());
    let temporal = TemporalController::new(TimeRange::Realtime, Duration::from_secs(1), today());
    let config = DashboardConfig::default();
    let mut view = StatsView::new();

    let mut ctx = ViewContext {
      cache: &mut cache,
      temporal: &temporal,
      config: &config,
      today: today(),
    };
    view.tick(&mut ctx);
    settle(ctx.cache).await;
    view.tick(&mut ctx);
    assert_eq!(fetcher.calls(DASHBOARD_STATS), 1);
    assert!(view.last_updated.is_some());
    assert_eq!(
      view.stats.state(ctx.cache).data().map(|s| s.active_routes),
      Some(24)
    );

    tokio::time::advance(Duration::from_secs(29)).await;
    settle(ctx.cache).await;
    assert_eq!(fetcher.calls(DASHBOARD_STATS), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    settle(ctx.cache).await;
    assert_eq!(fetcher.calls(DASHBOARD_STATS), 2);

    // Leaving the tab stops polling
    view.suspend();
    settle(ctx.cache).await;
    tokio::time::advance(Duration::from_secs(120)).await;
    settle(ctx.cache).await;
    assert_eq!(fetcher.calls(DASHBOARD_STATS), 2);
  }

  #[test]
  fn test_percent_is_clamped() {
    assert_eq!(percent(94.5), 95);
    assert_eq!(percent(-3.0), 0);
    assert_eq!(percent(140.0), 100);
  }
}
