use crate::api::types::{TrendSeries, TrendStatistics, ANALYSIS_TRENDS};
use crate::query::{Query, QueryCache, QueryState, RequestDescriptor};
use crate::ui::view::{ShortcutInfo, View, ViewContext};
use crate::ui::{panel_title, render_placeholder};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::symbols::Marker;
use ratatui::widgets::{Axis, Bar, BarChart, BarGroup, Block, Borders, Chart, Dataset, GraphType, Paragraph};

/// Transit modes of the distribution chart, in payload order
const DISTRIBUTION_LABELS: [&str; 4] = ["LRT", "MRT", "BRT", "KTM"];
/// Shown when the backend sends no distribution
const DEFAULT_DISTRIBUTION: [f64; 4] = [25.0, 35.0, 20.0, 20.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartType {
  #[default]
  Line,
  Bar,
  Distribution,
}

impl ChartType {
  pub fn label(self) -> &'static str {
    match self {
      ChartType::Line => "Line Chart",
      ChartType::Bar => "Bar Chart",
      ChartType::Distribution => "Distribution",
    }
  }

  pub fn next(self) -> Self {
    match self {
      ChartType::Line => ChartType::Bar,
      ChartType::Bar => ChartType::Distribution,
      ChartType::Distribution => ChartType::Line,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
  #[default]
  PassengerCount,
  DelayMinutes,
  ActiveRoutes,
}

impl Metric {
  pub fn as_param(self) -> &'static str {
    match self {
      Metric::PassengerCount => "passenger_count",
      Metric::DelayMinutes => "delay_minutes",
      Metric::ActiveRoutes => "active_routes",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Metric::PassengerCount => "Passenger Count",
      Metric::DelayMinutes => "Delay (Minutes)",
      Metric::ActiveRoutes => "Active Routes",
    }
  }

  pub fn next(self) -> Self {
    match self {
      Metric::PassengerCount => Metric::DelayMinutes,
      Metric::DelayMinutes => Metric::ActiveRoutes,
      Metric::ActiveRoutes => Metric::PassengerCount,
    }
  }
}

/// Trend charts for the selected time range and metric
pub struct TrendsView {
  trends: Query<TrendSeries>,
  chart: ChartType,
  metric: Metric,
  historical: bool,
}

impl TrendsView {
  pub fn new() -> Self {
    Self {
      trends: Query::new(),
      chart: ChartType::default(),
      metric: Metric::default(),
      historical: false,
    }
  }

  /// The chart type is presentation only and never part of the request.
  pub fn trends_request(&self, ctx: &ViewContext<'_>) -> RequestDescriptor {
    RequestDescriptor::new(ANALYSIS_TRENDS)
      .params(ctx.temporal.range_params())
      .param("metric", self.metric.as_param())
      .param("historical", self.historical)
  }

  fn render_line(&self, frame: &mut Frame, area: Rect, block: Block<'_>, series: &TrendSeries) {
    let points: Vec<(f64, f64)> = series
      .values
      .iter()
      .enumerate()
      .map(|(i, v)| (i as f64, *v))
      .collect();
    let (min, max) = bounds(&series.values);
    let last = points.len().saturating_sub(1).max(1) as f64;

    let x_labels: Vec<String> = match (series.labels.first(), series.labels.last()) {
      (Some(first), Some(last)) if series.labels.len() > 1 => vec![first.clone(), last.clone()],
      (Some(first), _) => vec![first.clone()],
      _ => Vec::new(),
    };

    let dataset = Dataset::default()
      .name(format!("Transit {}", self.metric.label()))
      .marker(Marker::Braille)
      .graph_type(GraphType::Line)
      .style(Style::default().fg(Color::Cyan))
      .data(&points);

    let chart = Chart::new(vec![dataset])
      .block(block)
      .x_axis(
        Axis::default()
          .title("Time")
          .style(Style::default().fg(Color::DarkGray))
          .bounds([0.0, last])
          .labels(x_labels),
      )
      .y_axis(
        Axis::default()
          .title(self.metric.label())
          .style(Style::default().fg(Color::DarkGray))
          .bounds([min, max])
          .labels(vec![format!("{:.0}", min), format!("{:.0}", max)]),
      );

    frame.render_widget(chart, area);
  }

  fn render_bars(&self, frame: &mut Frame, area: Rect, block: Block<'_>, series: &TrendSeries) {
    let bars: Vec<Bar> = series
      .values
      .iter()
      .enumerate()
      .map(|(i, v)| {
        let label = series.labels.get(i).cloned().unwrap_or_default();
        value_bar(label, *v, Color::Cyan)
      })
      .collect();

    let chart = BarChart::default()
      .block(block)
      .data(BarGroup::default().bars(&bars))
      .bar_width(5)
      .bar_gap(1);

    frame.render_widget(chart, area);
  }

  fn render_distribution(&self, frame: &mut Frame, area: Rect, block: Block<'_>, series: &TrendSeries) {
    let colors = [Color::Blue, Color::Green, Color::Yellow, Color::Red];
    let bars: Vec<Bar> = distribution(series)
      .iter()
      .zip(DISTRIBUTION_LABELS)
      .zip(colors)
      .map(|((v, label), color)| value_bar(label.to_string(), *v, color))
      .collect();

    let chart = BarChart::default()
      .block(block)
      .data(BarGroup::default().bars(&bars))
      .bar_width(7)
      .bar_gap(3);

    frame.render_widget(chart, area);
  }

  fn render_statistics(&self, frame: &mut Frame, area: Rect, stats: &TrendStatistics) {
    let cells = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Ratio(1, 4); 4])
      .split(area);

    let values = [
      (format!("{:.0}", stats.avg_passengers), "Avg Passengers", Color::Blue),
      (format!("{:.0}", stats.peak_hours), "Peak Hours", Color::Green),
      (format!("{:.1}", stats.avg_delay), "Avg Delay (min)", Color::Yellow),
      (format!("{:.1}%", stats.efficiency), "Efficiency", Color::Red),
    ];

    for ((value, caption, color), area) in values.into_iter().zip(cells.iter()) {
      let text = vec![
        Line::from(Span::styled(value, Style::default().fg(color).bold())),
        Line::from(Span::styled(caption, Style::default().fg(Color::DarkGray))),
      ];
      frame.render_widget(
        Paragraph::new(text)
          .alignment(Alignment::Center)
          .block(Block::default().borders(Borders::TOP)),
        *area,
      );
    }
  }
}

impl View for TrendsView {
  fn title(&self) -> &'static str {
    "Trends"
  }

  fn tick(&mut self, ctx: &mut ViewContext<'_>) {
    let request = self.trends_request(ctx);
    self.trends.declare(ctx.cache, request);
  }

  fn handle_key(&mut self, key: KeyEvent, ctx: &mut ViewContext<'_>) -> bool {
    match key.code {
      KeyCode::Char('c') => {
        self.chart = self.chart.next();
        true
      }
      KeyCode::Char('x') => {
        self.metric = self.metric.next();
        self.tick(ctx);
        true
      }
      KeyCode::Char('h') => {
        self.historical = !self.historical;
        self.tick(ctx);
        true
      }
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
      .constraints([Constraint::Min(8), Constraint::Length(3)])
      .split(area);

    let state = self.trends.state(cache);
    let mut title = panel_title(
      &format!("{} · {}", self.metric.label(), self.chart.label()),
      &state,
      self.trends.is_fetching(cache),
    );
    if self.historical {
      title.push_str("(with historical) ");
    }
    let block = Block::default()
      .title(title)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let series = match state {
      QueryState::Success(series) => series,
      other => {
        render_placeholder(frame, area, block, &other, "No trend data.");
        return;
      }
    };

    if series.values.is_empty() && self.chart != ChartType::Distribution {
      frame.render_widget(
        Paragraph::new("No data points for this range.")
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        rows[0],
      );
    } else {
      match self.chart {
        ChartType::Line => self.render_line(frame, rows[0], block, series),
        ChartType::Bar => self.render_bars(frame, rows[0], block, series),
        ChartType::Distribution => self.render_distribution(frame, rows[0], block, series),
      }
    }

    self.render_statistics(frame, rows[1], &series.statistics);
  }

  fn refetch(&mut self, cache: &mut QueryCache) {
    self.trends.refetch(cache);
  }

  fn suspend(&mut self) {
    self.trends.release();
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("r", "refetch").with_priority(10),
      ShortcutInfo::new("c", "chart").with_priority(11),
      ShortcutInfo::new("x", "metric").with_priority(12),
      ShortcutInfo::new("h", "historical").with_priority(13),
    ]
  }
}

/// Shares for the distribution chart, falling back to the built-in split
fn distribution(series: &TrendSeries) -> &[f64] {
  if series.distribution.is_empty() {
    &DEFAULT_DISTRIBUTION
  } else {
    &series.distribution
  }
}

/// Y-axis bounds with some headroom; flat or empty series still get a range
fn bounds(values: &[f64]) -> (f64, f64) {
  let min = values.iter().copied().fold(f64::INFINITY, f64::min);
  let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  if !min.is_finite() || !max.is_finite() {
    return (0.0, 1.0);
  }
  let low = min.min(0.0);
  let high = if max > low { max * 1.1 } else { low + 1.0 };
  (low, high)
}

/// Bars are integer-valued, so scale by ten and show the real value as text
fn value_bar(label: String, value: f64, color: Color) -> Bar<'static> {
  Bar::default()
    .label(Line::from(label))
    .value((value.max(0.0) * 10.0).round() as u64)
    .text_value(format!("{:.1}", value))
    .style(Style::default().fg(color))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::ApiError;
  use crate::config::DashboardConfig;
  use crate::query::{CacheOptions, Fetcher, Params};
  use crate::temporal::{TemporalController, TimeRange};
  use chrono::NaiveDate;
  use crossterm::event::KeyModifiers;
  use futures::future::BoxFuture;
  use futures::FutureExt;
  use serde_json::{json, Value};
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  #[derive(Default)]
  struct TrendFetcher {
    calls: AtomicUsize,
  }

  impl Fetcher for TrendFetcher {
    fn fetch(&self, _endpoint: &str, params: &Params) -> BoxFuture<'static, Result<Value, ApiError>> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let metric = params.get("metric").map(|v| v.to_string()).unwrap_or_default();
      let body = json!({
        "labels": ["08:00", "09:00", "10:00"],
        "values": [1200.0, 1850.0, 1430.0],
        "statistics": { "avg_passengers": 1493.3, "peak_hours": 1850.0, "trend_direction": metric }
      });
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

  fn press(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
  }

  #[tokio::test(start_paused = true)]
  async fn test_trends_request_carries_range_metric_and_historical() {
    let mut cache = QueryCache::new(Arc::new(TrendFetcher::default()), CacheOptions::default());
    let temporal = TemporalController::new(TimeRange::LastWeek, Duration::from_secs(1), today());
    let config = DashboardConfig::default();
    let mut view = TrendsView::new();
    let ctx = ViewContext {
      cache: &mut cache,
      temporal: &temporal,
      config: &config,
      today: today(),
    };

    assert_eq!(
      view.trends_request(&ctx).key().description(),
      "/api/analysis/trends?historical=false&metric=passenger_count&timeRange=last_week"
    );

    view.metric = Metric::DelayMinutes;
    view.historical = true;
    assert_eq!(
      view.trends_request(&ctx).key().description(),
      "/api/analysis/trends?historical=true&metric=delay_minutes&timeRange=last_week"
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_chart_type_is_not_a_request() {
    let fetcher = Arc::new(TrendFetcher::default());
    let mut cache = QueryCache::new(fetcher.clone(), CacheOptions::default());
    let temporal = TemporalController::new(TimeRange::Today, Duration::from_secs(1), today());
    let config = DashboardConfig::default();
    let mut view = TrendsView::new();
    let mut ctx = ViewContext {
      cache: &mut cache,
      temporal: &temporal,
      config: &config,
      today: today(),
    };

    view.tick(&mut ctx);
    settle(ctx.cache).await;
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

    assert!(view.handle_key(press('c'), &mut ctx));
    assert!(view.handle_key(press('c'), &mut ctx));
    view.tick(&mut ctx);
    settle(ctx.cache).await;
    assert_eq!(view.chart, ChartType::Distribution);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

    // A new metric is a new request
    assert!(view.handle_key(press('x'), &mut ctx));
    settle(ctx.cache).await;
    view.tick(&mut ctx);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    let state = view.trends.state(ctx.cache);
    assert_eq!(
      state.data().and_then(|s| s.statistics.trend_direction.clone()),
      Some("delay_minutes".to_string())
    );

    // Active routes is new, passenger count is still cached and fresh
    view.handle_key(press('x'), &mut ctx);
    view.handle_key(press('x'), &mut ctx);
    settle(ctx.cache).await;
    view.tick(&mut ctx);
    assert_eq!(view.metric, Metric::PassengerCount);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    assert_eq!(
      view.trends.state(ctx.cache).data().and_then(|s| s.statistics.trend_direction.clone()),
      Some("passenger_count".to_string())
    );
  }

  #[test]
  fn test_distribution_falls_back_to_default() {
    let empty = TrendSeries::default();
    assert_eq!(distribution(&empty), &DEFAULT_DISTRIBUTION);

    let series = TrendSeries {
      distribution: vec![40.0, 30.0, 10.0, 20.0],
      ..Default::default()
    };
    assert_eq!(distribution(&series), &[40.0, 30.0, 10.0, 20.0]);
  }

  #[test]
  fn test_bounds() {
    assert_eq!(bounds(&[]), (0.0, 1.0));
    assert_eq!(bounds(&[0.0, 0.0]), (0.0, 1.0));
    let (low, high) = bounds(&[10.0, 50.0]);
    assert_eq!(low, 0.0);
    assert!(high > 50.0);
  }

  #[test]
  fn test_metric_cycle() {
    let mut metric = Metric::default();
    let mut seen = Vec::new();
    for _ in 0..3 {
      seen.push(metric.as_param());
      metric = metric.next();
    }
    assert_eq!(seen, ["passenger_count", "delay_minutes", "active_routes"]);
    assert_eq!(metric, Metric::PassengerCount);
  }
}
