use crate::api::types::{ActiveAttractions, Attraction, TransitFeed, ATTRACTIONS_ACTIVE, TRANSIT_REAL_TIME};
use crate::query::{Query, QueryCache, QueryState, RequestDescriptor};
use crate::ui::renderfns::{format_count, status_color, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewContext};
use crate::ui::{ensure_valid_selection, panel_title, render_placeholder};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::canvas::{Canvas, Points};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState};

/// Longitude/latitude window around Kuala Lumpur
const LON_BOUNDS: [f64; 2] = [101.55, 101.80];
const LAT_BOUNDS: [f64; 2] = [3.03, 3.25];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
  Transit,
  Malls,
  Restaurants,
  Entertainment,
}

impl Layer {
  fn label(self) -> &'static str {
    match self {
      Layer::Transit => "Transit",
      Layer::Malls => "Malls",
      Layer::Restaurants => "Restaurants",
      Layer::Entertainment => "Entertainment",
    }
  }

  fn color(self) -> Color {
    match self {
      Layer::Transit => Color::Blue,
      Layer::Malls => Color::Magenta,
      Layer::Restaurants => Color::Green,
      Layer::Entertainment => Color::Yellow,
    }
  }
}

/// Which map layers are switched on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layers {
  pub transit: bool,
  pub malls: bool,
  pub restaurants: bool,
  pub entertainment: bool,
}

impl Default for Layers {
  fn default() -> Self {
    Self {
      transit: true,
      malls: true,
      restaurants: true,
      entertainment: true,
    }
  }
}

impl Layers {
  pub fn toggle(&mut self, layer: Layer) {
    let flag = match layer {
      Layer::Transit => &mut self.transit,
      Layer::Malls => &mut self.malls,
      Layer::Restaurants => &mut self.restaurants,
      Layer::Entertainment => &mut self.entertainment,
    };
    *flag = !*flag;
  }

  pub fn is_on(&self, layer: Layer) -> bool {
    match layer {
      Layer::Transit => self.transit,
      Layer::Malls => self.malls,
      Layer::Restaurants => self.restaurants,
      Layer::Entertainment => self.entertainment,
    }
  }

  /// All attraction categories share one request
  pub fn any_attractions(&self) -> bool {
    self.malls || self.restaurants || self.entertainment
  }
}

/// Interactive map: transit stations and attractions around Kuala Lumpur
pub struct MapView {
  layers: Layers,
  transit: Query<TransitFeed>,
  attractions: Query<ActiveAttractions>,
  list_state: ListState,
}

impl MapView {
  pub fn new() -> Self {
    Self {
      layers: Layers::default(),
      transit: Query::new(),
      attractions: Query::new(),
      list_state: ListState::default(),
    }
  }

  pub fn layers(&self) -> Layers {
    self.layers
  }

  pub fn transit_request(&self) -> RequestDescriptor {
    RequestDescriptor::new(TRANSIT_REAL_TIME).enabled(self.layers.transit)
  }

  pub fn attractions_request(&self, ctx: &ViewContext<'_>) -> RequestDescriptor {
    RequestDescriptor::new(ATTRACTIONS_ACTIVE)
      .params(ctx.temporal.dated_params(ctx.today))
      .enabled(self.layers.any_attractions())
  }

  fn declare(&mut self, ctx: &mut ViewContext<'_>) {
    let transit = self.transit_request();
    let attractions = self.attractions_request(ctx);
    self.transit.declare(ctx.cache, transit);
    self.attractions.declare(ctx.cache, attractions);
  }

  /// Attractions of the switched-on categories
  fn visible_attractions<'a>(&self, data: &'a ActiveAttractions) -> Vec<(Layer, &'a Attraction)> {
    let categories = [
      (Layer::Malls, &data.malls),
      (Layer::Restaurants, &data.restaurants),
      (Layer::Entertainment, &data.entertainment),
    ];
    categories
      .into_iter()
      .filter(|(layer, _)| self.layers.is_on(*layer))
      .flat_map(|(layer, items)| items.iter().map(move |a| (layer, a)))
      .collect()
  }

  fn render_canvas(&self, frame: &mut Frame, area: Rect, cache: &QueryCache) {
    let mut groups: Vec<(Color, Vec<(f64, f64)>)> = Vec::new();

    if self.layers.transit {
      if let Some(feed) = self.transit.state(cache).data() {
        let coords = feed
          .stations()
          .iter()
          .map(|s| (s.longitude, s.latitude))
          .collect();
        groups.push((Layer::Transit.color(), coords));
      }
    }
    if let Some(data) = self.attractions.state(cache).data() {
      for layer in [Layer::Malls, Layer::Restaurants, Layer::Entertainment] {
        let coords = self
          .visible_attractions(data)
          .into_iter()
          .filter(|(l, _)| *l == layer)
          .map(|(_, a)| (a.longitude, a.latitude))
          .collect();
        groups.push((layer.color(), coords));
      }
    }

    let legend: Vec<Span> = [Layer::Transit, Layer::Malls, Layer::Restaurants, Layer::Entertainment]
      .into_iter()
      .map(|layer| {
        let style = if self.layers.is_on(layer) {
          Style::default().fg(layer.color())
        } else {
          Style::default().fg(Color::DarkGray).add_modifier(Modifier::CROSSED_OUT)
        };
        Span::styled(format!(" {} ", layer.label()), style)
      })
      .collect();

    let canvas = Canvas::default()
      .block(
        Block::default()
          .title(" Kuala Lumpur ")
          .title_bottom(Line::from(legend))
          .borders(Borders::ALL)
          .border_style(Style::default().fg(Color::Blue)),
      )
      .marker(symbols::Marker::Braille)
      .x_bounds(LON_BOUNDS)
      .y_bounds(LAT_BOUNDS)
      .paint(|ctx| {
        for (color, coords) in &groups {
          ctx.draw(&Points {
            coords: coords.as_slice(),
            color: *color,
          });
        }
      });

    frame.render_widget(canvas, area);
  }

  fn render_transit(&mut self, frame: &mut Frame, area: Rect, cache: &QueryCache) {
    let state = self.transit.state(cache);
    let title = panel_title("Transit Stations", &state, self.transit.is_fetching(cache));
    let block = Block::default()
      .title(title)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if !self.layers.transit {
      let hint = "Transit layer off. Press 'm' to show it.";
      render_placeholder::<()>(frame, area, block, &QueryState::Idle, hint);
      return;
    }
    if render_placeholder(frame, area, block.clone(), &state, "No transit data.") {
      return;
    }
    let Some(feed) = state.data() else {
      return;
    };

    let items: Vec<ListItem> = feed
      .stations()
      .iter()
      .map(|station| {
        let mut spans = vec![
          Span::styled(
            format!("{:<6}", truncate(&station.line, 6)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(format!("{:<22}", truncate(&station.name, 22))),
          Span::styled(
            format!("{:<12}", truncate(&station.status, 12)),
            Style::default().fg(status_color(&station.status)),
          ),
          Span::styled(
            format!("{:>8}", format_count(station.passenger_count)),
            Style::default().fg(Color::White),
          ),
        ];
        if let Some(next) = &station.next_arrival {
          spans.push(Span::styled(
            format!("  next {}", truncate(next, 8)),
            Style::default().fg(Color::DarkGray),
          ));
        }
        ListItem::new(Line::from(spans))
      })
      .collect();

    let len = items.len();
    ensure_valid_selection(&mut self.list_state, len);

    let list = List::new(items)
      .block(block.title_bottom(format!(" {} stations ", len)))
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }

  fn render_attractions(&self, frame: &mut Frame, area: Rect, cache: &QueryCache) {
    let state = self.attractions.state(cache);
    let title = panel_title("Attractions", &state, self.attractions.is_fetching(cache));
    let block = Block::default()
      .title(title)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if !self.layers.any_attractions() {
      let hint = "All attraction layers off. Press 's', 'f' or 'e' to show them.";
      render_placeholder::<()>(frame, area, block, &QueryState::Idle, hint);
      return;
    }
    if render_placeholder(frame, area, block.clone(), &state, "No attraction data.") {
      return;
    }
    let Some(data) = state.data() else {
      return;
    };

    let items: Vec<ListItem> = self
      .visible_attractions(data)
      .into_iter()
      .map(|(layer, attraction)| {
        ListItem::new(Line::from(vec![
          Span::styled("● ", Style::default().fg(layer.color())),
          Span::raw(format!("{:<28}", truncate(&attraction.name, 28))),
          Span::styled(
            format!("★ {:.1}", attraction.rating),
            Style::default().fg(Color::Yellow),
          ),
          Span::styled(
            format!("  {:>3.0}% full", attraction.current_occupancy),
            Style::default().fg(Color::White),
          ),
          Span::styled(
            format!("  ~{:.0} min", attraction.estimated_wait_time),
            Style::default().fg(Color::DarkGray),
          ),
        ]))
      })
      .collect();

    let len = items.len();
    let list = List::new(items).block(block.title_bottom(format!(" {} places ", len)));
    frame.render_widget(list, area);
  }
}

impl View for MapView {
  fn title(&self) -> &'static str {
    "Map"
  }

  fn tick(&mut self, ctx: &mut ViewContext<'_>) {
    self.declare(ctx);
  }

  fn handle_key(&mut self, key: KeyEvent, ctx: &mut ViewContext<'_>) -> bool {
    let layer = match key.code {
      KeyCode::Char('m') => Layer::Transit,
      KeyCode::Char('s') => Layer::Malls,
      KeyCode::Char('f') => Layer::Restaurants,
      KeyCode::Char('e') => Layer::Entertainment,
      KeyCode::Char('j') | KeyCode::Down => {
        self.list_state.select_next();
        return true;
      }
      KeyCode::Char('k') | KeyCode::Up => {
        self.list_state.select_previous();
        return true;
      }
      KeyCode::Char('r') => {
        self.refetch(ctx.cache);
        return true;
      }
      _ => return false,
    };

    self.layers.toggle(layer);
    self.declare(ctx);
    true
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, cache: &QueryCache) {
    let columns = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
      .split(area);
    let lists = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
      .split(columns[1]);

    self.render_canvas(frame, columns[0], cache);
    self.render_transit(frame, lists[0], cache);
    self.render_attractions(frame, lists[1], cache);
  }

  fn refetch(&mut self, cache: &mut QueryCache) {
    self.transit.refetch(cache);
    self.attractions.refetch(cache);
  }

  fn suspend(&mut self) {
    self.transit.release();
    self.attractions.release();
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("r", "refetch").with_priority(10),
      ShortcutInfo::new("m/s/f/e", "layers").with_priority(15),
    ]
  }
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
  use std::collections::HashMap;
  use std::sync::{Arc, Mutex};
  use std::time::Duration;

  /// Serves canned bodies per endpoint and counts calls.
  #[derive(Default)]
  struct EndpointFetcher {
    calls: Mutex<HashMap<String, usize>>,
    /// Endpoint answering with a server error
    broken: Option<&'static str>,
  }

  impl EndpointFetcher {
    fn broken(endpoint: &'static str) -> Self {
      Self {
        broken: Some(endpoint),
        ..Self::default()
      }
    }

    fn calls(&self, endpoint: &str) -> usize {
      self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }
  }

  impl Fetcher for EndpointFetcher {
    fn fetch(&self, endpoint: &str, _params: &Params) -> BoxFuture<'static, Result<Value, ApiError>> {
      *self.calls.lock().unwrap().entry(endpoint.to_string()).or_default() += 1;
      if self.broken == Some(endpoint) {
        return async {
          Err(ApiError::Server {
            status: 503,
            message: "Transit feed unavailable".into(),
          })
        }
        .boxed();
      }
      let body = match endpoint {
        TRANSIT_REAL_TIME => json!([
          { "id": "lrt_001", "name": "KLCC", "latitude": 3.158, "longitude": 101.713, "line": "KJL", "status": "operational" }
        ]),
        _ => json!({
          "malls": [{ "id": "m1", "name": "Pavilion KL", "latitude": 3.149, "longitude": 101.713 }],
          "restaurants": [],
          "entertainment": []
        }),
      };
      async move { Ok(body) }.boxed()
    }
  }

  fn key(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
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
  async fn test_layer_toggle_within_cache_window_does_not_refetch() {
    let fetcher = Arc::new(EndpointFetcher::default());
    let mut cache = QueryCache::new(fetcher.clone(), CacheOptions::default());
    let temporal = TemporalController::new(TimeRange::Realtime, Duration::from_secs(1), today());
    let config = DashboardConfig::default();
    let mut view = MapView::new();

    let mut ctx = ViewContext {
      cache: &mut cache,
      temporal: &temporal,
      config: &config,
      today: today(),
    };
    view.tick(&mut ctx);
    settle(ctx.cache).await;
    view.tick(&mut ctx);

    assert_eq!(fetcher.calls(TRANSIT_REAL_TIME), 1);
    assert_eq!(fetcher.calls(ATTRACTIONS_ACTIVE), 1);

    // Transit off and on again a minute later
    assert!(view.handle_key(key('m'), &mut ctx));
    assert!(!view.layers().transit);
    tokio::time::advance(Duration::from_secs(60)).await;
    settle(ctx.cache).await;
    assert!(view.handle_key(key('m'), &mut ctx));
    settle(ctx.cache).await;

    assert_eq!(fetcher.calls(TRANSIT_REAL_TIME), 1);
    assert!(view.transit.state(ctx.cache).is_success());
    // Sibling layer untouched
    assert_eq!(fetcher.calls(ATTRACTIONS_ACTIVE), 1);
    assert!(view.attractions.state(ctx.cache).is_success());
  }

  #[tokio::test(start_paused = true)]
  async fn test_failing_layer_leaves_sibling_intact() {
    let fetcher = Arc::new(EndpointFetcher::broken(TRANSIT_REAL_TIME));
    let options = CacheOptions {
      retry_delay: Duration::ZERO,
      ..CacheOptions::default()
    };
    let mut cache = QueryCache::new(fetcher.clone(), options);
    let temporal = TemporalController::new(TimeRange::Today, Duration::from_secs(1), today());
    let config = DashboardConfig::default();
    let mut view = MapView::new();

    let mut ctx = ViewContext {
      cache: &mut cache,
      temporal: &temporal,
      config: &config,
      today: today(),
    };
    view.tick(&mut ctx);
    // First attempt, then the single retry
    settle(ctx.cache).await;
    settle(ctx.cache).await;
    settle(ctx.cache).await;
    view.tick(&mut ctx);

    assert_eq!(fetcher.calls(TRANSIT_REAL_TIME), 2);
    assert_eq!(
      view.transit.state(ctx.cache).error(),
      Some("Server error 503: Transit feed unavailable")
    );
    let attractions = view.attractions.state(ctx.cache);
    assert!(attractions.is_success());
    assert_eq!(
      attractions.data().map(|a| a.malls[0].name.as_str()),
      Some("Pavilion KL")
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_attractions_disabled_when_all_categories_off() {
    let fetcher = Arc::new(EndpointFetcher::default());
    let mut cache = QueryCache::new(fetcher.clone(), CacheOptions::default());
    let temporal = TemporalController::new(TimeRange::Today, Duration::from_secs(1), today());
    let config = DashboardConfig::default();
    let mut view = MapView::new();
    view.layers = Layers {
      transit: false,
      malls: false,
      restaurants: false,
      entertainment: false,
    };

    let mut ctx = ViewContext {
      cache: &mut cache,
      temporal: &temporal,
      config: &config,
      today: today(),
    };
    view.tick(&mut ctx);
    settle(ctx.cache).await;
    view.refetch(ctx.cache);

    assert_eq!(fetcher.calls(TRANSIT_REAL_TIME), 0);
    assert_eq!(fetcher.calls(ATTRACTIONS_ACTIVE), 0);

    view.handle_key(key('f'), &mut ctx);
    assert_eq!(fetcher.calls(ATTRACTIONS_ACTIVE), 1);
  }

  #[test]
  fn test_attractions_request_carries_range_and_date() {
    let fetcher = Arc::new(EndpointFetcher::default());
    let mut cache = QueryCache::new(fetcher, CacheOptions::default());
    let temporal = TemporalController::new(TimeRange::LastWeek, Duration::from_secs(1), today());
    let config = DashboardConfig::default();
    let ctx = ViewContext {
      cache: &mut cache,
      temporal: &temporal,
      config: &config,
      today: today(),
    };

    let request = MapView::new().attractions_request(&ctx);
    assert_eq!(
      request.key().description(),
      "/api/attractions/active?date=2024-03-15&timeRange=last_week"
    );
  }

  #[test]
  fn test_visible_attractions_follow_layers() {
    let data: ActiveAttractions = serde_json::from_value(json!({
      "malls": [{ "name": "Pavilion KL" }],
      "restaurants": [{ "name": "Jalan Alor" }],
      "entertainment": [{ "name": "Aquaria KLCC" }]
    }))
    .unwrap();

    let mut view = MapView::new();
    assert_eq!(view.visible_attractions(&data).len(), 3);

    view.layers.toggle(Layer::Restaurants);
    let names: Vec<&str> = view
      .visible_attractions(&data)
      .iter()
      .map(|(_, a)| a.name.as_str())
      .collect();
    assert_eq!(names, vec!["Pavilion KL", "Aquaria KLCC"]);
  }
}
