use crate::config::Config;
use crate::context::DashboardContext;
use crate::event::{Event, EventHandler};
use crate::temporal::TemporalController;
use crate::ui::view::{View, ViewContext};
use crate::ui::views::{MapView, StatsView, TrendsView};
use crate::ui::{self, Screen};
use chrono::{Local, NaiveDate};
use color_eyre::Result;
use crossterm::event::{DisableFocusChange, EnableFocusChange, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

const TICK_RATE: Duration = Duration::from_millis(250);

/// Main application state
pub struct App {
  ctx: DashboardContext,

  /// Application configuration
  config: Config,

  /// Time range and playback shared by every view
  temporal: TemporalController,

  /// Tabs, in key order
  views: Vec<Box<dyn View>>,

  /// Index of the view on screen
  active: usize,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(ctx: DashboardContext, config: Config) -> Self {
    let temporal = TemporalController::new(
      config.dashboard.default_time_range,
      config.dashboard.playback_base(),
      today(),
    );

    Self {
      ctx,
      config,
      temporal,
      views: vec![
        Box::new(MapView::new()),
        Box::new(StatsView::new()),
        Box::new(TrendsView::new()),
      ],
      active: 0,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableFocusChange)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(TICK_RATE);
    info!(base_url = %self.ctx.client.base_url(), "dashboard started");

    // Declare the first view's queries before the first frame
    self.tick_view();

    let result = self.main_loop(&mut terminal, &mut events).await;

    // Cleanup terminal
    stdout().execute(DisableFocusChange)?;
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn main_loop(
    &mut self,
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      self.draw(terminal)?;

      if let Some(event) = events.next().await {
        self.handle_event(event);
      } else {
        break;
      }
    }
    Ok(())
  }

  fn draw(&mut self, terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>) -> Result<()> {
    let title = self.config.display_title();
    let tabs: Vec<&'static str> = self.views.iter().map(|v| v.title()).collect();
    let authenticated = self.ctx.is_authenticated();
    let screen = Screen {
      title: &title,
      tabs: &tabs,
      active: self.active,
      temporal: &self.temporal,
      cache: &self.ctx.cache,
      authenticated,
    };
    let view = self.views[self.active].as_mut();

    terminal.draw(|frame| ui::draw(frame, &screen, view))?;
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => {
        self.ctx.cache.tick();
        if self.temporal.poll_playback(Instant::now()) {
          debug!(range = self.temporal.range().as_param(), "playback step");
          self.views[self.active].refetch(&mut self.ctx.cache);
        }
        self.tick_view();
      }
      Event::FocusGained => self.ctx.cache.revalidate_stale(),
      Event::Resize => {} // Redrawn on the next loop iteration
    }
  }

  /// Let the active view (re)declare its queries for the current selection
  fn tick_view(&mut self) {
    let mut ctx = ViewContext {
      cache: &mut self.ctx.cache,
      temporal: &self.temporal,
      config: &self.config.dashboard,
      today: today(),
    };
    self.views[self.active].tick(&mut ctx);
  }

  fn switch_to(&mut self, index: usize) {
    if index == self.active || index >= self.views.len() {
      return;
    }
    self.views[self.active].suspend();
    self.active = index;
    debug!(view = self.views[index].title(), "switched view");
    self.tick_view();
  }

  fn handle_key(&mut self, key: KeyEvent) {
    let today = today();
    match key.code {
      // Quit
      KeyCode::Char('q') => self.should_quit = true,
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }

      // Tabs
      KeyCode::Char(c @ '1'..='9') => {
        let index = c as usize - '1' as usize;
        self.switch_to(index);
      }
      KeyCode::Tab => self.switch_to((self.active + 1) % self.views.len()),
      KeyCode::BackTab => {
        self.switch_to((self.active + self.views.len() - 1) % self.views.len())
      }

      // Time range and playback
      KeyCode::Char('t') => {
        self.temporal.cycle_next(today);
        self.tick_view();
      }
      KeyCode::Char('T') => {
        self.temporal.cycle_prev(today);
        self.tick_view();
      }
      KeyCode::Char('p') => {
        let playback = self.temporal.toggle_playback(Instant::now());
        info!(?playback, speed = self.temporal.speed().label(), "playback toggled");
      }
      KeyCode::Char('+') | KeyCode::Char('=') => self.temporal.faster(),
      KeyCode::Char('-') => self.temporal.slower(),
      KeyCode::Char('[') => self.shift_custom(|t| t.shift_custom_start(-1)),
      KeyCode::Char(']') => self.shift_custom(|t| t.shift_custom_start(1)),
      KeyCode::Char('{') => self.shift_custom(|t| t.shift_custom_end(-1)),
      KeyCode::Char('}') => self.shift_custom(|t| t.shift_custom_end(1)),

      // Scoped refresh of everything on screen
      KeyCode::Char('R') => {
        self.ctx.cache.refetch_active();
      }

      _ => {
        let mut ctx = ViewContext {
          cache: &mut self.ctx.cache,
          temporal: &self.temporal,
          config: &self.config.dashboard,
          today,
        };
        self.views[self.active].handle_key(key, &mut ctx);
      }
    }
  }

  fn shift_custom(&mut self, shift: impl FnOnce(&mut TemporalController) -> bool) {
    if shift(&mut self.temporal) {
      self.tick_view();
    }
  }
}

fn today() -> NaiveDate {
  Local::now().date_naive()
}
