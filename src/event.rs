use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Periodic tick for UI refresh and cache maintenance
  Tick,
  /// Terminal window regained focus
  FocusGained,
  /// Terminal was resized
  Resize,
}

/// Event handler that produces events from terminal input and a tick timer
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // crossterm's poll/read block, so keep them off the async workers
    tokio::task::spawn_blocking(move || {
      let mut clock = TickClock::new(tick_rate, Instant::now());
      loop {
        let timeout = clock.until_next(Instant::now());
        let input = if event::poll(timeout).unwrap_or(false) {
          match event::read() {
            Ok(CrosstermEvent::Key(key)) if key.kind == KeyEventKind::Press => Some(Event::Key(key)),
            Ok(CrosstermEvent::FocusGained) => Some(Event::FocusGained),
            Ok(CrosstermEvent::Resize(_, _)) => Some(Event::Resize),
            _ => None,
          }
        } else {
          None
        };

        if let Some(event) = input {
          if tx.send(event).is_err() {
            break;
          }
        }
        // Ticks keep their cadence even under constant input
        if clock.fire(Instant::now()) && tx.send(Event::Tick).is_err() {
          break;
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

/// Fixed-rate tick deadline, independent of how often input arrives
#[derive(Debug, Clone, Copy)]
struct TickClock {
  rate: Duration,
  last: Instant,
}

impl TickClock {
  fn new(rate: Duration, now: Instant) -> Self {
    Self { rate, last: now }
  }

  /// How long input may be waited for before the next tick is due
  fn until_next(&self, now: Instant) -> Duration {
    self.rate.saturating_sub(now.saturating_duration_since(self.last))
  }

  /// Whether a tick is due at `now`; advances the deadline if so.
  fn fire(&mut self, now: Instant) -> bool {
    if now.saturating_duration_since(self.last) >= self.rate {
      self.last = now;
      true
    } else {
      false
    }
  }
}
