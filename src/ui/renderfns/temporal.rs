use crate::temporal::{TemporalController, TimeRange};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

/// Draw the time-range selector and playback controls
pub fn draw_temporal_bar(frame: &mut Frame, area: Rect, temporal: &TemporalController) {
  let range = temporal.range();

  let mut spans = vec![
    Span::styled(" Time Range ", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!("‹{}›", range.label()),
      Style::default().fg(Color::Yellow).bold(),
    ),
    Span::styled(format!("  {}", range.hint()), Style::default().fg(Color::DarkGray)),
  ];

  if range == TimeRange::Custom {
    let custom = temporal.custom();
    spans.push(Span::styled("  │  ", Style::default().fg(Color::DarkGray)));
    spans.push(Span::styled(custom.start_param(), Style::default().fg(Color::White)));
    spans.push(Span::styled(" → ", Style::default().fg(Color::DarkGray)));
    spans.push(Span::styled(custom.end_param(), Style::default().fg(Color::White)));
  }

  spans.push(Span::styled("  │  ", Style::default().fg(Color::DarkGray)));
  if temporal.is_playing() {
    spans.push(Span::styled("▶ playing", Style::default().fg(Color::Green).bold()));
  } else {
    spans.push(Span::styled("⏸ paused", Style::default().fg(Color::DarkGray)));
  }
  spans.push(Span::styled(
    format!("  {}", temporal.speed().label()),
    Style::default().fg(Color::Cyan),
  ));

  let block = Block::default()
    .borders(Borders::BOTTOM)
    .border_style(Style::default().fg(Color::DarkGray));

  frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}
