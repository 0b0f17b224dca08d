use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the footer bar: a breadcrumb of the current selection on the left,
/// a status summary on the right
pub fn draw_footer(frame: &mut Frame, area: Rect, breadcrumb: &[String], status: &str) {
  let mut spans = Vec::new();

  spans.push(Span::raw(" "));

  for (i, part) in breadcrumb.iter().enumerate() {
    if i > 0 {
      spans.push(Span::styled(" > ", Style::default().fg(Color::DarkGray)));
    }

    let style = if i == breadcrumb.len() - 1 {
      // Innermost part - highlighted
      Style::default().fg(Color::Cyan).bold()
    } else {
      Style::default().fg(Color::White)
    };

    spans.push(Span::styled(part.clone(), style));
  }

  let left = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(left, area);

  let right = Paragraph::new(format!("{} ", status))
    .alignment(Alignment::Right)
    .style(Style::default().fg(Color::DarkGray));
  frame.render_widget(right, area);
}
