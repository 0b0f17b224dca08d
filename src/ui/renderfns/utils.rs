use ratatui::prelude::Color;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Display color for a station, route or alert status
pub fn status_color(status: &str) -> Color {
  match status.to_ascii_lowercase().as_str() {
    "operational" | "on_time" | "normal" | "low" | "open" => Color::Green,
    "delayed" | "busy" | "medium" | "warning" => Color::Yellow,
    "disrupted" | "closed" | "high" | "critical" | "suspended" => Color::Red,
    _ => Color::White,
  }
}

/// `1234567` -> `1,234,567`
pub fn format_count(n: u64) -> String {
  let digits = n.to_string();
  let mut out = String::with_capacity(digits.len() + digits.len() / 3);
  for (i, c) in digits.chars().enumerate() {
    if i > 0 && (digits.len() - i) % 3 == 0 {
      out.push(',');
    }
    out.push(c);
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("KLCC", 10), "KLCC");
  }

  #[test]
  fn test_truncate_exact_length() {
    assert_eq!(truncate("Pasar Seni", 10), "Pasar Seni");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("Bukit Bintang", 8), "Bukit...");
  }

  #[test]
  fn test_truncate_multibyte() {
    assert_eq!(truncate("Café Gourmet", 6), "Caf...");
  }

  #[test]
  fn test_status_color() {
    assert_eq!(status_color("operational"), Color::Green);
    assert_eq!(status_color("Delayed"), Color::Yellow);
    assert_eq!(status_color("high"), Color::Red);
    assert_eq!(status_color("unknown"), Color::White);
  }

  #[test]
  fn test_format_count() {
    assert_eq!(format_count(0), "0");
    assert_eq!(format_count(999), "999");
    assert_eq!(format_count(1000), "1,000");
    assert_eq!(format_count(1234567), "1,234,567");
  }
}
