use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, Paragraph},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::App;
use crate::cell::CellState;
use crate::constants::constants;
use crate::embed;
use crate::feed::FeedStatus;
use crate::media::MediaHost;

// --- Theme ---

pub struct Theme {
  pub bg: Color,
  pub fg: Color,
  pub accent: Color,
  pub muted: Color,
  pub border: Color,
  pub status: Color,
  pub error: Color,
  pub key_fg: Color,
  pub key_bg: Color,
}

pub const THEME: Theme = Theme {
  bg: Color::Rgb(24, 24, 28),
  fg: Color::Rgb(230, 230, 235),
  accent: Color::Rgb(255, 121, 160),
  muted: Color::Rgb(130, 130, 145),
  border: Color::Rgb(70, 70, 82),
  status: Color::Rgb(140, 200, 255),
  error: Color::Rgb(255, 110, 110),
  key_fg: Color::Rgb(24, 24, 28),
  key_bg: Color::Rgb(130, 130, 145),
};

// --- Helpers ---

/// Truncate to `max_width` display columns, appending "…" if truncated.
pub fn truncate_width(s: &str, max_width: usize) -> String {
  if s.width() <= max_width {
    return s.to_string();
  }
  if max_width == 0 {
    return String::new();
  }
  let budget = max_width - 1;
  let mut out = String::new();
  let mut used = 0;
  for c in s.chars() {
    let w = c.width().unwrap_or(0);
    if used + w > budget {
      break;
    }
    used += w;
    out.push(c);
  }
  out.push('…');
  out
}

/// Row of `slide`'s top edge relative to the strip, for a strip `height`
/// rows tall scrolled to `offset` slides and shifted by `shift` rows.
pub fn slide_top(slide: usize, offset: f32, height: u16, shift: i32) -> i32 {
  ((slide as f32 - offset) * f32::from(height)).round() as i32 + shift
}

/// Visible part of a full-height slide whose top sits at `top` rows from the
/// strip's top, and how many of its rows are cut off above.
pub fn clip_slide(area: Rect, top: i32) -> Option<(Rect, u16)> {
  let height = i32::from(area.height);
  let start = top.max(0);
  let end = (top + height).min(height);
  if end <= start {
    return None;
  }
  let rect = Rect { y: area.y + start as u16, height: (end - start) as u16, ..area };
  Some((rect, (start - top) as u16))
}

pub fn state_badge(state: CellState) -> (&'static str, Color) {
  match state {
    CellState::Playing => ("▶ playing", THEME.accent),
    CellState::UserPaused => ("❚❚ paused", THEME.status),
    CellState::Preloading => ("◌ warming", THEME.muted),
    CellState::Dormant => ("· idle", THEME.muted),
  }
}

fn centered(mut content: Vec<Line<'static>>, height: u16) -> Vec<Line<'static>> {
  let pad = usize::from(height).saturating_sub(content.len() + 1) / 2;
  let mut lines = vec![Line::from(""); pad];
  lines.append(&mut content);
  lines
}

// --- UI Rendering ---

pub fn ui<H: MediaHost>(frame: &mut Frame, app: &mut App<H>) {
  frame.render_widget(Block::default().style(Style::default().bg(THEME.bg)), frame.area());

  let [header_area, feed_area, status_area, footer_area] =
    Layout::vertical([Constraint::Length(1), Constraint::Min(3), Constraint::Length(1), Constraint::Length(1)])
      .areas(frame.area());

  app.feed_area = Some(feed_area);
  render_header(frame, app, header_area);
  render_feed(frame, app, feed_area);
  render_status(frame, app, status_area);
  render_footer(frame, footer_area);
}

fn render_header<H: MediaHost>(frame: &mut Frame, app: &App<H>, area: Rect) {
  let left = Line::from(Span::styled(" ▶ shortfeed ", Style::default().fg(THEME.accent).add_modifier(Modifier::BOLD)));
  frame.render_widget(left, area);

  let count = app.feed.items().len();
  let position = match app.feed.active_index() {
    Some(i) => format!("{}/{} ", i + 1, count),
    None if count > 0 => format!("end/{} ", count),
    None => String::new(),
  };
  let width = position.width() as u16;
  let right = Line::from(Span::styled(position, Style::default().fg(THEME.muted)));
  let right_area = Rect { x: area.x + area.width.saturating_sub(width), width, ..area };
  frame.render_widget(right, right_area);
}

fn render_feed<H: MediaHost>(frame: &mut Frame, app: &App<H>, area: Rect) {
  let message = match app.status() {
    FeedStatus::Loading => Some(("Loading videos…".to_string(), THEME.muted)),
    FeedStatus::Failed(msg) => Some((msg.clone(), THEME.error)),
    FeedStatus::Ready if app.feed.total_slides() == 0 => Some(("No videos found".to_string(), THEME.muted)),
    FeedStatus::Ready => None,
  };
  if let Some((text, color)) = message {
    let text = truncate_width(&text, usize::from(area.width.saturating_sub(2)));
    let lines = centered(vec![Line::from(Span::styled(text, Style::default().fg(color)))], area.height);
    frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), area);
    return;
  }

  let feed = &app.feed;
  let offset = feed.viewport_offset();
  let shift = (feed.drag_offset() / constants().row_height_px).round() as i32;
  let first = offset.floor().max(0.0) as usize;
  let last = (first + 1).min(feed.total_slides() - 1);

  for slide in first.saturating_sub(1)..=last {
    let slide_shift = if slide == feed.current_slide() { shift } else { 0 };
    let top = slide_top(slide, offset, area.height, slide_shift);
    let Some((rect, skipped)) = clip_slide(area, top) else { continue };
    let lines = if slide < feed.items().len() { item_lines(app, slide, area) } else { end_lines(app, area) };
    frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center).scroll((skipped, 0)), rect);
  }
}

fn separator(width: u16) -> Line<'static> {
  Line::from(Span::styled("─".repeat(usize::from(width)), Style::default().fg(THEME.border)))
}

fn item_lines<H: MediaHost>(app: &App<H>, index: usize, area: Rect) -> Vec<Line<'static>> {
  let feed = &app.feed;
  let item = &feed.items()[index];
  let inner_w = usize::from(area.width.saturating_sub(4));
  let state = feed.cell_state(index).unwrap_or(CellState::Dormant);
  let (badge, badge_color) = state_badge(state);

  let title = item.title.clone().unwrap_or_else(|| format!("#{}", item.id));
  let mounted = feed.cells().get(index).is_some_and(|c| c.is_mounted());
  let source = match embed::resolve(&item.src) {
    Some(target) if mounted => format!("{} embed · {}", target.platform.label(), target.id),
    Some(target) => format!("{} embed · {} · placeholder", target.platform.label(), target.id),
    None => item.src.clone(),
  };

  let mut content = vec![
    Line::from(Span::styled(format!("{} / {}", index + 1, feed.items().len()), Style::default().fg(THEME.muted))),
    Line::from(""),
    Line::from(Span::styled(
      truncate_width(&title, inner_w),
      Style::default().fg(THEME.fg).add_modifier(Modifier::BOLD),
    )),
    Line::from(Span::styled(truncate_width(&source, inner_w), Style::default().fg(THEME.muted))),
    Line::from(""),
    Line::from(Span::styled(badge, Style::default().fg(badge_color).add_modifier(Modifier::BOLD))),
  ];
  if let Some(poster) = &item.poster {
    content.push(Line::from(Span::styled(
      truncate_width(&format!("poster {}", poster), inner_w),
      Style::default().fg(THEME.muted),
    )));
  }
  let hint = match state {
    CellState::Playing => Some("click or Space to pause"),
    CellState::UserPaused => Some("click or Space to play"),
    _ => None,
  };
  if let Some(hint) = hint {
    content.push(Line::from(""));
    content.push(Line::from(Span::styled(hint, Style::default().fg(THEME.muted))));
  }

  let mut lines = vec![separator(area.width)];
  lines.extend(centered(content, area.height));
  lines
}

fn end_lines<H: MediaHost>(app: &App<H>, area: Rect) -> Vec<Line<'static>> {
  let count = app.feed.items().len();
  let content = vec![
    Line::from(Span::styled("You're all caught up", Style::default().fg(THEME.accent).add_modifier(Modifier::BOLD))),
    Line::from(""),
    Line::from(Span::styled(format!("{} videos watched through", count), Style::default().fg(THEME.muted))),
    Line::from(Span::styled("↑ / k to go back · r to reload", Style::default().fg(THEME.muted))),
  ];
  let mut lines = vec![separator(area.width)];
  lines.extend(centered(content, area.height));
  lines
}

fn render_status<H: MediaHost>(frame: &mut Frame, app: &App<H>, area: Rect) {
  let width = usize::from(area.width.saturating_sub(4));
  let (text, style) = if let Some(msg) = &app.status_message {
    (format!(" ⏳ {}", msg), Style::default().fg(THEME.status))
  } else if let Some(err) = &app.last_error {
    (format!(" ⚠  {}", truncate_width(err, width)), Style::default().fg(THEME.error))
  } else if let Some(index) = app.feed.active_index() {
    let item = &app.feed.items()[index];
    (format!(" ♪ {}", truncate_width(&item.src, width)), Style::default().fg(THEME.muted))
  } else {
    (" Ready".to_string(), Style::default().fg(THEME.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_footer(frame: &mut Frame, area: Rect) {
  let keys = [("j/k", "Navigate"), ("Space", "Play/Pause"), ("g/G", "First/Last"), ("r", "Reload"), ("q", "Quit")];
  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(THEME.key_fg).bg(THEME.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(THEME.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();
  frame.render_widget(Line::from(spans), area);
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::{LoadOptions, VideoItem};
  use crate::feed::FeedSettings;
  use crate::media::fake::FakeHost;
  use ratatui::{Terminal, backend::TestBackend};
  use reqwest::Client;

  fn app() -> App<FakeHost> {
    App::new(FakeHost::default(), Client::new(), FeedSettings::default(), LoadOptions::default())
  }

  fn rendered(app: &mut App<FakeHost>) -> String {
    let mut terminal = Terminal::new(TestBackend::new(60, 20)).unwrap();
    terminal.draw(|frame| ui(frame, app)).unwrap();
    terminal.backend().buffer().content().iter().map(|c| c.symbol()).collect()
  }

  // --- truncate_width ---

  #[test]
  fn truncate_ascii() {
    assert_eq!(truncate_width("hello", 10), "hello");
    assert_eq!(truncate_width("hello world", 6), "hello…");
    assert_eq!(truncate_width("abc", 0), "");
  }

  #[test]
  fn truncate_counts_double_width() {
    assert_eq!(truncate_width("日本語です", 5), "日本…");
    assert_eq!(truncate_width("日本", 4), "日本");
  }

  // --- slide geometry ---

  #[test]
  fn slides_follow_offset() {
    assert_eq!(slide_top(2, 2.0, 20, 0), 0);
    assert_eq!(slide_top(3, 2.5, 20, 0), 10);
    assert_eq!(slide_top(2, 2.5, 20, 0), -10);
    assert_eq!(slide_top(2, 2.0, 20, -3), -3);
  }

  #[test]
  fn clipping_keeps_visible_rows() {
    let area = Rect::new(0, 1, 40, 20);
    assert_eq!(clip_slide(area, 0), Some((area, 0)));
    assert_eq!(clip_slide(area, -10), Some((Rect::new(0, 1, 40, 10), 10)));
    assert_eq!(clip_slide(area, 15), Some((Rect::new(0, 16, 40, 5), 0)));
    assert_eq!(clip_slide(area, 20), None);
    assert_eq!(clip_slide(area, -20), None);
  }

  // --- rendering ---

  #[test]
  fn loading_and_empty_states() {
    let mut app = app();
    assert!(rendered(&mut app).contains("Loading videos…"));
    app.feed.replace_catalog(Vec::new());
    assert!(rendered(&mut app).contains("No videos found"));
  }

  #[test]
  fn failed_state_shows_message() {
    let mut app = app();
    app.feed.fail("Failed to load videos".into());
    assert!(rendered(&mut app).contains("Failed to load videos"));
  }

  #[test]
  fn active_slide_shows_title_and_badge() {
    let mut app = app();
    app.feed.replace_catalog(vec![VideoItem::new("1", "https://cdn.example.com/a.mp4").with_title("Sunset")]);
    let screen = rendered(&mut app);
    assert!(screen.contains("Sunset"));
    assert!(screen.contains("playing"));
    assert_eq!(app.feed_area, Some(Rect::new(0, 1, 60, 17)));
  }

  #[test]
  fn unmounted_embed_shows_placeholder() {
    let mut app = app();
    app.feed.replace_catalog(vec![
      VideoItem::new("1", "https://cdn.example.com/a.mp4"),
      VideoItem::new("2", "https://cdn.example.com/b.mp4"),
      VideoItem::new("3", "https://cdn.example.com/c.mp4"),
      VideoItem::new("4", "https://vimeo.com/76979871").with_title("Far away"),
    ]);
    let area = Rect::new(0, 0, 60, 20);
    let text: String = item_lines(&app, 3, area)
      .iter()
      .flat_map(|line| line.spans.iter().map(|span| span.content.to_string()))
      .collect();
    assert!(text.contains("Vimeo embed · 76979871 · placeholder"));
  }

  #[test]
  fn terminal_slide_rendered_at_end() {
    let mut app = app();
    app.feed.replace_catalog(vec![VideoItem::new("1", "https://cdn.example.com/a.mp4")]);
    app.feed.navigate(1);
    for _ in 0..100 {
      app.feed.tick(std::time::Duration::from_millis(16));
    }
    assert!(rendered(&mut app).contains("caught up"));
  }
}
