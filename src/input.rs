use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Position;
use std::time::Instant;

use crate::app::App;
use crate::constants::constants;
use crate::feed::FeedKey;
use crate::media::MediaHost;

// --- Helpers ---

/// Map a key to a feed navigation key, if it is one.
pub fn feed_key(code: KeyCode) -> Option<FeedKey> {
  match code {
    KeyCode::Down | KeyCode::Char('j') => Some(FeedKey::Down),
    KeyCode::PageDown => Some(FeedKey::PageDown),
    KeyCode::Up | KeyCode::Char('k') => Some(FeedKey::Up),
    KeyCode::PageUp => Some(FeedKey::PageUp),
    KeyCode::Home | KeyCode::Char('g') => Some(FeedKey::Home),
    KeyCode::End | KeyCode::Char('G') => Some(FeedKey::End),
    _ => None,
  }
}

/// Vertical pointer position in the pixel space the gesture thresholds use.
fn row_to_px(row: u16) -> f32 {
  f32::from(row) * constants().row_height_px
}

// --- Event Handling ---

pub fn handle_key_event<H: MediaHost>(app: &mut App<H>, key: KeyEvent) {
  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
    app.should_quit = true;
    return;
  }

  if let Some(feed_key) = feed_key(key.code) {
    app.feed.handle_key(feed_key);
    return;
  }

  match key.code {
    KeyCode::Char(' ') | KeyCode::Enter => app.feed.press_active(),
    KeyCode::Char('r') => app.trigger_load(),
    KeyCode::Esc | KeyCode::Char('q') => app.should_quit = true,
    _ => {}
  }
}

pub fn handle_mouse_event<H: MediaHost>(app: &mut App<H>, mouse: MouseEvent, now: Instant) {
  let y = row_to_px(mouse.row);
  match mouse.kind {
    MouseEventKind::Down(button) => {
      let inside = app.feed_area.is_some_and(|area| area.contains(Position::new(mouse.column, mouse.row)));
      if inside {
        app.feed.pointer_down(y, now, button == MouseButton::Left);
      }
    }
    MouseEventKind::Drag(MouseButton::Left) => {
      app.feed.pointer_move(y);
    }
    MouseEventKind::Up(MouseButton::Left) => {
      app.feed.pointer_up(now);
    }
    MouseEventKind::ScrollDown => {
      app.feed.wheel(constants().wheel_line_px, now);
    }
    MouseEventKind::ScrollUp => {
      app.feed.wheel(-constants().wheel_line_px, now);
    }
    _ => {}
  }
}
