use anyhow::Result;
use ratatui::layout::Rect;
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::catalog::{LoadOptions, VideoItem, load_catalog};
use crate::feed::{FeedController, FeedSettings, FeedStatus};
use crate::media::MediaHost;

pub type CatalogResult = Result<Vec<VideoItem>>;

pub struct App<H: MediaHost> {
  pub feed: FeedController<H>,
  http_client: Client,
  load_options: LoadOptions,
  catalog_rx: Option<oneshot::Receiver<CatalogResult>>,
  pub last_error: Option<String>,
  pub status_message: Option<String>,
  pub should_quit: bool,
  /// Where the slide strip was last drawn; mouse input outside it is ignored.
  pub feed_area: Option<Rect>,
  last_tick: Instant,
  /// When the last error was set, for auto-dismiss.
  error_time: Option<Instant>,
}

impl<H: MediaHost> App<H> {
  pub fn new(host: H, http_client: Client, settings: FeedSettings, load_options: LoadOptions) -> Self {
    Self {
      feed: FeedController::new(host, settings),
      http_client,
      load_options,
      catalog_rx: None,
      last_error: None,
      status_message: None,
      should_quit: false,
      feed_area: None,
      last_tick: Instant::now(),
      error_time: None,
    }
  }

  /// Set an error message with auto-dismiss tracking.
  pub fn set_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  /// Clear stale error messages after 5 seconds.
  pub fn expire_error(&mut self) {
    if let Some(t) = self.error_time
      && t.elapsed() >= Duration::from_secs(5)
    {
      self.clear_error();
    }
  }

  pub fn is_loading(&self) -> bool {
    self.catalog_rx.is_some()
  }

  /// Fetch the catalog in the background. The current feed stays usable
  /// until the result arrives.
  pub fn trigger_load(&mut self) {
    if self.is_loading() {
      return;
    }
    if self.feed.items().is_empty() {
      self.feed.begin_loading();
    } else {
      self.status_message = Some("Reloading…".to_string());
    }
    self.clear_error();

    let client = self.http_client.clone();
    let opts = self.load_options.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(load_catalog(&client, &opts).await);
    });
    self.catalog_rx = Some(rx);
  }

  pub fn check_pending(&mut self) {
    let Some(mut rx) = self.catalog_rx.take() else { return };
    match rx.try_recv() {
      Ok(result) => self.apply_catalog(result),
      Err(oneshot::error::TryRecvError::Empty) => {
        self.catalog_rx = Some(rx);
      }
      Err(oneshot::error::TryRecvError::Closed) => {
        self.apply_catalog(Err(anyhow::anyhow!("Catalog task failed.")));
      }
    }
  }

  fn apply_catalog(&mut self, result: CatalogResult) {
    self.status_message = None;
    match result {
      Ok(items) => {
        info!(count = items.len(), "app: catalog ready");
        self.feed.replace_catalog(items);
      }
      Err(e) => {
        let msg = format!("{:#}", e);
        error!(err = %msg, "app: catalog load failed");
        // A failed reload keeps the feed that is already on screen.
        if self.feed.items().is_empty() {
          self.feed.fail(msg);
        } else {
          self.set_error(format!("Reload failed: {}", msg));
        }
      }
    }
  }

  /// Advance the feed's animation and polling by the wall time since the last tick.
  pub fn tick(&mut self, now: Instant) {
    let dt = now.saturating_duration_since(self.last_tick);
    self.last_tick = now;
    self.feed.tick(dt);
  }

  pub fn status(&self) -> &FeedStatus {
    self.feed.status()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::media::fake::FakeHost;

  fn app() -> App<FakeHost> {
    App::new(FakeHost::default(), Client::new(), FeedSettings::default(), LoadOptions::default())
  }

  fn items(n: usize) -> Vec<VideoItem> {
    (0..n).map(|i| VideoItem::new(i.to_string(), format!("https://cdn.example.com/{}.mp4", i))).collect()
  }

  // --- catalog results ---

  #[test]
  fn successful_load_fills_feed() {
    let mut app = app();
    app.apply_catalog(Ok(items(3)));
    assert_eq!(app.status(), &FeedStatus::Ready);
    assert_eq!(app.feed.total_slides(), 4);
    assert_eq!(app.feed.active_index(), Some(0));
  }

  #[test]
  fn empty_load_is_ready_with_no_slides() {
    let mut app = app();
    app.apply_catalog(Ok(Vec::new()));
    assert_eq!(app.status(), &FeedStatus::Ready);
    assert_eq!(app.feed.total_slides(), 0);
  }

  #[test]
  fn first_load_failure_marks_feed_failed() {
    let mut app = app();
    app.apply_catalog(Err(anyhow::anyhow!("boom")));
    assert_eq!(app.status(), &FeedStatus::Failed("boom".to_string()));
    assert!(app.last_error.is_none());
  }

  #[test]
  fn failed_reload_keeps_existing_feed() {
    let mut app = app();
    app.apply_catalog(Ok(items(2)));
    app.feed.navigate(1);
    app.apply_catalog(Err(anyhow::anyhow!("offline")));
    assert_eq!(app.status(), &FeedStatus::Ready);
    assert_eq!(app.feed.current_slide(), 1);
    assert_eq!(app.last_error.as_deref(), Some("Reload failed: offline"));
  }

  // --- errors ---

  #[test]
  fn fresh_error_is_not_expired() {
    let mut app = app();
    app.set_error("x".into());
    app.expire_error();
    assert_eq!(app.last_error.as_deref(), Some("x"));
    app.clear_error();
    assert!(app.last_error.is_none());
  }

  // --- tick ---

  #[test]
  fn tick_moves_viewport_towards_target() {
    let mut app = app();
    app.apply_catalog(Ok(items(3)));
    app.feed.navigate(1);
    let start = app.last_tick;
    app.tick(start + Duration::from_millis(50));
    let offset = app.feed.viewport_offset();
    assert!(offset > 0.0 && offset < 1.0);
  }
}
