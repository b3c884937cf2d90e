//! The feed controller: one current slide, one active cell.
//!
//! Every navigation trigger (keys, swipes, wheel, visibility) funnels into
//! [`FeedController::navigate`] or [`FeedController::set_visible`]. After
//! each change the controller reconciles the preloader and re-syncs all
//! cells, deactivating the old cell before activating the new one.

use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::catalog::VideoItem;
use crate::cell::{CellState, PlaybackCell};
use crate::constants::constants;
use crate::gesture::{Step, SwipeConfig, SwipeEnd, SwipeTracker, WheelGate};
use crate::media::MediaHost;
use crate::preload::{Preloader, warm_window};
use crate::visibility::{Observation, Viewport, VisibilityTracker};

/// Configuration resolved once at start-up and passed down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSettings {
  /// Items after the current one to keep warm.
  pub ahead_window: usize,
  /// Items before the current one to keep warm.
  pub behind_window: usize,
}

impl Default for FeedSettings {
  fn default() -> Self {
    let c = constants();
    Self { ahead_window: c.default_ahead_window, behind_window: c.default_behind_window }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
  Loading,
  Failed(String),
  Ready,
}

/// Keys the feed reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKey {
  Down,
  PageDown,
  Up,
  PageUp,
  Home,
  End,
}

pub struct FeedController<H: MediaHost> {
  host: H,
  settings: FeedSettings,
  activation_ratio: f32,
  status: FeedStatus,
  items: Vec<VideoItem>,
  cells: Vec<PlaybackCell<H>>,
  /// In `[0, items.len()]`; `items.len()` is the terminal slide.
  current_slide: usize,
  viewport: Viewport,
  tracker: VisibilityTracker,
  end_observation: Option<Observation>,
  preloader: Preloader<H::Warm>,
  swipe: SwipeTracker,
  wheel: WheelGate,
}

impl<H: MediaHost> FeedController<H> {
  pub fn new(host: H, settings: FeedSettings) -> Self {
    let c = constants();
    Self {
      host,
      settings,
      activation_ratio: c.activation_ratio,
      status: FeedStatus::Loading,
      items: Vec::new(),
      cells: Vec::new(),
      current_slide: 0,
      viewport: Viewport::new(Duration::from_secs_f32(c.scroll_ease_ms / 1000.0)),
      tracker: VisibilityTracker::new(c.visibility_thresholds.clone()),
      end_observation: None,
      preloader: Preloader::new(c.preload_cache_limit),
      swipe: SwipeTracker::new(SwipeConfig::from_constants(c)),
      wheel: WheelGate::new(c.wheel_threshold_px, Duration::from_millis(c.wheel_debounce_ms)),
    }
  }

  // --- Catalog ---

  pub fn begin_loading(&mut self) {
    self.status = FeedStatus::Loading;
  }

  pub fn fail(&mut self, message: String) {
    self.status = FeedStatus::Failed(message);
  }

  /// Replace the whole catalog. Old cells are torn down, new ones observed.
  pub fn replace_catalog(&mut self, items: Vec<VideoItem>) {
    info!(count = items.len(), "feed: catalog replaced");
    self.cells.clear();
    self.end_observation = None;
    self.swipe.cancel();
    self.cells = items
      .iter()
      .enumerate()
      .map(|(i, item)| PlaybackCell::new(i, item.clone(), self.tracker.observe(i)))
      .collect();
    if !items.is_empty() {
      self.end_observation = Some(self.tracker.observe(items.len()));
    }
    self.items = items;
    self.current_slide = 0;
    self.viewport.reset(0);
    self.status = FeedStatus::Ready;
    self.refresh();
  }

  // --- Queries ---

  pub fn status(&self) -> &FeedStatus {
    &self.status
  }

  pub fn items(&self) -> &[VideoItem] {
    &self.items
  }

  pub fn cells(&self) -> &[PlaybackCell<H>] {
    &self.cells
  }

  pub fn cell_state(&self, index: usize) -> Option<CellState> {
    self.cells.get(index).map(PlaybackCell::state)
  }

  pub fn current_slide(&self) -> usize {
    self.current_slide
  }

  /// Item slides plus the terminal slide, or zero for an empty catalog.
  pub fn total_slides(&self) -> usize {
    if self.items.is_empty() { 0 } else { self.items.len() + 1 }
  }

  /// `None` while the terminal slide is current.
  pub fn active_index(&self) -> Option<usize> {
    (self.current_slide < self.items.len()).then_some(self.current_slide)
  }

  pub fn viewport_offset(&self) -> f32 {
    self.viewport.offset()
  }

  /// Cosmetic drag displacement for the active slide, in pixels.
  pub fn drag_offset(&self) -> f32 {
    self.swipe.feedback_offset()
  }

  // --- Navigation ---

  /// A slide crossed the activation threshold: it becomes current.
  pub fn set_visible(&mut self, index: usize) {
    if index >= self.total_slides() || index == self.current_slide {
      return;
    }
    debug!(index, "feed: visible");
    self.current_slide = index;
    self.refresh();
  }

  /// Clamp `target` to the slide range, make it current and scroll to it.
  pub fn navigate(&mut self, target: isize) {
    let total = self.total_slides();
    if total == 0 {
      return;
    }
    let clamped = target.clamp(0, total as isize - 1) as usize;
    self.viewport.scroll_into_view(clamped);
    if clamped != self.current_slide {
      info!(from = self.current_slide, to = clamped, "feed: navigate");
      self.current_slide = clamped;
      self.refresh();
    }
  }

  pub fn step(&mut self, step: Step) {
    let current = self.current_slide as isize;
    match step {
      Step::Next => self.navigate(current + 1),
      Step::Previous => self.navigate(current - 1),
    }
  }

  pub fn first(&mut self) {
    self.navigate(0);
  }

  /// Last item, not the terminal slide.
  pub fn last(&mut self) {
    self.navigate(self.items.len() as isize - 1);
  }

  /// Returns true when the key was consumed.
  pub fn handle_key(&mut self, key: FeedKey) -> bool {
    match key {
      FeedKey::Down | FeedKey::PageDown => self.step(Step::Next),
      FeedKey::Up | FeedKey::PageUp => self.step(Step::Previous),
      FeedKey::Home => self.first(),
      FeedKey::End => self.last(),
    }
    true
  }

  // --- Pointer and wheel ---

  pub fn pointer_down(&mut self, y: f32, at: Instant, is_primary: bool) {
    self.swipe.pointer_down(y, at, is_primary);
    if is_primary && let Some(cell) = self.active_cell_mut() {
      cell.pointer_down();
    }
  }

  pub fn pointer_move(&mut self, y: f32) -> Option<f32> {
    self.swipe.pointer_move(y)
  }

  /// Finish a drag: swipe navigation, a click on the active cell, or nothing.
  pub fn pointer_up(&mut self, at: Instant) -> Option<SwipeEnd> {
    let end = self.swipe.pointer_up(at)?;
    match end {
      SwipeEnd::Navigate(step) => {
        // A clamped step leaves the same cell active.
        if let Some(cell) = self.active_cell_mut() {
          cell.cancel_click();
        }
        self.step(step);
      }
      SwipeEnd::Tap => {
        if let Some(cell) = self.active_cell_mut() {
          cell.toggle();
        }
      }
      SwipeEnd::SnapBack => {
        if let Some(cell) = self.active_cell_mut() {
          cell.cancel_click();
        }
      }
    }
    Some(end)
  }

  pub fn pointer_cancel(&mut self) {
    self.swipe.cancel();
    if let Some(cell) = self.active_cell_mut() {
      cell.cancel_click();
    }
  }

  /// Returns true when the wheel event triggered navigation.
  pub fn wheel(&mut self, delta_y: f32, at: Instant) -> bool {
    match self.wheel.on_wheel(delta_y, at) {
      Some(step) => {
        self.step(step);
        true
      }
      None => false,
    }
  }

  /// Keyboard activation of the active cell: a press followed by a click.
  pub fn press_active(&mut self) {
    if let Some(cell) = self.active_cell_mut() {
      cell.pointer_down();
      cell.toggle();
    }
  }

  fn active_cell_mut(&mut self) -> Option<&mut PlaybackCell<H>> {
    let index = self.active_index()?;
    self.cells.get_mut(index)
  }

  // --- Frame loop ---

  /// Advance scrolling, deliver visibility reports and collect settled play
  /// attempts.
  pub fn tick(&mut self, dt: Duration) {
    self.viewport.step(dt);
    let heading_to = self.viewport.scroll_target();
    for entry in self.tracker.collect(&self.viewport) {
      // Slides swept past during a programmatic scroll don't take over.
      if heading_to.is_some_and(|target| target != entry.target) {
        continue;
      }
      if entry.is_intersecting && entry.ratio > self.activation_ratio {
        self.set_visible(entry.target);
      }
    }
    for cell in &mut self.cells {
      cell.poll();
    }
  }

  fn refresh(&mut self) {
    let active = self.active_index();
    let FeedSettings { ahead_window, behind_window } = self.settings;
    let warm: HashSet<usize> =
      warm_window(self.items.len(), self.current_slide, ahead_window, behind_window).into_iter().collect();

    let host = &mut self.host;
    self.preloader.reconcile(&self.items, self.current_slide, ahead_window, behind_window, |src| host.warm(src));

    // Pause the outgoing cell before anything starts playing.
    for cell in self.cells.iter_mut().filter(|c| c.state().is_active() && Some(c.index()) != active) {
      let preload = warm.contains(&cell.index());
      cell.sync(host, false, preload);
    }
    for cell in &mut self.cells {
      let index = cell.index();
      cell.sync(host, Some(index) == active, warm.contains(&index));
    }
  }
}
