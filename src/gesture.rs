//! Turning raw pointer drags and wheel notches into single navigation steps.

use std::time::{Duration, Instant};

use crate::constants::Constants;

/// Relative navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
  Next,
  Previous,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwipeConfig {
  pub distance_px: f32,
  pub velocity_px_per_ms: f32,
  pub flick_floor_px: f32,
  pub feedback_factor: f32,
  pub feedback_limit_px: f32,
  pub click_slop_px: f32,
}

impl SwipeConfig {
  pub fn from_constants(c: &Constants) -> Self {
    Self {
      distance_px: c.swipe_distance_px,
      velocity_px_per_ms: c.swipe_velocity_px_per_ms,
      flick_floor_px: c.swipe_flick_floor_px,
      feedback_factor: c.drag_feedback_factor,
      feedback_limit_px: c.drag_feedback_limit_px,
      click_slop_px: c.click_slop_px,
    }
  }
}

/// How a completed pointer gesture ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeEnd {
  Navigate(Step),
  /// Barely moved: the release should count as a click.
  Tap,
  /// Moved, but not far or fast enough to navigate.
  SnapBack,
}

#[derive(Debug, Clone, Copy)]
struct Drag {
  start_y: f32,
  last_y: f32,
  started_at: Instant,
}

/// Tracks one primary-pointer drag on the feed surface.
#[derive(Debug, Clone)]
pub struct SwipeTracker {
  config: SwipeConfig,
  drag: Option<Drag>,
}

impl SwipeTracker {
  pub fn new(config: SwipeConfig) -> Self {
    Self { config, drag: None }
  }

  #[cfg(test)]
  pub fn is_dragging(&self) -> bool {
    self.drag.is_some()
  }

  pub fn pointer_down(&mut self, y: f32, at: Instant, is_primary: bool) {
    if !is_primary {
      return;
    }
    self.drag = Some(Drag { start_y: y, last_y: y, started_at: at });
  }

  /// Record movement and return the cosmetic offset for the active slide.
  pub fn pointer_move(&mut self, y: f32) -> Option<f32> {
    let drag = self.drag.as_mut()?;
    drag.last_y = y;
    Some(self.feedback_offset())
  }

  /// Bounded visual displacement of the current drag, zero when idle.
  pub fn feedback_offset(&self) -> f32 {
    let Some(drag) = self.drag else { return 0.0 };
    let limit = self.config.feedback_limit_px;
    ((drag.last_y - drag.start_y) * self.config.feedback_factor).clamp(-limit, limit)
  }

  /// Finish the drag. Upward motion means "next", downward "previous".
  pub fn pointer_up(&mut self, at: Instant) -> Option<SwipeEnd> {
    let drag = self.drag.take()?;
    let dy = drag.last_y - drag.start_y;
    let dt_ms = at.saturating_duration_since(drag.started_at).as_secs_f32() * 1000.0;
    let velocity = dy / dt_ms.max(1.0);
    let distance = dy.abs();

    let far = distance > self.config.distance_px;
    let flick = velocity.abs() > self.config.velocity_px_per_ms && distance >= self.config.flick_floor_px;
    if far || flick {
      if dy < 0.0 {
        return Some(SwipeEnd::Navigate(Step::Next));
      }
      if dy > 0.0 {
        return Some(SwipeEnd::Navigate(Step::Previous));
      }
    }
    if distance <= self.config.click_slop_px { Some(SwipeEnd::Tap) } else { Some(SwipeEnd::SnapBack) }
  }

  /// Abandon the drag (pointer cancelled or left the surface).
  pub fn cancel(&mut self) {
    self.drag = None;
  }
}

/// One navigation per continuous wheel gesture.
#[derive(Debug, Clone)]
pub struct WheelGate {
  threshold_px: f32,
  debounce: Duration,
  last_fired: Option<Instant>,
}

impl WheelGate {
  pub fn new(threshold_px: f32, debounce: Duration) -> Self {
    Self { threshold_px, debounce, last_fired: None }
  }

  /// Returns a step when `delta_y` is large enough and the debounce window
  /// after the last triggered step has passed.
  pub fn on_wheel(&mut self, delta_y: f32, at: Instant) -> Option<Step> {
    if let Some(last) = self.last_fired
      && at.saturating_duration_since(last) < self.debounce
    {
      return None;
    }
    if delta_y.abs() <= self.threshold_px {
      return None;
    }
    self.last_fired = Some(at);
    Some(if delta_y > 0.0 { Step::Next } else { Step::Previous })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::constants::constants;

  fn tracker() -> SwipeTracker {
    SwipeTracker::new(SwipeConfig::from_constants(constants()))
  }

  fn swipe(dy: f32, ms: u64) -> Option<SwipeEnd> {
    let mut t = tracker();
    let t0 = Instant::now();
    t.pointer_down(500.0, t0, true);
    t.pointer_move(500.0 + dy);
    t.pointer_up(t0 + Duration::from_millis(ms))
  }

  // --- swipe ---

  #[test]
  fn upward_drag_goes_next() {
    assert_eq!(swipe(-70.0, 200), Some(SwipeEnd::Navigate(Step::Next)));
  }

  #[test]
  fn downward_drag_goes_previous() {
    assert_eq!(swipe(70.0, 200), Some(SwipeEnd::Navigate(Step::Previous)));
  }

  #[test]
  fn short_drag_does_not_navigate() {
    assert_eq!(swipe(-20.0, 200), Some(SwipeEnd::SnapBack));
    assert_eq!(swipe(-3.0, 200), Some(SwipeEnd::Tap));
  }

  #[test]
  fn fast_flick_past_floor_navigates() {
    assert_eq!(swipe(-40.0, 50), Some(SwipeEnd::Navigate(Step::Next)));
  }

  #[test]
  fn non_primary_pointer_ignored() {
    let mut t = tracker();
    t.pointer_down(0.0, Instant::now(), false);
    assert!(!t.is_dragging());
    assert_eq!(t.pointer_up(Instant::now()), None);
  }

  #[test]
  fn feedback_offset_is_bounded() {
    let mut t = tracker();
    t.pointer_down(0.0, Instant::now(), true);
    let offset = t.pointer_move(100.0).unwrap();
    assert!((offset - 15.0).abs() < 1e-3);
    assert_eq!(t.pointer_move(-2000.0), Some(-80.0));
    t.cancel();
    assert_eq!(t.feedback_offset(), 0.0);
  }

  // --- wheel ---

  #[test]
  fn wheel_debounces_continuous_scroll() {
    let mut gate = WheelGate::new(30.0, Duration::from_millis(450));
    let t0 = Instant::now();
    assert_eq!(gate.on_wheel(40.0, t0), Some(Step::Next));
    assert_eq!(gate.on_wheel(40.0, t0 + Duration::from_millis(100)), None);

    let mut gate = WheelGate::new(30.0, Duration::from_millis(450));
    assert_eq!(gate.on_wheel(-40.0, t0), Some(Step::Previous));
    assert_eq!(gate.on_wheel(-40.0, t0 + Duration::from_millis(500)), Some(Step::Previous));
  }

  #[test]
  fn small_wheel_delta_ignored() {
    let mut gate = WheelGate::new(30.0, Duration::from_millis(450));
    let t0 = Instant::now();
    assert_eq!(gate.on_wheel(10.0, t0), None);
    assert_eq!(gate.on_wheel(35.0, t0 + Duration::from_millis(1)), Some(Step::Next));
  }
}
