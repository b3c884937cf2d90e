//! Feed tuning constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so it's always available,
//! parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;

/// All tuneable feed constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // Visibility
  /// Intersection ratio a slide must exceed to become the current slide.
  pub activation_ratio: f32,
  /// Ratios at which the visibility tracker reports a change.
  pub visibility_thresholds: Vec<f32>,
  /// Time constant of the eased scroll animation.
  pub scroll_ease_ms: f32,

  // Swipe gestures
  pub swipe_distance_px: f32,
  pub swipe_velocity_px_per_ms: f32,
  /// Minimum displacement for a fast flick to count as a swipe.
  pub swipe_flick_floor_px: f32,
  pub drag_feedback_factor: f32,
  pub drag_feedback_limit_px: f32,
  pub click_slop_px: f32,
  /// Pixels represented by one terminal row.
  pub row_height_px: f32,

  // Wheel
  pub wheel_threshold_px: f32,
  pub wheel_debounce_ms: u64,
  /// Pixels represented by one terminal scroll notch.
  pub wheel_line_px: f32,

  // Preloading
  pub default_ahead_window: usize,
  pub default_behind_window: usize,
  pub preload_cache_limit: usize,
  pub prefetch_bytes: u64,

  // mpv
  pub ipc_connect_attempts: u32,
  pub ipc_connect_interval_ms: u64,
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed feed constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}
