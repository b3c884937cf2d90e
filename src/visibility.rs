//! Viewport geometry and push-style visibility reporting for feed slides.
//!
//! The feed is a vertical strip of slides, each exactly one viewport tall.
//! Positions are measured in slide units: offset `2.5` means the viewport's
//! top edge sits halfway through slide 2.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Scroll position of the strip with an eased animation toward a target.
#[derive(Debug, Clone)]
pub struct Viewport {
  offset: f32,
  target: f32,
  ease: Duration,
}

impl Viewport {
  pub fn new(ease: Duration) -> Self {
    Self { offset: 0.0, target: 0.0, ease }
  }

  pub fn offset(&self) -> f32 {
    self.offset
  }

  pub fn is_scrolling(&self) -> bool {
    self.offset != self.target
  }

  /// Slide an in-flight scroll is heading to.
  pub fn scroll_target(&self) -> Option<usize> {
    self.is_scrolling().then_some(self.target as usize)
  }

  /// Start a smooth scroll that aligns `slide` with the top of the viewport.
  pub fn scroll_into_view(&mut self, slide: usize) {
    self.target = slide as f32;
  }

  /// Jump without animation.
  pub fn reset(&mut self, slide: usize) {
    self.target = slide as f32;
    self.offset = self.target;
  }

  /// Advance the animation by `dt`. Returns true if the offset moved.
  pub fn step(&mut self, dt: Duration) -> bool {
    if !self.is_scrolling() {
      return false;
    }
    let tau = self.ease.as_secs_f32().max(f32::EPSILON);
    let alpha = 1.0 - (-dt.as_secs_f32() / tau).exp();
    self.offset += (self.target - self.offset) * alpha;
    if (self.target - self.offset).abs() < 0.005 {
      self.offset = self.target;
    }
    true
  }

  /// Fraction of `slide` inside the viewport, in `[0, 1]`.
  pub fn intersection_ratio(&self, slide: usize) -> f32 {
    let top = slide as f32;
    let overlap = (top + 1.0).min(self.offset + 1.0) - top.max(self.offset);
    overlap.clamp(0.0, 1.0)
  }
}

/// One visibility report for an observed slide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityEntry {
  pub target: usize,
  pub ratio: f32,
  pub is_intersecting: bool,
}

#[derive(Debug)]
struct Observer {
  target: usize,
  last_ratio: Option<f32>,
}

#[derive(Debug, Default)]
struct Registry {
  observers: BTreeMap<u64, Observer>,
  next_id: u64,
}

/// Reports threshold crossings of observed slides, like an intersection
/// observer. Registration returns an [`Observation`] that unregisters on drop.
#[derive(Debug, Clone)]
pub struct VisibilityTracker {
  registry: Rc<RefCell<Registry>>,
  thresholds: Vec<f32>,
}

/// Scoped registration with a [`VisibilityTracker`].
#[derive(Debug)]
pub struct Observation {
  id: u64,
  registry: Weak<RefCell<Registry>>,
}

impl Drop for Observation {
  fn drop(&mut self) {
    if let Some(registry) = self.registry.upgrade() {
      registry.borrow_mut().observers.remove(&self.id);
    }
  }
}

impl VisibilityTracker {
  pub fn new(thresholds: Vec<f32>) -> Self {
    Self { registry: Rc::new(RefCell::new(Registry::default())), thresholds }
  }

  /// Start observing `target`. The first [`VisibilityTracker::collect`] after
  /// registration always reports it.
  pub fn observe(&self, target: usize) -> Observation {
    let mut registry = self.registry.borrow_mut();
    let id = registry.next_id;
    registry.next_id += 1;
    registry.observers.insert(id, Observer { target, last_ratio: None });
    Observation { id, registry: Rc::downgrade(&self.registry) }
  }

  #[cfg(test)]
  pub fn observer_count(&self) -> usize {
    self.registry.borrow().observers.len()
  }

  /// Measure every observed slide against `viewport` and return the entries
  /// whose ratio crossed a threshold since the last report.
  pub fn collect(&self, viewport: &Viewport) -> Vec<VisibilityEntry> {
    let mut registry = self.registry.borrow_mut();
    let mut entries = Vec::new();
    for observer in registry.observers.values_mut() {
      let ratio = viewport.intersection_ratio(observer.target);
      let crossed = match observer.last_ratio {
        None => true,
        Some(prev) => self.thresholds.iter().any(|&t| (prev < t) != (ratio < t)) || (prev > 0.0) != (ratio > 0.0),
      };
      observer.last_ratio = Some(ratio);
      if crossed {
        entries.push(VisibilityEntry { target: observer.target, ratio, is_intersecting: ratio > 0.0 });
      }
    }
    entries
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const EASE: Duration = Duration::from_millis(90);

  // --- Viewport ---

  #[test]
  fn ratio_of_aligned_and_straddling_slides() {
    let mut vp = Viewport::new(EASE);
    assert_eq!(vp.intersection_ratio(0), 1.0);
    assert_eq!(vp.intersection_ratio(1), 0.0);
    vp.offset = 0.25;
    assert!((vp.intersection_ratio(0) - 0.75).abs() < 1e-6);
    assert!((vp.intersection_ratio(1) - 0.25).abs() < 1e-6);
  }

  #[test]
  fn scroll_eases_and_settles() {
    let mut vp = Viewport::new(EASE);
    vp.scroll_into_view(3);
    assert!(vp.step(Duration::from_millis(16)));
    assert!(vp.offset() > 0.0 && vp.offset() < 3.0);
    for _ in 0..200 {
      vp.step(Duration::from_millis(16));
    }
    assert_eq!(vp.offset(), 3.0);
    assert!(!vp.is_scrolling());
  }

  // --- VisibilityTracker ---

  #[test]
  fn first_collect_reports_every_observer() {
    let tracker = VisibilityTracker::new(vec![0.0, 0.6, 1.0]);
    let _a = tracker.observe(0);
    let _b = tracker.observe(1);
    let vp = Viewport::new(EASE);
    let entries = tracker.collect(&vp);
    assert_eq!(entries.len(), 2);
    assert!(entries[0].is_intersecting);
    assert!(!entries[1].is_intersecting);
    assert!(tracker.collect(&vp).is_empty());
  }

  #[test]
  fn reports_threshold_crossings_only() {
    let tracker = VisibilityTracker::new(vec![0.0, 0.6, 1.0]);
    let _obs = tracker.observe(1);
    let mut vp = Viewport::new(EASE);
    tracker.collect(&vp);
    vp.offset = 0.3;
    let entries = tracker.collect(&vp);
    assert_eq!(entries.len(), 1);
    assert!((entries[0].ratio - 0.3).abs() < 1e-6);
    vp.offset = 0.4;
    assert!(tracker.collect(&vp).is_empty());
    vp.offset = 0.7;
    let entries = tracker.collect(&vp);
    assert_eq!(entries.len(), 1);
    assert!(entries[0].ratio > 0.6);
  }

  #[test]
  fn dropping_observation_unregisters() {
    let tracker = VisibilityTracker::new(vec![0.0, 0.6, 1.0]);
    let obs = tracker.observe(0);
    assert_eq!(tracker.observer_count(), 1);
    drop(obs);
    assert_eq!(tracker.observer_count(), 0);
  }
}
