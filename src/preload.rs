//! Sliding-window warm-up of upcoming and recently seen sources.

use std::collections::HashSet;
use tracing::debug;

use crate::catalog::VideoItem;
use crate::media::WarmHandle;

/// Indices kept warm around `current`: up to `ahead` after it, then up to
/// `behind` before it. `current` itself is never included.
pub fn warm_window(len: usize, current: usize, ahead: usize, behind: usize) -> Vec<usize> {
  let ahead_start = (current + 1).min(len);
  let ahead_end = current.saturating_add(1).saturating_add(ahead).min(len);
  let behind_start = current.saturating_sub(behind);
  let behind_end = current.min(len);
  (ahead_start..ahead_end).chain(behind_start.min(behind_end)..behind_end).collect()
}

/// Bounded cache of warm handles keyed by source, oldest insertion first.
pub struct Preloader<W: WarmHandle> {
  entries: Vec<(String, W)>,
  limit: usize,
}

impl<W: WarmHandle> Preloader<W> {
  pub fn new(limit: usize) -> Self {
    Self { entries: Vec::new(), limit }
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn contains(&self, src: &str) -> bool {
    self.entries.iter().any(|(s, _)| s == src)
  }

  /// Sources currently cached, oldest first.
  #[cfg(test)]
  pub fn sources(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|(s, _)| s.as_str())
  }

  /// Warm every source in the window that isn't cached yet, then trim the
  /// cache back to its limit. Idempotent for unchanged inputs.
  pub fn reconcile(
    &mut self,
    items: &[VideoItem],
    current: usize,
    ahead: usize,
    behind: usize,
    mut warm: impl FnMut(&str) -> W,
  ) {
    let mut wanted = HashSet::new();
    for idx in warm_window(items.len(), current, ahead, behind) {
      let src = items[idx].src.as_str();
      if !wanted.insert(src) || self.contains(src) {
        continue;
      }
      debug!(index = idx, src, "preload: warming");
      self.entries.push((src.to_string(), warm(src)));
    }
    self.trim();
  }

  fn trim(&mut self) {
    let excess = self.entries.len().saturating_sub(self.limit);
    for (src, mut handle) in self.entries.drain(..excess) {
      debug!(src = %src, "preload: evicting");
      handle.release();
    }
  }

  /// Release every cached handle.
  pub fn clear(&mut self) {
    for (_, mut handle) in self.entries.drain(..) {
      handle.release();
    }
  }
}

impl<W: WarmHandle> Drop for Preloader<W> {
  fn drop(&mut self) {
    self.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::RefCell;
  use std::rc::Rc;

  struct Probe {
    src: String,
    released: Rc<RefCell<Vec<String>>>,
  }

  impl WarmHandle for Probe {
    fn release(&mut self) {
      self.released.borrow_mut().push(self.src.clone());
    }
  }

  fn items(n: usize) -> Vec<VideoItem> {
    (0..n).map(|i| VideoItem::new(i.to_string(), format!("https://cdn/{}.mp4", i))).collect()
  }

  fn sorted(mut v: Vec<usize>) -> Vec<usize> {
    v.sort_unstable();
    v
  }

  // --- warm_window ---

  #[test]
  fn window_excludes_current() {
    assert_eq!(sorted(warm_window(10, 5, 2, 1)), vec![4, 6, 7]);
  }

  #[test]
  fn window_clips_at_edges() {
    assert_eq!(sorted(warm_window(10, 0, 2, 1)), vec![1, 2]);
    assert_eq!(sorted(warm_window(10, 9, 2, 1)), vec![8]);
    assert_eq!(sorted(warm_window(3, 3, 2, 1)), vec![2]);
    assert!(warm_window(0, 0, 2, 1).is_empty());
  }

  // --- reconcile ---

  #[test]
  fn reconcile_is_idempotent() {
    let released = Rc::new(RefCell::new(Vec::new()));
    let mut created = 0;
    let mut pre = Preloader::new(8);
    let list = items(10);
    for _ in 0..3 {
      pre.reconcile(&list, 5, 2, 1, |src| {
        created += 1;
        Probe { src: src.to_string(), released: released.clone() }
      });
    }
    assert_eq!(created, 3);
    assert_eq!(pre.len(), 3);
    assert!(released.borrow().is_empty());
  }

  #[test]
  fn reconcile_dedups_shared_sources() {
    let released = Rc::new(RefCell::new(Vec::new()));
    let mut list = items(4);
    list[2].src = list[1].src.clone();
    let mut pre = Preloader::new(8);
    pre.reconcile(&list, 0, 3, 0, |src| Probe { src: src.to_string(), released: released.clone() });
    assert_eq!(pre.len(), 2);
  }

  #[test]
  fn cache_bounded_oldest_evicted_first() {
    let released = Rc::new(RefCell::new(Vec::new()));
    let list = items(30);
    let mut pre = Preloader::new(8);
    for current in 0..20 {
      pre.reconcile(&list, current, 2, 1, |src| Probe { src: src.to_string(), released: released.clone() });
      assert!(pre.len() <= 8);
    }
    // Insertion order is 1, 2, 3, 0, 4, 5, ..., 21, so the eight newest are 14..=21.
    let kept: Vec<&str> = pre.sources().collect();
    let expected: Vec<String> = (14..=21).map(|i| format!("https://cdn/{}.mp4", i)).collect();
    assert_eq!(kept, expected.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(released.borrow()[0], "https://cdn/1.mp4");
    assert_eq!(released.borrow().len(), 22 - 8);
  }
}
