//! Backend seams between the feed core and whatever actually plays media.
//!
//! A cell talks to exactly one of two backends: a [`MediaHandle`] it can play
//! and pause directly (and whose play attempts settle asynchronously), or an
//! [`EmbedFrame`] it can only send one-way messages to. Warm-up handles for
//! the preloader are a third, passive kind.

use thiserror::Error;

use crate::catalog::VideoItem;
use crate::embed::EmbedMessage;

/// Why a play attempt on a direct media handle was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
  /// The environment refused to start playback without a user gesture.
  #[error("playback blocked until user interaction")]
  Blocked,
  /// The resource or its player failed.
  #[error("media error: {0}")]
  Media(String),
}

pub type PlayOutcome = Result<(), PlaybackError>;

/// How eagerly a direct media handle should buffer while not playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadHint {
  Metadata,
  Auto,
}

/// A directly controllable media resource.
pub trait MediaHandle {
  fn set_preload(&mut self, hint: PreloadHint);
  /// Begin a play attempt. Its outcome is reported later through [`MediaHandle::poll_play`].
  fn play(&mut self);
  fn pause(&mut self);
  fn is_paused(&self) -> bool;
  /// Take the outcome of the most recent play attempt once it has settled.
  fn poll_play(&mut self) -> Option<PlayOutcome>;
  fn release(&mut self);
}

/// Parameters for mounting an embedded player frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMount {
  pub url: String,
  pub origin: &'static str,
  pub autoplay: bool,
  pub visible: bool,
}

/// A mounted cross-origin player. There is no way to read its state back.
pub trait EmbedFrame {
  /// Fire-and-forget delivery of a control message.
  fn post(&mut self, message: &EmbedMessage);
  fn set_visible(&mut self, visible: bool);
  fn unmount(&mut self);
}

/// A passive resource warming one source.
pub trait WarmHandle {
  /// Drop the underlying resource. Called before the handle leaves the cache.
  fn release(&mut self);
}

/// Factory for every backend resource the feed needs.
pub trait MediaHost {
  type Media: MediaHandle;
  type Frame: EmbedFrame;
  type Warm: WarmHandle;

  fn create_media(&mut self, item: &VideoItem, hint: PreloadHint) -> Self::Media;
  fn mount_frame(&mut self, item: &VideoItem, mount: FrameMount) -> Self::Frame;
  /// Create a handle that starts buffering `src` immediately.
  fn warm(&mut self, src: &str) -> Self::Warm;
}
