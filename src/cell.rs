//! Per-item playback state machine.
//!
//! A cell never decides on its own whether it is active; the controller tells
//! it through [`PlaybackCell::sync`]. What the cell owns is the intent that
//! follows from that (play, user-paused, warm, dormant) and relaying it to
//! whichever backend its source resolved to.

use tracing::{debug, warn};

use crate::catalog::VideoItem;
use crate::embed::{self, EmbedTarget, PlayerCommand};
use crate::media::{EmbedFrame, FrameMount, MediaHandle, MediaHost, PreloadHint};
use crate::visibility::Observation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
  /// Not active and outside the warm window.
  Dormant,
  /// Not active, resource mounted and warming.
  Preloading,
  /// Active with intent to play.
  Playing,
  /// Active, paused by explicit user action (or a rejected play attempt).
  UserPaused,
}

impl CellState {
  pub fn is_active(self) -> bool {
    matches!(self, CellState::Playing | CellState::UserPaused)
  }
}

struct MountedFrame<F> {
  frame: F,
  url: String,
  visible: bool,
}

enum Backend<M, F> {
  Direct { media: Option<M> },
  Embed { target: EmbedTarget, mounted: Option<MountedFrame<F>> },
}

pub struct PlaybackCell<H: MediaHost> {
  index: usize,
  item: VideoItem,
  backend: Backend<H::Media, H::Frame>,
  is_active: bool,
  preload: bool,
  user_paused: bool,
  /// Set once the cell has ever been mounted for preloading. Later mounts
  /// request autoplay-off.
  was_preloaded: bool,
  /// Set by a pointer-down that already resumed playback, so the click that
  /// follows doesn't immediately pause again.
  skip_next_toggle: bool,
  /// Embeds may have been refused autoplay; the first gesture while active
  /// re-sends play.
  needs_first_resume: bool,
  /// The outstanding direct play attempt was started by a user gesture.
  gesture_attempt: bool,
  _observation: Observation,
}

impl<H: MediaHost> PlaybackCell<H> {
  pub fn new(index: usize, item: VideoItem, observation: Observation) -> Self {
    let backend = match embed::resolve(&item.src) {
      Some(target) => Backend::Embed { target, mounted: None },
      None => Backend::Direct { media: None },
    };
    let needs_first_resume = matches!(backend, Backend::Embed { .. });
    Self {
      index,
      item,
      backend,
      is_active: false,
      preload: false,
      user_paused: false,
      was_preloaded: false,
      skip_next_toggle: false,
      needs_first_resume,
      gesture_attempt: false,
      _observation: observation,
    }
  }

  pub fn index(&self) -> usize {
    self.index
  }

  #[cfg(test)]
  pub fn platform(&self) -> Option<embed::Platform> {
    match &self.backend {
      Backend::Embed { target, .. } => Some(target.platform),
      Backend::Direct { .. } => None,
    }
  }

  /// Whether a live resource (media handle or frame) is currently held.
  pub fn is_mounted(&self) -> bool {
    match &self.backend {
      Backend::Direct { media } => media.is_some(),
      Backend::Embed { mounted, .. } => mounted.is_some(),
    }
  }

  pub fn state(&self) -> CellState {
    match (self.is_active, self.user_paused, self.preload) {
      (true, false, _) => CellState::Playing,
      (true, true, _) => CellState::UserPaused,
      (false, _, true) => CellState::Preloading,
      (false, _, false) => CellState::Dormant,
    }
  }

  /// Apply the controller's view: whether this cell is the active one and
  /// whether it sits in the warm window.
  pub fn sync(&mut self, host: &mut H, active: bool, preload: bool) {
    let was_active = self.is_active;
    let intended_play = was_active && !self.user_paused;

    if active != was_active {
      self.user_paused = false;
      self.skip_next_toggle = false;
    }
    self.is_active = active;
    self.preload = preload && !active;
    if self.preload {
      self.was_preloaded = true;
    }

    let freshly_mounted = self.mount(host);
    let intend_play = self.is_active && !self.user_paused;
    if intend_play != intended_play || freshly_mounted {
      debug!(index = self.index, state = ?self.state(), "cell: intent changed");
      if intend_play {
        self.request_play(false);
      } else {
        self.halt();
      }
    }
  }

  /// Mount, adjust or release backend resources for the current flags.
  /// Returns true if a new resource was created.
  fn mount(&mut self, host: &mut H) -> bool {
    let wanted = self.is_active || self.preload;
    let hint = if self.preload { PreloadHint::Auto } else { PreloadHint::Metadata };
    match &mut self.backend {
      Backend::Direct { media } => match (wanted, media.as_mut()) {
        (true, Some(handle)) => {
          handle.set_preload(hint);
          false
        }
        (true, None) => {
          *media = Some(host.create_media(&self.item, hint));
          true
        }
        (false, Some(handle)) => {
          handle.pause();
          handle.release();
          *media = None;
          false
        }
        (false, None) => false,
      },
      Backend::Embed { target, mounted } => {
        if !wanted {
          if let Some(mut m) = mounted.take() {
            m.frame.unmount();
          }
          return false;
        }
        let autoplay = !self.was_preloaded && self.is_active;
        let url = target.url(autoplay);
        if let Some(m) = mounted.as_mut() {
          if m.url == url {
            if m.visible != self.is_active {
              m.frame.set_visible(self.is_active);
              m.visible = self.is_active;
            }
            return false;
          }
          m.frame.unmount();
        }
        let mount =
          FrameMount { url: url.clone(), origin: target.platform.player_origin(), autoplay, visible: self.is_active };
        debug!(index = self.index, url = %url, autoplay, "cell: mounting frame");
        let frame = host.mount_frame(&self.item, mount);
        *mounted = Some(MountedFrame { frame, url, visible: self.is_active });
        true
      }
    }
  }

  /// Returns false if there was nothing to send the request to.
  fn request_play(&mut self, gesture: bool) -> bool {
    match &mut self.backend {
      Backend::Direct { media: Some(handle) } => {
        handle.play();
        self.gesture_attempt = gesture;
        true
      }
      Backend::Embed { target, mounted: Some(m) } => {
        m.frame.post(&embed::control_message(target.platform, PlayerCommand::Play));
        self.user_paused = false;
        if gesture {
          self.needs_first_resume = false;
        }
        true
      }
      _ => false,
    }
  }

  fn halt(&mut self) {
    match &mut self.backend {
      Backend::Direct { media: Some(handle) } => handle.pause(),
      Backend::Embed { target, mounted: Some(m) } => {
        m.frame.post(&embed::control_message(target.platform, PlayerCommand::Pause))
      }
      _ => {}
    }
  }

  /// Pick up the settled outcome of a direct play attempt.
  pub fn poll(&mut self) {
    let Backend::Direct { media: Some(handle) } = &mut self.backend else { return };
    let Some(outcome) = handle.poll_play() else { return };
    let gesture = std::mem::take(&mut self.gesture_attempt);
    match outcome {
      Ok(()) if self.is_active => {
        self.user_paused = false;
        if gesture {
          self.needs_first_resume = false;
        }
      }
      Ok(()) => handle.pause(),
      Err(e) => {
        warn!(index = self.index, err = %e, "cell: play attempt rejected");
        if self.is_active {
          self.user_paused = true;
        }
        self.skip_next_toggle = false;
      }
    }
  }

  /// Pointer-down on the active cell counts as the gesture that unlocks a
  /// blocked or paused playback.
  pub fn pointer_down(&mut self) {
    if !self.is_active {
      return;
    }
    let should_attempt = match &self.backend {
      Backend::Direct { media: Some(handle) } => handle.is_paused(),
      Backend::Embed { mounted: Some(_), .. } => self.user_paused || self.needs_first_resume,
      _ => false,
    };
    if !should_attempt {
      return;
    }
    self.skip_next_toggle = true;
    if !self.request_play(true) {
      self.skip_next_toggle = false;
    }
  }

  /// The pointer-down was not followed by a click (the gesture became a drag).
  pub fn cancel_click(&mut self) {
    self.skip_next_toggle = false;
  }

  /// Click on the cell: toggle between playing and user-paused.
  pub fn toggle(&mut self) {
    if std::mem::take(&mut self.skip_next_toggle) || !self.is_active {
      return;
    }
    let paused_direct = match &self.backend {
      Backend::Direct { media: Some(handle) } => Some(handle.is_paused()),
      Backend::Direct { media: None } => return,
      Backend::Embed { .. } => None,
    };
    match paused_direct {
      Some(true) => {
        self.request_play(true);
      }
      Some(false) => {
        self.halt();
        self.user_paused = true;
      }
      None => {
        self.user_paused = !self.user_paused;
        if self.user_paused {
          self.halt();
        } else {
          self.request_play(false);
        }
      }
    }
    debug!(index = self.index, state = ?self.state(), "cell: toggled");
  }

  fn teardown(&mut self) {
    match &mut self.backend {
      Backend::Direct { media } => {
        if let Some(mut handle) = media.take() {
          handle.release();
        }
      }
      Backend::Embed { mounted, .. } => {
        if let Some(mut m) = mounted.take() {
          m.frame.unmount();
        }
      }
    }
  }
}

impl<H: MediaHost> Drop for PlaybackCell<H> {
  fn drop(&mut self) {
    self.teardown();
  }
}
