//! mpv-backed media host.
//!
//! Every direct media handle and every embed frame is its own mpv process
//! with a JSON IPC socket. Commands are queued to a per-instance writer task
//! so they reach mpv in issue order; callers never wait on them.

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::{
  io::{AsyncBufReadExt, AsyncWriteExt, BufReader as TokioBufReader},
  net::{UnixStream, unix::OwnedReadHalf},
  process::{Child as TokioChild, Command},
  sync::{mpsc, oneshot},
};
use tracing::{debug, info, warn};

use crate::catalog::VideoItem;
use crate::constants::constants;
use crate::embed::{EmbedMessage, PlayerCommand};
use crate::media::{EmbedFrame, FrameMount, MediaHandle, MediaHost, PlayOutcome, PlaybackError, PreloadHint};
use crate::prefetch::HttpPrefetch;

#[derive(Debug, Clone, Copy)]
struct IpcRetry {
  attempts: u32,
  interval: Duration,
}

struct IpcRequest {
  command: Value,
  ack: Option<oneshot::Sender<PlayOutcome>>,
}

/// One running mpv process and its command queue.
struct Instance {
  label: String,
  child: Option<TokioChild>,
  socket: PathBuf,
  tx: Option<mpsc::UnboundedSender<IpcRequest>>,
  spawn_error: Option<String>,
}

impl Instance {
  fn launch(label: String, socket: PathBuf, retry: IpcRetry, flags: Vec<String>, target: &str) -> Self {
    match spawn_mpv(&socket, &flags, target) {
      Ok(child) => {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(ipc_writer(socket.clone(), retry, rx));
        info!(instance = %label, socket = %socket.display(), "mpv: launched");
        Self { label, child: Some(child), socket, tx: Some(tx), spawn_error: None }
      }
      Err(e) => {
        let msg = format!("{:#}", e);
        warn!(instance = %label, err = %msg, "mpv: launch failed");
        Self { label, child: None, socket, tx: None, spawn_error: Some(msg) }
      }
    }
  }

  fn send(&self, command: Value) {
    if let Some(tx) = &self.tx {
      let _ = tx.send(IpcRequest { command, ack: None });
    }
  }

  fn set_property(&self, name: &str, value: Value) {
    self.send(json!(["set_property", name, value]));
  }

  /// Queue a command whose delivery settles a play attempt.
  fn send_acked(&self, command: Value) -> oneshot::Receiver<PlayOutcome> {
    let (ack, rx) = oneshot::channel();
    let unavailable =
      || Err(PlaybackError::Media(self.spawn_error.clone().unwrap_or_else(|| "mpv not running".into())));
    match &self.tx {
      Some(tx) => {
        if let Err(mpsc::error::SendError(req)) = tx.send(IpcRequest { command, ack: Some(ack) })
          && let Some(ack) = req.ack
        {
          let _ = ack.send(unavailable());
        }
      }
      None => {
        let _ = ack.send(unavailable());
      }
    }
    rx
  }

  /// Exit status message if the process has already gone away.
  fn exited(&mut self) -> Option<String> {
    let child = self.child.as_mut()?;
    match child.try_wait() {
      Ok(Some(status)) => Some(format!("mpv exited ({})", status)),
      Ok(None) => None,
      Err(e) => Some(format!("mpv status unavailable: {}", e)),
    }
  }

  fn shutdown(&mut self) {
    self.tx = None;
    if let Some(mut child) = self.child.take() {
      debug!(instance = %self.label, "mpv: stopping");
      if let Err(e) = child.start_kill() {
        debug!(instance = %self.label, err = %e, "mpv: kill failed");
      }
      tokio::spawn(async move {
        let _ = child.wait().await;
      });
    }
    let _ = std::fs::remove_file(&self.socket);
  }
}

impl Drop for Instance {
  fn drop(&mut self) {
    self.shutdown();
  }
}

fn spawn_mpv(socket: &Path, flags: &[String], target: &str) -> Result<TokioChild> {
  let socket_str = socket.to_str().context("Socket path is not valid UTF-8")?;
  // Remove stale socket if it exists from a previous crash.
  let _ = std::fs::remove_file(socket);

  let mut cmd = Command::new("mpv");
  cmd.args([
    "--no-terminal",
    "--loop-file=inf",
    "--keep-open=yes",
    "--force-window=no",
    &format!("--input-ipc-server={}", socket_str),
  ]);
  cmd.args(flags);
  cmd.arg("--").arg(target);
  cmd.stdin(Stdio::null());
  cmd.stdout(Stdio::null());
  cmd.stderr(Stdio::null());
  cmd.kill_on_drop(true);

  cmd.spawn().map_err(|e| {
    if e.kind() == std::io::ErrorKind::NotFound {
      anyhow!("mpv not found. Install it with: brew install mpv (macOS) or apt install mpv (Linux)")
    } else {
      anyhow!(e).context("Failed to spawn mpv process")
    }
  })
}

async fn connect(socket: &Path, retry: IpcRetry) -> Result<UnixStream> {
  let mut last_err = None;
  for _ in 0..retry.attempts.max(1) {
    match UnixStream::connect(socket).await {
      Ok(stream) => return Ok(stream),
      Err(e) => last_err = Some(e),
    }
    tokio::time::sleep(retry.interval).await;
  }
  let err = last_err.map_or_else(|| anyhow!("no connection attempt made"), anyhow::Error::from);
  Err(err).with_context(|| format!("Failed to connect to mpv IPC socket {}", socket.display()))
}

/// Forward queued commands to mpv in order, acknowledging each.
async fn ipc_writer(socket: PathBuf, retry: IpcRetry, mut rx: mpsc::UnboundedReceiver<IpcRequest>) {
  let mut writer = match connect(&socket, retry).await {
    Ok(stream) => {
      let (read, write) = stream.into_split();
      tokio::spawn(drain_events(read));
      Some(write)
    }
    Err(e) => {
      let msg = format!("{:#}", e);
      warn!(socket = %socket.display(), err = %msg, "mpv: IPC unavailable");
      None
    }
  };

  while let Some(req) = rx.recv().await {
    let result = match writer.as_mut() {
      Some(w) => {
        let mut line = req.command_line();
        line.push(b'\n');
        w.write_all(&line).await.context("Failed to write to mpv IPC socket")
      }
      None => Err(anyhow!("mpv IPC socket unavailable")),
    };
    if let Err(e) = &result {
      let msg = format!("{:#}", e);
      debug!(socket = %socket.display(), err = %msg, "mpv: command dropped");
      writer = None;
    }
    if let Some(ack) = req.ack {
      let _ = ack.send(result.map_err(|e| PlaybackError::Media(format!("{:#}", e))));
    }
  }
}

impl IpcRequest {
  fn command_line(&self) -> Vec<u8> {
    json!({ "command": self.command }).to_string().into_bytes()
  }
}

/// mpv pushes events on the same socket; read them so its buffer never fills.
async fn drain_events(read: OwnedReadHalf) {
  let mut lines = TokioBufReader::new(read).lines();
  while let Ok(Some(line)) = lines.next_line().await {
    if let Ok(val) = serde_json::from_str::<Value>(&line)
      && let Some(event) = val.get("event").and_then(|v| v.as_str())
    {
      debug!(event, "mpv: event");
    }
  }
}

fn vid_value(visible: bool) -> Value {
  Value::from(if visible { "auto" } else { "no" })
}

// --- Direct media ---

enum PendingPlay {
  Waiting(oneshot::Receiver<PlayOutcome>),
  Settled(PlayOutcome),
}

pub struct MpvMedia {
  instance: Instance,
  hint: PreloadHint,
  paused: bool,
  pending: Option<PendingPlay>,
}

impl MediaHandle for MpvMedia {
  fn set_preload(&mut self, hint: PreloadHint) {
    if hint == self.hint {
      return;
    }
    self.hint = hint;
    // Warming instances stay headless.
    self.instance.set_property("vid", vid_value(hint == PreloadHint::Metadata));
  }

  fn play(&mut self) {
    self.paused = false;
    let rx = self.instance.send_acked(json!(["set_property", "pause", false]));
    self.pending = Some(PendingPlay::Waiting(rx));
  }

  fn pause(&mut self) {
    self.paused = true;
    self.instance.set_property("pause", Value::Bool(true));
  }

  fn is_paused(&self) -> bool {
    self.paused
  }

  fn poll_play(&mut self) -> Option<PlayOutcome> {
    if self.pending.is_some()
      && let Some(msg) = self.instance.exited()
    {
      self.pending = Some(PendingPlay::Settled(Err(PlaybackError::Media(msg))));
    }
    let outcome = match self.pending.take()? {
      PendingPlay::Settled(outcome) => outcome,
      PendingPlay::Waiting(mut rx) => match rx.try_recv() {
        Ok(outcome) => outcome,
        Err(oneshot::error::TryRecvError::Empty) => {
          self.pending = Some(PendingPlay::Waiting(rx));
          return None;
        }
        Err(oneshot::error::TryRecvError::Closed) => Err(PlaybackError::Media("mpv IPC task ended".into())),
      },
    };
    if outcome.is_err() {
      self.paused = true;
    }
    Some(outcome)
  }

  fn release(&mut self) {
    self.pending = None;
    self.instance.shutdown();
  }
}

// --- Embed frames ---

/// An embedded player URL handed to mpv (which resolves it through its ytdl hook).
pub struct MpvFrame {
  instance: Instance,
  origin: &'static str,
}

impl EmbedFrame for MpvFrame {
  fn post(&mut self, message: &EmbedMessage) {
    if message.target_origin != self.origin {
      warn!(instance = %self.instance.label, origin = message.target_origin, "mpv: message for foreign origin dropped");
      return;
    }
    match message.command() {
      Some(PlayerCommand::Play) => self.instance.set_property("pause", Value::Bool(false)),
      Some(PlayerCommand::Pause) => self.instance.set_property("pause", Value::Bool(true)),
      None => debug!(instance = %self.instance.label, "mpv: unrecognised embed message"),
    }
  }

  fn set_visible(&mut self, visible: bool) {
    self.instance.set_property("vid", vid_value(visible));
  }

  fn unmount(&mut self) {
    self.instance.shutdown();
  }
}

// --- Host ---

pub struct MpvHost {
  http_client: Client,
  socket_dir: PathBuf,
  next_instance: u64,
  retry: IpcRetry,
  prefetch_bytes: u64,
}

impl MpvHost {
  pub fn new(http_client: Client) -> Self {
    let c = constants();
    Self {
      http_client,
      socket_dir: std::env::temp_dir(),
      next_instance: 0,
      retry: IpcRetry {
        attempts: c.ipc_connect_attempts,
        interval: Duration::from_millis(c.ipc_connect_interval_ms),
      },
      prefetch_bytes: c.prefetch_bytes,
    }
  }

  fn next_socket(&mut self) -> PathBuf {
    self.next_instance += 1;
    self.socket_dir.join(format!("shortfeed-{}-{}.sock", std::process::id(), self.next_instance))
  }
}

fn item_label(item: &VideoItem) -> String {
  match &item.title {
    Some(title) => format!("{} ({})", item.id, title),
    None => item.id.clone(),
  }
}

fn media_flags(item: &VideoItem, hint: PreloadHint) -> Vec<String> {
  let mut flags = vec!["--pause".to_string(), format!("--title=shortfeed: {}", item_label(item))];
  if hint == PreloadHint::Auto {
    flags.push("--vid=no".into());
  }
  flags
}

fn frame_flags(item: &VideoItem, mount: &FrameMount) -> Vec<String> {
  let mut flags = vec!["--ytdl=yes".to_string(), format!("--title=shortfeed: {}", item_label(item))];
  if !mount.autoplay {
    flags.push("--pause".into());
  }
  if !mount.visible {
    flags.push("--vid=no".into());
  }
  flags
}

impl MediaHost for MpvHost {
  type Media = MpvMedia;
  type Frame = MpvFrame;
  type Warm = HttpPrefetch;

  fn create_media(&mut self, item: &VideoItem, hint: PreloadHint) -> MpvMedia {
    let socket = self.next_socket();
    let instance = Instance::launch(item_label(item), socket, self.retry, media_flags(item, hint), &item.src);
    MpvMedia { instance, hint, paused: true, pending: None }
  }

  fn mount_frame(&mut self, item: &VideoItem, mount: FrameMount) -> MpvFrame {
    let socket = self.next_socket();
    let flags = frame_flags(item, &mount);
    let instance = Instance::launch(item_label(item), socket, self.retry, flags, &mount.url);
    MpvFrame { instance, origin: mount.origin }
  }

  fn warm(&mut self, src: &str) -> HttpPrefetch {
    HttpPrefetch::start(&self.http_client, src, self.prefetch_bytes)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::embed::{Platform, control_message};

  fn detached(origin: &'static str) -> (MpvFrame, mpsc::UnboundedReceiver<IpcRequest>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let instance = Instance {
      label: "test".into(),
      child: None,
      socket: std::env::temp_dir().join("shortfeed-test-unused.sock"),
      tx: Some(tx),
      spawn_error: None,
    };
    (MpvFrame { instance, origin }, rx)
  }

  fn commands(rx: &mut mpsc::UnboundedReceiver<IpcRequest>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(req) = rx.try_recv() {
      out.push(req.command);
    }
    out
  }

  // --- flags ---

  #[test]
  fn warming_media_starts_paused_and_headless() {
    let item = VideoItem::new("7", "https://cdn.example.com/a.mp4").with_title("Clip");
    let flags = media_flags(&item, PreloadHint::Auto);
    assert!(flags.contains(&"--pause".to_string()));
    assert!(flags.contains(&"--vid=no".to_string()));
    assert!(flags.contains(&"--title=shortfeed: 7 (Clip)".to_string()));
    assert!(!media_flags(&item, PreloadHint::Metadata).contains(&"--vid=no".to_string()));
  }

  #[test]
  fn frame_flags_follow_mount() {
    let item = VideoItem::new("1", "https://youtu.be/abc");
    let mount = FrameMount { url: "u".into(), origin: "o", autoplay: true, visible: true };
    let flags = frame_flags(&item, &mount);
    assert!(!flags.contains(&"--pause".to_string()));
    assert!(!flags.contains(&"--vid=no".to_string()));
    let hidden = FrameMount { autoplay: false, visible: false, ..mount };
    let flags = frame_flags(&item, &hidden);
    assert!(flags.contains(&"--pause".to_string()));
    assert!(flags.contains(&"--vid=no".to_string()));
  }

  // --- frames ---

  #[test]
  fn frame_maps_commands_to_pause_property() {
    let (mut frame, mut rx) = detached(Platform::YouTube.player_origin());
    frame.post(&control_message(Platform::YouTube, PlayerCommand::Play));
    frame.post(&control_message(Platform::YouTube, PlayerCommand::Pause));
    assert_eq!(
      commands(&mut rx),
      vec![json!(["set_property", "pause", false]), json!(["set_property", "pause", true])]
    );
  }

  #[test]
  fn frame_drops_messages_for_other_origins() {
    let (mut frame, mut rx) = detached(Platform::Vimeo.player_origin());
    frame.post(&control_message(Platform::YouTube, PlayerCommand::Play));
    assert!(commands(&mut rx).is_empty());
  }

  #[test]
  fn request_serialises_as_mpv_command() {
    let req = IpcRequest { command: json!(["set_property", "vid", "no"]), ack: None };
    assert_eq!(req.command_line(), br#"{"command":["set_property","vid","no"]}"#.to_vec());
  }

  // --- media ---

  #[test]
  fn play_without_process_settles_as_error() {
    let instance = Instance {
      label: "broken".into(),
      child: None,
      socket: std::env::temp_dir().join("shortfeed-test-broken.sock"),
      tx: None,
      spawn_error: Some("mpv not found".into()),
    };
    let mut media = MpvMedia { instance, hint: PreloadHint::Metadata, paused: true, pending: None };
    media.play();
    assert!(!media.is_paused());
    assert_eq!(media.poll_play(), Some(Err(PlaybackError::Media("mpv not found".into()))));
    assert!(media.is_paused());
    assert_eq!(media.poll_play(), None);
  }
}
