//! Embed resolution: recognising third-party video pages, extracting their
//! media identifiers and composing deterministic embed player URLs.
//!
//! Everything here is pure. The same `(platform, id, autoplay)` always yields
//! the same URL, so a cell can recompute it on every sync and only remount its
//! frame when the URL actually changes.

use serde_json::json;
use url::{Url, form_urlencoded};

/// A recognised third-party video host that needs embed-based playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
  YouTube,
  Vimeo,
}

impl Platform {
  pub fn label(self) -> &'static str {
    match self {
      Platform::YouTube => "YouTube",
      Platform::Vimeo => "Vimeo",
    }
  }

  /// Origin of the platform's embedded player. Control messages are addressed
  /// to this origin only.
  pub fn player_origin(self) -> &'static str {
    match self {
      Platform::YouTube => "https://www.youtube-nocookie.com",
      Platform::Vimeo => "https://player.vimeo.com",
    }
  }
}

/// A source that resolved to an embeddable platform and identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedTarget {
  pub platform: Platform,
  pub id: String,
}

impl EmbedTarget {
  pub fn url(&self, autoplay: bool) -> String {
    build_embed_url(self.platform, &self.id, EmbedOptions { autoplay })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedOptions {
  pub autoplay: bool,
}

/// Classify a source URL by shape. `None` means "treat as direct media".
pub fn classify(src: &str) -> Option<Platform> {
  let lower = src.to_ascii_lowercase();
  if lower.contains("youtube.com/") || lower.contains("youtu.be/") {
    return Some(Platform::YouTube);
  }
  if lower.contains("vimeo.com/") {
    return Some(Platform::Vimeo);
  }
  None
}

/// Extract the platform-specific media identifier.
///
/// Returns `None` when the host was recognised but no known sub-pattern
/// matched; callers then fall back to direct media handling.
pub fn extract_id(src: &str, platform: Platform) -> Option<String> {
  let url = Url::parse(src).ok()?;
  let host = url.host_str()?.to_ascii_lowercase();
  let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
  let non_empty = |s: Option<&&str>| s.filter(|s| !s.is_empty()).map(|s| s.to_string());

  match platform {
    Platform::YouTube => {
      if host.contains("youtu.be") {
        return non_empty(segments.first());
      }
      if !host.contains("youtube.com") {
        return None;
      }
      match segments.first().copied() {
        Some("watch") => url.query_pairs().find(|(k, _)| k == "v").map(|(_, v)| v.into_owned()).filter(|v| !v.is_empty()),
        Some("shorts") | Some("embed") => non_empty(segments.get(1)),
        _ => None,
      }
    }
    Platform::Vimeo => {
      if !host.contains("vimeo.com") {
        return None;
      }
      non_empty(segments.iter().find(|s| !s.is_empty()))
    }
  }
}

/// `classify` followed by `extract_id`.
pub fn resolve(src: &str) -> Option<EmbedTarget> {
  let platform = classify(src)?;
  let id = extract_id(src, platform)?;
  Some(EmbedTarget { platform, id })
}

/// Compose the embed endpoint URL with the fixed per-platform parameter set.
pub fn build_embed_url(platform: Platform, id: &str, opts: EmbedOptions) -> String {
  let autoplay = if opts.autoplay { "1" } else { "0" };
  let mut query = form_urlencoded::Serializer::new(String::new());
  match platform {
    Platform::YouTube => {
      query.extend_pairs([
        ("autoplay", autoplay),
        ("loop", "1"),
        ("playlist", id),
        ("controls", "0"),
        ("modestbranding", "1"),
        ("rel", "0"),
        ("playsinline", "1"),
        ("disablekb", "1"),
        ("fs", "0"),
        ("cc_load_policy", "0"),
        ("enablejsapi", "1"),
      ]);
      format!("{}/embed/{}?{}", platform.player_origin(), id, query.finish())
    }
    Platform::Vimeo => {
      query.extend_pairs([
        ("autoplay", autoplay),
        ("loop", "1"),
        ("background", "1"),
        ("autopause", "0"),
        ("dnt", "1"),
        ("title", "0"),
        ("byline", "0"),
        ("portrait", "0"),
        ("api", "1"),
      ]);
      format!("{}/video/{}?{}", platform.player_origin(), id, query.finish())
    }
  }
}

// --- Control messages ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
  Play,
  Pause,
}

/// Body of a cross-origin control message, in the shape the platform expects.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
  /// Pre-serialised JSON text (YouTube's iframe API listens for strings).
  Text(String),
  /// Structured object (Vimeo's player API listens for objects).
  Object(serde_json::Value),
}

/// A one-way command addressed to an embedded player.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedMessage {
  pub target_origin: &'static str,
  pub payload: MessagePayload,
}

impl EmbedMessage {
  /// Decode the command back out of the payload, as the receiving player would.
  pub fn command(&self) -> Option<PlayerCommand> {
    let value = match &self.payload {
      MessagePayload::Text(text) => serde_json::from_str::<serde_json::Value>(text).ok()?,
      MessagePayload::Object(value) => value.clone(),
    };
    let name = value.get("func").or_else(|| value.get("method")).and_then(|v| v.as_str())?;
    match name {
      "playVideo" | "play" => Some(PlayerCommand::Play),
      "pauseVideo" | "pause" => Some(PlayerCommand::Pause),
      _ => None,
    }
  }
}

pub fn control_message(platform: Platform, command: PlayerCommand) -> EmbedMessage {
  let payload = match platform {
    Platform::YouTube => {
      let func = match command {
        PlayerCommand::Play => "playVideo",
        PlayerCommand::Pause => "pauseVideo",
      };
      MessagePayload::Text(json!({ "event": "command", "func": func, "args": [] }).to_string())
    }
    Platform::Vimeo => {
      let method = match command {
        PlayerCommand::Play => "play",
        PlayerCommand::Pause => "pause",
      };
      MessagePayload::Object(json!({ "method": method }))
    }
  };
  EmbedMessage { target_origin: platform.player_origin(), payload }
}
