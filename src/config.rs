use directories::ProjectDirs;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::warn;

use crate::catalog::LoadOptions;
use crate::feed::FeedSettings;

pub const SHEET_ENV: &str = "SHORTFEED_SHEET_CSV";

/// User preferences read from `feed.toml`.
#[derive(Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct Config {
  pub sheet_csv_url: Option<String>,
  pub json_source: Option<String>,
  pub ahead_window: Option<usize>,
  pub behind_window: Option<usize>,
}

/// Values given on the command line. They take precedence over everything else.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
  pub sheet: Option<String>,
  pub json: Option<String>,
  pub ahead: Option<usize>,
  pub behind: Option<usize>,
}

pub fn project_dirs() -> Option<ProjectDirs> {
  ProjectDirs::from("", "", "shortfeed")
}

pub fn config_path() -> Option<PathBuf> {
  project_dirs().map(|d| d.config_dir().join("feed.toml"))
}

impl Config {
  pub fn load() -> Self {
    if let Some(path) = config_path()
      && let Ok(content) = std::fs::read_to_string(&path)
    {
      match toml::from_str(&content) {
        Ok(config) => return config,
        Err(e) => warn!(path = %path.display(), err = %e, "config: ignoring malformed prefs"),
      }
    }
    Self::default()
  }

  /// Layer CLI overrides, then the environment, over these prefs.
  pub fn resolve(&self, cli: Overrides, env_sheet: Option<String>) -> (FeedSettings, LoadOptions) {
    let defaults = FeedSettings::default();
    let settings = FeedSettings {
      ahead_window: cli.ahead.or(self.ahead_window).unwrap_or(defaults.ahead_window),
      behind_window: cli.behind.or(self.behind_window).unwrap_or(defaults.behind_window),
    };
    let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
    let load = LoadOptions {
      sheet_csv_url: non_empty(cli.sheet)
        .or_else(|| non_empty(env_sheet))
        .or_else(|| non_empty(self.sheet_csv_url.clone())),
      json_source: non_empty(cli.json).or_else(|| non_empty(self.json_source.clone())),
    };
    (settings, load)
  }
}
