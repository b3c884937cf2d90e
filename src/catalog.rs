use anyhow::{Context, Result, anyhow, bail};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{info, warn};
use url::Url;

/// One catalog entry. Immutable once loaded; reloads replace the whole list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VideoItem {
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub src: String,
  #[serde(default)]
  pub poster: Option<String>,
  #[serde(default)]
  pub title: Option<String>,
}

impl VideoItem {
  pub fn new(id: impl Into<String>, src: impl Into<String>) -> Self {
    Self { id: id.into(), src: src.into(), poster: None, title: None }
  }

  pub fn with_title(mut self, title: impl Into<String>) -> Self {
    self.title = Some(title.into());
    self
  }
}

/// Where to look for catalog entries.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
  /// CSV export URL, or a Google Sheets edit link.
  pub sheet_csv_url: Option<String>,
  /// Local path or http(s) URL of a JSON array of items.
  pub json_source: Option<String>,
}

// --- CSV ---

/// Split one CSV line, honouring double quotes and `""` escapes.
fn split_csv_line(line: &str) -> Vec<String> {
  let mut out = Vec::new();
  let mut cur = String::new();
  let mut in_quotes = false;
  let mut chars = line.chars().peekable();
  while let Some(ch) = chars.next() {
    match ch {
      '"' if in_quotes && chars.peek() == Some(&'"') => {
        cur.push('"');
        chars.next();
      }
      '"' => in_quotes = !in_quotes,
      ',' if !in_quotes => out.push(std::mem::take(&mut cur)),
      _ => cur.push(ch),
    }
  }
  out.push(cur);
  out
}

/// Parse a CSV catalog. Rows without a source are dropped; a missing id falls
/// back to the row number.
pub fn parse_csv(csv: &str) -> Vec<VideoItem> {
  let mut lines = csv.trim().lines();
  let Some(header) = lines.next() else { return Vec::new() };
  let headers: Vec<String> = split_csv_line(header).iter().map(|h| h.trim().to_lowercase()).collect();
  let column = |names: &[&str]| names.iter().find_map(|n| headers.iter().position(|h| h == n));
  let src_col = column(&["src", "url"]);
  let poster_col = column(&["poster", "thumbnail", "thumb"]);
  let title_col = column(&["title", "name", "caption"]);
  let id_col = column(&["id", "key"]);

  let mut items = Vec::new();
  for (row, line) in lines.enumerate() {
    if line.trim().is_empty() {
      continue;
    }
    let cols: Vec<String> = split_csv_line(line).into_iter().map(|c| c.trim().to_string()).collect();
    let cell = |col: Option<usize>| col.and_then(|i| cols.get(i)).filter(|s| !s.is_empty()).cloned();
    let Some(src) = cell(src_col) else { continue };
    let id = cell(id_col).unwrap_or_else(|| (row + 1).to_string());
    items.push(VideoItem { id, src, poster: cell(poster_col), title: cell(title_col) });
  }
  items
}

/// Turn a Google Sheets edit link into its CSV export URL. Anything else,
/// including links that already point at an export, is returned unchanged.
pub fn normalize_sheet_csv_url(raw: &str) -> String {
  let Ok(url) = Url::parse(raw) else { return raw.to_string() };
  let path = url.path();
  if path.to_ascii_lowercase().ends_with("/export") || path.contains("/gviz/") {
    return raw.to_string();
  }
  let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
  let sheet_id = segments.iter().position(|s| *s == "d").and_then(|i| segments.get(i + 1)).filter(|s| !s.is_empty());
  let Some(sheet_id) = sheet_id else { return raw.to_string() };
  let gid = url.query_pairs().find(|(k, _)| k == "gid").map(|(_, v)| v.into_owned()).unwrap_or_else(|| "0".into());
  format!("https://docs.google.com/spreadsheets/d/{}/export?format=csv&gid={}", sheet_id, gid)
}

// --- JSON ---

/// Parse a JSON catalog, dropping entries without a source.
pub fn parse_json(text: &str) -> Result<Vec<VideoItem>> {
  let raw: Vec<VideoItem> = serde_json::from_str(text).context("Catalog JSON is not an array of items")?;
  Ok(
    raw
      .into_iter()
      .enumerate()
      .filter(|(_, item)| !item.src.trim().is_empty())
      .map(|(i, mut item)| {
        if item.id.is_empty() {
          item.id = (i + 1).to_string();
        }
        item
      })
      .collect(),
  )
}

fn is_remote(source: &str) -> bool {
  source.starts_with("http://") || source.starts_with("https://")
}

async fn fetch_text(client: &Client, url: &str) -> Result<String> {
  let response = client
    .get(url)
    .header(reqwest::header::CACHE_CONTROL, "no-cache")
    .send()
    .await
    .with_context(|| format!("Failed to fetch {}", url))?;
  if !response.status().is_success() {
    bail!("Fetch of {} failed: {}", url, response.status());
  }
  response.text().await.with_context(|| format!("Failed to read body of {}", url))
}

async fn load_sheet(client: &Client, raw: &str) -> Result<Vec<VideoItem>> {
  let url = normalize_sheet_csv_url(raw);
  let text = fetch_text(client, &url).await?;
  Ok(parse_csv(&text))
}

async fn load_json(client: &Client, source: &str) -> Result<Vec<VideoItem>> {
  let text = if is_remote(source) {
    fetch_text(client, source).await?
  } else {
    tokio::fs::read_to_string(source).await.with_context(|| format!("Failed to read catalog file {}", source))?
  };
  parse_json(&text)
}

/// Merge source lists in order, keeping the first item seen for each `src`.
pub fn merge_dedup(lists: impl IntoIterator<Item = Vec<VideoItem>>) -> Vec<VideoItem> {
  let mut seen = HashSet::new();
  lists.into_iter().flatten().filter(|item| seen.insert(item.src.clone())).collect()
}

/// Catalog read from the working directory when no source is configured.
pub const DEFAULT_JSON: &str = "videos.json";

/// Load and merge every configured source, sheet first.
///
/// A failing source is logged and contributes nothing. The load only fails
/// when every configured source failed, or when nothing is configured and
/// [`DEFAULT_JSON`] can't be read.
pub async fn load_catalog(client: &Client, opts: &LoadOptions) -> Result<Vec<VideoItem>> {
  if opts.sheet_csv_url.is_none() && opts.json_source.is_none() {
    info!(path = DEFAULT_JSON, "catalog: no source configured, trying default");
    let items = load_json(client, DEFAULT_JSON).await.with_context(|| {
      format!("No catalog source configured and no ./{} found. Pass --sheet <url> or --json <path>.", DEFAULT_JSON)
    })?;
    return Ok(merge_dedup([items]));
  }

  let sheet = async {
    match &opts.sheet_csv_url {
      Some(url) => Some(load_sheet(client, url).await),
      None => None,
    }
  };
  let json = async {
    match &opts.json_source {
      Some(source) => Some(load_json(client, source).await),
      None => None,
    }
  };
  let (sheet, json) = tokio::join!(sheet, json);

  let mut lists = Vec::new();
  let mut failures = Vec::new();
  for (name, result) in [("sheet", sheet), ("json", json)] {
    match result {
      Some(Ok(items)) => {
        info!(source = name, count = items.len(), "catalog: source loaded");
        lists.push(items);
      }
      Some(Err(e)) => {
        let msg = format!("{:#}", e);
        warn!(source = name, err = %msg, "catalog: source failed");
        failures.push(format!("{}: {}", name, msg));
      }
      None => {}
    }
  }

  if lists.is_empty() {
    return Err(anyhow!("Failed to load videos ({})", failures.join("; ")));
  }
  Ok(merge_dedup(lists))
}

#[cfg(test)]
mod tests {
  use super::*;

  // --- split_csv_line ---

  #[test]
  fn csv_quotes_and_escapes() {
    assert_eq!(split_csv_line(r#"a,"b,c","say ""hi""""#), vec!["a", "b,c", r#"say "hi""#]);
    assert_eq!(split_csv_line("x,,y"), vec!["x", "", "y"]);
  }

  // --- parse_csv ---

  #[test]
  fn csv_header_aliases_and_fallback_ids() {
    let csv = "URL,Caption,Thumb\nhttps://a/1.mp4,First,https://a/1.jpg\n\n,No source,\nhttps://a/2.mp4,,\n";
    let items = parse_csv(csv);
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, "1");
    assert_eq!(items[0].title.as_deref(), Some("First"));
    assert_eq!(items[0].poster.as_deref(), Some("https://a/1.jpg"));
    assert_eq!(items[1].src, "https://a/2.mp4");
    assert_eq!(items[1].title, None);
    assert_eq!(items[1].id, "4");
  }

  #[test]
  fn csv_explicit_ids() {
    let items = parse_csv("key,src\nk1,https://a/x.mp4");
    assert_eq!(items, vec![VideoItem::new("k1", "https://a/x.mp4")]);
  }

  #[test]
  fn csv_without_source_column_is_empty() {
    assert!(parse_csv("title\nonly a title").is_empty());
    assert!(parse_csv("").is_empty());
  }

  // --- normalize_sheet_csv_url ---

  #[test]
  fn sheet_edit_link_becomes_export() {
    let url = normalize_sheet_csv_url("https://docs.google.com/spreadsheets/d/SHEET42/edit?gid=7#gid=7");
    assert_eq!(url, "https://docs.google.com/spreadsheets/d/SHEET42/export?format=csv&gid=7");
    let url = normalize_sheet_csv_url("https://docs.google.com/spreadsheets/d/SHEET42/edit");
    assert!(url.ends_with("gid=0"));
  }

  #[test]
  fn sheet_export_links_untouched() {
    let export = "https://docs.google.com/spreadsheets/d/S/export?format=csv";
    assert_eq!(normalize_sheet_csv_url(export), export);
    assert_eq!(normalize_sheet_csv_url("not a url"), "not a url");
  }

  // --- parse_json ---

  #[test]
  fn json_drops_empty_sources() {
    let items = parse_json(r#"[{"src":"https://a/1.mp4","title":"One"},{"src":""},{"id":"x","src":"https://a/3.mp4"}]"#)
      .unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, "1");
    assert_eq!(items[1].id, "x");
  }

  #[test]
  fn json_rejects_non_array() {
    assert!(parse_json(r#"{"src":"x"}"#).is_err());
  }

  // --- merge_dedup ---

  #[test]
  fn merge_keeps_first_source() {
    let sheet = vec![VideoItem::new("s1", "https://a/1.mp4").with_title("sheet")];
    let json = vec![VideoItem::new("j1", "https://a/1.mp4").with_title("json"), VideoItem::new("j2", "https://a/2.mp4")];
    let merged = merge_dedup([sheet, json]);
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].title.as_deref(), Some("sheet"));
    assert_eq!(merged[1].id, "j2");
  }

  #[tokio::test]
  async fn load_without_sources_or_default_file_fails() {
    let err = load_catalog(&Client::new(), &LoadOptions::default()).await.unwrap_err();
    assert!(err.to_string().contains("No catalog source"));
  }

  fn temp_catalog(tag: &str, body: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("shortfeed-catalog-{}-{}.json", tag, std::process::id()));
    std::fs::write(&path, body).unwrap();
    path
  }

  #[tokio::test]
  async fn load_reads_local_json() {
    let path = temp_catalog("local", r#"[{"id":"a","src":"/tmp/a.mp4"},{"id":"b","src":"/tmp/a.mp4"}]"#);
    let opts = LoadOptions { sheet_csv_url: None, json_source: Some(path.to_string_lossy().into_owned()) };
    let items = load_catalog(&Client::new(), &opts).await.unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(items, vec![VideoItem::new("a", "/tmp/a.mp4")]);
  }

  #[tokio::test]
  async fn unreachable_sheet_still_yields_json_items() {
    let path = temp_catalog("partial", r#"[{"id":"a","src":"/tmp/a.mp4"},{"id":"b","src":"/tmp/b.mp4"}]"#);
    let opts = LoadOptions {
      sheet_csv_url: Some("http://127.0.0.1:1/x.csv".into()),
      json_source: Some(path.to_string_lossy().into_owned()),
    };
    let items = load_catalog(&Client::new(), &opts).await.unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(items, vec![VideoItem::new("a", "/tmp/a.mp4"), VideoItem::new("b", "/tmp/b.mp4")]);
  }

  #[tokio::test]
  async fn every_source_failing_is_an_error() {
    let opts = LoadOptions {
      sheet_csv_url: Some("http://127.0.0.1:1/x.csv".into()),
      json_source: Some("/nonexistent/shortfeed/videos.json".into()),
    };
    let msg = load_catalog(&Client::new(), &opts).await.unwrap_err().to_string();
    assert!(msg.contains("sheet:"), "{}", msg);
    assert!(msg.contains("json:"), "{}", msg);
  }
}
