//! Warming a source by streaming the head of its body over HTTP.

use futures::StreamExt;
use reqwest::Client;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::media::WarmHandle;

/// A background download of at most `limit` bytes of one source.
/// Non-HTTP sources get an inert handle.
pub struct HttpPrefetch {
  task: Option<JoinHandle<()>>,
}

impl HttpPrefetch {
  pub fn start(client: &Client, src: &str, limit: u64) -> Self {
    if !is_http(src) {
      return Self { task: None };
    }
    let client = client.clone();
    let src = src.to_string();
    let task = tokio::spawn(async move {
      match fetch_head(&client, &src, limit).await {
        Ok(read) => debug!(src = %src, bytes = read, "prefetch: done"),
        Err(e) => debug!(src = %src, err = %e, "prefetch: failed"),
      }
    });
    Self { task: Some(task) }
  }

  #[cfg(test)]
  pub fn is_running(&self) -> bool {
    self.task.as_ref().is_some_and(|t| !t.is_finished())
  }
}

impl WarmHandle for HttpPrefetch {
  fn release(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

impl Drop for HttpPrefetch {
  fn drop(&mut self) {
    self.release();
  }
}

fn is_http(src: &str) -> bool {
  let lower = src.trim_start().to_ascii_lowercase();
  lower.starts_with("http://") || lower.starts_with("https://")
}

/// Read the response body until `limit` bytes have arrived, then drop the
/// connection. Returns the number of bytes read.
async fn fetch_head(client: &Client, src: &str, limit: u64) -> reqwest::Result<u64> {
  let resp = client.get(src).send().await?.error_for_status()?;
  let mut stream = resp.bytes_stream();
  let mut read = 0u64;
  while let Some(chunk) = stream.next().await {
    read += chunk?.len() as u64;
    if read >= limit {
      break;
    }
  }
  Ok(read)
}
