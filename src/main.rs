mod app;
mod catalog;
mod cell;
mod config;
mod constants;
mod embed;
mod feed;
mod gesture;
mod input;
mod media;
mod player;
mod preload;
mod prefetch;
mod ui;
mod visibility;

use anyhow::{Context, Result};
use clap::Parser;
use ratatui::{
  DefaultTerminal,
  crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
  },
};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use app::App;
use catalog::LoadOptions;
use config::{Config, Overrides, SHEET_ENV};
use feed::FeedSettings;
use player::MpvHost;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// CSV catalog URL (a Google Sheets link is converted to its CSV export)
  #[arg(short, long)]
  sheet: Option<String>,
  /// JSON catalog: local path or http(s) URL. Falls back to ./videos.json when no source is set
  #[arg(short, long)]
  json: Option<String>,
  /// Videos after the current one to keep warm
  #[arg(long)]
  ahead: Option<usize>,
  /// Videos before the current one to keep warm
  #[arg(long)]
  behind: Option<usize>,
}

impl Args {
  fn overrides(self) -> Overrides {
    Overrides { sheet: self.sheet, json: self.json, ahead: self.ahead, behind: self.behind }
  }
}

// --- Logging ---

/// Log to a file in the data dir; the terminal belongs to the UI.
fn init_logging() -> Option<WorkerGuard> {
  let dir = config::project_dirs()?.data_dir().to_path_buf();
  std::fs::create_dir_all(&dir).ok()?;
  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, "shortfeed.log"));
  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shortfeed=info")))
    .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
    .init();
  Some(guard)
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  let _log_guard = init_logging();

  let config = Config::load();
  let (settings, load_options) = config.resolve(args.overrides(), std::env::var(SHEET_ENV).ok());
  info!(?settings, sheet = ?load_options.sheet_csv_url, json = ?load_options.json_source, "shortfeed: starting");

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  let result = match execute!(std::io::stdout(), EnableMouseCapture) {
    Ok(()) => run(&mut terminal, settings, load_options),
    Err(e) => Err(e).context("Failed to enable mouse capture"),
  };
  let _ = execute!(std::io::stdout(), DisableMouseCapture);
  ratatui::restore();
  result
}

fn run(terminal: &mut DefaultTerminal, settings: FeedSettings, load_options: LoadOptions) -> Result<()> {
  let http_client = Client::new();
  let mut app = App::new(MpvHost::new(http_client.clone()), http_client, settings, load_options);
  app.trigger_load();

  loop {
    app.check_pending();
    app.tick(Instant::now());
    app.expire_error();

    terminal.draw(|frame| ui::ui(frame, &mut app)).context("Failed to draw frame")?;

    if event::poll(Duration::from_millis(16))? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => input::handle_key_event(&mut app, key),
        Event::Mouse(mouse) => input::handle_mouse_event(&mut app, mouse, Instant::now()),
        // Row coordinates of an ongoing drag no longer line up.
        Event::Resize(..) => app.feed.pointer_cancel(),
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }

  info!("shortfeed: exiting");
  Ok(())
}
