//! Barreplay CLI — replay, calendar and fixture commands.
//!
//! Commands:
//! - `replay` — replay one session from a settings file and print what happened
//! - `calendar` — show the session window and bucket grid for a date
//! - `sample` — write synthetic JSON fixtures plus a matching settings file

use anyhow::{bail, Context, Result};
use barreplay_core::config::load_settings;
use barreplay_core::data::sample::{synthetic_session, write_json};
use barreplay_core::domain::{iso_utc, parse_utc};
use barreplay_core::engine::Feed;
use barreplay_core::{
    feed_for_mode, FeedConfig, OpsEvent, ReplayMode, ReplaySummary, ReplayWindow, SessionCalendar,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "barreplay", about = "Barreplay CLI — deterministic intraday session replay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay one session and print ops events and the run summary.
    Replay {
        /// Settings file (TOML, or JSON with a .json extension).
        #[arg(long)]
        config: PathBuf,

        /// Session date (YYYY-MM-DD).
        #[arg(long)]
        date: String,

        /// historical, paper or live.
        #[arg(long, default_value = "historical")]
        mode: String,

        /// First bucket to replay (ISO-8601, UTC if no offset).
        #[arg(long)]
        from: Option<String>,

        /// Last bucket to replay (ISO-8601, UTC if no offset).
        #[arg(long)]
        to: Option<String>,

        /// Print JSON lines instead of text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show whether a date trades, its open/close in UTC and the bucket count.
    Calendar {
        /// Date (YYYY-MM-DD).
        #[arg(long)]
        date: String,

        /// Optional settings file supplying the session window.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write synthetic session fixtures and a settings file pointing at them.
    Sample {
        /// Session date (YYYY-MM-DD).
        #[arg(long)]
        date: String,

        /// Output directory.
        #[arg(long, default_value = "data")]
        out: PathBuf,

        /// Symbols; the first is the primary.
        #[arg(long, num_args = 1.., default_values = ["SPY", "QQQ", "IWM", "DIA", "VIX"])]
        symbols: Vec<String>,

        /// Random-walk seed.
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("barreplay=info,barreplay_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            config,
            date,
            mode,
            from,
            to,
            json,
        } => run_replay(&config, &date, &mode, from, to, json),
        Commands::Calendar { date, config } => run_calendar(&date, config.as_deref()),
        Commands::Sample {
            date,
            out,
            symbols,
            seed,
        } => run_sample(&date, &out, &symbols, seed),
    }
}

fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{text}', expected YYYY-MM-DD"))
}

fn run_replay(
    config_path: &Path,
    date: &str,
    mode: &str,
    from: Option<String>,
    to: Option<String>,
    json: bool,
) -> Result<()> {
    let session = parse_date(date)?;
    let mode: ReplayMode = mode.parse()?;
    let config = load_settings(config_path)?;

    let window = ReplayWindow {
        from: from.as_deref().map(parse_utc).transpose()?,
        to: to.as_deref().map(parse_utc).transpose()?,
    };
    if let (Some(from), Some(to)) = (window.from, window.to) {
        if from > to {
            bail!("--from {} is after --to {}", iso_utc(from), iso_utc(to));
        }
    }

    let mut feed = feed_for_mode(config, mode)?;
    let summary = if window == ReplayWindow::full() {
        feed.start(session, mode)?
    } else {
        if mode != ReplayMode::Historical {
            bail!("--from/--to only apply to historical replays");
        }
        feed.replay(session, window)?
    };

    print_events(feed.as_ref(), json)?;
    print_summary(&summary, json)?;
    Ok(())
}

fn print_events(feed: &dyn Feed, json: bool) -> Result<()> {
    let events: Vec<&OpsEvent> = feed.bus().ops_events().collect();
    for event in events {
        if json {
            println!("{}", serde_json::to_string(event)?);
        } else {
            let meta = if event.metadata.is_empty() {
                String::new()
            } else {
                format!(" {}", serde_json::to_string(&event.metadata)?)
            };
            println!("{} {:<14} {}{}", iso_utc(event.ts), event.code.as_str(), event.message, meta);
        }
    }
    Ok(())
}

fn print_summary(summary: &ReplaySummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(summary)?);
        return Ok(());
    }
    println!();
    println!("=== Replay {} ({}) ===", summary.session, summary.source);
    println!("State:       {:?}", summary.state);
    for (symbol, count) in &summary.dispatched {
        println!("  {symbol:<6} {count:>4} bars");
    }
    println!("Bars:        {}", summary.total_dispatched());
    println!("Heartbeats:  {}", summary.heartbeats);
    println!("Ops events:  {}", summary.ops_events);
    println!("Digest:      {}", summary.digest);
    Ok(())
}

fn run_calendar(date: &str, config_path: Option<&Path>) -> Result<()> {
    let day = parse_date(date)?;
    let calendar = match config_path {
        Some(path) => load_settings(path)?.calendar()?,
        None => SessionCalendar::default(),
    };

    println!("Date:        {day}");
    println!("Timezone:    {}", calendar.timezone());
    println!("Trading day: {}", calendar.is_trading_day(day));
    if calendar.is_trading_day(day) {
        let buckets = calendar.buckets(day);
        println!("Open (UTC):  {}", iso_utc(calendar.session_open(day)));
        println!("Close (UTC): {}", iso_utc(calendar.session_close(day)));
        println!("Buckets:     {} x {}m", buckets.len(), calendar.bucket_minutes());
    }
    Ok(())
}

fn run_sample(date: &str, out: &Path, symbols: &[String], seed: u64) -> Result<()> {
    let session = parse_date(date)?;
    let Some((primary, context)) = symbols.split_first() else {
        bail!("at least one symbol is required");
    };
    let calendar = SessionCalendar::default();
    if !calendar.is_trading_day(session) {
        bail!("{session} is not a trading day");
    }

    fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    let mut config = FeedConfig {
        symbols: vec![primary.clone()],
        context_symbols: context.to_vec(),
        ..FeedConfig::default()
    };
    for symbol in symbols {
        let rows = synthetic_session(&calendar, session, symbol, seed);
        let path = out.join(format!("{}.json", symbol.to_lowercase()));
        write_json(&path, &rows)?;
        info!(symbol = %symbol, rows = rows.len(), path = %path.display(), "wrote fixture");
        config = config.with_path(symbol, path);
    }

    let settings = out.join("feed.json");
    fs::write(&settings, serde_json::to_string_pretty(&config)?)
        .with_context(|| format!("writing {}", settings.display()))?;
    println!("Fixtures for {session} written to {}", out.display());
    println!(
        "Replay with: barreplay replay --config {} --date {session}",
        settings.display()
    );
    Ok(())
}
