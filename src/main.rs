use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use session_overlay::data::{find_bar_files, load_bars_csv, load_signal, parse_timestamp};
use session_overlay::overlay::{load_limits, PatternSet};
use session_overlay::sessions::SessionLevel;
use session_overlay::{
    FilterContext, RenderPlan, SessionCalendar, SessionExtremumTracker, TrackerConfig, TrackerKey,
    TrackerRegistry, VisualizationLimits,
};

#[derive(Parser, Debug)]
#[command(name = "session-overlay")]
#[command(about = "Trading-session levels and pattern overlay planning")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show active sessions, lifecycle and overlaps at a moment
    Sessions {
        /// Timestamp (RFC 3339 or epoch ms), defaults to now
        #[arg(short, long)]
        at: Option<String>,
    },

    /// Build a render plan from bars (and optionally a scanner signal)
    Plan {
        /// CSV with timestamp,open,high,low,close rows
        #[arg(short, long)]
        bars: PathBuf,

        /// Scanner signal JSON with detected patterns
        #[arg(long)]
        signal: Option<PathBuf>,

        /// Settings JSON holding visualizationLimits
        #[arg(long, env = "OVERLAY_SETTINGS")]
        settings: Option<PathBuf>,

        #[arg(long, default_value = "SOLUSDT")]
        symbol: String,

        #[arg(long, default_value = "15m")]
        timeframe: String,

        /// Render time (RFC 3339 or epoch ms), defaults to the last bar
        #[arg(long)]
        now: Option<String>,
    },

    /// Ingest every SYMBOL_TF.csv in a directory and log session levels
    Replay {
        /// Directory of bar files
        #[arg(short, long, default_value = "data")]
        dir: PathBuf,

        /// Days of completed sessions kept per tracker
        #[arg(long, default_value = "3")]
        retain_days: u32,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Commands::Sessions { at } => {
            let now = match at {
                Some(raw) => parse_timestamp(&raw)?,
                None => Utc::now(),
            };
            run_sessions(now);
        }
        Commands::Plan {
            bars,
            signal,
            settings,
            symbol,
            timeframe,
            now,
        } => {
            let now = now.as_deref().map(parse_timestamp).transpose()?;
            run_plan(bars, signal, settings, TrackerKey::new(symbol, timeframe), now)?;
        }
        Commands::Replay { dir, retain_days } => {
            run_replay(dir, TrackerConfig { retain_days })?;
        }
    }

    Ok(())
}

fn run_sessions(now: DateTime<Utc>) {
    let calendar = SessionCalendar::standard();
    let today = now.date_naive();

    println!("\n=== SESSIONS @ {} ===", now.format("%Y-%m-%d %H:%M UTC"));
    println!("{:<10} {:<13} {:<12}", "Session", "Hours (UTC)", "State");
    for definition in calendar.definitions() {
        let state = SessionCalendar::lifecycle_state(definition, today, now);
        println!("{:<10} {:<13} {:<12}", definition.name, definition.hours_label(), state);
    }

    let active: Vec<String> = calendar
        .classify(now)
        .into_iter()
        .map(|(d, date)| format!("{} ({})", d.name, date))
        .collect();
    println!("\nActive: {}", if active.is_empty() { "none".to_string() } else { active.join(", ") });

    for overlap in calendar.overlaps(now) {
        let tag = if overlap.highest_liquidity { "  HIGHEST LIQUIDITY" } else { "" };
        println!("Overlap: {}/{}{}", overlap.first, overlap.second, tag);
    }
}

fn run_plan(
    bars_path: PathBuf,
    signal_path: Option<PathBuf>,
    settings_path: Option<PathBuf>,
    key: TrackerKey,
    now: Option<DateTime<Utc>>,
) -> Result<()> {
    let bars = load_bars_csv(&bars_path)?;
    let context = FilterContext::from_bars(&bars).context("No bars to plan from")?;
    let now = match now {
        Some(now) => now,
        None => bars.last().map(|b| b.timestamp).context("No bars to plan from")?,
    };

    let limits = match settings_path {
        Some(path) => load_limits(&path)?,
        None => VisualizationLimits::default(),
    };

    let candidates = match signal_path {
        Some(path) => load_signal(&path)?.to_candidates(&bars),
        None => PatternSet::new(),
    };

    info!("{}: {} bars, rendering at {}", key, bars.len(), now);

    let mut tracker = SessionExtremumTracker::new(SessionCalendar::standard(), TrackerConfig::default());
    let mut rejected = 0usize;
    for bar in &bars {
        if tracker.ingest(bar).is_err() {
            rejected += 1;
        }
    }
    if rejected > 0 {
        warn!("{}: {} bars rejected", key, rejected);
    }
    tracker.seal_until(now);

    let plan = RenderPlan::build(&tracker, &candidates, &limits, &context, now)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);

    Ok(())
}

fn run_replay(dir: PathBuf, config: TrackerConfig) -> Result<()> {
    let files = find_bar_files(&dir)?;
    if files.is_empty() {
        warn!("No SYMBOL_TF.csv files in {:?}", dir);
        return Ok(());
    }
    info!("Replaying {} bar files from {:?}", files.len(), dir);

    let registry = TrackerRegistry::new(SessionCalendar::standard(), config);

    let counts: Vec<_> = files
        .par_iter()
        .map(|(key, path)| -> Result<(TrackerKey, usize, usize)> {
            let bars = load_bars_csv(path)?;
            let mut rejected = 0;
            for bar in &bars {
                if registry.ingest(key, bar).is_err() {
                    rejected += 1;
                }
            }
            Ok((key.clone(), bars.len(), rejected))
        })
        .collect::<Result<Vec<_>>>()?;

    for (key, ingested, rejected) in &counts {
        info!("{}: {} bars ({} rejected)", key, ingested, rejected);
    }

    for key in registry.keys() {
        let Some(now) = registry.with_tracker(&key, |t| t.last_timestamp()).flatten() else {
            continue;
        };
        for level in registry.session_levels(&key, now) {
            log_level(&key, &level);
        }
    }

    Ok(())
}

fn log_level(key: &TrackerKey, level: &SessionLevel) {
    for line in level.lines() {
        info!(
            "{} {} [{}] {} @ {}",
            key,
            line.title,
            level.state,
            line.marker_label,
            line.marker_time.format("%Y-%m-%d %H:%M")
        );
    }
}
