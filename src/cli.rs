use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::AppConfig;
use crate::error::{ReplayError, Result};
use crate::model::{Viewer, ViewerRole};
use crate::replay::OrderMode;
use crate::session::{SessionEvent, SessionMode};

#[derive(Parser, Debug)]
#[command(name = "discussion-replay")]
#[command(version)]
#[command(about = "Project a threaded discussion into chat, graph and statistics views, and replay it step by step")]
pub struct Args {
    /// Joined payload (or bare `{node, children}` tree) as JSON
    pub payload: PathBuf,

    /// Newline-delimited JSON session events applied after joining
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Viewer username (overrides the config file)
    #[arg(long)]
    pub viewer: Option<String>,

    /// Viewer role (overrides the config file)
    #[arg(long, value_enum)]
    pub role: Option<ViewerRole>,

    /// Replay order (overrides the config file)
    #[arg(long, value_enum)]
    pub order: Option<OrderMode>,

    /// Show the full live projection instead of replaying
    #[arg(long)]
    pub live: bool,

    /// Step forward N times after joining
    #[arg(long, conflicts_with = "show_all")]
    pub steps: Option<usize>,

    /// Reveal the whole replay
    #[arg(long)]
    pub show_all: bool,

    /// Auto-play to the end, one step per interval
    #[arg(long, conflicts_with = "show_all")]
    pub simulate: bool,

    /// Auto-play interval in milliseconds (overrides the config file)
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Print discussion statistics
    #[arg(long)]
    pub stats: bool,

    /// Print statistics for one participant
    #[arg(long)]
    pub user_stats: Option<String>,

    /// Print the shown state as JSON instead of the coloured view
    #[arg(long)]
    pub json: bool,

    /// Write `<title>.json` and `<title>.csv` into this directory
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// TOML settings file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Effective settings after merging the config file and flags.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub viewer: Viewer,
    pub mode: SessionMode,
    pub order: OrderMode,
    pub interval: Duration,
}

/// Flags win over the config file.
pub fn resolve_settings(args: &Args, config: &AppConfig) -> Result<RunSettings> {
    let mut viewer = config.viewer();
    if let Some(name) = &args.viewer {
        viewer.username = name.clone();
    }
    if let Some(role) = args.role {
        viewer.role = role;
    }
    let interval = match args.interval_ms {
        Some(0) => {
            return Err(ReplayError::InvalidConfig(
                "--interval-ms must be > 0".into(),
            ))
        }
        Some(ms) => Duration::from_millis(ms),
        None => config.autoplay_interval(),
    };
    Ok(RunSettings {
        viewer,
        mode: if args.live {
            SessionMode::Live
        } else {
            SessionMode::Replay
        },
        order: args.order.unwrap_or(config.replay.order),
        interval,
    })
}

/// Parse newline-delimited events; blank lines and `#` comments are skipped.
pub fn read_events(text: &str) -> Result<Vec<SessionEvent>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(SessionEvent::from_json)
        .collect()
}
