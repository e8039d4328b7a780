use clap::Parser;
use colored::*;
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use discussion_replay::cli::{read_events, resolve_settings, Args};
use discussion_replay::config::{AppConfig, VisualConfig};
use discussion_replay::export::write_exports;
use discussion_replay::session::{ControlMode, JoinedPayload, SessionMode};
use discussion_replay::{
    DiscussionSession, DiscussionStats, NavCommand, Player, SessionEvent, ShownState, UserStats,
};

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

/// Paint `text` with a `#RRGGBB` colour; unparsable colours fall back to plain.
fn paint(text: &str, hex: &str) -> ColoredString {
    let rgb = hex
        .strip_prefix('#')
        .and_then(|h| u32::from_str_radix(h, 16).ok());
    match rgb {
        Some(v) => text.truecolor((v >> 16) as u8, (v >> 8) as u8, v as u8).bold(),
        None => text.bold(),
    }
}

fn print_header(session: &DiscussionSession) {
    let meta = session.meta();
    let title = if meta.title.is_empty() {
        "(untitled discussion)".to_string()
    } else {
        meta.short_title()
    };
    println!("{}", title.bright_cyan().bold());
    println!(
        "{}: {} ({})",
        "Viewer".bright_yellow(),
        session.viewer().username,
        session.viewer().role
    );
    match session.replay() {
        Some(engine) => println!(
            "{}: {} of {} ({})",
            "Replay".bright_yellow(),
            engine.current_index(),
            engine.len(),
            engine.order_mode()
        ),
        None => println!("{}: {}", "Mode".bright_yellow(), "live".bright_white()),
    }
    println!();
}

fn print_view(state: &ShownState, visual: &VisualConfig) {
    println!("{}", "Messages".bright_green().bold());
    for m in &state.messages {
        let indent = "  ".repeat(m.depth as usize);
        let reply = if m.parent_username.is_empty() {
            String::new()
        } else {
            format!(" -> {}", m.parent_username).dimmed().to_string()
        };
        println!("{indent}{}{reply}: {}", paint(&m.author, &m.color), m.text);
    }

    if visual.graph {
        println!();
        println!("{}", "Interaction graph".bright_green().bold());
        for n in &state.nodes {
            println!(
                "  {} sent={} received={} weight={:.2}",
                paint(&n.display_name, &n.color),
                n.sent_count,
                n.received_count,
                n.visual_weight
            );
        }
        for e in &state.links {
            println!(
                "  {} -> {} x{} width={:.2} opacity={:.2}",
                e.source, e.target, e.message_count, e.width, e.opacity
            );
        }
    }

    if visual.alerts && !state.alerts.is_empty() {
        println!();
        println!("{}", "Alerts".bright_magenta().bold());
        for a in &state.alerts {
            println!("  [{}] {}: {}", a.position, a.author, a.text);
        }
    }
}

fn print_discussion_stats(stats: &DiscussionStats) {
    println!();
    println!("{}", "Discussion statistics".bright_green().bold());
    println!("  participants: {}", stats.participants);
    println!("  comments: {}", stats.comments);
    println!("  replied most: {}", stats.replied_most);
    println!("  received most: {}", stats.received_most);
}

fn print_user_stats(stats: &UserStats) {
    println!();
    println!("{} {}", "Statistics for".bright_green().bold(), stats.username.bold());
    println!("  sent: {}  received: {}  share: {:.0}%", stats.sent, stats.received, stats.share * 100.0);
    for p in &stats.replied_to {
        println!("  replied to {} ({})", p.username, p.messages);
    }
    for p in &stats.replied_by {
        println!("  replied by {} ({})", p.username, p.messages);
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("discussion=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let settings = resolve_settings(&args, &config)?;
    let payload = JoinedPayload::from_json(&std::fs::read_to_string(&args.payload)?)?;

    let session = DiscussionSession::new(settings.viewer.clone(), settings.mode)
        .with_order(settings.order)
        .with_listener(|state: &ShownState| {
            debug!(
                target: "discussion::session",
                messages = state.messages.len(),
                links = state.links.len(),
                "view updated"
            );
        });
    let mut player = Player::new(session);
    player.handle(SessionEvent::Joined(payload)).await?;

    if let Some(path) = &args.events {
        let events = read_events(&std::fs::read_to_string(path)?)?;
        let (tx, rx) = mpsc::channel(events.len().max(1));
        let feeder = tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        player.run(rx).await?;
        feeder.await?;
    }

    let terminated = player.session().lock().await.is_terminated();
    if terminated {
        eprintln!("{}", "session terminated by the event feed".bright_red());
    } else if settings.mode == SessionMode::Replay {
        // The command line drives its own replay.
        player
            .handle(SessionEvent::Navigate {
                command: NavCommand::ChangeControlMode(ControlMode::SelfControl),
            })
            .await?;
        if args.show_all {
            player.navigate(NavCommand::ShowAll).await?;
        } else if let Some(steps) = args.steps {
            for _ in 0..steps {
                if !player.navigate(NavCommand::Next).await? {
                    break;
                }
            }
        }
        if args.simulate {
            player.simulate(settings.interval).await?;
            player.join().await;
        }
    }

    let shared = player.session();
    let session = shared.lock().await;
    let state = session.shown_state();
    let visual = session.visual_config();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        print_header(&session);
        print_view(&state, &visual);
    }
    if args.stats && visual.statistics_discussion {
        print_discussion_stats(&DiscussionStats::compute(&state));
    }
    if let Some(name) = &args.user_stats {
        match UserStats::compute(&state, name) {
            Some(stats) if visual.statistics_user => print_user_stats(&stats),
            Some(_) => eprintln!("{}", "user statistics are hidden for this viewer".yellow()),
            None => eprintln!("{} {}", "no shown participant named".yellow(), name),
        }
    }
    if let Some(dir) = &args.export_dir {
        if let Some(tree) = session.tree() {
            let (json, csv) = write_exports(dir, tree, session.meta(), &session.projection().messages)?;
            eprintln!("{} {} {}", "exported".bright_green(), json.display(), csv.display());
        }
    }
    for failure in session.diagnostics() {
        eprintln!(
            "{} {:?}: comment {} parent {}",
            "lookup failure".yellow(),
            failure.stage,
            failure.comment_id,
            failure.parent_id
        );
    }
    Ok(())
}
