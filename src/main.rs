use clap::Parser;
use session_tracker::client::types::unread_count;
use session_tracker::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "tracker-demo", about = "Track a resource session and poll a conversation")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "SESSION_TRACKER_CONFIG")]
    config: Option<PathBuf>,

    /// Resource session to track
    #[arg(short, long)]
    session: String,

    /// Estimated duration in ticks
    #[arg(short, long)]
    target: Option<u64>,

    /// Conversation to poll for messages
    #[arg(long)]
    conversation: Option<String>,

    /// Stop after this many seconds (runs until Ctrl-C otherwise)
    #[arg(long)]
    seconds: Option<u64>,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit JSON logs
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level, cli.json)?;

    let config = AppConfig::load(cli.config.as_deref())?;
    let api = Arc::new(ProgressApi::new(&config.api)?);

    let tracker = SessionTracker::new(config.tracker.clone(), cli.session.as_str(), cli.target, api.clone());

    // Resume from the last saved position when the backend has one
    match api.fetch_progress(tracker.session_id()).await {
        Ok(Some(record)) => {
            tracing::info!(percent = record.resume_percent(), "Resuming session");
            tracker.set_initial_progress(record.resume_percent())?;
        }
        Ok(None) => tracing::info!("No saved progress, starting fresh"),
        Err(e) => tracing::warn!("Could not load saved progress: {}", e),
    }

    tracker.on_complete(|snapshot| {
        tracing::info!(session = %snapshot.session_id, "Resource completed");
    });
    if tracker.phase() != SessionPhase::Completed {
        tracker.start()?;
    }

    let poller = PollingScheduler::new();
    if let Some(conversation) = cli.conversation.as_deref() {
        poller.start(api.message_fetcher(conversation), config.poll.interval)?;
    }
    let mut messages = poller.subscribe();

    let deadline = async {
        match cli.seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            changed = messages.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(list) = messages.borrow_and_update().as_ref() {
                    tracing::info!(total = list.len(), unread = unread_count(list), "Messages refreshed");
                }
            }
        }
    }

    let snapshot = tracker.snapshot();
    tracing::info!(
        elapsed = snapshot.elapsed_units,
        percent = snapshot.percent,
        "Shutting down"
    );
    poller.stop();
    tracker.dispose();

    // Give the fire-and-forget final flush a moment before the runtime exits
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(())
}
