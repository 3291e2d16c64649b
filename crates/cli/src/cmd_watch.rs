//! `matchpulse watch <job-id>` - follow one analysis job until it completes
//! or the user interrupts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use matchpulse_live::{
    ClientConfig, ConnectionManager, CredentialSource, FileToken, LiveSessionHandle, LiveSnapshot,
    LiveStatus, RealtimeConnector, SessionOptions, StaticToken, Subscription,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::cli::WatchArgs;
use crate::paths;
use crate::render::Printer;

enum Outcome {
    Completed,
    Interrupted,
    Failed(String),
    Stopped,
}

pub async fn run(args: WatchArgs) -> anyhow::Result<()> {
    let mut config = ClientConfig::load(&paths::config_path())?;
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if args.dedupe_events {
        config.dedupe_events = true;
    }
    let transport = config.transport_config()?;
    let credentials = credential_source(args.token.clone(), config.token_file.clone());

    info!(
        component = "watch",
        event = "watch.start",
        job_id = %args.job_id,
        endpoint = %transport.endpoint,
        "Watching analysis job"
    );

    let (manager, events) =
        ConnectionManager::new(transport, credentials, Arc::new(RealtimeConnector));
    let session = LiveSessionHandle::spawn(
        manager,
        events,
        SessionOptions {
            event_dedup: config.event_dedup(),
            ..SessionOptions::default()
        },
    );

    let Some(Subscription {
        snapshot,
        mut updates,
    }) = session.subscribe().await
    else {
        anyhow::bail!("live session stopped before it could be observed");
    };

    let mut printer = Printer::new(args.format);
    printer.emit(snapshot)?;
    session.bind_job(Some(args.job_id.clone())).await;

    let retry_delay = Duration::from_secs(args.retry_delay);
    let mut retry_at: Option<Instant> = None;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        let next = tokio::select! {
            _ = &mut ctrl_c => break Outcome::Interrupted,

            _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                retry_at = None;
                info!(
                    component = "watch",
                    event = "watch.rejoin",
                    job_id = %args.job_id,
                    "Rejoining after connection error"
                );
                session.join_session().await;
                continue;
            }

            update = updates.recv() => match update {
                Ok(snapshot) => snapshot,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(
                        component = "watch",
                        event = "watch.lagged",
                        skipped,
                        "Output fell behind, resyncing to latest snapshot"
                    );
                    session.snapshot()
                }
                Err(RecvError::Closed) => break Outcome::Stopped,
            },
        };

        printer.emit(Arc::clone(&next))?;

        match next.status {
            LiveStatus::Completed if args.exit_on_complete => break Outcome::Completed,
            LiveStatus::Error if retry_delay.is_zero() => {
                break Outcome::Failed(error_message(&next));
            }
            LiveStatus::Error if retry_at.is_none() => {
                warn!(
                    component = "watch",
                    event = "watch.connect_failed",
                    job_id = %args.job_id,
                    error = %error_message(&next),
                    retry_in_secs = retry_delay.as_secs(),
                    "Connection failed, will retry"
                );
                retry_at = Some(Instant::now() + retry_delay);
            }
            _ => {}
        }
    };

    let last = session.snapshot();
    session.shutdown().await;
    printer.finish(&last);

    match outcome {
        Outcome::Completed | Outcome::Interrupted => Ok(()),
        Outcome::Stopped => anyhow::bail!("live session stopped unexpectedly"),
        Outcome::Failed(message) => anyhow::bail!("could not follow {}: {}", args.job_id, message),
    }
}

fn error_message(snapshot: &LiveSnapshot) -> String {
    snapshot
        .error
        .clone()
        .unwrap_or_else(|| "unknown error".to_string())
}

/// `--token` / `MATCHPULSE_TOKEN` wins; otherwise the token file is re-read on
/// every connect so a rotated token is picked up.
fn credential_source(
    token: Option<String>,
    token_file: Option<PathBuf>,
) -> Arc<dyn CredentialSource> {
    match token.filter(|t| !t.trim().is_empty()) {
        Some(token) => Arc::new(StaticToken::new(Some(token))),
        None => Arc::new(FileToken::new(
            token_file.unwrap_or_else(paths::token_file_path),
        )),
    }
}
