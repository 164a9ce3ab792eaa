use anyhow::Context;
use crawl_telemetry::{
    ApiClient, RunView, RunViewEvent, RunViewHandle, RunViewSnapshot, TelemetryConfig,
};
use shared_types::{CreateRunRequest, RunId};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const USAGE: &str = "usage: crawl-watch <run-id> | crawl-watch --seed <url>";

#[derive(Debug, PartialEq, Eq)]
enum Target {
    Existing(RunId),
    Seed(String),
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Target> {
    let target = match args.next().as_deref() {
        Some("--seed") => {
            let seed = args.next().context(USAGE)?;
            Target::Seed(seed)
        }
        Some(flag) if flag.starts_with('-') => anyhow::bail!("unknown flag {flag}\n{USAGE}"),
        Some(run_id) => Target::Existing(RunId::from(run_id)),
        None => anyhow::bail!(USAGE),
    };
    if let Some(extra) = args.next() {
        anyhow::bail!("unexpected argument {extra}\n{USAGE}");
    }
    Ok(target)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crawl_telemetry=info,crawl_watch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let target = parse_args(std::env::args().skip(1))?;
    let config = TelemetryConfig::from_env()?;
    info!(api_base = %config.api_base, "crawl-watch starting");

    let run_id = match target {
        Target::Existing(run_id) => run_id,
        Target::Seed(seed) => {
            let client = ApiClient::new(&config)?;
            let created = client.create_run(&CreateRunRequest::new(seed)).await?;
            client.start_run(&created.id).await?;
            created.id
        }
    };

    let view = RunView::open(&config, run_id).await?;
    watch(&view).await?;
    view.close().await;
    Ok(())
}

async fn watch(view: &RunViewHandle) -> anyhow::Result<()> {
    let mut events = view.subscribe().await?;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let event = tokio::select! {
            result = &mut ctrl_c => {
                result.context("failed to listen for Ctrl-C")?;
                info!(run_id = %view.run_id(), "Interrupted, closing view");
                return Ok(());
            }
            event = events.recv() => event,
        };

        match event {
            Ok(RunViewEvent::StatusChanged { from, to }) => {
                info!(run_id = %view.run_id(), %from, %to, "Connection status");
            }
            Ok(RunViewEvent::Frame(frame)) => {
                tracing::debug!(
                    pages_per_sec = frame.throughput.pages_per_sec,
                    frontier = frame.queues.frontier,
                    hosts = frame.hosts.len(),
                    "Frame"
                );
            }
            Ok(RunViewEvent::RunUpdated) | Ok(RunViewEvent::PagesUpdated) => {
                log_snapshot(&view.snapshot().await?);
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Event subscriber lagged");
            }
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

fn log_snapshot(snapshot: &RunViewSnapshot) {
    let run = snapshot.run();
    info!(
        run_id = %snapshot.run_id(),
        status = run.map(|r| r.status.as_str()).unwrap_or("unknown"),
        stop_reason = snapshot.effective_stop_reason().map(|r| r.as_str()).unwrap_or("unknown"),
        pages_fetched = run.and_then(|r| r.summary.as_ref()).map(|s| s.pages_fetched).unwrap_or(0),
        durable = snapshot.storage_is_durable(),
        recent_pages = snapshot.pages().len(),
        nodes = snapshot.graph().node_count(),
        edges = snapshot.graph().edge_count(),
        pages_per_sec = snapshot.series().throughput.latest().unwrap_or(0.0),
        "Run snapshot"
    );
    for pick in snapshot.host_personalities() {
        info!(
            host = %pick.host,
            personality = %pick.personality,
            score = pick.score,
            "Host personality"
        );
    }
}
