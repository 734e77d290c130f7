use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use archive::BlockStore;
use chain::{ArchiverConfig, DEFAULT_NOTIFY_TOPIC, TriggerConfig};
use clap::Parser;
use metrics::Metrics;
use metrics::server::{MetricsServerConfig, run_metrics_server};
use sync::{
    BitcoindRpcClient, Committer, GitCommitter, NoopCommitter, PollTrigger, PushTarget,
    SubscriptionTrigger, SyncEngine, SyncService, TriggerSource, ZmqNotificationSource,
};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(about = "Mirrors a node's blocks into a bucketed on-disk archive")]
struct Args {
    /// YAML config file. Command-line flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    archive_dir: Option<PathBuf>,

    #[arg(long)]
    rpc_url: Option<String>,

    /// RPC user. The password is only read from the config file, never from
    /// the command line.
    #[arg(long)]
    rpc_user: Option<String>,

    /// Node cookie file holding `user:password`.
    #[arg(long)]
    rpc_cookie: Option<PathBuf>,

    /// Poll the node's best block hash every N seconds.
    #[arg(long, conflicts_with = "zmq_endpoint")]
    poll_interval: Option<u64>,

    /// Subscribe to `hashblock` notifications instead of polling.
    #[arg(long)]
    zmq_endpoint: Option<String>,

    /// Do not commit the archive after each cycle.
    #[arg(long)]
    no_commit: bool,

    /// Push every commit to the configured remote.
    #[arg(long)]
    push: bool,

    /// Serve prometheus metrics.
    #[arg(long)]
    metrics: bool,

    #[arg(long)]
    metrics_port: Option<u16>,
}

fn apply_args(config: &mut ArchiverConfig, args: &Args) {
    if let Some(dir) = &args.archive_dir {
        config.archive_dir = dir.clone();
    }

    if let Some(url) = &args.rpc_url {
        config.rpc.url = url.clone();
    }
    if args.rpc_user.is_some() {
        config.rpc.user = args.rpc_user.clone();
    }
    if args.rpc_cookie.is_some() {
        config.rpc.cookie_file = args.rpc_cookie.clone();
    }

    if let Some(endpoint) = &args.zmq_endpoint {
        let topic = match &config.trigger {
            TriggerConfig::Subscribe { topic, .. } => topic.clone(),
            TriggerConfig::Poll { .. } => DEFAULT_NOTIFY_TOPIC.to_string(),
        };
        config.trigger = TriggerConfig::Subscribe {
            endpoint: endpoint.clone(),
            topic,
        };
    } else if let Some(interval_secs) = args.poll_interval {
        config.trigger = TriggerConfig::Poll { interval_secs };
    }

    if args.no_commit {
        config.commit.enabled = false;
    }
    if args.push {
        config.commit.push = true;
    }

    if args.metrics {
        config.metrics.enabled = true;
    }
    if let Some(port) = args.metrics_port {
        config.metrics.port = port;
    }
}

async fn build_committer(config: &ArchiverConfig) -> Result<Box<dyn Committer>> {
    if !config.commit.enabled {
        info!("Archive commits disabled");
        return Ok(Box::new(NoopCommitter));
    }

    let repo_dir = config.commit_repo_dir();
    std::fs::create_dir_all(repo_dir)
        .with_context(|| format!("failed to create repository dir {}", repo_dir.display()))?;

    let push = config.commit.push.then(|| PushTarget {
        remote: config.commit.remote.clone(),
        branch: config.commit.branch.clone(),
    });

    let committer = GitCommitter::new(repo_dir, push);
    committer
        .prepare(config.commit.lfs.then_some(config.extension.as_str()))
        .await
        .context("failed to prepare archive repository")?;

    info!(repo_dir = %repo_dir.display(), push = config.commit.push, "Archive commits enabled");
    Ok(Box::new(committer))
}

async fn build_triggers(
    config: &ArchiverConfig,
    node: Arc<BitcoindRpcClient>,
) -> Result<Box<dyn TriggerSource>> {
    match &config.trigger {
        TriggerConfig::Poll { interval_secs } => {
            info!(interval_secs, "Polling node for new blocks");
            Ok(Box::new(PollTrigger::new(
                node,
                Duration::from_secs(*interval_secs),
            )))
        }
        TriggerConfig::Subscribe { endpoint, topic } => {
            let source = ZmqNotificationSource::connect(endpoint, topic).await?;
            Ok(Box::new(SubscriptionTrigger::new(source)))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "Failed to listen for ctrl-c, running until the trigger source closes");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ArchiverConfig::load_from_file(path)?,
        None => ArchiverConfig::default(),
    };
    apply_args(&mut config, &args);
    config.validate()?;

    std::fs::create_dir_all(&config.archive_dir).with_context(|| {
        format!("failed to create archive dir {}", config.archive_dir.display())
    })?;

    let node = Arc::new(BitcoindRpcClient::from_config(&config.rpc)?);
    let store = BlockStore::new(config.archive_dir.clone(), config.extension.clone());
    let committer = build_committer(&config).await?;
    let triggers = build_triggers(&config, node.clone()).await?;

    let metrics = config.metrics.enabled.then(|| Arc::new(Metrics::new()));
    if let Some(metrics) = &metrics {
        let server_config = MetricsServerConfig {
            address: config.metrics.address,
            port: config.metrics.port,
        };
        let metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(err) = run_metrics_server(server_config, metrics).await {
                error!("Metrics server exited: {err:#}");
            }
        });
    }

    let engine = SyncEngine::new(node, store, committer).with_reorg_window(config.reorg_window);
    let mut service = SyncService::new(engine, triggers).with_metrics(metrics);

    info!(archive_dir = %config.archive_dir.display(), "Block archiver started");

    let stats = service.run_until(shutdown_signal()).await;

    info!(
        cycles_completed = stats.cycles_completed,
        cycles_failed = stats.cycles_failed,
        last_tip = ?stats.last_tip,
        "Block archiver stopped"
    );

    Ok(())
}
