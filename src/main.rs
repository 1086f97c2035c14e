use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use xvb_switcher::collector::snapshot::load_snapshot;
use xvb_switcher::collector::{Collector, DonationStatsSource, MetricsSnapshot, SnapshotPublisher, XvbStatsClient};
use xvb_switcher::config::{Args, Config};
use xvb_switcher::logging::init_logging;
use xvb_switcher::scheduler::{DecisionEngine, Scheduler};
use xvb_switcher::storage::StateStore;
use xvb_switcher::supervisor::Supervisor;
use xvb_switcher::worker::{HttpWorkerClient, WorkerSwitcher};

#[tokio::main]
async fn main() {
    // 解析命令行参数
    let args = Args::parse();

    // 加载配置
    let mut config = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            std::process::exit(1);
        }
    };
    config.apply_args(&args);

    // 初始化日志系统，guard 需要一直持有
    let _log_guard = match init_logging(config.log_config()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting {} v{}", xvb_switcher::NAME, xvb_switcher::VERSION);
    info!("Configuration loaded from: {}", args.config);

    if let Err(e) = run(config).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    let store = Arc::new(
        StateStore::open(
            &config.general.state_file,
            config.collector.history_max_entries,
            config.tiers.clone(),
        )
        .await,
    );

    // 上次的快照让调度器重启后不必等待首次采集
    let initial = match &config.general.snapshot_file {
        Some(path) => match load_snapshot(path) {
            Ok(Some(snapshot)) => {
                info!("Restored metrics snapshot v{} from {}", snapshot.version, path.display());
                snapshot
            }
            Ok(None) => MetricsSnapshot::default(),
            Err(e) => {
                warn!("Ignoring unreadable metrics snapshot: {}", e);
                MetricsSnapshot::default()
            }
        },
        None => MetricsSnapshot::default(),
    };
    let (publisher, snapshots) = SnapshotPublisher::new(initial);
    let publisher = Arc::new(publisher);

    let switch_settings = config.switch_settings();
    let api = Arc::new(
        HttpWorkerClient::new(switch_settings.request_timeout).context("Failed to create worker API client")?,
    );

    let donation: Option<Arc<dyn DonationStatsSource>> = if config.donation_sync_enabled() {
        let client = XvbStatsClient::new(
            config.donation.api_url.clone(),
            config.donation.address.trim(),
            std::time::Duration::from_millis(config.donation.request_timeout_ms),
        )
        .context("Failed to create XvB API client")?;
        Some(Arc::new(client))
    } else {
        warn!("No donation address configured, XvB stats sync disabled");
        None
    };

    let supervisor = Supervisor::new();

    {
        let store = store.clone();
        let publisher = publisher.clone();
        let api = api.clone();
        let switch_settings = switch_settings.clone();
        let settings = config.collector_settings();
        supervisor
            .spawn("collector", config.restart_delay(), move || {
                Collector::new(
                    store.clone(),
                    publisher.clone(),
                    api.clone(),
                    switch_settings.clone(),
                    donation.clone(),
                    settings.clone(),
                )
                .run()
            })
            .await;
    }

    {
        let store = store.clone();
        let switcher = WorkerSwitcher::new(api.clone(), config.pool_matcher(), switch_settings);
        let engine = DecisionEngine::new(config.decision_params());
        let settings = config.scheduler_settings();
        supervisor
            .spawn("scheduler", config.restart_delay(), move || {
                Scheduler::new(
                    store.clone(),
                    snapshots.clone(),
                    switcher.clone(),
                    engine.clone(),
                    settings.clone(),
                )
                .run()
            })
            .await;
    }

    info!("Services started: data collection and algorithm control");

    wait_for_shutdown().await?;
    info!("Received shutdown signal");

    supervisor.shutdown().await;
    store.flush().await.context("Failed to flush state on shutdown")?;
    info!("Stopped gracefully");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Error waiting for Ctrl-C")?,
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context("Error waiting for Ctrl-C")?;
    }
    Ok(())
}
