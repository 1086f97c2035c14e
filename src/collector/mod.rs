//! 采集任务
//!
//! 每个周期读取 P2Pool stratum 统计、查询所有已知矿机的 `/1/summary`，
//! 发布新快照并追加算力历史；每隔若干周期同步一次 XvB 捐赠统计。

pub mod donation;
pub mod snapshot;
pub mod stratum;

pub use donation::{DonationStatsSource, XvbStatsClient};
pub use snapshot::{LocalPoolStats, MetricsSnapshot, SnapshotPublisher, WorkerSample};
pub use stratum::{ShareWindow, StratumStats, StratumWorker};

use crate::error::StoreError;
use crate::storage::{HashrateSample, StateStore};
use crate::utils::format_hashrate;
use crate::worker::switch::SwitchSettings;
use crate::worker::{ManagedWorker, WorkerApi, WorkerSummary};
use chrono::Utc;
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// 采集参数
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub update_interval: Duration,
    /// 每隔多少个周期同步一次捐赠统计
    pub donation_sync_every: u64,
    pub stratum_stats_path: PathBuf,
    pub share_window_secs: u64,
    /// 快照落盘路径
    pub snapshot_file: Option<PathBuf>,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(30),
            donation_sync_every: 10,
            stratum_stats_path: PathBuf::from("/app/stats/local/stratum"),
            share_window_secs: 21_600,
            snapshot_file: None,
        }
    }
}

/// 采集任务
pub struct Collector<A: WorkerApi + ?Sized + 'static> {
    store: Arc<StateStore>,
    publisher: Arc<SnapshotPublisher>,
    api: Arc<A>,
    switch_settings: SwitchSettings,
    donation: Option<Arc<dyn DonationStatsSource>>,
    settings: CollectorSettings,
    share_window: ShareWindow,
    iteration: u64,
}

impl<A: WorkerApi + ?Sized + 'static> Collector<A> {
    pub fn new(
        store: Arc<StateStore>,
        publisher: Arc<SnapshotPublisher>,
        api: Arc<A>,
        switch_settings: SwitchSettings,
        donation: Option<Arc<dyn DonationStatsSource>>,
        settings: CollectorSettings,
    ) -> Self {
        let mut share_window = ShareWindow::new(settings.share_window_secs);
        // 重启后以上次快照的份额计数为基线，避免把历史份额算进窗口
        let last = publisher.latest();
        if let Some(taken_at) = last.taken_at {
            if share_window.seed(Utc::now(), taken_at, last.local_pool.shares_found) {
                debug!(
                    "Share window seeded from snapshot v{} ({} shares at {})",
                    last.version, last.local_pool.shares_found, taken_at
                );
            }
        }
        Self {
            store,
            publisher,
            api,
            switch_settings,
            donation,
            settings,
            share_window,
            iteration: 0,
        }
    }

    /// 采集主循环，不会返回
    pub async fn run(mut self) {
        info!(
            "Data collection loop started (interval {:?}, donation sync every {} iterations)",
            self.settings.update_interval, self.settings.donation_sync_every
        );

        let mut ticker = tokio::time::interval(self.settings.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.collect_once().await;
        }
    }

    /// 执行一次采集
    ///
    /// 单项失败只记录日志，本次仍然发布快照。
    pub async fn collect_once(&mut self) -> Arc<MetricsSnapshot> {
        let now = Utc::now();

        // 1. stratum 统计，读取失败时视为窗口内没有份额
        let (stratum, stratum_ok) = match stratum::read_stratum_stats(&self.settings.stratum_stats_path).await {
            Ok(stats) => (stats, true),
            Err(e) => {
                warn!("{}", e);
                (StratumStats::default(), false)
            }
        };
        let stratum_workers = stratum.workers();

        self.store
            .upsert_known_workers(
                stratum_workers
                    .iter()
                    .filter_map(|w| w.name.clone().map(|name| (name, w.ip.clone()))),
            )
            .await;

        // 2. 查询所有已知矿机，包括暂时不在 stratum 列表中的
        let known = self.store.known_workers().await;
        let workers = self.sample_workers(known, &stratum_workers).await;
        // 只有 API 可达的矿机才能被切换，离线矿机不计入总算力
        let total: f64 = workers.iter().filter(|w| w.online).map(|w| w.hashrate_15m).sum();

        // 3. 份额窗口，读取失败时沿用上次的计数器
        let (shares_found, shares_in_window) = if stratum_ok {
            (stratum.shares_found, self.share_window.observe(now, stratum.shares_found))
        } else {
            (self.publisher.latest().local_pool.shares_found, 0)
        };

        // 4. 发布快照
        let snapshot = self.publisher.publish(MetricsSnapshot {
            version: 0,
            taken_at: Some(now),
            total_hashrate_15m: total,
            workers,
            local_pool: LocalPoolStats {
                shares_found,
                shares_in_window,
                hashrate_15m: stratum.hashrate_15m,
                connections: stratum.connections,
            },
        });
        if let Some(path) = &self.settings.snapshot_file {
            if let Err(e) = save_snapshot_blocking(path.clone(), snapshot.clone()).await {
                error!("Failed to save metrics snapshot: {}", e);
            }
        }

        info!(
            "Collected {} workers ({} online), total {}, {} shares in window",
            snapshot.workers.len(),
            snapshot.online_workers(),
            format_hashrate(total),
            shares_in_window
        );

        // 5. 按当前模式归属算力
        let target = self.store.current_mode().await.target();
        self.store
            .append_history(HashrateSample::attributed(now, total, target))
            .await;

        // 6. 捐赠统计同步
        if self.iteration % self.settings.donation_sync_every.max(1) == 0 {
            self.sync_donation_stats().await;
        }
        self.iteration += 1;

        snapshot
    }

    async fn sample_workers(
        &self,
        known: impl IntoIterator<Item = (String, String)>,
        stratum_workers: &[StratumWorker],
    ) -> Vec<WorkerSample> {
        let probes = known.into_iter().map(|(name, ip)| async move {
            let worker = ManagedWorker::new(name, ip);
            let summary = probe_summary(self.api.as_ref(), &worker, &self.switch_settings).await;
            worker_sample(worker, summary, stratum_workers)
        });

        let mut samples = join_all(probes).await;
        samples.sort_by(|a, b| a.name.cmp(&b.name));
        samples
    }

    async fn sync_donation_stats(&self) {
        let Some(source) = &self.donation else {
            return;
        };

        match source.fetch().await {
            Ok(sync) => {
                self.store.apply_donation_sync(sync).await;
                info!(
                    "External sync: XvB stats updated (1h={} | 24h={} | fails={})",
                    format_hashrate(sync.avg_1h),
                    format_hashrate(sync.avg_24h),
                    sync.fail_count
                );
            }
            Err(e) => warn!("External sync failed, keeping previous donation stats: {}", e),
        }
    }
}

/// 依次尝试候选地址读取 `/1/summary`
async fn probe_summary<A: WorkerApi + ?Sized>(
    api: &A,
    worker: &ManagedWorker,
    settings: &SwitchSettings,
) -> Option<WorkerSummary> {
    for endpoint in worker.candidates(settings.api_port, settings.local_discovery) {
        match tokio::time::timeout(settings.request_timeout, api.fetch_summary(&endpoint)).await {
            Ok(Ok(summary)) => return Some(summary),
            Ok(Err(e)) => debug!("Summary probe {} failed: {}", endpoint.address, e),
            Err(_) => debug!("Summary probe {} timed out", endpoint.address),
        }
    }
    None
}

/// 在线矿机取实时 15 分钟算力，离线矿机退回 stratum 报告的算力 (仅用于展示)
fn worker_sample(worker: ManagedWorker, summary: Option<WorkerSummary>, stratum_workers: &[StratumWorker]) -> WorkerSample {
    match summary {
        Some(summary) => WorkerSample {
            hashrate_15m: summary.hashrate_15m(),
            uptime: summary.uptime,
            online: true,
            name: worker.name,
            ip: worker.ip,
        },
        None => {
            let reported = stratum_workers
                .iter()
                .find(|s| s.name.as_deref() == Some(worker.name.as_str()))
                .or_else(|| stratum_workers.iter().find(|s| s.ip == worker.ip));
            WorkerSample {
                hashrate_15m: reported.map(|s| s.hashrate).unwrap_or(0.0),
                uptime: reported.map(|s| s.uptime).unwrap_or(0),
                online: false,
                name: worker.name,
                ip: worker.ip,
            }
        }
    }
}

async fn save_snapshot_blocking(path: PathBuf, snapshot: Arc<MetricsSnapshot>) -> Result<(), StoreError> {
    tokio::task::spawn_blocking(move || snapshot::save_snapshot(&path, &snapshot))
        .await
        .map_err(|e| StoreError::WriteTask { error: e.to_string() })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::donation::MockDonationStatsSource;
    use crate::error::{CollectorError, WorkerError};
    use crate::mode::MiningMode;
    use crate::storage::DonationSync;
    use crate::tier::TierTable;
    use crate::worker::client::MockWorkerApi;
    use serde_json::json;

    const STRATUM: &str = r#"{
        "hashrate_15m": 3000,
        "shares_found": 4,
        "connections": 2,
        "workers": [
            "10.0.0.5:40001,600,1000,1800,rig1",
            "10.0.0.6:40002,300,1000,1200,rig2+20000"
        ]
    }"#;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<StateStore>,
        publisher: Arc<SnapshotPublisher>,
        settings: CollectorSettings,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let stratum_path = dir.path().join("stratum");
        std::fs::write(&stratum_path, STRATUM).unwrap();

        let store = Arc::new(StateStore::open(dir.path().join("state.json"), 10, TierTable::xvb_defaults()).await);
        let (publisher, _) = SnapshotPublisher::new(MetricsSnapshot::default());
        let settings = CollectorSettings {
            stratum_stats_path: stratum_path,
            snapshot_file: Some(dir.path().join("snapshot.json")),
            donation_sync_every: 2,
            ..Default::default()
        };
        Fixture {
            _dir: dir,
            store,
            publisher: Arc::new(publisher),
            settings,
        }
    }

    fn summary(hashrate: f64) -> WorkerSummary {
        serde_json::from_value(json!({"uptime": 900, "hashrate": {"total": [hashrate, hashrate, hashrate]}})).unwrap()
    }

    /// rig1 在线，rig2 离线
    fn partial_fleet() -> MockWorkerApi {
        let mut api = MockWorkerApi::new();
        api.expect_fetch_summary().returning(|endpoint| match endpoint.token.as_deref() {
            Some("rig1") => Ok(summary(2000.0)),
            _ => Err(WorkerError::Timeout {
                address: endpoint.address.clone(),
            }),
        });
        api
    }

    #[tokio::test]
    async fn test_collect_once_builds_snapshot() {
        let f = fixture().await;
        let mut collector = Collector::new(
            f.store.clone(),
            f.publisher.clone(),
            Arc::new(partial_fleet()),
            SwitchSettings::default(),
            None,
            f.settings.clone(),
        );

        let snapshot = collector.collect_once().await;
        assert_eq!(snapshot.version, 1);
        // 只计在线的 rig1，离线 rig2 的 1200 只用于展示
        assert_eq!(snapshot.total_hashrate_15m, 2000.0);
        assert_eq!(snapshot.online_workers(), 1);
        let rig2 = snapshot.workers.iter().find(|w| w.name == "rig2+20000").unwrap();
        assert!(!rig2.online);
        assert_eq!(rig2.hashrate_15m, 1200.0);
        // 第一次观测只建立基线
        assert_eq!(snapshot.local_pool.shares_found, 4);
        assert_eq!(snapshot.local_pool.shares_in_window, 0);

        let known = f.store.known_workers().await;
        assert_eq!(known.get("rig1").map(String::as_str), Some("10.0.0.5"));
        assert_eq!(known.get("rig2+20000").map(String::as_str), Some("10.0.0.6"));

        let history = f.store.history().await;
        let latest = history.latest().unwrap();
        assert_eq!(latest.primary, 2000.0);
        assert_eq!(latest.donation, 0.0);

        let saved = snapshot::load_snapshot(f.settings.snapshot_file.as_ref().unwrap()).unwrap().unwrap();
        assert_eq!(saved.version, 1);
    }

    #[tokio::test]
    async fn test_history_attributed_to_donation_mode() {
        let f = fixture().await;
        f.store.set_mode(MiningMode::SplitDonation).await;
        let mut collector = Collector::new(
            f.store.clone(),
            f.publisher.clone(),
            Arc::new(partial_fleet()),
            SwitchSettings::default(),
            None,
            f.settings.clone(),
        );

        collector.collect_once().await;
        let history = f.store.history().await;
        assert_eq!(history.latest().unwrap().donation, 2000.0);
        assert_eq!(history.latest().unwrap().primary, 0.0);
    }

    #[tokio::test]
    async fn test_donation_sync_throttled() {
        let f = fixture().await;
        let mut source = MockDonationStatsSource::new();
        // 周期 0 和 2 同步
        source.expect_fetch().times(2).returning(|| {
            Ok(DonationSync {
                avg_1h: 1500.0,
                avg_24h: 1100.0,
                fail_count: 0,
            })
        });

        let mut collector = Collector::new(
            f.store.clone(),
            f.publisher.clone(),
            Arc::new(partial_fleet()),
            SwitchSettings::default(),
            Some(Arc::new(source)),
            f.settings.clone(),
        );
        for _ in 0..3 {
            collector.collect_once().await;
        }

        let stats = f.store.donation_stats().await;
        assert_eq!(stats.avg_24h, 1100.0);
        assert!(stats.last_update.is_some());
    }

    #[tokio::test]
    async fn test_donation_sync_failure_keeps_previous_stats() {
        let f = fixture().await;
        f.store
            .apply_donation_sync(DonationSync {
                avg_1h: 900.0,
                avg_24h: 950.0,
                fail_count: 1,
            })
            .await;

        let mut source = MockDonationStatsSource::new();
        source.expect_fetch().returning(|| {
            Err(CollectorError::DonationApi {
                error: "connection refused".to_string(),
            })
        });

        let mut collector = Collector::new(
            f.store.clone(),
            f.publisher.clone(),
            Arc::new(partial_fleet()),
            SwitchSettings::default(),
            Some(Arc::new(source)),
            f.settings.clone(),
        );
        collector.collect_once().await;

        let stats = f.store.donation_stats().await;
        assert_eq!(stats.avg_1h, 900.0);
        assert_eq!(stats.fail_count, 1);
    }

    #[tokio::test]
    async fn test_missing_stratum_file_reports_no_shares() {
        let mut f = fixture().await;
        f.store
            .upsert_known_workers(vec![("rig1".to_string(), "10.0.0.5".to_string())])
            .await;
        f.settings.stratum_stats_path = f.settings.stratum_stats_path.with_file_name("missing");

        let mut collector = Collector::new(
            f.store.clone(),
            f.publisher.clone(),
            Arc::new(partial_fleet()),
            SwitchSettings::default(),
            None,
            f.settings.clone(),
        );
        let snapshot = collector.collect_once().await;
        assert_eq!(snapshot.local_pool.shares_in_window, 0);
        assert_eq!(snapshot.total_hashrate_15m, 2000.0);
    }

    #[tokio::test]
    async fn test_unreachable_worker_excluded_from_total() {
        let f = fixture().await;
        std::fs::write(
            &f.settings.stratum_stats_path,
            r#"{"shares_found": 4, "workers": ["10.0.0.5:40001,600,1000,1000,rig1", "10.0.0.6:40002,600,1000,11000,rig2"]}"#,
        )
        .unwrap();

        let mut api = MockWorkerApi::new();
        api.expect_fetch_summary().returning(|endpoint| match endpoint.token.as_deref() {
            Some("rig1") => Ok(summary(1000.0)),
            _ => Err(WorkerError::Timeout {
                address: endpoint.address.clone(),
            }),
        });
        let mut collector = Collector::new(
            f.store.clone(),
            f.publisher.clone(),
            Arc::new(api),
            SwitchSettings::default(),
            None,
            f.settings.clone(),
        );

        let snapshot = collector.collect_once().await;
        assert_eq!(snapshot.online_workers(), 1);
        assert_eq!(snapshot.total_hashrate_15m, 1000.0);
    }

    #[tokio::test]
    async fn test_restart_does_not_count_old_shares() {
        let f = fixture().await;
        let api = Arc::new(partial_fleet());

        // 新进程: 没有可用的快照，旧份额不算入窗口
        let mut collector = Collector::new(
            f.store.clone(),
            f.publisher.clone(),
            api.clone(),
            SwitchSettings::default(),
            None,
            f.settings.clone(),
        );
        assert_eq!(collector.collect_once().await.local_pool.shares_in_window, 0);

        // 任务重启: 以最新快照为基线，只统计之后的新份额
        std::fs::write(
            &f.settings.stratum_stats_path,
            STRATUM.replace("\"shares_found\": 4", "\"shares_found\": 6"),
        )
        .unwrap();
        let mut restarted = Collector::new(
            f.store.clone(),
            f.publisher.clone(),
            api,
            SwitchSettings::default(),
            None,
            f.settings.clone(),
        );
        let snapshot = restarted.collect_once().await;
        assert_eq!(snapshot.local_pool.shares_found, 6);
        assert_eq!(snapshot.local_pool.shares_in_window, 2);
    }

    #[tokio::test]
    async fn test_missing_stratum_file_keeps_last_counter() {
        let mut f = fixture().await;
        let mut collector = Collector::new(
            f.store.clone(),
            f.publisher.clone(),
            Arc::new(partial_fleet()),
            SwitchSettings::default(),
            None,
            f.settings.clone(),
        );
        collector.collect_once().await;

        f.settings.stratum_stats_path = f.settings.stratum_stats_path.with_file_name("missing");
        let mut collector = Collector::new(
            f.store.clone(),
            f.publisher.clone(),
            Arc::new(partial_fleet()),
            SwitchSettings::default(),
            None,
            f.settings.clone(),
        );
        let snapshot = collector.collect_once().await;
        assert_eq!(snapshot.local_pool.shares_found, 4);
        assert_eq!(snapshot.local_pool.shares_in_window, 0);
    }

    #[test]
    fn test_offline_worker_without_stratum_entry() {
        let sample = worker_sample(ManagedWorker::new("rig9", "10.0.0.9"), None, &[]);
        assert!(!sample.online);
        assert_eq!(sample.hashrate_15m, 0.0);
    }
}
