//! 调度控制循环
//!
//! 每个周期读取一次最新快照和捐赠统计，调用一次决策引擎，
//! 先持久化模式再切换矿机，然后空闲到本阶段结束。

use super::{Decision, DecisionEngine, DecisionInput, DecisionMode, DecisionReason};
use crate::collector::MetricsSnapshot;
use crate::error::SchedulerError;
use crate::mode::{MiningMode, PoolTarget};
use crate::storage::StateStore;
use crate::utils::{format_duration_ms, format_hashrate};
use crate::worker::{ManagedWorker, SwitchReport, WorkerApi, WorkerSwitcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// 控制循环参数
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// 首个周期前的等待
    pub startup_delay: Duration,
    /// 出错后的退避
    pub error_backoff: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(5),
            error_backoff: Duration::from_secs(10),
        }
    }
}

/// 调度器
pub struct Scheduler<A: WorkerApi + ?Sized + 'static> {
    store: Arc<StateStore>,
    snapshots: watch::Receiver<Arc<MetricsSnapshot>>,
    switcher: WorkerSwitcher<A>,
    engine: DecisionEngine,
    settings: SchedulerSettings,
}

impl<A: WorkerApi + ?Sized + 'static> Scheduler<A> {
    pub fn new(
        store: Arc<StateStore>,
        snapshots: watch::Receiver<Arc<MetricsSnapshot>>,
        switcher: WorkerSwitcher<A>,
        engine: DecisionEngine,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            store,
            snapshots,
            switcher,
            engine,
            settings,
        }
    }

    /// 控制主循环，不会返回
    pub async fn run(self) {
        info!(
            "Algorithm control loop started (cycle {}, startup delay {:?})",
            format_duration_ms(self.engine.params().cycle_length_ms),
            self.settings.startup_delay
        );
        tokio::time::sleep(self.settings.startup_delay).await;

        loop {
            if let Err(e) = self.run_cycle().await {
                error!("Algorithm error: {}", e);
                self.degrade_to_primary().await;
                tokio::time::sleep(self.settings.error_backoff).await;
            }
        }
    }

    /// 执行一个完整周期，返回本周期的决策
    pub async fn run_cycle(&self) -> Result<Decision, SchedulerError> {
        let snapshot = self.snapshots.borrow().clone();
        let stats = self.store.donation_stats().await;
        let tiers = self.store.tiers().await;

        let input = DecisionInput {
            current_hashrate: snapshot.total_hashrate_15m,
            shares_in_window: snapshot.local_pool.shares_in_window,
            stats,
        };
        let decision = self.engine.decide(&input, &tiers);
        log_decision(&decision, &input);

        let cycle_length_ms = self.engine.params().cycle_length_ms;
        match decision.mode {
            DecisionMode::Primary => {
                self.execute_phase(MiningMode::Primary, cycle_length_ms).await?;
            }
            DecisionMode::Donation => {
                self.execute_phase(MiningMode::Donation, cycle_length_ms).await?;
            }
            DecisionMode::Split => {
                self.execute_phase(MiningMode::SplitDonation, decision.duration_ms).await?;

                let remainder = cycle_length_ms.saturating_sub(decision.duration_ms);
                if remainder > 0 {
                    self.execute_phase(MiningMode::SplitPrimary, remainder).await?;
                }
            }
        }

        Ok(decision)
    }

    /// 持久化模式、切换所有矿机，然后空闲 `duration_ms`
    async fn execute_phase(&self, mode: MiningMode, duration_ms: u64) -> Result<SwitchReport, SchedulerError> {
        self.store.set_mode(mode).await;

        let report = self.switch_known_workers(mode.target()).await?;
        if !report.failed.is_empty() {
            warn!("{} worker(s) could not be switched: {}", report.failed.len(), report.failed.join(", "));
        }

        info!("Phase {} for {}", mode, format_duration_ms(duration_ms));
        tokio::time::sleep(Duration::from_millis(duration_ms)).await;

        if mode.target() == PoolTarget::Donation {
            self.store.add_donated_time(duration_ms).await;
        }
        Ok(report)
    }

    async fn switch_known_workers(&self, target: PoolTarget) -> Result<SwitchReport, SchedulerError> {
        let workers: Vec<ManagedWorker> = self
            .store
            .known_workers()
            .await
            .into_iter()
            .map(|(name, ip)| ManagedWorker::new(name, ip))
            .collect();
        self.switcher.switch_all(workers, target).await
    }

    /// 出错后回到主矿池，尽力而为
    pub async fn degrade_to_primary(&self) {
        self.store.set_mode(MiningMode::Primary).await;
        match self.switch_known_workers(PoolTarget::Primary).await {
            Ok(report) => info!("Degraded to primary pool ({} workers)", report.total()),
            Err(e) => error!("Failed to degrade workers to primary pool: {}", e),
        }
    }
}

fn log_decision(decision: &Decision, input: &DecisionInput) {
    match decision.reason {
        DecisionReason::TooManyFailures { .. } => warn!(
            "Decision {} ({}): {}",
            decision.mode,
            format_duration_ms(decision.duration_ms),
            decision.reason
        ),
        _ => info!(
            "Decision {} ({}): {} [hashrate {}, 1h {}, 24h {}, shares {}]",
            decision.mode,
            format_duration_ms(decision.duration_ms),
            decision.reason,
            format_hashrate(input.current_hashrate),
            format_hashrate(input.stats.avg_1h),
            format_hashrate(input.stats.avg_24h),
            input.shares_in_window
        ),
    }
}
