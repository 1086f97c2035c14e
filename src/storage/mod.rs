//! 状态存储
//!
//! 持有算力历史、已知矿机、捐赠统计和等级表，每次变更后原子写盘。
//! 写盘失败只记录日志，内存中的状态保持正确，下一次变更会重新写入。

pub mod persist;
pub mod state;

use crate::error::StoreError;
use crate::mode::MiningMode;
use crate::tier::TierTable;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

pub use state::{DonationStats, DonationSync, HashrateHistory, HashrateSample, PersistedState};

/// 状态存储
pub struct StateStore {
    /// 记录文件路径
    path: PathBuf,
    /// 历史样本上限
    history_limit: usize,
    /// 内存中的权威状态
    state: RwLock<PersistedState>,
    /// 串行化写盘
    write_lock: Mutex<()>,
}

impl StateStore {
    /// 打开状态存储，加载已有记录
    ///
    /// 配置中的等级表总是覆盖记录中的等级表。
    pub async fn open(path: impl Into<PathBuf>, history_limit: usize, tiers: TierTable) -> Self {
        let path = path.into();
        let load_path = path.clone();
        let loaded = tokio::task::spawn_blocking(move || {
            persist::read_json::<PersistedState>(&load_path)
        })
        .await;

        let mut state = match loaded {
            Ok(Ok(Some(state))) => {
                info!("State successfully loaded from {}", path.display());
                state
            }
            Ok(Ok(None)) => {
                info!("No state file at {}, starting with defaults", path.display());
                PersistedState::default()
            }
            Ok(Err(e)) => {
                error!("State persistence error: failed to load state: {}", e);
                PersistedState::default()
            }
            Err(e) => {
                error!("State persistence error: load task failed: {}", e);
                PersistedState::default()
            }
        };

        state.hashrate_history.enforce_limit(history_limit);
        state.tiers = tiers;

        Self {
            path,
            history_limit,
            state: RwLock::new(state),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// 追加算力样本
    pub async fn append_history(&self, sample: HashrateSample) {
        {
            let mut state = self.state.write().await;
            state.hashrate_history.push(sample, self.history_limit);
        }
        self.persist_logged().await;
    }

    /// 记录当前生效的模式
    pub async fn set_mode(&self, mode: MiningMode) {
        {
            let mut state = self.state.write().await;
            state.donation.current_mode = mode;
        }
        debug!("Current mode set to {}", mode);
        self.persist_logged().await;
    }

    /// 应用外部同步的捐赠统计
    pub async fn apply_donation_sync(&self, sync: DonationSync) {
        {
            let mut state = self.state.write().await;
            state.donation.avg_1h = sync.avg_1h.max(0.0);
            state.donation.avg_24h = sync.avg_24h.max(0.0);
            state.donation.fail_count = sync.fail_count;
            state.donation.last_update = Some(Utc::now());
        }
        self.persist_logged().await;
    }

    /// 累计已捐赠时间
    pub async fn add_donated_time(&self, duration_ms: u64) {
        if duration_ms == 0 {
            return;
        }
        {
            let mut state = self.state.write().await;
            state.donation.total_donated_ms = state.donation.total_donated_ms.saturating_add(duration_ms);
        }
        self.persist_logged().await;
    }

    /// 更新已知矿机，仅在有新增或地址变化时写盘
    ///
    /// 返回是否发生了变化。
    pub async fn upsert_known_workers<I>(&self, workers: I) -> bool
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let changed = {
            let mut state = self.state.write().await;
            let mut changed = false;
            for (name, address) in workers {
                if name.is_empty() || address.is_empty() {
                    continue;
                }
                if state.known_workers.get(&name) != Some(&address) {
                    debug!("Known worker {} -> {}", name, address);
                    state.known_workers.insert(name, address);
                    changed = true;
                }
            }
            changed
        };

        if changed {
            self.persist_logged().await;
        }
        changed
    }

    pub async fn donation_stats(&self) -> DonationStats {
        self.state.read().await.donation.clone()
    }

    pub async fn current_mode(&self) -> MiningMode {
        self.state.read().await.donation.current_mode
    }

    pub async fn known_workers(&self) -> BTreeMap<String, String> {
        self.state.read().await.known_workers.clone()
    }

    pub async fn history(&self) -> HashrateHistory {
        self.state.read().await.hashrate_history.clone()
    }

    pub async fn tiers(&self) -> TierTable {
        self.state.read().await.tiers.clone()
    }

    /// 当前完整记录的副本
    pub async fn snapshot(&self) -> PersistedState {
        self.state.read().await.clone()
    }

    /// 立即写盘
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.persist().await
    }

    async fn persist_logged(&self) {
        if let Err(e) = self.persist().await {
            error!("State persistence error: failed to save state: {}", e);
        }
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        // 拿到写锁后再序列化，保证最后一次写入的总是最新状态
        let bytes = {
            let state = self.state.read().await;
            serde_json::to_vec_pretty(&*state)?
        };

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || persist::write_atomic(&path, &bytes))
            .await
            .map_err(|e| StoreError::WriteTask {
                error: e.to_string(),
            })?
    }
}
