//! 指标快照
//!
//! 采集任务通过单槽 watch 通道发布不可变快照，调度任务只读最新一份。

use crate::error::StoreError;
use crate::storage::persist;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

/// 采集结果快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// 版本号，0 为启动时的空快照
    pub version: u64,
    pub taken_at: Option<DateTime<Utc>>,
    /// 所有矿机 15 分钟平均算力之和 (H/s)
    pub total_hashrate_15m: f64,
    #[serde(default)]
    pub workers: Vec<WorkerSample>,
    #[serde(default)]
    pub local_pool: LocalPoolStats,
}

impl MetricsSnapshot {
    pub fn online_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.online).count()
    }
}

/// 单台矿机的采样
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerSample {
    pub name: String,
    pub ip: String,
    /// `/1/summary` 是否可达
    pub online: bool,
    /// 运行时间 (秒)
    pub uptime: u64,
    /// 15 分钟平均算力 (H/s)
    pub hashrate_15m: f64,
}

/// 本地 P2Pool 统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalPoolStats {
    /// 累计找到的份额
    pub shares_found: u64,
    /// 统计窗口内找到的份额
    pub shares_in_window: u64,
    /// P2Pool 报告的 15 分钟算力
    pub hashrate_15m: f64,
    pub connections: u64,
}

/// 快照发布端
#[derive(Debug)]
pub struct SnapshotPublisher {
    sender: watch::Sender<Arc<MetricsSnapshot>>,
}

impl SnapshotPublisher {
    /// 以给定快照为初值创建通道
    pub fn new(initial: MetricsSnapshot) -> (Self, watch::Receiver<Arc<MetricsSnapshot>>) {
        let (sender, receiver) = watch::channel(Arc::new(initial));
        (Self { sender }, receiver)
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<MetricsSnapshot>> {
        self.sender.subscribe()
    }

    pub fn latest(&self) -> Arc<MetricsSnapshot> {
        self.sender.borrow().clone()
    }

    /// 发布新快照，版本号在上一份基础上加一
    pub fn publish(&self, mut snapshot: MetricsSnapshot) -> Arc<MetricsSnapshot> {
        snapshot.version = self.sender.borrow().version + 1;
        let snapshot = Arc::new(snapshot);
        // 没有接收端时 send 会失败，send_replace 总是替换
        self.sender.send_replace(snapshot.clone());
        snapshot
    }
}

/// 原子写入快照文件
pub fn save_snapshot(path: &Path, snapshot: &MetricsSnapshot) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    persist::write_atomic(path, &bytes)
}

/// 读取快照文件，文件不存在时返回 `None`
pub fn load_snapshot(path: &Path) -> Result<Option<MetricsSnapshot>, StoreError> {
    persist::read_json(path)
}
