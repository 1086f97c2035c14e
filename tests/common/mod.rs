//! 集成测试公共部件：内存中的 XMRig 矿机群

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use xvb_switcher::collector::{LocalPoolStats, MetricsSnapshot};
use xvb_switcher::error::WorkerError;
use xvb_switcher::storage::StateStore;
use xvb_switcher::tier::{Tier, TierTable};
use xvb_switcher::worker::{WorkerApi, WorkerConfigDocument, WorkerEndpoint, WorkerSummary};
use xvb_switcher::PoolTarget;

/// 一次成功写入
#[derive(Debug, Clone, PartialEq)]
pub struct PushRecord {
    pub address: String,
    pub target: PoolTarget,
}

/// 以地址为键的矿机群，未登记的地址视为不可达
#[derive(Default)]
pub struct FakeFleet {
    documents: Mutex<HashMap<String, WorkerConfigDocument>>,
    pushes: Mutex<Vec<PushRecord>>,
    fetches: AtomicUsize,
    /// 前 N 次读取直接 panic
    panic_fetches: AtomicUsize,
}

impl FakeFleet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 登记一台矿机，初始连接主矿池
    pub fn add_worker(&self, address: &str, worker_id: &str) {
        self.documents
            .lock()
            .unwrap()
            .insert(address.to_string(), document(worker_id, true));
    }

    pub fn panic_on_next_fetches(&self, count: usize) {
        self.panic_fetches.store(count, Ordering::SeqCst);
    }

    pub fn pushes(&self) -> Vec<PushRecord> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn document(&self, address: &str) -> Option<WorkerConfigDocument> {
        self.documents.lock().unwrap().get(address).cloned()
    }

    /// 当前启用的矿池
    pub fn active_target(&self, address: &str) -> Option<PoolTarget> {
        self.document(address).and_then(|doc| enabled_target(&doc))
    }
}

#[async_trait]
impl WorkerApi for FakeFleet {
    async fn fetch_config(&self, endpoint: &WorkerEndpoint) -> Result<WorkerConfigDocument, WorkerError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self
            .panic_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            panic!("simulated worker client crash");
        }

        self.documents
            .lock()
            .unwrap()
            .get(&endpoint.address)
            .cloned()
            .ok_or_else(|| WorkerError::Request {
                address: endpoint.address.clone(),
                error: "connection refused".to_string(),
            })
    }

    async fn push_config(&self, endpoint: &WorkerEndpoint, document: &WorkerConfigDocument) -> Result<(), WorkerError> {
        let mut documents = self.documents.lock().unwrap();
        if !documents.contains_key(&endpoint.address) {
            return Err(WorkerError::Request {
                address: endpoint.address.clone(),
                error: "connection refused".to_string(),
            });
        }
        documents.insert(endpoint.address.clone(), document.clone());
        if let Some(target) = enabled_target(document) {
            self.pushes.lock().unwrap().push(PushRecord {
                address: endpoint.address.clone(),
                target,
            });
        }
        Ok(())
    }

    async fn fetch_summary(&self, endpoint: &WorkerEndpoint) -> Result<WorkerSummary, WorkerError> {
        if self.documents.lock().unwrap().contains_key(&endpoint.address) {
            Ok(serde_json::from_value(json!({"uptime": 60, "hashrate": {"total": [1000.0, 1000.0, 1000.0]}})).unwrap())
        } else {
            Err(WorkerError::Timeout {
                address: endpoint.address.clone(),
            })
        }
    }
}

pub fn document(worker_id: &str, primary: bool) -> WorkerConfigDocument {
    serde_json::from_value(json!({
        "api": {"id": null, "worker-id": worker_id},
        "http": {"enabled": true, "host": "0.0.0.0", "port": 8080, "access-token": worker_id},
        "donate-level": 0,
        "pools": [
            {"url": "192.168.1.10:3333", "user": "p2pool", "enabled": primary, "keepalive": true},
            {"url": "192.168.1.10:3344", "user": "xvb", "enabled": !primary, "tls": false}
        ]
    }))
    .unwrap()
}

fn enabled_target(document: &WorkerConfigDocument) -> Option<PoolTarget> {
    document.pools().find(|p| p.enabled == Some(true)).map(|p| {
        if p.url.ends_with(":3344") {
            PoolTarget::Donation
        } else {
            PoolTarget::Primary
        }
    })
}

/// 测试用等级表
pub fn metal_tiers() -> TierTable {
    TierTable::new(vec![
        Tier::new(0.0, "none"),
        Tier::new(500.0, "bronze"),
        Tier::new(800.0, "silver"),
    ])
}

pub fn snapshot(hashrate: f64, shares_in_window: u64) -> MetricsSnapshot {
    MetricsSnapshot {
        version: 1,
        total_hashrate_15m: hashrate,
        local_pool: LocalPoolStats {
            shares_in_window,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub async fn open_store(dir: &tempfile::TempDir) -> Arc<StateStore> {
    Arc::new(StateStore::open(dir.path().join("state.json"), 2880, metal_tiers()).await)
}
