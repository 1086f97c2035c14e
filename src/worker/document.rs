//! XMRig HTTP API 文档
//!
//! 只解析需要的字段，其余字段原样保存在 `extra` 中并在写回时回显。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `GET/PUT /1/config` 文档
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfigDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pools: Option<Vec<PoolEntry>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkerConfigDocument {
    /// `api.worker-id` 字段
    pub fn worker_id(&self) -> Option<&str> {
        self.extra
            .get("api")
            .and_then(|api| api.get("worker-id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn pools_mut(&mut self) -> impl Iterator<Item = &mut PoolEntry> {
        self.pools.iter_mut().flatten()
    }

    pub fn pools(&self) -> impl Iterator<Item = &PoolEntry> {
        self.pools.iter().flatten()
    }
}

/// 矿池条目
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolEntry {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PoolEntry {
    /// URL 中的主机和端口，兼容 `stratum+tcp://host:port/path` 与 `host:port`
    pub fn host_port(&self) -> (Option<&str>, Option<u16>) {
        let rest = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        let authority = rest.split(['/', '?']).next().unwrap_or(rest);
        let authority = authority.rsplit_once('@').map(|(_, a)| a).unwrap_or(authority);

        // IPv6 字面量 [::1]:3333
        if let Some(stripped) = authority.strip_prefix('[') {
            if let Some((host, tail)) = stripped.split_once(']') {
                let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
                return (Some(host).filter(|h| !h.is_empty()), port);
            }
        }

        match authority.rsplit_once(':') {
            Some((host, port)) => (Some(host).filter(|h| !h.is_empty()), port.parse().ok()),
            None => (Some(authority).filter(|h| !h.is_empty()), None),
        }
    }
}

/// `GET /1/summary` 中用到的字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerSummary {
    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(default)]
    pub uptime: u64,
    #[serde(default)]
    pub hashrate: SummaryHashrate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryHashrate {
    /// [10s, 60s, 15m]，XMRig 在数据不足时返回 null
    #[serde(default)]
    pub total: Vec<Option<f64>>,
}

impl WorkerSummary {
    /// 15分钟平均算力
    pub fn hashrate_15m(&self) -> f64 {
        self.hashrate
            .total
            .get(2)
            .copied()
            .flatten()
            .filter(|h| h.is_finite() && *h >= 0.0)
            .unwrap_or(0.0)
    }
}
