//! P2Pool 本地 stratum 统计
//!
//! `workers` 中每一项是 `ip:port,uptime,?,hashrate,name` 形式的 CSV 字符串。

use crate::error::CollectorError;
use crate::worker::strip_port;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;

/// stratum 统计文件中用到的字段
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StratumStats {
    #[serde(default)]
    pub hashrate_15m: f64,
    #[serde(default)]
    pub shares_found: u64,
    #[serde(default)]
    pub connections: u64,
    #[serde(default)]
    pub workers: Vec<serde_json::Value>,
}

/// 一条 stratum 矿机记录
#[derive(Debug, Clone, PartialEq)]
pub struct StratumWorker {
    /// 去掉端口的 IP
    pub ip: String,
    pub uptime: u64,
    pub hashrate: f64,
    pub name: Option<String>,
}

impl StratumStats {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// 解析 `workers` 列表，非字符串项跳过
    pub fn workers(&self) -> Vec<StratumWorker> {
        self.workers
            .iter()
            .filter_map(|entry| entry.as_str())
            .filter_map(parse_worker_line)
            .collect()
    }
}

/// 解析一行 CSV，没有 IP 的行返回 `None`
pub fn parse_worker_line(line: &str) -> Option<StratumWorker> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    let ip = strip_port(parts.first().copied().unwrap_or(""));
    if ip.is_empty() {
        return None;
    }

    let number = |index: usize| parts.get(index).and_then(|v| v.parse::<f64>().ok());

    Some(StratumWorker {
        ip: ip.to_string(),
        uptime: number(1).filter(|v| v.is_finite() && *v >= 0.0).unwrap_or(0.0) as u64,
        hashrate: number(3).filter(|v| v.is_finite() && *v >= 0.0).unwrap_or(0.0),
        name: parts.get(4).filter(|n| !n.is_empty()).map(|n| n.to_string()),
    })
}

/// 读取并解析 stratum 统计文件
pub async fn read_stratum_stats(path: &Path) -> Result<StratumStats, CollectorError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CollectorError::StratumRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

    StratumStats::parse(&raw).map_err(|e| CollectorError::StratumParse {
        path: path.display().to_string(),
        error: e.to_string(),
    })
}

/// 统计窗口内的份额增量
///
/// 保留最后一个不晚于窗口起点的观测值作为基线。观测历史短于窗口时
/// 以最早的观测值为基线，只统计观测到的增量；计数器回退 (P2Pool 重启)
/// 时以 0 为基线重新开始。
#[derive(Debug, Clone)]
pub struct ShareWindow {
    window: Duration,
    observations: VecDeque<(DateTime<Utc>, u64)>,
}

impl ShareWindow {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window: Duration::seconds(window_secs.min(u64::from(u32::MAX)) as i64),
            observations: VecDeque::new(),
        }
    }

    /// 用上次保存的快照作为初始基线，早于一个窗口的快照忽略
    pub fn seed(&mut self, now: DateTime<Utc>, taken_at: DateTime<Utc>, shares_found: u64) -> bool {
        if !self.observations.is_empty() || taken_at > now || now - taken_at > self.window {
            return false;
        }
        self.observations.push_back((taken_at, shares_found));
        true
    }

    pub fn observe(&mut self, now: DateTime<Utc>, shares_found: u64) -> u64 {
        if matches!(self.observations.back(), Some(&(_, last)) if shares_found < last) {
            self.observations.clear();
            self.observations.push_back((now, 0));
        }
        self.observations.push_back((now, shares_found));

        let cutoff = now - self.window;
        while self.observations.len() >= 2 && self.observations[1].0 <= cutoff {
            self.observations.pop_front();
        }

        match self.observations.front() {
            Some(&(_, baseline)) => shares_found.saturating_sub(baseline),
            None => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}
