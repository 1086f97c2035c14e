//! 矿机切换协议
//!
//! 对每台矿机依次尝试候选地址：读取配置，按目标矿池计算每个矿池条目的
//! `enabled`，无变化则视为已处于目标状态，否则写回同一地址。
//! 所有候选地址都失败时只记录警告，不向上抛出。

use super::client::WorkerApi;
use super::document::{PoolEntry, WorkerConfigDocument};
use super::{ManagedWorker, WorkerEndpoint};
use crate::error::{SchedulerError, WorkerError};
use crate::mode::PoolTarget;
use crate::{worker_debug, worker_info, worker_warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::info;

/// 矿池条目识别规则
#[derive(Debug, Clone, PartialEq)]
pub struct PoolMatcher {
    /// 主矿池端口
    pub primary_ports: Vec<u16>,
    /// 捐赠矿池端口
    pub donation_ports: Vec<u16>,
    /// 捐赠矿池主机名关键字
    pub donation_hosts: Vec<String>,
}

impl Default for PoolMatcher {
    fn default() -> Self {
        Self {
            primary_ports: vec![3333],
            donation_ports: vec![3344],
            donation_hosts: vec!["xmrvsbeast".to_string()],
        }
    }
}

impl PoolMatcher {
    /// 判断矿池条目属于哪个矿池，无法识别时返回 `None`
    pub fn classify(&self, entry: &PoolEntry) -> Option<PoolTarget> {
        let (host, port) = entry.host_port();

        if let Some(port) = port {
            if self.primary_ports.contains(&port) {
                return Some(PoolTarget::Primary);
            }
            if self.donation_ports.contains(&port) {
                return Some(PoolTarget::Donation);
            }
        }

        let host = host?.to_ascii_lowercase();
        if self
            .donation_hosts
            .iter()
            .any(|marker| !marker.is_empty() && host.contains(&marker.to_ascii_lowercase()))
        {
            return Some(PoolTarget::Donation);
        }

        None
    }

    /// 按目标矿池设置每个可识别条目的 `enabled`，返回改动的条目数
    pub fn apply(&self, document: &mut WorkerConfigDocument, target: PoolTarget) -> usize {
        let mut changed = 0;
        for entry in document.pools_mut() {
            let Some(role) = self.classify(entry) else {
                continue;
            };
            let desired = role == target;
            if entry.enabled != Some(desired) {
                entry.enabled = Some(desired);
                changed += 1;
            }
        }
        changed
    }
}

/// 切换参数
#[derive(Debug, Clone)]
pub struct SwitchSettings {
    /// XMRig HTTP API 端口
    pub api_port: u16,
    /// 是否尝试 `.local` 主机名
    pub local_discovery: bool,
    /// 是否校验 `api.worker-id`
    pub verify_identity: bool,
    /// 每个候选地址每次请求的超时
    pub request_timeout: Duration,
}

impl Default for SwitchSettings {
    fn default() -> Self {
        Self {
            api_port: 8080,
            local_discovery: true,
            verify_identity: true,
            request_timeout: Duration::from_millis(2000),
        }
    }
}

/// 单台矿机的切换结果
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchOutcome {
    /// 已处于目标状态，没有写入
    Unchanged { address: String },
    /// 写入成功
    Updated { address: String, changed: usize },
    /// 所有候选地址都失败
    Failed { attempts: Vec<WorkerError> },
}

impl SwitchOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, SwitchOutcome::Failed { .. })
    }
}

/// 一次批量切换的汇总
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwitchReport {
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
    pub failed: Vec<String>,
}

impl SwitchReport {
    pub fn total(&self) -> usize {
        self.updated.len() + self.unchanged.len() + self.failed.len()
    }

    fn record(&mut self, name: String, outcome: &SwitchOutcome) {
        match outcome {
            SwitchOutcome::Unchanged { .. } => self.unchanged.push(name),
            SwitchOutcome::Updated { .. } => self.updated.push(name),
            SwitchOutcome::Failed { .. } => self.failed.push(name),
        }
    }
}

/// 矿机切换器
pub struct WorkerSwitcher<A: WorkerApi + ?Sized + 'static> {
    api: Arc<A>,
    matcher: PoolMatcher,
    settings: SwitchSettings,
}

impl<A: WorkerApi + ?Sized + 'static> Clone for WorkerSwitcher<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            matcher: self.matcher.clone(),
            settings: self.settings.clone(),
        }
    }
}

enum Applied {
    Unchanged,
    Updated(usize),
}

impl<A: WorkerApi + ?Sized + 'static> WorkerSwitcher<A> {
    pub fn new(api: Arc<A>, matcher: PoolMatcher, settings: SwitchSettings) -> Self {
        Self { api, matcher, settings }
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn settings(&self) -> &SwitchSettings {
        &self.settings
    }

    /// 切换单台矿机
    pub async fn switch_worker(&self, worker: &ManagedWorker, target: PoolTarget) -> SwitchOutcome {
        let candidates = worker.candidates(self.settings.api_port, self.settings.local_discovery);
        if candidates.is_empty() {
            worker_warn!(worker.name, "Worker control error: no address to reach {}", worker.name);
            return SwitchOutcome::Failed {
                attempts: vec![WorkerError::NoCandidates {
                    worker: worker.name.clone(),
                }],
            };
        }

        let mut attempts = Vec::with_capacity(candidates.len());
        for endpoint in &candidates {
            match self.try_candidate(worker, endpoint, target).await {
                Ok(Applied::Unchanged) => {
                    worker_debug!(worker.name, "{} already on {} pool via {}", worker.name, target, endpoint.address);
                    return SwitchOutcome::Unchanged {
                        address: endpoint.address.clone(),
                    };
                }
                Ok(Applied::Updated(changed)) => {
                    worker_info!(worker.name, "{} switched to {} pool via {}", worker.name, target, endpoint.address);
                    return SwitchOutcome::Updated {
                        address: endpoint.address.clone(),
                        changed,
                    };
                }
                Err(e) => {
                    worker_debug!(worker.name, "Candidate {} rejected: {}", endpoint.address, e);
                    attempts.push(e);
                }
            }
        }

        let tried: Vec<&str> = candidates.iter().map(|e| e.address.as_str()).collect();
        worker_warn!(
            worker.name,
            "Worker control error: failed to switch {} (targets attempted: {})",
            worker.name,
            tried.join(", ")
        );
        SwitchOutcome::Failed { attempts }
    }

    /// 并发切换所有矿机，等待全部完成
    pub async fn switch_all(
        &self,
        workers: Vec<ManagedWorker>,
        target: PoolTarget,
    ) -> Result<SwitchReport, SchedulerError> {
        let mut report = SwitchReport::default();
        if workers.is_empty() {
            return Ok(report);
        }

        let mut tasks = JoinSet::new();
        for worker in workers {
            let switcher = self.clone();
            tasks.spawn(async move {
                let outcome = switcher.switch_worker(&worker, target).await;
                (worker.name, outcome)
            });
        }

        let mut task_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, outcome)) => report.record(name, &outcome),
                Err(e) => task_error = Some(e.to_string()),
            }
        }
        if let Some(error) = task_error {
            return Err(SchedulerError::SwitchTask(error));
        }

        report.updated.sort();
        report.unchanged.sort();
        report.failed.sort();
        info!(
            "Switched workers to {} pool: {} updated, {} unchanged, {} failed",
            target,
            report.updated.len(),
            report.unchanged.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn try_candidate(
        &self,
        worker: &ManagedWorker,
        endpoint: &WorkerEndpoint,
        target: PoolTarget,
    ) -> Result<Applied, WorkerError> {
        let mut document = self.bounded(endpoint, self.api.fetch_config(endpoint)).await?;

        if self.settings.verify_identity {
            verify_identity(worker, endpoint, &document)?;
        }

        let changed = self.matcher.apply(&mut document, target);
        if changed == 0 {
            return Ok(Applied::Unchanged);
        }

        self.bounded(endpoint, self.api.push_config(endpoint, &document)).await?;
        Ok(Applied::Updated(changed))
    }

    async fn bounded<T>(
        &self,
        endpoint: &WorkerEndpoint,
        request: impl Future<Output = Result<T, WorkerError>>,
    ) -> Result<T, WorkerError> {
        match tokio::time::timeout(self.settings.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(WorkerError::Timeout {
                address: endpoint.address.clone(),
            }),
        }
    }
}

/// 文档中声明了 `api.worker-id` 时，必须与矿机主机名一致
fn verify_identity(
    worker: &ManagedWorker,
    endpoint: &WorkerEndpoint,
    document: &WorkerConfigDocument,
) -> Result<(), WorkerError> {
    let expected = worker.host();
    match document.worker_id() {
        Some(found) if !expected.is_empty() && !found.eq_ignore_ascii_case(expected) => {
            Err(WorkerError::IdentityMismatch {
                address: endpoint.address.clone(),
                expected: expected.to_string(),
                found: found.to_string(),
            })
        }
        _ => Ok(()),
    }
}
