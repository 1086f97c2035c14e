//! 矿机控制
//!
//! 通过 XMRig HTTP API 读写矿机的矿池配置。

pub mod client;
pub mod document;
pub mod switch;

pub use client::{HttpWorkerClient, WorkerApi};
pub use document::{PoolEntry, WorkerConfigDocument, WorkerSummary};
pub use switch::{PoolMatcher, SwitchOutcome, SwitchReport, WorkerSwitcher};

/// 一个候选访问地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEndpoint {
    /// `host:port`
    pub address: String,
    /// Bearer 令牌
    pub token: Option<String>,
}

impl WorkerEndpoint {
    pub fn config_url(&self) -> String {
        format!("http://{}/1/config", self.address)
    }

    pub fn summary_url(&self) -> String {
        format!("http://{}/1/summary", self.address)
    }
}

/// 受管矿机
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedWorker {
    /// 矿机名称 (可能带 `+难度` 后缀)
    pub name: String,
    /// 最后一次观察到的 IP
    pub ip: String,
}

impl ManagedWorker {
    pub fn new(name: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
        }
    }

    /// 矿机主机名: 名称中 `+` 之前的部分
    pub fn host(&self) -> &str {
        self.name.split('+').next().unwrap_or("").trim()
    }

    /// 按顺序生成候选地址: 主机名、`.local` 主机名、最后已知 IP
    ///
    /// 令牌取主机名；空主机名或空 IP 跳过，重复地址去掉。
    pub fn candidates(&self, api_port: u16, local_discovery: bool) -> Vec<WorkerEndpoint> {
        let host = self.host();
        let token = Some(host.to_string()).filter(|t| !t.is_empty());

        let ip = strip_port(self.ip.trim());

        let mut hosts: Vec<String> = Vec::with_capacity(3);
        if !host.is_empty() {
            hosts.push(host.to_string());
            if local_discovery && !host.ends_with(".local") && host.parse::<std::net::IpAddr>().is_err() {
                hosts.push(format!("{}.local", host));
            }
        }
        if !ip.is_empty() {
            hosts.push(ip.to_string());
        }

        let mut endpoints: Vec<WorkerEndpoint> = Vec::with_capacity(hosts.len());
        for h in hosts {
            let address = if h.contains(':') {
                format!("[{}]:{}", h, api_port)
            } else {
                format!("{}:{}", h, api_port)
            };
            if endpoints.iter().any(|e| e.address == address) {
                continue;
            }
            endpoints.push(WorkerEndpoint {
                address,
                token: token.clone(),
            });
        }
        endpoints
    }
}

/// 去掉 `ip:port` 中的端口
pub fn strip_port(address: &str) -> &str {
    if let Some(stripped) = address.strip_prefix('[') {
        return stripped.split(']').next().unwrap_or(stripped);
    }
    if address.parse::<std::net::Ipv6Addr>().is_ok() {
        return address;
    }
    address.split(':').next().unwrap_or(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses(worker: &ManagedWorker, local: bool) -> Vec<String> {
        worker
            .candidates(8080, local)
            .into_iter()
            .map(|e| e.address)
            .collect()
    }

    #[test]
    fn test_candidate_order() {
        let worker = ManagedWorker::new("rig1", "192.168.1.20");
        assert_eq!(
            addresses(&worker, true),
            vec!["rig1:8080", "rig1.local:8080", "192.168.1.20:8080"]
        );
        assert_eq!(addresses(&worker, false), vec!["rig1:8080", "192.168.1.20:8080"]);

        let endpoints = worker.candidates(8080, true);
        assert!(endpoints.iter().all(|e| e.token.as_deref() == Some("rig1")));
    }

    #[test]
    fn test_difficulty_suffix_and_port_stripped() {
        let worker = ManagedWorker::new("rig2+50000", "192.168.1.21:51234");
        assert_eq!(worker.host(), "rig2");
        assert_eq!(
            addresses(&worker, true),
            vec!["rig2:8080", "rig2.local:8080", "192.168.1.21:8080"]
        );
    }

    #[test]
    fn test_empty_parts_skipped_and_deduplicated() {
        let worker = ManagedWorker::new("", "10.0.0.7");
        assert_eq!(addresses(&worker, true), vec!["10.0.0.7:8080"]);
        assert_eq!(worker.candidates(8080, true)[0].token, None);

        let worker = ManagedWorker::new("10.0.0.7", "10.0.0.7");
        assert_eq!(addresses(&worker, true), vec!["10.0.0.7:8080"]);

        let worker = ManagedWorker::new("rig3", "");
        assert_eq!(addresses(&worker, true), vec!["rig3:8080", "rig3.local:8080"]);

        let worker = ManagedWorker::new("", "");
        assert!(worker.candidates(8080, true).is_empty());
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("10.0.0.1:3333"), "10.0.0.1");
        assert_eq!(strip_port("10.0.0.1"), "10.0.0.1");
        assert_eq!(strip_port("[fe80::1]:3333"), "fe80::1");
        assert_eq!(strip_port("fe80::1"), "fe80::1");
    }

    #[test]
    fn test_ipv6_candidate() {
        let worker = ManagedWorker::new("rig4", "[fe80::1]:40000");
        assert_eq!(
            addresses(&worker, false),
            vec!["rig4:8080", "[fe80::1]:8080"]
        );
    }
}
