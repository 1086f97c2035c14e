use crate::collector::donation::DEFAULT_API_URL;
use crate::collector::CollectorSettings;
use crate::logging::{LogConfig, LogRotation};
use crate::scheduler::{DecisionParams, SchedulerSettings};
use crate::tier::TierTable;
use crate::worker::switch::{PoolMatcher, SwitchSettings};
use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "xvb-switcher.toml")]
    pub config: String,

    /// Enable debug mode
    #[arg(short, long)]
    pub debug: bool,

    /// Log level (overrides the configuration file)
    #[arg(long)]
    pub log_level: Option<String>,

    /// State file path (overrides the configuration file)
    #[arg(long)]
    pub state_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub scheduler: SchedulerConfig,
    pub worker_api: WorkerApiConfig,
    pub collector: CollectorConfig,
    pub donation: DonationConfig,
    pub tiers: TierTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub log_rotation: LogRotation,
    pub state_file: PathBuf,
    pub snapshot_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 是否允许切换到捐赠矿池
    pub enabled: bool,
    pub cycle_length_ms: u64,
    pub min_send_ms: u64,
    pub capacity_margin: f64,
    pub time_margin: f64,
    pub fail_threshold: u32,
    pub startup_delay_secs: u64,
    pub error_backoff_secs: u64,
    /// 任务崩溃后的重启延迟
    pub restart_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerApiConfig {
    /// XMRig HTTP API 端口
    pub port: u16,
    pub request_timeout_ms: u64,
    /// 尝试 `<host>.local`
    pub local_discovery: bool,
    /// 校验 `api.worker-id`
    pub verify_identity: bool,
    pub primary_ports: Vec<u16>,
    pub donation_ports: Vec<u16>,
    pub donation_hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub update_interval_secs: u64,
    pub donation_sync_every: u64,
    pub stratum_stats_path: PathBuf,
    pub share_window_secs: u64,
    pub history_max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DonationConfig {
    pub api_url: String,
    /// 参与 XvB 的钱包地址，为空时不同步
    pub address: String,
    pub request_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            scheduler: SchedulerConfig::default(),
            worker_api: WorkerApiConfig::default(),
            collector: CollectorConfig::default(),
            donation: DonationConfig::default(),
            tiers: TierTable::xvb_defaults(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
            log_rotation: LogRotation::Daily,
            state_file: PathBuf::from("data/xvb-state.json"),
            snapshot_file: Some(PathBuf::from("data/xvb-snapshot.json")),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let params = DecisionParams::default();
        Self {
            enabled: params.enabled,
            cycle_length_ms: params.cycle_length_ms,
            min_send_ms: params.min_send_ms,
            capacity_margin: params.capacity_margin,
            time_margin: params.time_margin,
            fail_threshold: params.fail_threshold,
            startup_delay_secs: 5,
            error_backoff_secs: 10,
            restart_delay_secs: 5,
        }
    }
}

impl Default for WorkerApiConfig {
    fn default() -> Self {
        let matcher = PoolMatcher::default();
        let switch = SwitchSettings::default();
        Self {
            port: switch.api_port,
            request_timeout_ms: switch.request_timeout.as_millis() as u64,
            local_discovery: switch.local_discovery,
            verify_identity: switch.verify_identity,
            primary_ports: matcher.primary_ports,
            donation_ports: matcher.donation_ports,
            donation_hosts: matcher.donation_hosts,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        let settings = CollectorSettings::default();
        Self {
            update_interval_secs: settings.update_interval.as_secs(),
            donation_sync_every: settings.donation_sync_every,
            stratum_stats_path: settings.stratum_stats_path,
            share_window_secs: settings.share_window_secs,
            history_max_entries: 2880,
        }
    }
}

impl Default for DonationConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            address: String::new(),
            request_timeout_ms: 10_000,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let config_content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let config_content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(path, config_content)
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// 命令行参数覆盖配置文件
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(level) = &args.log_level {
            self.general.log_level = level.clone();
        }
        if args.debug {
            self.general.log_level = "debug".to_string();
        }
        if let Some(state_file) = &args.state_file {
            self.general.state_file = state_file.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        let scheduler = &self.scheduler;
        if scheduler.cycle_length_ms == 0 {
            anyhow::bail!("Scheduler cycle_length_ms must be greater than 0");
        }
        if scheduler.min_send_ms > scheduler.cycle_length_ms {
            anyhow::bail!(
                "Scheduler min_send_ms ({}) cannot exceed cycle_length_ms ({})",
                scheduler.min_send_ms,
                scheduler.cycle_length_ms
            );
        }
        for (name, margin) in [
            ("capacity_margin", scheduler.capacity_margin),
            ("time_margin", scheduler.time_margin),
        ] {
            if !(0.0..1.0).contains(&margin) {
                anyhow::bail!("Scheduler {} must be in [0.0, 1.0), got {}", name, margin);
            }
        }

        // 等级表
        self.tiers.validate().context("Invalid tier table")?;

        let worker_api = &self.worker_api;
        if worker_api.port == 0 {
            anyhow::bail!("Worker API port must be greater than 0");
        }
        if worker_api.request_timeout_ms == 0 {
            anyhow::bail!("Worker API request_timeout_ms must be greater than 0");
        }
        if worker_api.primary_ports.is_empty() {
            anyhow::bail!("At least one primary pool port must be configured");
        }
        if worker_api.donation_ports.is_empty() && worker_api.donation_hosts.is_empty() {
            anyhow::bail!("At least one donation pool port or host marker must be configured");
        }
        if let Some(port) = worker_api
            .primary_ports
            .iter()
            .find(|p| worker_api.donation_ports.contains(p))
        {
            anyhow::bail!("Port {} cannot be both a primary and a donation pool port", port);
        }

        let collector = &self.collector;
        if collector.update_interval_secs == 0 {
            anyhow::bail!("Collector update_interval_secs must be greater than 0");
        }
        if collector.donation_sync_every == 0 {
            anyhow::bail!("Collector donation_sync_every must be greater than 0");
        }
        if collector.history_max_entries == 0 {
            anyhow::bail!("Collector history_max_entries must be greater than 0");
        }
        if collector.share_window_secs == 0 {
            anyhow::bail!("Collector share_window_secs must be greater than 0");
        }

        if !self.donation.address.is_empty() && self.donation.api_url.is_empty() {
            anyhow::bail!("Donation api_url is required when an address is configured");
        }

        Ok(())
    }

    /// 检查配置是否有效
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.general.log_level.clone(),
            file_path: self
                .general
                .log_file
                .as_ref()
                .map(|p| p.display().to_string()),
            rotation: self.general.log_rotation,
            ..Default::default()
        }
    }

    pub fn decision_params(&self) -> DecisionParams {
        DecisionParams {
            enabled: self.scheduler.enabled,
            capacity_margin: self.scheduler.capacity_margin,
            time_margin: self.scheduler.time_margin,
            cycle_length_ms: self.scheduler.cycle_length_ms,
            min_send_ms: self.scheduler.min_send_ms,
            fail_threshold: self.scheduler.fail_threshold,
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            startup_delay: Duration::from_secs(self.scheduler.startup_delay_secs),
            error_backoff: Duration::from_secs(self.scheduler.error_backoff_secs),
        }
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.scheduler.restart_delay_secs)
    }

    pub fn switch_settings(&self) -> SwitchSettings {
        SwitchSettings {
            api_port: self.worker_api.port,
            local_discovery: self.worker_api.local_discovery,
            verify_identity: self.worker_api.verify_identity,
            request_timeout: Duration::from_millis(self.worker_api.request_timeout_ms),
        }
    }

    pub fn pool_matcher(&self) -> PoolMatcher {
        PoolMatcher {
            primary_ports: self.worker_api.primary_ports.clone(),
            donation_ports: self.worker_api.donation_ports.clone(),
            donation_hosts: self.worker_api.donation_hosts.clone(),
        }
    }

    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            update_interval: Duration::from_secs(self.collector.update_interval_secs),
            donation_sync_every: self.collector.donation_sync_every,
            stratum_stats_path: self.collector.stratum_stats_path.clone(),
            share_window_secs: self.collector.share_window_secs,
            snapshot_file: self.general.snapshot_file.clone(),
        }
    }

    /// 是否启用捐赠统计同步
    pub fn donation_sync_enabled(&self) -> bool {
        !self.donation.address.trim().is_empty()
    }
}
