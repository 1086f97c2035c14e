//! 持久化记录的数据结构

use crate::mode::{MiningMode, PoolTarget};
use crate::tier::TierTable;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// 完整的持久化记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub hashrate_history: HashrateHistory,
    /// 矿机名称 -> 最后一次观察到的地址
    #[serde(default)]
    pub known_workers: BTreeMap<String, String>,
    #[serde(default, alias = "xvb")]
    pub donation: DonationStats,
    /// 启动时总会被配置覆盖，格式不符时忽略
    #[serde(default, deserialize_with = "de_lenient_tiers")]
    pub tiers: TierTable,
}

/// 捐赠统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DonationStats {
    #[serde(default)]
    pub current_mode: MiningMode,
    #[serde(default, alias = "1h_avg")]
    pub avg_1h: f64,
    #[serde(default, alias = "24h_avg")]
    pub avg_24h: f64,
    #[serde(default)]
    pub fail_count: u32,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_donated_ms: u64,
}

/// 外部同步得到的捐赠统计
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DonationSync {
    pub avg_1h: f64,
    pub avg_24h: f64,
    pub fail_count: u32,
}

/// 算力历史样本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashrateSample {
    #[serde(alias = "t", deserialize_with = "de_sample_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(alias = "v")]
    pub total: f64,
    #[serde(default, alias = "v_p2pool")]
    pub primary: f64,
    #[serde(default, alias = "v_xvb")]
    pub donation: f64,
}

impl HashrateSample {
    /// 按当前模式把总算力归到主矿池或捐赠矿池
    pub fn attributed(timestamp: DateTime<Utc>, total: f64, target: PoolTarget) -> Self {
        let total = round2(total);
        let (primary, donation) = match target {
            PoolTarget::Primary => (total, 0.0),
            PoolTarget::Donation => (0.0, total),
        };
        Self {
            timestamp,
            total,
            primary,
            donation,
        }
    }
}

/// 有上限的算力历史 (先进先出)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashrateHistory {
    samples: VecDeque<HashrateSample>,
}

impl HashrateHistory {
    /// 追加样本，超出上限时淘汰最旧的样本
    pub fn push(&mut self, sample: HashrateSample, limit: usize) {
        self.samples.push_back(sample);
        self.enforce_limit(limit);
    }

    pub fn enforce_limit(&mut self, limit: usize) {
        while self.samples.len() > limit {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HashrateSample> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&HashrateSample> {
        self.samples.back()
    }

    pub fn to_vec(&self) -> Vec<HashrateSample> {
        self.samples.iter().cloned().collect()
    }
}

fn round2(value: f64) -> f64 {
    if value.is_finite() {
        (value * 100.0).round() / 100.0
    } else {
        0.0
    }
}

/// 兼容 RFC3339、`%Y-%m-%d %H:%M` (按 UTC) 与 Unix 秒；0 视为未设置
fn parse_timestamp(value: serde_json::Value) -> Result<Option<DateTime<Utc>>, String> {
    match value {
        serde_json::Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
                return Ok(Some(dt.with_timezone(&Utc)));
            }
            NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M")
                .map(|naive| Some(naive.and_utc()))
                .map_err(|e| format!("invalid timestamp {:?}: {}", s, e))
        }
        serde_json::Value::Number(n) => Ok(n
            .as_f64()
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))),
        _ => Ok(None),
    }
}

fn de_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    parse_timestamp(value).map_err(de::Error::custom)
}

fn de_lenient_tiers<'de, D>(deserializer: D) -> Result<TierTable, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn de_sample_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    de_timestamp(deserializer)?.ok_or_else(|| de::Error::custom("sample timestamp is missing"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(total: f64) -> HashrateSample {
        HashrateSample::attributed(Utc::now(), total, PoolTarget::Primary)
    }

    #[test]
    fn test_history_evicts_oldest_first() {
        let mut history = HashrateHistory::default();
        for i in 0..10 {
            history.push(sample(i as f64), 4);
            assert!(history.len() <= 4);
        }

        let totals: Vec<f64> = history.iter().map(|s| s.total).collect();
        assert_eq!(totals, vec![6.0, 7.0, 8.0, 9.0]);
        assert_eq!(history.latest().map(|s| s.total), Some(9.0));
    }

    #[test]
    fn test_attribution_by_target() {
        let now = Utc::now();
        let s = HashrateSample::attributed(now, 1234.5678, PoolTarget::Donation);
        assert_eq!(s.total, 1234.57);
        assert_eq!(s.donation, 1234.57);
        assert_eq!(s.primary, 0.0);

        let s = HashrateSample::attributed(now, f64::NAN, PoolTarget::Primary);
        assert_eq!(s.total, 0.0);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let state: PersistedState = serde_json::from_str(r#"{"known_workers": {"rig1": "10.0.0.5"}}"#).unwrap();
        assert_eq!(state.known_workers.get("rig1").map(String::as_str), Some("10.0.0.5"));
        assert!(state.hashrate_history.is_empty());
        assert_eq!(state.donation, DonationStats::default());
        assert!(state.tiers.is_empty());
    }

    #[test]
    fn test_legacy_donation_block() {
        let json = r#"{
            "xvb": {
                "current_mode": "XVB (Split)",
                "24h_avg": 1500.0,
                "1h_avg": 1200.0,
                "fail_count": 2,
                "last_update": 1700000000.5,
                "total_donated_time": 0
            }
        }"#;
        let state: PersistedState = serde_json::from_str(json).unwrap();
        assert_eq!(state.donation.current_mode, MiningMode::SplitDonation);
        assert_eq!(state.donation.avg_24h, 1500.0);
        assert_eq!(state.donation.avg_1h, 1200.0);
        assert_eq!(state.donation.fail_count, 2);
        assert_eq!(state.donation.last_update.map(|t| t.timestamp()), Some(1_700_000_000));

        let json = r#"{"donation": {"last_update": 0}}"#;
        let state: PersistedState = serde_json::from_str(json).unwrap();
        assert!(state.donation.last_update.is_none());
    }

    #[test]
    fn test_legacy_history_samples() {
        let json = r#"{
            "hashrate_history": [
                {"t": "2024-05-01 12:30", "v": 4521.37, "v_p2pool": 4521.37, "v_xvb": 0},
                {"t": "2024-05-01 12:31", "v": 4400.0, "v_p2pool": 0, "v_xvb": 4400.0}
            ],
            "known_workers": {"rig1": "192.168.1.20"}
        }"#;
        let state: PersistedState = serde_json::from_str(json).unwrap();
        assert_eq!(state.hashrate_history.len(), 2);

        let latest = state.hashrate_history.latest().unwrap();
        assert_eq!(latest.donation, 4400.0);
        assert_eq!(latest.timestamp.to_rfc3339(), "2024-05-01T12:31:00+00:00");
        assert_eq!(state.known_workers.len(), 1);
    }
}
