//! XvB 捐赠统计同步

use crate::error::CollectorError;
use crate::storage::DonationSync;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// 默认的 XvB 奖励历史接口
pub const DEFAULT_API_URL: &str = "https://xmrvsbeast.com/cgi-bin/p2pool_bonus_history_api.cgi";

/// 捐赠统计来源
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DonationStatsSource: Send + Sync {
    async fn fetch(&self) -> Result<DonationSync, CollectorError>;
}

/// XvB 接口返回的字段，平均值单位为 kH/s
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BonusHistoryPayload {
    #[serde(default)]
    pub donor_1hr_avg: f64,
    #[serde(default)]
    pub donor_24hr_avg: f64,
    #[serde(default)]
    pub fail_count: u32,
}

impl BonusHistoryPayload {
    pub fn parse(raw: &str) -> Result<Self, CollectorError> {
        serde_json::from_str(raw).map_err(|e| CollectorError::DonationPayload { error: e.to_string() })
    }

    /// 转换为 H/s
    pub fn into_sync(self) -> Result<DonationSync, CollectorError> {
        let to_hashes = |khs: f64, field: &str| {
            if khs.is_finite() && khs >= 0.0 {
                Ok(khs * 1000.0)
            } else {
                Err(CollectorError::DonationPayload {
                    error: format!("{} out of range: {}", field, khs),
                })
            }
        };

        Ok(DonationSync {
            avg_1h: to_hashes(self.donor_1hr_avg, "donor_1hr_avg")?,
            avg_24h: to_hashes(self.donor_24hr_avg, "donor_24hr_avg")?,
            fail_count: self.fail_count,
        })
    }
}

/// 基于 reqwest 的 XvB 客户端
#[derive(Debug, Clone)]
pub struct XvbStatsClient {
    client: reqwest::Client,
    api_url: String,
    address: String,
}

impl XvbStatsClient {
    pub fn new(api_url: impl Into<String>, address: impl Into<String>, timeout: Duration) -> Result<Self, CollectorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollectorError::DonationApi { error: e.to_string() })?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            address: address.into(),
        })
    }
}

#[async_trait]
impl DonationStatsSource for XvbStatsClient {
    async fn fetch(&self) -> Result<DonationSync, CollectorError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("address", self.address.as_str())])
            .send()
            .await
            .map_err(|e| CollectorError::DonationApi { error: e.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectorError::DonationApi {
                error: format!("HTTP {}", status.as_u16()),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| CollectorError::DonationApi { error: e.to_string() })?;
        debug!("XvB bonus history: {}", body);

        BonusHistoryPayload::parse(&body)?.into_sync()
    }
}
