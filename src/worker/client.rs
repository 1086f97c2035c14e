//! XMRig HTTP API 客户端

use super::document::{WorkerConfigDocument, WorkerSummary};
use super::WorkerEndpoint;
use crate::error::WorkerError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// 矿机控制接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkerApi: Send + Sync {
    /// 读取矿池配置 (`GET /1/config`)
    async fn fetch_config(&self, endpoint: &WorkerEndpoint) -> Result<WorkerConfigDocument, WorkerError>;

    /// 写回矿池配置 (`PUT /1/config`)
    async fn push_config(
        &self,
        endpoint: &WorkerEndpoint,
        document: &WorkerConfigDocument,
    ) -> Result<(), WorkerError>;

    /// 读取运行摘要 (`GET /1/summary`)
    async fn fetch_summary(&self, endpoint: &WorkerEndpoint) -> Result<WorkerSummary, WorkerError>;
}

/// 基于 reqwest 的实现
#[derive(Debug, Clone)]
pub struct HttpWorkerClient {
    client: reqwest::Client,
}

impl HttpWorkerClient {
    pub fn new(timeout: Duration) -> Result<Self, WorkerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| WorkerError::Request {
                address: String::new(),
                error: e.to_string(),
            })?;
        Ok(Self { client })
    }

    fn request(&self, method: reqwest::Method, url: String, endpoint: &WorkerEndpoint) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &endpoint.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        endpoint: &WorkerEndpoint,
    ) -> Result<T, WorkerError> {
        let response = self
            .request(reqwest::Method::GET, url, endpoint)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&endpoint.address, e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(WorkerError::HttpStatus {
                address: endpoint.address.clone(),
                status: status.as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| WorkerError::InvalidDocument {
            address: endpoint.address.clone(),
            error: e.to_string(),
        })
    }
}

#[async_trait]
impl WorkerApi for HttpWorkerClient {
    async fn fetch_config(&self, endpoint: &WorkerEndpoint) -> Result<WorkerConfigDocument, WorkerError> {
        self.get_json(endpoint.config_url(), endpoint).await
    }

    async fn push_config(
        &self,
        endpoint: &WorkerEndpoint,
        document: &WorkerConfigDocument,
    ) -> Result<(), WorkerError> {
        let response = self
            .request(reqwest::Method::PUT, endpoint.config_url(), endpoint)
            .json(document)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&endpoint.address, e))?;

        let status = response.status().as_u16();
        debug!("PUT {} -> {}", endpoint.config_url(), status);
        match status {
            200 | 202 | 204 => Ok(()),
            _ => Err(WorkerError::HttpStatus {
                address: endpoint.address.clone(),
                status,
            }),
        }
    }

    async fn fetch_summary(&self, endpoint: &WorkerEndpoint) -> Result<WorkerSummary, WorkerError> {
        self.get_json(endpoint.summary_url(), endpoint).await
    }
}

fn map_reqwest_error(address: &str, error: reqwest::Error) -> WorkerError {
    if error.is_timeout() {
        WorkerError::Timeout {
            address: address.to_string(),
        }
    } else {
        WorkerError::Request {
            address: address.to_string(),
            error: error.to_string(),
        }
    }
}
