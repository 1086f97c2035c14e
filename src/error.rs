use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Switch task failed: {0}")]
    SwitchTask(String),

    #[error("System error: {0}")]
    System(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Background write task failed: {error}")]
    WriteTask { error: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkerError {
    #[error("Request failed: {address}, error: {error}")]
    Request { address: String, error: String },

    #[error("HTTP error: {address}, status: {status}")]
    HttpStatus { address: String, status: u16 },

    #[error("Request timeout: {address}")]
    Timeout { address: String },

    #[error("Invalid document from {address}: {error}")]
    InvalidDocument { address: String, error: String },

    #[error("Identity mismatch at {address}: expected {expected}, found {found}")]
    IdentityMismatch {
        address: String,
        expected: String,
        found: String,
    },

    #[error("No address candidates for worker: {worker}")]
    NoCandidates { worker: String },
}

impl WorkerError {
    /// 出错的候选地址
    pub fn address(&self) -> Option<&str> {
        match self {
            WorkerError::Request { address, .. }
            | WorkerError::HttpStatus { address, .. }
            | WorkerError::Timeout { address }
            | WorkerError::InvalidDocument { address, .. }
            | WorkerError::IdentityMismatch { address, .. } => Some(address),
            WorkerError::NoCandidates { .. } => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Failed to read stratum stats: {path}, error: {error}")]
    StratumRead { path: String, error: String },

    #[error("Failed to parse stratum stats: {path}, error: {error}")]
    StratumParse { path: String, error: String },

    #[error("Donation API request failed: {error}")]
    DonationApi { error: String },

    #[error("Donation API returned an invalid payload: {error}")]
    DonationPayload { error: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Validation error: {field}, reason: {reason}")]
    ValidationError { field: String, reason: String },

    #[error("Invalid value: {field}, value: {value}, reason: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}
