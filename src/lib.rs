//! XvB Switcher - P2Pool / XvB 捐赠模式调度器
//!
//! 持续决定每台 XMRig 矿机在 P2Pool (主矿池) 与 XvB (捐赠矿池) 之间的时间分配，
//! 使捐赠算力维持在可承受的最高 XvB 等级；数据不足、捐赠失败或无法验证时回到主矿池。
//!
//! ## 组成
//!
//! - `collector`：采集本地 stratum 统计、矿机实时算力与 XvB 捐赠统计，发布快照
//! - `scheduler`：决策引擎与按时间片执行决策的控制循环
//! - `worker`：通过 XMRig HTTP API 切换矿机的矿池
//! - `storage`：持久化算力历史、已知矿机与捐赠统计
//! - `supervisor`：独立重启崩溃的任务

pub mod collector;
pub mod config;
pub mod error;
pub mod logging;
pub mod mode;
pub mod scheduler;
pub mod storage;
pub mod supervisor;
pub mod tier;
pub mod utils;
pub mod worker;

pub use config::Config;
pub use error::SchedulerError;
pub use mode::{MiningMode, PoolTarget};
pub use scheduler::{DecisionEngine, Scheduler};
pub use storage::StateStore;

/// 程序版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 程序名称
pub const NAME: &str = "xvb-switcher";
