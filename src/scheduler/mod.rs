//! 捐赠模式调度
//!
//! `decision` 根据算力、份额和捐赠统计给出 `(模式, 时长)`，
//! `control` 把决策按时间片落实到所有矿机上。

pub mod control;
pub mod decision;

pub use control::{Scheduler, SchedulerSettings};
pub use decision::{DecisionEngine, DecisionParams};

use crate::storage::DonationStats;
use std::fmt;

/// 决策模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionMode {
    Primary,
    Donation,
    Split,
}

impl fmt::Display for DecisionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionMode::Primary => write!(f, "PRIMARY"),
            DecisionMode::Donation => write!(f, "DONATION"),
            DecisionMode::Split => write!(f, "SPLIT"),
        }
    }
}

/// 决策原因，仅用于日志
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionReason {
    /// 捐赠切换已关闭
    Disabled,
    /// 窗口内没有份额
    NoShares,
    /// 捐赠统计连续失败
    TooManyFailures { fail_count: u32 },
    /// 安全算力达不到任何档位
    NoTier { safe_capacity: f64 },
    /// 平均捐赠算力未达到档位
    TierNotFulfilled { tier: String, target: f64 },
    /// 档位已满足，按比例分配时间
    TierMaintained { tier: String, target: f64 },
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionReason::Disabled => write!(f, "donation switching disabled"),
            DecisionReason::NoShares => write!(f, "no shares in window"),
            DecisionReason::TooManyFailures { fail_count } => {
                write!(f, "donation failures ({}) reached threshold", fail_count)
            }
            DecisionReason::NoTier { safe_capacity } => {
                write!(f, "safe capacity {:.2} H/s below every tier", safe_capacity)
            }
            DecisionReason::TierNotFulfilled { tier, target } => {
                write!(f, "tier {} ({:.0} H/s) not fulfilled", tier, target)
            }
            DecisionReason::TierMaintained { tier, target } => {
                write!(f, "maintaining tier {} ({:.0} H/s)", tier, target)
            }
        }
    }
}

/// 一次决策，不持久化
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub mode: DecisionMode,
    pub duration_ms: u64,
    pub reason: DecisionReason,
}

impl Decision {
    pub fn primary(reason: DecisionReason) -> Self {
        Self {
            mode: DecisionMode::Primary,
            duration_ms: 0,
            reason,
        }
    }
}

/// 决策输入
#[derive(Debug, Clone, Default)]
pub struct DecisionInput {
    /// 15分钟平均算力 (H/s)
    pub current_hashrate: f64,
    /// 窗口内找到的份额数
    pub shares_in_window: u64,
    pub stats: DonationStats,
}
