//! 挖矿模式

use serde::{Deserialize, Serialize};
use std::fmt;

/// 上游矿池角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolTarget {
    /// 主矿池 (P2Pool)
    Primary,
    /// 捐赠矿池 (XvB)
    Donation,
}

impl fmt::Display for PoolTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolTarget::Primary => write!(f, "primary"),
            PoolTarget::Donation => write!(f, "donation"),
        }
    }
}

/// 当前生效的挖矿模式 (持久化字段)
///
/// 分时周期的两个阶段单独成项，`is_split_phase` 标记其为成对阶段之一。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MiningMode {
    #[default]
    #[serde(rename = "PRIMARY", alias = "P2POOL")]
    Primary,
    #[serde(rename = "DONATION", alias = "XVB")]
    Donation,
    #[serde(rename = "SPLIT_DONATION", alias = "XVB (Split)")]
    SplitDonation,
    #[serde(rename = "SPLIT_PRIMARY", alias = "P2POOL (Split)")]
    SplitPrimary,
}

impl MiningMode {
    /// 该模式下所有矿机应连接的矿池
    pub fn target(&self) -> PoolTarget {
        match self {
            MiningMode::Primary | MiningMode::SplitPrimary => PoolTarget::Primary,
            MiningMode::Donation | MiningMode::SplitDonation => PoolTarget::Donation,
        }
    }

    pub fn is_split_phase(&self) -> bool {
        matches!(self, MiningMode::SplitDonation | MiningMode::SplitPrimary)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MiningMode::Primary => "PRIMARY",
            MiningMode::Donation => "DONATION",
            MiningMode::SplitDonation => "SPLIT_DONATION",
            MiningMode::SplitPrimary => "SPLIT_PRIMARY",
        }
    }
}

impl fmt::Display for MiningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
