//! 捐赠等级表与等级解析
//!
//! 等级按算力门槛严格递增排列，表中位置即等级高低。

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// 未达到任何等级时返回的标签
pub const NONE_LABEL: &str = "NONE";

/// 单个捐赠等级
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    /// 门槛算力 (H/s)
    pub threshold: f64,
    /// 等级名称
    pub label: String,
}

impl Tier {
    pub fn new(threshold: f64, label: impl Into<String>) -> Self {
        Self {
            threshold,
            label: label.into(),
        }
    }
}

/// 解析结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTier<'a> {
    pub label: &'a str,
    pub threshold: f64,
}

impl ResolvedTier<'static> {
    pub const NONE: ResolvedTier<'static> = ResolvedTier {
        label: NONE_LABEL,
        threshold: 0.0,
    };
}

impl ResolvedTier<'_> {
    /// 是否为可用于捐赠的目标 (门槛大于0)
    pub fn is_qualified(&self) -> bool {
        self.threshold > 0.0
    }
}

/// 等级表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierTable {
    tiers: Vec<Tier>,
}

impl TierTable {
    pub fn new(tiers: Vec<Tier>) -> Self {
        Self { tiers }
    }

    /// XvB 默认等级
    pub fn xvb_defaults() -> Self {
        Self::new(vec![
            Tier::new(1_000.0, "Donor"),
            Tier::new(10_000.0, "Donor VIP"),
            Tier::new(100_000.0, "Donor Whale"),
            Tier::new(1_000_000.0, "Donor Mega"),
        ])
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    /// 校验门槛为有限非负数且严格递增
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::ValidationError {
                field: "tiers".to_string(),
                reason: "at least one tier must be configured".to_string(),
            });
        }

        let mut previous: Option<&Tier> = None;
        for tier in &self.tiers {
            if !tier.threshold.is_finite() || tier.threshold < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("tiers.{}", tier.label),
                    value: tier.threshold.to_string(),
                    reason: "threshold must be a finite, non-negative hashrate".to_string(),
                });
            }
            if let Some(prev) = previous {
                if tier.threshold <= prev.threshold {
                    return Err(ConfigError::InvalidValue {
                        field: format!("tiers.{}", tier.label),
                        value: tier.threshold.to_string(),
                        reason: format!(
                            "thresholds must be strictly increasing (previous: {} = {})",
                            prev.label, prev.threshold
                        ),
                    });
                }
            }
            previous = Some(tier);
        }

        Ok(())
    }

    /// 选出门槛不超过 `safe_capacity` 的最高等级
    ///
    /// 门槛相同时取表中靠后 (等级更高) 的一项；没有满足的等级时返回 [`ResolvedTier::NONE`]。
    pub fn resolve(&self, safe_capacity: f64) -> ResolvedTier<'_> {
        if !safe_capacity.is_finite() {
            return ResolvedTier::NONE;
        }

        let mut best: Option<&Tier> = None;
        for tier in &self.tiers {
            if tier.threshold > safe_capacity {
                continue;
            }
            match best {
                Some(current) if tier.threshold < current.threshold => {}
                _ => best = Some(tier),
            }
        }

        best.map(|tier| ResolvedTier {
            label: &tier.label,
            threshold: tier.threshold,
        })
        .unwrap_or(ResolvedTier::NONE)
    }
}

impl From<Vec<Tier>> for TierTable {
    fn from(tiers: Vec<Tier>) -> Self {
        Self::new(tiers)
    }
}
