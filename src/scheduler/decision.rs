//! 决策引擎
//!
//! 纯函数：相同输入总是得到相同的 `(模式, 时长)`。规则按优先级依次匹配：
//! 关闭 → 无份额 → 失败过多 → 无档位 → 档位未满足 → 按比例分时。

use super::{Decision, DecisionInput, DecisionMode, DecisionReason};
use crate::tier::TierTable;

/// 决策参数
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionParams {
    /// 是否允许切换到捐赠矿池
    pub enabled: bool,
    /// 算力安全余量
    pub capacity_margin: f64,
    /// 1小时平均值的容差
    pub time_margin: f64,
    /// 周期长度 (毫秒)
    pub cycle_length_ms: u64,
    /// 分时模式下最短捐赠时长 (毫秒)
    pub min_send_ms: u64,
    /// 捐赠统计失败次数上限
    pub fail_threshold: u32,
}

impl Default for DecisionParams {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity_margin: 0.15,
            time_margin: 0.05,
            cycle_length_ms: 600_000,
            min_send_ms: 60_000,
            fail_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    params: DecisionParams,
}

impl DecisionEngine {
    pub fn new(params: DecisionParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DecisionParams {
        &self.params
    }

    /// 计算本周期的决策
    pub fn decide(&self, input: &DecisionInput, tiers: &TierTable) -> Decision {
        let params = &self.params;

        if !params.enabled {
            return Decision::primary(DecisionReason::Disabled);
        }

        if input.shares_in_window == 0 {
            return Decision::primary(DecisionReason::NoShares);
        }

        if input.stats.fail_count >= params.fail_threshold {
            return Decision::primary(DecisionReason::TooManyFailures {
                fail_count: input.stats.fail_count,
            });
        }

        let hashrate = sanitize(input.current_hashrate);
        let safe_capacity = hashrate * (1.0 - params.capacity_margin);
        let tier = tiers.resolve(safe_capacity);
        if !tier.is_qualified() {
            return Decision::primary(DecisionReason::NoTier { safe_capacity });
        }

        let target = tier.threshold;
        let avg_1h = sanitize(input.stats.avg_1h);
        let avg_24h = sanitize(input.stats.avg_24h);
        let fulfilled = avg_24h >= target && avg_1h >= target * (1.0 - params.time_margin);

        if !fulfilled {
            return Decision {
                mode: DecisionMode::Donation,
                duration_ms: params.cycle_length_ms,
                reason: DecisionReason::TierNotFulfilled {
                    tier: tier.label.to_string(),
                    target,
                },
            };
        }

        let needed = required_donation_ms(target, hashrate, params.cycle_length_ms);
        if needed == 0 {
            return Decision::primary(DecisionReason::TierMaintained {
                tier: tier.label.to_string(),
                target,
            });
        }

        Decision {
            mode: DecisionMode::Split,
            duration_ms: needed.max(params.min_send_ms).min(params.cycle_length_ms),
            reason: DecisionReason::TierMaintained {
                tier: tier.label.to_string(),
                target,
            },
        }
    }
}

/// 维持 `target` 所需的捐赠时长: `ceil(target / hashrate × cycle)`
fn required_donation_ms(target: f64, hashrate: f64, cycle_length_ms: u64) -> u64 {
    if hashrate <= 0.0 {
        return 0;
    }
    // 先乘后除，避免 0.8 这类比值的浮点误差被 ceil 放大
    let needed = (target * cycle_length_ms as f64 / hashrate).ceil();
    if needed.is_finite() && needed > 0.0 {
        needed as u64
    } else {
        0
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
