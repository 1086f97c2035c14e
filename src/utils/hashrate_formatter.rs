//! 算力与时长格式化工具

const UNITS: [(f64, &str); 3] = [
    (1_000_000_000.0, "GH/s"),
    (1_000_000.0, "MH/s"),
    (1_000.0, "KH/s"),
];

/// 格式化算力显示（智能单位自适应）
///
/// 低于 1 KH/s 时显示整数 H/s，否则保留两位小数。
///
/// # 示例
/// ```
/// use xvb_switcher::utils::format_hashrate;
///
/// assert_eq!(format_hashrate(850.0), "850 H/s");
/// assert_eq!(format_hashrate(12_345.0), "12.35 KH/s");
/// ```
pub fn format_hashrate(hashrate: f64) -> String {
    if !hashrate.is_finite() || hashrate <= 0.0 {
        return "0 H/s".to_string();
    }

    for (scale, unit) in UNITS {
        if hashrate >= scale {
            return format!("{:.2} {}", hashrate / scale, unit);
        }
    }

    format!("{:.0} H/s", hashrate)
}

/// 格式化毫秒时长，例如 `8m 0s`
pub fn format_duration_ms(duration_ms: u64) -> String {
    let total_secs = duration_ms / 1000;
    let (hours, minutes, seconds) = (total_secs / 3600, (total_secs % 3600) / 60, total_secs % 60);

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else if total_secs > 0 {
        format!("{}s", seconds)
    } else {
        format!("{}ms", duration_ms)
    }
}
