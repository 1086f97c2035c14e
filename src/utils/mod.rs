//! 实用工具模块

pub mod hashrate_formatter;

pub use hashrate_formatter::{format_duration_ms, format_hashrate};
