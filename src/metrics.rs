//! Prometheus 指标与往返耗时统计
//!
//! 通过 `init()` 安装全局 Recorder；`render_metrics()` 把当前指标渲染成
//! Prometheus 文本格式。`roundtrip_report` 是纯聚合函数，对外部存储的
//! 响应日志切片做报表，不持有任何状态。

use std::sync::OnceLock;

use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};

use crate::push::types::{NotificationKind, PushVendor};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 指标名称
const COUNTER_PUSH_SENT: &str = "pushgate_push_sent_total";
const COUNTER_PUSH_FAILED: &str = "pushgate_push_failed_total";
const COUNTER_TOKEN_INVALIDATED: &str = "pushgate_token_invalidated_total";
const COUNTER_TOKEN_REPLACED: &str = "pushgate_token_replaced_total";

/// 初始化 Prometheus 指标（安装全局 Recorder）。
/// 仅需在进程内调用一次；重复调用会返回 Err。
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    HANDLE
        .set(handle)
        .map_err(|_| "metrics already initialized")?;
    Ok(())
}

/// 是否已初始化
pub fn is_initialized() -> bool {
    HANDLE.get().is_some()
}

/// 渲染当前指标为 Prometheus 文本格式
pub fn render_metrics() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// 记录一次成功投递
pub fn record_push_sent(vendor: PushVendor, kind: NotificationKind) {
    metrics::counter!(
        COUNTER_PUSH_SENT,
        "vendor" => vendor.as_str(),
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// 记录一次投递失败
pub fn record_push_failed(vendor: PushVendor) {
    metrics::counter!(COUNTER_PUSH_FAILED, "vendor" => vendor.as_str()).increment(1);
}

/// 记录一次 token 失效信号
pub fn record_token_invalidated(vendor: PushVendor) {
    metrics::counter!(COUNTER_TOKEN_INVALIDATED, "vendor" => vendor.as_str()).increment(1);
}

/// 记录一次 token 替换信号
pub fn record_token_replaced(vendor: PushVendor) {
    metrics::counter!(COUNTER_TOKEN_REPLACED, "vendor" => vendor.as_str()).increment(1);
}

/// 单条往返耗时记录（由外部存储提供）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundtripRecord {
    pub platform: String,
    pub roundtrip_time: f64,
    /// 设备是否接受了来电
    pub available: bool,
    pub date: NaiveDate,
}

/// 单个可用性分组的统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundtripStats {
    pub count: usize,
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// 往返耗时报表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundtripReport {
    pub platform: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_count: usize,
    pub available: RoundtripStats,
    pub not_available: RoundtripStats,
}

/// 对给定平台与日期区间的响应日志做往返耗时报表
///
/// 统计口径：按耗时升序排列后，min/avg/max 只取每组前
/// `总条数 * 0.95` 条，剔除最慢的长尾；count 仍统计整组。
pub fn roundtrip_report(
    records: &[RoundtripRecord],
    platform: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> RoundtripReport {
    let mut in_range: Vec<&RoundtripRecord> = records
        .iter()
        .filter(|r| r.platform == platform && r.date >= start_date && r.date <= end_date)
        .collect();
    in_range.sort_by(|a, b| {
        a.roundtrip_time
            .partial_cmp(&b.roundtrip_time)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let total_count = in_range.len();
    let percentile = (total_count as f64 * 0.95) as usize;

    let available = class_stats(&in_range, true, percentile);
    let not_available = class_stats(&in_range, false, percentile);

    RoundtripReport {
        platform: platform.to_string(),
        start_date,
        end_date,
        total_count,
        available,
        not_available,
    }
}

fn class_stats(ordered: &[&RoundtripRecord], available: bool, percentile: usize) -> RoundtripStats {
    let class: Vec<&&RoundtripRecord> = ordered
        .iter()
        .filter(|r| r.available == available)
        .collect();
    let count = class.len();

    let head: Vec<f64> = class
        .iter()
        .take(percentile)
        .map(|r| r.roundtrip_time)
        .collect();

    if head.is_empty() {
        return RoundtripStats {
            count,
            avg: None,
            min: None,
            max: None,
        };
    }

    let sum: f64 = head.iter().sum();
    let min = head.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = head.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    RoundtripStats {
        count,
        avg: Some(sum / head.len() as f64),
        min: Some(min),
        max: Some(max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(platform: &str, roundtrip: f64, available: bool, day: u32) -> RoundtripRecord {
        RoundtripRecord {
            platform: platform.to_string(),
            roundtrip_time: roundtrip,
            available,
            date: NaiveDate::from_ymd_opt(2023, 6, day).unwrap(),
        }
    }

    #[test]
    fn test_report_filters_platform_and_range() {
        let records = vec![
            record("apns", 1.0, true, 5),
            record("gcm", 2.0, true, 5),
            record("apns", 3.0, false, 20),
        ];
        let report = roundtrip_report(
            &records,
            "apns",
            NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 6, 10).unwrap(),
        );
        // gcm 与区间外的记录都被排除
        assert_eq!(report.total_count, 1);
        assert_eq!(report.available.count, 1);
        assert_eq!(report.not_available.count, 0);
        assert_eq!(report.not_available.avg, None);
    }

    #[test]
    fn test_report_truncates_slowest_tail() {
        // 20 条 available 记录：1.0..=19.0 和一个 100.0 的离群值
        let mut records: Vec<RoundtripRecord> =
            (1..=19).map(|i| record("apns", i as f64, true, 5)).collect();
        records.push(record("apns", 100.0, true, 5));

        let report = roundtrip_report(
            &records,
            "apns",
            NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 6, 30).unwrap(),
        );

        // percentile = 20 * 0.95 = 19，最慢的 100.0 被剔除
        assert_eq!(report.total_count, 20);
        assert_eq!(report.available.count, 20);
        assert_eq!(report.available.max, Some(19.0));
        assert_eq!(report.available.min, Some(1.0));
        assert_eq!(report.available.avg, Some(10.0));
    }
}
