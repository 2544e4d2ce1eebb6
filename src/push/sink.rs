use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::push::types::{DeliveryOutcome, Device, LogLevel};

/// 事件汇（Event Sink）
///
/// Dispatcher 与各 Provider 把发送结果统一上报到这里：
/// - `log_event`：带关联键的分级日志事件
/// - `delivery_outcome`：单设备投递结果（Delivered / InvalidateToken / ReplaceToken 等）
///
/// 实现方负责落盘与远程传输；同一次发送内事件按发现顺序上报，
/// 跨并发发送之间没有顺序保证，实现必须支持并发调用。
pub trait EventSink: Send + Sync {
    fn log_event(&self, unique_key: &str, level: LogLevel, text: &str, device: Option<&Device>);

    fn delivery_outcome(&self, unique_key: &str, device_token: &str, outcome: DeliveryOutcome);
}

/// 生产实现：映射到 tracing 日志
///
/// 输出格式沿用中间件日志约定：`<remote_logging_id> - middleware - <unique_key> | <text>`。
pub struct TracingEventSink;

impl TracingEventSink {
    fn remote_id<'a>(device: Option<&'a Device>) -> &'a str {
        device
            .and_then(|d| d.remote_logging_id.as_deref())
            .unwrap_or("no-logging-id")
    }
}

impl EventSink for TracingEventSink {
    fn log_event(&self, unique_key: &str, level: LogLevel, text: &str, device: Option<&Device>) {
        let remote_id = Self::remote_id(device);
        match level {
            LogLevel::Info => info!("{} - middleware - {} | {}", remote_id, unique_key, text),
            LogLevel::Warning => warn!("{} - middleware - {} | {}", remote_id, unique_key, text),
            // Exception 与 Error 同级输出，但保留类别标记区分堆栈型失败
            LogLevel::Error => error!("{} - middleware - {} | {}", remote_id, unique_key, text),
            LogLevel::Exception => {
                error!("{} - middleware - [exception] {} | {}", remote_id, unique_key, text)
            }
        }
    }

    fn delivery_outcome(&self, unique_key: &str, device_token: &str, outcome: DeliveryOutcome) {
        info!(
            "middleware - {} | outcome for {}: {:?}",
            unique_key, device_token, outcome
        );
    }
}

/// 已记录的日志事件（测试用）
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub unique_key: String,
    pub level: LogLevel,
    pub text: String,
    pub device_token: Option<String>,
}

/// 已记录的投递结果（测试用）
#[derive(Debug, Clone)]
pub struct RecordedOutcome {
    pub unique_key: String,
    pub device_token: String,
    pub outcome: DeliveryOutcome,
}

/// 测试实现：把事件记录在内存里供断言
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RecordedEvent>>,
    outcomes: Mutex<Vec<RecordedOutcome>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    pub fn outcomes(&self) -> Vec<RecordedOutcome> {
        self.outcomes.lock().clone()
    }

    pub fn events_at(&self, level: LogLevel) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn log_event(&self, unique_key: &str, level: LogLevel, text: &str, device: Option<&Device>) {
        self.events.lock().push(RecordedEvent {
            unique_key: unique_key.to_string(),
            level,
            text: text.to_string(),
            device_token: device.map(|d| d.token.clone()),
        });
    }

    fn delivery_outcome(&self, unique_key: &str, device_token: &str, outcome: DeliveryOutcome) {
        self.outcomes.lock().push(RecordedOutcome {
            unique_key: unique_key.to_string(),
            device_token: device_token.to_string(),
            outcome,
        });
    }
}
