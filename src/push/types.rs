use serde::{Deserialize, Serialize};

/// 推送平台
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PushVendor {
    Apns,
    Gcm,
    Fcm,
}

impl PushVendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushVendor::Apns => "apns",
            PushVendor::Gcm => "gcm",
            PushVendor::Fcm => "fcm",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "apns" => Some(PushVendor::Apns),
            "gcm" => Some(PushVendor::Gcm),
            "fcm" => Some(PushVendor::Fcm),
            _ => None,
        }
    }
}

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Call,
    Message,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Call => "call",
            NotificationKind::Message => "message",
        }
    }
}

/// App（由外部设备目录提供，发送期间只读）
///
/// `push_key` 的含义随平台变化：APNs 为证书文件名，GCM/FCM 为 API key。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub app_id: String,
    /// 平台标签原文；通过 `PushVendor::from_str` 解析，解析失败视为配置缺陷
    pub platform: String,
    pub push_key: String,
}

/// 设备（由外部设备目录提供，发送期间只读）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub token: String,
    /// 仅对 APNs 有意义：选择 sandbox 网关与证书
    pub sandbox: bool,
    /// 远程日志关联 ID，会被前缀到每条日志事件上
    pub remote_logging_id: Option<String>,
    pub app: App,
}

/// 通知请求（判别联合，恰有一个变体）
#[derive(Debug, Clone)]
pub enum NotificationRequest {
    Call {
        unique_key: String,
        phonenumber: String,
        caller_id: String,
        attempt: u32,
    },
    Message {
        text: String,
    },
}

impl NotificationRequest {
    pub fn kind(&self) -> NotificationKind {
        match self {
            NotificationRequest::Call { .. } => NotificationKind::Call,
            NotificationRequest::Message { .. } => NotificationKind::Message,
        }
    }

    /// Message 变体没有自带关联键，默认使用设备 token
    pub fn unique_key<'a>(&'a self, device_token: &'a str) -> &'a str {
        match self {
            NotificationRequest::Call { unique_key, .. } => unique_key,
            NotificationRequest::Message { .. } => device_token,
        }
    }

    /// 日志用的简短描述；来电带上第几次呼叫尝试
    pub fn describe(&self) -> String {
        match self {
            NotificationRequest::Call { attempt, .. } => {
                format!("{} attempt:{}", self.kind().as_str(), attempt)
            }
            NotificationRequest::Message { .. } => self.kind().as_str().to_string(),
        }
    }
}

/// 日志事件级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Exception,
}

/// 单设备投递结果
///
/// 一次发送可以产生零个或多个结果：provider 可能对同一 token
/// 同时报告投递成功和 canonical 替换，两个事实相互独立。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    RetryableFailure(String),
    PermanentFailure(String),
    InvalidateToken,
    ReplaceToken(String),
}
