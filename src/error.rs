use std::fmt;
use std::error::Error as StdError;
use serde::{Serialize, Deserialize};

/// 推送调度错误类型
///
/// 每个变体对应一类终结性失败；单设备级别的失败（token 失效、
/// canonical 替换）不走错误通道，而是通过 EventSink 上报。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DispatchError {
    /// 配置缺陷（未知平台、缺失凭证等，必须人工修复，永不重试）
    Configuration(String),
    /// 凭证被拒绝（对该 App 致命，修复凭证前应停止发送）
    AuthenticationRejected(String),
    /// 请求或选项非法（本次调用致命，不自动重试）
    MalformedRequest(String),
    /// 传输层错误（整次发送失败，调用方可稍后整体重试）
    Transport(String),
    /// 未归类的致命错误
    Unclassified(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            DispatchError::AuthenticationRejected(msg) => write!(f, "Authentication rejected: {}", msg),
            DispatchError::MalformedRequest(msg) => write!(f, "Malformed request: {}", msg),
            DispatchError::Transport(msg) => write!(f, "Transport error: {}", msg),
            DispatchError::Unclassified(msg) => write!(f, "Unclassified error: {}", msg),
        }
    }
}

impl StdError for DispatchError {}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        DispatchError::Transport(err.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, DispatchError>;
