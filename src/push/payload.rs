use serde::{Deserialize, Serialize};

/// 推送 Payload
///
/// 线上字段名固定，接收端依赖 `type` 标签与下列键名：
/// - call: unique_key / phonenumber / caller_id / response_api / message_start_time
/// - message: message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PushPayload {
    Call {
        unique_key: String,
        phonenumber: String,
        caller_id: String,
        /// 绝对 URL，设备用它回报接听结果
        response_api: String,
        /// epoch 秒（浮点），设备端用于计算往返耗时
        message_start_time: f64,
    },
    Message {
        message: String,
    },
}

impl PushPayload {
    /// 事件关联键：call 自带 unique_key，message 退回设备 token
    pub fn unique_key<'a>(&'a self, device_token: &'a str) -> &'a str {
        match self {
            PushPayload::Call { unique_key, .. } => unique_key,
            PushPayload::Message { .. } => device_token,
        }
    }
}

/// 构造 call 通知的 Payload
///
/// 纯函数：时间戳由调用方传入，相同输入必然产出相同 Payload。
pub fn build_call_payload(
    unique_key: &str,
    phonenumber: &str,
    caller_id: &str,
    response_api: &str,
    start_time: f64,
) -> PushPayload {
    PushPayload::Call {
        unique_key: unique_key.to_string(),
        phonenumber: phonenumber.to_string(),
        caller_id: caller_id.to_string(),
        response_api: response_api.to_string(),
        message_start_time: start_time,
    }
}

/// 构造 message 通知的 Payload
pub fn build_message_payload(text: &str) -> PushPayload {
    PushPayload::Message {
        message: text.to_string(),
    }
}
