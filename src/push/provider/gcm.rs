use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PushConfig;
use crate::error::{DispatchError, Result};
use crate::push::payload::PushPayload;
use crate::push::provider::provider_trait::PushProvider;
use crate::push::sink::EventSink;
use crate::push::types::{App, DeliveryOutcome, Device, LogLevel, NotificationKind, PushVendor};

/// GCM (Google Cloud Messaging) Provider
///
/// 遗留的 key 认证 JSON 协议：一次请求可带多个 registration id
/// （这里始终恰好一个），响应由三张相互独立的映射组成。
pub struct GcmProvider {
    client: Client,
    endpoint: String,
    sink: Arc<dyn EventSink>,
}

/// 发送请求体
#[derive(Serialize)]
struct GcmRequest<'a> {
    registration_ids: &'a [String],
    data: &'a PushPayload,
    collapse_key: String,
    priority: &'static str,
}

/// GCM 响应：success / canonical / errors 三张映射相互独立，
/// 同一个 token 可能同时出现在 success 与 canonical 里。
#[derive(Debug, Default, Deserialize)]
struct GcmResponse {
    /// registration id -> provider message id
    #[serde(default)]
    success: HashMap<String, String>,
    /// 旧 registration id -> canonical id
    #[serde(default)]
    canonical: HashMap<String, String>,
    /// error code -> registration id
    #[serde(default)]
    errors: HashMap<String, String>,
}

impl GcmProvider {
    pub fn new(config: &PushConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.gcm_endpoint.clone(),
            sink,
        })
    }

    /// 秒级时间桶的 collapse key，后端据此合并同一秒内的待发消息
    fn collapse_key(epoch_secs: i64) -> String {
        format!("{}-cycle.key", epoch_secs)
    }

    fn process_response(
        &self,
        device: &Device,
        unique_key: &str,
        kind: NotificationKind,
        start_time: DateTime<Local>,
        response: &GcmResponse,
    ) {
        for (reg_id, _msg_id) in &response.success {
            self.sink.log_event(
                unique_key,
                LogLevel::Info,
                &format!(
                    "Sent GCM '{}' message at time:{} to {}",
                    kind.as_str(),
                    start_time.format("%H:%M:%S%.6f"),
                    reg_id,
                ),
                Some(device),
            );
            self.sink
                .delivery_outcome(unique_key, reg_id, DeliveryOutcome::Delivered);
            crate::metrics::record_push_sent(PushVendor::Gcm, kind);
        }

        // canonical 与 success 相互独立：投递成功的同时也可能要求换 token
        for (reg_id, new_reg_id) in &response.canonical {
            self.sink.log_event(
                unique_key,
                LogLevel::Warning,
                &format!(
                    "Should replace device token {} with {} in database",
                    reg_id, new_reg_id,
                ),
                Some(device),
            );
            self.sink.delivery_outcome(
                unique_key,
                reg_id,
                DeliveryOutcome::ReplaceToken(new_reg_id.clone()),
            );
            crate::metrics::record_token_replaced(PushVendor::Gcm);
        }

        // TODO: 区分永久与瞬时错误码；目前所有错误码一律按移除 token 处理
        for (err_code, reg_id) in &response.errors {
            self.sink.log_event(
                unique_key,
                LogLevel::Warning,
                &format!("Should remove {} because {}", reg_id, err_code),
                Some(device),
            );
            self.sink
                .delivery_outcome(unique_key, reg_id, DeliveryOutcome::InvalidateToken);
            crate::metrics::record_token_invalidated(PushVendor::Gcm);
            crate::metrics::record_push_failed(PushVendor::Gcm);
        }
    }
}

#[async_trait]
impl PushProvider for GcmProvider {
    async fn deliver(
        &self,
        device: &Device,
        app: &App,
        payload: &PushPayload,
        kind: NotificationKind,
    ) -> Result<()> {
        let unique_key = payload.unique_key(&device.token).to_string();
        let registration_ids = vec![device.token.clone()];
        let start_time = Local::now();

        let request = GcmRequest {
            registration_ids: &registration_ids,
            data: payload,
            collapse_key: Self::collapse_key(start_time.timestamp()),
            priority: "high",
        };

        debug!(
            "[GCM] Sending '{}' message to {} via {}",
            kind.as_str(),
            device.token,
            self.endpoint
        );

        let result = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", app.push_key))
            .json(&request)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(_) => {
                self.sink.log_event(
                    &unique_key,
                    LogLevel::Exception,
                    "Error sending GCM message",
                    Some(device),
                );
                crate::metrics::record_push_failed(PushVendor::Gcm);
                return Ok(());
            }
        };

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                // 凭证被拒：停止发送并修复配置，绝不能重试循环
                self.sink.log_event(
                    &unique_key,
                    LogLevel::Error,
                    "Our Google API key was rejected!!!",
                    Some(device),
                );
                return Err(DispatchError::AuthenticationRejected(format!(
                    "GCM rejected API key for app {}",
                    app.app_id
                )));
            }
            StatusCode::BAD_REQUEST => {
                // 本次调用致命，但不向上冒泡：记录归类后的错误即可
                let fault = DispatchError::MalformedRequest(
                    "Invalid message/option or invalid GCM response".to_string(),
                );
                self.sink
                    .log_event(&unique_key, LogLevel::Error, &fault.to_string(), Some(device));
                return Ok(());
            }
            status if !status.is_success() => {
                self.sink.log_event(
                    &unique_key,
                    LogLevel::Exception,
                    &format!("Error sending GCM message (status {})", status),
                    Some(device),
                );
                crate::metrics::record_push_failed(PushVendor::Gcm);
                return Ok(());
            }
            _ => {}
        }

        let parsed = match response.json::<GcmResponse>().await {
            Ok(parsed) => parsed,
            Err(_) => {
                let fault = DispatchError::MalformedRequest(
                    "Invalid message/option or invalid GCM response".to_string(),
                );
                self.sink
                    .log_event(&unique_key, LogLevel::Error, &fault.to_string(), Some(device));
                return Ok(());
            }
        };

        self.process_response(device, &unique_key, kind, start_time, &parsed);
        Ok(())
    }

    fn vendor(&self) -> PushVendor {
        PushVendor::Gcm
    }
}
