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

/// FCM (Firebase Cloud Messaging) Provider
///
/// key 认证的单设备协议，返回带布尔标志的结构化结果。
pub struct FcmProvider {
    client: Client,
    endpoint: String,
    sink: Arc<dyn EventSink>,
}

/// 发送请求体（单设备）
#[derive(Serialize)]
struct FcmRequest<'a> {
    to: &'a str,
    data: &'a PushPayload,
}

/// 按设备的结果明细
#[derive(Debug, Default, Deserialize)]
struct FcmResult {
    #[serde(default)]
    message_id: Option<String>,
    /// canonical id：出现时要求替换存储的 token
    #[serde(default)]
    registration_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// FCM 响应：success / failure / canonical_ids 三个标志相互独立
#[derive(Debug, Default, Deserialize)]
struct FcmResponse {
    #[serde(default)]
    success: u32,
    #[serde(default)]
    failure: u32,
    #[serde(default)]
    canonical_ids: u32,
    #[serde(default)]
    results: Vec<FcmResult>,
}

impl FcmProvider {
    pub fn new(config: &PushConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.fcm_endpoint.clone(),
            sink,
        })
    }

    fn process_response(
        &self,
        device: &Device,
        unique_key: &str,
        kind: NotificationKind,
        start_time: DateTime<Local>,
        response: &FcmResponse,
    ) {
        if response.success > 0 {
            let message_id = response
                .results
                .iter()
                .find_map(|r| r.message_id.as_deref())
                .unwrap_or("-");
            self.sink.log_event(
                unique_key,
                LogLevel::Info,
                &format!(
                    "Sent FCM '{}' message at time:{} to {} (message id {})",
                    kind.as_str(),
                    start_time.format("%H:%M:%S%.6f"),
                    device.token,
                    message_id,
                ),
                Some(device),
            );
            self.sink
                .delivery_outcome(unique_key, &device.token, DeliveryOutcome::Delivered);
            crate::metrics::record_push_sent(PushVendor::Fcm, kind);
        }

        if response.failure > 0 {
            let detail = response
                .results
                .iter()
                .find_map(|r| r.error.as_deref())
                .unwrap_or("unknown");
            self.sink.log_event(
                unique_key,
                LogLevel::Warning,
                &format!("Should remove {} because {}", device.token, detail),
                Some(device),
            );
            self.sink
                .delivery_outcome(unique_key, &device.token, DeliveryOutcome::InvalidateToken);
            crate::metrics::record_token_invalidated(PushVendor::Fcm);
            crate::metrics::record_push_failed(PushVendor::Fcm);
        }

        // canonical 标志独立于 success/failure：同一次结果可以两者皆报
        if response.canonical_ids > 0 {
            self.sink.log_event(
                unique_key,
                LogLevel::Warning,
                &format!("Should replace device token {}", device.token),
                Some(device),
            );
            if let Some(new_token) = response
                .results
                .iter()
                .find_map(|r| r.registration_id.clone())
            {
                self.sink.delivery_outcome(
                    unique_key,
                    &device.token,
                    DeliveryOutcome::ReplaceToken(new_token),
                );
                crate::metrics::record_token_replaced(PushVendor::Fcm);
            }
        }
    }
}

#[async_trait]
impl PushProvider for FcmProvider {
    async fn deliver(
        &self,
        device: &Device,
        app: &App,
        payload: &PushPayload,
        kind: NotificationKind,
    ) -> Result<()> {
        let unique_key = payload.unique_key(&device.token).to_string();
        let start_time = Local::now();

        let request = FcmRequest {
            to: &device.token,
            data: payload,
        };

        debug!(
            "[FCM] Sending '{}' message to {} via {}",
            kind.as_str(),
            device.token,
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", app.push_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| DispatchError::Unclassified(format!("FCM request failed: {}", e)))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                self.sink.log_event(
                    &unique_key,
                    LogLevel::Error,
                    "Our Google API key was rejected!!!",
                    Some(device),
                );
                return Err(DispatchError::AuthenticationRejected(format!(
                    "FCM rejected API key for app {}",
                    app.app_id
                )));
            }
            StatusCode::BAD_REQUEST => {
                // 本次调用致命，但不向上冒泡：记录归类后的错误即可
                let fault =
                    DispatchError::MalformedRequest("Bad api request made by package".to_string());
                self.sink
                    .log_event(&unique_key, LogLevel::Error, &fault.to_string(), Some(device));
                return Ok(());
            }
            status if status.is_server_error() => {
                self.sink.log_event(
                    &unique_key,
                    LogLevel::Error,
                    "FCM Server error",
                    Some(device),
                );
                crate::metrics::record_push_failed(PushVendor::Fcm);
                return Ok(());
            }
            _ => {}
        }

        let parsed = response
            .json::<FcmResponse>()
            .await
            .map_err(|e| DispatchError::Unclassified(format!("invalid FCM response: {}", e)))?;

        self.process_response(device, &unique_key, kind, start_time, &parsed);
        Ok(())
    }

    fn vendor(&self) -> PushVendor {
        PushVendor::Fcm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::payload::build_message_payload;
    use crate::push::provider::gateway_stub::single_status_gateway;
    use crate::push::sink::RecordingSink;

    fn test_device() -> Device {
        Device {
            token: "reg-9".to_string(),
            sandbox: false,
            remote_logging_id: Some("log-77".to_string()),
            app: App {
                app_id: "com.example.app".to_string(),
                platform: "fcm".to_string(),
                push_key: "fcm-api-key".to_string(),
            },
        }
    }

    fn provider_with_sink() -> (FcmProvider, Arc<RecordingSink>) {
        provider_at(PushConfig::default().fcm_endpoint)
    }

    fn provider_at(endpoint: String) -> (FcmProvider, Arc<RecordingSink>) {
        let config = PushConfig {
            fcm_endpoint: endpoint,
            ..PushConfig::default()
        };
        let sink = Arc::new(RecordingSink::new());
        let provider = FcmProvider::new(&config, sink.clone()).unwrap();
        (provider, sink)
    }

    #[tokio::test]
    async fn test_rejected_api_key_is_fatal() {
        let endpoint = single_status_gateway("403 Forbidden").await;
        let (provider, sink) = provider_at(endpoint);
        let device = test_device();
        let payload = build_message_payload("hello");

        let result = provider
            .deliver(&device, &device.app, &payload, NotificationKind::Message)
            .await;

        assert!(matches!(result, Err(DispatchError::AuthenticationRejected(_))));
        // 恰好一条 Error 事件，不解析响应体，也没有任何投递结果
        let errors = sink.events_at(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].text, "Our Google API key was rejected!!!");
        assert!(sink.outcomes().is_empty());
    }

    #[tokio::test]
    async fn test_bad_request_logs_error_without_propagating() {
        let endpoint = single_status_gateway("400 Bad Request").await;
        let (provider, sink) = provider_at(endpoint);
        let device = test_device();
        let payload = build_message_payload("hello");

        let result = provider
            .deliver(&device, &device.app, &payload, NotificationKind::Message)
            .await;

        assert!(result.is_ok());
        let errors = sink.events_at(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].text.contains("Bad api request made by package"));
        assert!(sink.outcomes().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_logged_without_propagating() {
        let endpoint = single_status_gateway("500 Internal Server Error").await;
        let (provider, sink) = provider_at(endpoint);
        let device = test_device();
        let payload = build_message_payload("hello");

        let result = provider
            .deliver(&device, &device.app, &payload, NotificationKind::Message)
            .await;

        assert!(result.is_ok());
        let errors = sink.events_at(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].text, "FCM Server error");
        assert!(sink.outcomes().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_propagates_unclassified() {
        let (provider, sink) = provider_at("http://invalid.invalid/".to_string());
        let device = test_device();
        let payload = build_message_payload("hello");

        let result = provider
            .deliver(&device, &device.app, &payload, NotificationKind::Message)
            .await;

        assert!(matches!(result, Err(DispatchError::Unclassified(_))));
        assert!(sink.events().is_empty());
        assert!(sink.outcomes().is_empty());
    }

    #[test]
    fn test_success_flag_emits_info_and_delivered() {
        let (provider, sink) = provider_with_sink();
        let device = test_device();
        let response: FcmResponse = serde_json::from_str(
            r#"{"success": 1, "failure": 0, "canonical_ids": 0, "results": [{"message_id": "m-1"}]}"#,
        )
        .unwrap();

        provider.process_response(
            &device,
            "abc123",
            NotificationKind::Call,
            Local::now(),
            &response,
        );

        assert_eq!(sink.events_at(LogLevel::Info).len(), 1);
        assert_eq!(sink.outcomes().len(), 1);
        assert_eq!(sink.outcomes()[0].outcome, DeliveryOutcome::Delivered);
    }

    #[test]
    fn test_failure_flag_invalidates_token() {
        let (provider, sink) = provider_with_sink();
        let device = test_device();
        let response: FcmResponse = serde_json::from_str(
            r#"{"success": 0, "failure": 1, "results": [{"error": "NotRegistered"}]}"#,
        )
        .unwrap();

        provider.process_response(
            &device,
            "abc123",
            NotificationKind::Message,
            Local::now(),
            &response,
        );

        let warnings = sink.events_at(LogLevel::Warning);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].text.contains("NotRegistered"));
        assert_eq!(sink.outcomes()[0].outcome, DeliveryOutcome::InvalidateToken);
    }

    #[test]
    fn test_canonical_independent_of_success_flag() {
        let (provider, sink) = provider_with_sink();
        let device = test_device();
        // 投递成功且同时返回 canonical id：两个事实都必须上报
        let response: FcmResponse = serde_json::from_str(
            r#"{"success": 1, "canonical_ids": 1,
                "results": [{"message_id": "m-1", "registration_id": "reg-9-new"}]}"#,
        )
        .unwrap();

        provider.process_response(
            &device,
            "abc123",
            NotificationKind::Call,
            Local::now(),
            &response,
        );

        let outcomes = sink.outcomes();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].outcome, DeliveryOutcome::Delivered);
        assert_eq!(
            outcomes[1].outcome,
            DeliveryOutcome::ReplaceToken("reg-9-new".to_string())
        );
    }
}
