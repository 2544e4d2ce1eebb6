use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use reqwest::{Client, Identity};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PushConfig;
use crate::error::{DispatchError, Result};
use crate::push::payload::PushPayload;
use crate::push::provider::provider_trait::PushProvider;
use crate::push::sink::EventSink;
use crate::push::types::{App, DeliveryOutcome, Device, LogLevel, NotificationKind, PushVendor};

/// APNs (Apple Push Notification service) Provider
///
/// 证书认证的批量网关协议：按设备 sandbox 标志选择网关与证书，
/// 每次发送建立一次会话（证书逐调用解析，调用之间不共享可变状态）。
pub struct ApnsProvider {
    cert_dir: PathBuf,
    production_gateway: String,
    sandbox_gateway: String,
    timeout: Duration,
    sink: Arc<dyn EventSink>,
}

/// 批量提交请求体
#[derive(Serialize)]
struct ApnsBatchRequest<'a> {
    tokens: &'a [String],
    payload: &'a PushPayload,
}

/// 单设备失败条目
#[derive(Debug, Deserialize)]
struct ApnsFailure {
    code: i64,
    message: String,
}

/// 与设备无关的协议级错误
#[derive(Debug, Deserialize)]
struct ApnsProtocolError {
    code: i64,
    message: String,
}

/// 批量网关响应
///
/// `failed` 中报告的 token 按协议约定不可靠（可能无效或损坏），
/// 只能当作提示信息，绝不能用它去定位后续写操作。
#[derive(Debug, Default, Deserialize)]
struct ApnsBatchResponse {
    #[serde(default)]
    failed: HashMap<String, ApnsFailure>,
    #[serde(default)]
    errors: Vec<ApnsProtocolError>,
    #[serde(default)]
    retry: Vec<String>,
}

/// 当前处理的是首次响应还是重试后的响应
#[derive(Clone, Copy, PartialEq)]
enum Attempt {
    First,
    Retried,
}

impl ApnsProvider {
    pub fn new(config: &PushConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            cert_dir: PathBuf::from(&config.cert_dir),
            production_gateway: config.apns_production_gateway.clone(),
            sandbox_gateway: config.apns_sandbox_gateway.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            sink,
        }
    }

    fn gateway(&self, sandbox: bool) -> &str {
        if sandbox {
            &self.sandbox_gateway
        } else {
            &self.production_gateway
        }
    }

    /// 用 App 的推送证书建立一次性会话
    fn open_session(&self, app: &App) -> Result<Client> {
        let cert_path = self.cert_dir.join(&app.push_key);
        let pem = std::fs::read(&cert_path).map_err(|e| {
            DispatchError::Configuration(format!(
                "failed to read push certificate {}: {}",
                cert_path.display(),
                e
            ))
        })?;
        let identity = Identity::from_pem(&pem).map_err(|e| {
            DispatchError::Configuration(format!(
                "invalid push certificate {}: {}",
                cert_path.display(),
                e
            ))
        })?;
        let client = Client::builder()
            .identity(identity)
            .timeout(self.timeout)
            .build()?;
        Ok(client)
    }

    async fn submit(
        &self,
        client: &Client,
        gateway: &str,
        tokens: &[String],
        payload: &PushPayload,
    ) -> Result<ApnsBatchResponse> {
        let request = ApnsBatchRequest { tokens, payload };
        let response = client.post(gateway).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(DispatchError::Transport(format!(
                "APNS gateway returned status {}",
                response.status()
            )));
        }
        let parsed = response.json::<ApnsBatchResponse>().await?;
        Ok(parsed)
    }

    /// 处理批量响应，返回需要重试的 token 子集
    ///
    /// 重试深度固定为 1：首次响应的 retry 子集会被重新提交一次，
    /// 重试响应再次标记 retry 时只上报 RetryableFailure，不再提交。
    fn process_response(
        &self,
        device: &Device,
        unique_key: &str,
        kind: NotificationKind,
        response: &ApnsBatchResponse,
        attempt: Attempt,
    ) -> Vec<String> {
        for (token, failure) in &response.failed {
            // 报告的 token 不可靠，结果挂在我们自己的设备 token 上
            self.sink.log_event(
                unique_key,
                LogLevel::Warning,
                &format!(
                    "Sending APNS message failed for device: {}, reason: {} (code {})",
                    token, failure.message, failure.code
                ),
                Some(device),
            );
            self.sink.delivery_outcome(
                unique_key,
                &device.token,
                DeliveryOutcome::PermanentFailure(failure.message.clone()),
            );
            crate::metrics::record_push_failed(PushVendor::Apns);
        }

        for err in &response.errors {
            self.sink.log_event(
                unique_key,
                LogLevel::Warning,
                &format!("Error sending APNS message. '{}' (code {})", err.message, err.code),
                Some(device),
            );
        }

        if !response.retry.is_empty() {
            match attempt {
                Attempt::First => {
                    self.sink.log_event(
                        unique_key,
                        LogLevel::Info,
                        "Could not sent APNS message, retrying...",
                        Some(device),
                    );
                    return response.retry.clone();
                }
                Attempt::Retried => {
                    self.sink.log_event(
                        unique_key,
                        LogLevel::Warning,
                        "APNS retry still not accepted, giving up",
                        Some(device),
                    );
                    self.sink.delivery_outcome(
                        unique_key,
                        &device.token,
                        DeliveryOutcome::RetryableFailure("retry subset rejected twice".to_string()),
                    );
                    crate::metrics::record_push_failed(PushVendor::Apns);
                    return Vec::new();
                }
            }
        }

        if response.failed.is_empty() && response.errors.is_empty() {
            self.sink.log_event(
                unique_key,
                LogLevel::Info,
                &format!(
                    "Sent APNS '{}' message at time:{} to {}",
                    kind.as_str(),
                    Local::now().format("%H:%M:%S%.6f"),
                    device.token,
                ),
                Some(device),
            );
            self.sink
                .delivery_outcome(unique_key, &device.token, DeliveryOutcome::Delivered);
            crate::metrics::record_push_sent(PushVendor::Apns, kind);
        }

        Vec::new()
    }
}

#[async_trait]
impl PushProvider for ApnsProvider {
    async fn deliver(
        &self,
        device: &Device,
        app: &App,
        payload: &PushPayload,
        kind: NotificationKind,
    ) -> Result<()> {
        let unique_key = payload.unique_key(&device.token).to_string();

        let client = match self.open_session(app) {
            Ok(client) => client,
            Err(e) => {
                self.sink.log_event(
                    &unique_key,
                    LogLevel::Error,
                    &format!("Cannot open APNS session: {}", e),
                    Some(device),
                );
                return Err(e);
            }
        };

        let gateway = self.gateway(device.sandbox);
        let tokens = vec![device.token.clone()];

        debug!(
            "[APNS] Sending '{}' message to {} via {}",
            kind.as_str(),
            device.token,
            gateway
        );

        let response = match self.submit(&client, gateway, &tokens, payload).await {
            Ok(response) => response,
            Err(_) => {
                // 传输异常：本次发送整体失败，无部分结果，不自动重试
                self.sink.log_event(
                    &unique_key,
                    LogLevel::Exception,
                    "Error sending APNS message",
                    Some(device),
                );
                crate::metrics::record_push_failed(PushVendor::Apns);
                return Ok(());
            }
        };

        let retry_tokens =
            self.process_response(device, &unique_key, kind, &response, Attempt::First);

        if !retry_tokens.is_empty() {
            match self.submit(&client, gateway, &retry_tokens, payload).await {
                Ok(retry_response) => {
                    self.process_response(
                        device,
                        &unique_key,
                        kind,
                        &retry_response,
                        Attempt::Retried,
                    );
                }
                Err(_) => {
                    self.sink.log_event(
                        &unique_key,
                        LogLevel::Exception,
                        "Error sending APNS message on retry",
                        Some(device),
                    );
                    crate::metrics::record_push_failed(PushVendor::Apns);
                }
            }
        }

        Ok(())
    }

    fn vendor(&self) -> PushVendor {
        PushVendor::Apns
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
            token: "tok-1".to_string(),
            sandbox: true,
            remote_logging_id: None,
            app: App {
                app_id: "com.example.app".to_string(),
                platform: "apns".to_string(),
                push_key: "push.pem".to_string(),
            },
        }
    }

    fn provider_with_sink() -> (ApnsProvider, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let provider = ApnsProvider::new(&PushConfig::default(), sink.clone());
        (provider, sink)
    }

    #[test]
    fn test_clean_response_emits_single_info_and_delivered() {
        let (provider, sink) = provider_with_sink();
        let device = test_device();
        let response = ApnsBatchResponse::default();

        let retry = provider.process_response(
            &device,
            "abc123",
            NotificationKind::Call,
            &response,
            Attempt::First,
        );

        assert!(retry.is_empty());
        let infos = sink.events_at(LogLevel::Info);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].unique_key, "abc123");
        let outcomes = sink.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].outcome, DeliveryOutcome::Delivered);
    }

    #[test]
    fn test_failed_entry_is_advisory_only() {
        let (provider, sink) = provider_with_sink();
        let device = test_device();
        let response: ApnsBatchResponse = serde_json::from_str(
            r#"{"failed": {"garbled-token": {"code": 8, "message": "invalid token"}}}"#,
        )
        .unwrap();

        provider.process_response(
            &device,
            "abc123",
            NotificationKind::Call,
            &response,
            Attempt::First,
        );

        let warnings = sink.events_at(LogLevel::Warning);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].text.contains("garbled-token"));
        // 结果必须挂在我们已知的设备 token 上，而不是响应里的 token
        let outcomes = sink.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].device_token, "tok-1");
        assert!(matches!(
            outcomes[0].outcome,
            DeliveryOutcome::PermanentFailure(_)
        ));
    }

    #[test]
    fn test_retry_subset_returned_once_then_reported() {
        let (provider, sink) = provider_with_sink();
        let device = test_device();
        let response: ApnsBatchResponse =
            serde_json::from_str(r#"{"retry": ["tok-1"]}"#).unwrap();

        // 首次响应：拿回重试子集，并产生一条 Info
        let retry = provider.process_response(
            &device,
            "abc123",
            NotificationKind::Message,
            &response,
            Attempt::First,
        );
        assert_eq!(retry, vec!["tok-1".to_string()]);
        assert_eq!(sink.events_at(LogLevel::Info).len(), 1);

        // 重试后的响应仍标记重试：不再提交，转为 RetryableFailure
        let retry = provider.process_response(
            &device,
            "abc123",
            NotificationKind::Message,
            &response,
            Attempt::Retried,
        );
        assert!(retry.is_empty());
        let outcomes = sink.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0].outcome,
            DeliveryOutcome::RetryableFailure(_)
        ));
    }

    #[tokio::test]
    async fn test_gateway_failure_is_exception_not_error() {
        let gateway = single_status_gateway("500 Internal Server Error").await;
        let sink = Arc::new(RecordingSink::new());
        let config = PushConfig {
            cert_dir: concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures").to_string(),
            apns_sandbox_gateway: gateway,
            ..PushConfig::default()
        };
        let provider = ApnsProvider::new(&config, sink.clone());
        let mut device = test_device();
        device.app.push_key = "test-identity.pem".to_string();
        let payload = build_message_payload("hello");

        let result = provider
            .deliver(&device, &device.app, &payload, NotificationKind::Message)
            .await;

        // 整次发送失败：一条 Exception 事件，无部分结果，不向上冒泡
        assert!(result.is_ok());
        let exceptions = sink.events_at(LogLevel::Exception);
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0].text, "Error sending APNS message");
        assert!(sink.outcomes().is_empty());
    }

    #[tokio::test]
    async fn test_missing_certificate_is_configuration_error() {
        let (provider, sink) = provider_with_sink();
        let device = test_device();
        let payload = build_message_payload("hello");

        let result = provider
            .deliver(&device, &device.app, &payload, NotificationKind::Message)
            .await;

        assert!(matches!(result, Err(DispatchError::Configuration(_))));
        assert_eq!(sink.events_at(LogLevel::Error).len(), 1);
        assert!(sink.outcomes().is_empty());
    }
}
