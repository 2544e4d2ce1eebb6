use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::config::PushConfig;
use crate::error::{DispatchError, Result};
use crate::push::payload::{build_call_payload, build_message_payload, PushPayload};
use crate::push::provider::{ApnsProvider, FcmProvider, GcmProvider, PushProvider};
use crate::push::sink::EventSink;
use crate::push::types::{App, Device, LogLevel, NotificationRequest, PushVendor};

/// Push Dispatcher（推送调度器）
///
/// 持有 vendor -> provider 的映射（启动时解析一次）和注入的
/// EventSink。自身不做任何重试：重试语义由各 provider 协议决定。
pub struct PushDispatcher {
    providers: HashMap<PushVendor, Arc<dyn PushProvider>>,
    sink: Arc<dyn EventSink>,
    response_api: String,
}

impl PushDispatcher {
    /// 创建空调度器；provider 通过 `with_provider` 注册
    pub fn new(sink: Arc<dyn EventSink>, response_api: String) -> Self {
        Self {
            providers: HashMap::new(),
            sink,
            response_api,
        }
    }

    /// 按配置装配三个真实 provider
    pub fn from_config(config: &PushConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        let response_api = config
            .response_api_url()
            .map_err(|e| DispatchError::Configuration(e.to_string()))?;
        Ok(Self::new(sink.clone(), response_api)
            .with_provider(Arc::new(ApnsProvider::new(config, sink.clone())))
            .with_provider(Arc::new(GcmProvider::new(config, sink.clone())?))
            .with_provider(Arc::new(FcmProvider::new(config, sink)?)))
    }

    /// 注册一个 provider（按其自报的 vendor 建立映射）
    pub fn with_provider(mut self, provider: Arc<dyn PushProvider>) -> Self {
        self.providers.insert(provider.vendor(), provider);
        self
    }

    /// 发送来电通知
    pub async fn send_call(
        &self,
        device: &Device,
        unique_key: &str,
        phonenumber: &str,
        caller_id: &str,
        attempt: u32,
    ) -> Result<()> {
        let request = NotificationRequest::Call {
            unique_key: unique_key.to_string(),
            phonenumber: phonenumber.to_string(),
            caller_id: caller_id.to_string(),
            attempt,
        };
        self.send(device, &device.app, request).await
    }

    /// 发送文本消息通知
    pub async fn send_message(&self, device: &Device, app: &App, text: &str) -> Result<()> {
        let request = NotificationRequest::Message {
            text: text.to_string(),
        };
        self.send(device, app, request).await
    }

    async fn send(&self, device: &Device, app: &App, request: NotificationRequest) -> Result<()> {
        let kind = request.kind();
        let unique_key = request.unique_key(&device.token).to_string();
        let send_id = Uuid::new_v4();

        let provider = PushVendor::from_str(&app.platform)
            .and_then(|vendor| self.providers.get(&vendor));

        let provider = match provider {
            Some(provider) => provider,
            None => {
                // 配置缺陷而非传输失败：不触达任何后端，也绝不重试
                self.sink.log_event(
                    &unique_key,
                    LogLevel::Warning,
                    &format!(
                        "Trying to sent '{}' notification to unknown platform:{} device:{}",
                        kind.as_str(),
                        app.platform,
                        device.token,
                    ),
                    Some(device),
                );
                return Ok(());
            }
        };

        let payload = self.build_payload(&request);

        debug!(
            "[DISPATCH] send_id={} vendor={} request={} token={}",
            send_id,
            provider.vendor().as_str(),
            request.describe(),
            device.token
        );

        provider.deliver(device, app, &payload, kind).await
    }

    fn build_payload(&self, request: &NotificationRequest) -> PushPayload {
        match request {
            NotificationRequest::Call {
                unique_key,
                phonenumber,
                caller_id,
                ..
            } => build_call_payload(
                unique_key,
                phonenumber,
                caller_id,
                &self.response_api,
                epoch_now(),
            ),
            NotificationRequest::Message { text } => build_message_payload(text),
        }
    }
}

/// 当前墙钟时间，epoch 秒（浮点）
fn epoch_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
