use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::error::Result;
use crate::push::payload::PushPayload;
use crate::push::provider::provider_trait::PushProvider;
use crate::push::sink::EventSink;
use crate::push::types::{App, DeliveryOutcome, Device, NotificationKind, LogLevel, PushVendor};

/// Mock Provider（用于测试和本地演练）
///
/// 不调用真实后端：记录收到的投递请求，并像成功投递一样
/// 向 EventSink 上报一条 Info 和一个 Delivered 结果。
pub struct MockProvider {
    vendor: PushVendor,
    sink: Arc<dyn EventSink>,
    deliveries: Mutex<Vec<MockDelivery>>,
}

/// 一次被记录的投递
#[derive(Debug, Clone)]
pub struct MockDelivery {
    pub token: String,
    pub payload: PushPayload,
    pub kind: NotificationKind,
}

impl MockProvider {
    pub fn new(vendor: PushVendor, sink: Arc<dyn EventSink>) -> Self {
        Self {
            vendor,
            sink,
            deliveries: Mutex::new(Vec::new()),
        }
    }

    pub fn deliveries(&self) -> Vec<MockDelivery> {
        self.deliveries.lock().clone()
    }
}

#[async_trait]
impl PushProvider for MockProvider {
    async fn deliver(
        &self,
        device: &Device,
        _app: &App,
        payload: &PushPayload,
        kind: NotificationKind,
    ) -> Result<()> {
        let unique_key = payload.unique_key(&device.token).to_string();

        info!(
            "[MOCK PUSH] vendor={} kind={} token={}",
            self.vendor.as_str(),
            kind.as_str(),
            device.token
        );

        self.deliveries.lock().push(MockDelivery {
            token: device.token.clone(),
            payload: payload.clone(),
            kind,
        });

        self.sink.log_event(
            &unique_key,
            LogLevel::Info,
            &format!(
                "Sent {} '{}' message to {}",
                self.vendor.as_str(),
                kind.as_str(),
                device.token
            ),
            Some(device),
        );
        self.sink
            .delivery_outcome(&unique_key, &device.token, DeliveryOutcome::Delivered);

        Ok(())
    }

    fn vendor(&self) -> PushVendor {
        self.vendor
    }
}
