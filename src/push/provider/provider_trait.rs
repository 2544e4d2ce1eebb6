use async_trait::async_trait;

use crate::error::Result;
use crate::push::payload::PushPayload;
use crate::push::types::{App, Device, NotificationKind, PushVendor};

/// Push Provider Trait（推送提供者接口）
///
/// 每个后端协议一个实现。单设备级别的失败在实现内部转换为
/// EventSink 事件；只有凭证被拒绝这类对整个 App 致命的错误
/// 才以 `Err` 返回，让批量调用方得以中止。
#[async_trait]
pub trait PushProvider: Send + Sync {
    /// 发送推送
    async fn deliver(
        &self,
        device: &Device,
        app: &App,
        payload: &PushPayload,
        kind: NotificationKind,
    ) -> Result<()>;

    /// 获取 Provider 对应的 Vendor
    fn vendor(&self) -> PushVendor;
}
