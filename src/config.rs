use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// 推送服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// 应用 API 基础 URL；call payload 中的 response_api 由此拼出
    pub app_api_url: String,
    /// APNs 推送证书所在目录
    pub cert_dir: String,
    /// APNs 生产网关
    pub apns_production_gateway: String,
    /// APNs sandbox 网关（设备 sandbox 标志选中时使用）
    pub apns_sandbox_gateway: String,
    /// GCM 发送端点
    pub gcm_endpoint: String,
    /// FCM 发送端点
    pub fcm_endpoint: String,
    /// 单次传输请求超时（秒）；保证发送调用不会无限挂起
    pub request_timeout_secs: u64,
    /// 日志级别
    pub log_level: String,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            app_api_url: env::var("APP_API_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            cert_dir: env::var("CERT_DIR").unwrap_or_else(|_| "./deploy/local".to_string()),
            apns_production_gateway: "https://gateway.push.apple.com/batch".to_string(),
            apns_sandbox_gateway: "https://gateway.sandbox.push.apple.com/batch".to_string(),
            gcm_endpoint: "https://android.googleapis.com/gcm/send".to_string(),
            fcm_endpoint: "https://fcm.googleapis.com/fcm/send".to_string(),
            request_timeout_secs: 10,
            log_level: "info".to_string(),
        }
    }
}

impl PushConfig {
    /// 创建新的默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config file {}", path.as_ref().display()))?;
        let config: PushConfig =
            toml::from_str(&content).context("failed to parse config file")?;
        Ok(config)
    }

    /// 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// 用环境变量覆盖配置项
    fn apply_env(&mut self) {
        if let Ok(v) = env::var("APP_API_URL") {
            self.app_api_url = v;
        }
        if let Ok(v) = env::var("CERT_DIR") {
            self.cert_dir = v;
        }
        if let Ok(v) = env::var("GCM_ENDPOINT") {
            self.gcm_endpoint = v;
        }
        if let Ok(v) = env::var("FCM_ENDPOINT") {
            self.fcm_endpoint = v;
        }
        if let Ok(v) = env::var("REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                self.request_timeout_secs = secs;
            }
        }
        if let Ok(v) = env::var("LOG_LEVEL") {
            self.log_level = v;
        }
    }

    /// 设备回报接听结果用的绝对 URL
    pub fn response_api_url(&self) -> Result<String> {
        let base = Url::parse(&self.app_api_url)
            .with_context(|| format!("invalid app_api_url: {}", self.app_api_url))?;
        let joined = base
            .join("api/call-response/")
            .context("failed to join response api path")?;
        Ok(joined.to_string())
    }

    /// 按设备 sandbox 标志选择 APNs 网关
    pub fn apns_gateway(&self, sandbox: bool) -> &str {
        if sandbox {
            &self.apns_sandbox_gateway
        } else {
            &self.apns_production_gateway
        }
    }
}
