use clap::{Parser, Subcommand};

// 确保 Parser trait 被使用
impl Cli {
    /// 解析命令行参数
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

/// Pushgate - 推送通知调度中间件
#[derive(Parser, Debug)]
#[command(name = "pushgate")]
#[command(version)]
#[command(about = "来电与消息推送的调度中间件", long_about = None)]
pub struct Cli {
    /// 配置文件路径
    #[arg(long, value_name = "FILE", help = "指定配置文件路径")]
    pub config_file: Option<String>,

    /// 日志级别
    #[arg(
        long,
        value_name = "LEVEL",
        help = "日志级别: trace, debug, info, warn, error"
    )]
    pub log_level: Option<String>,

    /// 日志格式
    #[arg(long, value_name = "FORMAT", help = "日志格式: pretty, json, compact")]
    pub log_format: Option<String>,

    /// 静默模式
    #[arg(long, short = 'q', help = "静默模式（只输出错误）")]
    pub quiet: bool,

    /// 启用监控指标
    #[arg(long, help = "启用 Prometheus 监控指标")]
    pub enable_metrics: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 发送一条通知（单次，同步等待结果上报完成）
    Send {
        /// 设备平台: apns, gcm, fcm
        #[arg(long, value_name = "PLATFORM")]
        platform: String,

        /// 设备 token / registration id
        #[arg(long, value_name = "TOKEN")]
        token: String,

        /// 推送凭证：APNs 证书文件名或 GCM/FCM API key
        #[arg(long, value_name = "KEY")]
        push_key: String,

        /// App 标识
        #[arg(long, value_name = "ID", default_value = "pushgate-cli")]
        app_id: String,

        /// 使用 APNs sandbox 网关
        #[arg(long)]
        sandbox: bool,

        /// 远程日志关联 ID
        #[arg(long, value_name = "ID")]
        remote_logging_id: Option<String>,

        /// call 通知的关联键；提供时发送 call 通知
        #[arg(long, value_name = "KEY")]
        unique_key: Option<String>,

        /// 来电号码（call 通知）
        #[arg(long, value_name = "NUMBER")]
        phonenumber: Option<String>,

        /// 主叫显示 ID（call 通知）
        #[arg(long, value_name = "ID")]
        caller_id: Option<String>,

        /// 第几次尝试（call 通知）
        #[arg(long, value_name = "NUM", default_value_t = 1)]
        attempt: u32,

        /// 消息文本；未给 unique_key 时发送 message 通知
        #[arg(long, value_name = "TEXT")]
        message: Option<String>,
    },

    /// 生成默认配置文件
    GenerateConfig {
        /// 输出路径
        #[arg(long, value_name = "FILE", default_value = "pushgate.toml")]
        path: String,
    },
}
