use std::fs;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use pushgate::{
    cli::{Cli, Commands},
    config::PushConfig,
    logging,
    push::{App, Device, PushDispatcher, TracingEventSink},
};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载 .env 文件（如果存在）
    let _ = dotenvy::dotenv();

    // 解析命令行参数
    let cli = Cli::parse();

    if let Some(Commands::GenerateConfig { path }) = &cli.command {
        return generate_config(path);
    }

    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = PushConfig::load(cli.config_file.as_deref()).context("加载配置失败")?;

    // 日志级别：CLI > 配置文件
    let log_level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    logging::init_logging(log_level, cli.log_format.as_deref(), cli.quiet)?;

    if cli.enable_metrics {
        if pushgate::metrics::init().is_err() {
            tracing::warn!("metrics already initialized");
        }
    }

    tracing::info!("🚀 Pushgate starting...");
    tracing::info!("📊 Push Configuration:");
    tracing::info!("  - App API URL: {}", config.app_api_url);
    tracing::info!("  - Cert Dir: {}", config.cert_dir);
    tracing::info!("  - GCM Endpoint: {}", config.gcm_endpoint);
    tracing::info!("  - FCM Endpoint: {}", config.fcm_endpoint);
    tracing::info!("  - Request Timeout: {}s", config.request_timeout_secs);

    let sink = Arc::new(TracingEventSink);
    let dispatcher =
        PushDispatcher::from_config(&config, sink).context("装配推送 provider 失败")?;

    match cli.command {
        Some(Commands::Send {
            platform,
            token,
            push_key,
            app_id,
            sandbox,
            remote_logging_id,
            unique_key,
            phonenumber,
            caller_id,
            attempt,
            message,
        }) => {
            let app = App {
                app_id,
                platform,
                push_key,
            };
            let device = Device {
                token,
                sandbox,
                remote_logging_id,
                app: app.clone(),
            };

            match (unique_key, message) {
                (Some(unique_key), _) => {
                    let phonenumber = phonenumber
                        .context("call 通知需要 --phonenumber")?;
                    let caller_id = caller_id.context("call 通知需要 --caller-id")?;
                    dispatcher
                        .send_call(&device, &unique_key, &phonenumber, &caller_id, attempt)
                        .await?;
                }
                (None, Some(message)) => {
                    dispatcher.send_message(&device, &app, &message).await?;
                }
                (None, None) => {
                    bail!("需要 --unique-key（call 通知）或 --message（message 通知）");
                }
            }
            tracing::info!("✅ Send completed");
        }
        Some(Commands::GenerateConfig { .. }) => unreachable!(),
        None => {
            tracing::info!("没有指定子命令；使用 `pushgate send --help` 查看发送用法");
        }
    }

    Ok(())
}

/// 生成默认配置文件
fn generate_config(path: &str) -> Result<()> {
    let config = PushConfig::default();
    let content = toml::to_string_pretty(&config).context("序列化默认配置失败")?;
    fs::write(path, content).with_context(|| format!("写入配置文件失败: {}", path))?;
    println!("✅ 默认配置已写入 {}", path);
    Ok(())
}
