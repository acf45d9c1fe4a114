//! # DeepSeek Proxy 主程序
//!
//! 协议翻译网关 - 把上游私有补丁流转为 OpenAI 兼容 API

use clap::Parser;
use deepseek_proxy::{Gateway, ProxyConfig, ProxyError, Result, logging, server};
use std::net::SocketAddr;
use std::sync::Arc;

/// 命令行参数；显式给出的值覆盖环境变量
#[derive(Debug, Parser)]
#[command(name = "deepseek-proxy", about = "OpenAI-compatible gateway for DeepSeek web sessions")]
struct Args {
    /// 监听地址
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// 监听端口（覆盖 PORT 环境变量）
    #[arg(long)]
    port: Option<u16>,

    /// 日志级别（覆盖 RUST_LOG 缺省值）
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging(args.log_level.as_deref());

    let mut config = ProxyConfig::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }

    if !config.has_credentials() {
        tracing::warn!(
            "no DEEPSEEK_AUTHTOKEN configured, upstream requests will fail until one is provided"
        );
    }

    let addr: SocketAddr = format!("{}:{}", args.host, config.port)
        .parse()
        .map_err(|e| ProxyError::internal_with_source("invalid listen address", e))?;

    let gateway = Arc::new(Gateway::new(config));
    gateway.startup().await;

    let router = server::router(gateway.clone());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ProxyError::internal_with_source("failed to bind listener", e))?;

    tracing::info!(%addr, "deepseek-proxy listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ProxyError::internal_with_source("server error", e))?;

    gateway.shutdown().await;
    tracing::info!("deepseek-proxy stopped");
    Ok(())
}

/// 等待 Ctrl-C 触发优雅停机
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install shutdown signal handler");
    }
}
