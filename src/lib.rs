//! Webhook Deployer - 推送触发的 compose 部署服务
//!
//! 收到被跟踪分支的推送事件后，同步定义与密钥仓库，
//! 并逐个服务执行 pull / down / up

pub mod error;
pub mod middleware;
pub mod infra;
pub mod domain;
pub mod config;
pub mod state;
pub mod api;
pub mod services;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::env::constants::VERSION;
use crate::config::EnvConfig;
use crate::state::{get_shutdown_token, trigger_shutdown, AppState};

/// 命令行覆盖项
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// 覆盖 PORT
    pub port_override: Option<u16>,
}

/// 初始化日志，`LOG_FORMAT=json` 时输出 JSON
pub fn init_tracing() {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    };
    if std::env::var("LOG_FORMAT").unwrap_or_default() == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }
}

/// 加载配置并运行 HTTP 服务直到收到关闭信号
pub async fn run(runtime: RuntimeConfig) -> anyhow::Result<()> {
    let mut config = EnvConfig::from_env().context("failed to load configuration")?;
    if let Some(port) = runtime.port_override {
        config.port = port;
    }

    if config.is_production() && config.webhook_secret.is_empty() {
        tracing::warn!("GITHUB_SECRET is not set, webhook signatures will NOT be verified");
    }

    tracing::info!(
        version = VERSION,
        environment = %config.environment,
        execution = config.execution.name(),
        compose_repo = %config.compose_repo,
        secrets_repo = %config.secrets_repo,
        deploy_base = %config.deploy_base.display(),
        "Starting webhook deployer"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = Arc::new(AppState::from_config(config));
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    tokio::spawn(shutdown_signal());
    let shutdown = get_shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("server error")?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// 等待 Ctrl+C 或 SIGTERM 并触发全局 shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
    trigger_shutdown();
}
