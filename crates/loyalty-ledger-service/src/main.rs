//! 积分账本 Worker
//!
//! 连接数据库、执行迁移，并按计划运行积分过期清扫。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use loyalty_shared::{config::AppConfig, database::Database, observability};
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

use loyalty_ledger::{ExpireWorker, LedgerService, LedgerStore, PgLedgerStore};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置
    let config = AppConfig::load("loyalty-ledger-worker").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig {
            service_name: "loyalty-ledger-worker".to_string(),
            ..AppConfig::default()
        }
    });

    // 2. 初始化可观测性
    let obs_config = config
        .observability
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting loyalty-ledger-worker...");
    info!(environment = %config.environment, "Configuration loaded");

    // 3. 初始化数据库连接
    let db = Database::connect_as(&config.database, &config.service_name).await?;
    if config.database.run_migrations {
        db.run_migrations().await?;
    }
    info!("Database connection established");

    // 4. 创建存储与服务
    let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(
        db.pool().clone(),
        Duration::from_millis(config.ledger.lock_timeout_ms),
        Duration::from_millis(config.ledger.statement_timeout_ms),
    ));
    let ledger = Arc::new(LedgerService::new(store, &config.ledger));
    info!("Ledger service initialized");

    // 5. 启动过期清扫 Worker
    let worker = ExpireWorker::new(ledger, &config.ledger.sweep_cron)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(async move { worker.run(shutdown_rx).await });
    info!(cron = %config.ledger.sweep_cron, "ExpireWorker spawned");

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    worker_handle.await?;

    db.close().await;
    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号，用于 Kubernetes 优雅关闭
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
