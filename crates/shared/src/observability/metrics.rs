//! Prometheus 指标
//!
//! `metrics` 门面 + Prometheus recorder。独立端口上的 `/metrics` 供抓取，
//! `/health` 供存活探针使用。未安装 recorder 时各记录函数为空操作。

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 指标 HTTP 服务任务
pub struct MetricsHandle {
    server: JoinHandle<()>,
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// 安装全局 recorder 并启动指标 HTTP 服务
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let recorder = PrometheusBuilder::new()
        .install_recorder()
        .context("Prometheus recorder 安装失败")?;
    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server = serve(addr, recorder).await?;
    Ok(MetricsHandle { server })
}

fn router(recorder: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(move || std::future::ready(recorder.render())))
        .route("/health", get(|| std::future::ready("OK")))
}

async fn serve(addr: SocketAddr, recorder: PrometheusHandle) -> Result<JoinHandle<()>> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("指标端口绑定失败: {addr}"))?;
    info!(%addr, "指标服务已启动");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(recorder)).await {
            error!(error = %e, "指标服务异常退出");
        }
    }))
}

/// 注册通用指标（预定义的业务指标）
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("token_awards_total", "Total number of token award attempts");
    metrics::describe_counter!("tokens_awarded_total", "Total number of tokens credited");
    metrics::describe_histogram!(
        "token_award_duration_seconds",
        "Token award duration in seconds"
    );

    metrics::describe_counter!(
        "reward_redemptions_total",
        "Total number of reward redemption attempts"
    );
    metrics::describe_histogram!(
        "reward_redemption_duration_seconds",
        "Reward redemption duration in seconds"
    );

    metrics::describe_counter!("tokens_expired_total", "Total number of tokens expired");
    metrics::describe_counter!(
        "expiration_sweeps_total",
        "Total number of expiration sweeps"
    );

    metrics::describe_counter!(
        "appointment_triggers_total",
        "Total number of completed-appointment triggers"
    );

    metrics::describe_gauge!(
        "expiration_last_sweep_transactions",
        "Earn transactions retired by the last expiration sweep"
    );
    metrics::describe_gauge!(
        "worker_last_run_timestamp",
        "Unix timestamp of the last worker iteration"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录积分发放
#[inline]
pub fn record_award(program_id: i64, source: &str, status: &str, tokens: u64, duration_secs: f64) {
    metrics::counter!(
        "token_awards_total",
        "program_id" => program_id.to_string(),
        "source" => source.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if tokens > 0 {
        metrics::counter!(
            "tokens_awarded_total",
            "program_id" => program_id.to_string()
        )
        .increment(tokens);
    }

    metrics::histogram!(
        "token_award_duration_seconds",
        "source" => source.to_string()
    )
    .record(duration_secs);
}

/// 记录奖励兑换
#[inline]
pub fn record_redemption(reward_id: i64, status: &str, duration_secs: f64) {
    metrics::counter!(
        "reward_redemptions_total",
        "reward_id" => reward_id.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "reward_redemption_duration_seconds",
        "status" => status.to_string()
    )
    .record(duration_secs);
}

/// 记录一次过期清扫（`transactions` 为本次处理的 earn 流水数）
#[inline]
pub fn record_expiration_sweep(transactions: u64, tokens: u64) {
    metrics::counter!("expiration_sweeps_total").increment(1);
    if tokens > 0 {
        metrics::counter!("tokens_expired_total").increment(tokens);
    }
    metrics::gauge!("expiration_last_sweep_transactions").set(transactions as f64);
}

/// 记录预约完成触发
#[inline]
pub fn record_appointment_trigger(status: &str) {
    metrics::counter!(
        "appointment_triggers_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录 Worker 最近一次运行时间
#[inline]
pub fn set_worker_last_run(worker: &str) {
    metrics::gauge!(
        "worker_last_run_timestamp",
        "worker" => worker.to_string()
    )
    .set(chrono::Utc::now().timestamp() as f64);
}
