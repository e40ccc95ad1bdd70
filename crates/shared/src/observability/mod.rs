//! 可观测性初始化
//!
//! 日志与追踪走 `tracing`，指标走 `metrics` + Prometheus。
//! 服务启动时调用一次 [`init`]，持有返回的 [`ObservabilityGuard`] 直到进程退出。

pub mod metrics;
pub mod tracing;

use ::tracing::{info, warn};
use anyhow::Result;
use serde::Deserialize;

/// 初始化参数（由 `config::ObservabilityConfig::with_service_name` 生成）
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// 写入 OTLP resource 与日志的服务名
    pub service_name: String,

    /// 为空时只输出本地日志
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    #[serde(default = "enabled")]
    pub metrics_enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// `EnvFilter` 语法，`RUST_LOG` 优先
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub json_logs: bool,
}

fn enabled() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_log_level() -> String {
    "info,sqlx=warn".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "loyalty-ledger".to_string(),
            otlp_endpoint: None,
            metrics_enabled: enabled(),
            metrics_port: default_metrics_port(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

/// 释放时关闭追踪导出并刷新缓冲的 span
pub struct ObservabilityGuard {
    _tracing: Option<tracing::TracingGuard>,
    _metrics: Option<metrics::MetricsHandle>,
}

impl ObservabilityGuard {
    /// 不持有任何资源
    pub fn empty() -> Self {
        Self {
            _tracing: None,
            _metrics: None,
        }
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if self._tracing.is_some() {
            info!("可观测性组件正在关闭");
        }
    }
}

/// 先初始化日志与追踪，再按配置启动指标导出
pub async fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    let tracing_guard = tracing::init(config)?;

    let metrics_handle = if config.metrics_enabled {
        Some(metrics::init(config).await?)
    } else {
        warn!("指标导出已关闭");
        None
    };

    info!(
        service = %config.service_name,
        otlp = config.otlp_endpoint.is_some(),
        metrics_port = config.metrics_port,
        "可观测性初始化完成"
    );

    Ok(ObservabilityGuard {
        _tracing: Some(tracing_guard),
        _metrics: metrics_handle,
    })
}
