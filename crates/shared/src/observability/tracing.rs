//! 日志与分布式追踪
//!
//! 本地输出 pretty 或 JSON 日志；配置了 OTLP 端点时额外把 span 批量导出。

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    trace::{Sampler, SdkTracerProvider},
};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use super::ObservabilityConfig;

/// 持有 OTLP provider，释放时刷新未导出的 span
pub struct TracingGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        let Some(provider) = self.provider.take() else {
            return;
        };
        if let Err(e) = provider.shutdown() {
            eprintln!("追踪导出关闭失败: {e:?}");
        }
    }
}

/// `RUST_LOG` 优先，其次配置值，都无效时退回 info
fn build_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn fmt_layer(json: bool) -> Box<dyn Layer<Registry> + Send + Sync> {
    if json {
        // 关闭 span 时输出耗时，便于统计单次发放 / 兑换延迟
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    }
}

/// 安装全局 subscriber
pub fn init(config: &ObservabilityConfig) -> Result<TracingGuard> {
    let provider = config
        .otlp_endpoint
        .as_deref()
        .map(|endpoint| otlp_provider(&config.service_name, endpoint))
        .transpose()?;

    let otel_layer = provider.as_ref().map(|p| {
        tracing_opentelemetry::layer().with_tracer(p.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(fmt_layer(config.json_logs))
        .with(otel_layer)
        .with(build_filter(&config.log_level))
        .try_init()
        .context("全局 tracing subscriber 已被安装")?;

    Ok(TracingGuard { provider })
}

fn otlp_provider(service_name: &str, endpoint: &str) -> Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .with_context(|| format!("OTLP 导出器创建失败: {endpoint}"))?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
        .with_resource(
            Resource::builder()
                .with_service_name(service_name.to_string())
                .build(),
        )
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());
    Ok(provider)
}
