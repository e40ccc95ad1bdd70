//! 预约完成触发器
//!
//! 与外部预约系统的唯一集成点：预约流转到已完成时，按服务参考价与方案换算比例
//! 计算积分并发放。发放属于尽力而为的增强逻辑，失败只记录日志，不影响预约本身。

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use loyalty_shared::config::LedgerConfig;
use loyalty_shared::observability::metrics;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::context::AuthContext;
use crate::error::{LedgerError, Result};
use crate::models::SourceType;
use crate::repository::LedgerStore;
use crate::service::{AwardTokensRequest, AwardTokensResponse, LedgerService};

/// 预约状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

/// 预约状态变更事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentEvent {
    /// 事件 ID，作为积分发放的幂等键
    pub event_id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    #[serde(default)]
    pub service_id: Option<Uuid>,
    pub previous_status: AppointmentStatus,
    pub status: AppointmentStatus,
    pub occurred_at: DateTime<Utc>,
}

impl AppointmentEvent {
    /// 是否为流转到已完成的事件
    pub fn is_completion(&self) -> bool {
        self.status == AppointmentStatus::Completed
            && self.previous_status != AppointmentStatus::Completed
    }
}

/// 参考价 × 换算比例向下取整，并限制在 `[min_tokens, max_tokens]`
pub fn compute_base_tokens(
    price: Decimal,
    earn_ratio: Decimal,
    min_tokens: i64,
    max_tokens: i64,
) -> i64 {
    let raw = price
        .checked_mul(earn_ratio)
        .and_then(|v| v.floor().to_i64())
        .unwrap_or(max_tokens);
    raw.clamp(min_tokens, max_tokens)
}

/// 预约完成触发器
pub struct AppointmentTrigger {
    ledger: Arc<LedgerService>,
    store: Arc<dyn LedgerStore>,
    default_price: Decimal,
    min_tokens: i64,
    max_tokens: i64,
}

impl AppointmentTrigger {
    pub fn new(
        ledger: Arc<LedgerService>,
        store: Arc<dyn LedgerStore>,
        config: &LedgerConfig,
    ) -> Result<Self> {
        let default_price = Decimal::from_str(&config.default_service_price).map_err(|e| {
            LedgerError::Validation(format!(
                "默认服务价格无效: {} ({})",
                config.default_service_price, e
            ))
        })?;
        if config.trigger_min_tokens < 1 || config.trigger_min_tokens > config.trigger_max_tokens {
            return Err(LedgerError::Validation(format!(
                "触发发放区间无效: [{}, {}]",
                config.trigger_min_tokens, config.trigger_max_tokens
            )));
        }

        Ok(Self {
            ledger,
            store,
            default_price,
            min_tokens: config.trigger_min_tokens,
            max_tokens: config.trigger_max_tokens,
        })
    }

    /// 处理预约事件（不向调用方返回结果）
    pub async fn on_event_completed(&self, event: &AppointmentEvent) {
        match self.handle_completed(event).await {
            Ok(Some(resp)) if resp.success => {
                metrics::record_appointment_trigger(if resp.duplicate {
                    "duplicate"
                } else {
                    "awarded"
                });
            }
            Ok(Some(resp)) => {
                metrics::record_appointment_trigger("rejected");
                warn!(
                    event_id = %event.event_id,
                    error_kind = ?resp.error_kind,
                    message = resp.message.as_deref().unwrap_or_default(),
                    "预约积分发放被拒绝"
                );
            }
            Ok(None) => {
                metrics::record_appointment_trigger("skipped");
            }
            Err(e) => {
                metrics::record_appointment_trigger("error");
                error!(
                    event_id = %event.event_id,
                    error = %e,
                    error_code = e.error_code(),
                    "预约积分发放失败"
                );
            }
        }
    }

    /// 处理预约事件，返回发放结果；无需发放时返回 None
    #[instrument(
        skip_all,
        fields(
            event_id = %event.event_id,
            tenant_id = %event.tenant_id,
            customer_id = %event.customer_id
        )
    )]
    pub async fn handle_completed(
        &self,
        event: &AppointmentEvent,
    ) -> Result<Option<AwardTokensResponse>> {
        if !event.is_completion() {
            debug!(status = ?event.status, "非完成流转，忽略");
            return Ok(None);
        }

        // 事件中的客户必须属于事件租户
        if self.store.customer_tenant(event.customer_id).await? != Some(event.tenant_id) {
            return Err(LedgerError::CustomerTenantMismatch {
                customer_id: event.customer_id,
                tenant_id: event.tenant_id,
            });
        }

        let Some(program) = self
            .ledger
            .catalog()
            .find_token_program(event.tenant_id)
            .await?
            .filter(|p| p.accepts_token_awards())
        else {
            debug!("租户未启用积分方案，跳过");
            return Ok(None);
        };

        let price = match event.service_id {
            Some(service_id) => self
                .store
                .service_price(event.tenant_id, service_id)
                .await?
                .unwrap_or(self.default_price),
            None => self.default_price,
        };
        let base_tokens =
            compute_base_tokens(price, program.earn_ratio, self.min_tokens, self.max_tokens);

        let request = AwardTokensRequest::new(program.id, event.customer_id, base_tokens)
            .with_description("预约完成奖励")
            .with_source(SourceType::Appointment, event.event_id.to_string())
            .idempotent();

        let resp = self
            .ledger
            .award_tokens(&AuthContext::system(event.tenant_id), request)
            .await?;

        info!(
            program_id = program.id,
            price = %price,
            base_tokens,
            tokens_awarded = resp.tokens_awarded,
            success = resp.success,
            "预约完成积分已处理"
        );
        Ok(Some(resp))
    }
}
