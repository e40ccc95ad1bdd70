//! 积分发放服务
//!
//! 负责把基础积分按会员倍率换算后记入客户余额。
//!
//! ## 核心流程
//!
//! 1. 参数校验 -> 2. 方案校验（存在、启用、同租户） -> 3. 客户租户校验
//! 4. 解析会员倍率 -> 5. 开启事务，锁定或创建余额行
//! 6. （可选）来源幂等检查 -> 7. 更新余额并追加 earn 流水 -> 8. 提交事务

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::{info, instrument};

use super::dto::{AwardTokensRequest, AwardTokensResponse};
use super::multiplier::MultiplierResolver;
use crate::catalog::CatalogCache;
use crate::context::AuthContext;
use crate::error::{LedgerError, Result};
use crate::models::{NewTransaction, Program, TransactionType};
use crate::repository::LedgerStore;

/// 基础积分乘以倍率后向下取整
///
/// 结果溢出 i64 时返回 None
pub fn apply_multiplier(base_tokens: i64, multiplier: Decimal) -> Option<i64> {
    Decimal::from(base_tokens)
        .checked_mul(multiplier)?
        .floor()
        .to_i64()
}

/// 积分发放服务
pub struct AwardService {
    store: Arc<dyn LedgerStore>,
    catalog: Arc<CatalogCache>,
    resolver: Arc<dyn MultiplierResolver>,
}

impl AwardService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        catalog: Arc<CatalogCache>,
        resolver: Arc<dyn MultiplierResolver>,
    ) -> Self {
        Self {
            store,
            catalog,
            resolver,
        }
    }

    /// 发放积分
    ///
    /// 业务规则失败以 `Err` 返回，由门面层转换为失败响应
    #[instrument(
        skip(self, ctx, request),
        fields(
            tenant_id = %ctx.tenant_id,
            program_id = request.program_id,
            customer_id = %request.customer_id,
            base_tokens = request.base_tokens
        )
    )]
    pub async fn award(
        &self,
        ctx: &AuthContext,
        request: &AwardTokensRequest,
    ) -> Result<AwardTokensResponse> {
        if request.transaction_type != TransactionType::Earn {
            return Err(LedgerError::Validation(format!(
                "发放只支持 earn 类型，实际为 {}",
                request.transaction_type.as_str()
            )));
        }
        if request.base_tokens <= 0 {
            return Err(LedgerError::Validation(format!(
                "基础积分必须为正数: {}",
                request.base_tokens
            )));
        }
        if request.idempotent && request.source_id.is_none() {
            return Err(LedgerError::Validation(
                "幂等发放必须提供来源 ID".to_string(),
            ));
        }

        let program = self.load_program(ctx, request.program_id).await?;
        self.verify_customer(&program, request).await?;

        let today = Utc::now().date_naive();
        let multiplier = self
            .resolver
            .resolve(request.customer_id, program.id, today)
            .await?;
        let awarded = apply_multiplier(request.base_tokens, multiplier).ok_or_else(|| {
            LedgerError::Validation(format!(
                "积分换算溢出: base={}, multiplier={}",
                request.base_tokens, multiplier
            ))
        })?;
        if awarded <= 0 {
            return Err(LedgerError::Validation(format!(
                "倍率换算后积分为 0: base={}, multiplier={}",
                request.base_tokens, multiplier
            )));
        }

        let mut tx = self.store.begin().await?;
        let mut balance = tx
            .lock_or_create_balance(program.tenant_id, program.id, request.customer_id)
            .await?;

        if request.idempotent {
            if let Some(source_id) = request.source_id.as_deref() {
                if let Some(existing) = tx
                    .find_earn_by_source(balance.id, request.source_type, source_id)
                    .await?
                {
                    tx.rollback().await?;
                    info!(
                        balance_id = balance.id,
                        transaction_id = existing.id,
                        source_id,
                        "来源已发放过积分，跳过"
                    );
                    return Ok(AwardTokensResponse::duplicate(&existing));
                }
            }
        }

        let now = Utc::now();
        balance.credit(awarded, now)?;

        let transaction = tx
            .append_transaction(&NewTransaction {
                tenant_id: program.tenant_id,
                program_id: program.id,
                balance_id: balance.id,
                transaction_type: TransactionType::Earn,
                tokens: awarded,
                balance_after: balance.current_balance,
                description: request.description.clone(),
                source_type: request.source_type,
                source_id: request.source_id.clone(),
                expires_at: program.expires_at(now),
                created_at: now,
            })
            .await?;
        tx.update_balance(&balance).await?;
        tx.commit().await?;

        info!(
            balance_id = balance.id,
            transaction_id = transaction.id,
            awarded,
            multiplier = %multiplier,
            new_balance = balance.current_balance,
            "积分发放成功"
        );

        Ok(AwardTokensResponse::success(&balance, &transaction))
    }

    /// 加载方案并校验启用状态与租户归属
    async fn load_program(&self, ctx: &AuthContext, program_id: i64) -> Result<Program> {
        let program = self
            .catalog
            .get_program(program_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(LedgerError::ProgramNotFound(program_id))?;

        if program.tenant_id != ctx.tenant_id {
            return Err(LedgerError::TenantMismatch {
                resource: format!("program:{}", program_id),
                tenant_id: ctx.tenant_id,
            });
        }
        Ok(program)
    }

    /// 客户必须属于方案所在租户
    async fn verify_customer(&self, program: &Program, request: &AwardTokensRequest) -> Result<()> {
        let customer_tenant = self.store.customer_tenant(request.customer_id).await?;
        if customer_tenant != Some(program.tenant_id) {
            return Err(LedgerError::CustomerTenantMismatch {
                customer_id: request.customer_id,
                tenant_id: program.tenant_id,
            });
        }
        Ok(())
    }
}
