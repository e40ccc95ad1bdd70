//! 账本门面服务
//!
//! 对外暴露的唯一入口。调用方传入访问控制层校验过的 `AuthContext`，
//! 门面负责：
//!
//! - 行锁冲突（`LockTimeout`）按指数退避重试
//! - 业务规则失败转换为 `success = false` 的响应，系统故障以 `Err` 传播
//! - 指标记录与发放统计

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use loyalty_shared::config::LedgerConfig;
use loyalty_shared::observability::metrics;
use loyalty_shared::retry::{RetryPolicy, retry_with_policy};
use tracing::{error, instrument, warn};
use uuid::Uuid;

use super::award_service::AwardService;
use super::dto::{
    AvailableRewardDto, AwardStats, AwardTokensRequest, AwardTokensResponse,
    RedeemRewardResponse, TenantExpirationSummary,
};
use super::expiration_service::ExpirationService;
use super::multiplier::{MembershipMultiplierResolver, MultiplierResolver};
use super::redemption_service::RedemptionService;
use super::stats::RunningAverage;
use crate::catalog::CatalogCache;
use crate::context::AuthContext;
use crate::error::{LedgerError, Result};
use crate::models::{Balance, Program, TokenTransaction};
use crate::repository::LedgerStore;

/// 账本门面服务
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    catalog: Arc<CatalogCache>,
    award: AwardService,
    redemption: RedemptionService,
    expiration: ExpirationService,
    retry_policy: RetryPolicy,
    /// program_id -> 单次发放积分的运行平均
    award_stats: DashMap<i64, RunningAverage>,
}

impl LedgerService {
    /// 使用会员倍率解析器创建服务
    pub fn new(store: Arc<dyn LedgerStore>, config: &LedgerConfig) -> Self {
        let resolver = Arc::new(MembershipMultiplierResolver::new(store.clone()));
        Self::with_resolver(store, resolver, config)
    }

    /// 注入自定义倍率解析器
    pub fn with_resolver(
        store: Arc<dyn LedgerStore>,
        resolver: Arc<dyn MultiplierResolver>,
        config: &LedgerConfig,
    ) -> Self {
        let catalog = Arc::new(CatalogCache::with_ttl(
            store.clone(),
            config.catalog_cache_ttl_seconds,
        ));
        Self {
            award: AwardService::new(store.clone(), catalog.clone(), resolver),
            redemption: RedemptionService::new(store.clone(), config.default_redemption_valid_days),
            expiration: ExpirationService::new(store.clone(), config.sweep_batch_size),
            retry_policy: RetryPolicy::from(config),
            award_stats: DashMap::new(),
            store,
            catalog,
        }
    }

    /// 目录缓存（供目录变更时失效）
    pub fn catalog(&self) -> &Arc<CatalogCache> {
        &self.catalog
    }

    // ==================== 写操作 ====================

    /// 发放积分
    #[instrument(skip_all, fields(actor = %ctx.actor, program_id = request.program_id))]
    pub async fn award_tokens(
        &self,
        ctx: &AuthContext,
        request: AwardTokensRequest,
    ) -> Result<AwardTokensResponse> {
        let start = Instant::now();
        let source = request.source_type.as_str();

        let result = retry_with_policy(
            &self.retry_policy,
            "award_tokens",
            LedgerError::is_retryable,
            || self.award.award(ctx, &request),
        )
        .await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(resp) => {
                if !resp.duplicate {
                    self.award_stats
                        .entry(request.program_id)
                        .or_default()
                        .record(resp.tokens_awarded as f64);
                }
                let status = if resp.duplicate { "duplicate" } else { "success" };
                metrics::record_award(
                    request.program_id,
                    source,
                    status,
                    if resp.duplicate { 0 } else { resp.tokens_awarded.max(0) as u64 },
                    elapsed,
                );
                Ok(resp)
            }
            Err(e) if e.is_business_error() => {
                warn!(error = %e, error_code = e.error_code(), "积分发放被拒绝");
                metrics::record_award(request.program_id, source, e.error_code(), 0, elapsed);
                Ok(AwardTokensResponse::failure(&e))
            }
            Err(e) => {
                error!(error = %e, error_code = e.error_code(), "积分发放失败");
                metrics::record_award(request.program_id, source, "error", 0, elapsed);
                Err(e)
            }
        }
    }

    /// 兑换奖励
    #[instrument(skip_all, fields(actor = %ctx.actor, customer_id = %customer_id, reward_id = reward_id))]
    pub async fn redeem_reward(
        &self,
        ctx: &AuthContext,
        customer_id: Uuid,
        reward_id: i64,
    ) -> Result<RedeemRewardResponse> {
        let start = Instant::now();

        let result = retry_with_policy(
            &self.retry_policy,
            "redeem_reward",
            LedgerError::is_retryable,
            || self.redemption.redeem(ctx, customer_id, reward_id),
        )
        .await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(outcome) => {
                self.catalog.invalidate_reward(reward_id).await;
                metrics::record_redemption(reward_id, "success", elapsed);
                Ok(RedeemRewardResponse::success(&outcome))
            }
            Err(e) if e.is_business_error() => {
                warn!(error = %e, error_code = e.error_code(), "奖励兑换被拒绝");
                metrics::record_redemption(reward_id, e.error_code(), elapsed);
                Ok(RedeemRewardResponse::failure(&e))
            }
            Err(e) => {
                error!(error = %e, error_code = e.error_code(), "奖励兑换失败");
                metrics::record_redemption(reward_id, "error", elapsed);
                Err(e)
            }
        }
    }

    /// 执行积分过期清扫
    pub async fn expire_tokens(&self) -> Result<Vec<TenantExpirationSummary>> {
        self.expire_tokens_at(Utc::now()).await
    }

    /// 以指定时间执行积分过期清扫
    pub async fn expire_tokens_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TenantExpirationSummary>> {
        let summaries = self.expiration.expire_tokens_at(now).await?;
        let tokens: i64 = summaries.iter().map(|s| s.tokens_expired).sum();
        let retired: i64 = summaries.iter().map(|s| s.transactions_expired).sum();
        metrics::record_expiration_sweep(retired.max(0) as u64, tokens.max(0) as u64);
        Ok(summaries)
    }

    // ==================== 读操作 ====================

    /// 查询客户余额，尚未获取过积分时返回 None
    pub async fn get_balance(
        &self,
        ctx: &AuthContext,
        program_id: i64,
        customer_id: Uuid,
    ) -> Result<Option<Balance>> {
        self.check_read_access(ctx, program_id, customer_id).await?;
        self.store.get_balance(program_id, customer_id).await
    }

    /// 查询客户最近的流水，按时间倒序
    pub async fn list_transactions(
        &self,
        ctx: &AuthContext,
        program_id: i64,
        customer_id: Uuid,
        limit: i64,
    ) -> Result<Vec<TokenTransaction>> {
        self.check_read_access(ctx, program_id, customer_id).await?;
        match self.store.get_balance(program_id, customer_id).await? {
            Some(balance) => self.store.list_transactions(balance.id, limit).await,
            None => Ok(Vec::new()),
        }
    }

    /// 客户当前可兑换的奖励（启用、在时间窗口内、有库存）
    pub async fn list_available_rewards(
        &self,
        ctx: &AuthContext,
        program_id: i64,
        customer_id: Uuid,
    ) -> Result<Vec<AvailableRewardDto>> {
        self.check_read_access(ctx, program_id, customer_id).await?;
        let current = self
            .store
            .get_balance(program_id, customer_id)
            .await?
            .map(|b| b.current_balance)
            .unwrap_or(0);

        let now = Utc::now();
        let rewards = self.catalog.list_rewards(program_id).await?;
        Ok(rewards
            .iter()
            .filter(|r| r.is_available(now))
            .map(|r| AvailableRewardDto::from_reward(r, current))
            .collect())
    }

    /// 方案发放统计（进程内）
    pub fn award_stats(&self, program_id: i64) -> AwardStats {
        self.award_stats
            .get(&program_id)
            .map(|avg| AwardStats {
                awards: avg.count(),
                average_tokens: avg.average(),
            })
            .unwrap_or_default()
    }

    /// 读操作同样校验方案与客户的租户归属
    async fn check_read_access(
        &self,
        ctx: &AuthContext,
        program_id: i64,
        customer_id: Uuid,
    ) -> Result<Program> {
        let program = self
            .catalog
            .get_program(program_id)
            .await?
            .ok_or(LedgerError::ProgramNotFound(program_id))?;
        if program.tenant_id != ctx.tenant_id {
            return Err(LedgerError::TenantMismatch {
                resource: format!("program:{}", program_id),
                tenant_id: ctx.tenant_id,
            });
        }
        if self.store.customer_tenant(customer_id).await? != Some(ctx.tenant_id) {
            return Err(LedgerError::CustomerTenantMismatch {
                customer_id,
                tenant_id: ctx.tenant_id,
            });
        }
        Ok(program)
    }
}
