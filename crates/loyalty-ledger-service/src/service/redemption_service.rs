//! 奖励兑换服务
//!
//! 用积分兑换奖励目录中的奖励，整个兑换在一个存储事务内完成。
//!
//! ## 核心流程
//!
//! 1. 校验客户租户 -> 2. 锁定奖励行（存在、启用、同租户、时间窗口、库存）
//! 3. 统计兑换次数（单客户上限、全局上限） -> 4. 锁定余额行并检查余额
//! 5. 扣减余额 -> 6. 生成兑换码并写入兑换记录 -> 7. 追加 redeem 流水
//! 8. 已用库存 +1 -> 9. 提交事务
//!
//! ## 并发控制策略
//!
//! - 加锁顺序固定为奖励在前、余额在后，避免死锁
//! - 库存与上限在奖励行锁内判断，同一奖励的兑换串行化
//! - 任一步失败整个事务回滚

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{info, instrument};
use uuid::Uuid;

use super::dto::RedemptionOutcome;
use crate::context::AuthContext;
use crate::error::{LedgerError, Result};
use crate::models::{NewRedemption, NewTransaction, Reward, SourceType, TransactionType};
use crate::repository::{LedgerStore, LedgerTx};

/// 兑换码长度
pub const REDEMPTION_CODE_LENGTH: usize = 16;

/// 兑换码字符集：32 个字符，去掉易混淆的 0/O/1/I
const REDEMPTION_CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// 生成兑换码（16 位 × 5 bit = 80 bit 随机量，不做唯一性回查）
pub fn generate_redemption_code() -> String {
    let mut rng = rand::rng();
    (0..REDEMPTION_CODE_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..REDEMPTION_CODE_ALPHABET.len());
            char::from(REDEMPTION_CODE_ALPHABET[idx])
        })
        .collect()
}

/// 奖励兑换服务
pub struct RedemptionService {
    store: Arc<dyn LedgerStore>,
    /// 奖励未配置有效天数时兑换码的默认有效期
    default_valid_days: i32,
}

impl RedemptionService {
    pub fn new(store: Arc<dyn LedgerStore>, default_valid_days: i32) -> Self {
        Self {
            store,
            default_valid_days,
        }
    }

    /// 执行兑换
    #[instrument(
        skip_all,
        fields(tenant_id = %ctx.tenant_id, customer_id = %customer_id, reward_id = reward_id)
    )]
    pub async fn redeem(
        &self,
        ctx: &AuthContext,
        customer_id: Uuid,
        reward_id: i64,
    ) -> Result<RedemptionOutcome> {
        // 1. 客户租户校验，不可跳过
        let customer_tenant = self.store.customer_tenant(customer_id).await?;
        if customer_tenant != Some(ctx.tenant_id) {
            return Err(LedgerError::CustomerTenantMismatch {
                customer_id,
                tenant_id: ctx.tenant_id,
            });
        }

        let mut tx = self.store.begin().await?;

        // 2. 锁定奖励行
        let reward = self.lock_and_check_reward(tx.as_mut(), ctx, reward_id).await?;

        // 3. 兑换上限
        self.check_redemption_limits(tx.as_mut(), &reward, customer_id)
            .await?;

        // 4. 锁定余额行
        let mut balance = tx
            .lock_balance(reward.program_id, customer_id)
            .await?
            .ok_or(LedgerError::BalanceNotFound {
                program_id: reward.program_id,
                customer_id,
            })?;
        if balance.current_balance < reward.tokens_required {
            return Err(LedgerError::insufficient(
                balance.current_balance,
                reward.tokens_required,
            ));
        }

        // 5. 扣减
        let now = Utc::now();
        balance.debit_spent(reward.tokens_required, now)?;
        tx.update_balance(&balance).await?;

        // 6. 兑换记录
        let code = generate_redemption_code();
        let valid_until = reward.valid_until(now, self.default_valid_days);
        let redemption = tx
            .insert_redemption(&NewRedemption {
                tenant_id: ctx.tenant_id,
                program_id: reward.program_id,
                balance_id: balance.id,
                reward_id: reward.id,
                customer_id,
                tokens_used: reward.tokens_required,
                code: code.clone(),
                valid_until,
                created_at: now,
            })
            .await?;

        // 7. 流水
        tx.append_transaction(&NewTransaction {
            tenant_id: ctx.tenant_id,
            program_id: reward.program_id,
            balance_id: balance.id,
            transaction_type: TransactionType::Redeem,
            tokens: -reward.tokens_required,
            balance_after: balance.current_balance,
            description: format!("兑换奖励: {}", reward.name),
            source_type: SourceType::Redemption,
            source_id: Some(redemption.id.to_string()),
            expires_at: None,
            created_at: now,
        })
        .await?;

        // 8. 已用库存，无上限的奖励同样计数
        tx.increment_stock_used(reward.id).await?;

        tx.commit().await?;

        info!(
            redemption_id = redemption.id,
            balance_id = balance.id,
            tokens_used = reward.tokens_required,
            new_balance = balance.current_balance,
            "奖励兑换成功"
        );

        Ok(RedemptionOutcome {
            redemption_id: redemption.id,
            code,
            tokens_used: reward.tokens_required,
            new_balance: balance.current_balance,
            valid_until,
        })
    }

    /// 锁定奖励并校验启用状态、租户、时间窗口与库存
    async fn lock_and_check_reward(
        &self,
        tx: &mut dyn LedgerTx,
        ctx: &AuthContext,
        reward_id: i64,
    ) -> Result<Reward> {
        let reward = tx
            .lock_reward(reward_id)
            .await?
            .filter(|r| r.is_active)
            .ok_or(LedgerError::RewardNotFound(reward_id))?;

        let program = self
            .store
            .get_program(reward.program_id)
            .await?
            .ok_or(LedgerError::RewardNotFound(reward_id))?;
        if program.tenant_id != ctx.tenant_id {
            return Err(LedgerError::TenantMismatch {
                resource: format!("reward:{}", reward_id),
                tenant_id: ctx.tenant_id,
            });
        }
        if !program.is_active {
            return Err(LedgerError::ProgramNotFound(program.id));
        }
        if reward.tokens_required <= 0 {
            return Err(LedgerError::Validation(format!(
                "奖励所需积分必须为正数: reward_id={}, tokens_required={}",
                reward_id, reward.tokens_required
            )));
        }

        if !reward.is_within_time_window(Utc::now()) {
            return Err(LedgerError::Validation(format!(
                "奖励不在可兑换时间内: reward_id={}",
                reward_id
            )));
        }
        if !reward.has_stock() {
            return Err(LedgerError::StockExhausted(reward_id));
        }
        Ok(reward)
    }

    /// 单客户与全局兑换上限（已取消的兑换不计入）
    async fn check_redemption_limits(
        &self,
        tx: &mut dyn LedgerTx,
        reward: &Reward,
        customer_id: Uuid,
    ) -> Result<()> {
        if let Some(limit) = reward.max_per_customer {
            let used = tx.count_redemptions(reward.id, Some(customer_id)).await?;
            if used >= limit {
                return Err(LedgerError::RedemptionLimitReached {
                    reward_id: reward.id,
                    limit_type: "per_customer".to_string(),
                    limit,
                });
            }
        }
        if let Some(limit) = reward.max_total {
            let used = tx.count_redemptions(reward.id, None).await?;
            if used >= limit {
                return Err(LedgerError::RedemptionLimitReached {
                    reward_id: reward.id,
                    limit_type: "total".to_string(),
                    limit,
                });
            }
        }
        Ok(())
    }
}
