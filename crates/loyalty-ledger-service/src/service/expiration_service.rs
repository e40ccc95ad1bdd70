//! 积分过期清扫服务
//!
//! 批处理任务：找出已到期且尚未处理的 earn 流水，按余额分组扣减。
//!
//! 每个余额组在独立事务内处理：锁定余额后重新读取未处理的到期流水，
//! 过期数量取 `min(到期合计, 当前余额)`，已被消耗的部分不会把余额扣成负数。
//! 每条被处理的 earn 流水写入一条过期关联，重复执行不会重复扣减。
//! 单个分组失败（如锁等待超时）只记录日志并跳过，其余分组继续处理。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::dto::TenantExpirationSummary;
use crate::error::Result;
use crate::models::{NewTransaction, SourceType, TransactionType};
use crate::repository::LedgerStore;

/// 单个余额组的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GroupExpiration {
    tenant_id: Uuid,
    transactions: i64,
    tokens: i64,
}

/// 积分过期清扫服务
pub struct ExpirationService {
    store: Arc<dyn LedgerStore>,
    /// 每页处理的余额数
    batch_size: i64,
}

impl ExpirationService {
    pub fn new(store: Arc<dyn LedgerStore>, batch_size: i64) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// 以当前时间执行清扫
    pub async fn expire_tokens(&self) -> Result<Vec<TenantExpirationSummary>> {
        self.expire_tokens_at(Utc::now()).await
    }

    /// 以指定时间执行清扫，返回按租户汇总的结果
    #[instrument(skip(self), fields(batch_size = self.batch_size))]
    pub async fn expire_tokens_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TenantExpirationSummary>> {
        let mut summaries: HashMap<Uuid, TenantExpirationSummary> = HashMap::new();
        let mut cursor = 0_i64;
        let mut failed_groups = 0_u64;

        loop {
            let balance_ids = self
                .store
                .list_expirable_balance_ids(now, cursor, self.batch_size)
                .await?;
            let Some(&last) = balance_ids.last() else {
                break;
            };

            for balance_id in &balance_ids {
                match self.expire_balance(*balance_id, now).await {
                    Ok(Some(group)) => {
                        let entry = summaries
                            .entry(group.tenant_id)
                            .or_insert_with(|| TenantExpirationSummary {
                                tenant_id: group.tenant_id,
                                ..Default::default()
                            });
                        entry.transactions_expired += group.transactions;
                        entry.tokens_expired += group.tokens;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        failed_groups += 1;
                        warn!(
                            balance_id,
                            error = %e,
                            error_code = e.error_code(),
                            "余额过期处理失败，跳过该分组"
                        );
                    }
                }
            }

            cursor = last;
            if (balance_ids.len() as i64) < self.batch_size {
                break;
            }
        }

        let mut result: Vec<TenantExpirationSummary> = summaries.into_values().collect();
        result.sort_by_key(|s| s.tenant_id);

        let tokens: i64 = result.iter().map(|s| s.tokens_expired).sum();
        info!(
            tenants = result.len(),
            tokens_expired = tokens,
            failed_groups,
            "积分过期清扫完成"
        );
        Ok(result)
    }

    /// 处理单个余额下的到期流水
    async fn expire_balance(
        &self,
        balance_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<GroupExpiration>> {
        let mut tx = self.store.begin().await?;

        let Some(mut balance) = tx.lock_balance_by_id(balance_id).await? else {
            tx.rollback().await?;
            return Ok(None);
        };

        // 锁内重新读取，并发清扫已处理的流水不会再次出现
        let earns = tx.list_unmatched_expired_earns(balance_id, now).await?;
        if earns.is_empty() {
            tx.rollback().await?;
            return Ok(None);
        }

        let matured: i64 = earns.iter().map(|t| t.tokens).sum();
        let to_expire = matured.min(balance.current_balance).max(0);

        let expire_transaction_id = if to_expire > 0 {
            balance.debit_expired(to_expire, now)?;
            let transaction = tx
                .append_transaction(&NewTransaction {
                    tenant_id: balance.tenant_id,
                    program_id: balance.program_id,
                    balance_id: balance.id,
                    transaction_type: TransactionType::Expire,
                    tokens: -to_expire,
                    balance_after: balance.current_balance,
                    description: format!("积分过期: {} 笔获取记录", earns.len()),
                    source_type: SourceType::Expiration,
                    source_id: None,
                    expires_at: None,
                    created_at: now,
                })
                .await?;
            tx.update_balance(&balance).await?;
            Some(transaction.id)
        } else {
            None
        };

        for earn in &earns {
            tx.insert_expiry_link(earn.id, expire_transaction_id, now)
                .await?;
        }
        tx.commit().await?;

        debug!(
            balance_id,
            matured,
            to_expire,
            retired = earns.len(),
            "余额过期处理完成"
        );

        Ok(Some(GroupExpiration {
            tenant_id: balance.tenant_id,
            transactions: earns.len() as i64,
            tokens: to_expire,
        }))
    }
}
