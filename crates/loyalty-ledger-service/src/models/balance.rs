//! 余额与流水实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{SourceType, TransactionType};
use crate::error::{LedgerError, Result};

/// 客户在某方案下的积分余额
///
/// 每个 (program_id, customer_id) 唯一，首次获取积分时惰性创建，永不删除
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Balance {
    pub id: i64,
    pub tenant_id: Uuid,
    pub program_id: i64,
    pub customer_id: Uuid,
    pub current_balance: i64,
    pub total_earned: i64,
    pub total_spent: i64,
    pub total_expired: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    /// 空余额（尚未落库，id 由存储层分配）
    pub fn empty(tenant_id: Uuid, program_id: i64, customer_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            tenant_id,
            program_id,
            customer_id,
            current_balance: 0,
            total_earned: 0,
            total_spent: 0,
            total_expired: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// 余额守恒：当前余额 = 累计获取 - 累计消耗 - 累计过期
    pub fn is_conserved(&self) -> bool {
        self.current_balance == self.total_earned - self.total_spent - self.total_expired
            && self.current_balance >= 0
    }

    /// 入账；任一累计值溢出时返回错误且不修改余额
    pub fn credit(&mut self, tokens: i64, now: DateTime<Utc>) -> Result<()> {
        let current = self.current_balance.checked_add(tokens);
        let earned = self.total_earned.checked_add(tokens);
        let (Some(current), Some(earned)) = (current, earned) else {
            return Err(self.overflow("credit", tokens));
        };
        self.current_balance = current;
        self.total_earned = earned;
        self.updated_at = now;
        Ok(())
    }

    pub fn debit_spent(&mut self, tokens: i64, now: DateTime<Utc>) -> Result<()> {
        let current = self.current_balance.checked_sub(tokens);
        let spent = self.total_spent.checked_add(tokens);
        let (Some(current), Some(spent)) = (current, spent) else {
            return Err(self.overflow("debit_spent", tokens));
        };
        self.current_balance = current;
        self.total_spent = spent;
        self.updated_at = now;
        Ok(())
    }

    pub fn debit_expired(&mut self, tokens: i64, now: DateTime<Utc>) -> Result<()> {
        let current = self.current_balance.checked_sub(tokens);
        let expired = self.total_expired.checked_add(tokens);
        let (Some(current), Some(expired)) = (current, expired) else {
            return Err(self.overflow("debit_expired", tokens));
        };
        self.current_balance = current;
        self.total_expired = expired;
        self.updated_at = now;
        Ok(())
    }

    fn overflow(&self, op: &str, tokens: i64) -> LedgerError {
        LedgerError::Validation(format!(
            "余额计算溢出: op={}, balance_id={}, current={}, tokens={}",
            op, self.id, self.current_balance, tokens
        ))
    }
}

/// 积分流水（只追加，写入后不可变）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TokenTransaction {
    pub id: i64,
    pub tenant_id: Uuid,
    pub program_id: i64,
    pub balance_id: i64,
    pub transaction_type: TransactionType,
    /// 有符号数量：获取为正，兑换/过期为负
    pub tokens: i64,
    /// 写入后余额，与同一锁内的 Balance 一致
    pub balance_after: i64,
    pub description: String,
    pub source_type: SourceType,
    pub source_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 待写入的流水
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub tenant_id: Uuid,
    pub program_id: i64,
    pub balance_id: i64,
    pub transaction_type: TransactionType,
    pub tokens: i64,
    pub balance_after: i64,
    pub description: String,
    pub source_type: SourceType,
    pub source_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 过期关联
///
/// earn 流水出现在这里即视为已被过期清扫处理过；
/// 清扫时余额已耗尽的 earn 记录 expire_transaction_id 为空
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExpiryLink {
    pub earn_transaction_id: i64,
    pub expire_transaction_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}
