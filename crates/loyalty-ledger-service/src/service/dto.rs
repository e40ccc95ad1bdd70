//! 服务层数据传输对象
//!
//! 定义账本对外接口的请求与响应。业务规则失败以 `success = false` 的响应返回，
//! 系统故障通过 `Err` 传播。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorKind, LedgerError};
use crate::models::{Balance, Reward, SourceType, TokenTransaction, TransactionType};

/// 积分发放请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardTokensRequest {
    pub program_id: i64,
    pub customer_id: Uuid,
    /// 倍率前的基础积分
    pub base_tokens: i64,
    #[serde(default = "default_transaction_type")]
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub source_id: Option<String>,
    /// 同一来源只发放一次
    #[serde(default)]
    pub idempotent: bool,
}

fn default_transaction_type() -> TransactionType {
    TransactionType::Earn
}

impl AwardTokensRequest {
    pub fn new(program_id: i64, customer_id: Uuid, base_tokens: i64) -> Self {
        Self {
            program_id,
            customer_id,
            base_tokens,
            transaction_type: TransactionType::Earn,
            description: String::new(),
            source_type: SourceType::Manual,
            source_id: None,
            idempotent: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_source(mut self, source_type: SourceType, source_id: impl Into<String>) -> Self {
        self.source_type = source_type;
        self.source_id = Some(source_id.into());
        self
    }

    /// 以来源作为幂等键
    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }
}

/// 积分发放响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardTokensResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i64>,
    /// 倍率后实际发放数量
    pub tokens_awarded: i64,
    /// 幂等命中时为 true，未产生新流水
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AwardTokensResponse {
    pub fn success(balance: &Balance, transaction: &TokenTransaction) -> Self {
        Self {
            success: true,
            balance_id: Some(balance.id),
            new_balance: Some(balance.current_balance),
            transaction_id: Some(transaction.id),
            tokens_awarded: transaction.tokens,
            duplicate: false,
            error_kind: None,
            message: None,
        }
    }

    /// 幂等命中：返回已有流水
    pub fn duplicate(transaction: &TokenTransaction) -> Self {
        Self {
            success: true,
            balance_id: Some(transaction.balance_id),
            new_balance: Some(transaction.balance_after),
            transaction_id: Some(transaction.id),
            tokens_awarded: transaction.tokens,
            duplicate: true,
            error_kind: None,
            message: Some("来源已发放，返回已有流水".to_string()),
        }
    }

    pub fn failure(err: &LedgerError) -> Self {
        Self {
            success: false,
            balance_id: None,
            new_balance: None,
            transaction_id: None,
            tokens_awarded: 0,
            duplicate: false,
            error_kind: Some(err.kind()),
            message: Some(err.to_string()),
        }
    }
}

/// 奖励兑换响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRewardResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redemption_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redemption_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RedeemRewardResponse {
    pub fn success(outcome: &RedemptionOutcome) -> Self {
        Self {
            success: true,
            redemption_id: Some(outcome.redemption_id),
            redemption_code: Some(outcome.code.clone()),
            tokens_used: Some(outcome.tokens_used),
            new_balance: Some(outcome.new_balance),
            valid_until: Some(outcome.valid_until),
            error_kind: None,
            message: None,
        }
    }

    pub fn failure(err: &LedgerError) -> Self {
        Self {
            success: false,
            redemption_id: None,
            redemption_code: None,
            tokens_used: None,
            new_balance: None,
            valid_until: None,
            error_kind: Some(err.kind()),
            message: Some(err.to_string()),
        }
    }
}

/// 兑换处理器的内部结果
#[derive(Debug, Clone)]
pub struct RedemptionOutcome {
    pub redemption_id: i64,
    pub code: String,
    pub tokens_used: i64,
    pub new_balance: i64,
    pub valid_until: DateTime<Utc>,
}

/// 单个租户的过期汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantExpirationSummary {
    pub tenant_id: Uuid,
    /// 本次处理的 earn 流水条数
    pub transactions_expired: i64,
    pub tokens_expired: i64,
}

/// 客户可兑换奖励 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableRewardDto {
    pub reward_id: i64,
    pub name: String,
    pub tokens_required: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_stock: Option<i64>,
    /// 当前余额是否足够
    pub affordable: bool,
}

impl AvailableRewardDto {
    pub fn from_reward(reward: &Reward, current_balance: i64) -> Self {
        Self {
            reward_id: reward.id,
            name: reward.name.clone(),
            tokens_required: reward.tokens_required,
            remaining_stock: reward.remaining_stock(),
            affordable: current_balance >= reward.tokens_required,
        }
    }
}

/// 方案发放统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardStats {
    pub awards: u64,
    /// 单次发放的平均积分
    pub average_tokens: f64,
}
