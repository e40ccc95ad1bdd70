//! 积分账本错误类型
//!
//! 定义服务层的业务错误和系统错误，并映射到对外的错误分类

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// 对外错误分类
///
/// 调用方只依赖该分类做分支处理，具体变体与文案可以演进
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    InsufficientBalance,
    StockExhausted,
    RedemptionLimitReached,
    ValidationError,
    Internal,
}

/// 积分账本错误类型
#[derive(Debug, Error)]
pub enum LedgerError {
    // === 目录相关错误 ===
    #[error("积分方案不存在或未启用: {0}")]
    ProgramNotFound(i64),

    #[error("奖励不存在或未启用: {0}")]
    RewardNotFound(i64),

    #[error("余额账户不存在: program_id={program_id}, customer_id={customer_id}")]
    BalanceNotFound { program_id: i64, customer_id: Uuid },

    // === 权限相关错误 ===
    #[error("客户不属于当前租户: customer_id={customer_id}, tenant_id={tenant_id}")]
    CustomerTenantMismatch { customer_id: Uuid, tenant_id: Uuid },

    #[error("资源不属于当前租户: {resource}, tenant_id={tenant_id}")]
    TenantMismatch { resource: String, tenant_id: Uuid },

    // === 兑换相关错误 ===
    #[error("积分余额不足: 当前 {available}, 需要 {required}, 差额 {deficit}")]
    InsufficientBalance {
        available: i64,
        required: i64,
        deficit: i64,
    },

    #[error("奖励库存已耗尽: reward_id={0}")]
    StockExhausted(i64),

    #[error("已达到兑换上限: reward_id={reward_id}, 限制类型={limit_type}, limit={limit}")]
    RedemptionLimitReached {
        reward_id: i64,
        limit_type: String,
        limit: i64,
    },

    // === 系统错误 ===
    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("数据库错误: {0}")]
    Database(sqlx::Error),

    #[error("行锁等待超时或死锁，请重试: {0}")]
    LockTimeout(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 积分账本 Result 类型别名
pub type Result<T> = std::result::Result<T, LedgerError>;

/// 锁等待超时、死锁、语句取消
const RETRYABLE_PG_CODES: [&str; 3] = ["55P03", "40P01", "57014"];

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if let Some(code) = db_err.code() {
                let code: &str = &code;
                if RETRYABLE_PG_CODES.iter().any(|c| *c == code) {
                    return Self::LockTimeout(db_err.message().to_string());
                }
            }
        }
        Self::Database(err)
    }
}

impl LedgerError {
    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout(_))
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::Database(_) | Self::LockTimeout(_) | Self::Internal(_)
        )
    }

    /// 对外错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProgramNotFound(_) | Self::RewardNotFound(_) | Self::BalanceNotFound { .. } => {
                ErrorKind::NotFound
            }
            Self::CustomerTenantMismatch { .. } | Self::TenantMismatch { .. } => {
                ErrorKind::AccessDenied
            }
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::StockExhausted(_) => ErrorKind::StockExhausted,
            Self::RedemptionLimitReached { .. } => ErrorKind::RedemptionLimitReached,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Database(_) | Self::LockTimeout(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// 获取错误码（用于日志与响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ProgramNotFound(_) => "PROGRAM_NOT_FOUND",
            Self::RewardNotFound(_) => "REWARD_NOT_FOUND",
            Self::BalanceNotFound { .. } => "BALANCE_NOT_FOUND",
            Self::CustomerTenantMismatch { .. } => "CUSTOMER_TENANT_MISMATCH",
            Self::TenantMismatch { .. } => "TENANT_MISMATCH",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::StockExhausted(_) => "STOCK_EXHAUSTED",
            Self::RedemptionLimitReached { .. } => "REDEMPTION_LIMIT_REACHED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::LockTimeout(_) => "LOCK_TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 构造余额不足错误，差额自动计算
    pub fn insufficient(available: i64, required: i64) -> Self {
        Self::InsufficientBalance {
            available,
            required,
            deficit: required - available,
        }
    }
}
