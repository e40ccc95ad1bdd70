//! 统一错误处理模块
//!
//! 定义基础设施层共享的错误类型，使用 thiserror 提供良好的错误信息。
//! 业务错误由各服务自行定义。

use thiserror::Error;

/// 基础设施错误类型
#[derive(Debug, Error)]
pub enum SharedError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库迁移失败: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, SharedError>;

impl SharedError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::Migration(_) => "MIGRATION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = SharedError::Internal("boom".to_string());
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_is_retryable() {
        let db_err = SharedError::Database(sqlx::Error::PoolTimedOut);
        assert!(db_err.is_retryable());

        let row_not_found = SharedError::Database(sqlx::Error::RowNotFound);
        assert!(!row_not_found.is_retryable());
    }
}
