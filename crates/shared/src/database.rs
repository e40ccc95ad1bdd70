//! PostgreSQL 连接池
//!
//! 连接上报 `application_name`，便于在 `pg_stat_activity` / `pg_locks` 中定位
//! 哪个服务持有或等待积分余额行锁。迁移脚本在编译期嵌入。

use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::error::Result;

static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// 数据库连接池
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 以默认应用名建立连接池
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        Self::connect_as(config, "loyalty-ledger").await
    }

    /// 建立连接池，并以 `application_name` 标识连接来源
    #[instrument(skip(config), fields(max_connections = config.max_connections))]
    pub async fn connect_as(config: &DatabaseConfig, application_name: &str) -> Result<Self> {
        let options = PgConnectOptions::from_str(&config.url)?.application_name(application_name);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect_with(options)
            .await?;

        info!(application_name, "数据库连接池已建立");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 执行一次往返查询
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// 应用尚未执行的迁移
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        info!(migrations = MIGRATOR.iter().count(), "数据库迁移完成");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("数据库连接池已关闭");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_embedded() {
        assert!(MIGRATOR.iter().count() >= 1);
    }

    #[tokio::test]
    #[ignore = "需要 PostgreSQL"]
    async fn test_connect_and_migrate() {
        let config = crate::test_utils::test_database_config();
        let db = Database::connect_as(&config, "loyalty-ledger-test").await.unwrap();
        db.health_check().await.unwrap();
        db.run_migrations().await.unwrap();

        let (name,): (String,) = sqlx::query_as("SELECT current_setting('application_name')")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(name, "loyalty-ledger-test");
        db.close().await;
    }
}
