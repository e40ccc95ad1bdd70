//! PostgreSQL 账本存储
//!
//! 事务内使用 `SELECT ... FOR UPDATE` 行锁，并通过 `SET LOCAL` 语义设置锁等待与语句超时，
//! 超时错误由 `LedgerError::from` 映射为可重试的 `LockTimeout`。

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::traits::{LedgerStore, LedgerTx};
use crate::error::{LedgerError, Result};
use crate::models::{
    Balance, MembershipPlan, NewRedemption, NewTransaction, Program, Redemption, Reward,
    SourceType, TokenTransaction, TransactionType,
};

const PROGRAM_COLUMNS: &str = "id, tenant_id, name, is_active, earn_ratio, expiry_days, \
     token_enabled, created_at, updated_at";

const BALANCE_COLUMNS: &str = "id, tenant_id, program_id, customer_id, current_balance, \
     total_earned, total_spent, total_expired, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, tenant_id, program_id, balance_id, transaction_type, \
     tokens, balance_after, description, source_type, source_id, expires_at, created_at";

const REWARD_COLUMNS: &str = "id, program_id, name, tokens_required, stock_limit, stock_used, \
     max_per_customer, max_total, valid_days, available_from, available_until, is_active, \
     created_at, updated_at";

const REDEMPTION_COLUMNS: &str = "id, tenant_id, program_id, balance_id, reward_id, customer_id, \
     tokens_used, code, valid_until, status, created_at";

/// PostgreSQL 账本存储
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    lock_timeout: Duration,
    statement_timeout: Duration,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool, lock_timeout: Duration, statement_timeout: Duration) -> Self {
        Self {
            pool,
            lock_timeout,
            statement_timeout,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        let mut tx = self.pool.begin().await?;

        // set_config(..., true) 等价于 SET LOCAL，事务结束即失效
        sqlx::query(
            "SELECT set_config('lock_timeout', $1, true), set_config('statement_timeout', $2, true)",
        )
        .bind(format!("{}ms", self.lock_timeout.as_millis()))
        .bind(format!("{}ms", self.statement_timeout.as_millis()))
        .execute(&mut *tx)
        .await?;

        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn get_program(&self, id: i64) -> Result<Option<Program>> {
        let sql = format!("SELECT {PROGRAM_COLUMNS} FROM loyalty_programs WHERE id = $1");
        let program = sqlx::query_as::<_, Program>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(program)
    }

    async fn find_token_program(&self, tenant_id: Uuid) -> Result<Option<Program>> {
        let sql = format!(
            "SELECT {PROGRAM_COLUMNS} FROM loyalty_programs \
             WHERE tenant_id = $1 AND is_active AND token_enabled \
             ORDER BY id LIMIT 1"
        );
        let program = sqlx::query_as::<_, Program>(&sql)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(program)
    }

    async fn get_reward(&self, id: i64) -> Result<Option<Reward>> {
        let sql = format!("SELECT {REWARD_COLUMNS} FROM loyalty_rewards WHERE id = $1");
        let reward = sqlx::query_as::<_, Reward>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(reward)
    }

    async fn list_rewards(&self, program_id: i64) -> Result<Vec<Reward>> {
        let sql = format!(
            "SELECT {REWARD_COLUMNS} FROM loyalty_rewards WHERE program_id = $1 ORDER BY tokens_required, id"
        );
        let rewards = sqlx::query_as::<_, Reward>(&sql)
            .bind(program_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rewards)
    }

    async fn customer_tenant(&self, customer_id: Uuid) -> Result<Option<Uuid>> {
        let tenant: Option<(Uuid,)> = sqlx::query_as("SELECT tenant_id FROM customers WHERE id = $1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant.map(|(t,)| t))
    }

    async fn service_price(&self, tenant_id: Uuid, service_id: Uuid) -> Result<Option<Decimal>> {
        let price: Option<(Option<Decimal>,)> =
            sqlx::query_as("SELECT price FROM services WHERE id = $1 AND tenant_id = $2")
                .bind(service_id)
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(price.and_then(|(p,)| p))
    }

    async fn list_effective_plans(
        &self,
        customer_id: Uuid,
        program_id: i64,
        today: NaiveDate,
    ) -> Result<Vec<MembershipPlan>> {
        let plans = sqlx::query_as::<_, MembershipPlan>(
            r#"
            SELECT p.id, p.name, p.tokens_multiplier
            FROM customer_memberships m
            JOIN membership_plans p ON p.id = m.plan_id
            WHERE m.customer_id = $1
              AND m.program_id = $2
              AND m.status = 'active'
              AND (m.end_date IS NULL OR m.end_date >= $3)
            "#,
        )
        .bind(customer_id)
        .bind(program_id)
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        Ok(plans)
    }

    async fn get_balance(&self, program_id: i64, customer_id: Uuid) -> Result<Option<Balance>> {
        let sql = format!(
            "SELECT {BALANCE_COLUMNS} FROM loyalty_balances WHERE program_id = $1 AND customer_id = $2"
        );
        let balance = sqlx::query_as::<_, Balance>(&sql)
            .bind(program_id)
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(balance)
    }

    async fn list_transactions(
        &self,
        balance_id: i64,
        limit: i64,
    ) -> Result<Vec<TokenTransaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM loyalty_transactions \
             WHERE balance_id = $1 ORDER BY id DESC LIMIT $2"
        );
        let transactions = sqlx::query_as::<_, TokenTransaction>(&sql)
            .bind(balance_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(transactions)
    }

    async fn list_expirable_balance_ids(
        &self,
        now: DateTime<Utc>,
        after_balance_id: i64,
        limit: i64,
    ) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT t.balance_id
            FROM loyalty_transactions t
            WHERE t.transaction_type = 'earn'
              AND t.expires_at IS NOT NULL
              AND t.expires_at <= $1
              AND t.balance_id > $2
              AND NOT EXISTS (
                  SELECT 1 FROM loyalty_expiry_links l WHERE l.earn_transaction_id = t.id
              )
            ORDER BY t.balance_id
            LIMIT $3
            "#,
        )
        .bind(now)
        .bind(after_balance_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

/// PostgreSQL 存储事务
///
/// `sqlx::Transaction` drop 时自动回滚
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_or_create_balance(
        &mut self,
        tenant_id: Uuid,
        program_id: i64,
        customer_id: Uuid,
    ) -> Result<Balance> {
        // 并发首次创建由唯一约束兜底，冲突方直接进入加锁读取
        sqlx::query(
            r#"
            INSERT INTO loyalty_balances (tenant_id, program_id, customer_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (program_id, customer_id) DO NOTHING
            "#,
        )
        .bind(tenant_id)
        .bind(program_id)
        .bind(customer_id)
        .execute(&mut *self.tx)
        .await?;

        self.lock_balance(program_id, customer_id)
            .await?
            .ok_or_else(|| LedgerError::Internal("余额行创建后不可见".to_string()))
    }

    async fn lock_balance(
        &mut self,
        program_id: i64,
        customer_id: Uuid,
    ) -> Result<Option<Balance>> {
        let sql = format!(
            "SELECT {BALANCE_COLUMNS} FROM loyalty_balances \
             WHERE program_id = $1 AND customer_id = $2 FOR UPDATE"
        );
        let balance = sqlx::query_as::<_, Balance>(&sql)
            .bind(program_id)
            .bind(customer_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(balance)
    }

    async fn lock_balance_by_id(&mut self, balance_id: i64) -> Result<Option<Balance>> {
        let sql = format!("SELECT {BALANCE_COLUMNS} FROM loyalty_balances WHERE id = $1 FOR UPDATE");
        let balance = sqlx::query_as::<_, Balance>(&sql)
            .bind(balance_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(balance)
    }

    async fn update_balance(&mut self, balance: &Balance) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE loyalty_balances
            SET current_balance = $2,
                total_earned = $3,
                total_spent = $4,
                total_expired = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(balance.id)
        .bind(balance.current_balance)
        .bind(balance.total_earned)
        .bind(balance.total_spent)
        .bind(balance.total_expired)
        .bind(balance.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn append_transaction(
        &mut self,
        transaction: &NewTransaction,
    ) -> Result<TokenTransaction> {
        let sql = format!(
            "INSERT INTO loyalty_transactions \
             (tenant_id, program_id, balance_id, transaction_type, tokens, balance_after, \
              description, source_type, source_id, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {TRANSACTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TokenTransaction>(&sql)
            .bind(transaction.tenant_id)
            .bind(transaction.program_id)
            .bind(transaction.balance_id)
            .bind(transaction.transaction_type)
            .bind(transaction.tokens)
            .bind(transaction.balance_after)
            .bind(&transaction.description)
            .bind(transaction.source_type)
            .bind(&transaction.source_id)
            .bind(transaction.expires_at)
            .bind(transaction.created_at)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn find_earn_by_source(
        &mut self,
        balance_id: i64,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<Option<TokenTransaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM loyalty_transactions \
             WHERE balance_id = $1 AND transaction_type = $2 AND source_type = $3 AND source_id = $4 \
             ORDER BY id LIMIT 1"
        );
        let row = sqlx::query_as::<_, TokenTransaction>(&sql)
            .bind(balance_id)
            .bind(TransactionType::Earn)
            .bind(source_type)
            .bind(source_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn lock_reward(&mut self, reward_id: i64) -> Result<Option<Reward>> {
        let sql = format!("SELECT {REWARD_COLUMNS} FROM loyalty_rewards WHERE id = $1 FOR UPDATE");
        let reward = sqlx::query_as::<_, Reward>(&sql)
            .bind(reward_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(reward)
    }

    async fn count_redemptions(
        &mut self,
        reward_id: i64,
        customer_id: Option<Uuid>,
    ) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM loyalty_redemptions
            WHERE reward_id = $1
              AND status <> 'cancelled'
              AND ($2::uuid IS NULL OR customer_id = $2)
            "#,
        )
        .bind(reward_id)
        .bind(customer_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn insert_redemption(&mut self, redemption: &NewRedemption) -> Result<Redemption> {
        let sql = format!(
            "INSERT INTO loyalty_redemptions \
             (tenant_id, program_id, balance_id, reward_id, customer_id, tokens_used, code, \
              valid_until, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9) \
             RETURNING {REDEMPTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Redemption>(&sql)
            .bind(redemption.tenant_id)
            .bind(redemption.program_id)
            .bind(redemption.balance_id)
            .bind(redemption.reward_id)
            .bind(redemption.customer_id)
            .bind(redemption.tokens_used)
            .bind(&redemption.code)
            .bind(redemption.valid_until)
            .bind(redemption.created_at)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn increment_stock_used(&mut self, reward_id: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE loyalty_rewards
            SET stock_used = stock_used + 1, updated_at = NOW()
            WHERE id = $1 AND (stock_limit IS NULL OR stock_used < stock_limit)
            "#,
        )
        .bind(reward_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::StockExhausted(reward_id));
        }
        Ok(())
    }

    async fn list_unmatched_expired_earns(
        &mut self,
        balance_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<TokenTransaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM loyalty_transactions t \
             WHERE t.balance_id = $1 \
               AND t.transaction_type = 'earn' \
               AND t.expires_at IS NOT NULL \
               AND t.expires_at <= $2 \
               AND NOT EXISTS ( \
                   SELECT 1 FROM loyalty_expiry_links l WHERE l.earn_transaction_id = t.id \
               ) \
             ORDER BY t.id"
        );
        let rows = sqlx::query_as::<_, TokenTransaction>(&sql)
            .bind(balance_id)
            .bind(now)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows)
    }

    async fn insert_expiry_link(
        &mut self,
        earn_transaction_id: i64,
        expire_transaction_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO loyalty_expiry_links (earn_transaction_id, expire_transaction_id, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(earn_transaction_id)
        .bind(expire_transaction_id)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        debug!("账本事务已回滚");
        Ok(())
    }
}
