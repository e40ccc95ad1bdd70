//! 内存账本存储
//!
//! 与 PostgreSQL 实现语义一致的嵌入式存储，用于单进程部署和测试：
//!
//! - 行锁：每个余额 `(program_id, customer_id)` 与每个奖励各有一把 `tokio::sync::Mutex`，
//!   事务持有 `OwnedMutexGuard` 直到提交或回滚，等待超过 `lock_timeout` 返回 `LockTimeout`
//! - 写入：事务内写入先暂存，提交时在全局状态锁下一次性应用；事务 drop 即回滚
//! - 读取：事务内读取叠加本事务的暂存写入

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use super::traits::{LedgerStore, LedgerTx};
use crate::error::{LedgerError, Result};
use crate::models::{
    Balance, ExpiryLink, Membership, MembershipPlan, NewRedemption, NewTransaction, Program,
    Redemption, RedemptionStatus, Reward, SourceType, TokenTransaction, TransactionType,
};

type BalanceKey = (i64, Uuid);

/// 已提交状态
#[derive(Default)]
struct MemoryState {
    programs: HashMap<i64, Program>,
    rewards: HashMap<i64, Reward>,
    balances: HashMap<i64, Balance>,
    balance_index: HashMap<BalanceKey, i64>,
    transactions: Vec<TokenTransaction>,
    expiry_links: HashMap<i64, ExpiryLink>,
    redemptions: Vec<Redemption>,
    /// customer_id -> tenant_id
    customers: HashMap<Uuid, Uuid>,
    /// service_id -> (tenant_id, price)
    services: HashMap<Uuid, (Uuid, Option<Decimal>)>,
    plans: HashMap<i64, MembershipPlan>,
    memberships: Vec<Membership>,
}

struct MemoryInner {
    state: Mutex<MemoryState>,
    balance_locks: DashMap<BalanceKey, Arc<AsyncMutex<()>>>,
    reward_locks: DashMap<i64, Arc<AsyncMutex<()>>>,
    next_id: AtomicI64,
    lock_timeout: Duration,
}

impl MemoryInner {
    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

/// 内存账本存储
#[derive(Clone)]
pub struct MemoryLedgerStore {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl MemoryLedgerStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                state: Mutex::new(MemoryState::default()),
                balance_locks: DashMap::new(),
                reward_locks: DashMap::new(),
                next_id: AtomicI64::new(1),
                lock_timeout,
            }),
        }
    }

    // ==================== 目录维护 ====================

    /// 写入或覆盖方案
    pub fn upsert_program(&self, program: Program) {
        self.inner.state.lock().programs.insert(program.id, program);
    }

    /// 写入或覆盖奖励
    pub fn upsert_reward(&self, reward: Reward) {
        self.inner.state.lock().rewards.insert(reward.id, reward);
    }

    /// 登记客户归属租户
    pub fn add_customer(&self, customer_id: Uuid, tenant_id: Uuid) {
        self.inner.state.lock().customers.insert(customer_id, tenant_id);
    }

    /// 登记服务及参考价
    pub fn add_service(&self, service_id: Uuid, tenant_id: Uuid, price: Option<Decimal>) {
        self.inner
            .state
            .lock()
            .services
            .insert(service_id, (tenant_id, price));
    }

    pub fn upsert_plan(&self, plan: MembershipPlan) {
        self.inner.state.lock().plans.insert(plan.id, plan);
    }

    pub fn add_membership(&self, membership: Membership) {
        self.inner.state.lock().memberships.push(membership);
    }

    /// 外部履约系统流转兑换状态
    pub fn set_redemption_status(&self, redemption_id: i64, status: RedemptionStatus) -> bool {
        let mut state = self.inner.state.lock();
        match state.redemptions.iter_mut().find(|r| r.id == redemption_id) {
            Some(r) => {
                r.status = status;
                true
            }
            None => false,
        }
    }

    // ==================== 查询辅助 ====================

    /// 某奖励的全部兑换记录
    pub fn redemptions_for_reward(&self, reward_id: i64) -> Vec<Redemption> {
        self.inner
            .state
            .lock()
            .redemptions
            .iter()
            .filter(|r| r.reward_id == reward_id)
            .cloned()
            .collect()
    }

    /// 当前登记的行锁条目数
    pub fn lock_entry_count(&self) -> usize {
        self.inner.balance_locks.len() + self.inner.reward_locks.len()
    }

    /// 某余额的过期关联数量
    pub fn expiry_link_count(&self, balance_id: i64) -> usize {
        let state = self.inner.state.lock();
        state
            .transactions
            .iter()
            .filter(|t| t.balance_id == balance_id && state.expiry_links.contains_key(&t.id))
            .count()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        Ok(Box::new(MemoryLedgerTx {
            inner: self.inner.clone(),
            guards: Vec::new(),
            held_balances: HashSet::new(),
            held_rewards: HashSet::new(),
            staged: Staged::default(),
        }))
    }

    async fn get_program(&self, id: i64) -> Result<Option<Program>> {
        Ok(self.inner.state.lock().programs.get(&id).cloned())
    }

    async fn find_token_program(&self, tenant_id: Uuid) -> Result<Option<Program>> {
        let state = self.inner.state.lock();
        Ok(state
            .programs
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.accepts_token_awards())
            .min_by_key(|p| p.id)
            .cloned())
    }

    async fn get_reward(&self, id: i64) -> Result<Option<Reward>> {
        Ok(self.inner.state.lock().rewards.get(&id).cloned())
    }

    async fn list_rewards(&self, program_id: i64) -> Result<Vec<Reward>> {
        let state = self.inner.state.lock();
        let mut rewards: Vec<Reward> = state
            .rewards
            .values()
            .filter(|r| r.program_id == program_id)
            .cloned()
            .collect();
        rewards.sort_by_key(|r| (r.tokens_required, r.id));
        Ok(rewards)
    }

    async fn customer_tenant(&self, customer_id: Uuid) -> Result<Option<Uuid>> {
        Ok(self.inner.state.lock().customers.get(&customer_id).copied())
    }

    async fn service_price(&self, tenant_id: Uuid, service_id: Uuid) -> Result<Option<Decimal>> {
        let state = self.inner.state.lock();
        Ok(state
            .services
            .get(&service_id)
            .filter(|(tenant, _)| *tenant == tenant_id)
            .and_then(|(_, price)| *price))
    }

    async fn list_effective_plans(
        &self,
        customer_id: Uuid,
        program_id: i64,
        today: NaiveDate,
    ) -> Result<Vec<MembershipPlan>> {
        let state = self.inner.state.lock();
        Ok(state
            .memberships
            .iter()
            .filter(|m| {
                m.customer_id == customer_id
                    && m.program_id == program_id
                    && m.is_effective_on(today)
            })
            .filter_map(|m| state.plans.get(&m.plan_id).cloned())
            .collect())
    }

    async fn get_balance(&self, program_id: i64, customer_id: Uuid) -> Result<Option<Balance>> {
        let state = self.inner.state.lock();
        Ok(state
            .balance_index
            .get(&(program_id, customer_id))
            .and_then(|id| state.balances.get(id))
            .cloned())
    }

    async fn list_transactions(
        &self,
        balance_id: i64,
        limit: i64,
    ) -> Result<Vec<TokenTransaction>> {
        let state = self.inner.state.lock();
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.balance_id == balance_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_expirable_balance_ids(
        &self,
        now: DateTime<Utc>,
        after_balance_id: i64,
        limit: i64,
    ) -> Result<Vec<i64>> {
        let state = self.inner.state.lock();
        let mut ids: Vec<i64> = state
            .transactions
            .iter()
            .filter(|t| {
                t.balance_id > after_balance_id
                    && is_expired_earn(t, now)
                    && !state.expiry_links.contains_key(&t.id)
            })
            .map(|t| t.balance_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        ids.sort_unstable();
        ids.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(ids)
    }
}

fn is_expired_earn(transaction: &TokenTransaction, now: DateTime<Utc>) -> bool {
    transaction.transaction_type == TransactionType::Earn
        && transaction.expires_at.is_some_and(|at| at <= now)
}

/// 事务内暂存的写入
#[derive(Default)]
struct Staged {
    balances: HashMap<i64, Balance>,
    new_balance_keys: HashMap<BalanceKey, i64>,
    transactions: Vec<TokenTransaction>,
    redemptions: Vec<Redemption>,
    reward_stock_used: HashMap<i64, i64>,
    expiry_links: Vec<ExpiryLink>,
}

/// 内存存储事务
pub struct MemoryLedgerTx {
    inner: Arc<MemoryInner>,
    guards: Vec<OwnedMutexGuard<()>>,
    held_balances: HashSet<BalanceKey>,
    held_rewards: HashSet<i64>,
    staged: Staged,
}

impl MemoryLedgerTx {
    async fn acquire(&mut self, lock: Arc<AsyncMutex<()>>, what: String) -> Result<()> {
        match tokio::time::timeout(self.inner.lock_timeout, lock.lock_owned()).await {
            Ok(guard) => {
                self.guards.push(guard);
                Ok(())
            }
            Err(_) => Err(LedgerError::LockTimeout(format!("等待行锁超时: {}", what))),
        }
    }

    async fn lock_balance_key(&mut self, key: BalanceKey) -> Result<()> {
        if self.held_balances.contains(&key) {
            return Ok(());
        }
        let lock = self
            .inner
            .balance_locks
            .entry(key)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        self.acquire(lock, format!("balance({}, {})", key.0, key.1))
            .await?;
        self.held_balances.insert(key);
        Ok(())
    }

    /// 读取余额，本事务的暂存写入优先
    fn read_balance(&self, key: BalanceKey) -> Option<Balance> {
        if let Some(id) = self.staged.new_balance_keys.get(&key) {
            return self.staged.balances.get(id).cloned();
        }
        let state = self.inner.state.lock();
        let id = *state.balance_index.get(&key)?;
        self.staged
            .balances
            .get(&id)
            .cloned()
            .or_else(|| state.balances.get(&id).cloned())
    }

    fn committed_balance_key(&self, balance_id: i64) -> Option<BalanceKey> {
        if let Some(b) = self.staged.balances.get(&balance_id) {
            return Some((b.program_id, b.customer_id));
        }
        let state = self.inner.state.lock();
        state
            .balances
            .get(&balance_id)
            .map(|b| (b.program_id, b.customer_id))
    }

    fn read_stock_used(&self, reward_id: i64, committed: i64) -> i64 {
        self.staged
            .reward_stock_used
            .get(&reward_id)
            .copied()
            .unwrap_or(committed)
    }
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn lock_or_create_balance(
        &mut self,
        tenant_id: Uuid,
        program_id: i64,
        customer_id: Uuid,
    ) -> Result<Balance> {
        let key = (program_id, customer_id);
        self.lock_balance_key(key).await?;

        if let Some(balance) = self.read_balance(key) {
            return Ok(balance);
        }

        let mut balance = Balance::empty(tenant_id, program_id, customer_id, Utc::now());
        balance.id = self.inner.next_id();
        self.staged.new_balance_keys.insert(key, balance.id);
        self.staged.balances.insert(balance.id, balance.clone());
        Ok(balance)
    }

    async fn lock_balance(
        &mut self,
        program_id: i64,
        customer_id: Uuid,
    ) -> Result<Option<Balance>> {
        let key = (program_id, customer_id);
        self.lock_balance_key(key).await?;
        Ok(self.read_balance(key))
    }

    async fn lock_balance_by_id(&mut self, balance_id: i64) -> Result<Option<Balance>> {
        let Some(key) = self.committed_balance_key(balance_id) else {
            return Ok(None);
        };
        self.lock_balance_key(key).await?;
        Ok(self.read_balance(key))
    }

    async fn update_balance(&mut self, balance: &Balance) -> Result<()> {
        let key = (balance.program_id, balance.customer_id);
        if !self.held_balances.contains(&key) {
            return Err(LedgerError::Internal(format!(
                "更新未加锁的余额: balance_id={}",
                balance.id
            )));
        }
        if balance.current_balance < 0 {
            return Err(LedgerError::Internal(format!(
                "余额不能为负: balance_id={}",
                balance.id
            )));
        }
        self.staged.balances.insert(balance.id, balance.clone());
        Ok(())
    }

    async fn append_transaction(
        &mut self,
        transaction: &NewTransaction,
    ) -> Result<TokenTransaction> {
        let row = TokenTransaction {
            id: self.inner.next_id(),
            tenant_id: transaction.tenant_id,
            program_id: transaction.program_id,
            balance_id: transaction.balance_id,
            transaction_type: transaction.transaction_type,
            tokens: transaction.tokens,
            balance_after: transaction.balance_after,
            description: transaction.description.clone(),
            source_type: transaction.source_type,
            source_id: transaction.source_id.clone(),
            expires_at: transaction.expires_at,
            created_at: transaction.created_at,
        };
        self.staged.transactions.push(row.clone());
        Ok(row)
    }

    async fn find_earn_by_source(
        &mut self,
        balance_id: i64,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<Option<TokenTransaction>> {
        let matches = |t: &&TokenTransaction| {
            t.balance_id == balance_id
                && t.transaction_type == TransactionType::Earn
                && t.source_type == source_type
                && t.source_id.as_deref() == Some(source_id)
        };
        let committed = {
            let state = self.inner.state.lock();
            state.transactions.iter().find(matches).cloned()
        };
        Ok(committed.or_else(|| self.staged.transactions.iter().find(matches).cloned()))
    }

    async fn lock_reward(&mut self, reward_id: i64) -> Result<Option<Reward>> {
        if !self.held_rewards.contains(&reward_id) {
            let lock = self
                .inner
                .reward_locks
                .entry(reward_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone();
            self.acquire(lock, format!("reward({})", reward_id)).await?;
            self.held_rewards.insert(reward_id);
        }

        let reward = self.inner.state.lock().rewards.get(&reward_id).cloned();
        Ok(reward.map(|mut r| {
            r.stock_used = self.read_stock_used(reward_id, r.stock_used);
            r
        }))
    }

    async fn count_redemptions(
        &mut self,
        reward_id: i64,
        customer_id: Option<Uuid>,
    ) -> Result<i64> {
        let counts = |r: &&Redemption| {
            r.reward_id == reward_id
                && r.status != RedemptionStatus::Cancelled
                && customer_id.is_none_or(|c| r.customer_id == c)
        };
        let committed = self.inner.state.lock().redemptions.iter().filter(counts).count();
        let staged = self.staged.redemptions.iter().filter(counts).count();
        Ok((committed + staged) as i64)
    }

    async fn insert_redemption(&mut self, redemption: &NewRedemption) -> Result<Redemption> {
        let row = Redemption {
            id: self.inner.next_id(),
            tenant_id: redemption.tenant_id,
            program_id: redemption.program_id,
            balance_id: redemption.balance_id,
            reward_id: redemption.reward_id,
            customer_id: redemption.customer_id,
            tokens_used: redemption.tokens_used,
            code: redemption.code.clone(),
            valid_until: redemption.valid_until,
            status: RedemptionStatus::Pending,
            created_at: redemption.created_at,
        };
        self.staged.redemptions.push(row.clone());
        Ok(row)
    }

    async fn increment_stock_used(&mut self, reward_id: i64) -> Result<()> {
        let (stock_used, stock_limit) = {
            let state = self.inner.state.lock();
            let reward = state
                .rewards
                .get(&reward_id)
                .ok_or(LedgerError::RewardNotFound(reward_id))?;
            (reward.stock_used, reward.stock_limit)
        };
        let current = self.read_stock_used(reward_id, stock_used);
        if stock_limit.is_some_and(|limit| current >= limit) {
            return Err(LedgerError::StockExhausted(reward_id));
        }
        self.staged.reward_stock_used.insert(reward_id, current + 1);
        Ok(())
    }

    async fn list_unmatched_expired_earns(
        &mut self,
        balance_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<TokenTransaction>> {
        let staged_links: HashSet<i64> = self
            .staged
            .expiry_links
            .iter()
            .map(|l| l.earn_transaction_id)
            .collect();
        let state = self.inner.state.lock();
        Ok(state
            .transactions
            .iter()
            .chain(self.staged.transactions.iter())
            .filter(|t| {
                t.balance_id == balance_id
                    && is_expired_earn(t, now)
                    && !state.expiry_links.contains_key(&t.id)
                    && !staged_links.contains(&t.id)
            })
            .cloned()
            .collect())
    }

    async fn insert_expiry_link(
        &mut self,
        earn_transaction_id: i64,
        expire_transaction_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let duplicated = self.inner.state.lock().expiry_links.contains_key(&earn_transaction_id)
            || self
                .staged
                .expiry_links
                .iter()
                .any(|l| l.earn_transaction_id == earn_transaction_id);
        if duplicated {
            return Err(LedgerError::Internal(format!(
                "过期关联已存在: earn_transaction_id={}",
                earn_transaction_id
            )));
        }
        self.staged.expiry_links.push(ExpiryLink {
            earn_transaction_id,
            expire_transaction_id,
            created_at: now,
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = self;
        let staged = std::mem::take(&mut this.staged);
        {
            let mut state = this.inner.state.lock();
            for (key, id) in staged.new_balance_keys {
                state.balance_index.insert(key, id);
            }
            for (id, balance) in staged.balances {
                state.balances.insert(id, balance);
            }
            state.transactions.extend(staged.transactions);
            state.redemptions.extend(staged.redemptions);
            for (reward_id, stock_used) in staged.reward_stock_used {
                if let Some(reward) = state.rewards.get_mut(&reward_id) {
                    reward.stock_used = stock_used;
                }
            }
            for link in staged.expiry_links {
                state.expiry_links.insert(link.earn_transaction_id, link);
            }
        }
        // 写入可见后才释放行锁
        drop(this);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        debug!(locks = self.guards.len(), "内存账本事务已回滚");
        Ok(())
    }
}

impl Drop for MemoryLedgerTx {
    /// 释放行锁，并清理不再有人持有或等待的锁条目
    fn drop(&mut self) {
        self.guards.clear();
        for key in self.held_balances.drain() {
            self.inner
                .balance_locks
                .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        }
        for reward_id in self.held_rewards.drain() {
            self.inner
                .reward_locks
                .remove_if(&reward_id, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;

    fn store() -> MemoryLedgerStore {
        MemoryLedgerStore::new(Duration::from_millis(50))
    }

    fn earn(tenant: Uuid, balance: &Balance, tokens: i64) -> NewTransaction {
        NewTransaction {
            tenant_id: tenant,
            program_id: balance.program_id,
            balance_id: balance.id,
            transaction_type: TransactionType::Earn,
            tokens,
            balance_after: balance.current_balance + tokens,
            description: String::new(),
            source_type: SourceType::Manual,
            source_id: None,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = store();
        let tenant = Uuid::new_v4();
        let customer = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        let balance = tx.lock_or_create_balance(tenant, 1, customer).await.unwrap();
        tx.append_transaction(&earn(tenant, &balance, 10)).await.unwrap();
        drop(tx);

        assert!(store.get_balance(1, customer).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_applies_writes() {
        let store = store();
        let tenant = Uuid::new_v4();
        let customer = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        let mut balance = tx.lock_or_create_balance(tenant, 1, customer).await.unwrap();
        let row = tx.append_transaction(&earn(tenant, &balance, 10)).await.unwrap();
        balance.credit(10, Utc::now()).unwrap();
        tx.update_balance(&balance).await.unwrap();
        tx.commit().await.unwrap();

        let saved = store.get_balance(1, customer).await.unwrap().unwrap();
        assert_eq!(saved.current_balance, 10);
        let rows = store.list_transactions(saved.id, 10).await.unwrap();
        assert_eq!(rows, vec![row]);
    }

    #[tokio::test]
    async fn test_second_locker_times_out() {
        let store = store();
        let tenant = Uuid::new_v4();
        let customer = Uuid::new_v4();

        let mut first = store.begin().await.unwrap();
        first.lock_or_create_balance(tenant, 1, customer).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let err = second.lock_balance(1, customer).await.unwrap_err();
        assert!(err.is_retryable());

        // 第一个事务结束后锁可再次获取
        first.rollback().await.unwrap();
        let mut third = store.begin().await.unwrap();
        assert!(third.lock_balance(1, customer).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_requires_lock() {
        let store = store();
        let mut tx = store.begin().await.unwrap();
        let balance = Balance::empty(Uuid::new_v4(), 1, Uuid::new_v4(), Utc::now());
        let err = tx.update_balance(&balance).await.unwrap_err();
        assert!(matches!(err, LedgerError::Internal(_)));
    }

    #[tokio::test]
    async fn test_lock_entries_pruned_after_transactions_end() {
        let store = store();
        let tenant = Uuid::new_v4();
        let customer = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.lock_reward(-42).await.unwrap().is_none());
        assert!(tx.lock_balance(1, Uuid::new_v4()).await.unwrap().is_none());
        assert_eq!(store.lock_entry_count(), 2);
        tx.rollback().await.unwrap();
        assert_eq!(store.lock_entry_count(), 0);

        let mut tx = store.begin().await.unwrap();
        tx.lock_or_create_balance(tenant, 1, customer).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.lock_entry_count(), 0);

        // 未显式结束的事务在丢弃时同样清理
        let mut tx = store.begin().await.unwrap();
        tx.lock_balance(1, customer).await.unwrap();
        drop(tx);
        assert_eq!(store.lock_entry_count(), 0);
    }

    #[tokio::test]
    async fn test_waiting_locker_keeps_entry_alive() {
        let store = MemoryLedgerStore::new(Duration::from_secs(2));
        let customer = Uuid::new_v4();

        let mut first = store.begin().await.unwrap();
        first.lock_balance(1, customer).await.unwrap();

        let waiter_store = store.clone();
        let waiter = tokio::spawn(async move {
            let mut second = waiter_store.begin().await.unwrap();
            second.lock_balance(1, customer).await.unwrap();
            second.rollback().await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        first.rollback().await.unwrap();
        waiter.await.unwrap();
        assert_eq!(store.lock_entry_count(), 0);
    }
}
