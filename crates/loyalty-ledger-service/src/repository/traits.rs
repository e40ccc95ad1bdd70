//! 仓储 Trait 定义
//!
//! 服务层只依赖这里的抽象：`LedgerStore` 负责无锁读取与开启事务，
//! `LedgerTx` 负责事务内加锁读写。PostgreSQL 与内存实现共用同一套接口。

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Balance, MembershipPlan, NewRedemption, NewTransaction, Program, Redemption, Reward,
    SourceType, TokenTransaction,
};

/// 账本存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// 开启一个存储事务，事务对象 drop 时未提交的写入全部回滚
    async fn begin(&self) -> Result<Box<dyn LedgerTx>>;

    // 方案
    async fn get_program(&self, id: i64) -> Result<Option<Program>>;
    /// 租户唯一启用积分的方案
    async fn find_token_program(&self, tenant_id: Uuid) -> Result<Option<Program>>;

    // 奖励
    async fn get_reward(&self, id: i64) -> Result<Option<Reward>>;
    async fn list_rewards(&self, program_id: i64) -> Result<Vec<Reward>>;

    // 协作方目录
    async fn customer_tenant(&self, customer_id: Uuid) -> Result<Option<Uuid>>;
    /// 服务参考价；服务不存在、不属于该租户或未定价时返回 None
    async fn service_price(&self, tenant_id: Uuid, service_id: Uuid) -> Result<Option<Decimal>>;

    // 会员
    /// 在指定日期有效的会员所对应的计划
    async fn list_effective_plans(
        &self,
        customer_id: Uuid,
        program_id: i64,
        today: NaiveDate,
    ) -> Result<Vec<MembershipPlan>>;

    // 余额与流水
    async fn get_balance(&self, program_id: i64, customer_id: Uuid) -> Result<Option<Balance>>;
    /// 按 id 倒序返回最近的 limit 条流水
    async fn list_transactions(&self, balance_id: i64, limit: i64)
    -> Result<Vec<TokenTransaction>>;

    // 过期清扫
    /// 存在未处理且已到期 earn 流水的余额 id，按 id 升序分页
    async fn list_expirable_balance_ids(
        &self,
        now: DateTime<Utc>,
        after_balance_id: i64,
        limit: i64,
    ) -> Result<Vec<i64>>;
}

/// 存储事务接口
///
/// 所有 `lock_*` 方法持有行锁直到提交或回滚；加锁顺序固定为奖励在前、余额在后
#[async_trait]
pub trait LedgerTx: Send {
    // 余额
    /// 锁定余额行，不存在时以零值创建后锁定
    async fn lock_or_create_balance(
        &mut self,
        tenant_id: Uuid,
        program_id: i64,
        customer_id: Uuid,
    ) -> Result<Balance>;
    async fn lock_balance(&mut self, program_id: i64, customer_id: Uuid)
    -> Result<Option<Balance>>;
    async fn lock_balance_by_id(&mut self, balance_id: i64) -> Result<Option<Balance>>;
    async fn update_balance(&mut self, balance: &Balance) -> Result<()>;

    // 流水
    async fn append_transaction(&mut self, transaction: &NewTransaction)
    -> Result<TokenTransaction>;
    async fn find_earn_by_source(
        &mut self,
        balance_id: i64,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<Option<TokenTransaction>>;

    // 奖励与兑换
    async fn lock_reward(&mut self, reward_id: i64) -> Result<Option<Reward>>;
    /// 统计未取消的兑换数；customer_id 为 None 时统计全局
    async fn count_redemptions(&mut self, reward_id: i64, customer_id: Option<Uuid>)
    -> Result<i64>;
    async fn insert_redemption(&mut self, redemption: &NewRedemption) -> Result<Redemption>;
    /// 已用库存 +1，会越过 stock_limit 时返回 StockExhausted
    async fn increment_stock_used(&mut self, reward_id: i64) -> Result<()>;

    // 过期
    /// 余额下已到期且尚无过期关联的 earn 流水
    async fn list_unmatched_expired_earns(
        &mut self,
        balance_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<TokenTransaction>>;
    async fn insert_expiry_link(
        &mut self,
        earn_transaction_id: i64,
        expire_transaction_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}
