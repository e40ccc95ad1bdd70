//! 集成测试公共夹具
//!
//! 基于内存存储搭建一个租户：一个积分方案、若干客户与奖励。

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fake::Fake;
use fake::faker::lorem::en::Word;
use loyalty_ledger::{
    AuthContext, AwardTokensRequest, LedgerService, LedgerStore, MemoryLedgerStore, Program,
    Reward,
};
use loyalty_shared::config::LedgerConfig;
use loyalty_shared::test_utils::{test_customer_id, test_entity_id, test_ledger_config, test_tenant_id};
use rust_decimal::Decimal;
use uuid::Uuid;

pub struct TestEnv {
    pub store: MemoryLedgerStore,
    pub ledger: Arc<LedgerService>,
    pub config: LedgerConfig,
    pub tenant_id: Uuid,
    pub program_id: i64,
    pub customer_id: Uuid,
}

impl TestEnv {
    /// 积分 30 天过期的方案
    pub fn new() -> Self {
        Self::with_expiry(Some(30))
    }

    pub fn with_expiry(expiry_days: Option<i32>) -> Self {
        let config = test_ledger_config();
        let store = MemoryLedgerStore::new(Duration::from_millis(config.lock_timeout_ms));
        let tenant_id = test_tenant_id();
        let customer_id = test_customer_id();
        let program_id = test_entity_id();

        store.upsert_program(program(program_id, tenant_id, expiry_days));
        store.add_customer(customer_id, tenant_id);

        let shared: Arc<dyn LedgerStore> = Arc::new(store.clone());
        let ledger = Arc::new(LedgerService::new(shared, &config));

        Self {
            store,
            ledger,
            config,
            tenant_id,
            program_id,
            customer_id,
        }
    }

    pub fn ctx(&self) -> AuthContext {
        AuthContext::new(self.tenant_id, "front-desk")
    }

    pub fn shared_store(&self) -> Arc<dyn LedgerStore> {
        Arc::new(self.store.clone())
    }

    /// 同租户新客户
    pub fn new_customer(&self) -> Uuid {
        let customer = test_customer_id();
        self.store.add_customer(customer, self.tenant_id);
        customer
    }

    /// 新增奖励，返回奖励 ID
    pub fn add_reward(&self, tokens_required: i64, customize: impl FnOnce(&mut Reward)) -> i64 {
        let now = Utc::now();
        let mut reward = Reward {
            id: test_entity_id(),
            program_id: self.program_id,
            name: Word().fake(),
            tokens_required,
            stock_limit: None,
            stock_used: 0,
            max_per_customer: None,
            max_total: None,
            valid_days: None,
            available_from: None,
            available_until: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        customize(&mut reward);
        let id = reward.id;
        self.store.upsert_reward(reward);
        id
    }

    /// 直接发放积分（倍率 1），断言成功
    pub async fn award(&self, customer_id: Uuid, tokens: i64) -> i64 {
        let resp = self
            .ledger
            .award_tokens(
                &self.ctx(),
                AwardTokensRequest::new(self.program_id, customer_id, tokens),
            )
            .await
            .expect("发放不应返回系统错误");
        assert!(resp.success, "发放失败: {:?}", resp.message);
        resp.new_balance.expect("成功响应应包含余额")
    }

    pub async fn balance_of(&self, customer_id: Uuid) -> i64 {
        self.store
            .get_balance(self.program_id, customer_id)
            .await
            .unwrap()
            .map(|b| b.current_balance)
            .unwrap_or(0)
    }
}

pub fn program(id: i64, tenant_id: Uuid, expiry_days: Option<i32>) -> Program {
    let now = Utc::now();
    Program {
        id,
        tenant_id,
        name: Word().fake(),
        is_active: true,
        earn_ratio: Decimal::new(1, 1),
        expiry_days,
        token_enabled: true,
        created_at: now,
        updated_at: now,
    }
}
