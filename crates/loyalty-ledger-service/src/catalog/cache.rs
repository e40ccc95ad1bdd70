//! 方案与奖励目录缓存
//!
//! 方案和奖励由运营后台维护，读多写少。缓存只服务于无锁读取路径
//! （发放前的方案校验、可兑换奖励列表），兑换时的库存与上限判断始终在行锁内重新读取。
//!
//! ## 缓存刷新策略
//!
//! 按条目记录加载时间，超过 TTL 后下次读取时回源；目录变更时调用方主动失效。
//! 不存在的方案与空奖励列表不缓存，避免新建条目在 TTL 内不可见。
//! 方案下新增奖励时调用 `invalidate_program`。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Program, Reward};
use crate::repository::LedgerStore;

#[derive(Debug, Clone)]
struct CachedEntry<T> {
    value: T,
    loaded_at: Instant,
}

impl<T> CachedEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            loaded_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.loaded_at.elapsed() <= ttl
    }
}

/// 目录缓存
pub struct CatalogCache {
    store: Arc<dyn LedgerStore>,
    programs: RwLock<HashMap<i64, CachedEntry<Program>>>,
    /// 租户 -> 启用积分的方案
    token_programs: RwLock<HashMap<Uuid, CachedEntry<Program>>>,
    /// program_id -> 方案下的奖励列表
    rewards: RwLock<HashMap<i64, CachedEntry<Vec<Reward>>>>,
    cache_ttl: Duration,
}

impl CatalogCache {
    /// 使用默认 TTL（5 分钟）创建缓存
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_ttl(store, 300)
    }

    /// 使用自定义 TTL 创建缓存
    pub fn with_ttl(store: Arc<dyn LedgerStore>, ttl_seconds: u64) -> Self {
        Self {
            store,
            programs: RwLock::new(HashMap::new()),
            token_programs: RwLock::new(HashMap::new()),
            rewards: RwLock::new(HashMap::new()),
            cache_ttl: Duration::from_secs(ttl_seconds),
        }
    }

    /// 获取方案（不过滤停用状态，由调用方判断）
    pub async fn get_program(&self, program_id: i64) -> Result<Option<Program>> {
        if let Some(entry) = self.programs.read().await.get(&program_id) {
            if entry.is_fresh(self.cache_ttl) {
                return Ok(Some(entry.value.clone()));
            }
        }

        let program = self.store.get_program(program_id).await?;
        if let Some(ref p) = program {
            self.programs
                .write()
                .await
                .insert(program_id, CachedEntry::new(p.clone()));
        }
        Ok(program)
    }

    /// 获取租户启用积分的方案
    pub async fn find_token_program(&self, tenant_id: Uuid) -> Result<Option<Program>> {
        if let Some(entry) = self.token_programs.read().await.get(&tenant_id) {
            if entry.is_fresh(self.cache_ttl) {
                return Ok(Some(entry.value.clone()));
            }
        }

        let program = self.store.find_token_program(tenant_id).await?;
        if let Some(ref p) = program {
            self.token_programs
                .write()
                .await
                .insert(tenant_id, CachedEntry::new(p.clone()));
        }
        Ok(program)
    }

    /// 方案下的全部奖励（库存字段可能滞后，仅用于展示）
    pub async fn list_rewards(&self, program_id: i64) -> Result<Vec<Reward>> {
        if let Some(entry) = self.rewards.read().await.get(&program_id) {
            if entry.is_fresh(self.cache_ttl) {
                return Ok(entry.value.clone());
            }
        }

        let rewards = self.store.list_rewards(program_id).await?;
        if !rewards.is_empty() {
            self.rewards
                .write()
                .await
                .insert(program_id, CachedEntry::new(rewards.clone()));
        }
        Ok(rewards)
    }

    /// 方案变更后失效
    pub async fn invalidate_program(&self, program_id: i64) {
        self.programs.write().await.remove(&program_id);
        self.token_programs
            .write()
            .await
            .retain(|_, entry| entry.value.id != program_id);
        self.rewards.write().await.remove(&program_id);
        debug!(program_id, "方案缓存已失效");
    }

    /// 奖励变更（含兑换后库存变化）后失效其所在方案的奖励列表
    pub async fn invalidate_reward(&self, reward_id: i64) {
        self.rewards
            .write()
            .await
            .retain(|_, entry| entry.value.iter().all(|r| r.id != reward_id));
        debug!(reward_id, "奖励缓存已失效");
    }

    /// 清空全部缓存
    pub async fn invalidate_all(&self) {
        self.programs.write().await.clear();
        self.token_programs.write().await.clear();
        self.rewards.write().await.clear();
        debug!("目录缓存已清空");
    }

    /// 缓存条目数（用于监控）
    pub async fn len(&self) -> usize {
        self.programs.read().await.len()
            + self.token_programs.read().await.len()
            + self.rewards.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
