//! 会员积分倍率解析
//!
//! 只读：根据客户在方案下的有效会员关系返回积分倍率。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::repository::LedgerStore;

/// 倍率解析接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MultiplierResolver: Send + Sync {
    /// 返回 `today` 当天生效的倍率，无有效会员时为 1
    async fn resolve(&self, customer_id: Uuid, program_id: i64, today: NaiveDate)
    -> Result<Decimal>;
}

/// 基于会员关系的倍率解析
///
/// 多个会员同时有效时取最高倍率；计划倍率非正数视为未配置
pub struct MembershipMultiplierResolver {
    store: Arc<dyn LedgerStore>,
}

impl MembershipMultiplierResolver {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MultiplierResolver for MembershipMultiplierResolver {
    async fn resolve(
        &self,
        customer_id: Uuid,
        program_id: i64,
        today: NaiveDate,
    ) -> Result<Decimal> {
        let plans = self
            .store
            .list_effective_plans(customer_id, program_id, today)
            .await?;

        let multiplier = plans
            .iter()
            .map(|p| p.tokens_multiplier)
            .filter(|m| *m > Decimal::ZERO)
            .max()
            .unwrap_or(Decimal::ONE);

        debug!(
            customer_id = %customer_id,
            program_id,
            plans = plans.len(),
            multiplier = %multiplier,
            "会员倍率已解析"
        );
        Ok(multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MembershipPlan;
    use crate::repository::MockLedgerStore;

    fn plan(id: i64, multiplier: Decimal) -> MembershipPlan {
        MembershipPlan {
            id,
            name: format!("plan-{}", id),
            tokens_multiplier: multiplier,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()
    }

    #[tokio::test]
    async fn test_no_membership_defaults_to_one() {
        let mut store = MockLedgerStore::new();
        store
            .expect_list_effective_plans()
            .returning(|_, _, _| Ok(vec![]));

        let resolver = MembershipMultiplierResolver::new(Arc::new(store));
        let m = resolver.resolve(Uuid::new_v4(), 1, today()).await.unwrap();
        assert_eq!(m, Decimal::ONE);
    }

    #[tokio::test]
    async fn test_highest_multiplier_wins() {
        let mut store = MockLedgerStore::new();
        store.expect_list_effective_plans().returning(|_, _, _| {
            Ok(vec![
                plan(1, Decimal::new(15, 1)),
                plan(2, Decimal::new(2, 0)),
                plan(3, Decimal::new(12, 1)),
            ])
        });

        let resolver = MembershipMultiplierResolver::new(Arc::new(store));
        let m = resolver.resolve(Uuid::new_v4(), 1, today()).await.unwrap();
        assert_eq!(m, Decimal::new(2, 0));
    }

    #[tokio::test]
    async fn test_non_positive_multiplier_ignored() {
        let mut store = MockLedgerStore::new();
        store
            .expect_list_effective_plans()
            .returning(|_, _, _| Ok(vec![plan(1, Decimal::ZERO), plan(2, Decimal::new(-5, 1))]));

        let resolver = MembershipMultiplierResolver::new(Arc::new(store));
        let m = resolver.resolve(Uuid::new_v4(), 1, today()).await.unwrap();
        assert_eq!(m, Decimal::ONE);
    }
}
