//! 奖励目录与兑换记录

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::RedemptionStatus;

/// 奖励
///
/// 通过方案归属租户；库存与兑换上限在兑换时于行锁内校验
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reward {
    pub id: i64,
    pub program_id: i64,
    pub name: String,
    pub tokens_required: i64,
    /// 总库存（None 表示不限量）
    pub stock_limit: Option<i64>,
    /// 已兑换数量，只增不减且不超过 stock_limit
    pub stock_used: i64,
    /// 单客户兑换上限
    pub max_per_customer: Option<i64>,
    /// 全局兑换上限
    pub max_total: Option<i64>,
    /// 兑换码有效天数（None 使用默认值）
    pub valid_days: Option<i32>,
    pub available_from: Option<DateTime<Utc>>,
    pub available_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reward {
    /// 检查奖励是否在可兑换时间窗口内
    pub fn is_within_time_window(&self, now: DateTime<Utc>) -> bool {
        let after_start = self.available_from.is_none_or(|t| now >= t);
        let before_end = self.available_until.is_none_or(|t| now <= t);
        after_start && before_end
    }

    /// 检查是否有库存
    pub fn has_stock(&self) -> bool {
        match self.stock_limit {
            Some(limit) => self.stock_used < limit,
            None => true, // 不限量
        }
    }

    /// 获取剩余库存数量
    pub fn remaining_stock(&self) -> Option<i64> {
        self.stock_limit.map(|limit| (limit - self.stock_used).max(0))
    }

    /// 兑换码有效期截止时间
    pub fn valid_until(&self, now: DateTime<Utc>, default_days: i32) -> DateTime<Utc> {
        let days = self.valid_days.filter(|d| *d > 0).unwrap_or(default_days);
        now + Duration::days(i64::from(days))
    }

    /// 当前是否对客户可见（启用、在窗口内、有库存）
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.is_within_time_window(now) && self.has_stock()
    }
}

/// 兑换记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Redemption {
    pub id: i64,
    pub tenant_id: Uuid,
    pub program_id: i64,
    pub balance_id: i64,
    pub reward_id: i64,
    pub customer_id: Uuid,
    pub tokens_used: i64,
    /// 兑换码
    pub code: String,
    pub valid_until: DateTime<Utc>,
    pub status: RedemptionStatus,
    pub created_at: DateTime<Utc>,
}

/// 待写入的兑换记录
#[derive(Debug, Clone)]
pub struct NewRedemption {
    pub tenant_id: Uuid,
    pub program_id: i64,
    pub balance_id: i64,
    pub reward_id: i64,
    pub customer_id: Uuid,
    pub tokens_used: i64,
    pub code: String,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reward() -> Reward {
        let now = Utc::now();
        Reward {
            id: 1,
            program_id: 1,
            name: "免费护理".to_string(),
            tokens_required: 50,
            stock_limit: Some(5),
            stock_used: 4,
            max_per_customer: None,
            max_total: None,
            valid_days: None,
            available_from: None,
            available_until: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_stock() {
        let mut r = reward();
        assert!(r.has_stock());
        assert_eq!(r.remaining_stock(), Some(1));
        r.stock_used = 5;
        assert!(!r.has_stock());
        assert_eq!(r.remaining_stock(), Some(0));
        r.stock_limit = None;
        assert!(r.has_stock());
        assert_eq!(r.remaining_stock(), None);
    }

    #[test]
    fn test_time_window() {
        let now = Utc::now();
        let mut r = reward();
        assert!(r.is_within_time_window(now));
        r.available_from = Some(now + Duration::hours(1));
        assert!(!r.is_within_time_window(now));
        r.available_from = Some(now - Duration::hours(2));
        r.available_until = Some(now - Duration::hours(1));
        assert!(!r.is_within_time_window(now));
    }

    #[test]
    fn test_valid_until_uses_default() {
        let now = Utc::now();
        let mut r = reward();
        assert_eq!(r.valid_until(now, 30), now + Duration::days(30));
        r.valid_days = Some(7);
        assert_eq!(r.valid_until(now, 30), now + Duration::days(7));
    }
}
