//! 会员计划与会员关系

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::MembershipStatus;

/// 会员计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MembershipPlan {
    pub id: i64,
    pub name: String,
    /// 积分倍率，非正数视为无效
    pub tokens_multiplier: Decimal,
}

/// 客户会员关系
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Membership {
    pub id: i64,
    pub customer_id: Uuid,
    pub program_id: i64,
    pub plan_id: i64,
    pub status: MembershipStatus,
    /// 截止日期（含当天），None 表示长期有效
    pub end_date: Option<NaiveDate>,
}

impl Membership {
    /// 在指定日期是否有效
    pub fn is_effective_on(&self, today: NaiveDate) -> bool {
        self.status == MembershipStatus::Active && self.end_date.is_none_or(|end| end >= today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_effective_on() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        let mut m = Membership {
            id: 1,
            customer_id: Uuid::new_v4(),
            program_id: 1,
            plan_id: 1,
            status: MembershipStatus::Active,
            end_date: None,
        };
        assert!(m.is_effective_on(today));

        m.end_date = Some(today);
        assert!(m.is_effective_on(today));

        m.end_date = NaiveDate::from_ymd_opt(2026, 3, 14);
        assert!(!m.is_effective_on(today));

        m.end_date = None;
        m.status = MembershipStatus::Paused;
        assert!(!m.is_effective_on(today));
    }
}
