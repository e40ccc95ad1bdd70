//! 积分方案

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 积分方案
///
/// 每个租户至多一个启用积分的方案参与事件触发发放
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Program {
    pub id: i64,
    pub tenant_id: Uuid,
    pub name: String,
    pub is_active: bool,
    /// 消费金额到积分的换算比例
    pub earn_ratio: Decimal,
    /// 获取后多少天过期，None 表示永不过期
    pub expiry_days: Option<i32>,
    pub token_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Program {
    /// 本次获取积分的过期时间
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expiry_days
            .filter(|d| *d > 0)
            .map(|d| now + Duration::days(i64::from(d)))
    }

    /// 是否可参与事件触发发放
    pub fn accepts_token_awards(&self) -> bool {
        self.is_active && self.token_enabled
    }
}
