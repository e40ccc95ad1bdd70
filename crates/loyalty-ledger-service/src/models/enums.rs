//! 积分账本枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 流水类型
///
/// 每一次余额变动都对应一种类型，数量符号由类型决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum TransactionType {
    /// 获取（+）
    Earn,
    /// 兑换消耗（-）
    Redeem,
    /// 过期（-）
    Expire,
}

impl TransactionType {
    /// 返回该流水类型的数量符号
    pub fn sign(&self) -> i64 {
        match self {
            Self::Earn => 1,
            Self::Redeem | Self::Expire => -1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earn => "earn",
            Self::Redeem => "redeem",
            Self::Expire => "expire",
        }
    }
}

/// 来源类型
///
/// 标识积分变动的触发来源，用于追溯和幂等判断
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum SourceType {
    /// 预约完成事件
    Appointment,
    /// 手动发放
    #[default]
    Manual,
    /// 兑换流程产生
    Redemption,
    /// 过期清扫产生
    Expiration,
    /// 其他系统任务
    System,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Appointment => "appointment",
            Self::Manual => "manual",
            Self::Redemption => "redemption",
            Self::Expiration => "expiration",
            Self::System => "system",
        }
    }
}

/// 兑换状态
///
/// 兑换创建时为 pending，后续流转由外部履约系统驱动
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum RedemptionStatus {
    #[default]
    Pending,
    Fulfilled,
    Expired,
    /// 已取消的兑换不计入兑换上限
    Cancelled,
}

/// 会员状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum MembershipStatus {
    #[default]
    Active,
    Paused,
    Cancelled,
    Expired,
}
