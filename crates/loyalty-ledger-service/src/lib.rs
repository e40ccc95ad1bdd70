//! 积分账本与兑换引擎
//!
//! 多租户业务平台中的积分经济：客户通过业务事件（如完成预约）获得积分，
//! 并用积分兑换带库存与次数限制的奖励。
//!
//! ## 核心功能
//!
//! - **积分发放**：按会员倍率换算后记入余额，支持来源幂等
//! - **奖励兑换**：奖励行锁 + 余额行锁，库存与兑换上限在锁内校验
//! - **过期清扫**：按余额分组扣减到期积分，重复执行不重复扣减
//! - **事件触发**：预约完成时按服务价格自动发放
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `context`: 调用方身份
//! - `repository`: 存储层（PostgreSQL / 内存）
//! - `catalog`: 方案与奖励目录缓存
//! - `service`: 业务服务层
//! - `trigger`: 外部事件触发
//! - `worker`: 后台定时任务

pub mod catalog;
pub mod context;
pub mod error;
pub mod models;
pub mod repository;
pub mod service;
pub mod trigger;
pub mod worker;

pub use catalog::CatalogCache;
pub use context::AuthContext;
pub use error::{ErrorKind, LedgerError, Result};
pub use models::*;
pub use repository::{LedgerStore, LedgerTx, MemoryLedgerStore, PgLedgerStore};
pub use service::{
    AvailableRewardDto, AwardStats, AwardTokensRequest, AwardTokensResponse, LedgerService,
    MembershipMultiplierResolver, MultiplierResolver, RedeemRewardResponse,
    TenantExpirationSummary,
};
pub use trigger::{AppointmentEvent, AppointmentStatus, AppointmentTrigger};
pub use worker::ExpireWorker;
