//! 服务层
//!
//! 实现积分账本业务逻辑，协调仓储层与目录缓存。
//!
//! ## 模块结构
//!
//! - `dto`: 数据传输对象定义
//! - `award_service`: 积分发放
//! - `redemption_service`: 奖励兑换
//! - `expiration_service`: 积分过期清扫
//! - `multiplier`: 会员倍率解析
//! - `ledger_service`: 对外门面（重试、错误转换、指标）
//! - `stats`: 运行中平均值

pub mod award_service;
pub mod dto;
pub mod expiration_service;
pub mod ledger_service;
pub mod multiplier;
pub mod redemption_service;
pub mod stats;

pub use award_service::AwardService;
pub use dto::*;
pub use expiration_service::ExpirationService;
pub use ledger_service::LedgerService;
pub use multiplier::{MembershipMultiplierResolver, MultiplierResolver};
pub use redemption_service::{RedemptionService, generate_redemption_code};
pub use stats::RunningAverage;
