//! 积分账本领域模型

pub mod balance;
pub mod enums;
pub mod membership;
pub mod program;
pub mod reward;

// 重新导出常用类型
pub use balance::{Balance, ExpiryLink, NewTransaction, TokenTransaction};
pub use enums::{MembershipStatus, RedemptionStatus, SourceType, TransactionType};
pub use membership::{Membership, MembershipPlan};
pub use program::Program;
pub use reward::{NewRedemption, Redemption, Reward};
