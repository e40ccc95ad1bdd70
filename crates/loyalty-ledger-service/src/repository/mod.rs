//! 仓储层
//!
//! - `traits`: 存储抽象
//! - `postgres`: PostgreSQL 实现（行锁 + 事务）
//! - `memory`: 进程内实现，语义与 PostgreSQL 实现一致

pub mod memory;
pub mod postgres;
pub mod traits;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;
pub use traits::{LedgerStore, LedgerTx};

#[cfg(test)]
pub use traits::MockLedgerStore;
