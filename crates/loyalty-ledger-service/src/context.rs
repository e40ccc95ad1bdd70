//! 调用上下文
//!
//! 访问控制层在进入账本之前已完成身份校验，这里只承载校验结果。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 已校验的调用方身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// 调用方所属租户，所有跨租户引用以此为准
    pub tenant_id: Uuid,
    /// 调用方标识（员工、系统任务等），仅用于审计日志
    pub actor: String,
}

impl AuthContext {
    pub fn new(tenant_id: Uuid, actor: impl Into<String>) -> Self {
        Self {
            tenant_id,
            actor: actor.into(),
        }
    }

    /// 系统内部任务（事件触发、定时清扫）使用的上下文
    pub fn system(tenant_id: Uuid) -> Self {
        Self::new(tenant_id, "system")
    }
}
