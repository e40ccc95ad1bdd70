//! 积分过期清扫 Worker
//!
//! 按 cron 表达式周期性执行过期清扫。多实例部署时各实例可同时运行：
//! 每个余额组在行锁内处理，过期关联保证同一笔获取记录只过期一次。

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use loyalty_shared::observability::metrics;
use tokio::sync::watch;
use tracing::{error, info};

use crate::error::{LedgerError, Result};
use crate::service::LedgerService;

/// 过期清扫 Worker
pub struct ExpireWorker {
    ledger: Arc<LedgerService>,
    schedule: Schedule,
}

impl ExpireWorker {
    /// 创建 ExpireWorker 实例
    ///
    /// # 参数
    /// - `ledger`: 账本门面服务
    /// - `cron_expression`: 含秒字段的 cron 表达式，如 `0 */10 * * * *`
    pub fn new(ledger: Arc<LedgerService>, cron_expression: &str) -> Result<Self> {
        let schedule = Schedule::from_str(cron_expression).map_err(|e| {
            LedgerError::Validation(format!("无效的 cron 表达式 {}: {}", cron_expression, e))
        })?;
        Ok(Self { ledger, schedule })
    }

    /// 执行一次清扫
    pub async fn run_once(&self) -> Result<()> {
        let summaries = self.ledger.expire_tokens().await?;
        for summary in &summaries {
            info!(
                tenant_id = %summary.tenant_id,
                transactions_expired = summary.transactions_expired,
                tokens_expired = summary.tokens_expired,
                "租户积分过期完成"
            );
        }
        metrics::set_worker_last_run("expire_worker");
        Ok(())
    }

    /// 主循环：按计划执行清扫，直到收到关闭信号
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(schedule = %self.schedule, "ExpireWorker 已启动");

        loop {
            let Some(next) = self.schedule.upcoming(Utc).next() else {
                error!("cron 表达式没有下一次执行时间，ExpireWorker 退出");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "积分过期清扫出错");
                    }
                }
                _ = shutdown.changed() => {
                    info!("ExpireWorker 收到关闭信号，退出");
                    return;
                }
            }
        }
    }
}
