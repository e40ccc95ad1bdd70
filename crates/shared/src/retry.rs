//! 行锁冲突重试
//!
//! 积分发放与兑换在同一余额或奖励行上竞争时，等待方可能遇到锁等待超时或死锁。
//! 这类冲突通常在几十毫秒内消失，按指数退避重新执行整个事务即可。
//! 是否可重试由调用方传入的判定函数决定，业务规则失败（余额不足等）不会重试。

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::LedgerConfig;

/// 退避策略
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 首次执行之外的最大重试次数
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    /// 3 次重试，10ms 起步，上限 200ms
    fn default() -> Self {
        Self::from_millis(3, 10, 200)
    }
}

impl From<&LedgerConfig> for RetryPolicy {
    fn from(config: &LedgerConfig) -> Self {
        Self::from_millis(
            config.max_retries,
            config.retry_initial_delay_ms,
            config.retry_max_delay_ms,
        )
    }
}

impl RetryPolicy {
    /// 倍数固定为 2
    pub fn from_millis(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms.max(initial_delay_ms)),
            multiplier: 2.0,
        }
    }

    /// 第 `retry` 次重试（从 0 开始）前的等待时间，不超过 `max_delay`
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let millis = (self.initial_delay.as_millis() as f64 * factor)
            .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}

/// 执行 `operation`，对可重试错误按策略退避后重新执行
///
/// 返回最后一次执行的结果。`operation` 每次都必须从头开始一个新事务。
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut retry = 0_u32;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if retry > 0 {
                    debug!(operation = operation_name, retries = retry, "重试后执行成功");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) {
            return Err(err);
        }
        if retry >= policy.max_retries {
            warn!(
                operation = operation_name,
                retries = retry,
                error = %err,
                "锁冲突重试次数已用尽"
            );
            return Err(err);
        }

        let delay = policy.backoff(retry);
        warn!(
            operation = operation_name,
            retry = retry + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "锁冲突，退避后重试"
        );
        tokio::time::sleep(delay).await;
        retry += 1;
    }
}
