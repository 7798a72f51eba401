//! 有界指数退避重试
//!
//! RetryPolicy 只负责「执行」一个零参数操作：失败后等待 backoff(attempt) 再试，
//! 用尽次数后原样返回最后一次错误。它不会产出新的「可重试操作」，
//! 因此嵌套重试必须在调用处显式写出，不会悄悄放大尝试次数。

use std::future::Future;
use std::time::Duration;

/// 默认最大尝试次数
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// 默认退避基数（0.5s）
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
/// 默认退避上限（4s）
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(4);

/// 重试策略：最大尝试次数 + 指数退避（base * 2^attempt，封顶 cap）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_base: Duration,
    backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
        }
    }
}

impl RetryPolicy {
    /// max_attempts 至少为 1
    pub fn new(max_attempts: u32, backoff_base: Duration, backoff_cap: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
            backoff_cap,
        }
    }

    /// 只尝试一次
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 第 attempt_index 次（从 0 开始）失败后的等待时长
    pub fn backoff(&self, attempt_index: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt_index);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }

    /// 异步执行 operation，失败按策略重试；耗尽后返回最后一次错误
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(attempts = attempt + 1, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        tracing::warn!(attempts = attempt, error = %e, "retries exhausted");
                        return Err(e);
                    }
                    let wait = self.backoff(attempt - 1);
                    tracing::debug!(attempt, wait_ms = wait.as_millis() as u64, error = %e, "retrying");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// 同步版本：用于同步工具或同步调用点，退避期间阻塞当前线程
    pub fn run_blocking<T, E, F>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        tracing::warn!(attempts = attempt, error = %e, "retries exhausted");
                        return Err(e);
                    }
                    std::thread::sleep(self.backoff(attempt - 1));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(10), Duration::from_secs(4));
        assert_eq!(policy.backoff(40), Duration::from_secs(4));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, String> = fast_policy(3)
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("success")
            })
            .await;
        assert_eq!(result.unwrap(), "success");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_after_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, String> = fast_policy(3)
            .run(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("temporary failure {n}"))
                } else {
                    Ok("success")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "success");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_error_unchanged() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = fast_policy(3)
            .run(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("failure {n}"))
            })
            .await;
        assert_eq!(result.unwrap_err(), "failure 3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_nested_policies_are_explicit() {
        // 外层 2 次 * 内层 3 次，必须由调用方显式写出
        let calls = AtomicU32::new(0);
        let inner = fast_policy(3);
        let result: Result<(), String> = fast_policy(2)
            .run(|| {
                let calls = &calls;
                async move {
                    inner
                        .run(|| async {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Err::<(), String>("nope".to_string())
                        })
                        .await
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_run_blocking() {
        let mut calls = 0;
        let result: Result<u32, String> = fast_policy(3).run_blocking(|| {
            calls += 1;
            if calls < 2 {
                Err("flaky".to_string())
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn test_none_policy_single_attempt() {
        let mut calls = 0;
        let result: Result<(), String> = RetryPolicy::none().run_blocking(|| {
            calls += 1;
            Err("fail".to_string())
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
