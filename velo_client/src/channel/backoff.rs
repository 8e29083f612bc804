// velo_client/src/channel/backoff.rs

//! 重连退避策略：指数增长 + 随机抖动。
//!
//! 第 n 次 (从 0 开始) 的名义延迟为 `min(max, initial * factor^n)`，
//! 实际延迟在名义值基础上随机减少至多 `jitter` 比例，
//! 但不会小于上一次的延迟，也不会超过 `max`，因此整个序列单调不减且有上界。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// 随机减少的最大比例，取值 `[0, 1]`。
    pub jitter: f64,
    /// 连续失败次数上限，`None` 表示不限。
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            factor: 2.0,
            jitter: 0.5,
            max_attempts: None,
        }
    }
}

impl BackoffPolicy {
    /// 校验参数，返回可读的错误描述。
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_delay.is_zero() {
            return Err("初始退避延迟必须大于 0".to_string());
        }
        if self.max_delay < self.initial_delay {
            return Err(format!(
                "最大退避延迟 {:?} 不能小于初始延迟 {:?}",
                self.max_delay, self.initial_delay
            ));
        }
        if !(self.factor.is_finite() && self.factor >= 1.0) {
            return Err(format!("退避增长因子必须是不小于 1 的有限数，实际为 {}", self.factor));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(format!("抖动比例必须在 [0, 1] 之间，实际为 {}", self.jitter));
        }
        if self.max_attempts == Some(0) {
            return Err("最大重连次数必须大于 0".to_string());
        }
        Ok(())
    }

    /// 不含抖动的第 `attempt` 次延迟。
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.factor.powi(exponent);
        // 溢出为 inf 时同样落到上限
        if secs < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max_delay
        }
    }
}

/// 一次重连周期内的退避状态。
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
    previous: Duration,
    rng: StdRng,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self::with_rng(policy, StdRng::from_entropy())
    }

    pub fn with_rng(policy: BackoffPolicy, rng: StdRng) -> Self {
        Self { policy, attempt: 0, previous: Duration::ZERO, rng }
    }

    pub fn next_delay(&mut self) -> Duration {
        let nominal = self.policy.nominal_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);

        let sample: f64 = self.rng.gen();
        let jittered = nominal.mul_f64(1.0 - self.policy.jitter * sample);
        let delay = jittered.max(self.previous).min(self.policy.max_delay);
        self.previous = delay;
        delay
    }

    /// 回到初始延迟，在连接成功时调用。
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.previous = Duration::ZERO;
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(policy: BackoffPolicy, seed: u64) -> Backoff {
        Backoff::with_rng(policy, StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_delays_are_non_decreasing_and_bounded() {
        for seed in 0..20 {
            let policy = BackoffPolicy::default();
            let max = policy.max_delay;
            let mut backoff = seeded(policy, seed);
            let mut previous = Duration::ZERO;
            for attempt in 0..50 {
                let delay = backoff.next_delay();
                assert!(delay >= previous, "第 {} 次延迟 {:?} 小于上一次 {:?} (seed {})", attempt, delay, previous, seed);
                assert!(delay <= max, "第 {} 次延迟 {:?} 超过上限 {:?}", attempt, delay, max);
                previous = delay;
            }
        }
    }

    #[test]
    fn test_without_jitter_follows_exponential_curve() {
        let policy = BackoffPolicy { jitter: 0.0, ..BackoffPolicy::default() };
        let mut backoff = seeded(policy, 7);
        let delays: Vec<u128> = (0..5).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 5000, 5000]);
    }

    #[test]
    fn test_reset_returns_to_floor() {
        let policy = BackoffPolicy::default();
        let mut backoff = seeded(policy.clone(), 3);
        for _ in 0..10 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.policy(), &policy);
        let delay = backoff.next_delay();
        assert!(delay <= policy.initial_delay, "重置后的第一次延迟 {:?} 应不超过初始值", delay);
        assert!(delay >= policy.initial_delay.mul_f64(1.0 - policy.jitter));
    }

    #[test]
    fn test_huge_attempt_count_saturates_at_max() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.nominal_delay(u32::MAX), policy.max_delay);
        assert_eq!(policy.nominal_delay(0), policy.initial_delay);
    }

    #[test]
    fn test_validate_rejects_insane_policies() {
        assert!(BackoffPolicy::default().validate().is_ok());
        let cases = [
            BackoffPolicy { initial_delay: Duration::ZERO, ..BackoffPolicy::default() },
            BackoffPolicy { max_delay: Duration::from_millis(10), ..BackoffPolicy::default() },
            BackoffPolicy { factor: 0.5, ..BackoffPolicy::default() },
            BackoffPolicy { factor: f64::NAN, ..BackoffPolicy::default() },
            BackoffPolicy { jitter: 1.5, ..BackoffPolicy::default() },
            BackoffPolicy { max_attempts: Some(0), ..BackoffPolicy::default() },
        ];
        for policy in cases {
            assert!(policy.validate().is_err(), "策略 {:?} 应校验失败", policy);
        }
    }
}
