use chrono::{DateTime, Utc};
use std::time::Duration;

/// 指数バックオフのリトライ方針
///
/// 遅延はジッターなしの `base_delay * 2^(attempt-1)` で、`max_delay` で頭打ちになる。
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 最初の試行の後に行うリトライ回数
    pub max_retries: u32,
    /// 1回目のリトライ前の待機時間
    pub base_delay: Duration,
    /// 待機時間の上限（Retry-Afterにも適用）
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// 試行回数の総数（初回 + リトライ）
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// `attempt` 回目のリトライ（1始まり）の前に待つ時間
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Retry-Afterがあればそれを、なければ計算済みのバックオフを返す
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(wait) => wait.min(self.max_delay),
            None => self.backoff_delay(attempt),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTPステータスがリトライ対象かどうか（429と5xx）
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Retry-Afterヘッダーの値を解釈する
///
/// 秒数とHTTP日付の両方の形式を受け付ける。過去の日付はゼロ待機として扱う。
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
