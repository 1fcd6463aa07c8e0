use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;

use super::{RateLimiter, RateSnapshot};

const MINUTE_SECS: u64 = 60;
const DAY_SECS: u64 = 86_400;

/// Per-token window state, created lazily and never evicted for the
/// life of the process — ported from `app/ratelimit/memory.py::TokenWindow`.
#[derive(Default)]
struct TokenWindow {
	minute_bucket: u64,
	minute_count: u32,
	day_bucket: u64,
	day_count: u32,
}

/// In-process dual-window limiter guarded by a single mutex (spec §5,
/// "shared resources"): the critical section covers both bucket resets
/// and both increments, so no unit is ever consumed from one window
/// when the other is saturated.
pub struct MemoryRateLimiter {
	state: Mutex<HashMap<String, TokenWindow>>,
}

impl MemoryRateLimiter {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(HashMap::new()),
		}
	}

	fn now_secs() -> u64 {
		SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.expect("system clock before unix epoch")
			.as_secs()
	}
}

impl Default for MemoryRateLimiter {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait::async_trait]
impl RateLimiter for MemoryRateLimiter {
	async fn consume_or_deny(&self, token: &str, rpm: u32, rpd: u32) -> Option<RateSnapshot> {
		let now = Self::now_secs();
		let minute_bucket = now / MINUTE_SECS;
		let day_bucket = now / DAY_SECS;

		let mut state = self.state.lock().await;
		let window = state.entry(token.to_string()).or_default();

		if window.minute_bucket != minute_bucket {
			window.minute_bucket = minute_bucket;
			window.minute_count = 0;
		}
		if window.day_bucket != day_bucket {
			window.day_bucket = day_bucket;
			window.day_count = 0;
		}

		if window.minute_count >= rpm || window.day_count >= rpd {
			return None;
		}

		window.minute_count += 1;
		window.day_count += 1;

		Some(RateSnapshot {
			limit_minute: rpm,
			remaining_minute: rpm.saturating_sub(window.minute_count),
			limit_day: rpd,
			remaining_day: rpd.saturating_sub(window.day_count),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn admits_up_to_the_limit_then_denies() {
		let limiter = MemoryRateLimiter::new();
		for i in 0..5 {
			let snapshot = limiter.consume_or_deny("tok", 5, 100).await.unwrap();
			assert_eq!(snapshot.remaining_minute, 4 - i);
		}
		assert!(limiter.consume_or_deny("tok", 5, 100).await.is_none());
	}

	#[tokio::test]
	async fn day_limit_denies_even_under_minute_limit() {
		let limiter = MemoryRateLimiter::new();
		for _ in 0..2 {
			assert!(limiter.consume_or_deny("tok", 100, 2).await.is_some());
		}
		assert!(limiter.consume_or_deny("tok", 100, 2).await.is_none());
	}

	#[tokio::test]
	async fn tokens_are_independent() {
		let limiter = MemoryRateLimiter::new();
		for _ in 0..3 {
			assert!(limiter.consume_or_deny("a", 3, 100).await.is_some());
		}
		assert!(limiter.consume_or_deny("a", 3, 100).await.is_none());
		assert!(limiter.consume_or_deny("b", 3, 100).await.is_some());
	}

	#[tokio::test]
	async fn bucket_rollover_resets_minute_count() {
		let limiter = MemoryRateLimiter::new();
		{
			let mut state = limiter.state.lock().await;
			let window = state.entry("tok".to_string()).or_default();
			window.minute_bucket = 0;
			window.minute_count = 5;
			window.day_bucket = 0;
			window.day_count = 5;
		}
		// A fresh bucket (simulated as "current") resets the minute counter
		// even though the day counter — same bucket — stays saturated.
		let snapshot = limiter.consume_or_deny("tok", 5, 5).await;
		// day_count(5) >= rpd(5) so this must still deny, proving the two
		// windows are checked independently before either is mutated.
		assert!(snapshot.is_none());
		let state = limiter.state.lock().await;
		assert_eq!(state.get("tok").unwrap().minute_count, 5);
	}
}
