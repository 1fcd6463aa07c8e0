use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::{RateLimiter, RateSnapshot};

const MINUTE_TTL: i64 = 60;
const DAY_TTL: i64 = 86_400;

/// Redis-backed limiter: two keys per token (`rl:<token>:minute`,
/// `rl:<token>:day`), each an INCR with a TTL set on first write.
///
/// Per spec §4.2 this knowingly gives up strict atomicity across the two
/// keys — a denial on the day key leaves a consumed unit on the minute
/// key. An admitted request is still counted against both windows, which
/// is all the contract requires.
pub struct SharedRateLimiter {
	conn: ConnectionManager,
}

impl SharedRateLimiter {
	pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
		let client = redis::Client::open(redis_url)?;
		let conn = client.get_connection_manager().await?;
		Ok(Self { conn })
	}

	async fn consume(&self, key: &str, limit: u32, ttl: i64) -> anyhow::Result<Option<u32>> {
		let mut conn = self.conn.clone();
		let count: i64 = conn.incr(key, 1).await?;
		if count == 1 {
			let _: () = conn.expire(key, ttl).await?;
		}
		if count as u64 > limit as u64 {
			return Ok(None);
		}
		Ok(Some(limit.saturating_sub(count as u32)))
	}
}

#[async_trait::async_trait]
impl RateLimiter for SharedRateLimiter {
	async fn consume_or_deny(&self, token: &str, rpm: u32, rpd: u32) -> Option<RateSnapshot> {
		let minute_key = format!("rl:{token}:minute");
		let day_key = format!("rl:{token}:day");

		let remaining_minute = match self.consume(&minute_key, rpm, MINUTE_TTL).await {
			Ok(Some(v)) => v,
			Ok(None) => return None,
			Err(e) => {
				tracing::error!(error = %e, "shared rate limiter minute-key consume failed");
				return None;
			},
		};
		let remaining_day = match self.consume(&day_key, rpd, DAY_TTL).await {
			Ok(Some(v)) => v,
			Ok(None) => return None,
			Err(e) => {
				tracing::error!(error = %e, "shared rate limiter day-key consume failed");
				return None;
			},
		};

		Some(RateSnapshot {
			limit_minute: rpm,
			remaining_minute,
			limit_day: rpd,
			remaining_day,
		})
	}
}
