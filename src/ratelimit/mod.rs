mod memory;
mod shared;

pub use memory::MemoryRateLimiter;
pub use shared::SharedRateLimiter;

/// Post-consume accounting returned to the dispatcher so it can attach
/// the `X-RateLimit-*` headers to the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSnapshot {
	pub limit_minute: u32,
	pub remaining_minute: u32,
	pub limit_day: u32,
	pub remaining_day: u32,
}

/// A pluggable dual-window (per-minute, per-day) fixed-window limiter.
///
/// `consume_or_deny` must consume at most one unit from each window per
/// call, and must consume from neither if either window is saturated.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
	async fn consume_or_deny(&self, token: &str, rpm: u32, rpd: u32) -> Option<RateSnapshot>;
}
