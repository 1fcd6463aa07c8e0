use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
	pub token: String,
	pub label: String,
	pub rpm: u32,
	pub rpd: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
	Ollama,
	Vllm,
}

impl Backend {
	pub fn as_str(self) -> &'static str {
		match self {
			Backend::Ollama => "ollama",
			Backend::Vllm => "vllm",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitStore {
	Memory,
	Shared,
}

#[derive(Debug, Clone)]
pub struct Settings {
	pub host: String,
	pub port: u16,
	pub default_backend: Backend,
	pub ollama_base_url: Option<String>,
	pub vllm_base_url: Option<String>,
	pub tokens: Vec<TokenConfig>,
	pub rate_limit_store: RateLimitStore,
	pub redis_url: Option<String>,
	pub max_body_bytes: u64,
	pub model_cache_ttl: Duration,
	pub backend_timeout: Duration,
}

impl Settings {
	/// Loads settings from the process environment and validates them,
	/// mirroring `app/settings.py::Settings` plus `validate_backends`.
	pub fn from_env() -> anyhow::Result<Self> {
		let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
		let port: u16 = env_or("PORT", "8080")?;

		let default_backend = match std::env::var("DEFAULT_BACKEND") {
			Ok(v) if v == "ollama" => Backend::Ollama,
			Ok(v) if v == "vllm" => Backend::Vllm,
			Ok(v) => anyhow::bail!("DEFAULT_BACKEND must be 'ollama' or 'vllm', got {v:?}"),
			Err(_) => anyhow::bail!("DEFAULT_BACKEND must be set"),
		};

		let ollama_base_url = std::env::var("OLLAMA_BASE_URL").ok();
		let vllm_base_url = std::env::var("VLLM_BASE_URL").ok();

		let tokens: Vec<TokenConfig> = match std::env::var("TOKENS_JSON") {
			Ok(raw) => serde_json::from_str(&raw)
				.map_err(|e| anyhow::anyhow!("invalid TOKENS_JSON: {e}"))?,
			Err(_) => Vec::new(),
		};
		for t in &tokens {
			if t.rpm == 0 || t.rpd == 0 {
				anyhow::bail!("token {:?} must have rpm > 0 and rpd > 0", t.label);
			}
		}

		let rate_limit_store = match std::env::var("RATE_LIMIT_STORE").as_deref() {
			Ok("shared") => RateLimitStore::Shared,
			Ok("memory") | Err(_) => RateLimitStore::Memory,
			Ok(other) => anyhow::bail!("RATE_LIMIT_STORE must be 'memory' or 'shared', got {other:?}"),
		};
		let redis_url = std::env::var("REDIS_URL").ok();

		let max_body_bytes: u64 = env_or("MAX_BODY_BYTES", "2097152")?;
		let model_cache_ttl_secs: u64 = env_or("MODEL_CACHE_TTL", "300")?;
		let backend_timeout_secs: u64 = env_or("BACKEND_TIMEOUT_SECS", "60")?;

		let settings = Settings {
			host,
			port,
			default_backend,
			ollama_base_url,
			vllm_base_url,
			tokens,
			rate_limit_store,
			redis_url,
			max_body_bytes,
			model_cache_ttl: Duration::from_secs(model_cache_ttl_secs),
			backend_timeout: Duration::from_secs(backend_timeout_secs),
		};
		settings.validate()?;
		Ok(settings)
	}

	fn validate(&self) -> anyhow::Result<()> {
		match self.default_backend {
			Backend::Ollama if self.ollama_base_url.is_none() => {
				anyhow::bail!("DEFAULT_BACKEND set to ollama but OLLAMA_BASE_URL missing")
			},
			Backend::Vllm if self.vllm_base_url.is_none() => {
				anyhow::bail!("DEFAULT_BACKEND set to vllm but VLLM_BASE_URL missing")
			},
			_ => {},
		}
		if self.tokens.is_empty() {
			anyhow::bail!("TOKENS_JSON must provide at least one token");
		}
		if self.rate_limit_store == RateLimitStore::Shared && self.redis_url.is_none() {
			anyhow::bail!("RATE_LIMIT_STORE=shared requires REDIS_URL");
		}
		Ok(())
	}

	pub fn ollama_enabled(&self) -> bool {
		self.ollama_base_url.is_some()
	}

	pub fn vllm_enabled(&self) -> bool {
		self.vllm_base_url.is_some()
	}
}

fn env_or<T: std::str::FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
	T::Err: std::fmt::Display,
{
	let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
	raw
		.parse::<T>()
		.map_err(|e| anyhow::anyhow!("invalid {key}: {e}"))
}
