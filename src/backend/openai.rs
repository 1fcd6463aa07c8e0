use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use serde_json::{Map, Value};

use crate::error::GatewayError;
use crate::sse::ByteStream;

use super::{AdapterResponse, BackendAdapter, ModelEntry};

/// Forwards requests to an OpenAI-compatible backend (vLLM's
/// `/v1/*` server or any other spec-compliant server) unchanged, passing
/// raw upstream bytes straight through on the streaming path — ported
/// from `app/adapters/vllm.py::VLLMAdapter`.
pub struct OpenAiAdapter {
	client: Client,
	base_url: String,
}

impl OpenAiAdapter {
	pub fn new(client: Client, base_url: impl Into<String>) -> Self {
		let base_url = base_url.into();
		let base_url = base_url.trim_end_matches('/').to_string();
		Self { client, base_url }
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url, path)
	}

	async fn post(
		&self,
		path: &str,
		payload: Map<String, Value>,
		stream: bool,
	) -> Result<AdapterResponse, GatewayError> {
		let response = self
			.client
			.post(self.url(path))
			.json(&payload)
			.send()
			.await
			.map_err(|e| GatewayError::bad_gateway(e.to_string()))?;
		if !response.status().is_success() {
			return Err(GatewayError::bad_gateway(format!(
				"backend returned {}",
				response.status()
			)));
		}
		if stream {
			let byte_stream: ByteStream = Box::pin(
				response
					.bytes_stream()
					.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string())),
			);
			return Ok(AdapterResponse::Stream(byte_stream));
		}
		let data: Value = response.json().await.map_err(|e| GatewayError::bad_gateway(e.to_string()))?;
		Ok(AdapterResponse::Json(data))
	}
}

#[async_trait]
impl BackendAdapter for OpenAiAdapter {
	async fn chat_completions(
		&self,
		payload: Map<String, Value>,
		stream: bool,
	) -> Result<AdapterResponse, GatewayError> {
		self.post("/v1/chat/completions", payload, stream).await
	}

	async fn completions(
		&self,
		payload: Map<String, Value>,
		stream: bool,
	) -> Result<AdapterResponse, GatewayError> {
		self.post("/v1/completions", payload, stream).await
	}

	async fn embeddings(&self, payload: Map<String, Value>) -> Result<Value, GatewayError> {
		let response = self
			.client
			.post(self.url("/v1/embeddings"))
			.json(&payload)
			.send()
			.await
			.map_err(|e| GatewayError::bad_gateway(e.to_string()))?;
		if !response.status().is_success() {
			return Err(GatewayError::bad_gateway(format!(
				"backend returned {}",
				response.status()
			)));
		}
		response.json().await.map_err(|e| GatewayError::bad_gateway(e.to_string()))
	}

	async fn list_models(&self) -> Result<Vec<ModelEntry>, GatewayError> {
		let response = self
			.client
			.get(self.url("/v1/models"))
			.send()
			.await
			.map_err(|e| GatewayError::bad_gateway(e.to_string()))?;
		if !response.status().is_success() {
			return Err(GatewayError::bad_gateway(format!(
				"backend returned {}",
				response.status()
			)));
		}
		let body: Value = response.json().await.map_err(|e| GatewayError::bad_gateway(e.to_string()))?;
		let data = body.get("data").and_then(Value::as_array).cloned().unwrap_or_default();

		Ok(data
			.into_iter()
			.filter_map(|item| {
				let id = item.get("id").and_then(Value::as_str)?.to_string();
				let owned_by = item
					.get("owned_by")
					.and_then(Value::as_str)
					.unwrap_or("vllm")
					.to_string();
				Some(ModelEntry {
					id,
					object: "model".to_string(),
					owned_by,
				})
			})
			.collect())
	}
}
