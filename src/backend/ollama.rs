use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;
use futures::{StreamExt, pin_mut};
use reqwest::Client;
use serde_json::{Map, Value, json};

use crate::error::GatewayError;
use crate::sse::{ByteStream, done_event, format_event};

use super::{AdapterResponse, BackendAdapter, ModelEntry};

/// Translates between the OpenAI wire format and Ollama's native
/// `/api/chat`, `/api/generate`, `/api/embeddings`, `/api/tags` — the
/// heart of the gateway (spec §4.3.2). Ported line-for-line from
/// `app/adapters/ollama.py::OllamaAdapter`.
pub struct OllamaAdapter {
	client: Client,
	base_url: String,
}

impl OllamaAdapter {
	pub fn new(client: Client, base_url: impl Into<String>) -> Self {
		let base_url = base_url.into();
		let base_url = base_url.trim_end_matches('/').to_string();
		Self { client, base_url }
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url, path)
	}
}

/// Maps OpenAI sampling fields onto Ollama's `options` object. Fields
/// absent from the payload are simply omitted rather than defaulted.
fn extract_options(payload: &Map<String, Value>) -> Map<String, Value> {
	let mut options = Map::new();
	if let Some(v) = payload.get("temperature") {
		if !v.is_null() {
			options.insert("temperature".to_string(), v.clone());
		}
	}
	if let Some(v) = payload.get("top_p") {
		if !v.is_null() {
			options.insert("top_p".to_string(), v.clone());
		}
	}
	if let Some(v) = payload.get("seed") {
		if !v.is_null() {
			options.insert("seed".to_string(), v.clone());
		}
	}
	if let Some(v) = payload.get("max_tokens") {
		if !v.is_null() {
			options.insert("num_predict".to_string(), v.clone());
		}
	}
	options
}

fn response_model_of(payload: &Map<String, Value>) -> String {
	payload
		.get("response_model")
		.and_then(Value::as_str)
		.or_else(|| payload.get("model").and_then(Value::as_str))
		.unwrap_or_default()
		.to_string()
}

/// Ollama stamps `created_at` as an RFC 3339 string; falls back to "now"
/// on anything absent or unparsable, matching `_timestamp` in the
/// original adapter.
fn timestamp(created_at: Option<&str>) -> i64 {
	match created_at {
		Some(raw) => DateTime::parse_from_rfc3339(raw)
			.map(|dt| dt.timestamp())
			.unwrap_or_else(|_| now_secs()),
		None => now_secs(),
	}
}

fn now_secs() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs() as i64)
		.unwrap_or_default()
}

fn chat_usage(data: &Value) -> Value {
	let eval_count = data.get("eval_count").and_then(Value::as_i64);
	let prompt_eval_count = data.get("prompt_eval_count").and_then(Value::as_i64);
	if eval_count.is_none() && prompt_eval_count.is_none() {
		return Value::Null;
	}
	let total = match (eval_count, prompt_eval_count) {
		(Some(c), Some(p)) => Value::from(c + p),
		_ => Value::Null,
	};
	json!({
		"prompt_tokens": prompt_eval_count,
		"completion_tokens": eval_count,
		"total_tokens": total,
	})
}

fn done_reason(data: &Value) -> String {
	data
		.get("done_reason")
		.and_then(Value::as_str)
		.filter(|s| !s.is_empty())
		.unwrap_or("stop")
		.to_string()
}

fn stream_id(prefix: &str) -> String {
	format!("{prefix}-{:032x}", rand::random::<u128>())
}

#[async_trait]
impl BackendAdapter for OllamaAdapter {
	async fn chat_completions(
		&self,
		payload: Map<String, Value>,
		stream: bool,
	) -> Result<AdapterResponse, GatewayError> {
		let model = payload
			.get("model")
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string();
		let response_model = response_model_of(&payload);
		let messages = payload.get("messages").cloned().unwrap_or(Value::Array(vec![]));

		let mut body = json!({
			"model": model,
			"messages": messages,
			"stream": stream,
		});
		let options = extract_options(&payload);
		if !options.is_empty() {
			body["options"] = Value::Object(options);
		}
		if let Some(stop) = payload.get("stop") {
			if !stop.is_null() {
				body["stop"] = stop.clone();
			}
		}

		if stream {
			let response = self
				.client
				.post(self.url("/api/chat"))
				.json(&body)
				.send()
				.await
				.map_err(|e| GatewayError::bad_gateway(e.to_string()))?;
			if !response.status().is_success() {
				return Err(GatewayError::bad_gateway(format!(
					"ollama returned {}",
					response.status()
				)));
			}
			let id = stream_id("chatcmpl");
			let created = now_secs();
			let byte_stream: ByteStream = Box::pin(chat_stream(response, id, created, response_model));
			return Ok(AdapterResponse::Stream(byte_stream));
		}

		let response = self
			.client
			.post(self.url("/api/chat"))
			.json(&body)
			.send()
			.await
			.map_err(|e| GatewayError::bad_gateway(e.to_string()))?;
		if !response.status().is_success() {
			return Err(GatewayError::bad_gateway(format!("ollama returned {}", response.status())));
		}
		let data: Value = response.json().await.map_err(|e| GatewayError::bad_gateway(e.to_string()))?;
		let created = timestamp(data.get("created_at").and_then(Value::as_str));
		let content = data
			.get("message")
			.and_then(|m| m.get("content"))
			.and_then(Value::as_str)
			.unwrap_or_default();

		Ok(AdapterResponse::Json(json!({
			"id": stream_id("chatcmpl"),
			"object": "chat.completion",
			"created": created,
			"model": response_model,
			"choices": [{
				"index": 0,
				"message": {"role": "assistant", "content": content},
				"finish_reason": done_reason(&data),
			}],
			"usage": chat_usage(&data),
		})))
	}

	async fn completions(
		&self,
		payload: Map<String, Value>,
		stream: bool,
	) -> Result<AdapterResponse, GatewayError> {
		let prompt = payload.get("prompt").cloned().unwrap_or(Value::Null);
		if prompt.is_array() {
			return Err(GatewayError::invalid_request(
				"ollama backend does not support array prompts for /v1/completions",
			));
		}
		let model = payload
			.get("model")
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string();
		let response_model = response_model_of(&payload);

		let mut body = json!({
			"model": model,
			"prompt": prompt,
			"stream": stream,
		});
		let options = extract_options(&payload);
		if !options.is_empty() {
			body["options"] = Value::Object(options);
		}
		if let Some(stop) = payload.get("stop") {
			if !stop.is_null() {
				body["stop"] = stop.clone();
			}
		}

		if stream {
			let response = self
				.client
				.post(self.url("/api/generate"))
				.json(&body)
				.send()
				.await
				.map_err(|e| GatewayError::bad_gateway(e.to_string()))?;
			if !response.status().is_success() {
				return Err(GatewayError::bad_gateway(format!(
					"ollama returned {}",
					response.status()
				)));
			}
			let id = stream_id("cmpl");
			let created = now_secs();
			let byte_stream: ByteStream =
				Box::pin(completion_stream(response, id, created, response_model));
			return Ok(AdapterResponse::Stream(byte_stream));
		}

		let response = self
			.client
			.post(self.url("/api/generate"))
			.json(&body)
			.send()
			.await
			.map_err(|e| GatewayError::bad_gateway(e.to_string()))?;
		if !response.status().is_success() {
			return Err(GatewayError::bad_gateway(format!("ollama returned {}", response.status())));
		}
		let data: Value = response.json().await.map_err(|e| GatewayError::bad_gateway(e.to_string()))?;
		let created = timestamp(data.get("created_at").and_then(Value::as_str));
		let text = data.get("response").and_then(Value::as_str).unwrap_or_default();

		Ok(AdapterResponse::Json(json!({
			"id": stream_id("cmpl"),
			"object": "text_completion",
			"created": created,
			"model": response_model,
			"choices": [{
				"text": text,
				"index": 0,
				"logprobs": Value::Null,
				"finish_reason": done_reason(&data),
			}],
			"usage": chat_usage(&data),
		})))
	}

	async fn embeddings(&self, payload: Map<String, Value>) -> Result<Value, GatewayError> {
		let model = payload
			.get("model")
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string();
		let response_model = response_model_of(&payload);
		let input = payload.get("input").cloned().unwrap_or(Value::Null);

		let body = json!({ "model": model, "prompt": input });
		let response = self
			.client
			.post(self.url("/api/embeddings"))
			.json(&body)
			.send()
			.await
			.map_err(|e| GatewayError::bad_gateway(e.to_string()))?;
		if !response.status().is_success() {
			return Err(GatewayError::bad_gateway(format!("ollama returned {}", response.status())));
		}
		let data: Value = response.json().await.map_err(|e| GatewayError::bad_gateway(e.to_string()))?;
		let embedding = data.get("embedding").cloned().unwrap_or(Value::Array(vec![]));

		Ok(json!({
			"data": [{"object": "embedding", "embedding": embedding, "index": 0}],
			"model": response_model,
			"object": "list",
		}))
	}

	async fn list_models(&self) -> Result<Vec<ModelEntry>, GatewayError> {
		let response = self
			.client
			.get(self.url("/api/tags"))
			.send()
			.await
			.map_err(|e| GatewayError::bad_gateway(e.to_string()))?;
		if !response.status().is_success() {
			return Err(GatewayError::bad_gateway(format!("ollama returned {}", response.status())));
		}
		let body: Value = response.json().await.map_err(|e| GatewayError::bad_gateway(e.to_string()))?;
		let models = body
			.get("models")
			.and_then(Value::as_array)
			.cloned()
			.unwrap_or_default();

		Ok(models
			.into_iter()
			.filter_map(|item| {
				let name = item.get("name").and_then(Value::as_str)?.to_string();
				Some(ModelEntry {
					id: format!("ollama:{name}"),
					object: "model".to_string(),
					owned_by: "ollama".to_string(),
				})
			})
			.collect())
	}
}

/// Chat NDJSON → OpenAI SSE, one line of Ollama JSON per iteration. Tracks
/// whether the role delta has already been emitted so role is only sent
/// on the first content-bearing chunk, per spec §4.3.2's state table.
fn chat_stream(
	response: reqwest::Response,
	id: String,
	created: i64,
	response_model: String,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> {
	async_stream::stream! {
		let mut role_sent = false;
		let lines = ndjson_lines(response);
		pin_mut!(lines);
		while let Some(line) = lines.next().await {
			let line = match line {
				Ok(l) => l,
				Err(e) => {
					yield Err(e);
					return;
				}
			};
			if line.trim().is_empty() {
				continue;
			}
			let data: Value = match serde_json::from_str(&line) {
				Ok(v) => v,
				Err(_) => continue,
			};
			if data.get("done").and_then(Value::as_bool).unwrap_or(false) {
				let finish_reason = done_reason(&data);
				let chunk = json!({
					"id": id,
					"object": "chat.completion.chunk",
					"created": created,
					"model": response_model,
					"choices": [{"index": 0, "delta": {}, "finish_reason": finish_reason}],
				});
				yield Ok(format_event(&chunk));
				yield Ok(done_event());
				return;
			}
			let content = data
				.get("message")
				.and_then(|m| m.get("content"))
				.and_then(Value::as_str)
				.unwrap_or_default();
			let mut delta = Map::new();
			if !role_sent {
				delta.insert("role".to_string(), Value::String("assistant".to_string()));
				role_sent = true;
			}
			if !content.is_empty() {
				delta.insert("content".to_string(), Value::String(content.to_string()));
			}
			if !delta.is_empty() {
				let chunk = json!({
					"id": id,
					"object": "chat.completion.chunk",
					"created": created,
					"model": response_model,
					"choices": [{"index": 0, "delta": delta, "finish_reason": Value::Null}],
				});
				yield Ok(format_event(&chunk));
			}
		}
		// Upstream closed without a `done` line — still terminate the stream cleanly.
		let chunk = json!({
			"id": id,
			"object": "chat.completion.chunk",
			"created": created,
			"model": response_model,
			"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
		});
		yield Ok(format_event(&chunk));
		yield Ok(done_event());
	}
}

/// Generate NDJSON → OpenAI SSE for `/v1/completions`.
fn completion_stream(
	response: reqwest::Response,
	id: String,
	created: i64,
	response_model: String,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> {
	async_stream::stream! {
		let lines = ndjson_lines(response);
		pin_mut!(lines);
		while let Some(line) = lines.next().await {
			let line = match line {
				Ok(l) => l,
				Err(e) => {
					yield Err(e);
					return;
				}
			};
			if line.trim().is_empty() {
				continue;
			}
			let data: Value = match serde_json::from_str(&line) {
				Ok(v) => v,
				Err(_) => continue,
			};
			if data.get("done").and_then(Value::as_bool).unwrap_or(false) {
				let chunk = json!({
					"id": id,
					"object": "text_completion",
					"created": created,
					"model": response_model,
					"choices": [{
						"text": "",
						"index": 0,
						"logprobs": Value::Null,
						"finish_reason": done_reason(&data),
					}],
				});
				yield Ok(format_event(&chunk));
				yield Ok(done_event());
				return;
			}
			let text = data.get("response").and_then(Value::as_str).unwrap_or_default();
			let chunk = json!({
				"id": id,
				"object": "text_completion",
				"created": created,
				"model": response_model,
				"choices": [{
					"text": text,
					"index": 0,
					"logprobs": Value::Null,
					"finish_reason": Value::Null,
				}],
			});
			yield Ok(format_event(&chunk));
		}
		let chunk = json!({
			"id": id,
			"object": "text_completion",
			"created": created,
			"model": response_model,
			"choices": [{"text": "", "index": 0, "logprobs": Value::Null, "finish_reason": "stop"}],
		});
		yield Ok(format_event(&chunk));
		yield Ok(done_event());
	}
}

/// Splits a chunked HTTP body into newline-delimited JSON lines, the
/// framing Ollama uses for both `/api/chat` and `/api/generate` streams.
fn ndjson_lines(
	response: reqwest::Response,
) -> impl futures::Stream<Item = Result<String, std::io::Error>> {
	let mut buf = Vec::new();
	let byte_stream = response.bytes_stream();
	async_stream::stream! {
		pin_mut!(byte_stream);
		loop {
			match byte_stream.next().await {
				Some(Ok(bytes)) => {
					buf.extend_from_slice(&bytes);
					while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
						let line_bytes: Vec<u8> = buf.drain(..=pos).collect();
						let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]).into_owned();
						yield Ok(line);
					}
				}
				Some(Err(e)) => {
					yield Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
					return;
				}
				None => {
					if !buf.is_empty() {
						let line = String::from_utf8_lossy(&buf).into_owned();
						yield Ok(line);
					}
					return;
				}
			}
		}
	}
}
