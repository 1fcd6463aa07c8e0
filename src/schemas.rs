use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GatewayError;

/// Either a single string or a sequence of strings — the shape `prompt`
/// and `input` are allowed to take per spec §3.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StringOrArray {
	String(String),
	Array(Vec<String>),
}

impl StringOrArray {
	pub fn is_array(&self) -> bool {
		matches!(self, StringOrArray::Array(_))
	}

	pub fn char_len(&self) -> usize {
		match self {
			StringOrArray::String(s) => s.len(),
			StringOrArray::Array(items) => items.iter().map(|s| s.len()).sum(),
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
	pub role: String,
	pub content: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
	pub model: String,
	pub messages: Vec<ChatMessage>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f64>,
	#[serde(default)]
	pub stream: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stop: Option<StringOrArray>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub seed: Option<i64>,
}

impl ChatCompletionRequest {
	pub fn validate(&self) -> Result<(), GatewayError> {
		if self.messages.is_empty() {
			return Err(GatewayError::invalid_request("messages must be non-empty"));
		}
		Ok(())
	}

	pub fn prompt_chars(&self) -> usize {
		self.messages.iter().map(|m| m.content.len()).sum()
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionRequest {
	pub model: String,
	pub prompt: StringOrArray,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f64>,
	#[serde(default)]
	pub stream: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stop: Option<StringOrArray>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub seed: Option<i64>,
}

impl CompletionRequest {
	pub fn validate(&self) -> Result<(), GatewayError> {
		match &self.prompt {
			StringOrArray::String(s) if s.is_empty() => {
				Err(GatewayError::invalid_request("prompt must be non-empty"))
			},
			_ => Ok(()),
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingRequest {
	pub model: String,
	pub input: StringOrArray,
}

impl EmbeddingRequest {
	pub fn validate(&self) -> Result<(), GatewayError> {
		match &self.input {
			StringOrArray::String(s) if s.is_empty() => {
				Err(GatewayError::invalid_request("input must be non-empty"))
			},
			StringOrArray::Array(items) if items.is_empty() => {
				Err(GatewayError::invalid_request("input must be non-empty"))
			},
			_ => Ok(()),
		}
	}
}

/// Converts a validated request into the generic `map` the dispatcher
/// rewrites before handing it to an adapter (spec §4.1 step 6): the
/// client-supplied `model` is swapped for the resolved backend model,
/// and `response_model` is stamped with the original client-visible
/// string so translating adapters can echo it back.
pub fn build_backend_payload(
	mut value: Value,
	backend_model: &str,
	response_model: &str,
) -> Map<String, Value> {
	if let Value::Object(ref mut map) = value {
		map.insert("model".to_string(), Value::String(backend_model.to_string()));
		map.insert(
			"response_model".to_string(),
			Value::String(response_model.to_string()),
		);
		std::mem::take(map)
	} else {
		Map::new()
	}
}
