use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use llm_gateway::config::{Backend, RateLimitStore, Settings, TokenConfig};
use llm_gateway::metrics::GatewayMetrics;
use llm_gateway::router;
use llm_gateway::state::GatewayState;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn test_app(ollama_base_url: String) -> Router {
	let settings = Settings {
		host: "127.0.0.1".to_string(),
		port: 0,
		default_backend: Backend::Ollama,
		ollama_base_url: Some(ollama_base_url),
		vllm_base_url: None,
		tokens: vec![TokenConfig {
			token: "test-token".to_string(),
			label: "test".to_string(),
			rpm: 5,
			rpd: 10,
		}],
		rate_limit_store: RateLimitStore::Memory,
		redis_url: None,
		max_body_bytes: 1_000_000,
		model_cache_ttl: Duration::from_secs(60),
		backend_timeout: Duration::from_secs(5),
	};
	let mut registry = prometheus_client::registry::Registry::default();
	let metrics = GatewayMetrics::new(&mut registry);
	let state = GatewayState::build(settings, metrics).await.unwrap();
	router::app(state)
}

async fn body_json(response: axum::response::Response) -> Value {
	let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
	serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_token_returns_401() {
	let app = test_app("http://localhost:11434".to_string()).await;
	let request = Request::post("/v1/chat/completions")
		.header("content-type", "application/json")
		.body(Body::from(
			json!({"model": "ollama:test", "messages": []}).to_string(),
		))
		.unwrap();
	let response = app.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	let body = body_json(response).await;
	assert_eq!(body["error"]["type"], "authentication_error");
}

#[tokio::test]
async fn invalid_token_returns_401() {
	let app = test_app("http://localhost:11434".to_string()).await;
	let request = Request::post("/v1/chat/completions")
		.header("content-type", "application/json")
		.header("authorization", "Bearer wrong")
		.body(Body::from(
			json!({"model": "ollama:test", "messages": [{"role": "user", "content": "hi"}]}).to_string(),
		))
		.unwrap();
	let response = app.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_token_chat_completion_round_trips_through_ollama() {
	let mock_server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/api/chat"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"model": "test",
			"created_at": "2024-01-01T00:00:00Z",
			"message": {"role": "assistant", "content": "hi"},
			"done": true,
			"done_reason": "stop",
			"eval_count": 3,
			"prompt_eval_count": 2,
		})))
		.mount(&mock_server)
		.await;

	let app = test_app(mock_server.uri()).await;
	let request = Request::post("/v1/chat/completions")
		.header("content-type", "application/json")
		.header("authorization", "Bearer test-token")
		.body(Body::from(
			json!({"model": "ollama:test", "messages": [{"role": "user", "content": "hi"}]}).to_string(),
		))
		.unwrap();
	let response = app.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let body = body_json(response).await;
	assert_eq!(body["choices"][0]["message"]["content"], "hi");
	assert_eq!(body["usage"]["total_tokens"], 5);
}

#[tokio::test]
async fn rate_limit_exceeded_returns_429() {
	let mock_server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/api/chat"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"message": {"role": "assistant", "content": "hi"},
			"done": true,
		})))
		.mount(&mock_server)
		.await;

	let app = test_app(mock_server.uri()).await;
	for _ in 0..5 {
		let request = Request::post("/v1/chat/completions")
			.header("content-type", "application/json")
			.header("authorization", "Bearer test-token")
			.body(Body::from(
				json!({"model": "ollama:test", "messages": [{"role": "user", "content": "hi"}]}).to_string(),
			))
			.unwrap();
		let response = app.clone().oneshot(request).await.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
	}

	let request = Request::post("/v1/chat/completions")
		.header("content-type", "application/json")
		.header("authorization", "Bearer test-token")
		.body(Body::from(
			json!({"model": "ollama:test", "messages": [{"role": "user", "content": "hi"}]}).to_string(),
		))
		.unwrap();
	let response = app.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
	let body = body_json(response).await;
	assert_eq!(body["error"]["type"], "rate_limit_exceeded");
}

#[tokio::test]
async fn backend_failure_still_carries_admission_headers() {
	let mock_server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/api/chat"))
		.respond_with(ResponseTemplate::new(500))
		.mount(&mock_server)
		.await;

	let app = test_app(mock_server.uri()).await;
	let request = Request::post("/v1/chat/completions")
		.header("content-type", "application/json")
		.header("authorization", "Bearer test-token")
		.body(Body::from(
			json!({"model": "ollama:test", "messages": [{"role": "user", "content": "hi"}]}).to_string(),
		))
		.unwrap();
	let response = app.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
	assert_eq!(response.headers().get("x-proxy-backend").unwrap(), "ollama");
	assert_eq!(
		response.headers().get("x-ratelimit-remaining-minute").unwrap(),
		"4"
	);
	assert_eq!(response.headers().get("x-ratelimit-limit-minute").unwrap(), "5");
	let body = body_json(response).await;
	assert_eq!(body["error"]["type"], "backend_error");
}

#[tokio::test]
async fn streaming_chat_completion_ends_with_done_sentinel() {
	let mock_server = MockServer::start().await;
	let ndjson = concat!(
		"{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":false}\n",
		"{\"message\":{\"role\":\"assistant\",\"content\":\"hi\"},\"done\":false}\n",
		"{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"done_reason\":\"stop\"}\n",
	);
	Mock::given(method("POST"))
		.and(path("/api/chat"))
		.respond_with(ResponseTemplate::new(200).set_body_string(ndjson))
		.mount(&mock_server)
		.await;

	let app = test_app(mock_server.uri()).await;
	let request = Request::post("/v1/chat/completions")
		.header("content-type", "application/json")
		.header("authorization", "Bearer test-token")
		.body(Body::from(
			json!({"model": "ollama:test", "messages": [{"role": "user", "content": "hi"}], "stream": true})
				.to_string(),
		))
		.unwrap();
	let response = app.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(
		response.headers().get("content-type").unwrap(),
		"text/event-stream"
	);
	let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
	let text = String::from_utf8(bytes.to_vec()).unwrap();
	assert!(text.trim_end().ends_with("data: [DONE]"));
	let chunks: Vec<&str> = text
		.split("\n\n")
		.filter(|s| !s.is_empty() && *s != "data: [DONE]")
		.collect();
	assert!(chunks.iter().any(|c| {
		let json: Value = serde_json::from_str(c.trim_start_matches("data: ")).unwrap();
		json["choices"][0]["finish_reason"] == "stop"
	}));
	assert!(chunks.iter().all(|c| {
		let json: Value = serde_json::from_str(c.trim_start_matches("data: ")).unwrap();
		json["object"] == "chat.completion.chunk"
	}));
}

#[tokio::test]
async fn body_exceeding_max_bytes_returns_413() {
	let settings = Settings {
		host: "127.0.0.1".to_string(),
		port: 0,
		default_backend: Backend::Ollama,
		ollama_base_url: Some("http://localhost:11434".to_string()),
		vllm_base_url: None,
		tokens: vec![TokenConfig {
			token: "test-token".to_string(),
			label: "test".to_string(),
			rpm: 50,
			rpd: 100,
		}],
		rate_limit_store: RateLimitStore::Memory,
		redis_url: None,
		max_body_bytes: 16,
		model_cache_ttl: Duration::from_secs(60),
		backend_timeout: Duration::from_secs(5),
	};
	let mut registry = prometheus_client::registry::Registry::default();
	let metrics = GatewayMetrics::new(&mut registry);
	let state = GatewayState::build(settings, metrics).await.unwrap();
	let app = router::app(state);

	let payload = json!({"model": "ollama:test", "messages": [{"role": "user", "content": "hi"}]}).to_string();
	let request = Request::post("/v1/chat/completions")
		.header("content-type", "application/json")
		.header("authorization", "Bearer test-token")
		.header("content-length", payload.len().to_string())
		.body(Body::from(payload))
		.unwrap();
	let response = app.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
	let body = body_json(response).await;
	assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn backend_selection_by_prefix_routes_to_vllm() {
	let mock_server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/v1/chat/completions"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"id": "chatcmpl-abc",
			"object": "chat.completion",
			"created": 0,
			"model": "mistral",
			"choices": [{"index": 0, "message": {"role": "assistant", "content": "hi"}, "finish_reason": "stop"}],
		})))
		.mount(&mock_server)
		.await;

	let settings = Settings {
		host: "127.0.0.1".to_string(),
		port: 0,
		default_backend: Backend::Ollama,
		ollama_base_url: Some("http://localhost:11434".to_string()),
		vllm_base_url: Some(mock_server.uri()),
		tokens: vec![TokenConfig {
			token: "test-token".to_string(),
			label: "test".to_string(),
			rpm: 50,
			rpd: 100,
		}],
		rate_limit_store: RateLimitStore::Memory,
		redis_url: None,
		max_body_bytes: 1_000_000,
		model_cache_ttl: Duration::from_secs(60),
		backend_timeout: Duration::from_secs(5),
	};
	let mut registry = prometheus_client::registry::Registry::default();
	let metrics = GatewayMetrics::new(&mut registry);
	let state = GatewayState::build(settings, metrics).await.unwrap();
	let app = router::app(state);

	let request = Request::post("/v1/chat/completions")
		.header("content-type", "application/json")
		.header("authorization", "Bearer test-token")
		.body(Body::from(
			json!({"model": "vllm:mistral", "messages": [{"role": "user", "content": "hi"}]}).to_string(),
		))
		.unwrap();
	let response = app.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(response.headers().get("x-proxy-backend").unwrap(), "vllm");
}
