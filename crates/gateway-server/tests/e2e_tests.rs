//! End-to-end tests for the completions gateway.
//!
//! These tests drive the full router with mocked providers and an in-memory
//! store wrapped with call counters.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use bytes::Bytes;
use futures::{stream, StreamExt};
use gateway_core::{
    ApiKey, BufferedCompletion, ByteStream, CompletionParams, GatewayError, GatewayStore,
    LimitCheckResult, ModelConfig, ProviderResponse, StreamingCompletion, Usage, UsageCallback,
    UsageRecord,
};
use gateway_providers::ProviderTable;
use gateway_server::{create_router, AppState};
use gateway_store::MemoryStore;
use gateway_telemetry::RecordingErrorReporter;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const SECRET: &str = "sk-test-key";

// ============================================================================
// Collaborators
// ============================================================================

/// Memory store with call counters and failure switches
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    find_calls: AtomicUsize,
    limit_calls: AtomicUsize,
    model_calls: AtomicUsize,
    record_calls: AtomicUsize,
    fail_limits: bool,
    fail_records: bool,
}

impl CountingStore {
    fn records(&self) -> Vec<UsageRecord> {
        self.inner.usage_records()
    }

    async fn wait_for_records(&self, expected: usize) -> Vec<UsageRecord> {
        for _ in 0..100 {
            if self.record_calls.load(Ordering::SeqCst) >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.records()
    }
}

#[async_trait]
impl GatewayStore for CountingStore {
    async fn find_api_key(&self, secret: &str) -> Result<Option<ApiKey>, GatewayError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.find_api_key(secret).await
    }

    async fn get_authorized_models(&self, api_key_id: &str) -> Result<Vec<ModelConfig>, GatewayError> {
        self.model_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_authorized_models(api_key_id).await
    }

    async fn check_limits(&self, api_key_id: &str) -> Result<LimitCheckResult, GatewayError> {
        self.limit_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_limits {
            return Err(GatewayError::store("connection refused"));
        }
        self.inner.check_limits(api_key_id).await
    }

    async fn record_usage(&self, record: UsageRecord) -> Result<(), GatewayError> {
        let result = if self.fail_records {
            Err(GatewayError::store("usage table locked"))
        } else {
            self.inner.record_usage(record).await
        };
        self.record_calls.fetch_add(1, Ordering::SeqCst);
        result
    }
}

/// Buffered provider returning a fixed body
struct StaticProvider {
    body: Value,
    fail: bool,
    calls: AtomicUsize,
    seen: Mutex<Vec<CompletionParams>>,
}

impl StaticProvider {
    fn new(body: Value) -> Self {
        Self {
            body,
            fail: false,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Value::Null)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BufferedCompletion for StaticProvider {
    async fn complete(&self, params: CompletionParams) -> Result<ProviderResponse, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(params);
        if self.fail {
            return Err(GatewayError::provider("openai", "Upstream returned 503", Some(503)));
        }
        Ok(ProviderResponse::from_body(self.body.clone()))
    }
}

/// Streaming provider replaying a script
struct ScriptedStream {
    chunks: Vec<&'static str>,
    fail_after_chunks: bool,
    fail_to_open: bool,
    open_delay: Option<Duration>,
    endless: bool,
    usage_firings: Vec<Usage>,
    calls: AtomicUsize,
}

impl ScriptedStream {
    fn new(chunks: Vec<&'static str>) -> Self {
        Self {
            chunks,
            fail_after_chunks: false,
            fail_to_open: false,
            open_delay: None,
            endless: false,
            usage_firings: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StreamingCompletion for ScriptedStream {
    async fn complete_stream(
        &self,
        _params: CompletionParams,
        on_usage: UsageCallback,
    ) -> Result<ByteStream, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_to_open {
            return Err(GatewayError::provider("openai", "connection reset", None));
        }

        for usage in &self.usage_firings {
            on_usage(*usage);
        }

        let mut items: Vec<Result<Bytes, GatewayError>> = self
            .chunks
            .iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect();
        if self.fail_after_chunks {
            items.push(Err(GatewayError::streaming("upstream hung up")));
            items.push(Ok(Bytes::from_static(b"never relayed")));
        }

        if self.endless {
            let ticks = stream::unfold((), |()| async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Some((Ok(Bytes::from_static(b"tick")), ()))
            });
            return Ok(Box::pin(stream::iter(items).chain(ticks)));
        }

        Ok(Box::pin(stream::iter(items)))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

struct Harness {
    store: Arc<CountingStore>,
    reporter: RecordingErrorReporter,
    providers: ProviderTable,
}

impl Harness {
    fn new() -> Self {
        Self::with_store(CountingStore::default(), Some(1_000_000))
    }

    fn with_store(store: CountingStore, token_limit: Option<u64>) -> Self {
        store.inner.insert_project("proj-1", token_limit);
        store.inner.insert_model(ModelConfig::new("m-openai", "gpt-4o", "openai"));
        store.inner.insert_model(ModelConfig::new("m-azure", "gpt-4o", "azure"));
        store.inner.insert_model(ModelConfig::new("m-mistral", "mistral-large", "mistral"));
        store.inner.insert_model(ModelConfig::new("m-hidden", "o1", "openai"));
        store
            .inner
            .insert_api_key(
                SECRET,
                ApiKey {
                    id: "key-1".to_string(),
                    project_id: "proj-1".to_string(),
                    owner_id: "user-1".to_string(),
                    name: Some("ci".to_string()),
                },
                vec![
                    "m-openai".to_string(),
                    "m-azure".to_string(),
                    "m-mistral".to_string(),
                ],
            )
            .expect("seed key");

        Self {
            store: Arc::new(store),
            reporter: RecordingErrorReporter::new(),
            providers: ProviderTable::new(),
        }
    }

    fn app(&self) -> axum::Router {
        let state = AppState::builder()
            .store(self.store.clone())
            .providers(self.providers.clone())
            .reporter(Arc::new(self.reporter.clone()))
            .build()
            .expect("state");
        create_router(state)
    }
}

fn completion_request(body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {SECRET}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn hinted_request(body: &Value, provider: &str) -> Request<Body> {
    let mut request = completion_request(body);
    request
        .headers_mut()
        .insert("x-llm-provider", provider.parse().unwrap());
    request
}

fn hello(model: &str) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": "Hello"}]
    })
}

fn hello_stream(model: &str) -> Value {
    let mut body = hello(model);
    body["stream"] = json!(true);
    body
}

async fn body_bytes(response: axum::response::Response) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// ============================================================================
// Access guard
// ============================================================================

#[cfg(test)]
mod access_guard_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_credential_short_circuits() {
        let mut harness = Harness::new();
        let provider = Arc::new(StaticProvider::new(json!({})));
        harness.providers.register_buffered("openai", provider.clone());

        let mut request = completion_request(&hello("gpt-4o"));
        request.headers_mut().remove(header::AUTHORIZATION);

        let response = harness.app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(harness.store.limit_calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.store.model_calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.calls(), 0);
        assert_eq!(body_json(response).await["error"], "Missing API key");
    }

    #[tokio::test]
    async fn test_invalid_credential_short_circuits() {
        let mut harness = Harness::new();
        let provider = Arc::new(StaticProvider::new(json!({})));
        harness.providers.register_buffered("openai", provider.clone());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/chat/completions")
            .header(header::AUTHORIZATION, "Bearer sk-wrong")
            .body(Body::from(hello("gpt-4o").to_string()))
            .unwrap();

        let response = harness.app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(harness.store.find_calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.store.limit_calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_authentication_precedes_validation() {
        let harness = Harness::new();

        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/chat/completions")
            .body(Body::from("{not json"))
            .unwrap();

        let response = harness.app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_api_key_header_is_accepted() {
        let mut harness = Harness::new();
        harness
            .providers
            .register_buffered("openai", Arc::new(StaticProvider::new(json!({"id": "x"}))));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/chat/completions")
            .header("x-api-key", SECRET)
            .body(Body::from(hello("gpt-4o").to_string()))
            .unwrap();

        let response = harness.app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_reached_limit_returns_429_without_provider_call() {
        let mut harness = Harness::with_store(CountingStore::default(), Some(0));
        let provider = Arc::new(StaticProvider::new(json!({})));
        harness.providers.register_buffered("openai", provider.clone());

        let response = harness
            .app()
            .oneshot(completion_request(&hello("gpt-4o")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(provider.calls(), 0);
        assert_eq!(harness.store.model_calls.load(Ordering::SeqCst), 0);

        let json = body_json(response).await;
        assert_eq!(json["error"], "You have reached the price limit");
        assert!(json.get("details").is_none());
    }

    #[tokio::test]
    async fn test_limit_calculation_failure_returns_500() {
        let store = CountingStore {
            fail_limits: true,
            ..CountingStore::default()
        };
        let mut harness = Harness::with_store(store, None);
        let provider = Arc::new(StaticProvider::new(json!({})));
        harness.providers.register_buffered("openai", provider.clone());

        let response = harness
            .app()
            .oneshot(completion_request(&hello("gpt-4o")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(provider.calls(), 0);

        let json = body_json(response).await;
        assert_eq!(
            json["error"],
            "Something went wrong while calculating the current limits."
        );
        assert!(json["details"].as_str().unwrap().contains("connection refused"));
    }
}

// ============================================================================
// Schema validation
// ============================================================================

#[cfg(test)]
mod validation_tests {
    use super::*;

    /// Schema failures answer 404, not 400, for compatibility with existing
    /// clients.
    #[tokio::test]
    async fn test_schema_failure_keeps_404_status() {
        let harness = Harness::new();

        let response = harness
            .app()
            .oneshot(completion_request(&json!({
                "model": "gpt-4o",
                "messages": [{"role": "tool", "content": "Hello"}]
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Bad request");
        assert_eq!(json["details"][0]["path"], "messages.0.role");
    }

    #[tokio::test]
    async fn test_schema_failure_skips_limit_check() {
        let harness = Harness::new();

        let response = harness
            .app()
            .oneshot(completion_request(&json!({"messages": []})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(harness.store.limit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cross_tag_content_part_rejected() {
        let harness = Harness::new();

        let response = harness
            .app()
            .oneshot(completion_request(&json!({
                "model": "gpt-4o",
                "messages": [{
                    "role": "user",
                    "content": [{"type": "text", "text": "hi", "image_url": {"url": "https://x"}}]
                }]
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_string_and_text_part_content_are_equivalent() {
        let mut harness = Harness::new();
        let provider = Arc::new(StaticProvider::new(json!({"id": "chatcmpl-1"})));
        harness.providers.register_buffered("openai", provider.clone());
        let app = harness.app();

        let plain = hello("gpt-4o");
        let parts = json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": [{"type": "text", "text": "Hello"}]}]
        });

        for body in [&plain, &parts] {
            let response = app.clone().oneshot(completion_request(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let seen = provider.seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[0].messages[0].content.to_parts(),
            seen[1].messages[0].content.to_parts()
        );
    }

    #[tokio::test]
    async fn test_defaults_reach_provider() {
        let mut harness = Harness::new();
        let provider = Arc::new(StaticProvider::new(json!({})));
        harness.providers.register_buffered("openai", provider.clone());

        let mut body = hello("gpt-4o");
        body["temperature"] = json!("0.9");
        body["max_tokens"] = Value::Null;

        let response = harness.app().oneshot(completion_request(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let seen = provider.seen.lock();
        assert!((seen[0].temperature - 0.9).abs() < f64::EPSILON);
        assert_eq!(seen[0].max_tokens, None);
        assert_eq!(seen[0].model, "gpt-4o");
    }
}

// ============================================================================
// Provider resolution
// ============================================================================

#[cfg(test)]
mod resolution_tests {
    use super::*;

    fn harness_with_two_gpt4o() -> (Harness, Arc<StaticProvider>, Arc<StaticProvider>) {
        let mut harness = Harness::new();
        let openai = Arc::new(StaticProvider::new(json!({"served_by": "openai"})));
        let azure = Arc::new(StaticProvider::new(json!({"served_by": "azure"})));
        harness.providers.register_buffered("openai", openai.clone());
        harness.providers.register_buffered("azure", azure.clone());
        (harness, openai, azure)
    }

    #[tokio::test]
    async fn test_first_authorized_match_without_hint() {
        let (harness, openai, azure) = harness_with_two_gpt4o();

        let response = harness
            .app()
            .oneshot(completion_request(&hello("gpt-4o")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["served_by"], "openai");
        assert_eq!(openai.calls(), 1);
        assert_eq!(azure.calls(), 0);
    }

    #[tokio::test]
    async fn test_hint_selects_provider() {
        let (harness, openai, azure) = harness_with_two_gpt4o();

        let response = harness
            .app()
            .oneshot(hinted_request(&hello("gpt-4o"), "azure"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["served_by"], "azure");
        assert_eq!(openai.calls(), 0);
        assert_eq!(azure.calls(), 1);
    }

    #[tokio::test]
    async fn test_unmatched_hint_mentions_provider() {
        let (harness, openai, azure) = harness_with_two_gpt4o();

        let response = harness
            .app()
            .oneshot(hinted_request(&hello("gpt-4o"), "groq"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await["error"],
            "No model with name gpt-4o found. Requested Provider: groq"
        );
        assert_eq!(openai.calls() + azure.calls(), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_model_is_not_found() {
        let (harness, _, _) = harness_with_two_gpt4o();

        // "o1" exists in the store but is not authorized for this key
        let response = harness
            .app()
            .oneshot(completion_request(&hello("o1")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await["error"],
            "No model with name o1 found."
        );
    }

    #[tokio::test]
    async fn test_missing_function_for_mode_returns_400() {
        let (harness, _, _) = harness_with_two_gpt4o();

        let response = harness
            .app()
            .oneshot(completion_request(&hello_stream("gpt-4o")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "Could not find a callback function for the provider openai."
        );
    }

    #[tokio::test]
    async fn test_unregistered_provider_returns_400() {
        let (harness, _, _) = harness_with_two_gpt4o();

        let response = harness
            .app()
            .oneshot(completion_request(&hello("mistral-large")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

// ============================================================================
// Buffered dispatch
// ============================================================================

#[cfg(test)]
mod buffered_tests {
    use super::*;

    fn completion_body() -> Value {
        json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hi there"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
    }

    #[tokio::test]
    async fn test_body_relayed_and_usage_recorded_once() {
        let mut harness = Harness::new();
        harness
            .providers
            .register_buffered("openai", Arc::new(StaticProvider::new(completion_body())));

        let response = harness
            .app()
            .oneshot(completion_request(&hello("gpt-4o")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, completion_body());

        let records = harness.store.wait_for_records(1).await;
        assert_eq!(
            records,
            vec![UsageRecord {
                project_id: "proj-1".to_string(),
                api_key_id: "key-1".to_string(),
                model_id: "m-openai".to_string(),
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }]
        );
    }

    #[tokio::test]
    async fn test_no_usage_means_no_record() {
        let mut harness = Harness::new();
        harness
            .providers
            .register_buffered("openai", Arc::new(StaticProvider::new(json!({"id": "x"}))));

        let response = harness
            .app()
            .oneshot(completion_request(&hello("gpt-4o")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(harness.store.record_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_recording_failure_is_reported_not_returned() {
        let store = CountingStore {
            fail_records: true,
            ..CountingStore::default()
        };
        let mut harness = Harness::with_store(store, None);
        harness
            .providers
            .register_buffered("openai", Arc::new(StaticProvider::new(completion_body())));

        let response = harness
            .app()
            .oneshot(completion_request(&hello("gpt-4o")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, completion_body());

        harness.store.wait_for_records(1).await;
        for _ in 0..50 {
            if !harness.reporter.reports().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let reports = harness.reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].context, "usage_recording");
    }

    #[tokio::test]
    async fn test_provider_failure_returns_502() {
        let mut harness = Harness::new();
        harness
            .providers
            .register_buffered("openai", Arc::new(StaticProvider::failing()));

        let response = harness
            .app()
            .oneshot(completion_request(&hello("gpt-4o")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert_eq!(json["details"]["status"], 503);
        assert_eq!(harness.store.record_calls.load(Ordering::SeqCst), 0);
    }
}

// ============================================================================
// Streaming dispatch
// ============================================================================

#[cfg(test)]
mod streaming_tests {
    use super::*;

    async fn run_stream(harness: &Harness) -> (axum::http::HeaderMap, String) {
        let response = harness
            .app()
            .oneshot(completion_request(&hello_stream("gpt-4o")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers().clone();
        let body = tokio::time::timeout(Duration::from_secs(5), body_bytes(response))
            .await
            .expect("stream terminates");
        (headers, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_chunks_relayed_in_order_then_done() {
        let mut harness = Harness::new();
        let provider = Arc::new(ScriptedStream::new(vec!["A", "B", "C"]));
        harness.providers.register_streaming("openai", provider.clone());

        let (headers, body) = run_stream(&harness).await;

        assert_eq!(
            headers[header::CONTENT_TYPE],
            "text/event-stream; charset=utf-8"
        );
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::CONNECTION], "keep-alive");
        assert_eq!(body, "data: A\ndata: B\ndata: C\n[DONE]");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_after_first_chunk_still_terminates() {
        let mut harness = Harness::new();
        let provider = ScriptedStream {
            fail_after_chunks: true,
            ..ScriptedStream::new(vec!["A"])
        };
        harness.providers.register_streaming("openai", Arc::new(provider));

        let (_, body) = run_stream(&harness).await;

        assert_eq!(body, "data: A\n[DONE]");
        let reports = harness.reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].context, "stream_relay");
    }

    #[tokio::test]
    async fn test_open_failure_still_commits_and_terminates() {
        let mut harness = Harness::new();
        let provider = ScriptedStream {
            fail_to_open: true,
            ..ScriptedStream::new(vec![])
        };
        harness.providers.register_streaming("openai", Arc::new(provider));

        let (headers, body) = run_stream(&harness).await;

        assert_eq!(
            headers[header::CONTENT_TYPE],
            "text/event-stream; charset=utf-8"
        );
        assert_eq!(body, "[DONE]");
        assert_eq!(harness.reporter.reports()[0].context, "stream_open");
    }

    #[tokio::test]
    async fn test_each_usage_callback_produces_a_record() {
        let mut harness = Harness::new();
        let provider = ScriptedStream {
            usage_firings: vec![Usage::new(3, 4, 7), Usage::new(3, 4, 7)],
            ..ScriptedStream::new(vec!["A"])
        };
        harness.providers.register_streaming("openai", Arc::new(provider));

        let (_, body) = run_stream(&harness).await;
        assert_eq!(body, "data: A\n[DONE]");

        let records = harness.store.wait_for_records(2).await;
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.total_tokens == 7 && r.model_id == "m-openai" && r.api_key_id == "key-1"));
    }

    #[tokio::test]
    async fn test_no_usage_callback_means_no_record() {
        let mut harness = Harness::new();
        harness
            .providers
            .register_streaming("openai", Arc::new(ScriptedStream::new(vec!["A", "B"])));

        let (_, body) = run_stream(&harness).await;
        assert_eq!(body, "data: A\ndata: B\n[DONE]");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(harness.store.records().is_empty());
    }

    #[tokio::test]
    async fn test_headers_sent_before_provider_opens() {
        let mut harness = Harness::new();
        let provider = ScriptedStream {
            open_delay: Some(Duration::from_millis(300)),
            ..ScriptedStream::new(vec!["A", "B"])
        };
        harness.providers.register_streaming("openai", Arc::new(provider));

        let response = tokio::time::timeout(
            Duration::from_millis(150),
            harness
                .app()
                .oneshot(completion_request(&hello_stream("gpt-4o"))),
        )
        .await
        .expect("headers arrive before the provider opens")
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream; charset=utf-8"
        );

        let body = tokio::time::timeout(Duration::from_secs(5), body_bytes(response))
            .await
            .expect("stream terminates");
        assert_eq!(body, Bytes::from_static(b"data: A\ndata: B\n[DONE]"));
    }

    #[tokio::test]
    async fn test_client_disconnect_terminates_relay() {
        let mut harness = Harness::new();
        let provider = ScriptedStream {
            endless: true,
            ..ScriptedStream::new(vec!["A"])
        };
        harness.providers.register_streaming("openai", Arc::new(provider));
        let app = harness.app();

        let response = app
            .clone()
            .oneshot(completion_request(&hello_stream("gpt-4o")))
            .await
            .unwrap();
        let mut body = response.into_body();
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .expect("first frame")
            .expect("frame present")
            .expect("frame ok");
        assert_eq!(frame.into_data().ok(), Some(Bytes::from_static(b"data: A\n")));
        drop(body);

        let expected = "gateway_stream_terminations_total{outcome=\"client_disconnected\"} 1";
        let mut text = String::new();
        for _ in 0..100 {
            let response = app
                .clone()
                .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
                .await
                .unwrap();
            text = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
            if text.contains(expected) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(text.contains(expected), "metrics: {text}");
        assert!(harness.reporter.reports().is_empty());
    }

    #[tokio::test]
    async fn test_stream_metrics_exported() {
        let mut harness = Harness::new();
        harness
            .providers
            .register_streaming("openai", Arc::new(ScriptedStream::new(vec!["A"])));
        let app = harness.app();

        let response = app
            .clone()
            .oneshot(completion_request(&hello_stream("gpt-4o")))
            .await
            .unwrap();
        body_bytes(response).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let text = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
        assert!(text.contains("gateway_stream_terminations_total"));
        assert!(text.contains("completed"));
    }
}

// ============================================================================
// Model listing
// ============================================================================

#[cfg(test)]
mod models_endpoint_tests {
    use super::*;

    #[tokio::test]
    async fn test_lists_authorized_models_without_ids() {
        let harness = Harness::new();

        let request = Request::builder()
            .method(Method::GET)
            .uri("/v1/models")
            .header(header::AUTHORIZATION, format!("Bearer {SECRET}"))
            .body(Body::empty())
            .unwrap();

        let response = harness.app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["object"], "list");
        assert_eq!(
            json["data"],
            json!([
                {"id": "gpt-4o", "object": "model", "owned_by": "openai"},
                {"id": "gpt-4o", "object": "model", "owned_by": "azure"},
                {"id": "mistral-large", "object": "model", "owned_by": "mistral"}
            ])
        );
        assert!(!json.to_string().contains("m-openai"));
    }
}

// ============================================================================
// Real provider over HTTP
// ============================================================================

#[cfg(test)]
mod openai_compatible_tests {
    use super::*;
    use gateway_providers::{OpenAICompatibleConfig, OpenAICompatibleProvider};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_stream_through_openai_compatible_provider() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":1,\"total_tokens\":6}}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let provider = OpenAICompatibleProvider::new(OpenAICompatibleConfig::new(
            "openai",
            format!("{}/v1", server.uri()),
        ))
        .expect("provider");

        let mut harness = Harness::new();
        harness.providers.register("openai", Arc::new(provider));

        let response = harness
            .app()
            .oneshot(completion_request(&hello_stream("gpt-4o")))
            .await
            .unwrap();
        let body = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();

        assert_eq!(
            body,
            concat!(
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n",
                "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":1,\"total_tokens\":6}}\n",
                "[DONE]"
            )
        );

        let records = harness.store.wait_for_records(1).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].total_tokens, 6);
    }
}
