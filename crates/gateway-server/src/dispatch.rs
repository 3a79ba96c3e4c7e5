//! Completion dispatch.
//!
//! Buffered mode returns the provider body verbatim. Streaming mode commits
//! an event-stream response up front and relays provider chunks to it from a
//! spawned task:
//!
//! ```text
//! Idle -> HeadersSent -> Relaying -> Terminated
//!              \______________________/
//!               (provider never opened)
//! ```
//!
//! Every path ends by writing `[DONE]` and closing the body exactly once.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::StreamExt;
use gateway_core::{
    BufferedCompletion, CompletionMode, CompletionParams, GatewayError, StreamingCompletion,
};
use gateway_telemetry::{ErrorReporter, Metrics, StreamOutcome};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument};

use crate::usage::{UsageContext, UsageRecorder};

/// Terminal marker written after the last relayed chunk
pub const STREAM_TERMINATOR: &[u8] = b"[DONE]";

/// Event-stream content type
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream; charset=utf-8";

/// Lifecycle of one streamed response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamLifecycle {
    /// Nothing committed yet
    Idle,
    /// Status and headers committed
    HeadersSent,
    /// Provider stream open, chunks flowing
    Relaying,
    /// Terminator written (or client gone), body closed
    Terminated,
}

/// Runs completions in either mode
#[derive(Clone)]
pub struct CompletionDispatcher {
    recorder: UsageRecorder,
    metrics: Metrics,
    reporter: Arc<dyn ErrorReporter>,
    stream_buffer: usize,
}

impl CompletionDispatcher {
    /// Create a dispatcher
    pub fn new(
        recorder: UsageRecorder,
        metrics: Metrics,
        reporter: Arc<dyn ErrorReporter>,
        stream_buffer: usize,
    ) -> Self {
        Self {
            recorder,
            metrics,
            reporter,
            stream_buffer: stream_buffer.max(1),
        }
    }

    /// Call a buffered function and return its body verbatim.
    ///
    /// Usage, when present, is recorded on a background task once the
    /// response is built.
    pub async fn buffered(
        &self,
        function: Arc<dyn BufferedCompletion>,
        params: CompletionParams,
        context: UsageContext,
    ) -> Result<Response, GatewayError> {
        let result = function.complete(params).await;
        self.metrics
            .record_completion(&context.provider, CompletionMode::Buffered, result.is_ok());

        let completion = result?;
        let response = (StatusCode::OK, Json(completion.body)).into_response();

        match completion.usage {
            Some(usage) => {
                self.recorder.spawn_record(context, usage);
            }
            None => debug!(provider = %context.provider, "Response carried no usage"),
        }

        Ok(response)
    }

    /// Commit an event-stream response and relay the provider stream into it
    pub fn streaming(
        &self,
        function: Arc<dyn StreamingCompletion>,
        params: CompletionParams,
        context: UsageContext,
    ) -> Response {
        let (tx, rx) = mpsc::channel(self.stream_buffer);
        let response = event_stream_response(rx);

        let mut relay = StreamRelay {
            tx,
            state: StreamLifecycle::Idle,
            provider: context.provider.clone(),
            metrics: self.metrics.clone(),
            reporter: self.reporter.clone(),
        };
        relay.advance(StreamLifecycle::HeadersSent);

        let on_usage = self.recorder.callback(context);
        tokio::spawn(relay.run(function, params, on_usage).in_current_span());

        response
    }
}

impl std::fmt::Debug for CompletionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionDispatcher")
            .field("stream_buffer", &self.stream_buffer)
            .finish_non_exhaustive()
    }
}

/// 200 response whose body is fed by `rx` and ends when every sender drops
fn event_stream_response(mut rx: mpsc::Receiver<Bytes>) -> Response {
    let body = async_stream::stream! {
        while let Some(chunk) = rx.recv().await {
            yield Ok::<_, Infallible>(chunk);
        }
    };

    let mut response = Response::new(Body::from_stream(body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(EVENT_STREAM_CONTENT_TYPE),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

/// `data: <chunk>\n`
fn data_line(chunk: &[u8]) -> Bytes {
    let mut line = Vec::with_capacity(chunk.len() + 7);
    line.extend_from_slice(b"data: ");
    line.extend_from_slice(chunk);
    line.push(b'\n');
    Bytes::from(line)
}

/// Relay side of one streamed response
struct StreamRelay {
    tx: mpsc::Sender<Bytes>,
    state: StreamLifecycle,
    provider: String,
    metrics: Metrics,
    reporter: Arc<dyn ErrorReporter>,
}

impl StreamRelay {
    fn advance(&mut self, next: StreamLifecycle) {
        debug!(from = ?self.state, to = ?next, "Stream lifecycle");
        self.state = next;
    }

    async fn run(
        mut self,
        function: Arc<dyn StreamingCompletion>,
        params: CompletionParams,
        on_usage: gateway_core::UsageCallback,
    ) {
        let mut stream = match function.complete_stream(params, on_usage).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(provider = %self.provider, error = %e, "Provider stream failed to open");
                self.reporter.report("stream_open", &e);
                self.terminate(StreamOutcome::ProviderFailed).await;
                return;
            }
        };

        self.advance(StreamLifecycle::Relaying);

        let outcome = loop {
            match stream.next().await {
                None => break StreamOutcome::Completed,
                Some(Ok(chunk)) => {
                    if self.tx.send(data_line(&chunk)).await.is_err() {
                        info!(provider = %self.provider, "Client disconnected mid-stream");
                        break StreamOutcome::ClientDisconnected;
                    }
                }
                Some(Err(e)) => {
                    warn!(provider = %self.provider, error = %e, "Provider stream failed");
                    self.reporter.report("stream_relay", &e);
                    break StreamOutcome::ProviderFailed;
                }
            }
        };

        self.terminate(outcome).await;
    }

    /// Write the terminator and close the body. Consumes the relay so it can
    /// only happen once.
    async fn terminate(mut self, outcome: StreamOutcome) {
        if self.tx.send(Bytes::from_static(STREAM_TERMINATOR)).await.is_err() {
            debug!(provider = %self.provider, "Client gone before terminator");
        }

        self.advance(StreamLifecycle::Terminated);
        self.metrics.record_completion(
            &self.provider,
            CompletionMode::Streaming,
            outcome != StreamOutcome::ProviderFailed,
        );
        self.metrics.record_stream_termination(outcome);
    }
}
