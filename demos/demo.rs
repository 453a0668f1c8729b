use axum::{
    body::Body,
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::Serialize;
use sightline::{
    error::Phase,
    filter::{body, cookie::replace_cookies, header},
    formatter::{DefaultHttpLogFormatter, JsonHttpLogFormatter},
    sink::{CompositeSink, DefaultSink},
    strategy::DefaultStrategy,
    ChannelWriter, CorrelationId, LogRecord, Logbook, LogbookLayer, TracingWriter,
};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{net::TcpListener, sync::mpsc::UnboundedReceiver, time::sleep};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

/// JSON records kept in memory, so `/stats` can show what was logged.
#[derive(Debug, Clone, Default)]
struct RecordStore {
    exchanges: Arc<Mutex<Vec<StoredExchange>>>,
}

#[derive(Debug, Clone, Serialize)]
struct StoredExchange {
    correlation_id: CorrelationId,
    request: serde_json::Value,
    response: Option<serde_json::Value>,
    duration_ms: Option<u64>,
}

impl RecordStore {
    fn store(&self, record: LogRecord) {
        let value = serde_json::from_str(&record.text).unwrap_or(serde_json::Value::String(record.text));
        let mut exchanges = self.exchanges.lock().unwrap();
        match record.phase {
            Phase::Request => exchanges.push(StoredExchange {
                correlation_id: record.correlation_id,
                request: value,
                response: None,
                duration_ms: None,
            }),
            Phase::Response => {
                if let Some(exchange) = exchanges
                    .iter_mut()
                    .find(|exchange| exchange.correlation_id == record.correlation_id)
                {
                    exchange.response = Some(value);
                    exchange.duration_ms = record.duration.map(|d| d.as_millis() as u64);
                }
            }
        }
    }

    async fn run(self, mut records: UnboundedReceiver<LogRecord>) {
        while let Some(record) = records.recv().await {
            self.store(record);
        }
    }
}

// Test handlers for our demo server
async fn hello_handler() -> impl IntoResponse {
    sleep(Duration::from_millis(100)).await; // Simulate some work
    "Hello, World!"
}

async fn echo_handler(body: Bytes) -> impl IntoResponse {
    sleep(Duration::from_millis(50)).await; // Simulate some work
    format!("Echo: {}", String::from_utf8_lossy(&body))
}

async fn login_handler(Json(credentials): Json<serde_json::Value>) -> impl IntoResponse {
    let user = credentials["user"].as_str().unwrap_or("anonymous").to_owned();
    Json(serde_json::json!({ "user": user, "token": "s3cr3t-session-token" }))
}

async fn streaming_handler() -> impl IntoResponse {
    use futures::stream;
    use tokio::time::interval;

    let stream = stream::unfold(0u32, |count| async move {
        if count >= 5 {
            None
        } else {
            let mut interval = interval(Duration::from_millis(200));
            interval.tick().await;
            Some((
                Ok::<_, std::convert::Infallible>(Bytes::from(format!("chunk-{count}\n"))),
                count + 1,
            ))
        }
    });

    Response::builder()
        .header("content-type", "text/plain")
        .body(Body::from_stream(stream))
        .unwrap()
}

async fn large_response_handler() -> impl IntoResponse {
    // Larger than the body limit below, logged truncated
    "x".repeat(8 * 1024)
}

async fn stats_handler(State(store): State<RecordStore>) -> impl IntoResponse {
    let exchanges = store.exchanges.lock().unwrap().clone();
    Json(serde_json::json!({
        "total_requests": exchanges.len(),
        "completed_requests": exchanges.iter().filter(|e| e.response.is_some()).count(),
        "exchanges": exchanges
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    info!("Starting logbook demo server");

    // Text records go to tracing, JSON records to the in-memory store
    let (writer, records) = ChannelWriter::new();
    let store = RecordStore::default();
    tokio::spawn(store.clone().run(records));

    let logbook = Logbook::builder()
        .header_filter(header::authorization())
        .header_filter(replace_cookies(|name| name == "session", "XXX"))
        .body_filter(body::replace_json_string_properties(["password", "token"], "XXX"))
        .body_filter(body::replace_binary())
        .strategy(DefaultStrategy::ignoring_bodies_on("X-Ignore-Body"))
        .sink(
            CompositeSink::new()
                .with(DefaultSink::new(DefaultHttpLogFormatter, TracingWriter))
                .with(DefaultSink::new(JsonHttpLogFormatter, writer)),
        )
        .body_limit(4 * 1024)
        .build();

    // Build the router with middleware
    let app = Router::new()
        .route("/hello", get(hello_handler))
        .route("/echo", post(echo_handler))
        .route("/login", post(login_handler))
        .route("/streaming", get(streaming_handler))
        .route("/large", get(large_response_handler))
        .route("/stats", get(stats_handler))
        .with_state(store)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(LogbookLayer::new(logbook))
                .into_inner(),
        );

    info!("Demo server endpoints:");
    info!("  GET  /hello      - Simple greeting");
    info!("  POST /echo       - Echo request body");
    info!("  POST /login      - JSON body with redacted password and token");
    info!("  GET  /streaming  - Streaming response");
    info!("  GET  /large      - Large response (logged truncated)");
    info!("  GET  /stats      - View logged exchanges");
    info!("");
    info!("Try these commands:");
    info!("  curl http://localhost:3000/hello");
    info!("  curl -X POST -d 'Hello from client' http://localhost:3000/echo");
    info!("  curl -X POST -H 'X-Ignore-Body: 1' -d 'not logged' http://localhost:3000/echo");
    info!("  curl -X POST -H 'Content-Type: application/json' -d '{{\"user\":\"alice\",\"password\":\"hunter2\"}}' http://localhost:3000/login");
    info!("  curl -H 'Cookie: theme=dark; session=abc123' http://localhost:3000/hello");
    info!("  curl http://localhost:3000/streaming");
    info!("  curl http://localhost:3000/large");
    info!("  curl http://localhost:3000/stats");

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    info!("Demo server listening on http://localhost:3000");

    axum::serve(listener, app).await?;

    Ok(())
}
