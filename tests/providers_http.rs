//! Provider tests against a scripted local HTTP server.
//!
//! Each server accepts one connection per scripted response, records the
//! raw request, and answers with `Connection: close`. Real clock: backoff
//! delays are configured in milliseconds.

use edgequake_pdf_explain::{
    ExplainConfig, GeminiProvider, GroqProvider, ProviderError, RasterImage, VisionProvider,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

// ── Mock server ──────────────────────────────────────────────────────────

type Requests = Arc<Mutex<Vec<String>>>;

async fn serve(responses: Vec<(u16, String)>) -> (String, Requests) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests: Requests = Arc::default();
    let seen = Arc::clone(&requests);

    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut sock, _) = listener.accept().await.unwrap();
            let request = read_request(&mut sock).await;
            seen.lock().unwrap().push(request);
            let response = format!(
                "HTTP/1.1 {status} Scripted\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(response.as_bytes()).await.unwrap();
            sock.shutdown().await.ok();
        }
    });

    (format!("http://{addr}"), requests)
}

async fn read_request(sock: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = sock.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Accept connections and read them, but never answer.
async fn serve_silently() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&connections);

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((mut sock, _)) = listener.accept().await {
            seen.fetch_add(1, Ordering::SeqCst);
            read_request(&mut sock).await;
            held.push(sock);
        }
    });

    (format!("http://{addr}"), connections)
}

fn request_line(request: &str) -> &str {
    request.lines().next().unwrap_or_default()
}

fn image() -> RasterImage {
    RasterImage {
        data: "iVBORw0KGgo=".into(),
        mime_type: "image/png",
        width: 1,
        height: 1,
    }
}

fn gemini_ok(text: &str) -> (u16, String) {
    (
        200,
        serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": text }], "role": "model" } }]
        })
        .to_string(),
    )
}

fn gemini_error(status: u16, message: &str) -> (u16, String) {
    (
        status,
        serde_json::json!({ "error": { "code": status, "message": message } }).to_string(),
    )
}

fn gemini(base_url: &str) -> GeminiProvider {
    let config = ExplainConfig::builder()
        .gemini_base_url(base_url)
        .gemini_models(["gemini-a", "gemini-b"])
        .default_retry_ms(20)
        .max_retry_ms(200)
        .build()
        .unwrap();
    GeminiProvider::new("AIza_test".into(), &config).unwrap()
}

// ── Gemini ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn gemini_skips_missing_model_and_retries_rate_limit() {
    let (base, requests) = serve(vec![
        gemini_error(404, "models/gemini-a is not found for API version v1beta"),
        gemini_error(429, "Resource exhausted. Please retry in 0.05s."),
        gemini_ok("## Main Content\nA bar chart."),
    ])
    .await;
    let start = Instant::now();

    let c = gemini(&base)
        .submit("Explain page 1", &image(), None)
        .await
        .unwrap();

    assert_eq!(c.text, "## Main Content\nA bar chart.");
    assert_eq!(c.provider, "Gemini");
    assert_eq!(c.model, "gemini-b");
    assert!(start.elapsed() >= Duration::from_millis(50));

    let requests = requests.lock().unwrap();
    let lines: Vec<_> = requests.iter().map(|r| request_line(r)).collect();
    assert_eq!(
        lines,
        vec![
            "POST /v1beta/models/gemini-a:generateContent HTTP/1.1",
            "POST /v1beta/models/gemini-b:generateContent HTTP/1.1",
            "POST /v1beta/models/gemini-b:generateContent HTTP/1.1",
        ]
    );
    assert!(requests[0].to_lowercase().contains("x-goog-api-key: aiza_test"));
    assert!(requests[0].contains(r#""inlineData":{"mimeType":"image/png","data":"iVBORw0KGgo="}"#));
}

#[tokio::test]
async fn gemini_pinned_model_is_the_only_one_tried() {
    let (base, requests) = serve(vec![gemini_ok("pinned answer")]).await;

    let c = gemini(&base)
        .submit("Explain page 2", &image(), Some("gemini-b"))
        .await
        .unwrap();

    assert_eq!(c.model, "gemini-b");
    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(request_line(&requests[0]).contains("/models/gemini-b:"));
}

#[tokio::test]
async fn gemini_other_errors_stop_the_model_walk() {
    let (base, requests) = serve(vec![gemini_error(400, "API key not valid")]).await;

    let err = gemini(&base)
        .submit("Explain", &image(), None)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ProviderError::Api {
            provider: "Gemini".into(),
            status: 400,
            body: "API key not valid".into(),
        }
    );
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn gemini_rate_limit_gives_up_after_three_attempts() {
    let quota = || gemini_error(429, "You exceeded your current quota");
    let (base, requests) = serve(vec![quota(), quota(), quota()]).await;

    let err = gemini(&base)
        .submit("Explain", &image(), None)
        .await
        .unwrap_err();

    assert!(err.is_rate_limited());
    // Rate limits stop the walk: gemini-b is never tried.
    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| request_line(r).contains("gemini-a")));
}

#[tokio::test]
async fn gemini_timeout_is_not_retried_and_stops_the_walk() {
    let (base, connections) = serve_silently().await;
    let config = ExplainConfig::builder()
        .gemini_base_url(&base)
        .gemini_models(["gemini-a", "gemini-b"])
        .request_timeout_secs(1)
        .default_retry_ms(20)
        .build()
        .unwrap();
    let provider = GeminiProvider::new("AIza_test".into(), &config).unwrap();

    let err = provider
        .submit("Explain", &image(), None)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ProviderError::Timeout {
            provider: "Gemini".into(),
            secs: 1,
        }
    );
    assert_eq!(connections.load(Ordering::SeqCst), 1);
}

// ── Groq ─────────────────────────────────────────────────────────────────

fn groq(base_url: &str) -> GroqProvider {
    let config = ExplainConfig::builder()
        .groq_base_url(base_url)
        .build()
        .unwrap();
    GroqProvider::new("gsk_test".into(), &config).unwrap()
}

#[tokio::test]
async fn groq_returns_trimmed_completion() {
    let body = serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": "  Key takeaways.\n" } }]
    })
    .to_string();
    let (base, requests) = serve(vec![(200, body)]).await;

    let c = groq(&base)
        .submit("Explain page 1", &image(), None)
        .await
        .unwrap();

    assert_eq!(c.text, "Key takeaways.");
    assert_eq!(c.provider, "Groq");
    assert_eq!(c.model, "meta-llama/llama-4-scout-17b-16e-instruct");

    let requests = requests.lock().unwrap();
    assert_eq!(
        request_line(&requests[0]),
        "POST /openai/v1/chat/completions HTTP/1.1"
    );
    assert!(requests[0].to_lowercase().contains("authorization: bearer gsk_test"));
    assert!(requests[0].contains("data:image/png;base64,iVBORw0KGgo="));
}

#[tokio::test]
async fn groq_error_body_is_truncated_and_not_retried() {
    let (base, requests) = serve(vec![(413, "x".repeat(1000))]).await;

    let err = groq(&base)
        .submit("Explain", &image(), None)
        .await
        .unwrap_err();

    match err {
        ProviderError::Api { status, body, .. } => {
            assert_eq!(status, 413);
            assert_eq!(body.chars().count(), 200);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn groq_empty_content_is_an_error() {
    let body = r#"{"choices":[{"message":{"content":""}}]}"#.to_string();
    let (base, _) = serve(vec![(200, body)]).await;

    let err = groq(&base)
        .submit("Explain", &image(), None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProviderError::EmptyResponse {
            provider: "Groq".into()
        }
    );
}

#[tokio::test]
async fn groq_request_times_out() {
    let (base, connections) = serve_silently().await;
    let config = ExplainConfig::builder()
        .groq_base_url(&base)
        .request_timeout_secs(1)
        .build()
        .unwrap();
    let provider = GroqProvider::new("gsk_test".into(), &config).unwrap();

    let start = Instant::now();
    let err = provider
        .submit("Explain", &image(), None)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ProviderError::Timeout {
            provider: "Groq".into(),
            secs: 1,
        }
    );
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(connections.load(Ordering::SeqCst), 1);
}
