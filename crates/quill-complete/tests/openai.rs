//! Exercises the HTTP client against a loopback server speaking just enough
//! HTTP/1.1 to answer a single request.

use futures_util::StreamExt;
use quill_complete::{
    CompleteError, Completer, CompletionRequest, OpenAIClient, OpenAIConfig, complete,
    list_models, stream,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serves one canned response and returns the raw request it received.
async fn serve_once(
    status: &'static str,
    content_type: &'static str,
    body: String,
) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}/v1", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
            if request_complete(&request) {
                break;
            }
        }

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&request).into_owned()
    });

    (base_url, handle)
}

fn request_complete(request: &[u8]) -> bool {
    let text = String::from_utf8_lossy(request);
    let Some(header_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..header_end]
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    request.len() >= header_end + 4 + content_length
}

fn client(base_url: &str, api_key: &str) -> OpenAIClient {
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    OpenAIClient::with_http_client(OpenAIConfig::new(api_key).with_base_url(base_url), http)
}

fn request() -> CompletionRequest {
    CompletionRequest::for_prompt(
        "gpt-4o-mini",
        64,
        "You are a helpful assistant.",
        "Please proofread",
        "teh cat",
    )
}

#[tokio::test]
async fn test_models_lists_and_filters() {
    let body = r#"{"object":"list","data":[{"id":"gpt-4o"},{"id":"whisper-1"},{"id":"gpt-4o-mini"}]}"#;
    let (base_url, server) = serve_once("200 OK", "application/json", body.to_string()).await;

    let models = list_models(&client(&base_url, "sk-test")).await.unwrap();
    assert_eq!(models, vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()]);

    let raw = server.await.unwrap();
    assert!(raw.starts_with("GET /v1/models"));
    assert!(raw.to_lowercase().contains("authorization: bearer sk-test"));
}

#[tokio::test]
async fn test_unauthorized_status_maps_to_auth_error() {
    let body = r#"{"error":{"code":"invalid_api_key","message":"Incorrect API key provided"}}"#;
    let (base_url, server) =
        serve_once("401 Unauthorized", "application/json", body.to_string()).await;

    let err = client(&base_url, "sk-bad").models().await.unwrap_err();
    assert!(matches!(err, CompleteError::Unauthorized(ref b) if b.contains("invalid_api_key")));
    server.await.unwrap();
}

#[tokio::test]
async fn test_complete_sends_messages() {
    let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"The cat"}}]}"#;
    let (base_url, server) = serve_once("200 OK", "application/json", body.to_string()).await;

    let text = complete(&client(&base_url, "sk-test"), &request()).await;
    assert_eq!(text, "The cat");

    let raw = server.await.unwrap();
    assert!(raw.starts_with("POST /v1/chat/completions"));
    assert!(raw.contains(r#""stream":false"#));
    assert!(raw.contains(r#""max_tokens":64"#));
    assert!(raw.contains(r#"Please proofread\n\nteh cat"#));
}

#[tokio::test]
async fn test_stream_and_complete_produce_same_text() {
    let whole = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"The cat sat."}}]}"#;
    let (base_url, server) = serve_once("200 OK", "application/json", whole.to_string()).await;
    let complete_text = complete(&client(&base_url, "sk-test"), &request()).await;
    server.await.unwrap();

    let events = [
        r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":""}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"content":"The "}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"content":"cat "}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"content":"sat."}}]}"#,
        r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        "[DONE]",
    ];
    let body: String = events.iter().map(|e| format!("data: {e}\n\n")).collect();
    let (base_url, server) = serve_once("200 OK", "text/event-stream", body).await;

    let mut chunks = stream(&client(&base_url, "sk-test"), &request()).await.unwrap();
    let mut streamed = String::new();
    while let Some(chunk) = chunks.next().await {
        streamed.push_str(&chunk.unwrap());
    }

    assert_eq!(streamed, complete_text);
    assert!(server.await.unwrap().contains(r#""stream":true"#));
}

#[tokio::test]
async fn test_stream_keeps_unterminated_final_event() {
    let body = concat!(
        r#"data: {"choices":[{"index":0,"delta":{"content":"The "}}]}"#,
        "\n\n",
        r#"data: {"choices":[{"index":0,"delta":{"content":"end"}}]}"#,
    )
    .to_string();
    let (base_url, server) = serve_once("200 OK", "text/event-stream", body).await;

    let mut chunks = stream(&client(&base_url, "sk-test"), &request()).await.unwrap();
    let mut streamed = String::new();
    while let Some(chunk) = chunks.next().await {
        streamed.push_str(&chunk.unwrap());
    }

    assert_eq!(streamed, "The end");
    server.await.unwrap();
}

#[tokio::test]
async fn test_server_error_degrades_and_stream_raises() {
    let (base_url, server) =
        serve_once("500 Internal Server Error", "text/plain", "boom".to_string()).await;
    assert_eq!(complete(&client(&base_url, "sk-test"), &request()).await, "");
    server.await.unwrap();

    let (base_url, server) =
        serve_once("500 Internal Server Error", "text/plain", "boom".to_string()).await;
    let result = stream(&client(&base_url, "sk-test"), &request()).await;
    assert!(matches!(result, Err(CompleteError::ApiError(ref m)) if m.contains("boom")));
    server.await.unwrap();
}

#[tokio::test]
async fn test_connection_refused_lists_nothing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}/v1", listener.local_addr().unwrap());
    drop(listener);

    let client = client(&base_url, "sk-test");
    assert!(matches!(
        client.models().await,
        Err(CompleteError::NetworkError(_))
    ));
    assert!(list_models(&client).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_key_never_hits_network() {
    let client = client("http://127.0.0.1:9/v1", "");
    assert!(matches!(client.models().await, Err(CompleteError::NoApiKey)));
    assert!(list_models(&client).await.is_err());
    assert_eq!(complete(&client, &request()).await, "");
}
