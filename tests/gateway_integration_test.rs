//! End-to-end tests for the HTTP gateway.
//!
//! Boots the gateway on an ephemeral port against a temp vault and drives it
//! with a raw hyper 1.x client connection, covering 206 range responses,
//! full-content 200s, HEAD semantics, and the error status mapping.

use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use vault_proxy::cryptor::PassthroughCryptor;
use vault_proxy::http_server::{run_with_listener, GatewayState};
use vault_proxy::shutdown::ShutdownCoordinator;
use vault_proxy::verification::{
    BlockingPoolExecutor, LoggingWarningHandler, VerificationScheduler,
};

struct Gateway {
    addr: SocketAddr,
    coordinator: ShutdownCoordinator,
    _vault: TempDir,
}

async fn start_gateway() -> Gateway {
    let vault = TempDir::new().unwrap();
    let content: Vec<u8> = (0..1024u32).map(|i| (i % 247) as u8).collect();
    std::fs::write(vault.path().join("data.bin"), &content).unwrap();

    let cryptor = Arc::new(PassthroughCryptor);
    let scheduler = Arc::new(VerificationScheduler::new(
        cryptor.clone(),
        Arc::new(BlockingPoolExecutor::current()),
        Arc::new(LoggingWarningHandler),
    ));
    let state = Arc::new(GatewayState {
        vault_root: vault.path().to_path_buf(),
        cryptor,
        scheduler,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let coordinator = ShutdownCoordinator::new();
    let shutdown = coordinator.subscribe();
    tokio::spawn(async move {
        let _ = run_with_listener(listener, state, shutdown).await;
    });

    Gateway {
        addr,
        coordinator,
        _vault: vault,
    }
}

async fn request(
    addr: SocketAddr,
    method: Method,
    path: &str,
    range: Option<&str>,
) -> (StatusCode, hyper::HeaderMap, Vec<u8>) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await.unwrap();
    tokio::spawn(conn);

    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(hyper::header::HOST, "localhost");
    if let Some(range) = range {
        builder = builder.header(hyper::header::RANGE, range);
    }
    let req = builder.body(Empty::<Bytes>::new()).unwrap();

    let response = sender.send_request(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body.to_vec())
}

fn header<'a>(headers: &'a hyper::HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn test_range_request_yields_partial_content() {
    let gateway = start_gateway().await;

    let (status, headers, body) =
        request(gateway.addr, Method::GET, "/data.bin", Some("bytes=0-499")).await;

    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&headers, "content-range"), Some("0-499/1024"));
    assert_eq!(header(&headers, "content-length"), Some("500"));
    assert!(header(&headers, "last-modified").is_some());
    assert_eq!(body.len(), 500);
    assert_eq!(body[0], 0);

    gateway.coordinator.trigger();
}

#[tokio::test]
async fn test_suffix_range_over_http() {
    let gateway = start_gateway().await;

    let (status, headers, body) =
        request(gateway.addr, Method::GET, "/data.bin", Some("bytes=-500")).await;

    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&headers, "content-range"), Some("524-1023/1024"));
    assert_eq!(body.len(), 500);

    gateway.coordinator.trigger();
}

#[tokio::test]
async fn test_head_with_range_returns_metadata_only() {
    let gateway = start_gateway().await;

    let (status, headers, body) =
        request(gateway.addr, Method::HEAD, "/data.bin", Some("bytes=0-99")).await;

    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&headers, "content-range"), Some("0-99/1024"));
    assert_eq!(header(&headers, "content-length"), Some("100"));
    assert!(body.is_empty());

    gateway.coordinator.trigger();
}

#[tokio::test]
async fn test_full_get_without_range() {
    let gateway = start_gateway().await;

    let (status, headers, body) = request(gateway.addr, Method::GET, "/data.bin", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(header(&headers, "content-length"), Some("1024"));
    assert_eq!(header(&headers, "accept-ranges"), Some("bytes"));
    assert_eq!(body.len(), 1024);

    gateway.coordinator.trigger();
}

#[tokio::test]
async fn test_malformed_range_is_bad_request() {
    let gateway = start_gateway().await;

    let (status, _, _) =
        request(gateway.addr, Method::GET, "/data.bin", Some("bytes=100-50")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    gateway.coordinator.trigger();
}

#[tokio::test]
async fn test_unsatisfiable_range_is_416() {
    let gateway = start_gateway().await;

    let (status, _, _) =
        request(gateway.addr, Method::GET, "/data.bin", Some("bytes=5000-6000")).await;
    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);

    gateway.coordinator.trigger();
}

#[tokio::test]
async fn test_missing_resource_is_404() {
    let gateway = start_gateway().await;

    let (status, _, _) =
        request(gateway.addr, Method::GET, "/absent.bin", Some("bytes=0-10")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    gateway.coordinator.trigger();
}

#[tokio::test]
async fn test_traversal_is_rejected() {
    let gateway = start_gateway().await;

    let (status, _, _) = request(
        gateway.addr,
        Method::GET,
        "/%2e%2e/outside.bin",
        Some("bytes=0-10"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    gateway.coordinator.trigger();
}

#[tokio::test]
async fn test_healthz_reports_ok() {
    let gateway = start_gateway().await;

    let (status, headers, body) = request(gateway.addr, Method::GET, "/healthz", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(header(&headers, "content-type"), Some("application/json"));
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["status"], "ok");

    gateway.coordinator.trigger();
}

#[tokio::test]
async fn test_method_not_allowed() {
    let gateway = start_gateway().await;

    let (status, _, _) = request(gateway.addr, Method::POST, "/data.bin", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    gateway.coordinator.trigger();
}
