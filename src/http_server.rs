//! HTTP Gateway Module
//!
//! Thin HTTP/1.1 front for the spooler: accepts connections until shutdown,
//! maps request paths into the vault, and serves decrypted content. Requests
//! carrying a `Range` header get `206 Partial Content` through the partial
//! content spooler; requests without one get the full decrypted resource.
//! Both paths ensure a background integrity verification is scheduled.

use crate::byte_range::SpanningRange;
use crate::cryptor::{Cryptor, CryptorError};
use crate::output::{BufferedOutput, OutputContext, CONTENT_RANGE_HEADER};
use crate::resource::ResourceLocator;
use crate::spool::PartialContent;
use crate::verification::VerificationScheduler;
use crate::{Result, VaultError};
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use http_body_util::Full;
use hyper::header;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use percent_encoding::percent_decode_str;
use std::fs::File;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::shutdown::ShutdownSignal;

/// Shared state of the HTTP gateway
pub struct GatewayState {
    pub vault_root: PathBuf,
    pub cryptor: Arc<dyn Cryptor>,
    pub scheduler: Arc<VerificationScheduler>,
}

/// Run the gateway until the shutdown signal fires
pub async fn run(
    addr: SocketAddr,
    state: Arc<GatewayState>,
    shutdown_signal: ShutdownSignal,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| VaultError::IoError(format!("Failed to bind gateway: {}", e)))?;
    run_with_listener(listener, state, shutdown_signal).await
}

/// Serve connections from an already-bound listener until shutdown
pub async fn run_with_listener(
    listener: TcpListener,
    state: Arc<GatewayState>,
    mut shutdown_signal: ShutdownSignal,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|e| VaultError::IoError(format!("Failed to read local address: {}", e)))?;
    info!("Vault gateway listening on {}", addr);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                let (stream, peer) = accept_result.map_err(|e| {
                    VaultError::IoError(format!("Failed to accept connection: {}", e))
                })?;
                debug!("Accepted connection from {}", peer);

                let io = TokioIo::new(stream);
                let state = Arc::clone(&state);

                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move {
                            Ok::<_, std::convert::Infallible>(respond(req, state).await)
                        }
                    });

                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("Error serving connection: {}", e);
                    }
                });
            }
            _ = shutdown_signal.wait_for_shutdown() => {
                info!("Gateway received shutdown signal");
                break;
            }
        }
    }

    Ok(())
}

async fn respond(req: Request<hyper::body::Incoming>, state: Arc<GatewayState>) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/healthz") => health_response(),
        (&Method::GET, _) | (&Method::HEAD, _) => {
            // Spooling is blocking file I/O; keep it off the reactor threads.
            let want_body = method == Method::GET;
            tokio::task::spawn_blocking(move || serve_resource(&req, state, want_body))
                .await
                .unwrap_or_else(|e| {
                    Err(VaultError::SystemError(format!("Worker task failed: {}", e)))
                })
        }
        _ => Ok(status_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Only GET and HEAD are supported",
        )),
    };

    match response {
        Ok(response) => {
            debug!("{} {} -> {}", method, path, response.status());
            response
        }
        Err(e) => {
            error!("{} {} failed: {}", method, path, e);
            status_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

fn serve_resource(
    req: &Request<hyper::body::Incoming>,
    state: Arc<GatewayState>,
    want_body: bool,
) -> Result<Response<Full<Bytes>>> {
    let locator = match resolve_locator(req.uri().path(), &state.vault_root) {
        Ok(locator) => locator,
        Err(response) => return Ok(response),
    };

    let range_header = req
        .headers()
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    match range_header {
        Some(range_header) => {
            serve_partial(&state, locator, &range_header, want_body)
        }
        None => serve_full(&state, locator, want_body),
    }
}

/// Map a percent-encoded request path onto a vault-relative locator.
/// Traversal segments are rejected before any filesystem access.
fn resolve_locator(
    raw_path: &str,
    vault_root: &std::path::Path,
) -> std::result::Result<ResourceLocator, Response<Full<Bytes>>> {
    let decoded = match percent_decode_str(raw_path).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => {
            return Err(status_response(
                StatusCode::BAD_REQUEST,
                "Request path is not valid UTF-8",
            ))
        }
    };

    let mut relative = PathBuf::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                warn!("Rejected traversal attempt: {}", decoded);
                return Err(status_response(
                    StatusCode::BAD_REQUEST,
                    "Request path may not traverse upward",
                ));
            }
            segment => relative.push(segment),
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(status_response(
            StatusCode::NOT_FOUND,
            "Resource not found",
        ));
    }

    Ok(ResourceLocator::new(decoded, vault_root.join(relative)))
}

fn serve_partial(
    state: &GatewayState,
    locator: ResourceLocator,
    range_header: &str,
    want_body: bool,
) -> Result<Response<Full<Bytes>>> {
    let part = match PartialContent::new(
        locator,
        Some(range_header),
        Arc::clone(&state.cryptor),
        &state.scheduler,
    ) {
        Ok(part) => part,
        Err(VaultError::InvalidRange(reason)) => {
            debug!("Rejected malformed range request: {}", reason);
            return Ok(status_response(StatusCode::BAD_REQUEST, &reason));
        }
        Err(e) => return Err(e),
    };

    let mut output = if want_body {
        BufferedOutput::with_stream()
    } else {
        BufferedOutput::head_only()
    };

    match part.spool(&mut output) {
        Ok(()) => {}
        Err(VaultError::InvalidRange(reason)) => {
            debug!("Range not satisfiable: {}", reason);
            return Ok(status_response(
                StatusCode::RANGE_NOT_SATISFIABLE,
                &reason,
            ));
        }
        Err(e) => return Err(e),
    }

    if output.is_untouched() {
        return Ok(status_response(StatusCode::NOT_FOUND, "Resource not found"));
    }

    let mut response = Response::new(Full::new(Bytes::from(output_body(&output, want_body))));
    *response.status_mut() = StatusCode::PARTIAL_CONTENT;
    apply_output_headers(&mut response, &output)?;
    Ok(response)
}

fn serve_full(
    state: &GatewayState,
    locator: ResourceLocator,
    want_body: bool,
) -> Result<Response<Full<Bytes>>> {
    state.scheduler.ensure_scheduled(&locator);

    let path = locator.physical_path();
    let metadata = match std::fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        _ => return Ok(status_response(StatusCode::NOT_FOUND, "Resource not found")),
    };

    let mut ciphertext = File::open(path)?;
    let size = state
        .cryptor
        .decrypted_content_length(&mut ciphertext)
        .map_err(|e| map_cryptor_error(&locator, e))?;

    let mut output = if want_body {
        BufferedOutput::with_stream()
    } else {
        BufferedOutput::head_only()
    };
    output.set_modification_time(
        metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0),
    );
    output.set_content_length(size);
    if want_body && size > 0 {
        let span = SpanningRange {
            start: 0,
            end: size - 1,
        };
        state
            .cryptor
            .decrypt_range(&mut ciphertext, output.output_stream(), span.start, span.len())
            .map_err(|e| map_cryptor_error(&locator, e))?;
    }

    let mut response = Response::new(Full::new(Bytes::from(output_body(&output, want_body))));
    apply_output_headers(&mut response, &output)?;
    Ok(response)
}

fn map_cryptor_error(locator: &ResourceLocator, err: CryptorError) -> VaultError {
    match err {
        CryptorError::DecryptFailed(reason) => VaultError::Decrypt {
            path: locator.physical_path().display().to_string(),
            reason,
        },
        e => VaultError::IoError(e.to_string()),
    }
}

fn output_body(output: &BufferedOutput, want_body: bool) -> Vec<u8> {
    if want_body {
        output.body().unwrap_or_default().to_vec()
    } else {
        Vec::new()
    }
}

/// Copy spooler-declared metadata onto the hyper response.
fn apply_output_headers(
    response: &mut Response<Full<Bytes>>,
    output: &BufferedOutput,
) -> Result<()> {
    let headers = response.headers_mut();

    if let Some(length) = output.content_length() {
        headers.insert(
            header::CONTENT_LENGTH,
            length.to_string().parse().map_err(|e| {
                VaultError::HttpError(format!("Invalid Content-Length value: {}", e))
            })?,
        );
    }
    if let Some(value) = output.property(CONTENT_RANGE_HEADER) {
        headers.insert(
            header::CONTENT_RANGE,
            value.parse().map_err(|e| {
                VaultError::HttpError(format!("Invalid Content-Range value: {}", e))
            })?,
        );
    }
    if let Some(millis) = output.modification_time() {
        if let Some(modified) = Utc.timestamp_millis_opt(millis).single() {
            let value = modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
            headers.insert(
                header::LAST_MODIFIED,
                value.parse().map_err(|e| {
                    VaultError::HttpError(format!("Invalid Last-Modified value: {}", e))
                })?,
            );
        }
    }
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        header::ACCEPT_RANGES,
        header::HeaderValue::from_static("bytes"),
    );
    Ok(())
}

fn health_response() -> Result<Response<Full<Bytes>>> {
    let body = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    })
    .to_string();

    let mut response = Response::new(Full::new(Bytes::from(body)));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

fn status_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(message.to_string())));
    *response.status_mut() = status;
    response
}
