//! Shared utilities for integration tests.
//!
//! The mock backend speaks raw HTTP/1.1 over a socket so tests control
//! the exact reason phrase and can send repeated `Set-Cookie` lines.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use platform_edge::config::EdgeConfig;
use platform_edge::http::HttpServer;
use platform_edge::lifecycle::Shutdown;

/// One request as the backend saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or("")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.headers.iter().map(|(k, _)| k.to_ascii_lowercase()).collect();
        names.sort();
        names
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

/// Response the mock backend writes back.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MockResponse {
    pub fn new(status: u16, reason: &str) -> Self {
        Self {
            status,
            reason: reason.to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn json(status: u16, reason: &str, body: serde_json::Value) -> Self {
        Self::new(status, reason)
            .header("Content-Type", "application/json")
            .body(body.to_string())
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    fn to_wire(&self) -> String {
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason);
        for (k, v) in &self.headers {
            out.push_str(&format!("{}: {}\r\n", k, v));
        }
        out.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.body.len(),
            self.body
        ));
        out
    }
}

/// Requests seen by a mock backend, in arrival order.
#[derive(Clone, Default)]
pub struct RequestLog(Arc<Mutex<Vec<RecordedRequest>>>);

impl RequestLog {
    pub fn all(&self) -> Vec<RecordedRequest> {
        self.0.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<RecordedRequest> {
        self.0.lock().unwrap().last().cloned()
    }

    pub fn count_path(&self, path: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|r| r.path() == path).count()
    }

    fn push(&self, request: RecordedRequest) {
        self.0.lock().unwrap().push(request);
    }
}

/// Start a programmable backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> (SocketAddr, RequestLog)
where
    F: Fn(RecordedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log = RequestLog::default();
    let f = Arc::new(f);

    let task_log = log.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    let log = task_log.clone();
                    tokio::spawn(async move {
                        handle_connection(socket, f, log).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, log)
}

/// Start a backend that always returns `response`.
pub async fn start_mock_backend(response: MockResponse) -> (SocketAddr, RequestLog) {
    start_programmable_backend(move |_| {
        let response = response.clone();
        async move { response }
    })
    .await
}

async fn handle_connection<F, Fut>(mut socket: TcpStream, f: Arc<F>, log: RequestLog)
where
    F: Fn(RecordedRequest) -> Fut,
    Fut: Future<Output = MockResponse>,
{
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    log.push(request.clone());
    let response = f(request).await;
    let _ = socket.write_all(response.to_wire().as_bytes()).await;
    let _ = socket.shutdown().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(RecordedRequest {
        method,
        target,
        headers,
        body,
    })
}

/// Run the edge server against `backend` on an ephemeral port.
pub async fn start_edge(backend: SocketAddr) -> (SocketAddr, Shutdown) {
    start_edge_with(backend, |_| {}).await
}

pub async fn start_edge_with<F>(backend: SocketAddr, tweak: F) -> (SocketAddr, Shutdown)
where
    F: FnOnce(&mut EdgeConfig),
{
    let mut config = EdgeConfig::default();
    config.backend.origin = format!("http://{}", backend);
    tweak(&mut config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config);
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });
    (addr, shutdown)
}
