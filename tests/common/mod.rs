//! Shared utilities for integration tests: a raw-TCP programmable upstream,
//! a WebSocket echo server and a relay started on an ephemeral port.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

use modelrunner::config::ServerConfig;
use modelrunner::http::{upstream_client_builder, HttpServer};
use modelrunner::lifecycle::Shutdown;
use modelrunner::transport::ReqwestSend;

/// One request as the upstream saw it.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: String,
    /// Path plus query.
    pub target: String,
    /// Lower-cased header names.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// What the upstream answers with.
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    /// An event stream of `(event, data)` pairs; an empty event name sends
    /// a plain `message`.
    pub fn sse(events: &[(&str, &str)]) -> Self {
        let with_ids: Vec<_> = events.iter().map(|(event, data)| ("", *event, *data)).collect();
        Self::sse_with_ids(&with_ids)
    }

    /// An event stream of `(id, event, data)` triples; empty ids and event
    /// names are left out.
    pub fn sse_with_ids(events: &[(&str, &str, &str)]) -> Self {
        let mut body = String::new();
        for (id, event, data) in events {
            if !id.is_empty() {
                body.push_str(&format!("id: {}\n", id));
            }
            if !event.is_empty() {
                body.push_str(&format!("event: {}\n", event));
            }
            body.push_str(&format!("data: {}\n\n", data));
        }
        Self {
            status: 200,
            content_type: "text/event-stream",
            headers: Vec::new(),
            body,
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            status: 302,
            content_type: "text/plain",
            headers: vec![("location", location.to_string())],
            body: String::new(),
        }
    }
}

/// Programmable HTTP/1.1 upstream. One request per connection.
pub struct Upstream {
    pub addr: SocketAddr,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl Upstream {
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&Captured) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let captured = Arc::new(Mutex::new(Vec::new()));
        let respond = Arc::new(respond);

        let log = captured.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let respond = respond.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    serve_one(socket, respond.as_ref(), &log).await;
                });
            }
        });

        Self { addr, captured }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn captured(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }
}

async fn serve_one<F>(mut socket: TcpStream, respond: &F, log: &Mutex<Vec<Captured>>)
where
    F: Fn(&Captured) -> Reply,
{
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    let reply = respond(&request);
    log.lock().unwrap().push(request);

    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        reply.status,
        reason(reply.status),
        reply.content_type,
        reply.body.len()
    );
    for (name, value) in &reply.headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");
    let _ = socket.write_all(head.as_bytes()).await;
    let _ = socket.write_all(reply.body.as_bytes()).await;
    let _ = socket.shutdown().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
}

async fn read_request(socket: &mut TcpStream) -> Option<Captured> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(Captured {
        method,
        target,
        headers,
        body,
    })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        202 => "Accepted",
        302 => "Found",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// WebSocket server that answers every text frame with `{"echo": <frame>}`.
/// Returns the address and the request paths it accepted.
pub async fn start_echo_socket() -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let paths = Arc::new(Mutex::new(Vec::new()));

    let seen = paths.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let seen = seen.clone();
            tokio::spawn(async move {
                let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                    seen.lock().unwrap().push(request.uri().to_string());
                    Ok(response)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(socket, callback).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    if let Message::Text(text) = message {
                        let parsed: Value = serde_json::from_str(text.as_str()).unwrap_or(Value::Null);
                        let reply = serde_json::json!({ "echo": parsed });
                        if ws.send(Message::text(reply.to_string())).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });

    (addr, paths)
}

/// Client that ignores proxy environment variables and does not follow
/// redirects.
pub fn direct_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Reads a response body as JSON.
pub async fn body_json(response: reqwest::Response) -> Value {
    serde_json::from_slice(&response.bytes().await.unwrap()).unwrap()
}

/// A relay listening on an ephemeral port.
pub struct RelayHandle {
    pub addr: SocketAddr,
    pub updates: mpsc::UnboundedSender<ServerConfig>,
    pub shutdown: Shutdown,
    pub task: JoinHandle<std::io::Result<()>>,
}

impl RelayHandle {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_relay(config: ServerConfig) -> RelayHandle {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (updates, config_updates) = mpsc::unbounded_channel();
    let shutdown = Shutdown::new();

    let upstream = upstream_client_builder(&config.timeouts).no_proxy().build().unwrap();
    let server = HttpServer::with_http(config, Arc::new(ReqwestSend::with_client(upstream)));
    let task = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    RelayHandle {
        addr,
        updates,
        shutdown,
        task,
    }
}

/// Relay settings allowing calls to local upstreams with a fixed key.
pub fn relay_config(key: &str) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.proxy.allowed_domains = vec!["127.0.0.1".to_string()];
    config.proxy.credentials = Some(key.to_string());
    config
}
