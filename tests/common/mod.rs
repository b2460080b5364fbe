//! Tiny in-process HTTP/1.1 server for exercising the fetcher and crawler
//! without network access.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
    pub delay: Option<Duration>,
    /// Content-Length to announce instead of the real body length.
    pub claimed_len: Option<usize>,
}

impl Reply {
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            headers: Vec::new(),
            delay: None,
            claimed_len: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            headers: Vec::new(),
            delay: None,
            claimed_len: None,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Announces `claimed_len` bytes, sends the body, then closes the
    /// connection early.
    pub fn truncated(body: impl Into<String>, claimed_len: usize) -> Self {
        Self {
            claimed_len: Some(claimed_len),
            ..Self::html(body)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

type Routes = HashMap<String, Vec<Reply>>;

/// Each path answers with its replies in order; the last one repeats.
pub struct TestServer {
    pub base: String,
    port: u16,
    routes: Arc<Mutex<Routes>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let routes: Arc<Mutex<Routes>> = Arc::default();
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
        let requests: Arc<Mutex<Vec<Request>>> = Arc::default();

        let (routes_c, hits_c, requests_c) = (routes.clone(), hits.clone(), requests.clone());
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                let (routes, hits, requests) = (routes_c.clone(), hits_c.clone(), requests_c.clone());
                tokio::spawn(async move {
                    let _ = serve(socket, routes, hits, requests).await;
                });
            }
        });

        Self {
            base: format!("http://{}", addr),
            port: addr.port(),
            routes,
            hits,
            requests,
        }
    }

    pub fn route(&self, path: &str, replies: Vec<Reply>) {
        self.routes.lock().unwrap().insert(path.to_string(), replies);
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Same server, reached through a different host name.
    pub fn localhost_url(&self, path: &str) -> String {
        format!("http://localhost:{}{}", self.port, path)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve(
    mut socket: TcpStream,
    routes: Arc<Mutex<Routes>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    requests: Arc<Mutex<Vec<Request>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[head_end..]).to_string();

    let hit = {
        let mut hits = hits.lock().unwrap();
        let count = hits.entry(path.clone()).or_insert(0);
        *count += 1;
        *count
    };
    requests.lock().unwrap().push(Request {
        method,
        path: path.clone(),
        headers,
        body,
    });

    let reply = {
        let routes = routes.lock().unwrap();
        match routes.get(&path) {
            Some(replies) if !replies.is_empty() => {
                replies[(hit - 1).min(replies.len() - 1)].clone()
            }
            _ => Reply::status(404),
        }
    };

    if let Some(delay) = reply.delay {
        tokio::time::sleep(delay).await;
    }

    let mut response = format!(
        "HTTP/1.1 {} Test\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n",
        reply.status,
        reply.claimed_len.unwrap_or(reply.body.len())
    );
    for (name, value) in &reply.headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str("\r\n");
    response.push_str(&reply.body);

    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

pub fn quick_retry(attempts: u32) -> polite_scraper::retry::RetryPolicy {
    polite_scraper::retry::RetryPolicy {
        max_attempts: attempts,
        base_delay: Duration::from_millis(5),
        factor: 2.0,
        max_delay: Duration::from_millis(20),
        jitter: false,
    }
}

/// Fetcher with no delay, no rate limit and millisecond backoff.
pub fn quick_fetcher(attempts: u32) -> polite_scraper::Fetcher {
    let config = polite_scraper::FetchConfig {
        timeout: Duration::from_secs(5),
        proxy: None,
        retry: quick_retry(attempts),
    };
    polite_scraper::Fetcher::new(
        &config,
        polite_scraper::user_agent::UserAgentPool::default(),
        polite_scraper::rate_limit::Throttle::unlimited(),
    )
    .unwrap()
}
