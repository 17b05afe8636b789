//! Minimal HTTP/1.1 server standing in for an ArcGIS `query` endpoint.
//!
//! Each request is answered by a handler that sees the request target (path and query) and
//! returns a status code and body. Every request target is recorded for later assertions.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

pub struct FeatureServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FeatureServer {
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Offsets in request order, read from each request's `resultOffset` parameter.
    pub fn offsets(&self) -> Vec<u64> {
        self.requests()
            .iter()
            .filter_map(|target| query_param(target, "resultOffset"))
            .filter_map(|value| value.parse().ok())
            .collect()
    }
}

/// Starts a server in a background thread. The server runs until the process exits.
pub fn start<F>(handler: F) -> FeatureServer
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(handler);
    let recorded = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            handle(stream, handler.as_ref(), &recorded);
        }
    });
    FeatureServer {
        base_url: format!("http://127.0.0.1:{port}/arcgis/rest/services/"),
        requests,
    }
}

fn handle<F>(mut stream: std::net::TcpStream, handler: &F, requests: &Mutex<Vec<String>>)
where
    F: Fn(&str) -> (u16, String),
{
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    while !raw.windows(4).any(|window| window == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => raw.extend_from_slice(&buf[..n]),
        }
    }
    let request = String::from_utf8_lossy(&raw);
    let Some(target) = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
    else {
        return;
    };
    requests.lock().unwrap().push(target.to_string());

    let (status, body) = handler(target);
    let reason = if status == 200 { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes());
}

pub fn query_param(target: &str, key: &str) -> Option<String> {
    let (_, query) = target.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name == key).then(|| value.to_string())
    })
}
