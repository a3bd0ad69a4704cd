//! In-process HTTP server for end-to-end runner tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::thread;

pub struct TestServer {
    pub base_url: String,
    _server: Arc<tiny_http::Server>,
}

impl TestServer {
    /// Spawn a server on an ephemeral port with `workers` accept threads so
    /// parallel scenarios can be served concurrently. Worker threads live
    /// until the test process exits.
    pub fn spawn<F>(workers: usize, handler: F) -> Self
    where
        F: Fn(tiny_http::Request) + Send + Sync + 'static,
    {
        let server =
            Arc::new(tiny_http::Server::http("127.0.0.1:0").expect("bind test server"));
        let addr = server.server_addr().to_ip().expect("tcp listener");
        let handler = Arc::new(handler);
        for _ in 0..workers {
            let server = Arc::clone(&server);
            let handler = Arc::clone(&handler);
            thread::spawn(move || {
                while let Ok(req) = server.recv() {
                    handler(req);
                }
            });
        }
        Self {
            base_url: format!("http://{addr}"),
            _server: server,
        }
    }
}

pub fn respond_json(req: tiny_http::Request, status: u16, body: &str) {
    let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("static header");
    let resp = tiny_http::Response::from_data(body.as_bytes().to_vec())
        .with_status_code(tiny_http::StatusCode(status))
        .with_header(header);
    let _ = req.respond(resp);
}

pub fn respond_status(req: tiny_http::Request, status: u16) {
    let _ = req.respond(tiny_http::Response::empty(tiny_http::StatusCode(status)));
}

pub fn read_body(req: &mut tiny_http::Request) -> String {
    let mut body = String::new();
    let _ = std::io::Read::read_to_string(req.as_reader(), &mut body);
    body
}

pub fn header_value(req: &tiny_http::Request, name: &str) -> Option<String> {
    req.headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str().to_string())
}
