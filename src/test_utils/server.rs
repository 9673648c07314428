//! Minimal HTTP/1.1 server for tests.
//!
//! Serves canned responses from a background thread, one thread per
//! connection, and records every requested path. Routes can be mounted after
//! start (for responses that embed the server's own URL) and match by path
//! prefix, longest prefix first, so a mirror route like `/m1/` also catches
//! `/m1/http://127.0.0.1:1234/v2.zip`. Unmatched paths get a 404.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// A canned response.
#[derive(Debug, Clone)]
pub struct Route {
    status: u16,
    body: Vec<u8>,
    content_type: &'static str,
    delay: Option<Duration>,
    send_length: bool,
    stall: Option<(usize, Duration)>,
}

impl Route {
    /// `200 OK` with a binary body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            content_type: "application/octet-stream",
            delay: None,
            send_length: true,
            stall: None,
        }
    }

    /// `200 OK` with a JSON body.
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            content_type: "application/json",
            ..Self::ok(body.into().into_bytes())
        }
    }

    /// An empty response with `status`.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::ok(Vec::new())
        }
    }

    /// Wait before sending anything.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Omit `Content-Length`; the body ends when the connection closes.
    #[must_use]
    pub const fn without_content_length(mut self) -> Self {
        self.send_length = false;
        self
    }

    /// Send the headers and the first `bytes` of the body, then go silent for `pause`.
    #[must_use]
    pub const fn stalling_after(mut self, bytes: usize, pause: Duration) -> Self {
        self.stall = Some((bytes, pause));
        self
    }
}

type Routes = Arc<Mutex<Vec<(String, Route)>>>;

/// Background HTTP server bound to an ephemeral localhost port.
pub struct TestServer {
    addr: SocketAddr,
    routes: Routes,
    hits: Arc<Mutex<Vec<String>>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Start a server without routes; every request gets a 404 until routes are mounted.
    pub fn new() -> Self {
        Self::start::<String>(Vec::new())
    }

    /// Start serving `initial`.
    pub fn start<P: Into<String>>(initial: Vec<(P, Route)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let addr = listener.local_addr().expect("local addr");

        let routes: Routes = Arc::new(Mutex::new(Vec::new()));
        let hits = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = {
            let routes = Arc::clone(&routes);
            let hits = Arc::clone(&hits);
            let shutdown = Arc::clone(&shutdown);
            std::thread::spawn(move || {
                while !shutdown.load(Ordering::SeqCst) {
                    match listener.accept() {
                        Ok((stream, _)) => {
                            let routes = Arc::clone(&routes);
                            let hits = Arc::clone(&hits);
                            std::thread::spawn(move || handle_connection(stream, &routes, &hits));
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock => {
                            std::thread::sleep(Duration::from_millis(5));
                        }
                        Err(_) => break,
                    }
                }
            })
        };

        let server = Self {
            addr,
            routes,
            hits,
            shutdown,
            handle: Some(handle),
        };
        for (path, route) in initial {
            server.mount(path, route);
        }
        server
    }

    /// Serve `route` for requests whose path starts with `path`.
    pub fn mount(&self, path: impl Into<String>, route: Route) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.push((path.into(), route));
            routes.sort_by_key(|(path, _)| std::cmp::Reverse(path.len()));
        }
    }

    /// Base URL, e.g. `http://127.0.0.1:41234`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Every requested path, in arrival order.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().map(|hits| hits.clone()).unwrap_or_default()
    }

    /// Number of requests whose path starts with `prefix`.
    pub fn hit_count(&self, prefix: &str) -> usize {
        self.hits().iter().filter(|path| path.starts_with(prefix)).count()
    }
}

impl Default for TestServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn handle_connection(mut stream: TcpStream, routes: &Routes, hits: &Mutex<Vec<String>>) {
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));

    let Some(path) = read_request_path(&mut stream) else {
        return;
    };
    if let Ok(mut hits) = hits.lock() {
        hits.push(path.clone());
    }

    let route = routes
        .lock()
        .ok()
        .and_then(|routes| {
            routes
                .iter()
                .find(|(prefix, _)| path.starts_with(prefix.as_str()))
                .map(|(_, route)| route.clone())
        })
        .unwrap_or_else(|| Route::status(404));

    if let Some(delay) = route.delay {
        std::thread::sleep(delay);
    }

    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nConnection: close\r\n",
        route.status,
        reason(route.status),
        route.content_type
    );
    if route.send_length {
        head.push_str(&format!("Content-Length: {}\r\n", route.body.len()));
    }
    head.push_str("\r\n");
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }

    match route.stall {
        Some((bytes, pause)) => {
            let sent = bytes.min(route.body.len());
            let _ = stream.write_all(&route.body[..sent]);
            let _ = stream.flush();
            std::thread::sleep(pause);
            let _ = stream.write_all(&route.body[sent..]);
        }
        None => {
            let _ = stream.write_all(&route.body);
        }
    }
    let _ = stream.flush();
    let _ = stream.shutdown(std::net::Shutdown::Write);
}

fn read_request_path(stream: &mut TcpStream) -> Option<String> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];
    while !buffer.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = stream.read(&mut chunk).ok()?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    let request = String::from_utf8_lossy(&buffer);
    let request_line = request.lines().next()?;
    request_line.split_whitespace().nth(1).map(ToString::to_string)
}

const fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
