//! Single-threaded HTTP server.
//!
//! One connection at a time: accept, parse, dispatch, respond, close. A
//! handler that blocks (scan, station connect, time sync) holds up the next
//! accept, which is fine for a portal with one user.

use super::request::{read_request, HttpRequest};
use super::response::{HttpResponse, StatusCode};
use log::{debug, error, info, warn};
use std::error::Error;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

/// Most unread input discarded while closing a connection.
const DRAIN_LIMIT: usize = 16 * 1024;

/// How long to wait for the peer while draining.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Result type for route handlers.
pub type HandlerResult = Result<HttpResponse, Box<dyn Error + Send + Sync>>;

/// The portal's routes.
pub trait Handler {
    /// `GET /`
    fn index(&mut self, request: &HttpRequest) -> HandlerResult;

    /// `GET /scan`
    fn scan(&mut self, request: &HttpRequest) -> HandlerResult;

    /// `POST /configure`
    fn configure(&mut self, request: &HttpRequest) -> HandlerResult;

    /// Called by [`HttpServer`] once the response is written and the
    /// connection closed.
    fn after_response(&mut self) {}
}

/// Route on exact method and path. Anything else is an empty 404.
///
/// `POST /configure` without `Content-Length` is answered with 411 and never
/// reaches the handler.
pub fn dispatch<H: Handler + ?Sized>(handler: &mut H, request: &HttpRequest) -> HandlerResult {
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => handler.index(request),
        ("GET", "/scan") => handler.scan(request),
        ("POST", "/configure") if request.content_length.is_none() => {
            warn!("POST /configure without Content-Length");
            Ok(HttpResponse::empty(StatusCode::LengthRequired))
        }
        ("POST", "/configure") => handler.configure(request),
        _ => Ok(HttpResponse::empty(StatusCode::NotFound)),
    }
}

/// Handle one request on an open stream.
///
/// Never fails: parse errors get a 4xx or a silent close, handler errors and
/// panics get an empty 500, and send failures are logged.
pub fn handle_connection<S, H>(stream: &mut S, handler: &mut H)
where
    S: Read + Write,
    H: Handler + ?Sized,
{
    let request = match read_request(&mut *stream) {
        Ok(request) => request,
        Err(e) => {
            match e.status() {
                Some(status) => {
                    warn!("Rejecting request: {}", e);
                    send(stream, &HttpResponse::empty(status));
                }
                None => debug!("Dropping connection: {}", e),
            }
            return;
        }
    };

    debug!("{} {}", request.method, request.path);

    let response = match panic::catch_unwind(AssertUnwindSafe(|| dispatch(handler, &request))) {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            error!("Handler for {} {} failed: {}", request.method, request.path, e);
            HttpResponse::empty(StatusCode::InternalServerError)
        }
        Err(_) => {
            error!("Handler for {} {} panicked", request.method, request.path);
            HttpResponse::empty(StatusCode::InternalServerError)
        }
    };

    send(stream, &response);
}

fn send<W: Write>(stream: &mut W, response: &HttpResponse) {
    if let Err(e) = response.write_to(stream) {
        warn!("Failed to send {} response: {}", response.status().code(), e);
    }
}

/// Closes the stream when dropped, on every exit path.
///
/// Closing a socket with unread input resets the connection, which can
/// discard a response still in flight. The write side is shut first and
/// whatever the peer still sends is drained, up to [`DRAIN_LIMIT`] bytes or
/// [`DRAIN_TIMEOUT`] of silence.
struct ConnectionGuard(TcpStream);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let _ = self.0.flush();
        if self.0.shutdown(Shutdown::Write).is_ok()
            && self.0.set_read_timeout(Some(DRAIN_TIMEOUT)).is_ok()
        {
            let mut buf = [0u8; 512];
            let mut drained = 0;
            while drained < DRAIN_LIMIT {
                match self.0.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => drained += n,
                }
            }
            if drained > 0 {
                debug!("Discarded {} unread bytes", drained);
            }
        }
        let _ = self.0.shutdown(Shutdown::Both);
    }
}

/// Blocking HTTP listener.
pub struct HttpServer {
    listener: TcpListener,
}

impl HttpServer {
    /// Bind to `ip:port`.
    pub fn bind(ip: IpAddr, port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind((ip, port))?;
        info!("HTTP server listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and fully handle one connection.
    ///
    /// [`Handler::after_response`] runs after the connection is closed.
    pub fn serve_one<H: Handler + ?Sized>(&self, handler: &mut H) -> io::Result<()> {
        let (stream, peer) = self.listener.accept()?;
        debug!("Connection from {}", peer);

        {
            let mut guard = ConnectionGuard(stream);
            handle_connection(&mut guard.0, handler);
        }
        handler.after_response();
        Ok(())
    }

    /// Serve forever. Accept errors are logged and the loop continues.
    pub fn serve<H: Handler + ?Sized>(&self, handler: &mut H) -> ! {
        loop {
            if let Err(e) = self.serve_one(handler) {
                warn!("Accept failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::Ipv4Addr;

    /// Reads scripted input, captures output.
    struct MockStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl MockStream {
        fn new(request: &str) -> Self {
            Self {
                input: Cursor::new(request.as_bytes().to_vec()),
                output: Vec::new(),
            }
        }

        fn response(&self) -> String {
            String::from_utf8_lossy(&self.output).into_owned()
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Names the route it was called on.
    #[derive(Default)]
    struct RouteEcho {
        fail: bool,
        panic: bool,
        calls: Vec<&'static str>,
        finished: usize,
    }

    impl RouteEcho {
        fn respond(&mut self, route: &'static str) -> HandlerResult {
            self.calls.push(route);
            if self.panic {
                panic!("handler exploded");
            }
            if self.fail {
                return Err("radio went away".into());
            }
            Ok(HttpResponse::from_string(route))
        }
    }

    impl Handler for RouteEcho {
        fn index(&mut self, _request: &HttpRequest) -> HandlerResult {
            self.respond("index")
        }

        fn scan(&mut self, _request: &HttpRequest) -> HandlerResult {
            self.respond("scan")
        }

        fn configure(&mut self, request: &HttpRequest) -> HandlerResult {
            assert!(!request.body.is_empty());
            self.respond("configure")
        }

        fn after_response(&mut self) {
            self.finished += 1;
        }
    }

    fn run(handler: &mut RouteEcho, request: &str) -> String {
        let mut stream = MockStream::new(request);
        handle_connection(&mut stream, handler);
        stream.response()
    }

    // ==================== Routing Tests ====================

    #[test]
    fn test_routes() {
        let mut handler = RouteEcho::default();
        assert!(run(&mut handler, "GET / HTTP/1.1\r\n\r\n").ends_with("index"));
        assert!(run(&mut handler, "GET /scan HTTP/1.1\r\n\r\n").ends_with("scan"));
        assert!(run(
            &mut handler,
            "POST /configure HTTP/1.1\r\nContent-Length: 4\r\n\r\nssid"
        )
        .ends_with("configure"));
        assert_eq!(handler.calls, vec!["index", "scan", "configure"]);
    }

    #[test]
    fn test_query_does_not_affect_route() {
        let mut handler = RouteEcho::default();
        assert!(run(&mut handler, "GET /?ssid=Home HTTP/1.1\r\n\r\n").ends_with("index"));
    }

    #[test]
    fn test_unknown_route_404() {
        let mut handler = RouteEcho::default();
        for request in [
            "GET /favicon.ico HTTP/1.1\r\n\r\n",
            "POST / HTTP/1.1\r\nContent-Length: 0\r\n\r\n",
            "GET /configure HTTP/1.1\r\n\r\n",
            "DELETE /scan HTTP/1.1\r\n\r\n",
            "POST /foo HTTP/1.1\r\n\r\n",
            "POST /scan HTTP/1.1\r\n\r\n",
        ] {
            let response = run(&mut handler, request);
            assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"), "{}", request);
            assert!(response.ends_with("Content-Length: 0\r\nConnection: close\r\n\r\n"));
        }
        assert!(handler.calls.is_empty());
    }

    // ==================== Protocol Error Tests ====================

    #[test]
    fn test_post_without_length_411() {
        let mut handler = RouteEcho::default();
        let response = run(&mut handler, "POST /configure HTTP/1.1\r\n\r\nssid=Home");
        assert!(response.starts_with("HTTP/1.1 411 Length Required\r\n"));
        assert!(handler.calls.is_empty());
    }

    #[test]
    fn test_too_many_headers_400() {
        let mut handler = RouteEcho::default();
        let mut request = String::from("GET / HTTP/1.1\r\n");
        for i in 0..=crate::http::request::MAX_HEADERS {
            request.push_str(&format!("X-Filler-{}: x\r\n", i));
        }
        request.push_str("\r\n");

        let response = run(&mut handler, &request);
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(handler.calls.is_empty());
    }

    #[test]
    fn test_bad_length_400() {
        let mut handler = RouteEcho::default();
        let response = run(
            &mut handler,
            "POST /configure HTTP/1.1\r\nContent-Length: -1\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[test]
    fn test_truncated_request_gets_no_response() {
        let mut handler = RouteEcho::default();
        assert_eq!(run(&mut handler, "GET / HTTP/1.1\r\nHost"), "");
        assert_eq!(
            run(
                &mut handler,
                "POST /configure HTTP/1.1\r\nContent-Length: 20\r\n\r\nssid"
            ),
            ""
        );
        assert!(handler.calls.is_empty());
    }

    // ==================== Handler Failure Tests ====================

    #[test]
    fn test_handler_error_500() {
        let mut handler = RouteEcho {
            fail: true,
            ..Default::default()
        };
        let response = run(&mut handler, "GET /scan HTTP/1.1\r\n\r\n");
        assert_eq!(
            response,
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn test_handler_panic_500() {
        let mut handler = RouteEcho {
            panic: true,
            ..Default::default()
        };
        let response = run(&mut handler, "GET / HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    }

    #[test]
    fn test_send_failure_swallowed() {
        struct BrokenPipe(Cursor<Vec<u8>>);

        impl Read for BrokenPipe {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                self.0.read(buf)
            }
        }

        impl Write for BrokenPipe {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut stream = BrokenPipe(Cursor::new(b"GET / HTTP/1.1\r\n\r\n".to_vec()));
        let mut handler = RouteEcho::default();
        handle_connection(&mut stream, &mut handler);
        assert_eq!(handler.calls, vec!["index"]);
    }

    // ==================== Listener Tests ====================

    #[test]
    fn test_serve_one_over_loopback() {
        let server = HttpServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).unwrap();
        let addr = server.local_addr().unwrap();

        let client = std::thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(b"GET /scan HTTP/1.1\r\nHost: portal\r\n\r\n").unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).unwrap();
            response
        });

        let mut handler = RouteEcho::default();
        server.serve_one(&mut handler).unwrap();

        let response = client.join().unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Connection: close\r\n"));
        assert!(response.ends_with("\r\n\r\nscan"));
        assert_eq!(handler.finished, 1);
    }

    #[test]
    fn test_handle_connection_leaves_after_response_to_server() {
        let mut handler = RouteEcho::default();
        run(&mut handler, "GET / HTTP/1.1\r\n\r\n");
        assert_eq!(handler.finished, 0);
    }

    #[test]
    fn test_rejected_body_still_gets_response() {
        let server = HttpServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).unwrap();
        let addr = server.local_addr().unwrap();

        let client = std::thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            let body = vec![b'a'; 6000];
            let head = format!(
                "POST /configure HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(&body).unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).unwrap();
            response
        });

        let mut handler = RouteEcho::default();
        server.serve_one(&mut handler).unwrap();

        let response = client.join().unwrap();
        assert!(response.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
        assert!(handler.calls.is_empty());
    }
}
