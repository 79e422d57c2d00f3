//! End-to-end scenarios driven over real TCP sockets against a running
//! `Server`, exercising the library purely through its public API.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kiln::{ConfigBuilder, Request, Response, Server};

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Starts `server` in a background thread and blocks until it reports
/// ready, returning its bound address.
fn start(server: &Arc<Server>, config: kiln::Config, handler: Arc<dyn kiln::RequestHandler>) -> std::net::SocketAddr {
    let addr = ("127.0.0.1", config.port);
    let server_clone = Arc::clone(server);
    std::thread::spawn(move || server_clone.start(config, handler, None).unwrap());
    while !server.is_ready() {
        std::thread::sleep(Duration::from_millis(5));
    }
    std::net::ToSocketAddrs::to_socket_addrs(&addr).unwrap().next().unwrap()
}

fn send_request(addr: std::net::SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream.write_all(raw).unwrap();
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response);
    String::from_utf8(response).unwrap()
}

#[test]
fn plain_text_response_matches_expected_head_and_body() {
    let port = free_port();
    let config = ConfigBuilder::new().port(port).worker_pool_size(2).build();
    let server = Arc::new(Server::new());
    let handler: Arc<dyn kiln::RequestHandler> =
        Arc::new(|_req: &mut Request, resp: &mut Response<TcpStream>| {
            resp.write_body_string("Hello world!", None).unwrap();
            Ok(())
        });
    let addr = start(&server, config, handler);

    let text = send_request(addr, b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n");
    server.stop();

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("Content-Length: 12\r\n"));
    assert!(text.contains("Content-Type: text/plain; charset=utf-8\r\n"));
    assert!(text.contains("Connection: close\r\n"));
    assert!(text.ends_with("\r\n\r\nHello world!"));
}

fn sqrt_handler(request: &mut Request, response: &mut Response<TcpStream>) -> Result<(), kiln::HandlerError> {
    let mut body = Vec::new();
    let headers = request.headers().clone();
    kiln::http::body::read_body(request.body(), &headers, &mut body, false).unwrap();
    let text = String::from_utf8_lossy(&body);
    match text.trim().parse::<f64>() {
        Ok(n) if !text.trim().is_empty() => {
            response.write_body_string(&format!("{}", n.sqrt()), None).unwrap();
        }
        _ => {
            response.set_status(kiln::StatusCode::new(400));
            let _ = response.write_body_string("bad request", None);
        }
    }
    Ok(())
}

#[test]
fn computed_body_handler_returns_square_root() {
    let port = free_port();
    let config = ConfigBuilder::new().port(port).worker_pool_size(2).build();
    let server = Arc::new(Server::new());
    let handler: Arc<dyn kiln::RequestHandler> = Arc::new(sqrt_handler);
    let addr = start(&server, config, handler);

    let text = send_request(addr, b"POST /sqrt HTTP/1.1\r\nContent-Length: 2\r\n\r\n16");
    server.stop();

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.ends_with("4"));
}

#[test]
fn empty_body_request_to_same_handler_yields_400() {
    let port = free_port();
    let config = ConfigBuilder::new().port(port).worker_pool_size(2).build();
    let server = Arc::new(Server::new());
    let handler: Arc<dyn kiln::RequestHandler> = Arc::new(sqrt_handler);
    let addr = start(&server, config, handler);

    let text = send_request(addr, b"GET /sqrt HTTP/1.1\r\n\r\n");
    server.stop();

    assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}

/// Reduced-scale stand-in for a ten-thousand-request load run: fires a
/// smaller sequential batch and checks the same success-rate bar.
#[test]
fn sequential_batch_succeeds_above_threshold() {
    const REQUESTS: usize = 500;

    let port = free_port();
    let config = ConfigBuilder::new().port(port).worker_pool_size(4).build();
    let server = Arc::new(Server::new());
    let handler: Arc<dyn kiln::RequestHandler> =
        Arc::new(|_req: &mut Request, resp: &mut Response<TcpStream>| {
            resp.write_body_string("Testing server", None).unwrap();
            Ok(())
        });
    let addr = start(&server, config, handler);

    let successes = AtomicUsize::new(0);
    for _ in 0..REQUESTS {
        let text = send_request(addr, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        if text.starts_with("HTTP/1.1 200 OK\r\n") && text.ends_with("Testing server") {
            successes.fetch_add(1, Ordering::SeqCst);
        }
    }
    server.stop();

    let rate = successes.load(Ordering::SeqCst) as f64 / REQUESTS as f64;
    assert!(rate >= 0.9999, "success rate {} below threshold", rate);
}
