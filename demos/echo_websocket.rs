use std::net::TcpStream;
use std::sync::Arc;

use kiln::{ConfigBuilder, ConnectionHandle, MessageHandler, Request, Response, Server, WebSocketManager};
use uuid::Uuid;

struct Echo;

impl MessageHandler for Echo {
    fn on_text(&self, connection: &ConnectionHandle, text: String) {
        let _ = connection.send_text(&text);
    }

    fn on_binary(&self, connection: &ConnectionHandle, data: Vec<u8>) {
        let _ = connection.send_binary(&data);
    }

    fn on_close(&self, connection_id: Uuid, status: u16, _message: Vec<u8>) {
        println!("connection {} closed with status {}", connection_id, status);
    }
}

fn main() {
    env_logger::init();

    let manager = Arc::new(WebSocketManager::start(Arc::new(Echo) as Arc<dyn MessageHandler>).unwrap());

    let request_handler = {
        let manager = manager.clone();
        move |request: &mut Request, response: &mut Response<TcpStream>| {
            if request.header("Upgrade").map(|v| v.eq_ignore_ascii_case("websocket")).unwrap_or(false) {
                if manager.accept_upgrade(request, response).is_err() {
                    response.set_status(kiln::StatusCode::new(400));
                    let _ = response.write_body_string("expected a WebSocket upgrade", None);
                }
            } else {
                let _ = response.write_body_string("send an Upgrade: websocket request to talk to me", None);
            }
            Ok(())
        }
    };

    let config = ConfigBuilder::new().port(8081).enable_websockets(true).build();
    let server = Server::new();

    println!("listening on http://127.0.0.1:8081 (WebSocket echo)");
    server.start(config, Arc::new(request_handler), Some(manager)).unwrap();
}
