use std::net::TcpStream;
use std::sync::Arc;

use kiln::{ConfigBuilder, Handler, HandlerError, HandlerMapping, Method, PathPattern, Request, Response, Router, Server};

fn greet(request: &mut Request, response: &mut Response<TcpStream>) -> Result<(), HandlerError> {
    let name = request.path_params().get_first(&"name".to_string()).cloned().unwrap_or_else(|| "world".to_string());
    response.write_body_string(&format!("Hello, {}!", name), None).unwrap();
    Ok(())
}

fn main() {
    env_logger::init();

    let router: Arc<Router<TcpStream>> = Arc::new(Router::new(vec![
        HandlerMapping::new(
            Arc::new(greet as fn(&mut Request, &mut Response<TcpStream>) -> Result<(), HandlerError>) as Arc<dyn Handler<TcpStream>>,
            Method::GET,
            vec![PathPattern::parse("/hello/{name}"), PathPattern::parse("/hello")],
        ),
    ]));

    let config = ConfigBuilder::new().port(8080).build();
    let server = Server::new();

    let handler = move |request: &mut Request, response: &mut Response<TcpStream>| {
        if !router.dispatch(request, response) {
            response.set_status(kiln::StatusCode::new(404));
            let _ = response.write_body_string("not found", None);
        }
        Ok(())
    };

    println!("listening on http://127.0.0.1:8080");
    server.start(config, Arc::new(handler), None).unwrap();
}
