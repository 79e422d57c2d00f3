//! An embeddable HTTP/1.1 server core: byte-stream adapters, a
//! request/response model, a blocking worker pool, and an optional
//! WebSocket subsystem, for hosts that want to drive their own
//! request routing on top of a small, dependency-light foundation.

pub mod assembler;
pub mod error;
pub mod http;
pub mod io_adapters;
pub mod method;
pub mod multimap;
pub mod pool;
pub mod routing;
pub mod server;
pub mod status;
pub mod url;
pub mod websocket;
pub mod worker;

pub use error::{Error, HandlerError, StatusError};
pub use http::{ParseError, Request, Response, ResponseBody};
pub use method::Method;
pub use multimap::MultiMap;
pub use pool::{PoolHealth, WorkerPool};
pub use routing::{Handler, HandlerMapping, PathPattern, Router};
pub use server::{Config, ConfigBuilder, Server};
pub use status::StatusCode;
pub use websocket::{ConnectionHandle, MessageHandler, WebSocketManager};
pub use worker::RequestHandler;
