//! The request assembler (C4): turns a freshly accepted socket plus a
//! worker's receive buffer into a `(Request, Response)` pair.

use std::io::{Cursor, Read};
use std::net::TcpStream;

use log::{debug, info, warn};

use crate::http::body::{is_chunked, ChunkedBodyReader};
use crate::http::parser::{self, ParseError};
use crate::http::{Request, Response};
use crate::io_adapters::ConcatStream;
use crate::multimap::MultiMap;

/// Why assembly failed; in every case the caller must abandon (close)
/// the socket.
#[derive(Debug)]
pub enum AssembleError {
    /// The initial read returned 0 bytes or an I/O error.
    ReadFailed,
    /// The parser could not make sense of what was read.
    Parse(ParseError),
}

/// Performs exactly one read into `buffer`, parses the head, and builds
/// the request/response pair, wiring the request body to start with
/// whatever of `buffer` wasn't consumed by the head followed by the
/// rest of the socket. `default_headers` are added to the response
/// before `Connection: close`.
pub fn assemble(
    mut socket: TcpStream,
    buffer: &mut [u8],
    default_headers: &MultiMap<String, String>,
) -> Result<(Request, Response<TcpStream>), AssembleError> {
    let remote_addr = socket.peer_addr().map_err(|err| {
        warn!("abandoning connection: failed to read peer address: {}", err);
        AssembleError::ReadFailed
    })?;

    let filled = socket.read(buffer).map_err(|err| {
        warn!("abandoning connection from {}: read failed: {}", remote_addr, err);
        AssembleError::ReadFailed
    })?;
    if filled == 0 {
        info!("abandoning connection from {}: peer closed before sending a request", remote_addr);
        return Err(AssembleError::ReadFailed);
    }

    let head = match parser::parse(&buffer[..filled]) {
        Ok(head) => head,
        Err(ParseError::Incomplete) => {
            debug!("request head incomplete after single read; abandoning connection");
            return Err(AssembleError::Parse(ParseError::Incomplete));
        }
        Err(err @ (ParseError::Malformed | ParseError::VersionUnsupported)) => {
            warn!("malformed or unsupported request from {}: {:?}", remote_addr, err);
            return Err(AssembleError::Parse(err));
        }
    };

    let leftover = buffer[head.consumed..filled].to_vec();
    let body_socket = socket.try_clone().map_err(|_| AssembleError::ReadFailed)?;
    let concatenated = ConcatStream::new(Cursor::new(leftover), body_socket);

    let body: Box<dyn Read + Send> = if is_chunked(&head.headers) {
        Box::new(ChunkedBodyReader::new(concatenated))
    } else {
        Box::new(concatenated)
    };

    let request = Request::new(
        head.method,
        head.path,
        head.minor_version,
        head.headers,
        head.query,
        remote_addr,
        body,
    );

    let response_socket = socket;
    let mut response = Response::new(response_socket);
    for (name, value) in default_headers.iter() {
        response.add_header(name.clone(), value.clone());
    }
    response.add_header("Connection", "close");

    Ok((request, response))
}
