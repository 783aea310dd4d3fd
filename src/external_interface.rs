//! External Interface Module
//!
//! Unix socket front end for the registry. Each connection carries one
//! framed [`Invocation`] and receives one framed [`Response`]. Connections are
//! served one at a time, so operations never interleave.

use std::fs;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::dispatch::Dispatcher;
use crate::protocol::{
    deserialize_invocation, deserialize_response, read_frame, serialize_invocation,
    serialize_response, write_frame, Invocation, Response,
};
use crate::storage::KeyValueStore;

/// Bind the registry socket, replacing a stale socket file left by an earlier run.
pub fn bind_socket(socket_path: &Path) -> Result<UnixListener> {
    if socket_path.exists() {
        fs::remove_file(socket_path).context(format!(
            "Failed to remove existing socket at {}",
            socket_path.display()
        ))?;
    }
    UnixListener::bind(socket_path).context(format!(
        "Failed to bind Unix socket at {}",
        socket_path.display()
    ))
}

/// Bind `socket_path` and serve requests until the listener fails.
pub fn start_socket_server<S: KeyValueStore>(
    dispatcher: Dispatcher<S>,
    socket_path: &Path,
) -> Result<()> {
    let listener = bind_socket(socket_path)?;
    info!(socket = %socket_path.display(), "Registry socket listening");
    serve(&listener, dispatcher, None)
}

/// Accept connections on `listener`, stopping after `max_connections` when set.
pub fn serve<S: KeyValueStore>(
    listener: &UnixListener,
    mut dispatcher: Dispatcher<S>,
    max_connections: Option<usize>,
) -> Result<()> {
    let mut served = 0usize;
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                if let Err(e) = handle_client(stream, &mut dispatcher) {
                    error!("Error handling client request: {:#}", e);
                }
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
        served += 1;
        if max_connections.is_some_and(|max| served >= max) {
            break;
        }
    }
    Ok(())
}

/// Handle an individual client connection
fn handle_client<S: KeyValueStore>(
    mut stream: UnixStream,
    dispatcher: &mut Dispatcher<S>,
) -> Result<()> {
    let body = read_frame(&mut stream)?;

    let response = match deserialize_invocation(&body) {
        Ok(mut invocation) => {
            if invocation.timestamp.is_none() {
                invocation.timestamp = Some(Utc::now().timestamp());
            }
            dispatcher.invoke(&invocation)
        }
        Err(e) => {
            warn!("Rejecting malformed request: {:#}", e);
            Response::Error {
                kind: "ProtocolError".to_string(),
                message: format!("{:#}", e),
            }
        }
    };

    let response_bytes = serialize_response(&response)?;
    write_frame(&mut stream, &response_bytes)
}

/// Send one invocation to a running registry and wait for its response.
pub fn send_invocation(socket_path: &Path, invocation: &Invocation) -> Result<Response> {
    let mut stream = UnixStream::connect(socket_path).context(format!(
        "Failed to connect to registry socket at {}",
        socket_path.display()
    ))?;
    write_frame(&mut stream, &serialize_invocation(invocation)?)?;
    let body = read_frame(&mut stream)?;
    deserialize_response(&body)
}
