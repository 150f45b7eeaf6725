//! Loopback networking helpers.

use std::io;

use tokio::net::TcpListener;

/// Host all supervised services bind and connect on.
pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// Asks the OS for a currently-free ephemeral port.
///
/// Binds `127.0.0.1:0`, reads the assigned port, and releases the listener.
/// The port is not reserved after this returns; the caller is expected to
/// bind (or hand it to a spawned process) promptly.
pub async fn ephemeral_port() -> io::Result<u16> {
    let listener = TcpListener::bind((LOOPBACK_HOST, 0)).await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

/// Formats a loopback `host:port` address.
pub fn loopback_address(port: u16) -> String {
    format!("{LOOPBACK_HOST}:{port}")
}
