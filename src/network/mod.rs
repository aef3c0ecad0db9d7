//! Network module - the persistent connection to the modelling microservice
//!
//! Provides:
//! - Connection owning the TCP stream and moving whole frames across it
//! - Client enforcing the handshake-before-use and one-outstanding-request
//!   contracts

mod client;
mod connection;

pub use client::*;
pub use connection::*;

use std::net::SocketAddr;

/// Resolve a hostname to a socket address
pub async fn resolve_host(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    let addr_string = format!("{}:{}", host, port);
    let mut addrs = lookup_host(&addr_string).await?;

    addrs.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Could not resolve host: {}", host),
        )
    })
}
