//! Connection handling
//!
//! Owns the TCP stream to the microservice and moves whole frames across
//! it: encoding outbound requests, buffering inbound bytes until a complete
//! reply line is available.

use bytes::BytesMut;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::{CodecError, Decoder, Encoder, Request, Response};

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("connection closed")]
    Closed,

    #[error("timed out waiting for reply")]
    Timeout,
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// One established connection to the microservice
pub struct Connection {
    /// Remote peer address
    remote_addr: SocketAddr,
    /// The TCP stream
    stream: TcpStream,
    /// Protocol encoder
    encoder: Encoder,
    /// Protocol decoder
    decoder: Decoder,
    /// Read buffer, may hold a partial frame between reads
    read_buf: BytesMut,
    /// Write buffer
    write_buf: BytesMut,
}

impl Connection {
    /// Create a new connection from an established TCP stream
    pub fn new(stream: TcpStream, remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            stream,
            encoder: Encoder::new(),
            decoder: Decoder::new(),
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(4096),
        }
    }

    /// Get the remote address
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Send one request as a single frame
    pub async fn send(&mut self, request: &Request) -> ConnectionResult<()> {
        self.write_buf.clear();
        self.encoder.encode(request, &mut self.write_buf)?;

        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;

        tracing::debug!(kind = request.kind(), bytes = self.write_buf.len(), "frame sent");
        Ok(())
    }

    /// Receive one reply (returns None on clean close before a frame starts)
    pub async fn recv(&mut self) -> ConnectionResult<Option<Response>> {
        loop {
            if let Some(response) = self.decoder.decode(&mut self.read_buf)? {
                tracing::debug!(kind = response.kind(), "frame received");
                return Ok(Some(response));
            }

            let mut buf = [0u8; 4096];
            let n = self.stream.read(&mut buf).await?;

            if n == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None); // Clean close
                } else {
                    return Err(ConnectionError::Closed); // Torn frame
                }
            }

            self.read_buf.extend_from_slice(&buf[..n]);
        }
    }

    /// Receive one reply with a timeout
    pub async fn recv_timeout(&mut self, timeout: Duration) -> ConnectionResult<Option<Response>> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout),
        }
    }

    /// Close the connection gracefully
    pub async fn close(&mut self) -> ConnectionResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    async fn connected_pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let (peer, _) = listener.accept().await.unwrap();

        (Connection::new(client, addr), peer)
    }

    #[tokio::test]
    async fn test_send_writes_one_line() {
        let (mut conn, peer) = connected_pair().await;

        conn.send(&Request::Predict {
            trip_distance: 15.4,
            datetime: "2023-04-04T14:11:00+11:00".to_string(),
        })
        .await
        .unwrap();

        let mut reader = BufReader::new(peer);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();

        assert_eq!(
            line.trim_end(),
            r#"{"type":"PRED","trip_distance":15.4,"datetime":"2023-04-04T14:11:00+11:00"}"#
        );
    }

    #[tokio::test]
    async fn test_recv_across_split_writes() {
        let (mut conn, mut peer) = connected_pair().await;

        let wire = b"{\"type\":\"PRED\",\"prediction\":0.82,\"expected_revenue\":23.1}\n";
        let (head, tail) = wire.split_at(17);

        peer.write_all(head).await.unwrap();
        peer.flush().await.unwrap();

        let recv = tokio::spawn(async move { (conn.recv().await, conn) });

        tokio::time::sleep(Duration::from_millis(20)).await;
        peer.write_all(tail).await.unwrap();
        peer.flush().await.unwrap();

        let (result, _conn) = recv.await.unwrap();
        let response = result.unwrap().unwrap();
        assert_eq!(response.kind(), "PRED");
    }

    #[tokio::test]
    async fn test_recv_clean_close() {
        let (mut conn, peer) = connected_pair().await;
        drop(peer);

        assert!(conn.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recv_timeout() {
        let (mut conn, _peer) = connected_pair().await;

        let result = conn.recv_timeout(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(ConnectionError::Timeout)));
    }
}
