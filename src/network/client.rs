//! Microservice client
//!
//! Owns one persistent connection to the fare modelling service for its
//! whole lifetime and exposes the three protocol operations: `connect`
//! (which performs the mandatory INIT handshake before returning),
//! `initiation`, and `predict`.
//!
//! The protocol is strictly half-duplex: replies carry no request ID, the
//! next frame read off the wire belongs to the most recently written
//! request. The client therefore allows at most one outstanding request,
//! rejecting overlapping calls with [`ProtocolError::Busy`] rather than
//! letting request/reply pairing become undefined.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};

use super::connection::{Connection, ConnectionError};
use super::resolve_host;
use crate::config::Config;
use crate::protocol::{InitAck, Prediction, Request, Response};

/// Errors establishing the connection or completing the handshake
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection timeout")]
    Timeout,

    #[error("already connected")]
    AlreadyConnected,

    #[error("client is closed")]
    Closed,

    #[error("handshake failed: {0}")]
    Handshake(#[source] ProtocolError),
}

/// Errors on an individual request/reply exchange
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("connection is not ready")]
    NotReady,

    #[error("another request is outstanding")]
    Busy,

    #[error("connection closed before a reply arrived")]
    ConnectionClosed,

    #[error("unexpected reply type: expected {expected}, got {got}")]
    UnexpectedReply {
        expected: &'static str,
        got: &'static str,
    },
}

pub type ConnectResult<T> = Result<T, ConnectError>;
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Client state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Initial state, no connection yet
    Unconnected,
    /// TCP connect in progress
    Connecting,
    /// Transport up, INIT sent, waiting for the reply
    AwaitingHandshakeReply,
    /// Handshake complete, predictions may be issued
    Ready,
    /// Disconnected or failed; terminal
    Closed,
}

/// Client for the fare modelling microservice
pub struct Client {
    /// Connection and handshake parameters
    config: Config,
    /// Current state
    state: Arc<RwLock<ClientState>>,
    /// The one connection; the mutex is the single-outstanding-request guard
    conn: Arc<Mutex<Option<Connection>>>,
}

impl Client {
    /// Create a new client; no connection is opened until [`Client::connect`]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ClientState::Unconnected)),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    /// Get the current state
    pub async fn state(&self) -> ClientState {
        *self.state.read().await
    }

    /// Check whether the handshake has completed
    pub async fn is_ready(&self) -> bool {
        *self.state.read().await == ClientState::Ready
    }

    /// Connect to the microservice and perform the INIT handshake.
    ///
    /// When this returns Ok the connection is `Ready` and `predict` may be
    /// issued. On any failure the socket is closed before the error is
    /// returned and the client ends up `Closed`.
    pub async fn connect(&self, host: &str, port: u16) -> ConnectResult<()> {
        {
            let mut state = self.state.write().await;
            match *state {
                ClientState::Unconnected => *state = ClientState::Connecting,
                ClientState::Closed => return Err(ConnectError::Closed),
                _ => return Err(ConnectError::AlreadyConnected),
            }
        }

        tracing::info!("Connecting to {}:{}", host, port);

        let addr = match resolve_host(host, port).await {
            Ok(addr) => addr,
            Err(e) => {
                *self.state.write().await = ClientState::Closed;
                return Err(ConnectError::Io(e));
            }
        };

        let connect_timeout = Duration::from_millis(self.config.microservice.connect_timeout_ms);
        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                *self.state.write().await = ClientState::Closed;
                return Err(ConnectError::Io(e));
            }
            Err(_) => {
                *self.state.write().await = ClientState::Closed;
                return Err(ConnectError::Timeout);
            }
        };

        {
            let mut conn = self.conn.lock().await;
            *conn = Some(Connection::new(stream, addr));
        }
        *self.state.write().await = ClientState::AwaitingHandshakeReply;

        match self.initiation().await {
            Ok(ack) => {
                *self.state.write().await = ClientState::Ready;
                tracing::info!("Handshake complete with {}: {}", addr, ack.msg);
                Ok(())
            }
            Err(e) => {
                // No half-open leftovers: tear the socket down before
                // reporting the handshake failure.
                let mut conn = self.conn.lock().await;
                if let Some(mut conn) = conn.take() {
                    let _ = conn.close().await;
                }
                *self.state.write().await = ClientState::Closed;
                Err(ConnectError::Handshake(e))
            }
        }
    }

    /// Send the INIT handshake and wait for its acknowledgement.
    ///
    /// Invoked automatically by `connect`; also public so a caller can
    /// re-declare the training window on an already-ready connection.
    pub async fn initiation(&self) -> ProtocolResult<InitAck> {
        {
            let state = self.state.read().await;
            if !matches!(
                *state,
                ClientState::AwaitingHandshakeReply | ClientState::Ready
            ) {
                return Err(ProtocolError::NotReady);
            }
        }

        let mut guard = self.conn.try_lock().map_err(|_| ProtocolError::Busy)?;

        let request = Request::Init {
            tr_start: self.config.training.window_start.clone(),
            tr_end: self.config.training.window_end.clone(),
            db_name: self.config.database.name.clone(),
            db_host: self.config.database.host.clone(),
            db_port: self.config.database.port,
            db_username: self.config.database.username.clone(),
            db_password: self.config.database.password.clone(),
        };

        match self.round_trip(&mut guard, &request).await {
            Ok(Response::Init(ack)) => Ok(ack),
            Ok(other) => {
                tracing::warn!(got = other.kind(), "unexpected reply to INIT");
                Err(ProtocolError::UnexpectedReply {
                    expected: "INIT",
                    got: other.kind(),
                })
            }
            Err(e) => {
                self.fail_connection(&mut guard).await;
                Err(e)
            }
        }
    }

    /// Request a fare prediction for one trip.
    ///
    /// `datetime` must be an ISO-8601 string with a timezone offset;
    /// neither input is validated at this layer.
    pub async fn predict(&self, trip_distance: f64, datetime: &str) -> ProtocolResult<Prediction> {
        {
            let state = self.state.read().await;
            if *state != ClientState::Ready {
                return Err(ProtocolError::NotReady);
            }
        }

        let mut guard = self.conn.try_lock().map_err(|_| ProtocolError::Busy)?;

        let request = Request::Predict {
            trip_distance,
            datetime: datetime.to_string(),
        };

        match self.round_trip(&mut guard, &request).await {
            Ok(Response::Pred(prediction)) => Ok(prediction),
            Ok(other) => {
                tracing::warn!(got = other.kind(), "unexpected reply to PRED");
                Err(ProtocolError::UnexpectedReply {
                    expected: "PRED",
                    got: other.kind(),
                })
            }
            Err(e) => {
                self.fail_connection(&mut guard).await;
                Err(e)
            }
        }
    }

    /// Close the connection gracefully. Idempotent: closing an already
    /// closed client does nothing. Any operation issued afterwards fails.
    pub async fn disconnect(&self) {
        let mut guard = self.conn.lock().await;
        if let Some(mut conn) = guard.take() {
            let _ = conn.close().await;
            tracing::info!("Disconnected from {}", conn.remote_addr());
        }
        *self.state.write().await = ClientState::Closed;
    }

    /// Write one request and read the next frame as its reply.
    async fn round_trip(
        &self,
        guard: &mut Option<Connection>,
        request: &Request,
    ) -> ProtocolResult<Response> {
        let conn = guard.as_mut().ok_or(ProtocolError::ConnectionClosed)?;

        conn.send(request).await.map_err(ProtocolError::Connection)?;

        let read_timeout = Duration::from_millis(self.config.microservice.read_timeout_ms);
        match conn.recv_timeout(read_timeout).await? {
            Some(response) => Ok(response),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Tear down after a transport failure: the stream is in an unknown
    /// position in the reply sequence and cannot be reused.
    async fn fail_connection(&self, guard: &mut Option<Connection>) {
        if let Some(mut conn) = guard.take() {
            let _ = conn.close().await;
        }
        *self.state.write().await = ClientState::Closed;
        tracing::warn!("Connection failed; client closed");
    }
}
