use log::{info, trace, warn};
#[cfg(not(feature = "coverage"))]
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use crate::rpc::config::RpcConfig;
use crate::rpc::protocol::CommandFrame;
use crate::transport::errors::TransportError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkRequest {
    pub url: String,
    pub port: u16,
    pub origin: String,
    pub timeout: Duration,
}

impl LinkRequest {
    pub fn from_config(config: &RpcConfig) -> Self {
        Self {
            url: config.socket_url(),
            port: config.port,
            origin: config.origin.clone(),
            timeout: config.connect_timeout,
        }
    }
}

/// One open RPC socket. Reads never block.
pub trait RpcSocket {
    fn send_text(&mut self, text: String) -> Result<(), TransportError>;
    /// Returns the next text frame, or `None` when nothing is waiting.
    fn poll(&mut self) -> Result<Option<String>, TransportError>;
}

pub trait LinkConnector {
    fn connect(&mut self, request: &LinkRequest) -> Result<Box<dyn RpcSocket>, TransportError>;
}

/// Connector for environments without a local client; every attempt is refused.
#[derive(Debug, Default)]
pub struct OfflineConnector;

impl LinkConnector for OfflineConnector {
    fn connect(&mut self, _request: &LinkRequest) -> Result<Box<dyn RpcSocket>, TransportError> {
        Err(TransportError::Connect("offline".to_string()))
    }
}

#[cfg(not(feature = "coverage"))]
#[derive(Debug, Default)]
pub struct WebSocketConnector;

#[cfg(not(feature = "coverage"))]
impl LinkConnector for WebSocketConnector {
    fn connect(&mut self, request: &LinkRequest) -> Result<Box<dyn RpcSocket>, TransportError> {
        use tungstenite::client::IntoClientRequest;
        use tungstenite::http::header::{HeaderValue, ORIGIN};

        let mut http_request = request
            .url
            .as_str()
            .into_client_request()
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        let origin = HeaderValue::from_str(&request.origin)
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        http_request.headers_mut().insert(ORIGIN, origin);

        let address = SocketAddr::from(([127, 0, 0, 1], request.port));
        let stream = TcpStream::connect_timeout(&address, request.timeout)?;
        stream.set_read_timeout(Some(request.timeout))?;
        stream.set_nodelay(true)?;
        let (socket, _response) = tungstenite::client(http_request, stream)
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        socket.get_ref().set_read_timeout(None)?;
        socket.get_ref().set_nonblocking(true)?;
        Ok(Box::new(WebSocketLink { socket }))
    }
}

#[cfg(not(feature = "coverage"))]
struct WebSocketLink {
    socket: tungstenite::WebSocket<TcpStream>,
}

#[cfg(not(feature = "coverage"))]
fn is_would_block(error: &tungstenite::Error) -> bool {
    matches!(error, tungstenite::Error::Io(io) if io.kind() == std::io::ErrorKind::WouldBlock)
}

#[cfg(not(feature = "coverage"))]
fn map_socket_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        tungstenite::Error::Io(io) => TransportError::Io(io),
        other => TransportError::Protocol(other.to_string()),
    }
}

#[cfg(not(feature = "coverage"))]
impl RpcSocket for WebSocketLink {
    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        match self.socket.send(tungstenite::Message::Text(text)) {
            Ok(()) => Ok(()),
            // Queued in the write buffer; flushed on the next poll.
            Err(error) if is_would_block(&error) => Ok(()),
            Err(error) => Err(map_socket_error(error)),
        }
    }

    fn poll(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.socket.read() {
                Ok(tungstenite::Message::Text(text)) => return Ok(Some(text)),
                Ok(tungstenite::Message::Close(_)) => return Err(TransportError::Closed),
                Ok(_) => continue,
                Err(error) if is_would_block(&error) => {
                    return match self.socket.flush() {
                        Ok(()) => Ok(None),
                        Err(error) if is_would_block(&error) => Ok(None),
                        Err(error) => Err(map_socket_error(error)),
                    };
                }
                Err(error) => return Err(map_socket_error(error)),
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Open,
    Opened,
    Unavailable,
}

/// Tick-counted exponential backoff between connect attempts.
#[derive(Debug, Default)]
struct Backoff {
    max_ticks: u32,
    failures: u32,
    wait: u32,
}

impl Backoff {
    fn new(max_ticks: u32) -> Self {
        Self {
            max_ticks,
            ..Default::default()
        }
    }

    /// Returns `true` when this tick may attempt a connection.
    fn ready(&mut self) -> bool {
        if self.wait == 0 {
            return true;
        }
        self.wait -= 1;
        false
    }

    fn failed(&mut self) {
        self.failures = self.failures.saturating_add(1);
        let exponent = self.failures.saturating_sub(1).min(31);
        self.wait = (1u32 << exponent).min(self.max_ticks);
    }

    fn succeeded(&mut self) {
        self.failures = 0;
        self.wait = 0;
    }
}

/// Owns the single RPC socket.
pub struct Link {
    connector: Box<dyn LinkConnector>,
    socket: Option<Box<dyn RpcSocket>>,
    failure_logged: bool,
    backoff: Backoff,
}

impl Link {
    pub fn new(connector: Box<dyn LinkConnector>, max_backoff_ticks: u32) -> Self {
        Self {
            connector,
            socket: None,
            failure_logged: false,
            backoff: Backoff::new(max_backoff_ticks),
        }
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    pub fn ensure_connected(&mut self, request: &LinkRequest) -> LinkStatus {
        if self.socket.is_some() {
            return LinkStatus::Open;
        }
        if !self.backoff.ready() {
            return LinkStatus::Unavailable;
        }
        match self.connector.connect(request) {
            Ok(socket) => {
                info!("rpc link opened at {}", request.url);
                self.socket = Some(socket);
                self.failure_logged = false;
                self.backoff.succeeded();
                LinkStatus::Opened
            }
            Err(error) => {
                if self.failure_logged {
                    trace!("rpc link still unavailable: {error}");
                } else {
                    warn!("rpc link unavailable: {error}");
                    self.failure_logged = true;
                }
                self.backoff.failed();
                LinkStatus::Unavailable
            }
        }
    }

    pub fn on_close(&mut self) {
        if self.socket.take().is_some() {
            info!("rpc link closed");
        }
    }

    pub fn send(&mut self, frame: &CommandFrame) -> Result<(), TransportError> {
        let socket = self.socket.as_mut().ok_or(TransportError::Disconnected)?;
        socket.send_text(frame.encode()?)
    }

    pub fn poll(&mut self) -> Result<Option<String>, TransportError> {
        match self.socket.as_mut() {
            Some(socket) => socket.poll(),
            None => Ok(None),
        }
    }
}
