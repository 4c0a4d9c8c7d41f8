use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport disconnected")]
    Disconnected,
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("link closed by peer")]
    Closed,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("token exchange failed: {0}")]
    Http(String),
    #[error("token exchange response carried no access token")]
    MissingToken,
    #[error("authorization denied: {0}")]
    Denied(String),
    #[error("token exchange worker stopped without a result")]
    WorkerGone,
}
