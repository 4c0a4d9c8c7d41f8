use crate::transport::types::ConnectionState;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectorEvent {
    ConnectionState(ConnectionState),
    /// Recoverable failure the user should see, e.g. a declined authorization.
    Error(String),
    Authenticated { user_id: String },
    VoiceChannel(Option<String>),
}
