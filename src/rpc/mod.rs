pub mod auth;
pub mod config;
pub mod connector;
pub mod events;
pub mod link;
pub mod protocol;
pub mod sinks;
pub mod state;
pub mod subscriptions;

#[cfg(not(feature = "coverage"))]
pub use auth::HttpTokenClient;
pub use auth::{
    AuthFlow, AuthState, NoopTokenExchange, ThreadedTokenExchange, TokenClient, TokenExchange,
};
pub use config::RpcConfig;
pub use connector::RpcConnector;
pub use events::ConnectorEvent;
#[cfg(not(feature = "coverage"))]
pub use link::WebSocketConnector;
pub use link::{Link, LinkConnector, LinkRequest, OfflineConnector, RpcSocket};
pub use protocol::{Command, CommandFrame, Event};
pub use sinks::{
    ChannelPicker, LogChannelPicker, LogTextSink, LogVoiceSink, Surfaces, TextSink, VoiceSink,
};
pub use state::{StateStore, UserPatch};
