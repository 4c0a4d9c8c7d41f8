//! Command-line flags for the standalone connector.

use clap::Parser;

use crate::rpc::config::{RpcConfig, DEFAULT_CLIENT_ID, DEFAULT_ORIGIN, DEFAULT_PORT, DEFAULT_TOKEN_URL};

/// Mirror voice presence and chat from a locally running voice client
#[derive(Parser, Debug)]
#[command(name = "voice-rpc")]
#[command(version)]
pub struct Cli {
    /// Loopback port of the client's RPC socket
    #[arg(long, env = "VOICE_RPC_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Application id presented to the client
    #[arg(long, env = "VOICE_RPC_CLIENT_ID", default_value = DEFAULT_CLIENT_ID)]
    pub client_id: String,

    /// Origin header sent with the socket handshake
    #[arg(long, env = "VOICE_RPC_ORIGIN", default_value = DEFAULT_ORIGIN)]
    pub origin: String,

    /// Endpoint that trades an authorization code for an access token
    #[arg(long, env = "VOICE_RPC_TOKEN_URL", default_value = DEFAULT_TOKEN_URL)]
    pub token_url: String,

    /// Text channel whose messages are mirrored
    #[arg(long, env = "VOICE_RPC_TEXT_CHANNEL")]
    pub text_channel: Option<String>,

    /// Messages kept for the mirrored text channel
    #[arg(long, default_value_t = 200)]
    pub message_limit: usize,

    /// Pump frequency
    #[arg(long, default_value_t = 60)]
    pub tick_rate: u32,
}

impl Cli {
    pub fn to_config(&self) -> RpcConfig {
        RpcConfig {
            port: self.port,
            origin: self.origin.clone(),
            token_url: self.token_url.clone(),
            message_limit: self.message_limit,
            ..RpcConfig::new(self.client_id.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use crate::rpc::config::{DEFAULT_CLIENT_ID, DEFAULT_PORT};
    use clap::Parser;

    /// Without flags the protocol defaults are used.
    #[test]
    fn defaults_match_protocol_constants() {
        // Arrange
        // Act
        let cli = Cli::try_parse_from(["voice-rpc"]).expect("parse failed");
        let config = cli.to_config();
        // Assert
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(cli.tick_rate, 60);
        assert!(cli.text_channel.is_none());
    }

    /// Flags override the matching config fields.
    #[test]
    fn flags_override_config() {
        // Arrange
        let args = [
            "voice-rpc",
            "--port",
            "6470",
            "--client-id",
            "42",
            "--text-channel",
            "t1",
            "--message-limit",
            "10",
        ];
        // Act
        let cli = Cli::try_parse_from(args).expect("parse failed");
        let config = cli.to_config();
        // Assert
        assert_eq!(config.port, 6470);
        assert_eq!(config.client_id, "42");
        assert_eq!(config.message_limit, 10);
        assert_eq!(cli.text_channel.as_deref(), Some("t1"));
        assert_eq!(config.socket_url(), "ws://127.0.0.1:6470/?v=1&client_id=42");
    }
}
