use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcConfig {
    pub port: u16,
    pub client_id: String,
    pub origin: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub connect_timeout: Duration,
    pub token_timeout: Duration,
    /// Upper bound on ticks skipped between connect attempts; `0` retries every tick.
    pub max_backoff_ticks: u32,
    /// Ticks to wait before restarting authorization after a failed exchange.
    pub auth_retry_ticks: u32,
    pub message_limit: usize,
}

pub const DEFAULT_PORT: u16 = 6463;
pub const DEFAULT_CLIENT_ID: &str = "207646673902501888";
pub const DEFAULT_ORIGIN: &str = "https://streamkit.discord.com";
pub const DEFAULT_TOKEN_URL: &str = "https://streamkit.discord.com/overlay/token";
pub const DEFAULT_SCOPES: [&str; 2] = ["rpc", "messages.read"];

impl RpcConfig {
    pub fn new(client_id: String) -> Self {
        Self {
            client_id,
            ..Default::default()
        }
    }

    pub fn socket_url(&self) -> String {
        format!(
            "ws://127.0.0.1:{}/?v=1&client_id={}",
            self.port, self.client_id
        )
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|scope| scope.to_string()).collect(),
            connect_timeout: Duration::from_millis(250),
            token_timeout: Duration::from_secs(10),
            max_backoff_ticks: 300,
            auth_retry_ticks: 600,
            message_limit: 200,
        }
    }
}
