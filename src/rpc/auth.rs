use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
#[cfg(not(feature = "coverage"))]
use std::time::Duration;

use log::{debug, warn};
use serde::Deserialize;

use crate::transport::errors::AuthError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthState {
    Unauth,
    AwaitingCode,
    ExchangingToken,
    Authenticated,
    Error,
}

/// What the connector must do next to move the handshake forward.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthAction {
    Idle,
    Authorize,
    Exchange(String),
    Authenticate(String),
}

#[derive(Debug)]
pub struct AuthFlow {
    state: AuthState,
    access_token: Option<String>,
    retry_ticks: u32,
    retry_in: Option<u32>,
}

impl AuthFlow {
    pub fn new(retry_ticks: u32) -> Self {
        Self {
            state: AuthState::Unauth,
            access_token: None,
            retry_ticks,
            retry_in: None,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Starts the handshake for a freshly opened link, reusing a held token.
    pub fn start(&mut self) -> AuthAction {
        self.retry_in = None;
        match self.access_token.clone() {
            Some(token) => {
                self.state = AuthState::Authenticated;
                AuthAction::Authenticate(token)
            }
            None => {
                self.state = AuthState::AwaitingCode;
                AuthAction::Authorize
            }
        }
    }

    pub fn on_code(&mut self, code: String) -> AuthAction {
        if self.state != AuthState::AwaitingCode {
            warn!("ignoring authorization code in state {:?}", self.state);
            return AuthAction::Idle;
        }
        self.state = AuthState::ExchangingToken;
        AuthAction::Exchange(code)
    }

    pub fn on_token(&mut self, result: Result<String, AuthError>) -> Result<AuthAction, AuthError> {
        if self.state != AuthState::ExchangingToken {
            debug!("dropping token exchange result in state {:?}", self.state);
            return Ok(AuthAction::Idle);
        }
        match result {
            Ok(token) if !token.is_empty() => {
                self.access_token = Some(token.clone());
                self.state = AuthState::Authenticated;
                Ok(AuthAction::Authenticate(token))
            }
            Ok(_) => {
                self.fail();
                Err(AuthError::MissingToken)
            }
            Err(error) => {
                self.fail();
                Err(error)
            }
        }
    }

    /// The peer refused the token: forget it and ask for a new code.
    pub fn on_authenticate_error(&mut self) -> AuthAction {
        self.access_token = None;
        self.retry_in = None;
        self.state = AuthState::AwaitingCode;
        AuthAction::Authorize
    }

    /// Parks the flow in `Error` until the retry countdown elapses.
    pub fn fail(&mut self) {
        self.state = AuthState::Error;
        self.retry_in = Some(self.retry_ticks);
    }

    pub fn tick(&mut self) -> AuthAction {
        if self.state != AuthState::Error {
            return AuthAction::Idle;
        }
        match self.retry_in {
            Some(0) | None => {
                self.retry_in = None;
                self.state = AuthState::AwaitingCode;
                AuthAction::Authorize
            }
            Some(remaining) => {
                self.retry_in = Some(remaining - 1);
                AuthAction::Idle
            }
        }
    }

    /// Called when the link closes. The access token outlives the link.
    pub fn reset(&mut self) {
        self.state = AuthState::Unauth;
        self.retry_in = None;
    }
}

pub trait TokenClient: Send + Sync + 'static {
    fn exchange(&self, code: &str) -> Result<String, AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

fn token_from_response(response: TokenResponse) -> Result<String, AuthError> {
    response
        .access_token
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
}

#[cfg(not(feature = "coverage"))]
pub struct HttpTokenClient {
    client: reqwest::blocking::Client,
    url: String,
}

#[cfg(not(feature = "coverage"))]
impl HttpTokenClient {
    pub fn new(url: String, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AuthError::Http(err.to_string()))?;
        Ok(Self { client, url })
    }
}

#[cfg(not(feature = "coverage"))]
impl TokenClient for HttpTokenClient {
    fn exchange(&self, code: &str) -> Result<String, AuthError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "code": code }))
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|err| AuthError::Http(err.to_string()))?;
        let body = response
            .json::<TokenResponse>()
            .map_err(|err| AuthError::Http(err.to_string()))?;
        token_from_response(body)
    }
}

/// Runs a code-for-token exchange without blocking the pump.
pub trait TokenExchange {
    fn begin(&mut self, code: String);
    fn poll(&mut self) -> Option<Result<String, AuthError>>;
}

/// Performs each exchange on a worker thread and hands the result back over a channel.
pub struct ThreadedTokenExchange<C: TokenClient> {
    client: Arc<C>,
    pending: Option<Receiver<Result<String, AuthError>>>,
}

impl<C: TokenClient> ThreadedTokenExchange<C> {
    pub fn new(client: C) -> Self {
        Self {
            client: Arc::new(client),
            pending: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl<C: TokenClient> TokenExchange for ThreadedTokenExchange<C> {
    fn begin(&mut self, code: String) {
        let (sender, receiver) = mpsc::channel();
        let client = Arc::clone(&self.client);
        let worker_sender = sender.clone();
        let spawned = thread::Builder::new()
            .name("token-exchange".to_string())
            .spawn(move || {
                let _ = worker_sender.send(client.exchange(&code));
            });
        if let Err(error) = spawned {
            let _ = sender.send(Err(AuthError::Http(format!(
                "could not start exchange worker: {error}"
            ))));
        }
        self.pending = Some(receiver);
    }

    fn poll(&mut self) -> Option<Result<String, AuthError>> {
        let receiver = self.pending.as_ref()?;
        let result = match receiver.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(AuthError::WorkerGone),
        };
        self.pending = None;
        Some(result)
    }
}

/// Exchange that never completes; used when no token endpoint is configured.
#[derive(Debug, Default)]
pub struct NoopTokenExchange;

impl TokenExchange for NoopTokenExchange {
    fn begin(&mut self, _code: String) {}

    fn poll(&mut self) -> Option<Result<String, AuthError>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{
        token_from_response, AuthAction, AuthFlow, AuthState, ThreadedTokenExchange, TokenClient,
        TokenExchange, TokenResponse,
    };
    use crate::transport::errors::AuthError;
    use std::time::Duration;

    struct FixedClient(Result<String, AuthError>);

    impl TokenClient for FixedClient {
        fn exchange(&self, code: &str) -> Result<String, AuthError> {
            assert_eq!(code, "code-1");
            self.0.clone()
        }
    }

    fn wait_for<E: TokenExchange>(exchange: &mut E) -> Result<String, AuthError> {
        for _ in 0..2000 {
            if let Some(result) = exchange.poll() {
                return result;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("token exchange never completed");
    }

    /// The happy path walks authorize, exchange and authenticate in order.
    #[test]
    fn flow_walks_handshake_states() {
        // Arrange
        let mut flow = AuthFlow::new(3);

        // Act
        let first = flow.start();
        let second = flow.on_code("abc".to_string());
        let third = flow.on_token(Ok("token".to_string())).expect("token");

        // Assert
        assert_eq!(first, AuthAction::Authorize);
        assert_eq!(second, AuthAction::Exchange("abc".to_string()));
        assert_eq!(third, AuthAction::Authenticate("token".to_string()));
        assert_eq!(flow.state(), AuthState::Authenticated);
        assert_eq!(flow.access_token(), Some("token"));
    }

    /// A held token skips straight to authenticate after a reconnect.
    #[test]
    fn start_reuses_held_token() {
        // Arrange
        let mut flow = AuthFlow::new(3);
        flow.start();
        flow.on_code("abc".to_string());
        flow.on_token(Ok("token".to_string())).expect("token");
        flow.reset();

        // Act
        let action = flow.start();

        // Assert
        assert_eq!(action, AuthAction::Authenticate("token".to_string()));
    }

    /// Rejected authentication drops the token and asks for a new code.
    #[test]
    fn authenticate_error_restarts_authorize() {
        // Arrange
        let mut flow = AuthFlow::new(3);
        flow.start();
        flow.on_code("abc".to_string());
        flow.on_token(Ok("token".to_string())).expect("token");

        // Act
        let action = flow.on_authenticate_error();

        // Assert
        assert_eq!(action, AuthAction::Authorize);
        assert_eq!(flow.state(), AuthState::AwaitingCode);
        assert!(flow.access_token().is_none());
    }

    /// A missing token is a recoverable error that retries after the countdown.
    #[test]
    fn missing_token_retries_after_countdown() {
        // Arrange
        let mut flow = AuthFlow::new(2);
        flow.start();
        flow.on_code("abc".to_string());

        // Act
        let error = flow
            .on_token(Ok(String::new()))
            .expect_err("expected failure");
        let ticks = (0..3).map(|_| flow.tick()).collect::<Vec<_>>();

        // Assert
        assert_eq!(error, AuthError::MissingToken);
        assert_eq!(
            ticks,
            vec![AuthAction::Idle, AuthAction::Idle, AuthAction::Authorize]
        );
        assert_eq!(flow.state(), AuthState::AwaitingCode);
    }

    /// Codes outside the awaiting state are ignored.
    #[test]
    fn stray_code_is_ignored() {
        // Arrange
        let mut flow = AuthFlow::new(2);
        // Act
        let action = flow.on_code("abc".to_string());
        // Assert
        assert_eq!(action, AuthAction::Idle);
        assert_eq!(flow.state(), AuthState::Unauth);
    }

    /// Responses without an access token are rejected.
    #[test]
    fn token_response_requires_access_token() {
        // Arrange
        let empty: TokenResponse = serde_json::from_str("{}").expect("json");
        let full: TokenResponse =
            serde_json::from_str(r#"{"access_token":"tok"}"#).expect("json");
        // Act
        // Assert
        assert_eq!(token_from_response(empty), Err(AuthError::MissingToken));
        assert_eq!(token_from_response(full), Ok("tok".to_string()));
    }

    /// The threaded exchange hands the worker's result back through poll.
    #[test]
    fn threaded_exchange_delivers_result() {
        // Arrange
        let mut exchange = ThreadedTokenExchange::new(FixedClient(Ok("tok".to_string())));

        // Act
        exchange.begin("code-1".to_string());
        let result = wait_for(&mut exchange);

        // Assert
        assert_eq!(result, Ok("tok".to_string()));
        assert!(!exchange.is_pending());
        assert!(exchange.poll().is_none());
    }

    /// Worker failures come back as errors, not panics.
    #[test]
    fn threaded_exchange_delivers_error() {
        // Arrange
        let mut exchange = ThreadedTokenExchange::new(FixedClient(Err(AuthError::Http(
            "timeout".to_string(),
        ))));

        // Act
        exchange.begin("code-1".to_string());
        let result = wait_for(&mut exchange);

        // Assert
        assert_eq!(result, Err(AuthError::Http("timeout".to_string())));
    }
}
