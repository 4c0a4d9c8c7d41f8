use std::collections::HashMap;

use log::{debug, info, warn};

#[cfg(not(feature = "coverage"))]
use crate::rpc::auth::{HttpTokenClient, ThreadedTokenExchange};
use crate::rpc::auth::{AuthAction, AuthFlow, AuthState, NoopTokenExchange, TokenExchange};
#[cfg(not(feature = "coverage"))]
use crate::rpc::link::WebSocketConnector;
use crate::rpc::link::{Link, LinkConnector, LinkRequest, LinkStatus, OfflineConnector};
use crate::rpc::protocol::{
    AuthenticateData, AuthorizeData, ChannelDetail, ChannelsData, Command, CommandFrame,
    ErrorData, Event, GuildsData, IncomingFrame, MessageEventData, SpeakingData,
    VoiceChannelSelectData, VoiceConnectionStatusData, VoiceStatePayload,
};
use crate::rpc::sinks::Surfaces;
use crate::rpc::state::{StateStore, UserPatch};
use crate::rpc::subscriptions::{guild_subscriptions, server_subscriptions, voice_subscriptions};
use crate::rpc::{ConnectorEvent, RpcConfig};
use crate::transport::errors::{AuthError, TransportError};
use crate::transport::types::{ChannelKind, ConnectionState};

pub struct RpcConnector {
    request: LinkRequest,
    conn_state: ConnectionState,
    events: Vec<ConnectorEvent>,
    link: Link,
    auth: AuthFlow,
    tokens: Box<dyn TokenExchange>,
    state: StateStore,
    pending: HashMap<String, Command>,
    outbox: Vec<CommandFrame>,
    client_id: String,
    scopes: Vec<String>,
}

impl RpcConnector {
    pub fn new(config: RpcConfig) -> Self {
        Self::with_parts(
            config,
            Box::new(OfflineConnector),
            Box::new(NoopTokenExchange),
        )
    }

    #[cfg(not(feature = "coverage"))]
    pub fn new_with_websocket(config: RpcConfig) -> Result<Self, AuthError> {
        let client = HttpTokenClient::new(config.token_url.clone(), config.token_timeout)?;
        Ok(Self::with_parts(
            config,
            Box::new(WebSocketConnector),
            Box::new(ThreadedTokenExchange::new(client)),
        ))
    }

    pub fn with_parts(
        config: RpcConfig,
        connector: Box<dyn LinkConnector>,
        tokens: Box<dyn TokenExchange>,
    ) -> Self {
        Self {
            request: LinkRequest::from_config(&config),
            conn_state: ConnectionState::NoLink,
            events: Vec::new(),
            link: Link::new(connector, config.max_backoff_ticks),
            auth: AuthFlow::new(config.auth_retry_ticks),
            tokens,
            state: StateStore::new(config.message_limit),
            pending: HashMap::new(),
            outbox: Vec::new(),
            client_id: config.client_id,
            scopes: config.scopes,
        }
    }

    pub fn conn_state(&self) -> ConnectionState {
        self.conn_state
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth.state()
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn pending_requests(&self) -> &HashMap<String, Command> {
        &self.pending
    }

    pub fn take_events(&mut self) -> Vec<ConnectorEvent> {
        std::mem::take(&mut self.events)
    }

    /// One externally clocked step: read the picker, drain the link, publish.
    pub fn tick(&mut self, surfaces: &mut Surfaces<'_>) {
        let selected = surfaces.picker.selected_text_channel();
        if selected.as_deref() != self.state.current_text() {
            self.set_text_channel(selected);
        }
        self.pump();
        self.publish(surfaces);
    }

    /// Drives auth timers, keeps the link up and routes every waiting frame.
    pub fn pump(&mut self) {
        self.drive_auth();
        match self.link.ensure_connected(&self.request) {
            LinkStatus::Unavailable => {
                self.outbox.clear();
                return;
            }
            LinkStatus::Opened => self.advance(ConnectionState::LinkInvalid),
            LinkStatus::Open => {}
        }
        self.flush();
        loop {
            match self.link.poll() {
                Ok(Some(text)) => {
                    self.receive(&text);
                    self.flush();
                }
                Ok(None) => break,
                Err(error) => {
                    self.close_link(error);
                    break;
                }
            }
        }
    }

    pub fn publish(&mut self, surfaces: &mut Surfaces<'_>) {
        let dirty = self.state.take_dirty();
        surfaces
            .voice
            .publish_users(&self.state.roster_users(), dirty.voice);
        if dirty.status {
            surfaces.voice.publish_status(self.state.voice_status());
        }
        let text_dirty = dirty.text || surfaces.text.popup_mode();
        surfaces
            .text
            .publish_messages(self.state.messages(), text_dirty);
        surfaces
            .picker
            .publish_channels(&self.state.channels(), dirty.channels);
    }

    /// Tracks a new text channel; its history is requested once the link is enumerated.
    pub fn set_text_channel(&mut self, channel_id: Option<String>) {
        if !self.state.set_current_text(channel_id.clone()) {
            return;
        }
        info!("text channel set to {channel_id:?}");
        if self.conn_state == ConnectionState::Connected {
            if let Some(id) = channel_id {
                self.queue(CommandFrame::get_channel(&id));
                self.flush();
            }
        }
    }

    pub fn select_voice_channel(&mut self, channel_id: Option<&str>) -> Result<(), TransportError> {
        self.send_now(CommandFrame::select_voice_channel(channel_id))
    }

    pub fn set_mute(&mut self, mute: bool) -> Result<(), TransportError> {
        self.send_now(CommandFrame::set_mute(mute))
    }

    pub fn set_deaf(&mut self, deaf: bool) -> Result<(), TransportError> {
        self.send_now(CommandFrame::set_deaf(deaf))
    }

    fn send_now(&mut self, frame: CommandFrame) -> Result<(), TransportError> {
        if !self.link.is_open() {
            return Err(TransportError::Disconnected);
        }
        if let Err(error) = self.link.send(&frame) {
            let message = error.to_string();
            self.close_link(error);
            return Err(TransportError::Connect(message));
        }
        Ok(())
    }

    fn queue(&mut self, frame: CommandFrame) {
        self.outbox.push(frame);
    }

    fn flush(&mut self) {
        if !self.link.is_open() {
            self.outbox.clear();
            return;
        }
        for frame in std::mem::take(&mut self.outbox) {
            if frame.cmd.is_per_resource() {
                self.pending.insert(frame.nonce.clone(), frame.cmd);
            }
            if let Err(error) = self.link.send(&frame) {
                self.close_link(error);
                return;
            }
        }
    }

    fn close_link(&mut self, error: TransportError) {
        match error {
            TransportError::Closed => info!("rpc link closed by peer"),
            other => warn!("rpc link failed: {other}"),
        }
        self.link.on_close();
        self.auth.reset();
        self.state.reset_link();
        self.pending.clear();
        self.outbox.clear();
        self.degrade(ConnectionState::NoLink);
    }

    fn set_conn_state(&mut self, next: ConnectionState) {
        info!("connection state {:?} -> {next:?}", self.conn_state);
        self.conn_state = next;
        self.events.push(ConnectorEvent::ConnectionState(next));
    }

    fn advance(&mut self, next: ConnectionState) {
        if next > self.conn_state {
            self.set_conn_state(next);
        }
    }

    fn degrade(&mut self, next: ConnectionState) {
        if next < self.conn_state {
            self.set_conn_state(next);
        }
    }

    fn drive_auth(&mut self) {
        let action = self.auth.tick();
        self.perform(action);
        if let Some(result) = self.tokens.poll() {
            match self.auth.on_token(result) {
                Ok(action) => self.perform(action),
                Err(error) => self.report_auth_failure(error.to_string()),
            }
        }
    }

    fn perform(&mut self, action: AuthAction) {
        match action {
            AuthAction::Idle => {}
            AuthAction::Authorize => {
                debug!("requesting authorization");
                let frame = CommandFrame::authorize(&self.client_id, &self.scopes);
                self.queue(frame);
            }
            AuthAction::Exchange(code) => {
                debug!("exchanging authorization code");
                self.tokens.begin(code);
            }
            AuthAction::Authenticate(token) => {
                debug!("authenticating");
                self.queue(CommandFrame::authenticate(&token));
            }
        }
    }

    fn report_auth_failure(&mut self, message: String) {
        warn!("authorization failed: {message}");
        self.events.push(ConnectorEvent::Error(message));
        self.degrade(ConnectionState::LinkInvalid);
    }

    fn receive(&mut self, text: &str) {
        let routed = IncomingFrame::decode(text).and_then(|frame| self.route(frame));
        if let Err(error) = routed {
            warn!("dropping rpc frame: {error}");
        }
    }

    fn route(&mut self, frame: IncomingFrame) -> Result<(), TransportError> {
        let Some(cmd) = Command::from_wire(&frame.cmd) else {
            debug!("ignoring unrecognized command {}", frame.cmd);
            return Ok(());
        };
        let evt = match frame.evt.as_deref() {
            None => None,
            Some(name) => match Event::from_wire(name) {
                Some(evt) => Some(evt),
                None => {
                    debug!("ignoring unrecognized event {name}");
                    return Ok(());
                }
            },
        };
        if cmd.is_per_resource() {
            if let Some(nonce) = frame.nonce.as_deref() {
                if self.pending.remove(nonce).is_none() {
                    debug!("unsolicited {cmd:?} reply for {nonce}");
                }
            }
        }

        match (cmd, evt) {
            (Command::Dispatch, Some(Event::Ready)) => {
                let action = self.auth.start();
                self.perform(action);
            }
            (Command::Authorize, None) => {
                let data = frame.payload::<AuthorizeData>()?;
                let action = self.auth.on_code(data.code);
                self.perform(action);
            }
            (Command::Authorize, Some(Event::Error)) => {
                let data = frame.payload::<ErrorData>().unwrap_or_default();
                self.auth.fail();
                self.report_auth_failure(AuthError::Denied(data.message).to_string());
            }
            (Command::Authenticate, None) => self.on_authenticated(&frame)?,
            (Command::Authenticate, Some(Event::Error)) => {
                let data = frame.payload::<ErrorData>().unwrap_or_default();
                warn!("authentication rejected: {}", data.message);
                self.degrade(ConnectionState::LinkInvalid);
                let action = self.auth.on_authenticate_error();
                self.perform(action);
            }
            (Command::GetGuilds, None) => self.on_guilds(&frame)?,
            (Command::GetChannels, None) => self.on_channels(&frame)?,
            (Command::GetChannel, None) => self.on_channel_detail(&frame)?,
            (Command::Dispatch, Some(Event::VoiceStateCreate)) => {
                self.on_voice_state_create(&frame)?
            }
            (Command::Dispatch, Some(Event::VoiceStateUpdate)) => {
                let payload = frame.payload::<VoiceStatePayload>()?;
                self.state
                    .apply_user_patch(UserPatch::from_voice_state(&payload));
            }
            (Command::Dispatch, Some(Event::VoiceStateDelete)) => {
                self.on_voice_state_delete(&frame)?
            }
            (Command::Dispatch, Some(Event::SpeakingStart)) => self.on_speaking(&frame, true)?,
            (Command::Dispatch, Some(Event::SpeakingStop)) => self.on_speaking(&frame, false)?,
            (Command::Dispatch, Some(Event::VoiceChannelSelect)) => {
                let data = frame.payload::<VoiceChannelSelectData>()?;
                self.adopt_voice_channel(data.channel_id, true);
            }
            (Command::Dispatch, Some(Event::VoiceConnectionStatus)) => {
                let data = frame.payload::<VoiceConnectionStatusData>()?;
                self.state.set_voice_status(data.state);
            }
            (
                Command::Dispatch,
                Some(evt @ (Event::MessageCreate | Event::MessageUpdate | Event::MessageDelete)),
            ) => self.on_message(&frame, evt)?,
            (Command::Subscribe, None) => {
                debug!("subscribed to {:?}", frame.data.get("evt"));
            }
            (cmd, Some(Event::Error)) => {
                let data = frame.payload::<ErrorData>().unwrap_or_default();
                warn!(
                    "{cmd:?} failed for {:?}: {} ({:?})",
                    frame.nonce, data.message, data.code
                );
            }
            (cmd, evt) => debug!("ignoring {cmd:?}/{evt:?}"),
        }
        Ok(())
    }

    fn on_authenticated(&mut self, frame: &IncomingFrame) -> Result<(), TransportError> {
        let data = frame.payload::<AuthenticateData>()?;
        let user_id = data.user.id.clone();
        info!("authenticated as {user_id}");
        self.state.set_self_id(user_id.clone());
        self.state.apply_user_patch(UserPatch {
            username: data.user.username,
            avatar: data.user.avatar,
            ..UserPatch::new(user_id.clone())
        });
        self.events.push(ConnectorEvent::Authenticated { user_id });
        self.advance(ConnectionState::NoVoice);
        self.queue(CommandFrame::get_guilds());
        Ok(())
    }

    fn on_guilds(&mut self, frame: &IncomingFrame) -> Result<(), TransportError> {
        let data = frame.payload::<GuildsData>()?;
        for guild in &data.guilds {
            self.state.upsert_guild(&guild.id, &guild.name);
            self.queue(CommandFrame::get_channels(&guild.id));
        }
        self.check_enumeration();
        Ok(())
    }

    fn on_channels(&mut self, frame: &IncomingFrame) -> Result<(), TransportError> {
        let guild_id = frame
            .nonce
            .clone()
            .ok_or_else(|| TransportError::Protocol("channel list without nonce".to_string()))?;
        let data = frame.payload::<ChannelsData>()?;
        let Some(attached) = self.state.attach_channels(&guild_id, &data.channels) else {
            warn!("channel list for unknown guild {guild_id}");
            return Ok(());
        };
        for channel in attached
            .iter()
            .filter(|channel| channel.kind == ChannelKind::Voice)
        {
            self.queue(CommandFrame::get_channel(&channel.id));
        }
        if self.state.mark_guild_subscribed(&guild_id) {
            debug!("subscribing to {} channels of {guild_id}", attached.len());
            self.outbox.extend(guild_subscriptions(&attached));
        }
        self.check_enumeration();
        Ok(())
    }

    fn check_enumeration(&mut self) {
        if !self.state.all_guilds_ready() {
            return;
        }
        if self.state.mark_server_subscribed() {
            self.outbox.extend(server_subscriptions());
        }
        if self.conn_state != ConnectionState::Connected {
            self.advance(ConnectionState::Connected);
            if let Some(text) = self.state.current_text().map(str::to_string) {
                self.queue(CommandFrame::get_channel(&text));
            }
        }
    }

    fn on_channel_detail(&mut self, frame: &IncomingFrame) -> Result<(), TransportError> {
        let channel_id = frame
            .nonce
            .clone()
            .ok_or_else(|| TransportError::Protocol("channel detail without nonce".to_string()))?;
        let detail = frame.payload::<ChannelDetail>()?;
        if let Some(id) = detail.id.as_deref().filter(|id| *id != channel_id) {
            warn!("channel detail for {id} arrived under nonce {channel_id}");
        }

        let self_present = match self.state.self_id() {
            Some(self_id) => detail
                .voice_states
                .iter()
                .any(|occupant| occupant.user.id == self_id),
            None => false,
        };
        if self_present {
            self.adopt_voice_channel(Some(channel_id.clone()), false);
        }
        if self.state.current_voice() == Some(channel_id.as_str()) {
            self.state.replace_roster(&detail.voice_states);
        }
        if self.state.current_text() == Some(channel_id.as_str()) {
            self.state.replace_messages(&detail.messages);
        }
        Ok(())
    }

    /// Returns `true` when the tracked voice channel changed.
    fn adopt_voice_channel(&mut self, channel_id: Option<String>, request_detail: bool) -> bool {
        if !self.state.set_current_voice(channel_id.clone()) {
            return false;
        }
        info!("voice channel set to {channel_id:?}");
        self.events
            .push(ConnectorEvent::VoiceChannel(channel_id.clone()));
        if let Some(id) = channel_id {
            self.advance(ConnectionState::VoiceSelectedNotConnected);
            if request_detail {
                self.queue(CommandFrame::get_channel(&id));
            }
        }
        true
    }

    fn on_voice_state_create(&mut self, frame: &IncomingFrame) -> Result<(), TransportError> {
        let payload = frame.payload::<VoiceStatePayload>()?;
        self.state
            .apply_user_patch(UserPatch::from_voice_state(&payload));
        if self.state.is_self(&payload.user.id) {
            debug!("local user appeared; probing every voice channel");
            for id in self.state.voice_channel_ids() {
                self.queue(CommandFrame::get_channel(&id));
            }
        } else if let Some(current) = self.state.current_voice().map(str::to_string) {
            self.queue(CommandFrame::get_channel(&current));
        }
        Ok(())
    }

    fn on_voice_state_delete(&mut self, frame: &IncomingFrame) -> Result<(), TransportError> {
        let payload = frame.payload::<VoiceStatePayload>()?;
        self.state.roster_remove(&payload.user.id);
        if self.state.is_self(&payload.user.id) {
            debug!("local user left voice; resubscribing every voice channel");
            self.state.clear_roster();
            let guild_ids = self
                .state
                .guilds()
                .into_iter()
                .map(|guild| guild.id.clone())
                .collect::<Vec<_>>();
            for guild_id in guild_ids {
                let channels = self.state.guild_channels(&guild_id);
                self.outbox.extend(voice_subscriptions(&channels));
            }
        }
        Ok(())
    }

    fn on_speaking(&mut self, frame: &IncomingFrame, speaking: bool) -> Result<(), TransportError> {
        let data = frame.payload::<SpeakingData>()?;
        let changed = self.adopt_voice_channel(Some(data.channel_id.clone()), true);
        if self.state.user(&data.user_id).is_none() {
            debug!("speaking event for unknown user {}", data.user_id);
            if !changed {
                self.queue(CommandFrame::get_channel(&data.channel_id));
            }
            return Ok(());
        }
        self.state
            .apply_user_patch(UserPatch::speaking(data.user_id.clone(), speaking));
        self.state.roster_insert(&data.user_id);
        Ok(())
    }

    fn on_message(&mut self, frame: &IncomingFrame, evt: Event) -> Result<(), TransportError> {
        let data = frame.payload::<MessageEventData>()?;
        if self.state.current_text() != Some(data.channel_id.as_str()) {
            debug!("ignoring {evt:?} for untracked channel {}", data.channel_id);
            return Ok(());
        }
        match evt {
            Event::MessageCreate => self.state.apply_message_create(&data.message),
            Event::MessageUpdate => {
                if !self.state.apply_message_update(&data.message) {
                    debug!("update for unknown message {}", data.message.id);
                }
            }
            _ => {
                self.state.apply_message_delete(&data.message.id);
            }
        }
        Ok(())
    }
}
