//! Wire frames exchanged with the local RPC peer.
//!
//! Outgoing frames are `{cmd, args, evt?, nonce}` objects built from typed
//! constructors; incoming frames are `{cmd, evt, nonce, data}` objects whose
//! `data` is decoded into a typed payload before anything touches state.
//!
//! Nonce contract: the peer echoes the nonce of a request on its reply. For
//! `GET_CHANNELS` and `GET_CHANNEL` the nonce is the guild / channel id being
//! queried, so the reply handler reads the addressed resource straight from the
//! nonce. Bootstrap commands carry [`BOOTSTRAP_NONCE`] and their nonce says
//! nothing about any resource.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::transport::errors::TransportError;

pub const BOOTSTRAP_NONCE: &str = "deadbeef";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Dispatch,
    Authorize,
    Authenticate,
    GetGuilds,
    GetChannels,
    GetChannel,
    Subscribe,
    SelectVoiceChannel,
    SetVoiceSettings,
}

impl Command {
    pub fn from_wire(value: &str) -> Option<Self> {
        let command = match value {
            "DISPATCH" => Command::Dispatch,
            "AUTHORIZE" => Command::Authorize,
            "AUTHENTICATE" => Command::Authenticate,
            "GET_GUILDS" => Command::GetGuilds,
            "GET_CHANNELS" => Command::GetChannels,
            "GET_CHANNEL" => Command::GetChannel,
            "SUBSCRIBE" => Command::Subscribe,
            "SELECT_VOICE_CHANNEL" => Command::SelectVoiceChannel,
            "SET_VOICE_SETTINGS" => Command::SetVoiceSettings,
            _ => return None,
        };
        Some(command)
    }

    /// Commands whose nonce is the id of the resource they address.
    pub fn is_per_resource(self) -> bool {
        matches!(self, Command::GetChannels | Command::GetChannel)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    Ready,
    Error,
    VoiceStateCreate,
    VoiceStateUpdate,
    VoiceStateDelete,
    SpeakingStart,
    SpeakingStop,
    VoiceChannelSelect,
    VoiceConnectionStatus,
    MessageCreate,
    MessageUpdate,
    MessageDelete,
}

impl Event {
    pub fn from_wire(value: &str) -> Option<Self> {
        let event = match value {
            "READY" => Event::Ready,
            "ERROR" => Event::Error,
            "VOICE_STATE_CREATE" => Event::VoiceStateCreate,
            "VOICE_STATE_UPDATE" => Event::VoiceStateUpdate,
            "VOICE_STATE_DELETE" => Event::VoiceStateDelete,
            "SPEAKING_START" => Event::SpeakingStart,
            "SPEAKING_STOP" => Event::SpeakingStop,
            "VOICE_CHANNEL_SELECT" => Event::VoiceChannelSelect,
            "VOICE_CONNECTION_STATUS" => Event::VoiceConnectionStatus,
            "MESSAGE_CREATE" => Event::MessageCreate,
            "MESSAGE_UPDATE" => Event::MessageUpdate,
            "MESSAGE_DELETE" => Event::MessageDelete,
            _ => return None,
        };
        Some(event)
    }
}

pub const VOICE_CHANNEL_EVENTS: [Event; 5] = [
    Event::VoiceStateCreate,
    Event::VoiceStateUpdate,
    Event::VoiceStateDelete,
    Event::SpeakingStart,
    Event::SpeakingStop,
];

pub const TEXT_CHANNEL_EVENTS: [Event; 3] = [
    Event::MessageCreate,
    Event::MessageUpdate,
    Event::MessageDelete,
];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommandFrame {
    pub cmd: Command,
    pub args: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evt: Option<Event>,
    pub nonce: String,
}

impl CommandFrame {
    fn new(cmd: Command, args: Value, nonce: &str) -> Self {
        Self {
            cmd,
            args,
            evt: None,
            nonce: nonce.to_string(),
        }
    }

    pub fn authorize(client_id: &str, scopes: &[String]) -> Self {
        Self::new(
            Command::Authorize,
            json!({ "client_id": client_id, "scopes": scopes, "prompt": "none" }),
            BOOTSTRAP_NONCE,
        )
    }

    pub fn authenticate(access_token: &str) -> Self {
        Self::new(
            Command::Authenticate,
            json!({ "access_token": access_token }),
            BOOTSTRAP_NONCE,
        )
    }

    pub fn get_guilds() -> Self {
        Self::new(Command::GetGuilds, json!({}), BOOTSTRAP_NONCE)
    }

    pub fn get_channels(guild_id: &str) -> Self {
        Self::new(
            Command::GetChannels,
            json!({ "guild_id": guild_id }),
            guild_id,
        )
    }

    pub fn get_channel(channel_id: &str) -> Self {
        Self::new(
            Command::GetChannel,
            json!({ "channel_id": channel_id }),
            channel_id,
        )
    }

    pub fn subscribe(evt: Event, args: Value, nonce: &str) -> Self {
        Self {
            evt: Some(evt),
            ..Self::new(Command::Subscribe, args, nonce)
        }
    }

    pub fn select_voice_channel(channel_id: Option<&str>) -> Self {
        Self::new(
            Command::SelectVoiceChannel,
            json!({ "channel_id": channel_id, "force": true }),
            BOOTSTRAP_NONCE,
        )
    }

    pub fn set_mute(mute: bool) -> Self {
        Self::new(
            Command::SetVoiceSettings,
            json!({ "mute": mute }),
            BOOTSTRAP_NONCE,
        )
    }

    pub fn set_deaf(deaf: bool) -> Self {
        Self::new(
            Command::SetVoiceSettings,
            json!({ "deaf": deaf }),
            BOOTSTRAP_NONCE,
        )
    }

    pub fn encode(&self) -> Result<String, TransportError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct IncomingFrame {
    pub cmd: String,
    #[serde(default)]
    pub evt: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl IncomingFrame {
    pub fn decode(text: &str) -> Result<Self, TransportError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_value(self.data.clone()).map_err(|err| {
            TransportError::Protocol(format!(
                "malformed {} payload: {err}",
                self.evt.as_deref().unwrap_or(&self.cmd)
            ))
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AuthorizeData {
    pub code: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ErrorData {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AuthenticateData {
    pub user: UserPayload,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UserPayload {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GuildsData {
    pub guilds: Vec<GuildSummary>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GuildSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChannelsData {
    pub channels: Vec<ChannelSummary>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChannelSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChannelDetail {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub voice_states: Vec<VoiceStatePayload>,
    #[serde(default)]
    pub messages: Vec<MessagePayload>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct VoiceStatePayload {
    pub user: UserPayload,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub voice_state: Option<VoiceFlags>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct VoiceFlags {
    #[serde(default)]
    pub mute: Option<bool>,
    #[serde(default)]
    pub deaf: Option<bool>,
    #[serde(default)]
    pub self_mute: Option<bool>,
    #[serde(default)]
    pub self_deaf: Option<bool>,
    #[serde(default)]
    pub suppress: Option<bool>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SpeakingData {
    pub channel_id: String,
    pub user_id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct VoiceChannelSelectData {
    #[serde(default)]
    pub channel_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct VoiceConnectionStatusData {
    pub state: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MessageEventData {
    pub channel_id: String,
    pub message: MessagePayload,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MessagePayload {
    pub id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_parsed: Option<Vec<Value>>,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub author_color: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub embeds: Vec<EmbedPayload>,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
    #[serde(default)]
    pub author: Option<UserPayload>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct EmbedPayload {
    #[serde(default, rename = "rawDescription")]
    pub raw_description: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<EmbedAuthor>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbedAuthor {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AttachmentPayload {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
}
