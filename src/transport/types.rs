use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ChannelKind {
    Voice,
    Text,
}

impl ChannelKind {
    /// Maps the peer's numeric channel type; categories, threads and DMs yield `None`.
    pub fn from_wire(kind: u8) -> Option<Self> {
        match kind {
            0 | 5 => Some(ChannelKind::Text),
            2 | 13 => Some(ChannelKind::Voice),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
    pub guild_id: String,
    pub guild_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Guild {
    pub id: String,
    pub name: String,
    pub channel_ids: Vec<String>,
    pub filled: bool,
    pub subscribed: bool,
}

impl Guild {
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub nick: Option<String>,
    pub avatar: Option<String>,
    pub mute: bool,
    pub deaf: bool,
    pub speaking: bool,
}

impl User {
    /// Name shown on display surfaces: the nickname when one is set.
    pub fn display_name(&self) -> &str {
        self.nick.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum MessageContent {
    Rich(Vec<serde_json::Value>),
    Plain(String),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Plain(String::new())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
    pub content_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Message {
    pub id: String,
    pub content: MessageContent,
    pub nick: String,
    pub color: Option<String>,
    pub timestamp: String,
    pub attachment: Option<Attachment>,
}

/// Ordered from "nothing works" to "fully connected".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ConnectionState {
    NoLink,
    LinkInvalid,
    NoVoice,
    VoiceSelectedNotConnected,
    Connected,
}
