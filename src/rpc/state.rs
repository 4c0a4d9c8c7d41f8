use std::collections::HashMap;

use crate::rpc::protocol::{ChannelSummary, MessagePayload, VoiceFlags, VoiceStatePayload};
use crate::transport::types::{
    Attachment, Channel, ChannelKind, Guild, Message, MessageContent, User,
};

/// Partial user update; `None` leaves the stored value untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub id: String,
    pub username: Option<String>,
    pub nick: Option<String>,
    pub avatar: Option<String>,
    pub mute: Option<bool>,
    pub deaf: Option<bool>,
    pub speaking: Option<bool>,
}

impl UserPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn speaking(id: impl Into<String>, speaking: bool) -> Self {
        Self {
            speaking: Some(speaking),
            ..Self::new(id)
        }
    }

    pub fn from_voice_state(payload: &VoiceStatePayload) -> Self {
        let flags = payload.voice_state.clone().unwrap_or_default();
        Self {
            id: payload.user.id.clone(),
            username: payload.user.username.clone(),
            nick: payload.nick.clone(),
            avatar: payload.user.avatar.clone(),
            mute: effective_mute(&flags),
            deaf: any_flag(&[flags.deaf, flags.self_deaf]),
            speaking: None,
        }
    }
}

fn any_flag(flags: &[Option<bool>]) -> Option<bool> {
    flags
        .iter()
        .flatten()
        .copied()
        .reduce(|left, right| left || right)
}

/// Server mute, self mute and suppression all silence a user.
fn effective_mute(flags: &VoiceFlags) -> Option<bool> {
    any_flag(&[flags.mute, flags.self_mute, flags.suppress])
}

pub fn merge_user(user: &mut User, patch: UserPatch) {
    if let Some(username) = patch.username {
        user.username = username;
    }
    if let Some(nick) = patch.nick {
        user.nick = Some(nick);
    }
    if let Some(avatar) = patch.avatar {
        user.avatar = Some(avatar);
    }
    if let Some(mute) = patch.mute {
        user.mute = mute;
    }
    if let Some(deaf) = patch.deaf {
        user.deaf = deaf;
    }
    if let Some(speaking) = patch.speaking {
        user.speaking = speaking;
    }
}

/// Picks the displayable body of a message payload.
pub fn extract_content(payload: &MessagePayload) -> MessageContent {
    if let Some(parsed) = payload.content_parsed.as_ref().filter(|nodes| !nodes.is_empty()) {
        return MessageContent::Rich(parsed.clone());
    }
    if let Some(text) = payload.content.as_ref().filter(|text| !text.is_empty()) {
        return MessageContent::Plain(text.clone());
    }
    if let [embed] = payload.embeds.as_slice() {
        let text = embed
            .raw_description
            .clone()
            .or_else(|| embed.description.clone())
            .or_else(|| embed.author.as_ref().and_then(|author| author.name.clone()));
        if let Some(text) = text {
            return MessageContent::Plain(text);
        }
    }
    MessageContent::default()
}

fn message_from_payload(payload: &MessagePayload) -> Message {
    let nick = payload
        .nick
        .clone()
        .or_else(|| {
            payload
                .author
                .as_ref()
                .and_then(|author| author.username.clone())
        })
        .unwrap_or_default();
    let attachment = match payload.attachments.as_slice() {
        [first, ..] => Some(Attachment {
            url: first.url.clone(),
            filename: first.filename.clone(),
            content_type: first.content_type.clone(),
        }),
        [] => None,
    };
    Message {
        id: payload.id.clone(),
        content: extract_content(payload),
        nick,
        color: payload.author_color.clone(),
        timestamp: payload.timestamp.clone().unwrap_or_default(),
        attachment,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirtyFlags {
    pub voice: bool,
    pub text: bool,
    pub channels: bool,
    pub status: bool,
}

#[derive(Debug)]
pub struct StateStore {
    guild_order: Vec<String>,
    guilds: HashMap<String, Guild>,
    channels: HashMap<String, Channel>,
    users: HashMap<String, User>,
    roster: Vec<String>,
    messages: Vec<Message>,
    self_id: Option<String>,
    current_voice: Option<String>,
    current_text: Option<String>,
    voice_status: String,
    server_subscribed: bool,
    message_limit: usize,
    dirty: DirtyFlags,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

impl StateStore {
    pub fn new(message_limit: usize) -> Self {
        Self {
            guild_order: Vec::new(),
            guilds: HashMap::new(),
            channels: HashMap::new(),
            users: HashMap::new(),
            roster: Vec::new(),
            messages: Vec::new(),
            self_id: None,
            current_voice: None,
            current_text: None,
            voice_status: String::new(),
            server_subscribed: false,
            message_limit,
            dirty: DirtyFlags::default(),
        }
    }

    pub fn self_id(&self) -> Option<&str> {
        self.self_id.as_deref()
    }

    pub fn is_self(&self, user_id: &str) -> bool {
        self.self_id.as_deref() == Some(user_id)
    }

    pub fn set_self_id(&mut self, id: String) {
        self.self_id = Some(id);
    }

    pub fn guild(&self, id: &str) -> Option<&Guild> {
        self.guilds.get(id)
    }

    /// Guilds in enumeration order.
    pub fn guilds(&self) -> Vec<&Guild> {
        self.guild_order
            .iter()
            .filter_map(|id| self.guilds.get(id))
            .collect()
    }

    pub fn channel(&self, id: &str) -> Option<&Channel> {
        self.channels.get(id)
    }

    pub fn channels(&self) -> Vec<Channel> {
        let mut channels = self.channels.values().cloned().collect::<Vec<_>>();
        channels.sort_by(|left, right| left.id.cmp(&right.id));
        channels
    }

    pub fn guild_channels(&self, guild_id: &str) -> Vec<Channel> {
        self.guilds
            .get(guild_id)
            .map(|guild| {
                guild
                    .channel_ids
                    .iter()
                    .filter_map(|id| self.channels.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn voice_channel_ids(&self) -> Vec<String> {
        self.guilds()
            .into_iter()
            .flat_map(|guild| guild.channel_ids.iter())
            .filter(|id| {
                self.channels
                    .get(*id)
                    .is_some_and(|channel| channel.kind == ChannelKind::Voice)
            })
            .cloned()
            .collect()
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.get(id)
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    /// Users present in the current voice channel, in roster order.
    pub fn roster_users(&self) -> Vec<User> {
        self.roster
            .iter()
            .filter_map(|id| self.users.get(id).cloned())
            .collect()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn current_voice(&self) -> Option<&str> {
        self.current_voice.as_deref()
    }

    pub fn current_text(&self) -> Option<&str> {
        self.current_text.as_deref()
    }

    pub fn voice_status(&self) -> &str {
        &self.voice_status
    }

    pub fn take_dirty(&mut self) -> DirtyFlags {
        std::mem::take(&mut self.dirty)
    }

    /// Creates or renames a guild skeleton. Returns `true` for a new guild.
    pub fn upsert_guild(&mut self, id: &str, name: &str) -> bool {
        if let Some(guild) = self.guilds.get_mut(id) {
            guild.name = name.to_string();
            return false;
        }
        self.guild_order.push(id.to_string());
        self.guilds
            .insert(id.to_string(), Guild::new(id.to_string(), name.to_string()));
        self.dirty.channels = true;
        true
    }

    /// Attaches the enumerated channels to a guild and marks it filled.
    ///
    /// Returns the channels that were attached, or `None` for an unknown guild.
    pub fn attach_channels(
        &mut self,
        guild_id: &str,
        summaries: &[ChannelSummary],
    ) -> Option<Vec<Channel>> {
        let guild = self.guilds.get_mut(guild_id)?;
        let mut attached = Vec::new();
        for summary in summaries {
            let Some(kind) = ChannelKind::from_wire(summary.kind) else {
                continue;
            };
            let channel = self
                .channels
                .entry(summary.id.clone())
                .or_insert_with(|| Channel {
                    id: summary.id.clone(),
                    name: summary.name.clone(),
                    kind,
                    guild_id: guild.id.clone(),
                    guild_name: guild.name.clone(),
                });
            channel.name = summary.name.clone();
            channel.guild_name = guild.name.clone();
            attached.push(channel.clone());
        }
        guild.channel_ids = attached.iter().map(|channel| channel.id.clone()).collect();
        guild.filled = true;
        self.dirty.channels = true;
        Some(attached)
    }

    pub fn all_guilds_ready(&self) -> bool {
        self.guilds.values().all(|guild| guild.filled)
    }

    /// Returns `true` exactly once per guild per link.
    pub fn mark_guild_subscribed(&mut self, guild_id: &str) -> bool {
        match self.guilds.get_mut(guild_id) {
            Some(guild) if guild.filled && !guild.subscribed => {
                guild.subscribed = true;
                true
            }
            _ => false,
        }
    }

    /// Returns `true` exactly once per link.
    pub fn mark_server_subscribed(&mut self) -> bool {
        !std::mem::replace(&mut self.server_subscribed, true)
    }

    pub fn apply_user_patch(&mut self, patch: UserPatch) {
        let in_roster = self.roster.contains(&patch.id);
        let entry = self.users.entry(patch.id.clone()).or_insert_with(|| User {
            id: patch.id.clone(),
            ..Default::default()
        });
        merge_user(entry, patch);
        if in_roster {
            self.dirty.voice = true;
        }
    }

    /// Switches the tracked voice channel. The roster is cleared when it changes.
    pub fn set_current_voice(&mut self, channel_id: Option<String>) -> bool {
        if self.current_voice == channel_id {
            return false;
        }
        self.current_voice = channel_id;
        self.clear_roster();
        true
    }

    /// Rebuilds the roster from a channel's occupant list.
    pub fn replace_roster(&mut self, occupants: &[VoiceStatePayload]) {
        self.roster.clear();
        for occupant in occupants {
            self.apply_user_patch(UserPatch::from_voice_state(occupant));
            if !self.roster.contains(&occupant.user.id) {
                self.roster.push(occupant.user.id.clone());
            }
        }
        self.dirty.voice = true;
    }

    /// Adds a known user to the roster. Unknown ids are refused.
    pub fn roster_insert(&mut self, user_id: &str) -> bool {
        if !self.users.contains_key(user_id) {
            return false;
        }
        if !self.roster.iter().any(|id| id == user_id) {
            self.roster.push(user_id.to_string());
            self.dirty.voice = true;
        }
        true
    }

    pub fn roster_remove(&mut self, user_id: &str) -> bool {
        let before = self.roster.len();
        self.roster.retain(|id| id != user_id);
        let removed = self.roster.len() != before;
        if removed {
            self.dirty.voice = true;
        }
        removed
    }

    pub fn clear_roster(&mut self) {
        self.roster.clear();
        self.dirty.voice = true;
    }

    /// Switches the tracked text channel. The message buffer is emptied when it changes.
    pub fn set_current_text(&mut self, channel_id: Option<String>) -> bool {
        if self.current_text == channel_id {
            return false;
        }
        self.current_text = channel_id;
        self.messages.clear();
        self.dirty.text = true;
        true
    }

    pub fn replace_messages(&mut self, history: &[MessagePayload]) {
        self.messages.clear();
        for payload in history {
            self.push_message(message_from_payload(payload));
        }
        self.dirty.text = true;
    }

    pub fn apply_message_create(&mut self, payload: &MessagePayload) {
        if self.apply_message_update(payload) {
            return;
        }
        self.push_message(message_from_payload(payload));
        self.dirty.text = true;
    }

    /// Replaces the content of a stored message, keeping id, nick, color and time.
    pub fn apply_message_update(&mut self, payload: &MessagePayload) -> bool {
        let Some(message) = self
            .messages
            .iter_mut()
            .find(|message| message.id == payload.id)
        else {
            return false;
        };
        message.content = extract_content(payload);
        self.dirty.text = true;
        true
    }

    pub fn apply_message_delete(&mut self, message_id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|message| message.id != message_id);
        let removed = self.messages.len() != before;
        if removed {
            self.dirty.text = true;
        }
        removed
    }

    fn push_message(&mut self, message: Message) {
        if let Some(existing) = self.messages.iter_mut().find(|held| held.id == message.id) {
            *existing = message;
            return;
        }
        self.messages.push(message);
        if self.messages.len() > self.message_limit {
            let overflow = self.messages.len() - self.message_limit;
            self.messages.drain(..overflow);
        }
    }

    pub fn set_voice_status(&mut self, status: String) -> bool {
        if self.voice_status == status {
            return false;
        }
        self.voice_status = status;
        self.dirty.status = true;
        true
    }

    /// Forgets everything tied to the closed link. Users, self id and the
    /// selected text channel survive so a reconnect can reuse them.
    pub fn reset_link(&mut self) {
        self.guild_order.clear();
        self.guilds.clear();
        self.channels.clear();
        self.current_voice = None;
        self.server_subscribed = false;
        self.voice_status.clear();
        self.clear_roster();
        self.dirty.channels = true;
        self.dirty.status = true;
    }
}
