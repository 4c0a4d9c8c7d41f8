use serde_json::json;

use crate::rpc::protocol::{
    CommandFrame, Event, BOOTSTRAP_NONCE, TEXT_CHANNEL_EVENTS, VOICE_CHANNEL_EVENTS,
};
use crate::transport::types::{Channel, ChannelKind};

fn channel_subscriptions(channel: &Channel) -> Vec<CommandFrame> {
    let events: &[Event] = match channel.kind {
        ChannelKind::Voice => &VOICE_CHANNEL_EVENTS,
        ChannelKind::Text => &TEXT_CHANNEL_EVENTS,
    };
    events
        .iter()
        .map(|event| {
            CommandFrame::subscribe(*event, json!({ "channel_id": channel.id }), &channel.id)
        })
        .collect()
}

/// Presence, speaking and message subscriptions for every channel of a ready guild.
pub fn guild_subscriptions(channels: &[Channel]) -> Vec<CommandFrame> {
    channels.iter().flat_map(channel_subscriptions).collect()
}

/// Presence and speaking subscriptions only, used to resync after the local user leaves.
pub fn voice_subscriptions(channels: &[Channel]) -> Vec<CommandFrame> {
    channels
        .iter()
        .filter(|channel| channel.kind == ChannelKind::Voice)
        .flat_map(channel_subscriptions)
        .collect()
}

pub fn server_subscriptions() -> Vec<CommandFrame> {
    [Event::VoiceChannelSelect, Event::VoiceConnectionStatus]
        .into_iter()
        .map(|event| CommandFrame::subscribe(event, json!({}), BOOTSTRAP_NONCE))
        .collect()
}
