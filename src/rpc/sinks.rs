//! Boundary to the display surfaces fed by the connector.

use log::info;

use crate::transport::types::{Channel, Message, User};

pub trait VoiceSink {
    fn publish_users(&mut self, users: &[User], dirty: bool);
    /// Raw voice connection status exactly as reported by the peer.
    fn publish_status(&mut self, status: &str);
}

pub trait TextSink {
    fn publish_messages(&mut self, messages: &[Message], dirty: bool);

    /// Popup surfaces animate expiry themselves and want a refresh every tick.
    fn popup_mode(&self) -> bool {
        false
    }
}

pub trait ChannelPicker {
    fn publish_channels(&mut self, channels: &[Channel], dirty: bool);
    fn selected_text_channel(&mut self) -> Option<String>;
}

pub struct Surfaces<'a> {
    pub voice: &'a mut dyn VoiceSink,
    pub text: &'a mut dyn TextSink,
    pub picker: &'a mut dyn ChannelPicker,
}

/// Sinks that only write changes to the log.
#[derive(Debug, Default)]
pub struct LogVoiceSink;

#[derive(Debug, Default)]
pub struct LogTextSink;

#[derive(Debug, Default)]
pub struct LogChannelPicker {
    pub selected_text_channel: Option<String>,
}

impl VoiceSink for LogVoiceSink {
    fn publish_users(&mut self, users: &[User], dirty: bool) {
        if !dirty {
            return;
        }
        let names = users
            .iter()
            .map(|user| {
                let mut flags = String::new();
                if user.speaking {
                    flags.push('*');
                }
                if user.mute {
                    flags.push('m');
                }
                if user.deaf {
                    flags.push('d');
                }
                format!("{}[{flags}]", user.display_name())
            })
            .collect::<Vec<_>>();
        info!("voice roster: {}", names.join(", "));
    }

    fn publish_status(&mut self, status: &str) {
        info!("voice connection status: {status}");
    }
}

impl TextSink for LogTextSink {
    fn publish_messages(&mut self, messages: &[Message], dirty: bool) {
        if dirty {
            info!("text channel holds {} messages", messages.len());
        }
    }
}

impl ChannelPicker for LogChannelPicker {
    fn publish_channels(&mut self, channels: &[Channel], dirty: bool) {
        if dirty {
            info!("{} channels known", channels.len());
        }
    }

    fn selected_text_channel(&mut self) -> Option<String> {
        self.selected_text_channel.clone()
    }
}
