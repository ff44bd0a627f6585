//! Ordered record of an upgraded connection

use super::channel::{Channel, ChannelFrame};

/// Terminal value of a cleanly closed channel connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeResult {
    /// Frames in arrival order
    pub messages: Vec<ChannelFrame>,
    /// Message text of every frame, joined in arrival order.
    /// Error channel frames are part of it.
    pub body: String,
    /// WebSocket close code
    pub code: u16,
    /// WebSocket close reason
    pub reason: String,
}

impl UpgradeResult {
    /// Joined text of the frames received on `channel`
    pub fn channel_text(&self, channel: Channel) -> String {
        self.messages
            .iter()
            .filter(|f| f.channel == channel)
            .map(ChannelFrame::message)
            .collect()
    }

    pub fn stdout(&self) -> String {
        self.channel_text(Channel::Stdout)
    }

    pub fn stderr(&self) -> String {
        self.channel_text(Channel::Stderr)
    }

    /// Text sent on the error channel, if any
    pub fn error(&self) -> Option<String> {
        let text = self.channel_text(Channel::Error);
        if text.is_empty() { None } else { Some(text) }
    }
}

/// Accumulates frames until the connection closes
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<ChannelFrame>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: ChannelFrame) {
        self.messages.push(frame);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[ChannelFrame] {
        &self.messages
    }

    /// Hand over the partial transcript, e.g. on failure
    pub fn into_messages(self) -> Vec<ChannelFrame> {
        self.messages
    }

    pub fn finish(self, code: u16, reason: impl Into<String>) -> UpgradeResult {
        let body = self.messages.iter().map(ChannelFrame::message).collect();
        UpgradeResult {
            messages: self.messages,
            body,
            code,
            reason: reason.into(),
        }
    }
}
