use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, InteractionId};

// -- Commands --

/// Administrative commands, already parsed from the interaction payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Join the channel to the group named by `key` (a label, hashed before storage).
    Link { key: String, note: String },
    /// Leave one group; `key` is a label or the hex key printed by `List`.
    Unlink { key: String },
    UnlinkAll,
    List,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Link { .. } => "link",
            Self::Unlink { .. } => "unlink",
            Self::UnlinkAll => "unlink_all",
            Self::List => "list",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandInvocation {
    pub interaction_id: InteractionId,
    pub token: String,
    pub channel_id: ChannelId,
    pub command: Command,
}

// -- Replies --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Success,
    Error,
}

/// The single reply every command produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    pub kind: ReplyKind,
    pub title: String,
    pub description: String,
}

impl CommandReply {
    pub const SUCCESS_COLOR: u32 = 0x00FF00;
    pub const ERROR_COLOR: u32 = 0xFF0000;

    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Success,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Error,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn color(&self) -> u32 {
        match self.kind {
            ReplyKind::Success => Self::SUCCESS_COLOR,
            ReplyKind::Error => Self::ERROR_COLOR,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == ReplyKind::Error
    }
}
