use crate::api::CommandInvocation;
use crate::ids::{ApplicationId, ChannelId, GuildId, MessageId, UserId};
use crate::models::Message;

/// Notifications the relay reacts to, already decoded from the platform stream.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// Session established; carries the identity used to recognise our own posts.
    Ready {
        user_id: UserId,
        application_id: ApplicationId,
        session_id: String,
    },

    MessageCreate(Message),

    /// Edits arrive as a full message; partial updates without an author are dropped
    /// by the gateway before reaching here.
    MessageUpdate(Message),

    MessageDelete {
        id: MessageId,
        channel_id: ChannelId,
        guild_id: Option<GuildId>,
    },

    /// A slash command invoked in some channel.
    Command(CommandInvocation),
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::MessageCreate(_) => "message_create",
            Self::MessageUpdate(_) => "message_update",
            Self::MessageDelete { .. } => "message_delete",
            Self::Command(_) => "command",
        }
    }
}
