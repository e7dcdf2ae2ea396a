use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::api::{CommandInvocation, CommandReply};
use crate::ids::{ChannelId, MessageId};
use crate::models::{Message, OutboundMessage, Webhook};

/// JSON error code the platform returns for a webhook that no longer exists.
pub const UNKNOWN_WEBHOOK_CODE: u32 = 10015;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("not found (code {code:?}): {message}")]
    NotFound { code: Option<u32>, message: String },

    #[error("request timed out")]
    Timeout,

    #[error("request cancelled by shutdown")]
    Cancelled,

    #[error("http {status} (code {code:?}): {body}")]
    Http {
        status: u16,
        code: Option<u32>,
        body: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("payload of {size} bytes exceeds limit of {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("webhook has no token")]
    MissingToken,
}

impl PlatformError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_unknown_webhook(&self) -> bool {
        match self {
            Self::NotFound { code, .. } | Self::Http { code, .. } => {
                *code == Some(UNKNOWN_WEBHOOK_CODE)
            }
            _ => false,
        }
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Everything the relay needs from the chat platform.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn get_message(&self, channel: ChannelId, message: MessageId) -> PlatformResult<Message>;

    /// Get-or-create the application-owned webhook used to post into `channel`.
    async fn outbound_webhook(&self, channel: ChannelId) -> PlatformResult<Webhook>;

    /// Forget a cached webhook after the platform reported it gone.
    fn evict_webhook(&self, channel: ChannelId);

    /// Posts through the webhook with mentions disabled; returns the created message.
    async fn send_message(&self, webhook: &Webhook, message: OutboundMessage) -> PlatformResult<Message>;

    async fn edit_message(&self, webhook: &Webhook, message: MessageId, content: &str) -> PlatformResult<()>;

    async fn delete_message(&self, webhook: &Webhook, message: MessageId) -> PlatformResult<()>;

    /// Fetches an attachment, failing with `TooLarge` once more than `max_bytes` arrive.
    async fn download(&self, url: &str, max_bytes: u64) -> PlatformResult<Bytes>;

    async fn reply_to_command(&self, invocation: &CommandInvocation, reply: &CommandReply) -> PlatformResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_webhook_detection() {
        let gone = PlatformError::NotFound {
            code: Some(UNKNOWN_WEBHOOK_CODE),
            message: "Unknown Webhook".into(),
        };
        assert!(gone.is_not_found());
        assert!(gone.is_unknown_webhook());

        let missing_message = PlatformError::NotFound {
            code: Some(10008),
            message: "Unknown Message".into(),
        };
        assert!(!missing_message.is_unknown_webhook());
        assert!(!PlatformError::Timeout.is_unknown_webhook());
    }
}
