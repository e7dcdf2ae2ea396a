pub mod api;
pub mod events;
pub mod ids;
pub mod models;
pub mod platform;

pub use ids::{
    ApplicationId, AttachmentId, ChannelId, GroupKey, GuildId, InteractionId, MessageId, UserId,
    WebhookId,
};
