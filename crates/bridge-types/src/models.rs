use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ids::{ApplicationId, AttachmentId, ChannelId, GuildId, MessageId, UserId, WebhookId};

const CDN_BASE: &str = "https://cdn.discordapp.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl Author {
    /// Name shown next to the message: the global display name if set, else the username.
    pub fn display_name(&self) -> &str {
        self.global_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.username)
    }

    pub fn avatar_url(&self) -> String {
        match &self.avatar {
            Some(hash) => {
                let ext = if hash.starts_with("a_") { "gif" } else { "png" };
                format!("{}/avatars/{}/{}.{}", CDN_BASE, self.id, hash, ext)
            }
            // Default avatars are picked from the snowflake for new-style usernames.
            None => format!("{}/embed/avatars/{}.png", CDN_BASE, (self.id.get() >> 22) % 6),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub filename: String,
    #[serde(default)]
    pub description: Option<String>,
    pub size: u64,
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReference {
    #[serde(default)]
    pub message_id: Option<MessageId>,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    pub author: Author,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default, rename = "message_reference")]
    pub reference: Option<MessageReference>,
    #[serde(default)]
    pub webhook_id: Option<WebhookId>,
    #[serde(default)]
    pub application_id: Option<ApplicationId>,
}

impl Message {
    /// The message this one replies to, if it is a reply.
    pub fn replied_to(&self) -> Option<(ChannelId, MessageId)> {
        let reference = self.reference.as_ref()?;
        let message_id = reference.message_id?;
        Some((reference.channel_id.unwrap_or(self.channel_id), message_id))
    }

    pub fn is_webhook_message(&self) -> bool {
        self.webhook_id.is_some()
    }
}

/// Incoming webhook type; channel follower webhooks cannot be executed by us.
pub const WEBHOOK_TYPE_INCOMING: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: WebhookId,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    #[serde(default)]
    pub application_id: Option<ApplicationId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: u8,
}

impl Webhook {
    /// True when we can execute this webhook: incoming, owned by `app`, token present.
    pub fn is_usable_by(&self, app: ApplicationId) -> bool {
        self.kind == WEBHOOK_TYPE_INCOMING
            && self.application_id == Some(app)
            && self.token.is_some()
    }
}

/// A message to post into a target channel on behalf of the original author.
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    pub username: String,
    pub avatar_url: Option<String>,
    pub content: String,
    pub files: Vec<OutboundFile>,
}

impl OutboundMessage {
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.files.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct OutboundFile {
    pub filename: String,
    pub description: Option<String>,
    pub data: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn author(global_name: Option<&str>, avatar: Option<&str>) -> Author {
        Author {
            id: UserId::new(80351110224678912),
            username: "nelly".into(),
            global_name: global_name.map(String::from),
            avatar: avatar.map(String::from),
            bot: false,
        }
    }

    #[test]
    fn display_name_prefers_global_name() {
        assert_eq!(author(Some("Nelly"), None).display_name(), "Nelly");
        assert_eq!(author(None, None).display_name(), "nelly");
        assert_eq!(author(Some(""), None).display_name(), "nelly");
    }

    #[test]
    fn avatar_url_variants() {
        let png = author(None, Some("8342729096ea3675442027381ff50dfe"));
        assert!(png.avatar_url().ends_with("/8342729096ea3675442027381ff50dfe.png"));
        let gif = author(None, Some("a_1269e74af4df7417b13759eae50c83dc"));
        assert!(gif.avatar_url().ends_with(".gif"));
        let default = author(None, None);
        assert!(default.avatar_url().starts_with("https://cdn.discordapp.com/embed/avatars/"));
    }

    #[test]
    fn parses_reply_message() {
        let msg: Message = serde_json::from_value(json!({
            "id": "1000",
            "channel_id": "20",
            "guild_id": "3",
            "author": { "id": "7", "username": "bob" },
            "content": "hi",
            "attachments": [
                { "id": "5", "filename": "a.png", "size": 1024, "url": "https://cdn/a.png" }
            ],
            "message_reference": { "message_id": "999" },
            "tts": false
        }))
        .unwrap();

        assert_eq!(msg.replied_to(), Some((ChannelId::new(20), MessageId::new(999))));
        assert_eq!(msg.attachments[0].size, 1024);
        assert!(!msg.is_webhook_message());
    }

    #[test]
    fn webhook_usability() {
        let app = ApplicationId::new(11);
        let hook: Webhook = serde_json::from_value(json!({
            "id": "1", "type": 1, "token": "t", "application_id": "11", "name": "ForwarderHook"
        }))
        .unwrap();
        assert!(hook.is_usable_by(app));
        assert!(!hook.is_usable_by(ApplicationId::new(12)));
    }

    #[test]
    fn outbound_emptiness() {
        let mut out = OutboundMessage { content: "  \n".into(), ..Default::default() };
        assert!(out.is_empty());
        out.files.push(OutboundFile {
            filename: "a".into(),
            description: None,
            data: Bytes::from_static(b"x"),
        });
        assert!(!out.is_empty());
    }
}
