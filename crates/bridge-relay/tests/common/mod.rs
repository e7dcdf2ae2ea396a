#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bridge_db::{Database, LinkStore, RelayStore};
use bridge_relay::{FanOutSource, RelayConfig, RelayProcessor};
use bridge_types::api::{CommandInvocation, CommandReply};
use bridge_types::models::{Attachment, Author, Message, MessageReference, OutboundMessage, Webhook};
use bridge_types::platform::{Platform, PlatformError, PlatformResult, UNKNOWN_WEBHOOK_CODE};
use bridge_types::{
    ApplicationId, AttachmentId, ChannelId, GroupKey, GuildId, MessageId, UserId, WebhookId,
};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

pub const APP: ApplicationId = ApplicationId::new(900);
pub const BOT_USER: UserId = UserId::new(901);
pub const GUILD: GuildId = GuildId::new(1);
pub const A: ChannelId = ChannelId::new(100);
pub const B: ChannelId = ChannelId::new(200);
pub const C: ChannelId = ChannelId::new(300);

#[derive(Debug, Clone)]
pub struct Sent {
    pub channel: ChannelId,
    pub id: MessageId,
    pub message: OutboundMessage,
}

/// In-memory platform recording every call.
#[derive(Default)]
pub struct FakePlatform {
    next_id: AtomicU64,
    pub messages: Mutex<HashMap<(ChannelId, MessageId), Message>>,
    pub downloads: Mutex<HashMap<String, Bytes>>,
    pub failing_channels: Mutex<HashSet<ChannelId>>,
    pub stale_webhooks: Mutex<HashSet<ChannelId>>,
    pub sent: Mutex<Vec<Sent>>,
    pub edits: Mutex<Vec<(MessageId, String)>>,
    pub deletes: Mutex<Vec<MessageId>>,
    pub evictions: Mutex<Vec<ChannelId>>,
    pub replies: Mutex<Vec<CommandReply>>,
    webhook_generation: AtomicU64,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(10_000),
            ..Default::default()
        }
    }

    pub fn put_message(&self, message: Message) {
        self.messages
            .lock()
            .unwrap()
            .insert((message.channel_id, message.id), message);
    }

    pub fn put_download(&self, url: &str, len: usize) {
        self.downloads
            .lock()
            .unwrap()
            .insert(url.to_string(), Bytes::from(vec![7u8; len]));
    }

    pub fn fail_channel(&self, channel: ChannelId) {
        self.failing_channels.lock().unwrap().insert(channel);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, channel: ChannelId) -> Option<Sent> {
        self.sent().into_iter().find(|s| s.channel == channel)
    }

    fn webhook(&self, channel: ChannelId) -> Webhook {
        let generation = self.webhook_generation.load(Ordering::SeqCst);
        Webhook {
            id: WebhookId::new(channel.get() * 10 + generation),
            token: Some(format!("token-{}", channel)),
            guild_id: Some(GUILD),
            channel_id: Some(channel),
            application_id: Some(APP),
            name: Some("ForwarderHook".into()),
            kind: 1,
        }
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn get_message(&self, channel: ChannelId, message: MessageId) -> PlatformResult<Message> {
        self.messages
            .lock()
            .unwrap()
            .get(&(channel, message))
            .cloned()
            .ok_or(PlatformError::NotFound {
                code: Some(10008),
                message: "Unknown Message".into(),
            })
    }

    async fn outbound_webhook(&self, channel: ChannelId) -> PlatformResult<Webhook> {
        Ok(self.webhook(channel))
    }

    fn evict_webhook(&self, channel: ChannelId) {
        self.evictions.lock().unwrap().push(channel);
        self.stale_webhooks.lock().unwrap().remove(&channel);
        self.webhook_generation.fetch_add(1, Ordering::SeqCst);
    }

    async fn send_message(&self, webhook: &Webhook, message: OutboundMessage) -> PlatformResult<Message> {
        let channel = webhook.channel_id.unwrap_or(ChannelId::new(0));
        if self.failing_channels.lock().unwrap().contains(&channel) {
            return Err(PlatformError::Http {
                status: 500,
                code: None,
                body: "boom".into(),
            });
        }
        if self.stale_webhooks.lock().unwrap().contains(&channel) {
            return Err(PlatformError::NotFound {
                code: Some(UNKNOWN_WEBHOOK_CODE),
                message: "Unknown Webhook".into(),
            });
        }

        let id = MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let posted = Message {
            id,
            channel_id: channel,
            guild_id: webhook.guild_id,
            author: Author {
                id: UserId::new(webhook.id.get()),
                username: message.username.clone(),
                global_name: None,
                avatar: None,
                bot: true,
            },
            content: message.content.clone(),
            attachments: Vec::new(),
            reference: None,
            webhook_id: Some(webhook.id),
            application_id: Some(APP),
        };
        self.put_message(posted.clone());
        self.sent.lock().unwrap().push(Sent {
            channel,
            id,
            message,
        });
        Ok(posted)
    }

    async fn edit_message(&self, _webhook: &Webhook, message: MessageId, content: &str) -> PlatformResult<()> {
        self.edits.lock().unwrap().push((message, content.to_string()));
        Ok(())
    }

    async fn delete_message(&self, _webhook: &Webhook, message: MessageId) -> PlatformResult<()> {
        self.deletes.lock().unwrap().push(message);
        Ok(())
    }

    async fn download(&self, url: &str, max_bytes: u64) -> PlatformResult<Bytes> {
        let data = self
            .downloads
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(PlatformError::NotFound {
                code: None,
                message: url.to_string(),
            })?;
        if data.len() as u64 > max_bytes {
            return Err(PlatformError::TooLarge {
                size: data.len() as u64,
                limit: max_bytes,
            });
        }
        Ok(data)
    }

    async fn reply_to_command(&self, _invocation: &CommandInvocation, reply: &CommandReply) -> PlatformResult<()> {
        self.replies.lock().unwrap().push(reply.clone());
        Ok(())
    }
}

pub struct Harness {
    pub db: Arc<Database>,
    pub store: Arc<dyn RelayStore>,
    pub platform: Arc<FakePlatform>,
    pub processor: RelayProcessor,
}

pub fn harness() -> Harness {
    harness_with(RelayConfig::default())
}

pub fn harness_with(config: RelayConfig) -> Harness {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let store: Arc<dyn RelayStore> = db.clone();
    let platform = Arc::new(FakePlatform::new());
    let processor = RelayProcessor::new(
        store.clone(),
        platform.clone(),
        FanOutSource::Links,
        config,
        CancellationToken::new(),
    );
    Harness {
        db,
        store,
        platform,
        processor,
    }
}

pub fn link_all(db: &Database, label: &str, channels: &[ChannelId]) {
    let key = GroupKey::from_label(label);
    for channel in channels {
        db.add_link(&key, *channel, "").unwrap();
    }
}

pub fn user_message(id: u64, channel: ChannelId, content: &str) -> Message {
    Message {
        id: MessageId::new(id),
        channel_id: channel,
        guild_id: Some(GUILD),
        author: Author {
            id: UserId::new(42),
            username: "alice".into(),
            global_name: Some("Alice".into()),
            avatar: None,
            bot: false,
        },
        content: content.to_string(),
        attachments: Vec::new(),
        reference: None,
        webhook_id: None,
        application_id: None,
    }
}

pub fn reply_to(mut message: Message, channel: ChannelId, target: MessageId) -> Message {
    message.reference = Some(MessageReference {
        message_id: Some(target),
        channel_id: Some(channel),
        guild_id: Some(GUILD),
    });
    message
}

pub fn attachment(id: u64, size: u64) -> Attachment {
    Attachment {
        id: AttachmentId::new(id),
        filename: format!("file{}.bin", id),
        description: None,
        size,
        url: format!("https://cdn.example/attachments/{}", id),
        content_type: None,
    }
}
