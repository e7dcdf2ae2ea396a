use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bridge_types::api::{CommandInvocation, CommandReply};
use bridge_types::models::{Message, OutboundMessage, Webhook};
use bridge_types::platform::{Platform, PlatformResult};
use bridge_types::{ApplicationId, ChannelId, MessageId};
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::http::DiscordHttp;
use crate::types::WEBHOOK_NAME;

/// `Platform` over the Discord REST API, with one cached webhook per channel.
pub struct DiscordPlatform {
    http: DiscordHttp,
    application_id: ApplicationId,
    webhooks: RwLock<HashMap<ChannelId, Webhook>>,
    // Serializes get-or-create so concurrent events don't create duplicates.
    creating: Mutex<()>,
}

impl DiscordPlatform {
    pub fn new(http: DiscordHttp, application_id: ApplicationId) -> Self {
        Self {
            http,
            application_id,
            webhooks: RwLock::new(HashMap::new()),
            creating: Mutex::new(()),
        }
    }

    pub fn http(&self) -> &DiscordHttp {
        &self.http
    }

    fn cached(&self, channel: ChannelId) -> Option<Webhook> {
        self.webhooks
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&channel)
            .cloned()
    }

    fn remember(&self, channel: ChannelId, webhook: Webhook) {
        self.webhooks
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(channel, webhook);
    }
}

/// Picks the first incoming webhook owned by `app` that still has a token.
pub fn select_webhook(webhooks: Vec<Webhook>, app: ApplicationId) -> Option<Webhook> {
    webhooks.into_iter().find(|hook| hook.is_usable_by(app))
}

#[async_trait]
impl Platform for DiscordPlatform {
    async fn get_message(&self, channel: ChannelId, message: MessageId) -> PlatformResult<Message> {
        self.http.get_message(channel, message).await
    }

    async fn outbound_webhook(&self, channel: ChannelId) -> PlatformResult<Webhook> {
        if let Some(hook) = self.cached(channel) {
            return Ok(hook);
        }

        let _creating = self.creating.lock().await;
        if let Some(hook) = self.cached(channel) {
            return Ok(hook);
        }

        let existing = self.http.channel_webhooks(channel).await?;
        let hook = match select_webhook(existing, self.application_id) {
            Some(hook) => {
                debug!(channel_id = %channel, webhook_id = %hook.id, "Reusing channel webhook");
                hook
            }
            None => {
                let hook = self.http.create_webhook(channel, WEBHOOK_NAME).await?;
                info!(channel_id = %channel, webhook_id = %hook.id, "Created channel webhook");
                hook
            }
        };

        self.remember(channel, hook.clone());
        Ok(hook)
    }

    fn evict_webhook(&self, channel: ChannelId) {
        let removed = self
            .webhooks
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&channel);
        if let Some(hook) = removed {
            debug!(channel_id = %channel, webhook_id = %hook.id, "Evicted cached webhook");
        }
    }

    async fn send_message(&self, webhook: &Webhook, message: OutboundMessage) -> PlatformResult<Message> {
        self.http.execute_webhook(webhook, &message).await
    }

    async fn edit_message(&self, webhook: &Webhook, message: MessageId, content: &str) -> PlatformResult<()> {
        self.http.edit_webhook_message(webhook, message, content).await
    }

    async fn delete_message(&self, webhook: &Webhook, message: MessageId) -> PlatformResult<()> {
        self.http.delete_webhook_message(webhook, message).await
    }

    async fn download(&self, url: &str, max_bytes: u64) -> PlatformResult<Bytes> {
        self.http.download(url, max_bytes).await
    }

    async fn reply_to_command(&self, invocation: &CommandInvocation, reply: &CommandReply) -> PlatformResult<()> {
        self.http.reply_to_interaction(invocation, reply).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::WebhookId;
    use bridge_types::models::WEBHOOK_TYPE_INCOMING;

    const APP: ApplicationId = ApplicationId::new(10);

    fn hook(id: u64, kind: u8, app: Option<ApplicationId>, token: Option<&str>) -> Webhook {
        Webhook {
            id: WebhookId::new(id),
            token: token.map(String::from),
            guild_id: None,
            channel_id: Some(ChannelId::new(1)),
            application_id: app,
            name: Some("hook".into()),
            kind,
        }
    }

    #[test]
    fn selects_first_usable_webhook() {
        let list = vec![
            hook(1, WEBHOOK_TYPE_INCOMING, Some(ApplicationId::new(99)), Some("a")),
            hook(2, 2, Some(APP), Some("b")),
            hook(3, WEBHOOK_TYPE_INCOMING, Some(APP), None),
            hook(4, WEBHOOK_TYPE_INCOMING, Some(APP), Some("d")),
            hook(5, WEBHOOK_TYPE_INCOMING, Some(APP), Some("e")),
        ];
        assert_eq!(select_webhook(list, APP).map(|h| h.id), Some(WebhookId::new(4)));
    }

    #[test]
    fn no_usable_webhook() {
        assert!(select_webhook(Vec::new(), APP).is_none());
        let foreign = vec![hook(1, WEBHOOK_TYPE_INCOMING, None, Some("a"))];
        assert!(select_webhook(foreign, APP).is_none());
    }
}
