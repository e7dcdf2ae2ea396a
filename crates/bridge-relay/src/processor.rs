use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use bridge_db::RelayStore;
use bridge_db::models::CorrelationRow;
use bridge_types::api::CommandInvocation;
use bridge_types::events::InboundEvent;
use bridge_types::models::{Message, OutboundFile, OutboundMessage, Webhook};
use bridge_types::platform::{Platform, PlatformResult};
use bridge_types::{ApplicationId, ChannelId, MessageId, UserId, WebhookId};
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::attachments;
use crate::call::{self, CallGuard};
use crate::commands;
use crate::config::RelayConfig;
use crate::echo::EchoCache;
use crate::error::Result;
use crate::fanout::FanOutSource;
use crate::resolver::ReferenceResolver;

/// Who we are on the platform; used to recognise our own posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: UserId,
    pub application_id: ApplicationId,
}

/// Per-event tally of what happened to each target channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub targets: usize,
    pub relayed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RelayReport {
    fn ignored() -> Self {
        Self::default()
    }

    fn tally(targets: usize, outcomes: impl IntoIterator<Item = TargetOutcome>) -> Self {
        let mut report = Self {
            targets,
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome {
                TargetOutcome::Done => report.relayed += 1,
                TargetOutcome::Skipped => report.skipped += 1,
                TargetOutcome::Failed => report.failed += 1,
            }
        }
        report
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetOutcome {
    Done,
    Skipped,
    Failed,
}

/// Relays create/update/delete notifications across linked channels.
pub struct RelayProcessor {
    store: Arc<dyn RelayStore>,
    platform: Arc<dyn Platform>,
    fan_out: FanOutSource,
    resolver: ReferenceResolver,
    echo: EchoCache,
    config: RelayConfig,
    guard: CallGuard,
    identity: RwLock<Option<BotIdentity>>,
    own_webhooks: RwLock<HashSet<WebhookId>>,
}

impl RelayProcessor {
    pub fn new(
        store: Arc<dyn RelayStore>,
        platform: Arc<dyn Platform>,
        fan_out: FanOutSource,
        config: RelayConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let guard = CallGuard::new(config.request_timeout, shutdown);
        let resolver = ReferenceResolver::new(
            store.clone(),
            platform.clone(),
            guard.clone(),
            config.preview_max_chars,
        );
        let echo = EchoCache::new(config.echo_ttl, config.echo_capacity);

        Self {
            store,
            platform,
            fan_out,
            resolver,
            echo,
            config,
            guard,
            identity: RwLock::new(None),
            own_webhooks: RwLock::new(HashSet::new()),
        }
    }

    pub fn set_identity(&self, identity: BotIdentity) {
        *self.identity.write().unwrap_or_else(|p| p.into_inner()) = Some(identity);
    }

    pub fn identity(&self) -> Option<BotIdentity> {
        *self.identity.read().unwrap_or_else(|p| p.into_inner())
    }

    pub fn echo_cache(&self) -> &EchoCache {
        &self.echo
    }

    /// Entry point for the dispatcher. Errors are logged here; nothing propagates.
    pub async fn handle(&self, event: InboundEvent) {
        let kind = event.kind();
        if self.guard.is_shutting_down() {
            debug!(event = kind, "Shutting down, dropping event");
            return;
        }
        let result = match event {
            InboundEvent::Ready {
                user_id,
                application_id,
                session_id,
            } => {
                info!(%user_id, %application_id, %session_id, "Relay identity ready");
                self.set_identity(BotIdentity {
                    user_id,
                    application_id,
                });
                return;
            }
            InboundEvent::MessageCreate(message) => self.on_message_create(&message).await,
            InboundEvent::MessageUpdate(message) => self.on_message_update(&message).await,
            InboundEvent::MessageDelete { id, channel_id, .. } => {
                self.on_message_delete(id, channel_id).await
            }
            InboundEvent::Command(invocation) => {
                self.on_command(&invocation).await;
                return;
            }
        };

        match result {
            Ok(report) if report.failed > 0 => {
                warn!(event = kind, targets = report.targets, failed = report.failed, "Relay finished with failures");
            }
            Ok(report) => {
                debug!(event = kind, targets = report.targets, relayed = report.relayed, skipped = report.skipped, "Relay finished");
            }
            Err(e) => error!(event = kind, error = %e, "Relay aborted"),
        }
    }

    // -- Create --

    pub async fn on_message_create(&self, message: &Message) -> Result<RelayReport> {
        if self.is_own_or_ignored(message) {
            return Ok(RelayReport::ignored());
        }

        let name = message.author.display_name().to_string();
        let author = message.author.id;
        if let Err(e) = call::blocking(&self.store, move |s| s.record_author(&name, author)).await {
            warn!(user_id = %author, error = %e, "Failed to record author identity");
        }

        let targets = self.fan_out.targets(&self.store, message.channel_id).await?;
        if targets.is_empty() {
            return Ok(RelayReport::ignored());
        }

        let max = self.config.max_attachment_bytes;
        let footer = attachments::oversized_footer(&message.attachments, max);
        let files =
            attachments::download_small(&self.platform, &self.guard, &message.attachments, max).await;

        let sends = targets
            .iter()
            .map(|&target| self.create_copy(message, target, &footer, &files));
        let copies = join_all(sends).await;

        let rows: Vec<CorrelationRow> = copies
            .iter()
            .filter_map(|c| c.as_ref().ok().copied())
            .map(|(copy_channel_id, copy_message_id)| CorrelationRow {
                source_channel_id: message.channel_id,
                source_message_id: message.id,
                copy_channel_id,
                copy_message_id,
            })
            .collect();

        if !rows.is_empty() {
            let count = rows.len();
            if let Err(e) = call::blocking(&self.store, move |s| s.record_correlations(&rows)).await {
                // Copies are already posted; their edits and deletes will not follow.
                error!(message_id = %message.id, rows = count, error = %e, "Failed to record correlations");
            }
        }

        Ok(RelayReport::tally(
            targets.len(),
            copies.into_iter().map(|c| match c {
                Ok(_) => TargetOutcome::Done,
                Err(outcome) => outcome,
            }),
        ))
    }

    async fn create_copy(
        &self,
        message: &Message,
        target: ChannelId,
        footer: &str,
        files: &[OutboundFile],
    ) -> std::result::Result<(ChannelId, MessageId), TargetOutcome> {
        let webhook = match self.webhook_for(target).await {
            Ok(w) => w,
            Err(e) => {
                warn!(target_channel = %target, error = %e, "Failed to get webhook");
                return Err(TargetOutcome::Failed);
            }
        };

        let content = self.compose(message, target, &webhook, footer).await;
        let outbound = OutboundMessage {
            username: message.author.display_name().to_string(),
            avatar_url: Some(message.author.avatar_url()),
            content,
            files: files.to_vec(),
        };
        // The reply header alone is worth relaying; only a copy with nothing at all is skipped.
        if outbound.is_empty() {
            debug!(message_id = %message.id, target_channel = %target, "Nothing to relay");
            return Err(TargetOutcome::Skipped);
        }

        match self.send_copy(target, webhook, outbound).await {
            Ok(copy) => Ok((target, copy.id)),
            Err(e) => {
                warn!(target_channel = %target, message_id = %message.id, error = %e, "Failed to relay message");
                Err(TargetOutcome::Failed)
            }
        }
    }

    /// Sends through the cached webhook; a webhook deleted behind our back is
    /// replaced once and the send retried.
    async fn send_copy(
        &self,
        target: ChannelId,
        webhook: Webhook,
        outbound: OutboundMessage,
    ) -> PlatformResult<Message> {
        match self
            .guard
            .run(self.platform.send_message(&webhook, outbound.clone()))
            .await
        {
            Err(e) if e.is_unknown_webhook() => {
                debug!(target_channel = %target, webhook_id = %webhook.id, "Webhook gone, recreating");
                self.forget_webhook(target, webhook.id);
                let webhook = self.webhook_for(target).await?;
                self.guard
                    .run(self.platform.send_message(&webhook, outbound))
                    .await
            }
            other => other,
        }
    }

    // -- Update --

    pub async fn on_message_update(&self, message: &Message) -> Result<RelayReport> {
        if self.is_own_or_ignored(message) {
            return Ok(RelayReport::ignored());
        }

        let targets = self.fan_out.targets(&self.store, message.channel_id).await?;
        let footer = attachments::oversized_footer(&message.attachments, self.config.max_attachment_bytes);

        let edits = targets
            .iter()
            .map(|&target| self.edit_copy(message, target, &footer));
        let outcomes = join_all(edits).await;
        Ok(RelayReport::tally(targets.len(), outcomes))
    }

    async fn edit_copy(&self, message: &Message, target: ChannelId, footer: &str) -> TargetOutcome {
        let copy = match self.find_copy(message.channel_id, message.id, target).await {
            Some(copy) => copy,
            None => return TargetOutcome::Skipped,
        };

        let webhook = match self.webhook_for(target).await {
            Ok(w) => w,
            Err(e) => {
                warn!(target_channel = %target, error = %e, "Failed to get webhook");
                return TargetOutcome::Failed;
            }
        };

        let content = self.compose(message, target, &webhook, footer).await;
        match self
            .guard
            .run(self.platform.edit_message(&webhook, copy, &content))
            .await
        {
            Ok(()) => TargetOutcome::Done,
            Err(e) => {
                if e.is_unknown_webhook() {
                    self.forget_webhook(target, webhook.id);
                }
                warn!(target_channel = %target, copy_id = %copy, error = %e, "Failed to edit relayed copy");
                TargetOutcome::Failed
            }
        }
    }

    // -- Delete --

    pub async fn on_message_delete(&self, id: MessageId, channel: ChannelId) -> Result<RelayReport> {
        if self.echo.consume(id) {
            debug!(message_id = %id, "Delete of our own copy, not propagating");
            return Ok(RelayReport::ignored());
        }

        let targets = self.fan_out.targets(&self.store, channel).await?;
        let deletes = targets
            .iter()
            .map(|&target| self.delete_copy(id, channel, target));
        let outcomes = join_all(deletes).await;
        Ok(RelayReport::tally(targets.len(), outcomes))
    }

    async fn delete_copy(&self, id: MessageId, channel: ChannelId, target: ChannelId) -> TargetOutcome {
        let copy = match self.find_copy(channel, id, target).await {
            Some(copy) => copy,
            None => return TargetOutcome::Skipped,
        };

        let webhook = match self.webhook_for(target).await {
            Ok(w) => w,
            Err(e) => {
                warn!(target_channel = %target, error = %e, "Failed to get webhook");
                return TargetOutcome::Failed;
            }
        };

        // Marked first: the delete notification can arrive before the call returns.
        self.echo.mark(copy);
        match self
            .guard
            .run(self.platform.delete_message(&webhook, copy))
            .await
        {
            Ok(()) => TargetOutcome::Done,
            Err(e) => {
                self.echo.forget(copy);
                if e.is_unknown_webhook() {
                    self.forget_webhook(target, webhook.id);
                }
                if e.is_not_found() {
                    debug!(target_channel = %target, copy_id = %copy, "Relayed copy already gone");
                    TargetOutcome::Skipped
                } else {
                    warn!(target_channel = %target, copy_id = %copy, error = %e, "Failed to delete relayed copy");
                    TargetOutcome::Failed
                }
            }
        }
    }

    // -- Commands --

    async fn on_command(&self, invocation: &CommandInvocation) {
        let reply = commands::execute(&self.store, invocation.channel_id, &invocation.command).await;
        info!(
            command = invocation.command.name(),
            channel_id = %invocation.channel_id,
            ok = !reply.is_error(),
            "Command handled"
        );
        if let Err(e) = self
            .guard
            .run(self.platform.reply_to_command(invocation, &reply))
            .await
        {
            warn!(command = invocation.command.name(), error = %e, "Failed to send command reply");
        }
    }

    // -- Helpers --

    fn is_own_or_ignored(&self, message: &Message) -> bool {
        if let Some(webhook) = message.webhook_id {
            let ours = self
                .own_webhooks
                .read()
                .unwrap_or_else(|p| p.into_inner())
                .contains(&webhook);
            if ours {
                return true;
            }
        }

        match self.identity() {
            Some(me) => {
                if message.is_webhook_message() && message.application_id == Some(me.application_id) {
                    return true;
                }
                if message.author.id == me.user_id {
                    return true;
                }
            }
            // Until we know who we are, any webhook post could be one of ours.
            None if message.is_webhook_message() => return true,
            None => {}
        }

        self.config.ignore_bots && message.author.bot
    }

    async fn compose(&self, message: &Message, target: ChannelId, webhook: &Webhook, footer: &str) -> String {
        let mut content = self
            .resolver
            .header_for(message, target, webhook.guild_id)
            .await
            .unwrap_or_default();
        content.push_str(&message.content);
        content.push_str(footer);
        content
    }

    async fn find_copy(&self, channel: ChannelId, id: MessageId, target: ChannelId) -> Option<MessageId> {
        match call::blocking(&self.store, move |s| s.find_copy(channel, id, target)).await {
            Ok(Some(copy)) => Some(copy),
            Ok(None) => {
                debug!(message_id = %id, target_channel = %target, "No relayed copy in target");
                None
            }
            Err(e) => {
                error!(message_id = %id, target_channel = %target, error = %e, "Failed to look up relayed copy");
                None
            }
        }
    }

    async fn webhook_for(&self, target: ChannelId) -> PlatformResult<Webhook> {
        let webhook = self.guard.run(self.platform.outbound_webhook(target)).await?;
        self.own_webhooks
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(webhook.id);
        Ok(webhook)
    }

    fn forget_webhook(&self, target: ChannelId, id: WebhookId) {
        self.platform.evict_webhook(target);
        self.own_webhooks
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&id);
    }
}
