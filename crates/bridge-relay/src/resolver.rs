use std::sync::Arc;

use bridge_db::RelayStore;
use bridge_types::platform::Platform;
use bridge_types::models::Message;
use bridge_types::{ChannelId, GuildId, MessageId};
use tracing::{debug, error, warn};

use crate::call::{self, CallGuard};
use crate::preview::{self, QuotedAuthor};

/// Builds the quoted header for replies, per target channel.
pub struct ReferenceResolver {
    store: Arc<dyn RelayStore>,
    platform: Arc<dyn Platform>,
    guard: CallGuard,
    preview_max_chars: usize,
}

impl ReferenceResolver {
    pub fn new(
        store: Arc<dyn RelayStore>,
        platform: Arc<dyn Platform>,
        guard: CallGuard,
        preview_max_chars: usize,
    ) -> Self {
        Self {
            store,
            platform,
            guard,
            preview_max_chars,
        }
    }

    /// Header for `message` as relayed into `target`, or `None` when the replied-to
    /// message has no counterpart there (or anything on the way fails).
    pub async fn header_for(
        &self,
        message: &Message,
        target: ChannelId,
        target_guild: Option<GuildId>,
    ) -> Option<String> {
        let (ref_channel, ref_message) = message.replied_to()?;

        let representative = self.representative(ref_message, ref_channel, target).await?;

        let referenced = match self
            .guard
            .run(self.platform.get_message(ref_channel, ref_message))
            .await
        {
            Ok(m) => m,
            Err(e) => {
                warn!(channel_id = %ref_channel, message_id = %ref_message, error = %e, "Failed to fetch replied-to message");
                return None;
            }
        };

        let author = self.quoted_author(&referenced).await;
        let quoted = preview::quote(&referenced.content, self.preview_max_chars);
        Some(preview::render_header(target_guild, target, representative, &author, &quoted))
    }

    async fn representative(
        &self,
        message: MessageId,
        known: ChannelId,
        target: ChannelId,
    ) -> Option<MessageId> {
        match call::blocking(&self.store, move |s| s.resolve_representative(message, known, target)).await {
            Ok(Some(id)) => Some(id),
            Ok(None) => {
                debug!(message_id = %message, target_channel = %target, "Reply has no counterpart in target");
                None
            }
            Err(e) => {
                error!(message_id = %message, error = %e, "Failed to resolve reply representative");
                None
            }
        }
    }

    async fn quoted_author(&self, referenced: &Message) -> QuotedAuthor {
        if !referenced.is_webhook_message() {
            return QuotedAuthor::Mention(referenced.author.id);
        }

        // Relayed copies are posted under the original display name.
        let name = referenced.author.username.clone();
        let lookup = name.clone();
        match call::blocking(&self.store, move |s| s.lookup_author(&lookup)).await {
            Ok(Some(user)) => QuotedAuthor::Mention(user),
            Ok(None) => {
                debug!(display_name = %name, "No identity on file for display name");
                QuotedAuthor::Name(name)
            }
            Err(e) => {
                error!(display_name = %name, error = %e, "Author lookup failed");
                QuotedAuthor::Name(name)
            }
        }
    }
}
