use anyhow::Result;
use bridge_types::{ChannelId, GroupKey, MessageId, UserId};
use chrono::{DateTime, Utc};

use crate::models::{CorrelationRow, LinkRow};

/// Durable membership of channels in groups.
pub trait LinkStore: Send + Sync {
    /// Insert-or-ignore; re-linking an existing pair keeps the original note.
    fn add_link(&self, key: &GroupKey, channel: ChannelId, note: &str) -> Result<()>;

    /// Returns the number of rows removed; 0 means the pair was never linked.
    fn remove_link(&self, key: &GroupKey, channel: ChannelId) -> Result<usize>;

    fn remove_all_links(&self, channel: ChannelId) -> Result<usize>;

    /// Groups of `channel` in insertion order.
    fn list_groups(&self, channel: ChannelId) -> Result<Vec<LinkRow>>;

    /// Every other channel sharing at least one group with `channel`, each once,
    /// in first-linked order.
    fn fan_out_targets(&self, channel: ChannelId) -> Result<Vec<ChannelId>>;
}

/// Durable source-to-copy correlation of relayed messages.
pub trait CorrelationStore: Send + Sync {
    fn record_correlation(&self, row: &CorrelationRow) -> Result<()>;

    /// All rows of one source message, written in a single transaction.
    fn record_correlations(&self, rows: &[CorrelationRow]) -> Result<()>;

    fn find_copy(
        &self,
        source_channel: ChannelId,
        source_message: MessageId,
        target_channel: ChannelId,
    ) -> Result<Option<MessageId>>;

    /// The id standing for `message`'s correlation class inside `target_channel`.
    fn resolve_representative(
        &self,
        message: MessageId,
        known_channel: ChannelId,
        target_channel: ChannelId,
    ) -> Result<Option<MessageId>>;

    fn prune_correlations(&self, older_than: DateTime<Utc>) -> Result<usize>;
}

/// Display name to platform user, for mentioning the real author of a relayed copy.
pub trait AuthorStore: Send + Sync {
    fn record_author(&self, display_name: &str, user: UserId) -> Result<()>;

    /// Most recently recorded user for the name.
    fn lookup_author(&self, display_name: &str) -> Result<Option<UserId>>;
}

pub trait RelayStore: LinkStore + CorrelationStore + AuthorStore {}

impl<T: LinkStore + CorrelationStore + AuthorStore> RelayStore for T {}
