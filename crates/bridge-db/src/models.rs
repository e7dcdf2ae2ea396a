use bridge_types::{ChannelId, GroupKey, MessageId};

/// One group membership of a channel, as listed back to users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRow {
    pub group_key: GroupKey,
    pub note: String,
}

/// `source_message_id` (in `source_channel_id`) was relayed into
/// `copy_channel_id` as `copy_message_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationRow {
    pub source_channel_id: ChannelId,
    pub source_message_id: MessageId,
    pub copy_channel_id: ChannelId,
    pub copy_message_id: MessageId,
}
