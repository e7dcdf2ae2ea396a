use std::fmt::Write;
use std::sync::Arc;

use bridge_db::RelayStore;
use bridge_types::api::{Command, CommandReply};
use bridge_types::{ChannelId, GroupKey};
use tracing::error;

use crate::call;

const ERROR_TITLE: &str = "Error";
const SUCCESS_TITLE: &str = "Success";

/// Runs an administrative command against the link store. Always yields one reply.
pub async fn execute(store: &Arc<dyn RelayStore>, channel: ChannelId, command: &Command) -> CommandReply {
    match command {
        Command::Link { key, note } => link(store, channel, key, note).await,
        Command::Unlink { key } => unlink(store, channel, key).await,
        Command::UnlinkAll => unlink_all(store, channel).await,
        Command::List => list(store, channel).await,
    }
}

async fn link(store: &Arc<dyn RelayStore>, channel: ChannelId, label: &str, note: &str) -> CommandReply {
    let key = GroupKey::from_label(label);
    let stored = key.clone();
    let note = note.to_string();

    match call::blocking(store, move |s| s.add_link(&stored, channel, &note)).await {
        Ok(()) => CommandReply::success(
            SUCCESS_TITLE,
            format!("Channel successfully linked to virtual channel `{}`.", key),
        ),
        Err(e) => {
            error!(channel_id = %channel, error = %e, "Failed to link channel");
            CommandReply::error(ERROR_TITLE, "Could not link the channel.")
        }
    }
}

async fn unlink(store: &Arc<dyn RelayStore>, channel: ChannelId, input: &str) -> CommandReply {
    let key = GroupKey::parse_or_hash(input);
    let label = GroupKey::from_label(input);

    let removed = call::blocking(store, move |s| {
        let removed = s.remove_link(&key, channel)?;
        // A 64-hex label was hashed by `link`; fall back to that form.
        if removed == 0 && key != label {
            return s.remove_link(&label, channel);
        }
        Ok(removed)
    })
    .await;

    match removed {
        Ok(0) => CommandReply::error(
            ERROR_TITLE,
            format!("No link found for virtual channel key `{}`.", input),
        ),
        Ok(_) => CommandReply::success(
            SUCCESS_TITLE,
            format!("Channel successfully unlinked from virtual channel key `{}`.", input),
        ),
        Err(e) => {
            error!(channel_id = %channel, error = %e, "Failed to unlink channel");
            CommandReply::error(ERROR_TITLE, "Could not unlink the channel.")
        }
    }
}

async fn unlink_all(store: &Arc<dyn RelayStore>, channel: ChannelId) -> CommandReply {
    match call::blocking(store, move |s| s.remove_all_links(channel)).await {
        Ok(0) => CommandReply::error("No Links Found", "No links found for this channel."),
        Ok(n) => CommandReply::success(
            SUCCESS_TITLE,
            format!("Successfully unlinked {} virtual channel(s) from this channel.", n),
        ),
        Err(e) => {
            error!(channel_id = %channel, error = %e, "Failed to unlink all groups");
            CommandReply::error(ERROR_TITLE, "Could not unlink all virtual channels.")
        }
    }
}

async fn list(store: &Arc<dyn RelayStore>, channel: ChannelId) -> CommandReply {
    let groups = match call::blocking(store, move |s| s.list_groups(channel)).await {
        Ok(groups) => groups,
        Err(e) => {
            error!(channel_id = %channel, error = %e, "Failed to list groups");
            return CommandReply::error(ERROR_TITLE, "Could not retrieve the list of virtual channels.");
        }
    };

    if groups.is_empty() {
        return CommandReply::success(
            "No Virtual Channels Linked",
            "No virtual channels are linked to this channel.",
        );
    }

    let mut lines = String::new();
    for group in &groups {
        let _ = write!(lines, "- `{}`", group.group_key);
        if !group.note.is_empty() {
            let _ = write!(lines, " (note: {})", group.note);
        }
        lines.push('\n');
    }

    CommandReply::success(
        "Virtual Channels Linked",
        format!("Virtual channels linked to this channel:\n{}", lines),
    )
}
