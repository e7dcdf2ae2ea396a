mod common;

use bridge_db::LinkStore;
use bridge_relay::commands::execute;
use bridge_types::api::{Command, CommandInvocation, CommandReply, ReplyKind};
use bridge_types::events::InboundEvent;
use bridge_types::{GroupKey, InteractionId};
use common::*;

fn link(key: &str, note: &str) -> Command {
    Command::Link {
        key: key.into(),
        note: note.into(),
    }
}

#[tokio::test]
async fn link_hashes_label_and_is_idempotent() {
    let h = harness();
    let key = GroupKey::from_label("lobby");

    let reply = execute(&h.store, A, &link("lobby", "main hall")).await;
    assert_eq!(reply.kind, ReplyKind::Success);
    assert_eq!(reply.title, "Success");
    assert_eq!(
        reply.description,
        format!("Channel successfully linked to virtual channel `{}`.", key)
    );

    execute(&h.store, A, &link("lobby", "again")).await;
    let groups = h.db.list_groups(A).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].group_key, key);
}

#[tokio::test]
async fn unlink_accepts_label_or_printed_key() {
    let h = harness();
    let key = GroupKey::from_label("lobby");
    execute(&h.store, A, &link("lobby", "")).await;
    execute(&h.store, B, &link("lobby", "")).await;

    let by_label = execute(&h.store, A, &Command::Unlink { key: "lobby".into() }).await;
    assert_eq!(by_label.kind, ReplyKind::Success);

    let by_key = execute(&h.store, B, &Command::Unlink { key: key.to_string() }).await;
    assert_eq!(
        by_key.description,
        format!("Channel successfully unlinked from virtual channel key `{}`.", key)
    );
    assert!(h.db.fan_out_targets(A).unwrap().is_empty());
}

#[tokio::test]
async fn unlink_by_hex_looking_label() {
    let h = harness();
    let label = "a".repeat(64);
    execute(&h.store, A, &link(&label, "")).await;

    let reply = execute(&h.store, A, &Command::Unlink { key: label.clone() }).await;
    assert_eq!(reply.kind, ReplyKind::Success);
    assert!(h.db.list_groups(A).unwrap().is_empty());
}

#[tokio::test]
async fn unlink_missing_is_user_error() {
    let h = harness();
    let reply = execute(&h.store, A, &Command::Unlink { key: "nope".into() }).await;
    assert_eq!(
        reply,
        CommandReply::error("Error", "No link found for virtual channel key `nope`.")
    );
    assert_eq!(reply.color(), 0xFF0000);
}

#[tokio::test]
async fn unlink_all_counts_rows() {
    let h = harness();
    let empty = execute(&h.store, A, &Command::UnlinkAll).await;
    assert_eq!(empty.title, "No Links Found");
    assert!(empty.is_error());

    execute(&h.store, A, &link("one", "")).await;
    execute(&h.store, A, &link("two", "")).await;
    let reply = execute(&h.store, A, &Command::UnlinkAll).await;
    assert_eq!(
        reply.description,
        "Successfully unlinked 2 virtual channel(s) from this channel."
    );
}

#[tokio::test]
async fn list_renders_keys_and_notes() {
    let h = harness();
    let empty = execute(&h.store, A, &Command::List).await;
    assert_eq!(empty.title, "No Virtual Channels Linked");
    assert_eq!(empty.kind, ReplyKind::Success);

    execute(&h.store, A, &link("one", "first room")).await;
    execute(&h.store, A, &link("two", "")).await;

    let reply = execute(&h.store, A, &Command::List).await;
    assert_eq!(reply.title, "Virtual Channels Linked");
    assert_eq!(
        reply.description,
        format!(
            "Virtual channels linked to this channel:\n- `{}` (note: first room)\n- `{}`\n",
            GroupKey::from_label("one"),
            GroupKey::from_label("two")
        )
    );
    assert_eq!(reply.color(), 0x00FF00);
}

#[tokio::test]
async fn command_event_gets_exactly_one_reply() {
    let h = harness();
    h.processor
        .handle(InboundEvent::Command(CommandInvocation {
            interaction_id: InteractionId::new(1),
            token: "tok".into(),
            channel_id: A,
            command: Command::List,
        }))
        .await;

    let replies = h.platform.replies.lock().unwrap().clone();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].title, "No Virtual Channels Linked");
}
