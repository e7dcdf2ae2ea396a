use bridge_types::api::{Command, CommandInvocation};
use serde_json::{Value, json};

use crate::types::{InteractionType, PERMISSION_MANAGE_CHANNELS, context, option_type};

const KEY_OPTION: &str = "virtual_channel_key";
const NOTE_OPTION: &str = "note";

/// Global slash commands for managing links. Restricted to guild channels
/// and to members who can manage channels.
pub fn build_commands() -> Vec<Value> {
    let key_option = |description: &str| {
        json!({
            "name": KEY_OPTION,
            "description": description,
            "type": option_type::STRING,
            "required": true
        })
    };

    vec![
        command(
            "link",
            "links current channel to virtual channel",
            vec![
                key_option("virtual channel key to link to"),
                json!({
                    "name": NOTE_OPTION,
                    "description": "note about virtual channel",
                    "type": option_type::STRING,
                    "required": false
                }),
            ],
        ),
        command(
            "unlink",
            "unlinks current channel from virtual channel",
            vec![key_option("virtual channel key to unlink from")],
        ),
        command(
            "unlink_all",
            "unlinks current channel from all virtual channels",
            Vec::new(),
        ),
        command(
            "list",
            "list virtual channels linked to current channel",
            Vec::new(),
        ),
    ]
}

fn command(name: &str, description: &str, options: Vec<Value>) -> Value {
    json!({
        "name": name,
        "description": description,
        "type": 1,
        "options": options,
        "default_member_permissions": PERMISSION_MANAGE_CHANNELS.to_string(),
        "contexts": [context::GUILD]
    })
}

/// Parses an `INTERACTION_CREATE` payload into a command, if it is one of ours.
pub fn parse_invocation(d: &Value) -> Option<CommandInvocation> {
    if d.get("type")?.as_u64()? != InteractionType::ApplicationCommand as u64 {
        return None;
    }

    let interaction_id = d.get("id")?.as_str()?.parse().ok()?;
    let token = d.get("token")?.as_str()?.to_string();
    let channel_id = d
        .get("channel_id")
        .or_else(|| d.get("channel").and_then(|c| c.get("id")))?
        .as_str()?
        .parse()
        .ok()?;

    let data = d.get("data")?;
    let command = match data.get("name")?.as_str()? {
        "link" => Command::Link {
            key: extract_string_option(data, KEY_OPTION)?,
            note: extract_string_option(data, NOTE_OPTION).unwrap_or_default(),
        },
        "unlink" => Command::Unlink {
            key: extract_string_option(data, KEY_OPTION)?,
        },
        "unlink_all" => Command::UnlinkAll,
        "list" => Command::List,
        _ => return None,
    };

    Some(CommandInvocation {
        interaction_id,
        token,
        channel_id,
        command,
    })
}

fn extract_string_option(data: &Value, name: &str) -> Option<String> {
    data.get("options")
        .and_then(Value::as_array)
        .and_then(|opts| {
            opts.iter().find_map(|opt| {
                if opt.get("name")?.as_str()? == name {
                    opt.get("value")?.as_str().map(String::from)
                } else {
                    None
                }
            })
        })
}
