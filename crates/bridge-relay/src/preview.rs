//! Text rules for the quoted header placed above a relayed reply.

use bridge_types::{ChannelId, GuildId, MessageId, UserId};

/// Lines starting with this are small-print; a previous relay header uses them too.
pub const MARKER_PREFIX: &str = "-#";
pub const CUT_INDICATOR: &str = " **. . .**";

/// Who the quoted message is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotedAuthor {
    Mention(UserId),
    Name(String),
}

/// Strips the consecutive leading lines that begin with the marker.
pub fn skip_marker_lines(content: &str) -> &str {
    let mut rest = content;
    while rest.starts_with(MARKER_PREFIX) {
        rest = match rest.find('\n') {
            Some(end) => &rest[end + 1..],
            None => "",
        };
    }
    rest
}

/// Cuts `text` to `max_chars` scalar values, backing off to the last whitespace
/// inside the window. Returns the preview and whether it was cut.
pub fn truncate_preview(text: &str, max_chars: usize) -> (&str, bool) {
    let Some((window_end, _)) = text.char_indices().nth(max_chars) else {
        return (text.trim_end(), false);
    };

    let mut preview = &text[..window_end];
    if let Some((space, _)) = preview.char_indices().rev().find(|(_, c)| c.is_whitespace()) {
        if space > 0 {
            preview = &preview[..space];
        }
    }
    (preview.trim_end(), true)
}

/// Builds the preview line content for `content` under the given window.
pub fn quote(content: &str, max_chars: usize) -> String {
    let (preview, cut) = truncate_preview(skip_marker_lines(content), max_chars);
    if cut {
        format!("{}{}", preview, CUT_INDICATOR)
    } else {
        preview.to_string()
    }
}

pub fn message_link(guild: Option<GuildId>, channel: ChannelId, message: MessageId) -> String {
    let guild = guild.map_or_else(|| "@me".to_string(), |g| g.to_string());
    format!("https://discord.com/channels/{}/{}/{}", guild, channel, message)
}

/// Two small-print lines: a jump link with the author, then the quoted text.
/// Ends with a newline so the relayed body follows on its own line.
pub fn render_header(
    guild: Option<GuildId>,
    channel: ChannelId,
    representative: MessageId,
    author: &QuotedAuthor,
    quoted: &str,
) -> String {
    let author = match author {
        QuotedAuthor::Mention(id) => format!("<@{}>", id),
        QuotedAuthor::Name(name) => name.clone(),
    };
    format!(
        "{} ↵ {} ({})\n{} > {}\n",
        MARKER_PREFIX,
        message_link(guild, channel, representative),
        author,
        MARKER_PREFIX,
        quoted
    )
}
