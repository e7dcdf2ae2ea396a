//! Discord API constants.

/// Discord API base URL (v10).
pub const API_BASE: &str = "https://discord.com/api/v10";

pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg";

/// Default heartbeat interval when the server does not provide one (ms).
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 41250;

/// Name given to the webhooks we create for relaying.
pub const WEBHOOK_NAME: &str = "ForwarderHook";

/// Message flag that makes an interaction reply visible only to the invoker.
pub const FLAG_EPHEMERAL: u64 = 1 << 6;

pub const PERMISSION_MANAGE_CHANNELS: u64 = 1 << 4;

/// Gateway opcodes used in the Discord WebSocket protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GatewayOpcode {
    /// An event was dispatched (server → client).
    Dispatch = 0,
    Heartbeat = 1,
    Identify = 2,
    Resume = 6,
    /// Server is telling the client to reconnect.
    Reconnect = 7,
    InvalidSession = 9,
    /// Sent immediately after connecting; contains heartbeat interval.
    Hello = 10,
    HeartbeatAck = 11,
}

impl GatewayOpcode {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Identify),
            6 => Some(Self::Resume),
            7 => Some(Self::Reconnect),
            9 => Some(Self::InvalidSession),
            10 => Some(Self::Hello),
            11 => Some(Self::HeartbeatAck),
            _ => None,
        }
    }
}

/// Discord interaction types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InteractionType {
    ApplicationCommand = 2,
    MessageComponent = 3,
}

/// Interaction callback types for responding to interactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InteractionCallbackType {
    /// Respond to an interaction with a message.
    ChannelMessageWithSource = 4,
}

/// Application command option types.
pub mod option_type {
    pub const STRING: u8 = 3;
}

/// Interaction context in which a command may be used.
pub mod context {
    pub const GUILD: u8 = 0;
}

/// Individual intent bit flags.
pub mod intents {
    pub const GUILDS: u64 = 1 << 0;
    pub const GUILD_MESSAGES: u64 = 1 << 9;
    pub const MESSAGE_CONTENT: u64 = 1 << 15;
}

/// Intents the relay needs: guild structure, guild messages and their content.
pub const RELAY_INTENTS: u64 = intents::GUILDS | intents::GUILD_MESSAGES | intents::MESSAGE_CONTENT;

/// Gateway close codes after which reconnecting cannot help.
pub const FATAL_CLOSE_CODES: &[u16] = &[
    4004, // authentication failed
    4010, // invalid shard
    4011, // sharding required
    4012, // invalid API version
    4013, // invalid intents
    4014, // disallowed intents
];
