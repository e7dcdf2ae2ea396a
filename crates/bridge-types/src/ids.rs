use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Platform snowflakes arrive as decimal strings in JSON, occasionally as bare numbers.
struct SnowflakeVisitor;

impl Visitor<'_> for SnowflakeVisitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a snowflake as a decimal string or integer")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
        u64::try_from(v).map_err(|_| E::custom(format!("negative snowflake: {}", v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
        v.parse().map_err(|_| E::custom(format!("invalid snowflake: {:?}", v)))
    }
}

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> u64 {
                self.0
            }

            /// SQLite stores integers as i64; snowflakes never use the sign bit.
            pub const fn to_i64(self) -> i64 {
                self.0 as i64
            }

            pub const fn from_i64(raw: i64) -> Self {
                Self(raw as u64)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_any(SnowflakeVisitor).map(Self)
            }
        }
    };
}

snowflake_id!(
    /// A text channel (or thread) on the platform.
    ChannelId
);
snowflake_id!(MessageId);
snowflake_id!(UserId);
snowflake_id!(GuildId);
snowflake_id!(WebhookId);
snowflake_id!(AttachmentId);
snowflake_id!(InteractionId);
snowflake_id!(
    /// The bot application; owns the webhooks used to post relayed copies.
    ApplicationId
);

/// Key of a virtual group (bridge). Always the lowercase hex SHA-256 of the
/// label a user typed, so free text never ends up as a join key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(String);

impl GroupKey {
    pub const HEX_LEN: usize = 64;

    pub fn from_label(label: &str) -> Self {
        Self(hex::encode(Sha256::digest(label.as_bytes())))
    }

    /// Accepts either a label or a key exactly as `list` prints it.
    pub fn parse_or_hash(input: &str) -> Self {
        if Self::looks_hashed(input) {
            Self(input.to_ascii_lowercase())
        } else {
            Self::from_label(input)
        }
    }

    /// Wraps a value read back from storage.
    pub fn from_stored(key: String) -> Self {
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn looks_hashed(input: &str) -> bool {
        input.len() == Self::HEX_LEN && input.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
