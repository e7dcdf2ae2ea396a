pub mod attachments;
pub mod call;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod echo;
pub mod error;
pub mod fanout;
pub mod preview;
pub mod processor;
pub mod resolver;

pub use config::RelayConfig;
pub use error::RelayError;
pub use fanout::{FanOutSource, StaticFanOut};
pub use processor::{BotIdentity, RelayProcessor, RelayReport};
