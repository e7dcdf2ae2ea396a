pub mod commands;
pub mod gateway;
pub mod http;
pub mod platform;
pub mod types;

pub use gateway::{DiscordGateway, GatewayState};
pub use http::DiscordHttp;
pub use platform::DiscordPlatform;
