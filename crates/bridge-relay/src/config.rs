use std::time::Duration;

pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_ECHO_TTL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_ECHO_CAPACITY: usize = 10_000;
pub const DEFAULT_PREVIEW_MAX_CHARS: usize = 128;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Attachments at or below this size are re-uploaded; larger ones are linked.
    pub max_attachment_bytes: u64,
    /// Upper bound for every platform call made while relaying.
    pub request_timeout: Duration,
    /// Skip messages authored by any bot, not just ourselves.
    pub ignore_bots: bool,
    pub echo_ttl: Duration,
    pub echo_capacity: usize,
    pub preview_max_chars: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            ignore_bots: true,
            echo_ttl: DEFAULT_ECHO_TTL,
            echo_capacity: DEFAULT_ECHO_CAPACITY,
            preview_max_chars: DEFAULT_PREVIEW_MAX_CHARS,
        }
    }
}
