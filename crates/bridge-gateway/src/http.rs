use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use bridge_types::api::{CommandInvocation, CommandReply};
use bridge_types::models::{Author, Message, OutboundMessage, Webhook};
use bridge_types::platform::{PlatformError, PlatformResult};
use bridge_types::{ApplicationId, ChannelId, MessageId};
use bytes::{Bytes, BytesMut};
use reqwest::{Method, RequestBuilder, Response, StatusCode, header::HeaderMap};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::{sync::Mutex, time::sleep};
use tracing::debug;

use crate::types::{API_BASE, FLAG_EPHEMERAL, InteractionCallbackType};

const MAX_RATE_LIMIT_RETRIES: u8 = 3;

#[derive(Debug, Clone)]
struct RateLimitBucket {
    remaining: u32,
    reset_at: f64,
}

/// Discord REST client with per-route and global rate-limit tracking.
pub struct DiscordHttp {
    client: reqwest::Client,
    bot_token: String,
    buckets: Arc<Mutex<HashMap<String, RateLimitBucket>>>,
    global_reset_at: Arc<Mutex<Option<f64>>>,
}

impl DiscordHttp {
    pub fn new(bot_token: impl Into<String>, timeout: Duration) -> PlatformResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(transport_error)?;
        Ok(Self {
            client,
            bot_token: bot_token.into(),
            buckets: Arc::new(Mutex::new(HashMap::new())),
            global_reset_at: Arc::new(Mutex::new(None)),
        })
    }

    // -- Startup --

    pub async fn current_application(&self) -> PlatformResult<ApplicationId> {
        let url = format!("{API_BASE}/applications/@me");
        let app: Value = self.json(Method::GET, &url, None).await?;
        app.get("id")
            .and_then(Value::as_str)
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| PlatformError::Decode("application without id".into()))
    }

    pub async fn current_user(&self) -> PlatformResult<Author> {
        let url = format!("{API_BASE}/users/@me");
        self.json(Method::GET, &url, None).await
    }

    pub async fn gateway_url(&self) -> PlatformResult<String> {
        let url = format!("{API_BASE}/gateway/bot");
        let gateway: Value = self.json(Method::GET, &url, None).await?;
        gateway
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Decode("gateway/bot without url".into()))
    }

    /// Overwrites the global command set of the application.
    pub async fn register_commands(&self, application_id: ApplicationId, commands: &[Value]) -> PlatformResult<()> {
        let url = format!("{API_BASE}/applications/{application_id}/commands");
        self.request(Method::PUT, &url, Some(json!(commands))).await?;
        Ok(())
    }

    // -- Messages --

    pub async fn get_message(&self, channel: ChannelId, message: MessageId) -> PlatformResult<Message> {
        let url = format!("{API_BASE}/channels/{channel}/messages/{message}");
        self.json(Method::GET, &url, None).await
    }

    // -- Webhooks --

    pub async fn channel_webhooks(&self, channel: ChannelId) -> PlatformResult<Vec<Webhook>> {
        let url = format!("{API_BASE}/channels/{channel}/webhooks");
        self.json(Method::GET, &url, None).await
    }

    pub async fn create_webhook(&self, channel: ChannelId, name: &str) -> PlatformResult<Webhook> {
        let url = format!("{API_BASE}/channels/{channel}/webhooks");
        self.json(Method::POST, &url, Some(json!({ "name": name }))).await
    }

    /// Executes the webhook and waits for the created message.
    pub async fn execute_webhook(&self, webhook: &Webhook, message: &OutboundMessage) -> PlatformResult<Message> {
        let token = webhook.token.as_deref().ok_or(PlatformError::MissingToken)?;
        let url = format!("{API_BASE}/webhooks/{}/{token}?wait=true", webhook.id);
        let payload = webhook_payload(message);

        let response = if message.files.is_empty() {
            self.request(Method::POST, &url, Some(payload)).await?
        } else {
            let route_key = Self::bucket_key_from_url(&url);
            self.send_with_retries(&route_key, || {
                let mut form = reqwest::multipart::Form::new().text("payload_json", payload.to_string());
                for (i, file) in message.files.iter().enumerate() {
                    let part = reqwest::multipart::Part::stream(file.data.clone())
                        .file_name(file.filename.clone());
                    form = form.part(format!("files[{i}]"), part);
                }
                self.client.post(&url).multipart(form)
            })
            .await?
        };
        decode(response).await
    }

    pub async fn edit_webhook_message(
        &self,
        webhook: &Webhook,
        message: MessageId,
        content: &str,
    ) -> PlatformResult<()> {
        let token = webhook.token.as_deref().ok_or(PlatformError::MissingToken)?;
        let url = format!("{API_BASE}/webhooks/{}/{token}/messages/{message}", webhook.id);
        let body = json!({
            "content": content,
            "allowed_mentions": { "parse": [] },
        });
        self.request(Method::PATCH, &url, Some(body)).await?;
        Ok(())
    }

    pub async fn delete_webhook_message(&self, webhook: &Webhook, message: MessageId) -> PlatformResult<()> {
        let token = webhook.token.as_deref().ok_or(PlatformError::MissingToken)?;
        let url = format!("{API_BASE}/webhooks/{}/{token}/messages/{message}", webhook.id);
        self.request(Method::DELETE, &url, None).await?;
        Ok(())
    }

    // -- Interactions --

    /// Answers a slash command with a single ephemeral embed.
    pub async fn reply_to_interaction(&self, invocation: &CommandInvocation, reply: &CommandReply) -> PlatformResult<()> {
        let url = format!(
            "{API_BASE}/interactions/{}/{}/callback",
            invocation.interaction_id, invocation.token
        );
        let body = json!({
            "type": InteractionCallbackType::ChannelMessageWithSource as u8,
            "data": {
                "embeds": [{
                    "title": reply.title,
                    "description": reply.description,
                    "color": reply.color(),
                }],
                "flags": FLAG_EPHEMERAL,
            }
        });
        self.request(Method::POST, &url, Some(body)).await?;
        Ok(())
    }

    // -- Attachments --

    /// Downloads a CDN file, giving up once more than `max_bytes` have arrived.
    pub async fn download(&self, url: &str, max_bytes: u64) -> PlatformResult<Bytes> {
        let mut response = self.client.get(url).send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        if let Some(size) = response.content_length()
            && size > max_bytes
        {
            return Err(PlatformError::TooLarge { size, limit: max_bytes });
        }

        let mut data = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(transport_error)? {
            data.extend_from_slice(&chunk);
            if data.len() as u64 > max_bytes {
                return Err(PlatformError::TooLarge {
                    size: data.len() as u64,
                    limit: max_bytes,
                });
            }
        }
        Ok(data.freeze())
    }

    // -- Plumbing --

    async fn json<T: DeserializeOwned>(&self, method: Method, url: &str, body: Option<Value>) -> PlatformResult<T> {
        let response = self.request(method, url, body).await?;
        decode(response).await
    }

    async fn request(&self, method: Method, url: &str, body: Option<Value>) -> PlatformResult<Response> {
        let route_key = Self::bucket_key_from_url(url);
        self.send_with_retries(&route_key, || {
            let mut builder = self
                .client
                .request(method.clone(), url)
                .header("Authorization", format!("Bot {}", self.bot_token));
            if let Some(payload) = &body {
                builder = builder.json(payload);
            }
            builder
        })
        .await
    }

    async fn send_with_retries<F>(&self, route_key: &str, build: F) -> PlatformResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        self.wait_for_limits(route_key).await;

        for attempt in 0..=MAX_RATE_LIMIT_RETRIES {
            let response = build().send().await.map_err(transport_error)?;

            self.update_bucket_from_headers(route_key, response.headers())
                .await;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                if attempt == MAX_RATE_LIMIT_RETRIES {
                    break;
                }
                let is_global = Self::is_global_limit(response.headers());
                let retry_after = Self::parse_retry_after(response.headers())
                    .unwrap_or_else(|| Duration::from_secs(1));
                debug!(route = route_key, ?retry_after, is_global, "Rate limited");
                self.handle_429_wait(is_global, retry_after, route_key)
                    .await;
                continue;
            }

            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }

            return Ok(response);
        }

        Err(PlatformError::Http {
            status: StatusCode::TOO_MANY_REQUESTS.as_u16(),
            code: None,
            body: format!("rate limited after {MAX_RATE_LIMIT_RETRIES} retries on {route_key}"),
        })
    }

    fn parse_header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u32>().ok())
    }

    fn parse_header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<f64>().ok())
    }

    fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
        let seconds = Self::parse_header_f64(headers, "Retry-After")?;
        if seconds <= 0.0 {
            return Some(Duration::from_secs(0));
        }
        Some(Duration::from_secs_f64(seconds))
    }

    fn is_global_limit(headers: &HeaderMap) -> bool {
        headers
            .get("X-RateLimit-Global")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }

    fn now_unix_timestamp() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }

    /// Route key with snowflakes and webhook tokens replaced, so one bucket
    /// covers every channel or webhook hitting the same endpoint shape.
    fn bucket_key_from_url(url: &str) -> String {
        let path = reqwest::Url::parse(url)
            .map_or_else(|_| url.to_string(), |parsed| parsed.path().to_string());
        let path_without_api_prefix = path
            .strip_prefix("/api/v10")
            .map_or(path.as_str(), |stripped| stripped);

        let mut previous = "";
        let normalized = path_without_api_prefix
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                let replaced = if segment.chars().all(|character| character.is_ascii_digit()) {
                    "{id}".to_string()
                } else if previous == "{id}" && segment.len() > 32 {
                    "{token}".to_string()
                } else {
                    segment.to_string()
                };
                previous = if replaced == "{id}" { "{id}" } else { "" };
                replaced
            })
            .collect::<Vec<_>>()
            .join("/");

        format!("/{normalized}")
    }

    async fn wait_for_limits(&self, route_key: &str) {
        let now = Self::now_unix_timestamp();
        let global_wait = {
            let global_guard = self.global_reset_at.lock().await;
            global_guard.and_then(|reset_at| (reset_at > now).then_some(reset_at - now))
        };
        if let Some(wait_secs) = global_wait {
            sleep(Duration::from_secs_f64(wait_secs)).await;
        }

        let route_wait = {
            let buckets = self.buckets.lock().await;
            buckets.get(route_key).and_then(|bucket| {
                if bucket.remaining == 0 && bucket.reset_at > now {
                    Some(bucket.reset_at - now)
                } else {
                    None
                }
            })
        };
        if let Some(wait_secs) = route_wait {
            sleep(Duration::from_secs_f64(wait_secs)).await;
        }
    }

    async fn handle_429_wait(&self, is_global: bool, retry_after: Duration, route_key: &str) {
        let now = Self::now_unix_timestamp();
        let reset_at = now + retry_after.as_secs_f64();
        if is_global {
            let mut global = self.global_reset_at.lock().await;
            *global = Some(reset_at);
        } else {
            let mut buckets = self.buckets.lock().await;
            buckets.insert(
                route_key.to_string(),
                RateLimitBucket {
                    remaining: 0,
                    reset_at,
                },
            );
        }
        sleep(retry_after).await;
    }

    async fn update_bucket_from_headers(&self, route_key: &str, headers: &HeaderMap) {
        let remaining = Self::parse_header_u32(headers, "X-RateLimit-Remaining");
        let reset_at = Self::parse_header_f64(headers, "X-RateLimit-Reset");

        if let (Some(remaining), Some(reset_at)) = (remaining, reset_at) {
            let mut buckets = self.buckets.lock().await;
            buckets.insert(
                route_key.to_string(),
                RateLimitBucket {
                    remaining,
                    reset_at,
                },
            );
        }
    }
}

/// JSON part of a webhook execution. Mentions are never pinged from a relayed copy.
fn webhook_payload(message: &OutboundMessage) -> Value {
    let mut payload = json!({
        "content": message.content,
        "username": message.username,
        "allowed_mentions": { "parse": [] },
    });
    if let Some(avatar) = &message.avatar_url {
        payload["avatar_url"] = json!(avatar);
    }
    if !message.files.is_empty() {
        let attachments: Vec<Value> = message
            .files
            .iter()
            .enumerate()
            .map(|(i, file)| {
                let mut entry = json!({ "id": i, "filename": file.filename });
                if let Some(description) = &file.description {
                    entry["description"] = json!(description);
                }
                entry
            })
            .collect();
        payload["attachments"] = json!(attachments);
    }
    payload
}

async fn decode<T: DeserializeOwned>(response: Response) -> PlatformResult<T> {
    let body = response.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&body).map_err(|e| PlatformError::Decode(e.to_string()))
}

async fn error_from_response(response: Response) -> PlatformError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|error| format!("<failed to read response body: {error}>"));
    classify_error(status, body)
}

/// Maps an unsuccessful response onto the error taxonomy, keeping Discord's JSON error code.
fn classify_error(status: StatusCode, body: String) -> PlatformError {
    let parsed: Option<Value> = serde_json::from_str(&body).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(Value::as_u64)
        .and_then(|c| u32::try_from(c).ok());

    if status == StatusCode::NOT_FOUND {
        let message = parsed
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(Value::as_str)
            .map_or_else(|| body.clone(), str::to_string);
        return PlatformError::NotFound { code, message };
    }

    PlatformError::Http {
        status: status.as_u16(),
        code,
        body,
    }
}

fn transport_error(error: reqwest::Error) -> PlatformError {
    if error.is_timeout() {
        PlatformError::Timeout
    } else {
        PlatformError::Transport(error.to_string())
    }
}
