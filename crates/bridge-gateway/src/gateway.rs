use anyhow::{Context, Result};
use bridge_types::events::InboundEvent;
use bridge_types::models::Message as ChatMessage;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, interval};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands;
use crate::http::DiscordHttp;
use crate::types::{
    DEFAULT_GATEWAY_URL, DEFAULT_HEARTBEAT_INTERVAL_MS, FATAL_CLOSE_CODES, GatewayOpcode,
};

const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(60);

/// Session data kept across reconnects so the gateway can resume.
#[derive(Debug)]
pub struct GatewayState {
    pub session_id: Mutex<Option<String>>,
    pub sequence: AtomicI64,
    pub resume_gateway_url: Mutex<Option<String>>,
}

impl Default for GatewayState {
    fn default() -> Self {
        Self {
            session_id: Mutex::new(None),
            sequence: AtomicI64::new(-1),
            resume_gateway_url: Mutex::new(None),
        }
    }
}

/// How a single websocket session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Reconnect,
    Shutdown,
    Fatal(u16),
}

pub struct DiscordGateway {
    bot_token: String,
    intents: u64,
    state: GatewayState,
}

impl DiscordGateway {
    pub fn new(bot_token: String, intents: u64) -> Self {
        Self {
            bot_token,
            intents,
            state: GatewayState::default(),
        }
    }

    /// Keeps a session open until shutdown, reconnecting with backoff.
    /// Returns an error only for close codes that reconnecting cannot fix.
    pub async fn run(
        &self,
        http: &DiscordHttp,
        tx: &mpsc::Sender<InboundEvent>,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let mut backoff = Duration::from_secs(1);

        loop {
            match self.connect_and_listen(http, tx, shutdown).await {
                Ok(SessionEnd::Shutdown) => return Ok(()),
                Ok(SessionEnd::Fatal(code)) => {
                    anyhow::bail!("Discord gateway closed with fatal code {code}");
                }
                Ok(SessionEnd::Reconnect) => backoff = Duration::from_secs(1),
                Err(e) => {
                    warn!(error = %e, retry_in = ?backoff, "Discord gateway session failed");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_RECONNECT_BACKOFF);
        }
    }

    async fn connect_and_listen(
        &self,
        http: &DiscordHttp,
        tx: &mpsc::Sender<InboundEvent>,
        shutdown: &CancellationToken,
    ) -> Result<SessionEnd> {
        let gateway_url = self.resolve_gateway_url(http).await;
        let ws_url = build_gateway_ws_url(&gateway_url);

        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .with_context(|| format!("connect Discord gateway websocket: {ws_url}"))?;
        let (mut write, mut read) = ws_stream.split();

        let heartbeat_interval_ms = read_hello_heartbeat_interval(&mut read).await?;
        self.send_identify_or_resume(&mut write).await?;

        let mut heartbeat = interval(Duration::from_millis(heartbeat_interval_ms));
        let heartbeat_acked = AtomicBool::new(true);
        let mut ack_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    write.send(Message::Close(None)).await.ok();
                    return Ok(SessionEnd::Shutdown);
                }
                _ = heartbeat.tick() => {
                    if !self
                        .send_heartbeat_if_healthy(&mut write, &heartbeat_acked, &mut ack_deadline, heartbeat_interval_ms)
                        .await?
                    {
                        warn!("Discord gateway heartbeat ACK missing; reconnecting");
                        return Ok(SessionEnd::Reconnect);
                    }
                }
                () = wait_for_ack_timeout(ack_deadline) => {
                    if !heartbeat_acked.load(Ordering::SeqCst) {
                        warn!("Discord gateway heartbeat ACK timeout; reconnecting");
                        return Ok(SessionEnd::Reconnect);
                    }
                    ack_deadline = None;
                }
                message = read.next() => {
                    let Some(message) = message else {
                        warn!("Discord gateway socket closed; reconnecting");
                        return Ok(SessionEnd::Reconnect);
                    };

                    let message = message.context("read Discord gateway message")?;
                    if let Message::Close(frame) = &message {
                        return Ok(self.handle_close(frame.as_ref()).await);
                    }
                    if !self
                        .handle_gateway_message(message, tx, &mut write, &heartbeat_acked, &mut ack_deadline, heartbeat_interval_ms)
                        .await?
                    {
                        return Ok(SessionEnd::Reconnect);
                    }
                }
            }
        }
    }

    async fn resolve_gateway_url(&self, http: &DiscordHttp) -> String {
        if let Some(url) = self.state.resume_gateway_url.lock().await.clone()
            && !url.is_empty()
        {
            return url;
        }

        match http.gateway_url().await {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Failed to fetch gateway URL, using default");
                DEFAULT_GATEWAY_URL.to_string()
            }
        }
    }

    async fn handle_close(&self, frame: Option<&CloseFrame>) -> SessionEnd {
        let Some(frame) = frame else {
            return SessionEnd::Reconnect;
        };
        let code = u16::from(frame.code);
        if FATAL_CLOSE_CODES.contains(&code) {
            return SessionEnd::Fatal(code);
        }
        warn!(code, reason = %frame.reason, "Discord gateway closed the session");
        // 4007 invalid seq and 4009 session timeout cannot be resumed.
        if code == 4007 || code == 4009 {
            self.forget_session().await;
        }
        SessionEnd::Reconnect
    }

    async fn send_identify_or_resume<WsSink>(&self, write: &mut WsSink) -> Result<()>
    where
        WsSink: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        if let Some(session_id) = self.state.session_id.lock().await.clone() {
            let payload = json!({
                "op": GatewayOpcode::Resume as u8,
                "d": {
                    "token": self.bot_token,
                    "session_id": session_id,
                    "seq": self.current_sequence_value(),
                }
            });
            write
                .send(Message::Text(payload.to_string().into()))
                .await
                .context("send Discord gateway resume")?;
            return Ok(());
        }

        let payload = json!({
            "op": GatewayOpcode::Identify as u8,
            "d": {
                "token": self.bot_token,
                "intents": self.intents,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "channel-bridge",
                    "device": "channel-bridge"
                }
            },
        });

        write
            .send(Message::Text(payload.to_string().into()))
            .await
            .context("send Discord gateway identify")
    }

    async fn send_heartbeat_if_healthy<WsSink>(
        &self,
        write: &mut WsSink,
        heartbeat_acked: &AtomicBool,
        ack_deadline: &mut Option<Instant>,
        heartbeat_interval_ms: u64,
    ) -> Result<bool>
    where
        WsSink: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        if !heartbeat_acked.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let payload = json!({
            "op": GatewayOpcode::Heartbeat as u8,
            "d": self.current_sequence(),
        });

        write
            .send(Message::Text(payload.to_string().into()))
            .await
            .context("send Discord gateway heartbeat")?;

        heartbeat_acked.store(false, Ordering::SeqCst);
        *ack_deadline = Some(Instant::now() + Duration::from_millis(heartbeat_interval_ms));
        Ok(true)
    }

    async fn handle_gateway_message<WsSink>(
        &self,
        message: Message,
        tx: &mpsc::Sender<InboundEvent>,
        write: &mut WsSink,
        heartbeat_acked: &AtomicBool,
        ack_deadline: &mut Option<Instant>,
        heartbeat_interval_ms: u64,
    ) -> Result<bool>
    where
        WsSink: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        let Some(raw) = websocket_message_to_text(message) else {
            return Ok(true);
        };

        let payload: Value = serde_json::from_str(&raw).context("parse Discord gateway payload")?;

        if let Some(sequence) = payload.get("s").and_then(Value::as_i64) {
            self.state.sequence.store(sequence, Ordering::SeqCst);
        }

        let op = payload
            .get("op")
            .and_then(Value::as_u64)
            .and_then(GatewayOpcode::from_u64);

        match op {
            Some(GatewayOpcode::Heartbeat) => {
                self.send_heartbeat_if_healthy(write, heartbeat_acked, ack_deadline, heartbeat_interval_ms)
                    .await
            }
            Some(GatewayOpcode::HeartbeatAck) => {
                heartbeat_acked.store(true, Ordering::SeqCst);
                *ack_deadline = None;
                Ok(true)
            }
            Some(GatewayOpcode::Reconnect) => {
                info!("Discord gateway requested reconnect");
                Ok(false)
            }
            Some(GatewayOpcode::InvalidSession) => {
                self.handle_invalid_session(&payload).await;
                Ok(false)
            }
            Some(GatewayOpcode::Dispatch) => {
                self.handle_dispatch_payload(&payload, tx).await?;
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    async fn handle_dispatch_payload(&self, payload: &Value, tx: &mpsc::Sender<InboundEvent>) -> Result<()> {
        let event_type = payload.get("t").and_then(Value::as_str).unwrap_or("");
        let Some(data) = payload.get("d") else {
            return Ok(());
        };

        if event_type == "READY" {
            self.persist_ready_state(data).await;
        }

        if let Some(event) = parse_dispatch_event(event_type, data) {
            tx.send(event)
                .await
                .context("dispatch parsed Discord gateway event")?;
        }

        Ok(())
    }

    async fn persist_ready_state(&self, d: &Value) {
        let session_id = d.get("session_id").and_then(Value::as_str).map(str::to_string);
        let resume_url = d.get("resume_gateway_url").and_then(Value::as_str).map(str::to_string);
        *self.state.session_id.lock().await = session_id;
        *self.state.resume_gateway_url.lock().await = resume_url;
    }

    async fn handle_invalid_session(&self, payload: &Value) {
        let can_resume = payload.get("d").and_then(Value::as_bool).unwrap_or(false);

        if can_resume {
            let wait_secs = invalid_session_backoff_secs();
            warn!("Discord gateway invalid session (resume allowed), waiting {wait_secs}s before reconnect");
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
            return;
        }

        warn!("Discord gateway invalid session (resume denied), starting a fresh session");
        self.forget_session().await;
    }

    async fn forget_session(&self) {
        self.state.sequence.store(-1, Ordering::SeqCst);
        *self.state.session_id.lock().await = None;
        *self.state.resume_gateway_url.lock().await = None;
    }

    fn current_sequence(&self) -> Value {
        let sequence = self.current_sequence_value();
        if sequence < 0 { Value::Null } else { json!(sequence) }
    }

    fn current_sequence_value(&self) -> i64 {
        self.state.sequence.load(Ordering::SeqCst)
    }
}

/// Decodes the dispatch events the relay cares about.
pub fn parse_dispatch_event(event_type: &str, d: &Value) -> Option<InboundEvent> {
    match event_type {
        "READY" => parse_ready_event(d),
        "MESSAGE_CREATE" => parse_message(d).map(InboundEvent::MessageCreate),
        "MESSAGE_UPDATE" => parse_message(d).map(InboundEvent::MessageUpdate),
        "MESSAGE_DELETE" => parse_message_delete_event(d),
        "INTERACTION_CREATE" => commands::parse_invocation(d).map(InboundEvent::Command),
        "RESUMED" => {
            info!("Discord gateway session resumed");
            None
        }
        _ => None,
    }
}

fn parse_ready_event(d: &Value) -> Option<InboundEvent> {
    let session_id = d.get("session_id")?.as_str()?.to_string();
    let user_id = d.get("user")?.get("id")?.as_str()?.parse().ok()?;
    let application_id = d.get("application")?.get("id")?.as_str()?.parse().ok()?;

    Some(InboundEvent::Ready {
        user_id,
        application_id,
        session_id,
    })
}

/// Edits that only touch embeds arrive without an author and are skipped.
fn parse_message(d: &Value) -> Option<ChatMessage> {
    match serde_json::from_value(d.clone()) {
        Ok(message) => Some(message),
        Err(e) => {
            debug!(error = %e, "Skipping undecodable message payload");
            None
        }
    }
}

fn parse_message_delete_event(d: &Value) -> Option<InboundEvent> {
    Some(InboundEvent::MessageDelete {
        id: d.get("id")?.as_str()?.parse().ok()?,
        channel_id: d.get("channel_id")?.as_str()?.parse().ok()?,
        guild_id: d
            .get("guild_id")
            .and_then(Value::as_str)
            .and_then(|g| g.parse().ok()),
    })
}

async fn wait_for_ack_timeout(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(deadline).await;
    } else {
        futures_util::future::pending::<()>().await;
    }
}

async fn read_hello_heartbeat_interval<WsRead>(read: &mut WsRead) -> Result<u64>
where
    WsRead: Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(message) = read.next().await {
        let message = message.context("read Discord gateway hello payload")?;
        let Some(raw) = websocket_message_to_text(message) else {
            continue;
        };

        let payload: Value = serde_json::from_str(&raw).context("parse Discord gateway hello JSON")?;

        let op = payload
            .get("op")
            .and_then(Value::as_u64)
            .and_then(GatewayOpcode::from_u64);

        if op == Some(GatewayOpcode::Hello) {
            let interval_ms = payload
                .get("d")
                .and_then(|d| d.get("heartbeat_interval"))
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS);
            return Ok(interval_ms);
        }
    }

    Err(anyhow::anyhow!("Discord gateway closed before Hello"))
}

fn websocket_message_to_text(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text.to_string()),
        Message::Binary(bytes) => String::from_utf8(bytes.to_vec()).ok(),
        _ => None,
    }
}

fn build_gateway_ws_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    format!("{trimmed}/?v=10&encoding=json")
}

fn invalid_session_backoff_secs() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.subsec_nanos())
        .unwrap_or(0);
    1 + u64::from(nanos % 5)
}
