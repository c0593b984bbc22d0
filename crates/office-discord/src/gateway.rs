//! Minimal gateway session: identify, heartbeat, and forward
//! `INTERACTION_CREATE` dispatches. Sessions are not resumed; any close,
//! reconnect request or invalid session starts a fresh identify after backoff.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::DiscordError;
use crate::model::Interaction;

/// `GUILDS` intent: enough to receive interactions in guild channels.
pub const INTENT_GUILDS: u64 = 1;

pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg";

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

const INITIAL_BACKOFF_SECS: u64 = 3;
const MAX_BACKOFF_SECS: u64 = 60;
const DEBUG_LOG_THRESHOLD: u32 = 10;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Frame {
    pub op: u8,
    #[serde(default)]
    pub d: serde_json::Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

/// What the session loop should do with a received frame.
#[derive(Debug, PartialEq)]
pub(crate) enum FrameAction {
    Interaction(Box<Interaction>),
    HeartbeatNow,
    Ack,
    Reconnect,
    Ready(String),
    Ignore,
}

/// Decode one text frame. A frame that is not valid JSON is logged and
/// dropped; the session carries on.
pub(crate) fn parse_frame(text: &str) -> Option<Frame> {
    match serde_json::from_str(text) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::warn!(len = text.len(), "gateway: dropping malformed frame: {e}");
            None
        }
    }
}

pub(crate) fn classify(frame: Frame) -> FrameAction {
    match frame.op {
        OP_DISPATCH => match frame.t.as_deref() {
            Some("INTERACTION_CREATE") => match Interaction::from_value(frame.d) {
                Ok(interaction) => FrameAction::Interaction(Box::new(interaction)),
                Err(e) => {
                    tracing::warn!("gateway: unparseable interaction: {e}");
                    FrameAction::Ignore
                }
            },
            Some("READY") => FrameAction::Ready(
                frame.d["user"]["username"]
                    .as_str()
                    .unwrap_or("unknown")
                    .to_string(),
            ),
            _ => FrameAction::Ignore,
        },
        OP_HEARTBEAT => FrameAction::HeartbeatNow,
        OP_HEARTBEAT_ACK => FrameAction::Ack,
        OP_RECONNECT | OP_INVALID_SESSION => FrameAction::Reconnect,
        _ => FrameAction::Ignore,
    }
}

pub(crate) fn identify_payload(token: &str, intents: u64) -> String {
    serde_json::json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "office-tracker",
                "device": "office-tracker",
            },
        },
    })
    .to_string()
}

pub(crate) fn heartbeat_payload(seq: Option<u64>) -> String {
    serde_json::json!({ "op": OP_HEARTBEAT, "d": seq }).to_string()
}

/// Gateway connection settings.
pub struct Gateway {
    token: String,
    intents: u64,
    url: String,
}

impl Gateway {
    pub fn new(token: impl Into<String>, intents: u64) -> Self {
        Self {
            token: token.into(),
            intents,
            url: DEFAULT_GATEWAY_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Keep a session alive and forward interactions to `tx`, reconnecting with
    /// exponential backoff (3s doubling to 60s). Returns once `tx` is closed.
    pub async fn run(&self, tx: mpsc::Sender<Interaction>) {
        let mut backoff_secs = INITIAL_BACKOFF_SECS;
        let mut consecutive_failures: u32 = 0;

        loop {
            match self.connect_and_listen(&tx).await {
                Ok(()) => {
                    backoff_secs = INITIAL_BACKOFF_SECS;
                    consecutive_failures = 0;
                    tracing::info!("gateway: session ended, reconnecting");
                }
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    if consecutive_failures >= DEBUG_LOG_THRESHOLD {
                        tracing::debug!(consecutive_failures, "gateway: connection error: {e}");
                    } else {
                        tracing::warn!("gateway: connection error: {e}");
                    }
                }
            }
            if tx.is_closed() {
                tracing::info!("gateway: receiver dropped, stopping");
                return;
            }

            tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
        }
    }

    /// Single session: hello, identify, then heartbeat and read until closed.
    async fn connect_and_listen(&self, tx: &mpsc::Sender<Interaction>) -> Result<(), DiscordError> {
        let url = format!("{}/?v=10&encoding=json", self.url.trim_end_matches('/'));
        let (ws_stream, _response) = tokio_tungstenite::connect_async(&url).await?;
        let (mut write, mut read) = ws_stream.split();

        let hello = match read.next().await {
            Some(Ok(WsMessage::Text(text))) => serde_json::from_str::<Frame>(&text)?,
            Some(Ok(other)) => {
                return Err(DiscordError::Gateway(format!("expected hello, got {other:?}")));
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Err(DiscordError::Gateway("closed before hello".to_string())),
        };
        if hello.op != OP_HELLO {
            return Err(DiscordError::Gateway(format!(
                "expected op {OP_HELLO}, got {}",
                hello.op
            )));
        }
        let heartbeat_ms = hello.d["heartbeat_interval"]
            .as_u64()
            .ok_or_else(|| DiscordError::Gateway("hello without heartbeat_interval".to_string()))?;
        let period = Duration::from_millis(heartbeat_ms);

        write
            .send(WsMessage::Text(identify_payload(&self.token, self.intents)))
            .await?;

        let mut seq: Option<u64> = None;
        let mut awaiting_ack = false;
        let mut heartbeat = interval_at(Instant::now() + period / 2, period);

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if awaiting_ack {
                        return Err(DiscordError::Gateway("heartbeat not acknowledged".to_string()));
                    }
                    write.send(WsMessage::Text(heartbeat_payload(seq))).await?;
                    awaiting_ack = true;
                }
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(WsMessage::Text(text))) => text,
                        Some(Ok(WsMessage::Close(frame))) => {
                            tracing::info!("gateway: closed by server: {frame:?}");
                            return Ok(());
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    };
                    let Some(frame) = parse_frame(&text) else {
                        continue;
                    };
                    if frame.s.is_some() {
                        seq = frame.s;
                    }
                    match classify(frame) {
                        FrameAction::Interaction(interaction) => {
                            if tx.send(*interaction).await.is_err() {
                                return Ok(());
                            }
                        }
                        FrameAction::HeartbeatNow => {
                            write.send(WsMessage::Text(heartbeat_payload(seq))).await?;
                        }
                        FrameAction::Ack => awaiting_ack = false,
                        FrameAction::Reconnect => {
                            tracing::info!("gateway: server requested reconnect");
                            return Ok(());
                        }
                        FrameAction::Ready(name) => {
                            tracing::info!(user = %name, "gateway: ready");
                        }
                        FrameAction::Ignore => {}
                    }
                }
            }
        }
    }
}
