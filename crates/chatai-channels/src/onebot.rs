//! OneBot v11 channel — forward WebSocket client.
//!
//! Architecture:
//! - A OneBot implementation (go-cqhttp, NapCat, Lagrange, ...) listens on a
//!   WebSocket (default `ws://127.0.0.1:6700`)
//! - This channel connects as a **client**, optionally with
//!   `Authorization: Bearer <access token>`
//! - Inbound: message events and action responses (`echo`) go to the bus;
//!   meta events, notices and requests are dropped
//! - Outbound: actions are written as `{"action","params","echo"}` JSON frames
//!
//! The connection is re-established with exponential backoff until `stop()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, Notify};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, trace, warn};

use chatai_core::bus::queue::MessageBus;
use chatai_core::config::OneBotConfig;
use chatai_core::onebot::{parse_frame, Action};

use crate::base::Channel;

// ─────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────

const DEFAULT_WS_URL: &str = "ws://127.0.0.1:6700";

/// First reconnect delay; doubled after every failed attempt.
const RECONNECT_INITIAL: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

type WsSender = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    WsMessage,
>;

// ─────────────────────────────────────────────
// OneBotChannel
// ─────────────────────────────────────────────

pub struct OneBotChannel {
    ws_url: String,
    access_token: String,
    bus: Arc<MessageBus>,
    shutdown: Arc<Notify>,
    stopping: AtomicBool,
    /// Write half of the live connection, if any.
    ws_write: Arc<Mutex<Option<WsSender>>>,
}

impl OneBotChannel {
    pub fn new(ws_url: String, access_token: String, bus: Arc<MessageBus>) -> Self {
        let ws_url = if ws_url.trim().is_empty() {
            DEFAULT_WS_URL.to_string()
        } else {
            ws_url
        };

        Self {
            ws_url,
            access_token,
            bus,
            shutdown: Arc::new(Notify::new()),
            stopping: AtomicBool::new(false),
            ws_write: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_config(config: &OneBotConfig, bus: Arc<MessageBus>) -> Self {
        Self::new(config.ws_url.clone(), config.access_token.clone(), bus)
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    pub async fn is_connected(&self) -> bool {
        self.ws_write.lock().await.is_some()
    }

    /// Keep a session open, reconnecting with backoff, until stopped.
    async fn run_loop(&self) -> anyhow::Result<()> {
        let mut delay = RECONNECT_INITIAL;

        while !self.stopping.load(Ordering::SeqCst) {
            let outcome = self.session(&mut delay).await;
            *self.ws_write.lock().await = None;

            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            match outcome {
                Ok(()) => info!(delay = ?delay, "onebot connection closed, reconnecting"),
                Err(e) => warn!(error = %e, delay = ?delay, "onebot connection error, reconnecting"),
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.notified() => {
                    info!("onebot shutdown during reconnect wait");
                    break;
                }
            }
            delay = (delay * 2).min(RECONNECT_MAX);
        }
        Ok(())
    }

    /// One WebSocket session. `delay` is reset once the handshake succeeds.
    async fn session(&self, delay: &mut Duration) -> anyhow::Result<()> {
        let mut request = self
            .ws_url
            .as_str()
            .into_client_request()
            .with_context(|| format!("invalid onebot url {}", self.ws_url))?;
        if !self.access_token.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", self.access_token))
                .context("access token is not a valid header value")?;
            request.headers_mut().insert("Authorization", value);
        }

        debug!(url = %self.ws_url, "connecting to onebot");
        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .with_context(|| format!("failed to connect to {}", self.ws_url))?;
        info!(url = %self.ws_url, "connected to onebot");
        *delay = RECONNECT_INITIAL;

        let (write, mut read) = ws_stream.split();
        *self.ws_write.lock().await = Some(write);

        loop {
            tokio::select! {
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(WsMessage::Text(t))) => t.to_string(),
                        Some(Ok(WsMessage::Close(_))) | None => {
                            debug!("onebot stream ended");
                            return Ok(());
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e).context("onebot read error"),
                    };
                    self.handle_frame(&text).await;
                }
                _ = self.shutdown.notified() => {
                    info!("onebot shutdown signal received");
                    if let Some(mut write) = self.ws_write.lock().await.take() {
                        let _ = write.send(WsMessage::Close(None)).await;
                    }
                    return Ok(());
                }
            }
        }
    }

    /// Classify a frame and publish anything the dispatcher handles.
    async fn handle_frame(&self, raw: &str) {
        match parse_frame(raw) {
            Ok(Some(event)) => {
                debug!(kind = event.kind(), "onebot inbound event");
                if let Err(e) = self.bus.publish_inbound(event).await {
                    error!(error = %e, "failed to publish onebot event to bus");
                }
            }
            Ok(None) => trace!("onebot frame ignored"),
            Err(e) => warn!(error = %e, "undecodable onebot frame"),
        }
    }
}

#[async_trait]
impl Channel for OneBotChannel {
    fn name(&self) -> &str {
        "onebot"
    }

    async fn start(&self) -> anyhow::Result<()> {
        info!(url = %self.ws_url, "starting onebot channel");
        self.stopping.store(false, Ordering::SeqCst);
        self.run_loop().await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        info!("stopping onebot channel");
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
        if let Some(mut write) = self.ws_write.lock().await.take() {
            let _ = write.send(WsMessage::Close(None)).await;
        }
        Ok(())
    }

    async fn send(&self, action: &Action) -> anyhow::Result<()> {
        let frame = action.to_json().context("failed to encode action")?;

        let mut guard = self.ws_write.lock().await;
        let Some(write) = guard.as_mut() else {
            anyhow::bail!("onebot not connected, dropping {}", action.name());
        };

        write.send(WsMessage::text(frame)).await?;
        debug!(action = action.name(), "onebot action sent");
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chatai_core::bus::types::InboundEvent;
    use chatai_core::onebot::ReplyTarget;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    const MESSAGE_FRAME: &str = r#"{"post_type":"message","message_type":"group","message_id":11,
        "group_id":5,"user_id":2,"self_id":99,"sender":{"user_id":2,"nickname":"alice"},
        "message":[{"type":"text","data":{"text":"!gpt hi there"}}],"raw_message":"!gpt hi there"}"#;
    const HEARTBEAT_FRAME: &str = r#"{"post_type":"meta_event","meta_event_type":"heartbeat"}"#;
    const ECHO_FRAME: &str = r#"{"status":"ok","retcode":0,"data":{"message_id":3},"echo":"gemini|11"}"#;

    /// What the fake OneBot server observed.
    struct Observed {
        authorization: Option<String>,
        received: Option<String>,
    }

    /// Accept one client, push `frames`, then report the first frame the
    /// client sends back.
    async fn spawn_server(frames: Vec<&'static str>) -> (String, oneshot::Receiver<Observed>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut authorization = None;
            let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                authorization = req
                    .headers()
                    .get("Authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                Ok(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .unwrap();

            for frame in frames {
                ws.send(WsMessage::text(frame)).await.unwrap();
            }

            let received = loop {
                match ws.next().await {
                    Some(Ok(WsMessage::Text(t))) => break Some(t.to_string()),
                    Some(Ok(_)) => continue,
                    _ => break None,
                }
            };
            let _ = tx.send(Observed {
                authorization,
                received,
            });
        });

        (format!("ws://{addr}"), rx)
    }

    async fn wait_connected(ch: &OneBotChannel) {
        for _ in 0..100 {
            if ch.is_connected().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("channel never connected");
    }

    #[test]
    fn test_default_url() {
        let ch = OneBotChannel::new(String::new(), String::new(), Arc::new(MessageBus::new(8)));
        assert_eq!(ch.ws_url(), "ws://127.0.0.1:6700");
        assert_eq!(ch.name(), "onebot");
    }

    #[test]
    fn test_from_config() {
        let config = OneBotConfig {
            ws_url: "ws://qq-bot:3001".into(),
            access_token: "secret".into(),
        };
        let ch = OneBotChannel::from_config(&config, Arc::new(MessageBus::new(8)));
        assert_eq!(ch.ws_url(), "ws://qq-bot:3001");
        assert_eq!(ch.access_token, "secret");
    }

    #[tokio::test]
    async fn test_send_while_disconnected_fails() {
        let ch = OneBotChannel::new(String::new(), String::new(), Arc::new(MessageBus::new(8)));
        let err = ch
            .send(&Action::send_text(ReplyTarget::Private(1), "hi"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not connected"));
    }

    #[tokio::test]
    async fn test_handle_frame_publishes_relevant_frames() {
        let bus = Arc::new(MessageBus::new(8));
        let ch = OneBotChannel::new(String::new(), String::new(), bus.clone());

        ch.handle_frame(HEARTBEAT_FRAME).await;
        ch.handle_frame("{broken").await;
        ch.handle_frame(MESSAGE_FRAME).await;
        ch.handle_frame(ECHO_FRAME).await;

        match bus.consume_inbound().await.unwrap() {
            InboundEvent::Message(event) => assert_eq!(event.message_id, 11),
            other => panic!("unexpected event: {other:?}"),
        }
        match bus.consume_inbound().await.unwrap() {
            InboundEvent::Echo(echo) => assert_eq!(echo.echo, "gemini|11"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_session_roundtrip_with_token() {
        let (url, observed) = spawn_server(vec![HEARTBEAT_FRAME, MESSAGE_FRAME, ECHO_FRAME]).await;
        let bus = Arc::new(MessageBus::new(8));
        let ch = Arc::new(OneBotChannel::new(url, "t0ken".into(), bus.clone()));

        let runner = {
            let ch = ch.clone();
            tokio::spawn(async move { ch.start().await })
        };

        let first = tokio::time::timeout(Duration::from_secs(5), bus.consume_inbound())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.kind(), "message");
        let second = tokio::time::timeout(Duration::from_secs(5), bus.consume_inbound())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.kind(), "echo");

        wait_connected(&ch).await;
        ch.send(&Action::get_msg(11, "gemini|11")).await.unwrap();

        let observed = tokio::time::timeout(Duration::from_secs(5), observed)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(observed.authorization.as_deref(), Some("Bearer t0ken"));
        let sent: Value = serde_json::from_str(&observed.received.unwrap()).unwrap();
        assert_eq!(
            sent,
            json!({"action": "get_msg", "params": {"message_id": 11}, "echo": "gemini|11"})
        );

        ch.stop().await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_no_token_sends_no_authorization() {
        let (url, observed) = spawn_server(vec![]).await;
        let ch = Arc::new(OneBotChannel::new(url, String::new(), Arc::new(MessageBus::new(8))));

        let runner = {
            let ch = ch.clone();
            tokio::spawn(async move { ch.start().await })
        };

        wait_connected(&ch).await;
        ch.send(&Action::send_text(ReplyTarget::Group(5), "hello"))
            .await
            .unwrap();

        let observed = observed.await.unwrap();
        assert!(observed.authorization.is_none());
        assert!(observed.received.unwrap().contains("\"send_msg\""));

        ch.stop().await.unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(5), runner).await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnects_after_server_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            // First connection: accept and hang up immediately.
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            drop(ws);

            // Second connection: deliver one message.
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(WsMessage::text(MESSAGE_FRAME)).await.unwrap();
            let _ = ws.next().await;
        });

        let bus = Arc::new(MessageBus::new(8));
        let ch = Arc::new(OneBotChannel::new(format!("ws://{addr}"), String::new(), bus.clone()));
        let runner = {
            let ch = ch.clone();
            tokio::spawn(async move { ch.start().await })
        };

        let event = tokio::time::timeout(Duration::from_secs(10), bus.consume_inbound())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind(), "message");

        ch.stop().await.unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(5), runner).await.unwrap();
    }
}
