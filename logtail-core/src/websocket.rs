use std::time::Duration;

use futures::{SinkExt, StreamExt};
use logtail_protocol::logs::{RawEntry, SubscribeRequest};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::{Result, TailError};

pub const AUTHENTICATE_EVENT: &str = "authenticate";
pub const READY_EVENT: &str = "ready";
pub const LOG_EVENT: &str = "log";
pub const LOGS_EVENT: &str = "logs";
pub const ERROR_EVENT: &str = "error";

/// Envelope used to encode/decode WebSocket messages on the live feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketEnvelope {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl WebSocketEnvelope {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    pub fn to_message(&self) -> Result<TungsteniteMessage> {
        let serialized = serde_json::to_string(self)
            .map_err(|err| TailError::SerializationError(err.to_string()))?;
        Ok(TungsteniteMessage::Text(serialized))
    }

    pub fn from_message(message: TungsteniteMessage) -> Result<Self> {
        match message {
            TungsteniteMessage::Text(text) => Ok(serde_json::from_str(&text)?),
            TungsteniteMessage::Binary(bytes) => Ok(serde_json::from_slice(&bytes)?),
            TungsteniteMessage::Close(frame) => Err(TailError::TransportError(format!(
                "Conexão encerrada: {:?}",
                frame
            ))),
            _ => Err(TailError::TransportError(
                "Mensagens de controle não são suportadas pela camada de protocolo".into(),
            )),
        }
    }
}

/// Credential request raised while the subscription is authenticating.
///
/// The consumer answers synchronously with [`AuthChallenge::respond`]; dropping
/// the challenge aborts the current connection attempt.
#[derive(Debug)]
pub struct AuthChallenge {
    responder: oneshot::Sender<String>,
}

impl AuthChallenge {
    pub fn new() -> (Self, oneshot::Receiver<String>) {
        let (responder, receiver) = oneshot::channel();
        (Self { responder }, receiver)
    }

    pub fn respond(self, token: impl Into<String>) {
        let _ = self.responder.send(token.into());
    }
}

/// Lifecycle signals and data delivered by a live subscription.
#[derive(Debug)]
pub enum LiveEvent {
    Connecting,
    Connected,
    AuthRequested(AuthChallenge),
    Ready,
    Disconnected,
    /// Transport or server error. Does not change the connection state.
    Error(String),
    Entry(RawEntry),
}

/// Handle to a running subscription. Dropping it stops the connection task.
pub struct LiveSubscription {
    events: mpsc::UnboundedReceiver<LiveEvent>,
    task: Option<JoinHandle<()>>,
}

impl LiveSubscription {
    pub fn new(events: mpsc::UnboundedReceiver<LiveEvent>, task: Option<JoinHandle<()>>) -> Self {
        Self { events, task }
    }

    /// Subscription fed by an in-process channel.
    pub fn from_receiver(events: mpsc::UnboundedReceiver<LiveEvent>) -> Self {
        Self::new(events, None)
    }

    /// Next event, or `None` once the producer is gone.
    pub async fn next_event(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }

    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.events.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Exponential reconnect backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ReconnectPolicy {
    pub fn new(initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            initial_backoff,
            max_backoff,
        }
    }

    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(6));
        let delay = self.initial_backoff * factor;
        delay.min(self.max_backoff)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

/// Live log feed over WebSocket with automatic reconnection.
#[derive(Debug, Clone)]
pub struct LiveFeedClient {
    url: String,
    policy: ReconnectPolicy,
}

impl LiveFeedClient {
    pub fn new(url: &str) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|err| TailError::ConfigError(format!("URL inválida: {err}")))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(TailError::ConfigError(format!(
                "URL do feed precisa usar ws ou wss: {url}"
            )));
        }

        Ok(Self {
            url: url.to_string(),
            policy: ReconnectPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Spawns the connection task. Requires a running tokio runtime.
    pub fn subscribe(&self, request: SubscribeRequest) -> LiveSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let url = self.url.clone();
        let policy = self.policy;
        let task = tokio::spawn(async move {
            run_feed(url, request, policy, tx).await;
        });
        LiveSubscription::new(rx, Some(task))
    }
}

async fn run_feed(
    url: String,
    request: SubscribeRequest,
    policy: ReconnectPolicy,
    events: mpsc::UnboundedSender<LiveEvent>,
) {
    let mut attempt: u32 = 0;
    loop {
        if events.send(LiveEvent::Connecting).is_err() {
            return;
        }

        match establish_connection(&url, &request, &events).await {
            Ok(()) => {
                attempt = 0;
            }
            Err(err) => {
                debug!(url = %url, ?err, "falha na conexão do feed ao vivo");
                attempt = attempt.saturating_add(1);
                if events.send(LiveEvent::Error(err.to_string())).is_err() {
                    return;
                }
            }
        }

        if events.send(LiveEvent::Disconnected).is_err() {
            return;
        }

        let backoff = policy.backoff_for_attempt(attempt);
        debug!(url = %url, seconds = backoff.as_secs_f32(), "aguardando para reconectar");
        sleep(backoff).await;
    }
}

async fn establish_connection(
    url: &str,
    request: &SubscribeRequest,
    events: &mpsc::UnboundedSender<LiveEvent>,
) -> Result<()> {
    debug!(url = %url, target = %request.target, "conectando ao feed ao vivo");
    let (stream, _) = connect_async(url)
        .await
        .map_err(|err| TailError::TransportError(err.to_string()))?;
    emit(events, LiveEvent::Connected)?;

    let (mut sender, mut receiver) = stream.split();

    let (challenge, token) = AuthChallenge::new();
    emit(events, LiveEvent::AuthRequested(challenge))?;
    let token = token
        .await
        .map_err(|_| TailError::SubscriptionError("credenciais não fornecidas".into()))?;

    let hello = WebSocketEnvelope::new(
        AUTHENTICATE_EVENT,
        json!({ "token": token, "subscription": request }),
    );
    sender
        .send(hello.to_message()?)
        .await
        .map_err(|err| TailError::TransportError(err.to_string()))?;

    while let Some(incoming) = receiver.next().await {
        match incoming {
            Ok(message @ (TungsteniteMessage::Text(_) | TungsteniteMessage::Binary(_))) => {
                match WebSocketEnvelope::from_message(message) {
                    Ok(envelope) => dispatch_envelope(envelope, events)?,
                    Err(err) => warn!(?err, "mensagem inválida ignorada"),
                }
            }
            Ok(TungsteniteMessage::Ping(payload)) => {
                if let Err(err) = sender.send(TungsteniteMessage::Pong(payload)).await {
                    return Err(TailError::TransportError(err.to_string()));
                }
            }
            Ok(TungsteniteMessage::Pong(_)) => {}
            Ok(TungsteniteMessage::Close(frame)) => {
                debug!(frame = ?frame, "servidor encerrou a conexão");
                break;
            }
            Ok(other) => {
                debug!(message = ?other, "mensagem de controle ignorada");
            }
            Err(err) => return Err(TailError::TransportError(err.to_string())),
        }
    }

    Ok(())
}

fn dispatch_envelope(
    envelope: WebSocketEnvelope,
    events: &mpsc::UnboundedSender<LiveEvent>,
) -> Result<()> {
    match envelope.event.as_str() {
        READY_EVENT => {
            info!("assinatura ao vivo pronta");
            emit(events, LiveEvent::Ready)
        }
        LOG_EVENT => {
            match serde_json::from_value::<RawEntry>(envelope.payload) {
                Ok(entry) => emit(events, LiveEvent::Entry(entry))?,
                Err(err) => warn!(?err, "entrada de log inválida ignorada"),
            }
            Ok(())
        }
        LOGS_EVENT => {
            match serde_json::from_value::<Vec<RawEntry>>(envelope.payload) {
                Ok(entries) => {
                    for entry in entries {
                        emit(events, LiveEvent::Entry(entry))?;
                    }
                }
                Err(err) => warn!(?err, "lote de logs inválido ignorado"),
            }
            Ok(())
        }
        ERROR_EVENT => {
            let message = envelope
                .payload
                .get("message")
                .and_then(|value| value.as_str())
                .unwrap_or("erro desconhecido")
                .to_string();
            emit(events, LiveEvent::Error(message))
        }
        other => {
            debug!(event = %other, "evento desconhecido ignorado");
            Ok(())
        }
    }
}

fn emit(events: &mpsc::UnboundedSender<LiveEvent>, event: LiveEvent) -> Result<()> {
    events
        .send(event)
        .map_err(|_| TailError::SubscriptionError("assinatura encerrada".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trip() {
        let envelope = WebSocketEnvelope::new("test", serde_json::json!({"value": 42}));
        let message = envelope.to_message().expect("serialize");
        let decoded = WebSocketEnvelope::from_message(message).expect("decode");
        assert_eq!(decoded.event, "test");
        assert_eq!(decoded.payload["value"], 42);
    }

    #[test]
    fn backoff_doubles_until_the_cap() {
        let policy = ReconnectPolicy::new(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(policy.backoff_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_for_attempt(9), Duration::from_secs(1));
    }

    #[test]
    fn rejects_non_websocket_urls() {
        assert!(LiveFeedClient::new("https://example.com/logs").is_err());
        assert!(LiveFeedClient::new("wss://example.com/logs/stream").is_ok());
    }

    #[test]
    fn dispatch_translates_server_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let entry = serde_json::json!({
            "id": "a", "serial": "10-1", "date": 10, "type": "stdout", "text": "hi"
        });

        dispatch_envelope(WebSocketEnvelope::new(READY_EVENT, json!(null)), &tx).expect("ready");
        dispatch_envelope(WebSocketEnvelope::new(LOGS_EVENT, json!([entry.clone(), entry])), &tx)
            .expect("logs");
        dispatch_envelope(
            WebSocketEnvelope::new(ERROR_EVENT, json!({"message": "rate limited"})),
            &tx,
        )
        .expect("error");

        assert!(matches!(rx.try_recv(), Ok(LiveEvent::Ready)));
        assert!(matches!(rx.try_recv(), Ok(LiveEvent::Entry(ref e)) if e.id == "a"));
        assert!(matches!(rx.try_recv(), Ok(LiveEvent::Entry(_))));
        assert!(matches!(rx.try_recv(), Ok(LiveEvent::Error(ref m)) if m == "rate limited"));
    }

    #[tokio::test]
    async fn dropping_the_subscription_closes_the_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = LiveSubscription::from_receiver(rx);
        drop(subscription);
        assert!(tx.send(LiveEvent::Ready).is_err());
    }
}
