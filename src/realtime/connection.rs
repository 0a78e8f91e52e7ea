use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use super::protocol::Envelope;
use super::registry::SubscriptionRegistry;
use crate::auth::{AuthSession, AuthToken};
use crate::config::RealtimeConfig;
use crate::error::{ClientError, Result};

/// Observable state of the real-time connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub last_error: Option<String>,
    /// Incremented on every successful connection establishment
    pub generation: u64,
}

/// Why a single connection attempt or live connection ended.
enum ConnectionEnd {
    TokenChanged,
    Lost(ClientError),
}

/// Why the retry loop for one token gave up.
enum RetryOutcome {
    TokenChanged,
    Exhausted,
}

struct Shared {
    config: RealtimeConfig,
    auth: AuthSession,
    registry: Arc<SubscriptionRegistry>,
    status: watch::Sender<ConnectionStatus>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

impl Shared {
    fn mark_connected(&self, sender: mpsc::UnboundedSender<Message>) {
        *self.outbound.lock().unwrap_or_else(|e| e.into_inner()) = Some(sender);
        self.status.send_modify(|status| {
            status.connected = true;
            status.last_error = None;
            status.generation += 1;
        });
    }

    fn mark_failed(&self, error: &str) {
        self.outbound.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.status.send_modify(|status| {
            status.connected = false;
            status.last_error = Some(error.to_string());
        });
    }

    fn mark_disconnected(&self) {
        self.outbound.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.status.send_if_modified(|status| {
            let changed = status.connected || status.last_error.is_some();
            status.connected = false;
            status.last_error = None;
            changed
        });
    }

    fn dispatch_text(&self, text: &str) {
        match serde_json::from_str::<Envelope>(text) {
            Ok(envelope) => {
                let handled = self.registry.dispatch(&envelope.event, &envelope.data);
                tracing::trace!(
                    event = %envelope.event,
                    id = ?envelope.id,
                    handlers = handled,
                    "Dispatched inbound event"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw_message = %text,
                    "Failed to parse inbound real-time frame"
                );
            }
        }
    }
}

/// Owns the single real-time connection for one [`AuthSession`].
///
/// No token means no connection attempt. A token change tears down the
/// current socket and connects again under the new identity. Failed or
/// lost connections are retried according to the configured
/// [`ReconnectPolicy`](super::ReconnectPolicy).
pub struct ConnectionManager {
    shared: Arc<Shared>,
    next_message_id: AtomicU64,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl ConnectionManager {
    pub fn new(config: RealtimeConfig, auth: AuthSession) -> Arc<Self> {
        let (status, _) = watch::channel(ConnectionStatus::default());

        Arc::new(Self {
            shared: Arc::new(Shared {
                config,
                auth,
                registry: Arc::new(SubscriptionRegistry::new()),
                status,
                outbound: Mutex::new(None),
            }),
            next_message_id: AtomicU64::new(0),
            supervisor: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Creates a manager and starts its supervisor task.
    pub fn connect(config: RealtimeConfig, auth: AuthSession) -> Arc<Self> {
        let manager = Self::new(config, auth);
        manager.start();
        manager
    }

    /// Starts the background supervisor. Calling it again is a no-op.
    pub fn start(&self) {
        if self.is_shut_down() {
            tracing::warn!("Ignoring start on a shut down connection manager");
            return;
        }

        let mut supervisor = self.supervisor.lock().unwrap_or_else(|e| e.into_inner());
        if supervisor.is_some() {
            return;
        }

        *supervisor = Some(tokio::spawn(Self::supervise(self.shared.clone())));
    }

    /// Stops the supervisor and drops the socket. Subscriptions made
    /// afterwards are refused.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self
            .supervisor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }

        self.shared.mark_disconnected();
        tracing::info!("Real-time connection manager shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.status.borrow().connected
    }

    /// Waits until a connection is up, or fails after `wait`.
    pub async fn wait_until_connected(&self, wait: Duration) -> Result<ConnectionStatus> {
        let mut rx = self.watch_status();
        let result = match timeout(wait, rx.wait_for(|status| status.connected)).await {
            Ok(Ok(status)) => Ok(status.clone()),
            Ok(Err(_)) => Err(ClientError::ShutDown),
            Err(_) => Err(ClientError::NotConnected),
        };
        result
    }

    pub(crate) fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.shared.registry
    }

    /// Queues one frame on the live socket. Returns `false` when there is
    /// no live socket; nothing is buffered for later.
    pub(crate) fn send(&self, event: &str, data: Value) -> bool {
        let outbound = self.shared.outbound.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = outbound.as_ref() else {
            return false;
        };

        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1;
        let envelope = Envelope::new(event, data, id);
        let text = match envelope.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, event = %event, "Failed to serialize outbound event");
                return false;
            }
        };

        sender.send(Message::Text(text)).is_ok()
    }

    async fn supervise(shared: Arc<Shared>) {
        let mut token_rx = shared.auth.subscribe();

        loop {
            let token = token_rx.borrow_and_update().clone();

            match token {
                None => {
                    shared.mark_disconnected();
                    tracing::debug!("No auth token, real-time connection idle");
                }
                Some(token) => match Self::run_with_retries(&shared, &token, &mut token_rx).await {
                    RetryOutcome::TokenChanged => {
                        shared.mark_disconnected();
                        tracing::info!("Auth token changed, re-establishing real-time connection");
                        continue;
                    }
                    RetryOutcome::Exhausted => {
                        tracing::warn!(
                            max_retries = shared.config.reconnect.max_retries,
                            "Real-time reconnect attempts exhausted, waiting for a new token"
                        );
                    }
                },
            }

            if token_rx.changed().await.is_err() {
                break;
            }
        }

        shared.mark_disconnected();
    }

    async fn run_with_retries(
        shared: &Shared,
        token: &AuthToken,
        token_rx: &mut watch::Receiver<Option<AuthToken>>,
    ) -> RetryOutcome {
        let policy = shared.config.reconnect;
        let mut attempt = 0u32;

        loop {
            let (end, was_connected) = match Self::run_connection(shared, token, token_rx).await {
                Ok((end, was_connected)) => (end, was_connected),
                Err(e) => (ConnectionEnd::Lost(e), false),
            };

            let reason = match end {
                ConnectionEnd::TokenChanged => return RetryOutcome::TokenChanged,
                ConnectionEnd::Lost(reason) => reason,
            };

            shared.mark_failed(&reason.to_string());

            if was_connected {
                attempt = 0;
            }

            let Some(delay) = policy.delay_for(attempt) else {
                tracing::error!(error = %reason, attempt, "Real-time connection failed");
                return RetryOutcome::Exhausted;
            };
            attempt += 1;

            tracing::warn!(
                error = %reason,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Real-time connection failed, retrying"
            );

            tokio::select! {
                _ = sleep(delay) => {}
                _ = token_rx.changed() => return RetryOutcome::TokenChanged,
            }
        }
    }

    /// Runs one connection from handshake to close. The boolean reports
    /// whether the handshake succeeded before the connection ended.
    async fn run_connection(
        shared: &Shared,
        token: &AuthToken,
        token_rx: &mut watch::Receiver<Option<AuthToken>>,
    ) -> Result<(ConnectionEnd, bool)> {
        let url = shared.config.websocket_url()?;
        let mut request = url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&token.bearer())
            .map_err(|_| ClientError::InvalidConfiguration("token is not a valid header value".into()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let ws_stream = tokio::select! {
            result = connect_async(request) => result?.0,
            _ = token_rx.changed() => return Ok((ConnectionEnd::TokenChanged, false)),
        };

        tracing::info!(url = %url, "Real-time connection established");

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        shared.mark_connected(tx);

        let end = loop {
            tokio::select! {
                outgoing = rx.recv() => {
                    let Some(message) = outgoing else {
                        break ConnectionEnd::Lost(ClientError::connection("outbound channel closed"));
                    };
                    if let Err(e) = ws_sender.send(message).await {
                        break ConnectionEnd::Lost(e.into());
                    }
                }
                incoming = ws_receiver.next() => match incoming {
                    Some(Ok(Message::Text(text))) => shared.dispatch_text(&text),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(frame = ?frame, "Server closed the real-time connection");
                        break ConnectionEnd::Lost(ClientError::connection("closed by server"));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break ConnectionEnd::Lost(e.into()),
                    None => break ConnectionEnd::Lost(ClientError::connection("stream ended")),
                },
                _ = token_rx.changed() => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break ConnectionEnd::TokenChanged;
                }
            }
        };

        shared.outbound.lock().unwrap_or_else(|e| e.into_inner()).take();
        tracing::info!("Real-time connection closed");

        Ok((end, true))
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(handle) = self
            .supervisor
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}
