// In-process fake backend for integration tests: a few REST routes under
// /api and a WebSocket endpoint under /ws speaking the JSON envelope format.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::ws::{Message, WebSocket};
use warp::{Filter, Reply};

use classroom_live::realtime::{ConnectionManager, EventChannel, ReconnectPolicy};
use classroom_live::{ApiClient, AuthSession, Config};

pub const VALID_TOKEN: &str = "good-token";
/// Upgrades presenting this token are refused with 401.
pub const REJECTED_TOKEN: &str = "revoked-token";
pub const WAIT: Duration = Duration::from_secs(5);

/// A frame received from a client, tagged with the connection it came on.
#[derive(Debug, Clone)]
pub struct Frame {
    pub connection: usize,
    pub event: String,
    pub data: Value,
    pub id: Option<u64>,
}

#[derive(Default)]
struct SocketState {
    auth_headers: Mutex<Vec<Option<String>>>,
    open: AtomicUsize,
    rejected: AtomicUsize,
}

pub struct FakeBackend {
    pub addr: SocketAddr,
    frames: mpsc::UnboundedReceiver<Frame>,
    push: broadcast::Sender<String>,
    kick: broadcast::Sender<()>,
    sockets: Arc<SocketState>,
    pub unauthorized_hits: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let (frame_tx, frames) = mpsc::unbounded_channel::<Frame>();
        let (push, _) = broadcast::channel::<String>(64);
        let (kick, _) = broadcast::channel::<()>(4);
        let sockets = Arc::new(SocketState::default());
        let unauthorized_hits = Arc::new(AtomicUsize::new(0));

        let ws_route = {
            let frame_tx = frame_tx.clone();
            let push = push.clone();
            let kick = kick.clone();
            let sockets = sockets.clone();
            warp::path("ws")
                .and(warp::header::optional::<String>("authorization"))
                .and(warp::ws())
                .map(move |auth: Option<String>, ws: warp::ws::Ws| {
                    if auth.as_deref() == Some(&format!("Bearer {}", REJECTED_TOKEN)) {
                        sockets.rejected.fetch_add(1, Ordering::SeqCst);
                        return warp::reply::with_status(
                            warp::reply::json(&json!({"message": "Invalid token"})),
                            StatusCode::UNAUTHORIZED,
                        )
                        .into_response();
                    }

                    let frame_tx = frame_tx.clone();
                    let push_rx = push.subscribe();
                    let kick_rx = kick.subscribe();
                    let sockets = sockets.clone();
                    ws.on_upgrade(move |socket| {
                        handle_socket(socket, auth, frame_tx, push_rx, kick_rx, sockets)
                    })
                    .into_response()
                })
        };

        let classrooms = {
            let hits = unauthorized_hits.clone();
            warp::path!("api" / "classrooms")
                .and(warp::get())
                .and(warp::header::optional::<String>("authorization"))
                .map(move |auth: Option<String>| {
                    if auth.as_deref() == Some(&format!("Bearer {}", VALID_TOKEN)) {
                        warp::reply::json(&json!([
                            {"_id": "c1", "name": "Physics", "code": "PHY-1"},
                            {"id": "c2", "name": "History"}
                        ]))
                        .into_response()
                    } else {
                        hits.fetch_add(1, Ordering::SeqCst);
                        warp::reply::with_status(
                            warp::reply::json(&json!({"message": "Invalid token"})),
                            StatusCode::UNAUTHORIZED,
                        )
                        .into_response()
                    }
                })
        };

        let empty_assignment = warp::path!("api" / "assignments" / String)
            .and(warp::get())
            .map(|_id: String| warp::reply().into_response());

        let rejected = warp::path!("api" / "assignments")
            .and(warp::post())
            .map(|| {
                warp::reply::with_status(
                    warp::reply::json(&json!({"message": "Title is required"})),
                    StatusCode::BAD_REQUEST,
                )
                .into_response()
            });

        let submit = warp::path!("api" / "assignments" / String / "submit")
            .and(warp::post())
            .and(warp::header::<String>("content-type"))
            .and(warp::body::bytes())
            .map(|id: String, content_type: String, body: Bytes| {
                let body = String::from_utf8_lossy(&body).to_string();
                warp::reply::json(&json!({
                    "_id": "sub-1",
                    "assignmentId": id,
                    "fileUrl": if content_type.starts_with("multipart/form-data")
                        && body.contains("essay.txt")
                        && body.contains("final draft")
                    {
                        Value::String("/files/essay.txt".to_string())
                    } else {
                        Value::Null
                    }
                }))
                .into_response()
            });

        let download_token = warp::path!("api" / "files" / String / "download-token")
            .and(warp::post())
            .map(|id: String| {
                warp::reply::json(&json!({"token": format!("scoped/{}", id), "expiresAt": "2030-01-01T00:00:00Z"}))
                    .into_response()
            });

        let login = warp::path!("api" / "auth" / "login")
            .and(warp::post())
            .and(warp::body::json())
            .map(|body: Value| {
                if body["password"] == "secret" {
                    warp::reply::json(&json!({
                        "token": VALID_TOKEN,
                        "user": {"_id": "u1", "name": "Grace", "role": "teacher"}
                    }))
                    .into_response()
                } else {
                    warp::reply::with_status(
                        warp::reply::json(&json!({"message": "Invalid credentials"})),
                        StatusCode::BAD_REQUEST,
                    )
                    .into_response()
                }
            });

        let routes = ws_route
            .or(classrooms)
            .or(submit)
            .or(empty_assignment)
            .or(rejected)
            .or(download_token)
            .or(login);

        let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        Self {
            addr,
            frames,
            push,
            kick,
            sockets,
            unauthorized_hits,
        }
    }

    pub fn config(&self) -> Config {
        let mut config = Config::from_api_url(format!("http://{}/api", self.addr));
        config.realtime.path = "/ws".to_string();
        config.realtime.reconnect = ReconnectPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
        };
        config
    }

    pub fn api(&self, auth: AuthSession) -> ApiClient {
        ApiClient::new(&self.config().api, auth).expect("client")
    }

    pub fn channel(&self, auth: AuthSession) -> EventChannel {
        EventChannel::new(ConnectionManager::connect(self.config().realtime, auth))
    }

    pub fn channel_with_policy(&self, auth: AuthSession, policy: ReconnectPolicy) -> EventChannel {
        let mut realtime = self.config().realtime;
        realtime.reconnect = policy;
        EventChannel::new(ConnectionManager::connect(realtime, auth))
    }

    /// Number of upgrade requests refused for carrying the rejected token.
    pub fn rejected_upgrades(&self) -> usize {
        self.sockets.rejected.load(Ordering::SeqCst)
    }

    /// Pushes one event to every connected client.
    pub fn push(&self, event: &str, data: Value) {
        let frame = json!({"event": event, "data": data}).to_string();
        let _ = self.push.send(frame);
    }

    /// Drops every open socket from the server side.
    pub fn kick_all(&self) {
        let _ = self.kick.send(());
    }

    pub fn connection_count(&self) -> usize {
        self.sockets.auth_headers.lock().unwrap().len()
    }

    pub fn open_connections(&self) -> usize {
        self.sockets.open.load(Ordering::SeqCst)
    }

    pub fn auth_header(&self, connection: usize) -> Option<String> {
        self.sockets.auth_headers.lock().unwrap()[connection].clone()
    }

    pub async fn next_frame(&mut self) -> Frame {
        timeout(WAIT, self.frames.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("frame channel closed")
    }

    /// Next frame carrying `event`, skipping others.
    pub async fn next_event(&mut self, event: &str) -> Frame {
        loop {
            let frame = self.next_frame().await;
            if frame.event == event {
                return frame;
            }
        }
    }

    /// Collects frames until nothing arrives for `quiet`.
    pub async fn drain(&mut self, quiet: Duration) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = timeout(quiet, self.frames.recv()).await {
            frames.push(frame);
        }
        frames
    }
}

async fn handle_socket(
    socket: WebSocket,
    auth: Option<String>,
    frame_tx: mpsc::UnboundedSender<Frame>,
    mut push_rx: broadcast::Receiver<String>,
    mut kick_rx: broadcast::Receiver<()>,
    sockets: Arc<SocketState>,
) {
    let connection = {
        let mut headers = sockets.auth_headers.lock().unwrap();
        headers.push(auth);
        headers.len() - 1
    };
    sockets.open.fetch_add(1, Ordering::SeqCst);

    let (mut ws_sender, mut ws_receiver) = socket.split();

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(message)) => {
                    if message.is_close() {
                        break;
                    }
                    if let Ok(text) = message.to_str() {
                        if let Ok(value) = serde_json::from_str::<Value>(text) {
                            let _ = frame_tx.send(Frame {
                                connection,
                                event: value["event"].as_str().unwrap_or_default().to_string(),
                                data: value["data"].clone(),
                                id: value["id"].as_u64(),
                            });
                        }
                    }
                }
                _ => break,
            },
            pushed = push_rx.recv() => match pushed {
                Ok(text) => {
                    if ws_sender.send(Message::text(text)).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            _ = kick_rx.recv() => {
                let _ = ws_sender.send(Message::close()).await;
                break;
            }
        }
    }

    sockets.open.fetch_sub(1, Ordering::SeqCst);
}

/// Polls `check` until it holds or the wait expires.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
