//! Minimal Chrome DevTools Protocol client.
//!
//! Commands are JSON-RPC messages over one WebSocket. Responses are matched to
//! callers by id; events are forwarded, in arrival order, on an unbounded
//! channel so no binding call is ever dropped.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, warn};

use super::BrowserError;

/// Upper bound for a single command round trip.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// An event as received from the browser.
#[derive(Debug, Clone, PartialEq)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
    /// Target session the event belongs to; `None` for browser-level events.
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CdpMessage {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<CdpErrorBody>,
    method: Option<String>,
    #[serde(default)]
    params: Value,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CdpErrorBody {
    code: i64,
    message: String,
}

struct PendingCall {
    method: String,
    tx: oneshot::Sender<Result<Value, BrowserError>>,
}

type PendingCalls = Arc<Mutex<HashMap<u64, PendingCall>>>;

fn lock(pending: &PendingCalls) -> MutexGuard<'_, HashMap<u64, PendingCall>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct CdpConnection {
    outbound: mpsc::UnboundedSender<Message>,
    pending: PendingCalls,
    next_id: AtomicU64,
}

impl CdpConnection {
    /// Connect to a browser's DevTools WebSocket endpoint.
    pub async fn connect(
        ws_url: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<CdpEvent>), BrowserError> {
        let (stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| BrowserError::Connection(e.to_string()))?;
        debug!("Connected to DevTools at {}", ws_url);

        let (mut write, mut read) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let pending: PendingCalls = Arc::default();

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = write.send(message).await {
                    debug!("DevTools write failed: {}", e);
                    break;
                }
            }
            let _ = write.close().await;
        });

        let reader_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => dispatch(&text, &reader_pending, &event_tx),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("DevTools read failed: {}", e);
                        break;
                    }
                }
            }
            fail_pending(&reader_pending);
            debug!("DevTools connection closed");
        });

        Ok((
            Self {
                outbound,
                pending,
                next_id: AtomicU64::new(1),
            },
            event_rx,
        ))
    }

    /// Send a command and wait for its result.
    ///
    /// `session_id` routes the command to an attached target; `None` sends it
    /// to the browser itself.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Value, BrowserError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = encode_request(id, method, params, session_id);

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(
            id,
            PendingCall {
                method: method.to_string(),
                tx,
            },
        );

        if self.outbound.send(Message::Text(request)).is_err() {
            lock(&self.pending).remove(&id);
            return Err(BrowserError::Closed);
        }

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BrowserError::Closed),
            Err(_) => {
                lock(&self.pending).remove(&id);
                Err(BrowserError::Timeout(method.to_string()))
            }
        }
    }
}

fn encode_request(id: u64, method: &str, params: Value, session_id: Option<&str>) -> String {
    let mut request = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    if let Some(session_id) = session_id {
        request["sessionId"] = Value::String(session_id.to_string());
    }
    request.to_string()
}

fn dispatch(text: &str, pending: &PendingCalls, events: &mpsc::UnboundedSender<CdpEvent>) {
    let message: CdpMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Ignoring malformed DevTools message: {}", e);
            return;
        }
    };

    if let Some(id) = message.id {
        let call = lock(pending).remove(&id);
        if let Some(call) = call {
            let result = match message.error {
                Some(error) => Err(BrowserError::Protocol {
                    method: call.method,
                    code: error.code,
                    message: error.message,
                }),
                None => Ok(message.result.unwrap_or(Value::Null)),
            };
            let _ = call.tx.send(result);
        }
        return;
    }

    if let Some(method) = message.method {
        let _ = events.send(CdpEvent {
            method,
            params: message.params,
            session_id: message.session_id,
        });
    }
}

fn fail_pending(pending: &PendingCalls) {
    for (_, call) in lock(pending).drain() {
        let _ = call.tx.send(Err(BrowserError::Closed));
    }
}
