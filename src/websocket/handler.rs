use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderValue,
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;

use crate::connection::{ClientId, ConnectionError, MessageSink, MessageStream, Upgrade};
use crate::hub::Hub;
use crate::server::AppState;

/// Upgrade response header carrying the id assigned to the client
pub const CLIENT_ID_HEADER: &str = "x-client-id";

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Id reserved earlier, e.g. by the chat page
    pub client_id: Option<u64>,
}

/// WebSocket upgrade handler.
///
/// Assigns the client id and hands the upgraded socket to the hub, which
/// runs the connection in the upgrade task until it closes. The id is
/// returned in the `x-client-id` header of the upgrade response.
#[tracing::instrument(name = "ws.upgrade", skip(ws, state))]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    let hub = state.hub.clone();
    let client_id = assign_client_id(&hub, params.client_id);

    tracing::info!(client_id = %client_id, "WebSocket upgrade requested");

    let failed_hub = hub.clone();
    let mut response = ws
        .max_message_size(state.settings.websocket.max_message_size)
        .on_failed_upgrade(move |error: axum::Error| {
            let error = ConnectionError::Handshake(error.to_string());
            failed_hub.handshake_failed(client_id, &error);
        })
        .on_upgrade(move |socket| async move {
            // Failures are logged by the hub
            let _ = hub.connect(client_id, WsUpgrade::new(socket)).await;
        });

    response
        .headers_mut()
        .insert(CLIENT_ID_HEADER, HeaderValue::from(client_id.get()));
    response
}

/// Use the reserved id the client presents, or issue a fresh one
fn assign_client_id(hub: &Hub, requested: Option<u64>) -> ClientId {
    let Some(requested) = requested.map(ClientId::new) else {
        return hub.issue_client_id();
    };

    hub.claim_client_id(requested).unwrap_or_else(|| {
        let issued = hub.issue_client_id();
        tracing::warn!(
            requested = %requested,
            issued = %issued,
            "Client id was not reserved, issued a new one"
        );
        issued
    })
}

/// An upgraded axum WebSocket, ready to be split
pub struct WsUpgrade {
    socket: WebSocket,
}

impl WsUpgrade {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl Upgrade for WsUpgrade {
    type Sink = WsSink;
    type Stream = WsStream;

    async fn accept(self) -> Result<(WsSink, WsStream), ConnectionError> {
        // axum completes the HTTP upgrade before handing over the socket
        let (sender, receiver) = self.socket.split();
        Ok((WsSink { sender }, WsStream { receiver }))
    }
}

pub struct WsSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl MessageSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), ConnectionError> {
        self.sender
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.sender
            .close()
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }
}

pub struct WsStream {
    receiver: SplitStream<WebSocket>,
}

#[async_trait]
impl MessageStream for WsStream {
    async fn recv_text(&mut self) -> Result<String, ConnectionError> {
        loop {
            match self.receiver.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Binary(_))) => {
                    tracing::warn!("Binary messages are not supported, frame ignored");
                }
                // axum answers pings itself
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    return Err(ConnectionError::Disconnected {
                        code: frame.map(|f| f.code),
                    });
                }
                Some(Err(e)) => return Err(ConnectionError::Transport(e.to_string())),
                None => return Err(ConnectionError::Disconnected { code: None }),
            }
        }
    }
}
