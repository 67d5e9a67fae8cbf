//! Adapts an axum WebSocket to [`warden_core::SessionTransport`].

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tracing::warn;

use warden_core::{ProtocolError, WireRequest, WireResponse, CLOSE_CODE_INVALID_INPUT};

/// Wraps one upgraded connection's socket for [`warden_core::run_session`].
///
/// Only text frames carry protocol messages; anything else (ping/pong,
/// binary) is transparent to the state machine and simply ignored.
pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    pub fn new(socket: WebSocket) -> Self {
        WsTransport { socket }
    }
}

impl warden_core::SessionTransport for WsTransport {
    async fn recv(&mut self) -> Result<Option<WireRequest>, ProtocolError> {
        loop {
            match self.socket.next().await {
                None => return Ok(None),
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(&text)
                        .map(Some)
                        .map_err(|e| ProtocolError::MalformedRequest(e.to_string()));
                }
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/binary: not protocol traffic
                Some(Err(e)) => {
                    return Err(ProtocolError::MalformedRequest(format!(
                        "transport read error: {e}"
                    )))
                }
            }
        }
    }

    async fn send(&mut self, response: &WireResponse) -> Result<(), ProtocolError> {
        let text = serde_json::to_string(response)
            .expect("WireResponse serialization is infallible");
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|e| ProtocolError::MalformedRequest(format!("transport write error: {e}")))
    }

    async fn close_with_error(&mut self, reason: &str) {
        // The reason travels in a text frame ahead of the close frame; the
        // close frame itself carries no reason payload of its own.
        let error_text = serde_json::json!({ "error": reason }).to_string();
        if let Err(e) = self.socket.send(Message::Text(error_text)).await {
            warn!(error = %e, "failed to send protocol-error text frame");
            return;
        }
        let frame = Message::Close(Some(CloseFrame {
            code: CLOSE_CODE_INVALID_INPUT,
            reason: "".into(),
        }));
        if let Err(e) = self.socket.send(frame).await {
            warn!(error = %e, "failed to send protocol-error close frame");
        }
    }

    async fn close_normally(&mut self) {
        let _ = self.socket.send(Message::Close(None)).await;
    }
}
