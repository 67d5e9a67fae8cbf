//! Per-connection protocol state machine.
//!
//! Transport-agnostic: driven by any type implementing [`SessionTransport`],
//! so it can be exercised in tests against an in-memory mock and, in the
//! server binary, against a real WebSocket split into a request stream and
//! a response sink.

use std::sync::Arc;

use tracing::info;

use crate::error::ProtocolError;
use crate::locker::{BatchHandle, MultiLocker};
use crate::protocol::{normalize_claims, parse_claims, WireRequest, WireResponse, WireState};

/// The numeric close-frame status this protocol uses for invalid input
/// and protocol misuse, mirroring the close code the corpus reserves for
/// the same purpose.
pub const CLOSE_CODE_INVALID_INPUT: u16 = 3000;

/// One half of the transport a session drives: receiving parsed requests
/// and sending responses or a terminal close.
///
/// Implementors own the actual socket; this trait only needs to express
/// "give me the next request" and "send this response or close frame."
pub trait SessionTransport: Send {
    /// Waits for and parses the next inbound message. `Ok(None)` means the
    /// transport closed cleanly with no more messages. `Err` carries a
    /// parse failure or a transport-level read error, both terminal.
    fn recv(
        &mut self,
    ) -> impl std::future::Future<Output = Result<Option<WireRequest>, ProtocolError>> + Send;

    /// Sends a successful response.
    fn send(
        &mut self,
        response: &WireResponse,
    ) -> impl std::future::Future<Output = Result<(), ProtocolError>> + Send;

    /// Reports `reason` to the client and ends the session with the
    /// invalid-input close code. `reason` travels ahead of the close frame
    /// (as a text frame) rather than inside it — the close frame itself
    /// carries no reason payload beyond what was already sent. Called
    /// exactly once, as the last action of a session that hit a protocol
    /// error.
    fn close_with_error(&mut self, reason: &str) -> impl std::future::Future<Output = ()> + Send;

    /// Ends the session normally (transport already closed, or the
    /// session loop exited with no error to report).
    fn close_normally(&mut self) -> impl std::future::Future<Output = ()> + Send;
}

enum State {
    Ready,
    Enqueued(BatchHandle),
    Acquired(BatchHandle),
}

/// Drives one session to completion against `locker`, consuming `transport`.
///
/// Returns once the session has ended, for any reason: clean transport
/// close, protocol error, or transport failure. Any batch held at the
/// time of return has already been released.
pub async fn run_session<T: SessionTransport>(mut transport: T, locker: Arc<MultiLocker>) {
    let mut state = State::Ready;

    loop {
        state = match state {
            State::Ready => match transport.recv().await {
                Ok(Some(req)) => match handle_ready(&req, &locker) {
                    Ok((response, next)) => {
                        if transport.send(&response).await.is_err() {
                            break;
                        }
                        next
                    }
                    Err(e) => {
                        transport.close_with_error(&e.to_string()).await;
                        return;
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    transport.close_with_error(&e.to_string()).await;
                    return;
                }
            },

            State::Enqueued(mut handle) => {
                tokio::select! {
                    biased;
                    req = transport.recv() => match req {
                        Ok(Some(_)) => {
                            handle.release();
                            transport
                                .close_with_error(
                                    &ProtocolError::Misuse { action: "request", state: "enqueued" }
                                        .to_string(),
                                )
                                .await;
                            return;
                        }
                        Ok(None) => {
                            handle.release();
                            break;
                        }
                        Err(e) => {
                            handle.release();
                            transport.close_with_error(&e.to_string()).await;
                            return;
                        }
                    },
                    _ = handle.ready() => {
                        let response = WireResponse {
                            id: serde_json::Value::String(handle.id().to_string()),
                            action: "lock".to_string(),
                            state: WireState::Acquired,
                        };
                        if transport.send(&response).await.is_err() {
                            handle.release();
                            break;
                        }
                        info!(batch = handle.id(), "batch acquired");
                        State::Acquired(handle)
                    }
                }
            }

            State::Acquired(handle) => match transport.recv().await {
                Ok(Some(req)) => {
                    if req.action == "release" {
                        let response = WireResponse {
                            id: serde_json::Value::String(handle.id().to_string()),
                            action: "release".to_string(),
                            state: WireState::Ready,
                        };
                        handle.release();
                        if transport.send(&response).await.is_err() {
                            break;
                        }
                        State::Ready
                    } else {
                        drop(handle);
                        transport
                            .close_with_error(
                                &ProtocolError::Misuse { action: "lock", state: "acquired" }
                                    .to_string(),
                            )
                            .await;
                        return;
                    }
                }
                Ok(None) => {
                    drop(handle);
                    break;
                }
                Err(e) => {
                    drop(handle);
                    transport.close_with_error(&e.to_string()).await;
                    return;
                }
            },
        };
    }

    transport.close_normally().await;
}

/// Handles a request received in the `ready` state: either a `lock` with
/// a non-empty resource list, or anything else is a protocol error.
fn handle_ready(
    req: &WireRequest,
    locker: &Arc<MultiLocker>,
) -> Result<(WireResponse, State), ProtocolError> {
    match req.action.as_str() {
        "lock" => {
            let claims = parse_claims(&req.resources)?;
            let claims = normalize_claims(claims);
            let mut handle = locker.submit(claims).map_err(ProtocolError::from)?;

            // A batch with zero blockers is granted before `submit`
            // returns, so this check never has to wait.
            let already_acquired = handle.poll_acquired();

            let response = WireResponse {
                id: serde_json::Value::String(handle.id().to_string()),
                action: "lock".to_string(),
                state: if already_acquired {
                    WireState::Acquired
                } else {
                    WireState::Enqueued
                },
            };

            let next = if already_acquired {
                State::Acquired(handle)
            } else {
                State::Enqueued(handle)
            };
            Ok((response, next))
        }
        "release" => Err(ProtocolError::Misuse {
            action: "release",
            state: "ready",
        }),
        other => Err(ProtocolError::UnknownAction(other.to_string())),
    }
}
