//! Per-connection gateway: handshake, event routing, outbound writer.
//!
//! Each accepted connection gets its own Tokio tasks:
//!
//! - the **handler** (this module's entry point) performs the handshake
//!   and then selects between inbound client envelopes and the session
//!   fan-out channel. It is the only producer into the writer queue, so
//!   the order it enqueues is the order frames hit the wire;
//! - the **writer** owns the outbound half of the socket and the
//!   server-side sequence numbers.
//!
//! Ordering guarantee: session actors queue their broadcasts before
//! completing a command, and the handler drains the fan-out channel
//! before enqueueing the correlated reply. Any event a request caused
//! therefore reaches the socket before the request's own reply.
//!
//! The flow on connect:
//!   1. Receive `Handshake` → validate version
//!   2. Authenticate token → get `UserId`
//!   3. Send `HandshakeAck` → the connection is live
//!   4. Loop: receive envelopes → dispatch to the session layer

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use gambit_protocol::{
    ClientEnvelope, ClientEvent, Codec, ErrorCode, GameId, ProtocolError,
    ServerEnvelope, ServerEvent, UserId,
};
use gambit_rules::RulesOracle;
use gambit_session::{SessionError, SessionHandle};
use gambit_store::GameStore;
use gambit_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::server::{ServerState, PROTOCOL_VERSION};
use crate::{Authenticator, GambitError};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// One outbound message: an optional request correlation plus the event.
struct Outbound {
    reply_to: Option<u64>,
    event: ServerEvent,
}

type OutboundSender = mpsc::UnboundedSender<Outbound>;
type Subscriptions = Arc<StdMutex<HashMap<GameId, SessionHandle>>>;

/// Drop guard that delivers a disconnect to every session this
/// connection subscribed to, even if the handler panics. `Drop` is
/// synchronous, so the async notifications run in a spawned task.
struct DisconnectGuard {
    conn_id: ConnectionId,
    subscriptions: Subscriptions,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let handles: Vec<SessionHandle> = self
            .subscriptions
            .lock()
            .map(|subs| subs.values().cloned().collect())
            .unwrap_or_default();
        let conn_id = self.conn_id;
        tokio::spawn(async move {
            for handle in handles {
                handle.disconnect(conn_id).await;
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<R, S, A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<R, S, A, C>>,
) -> Result<(), GambitError>
where
    R: RulesOracle,
    S: GameStore,
    A: Authenticator,
    C: Codec,
{
    let conn_id = conn.id();
    debug!(%conn_id, "handling new connection");

    let user = perform_handshake(&conn, &state).await?;
    info!(%conn_id, user_id = %user, "client authenticated");

    // One writer task owns envelope numbering; the handler loop below is
    // its sole producer, so replies and session broadcasts form a single
    // ordered stream per connection. A slow socket backs up these
    // channels, never the session actors.
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_writer(conn.clone(), Arc::clone(&state), out_rx));

    // Session fan-out channel; handed to every session this connection
    // subscribes to.
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let subscriptions: Subscriptions =
        Arc::new(StdMutex::new(HashMap::new()));
    let _guard = DisconnectGuard {
        conn_id,
        subscriptions: Arc::clone(&subscriptions),
    };

    loop {
        let data = tokio::select! {
            maybe_event = events_rx.recv() => {
                // Never `None`: the handler keeps `events_tx` alive.
                if let Some(event) = maybe_event {
                    forward(&out_tx, event);
                }
                continue;
            }
            result = tokio::time::timeout(state.recv_timeout, conn.recv()) => {
                match result {
                    Ok(Ok(Some(data))) => data,
                    Ok(Ok(None)) => {
                        info!(
                            %conn_id,
                            user_id = %user,
                            "connection closed cleanly"
                        );
                        break;
                    }
                    Ok(Err(e)) => {
                        debug!(%conn_id, error = %e, "recv error");
                        break;
                    }
                    Err(_) => {
                        info!(
                            %conn_id,
                            user_id = %user,
                            "connection idle timeout"
                        );
                        break;
                    }
                }
            }
        };

        let envelope: ClientEnvelope = match state.codec.decode(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(%conn_id, error = %e, "failed to decode envelope");
                reply(
                    &out_tx,
                    None,
                    error_event(
                        ErrorCode::BadRequest,
                        &format!("undecodable envelope: {e}"),
                    ),
                );
                continue;
            }
        };

        let seq = envelope.seq;
        match envelope.event {
            ClientEvent::Handshake { .. } => {
                reply(
                    &out_tx,
                    Some(seq),
                    error_event(
                        ErrorCode::BadRequest,
                        "handshake already completed",
                    ),
                );
            }

            ClientEvent::Heartbeat { client_time } => {
                reply(
                    &out_tx,
                    Some(seq),
                    ServerEvent::HeartbeatAck {
                        client_time,
                        server_time: state.started.elapsed().as_millis()
                            as u64,
                    },
                );
            }

            ClientEvent::Join { game_id } => {
                // Lock only for session lookup/creation, drop before the
                // subscribe round-trip.
                let result = {
                    let mut registry = state.registry.lock().await;
                    registry.get_or_create(&game_id).await
                };
                match result {
                    Ok(handle) => {
                        let subscribed = handle
                            .subscribe(conn_id, user.clone(), events_tx.clone())
                            .await;
                        flush_events(&mut events_rx, &out_tx);
                        match subscribed {
                            Ok(sub) => {
                                if let Ok(mut subs) = subscriptions.lock() {
                                    subs.insert(game_id.clone(), handle);
                                }
                                reply(
                                    &out_tx,
                                    Some(seq),
                                    ServerEvent::Joined {
                                        game_id,
                                        role: sub.role,
                                        snapshot: sub.snapshot,
                                    },
                                );
                            }
                            Err(e) => reply_session_error(&out_tx, seq, e),
                        }
                    }
                    Err(e) => reply_session_error(&out_tx, seq, e),
                }
            }

            ClientEvent::Move { game_id, intent } => {
                match session_for(&subscriptions, &game_id) {
                    Some(handle) => {
                        let result =
                            handle.submit_move(user.clone(), intent).await;
                        flush_events(&mut events_rx, &out_tx);
                        acked(&out_tx, seq, result);
                    }
                    None => reply_not_joined(&out_tx, seq, &game_id),
                }
            }

            ClientEvent::OfferDraw { game_id } => {
                match session_for(&subscriptions, &game_id) {
                    Some(handle) => {
                        let result = handle.offer_draw(user.clone()).await;
                        flush_events(&mut events_rx, &out_tx);
                        acked(&out_tx, seq, result);
                    }
                    None => reply_not_joined(&out_tx, seq, &game_id),
                }
            }

            ClientEvent::AcceptDraw { game_id } => {
                match session_for(&subscriptions, &game_id) {
                    Some(handle) => {
                        let result = handle.accept_draw(user.clone()).await;
                        flush_events(&mut events_rx, &out_tx);
                        acked(&out_tx, seq, result);
                    }
                    None => reply_not_joined(&out_tx, seq, &game_id),
                }
            }

            ClientEvent::DeclineDraw { game_id } => {
                match session_for(&subscriptions, &game_id) {
                    Some(handle) => {
                        let result = handle.decline_draw(user.clone()).await;
                        flush_events(&mut events_rx, &out_tx);
                        acked(&out_tx, seq, result);
                    }
                    None => reply_not_joined(&out_tx, seq, &game_id),
                }
            }

            ClientEvent::Resign { game_id } => {
                match session_for(&subscriptions, &game_id) {
                    Some(handle) => {
                        let result = handle.resign(user.clone()).await;
                        flush_events(&mut events_rx, &out_tx);
                        acked(&out_tx, seq, result);
                    }
                    None => reply_not_joined(&out_tx, seq, &game_id),
                }
            }

            ClientEvent::Leave { game_id } => {
                let handle = subscriptions
                    .lock()
                    .ok()
                    .and_then(|mut subs| subs.remove(&game_id));
                match handle {
                    Some(handle) => {
                        let result = handle.unsubscribe(conn_id).await;
                        flush_events(&mut events_rx, &out_tx);
                        acked(&out_tx, seq, result);
                    }
                    None => reply_not_joined(&out_tx, seq, &game_id),
                }
            }

            ClientEvent::Disconnect { reason } => {
                info!(
                    %conn_id,
                    user_id = %user,
                    %reason,
                    "client disconnecting"
                );
                break;
            }
        }
    }

    // The writer task holds a clone of the socket, so close explicitly
    // rather than waiting for the task chain to unwind.
    let _ = conn.close().await;

    // _guard drops here → sessions learn the connection is gone.
    Ok(())
}

/// Performs the initial handshake: receive Handshake, validate version,
/// authenticate, send Ack.
async fn perform_handshake<R, S, A, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<R, S, A, C>>,
) -> Result<UserId, GambitError>
where
    R: RulesOracle,
    S: GameStore,
    A: Authenticator,
    C: Codec,
{
    let data = match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv())
        .await
    {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before handshake".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage(
                "handshake timed out".into(),
            )
            .into());
        }
    };

    let envelope: ClientEnvelope = state.codec.decode(&data)?;

    let (version, token) = match envelope.event {
        ClientEvent::Handshake { version, token } => (version, token),
        _ => {
            send_direct(
                conn,
                state,
                Some(envelope.seq),
                error_event(
                    ErrorCode::BadRequest,
                    "first message must be Handshake",
                ),
            )
            .await?;
            return Err(ProtocolError::InvalidMessage(
                "first message must be Handshake".into(),
            )
            .into());
        }
    };

    if version != PROTOCOL_VERSION {
        send_direct(
            conn,
            state,
            Some(envelope.seq),
            error_event(
                ErrorCode::BadRequest,
                &format!(
                    "version mismatch: expected {PROTOCOL_VERSION}, \
                     got {version}"
                ),
            ),
        )
        .await?;
        return Err(ProtocolError::InvalidMessage(
            "protocol version mismatch".into(),
        )
        .into());
    }

    let user = match state.auth.authenticate(&token).await {
        Ok(user) => user,
        Err(e) => {
            send_direct(
                conn,
                state,
                Some(envelope.seq),
                error_event(ErrorCode::Auth, "unauthorized"),
            )
            .await?;
            return Err(e.into());
        }
    };

    send_direct(
        conn,
        state,
        Some(envelope.seq),
        ServerEvent::HandshakeAck {
            user_id: user.clone(),
            server_time: state.started.elapsed().as_millis() as u64,
        },
    )
    .await?;

    Ok(user)
}

/// Drains the outbound channel onto the socket, numbering envelopes.
async fn run_writer<R, S, A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<R, S, A, C>>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) where
    R: RulesOracle,
    S: GameStore,
    A: Authenticator,
    C: Codec,
{
    // The handshake ack used seq 0; the stream proper starts at 1.
    let mut seq: u64 = 1;
    while let Some(out) = rx.recv().await {
        let envelope = ServerEnvelope {
            seq,
            reply_to: out.reply_to,
            timestamp: state.started.elapsed().as_millis() as u64,
            event: out.event,
        };
        let bytes = match state.codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%error, "failed to encode outbound envelope");
                continue;
            }
        };
        seq += 1;
        if let Err(error) = conn.send(&bytes).await {
            debug!(conn_id = %conn.id(), %error, "writer stopping");
            break;
        }
    }
}

/// Sends one envelope directly, before the writer task exists.
/// Only used during the handshake; always seq 0.
async fn send_direct<R, S, A, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<R, S, A, C>>,
    reply_to: Option<u64>,
    event: ServerEvent,
) -> Result<(), GambitError>
where
    R: RulesOracle,
    S: GameStore,
    A: Authenticator,
    C: Codec,
{
    let envelope = ServerEnvelope {
        seq: 0,
        reply_to,
        timestamp: state.started.elapsed().as_millis() as u64,
        event,
    };
    let bytes = state.codec.encode(&envelope)?;
    conn.send(&bytes).await?;
    Ok(())
}

fn session_for(
    subscriptions: &Subscriptions,
    game_id: &GameId,
) -> Option<SessionHandle> {
    subscriptions
        .lock()
        .ok()
        .and_then(|subs| subs.get(game_id).cloned())
}

fn reply(out: &OutboundSender, reply_to: Option<u64>, event: ServerEvent) {
    let _ = out.send(Outbound { reply_to, event });
}

fn forward(out: &OutboundSender, event: ServerEvent) {
    let _ = out.send(Outbound {
        reply_to: None,
        event,
    });
}

/// Drains broadcasts already queued on the fan-out channel into the
/// writer. Called after every session round-trip and before the
/// correlated reply: the session actor queues its broadcasts before
/// completing the command, so everything a request caused is in the
/// channel by the time the reply is sent.
fn flush_events(
    events_rx: &mut mpsc::UnboundedReceiver<ServerEvent>,
    out: &OutboundSender,
) {
    while let Ok(event) = events_rx.try_recv() {
        forward(out, event);
    }
}

fn acked(out: &OutboundSender, seq: u64, result: Result<(), SessionError>) {
    match result {
        Ok(()) => reply(out, Some(seq), ServerEvent::Ack),
        Err(e) => reply_session_error(out, seq, e),
    }
}

fn reply_session_error(out: &OutboundSender, seq: u64, error: SessionError) {
    debug!(%error, "rejecting request");
    reply(
        out,
        Some(seq),
        ServerEvent::Error {
            code: error.wire_code(),
            message: error.to_string(),
        },
    );
}

fn reply_not_joined(out: &OutboundSender, seq: u64, game_id: &GameId) {
    reply(
        out,
        Some(seq),
        ServerEvent::Error {
            code: ErrorCode::NotFound,
            message: format!("{game_id} is not joined on this connection"),
        },
    );
}

fn error_event(code: ErrorCode, message: &str) -> ServerEvent {
    ServerEvent::Error {
        code,
        message: message.to_string(),
    }
}
