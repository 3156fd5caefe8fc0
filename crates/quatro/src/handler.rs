//! Per-connection handler: handshake, identity, and event routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive `hello` → resolve the token to an identity
//!   2. Register with the lobby → send `handshake_ack`
//!   3. Run two halves until the socket closes:
//!      - reader: decode client events, submit them, queue the reply
//!      - forwarder: frame everything queued for this participant
//!   4. Report the disconnect to the lobby, exactly once

use std::sync::Arc;

use quatro_match::{LobbyHandle, MatchError, reply_for};
use quatro_presence::{Identity, IdentityResolver, unix_millis};
use quatro_protocol::{
    ClientEvent, Codec, Envelope, ParticipantId, ProtocolError, ServerEvent,
};
use quatro_transport::{Connection, TransportError};
use tokio::sync::mpsc;

use crate::QuatroError;
use crate::server::ServerState;

/// Reports the participant's disconnect to the lobby if the handler
/// exits without doing so itself, e.g. on an early `?` return.
struct DisconnectGuard {
    participant_id: ParticipantId,
    lobby: LobbyHandle,
    armed: bool,
}

impl DisconnectGuard {
    async fn report(mut self) {
        self.armed = false;
        if let Err(e) = self.lobby.disconnect(self.participant_id).await {
            tracing::debug!(participant_id = %self.participant_id, error = %e, "disconnect not delivered");
        }
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let participant_id = self.participant_id;
        let lobby = self.lobby.clone();
        tokio::spawn(async move {
            let _ = lobby.disconnect(participant_id).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<T, R, C>(
    conn: T,
    state: Arc<ServerState<R, C>>,
) -> Result<(), QuatroError>
where
    T: Connection<Error = TransportError>,
    R: IdentityResolver,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = ?conn.peer_addr(), "handling new connection");

    // --- Step 1: Handshake ---
    let identity = perform_handshake(&conn, &state).await?;
    let participant_id = identity.participant_id();
    let ack = ServerEvent::HandshakeAck {
        participant_id,
        display_name: identity.display_name().to_owned(),
        is_privileged: identity.is_privileged,
        server_time: unix_millis(),
    };

    // --- Step 2: Register ---
    // Events the lobby pushes before the ack goes out wait in the channel.
    let (outbox, mut outbound) = mpsc::unbounded_channel();
    if let Err(e) = state.lobby.connect(identity, outbox.clone()).await {
        let refusal = ServerEvent::Error {
            message: e.reason().to_owned(),
        };
        send_event(&conn, &state.codec, 1, refusal).await?;
        return Err(e.into());
    }
    let guard = DisconnectGuard {
        participant_id,
        lobby: state.lobby.clone(),
        armed: true,
    };
    send_event(&conn, &state.codec, 1, ack).await?;
    tracing::info!(%conn_id, %participant_id, "participant connected");

    // --- Step 3: Reader and forwarder ---
    let forwarder = async {
        let mut seq: u64 = 2;
        while let Some(event) = outbound.recv().await {
            send_event(&conn, &state.codec, seq, event).await?;
            seq += 1;
        }
        Ok::<(), QuatroError>(())
    };
    let reader = read_events(&conn, &state, participant_id, &outbox);

    let result = tokio::select! {
        r = forwarder => r,
        r = reader => r,
    };

    // --- Step 4: Disconnect ---
    guard.report().await;
    if let Err(e) = conn.close().await {
        tracing::debug!(%participant_id, error = %e, "close failed");
    }
    tracing::info!(%conn_id, %participant_id, "participant disconnected");
    result
}

/// Reads until the socket closes. Malformed frames are answered with an
/// `error` event and otherwise ignored.
async fn read_events<T, R, C>(
    conn: &T,
    state: &ServerState<R, C>,
    participant_id: ParticipantId,
    replies: &mpsc::UnboundedSender<ServerEvent>,
) -> Result<(), QuatroError>
where
    T: Connection<Error = TransportError>,
    R: IdentityResolver,
    C: Codec,
{
    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(%participant_id, "connection closed cleanly");
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(%participant_id, error = %e, "recv error");
                return Err(e.into());
            }
        };

        let envelope: Envelope<ClientEvent> = match state.codec.decode(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(%participant_id, error = %e, "failed to decode frame");
                let _ = replies.send(ServerEvent::Error {
                    message: "malformed or unknown event".into(),
                });
                continue;
            }
        };

        let event = envelope.event;
        let result = state.lobby.submit(participant_id, event.clone()).await;
        if result == Err(MatchError::Unavailable) {
            return Err(MatchError::Unavailable.into());
        }
        if let Some(reply) = reply_for(&event, &result) {
            let _ = replies.send(reply);
        }
    }
}

/// Waits for `hello` and resolves its token.
async fn perform_handshake<T, R, C>(
    conn: &T,
    state: &ServerState<R, C>,
) -> Result<Identity, QuatroError>
where
    T: Connection<Error = TransportError>,
    R: IdentityResolver,
    C: Codec,
{
    let data = match tokio::time::timeout(state.config.handshake_timeout(), conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(
                ProtocolError::InvalidMessage("connection closed before hello".into()).into(),
            );
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let token = match state.codec.decode::<Envelope<ClientEvent>>(&data) {
        Ok(Envelope {
            event: ClientEvent::Hello { token },
            ..
        }) => token,
        _ => {
            send_error(conn, &state.codec, "expected hello").await?;
            return Err(
                ProtocolError::InvalidMessage("first message must be hello".into()).into(),
            );
        }
    };

    match state.resolver.resolve(&token).await {
        Ok(identity) => Ok(identity),
        Err(e) => {
            tracing::debug!(error = %e, "handshake rejected");
            send_error(conn, &state.codec, "unauthorized").await?;
            Err(e.into())
        }
    }
}

async fn send_error<T>(conn: &T, codec: &impl Codec, message: &str) -> Result<(), QuatroError>
where
    T: Connection<Error = TransportError>,
{
    send_event(
        conn,
        codec,
        1,
        ServerEvent::Error {
            message: message.to_string(),
        },
    )
    .await
}

async fn send_event<T>(
    conn: &T,
    codec: &impl Codec,
    seq: u64,
    event: ServerEvent,
) -> Result<(), QuatroError>
where
    T: Connection<Error = TransportError>,
{
    let bytes = codec.encode(&Envelope::new(seq, unix_millis(), event))?;
    conn.send(&bytes).await?;
    Ok(())
}
