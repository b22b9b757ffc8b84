//! WebSocket upgrade handler and session loop

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{GameHandle, PlayerInput};
use crate::http::middleware::verify_jwt;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token for authentication
    pub token: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    // Verify JWT token before upgrading
    match verify_jwt(&query.token, &state.config.supabase_jwt_secret) {
        Ok(claims) => {
            info!(player_id = %claims.sub, "WebSocket upgrade for authenticated player");
            ws.on_upgrade(move |socket| handle_socket(socket, claims.sub, state))
        }
        Err(e) => {
            error!(error = %e, "WebSocket auth failed");
            Response::builder()
                .status(401)
                .body("Unauthorized".into())
                .unwrap()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, player_id: Uuid, state: AppState) {
    info!(player_id = %player_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    // One live session per player
    match state.sessions.entry(player_id) {
        dashmap::mapref::entry::Entry::Occupied(_) => {
            warn!(player_id = %player_id, "Duplicate connection rejected");
            let _ = send_msg(
                &mut ws_sink,
                &ServerMsg::Error {
                    code: "already_connected".to_string(),
                    message: "Another session is active for this player".to_string(),
                },
            )
            .await;
            return;
        }
        dashmap::mapref::entry::Entry::Vacant(entry) => {
            entry.insert(unix_millis());
        }
    }

    // Send welcome message
    let welcome = ServerMsg::Welcome {
        player_id,
        server_time: unix_millis(),
    };

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(player_id = %player_id, error = %e, "Failed to send welcome");
        state.sessions.remove(&player_id);
        return;
    }

    let broadcast_rx = state.game.broadcast_tx.subscribe();

    run_session(player_id, ws_sink, ws_stream, state.game.clone(), broadcast_rx).await;

    state.sessions.remove(&player_id);
    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    player_id: Uuid,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    game: GameHandle,
    mut broadcast_rx: broadcast::Receiver<ServerMsg>,
) {
    let rate_limiter = PlayerRateLimiter::new();

    // Direct replies (pong and the like) go to this connection only,
    // never through the broadcast channel
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<ServerMsg>();

    // Spawn writer task: game broadcasts + direct replies -> WebSocket
    let writer_player_id = player_id;
    let writer_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                direct = direct_rx.recv() => match direct {
                    Some(msg) => {
                        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                            debug!(player_id = %writer_player_id, error = %e, "WebSocket send failed");
                            break;
                        }
                    }
                    None => break,
                },
                broadcast = broadcast_rx.recv() => match broadcast {
                    Ok(msg) => {
                        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                            debug!(player_id = %writer_player_id, error = %e, "WebSocket send failed");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(
                            player_id = %writer_player_id,
                            lagged_count = n,
                            "Client lagged, skipping {} messages", n
                        );
                        // Continue - don't disconnect for lag
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(player_id = %writer_player_id, "Broadcast channel closed");
                        break;
                    }
                },
            }
        }
    });

    // Reader loop: WebSocket -> game task
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %player_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    // Pings are answered on this connection, not simulated
                    Ok(ClientMsg::Ping { t }) => {
                        let _ = direct_tx.send(ServerMsg::Pong { t });
                    }
                    Ok(client_msg) => {
                        game.send_client(PlayerInput {
                            player_id,
                            msg: client_msg,
                        })
                        .await;
                    }
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(player_id = %player_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(player_id = %player_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Signal disconnect to the game task
    game.send_client(PlayerInput {
        player_id,
        msg: ClientMsg::Leave,
    })
    .await;

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
