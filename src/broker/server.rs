use crate::broker::hub::{EventBroker, EventSender};
use crate::broker::protocol::{ErrorMessage, SocketQuery};
use crate::event::Event;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, Request, State,
    },
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared state for the world socket
#[derive(Clone)]
pub struct WorldSocketState {
    pub broker: Arc<EventBroker>,
}

/// Rejects upgrades that do not name the connecting entity.
///
/// Runs before WebSocket upgrade extraction so 400 is returned without a
/// valid upgrade request.
async fn require_entity_id(Query(params): Query<SocketQuery>, req: Request, next: Next) -> Response {
    match params.entity_id.as_deref() {
        Some(id) if !id.trim().is_empty() => next.run(req).await,
        _ => (StatusCode::BAD_REQUEST, "entity_id is required").into_response(),
    }
}

/// Rejects upgrades for an id that already has a live connection, so a
/// remote client cannot take over a running agent, object or world.
async fn reject_connected_entity(
    State(state): State<Arc<WorldSocketState>>,
    Query(params): Query<SocketQuery>,
    req: Request,
    next: Next,
) -> Response {
    let entity_id = params.entity_id.unwrap_or_default();
    if state.broker.is_connected(&entity_id) {
        warn!(entity_id = %entity_id, "World socket refused: entity already connected");
        return (StatusCode::CONFLICT, "entity_id is already connected").into_response();
    }
    next.run(req).await
}

/// GET /ws?entity_id=... - WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<SocketQuery>,
    State(state): State<Arc<WorldSocketState>>,
) -> Response {
    let entity_id = params.entity_id.unwrap_or_default();
    info!(entity_id = %entity_id, "World socket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, entity_id, state))
}

async fn health() -> &'static str {
    "ok"
}

/// Create the world socket router
pub fn create_world_socket_router(state: Arc<WorldSocketState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            reject_connected_entity,
        ))
        .route_layer(middleware::from_fn(require_entity_id))
        .route("/health", get(health))
        .with_state(state)
}

/// Bridge one WebSocket to a broker connection
async fn handle_socket(mut socket: WebSocket, entity_id: String, state: Arc<WorldSocketState>) {
    // Another client may have claimed the id since the upgrade was accepted
    let Some((sender, mut receiver)) = state.broker.try_connect(&entity_id) else {
        let _ = send_error(&mut socket, "entity_id is already connected").await;
        let _ = socket.send(Message::Close(None)).await;
        return;
    };
    // Dropping the receiver at the end of this function releases the connection
    info!(entity_id = %entity_id, "World socket connection established");

    loop {
        tokio::select! {
            Some(msg) = socket.recv() => {
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Err(e) = publish_frame(&sender, &text) {
                            warn!(entity_id = %entity_id, error = %e, "Rejected inbound frame");
                            if send_error(&mut socket, &e.to_string()).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!(entity_id = %entity_id, "World socket client disconnected");
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            error!(error = %e, "Failed to send pong");
                            break;
                        }
                    }
                    Ok(_) => {
                        // Ignore binary, pong messages
                    }
                    Err(e) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            next = receiver.recv() => {
                match next {
                    Some(event) => {
                        if let Err(e) = forward_event(&mut socket, &event).await {
                            error!(entity_id = %entity_id, error = %e, "Failed to forward event");
                            break;
                        }
                    }
                    None => {
                        info!(entity_id = %entity_id, "Broker connection replaced or closed");
                        break;
                    }
                }
            }

            else => {
                break;
            }
        }
    }

    info!(entity_id = %entity_id, "World socket connection closed");
}

/// Parse, check and publish one inbound frame
fn publish_frame(sender: &EventSender, text: &str) -> anyhow::Result<()> {
    let event = Event::from_json(text)?;
    if event.sender_id() != sender.entity_id() {
        anyhow::bail!(
            "sender_id '{}' does not match connection '{}'",
            event.sender_id(),
            sender.entity_id()
        );
    }
    sender.send(&event);
    Ok(())
}

async fn forward_event(socket: &mut WebSocket, event: &Event) -> anyhow::Result<()> {
    let json = serde_json::to_string(event)?;
    socket.send(Message::Text(json)).await?;
    Ok(())
}

async fn send_error(socket: &mut WebSocket, error: &str) -> anyhow::Result<()> {
    let json = serde_json::to_string(&ErrorMessage::new(error))?;
    socket.send(Message::Text(json)).await?;
    Ok(())
}
