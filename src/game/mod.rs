//! Game simulation modules

pub mod bomb;
pub mod map;
pub mod physics;
pub mod round;
pub mod server;
pub mod snapshot;
pub mod world;

pub use server::{GameCommand, GameHandle, GameServer};

use crate::ws::protocol::ClientMsg;
use uuid::Uuid;

/// Player input received from WebSocket
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub player_id: Uuid,
    pub msg: ClientMsg,
}
