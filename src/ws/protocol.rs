//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Teams competing to paint the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    /// The opposing team
    pub fn other(self) -> Team {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
        }
    }
}

/// Paint color of a block cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockColor {
    White,
    Red,
    Blue,
}

impl From<Team> for BlockColor {
    fn from(team: Team) -> Self {
        match team {
            Team::Red => BlockColor::Red,
            Team::Blue => BlockColor::Blue,
        }
    }
}

/// Round result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Red,
    Blue,
    Tie,
}

/// Keys a client can press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKey {
    Left,
    Right,
    Jump,
    Throw,
}

/// Horizontal throw direction for bombs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrowDir {
    Left,
    Right,
}

/// A single key press/release within an input batch
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InputEvent {
    pub key: InputKey,
    pub pressed: bool,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Enter the queue for the next round
    Join,

    /// Batched player input for prediction reconciliation
    Input {
        /// Client-assigned monotonically increasing sequence number
        sequence: u32,
        /// Ordered press/release events since the last batch
        events: Vec<InputEvent>,
        /// Client game clock, advisory only
        game_time: f32,
    },

    /// Throw the held bomb. Position is always taken from the
    /// server-side player state; only the direction is honored.
    ThrowBomb { dir: ThrowDir },

    /// Client-predicted state report. Advisory only - the server never
    /// adopts client positions, it only measures divergence.
    StateSync {
        x: f32,
        y: f32,
        velocity_y: f32,
        has_bomb: bool,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave the game (also injected on disconnect)
    Leave,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { player_id: Uuid, server_time: u64 },

    /// Queue phase status (broadcast once per second while queueing)
    QueueState {
        countdown: f32,
        player_count: u32,
        paused: bool,
    },

    /// Playing phase status (broadcast once per second mid-round)
    GameState { countdown: f32 },

    /// Authoritative state snapshot (sent at the snapshot rate)
    Snapshot {
        /// Server tick number
        tick: u64,
        /// Server wall clock in Unix milliseconds
        server_time: u64,
        /// All player states
        players: Vec<PlayerSnapshot>,
        /// Airborne thrown bombs
        thrown_bombs: Vec<ThrownBombSnapshot>,
        /// Pickup bomb spawn states
        bombs: Vec<PickupBombSnapshot>,
        /// Block cells whose color changed since the previous snapshot
        block_changes: Vec<BlockChange>,
        /// Highest input sequence applied per player
        last_processed_sequences: HashMap<Uuid, u32>,
    },

    /// A round started; team rosters are announced via TeamAssigned
    RoundStarted { round_number: u64 },

    /// Round finished with the final paint tally
    GameEnded {
        red_score: u32,
        blue_score: u32,
        winner: Winner,
    },

    /// Player entered the queue or round
    PlayerJoined {
        player_id: Uuid,
        team: Option<Team>,
    },

    /// Player left
    PlayerLeft {
        player_id: Uuid,
        team: Option<Team>,
    },

    /// Team assignment at round start
    TeamAssigned { player_id: Uuid, team: Team },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Player state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub player_id: Uuid,
    pub team: Option<Team>,
    /// Horizontal center of the character box
    pub x: f32,
    /// Bottom edge of the character box (y grows downward)
    pub y: f32,
    pub velocity_y: f32,
    pub on_ground: bool,
    pub jumps_used: u8,
    pub has_bomb: bool,
    /// Last processed input sequence (also in the top-level map)
    pub last_input_seq: u32,
}

/// Thrown bomb state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrownBombSnapshot {
    pub owner_id: Uuid,
    pub team: Team,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    /// Seconds until detonation
    pub fuse: f32,
}

/// Pickup bomb state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupBombSnapshot {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub collected: bool,
}

/// A single repainted cell (delta compression unit)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BlockChange {
    pub row: u16,
    pub col: u16,
    pub color: BlockColor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_msg_roundtrip() {
        let msg = ClientMsg::Input {
            sequence: 7,
            events: vec![
                InputEvent {
                    key: InputKey::Left,
                    pressed: true,
                },
                InputEvent {
                    key: InputKey::Jump,
                    pressed: true,
                },
            ],
            game_time: 12.5,
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"input\""));

        match serde_json::from_str::<ClientMsg>(&json).unwrap() {
            ClientMsg::Input {
                sequence, events, ..
            } => {
                assert_eq!(sequence, 7);
                assert_eq!(events.len(), 2);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn snapshot_serializes_tagged() {
        let msg = ServerMsg::Snapshot {
            tick: 300,
            server_time: 1_700_000_000_000,
            players: vec![],
            thrown_bombs: vec![],
            bombs: vec![],
            block_changes: vec![BlockChange {
                row: 3,
                col: 4,
                color: BlockColor::Red,
            }],
            last_processed_sequences: HashMap::new(),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"snapshot\""));
        assert!(json.contains("\"color\":\"red\""));
    }

    #[test]
    fn team_color_mapping() {
        assert_eq!(BlockColor::from(Team::Red), BlockColor::Red);
        assert_eq!(BlockColor::from(Team::Blue), BlockColor::Blue);
        assert_eq!(Team::Red.other(), Team::Blue);
    }
}
