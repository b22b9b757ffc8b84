//! Snapshot assembly
//!
//! The world simulates at 60Hz but snapshots go out at 12Hz. The builder
//! tracks the tick cadence and drains the paint grid's dirty set on each
//! emission, so block changes ride exactly one snapshot.

use crate::game::world::World;
use crate::util::time::{unix_millis, SIMULATION_TPS, SNAPSHOT_TPS};
use crate::ws::protocol::{PickupBombSnapshot, PlayerSnapshot, ServerMsg, ThrownBombSnapshot};

/// Simulation ticks per snapshot (5 at 60/12)
pub const TICKS_PER_SNAPSHOT: u64 = (SIMULATION_TPS / SNAPSHOT_TPS) as u64;

pub struct SnapshotBuilder {
    ticks_since_send: u64,
    force_next: bool,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self {
            ticks_since_send: 0,
            force_next: false,
        }
    }

    /// Call once per simulation tick; true when a snapshot is due
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_send += 1;
        if self.force_next || self.ticks_since_send >= TICKS_PER_SNAPSHOT {
            self.ticks_since_send = 0;
            self.force_next = false;
            true
        } else {
            false
        }
    }

    /// Emit on the very next tick (used after join and round transitions)
    pub fn force_next(&mut self) {
        self.force_next = true;
    }

    /// Assemble a snapshot, consuming the world's dirty paint set
    pub fn build(&mut self, world: &mut World, tick: u64) -> ServerMsg {
        let players = world
            .players
            .values()
            .map(|p| PlayerSnapshot {
                player_id: p.id,
                team: p.team,
                x: p.state.x,
                y: p.state.y,
                velocity_y: p.state.velocity_y,
                on_ground: p.state.on_ground,
                jumps_used: p.state.jumps_used,
                has_bomb: p.has_bomb,
                last_input_seq: p.last_input_seq,
            })
            .collect();

        let thrown_bombs = world
            .thrown
            .iter()
            .map(|b| ThrownBombSnapshot {
                owner_id: b.owner_id,
                team: b.team,
                x: b.x,
                y: b.y,
                vel_x: b.vel_x,
                vel_y: b.vel_y,
                fuse: b.fuse,
            })
            .collect();

        let bombs = world
            .bombs
            .iter()
            .map(|b| PickupBombSnapshot {
                id: b.id,
                x: b.x,
                y: b.y,
                collected: b.collected,
            })
            .collect();

        ServerMsg::Snapshot {
            tick,
            server_time: unix_millis(),
            players,
            thrown_bombs,
            bombs,
            block_changes: world.colors.take_changes(),
            last_processed_sequences: world.last_processed_sequences(),
        }
    }
}
