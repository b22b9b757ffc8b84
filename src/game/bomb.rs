//! Bomb entities: map pickups, thrown ballistics, explosions
//!
//! Pickup bombs sit at fixed map cells and respawn after collection.
//! A thrown bomb is a ballistic projectile with a fixed fuse; when the fuse
//! expires it becomes an explosion that paints blocks within an expanding
//! radius for a short duration, then disappears.

use uuid::Uuid;

use crate::game::map::{Block, CellRef, Map, BLOCK_SIZE};
use crate::game::physics::{PlayerState, GRAVITY, CHAR_HEIGHT, CHAR_WIDTH};
use crate::ws::protocol::{Team, ThrowDir};

/// Seconds before a collected pickup reappears
pub const BOMB_RESPAWN_SECS: f32 = 10.0;
/// Seconds between throw and detonation
pub const BOMB_FUSE_SECS: f32 = 2.0;
/// Velocity kept after bouncing off a block
pub const BOMB_BOUNCE_DAMPING: f32 = 0.45;
/// Throw velocity (horizontal, vertical arc)
pub const THROW_SPEED_X: f32 = 260.0;
pub const THROW_SPEED_Y: f32 = -340.0;
/// Explosion paint radius grows to this over EXPLOSION_DURATION
pub const EXPLOSION_MAX_RADIUS: f32 = BLOCK_SIZE * 3.0;
pub const EXPLOSION_DURATION: f32 = 0.35;
/// Bomb hitbox is half a cell, centered
pub const BOMB_SIZE: f32 = BLOCK_SIZE / 2.0;

/// A bomb pickup at a fixed map cell
#[derive(Debug, Clone)]
pub struct PickupBomb {
    pub id: u32,
    /// Center position
    pub x: f32,
    pub y: f32,
    pub collected: bool,
    pub respawn_timer: f32,
}

impl PickupBomb {
    pub fn at_cell(id: u32, cell: CellRef) -> Self {
        Self {
            id,
            x: cell.col as f32 * BLOCK_SIZE + BLOCK_SIZE / 2.0,
            y: cell.row as f32 * BLOCK_SIZE + BLOCK_SIZE / 2.0,
            collected: false,
            respawn_timer: 0.0,
        }
    }

    /// Advance the respawn timer
    pub fn tick(&mut self, dt: f32) {
        if self.collected {
            self.respawn_timer -= dt;
            if self.respawn_timer <= 0.0 {
                self.collected = false;
                self.respawn_timer = 0.0;
            }
        }
    }

    pub fn collect(&mut self) {
        self.collected = true;
        self.respawn_timer = BOMB_RESPAWN_SECS;
    }

    /// AABB overlap with a character box
    pub fn overlaps_player(&self, player: &PlayerState) -> bool {
        let (left, right, top, bottom) = player.bounds();
        let half = BOMB_SIZE / 2.0;
        self.x - half < right
            && self.x + half > left
            && self.y - half < bottom
            && self.y + half > top
    }

    pub fn reset(&mut self) {
        self.collected = false;
        self.respawn_timer = 0.0;
    }
}

/// An airborne thrown bomb
#[derive(Debug, Clone)]
pub struct ThrownBomb {
    pub owner_id: Uuid,
    pub team: Team,
    /// Center position
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub fuse: f32,
}

impl ThrownBomb {
    /// Launch from a player's server-side position
    pub fn launch(owner_id: Uuid, team: Team, player: &PlayerState, dir: ThrowDir) -> Self {
        let sign = match dir {
            ThrowDir::Left => -1.0,
            ThrowDir::Right => 1.0,
        };
        Self {
            owner_id,
            team,
            x: player.x + sign * CHAR_WIDTH / 2.0,
            y: player.y - CHAR_HEIGHT / 2.0,
            vel_x: sign * THROW_SPEED_X,
            vel_y: THROW_SPEED_Y,
            fuse: BOMB_FUSE_SECS,
        }
    }

    /// Advance ballistics and the fuse by one tick.
    /// Returns false once the fuse has expired.
    pub fn update(&mut self, map: &Map, dt: f32) -> bool {
        self.vel_y += GRAVITY * dt;

        // Axis-separated movement with bounce-and-damp off blocks
        let half = BOMB_SIZE / 2.0;

        let new_x = self.x + self.vel_x * dt;
        if let Some(block) = hit_block(map, new_x, self.y, half) {
            self.x = if self.vel_x > 0.0 {
                block.left() - half
            } else {
                block.right() + half
            };
            self.vel_x = -self.vel_x * BOMB_BOUNCE_DAMPING;
        } else {
            self.x = new_x;
        }

        let new_y = self.y + self.vel_y * dt;
        if let Some(block) = hit_block(map, self.x, new_y, half) {
            self.y = if self.vel_y > 0.0 {
                block.top() - half
            } else {
                block.bottom() + half
            };
            self.vel_y = -self.vel_y * BOMB_BOUNCE_DAMPING;
        } else {
            self.y = new_y;
        }

        self.fuse -= dt;
        self.fuse > 0.0
    }
}

/// First block overlapping a bomb box centered at (x, y)
fn hit_block(map: &Map, x: f32, y: f32, half: f32) -> Option<&Block> {
    map.iter_blocks().find(|b| {
        x + half > b.left() && x - half < b.right() && y + half > b.top() && y - half < b.bottom()
    })
}

/// A detonated bomb painting outward
#[derive(Debug, Clone)]
pub struct Explosion {
    pub x: f32,
    pub y: f32,
    pub team: Team,
    pub age: f32,
}

impl Explosion {
    pub fn from_bomb(bomb: &ThrownBomb) -> Self {
        Self {
            x: bomb.x,
            y: bomb.y,
            team: bomb.team,
            age: 0.0,
        }
    }

    /// Current paint radius, expanding over the explosion duration
    pub fn radius(&self) -> f32 {
        EXPLOSION_MAX_RADIUS * (self.age / EXPLOSION_DURATION).min(1.0)
    }

    pub fn finished(&self) -> bool {
        self.age >= EXPLOSION_DURATION
    }

    /// Whether a block's box is within the current radius
    pub fn reaches(&self, block: &Block) -> bool {
        aabb_distance(self.x, self.y, block) <= self.radius()
    }
}

/// Distance from a point to a block's box (zero if inside)
fn aabb_distance(x: f32, y: f32, block: &Block) -> f32 {
    let dx = (block.left() - x).max(0.0).max(x - block.right());
    let dy = (block.top() - y).max(0.0).max(y - block.bottom());
    (dx * dx + dy * dy).sqrt()
}
