//! Authoritative entity state store
//!
//! Owns every live mutable collection: players with their input queues,
//! the paint grid with its dirty set, pickup bombs, thrown bombs and
//! explosions. All mutation happens from the single game task, one fixed
//! tick at a time.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use tracing::debug;
use uuid::Uuid;

use crate::game::bomb::{Explosion, PickupBomb, ThrownBomb};
use crate::game::map::{Map, BLOCK_SIZE};
use crate::game::physics::{step_player, InputState, PlayerState};
use crate::ws::protocol::{BlockChange, BlockColor, InputEvent, InputKey, Team, ThrowDir};

/// Proximity threshold for touch painting, scaled to the block size
/// (5px at the 32px reference scale)
pub const TOUCH_RANGE: f32 = BLOCK_SIZE * (5.0 / 32.0);

/// Bound on buffered input batches per player. A client flooding inputs
/// faster than the tick rate loses its oldest batches, not server memory.
pub const INPUT_QUEUE_DEPTH: usize = 32;

/// One inbound input message, buffered until the next tick
#[derive(Debug, Clone)]
pub struct InputBatch {
    pub sequence: u32,
    pub events: Vec<InputEvent>,
}

/// A connected participant
#[derive(Debug)]
pub struct Player {
    pub id: Uuid,
    /// None while queued, assigned at round start
    pub team: Option<Team>,
    pub state: PlayerState,
    pub input: InputState,
    pub pending_inputs: VecDeque<InputBatch>,
    /// Highest input sequence applied (round-trips in snapshots)
    pub last_input_seq: u32,
    pub has_bomb: bool,
    /// Last horizontal movement direction, used for key-triggered throws
    pub facing: ThrowDir,
}

impl Player {
    fn new(id: Uuid, x: f32, y: f32) -> Self {
        Self {
            id,
            team: None,
            state: PlayerState::at_spawn(x, y),
            input: InputState::default(),
            pending_inputs: VecDeque::new(),
            last_input_seq: 0,
            has_bomb: false,
            facing: ThrowDir::Right,
        }
    }
}

/// Paint state parallel to the map's occupancy grid
pub struct BlockColorGrid {
    cols: u16,
    rows: u16,
    /// None for unoccupied cells
    cells: Vec<Option<BlockColor>>,
    /// Cells repainted since the last snapshot emission
    changed: BTreeSet<(u16, u16)>,
}

impl BlockColorGrid {
    pub fn new(map: &Map) -> Self {
        let mut cells = vec![None; map.cols as usize * map.rows as usize];
        for block in map.iter_blocks() {
            cells[block.row as usize * map.cols as usize + block.col as usize] =
                Some(BlockColor::White);
        }
        Self {
            cols: map.cols,
            rows: map.rows,
            cells,
            changed: BTreeSet::new(),
        }
    }

    pub fn color_at(&self, row: u16, col: u16) -> Option<BlockColor> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells[row as usize * self.cols as usize + col as usize]
    }

    /// Paint a cell for a team. Marks the cell dirty when the color
    /// actually changes, or unconditionally for spawn-adjacent cells so
    /// clients keep re-syncing spawn-area paint.
    pub fn paint(&mut self, map: &Map, row: u16, col: u16, team: Team) {
        let idx = row as usize * self.cols as usize + col as usize;
        let Some(Some(current)) = self.cells.get(idx).copied() else {
            return;
        };
        let color = BlockColor::from(team);
        if current != color {
            self.cells[idx] = Some(color);
            self.changed.insert((row, col));
        } else if map.is_spawn_adjacent(row, col) {
            self.changed.insert((row, col));
        }
    }

    /// Drain the dirty set into wire-format changes
    pub fn take_changes(&mut self) -> Vec<BlockChange> {
        let changed = std::mem::take(&mut self.changed);
        changed
            .into_iter()
            .filter_map(|(row, col)| {
                self.color_at(row, col).map(|color| BlockChange { row, col, color })
            })
            .collect()
    }

    pub fn dirty_len(&self) -> usize {
        self.changed.len()
    }

    /// Reset every occupied cell to white, marking repainted cells dirty
    pub fn reset_white(&mut self) {
        for (idx, cell) in self.cells.iter_mut().enumerate() {
            if let Some(color) = cell {
                if *color != BlockColor::White {
                    *color = BlockColor::White;
                    let row = (idx / self.cols as usize) as u16;
                    let col = (idx % self.cols as usize) as u16;
                    self.changed.insert((row, col));
                }
            }
        }
    }

    /// Painted-cell tally per team
    pub fn score(&self) -> (u32, u32) {
        let mut red = 0;
        let mut blue = 0;
        for cell in self.cells.iter().flatten() {
            match cell {
                BlockColor::Red => red += 1,
                BlockColor::Blue => blue += 1,
                BlockColor::White => {}
            }
        }
        (red, blue)
    }
}

/// The authoritative world
pub struct World {
    /// BTreeMap so per-tick iteration order is deterministic: the paint
    /// tie-break is "last in key order wins", reproducible everywhere
    pub players: BTreeMap<Uuid, Player>,
    pub colors: BlockColorGrid,
    pub bombs: Vec<PickupBomb>,
    pub thrown: Vec<ThrownBomb>,
    pub explosions: Vec<Explosion>,
}

impl World {
    pub fn new(map: &Map) -> Self {
        let bombs = map
            .bomb_spawns()
            .iter()
            .enumerate()
            .map(|(i, cell)| PickupBomb::at_cell(i as u32, *cell))
            .collect();
        Self {
            players: BTreeMap::new(),
            colors: BlockColorGrid::new(map),
            bombs,
            thrown: Vec::new(),
            explosions: Vec::new(),
        }
    }

    /// Register a joined participant (queued, no team yet)
    pub fn add_player(&mut self, id: Uuid, map: &Map) {
        self.players
            .entry(id)
            .or_insert_with(|| Player::new(id, map.width() / 2.0, 0.0));
    }

    pub fn remove_player(&mut self, id: Uuid) -> Option<Player> {
        self.players.remove(&id)
    }

    /// Place a player on a team at its spawn for a new round
    pub fn activate_player(&mut self, id: Uuid, team: Team, spawn: (f32, f32)) {
        if let Some(player) = self.players.get_mut(&id) {
            player.team = Some(team);
            player.state = PlayerState::at_spawn(spawn.0, spawn.1);
            player.input = InputState::default();
            player.has_bomb = false;
        }
    }

    /// Buffer an input batch for the next tick. Stale or duplicate
    /// sequences are dropped when the batch is consumed.
    pub fn queue_input(&mut self, id: Uuid, sequence: u32, events: Vec<InputEvent>) {
        if let Some(player) = self.players.get_mut(&id) {
            if player.pending_inputs.len() >= INPUT_QUEUE_DEPTH {
                player.pending_inputs.pop_front();
            }
            player.pending_inputs.push_back(InputBatch { sequence, events });
        }
    }

    /// Throw the held bomb from the server-side player position
    pub fn throw_bomb(&mut self, id: Uuid, dir: ThrowDir) {
        if let Some(player) = self.players.get_mut(&id) {
            let Some(team) = player.team else { return };
            if !player.has_bomb {
                debug!(player_id = %id, "Throw without a held bomb ignored");
                return;
            }
            player.has_bomb = false;
            self.thrown
                .push(ThrownBomb::launch(id, team, &player.state, dir));
        }
    }

    /// Advance the whole world by one fixed tick
    pub fn step(&mut self, map: &Map, dt: f32) {
        self.drain_inputs();
        self.step_players(map, dt);
        self.resolve_painting(map);
        self.update_pickups(dt);
        self.update_thrown(map, dt);
        self.update_explosions(map, dt);
    }

    fn drain_inputs(&mut self) {
        for player in self.players.values_mut() {
            while let Some(batch) = player.pending_inputs.pop_front() {
                if batch.sequence <= player.last_input_seq {
                    continue; // stale or duplicate
                }
                for event in &batch.events {
                    match event.key {
                        InputKey::Left => player.input.left = event.pressed,
                        InputKey::Right => player.input.right = event.pressed,
                        InputKey::Jump => player.input.jump = event.pressed,
                        InputKey::Throw => player.input.throw = event.pressed,
                    }
                }
                player.last_input_seq = batch.sequence;
            }
        }
    }

    fn step_players(&mut self, map: &Map, dt: f32) {
        let mut throws: Vec<(Uuid, ThrowDir)> = Vec::new();

        for player in self.players.values_mut() {
            if player.team.is_none() {
                continue; // queued players do not simulate
            }

            player.state = step_player(&player.state, &player.input, map, dt);

            if player.input.left && !player.input.right {
                player.facing = ThrowDir::Left;
            } else if player.input.right && !player.input.left {
                player.facing = ThrowDir::Right;
            }

            if player.input.throw_just_pressed() && player.has_bomb {
                throws.push((player.id, player.facing));
            }

            player.input.latch();
        }

        for (id, dir) in throws {
            self.throw_bomb(id, dir);
        }
    }

    /// Proximity painting with the collect-then-commit rule: all touches
    /// are gathered before any color changes, so a same-tick contest is
    /// resolved by iteration order (last writer in player key order),
    /// deterministically.
    fn resolve_painting(&mut self, map: &Map) {
        let mut touches: BTreeMap<(u16, u16), Team> = BTreeMap::new();

        for player in self.players.values() {
            let Some(team) = player.team else { continue };
            let (left, right, top, bottom) = player.state.bounds();
            for block in map.iter_blocks() {
                let dx = (block.left() - right).max(0.0).max(left - block.right());
                let dy = (block.top() - bottom).max(0.0).max(top - block.bottom());
                if dx <= TOUCH_RANGE && dy <= TOUCH_RANGE {
                    touches.insert((block.row, block.col), team);
                }
            }
        }

        for ((row, col), team) in touches {
            self.colors.paint(map, row, col, team);
        }
    }

    fn update_pickups(&mut self, dt: f32) {
        for bomb in &mut self.bombs {
            bomb.tick(dt);
            if bomb.collected {
                continue;
            }
            for player in self.players.values_mut() {
                if player.team.is_some() && !player.has_bomb && bomb.overlaps_player(&player.state)
                {
                    bomb.collect();
                    player.has_bomb = true;
                    break;
                }
            }
        }
    }

    fn update_thrown(&mut self, map: &Map, dt: f32) {
        let mut exploded = Vec::new();
        self.thrown.retain_mut(|bomb| {
            if bomb.update(map, dt) {
                true
            } else {
                exploded.push(Explosion::from_bomb(bomb));
                false
            }
        });
        self.explosions.extend(exploded);
    }

    fn update_explosions(&mut self, map: &Map, dt: f32) {
        for explosion in &mut self.explosions {
            explosion.age += dt;
        }
        // Paint inside the current radius. Borrow note: collect cells
        // first, the grid commit needs &mut.
        let mut painted: Vec<(u16, u16, Team)> = Vec::new();
        for explosion in &self.explosions {
            for block in map.iter_blocks() {
                if explosion.reaches(block) {
                    painted.push((block.row, block.col, explosion.team));
                }
            }
        }
        for (row, col, team) in painted {
            self.colors.paint(map, row, col, team);
        }
        self.explosions.retain(|e| !e.finished());
    }

    /// Highest applied input sequence per player, for reconciliation
    pub fn last_processed_sequences(&self) -> HashMap<Uuid, u32> {
        self.players
            .iter()
            .map(|(id, p)| (*id, p.last_input_seq))
            .collect()
    }

    /// Reset paint, bombs and team assignments between rounds
    /// Clear the per-round entities at round end while leaving the
    /// paint grid intact for the results display
    pub fn clear_round_entities(&mut self) {
        self.thrown.clear();
        self.explosions.clear();
        for bomb in &mut self.bombs {
            bomb.reset();
        }
        for player in self.players.values_mut() {
            player.team = None;
            player.has_bomb = false;
            player.input = InputState::default();
            player.pending_inputs.clear();
        }
    }

    pub fn reset_for_round(&mut self) {
        self.colors.reset_white();
        self.clear_round_entities();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::bomb::BOMB_RESPAWN_SECS;
    use crate::game::map::test_maps;
    use crate::util::time::FIXED_DT;

    fn uuid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn press(key: InputKey) -> Vec<InputEvent> {
        vec![InputEvent { key, pressed: true }]
    }

    #[test]
    fn input_sequences_are_acknowledged_in_order() {
        let map = test_maps::arena();
        let mut world = World::new(&map);
        let id = uuid(1);
        world.add_player(id, &map);
        world.activate_player(id, Team::Red, map.spawn_point(Team::Red, 0));

        world.queue_input(id, 1, press(InputKey::Right));
        world.queue_input(id, 2, vec![]);
        world.queue_input(id, 3, press(InputKey::Jump));
        world.step(&map, FIXED_DT);

        assert_eq!(world.players[&id].last_input_seq, 3);
        assert_eq!(world.last_processed_sequences()[&id], 3);

        // Stale and duplicate sequences are dropped
        world.queue_input(id, 2, press(InputKey::Left));
        world.step(&map, FIXED_DT);
        assert_eq!(world.players[&id].last_input_seq, 3);
        assert!(!world.players[&id].input.left);
    }

    #[test]
    fn input_queue_depth_is_bounded() {
        let map = test_maps::arena();
        let mut world = World::new(&map);
        let id = uuid(1);
        world.add_player(id, &map);

        for seq in 0..100u32 {
            world.queue_input(id, seq, vec![]);
        }
        assert!(world.players[&id].pending_inputs.len() <= INPUT_QUEUE_DEPTH);
        // The newest batches survived
        assert_eq!(
            world.players[&id].pending_inputs.back().unwrap().sequence,
            99
        );
    }

    #[test]
    fn grounded_player_paints_blocks_under_foot() {
        let map = test_maps::arena();
        let mut world = World::new(&map);
        let id = uuid(1);
        world.add_player(id, &map);
        // Stand on the floor above cell (9, 2): x center 80
        world.activate_player(id, Team::Red, (80.0, 288.0));
        world.players.get_mut(&id).unwrap().state.on_ground = true;

        world.step(&map, FIXED_DT);

        assert_eq!(world.colors.color_at(9, 2), Some(BlockColor::Red));
        // A cell well out of range stays white
        assert_eq!(world.colors.color_at(9, 11), Some(BlockColor::White));
    }

    #[test]
    fn paint_tie_break_is_deterministic() {
        let map = test_maps::arena();

        let run = || {
            let mut world = World::new(&map);
            let a = uuid(1);
            let b = uuid(2);
            world.add_player(a, &map);
            world.add_player(b, &map);
            // Same standing spot, opposite teams, touching the same cells
            world.activate_player(a, Team::Red, (80.0, 288.0));
            world.activate_player(b, Team::Blue, (80.0, 288.0));
            world.step(&map, FIXED_DT);
            world.colors.color_at(9, 2).unwrap()
        };

        let first = run();
        let second = run();
        assert_eq!(first, second, "same-tick contest must be reproducible");
        // Last writer in key order wins: uuid(2) is Blue
        assert_eq!(first, BlockColor::Blue);
    }

    #[test]
    fn bomb_pickup_and_respawn_cycle() {
        let map = test_maps::arena();
        let mut world = World::new(&map);
        let id = uuid(1);
        world.add_player(id, &map);
        // Bomb spawn cell is (8, 6): center (208, 272). Stand on it.
        world.activate_player(id, Team::Red, (208.0, 288.0));

        world.step(&map, FIXED_DT);
        assert!(world.players[&id].has_bomb);
        assert!(world.bombs[0].collected);

        // A second pass never double-collects
        world.step(&map, FIXED_DT);
        assert!(world.bombs[0].collected);

        // Step past the respawn delay (player holds a bomb, cannot re-take)
        world.players.get_mut(&id).unwrap().has_bomb = true;
        let ticks = (BOMB_RESPAWN_SECS / FIXED_DT) as u32 + 2;
        for _ in 0..ticks {
            world.bombs[0].tick(FIXED_DT);
        }
        assert!(!world.bombs[0].collected);
    }

    #[test]
    fn thrown_bomb_explodes_and_paints() {
        let map = test_maps::arena();
        let mut world = World::new(&map);
        let id = uuid(1);
        world.add_player(id, &map);
        world.activate_player(id, Team::Blue, (80.0, 288.0));
        world.players.get_mut(&id).unwrap().has_bomb = true;

        world.throw_bomb(id, ThrowDir::Right);
        assert_eq!(world.thrown.len(), 1);
        assert!(!world.players[&id].has_bomb);

        // Run until the fuse and the explosion have both played out
        for _ in 0..300 {
            world.step(&map, FIXED_DT);
        }
        assert!(world.thrown.is_empty());
        assert!(world.explosions.is_empty());

        // Some floor cells near the blast carry the thrower's color
        let painted = (0..12)
            .filter(|&col| world.colors.color_at(9, col) == Some(BlockColor::Blue))
            .count();
        assert!(painted > 0, "explosion must paint nearby blocks");
    }

    #[test]
    fn throw_requires_a_held_bomb() {
        let map = test_maps::arena();
        let mut world = World::new(&map);
        let id = uuid(1);
        world.add_player(id, &map);
        world.activate_player(id, Team::Red, (80.0, 288.0));

        world.throw_bomb(id, ThrowDir::Left);
        assert!(world.thrown.is_empty());
    }

    #[test]
    fn reset_for_round_clears_paint_and_teams() {
        let map = test_maps::arena();
        let mut world = World::new(&map);
        let id = uuid(1);
        world.add_player(id, &map);
        world.activate_player(id, Team::Red, (80.0, 288.0));
        world.players.get_mut(&id).unwrap().state.on_ground = true;
        world.step(&map, FIXED_DT);
        assert!(world.colors.score().0 > 0);

        world.reset_for_round();
        assert_eq!(world.colors.score(), (0, 0));
        assert!(world.players[&id].team.is_none());
        // The reset repaints count as changes for the next snapshot
        assert!(world.colors.dirty_len() > 0);
    }
}
