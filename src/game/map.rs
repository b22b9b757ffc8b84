//! Static map geometry loaded once at startup
//!
//! The map is a grid of optionally-empty cells. Each occupied cell holds a
//! solid block or a jump pad. Spawn cells per team and bomb spawn cells are
//! part of the map file. Everything here is immutable after load; mutable
//! paint state lives in the world.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::ws::protocol::Team;

/// Side length of one grid cell in pixels. The character box is one cell.
pub const BLOCK_SIZE: f32 = 32.0;

/// Kind of tile occupying a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    Dirt,
    Stone,
    Grass,
    /// One-way tile: launches characters on downward contact, passable
    /// from below. Occupies 3 cells of width around its logical cell.
    JumpPad,
}

impl TileKind {
    pub fn is_jump_pad(self) -> bool {
        matches!(self, TileKind::JumpPad)
    }
}

/// A solid block in world coordinates
#[derive(Debug, Clone, Copy)]
pub struct Block {
    pub row: u16,
    pub col: u16,
    /// Left edge
    pub x: f32,
    /// Top edge (y grows downward)
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub kind: TileKind,
}

impl Block {
    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Horizontal overlap with a span [min_x, max_x]
    pub fn overlaps_x(&self, min_x: f32, max_x: f32) -> bool {
        self.left() < max_x && self.right() > min_x
    }
}

/// Grid cell reference used for spawns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CellRef {
    pub row: u16,
    pub col: u16,
}

/// On-disk map format
#[derive(Debug, Deserialize)]
struct MapFile {
    cols: u16,
    rows: u16,
    blocks: Vec<(u16, u16, TileKind)>,
    spawns: SpawnsFile,
    #[serde(default)]
    bomb_spawns: Vec<CellRef>,
}

#[derive(Debug, Deserialize)]
struct SpawnsFile {
    red: Vec<CellRef>,
    blue: Vec<CellRef>,
}

/// Immutable map geometry
pub struct Map {
    pub cols: u16,
    pub rows: u16,
    /// Row-major occupancy grid
    grid: Vec<Option<Block>>,
    red_spawns: Vec<CellRef>,
    blue_spawns: Vec<CellRef>,
    bomb_spawns: Vec<CellRef>,
    /// Spawn cells and their neighbours, kept dirty in every snapshot so
    /// clients re-sync spawn-area paint
    spawn_adjacent: BTreeSet<(u16, u16)>,
}

impl Map {
    /// Load a map from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MapError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| MapError::Io(path.as_ref().display().to_string(), e))?;
        Self::from_json_str(&text)
    }

    /// Parse a map from JSON text
    pub fn from_json_str(text: &str) -> Result<Self, MapError> {
        let file: MapFile = serde_json::from_str(text)?;

        let cols = file.cols;
        let rows = file.rows;
        let mut grid: Vec<Option<Block>> = vec![None; cols as usize * rows as usize];

        for (row, col, kind) in file.blocks {
            if row >= rows || col >= cols {
                warn!(row, col, "Skipping out-of-range block");
                continue;
            }
            let width = if kind.is_jump_pad() {
                BLOCK_SIZE * 3.0
            } else {
                BLOCK_SIZE
            };
            let x = if kind.is_jump_pad() {
                (col as f32 - 1.0) * BLOCK_SIZE
            } else {
                col as f32 * BLOCK_SIZE
            };
            grid[row as usize * cols as usize + col as usize] = Some(Block {
                row,
                col,
                x,
                y: row as f32 * BLOCK_SIZE,
                width,
                height: BLOCK_SIZE,
                kind,
            });
        }

        let in_range =
            |c: &CellRef| -> bool {
                let ok = c.row < rows && c.col < cols;
                if !ok {
                    warn!(row = c.row, col = c.col, "Skipping out-of-range cell");
                }
                ok
            };

        let red_spawns: Vec<CellRef> = file.spawns.red.into_iter().filter(in_range).collect();
        let blue_spawns: Vec<CellRef> = file.spawns.blue.into_iter().filter(in_range).collect();
        let bomb_spawns: Vec<CellRef> = file.bomb_spawns.into_iter().filter(in_range).collect();

        if red_spawns.is_empty() {
            return Err(MapError::NoSpawns("red"));
        }
        if blue_spawns.is_empty() {
            return Err(MapError::NoSpawns("blue"));
        }

        let mut spawn_adjacent = BTreeSet::new();
        for spawn in red_spawns.iter().chain(blue_spawns.iter()) {
            for dr in -1i32..=1 {
                for dc in -1i32..=1 {
                    let r = spawn.row as i32 + dr;
                    let c = spawn.col as i32 + dc;
                    if r >= 0 && c >= 0 && (r as u16) < rows && (c as u16) < cols {
                        spawn_adjacent.insert((r as u16, c as u16));
                    }
                }
            }
        }

        Ok(Self {
            cols,
            rows,
            grid,
            red_spawns,
            blue_spawns,
            bomb_spawns,
            spawn_adjacent,
        })
    }

    /// World width in pixels
    pub fn width(&self) -> f32 {
        self.cols as f32 * BLOCK_SIZE
    }

    /// World height in pixels
    pub fn height(&self) -> f32 {
        self.rows as f32 * BLOCK_SIZE
    }

    /// Block at a grid cell, if occupied
    pub fn block_at(&self, row: u16, col: u16) -> Option<&Block> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.grid[row as usize * self.cols as usize + col as usize].as_ref()
    }

    /// All occupied cells in row-major order
    pub fn iter_blocks(&self) -> impl Iterator<Item = &Block> {
        self.grid.iter().filter_map(|b| b.as_ref())
    }

    /// Number of occupied cells
    pub fn block_count(&self) -> usize {
        self.grid.iter().filter(|b| b.is_some()).count()
    }

    /// Topmost block surface at or below `bottom_y - tolerance` under the
    /// horizontal footprint. Returns the block top in world y.
    pub fn ground_below(&self, min_x: f32, max_x: f32, bottom_y: f32, tolerance: f32) -> Option<f32> {
        let mut best: Option<f32> = None;
        for block in self.iter_blocks() {
            if !block.overlaps_x(min_x, max_x) {
                continue;
            }
            let top = block.top();
            if top >= bottom_y - tolerance {
                best = Some(match best {
                    Some(current) if current <= top => current,
                    _ => top,
                });
            }
        }
        best
    }

    /// Whether any jump pad's box contains or directly underlies the
    /// character footprint (used to refuse manual jumps on pads)
    pub fn jump_pad_under(&self, min_x: f32, max_x: f32, bottom_y: f32, tolerance: f32) -> bool {
        self.iter_blocks().any(|b| {
            b.kind.is_jump_pad()
                && b.overlaps_x(min_x, max_x)
                && bottom_y >= b.top() - tolerance
                && bottom_y <= b.bottom() + tolerance
        })
    }

    /// Spawn cells for a team
    pub fn spawns(&self, team: Team) -> &[CellRef] {
        match team {
            Team::Red => &self.red_spawns,
            Team::Blue => &self.blue_spawns,
        }
    }

    /// World-space spawn point (character center x, bottom y) for the
    /// idx-th round-robin spawn of a team
    pub fn spawn_point(&self, team: Team, idx: usize) -> (f32, f32) {
        let cells = self.spawns(team);
        let cell = cells[idx % cells.len()];
        (
            cell.col as f32 * BLOCK_SIZE + BLOCK_SIZE / 2.0,
            (cell.row as f32 + 1.0) * BLOCK_SIZE,
        )
    }

    /// Bomb spawn cells
    pub fn bomb_spawns(&self) -> &[CellRef] {
        &self.bomb_spawns
    }

    /// Whether a cell is in the spawn-adjacent set
    pub fn is_spawn_adjacent(&self, row: u16, col: u16) -> bool {
        self.spawn_adjacent.contains(&(row, col))
    }
}

/// Map loading errors
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Failed to read map file {0}: {1}")]
    Io(String, #[source] std::io::Error),

    #[error("Failed to parse map JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Map has no spawn cells for team {0}")]
    NoSpawns(&'static str),
}

#[cfg(test)]
pub(crate) mod test_maps {
    use super::*;

    /// A small test arena: a full floor on the bottom row, a wall column,
    /// a floating platform, and a jump pad.
    pub fn arena() -> Map {
        let mut blocks = String::new();
        // Floor across row 9
        for col in 0..12 {
            blocks.push_str(&format!("[9,{},\"grass\"],", col));
        }
        // Wall at col 8, rows 6..9
        for row in 6..9 {
            blocks.push_str(&format!("[{},8,\"stone\"],", row));
        }
        // Platform at row 5, cols 2..4
        blocks.push_str("[5,2,\"dirt\"],[5,3,\"dirt\"],");
        // Jump pad at row 8, col 5 (spans cols 4..=6)
        blocks.push_str("[8,5,\"jump_pad\"]");

        let json = format!(
            r#"{{
                "cols": 12, "rows": 10,
                "blocks": [{}],
                "spawns": {{
                    "red": [{{"row": 8, "col": 0}}, {{"row": 8, "col": 1}}],
                    "blue": [{{"row": 8, "col": 10}}, {{"row": 8, "col": 11}}]
                }},
                "bomb_spawns": [{{"row": 8, "col": 6}}]
            }}"#,
            blocks
        );
        Map::from_json_str(&json).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_arena_geometry() {
        let map = test_maps::arena();
        assert_eq!(map.cols, 12);
        assert_eq!(map.rows, 10);
        assert_eq!(map.width(), 384.0);
        assert!(map.block_at(9, 0).is_some());
        assert!(map.block_at(0, 0).is_none());
        assert_eq!(map.spawns(Team::Red).len(), 2);
        assert_eq!(map.bomb_spawns().len(), 1);
    }

    #[test]
    fn jump_pad_spans_three_cells() {
        let map = test_maps::arena();
        let pad = map.block_at(8, 5).unwrap();
        assert!(pad.kind.is_jump_pad());
        assert_eq!(pad.width, BLOCK_SIZE * 3.0);
        assert_eq!(pad.left(), 4.0 * BLOCK_SIZE);
        assert_eq!(pad.right(), 7.0 * BLOCK_SIZE);
    }

    #[test]
    fn skips_out_of_range_entries() {
        let json = r#"{
            "cols": 4, "rows": 4,
            "blocks": [[3,0,"dirt"],[99,99,"dirt"]],
            "spawns": {
                "red": [{"row": 2, "col": 0}],
                "blue": [{"row": 2, "col": 3}, {"row": 50, "col": 50}]
            },
            "bomb_spawns": [{"row": 2, "col": 1}, {"row": 9, "col": 9}]
        }"#;
        let map = Map::from_json_str(json).unwrap();
        assert_eq!(map.block_count(), 1);
        assert_eq!(map.spawns(Team::Blue).len(), 1);
        assert_eq!(map.bomb_spawns().len(), 1);
    }

    #[test]
    fn missing_spawns_is_an_error() {
        let json = r#"{
            "cols": 2, "rows": 2,
            "blocks": [],
            "spawns": { "red": [], "blue": [{"row": 0, "col": 0}] }
        }"#;
        assert!(matches!(
            Map::from_json_str(json),
            Err(MapError::NoSpawns("red"))
        ));
    }

    #[test]
    fn ground_below_finds_topmost_surface() {
        let map = test_maps::arena();
        // Standing above the platform at row 5 (top = 160)
        let ground = map.ground_below(70.0, 90.0, 150.0, 2.0).unwrap();
        assert_eq!(ground, 160.0);
        // Off to the side, only the floor at row 9 (top = 288)
        let ground = map.ground_below(230.0, 250.0, 150.0, 2.0).unwrap();
        assert_eq!(ground, 288.0);
        // Above the jump pad, its surface (top = 256) wins over the floor
        let ground = map.ground_below(150.0, 170.0, 150.0, 2.0).unwrap();
        assert_eq!(ground, 256.0);
    }

    #[test]
    fn spawn_points_round_robin() {
        let map = test_maps::arena();
        let (x0, y0) = map.spawn_point(Team::Red, 0);
        let (x2, _) = map.spawn_point(Team::Red, 2);
        assert_eq!(x0, 16.0);
        assert_eq!(y0, 288.0);
        assert_eq!(x0, x2); // wraps around
        assert!(map.is_spawn_adjacent(8, 0));
        assert!(!map.is_spawn_adjacent(0, 5));
    }
}
