//! Spatial partitioning for area-of-interest broadcasts.
//!
//! The map is sliced into fixed-size square cells; every entity lives in
//! exactly the cell computed from its position. Interest is the square of
//! cells within `CELL_VISIBILITY_OFFSET` of an entity's own cell, so a
//! broadcast touches a bounded neighborhood no matter how crowded the room
//! gets.

use crate::game::object::Position;

pub const CELL_SIZE: f32 = 10.0;
pub const CELL_VISIBILITY_OFFSET: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
}

impl CellCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev adjacency: true when `other` lies inside this cell's
    /// visibility square.
    pub fn sees(&self, other: CellCoord) -> bool {
        (self.x - other.x).abs() <= CELL_VISIBILITY_OFFSET
            && (self.y - other.y).abs() <= CELL_VISIBILITY_OFFSET
    }
}

/// Direction of a visibility change for the multiplex broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitIntent {
    Enter,
    Leave,
}

#[derive(Debug, Default)]
pub struct Cell {
    pub player_ids: Vec<u32>,
    pub object_ids: Vec<u32>,
}

#[derive(Debug)]
pub struct Grid {
    width: i32,
    height: i32,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(map_w: f32, map_h: f32) -> Self {
        let width = (map_w / CELL_SIZE).ceil() as i32 + 1;
        let height = (map_h / CELL_SIZE).ceil() as i32 + 1;
        let mut cells = Vec::with_capacity((width * height) as usize);
        cells.resize_with((width * height) as usize, Cell::default);
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Maps a position to its cell, clamping out-of-range coordinates to
    /// the border cells so every position resolves somewhere.
    pub fn cell_of(&self, pos: Position) -> CellCoord {
        let mut cx = (pos.x / CELL_SIZE).floor() as i32;
        let mut cy = (pos.y / CELL_SIZE).floor() as i32;
        if cx < 0 {
            cx = 0;
        }
        if cx >= self.width {
            cx = self.width - 1;
        }
        if cy < 0 {
            cy = 0;
        }
        if cy >= self.height {
            cy = self.height - 1;
        }
        CellCoord::new(cx, cy)
    }

    fn index(&self, coord: CellCoord) -> usize {
        (coord.y * self.width + coord.x) as usize
    }

    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < self.width && y >= 0 && y < self.height
    }

    pub fn cell(&self, coord: CellCoord) -> &Cell {
        &self.cells[self.index(coord)]
    }

    pub fn add_player(&mut self, id: u32, coord: CellCoord) {
        let idx = self.index(coord);
        self.cells[idx].player_ids.push(id);
    }

    pub fn remove_player(&mut self, id: u32, coord: CellCoord) {
        let idx = self.index(coord);
        self.cells[idx].player_ids.retain(|&p| p != id);
    }

    pub fn add_object(&mut self, id: u32, coord: CellCoord) {
        let idx = self.index(coord);
        self.cells[idx].object_ids.push(id);
    }

    pub fn remove_object(&mut self, id: u32, coord: CellCoord) {
        let idx = self.index(coord);
        self.cells[idx].object_ids.retain(|&o| o != id);
    }

    /// Visits every in-bounds cell of `center`'s visibility square.
    pub fn visit_near<F>(&self, center: CellCoord, mut visit: F)
    where
        F: FnMut(&Cell),
    {
        for y in center.y - CELL_VISIBILITY_OFFSET..=center.y + CELL_VISIBILITY_OFFSET {
            for x in center.x - CELL_VISIBILITY_OFFSET..=center.x + CELL_VISIBILITY_OFFSET {
                if self.in_bounds(x, y) {
                    visit(self.cell(CellCoord::new(x, y)));
                }
            }
        }
    }

    /// Visits cells whose visibility changed when an entity moved from
    /// `old` to `new`: cells only the old square covered get `Leave`,
    /// cells only the new square covers get `Enter`. The overlap is
    /// skipped entirely.
    pub fn visit_visibility_change<F>(&self, old: CellCoord, new: CellCoord, mut visit: F)
    where
        F: FnMut(&Cell, VisitIntent),
    {
        for y in old.y - CELL_VISIBILITY_OFFSET..=old.y + CELL_VISIBILITY_OFFSET {
            for x in old.x - CELL_VISIBILITY_OFFSET..=old.x + CELL_VISIBILITY_OFFSET {
                let coord = CellCoord::new(x, y);
                if self.in_bounds(x, y) && !new.sees(coord) {
                    visit(self.cell(coord), VisitIntent::Leave);
                }
            }
        }
        for y in new.y - CELL_VISIBILITY_OFFSET..=new.y + CELL_VISIBILITY_OFFSET {
            for x in new.x - CELL_VISIBILITY_OFFSET..=new.x + CELL_VISIBILITY_OFFSET {
                let coord = CellCoord::new(x, y);
                if self.in_bounds(x, y) && !old.sees(coord) {
                    visit(self.cell(coord), VisitIntent::Enter);
                }
            }
        }
    }

    /// Visits the cells newly covered by the move (new square minus old
    /// square); the mover learns their contents from these.
    pub fn visit_discovery<F>(&self, old: CellCoord, new: CellCoord, mut visit: F)
    where
        F: FnMut(&Cell),
    {
        for y in new.y - CELL_VISIBILITY_OFFSET..=new.y + CELL_VISIBILITY_OFFSET {
            for x in new.x - CELL_VISIBILITY_OFFSET..=new.x + CELL_VISIBILITY_OFFSET {
                let coord = CellCoord::new(x, y);
                if self.in_bounds(x, y) && !old.sees(coord) {
                    visit(self.cell(coord));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_change(grid: &Grid, old: CellCoord, new: CellCoord) -> Vec<(i32, i32, VisitIntent)> {
        // Re-derive coordinates by tagging each cell with a unique object id.
        let mut out = Vec::new();
        let mut tagged = Grid::new(
            (grid.width() - 1) as f32 * CELL_SIZE,
            (grid.height() - 1) as f32 * CELL_SIZE,
        );
        for y in 0..tagged.height() {
            for x in 0..tagged.width() {
                let id = (y * tagged.width() + x) as u32 + 1;
                tagged.add_object(id, CellCoord::new(x, y));
            }
        }
        tagged.visit_visibility_change(old, new, |cell, intent| {
            let id = cell.object_ids[0] - 1;
            out.push((
                id as i32 % tagged.width(),
                id as i32 / tagged.width(),
                intent,
            ));
        });
        out
    }

    #[test]
    fn cell_of_clamps_to_bounds() {
        let grid = Grid::new(500.0, 500.0);
        assert_eq!(grid.width(), 51);
        assert_eq!(grid.height(), 51);
        assert_eq!(
            grid.cell_of(Position::new(-3.0, -99.0)),
            CellCoord::new(0, 0)
        );
        assert_eq!(
            grid.cell_of(Position::new(9999.0, 500.0)),
            CellCoord::new(50, 50)
        );
        assert_eq!(
            grid.cell_of(Position::new(25.0, 499.9)),
            CellCoord::new(2, 49)
        );
    }

    #[test]
    fn every_position_maps_to_exactly_one_cell() {
        let grid = Grid::new(90.0, 90.0);
        let mut state = 0xfeed_f00d_0123_4567u64;
        for _ in 0..200 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let x = ((state >> 32) as u32 % 900) as f32 / 10.0;
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let y = ((state >> 32) as u32 % 900) as f32 / 10.0;
            let coord = grid.cell_of(Position::new(x, y));
            assert!(coord.x >= 0 && coord.x < grid.width());
            assert!(coord.y >= 0 && coord.y < grid.height());
            // Idempotent: the same position always resolves identically.
            assert_eq!(coord, grid.cell_of(Position::new(x, y)));
        }
    }

    #[test]
    fn membership_moves_between_buckets() {
        let mut grid = Grid::new(90.0, 90.0);
        let old = CellCoord::new(1, 1);
        let new = CellCoord::new(1, 2);
        grid.add_player(42, old);
        assert_eq!(grid.cell(old).player_ids, vec![42]);
        grid.remove_player(42, old);
        grid.add_player(42, new);
        assert!(grid.cell(old).player_ids.is_empty());
        assert_eq!(grid.cell(new).player_ids, vec![42]);
    }

    #[test]
    fn visibility_change_one_step_down() {
        // 10x10 grid, radius 2, move (2,2) -> (2,3): the leave set is row 0
        // of the old square, the enter set is row 5 of the new square.
        let grid = Grid::new(90.0, 90.0);
        assert_eq!(grid.width(), 10);
        let changes = collect_change(&grid, CellCoord::new(2, 2), CellCoord::new(2, 3));
        let leaves: Vec<_> = changes
            .iter()
            .filter(|(_, _, i)| *i == VisitIntent::Leave)
            .map(|&(x, y, _)| (x, y))
            .collect();
        let enters: Vec<_> = changes
            .iter()
            .filter(|(_, _, i)| *i == VisitIntent::Enter)
            .map(|&(x, y, _)| (x, y))
            .collect();
        assert_eq!(leaves, vec![(0, 0), (1, 0), (2, 0), (3, 0), (4, 0)]);
        assert_eq!(enters, vec![(0, 5), (1, 5), (2, 5), (3, 5), (4, 5)]);
    }

    #[test]
    fn visibility_change_partitions_the_symmetric_difference() {
        let grid = Grid::new(90.0, 90.0);
        let old = CellCoord::new(4, 4);
        let new = CellCoord::new(6, 3);
        let changes = collect_change(&grid, old, new);
        for &(x, y, intent) in &changes {
            let coord = CellCoord::new(x, y);
            match intent {
                VisitIntent::Leave => {
                    assert!(old.sees(coord) && !new.sees(coord));
                }
                VisitIntent::Enter => {
                    assert!(new.sees(coord) && !old.sees(coord));
                }
            }
        }
        // Coverage: every cell of the symmetric difference is visited once.
        let mut expected = 0;
        for y in 0..grid.height() {
            for x in 0..grid.width() {
                let coord = CellCoord::new(x, y);
                if old.sees(coord) != new.sees(coord) {
                    expected += 1;
                }
            }
        }
        assert_eq!(changes.len(), expected);
    }

    #[test]
    fn discovery_is_new_minus_old() {
        let grid = Grid::new(90.0, 90.0);
        let old = CellCoord::new(2, 2);
        let new = CellCoord::new(3, 2);
        let mut tagged = Grid::new(90.0, 90.0);
        for y in 0..tagged.height() {
            for x in 0..tagged.width() {
                tagged.add_object((y * tagged.width() + x) as u32 + 1, CellCoord::new(x, y));
            }
        }
        let mut seen = Vec::new();
        tagged.visit_discovery(old, new, |cell| {
            let id = cell.object_ids[0] - 1;
            seen.push(CellCoord::new(
                id as i32 % tagged.width(),
                id as i32 / tagged.width(),
            ));
        });
        for coord in &seen {
            assert!(new.sees(*coord) && !old.sees(*coord));
        }
        // Column x=5, rows 0..=4.
        assert_eq!(seen.len(), 5);
        assert!(seen.iter().all(|c| c.x == 5));
    }
}
