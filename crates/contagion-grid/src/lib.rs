//! Multi-occupancy spatial grid shared across the contagion workspace.
//!
//! Cells hold any number of occupants; the grid tracks a reverse map from
//! occupant key to coordinate so that relocation stays O(occupants-per-cell).
//! Neighborhood queries use Moore adjacency, wrapped modulo the grid extents
//! on a torus and truncated at the edges on a bounded grid.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;

/// Errors emitted by grid operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    /// Indicates construction parameters that cannot be used.
    #[error("invalid grid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Coordinate outside a bounded grid.
    #[error("coordinate ({x}, {y}) is outside the {width}x{height} grid")]
    OutOfBounds { x: u32, y: u32, width: u32, height: u32 },
    /// The occupant was placed twice without an intervening removal.
    #[error("occupant is already placed on the grid")]
    AlreadyPlaced,
    /// The occupant has never been placed (or was removed).
    #[error("occupant is not on the grid")]
    NotPlaced,
}

/// Edge behavior of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Topology {
    /// Coordinates wrap modulo the grid extents.
    #[default]
    Torus,
    /// Coordinates outside `[0,width)×[0,height)` are rejected.
    Bounded,
}

/// Cell coordinate in `[0, width) × [0, height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellCoord {
    pub x: u32,
    pub y: u32,
}

impl CellCoord {
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Bounded 2D grid whose cells hold zero or more occupants.
///
/// Generic over the occupant key so the grid does not depend on any
/// particular agent representation. Invariant: every placed key appears in
/// exactly one cell's occupant list, at the coordinate recorded in the
/// reverse map.
#[derive(Debug, Clone)]
pub struct MultiGrid<K> {
    width: u32,
    height: u32,
    topology: Topology,
    cells: Vec<Vec<K>>,
    positions: HashMap<K, CellCoord>,
}

impl<K: Copy + Eq + Hash> MultiGrid<K> {
    /// Construct an empty grid.
    pub fn new(width: u32, height: u32, topology: Topology) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::InvalidConfig("grid dimensions must be non-zero"));
        }
        let cell_count = (width as usize) * (height as usize);
        Ok(Self {
            width,
            height,
            topology,
            cells: vec![Vec::new(); cell_count],
            positions: HashMap::new(),
        })
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub const fn topology(&self) -> Topology {
        self.topology
    }

    /// Number of occupants currently placed.
    #[must_use]
    pub fn occupant_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    fn offset(&self, coord: CellCoord) -> usize {
        (coord.y as usize) * (self.width as usize) + (coord.x as usize)
    }

    /// Normalize a coordinate: wrap on a torus, reject out-of-range on a
    /// bounded grid.
    fn normalize(&self, coord: CellCoord) -> Result<CellCoord, GridError> {
        match self.topology {
            Topology::Torus => Ok(CellCoord::new(coord.x % self.width, coord.y % self.height)),
            Topology::Bounded => {
                if coord.x < self.width && coord.y < self.height {
                    Ok(coord)
                } else {
                    Err(GridError::OutOfBounds {
                        x: coord.x,
                        y: coord.y,
                        width: self.width,
                        height: self.height,
                    })
                }
            }
        }
    }

    /// Place a new occupant, returning the (possibly wrapped) coordinate it
    /// landed on.
    pub fn place(&mut self, key: K, coord: CellCoord) -> Result<CellCoord, GridError> {
        if self.positions.contains_key(&key) {
            return Err(GridError::AlreadyPlaced);
        }
        let coord = self.normalize(coord)?;
        let offset = self.offset(coord);
        self.cells[offset].push(key);
        self.positions.insert(key, coord);
        Ok(coord)
    }

    /// Move an already-placed occupant, returning the coordinate it landed on.
    pub fn relocate(&mut self, key: K, coord: CellCoord) -> Result<CellCoord, GridError> {
        let coord = self.normalize(coord)?;
        let previous = *self.positions.get(&key).ok_or(GridError::NotPlaced)?;
        let from = self.offset(previous);
        self.cells[from].retain(|other| *other != key);
        let to = self.offset(coord);
        self.cells[to].push(key);
        self.positions.insert(key, coord);
        Ok(coord)
    }

    /// Remove an occupant, returning the cell it vacated.
    pub fn remove(&mut self, key: K) -> Option<CellCoord> {
        let coord = self.positions.remove(&key)?;
        let offset = self.offset(coord);
        self.cells[offset].retain(|other| *other != key);
        Some(coord)
    }

    /// Current coordinate of an occupant, if placed.
    #[must_use]
    pub fn position_of(&self, key: K) -> Option<CellCoord> {
        self.positions.get(&key).copied()
    }

    /// Occupants of one cell. Unknown coordinates yield the empty slice.
    #[must_use]
    pub fn occupants(&self, coord: CellCoord) -> &[K] {
        match self.normalize(coord) {
            Ok(coord) => &self.cells[self.offset(coord)],
            Err(_) => &[],
        }
    }

    /// Moore-adjacent cell coordinates around `coord`.
    ///
    /// Duplicates that arise from wrapping on tiny toroidal grids are
    /// removed, so the result is a set. Empty on a 1×1 bounded grid; callers
    /// treat the empty set as "no move possible", not as an error.
    #[must_use]
    pub fn neighborhood(&self, coord: CellCoord, radius: u32, include_center: bool) -> Vec<CellCoord> {
        let r = radius as i64;
        let width = self.width as i64;
        let height = self.height as i64;
        let mut out = Vec::new();
        for dy in -r..=r {
            for dx in -r..=r {
                if dx == 0 && dy == 0 && !include_center {
                    continue;
                }
                let x = coord.x as i64 + dx;
                let y = coord.y as i64 + dy;
                let candidate = match self.topology {
                    Topology::Torus => {
                        CellCoord::new(x.rem_euclid(width) as u32, y.rem_euclid(height) as u32)
                    }
                    Topology::Bounded => {
                        if x < 0 || y < 0 || x >= width || y >= height {
                            continue;
                        }
                        CellCoord::new(x as u32, y as u32)
                    }
                };
                if !out.contains(&candidate) {
                    out.push(candidate);
                }
            }
        }
        out
    }

    /// Union of occupants over the center cell and its Moore neighborhood.
    ///
    /// Each occupant lives in exactly one cell, so the union is duplicate-free
    /// by construction. The caller is responsible for excluding itself.
    #[must_use]
    pub fn occupants_in_neighborhood(&self, coord: CellCoord, radius: u32) -> Vec<K> {
        let mut out = Vec::new();
        for cell in self.neighborhood(coord, radius, true) {
            out.extend_from_slice(self.occupants(cell));
        }
        out
    }
}
