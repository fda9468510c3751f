//! Tile classification records.
//!
//! A tile layer stores one small integer per cell that indexes into a
//! `LookupTable<TileKind>`. Pathfinding reads `walkable` and `walk_cost`
//! from the record; mesh coloring reads `color`.

use crate::lookup::{LookupTable, Record};
use serde::{Deserialize, Serialize};

/// One kind of tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileKind {
    pub name: String,
    pub index: usize,
    pub walkable: bool,
    /// Extra cost of occupying the cell. Filled by `normalize` when unset.
    pub walk_cost: Option<f32>,
    pub color: [f32; 3],
}

impl Default for TileKind {
    fn default() -> Self {
        Self {
            name: String::new(),
            index: 0,
            walkable: true,
            walk_cost: None,
            color: [1.0, 1.0, 1.0],
        }
    }
}

impl TileKind {
    pub fn new(walkable: bool) -> Self {
        Self {
            walkable,
            ..Default::default()
        }
    }

    pub fn with_walk_cost(mut self, cost: f32) -> Self {
        self.walk_cost = Some(cost);
        self
    }

    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }

    /// Default walk cost: free if walkable, infinite otherwise.
    pub fn normalize(&mut self) {
        if self.walk_cost.is_none() {
            self.walk_cost = Some(if self.walkable { 0.0 } else { f32::INFINITY });
        }
    }

    pub fn cost(&self) -> f32 {
        self.walk_cost.unwrap_or(0.0)
    }

    /// Table that normalizes every tile added to it.
    pub fn table() -> LookupTable<TileKind> {
        LookupTable::with_normalizer(TileKind::normalize)
    }
}

/// Field override for tile derivation.
///
/// Float fields are keyed by their bit pattern so that overrides can be
/// hashed and interned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileOverride {
    Walkable(bool),
    WalkCost(u32),
    Color([u32; 3]),
}

impl TileOverride {
    pub fn walk_cost(cost: f32) -> Self {
        Self::WalkCost(cost.to_bits())
    }

    pub fn color(color: [f32; 3]) -> Self {
        Self::Color(color.map(f32::to_bits))
    }
}

impl Record for TileKind {
    type Override = TileOverride;

    fn name(&self) -> &str {
        &self.name
    }

    fn index(&self) -> usize {
        self.index
    }

    fn set_identity(&mut self, name: &str, index: usize) {
        self.name = name.to_string();
        self.index = index;
    }

    fn has_override(&self, value: &TileOverride) -> bool {
        match *value {
            TileOverride::Walkable(w) => self.walkable == w,
            TileOverride::WalkCost(bits) => self.walk_cost.map(f32::to_bits) == Some(bits),
            TileOverride::Color(bits) => self.color.map(f32::to_bits) == bits,
        }
    }

    fn apply_override(&mut self, value: &TileOverride) {
        match *value {
            TileOverride::Walkable(w) => self.walkable = w,
            TileOverride::WalkCost(bits) => self.walk_cost = Some(f32::from_bits(bits)),
            TileOverride::Color(bits) => self.color = bits.map(f32::from_bits),
        }
    }
}
