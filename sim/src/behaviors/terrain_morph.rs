//! Terrain morphing actors.
//!
//! A `TerrainMorph` drifts across a grid as a brush and reshapes the terrain
//! around its current cell, scaled per cell by the `malleability` layer
//! (1.0 when the grid has no such layer). Two kinds:
//!
//! - `Height`: pick a random smooth target surface, then pull heights within
//!   the brush radius toward it for a few dozen steps
//! - `Average`: blend heights within the radius toward their local average
//!
//! Every edited region is re-synced with `update_segment_height` over the
//! brush radius plus one cell, covering neighbors whose walls changed.

use crate::actor::{Actor, ActorEnv, ActorStates, FrameInfo, Position};
use crate::grid::{GridHandle, GridWorld};
use crate::pathfinder::Cell;
use crate::rng::SharedRng;
use crate::state_machine::{Arg, Routine, StateMap, Step, START_STATE};
use noise::{NoiseFn, Perlin, Seedable};
use rand::Rng;
use std::sync::Arc;

/// Name of the per-cell morph weight layer.
pub const MALLEABILITY: &str = "malleability";

/// Brush radius in cells.
pub const RADIUS: i32 = 32;
/// Multiplier applied to drift target surfaces.
pub const HEIGHT_SCALE: f32 = 512.0;

const MAX_SPEED: f32 = 2.0;
const VELOCITY_JITTER: f32 = 0.25 / 20.0;
/// Height differences below this are left alone.
const DRIFT_EPSILON: f32 = 1e-3;
/// Fraction of the drift applied at the brush edge.
const DRIFT_FLOOR: f32 = 0.01;
const STEP_WAIT: u32 = 2;
/// Distance kept from the grid edge after a bounce.
const EDGE_MARGIN: f32 = 1e-3;

// ============================================================================
// Brush
// ============================================================================

/// Position and velocity in segment units, bounded by `[0, size]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Brush {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
}

impl Brush {
    /// Random position anywhere on the grid, random speed in either direction.
    pub fn reset(&mut self, size: f32, rng: &SharedRng) {
        for axis in 0..2 {
            self.position[axis] = rng.range_f(0.0, size);
            self.velocity[axis] = rng.sign() * rng.range_f(0.2, MAX_SPEED);
        }
    }

    /// Random walk on the velocity, clamped to the maximum speed.
    pub fn jitter(&mut self, rng: &SharedRng) {
        for v in &mut self.velocity {
            *v = (*v + VELOCITY_JITTER * rng.range_f(-1.0, 1.0)).clamp(-MAX_SPEED, MAX_SPEED);
        }
    }

    /// Advance by `dt` seconds, bouncing off the grid edges.
    pub fn integrate(&mut self, dt: f32, size: f32) {
        for axis in 0..2 {
            let p = self.position[axis] + self.velocity[axis] * dt;
            if p < 0.0 {
                self.position[axis] = EDGE_MARGIN;
                self.velocity[axis] = self.velocity[axis].abs();
            } else if p >= size {
                self.position[axis] = size - EDGE_MARGIN;
                self.velocity[axis] = -self.velocity[axis].abs();
            } else {
                self.position[axis] = p;
            }
        }
    }
}

// ============================================================================
// Edits
// ============================================================================

/// Cells of the square of `radius` around `center`, clipped to the grid,
/// with their distance from the center.
fn brush_cells(
    grid: &GridWorld,
    center: Cell,
    radius: i32,
) -> impl Iterator<Item = (i32, i32, usize, f32)> + '_ {
    let n = grid.segments() as i32;
    let (cx, cy) = center;
    let ys = (cy - radius).max(0)..=(cy + radius).min(n - 1);
    ys.flat_map(move |sy| {
        let xs = (cx - radius).max(0)..=(cx + radius).min(n - 1);
        xs.map(move |sx| {
            let (dx, dy) = ((sx - cx) as f32, (sy - cy) as f32);
            (sx, sy, (sy * n + sx) as usize, (dx * dx + dy * dy).sqrt())
        })
    })
}

fn malleability(grid: &GridWorld, index: usize) -> f32 {
    grid.layers()
        .get(MALLEABILITY)
        .and_then(|layer| layer.value_at(index))
        .map_or(1.0, |m| m as f32)
}

fn apply_heights(grid: &mut GridWorld, center: Cell, edits: Vec<(usize, f32)>) {
    let heights = grid.heights_mut();
    for (i, h) in edits {
        heights[i] = h;
    }
    let (cx, cy) = center;
    let r = RADIUS + 1;
    for sy in cy - r..=cy + r {
        for sx in cx - r..=cx + r {
            grid.update_segment_height(sx, sy);
        }
    }
}

/// Smooth random surface the height drift pulls toward.
#[derive(Debug, Clone)]
pub struct DriftTarget {
    noise: Perlin,
    amplitude: f64,
    origin: [f64; 2],
    frequency: f64,
    base: f64,
}

impl DriftTarget {
    pub fn random(rng: &SharedRng, segments: usize) -> Self {
        let seed = rng.with(|r| r.gen::<u32>());
        Self {
            noise: Perlin::new(1).set_seed(seed),
            amplitude: 0.04 * rng.range_f(0.4, 5.0) as f64,
            origin: [
                rng.range_f(-1000.0, 1000.0) as f64,
                rng.range_f(-1000.0, 1000.0) as f64,
            ],
            frequency: 1.0 / (rng.range_f(0.5, 2.0) as f64 * segments as f64),
            base: rng.range_f(0.0, 0.02) as f64,
        }
    }

    /// Flat target at `level`, before `HEIGHT_SCALE`.
    pub fn flat(level: f64) -> Self {
        Self {
            noise: Perlin::new(1),
            amplitude: 0.0,
            origin: [0.0; 2],
            frequency: 0.0,
            base: level,
        }
    }

    /// Target height at world coordinates.
    pub fn height(&self, wx: f32, wy: f32) -> f32 {
        let n = self.noise.get([
            self.origin[0] + wx as f64 * self.frequency,
            self.origin[1] + wy as f64 * self.frequency,
        ]);
        HEIGHT_SCALE * (self.base + self.amplitude * (0.5 + 0.5 * n)) as f32
    }
}

/// One drift step: move heights near `center` toward `target`.
pub fn drift_step(grid: &mut GridWorld, center: Cell, target: &DriftTarget) {
    let max_dist = (2.0 * (RADIUS * RADIUS) as f32).sqrt();
    let heights = grid.heights();
    let mut edits = Vec::new();
    for (sx, sy, i, dist) in brush_cells(grid, center, RADIUS) {
        let (wx, wy) = grid.coord_s2w(sx, sy);
        let mut dz = target.height(wx, wy) - heights[i];
        if dz.abs() < DRIFT_EPSILON {
            continue;
        }
        dz /= 20.0;
        dz *= DRIFT_FLOOR + (1.0 - DRIFT_FLOOR) * (1.0 - dist / max_dist);
        dz *= malleability(grid, i);
        edits.push((i, heights[i] + dz));
    }
    apply_heights(grid, center, edits);
}

/// One smoothing step: blend heights near `center` toward their average.
pub fn smooth_step(grid: &mut GridWorld, center: Cell) {
    let heights = grid.heights();
    let (sum, count) = brush_cells(grid, center, RADIUS)
        .fold((0.0f32, 0usize), |(sum, count), (_, _, i, _)| (sum + heights[i], count + 1));
    if count == 0 {
        return;
    }
    let average = sum / count as f32;

    let radius = RADIUS as f32;
    let edits: Vec<_> = brush_cells(grid, center, RADIUS)
        .map(|(_, _, i, dist)| {
            let a = malleability(grid, i) * 0.25 * (1.0 - (dist / radius).clamp(0.0, 1.0));
            (i, heights[i] * (1.0 - a) + average * a)
        })
        .collect();
    apply_heights(grid, center, edits);
}

// ============================================================================
// Actor
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphKind {
    Height,
    Average,
}

/// Brush actor that reshapes a grid while wandering over it.
pub struct TerrainMorph {
    id: Option<String>,
    kind: MorphKind,
    grid: GridHandle,
    brush: Brush,
    position: Position,
    rng: SharedRng,
}

impl TerrainMorph {
    pub fn new(kind: MorphKind, grid: GridHandle) -> Self {
        Self {
            id: None,
            kind,
            grid,
            brush: Brush::default(),
            position: Position::default(),
            rng: SharedRng::default(),
        }
    }

    pub fn height(grid: GridHandle) -> Self {
        Self::new(MorphKind::Height, grid)
    }

    pub fn average(grid: GridHandle) -> Self {
        Self::new(MorphKind::Average, grid)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn kind(&self) -> MorphKind {
        self.kind
    }

    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    fn sync_position(&mut self) {
        let grid = self.grid.read();
        let s = grid.scale() / grid.segments() as f32;
        let offset = grid.offset();
        self.position.x = offset[0] + self.brush.position[0] * s;
        self.position.y = offset[1] + self.brush.position[1] * s;
    }

    fn size(&self) -> f32 {
        self.grid.read().segments() as f32
    }
}

impl Actor for TerrainMorph {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn position(&self) -> Option<&Position> {
        Some(&self.position)
    }

    fn position_mut(&mut self) -> Option<&mut Position> {
        Some(&mut self.position)
    }

    fn init(&mut self, env: &ActorEnv<'_>) {
        self.rng = env.rng.clone();
        let size = self.size();
        self.brush.reset(size, &self.rng);
        self.sync_position();
    }

    fn behavior(&mut self, _env: &ActorEnv<'_>) -> Option<ActorStates> {
        let grid = self.grid.clone();
        let rng = self.rng.clone();
        Some(match self.kind {
            MorphKind::Height => height_states(grid, rng),
            MorphKind::Average => average_states(grid, rng),
        })
    }

    fn update(&mut self, frame: &FrameInfo) {
        let size = self.size();
        self.brush.jitter(&self.rng);
        self.brush.integrate(frame.dt, size);
        self.sync_position();
    }
}

// ============================================================================
// Routines
// ============================================================================

fn brush_center(grid: &GridHandle, actor: &dyn Actor) -> Option<Cell> {
    let pos = actor.position()?;
    grid.read().coord_w2s(pos.x, pos.y)
}

fn height_states(grid: GridHandle, rng: SharedRng) -> ActorStates {
    let change_grid = grid.clone();
    let change_rng = rng.clone();
    StateMap::new()
        .state(START_STATE, |_| |_: &mut Box<dyn Actor>| Step::goto("changeTerrain"))
        .state("changeTerrain", move |_| ChangeTerrain {
            grid: change_grid.clone(),
            rng: change_rng.clone(),
            waited: false,
        })
        .state("update", move |args: Vec<Arg>| HeightDrift {
            grid: grid.clone(),
            rng: rng.clone(),
            target: args.first().and_then(|a| a.downcast::<DriftTarget>()).cloned(),
            frames_left: None,
        })
}

struct ChangeTerrain {
    grid: GridHandle,
    rng: SharedRng,
    waited: bool,
}

impl Routine<Box<dyn Actor>> for ChangeTerrain {
    fn resume(&mut self, _actor: &mut Box<dyn Actor>) -> Step {
        if !self.waited {
            self.waited = true;
            return Step::Wait(self.rng.range_i(30, 120) as u32);
        }
        let segments = self.grid.read().segments();
        let target = DriftTarget::random(&self.rng, segments);
        Step::goto_with("update", vec![Arg::Any(Arc::new(target))])
    }
}

struct HeightDrift {
    grid: GridHandle,
    rng: SharedRng,
    target: Option<DriftTarget>,
    frames_left: Option<i32>,
}

impl Routine<Box<dyn Actor>> for HeightDrift {
    fn resume(&mut self, actor: &mut Box<dyn Actor>) -> Step {
        let Some(target) = &self.target else {
            tracing::warn!("height drift entered without a target surface");
            return Step::goto("changeTerrain");
        };
        let frames_left = self.frames_left.get_or_insert_with(|| self.rng.range_i(10, 100));
        if *frames_left <= 0 {
            return Step::goto("changeTerrain");
        }
        *frames_left -= 1;

        if let Some(center) = brush_center(&self.grid, &**actor) {
            drift_step(&mut self.grid.write(), center, target);
        }
        Step::Wait(STEP_WAIT)
    }
}

fn average_states(grid: GridHandle, rng: SharedRng) -> ActorStates {
    StateMap::new()
        .state(START_STATE, |_| |_: &mut Box<dyn Actor>| Step::goto("update"))
        .state("update", move |_| Smooth {
            grid: grid.clone(),
            rng: rng.clone(),
            frames_left: None,
            rested: false,
        })
}

struct Smooth {
    grid: GridHandle,
    rng: SharedRng,
    frames_left: Option<i32>,
    rested: bool,
}

impl Routine<Box<dyn Actor>> for Smooth {
    fn resume(&mut self, actor: &mut Box<dyn Actor>) -> Step {
        let frames_left = self.frames_left.get_or_insert_with(|| self.rng.range_i(10, 100));
        if *frames_left <= 0 {
            if self.rested {
                return Step::goto("update");
            }
            self.rested = true;
            return Step::Wait(self.rng.range_i(10, 30) as u32);
        }
        *frames_left -= 1;

        if let Some(center) = brush_center(&self.grid, &**actor) {
            smooth_step(&mut self.grid.write(), center);
        }
        Step::Wait(STEP_WAIT)
    }
}
