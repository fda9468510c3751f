//! GridWorld - layered height grid with an incrementally synced surface.
//!
//! A square grid of `segments`×`segments` cells covering `scale` world units
//! starting at `offset`. Every grid has an f32 `height` layer; other layers
//! (tiles, malleability, moisture, ...) are declared at construction or added
//! later, all sharing the same resolution.
//!
//! ## Coordinate systems
//!
//! - world (wx, wy): `f32`, affine to cells via `offset` and `scale`
//! - segment (sx, sy): `i32` cell coordinates, valid in `0..segments`
//! - index: `sy * segments + sx`
//!
//! ## Mesh synchronization
//!
//! A cell's wall quads depend on its four orthogonal neighbors, so editing a
//! cell invalidates its whole 3×3 neighborhood. Setters do this by default
//! (`MeshSync::Auto`). Bulk edits should go through `edit_batch`, which
//! defers invalidation and refreshes each affected cell once on commit.

use crate::error::{Result, SimError};
use crate::ground::GroundHeight;
use crate::layer::{AnyLayer, Layer, LayerElement, LayerKind, LayerSet, LayerSpec};
use crate::mesh::{MeshDirty, SurfaceMesh};
use crate::tiles::{TileKind, TileOverride};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Name of the layer every grid carries.
pub const HEIGHT: &str = "height";

/// Height function sampled once per cell at construction: `(x, y, u, v)`
/// where `u, v` are normalized cell-center coordinates and `x, y` are the
/// same scaled by `scale`. The result is multiplied by `scale`.
pub type HeightFn = Box<dyn Fn(f32, f32, f32, f32) -> f32>;

/// Per-cell color used when writing the mesh.
pub type ColorFn = Box<dyn Fn(&CellSample<'_>) -> [f32; 3] + Send + Sync>;

/// Whether a layer write refreshes the mesh immediately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MeshSync {
    /// Refresh the 3×3 neighborhood of the edited cell.
    #[default]
    Auto,
    /// Leave the mesh stale; the caller refreshes later.
    Deferred,
}

/// What the color function sees for one cell.
pub struct CellSample<'a> {
    pub sx: i32,
    pub sy: i32,
    pub index: usize,
    pub height: f32,
    pub layers: &'a LayerSet,
}

impl CellSample<'_> {
    /// Record of a lookup layer at this cell.
    pub fn tile(&self, layer: &str) -> Option<&TileKind> {
        self.layers.get(layer)?.lookup_index(self.index)
    }

    /// Raw value of any layer at this cell.
    pub fn value(&self, layer: &str) -> Option<f64> {
        self.layers.get(layer)?.value_at(self.index)
    }
}

fn default_color(_: &CellSample<'_>) -> [f32; 3] {
    [1.0, 0.0, 0.5]
}

// ============================================================================
// Builder
// ============================================================================

/// Construction options for a `GridWorld`.
pub struct GridBuilder {
    segments: usize,
    scale: f32,
    offset: [f32; 3],
    height_fn: Option<HeightFn>,
    color_fn: Option<ColorFn>,
    layers: Vec<(String, LayerSpec)>,
    is_ground: bool,
}

impl GridBuilder {
    pub fn scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn offset(mut self, offset: [f32; 3]) -> Self {
        self.offset = offset;
        self
    }

    pub fn height_fn(mut self, f: impl Fn(f32, f32, f32, f32) -> f32 + 'static) -> Self {
        self.height_fn = Some(Box::new(f));
        self
    }

    pub fn color_fn(
        mut self,
        f: impl Fn(&CellSample<'_>) -> [f32; 3] + Send + Sync + 'static,
    ) -> Self {
        self.color_fn = Some(Box::new(f));
        self
    }

    pub fn layer(mut self, name: impl Into<String>, spec: LayerSpec) -> Self {
        self.layers.push((name.into(), spec));
        self
    }

    /// Whether the grid registers itself as a ground provider.
    pub fn ground(mut self, is_ground: bool) -> Self {
        self.is_ground = is_ground;
        self
    }

    pub fn build(self) -> Result<GridWorld> {
        let n = self.segments;
        if n == 0 {
            return Err(SimError::InvalidSegments);
        }

        let mut height = Layer::<f32>::new(HEIGHT, n, n);
        if let Some(f) = &self.height_fn {
            // Single-segment grids would divide by zero.
            let denom = (n.max(2) - 1) as f32;
            let data = height.as_mut_slice();
            for sy in 0..n {
                for sx in 0..n {
                    let u = (sx as f32 + 0.5) / denom;
                    let v = (sy as f32 + 0.5) / denom;
                    data[sy * n + sx] = f(self.scale * u, self.scale * v, u, v) * self.scale;
                }
            }
        }

        let mut grid = GridWorld {
            segments: n,
            scale: self.scale,
            offset: self.offset,
            layers: LayerSet::new(),
            color_fn: self.color_fn.unwrap_or_else(|| Box::new(default_color)),
            mesh: None,
            is_ground: self.is_ground,
        };
        grid.layers.insert(HEIGHT.to_string(), AnyLayer::F32(height));
        for (name, spec) in self.layers {
            grid.add_layer(&name, spec)?;
        }
        Ok(grid)
    }
}

// ============================================================================
// GridWorld
// ============================================================================

/// Square layered grid plus its renderable surface.
pub struct GridWorld {
    segments: usize,
    scale: f32,
    offset: [f32; 3],
    layers: LayerSet,
    color_fn: ColorFn,
    mesh: Option<SurfaceMesh>,
    is_ground: bool,
}

impl fmt::Debug for GridWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridWorld")
            .field("segments", &self.segments)
            .field("scale", &self.scale)
            .field("offset", &self.offset)
            .field("layers", &self.layers.keys().collect::<Vec<_>>())
            .field("mesh_built", &self.mesh.is_some())
            .field("is_ground", &self.is_ground)
            .finish_non_exhaustive()
    }
}

impl GridWorld {
    pub fn builder(segments: usize) -> GridBuilder {
        GridBuilder {
            segments,
            scale: 1.0,
            offset: [0.0; 3],
            height_fn: None,
            color_fn: None,
            layers: Vec::new(),
            is_ground: true,
        }
    }

    /// Flat grid with only the height layer.
    pub fn new(segments: usize, scale: f32) -> Result<Self> {
        Self::builder(segments).scale(scale).build()
    }

    pub fn segments(&self) -> usize {
        self.segments
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn offset(&self) -> [f32; 3] {
        self.offset
    }

    pub fn is_ground(&self) -> bool {
        self.is_ground
    }

    pub fn cell_count(&self) -> usize {
        self.segments * self.segments
    }

    pub fn set_color_fn(
        &mut self,
        f: impl Fn(&CellSample<'_>) -> [f32; 3] + Send + Sync + 'static,
    ) {
        self.color_fn = Box::new(f);
    }

    // ------------------------------------------------------------------------
    // Coordinates
    // ------------------------------------------------------------------------

    /// World → segment. `None` outside the grid.
    pub fn coord_w2s(&self, wx: f32, wy: f32) -> Option<(i32, i32)> {
        let s = self.segments as f32 / self.scale;
        let fx = ((wx - self.offset[0]) * s).floor();
        let fy = ((wy - self.offset[1]) * s).floor();
        if !fx.is_finite() || !fy.is_finite() {
            return None;
        }
        let (sx, sy) = (fx as i32, fy as i32);
        self.coord_valid_s(sx, sy).then_some((sx, sy))
    }

    /// World → linear index. `None` outside the grid.
    pub fn coord_w2i(&self, wx: f32, wy: f32) -> Option<usize> {
        self.coord_w2s(wx, wy).map(|(sx, sy)| self.index_unchecked(sx, sy))
    }

    /// Segment → world, at the cell center. Not range checked.
    pub fn coord_s2w(&self, sx: i32, sy: i32) -> (f32, f32) {
        let n = self.segments as f32;
        let wx = (sx as f32 + 0.5) * self.scale / n + self.offset[0];
        let wy = (sy as f32 + 0.5) * self.scale / n + self.offset[1];
        (wx, wy)
    }

    /// Segment → linear index. `None` outside the grid.
    pub fn coord_s2i(&self, sx: i32, sy: i32) -> Option<usize> {
        self.coord_valid_s(sx, sy)
            .then(|| self.index_unchecked(sx, sy))
    }

    /// Linear index → segment.
    pub fn coord_i2s(&self, index: usize) -> (i32, i32) {
        ((index % self.segments) as i32, (index / self.segments) as i32)
    }

    #[inline]
    pub fn coord_valid_s(&self, sx: i32, sy: i32) -> bool {
        let n = self.segments as i32;
        sx >= 0 && sx < n && sy >= 0 && sy < n
    }

    #[inline]
    fn index_unchecked(&self, sx: i32, sy: i32) -> usize {
        sy as usize * self.segments + sx as usize
    }

    // ------------------------------------------------------------------------
    // Layers
    // ------------------------------------------------------------------------

    /// Declare a new layer with the grid's resolution.
    pub fn add_layer(&mut self, name: &str, spec: LayerSpec) -> Result<()> {
        if self.layers.contains_key(name) {
            tracing::error!(layer = name, "layer declared twice");
            return Err(SimError::DuplicateLayer(name.to_string()));
        }
        let layer = AnyLayer::from_spec(name, self.segments, self.segments, spec)?;
        self.layers.insert(name.to_string(), layer);
        Ok(())
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    pub fn layers(&self) -> &LayerSet {
        &self.layers
    }

    pub fn any_layer(&self, name: &str) -> Result<&AnyLayer> {
        self.layers.get(name).ok_or_else(|| {
            tracing::error!(layer = name, "unknown layer");
            SimError::UnknownLayer(name.to_string())
        })
    }

    pub fn layer<T: LayerElement>(&self, name: &str) -> Result<&Layer<T>> {
        let any = self.any_layer(name)?;
        let found = any.kind();
        T::downcast_ref(any).ok_or_else(|| type_mismatch::<T>(name, found))
    }

    /// Mutable layer access. Writes through it do not touch the mesh.
    pub fn layer_mut<T: LayerElement>(&mut self, name: &str) -> Result<&mut Layer<T>> {
        let any = self.layers.get_mut(name).ok_or_else(|| {
            tracing::error!(layer = name, "unknown layer");
            SimError::UnknownLayer(name.to_string())
        })?;
        let found = any.kind();
        T::downcast_mut(any).ok_or_else(|| type_mismatch::<T>(name, found))
    }

    /// Direct access to a layer's value array.
    pub fn layer_array<T: LayerElement>(&self, name: &str) -> Result<&[T]> {
        self.layer::<T>(name).map(Layer::as_slice)
    }

    pub fn layer_array_mut<T: LayerElement>(&mut self, name: &str) -> Result<&mut [T]> {
        self.layer_mut::<T>(name).map(Layer::as_mut_slice)
    }

    pub fn heights(&self) -> &[f32] {
        height_slice(&self.layers)
    }

    /// Raw height writes; follow with `update_segment_height` or `update_mesh`.
    pub fn heights_mut(&mut self) -> &mut [f32] {
        match self.layers.get_mut(HEIGHT) {
            Some(AnyLayer::F32(l)) => l.as_mut_slice(),
            _ => &mut [],
        }
    }

    pub fn get_layer_sc<T: LayerElement>(&self, name: &str, sx: i32, sy: i32) -> Result<Option<T>> {
        Ok(self.layer::<T>(name)?.get(sx, sy))
    }

    pub fn get_layer_wc<T: LayerElement>(&self, name: &str, wx: f32, wy: f32) -> Result<Option<T>> {
        let layer = self.layer::<T>(name)?;
        Ok(self.coord_w2s(wx, wy).and_then(|(sx, sy)| layer.get(sx, sy)))
    }

    /// Set a cell value. Returns `Ok(false)` when the cell is off-grid.
    pub fn set_layer_sc<T: LayerElement>(
        &mut self,
        name: &str,
        sx: i32,
        sy: i32,
        value: T,
        sync: MeshSync,
    ) -> Result<bool> {
        let written = self.layer_mut::<T>(name)?.set(sx, sy, value);
        if written && sync == MeshSync::Auto {
            self.refresh_neighborhood(sx, sy);
        }
        Ok(written)
    }

    pub fn set_layer_wc<T: LayerElement>(
        &mut self,
        name: &str,
        wx: f32,
        wy: f32,
        value: T,
        sync: MeshSync,
    ) -> Result<bool> {
        // Resolve the layer first so unknown names fail even off-grid.
        self.layer::<T>(name)?;
        match self.coord_w2s(wx, wy) {
            Some((sx, sy)) => self.set_layer_sc(name, sx, sy, value, sync),
            None => Ok(false),
        }
    }

    /// Record of a lookup layer at a cell.
    pub fn lookup_sc(&self, name: &str, sx: i32, sy: i32) -> Result<Option<&TileKind>> {
        let any = self.any_layer(name)?;
        if any.table().is_none() {
            return Err(SimError::MissingLookup(name.to_string()));
        }
        Ok(self.coord_s2i(sx, sy).and_then(|i| any.lookup_index(i)))
    }

    /// Swap a cell's record for a derived variant with `overrides` applied.
    pub fn mutate_sc(
        &mut self,
        name: &str,
        sx: i32,
        sy: i32,
        overrides: &[TileOverride],
        sync: MeshSync,
    ) -> Result<bool> {
        let any = self.layers.get_mut(name).ok_or_else(|| {
            tracing::error!(layer = name, "unknown layer");
            SimError::UnknownLayer(name.to_string())
        })?;
        if any.table().is_none() {
            return Err(SimError::MissingLookup(name.to_string()));
        }
        let changed = match any {
            AnyLayer::U8(l) => l.mutate(sx, sy, overrides),
            AnyLayer::U16(l) => l.mutate(sx, sy, overrides),
            AnyLayer::I16(l) => l.mutate(sx, sy, overrides),
            AnyLayer::F32(l) => l.mutate(sx, sy, overrides),
        };
        if changed && sync == MeshSync::Auto {
            self.refresh_neighborhood(sx, sy);
        }
        Ok(changed)
    }

    // ------------------------------------------------------------------------
    // Mesh
    // ------------------------------------------------------------------------

    pub fn mesh(&self) -> Option<&SurfaceMesh> {
        self.mesh.as_ref()
    }

    /// Build the mesh on first use.
    pub fn ensure_mesh(&mut self) -> &SurfaceMesh {
        let layers = &self.layers;
        let color_fn = &self.color_fn;
        let (segments, scale) = (self.segments, self.scale);
        self.mesh.get_or_insert_with(|| {
            tracing::trace!(segments, "building surface mesh");
            let heights = height_slice(layers);
            let color_at = |cell: usize| color_fn(&sample(layers, heights, segments, cell));
            SurfaceMesh::build(segments, scale, heights, &color_at)
        })
    }

    /// Return and clear the mesh re-upload flags.
    pub fn take_mesh_dirty(&mut self) -> Option<MeshDirty> {
        self.mesh.as_mut().map(SurfaceMesh::take_dirty)
    }

    /// Recompute one cell's quads. No-op off-grid or before the mesh exists.
    pub fn update_segment(&mut self, sx: i32, sy: i32) {
        if !self.coord_valid_s(sx, sy) {
            return;
        }
        let cell = self.index_unchecked(sx, sy);
        let Some(mesh) = self.mesh.as_mut() else {
            return;
        };
        let heights = height_slice(&self.layers);
        let color = (self.color_fn)(&sample(&self.layers, heights, self.segments, cell));
        mesh.write_cell(cell, heights, color);
    }

    /// Height-only fast path for one cell.
    pub fn update_segment_height(&mut self, sx: i32, sy: i32) {
        if !self.coord_valid_s(sx, sy) {
            return;
        }
        let cell = self.index_unchecked(sx, sy);
        if let Some(mesh) = self.mesh.as_mut() {
            mesh.write_cell_heights(cell, height_slice(&self.layers));
        }
    }

    /// Recompute every cell, building the mesh if needed.
    pub fn update_mesh(&mut self) {
        if self.mesh.is_none() {
            self.ensure_mesh();
            return;
        }
        let layers = &self.layers;
        let color_fn = &self.color_fn;
        let segments = self.segments;
        let heights = height_slice(layers);
        let color_at = |cell: usize| color_fn(&sample(layers, heights, segments, cell));
        if let Some(mesh) = self.mesh.as_mut() {
            mesh.rebuild(heights, &color_at);
        }
    }

    fn refresh_neighborhood(&mut self, sx: i32, sy: i32) {
        for y in sy - 1..=sy + 1 {
            for x in sx - 1..=sx + 1 {
                self.update_segment(x, y);
            }
        }
    }

    /// Apply many edits with a single deferred mesh refresh.
    ///
    /// Each cell in the union of the edited cells' 3×3 neighborhoods is
    /// recomputed exactly once when `f` returns.
    pub fn edit_batch<R>(&mut self, f: impl FnOnce(&mut GridBatch<'_>) -> R) -> R {
        let mut batch = GridBatch {
            grid: self,
            dirty: BTreeSet::new(),
        };
        let out = f(&mut batch);
        let dirty = batch.dirty;

        let mut refresh = BTreeSet::new();
        for &(sx, sy) in &dirty {
            for y in sy - 1..=sy + 1 {
                for x in sx - 1..=sx + 1 {
                    if self.coord_valid_s(x, y) {
                        refresh.insert((y, x));
                    }
                }
            }
        }
        for (y, x) in refresh {
            self.update_segment(x, y);
        }
        out
    }

    // ------------------------------------------------------------------------
    // Ground
    // ------------------------------------------------------------------------

    /// Height of the cell under (wx, wy).
    pub fn world_ground_height(&self, wx: f32, wy: f32) -> Option<f32> {
        self.coord_w2i(wx, wy).map(|i| self.heights()[i])
    }
}

fn type_mismatch<T: LayerElement>(name: &str, found: LayerKind) -> SimError {
    tracing::error!(layer = name, ?found, expected = ?T::KIND, "layer type mismatch");
    SimError::LayerTypeMismatch {
        layer: name.to_string(),
        expected: T::KIND,
        found,
    }
}

fn height_slice(layers: &LayerSet) -> &[f32] {
    match layers.get(HEIGHT) {
        Some(AnyLayer::F32(l)) => l.as_slice(),
        _ => &[],
    }
}

fn sample<'a>(
    layers: &'a LayerSet,
    heights: &[f32],
    segments: usize,
    cell: usize,
) -> CellSample<'a> {
    CellSample {
        sx: (cell % segments) as i32,
        sy: (cell / segments) as i32,
        index: cell,
        height: heights.get(cell).copied().unwrap_or(0.0),
        layers,
    }
}

// ============================================================================
// Batch edits
// ============================================================================

/// Edit session that defers mesh refresh until it ends.
pub struct GridBatch<'a> {
    grid: &'a mut GridWorld,
    dirty: BTreeSet<(i32, i32)>,
}

impl GridBatch<'_> {
    pub fn grid(&self) -> &GridWorld {
        &*self.grid
    }

    pub fn set_layer_sc<T: LayerElement>(
        &mut self,
        name: &str,
        sx: i32,
        sy: i32,
        value: T,
    ) -> Result<bool> {
        let written = self.grid.set_layer_sc(name, sx, sy, value, MeshSync::Deferred)?;
        if written {
            self.dirty.insert((sx, sy));
        }
        Ok(written)
    }

    pub fn set_layer_wc<T: LayerElement>(
        &mut self,
        name: &str,
        wx: f32,
        wy: f32,
        value: T,
    ) -> Result<bool> {
        match self.grid.coord_w2s(wx, wy) {
            Some((sx, sy)) => self.set_layer_sc(name, sx, sy, value),
            None => {
                self.grid.layer::<T>(name)?;
                Ok(false)
            }
        }
    }

    pub fn mutate_sc(
        &mut self,
        name: &str,
        sx: i32,
        sy: i32,
        overrides: &[TileOverride],
    ) -> Result<bool> {
        let changed = self.grid.mutate_sc(name, sx, sy, overrides, MeshSync::Deferred)?;
        if changed {
            self.dirty.insert((sx, sy));
        }
        Ok(changed)
    }

    /// Mark a cell edited through other means.
    pub fn mark_dirty(&mut self, sx: i32, sy: i32) {
        if self.grid.coord_valid_s(sx, sy) {
            self.dirty.insert((sx, sy));
        }
    }
}

// ============================================================================
// Shared handle
// ============================================================================

/// Shared ownership of a grid across actors, behaviors and systems.
#[derive(Clone, Debug)]
pub struct GridHandle(pub Arc<RwLock<GridWorld>>);

impl GridHandle {
    pub fn new(grid: GridWorld) -> Self {
        Self(Arc::new(RwLock::new(grid)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, GridWorld> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, GridWorld> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GroundHeight for GridHandle {
    fn ground_height(&self, wx: f32, wy: f32) -> Option<f32> {
        self.read().world_ground_height(wx, wy)
    }
}
