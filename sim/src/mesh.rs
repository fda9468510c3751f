//! Renderable surface of a height grid.
//!
//! Every cell is drawn as five quads: the top and four vertical walls. A wall
//! spans the sorted pair (min, max) of the cell's height and its orthogonal
//! neighbor's height, so a drop always produces a clean vertical face no
//! matter which side is taller. Off-grid neighbors count as height `0`.
//!
//! ## Buffer layout
//!
//! ```text
//! cell i = sy * segments + sx
//!   positions/normals/colors: [i * 60 .. i * 60 + 60)   5 faces × 4 verts × 3
//!   indices:                  [i * 30 .. i * 30 + 30)   5 faces × 6
//! face order: top, -x, +x, -y, +y
//! ```
//!
//! Buffer sizes are fixed when the mesh is built; edits only overwrite the
//! slots of the cells they touch. Positions are local to the grid; the
//! renderer places the mesh at the grid offset.

use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub const FACES_PER_CELL: usize = 5;
pub const VERTS_PER_FACE: usize = 4;
pub const VERTS_PER_CELL: usize = FACES_PER_CELL * VERTS_PER_FACE;
/// f32 values per cell in each vertex attribute buffer.
pub const FLOATS_PER_CELL: usize = VERTS_PER_CELL * 3;
pub const INDICES_PER_CELL: usize = FACES_PER_CELL * 6;

/// Which height a corner takes.
#[derive(Clone, Copy)]
enum Z {
    Own,
    Low,
    High,
}

struct Face {
    /// Neighbor offset whose height bounds the wall. `None` for the top.
    neighbor: Option<(i32, i32)>,
    normal: [f32; 3],
    shade: f32,
    /// (x1?, y1?, z) per corner.
    corners: [(bool, bool, Z); 4],
}

const FACES: [Face; FACES_PER_CELL] = [
    Face {
        neighbor: None,
        normal: [0.0, 0.0, 1.0],
        shade: 1.0,
        corners: [
            (false, false, Z::Own),
            (true, false, Z::Own),
            (true, true, Z::Own),
            (false, true, Z::Own),
        ],
    },
    Face {
        neighbor: Some((-1, 0)),
        normal: [-1.0, 0.0, 0.0],
        shade: 0.95,
        corners: [
            (false, false, Z::Low),
            (false, false, Z::High),
            (false, true, Z::High),
            (false, true, Z::Low),
        ],
    },
    Face {
        neighbor: Some((1, 0)),
        normal: [1.0, 0.0, 0.0],
        shade: 0.95,
        corners: [
            (true, false, Z::Low),
            (true, true, Z::Low),
            (true, true, Z::High),
            (true, false, Z::High),
        ],
    },
    Face {
        neighbor: Some((0, -1)),
        normal: [0.0, -1.0, 0.0],
        shade: 0.9,
        corners: [
            (false, false, Z::Low),
            (true, false, Z::Low),
            (true, false, Z::High),
            (false, false, Z::High),
        ],
    },
    Face {
        neighbor: Some((0, 1)),
        normal: [0.0, 1.0, 0.0],
        shade: 0.9,
        corners: [
            (false, true, Z::Low),
            (false, true, Z::High),
            (true, true, Z::High),
            (true, true, Z::Low),
        ],
    },
];

/// Attribute buffers the renderer must re-upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshDirty {
    pub positions: bool,
    pub normals: bool,
    pub colors: bool,
    pub indices: bool,
}

impl MeshDirty {
    pub const ALL: Self = Self {
        positions: true,
        normals: true,
        colors: true,
        indices: true,
    };

    pub fn any(&self) -> bool {
        self.positions || self.normals || self.colors || self.indices
    }
}

#[inline]
fn height_at(heights: &[f32], segments: usize, sx: i32, sy: i32) -> f32 {
    let n = segments as i32;
    if sx >= 0 && sx < n && sy >= 0 && sy < n {
        heights[sy as usize * segments + sx as usize]
    } else {
        0.0
    }
}

/// Heights of the four corners of `face` for the cell at (sx, sy).
#[inline]
fn face_heights(face: &Face, heights: &[f32], segments: usize, sx: i32, sy: i32) -> [f32; 4] {
    let own = height_at(heights, segments, sx, sy);
    let (low, high) = match face.neighbor {
        Some((dx, dy)) => {
            let other = height_at(heights, segments, sx + dx, sy + dy);
            if other < own {
                (other, own)
            } else {
                (own, other)
            }
        }
        None => (own, own),
    };
    face.corners.map(|(_, _, z)| match z {
        Z::Own => own,
        Z::Low => low,
        Z::High => high,
    })
}

/// Write all attributes of one cell into its 60-float slots.
#[allow(clippy::too_many_arguments)]
fn write_cell_attrs(
    positions: &mut [f32],
    normals: &mut [f32],
    colors: &mut [f32],
    heights: &[f32],
    segments: usize,
    cell_size: f32,
    cell: usize,
    color: [f32; 3],
) {
    let sx = (cell % segments) as i32;
    let sy = (cell / segments) as i32;
    let x0 = sx as f32 * cell_size;
    let x1 = (sx + 1) as f32 * cell_size;
    let y0 = sy as f32 * cell_size;
    let y1 = (sy + 1) as f32 * cell_size;

    for (f, face) in FACES.iter().enumerate() {
        let zs = face_heights(face, heights, segments, sx, sy);
        let shaded = color.map(|c| c * face.shade);
        for (v, &(right, far, _)) in face.corners.iter().enumerate() {
            let o = (f * VERTS_PER_FACE + v) * 3;
            positions[o] = if right { x1 } else { x0 };
            positions[o + 1] = if far { y1 } else { y0 };
            positions[o + 2] = zs[v];
            normals[o..o + 3].copy_from_slice(&face.normal);
            colors[o..o + 3].copy_from_slice(&shaded);
        }
    }
}

/// Rewrite only the z components of one cell.
fn write_cell_z(positions: &mut [f32], heights: &[f32], segments: usize, cell: usize) {
    let sx = (cell % segments) as i32;
    let sy = (cell / segments) as i32;
    for (f, face) in FACES.iter().enumerate() {
        let zs = face_heights(face, heights, segments, sx, sy);
        for (v, z) in zs.iter().enumerate() {
            positions[(f * VERTS_PER_FACE + v) * 3 + 2] = *z;
        }
    }
}

/// Vertex and index buffers for a `segments`×`segments` height grid.
#[derive(Debug, Clone)]
pub struct SurfaceMesh {
    segments: usize,
    cell_size: f32,
    positions: Vec<f32>,
    normals: Vec<f32>,
    colors: Vec<f32>,
    indices: Vec<u32>,
    dirty: MeshDirty,
}

impl SurfaceMesh {
    /// Allocate the buffers and write every cell.
    pub fn build(
        segments: usize,
        scale: f32,
        heights: &[f32],
        color_at: &(dyn Fn(usize) -> [f32; 3] + Sync),
    ) -> Self {
        let cells = segments * segments;
        let mut indices = vec![0u32; cells * INDICES_PER_CELL];
        for (quad, chunk) in indices.chunks_exact_mut(6).enumerate() {
            let base = (quad * VERTS_PER_FACE) as u32;
            chunk.copy_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        let mut mesh = Self {
            segments,
            cell_size: scale / segments as f32,
            positions: vec![0.0; cells * FLOATS_PER_CELL],
            normals: vec![0.0; cells * FLOATS_PER_CELL],
            colors: vec![0.0; cells * FLOATS_PER_CELL],
            indices,
            dirty: MeshDirty::ALL,
        };
        mesh.rebuild(heights, color_at);
        mesh
    }

    pub fn segments(&self) -> usize {
        self.segments
    }

    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    pub fn normals(&self) -> &[f32] {
        &self.normals
    }

    pub fn colors(&self) -> &[f32] {
        &self.colors
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Position floats belonging to one cell.
    pub fn cell_positions(&self, cell: usize) -> &[f32] {
        let start = cell * FLOATS_PER_CELL;
        &self.positions[start..start + FLOATS_PER_CELL]
    }

    pub fn dirty(&self) -> MeshDirty {
        self.dirty
    }

    /// Return and clear the re-upload flags.
    pub fn take_dirty(&mut self) -> MeshDirty {
        std::mem::take(&mut self.dirty)
    }

    /// Recompute one cell's five quads.
    pub fn write_cell(&mut self, cell: usize, heights: &[f32], color: [f32; 3]) {
        let range = cell * FLOATS_PER_CELL..(cell + 1) * FLOATS_PER_CELL;
        write_cell_attrs(
            &mut self.positions[range.clone()],
            &mut self.normals[range.clone()],
            &mut self.colors[range],
            heights,
            self.segments,
            self.cell_size,
            cell,
            color,
        );
        self.dirty.positions = true;
        self.dirty.normals = true;
        self.dirty.colors = true;
    }

    /// Height-only fast path: rewrites the z of each vertex of one cell.
    pub fn write_cell_heights(&mut self, cell: usize, heights: &[f32]) {
        let start = cell * FLOATS_PER_CELL;
        write_cell_z(
            &mut self.positions[start..start + FLOATS_PER_CELL],
            heights,
            self.segments,
            cell,
        );
        self.dirty.positions = true;
    }

    /// Recompute every cell. The index buffer never changes after `build`.
    pub fn rebuild(&mut self, heights: &[f32], color_at: &(dyn Fn(usize) -> [f32; 3] + Sync)) {
        let segments = self.segments;
        let cell_size = self.cell_size;

        #[cfg(feature = "parallel")]
        {
            self.positions
                .par_chunks_mut(FLOATS_PER_CELL)
                .zip(self.normals.par_chunks_mut(FLOATS_PER_CELL))
                .zip(self.colors.par_chunks_mut(FLOATS_PER_CELL))
                .enumerate()
                .for_each(|(cell, ((p, n), c))| {
                    write_cell_attrs(p, n, c, heights, segments, cell_size, cell, color_at(cell));
                });
        }

        #[cfg(not(feature = "parallel"))]
        {
            for (cell, ((p, n), c)) in self
                .positions
                .chunks_mut(FLOATS_PER_CELL)
                .zip(self.normals.chunks_mut(FLOATS_PER_CELL))
                .zip(self.colors.chunks_mut(FLOATS_PER_CELL))
                .enumerate()
            {
                write_cell_attrs(p, n, c, heights, segments, cell_size, cell, color_at(cell));
            }
        }

        self.dirty.positions = true;
        self.dirty.normals = true;
        self.dirty.colors = true;
    }
}
