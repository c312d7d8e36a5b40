//! Plain-old-data geometry types shared by the clipper, setup stage and
//! rasterizer: [`Vertex`], [`PlaneEquation`] and the span table embedded in
//! [`Primitive`].

use crate::config::{MAX_CLIP_DISTANCES, MAX_CULL_DISTANCES, MAX_INTERFACE_COMPONENTS};
use vek::Vec4;

/// The window-space projection of a vertex, filled in by setup once the
/// perspective divide and subpixel snap have been applied.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProjectedVertex {
    /// Subpixel-snapped x, in `SUBPIXEL_PRECISION_FACTOR`ths of a pixel.
    pub x: i32,
    /// Subpixel-snapped y, in `SUBPIXEL_PRECISION_FACTOR`ths of a pixel.
    pub y: i32,
    pub z: f32,
    pub w: f32,
}

/// A single vertex as produced by the (external) vertex kernel and
/// consumed, immutably, by clipping and setup.
///
/// `interpolants` is a dense, fixed-capacity array; only the first
/// `interpolant_count` entries are meaningful for a given pipeline state.
#[derive(Clone, Debug)]
pub struct Vertex {
    pub position: Vec4<f32>,
    pub point_size: f32,
    pub clip_flags: u32,
    pub cull_mask: u32,
    pub clip_distance: [f32; MAX_CLIP_DISTANCES],
    pub cull_distance: [f32; MAX_CULL_DISTANCES],
    pub proj: ProjectedVertex,
    pub interpolants: [f32; MAX_INTERFACE_COMPONENTS],
    pub interpolant_count: usize,
}

impl Vertex {
    pub fn new(position: Vec4<f32>, interpolant_count: usize) -> Self {
        Self {
            position,
            point_size: 1.0,
            clip_flags: 0,
            cull_mask: !0,
            clip_distance: [0.0; MAX_CLIP_DISTANCES],
            cull_distance: [0.0; MAX_CULL_DISTANCES],
            proj: ProjectedVertex::default(),
            interpolants: [0.0; MAX_INTERFACE_COMPONENTS],
            interpolant_count,
        }
    }
}

/// `A*x + B*y + C`, interpolated per fragment in screen space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlaneEquation {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

impl PlaneEquation {
    pub const ZERO: Self = Self { a: 0.0, b: 0.0, c: 0.0 };

    /// A flat (non-interpolated) plane: constant `c` everywhere.
    #[inline]
    pub fn flat(value: f32) -> Self {
        Self { a: 0.0, b: 0.0, c: value }
    }

    #[inline]
    pub fn eval(&self, x: f32, y: f32) -> f32 {
        self.a * x + self.b * y + self.c
    }
}

/// One scanline's horizontal extent, in integer pixel coordinates.
///
/// The rasterizer adds a zero-length span above and below the valid
/// `[yMin, yMax)` range so that quad processing can unconditionally read
/// `y - 1` and `y + 1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Span {
    pub left: u16,
    pub right: u16,
}

impl Span {
    pub const EMPTY: Self = Self { left: 0, right: 0 };

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.left >= self.right
    }
}
