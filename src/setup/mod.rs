//! Setup: turns a vertex-kernel triangle/line/point plus its clipped
//! polygon into a [`Primitive`] with filled span table and plane
//! equations, ready for the quad rasterizer.
//!
//! Per the "dynamic dispatch of setup" design note, the three setup
//! functions are selected through the [`SetupKind`] enum rather than a
//! function pointer — the scheduler matches on it once per primitive task
//! and the compiler inlines whichever body is chosen.

mod line;
mod point;
mod triangle;

pub use line::setup_line;
pub use point::setup_point;
pub use triangle::setup_triangle;

use crate::config::{MAX_CLIP_DISTANCES, MAX_CULL_DISTANCES, MAX_INTERFACE_COMPONENTS, SUBPIXEL_PRECISION_FACTOR};
use crate::geometry::{PlaneEquation, Span};
use crate::geometry::Vertex;
use crate::state_key::CullMode;

/// Selects which of the three setup routines a primitive task runs, and
/// what `setupPrimitives` in the spec's `DrawCall` stands in for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupKind {
    Point,
    Line,
    Triangle,
}

/// Vulkan-style viewport; setup precomputes the half-extent subpixel
/// constants (`X0xF`, `Y0xF`, `WxF`, `HxF` in the spec) from this once per
/// draw rather than per vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    #[inline]
    fn ndc_to_pixel(&self, ndc_x: f32, ndc_y: f32) -> (f32, f32) {
        let half_w = self.width * 0.5;
        let half_h = self.height * 0.5;
        let px = self.x + half_w + ndc_x * half_w;
        let py = self.y + half_h + ndc_y * half_h;
        (px, py)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScissorRect {
    pub x0: i32,
    pub x1: i32,
    pub y0: i32,
    pub y1: i32,
}

/// Quantise a pixel-space coordinate to the `1/16`th subpixel grid.
/// Snapping an already-snapped coordinate (i.e. `n as f32 / 16.0` for
/// integer `n`) yields `n` back, unchanged.
#[inline]
pub fn snap_to_subpixel(pixel_space: f32) -> i32 {
    (pixel_space * SUBPIXEL_PRECISION_FACTOR as f32).round() as i32
}

/// Per-draw state setup needs but that doesn't belong in a per-vertex or
/// per-primitive struct: viewport/scissor, culling convention, depth bias
/// factors, and which interpolants are flat/perspective-corrected.
///
/// Owns its `PipelineConfig` by value (it is `Copy`) rather than borrowing
/// it: the scheduler keeps a `SetupContext` alive for as long as its
/// `DrawCall` sits in the ring, which can outlive whatever stack frame
/// built the config, so a borrow would force an awkward lifetime
/// parameter through `DrawCall` for no benefit over a cheap copy.
#[derive(Clone, Copy)]
pub struct SetupContext {
    pub viewport: Viewport,
    pub scissor: ScissorRect,
    pub cull_mode: CullMode,
    pub front_face_ccw: bool,
    pub depth_bias_constant: f32,
    pub depth_bias_slope: f32,
    pub depth_bias_clamp: f32,
    pub depth_is_float: bool,
    pub line_width: f32,
    pub sample_count: u32,
    /// Bit `i` set means interpolant `i` is flat-shaded (broadcast from
    /// the provoking vertex rather than plane-interpolated).
    pub flat_interpolants: u128,
    pub config: crate::config::PipelineConfig,
}

/// The triangle-form input to rasterization, per spec §3 Primitive.
#[derive(Clone)]
pub struct Primitive {
    pub y_min: i32,
    pub y_max: i32,
    /// `outline[k]` corresponds to scanline `y_min - 1 + k`; there is one
    /// padding row at each end so quad processing can read `y - 1`/`y + 1`
    /// unconditionally.
    pub outline: Vec<Span>,

    pub v0: Vertex,
    pub v1: Vertex,
    pub v2: Vertex,

    pub z: PlaneEquation,
    pub w: PlaneEquation,
    pub interpolants: [PlaneEquation; MAX_INTERFACE_COMPONENTS],
    pub interpolant_count: usize,
    pub clip_distance: [PlaneEquation; MAX_CLIP_DISTANCES],
    pub cull_distance: [PlaneEquation; MAX_CULL_DISTANCES],

    /// All-ones if the primitive is front-facing (CW/CCW per the
    /// pipeline's convention), else all-zero; `inv_clockwise_mask` is its
    /// complement. Used by two-sided stencil to pick front/back state.
    pub clockwise_mask: u64,
    pub inv_clockwise_mask: u64,

    pub depth_bias: f32,

    /// Sample position within a pixel used to evaluate plane equations:
    /// `0.5` for Vulkan's half-integer pixel centers, `0.0` for the
    /// integer-center convention (`PipelineConfig::half_integer_coordinates`),
    /// captured once at setup time rather than threaded through every
    /// rasterizer call.
    pub pixel_center: f32,
    /// `PipelineConfig::complementary_depth_buffer`, captured at setup time
    /// so the per-fragment state machine doesn't need its own copy of the
    /// device-wide config.
    pub complementary_depth_buffer: bool,
}

impl Primitive {
    #[inline]
    pub fn span(&self, y: i32) -> Span {
        let idx = (y - (self.y_min - 1)) as usize;
        self.outline.get(idx).copied().unwrap_or(Span::EMPTY)
    }
}

/// Project every vertex of a clipped polygon to pixel space, subpixel-snap
/// it, and build the padded span table plus the `[y_min, y_max)` row
/// range. Returns `None` if the (clipped) polygon covers no scanline
/// after the scissor clamp.
///
/// Shared by triangle, line and point setup: all three ultimately walk a
/// convex clip-space polygon's edges the same way, they differ only in
/// how that polygon and its plane-equation basis are built beforehand.
pub(crate) fn build_span_table(ctx: &SetupContext, poly: &crate::polygon::Polygon) -> Option<(i32, i32, Vec<Span>)> {
    let mut screen: Vec<(i32, i32)> = Vec::with_capacity(poly.len());
    for v in poly.vertices() {
        let ndc_x = v.x / v.w;
        let ndc_y = v.y / v.w;
        let (px, py) = ctx.viewport.ndc_to_pixel(ndc_x, ndc_y);
        screen.push((snap_to_subpixel(px), snap_to_subpixel(py)));
    }
    rasterize_outline(ctx, &screen)
}

fn rasterize_outline(ctx: &SetupContext, screen: &[(i32, i32)]) -> Option<(i32, i32, Vec<Span>)> {
    let factor = crate::config::SUBPIXEL_PRECISION_FACTOR;

    // Multisample offsets (spec §4.2.3/§4.3): under multisampling, a
    // sample position can fall inside the primitive's edges even where
    // the pixel center does not, so the outline is built from the
    // extremal x (and y) position across every sample rather than the
    // single pixel-center sample. Single-sampled draws get one offset of
    // `(0, 0)`, which collapses this to the original center-only math.
    let offsets = crate::config::sample_offsets(ctx.sample_count);
    let y_pad = offsets.iter().fold(0.0f32, |m, &(_, oy)| m.max(oy.abs()));
    let y_pad_sub = (y_pad * factor as f32).ceil() as i32;

    let mut y_sub_min = i32::MAX;
    let mut y_sub_max = i32::MIN;
    for &(_, ys) in screen {
        y_sub_min = y_sub_min.min(ys - y_pad_sub);
        y_sub_max = y_sub_max.max(ys + y_pad_sub);
    }

    let mut y_min = y_sub_min.div_euclid(factor);
    let mut y_max = (y_sub_max + factor - 1).div_euclid(factor);
    y_min = y_min.max(ctx.scissor.y0);
    y_max = y_max.min(ctx.scissor.y1);
    if y_min >= y_max {
        return None;
    }

    let rows = (y_max - y_min) as usize;
    let mut outline = vec![Span { left: u16::MAX, right: 0 }; rows + 2];

    // Every edge contributes one x-crossing per scanline row it spans; for
    // a convex polygon exactly two edges cross any given row, and taking
    // the min/max of their x values directly yields the correct left/right
    // bound regardless of which way the polygon winds. This is equivalent
    // to (but simpler than) the original's winding-direction flag `d` that
    // conditionally reverses each edge's endpoint order before classifying
    // it as a left or right edge — here no such classification is needed at
    // all, so there is nothing to get backwards for either winding.
    let n = screen.len();
    for k in 0..n {
        let l = (k + 1) % n;
        let (x0, y0) = screen[k];
        let (x1, y1) = screen[l];
        if y0 == y1 {
            continue;
        }
        let swapped = y0 > y1;
        let (top_x, top_y, bot_x, bot_y) = if swapped { (x1, y1, x0, y0) } else { (x0, y0, x1, y1) };

        let top_row = (top_y - y_pad_sub).div_euclid(factor).max(y_min);
        let bot_row = ((bot_y + y_pad_sub + factor - 1).div_euclid(factor)).min(y_max);

        for row in top_row..bot_row {
            let base_y = row * factor + factor / 2;
            let idx = (row - (y_min - 1)) as usize;
            let span = &mut outline[idx];

            for &(ox, oy) in offsets {
                let sample_y = base_y + (oy * factor as f32).round() as i32;
                let clamped = sample_y.clamp(top_y, bot_y);
                let t = (clamped - top_y) as f32 / (bot_y - top_y) as f32;
                let x_sub = top_x as f32 + t * (bot_x - top_x) as f32;
                let x_px = (x_sub / factor as f32 + ox).round() as i32;
                let x_px = x_px.clamp(ctx.scissor.x0, ctx.scissor.x1);
                let xv = x_px.max(0) as u16;

                span.left = span.left.min(xv);
                span.right = span.right.max(xv);
            }
        }
    }

    for span in outline.iter_mut() {
        if span.left == u16::MAX {
            span.left = 0;
        }
        if span.left > span.right {
            *span = Span::EMPTY;
        }
    }
    outline[0] = Span::EMPTY;
    let last = outline.len() - 1;
    outline[last] = Span::EMPTY;

    Some((y_min, y_max, outline))
}

/// Rotate `(v0, v1, v2)` so that `v0` ends up the vertex with the smallest
/// snapped `y`, ties broken by smallest `w`. Required for the numerical
/// stability of the plane-equation matrix inversion (design note 3).
pub(crate) fn rotate_to_min_y(mut order: [usize; 3], ys: &[i32; 3], ws: &[f32; 3]) -> [usize; 3] {
    let mut best = 0;
    for i in 1..3 {
        let (by, bw) = (ys[order[best]], ws[order[best]]);
        let (y, w) = (ys[order[i]], ws[order[i]]);
        if y < by || (y == by && w < bw) {
            best = i;
        }
    }
    order.rotate_left(best);
    order
}

/// Depth bias per spec §4.2.5.
pub(crate) fn compute_depth_bias(ctx: &SetupContext, z_values: [f32; 3], plane_a: f32, plane_b: f32) -> f32 {
    if ctx.depth_bias_constant == 0.0 && ctx.depth_bias_slope == 0.0 {
        return 0.0;
    }

    let r = if ctx.depth_is_float {
        let max_exp = z_values
            .iter()
            .map(|z| {
                if *z == 0.0 {
                    -126
                } else {
                    z.abs().log2().floor() as i32
                }
            })
            .max()
            .unwrap_or(0);
        2f32.powi(max_exp - 23)
    } else {
        // Fixed-point depth: a pipeline-wide constant resolvable
        // difference. 24-bit unorm depth is the common case.
        1.0 / ((1u32 << 24) as f32)
    };

    let mut bias = r * ctx.depth_bias_constant + plane_a.abs().max(plane_b.abs()) * ctx.depth_bias_slope;

    let clamp = if ctx.depth_bias_clamp.is_nan() {
        // Open question 2: NaN clamp behaves as if the clamp were 0, i.e.
        // disabled.
        0.0
    } else {
        ctx.depth_bias_clamp
    };

    if clamp != 0.0 {
        bias = bias.clamp(clamp.min(0.0), clamp.max(0.0));
    }

    bias
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ctx(sample_count: u32) -> SetupContext {
        SetupContext {
            viewport: Viewport { x: 0.0, y: 0.0, width: 100.0, height: 100.0, min_depth: 0.0, max_depth: 1.0 },
            scissor: ScissorRect { x0: 0, x1: 100, y0: 0, y1: 100 },
            cull_mode: CullMode::None,
            front_face_ccw: true,
            depth_bias_constant: 0.0,
            depth_bias_slope: 0.0,
            depth_bias_clamp: 0.0,
            depth_is_float: false,
            line_width: 1.0,
            sample_count,
            flat_interpolants: 0,
            config: crate::config::PipelineConfig::default(),
        }
    }

    #[test]
    fn multisample_widens_the_outline_relative_to_single_sample() {
        // A narrow quad, in 1/16th-pixel subpixel units, a little over
        // one pixel tall.
        let screen = [(160, 160), (672, 160), (672, 178), (160, 178)];

        let (single_min, single_max, _) = rasterize_outline(&test_ctx(1), &screen).expect("single-sample outline");
        let (multi_min, multi_max, _) = rasterize_outline(&test_ctx(4), &screen).expect("multisample outline");

        assert!(multi_max - multi_min >= single_max - single_min);
        assert!(multi_min <= single_min && multi_max >= single_max);
    }

    #[test]
    fn snap_idempotence() {
        for n in [-1000, -16, -1, 0, 1, 16, 1000] {
            let v = n as f32 / SUBPIXEL_PRECISION_FACTOR as f32;
            assert_eq!(snap_to_subpixel(v), n);
        }
    }

    #[test]
    fn rotate_to_min_y_picks_smallest_y() {
        let order = [0usize, 1, 2];
        let ys = [10, 2, 30];
        let ws = [1.0, 1.0, 1.0];
        let rotated = rotate_to_min_y(order, &ys, &ws);
        assert_eq!(rotated[0], 1);
    }

    #[test]
    fn rotate_to_min_y_breaks_ties_on_w() {
        let order = [0usize, 1, 2];
        let ys = [5, 5, 30];
        let ws = [2.0, 1.0, 1.0];
        let rotated = rotate_to_min_y(order, &ys, &ws);
        assert_eq!(rotated[0], 1);
    }
}
