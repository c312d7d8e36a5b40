//! The quad rasterizer (spec §4.3): walks a primitive's span table two
//! rows at a time, building a 2x2 coverage mask per quad from the
//! left/right span bounds and invoking the per-fragment state machine for
//! every covered pixel.
//!
//! Coverage is computed once per pixel rather than per sample position:
//! the span table records one left/right extent per scanline, not a set
//! of sub-pixel sample points, so a pixel a primitive's outline covers is
//! treated as fully covered for every sample of that pixel. Multisample
//! storage and resolve (`crate::msaa`) still apply to whatever the pixel
//! kernel writes; what this rasterizer does not attempt is sub-pixel
//! edge antialiasing from sample positions that were never computed.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use crate::geometry::Span;
use crate::kernel::{shade_fragment, DynamicState, FragmentInput, FragmentTargets, PixelKernel};
use crate::setup::Primitive;
use crate::state_key::PixelStateKey;

/// Bit `dy * 2 + dx` of the result covers pixel `(x0 + dx, y0 + dy)`.
fn quad_coverage(prim: &Primitive, x0: i32, y0: i32) -> u8 {
    let mut mask = 0u8;
    for dy in 0..2i32 {
        let span = prim.span(y0 + dy);
        if span.is_empty() {
            continue;
        }
        for dx in 0..2i32 {
            let x = x0 + dx;
            if x >= span.left as i32 && x < span.right as i32 {
                mask |= 1 << (dy * 2 + dx);
            }
        }
    }
    mask
}

/// Rasterize `prim` into `targets` for scanlines `[y_start, y_end)`. The
/// caller (the scheduler's pixel task) is responsible for handing out a
/// row range that is a subset of `[prim.y_min, prim.y_max)` and disjoint
/// from every other concurrently running task against the same targets.
#[allow(clippy::too_many_arguments)]
pub fn rasterize_primitive(
    prim: &Primitive,
    key: &PixelStateKey,
    dynamic: &DynamicState,
    kernel: &dyn PixelKernel,
    targets: &FragmentTargets,
    y_start: i32,
    y_end: i32,
    occlusion: Option<&Arc<AtomicU64>>,
) {
    // Quads are always aligned to an even top row so that a primitive
    // split across two row-range tasks produces the same quad boundaries
    // either task would have produced alone.
    let mut y = y_start & !1;
    while y < y_end {
        let row_extent = |dy: i32| -> Span { prim.span(y + dy) };
        let (s0, s1) = (row_extent(0), row_extent(1));
        if s0.is_empty() && s1.is_empty() {
            y += 2;
            continue;
        }

        let left = s0.left.min(s1.left) as i32 & !1;
        let right = s0.right.max(s1.right) as i32;

        let mut x = left;
        while x < right {
            let mask = quad_coverage(prim, x, y);
            if mask != 0 {
                shade_quad(prim, key, dynamic, kernel, targets, x, y, mask, occlusion);
            }
            x += 2;
        }
        y += 2;
    }
}

/// Rasterize the quad-rows of `prim` owned by `cluster` out of
/// `cluster_count` clusters (spec §4.6 "clusters stripe scanlines"):
/// quad-row `q` (rows `[2q, 2q+2)`, counted from `prim.y_min` rounded
/// down to an even row) belongs to cluster `q % cluster_count`. Every
/// cluster scans the same primitive independently and in the same
/// per-cluster order draw calls are submitted in, which is what makes
/// blending into a shared target deterministic without a lock per pixel:
/// no two clusters ever touch the same row.
#[allow(clippy::too_many_arguments)]
pub fn rasterize_primitive_cluster(
    prim: &Primitive,
    key: &PixelStateKey,
    dynamic: &DynamicState,
    kernel: &dyn PixelKernel,
    targets: &FragmentTargets,
    cluster: usize,
    cluster_count: usize,
    occlusion: Option<&Arc<AtomicU64>>,
) {
    let mut y = prim.y_min & !1;
    let mut quad_row = 0usize;
    while y < prim.y_max {
        if quad_row % cluster_count == cluster {
            rasterize_primitive(prim, key, dynamic, kernel, targets, y, y + 2, occlusion);
        }
        y += 2;
        quad_row += 1;
    }
}

#[allow(clippy::too_many_arguments)]
fn shade_quad(
    prim: &Primitive,
    key: &PixelStateKey,
    dynamic: &DynamicState,
    kernel: &dyn PixelKernel,
    targets: &FragmentTargets,
    x0: i32,
    y0: i32,
    mask: u8,
    occlusion: Option<&Arc<AtomicU64>>,
) {
    for dy in 0..2i32 {
        for dx in 0..2i32 {
            let bit = 1 << (dy * 2 + dx);
            if mask & bit == 0 {
                continue;
            }
            let (x, y) = (x0 + dx, y0 + dy);
            if x < 0 || y < 0 {
                continue;
            }

            let (px, py) = (x as f32 + prim.pixel_center, y as f32 + prim.pixel_center);
            let w = prim.w.eval(px, py);
            let inv_w = if w.abs() > 1e-20 { 1.0 / w } else { 0.0 };

            let offsets = crate::config::sample_offsets(key.sample_count);
            let sample_count = offsets.len();
            let mut depth_samples = [0.0f32; crate::config::MAX_SAMPLES];
            for (s, &(ox, oy)) in offsets.iter().enumerate() {
                depth_samples[s] = prim.z.eval(px + ox, py + oy);
            }

            let mut interpolants = [0.0f32; crate::config::MAX_INTERFACE_COMPONENTS];
            for i in 0..prim.interpolant_count {
                let raw = prim.interpolants[i].eval(px, py);
                interpolants[i] = raw * inv_w;
            }

            let front_facing = prim.clockwise_mask != 0;
            let input = FragmentInput {
                x,
                y,
                depth_samples,
                sample_count,
                interpolants: &interpolants[..prim.interpolant_count],
                front_facing,
                primitive: prim,
            };

            shade_fragment(key, dynamic, kernel, targets, [x as usize, y as usize], input, occlusion);
        }
    }
}
