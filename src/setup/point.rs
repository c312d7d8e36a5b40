//! Point setup (spec §4.2.6): expand a point into a clip-space square
//! sprite of side `pointSize` (clamped to `MAX_POINT_SIZE`), clip it like
//! any other primitive, then rasterize it as a quad. Every attribute is
//! flat across the sprite: there is only one source vertex, so there is
//! nothing to interpolate.
//!
//! Grounded on `Device/Renderer.cpp`'s `Renderer::setupPoint`: the
//! half-size offset is scaled by the vertex's own `w` and the viewport
//! half-extent, the same clip-space trick line setup uses.

use super::triangle::{fit_plane, project};
use super::{build_span_table, Primitive, SetupContext};
use crate::clip;
use crate::config::{CLIP_FINITE, MAX_CLIP_DISTANCES, MAX_CULL_DISTANCES, MAX_INTERFACE_COMPONENTS};
use crate::geometry::{PlaneEquation, Vertex};
use crate::polygon::Polygon;
use vek::Vec4;

pub fn setup_point(ctx: &SetupContext, v0: &Vertex) -> Option<Primitive> {
    let p = v0.position;
    if p.w <= 0.0 {
        return None;
    }

    let size = v0.point_size.clamp(1.0, crate::config::MAX_POINT_SIZE);
    let half_size = size * 0.5;
    let half_w = ctx.viewport.width * 0.5;
    let half_h = ctx.viewport.height * 0.5;
    let dx = half_size * p.w / half_w;
    let dy = half_size * p.w / half_h;

    let corners = [
        Vec4::new(p.x - dx, p.y + dy, p.z, p.w),
        Vec4::new(p.x + dx, p.y + dy, p.z, p.w),
        Vec4::new(p.x + dx, p.y - dy, p.z, p.w),
        Vec4::new(p.x - dx, p.y - dy, p.z, p.w),
    ];

    let flags: Vec<u32> = corners.iter().map(clip::clip_flags).collect();
    if flags.iter().any(|f| f & CLIP_FINITE == 0) {
        return None;
    }
    let mask = flags.iter().fold(0, |a, b| a | b);
    let mut poly = Polygon::from_vertices(&corners);
    if !clip::clip(&mut poly, mask) {
        return None;
    }

    let (y_min, y_max, outline) = build_span_table(ctx, &poly)?;

    let s0 = project(ctx, v0);
    let half = size * 0.5;

    // Three non-collinear corners are enough to fit a (necessarily flat,
    // since all three share the same source value) plane; the basis
    // reuses the original unclipped sprite square, same as line setup.
    let px = [s0.x_px - half, s0.x_px + half, s0.x_px + half];
    let py = [s0.y_px - half, s0.y_px - half, s0.y_px + half];

    let inv_w = 1.0 / s0.w;
    let z = fit_plane(px, py, [v0.position.z * inv_w; 3]);
    let w = fit_plane(px, py, [inv_w; 3]);

    let mut interpolants = [PlaneEquation::ZERO; MAX_INTERFACE_COMPONENTS];
    for i in 0..v0.interpolant_count {
        interpolants[i] = PlaneEquation::flat(v0.interpolants[i]);
    }

    let mut clip_distance = [PlaneEquation::ZERO; MAX_CLIP_DISTANCES];
    for i in 0..MAX_CLIP_DISTANCES {
        clip_distance[i] = PlaneEquation::flat(v0.clip_distance[i]);
    }
    let mut cull_distance = [PlaneEquation::ZERO; MAX_CULL_DISTANCES];
    for i in 0..MAX_CULL_DISTANCES {
        cull_distance[i] = PlaneEquation::flat(v0.cull_distance[i]);
    }

    Some(Primitive {
        y_min,
        y_max,
        outline,
        v0: v0.clone(),
        v1: v0.clone(),
        v2: v0.clone(),
        z,
        w,
        interpolants,
        interpolant_count: v0.interpolant_count,
        clip_distance,
        cull_distance,
        clockwise_mask: !0,
        inv_clockwise_mask: 0,
        depth_bias: 0.0,
        pixel_center: if ctx.config.half_integer_coordinates { 0.5 } else { 0.0 },
        complementary_depth_buffer: ctx.config.complementary_depth_buffer,
    })
}
