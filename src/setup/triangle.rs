//! Triangle setup (spec §4.2): clip, cull, subpixel-snap, build the span
//! table and the plane equations the quad rasterizer and pixel kernel
//! read back from.

use super::{build_span_table, compute_depth_bias, rotate_to_min_y, snap_to_subpixel, Primitive, SetupContext};
use crate::clip;
use crate::config::{MAX_CLIP_DISTANCES, MAX_CULL_DISTANCES, MAX_INTERFACE_COMPONENTS};
use crate::geometry::{PlaneEquation, Vertex};
use crate::polygon::Polygon;
use crate::state_key::CullMode;

/// Solve `A*x + B*y + C == v` for the three given points and return the
/// plane equation. `denom == 0` (a degenerate, zero-area triangle) yields
/// the flat plane at `v[0]`: such triangles are culled before this is
/// reached in the normal path, but setup for lines/points reuses this
/// helper against synthetic quads that can be degenerate in one axis.
pub(super) fn fit_plane(x: [f32; 3], y: [f32; 3], v: [f32; 3]) -> PlaneEquation {
    let dx1 = x[1] - x[0];
    let dx2 = x[2] - x[0];
    let dy1 = y[1] - y[0];
    let dy2 = y[2] - y[0];
    let denom = dx1 * dy2 - dx2 * dy1;

    if denom.abs() < 1e-12 {
        return PlaneEquation::flat(v[0]);
    }

    let dv1 = v[1] - v[0];
    let dv2 = v[2] - v[0];

    let a = (dv1 * dy2 - dv2 * dy1) / denom;
    let b = (dx1 * dv2 - dx2 * dv1) / denom;
    let c = v[0] - a * x[0] - b * y[0];

    PlaneEquation { a, b, c }
}

pub(super) struct ScreenVertex {
    pub x_px: f32,
    pub y_px: f32,
    pub x_sub: i32,
    pub y_sub: i32,
    pub w: f32,
}

pub(super) fn project(ctx: &SetupContext, v: &Vertex) -> ScreenVertex {
    let ndc_x = v.position.x / v.position.w;
    let ndc_y = v.position.y / v.position.w;
    let (x_px, y_px) = ctx.viewport.ndc_to_pixel(ndc_x, ndc_y);
    ScreenVertex { x_px, y_px, x_sub: snap_to_subpixel(x_px), y_sub: snap_to_subpixel(y_px), w: v.position.w }
}

/// Run clipping, culling, subpixel snap and span-table construction for a
/// single triangle. Returns `None` if the triangle is fully clipped,
/// degenerate, or culled.
pub fn setup_triangle(ctx: &SetupContext, v0: &Vertex, v1: &Vertex, v2: &Vertex, clip_mask: u32) -> Option<Primitive> {
    let mut poly = Polygon::from_triangle(v0.position, v1.position, v2.position);
    if !clip::clip(&mut poly, clip_mask) {
        return None;
    }

    let s0 = project(ctx, v0);
    let s1 = project(ctx, v1);
    let s2 = project(ctx, v2);

    // Signed area in pixel space (shoelace over v0,v2,v1, so a
    // CCW-wound triangle yields a negative value); odd number of
    // negative w's flips its sign back to the pre-divide orientation
    // (spec §4.2.1).
    let mut area = (s1.x_px * s0.y_px - s0.x_px * s1.y_px)
        + (s2.x_px * s1.y_px - s1.x_px * s2.y_px)
        + (s0.x_px * s2.y_px - s2.x_px * s0.y_px);
    let negative_ws = [v0.position.w, v1.position.w, v2.position.w].iter().filter(|w| **w < 0.0).count();
    if negative_ws % 2 == 1 {
        area = -area;
    }

    if area == 0.0 {
        return None;
    }
    let front_facing = if ctx.front_face_ccw { area > 0.0 } else { area < 0.0 };

    let culled = match ctx.cull_mode {
        CullMode::None => false,
        CullMode::Front => front_facing,
        CullMode::Back => !front_facing,
        CullMode::FrontAndBack => true,
    };
    if culled {
        return None;
    }

    let (y_min, y_max, outline) = build_span_table(ctx, &poly)?;

    // Rotate the three *original* vertices (not the clipped polygon) so
    // v0 has the smallest snapped y, breaking ties on w, for the
    // numerical stability of the plane fit below.
    let ys = [s0.y_sub, s1.y_sub, s2.y_sub];
    let ws = [v0.position.w, v1.position.w, v2.position.w];
    let order = rotate_to_min_y([0, 1, 2], &ys, &ws);
    let verts = [v0, v1, v2];
    let screens = [&s0, &s1, &s2];
    let (rv0, rv1, rv2) = (verts[order[0]], verts[order[1]], verts[order[2]]);
    let (rs0, rs1, rs2) = (screens[order[0]], screens[order[1]], screens[order[2]]);

    let x = [rs0.x_px, rs1.x_px, rs2.x_px];
    let y = [rs0.y_px, rs1.y_px, rs2.y_px];
    let inv_w = [1.0 / rs0.w, 1.0 / rs1.w, 1.0 / rs2.w];

    let z_ndc = [rv0.position.z * inv_w[0], rv1.position.z * inv_w[1], rv2.position.z * inv_w[2]];
    let z = fit_plane(x, y, z_ndc);
    let w = fit_plane(x, y, inv_w);

    let interpolant_count = rv0.interpolant_count;
    let mut interpolants = [PlaneEquation::ZERO; MAX_INTERFACE_COMPONENTS];
    for i in 0..interpolant_count {
        if ctx.flat_interpolants & (1u128 << i) != 0 {
            interpolants[i] = PlaneEquation::flat(rv0.interpolants[i]);
            continue;
        }
        let v = if ctx.config.perspective_correction {
            [
                rv0.interpolants[i] * inv_w[0],
                rv1.interpolants[i] * inv_w[1],
                rv2.interpolants[i] * inv_w[2],
            ]
        } else {
            [rv0.interpolants[i], rv1.interpolants[i], rv2.interpolants[i]]
        };
        interpolants[i] = fit_plane(x, y, v);
    }

    let mut clip_distance = [PlaneEquation::ZERO; MAX_CLIP_DISTANCES];
    for i in 0..MAX_CLIP_DISTANCES {
        let v = [rv0.clip_distance[i] * inv_w[0], rv1.clip_distance[i] * inv_w[1], rv2.clip_distance[i] * inv_w[2]];
        clip_distance[i] = fit_plane(x, y, v);
    }
    let mut cull_distance = [PlaneEquation::ZERO; MAX_CULL_DISTANCES];
    for i in 0..MAX_CULL_DISTANCES {
        let v = [rv0.cull_distance[i] * inv_w[0], rv1.cull_distance[i] * inv_w[1], rv2.cull_distance[i] * inv_w[2]];
        cull_distance[i] = fit_plane(x, y, v);
    }

    let depth_bias = compute_depth_bias(ctx, z_ndc, z.a, z.b);

    let clockwise_mask: u64 = if front_facing { !0 } else { 0 };

    Some(Primitive {
        y_min,
        y_max,
        outline,
        v0: rv0.clone(),
        v1: rv1.clone(),
        v2: rv2.clone(),
        z,
        w,
        interpolants,
        interpolant_count,
        clip_distance,
        cull_distance,
        clockwise_mask,
        inv_clockwise_mask: !clockwise_mask,
        depth_bias,
        pixel_center: if ctx.config.half_integer_coordinates { 0.5 } else { 0.0 },
        complementary_depth_buffer: ctx.config.complementary_depth_buffer,
    })
}
