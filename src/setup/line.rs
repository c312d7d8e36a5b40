//! Line setup (spec §4.2.6): expand a segment into a clip-space polygon —
//! a `lineWidth`-wide rectangle under multisampling, or a six-vertex
//! diamond-exit hexagon for thin single-sample lines — clip it against
//! the frustum the same way triangle setup does, then rasterize it as a
//! quad.
//!
//! Grounded on `Device/Renderer.cpp`'s `Renderer::setupLine`: the
//! perpendicular half-width offset is computed per endpoint as
//! `halfWidth * P.w / halfViewportExtent`, which is what lets the offset
//! corners be clipped with the ordinary Sutherland-Hodgman frustum
//! clipper before the perspective divide, exactly like a triangle's
//! vertices.

use super::triangle::{fit_plane, project};
use super::{build_span_table, Primitive, SetupContext};
use crate::clip;
use crate::config::{CLIP_FINITE, MAX_CLIP_DISTANCES, MAX_CULL_DISTANCES, MAX_INTERFACE_COMPONENTS};
use crate::geometry::{PlaneEquation, Vertex};
use crate::polygon::Polygon;
use vek::Vec4;

/// Build the clip-space seed polygon for a line: a rectangle when
/// multisampling (the general case), a six-vertex diamond-exit hexagon
/// otherwise (spec §4.2.6/§9(1) — the diamond-exit rule is the general
/// algorithm for thin lines, not something the open question scopes out;
/// it only leaves the exactly-integer-endpoint tie-break unresolved).
fn line_polygon(ctx: &SetupContext, p0: Vec4<f32>, p1: Vec4<f32>, dx: f32, dy: f32) -> [Vec4<f32>; 8] {
    let half_w = ctx.viewport.width * 0.5;
    let half_h = ctx.viewport.height * 0.5;
    let half_line = ctx.line_width.max(1.0) * 0.5;

    if ctx.sample_count > 1 {
        let scale = half_line / (dx * dx + dy * dy).sqrt();
        let (ox, oy) = (dx * scale, dy * scale);
        let dx0h = ox * p0.w / half_h;
        let dy0w = oy * p0.w / half_w;
        let dx1h = ox * p1.w / half_h;
        let dy1w = oy * p1.w / half_w;

        let rect = [
            Vec4::new(p0.x - dy0w, p0.y + dx0h, p0.z, p0.w),
            Vec4::new(p1.x - dy1w, p1.y + dx1h, p1.z, p1.w),
            Vec4::new(p1.x + dy1w, p1.y - dx1h, p1.z, p1.w),
            Vec4::new(p0.x + dy0w, p0.y - dx0h, p0.z, p0.w),
        ];
        [rect[0], rect[1], rect[2], rect[3], rect[0], rect[1], rect[2], rect[3]]
    } else {
        let dx0 = half_line * p0.w / half_w;
        let dy0 = half_line * p0.w / half_h;
        let dx1 = half_line * p1.w / half_w;
        let dy1 = half_line * p1.w / half_h;

        [
            Vec4::new(p0.x - dx0, p0.y, p0.z, p0.w),
            Vec4::new(p0.x, p0.y + dy0, p0.z, p0.w),
            Vec4::new(p0.x + dx0, p0.y, p0.z, p0.w),
            Vec4::new(p0.x, p0.y - dy0, p0.z, p0.w),
            Vec4::new(p1.x - dx1, p1.y, p1.z, p1.w),
            Vec4::new(p1.x, p1.y + dy1, p1.z, p1.w),
            Vec4::new(p1.x + dx1, p1.y, p1.z, p1.w),
            Vec4::new(p1.x, p1.y - dy1, p1.z, p1.w),
        ]
    }
}

pub fn setup_line(ctx: &SetupContext, v0: &Vertex, v1: &Vertex) -> Option<Primitive> {
    let p0 = v0.position;
    let p1 = v1.position;
    // A line is only fully rejected when both endpoints are behind the
    // eye; a single behind-eye endpoint is handled by near-plane
    // clipping below, same as a triangle straddling the near plane.
    if p0.w <= 0.0 && p1.w <= 0.0 {
        return None;
    }

    let dx = ctx.viewport.width * (p1.x / p1.w - p0.x / p0.w);
    let dy = ctx.viewport.height * (p1.y / p1.w - p0.y / p0.w);
    if dx == 0.0 && dy == 0.0 {
        return None;
    }

    let corners = line_polygon(ctx, p0, p1, dx, dy);
    let seed: &[Vec4<f32>] = if ctx.sample_count > 1 {
        &corners[0..4]
    } else {
        // Diamond-exit: select 6 of the 8 candidate corners (4 around
        // each endpoint) based on which octant the line direction falls
        // into.
        let c = &corners;
        return setup_hexagon(
            ctx,
            v0,
            v1,
            if dx > -dy {
                if dx > dy {
                    [c[0], c[1], c[5], c[6], c[7], c[3]] // right
                } else {
                    [c[0], c[4], c[5], c[6], c[2], c[3]] // down
                }
            } else if dx > dy {
                [c[0], c[1], c[2], c[6], c[7], c[4]] // up
            } else {
                [c[1], c[2], c[3], c[7], c[4], c[5]] // left
            },
        );
    };

    let flags: Vec<u32> = seed.iter().map(clip::clip_flags).collect();
    if flags.iter().any(|f| f & CLIP_FINITE == 0) {
        return None;
    }
    let mask = flags.iter().fold(0, |a, b| a | b);
    let mut poly = Polygon::from_vertices(seed);
    if !clip::clip(&mut poly, mask) {
        return None;
    }

    let (y_min, y_max, outline) = build_span_table(ctx, &poly)?;
    finish(ctx, v0, v1, y_min, y_max, outline)
}

fn setup_hexagon(ctx: &SetupContext, v0: &Vertex, v1: &Vertex, hexagon: [Vec4<f32>; 6]) -> Option<Primitive> {
    let flags: Vec<u32> = hexagon.iter().map(clip::clip_flags).collect();
    if flags.iter().any(|f| f & CLIP_FINITE == 0) {
        return None;
    }
    let mask = flags.iter().fold(0, |a, b| a | b);
    let mut poly = Polygon::from_vertices(&hexagon);
    if !clip::clip(&mut poly, mask) {
        return None;
    }

    let (y_min, y_max, outline) = build_span_table(ctx, &poly)?;
    finish(ctx, v0, v1, y_min, y_max, outline)
}

fn finish(
    ctx: &SetupContext,
    v0: &Vertex,
    v1: &Vertex,
    y_min: i32,
    y_max: i32,
    outline: Vec<crate::geometry::Span>,
) -> Option<Primitive> {
    let s0 = project(ctx, v0);
    let s1 = project(ctx, v1);

    let dx = s1.x_px - s0.x_px;
    let dy = s1.y_px - s0.y_px;
    let len = (dx * dx + dy * dy).sqrt().max(1e-6);
    let half = ctx.line_width.max(1.0) * 0.5;
    let (nx, ny) = (-dy / len * half, dx / len * half);

    // Three non-collinear pixel-space points give the plane fit real
    // area; the attribute basis intentionally uses the original
    // (unclipped) endpoints rather than the clipped polygon, same as
    // triangle setup reuses the original triangle.
    let x = [s0.x_px - nx, s0.x_px + nx, s1.x_px + nx];
    let y = [s0.y_px - ny, s0.y_px + ny, s1.y_px + ny];
    let inv_w = [1.0 / s0.w, 1.0 / s0.w, 1.0 / s1.w];

    let z = fit_plane(x, y, [v0.position.z * inv_w[0], v0.position.z * inv_w[1], v1.position.z * inv_w[2]]);
    let w = fit_plane(x, y, inv_w);

    let interpolant_count = v0.interpolant_count;
    let mut interpolants = [PlaneEquation::ZERO; MAX_INTERFACE_COMPONENTS];
    for i in 0..interpolant_count {
        if ctx.flat_interpolants & (1u128 << i) != 0 {
            interpolants[i] = PlaneEquation::flat(v0.interpolants[i]);
            continue;
        }
        let v = if ctx.config.perspective_correction {
            [v0.interpolants[i] * inv_w[0], v0.interpolants[i] * inv_w[1], v1.interpolants[i] * inv_w[2]]
        } else {
            [v0.interpolants[i], v0.interpolants[i], v1.interpolants[i]]
        };
        interpolants[i] = fit_plane(x, y, v);
    }

    let mut clip_distance = [PlaneEquation::ZERO; MAX_CLIP_DISTANCES];
    for i in 0..MAX_CLIP_DISTANCES {
        let v = [v0.clip_distance[i] * inv_w[0], v0.clip_distance[i] * inv_w[1], v1.clip_distance[i] * inv_w[2]];
        clip_distance[i] = fit_plane(x, y, v);
    }
    let mut cull_distance = [PlaneEquation::ZERO; MAX_CULL_DISTANCES];
    for i in 0..MAX_CULL_DISTANCES {
        let v = [v0.cull_distance[i] * inv_w[0], v0.cull_distance[i] * inv_w[1], v1.cull_distance[i] * inv_w[2]];
        cull_distance[i] = fit_plane(x, y, v);
    }

    Some(Primitive {
        y_min,
        y_max,
        outline,
        v0: v0.clone(),
        v1: v1.clone(),
        v2: v1.clone(),
        z,
        w,
        interpolants,
        interpolant_count,
        clip_distance,
        cull_distance,
        clockwise_mask: !0,
        inv_clockwise_mask: 0,
        depth_bias: 0.0,
        pixel_center: if ctx.config.half_integer_coordinates { 0.5 } else { 0.0 },
        complementary_depth_buffer: ctx.config.complementary_depth_buffer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::setup::{ScissorRect, Viewport};
    use crate::state_key::CullMode;

    fn ctx(config: &PipelineConfig, width: f32, sample_count: u32) -> SetupContext {
        SetupContext {
            viewport: Viewport { x: 0.0, y: 0.0, width: 100.0, height: 100.0, min_depth: 0.0, max_depth: 1.0 },
            scissor: ScissorRect { x0: 0, x1: 100, y0: 0, y1: 100 },
            cull_mode: CullMode::None,
            front_face_ccw: true,
            depth_bias_constant: 0.0,
            depth_bias_slope: 0.0,
            depth_bias_clamp: 0.0,
            depth_is_float: false,
            line_width: width,
            sample_count,
            flat_interpolants: 0,
            config: *config,
        }
    }

    #[test]
    fn wide_horizontal_line_covers_its_width_in_rows() {
        let config = PipelineConfig::default();
        let c = ctx(&config, 3.0, 4);
        let v0 = Vertex::new(Vec4::new(-0.5, 0.0, 0.5, 1.0), 0);
        let v1 = Vertex::new(Vec4::new(0.5, 0.0, 0.5, 1.0), 0);
        let prim = setup_line(&c, &v0, &v1).expect("line should survive setup");
        assert!(prim.y_max - prim.y_min >= 2);
    }

    #[test]
    fn zero_length_segment_is_dropped() {
        let config = PipelineConfig::default();
        let c = ctx(&config, 1.0, 1);
        let v0 = Vertex::new(Vec4::new(0.0, 0.0, 0.5, 1.0), 0);
        let v1 = Vertex::new(Vec4::new(0.0, 0.0, 0.5, 1.0), 0);
        assert!(setup_line(&c, &v0, &v1).is_none());
    }

    #[test]
    fn thin_horizontal_line_takes_the_diamond_exit_path() {
        let config = PipelineConfig::default();
        let c = ctx(&config, 1.0, 1);
        let v0 = Vertex::new(Vec4::new(-0.5, 0.0, 0.5, 1.0), 0);
        let v1 = Vertex::new(Vec4::new(0.5, 0.0, 0.5, 1.0), 0);
        let prim = setup_line(&c, &v0, &v1).expect("thin line should survive setup");
        assert!(prim.y_max > prim.y_min);
    }

    #[test]
    fn line_with_one_endpoint_behind_the_eye_is_clipped_not_dropped() {
        let config = PipelineConfig::default();
        let c = ctx(&config, 3.0, 4);
        let v0 = Vertex::new(Vec4::new(0.0, 0.0, -1.0, -1.0), 0);
        let v1 = Vertex::new(Vec4::new(0.0, 0.0, 0.5, 1.0), 0);
        // Both endpoints aren't behind the eye simultaneously, so this
        // must go through clipping rather than being rejected outright.
        assert!(setup_line(&c, &v0, &v1).is_some());
    }

    #[test]
    fn line_with_both_endpoints_behind_the_eye_is_dropped() {
        let config = PipelineConfig::default();
        let c = ctx(&config, 3.0, 4);
        let v0 = Vertex::new(Vec4::new(0.0, 0.0, -1.0, -1.0), 0);
        let v1 = Vertex::new(Vec4::new(0.1, 0.0, -1.0, -1.0), 0);
        assert!(setup_line(&c, &v0, &v1).is_none());
    }
}
