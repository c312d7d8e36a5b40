//! Frustum clipping: [`clip_flags`] classifies a clip-space vertex against
//! the six half-spaces, [`clip`] runs Sutherland-Hodgman against whichever
//! of them a triangle's vertices straddle.
//!
//! Grounded on `Device/Clipper.cpp`: NEAR is clipped first (it is by far
//! the most common case, so cutting it first shrinks the polygon before
//! the remaining five passes), and the fixed order afterwards is FAR,
//! LEFT, RIGHT, TOP, BOTTOM. Each later pass is skipped once the polygon
//! degenerates below 3 vertices, since it can only shrink further.

use crate::config::{CLIP_BOTTOM, CLIP_FAR, CLIP_FINITE, CLIP_FRUSTUM, CLIP_LEFT, CLIP_NEAR, CLIP_RIGHT, CLIP_TOP};
use crate::polygon::Polygon;
use vek::Vec4;

/// Classify which of the six frustum half-spaces a clip-space vertex
/// violates, plus the `FINITE` bit.
///
/// `d == 0` is treated as inside for every plane (the `>`/`<` comparisons
/// below are strict), which is what prevents clip-plane passes from
/// emitting a duplicate vertex when an edge lies exactly on a plane.
pub fn clip_flags(v: &Vec4<f32>) -> u32 {
    let finite = v.x.is_finite() && v.y.is_finite() && v.z.is_finite() && v.w.is_finite();
    (if v.x > v.w { CLIP_RIGHT } else { 0 })
        | (if v.y > v.w { CLIP_TOP } else { 0 })
        | (if v.z > v.w { CLIP_FAR } else { 0 })
        | (if v.x < -v.w { CLIP_LEFT } else { 0 })
        | (if v.y < -v.w { CLIP_BOTTOM } else { 0 })
        | (if v.z < 0.0 { CLIP_NEAR } else { 0 })
        | (if finite { CLIP_FINITE } else { 0 })
}

/// Clip `poly` against every plane set in `mask`, in the fixed
/// NEAR/FAR/LEFT/RIGHT/TOP/BOTTOM order. Returns `true` iff at least 3
/// vertices remain (the polygon is non-degenerate).
pub fn clip(poly: &mut Polygon, mask: u32) -> bool {
    if mask & CLIP_FRUSTUM == 0 {
        return poly.len() >= 3;
    }

    if mask & CLIP_NEAR != 0 {
        poly.clip_plane(|v| v.z);
    }
    if poly.len() < 3 {
        return false;
    }

    if mask & CLIP_FAR != 0 {
        poly.clip_plane(|v| v.w - v.z);
    }
    if poly.len() < 3 {
        return false;
    }

    if mask & CLIP_LEFT != 0 {
        poly.clip_plane(|v| v.w + v.x);
    }
    if poly.len() < 3 {
        return false;
    }

    if mask & CLIP_RIGHT != 0 {
        poly.clip_plane(|v| v.w - v.x);
    }
    if poly.len() < 3 {
        return false;
    }

    if mask & CLIP_TOP != 0 {
        poly.clip_plane(|v| v.w - v.y);
    }
    if poly.len() < 3 {
        return false;
    }

    if mask & CLIP_BOTTOM != 0 {
        poly.clip_plane(|v| v.w + v.y);
    }

    poly.len() >= 3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inside_triangle_has_no_clip_flags() {
        let v = Vec4::new(1.0, 1.0, 0.5, 1.0);
        // w == 1, all components within [-w, w] and z within [0, w].
        assert_eq!(clip_flags(&v) & CLIP_FRUSTUM, 0);
    }

    #[test]
    fn straddling_near_plane_flags_near_only() {
        // scenario 2 from the spec: (0,0,2,1), (1,0,-1,1), (0,1,-1,1)
        let v0 = Vec4::new(0.0, 0.0, 2.0, 1.0);
        let v1 = Vec4::new(1.0, 0.0, -1.0, 1.0);
        let v2 = Vec4::new(0.0, 1.0, -1.0, 1.0);
        assert_eq!(clip_flags(&v0) & CLIP_FRUSTUM, 0);
        assert_eq!(clip_flags(&v1) & CLIP_FRUSTUM, CLIP_NEAR);
        assert_eq!(clip_flags(&v2) & CLIP_FRUSTUM, CLIP_NEAR);
    }

    #[test]
    fn clipping_near_plane_yields_quad_with_nonnegative_z() {
        let v0 = Vec4::new(0.0, 0.0, 2.0, 1.0);
        let v1 = Vec4::new(1.0, 0.0, -1.0, 1.0);
        let v2 = Vec4::new(0.0, 1.0, -1.0, 1.0);
        let mask = clip_flags(&v0) | clip_flags(&v1) | clip_flags(&v2);
        let mut poly = Polygon::from_triangle(v0, v1, v2);
        assert!(clip(&mut poly, mask));
        assert_eq!(poly.len(), 4);
        for v in poly.vertices() {
            assert!(v.z >= -1e-5);
        }
    }

    #[test]
    fn fully_outside_triangle_is_discarded() {
        let v0 = Vec4::new(10.0, 0.0, 0.5, 1.0);
        let v1 = Vec4::new(10.0, 0.0, 0.5, 1.0);
        let v2 = Vec4::new(10.0, 0.0, 0.5, 1.0);
        let mask = clip_flags(&v0) | clip_flags(&v1) | clip_flags(&v2);
        let mut poly = Polygon::from_triangle(v0, v1, v2);
        assert!(!clip(&mut poly, mask));
    }

    #[test]
    fn clip_closure_holds_for_every_active_plane() {
        // property from spec 8: output vertices satisfy every plane they
        // were clipped against, to within fp rounding.
        let triangles = [
            (
                Vec4::new(-3.0, 0.0, 0.5, 1.0),
                Vec4::new(3.0, 0.0, 0.5, 1.0),
                Vec4::new(0.0, 3.0, 0.5, 1.0),
            ),
            (
                Vec4::new(0.0, -3.0, -0.5, 1.0),
                Vec4::new(0.0, 3.0, 2.0, 1.0),
                Vec4::new(3.0, 0.0, 0.2, 1.0),
            ),
        ];

        for (v0, v1, v2) in triangles {
            let mask = clip_flags(&v0) | clip_flags(&v1) | clip_flags(&v2);
            let mut poly = Polygon::from_triangle(v0, v1, v2);
            if !clip(&mut poly, mask) {
                continue;
            }
            let eps = 1e-3;
            for v in poly.vertices() {
                if mask & CLIP_NEAR != 0 {
                    assert!(v.z >= -eps);
                }
                if mask & CLIP_FAR != 0 {
                    assert!(v.w - v.z >= -eps);
                }
                if mask & CLIP_LEFT != 0 {
                    assert!(v.w + v.x >= -eps);
                }
                if mask & CLIP_RIGHT != 0 {
                    assert!(v.w - v.x >= -eps);
                }
                if mask & CLIP_TOP != 0 {
                    assert!(v.w - v.y >= -eps);
                }
                if mask & CLIP_BOTTOM != 0 {
                    assert!(v.w + v.y >= -eps);
                }
            }
        }
    }
}
