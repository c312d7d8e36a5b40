//! The clip-scratch [`Polygon`]: a fixed-capacity ring of clipped-vertex
//! arrays plus a scratch buffer of interpolated vertices, grounded on
//! SwiftShader's `Renderer/Polygon.hpp`.
//!
//! Only the clip-space *position* is ever interpolated during clipping —
//! the spec calls this out explicitly ("All interpolation is performed on
//! the full 4D clip-space vertex so that subsequent interpolants are
//! correctly reconstructed by setup"): setup later reconstructs every
//! other attribute from the plane equations it builds out of the
//! triangle's three original vertices, so there is no need to interpolate
//! 128-wide interpolant arrays per clipped vertex here.

use vek::Vec4;

/// Maximum number of vertices a clipped triangle can have: a convex
/// polygon gains at most one vertex per plane it is clipped against, and
/// there are six frustum planes.
pub const MAX_CLIPPED_VERTICES: usize = 16;

/// Fixed-capacity clip scratch. Clipping ping-pongs between `p[i]`
/// (input) and `p[i + 1]` (output); `b` is fully owned by this polygon, so
/// the clipper never allocates.
pub struct Polygon {
    /// Up to [`MAX_CLIPPED_VERTICES`] successive vertex-index arrays; ring
    /// depth matches the six frustum planes plus one for the initial
    /// triangle.
    p: [[usize; MAX_CLIPPED_VERTICES]; 8],
    /// Scratch buffer of vertices synthesized by clipping (original
    /// vertices plus every interpolated one).
    b: [Vec4<f32>; MAX_CLIPPED_VERTICES + 3],
    /// Number of vertices in the currently active array.
    n: usize,
    /// Index of the currently active array within `p`.
    i: usize,
    /// Next free slot in `b`.
    next_free: usize,
}

impl Polygon {
    /// Seed the polygon with an (unclipped) triangle.
    pub fn from_triangle(v0: Vec4<f32>, v1: Vec4<f32>, v2: Vec4<f32>) -> Self {
        Self::from_vertices(&[v0, v1, v2])
    }

    /// Seed the polygon with an arbitrary convex fan, e.g. the
    /// rectangle/hexagon a wide line or a point sprite expands to before
    /// clipping. `vertices.len()` must leave enough headroom in `b` for
    /// clipping against every plane it will be clipped against (six
    /// planes at most), which holds for any seed of up to
    /// `MAX_CLIPPED_VERTICES - 6` vertices.
    pub fn from_vertices(vertices: &[Vec4<f32>]) -> Self {
        let mut b = [Vec4::zero(); MAX_CLIPPED_VERTICES + 3];
        let mut p = [[0usize; MAX_CLIPPED_VERTICES]; 8];
        for (k, v) in vertices.iter().enumerate() {
            b[k] = *v;
            p[0][k] = k;
        }

        Self { p, b, n: vertices.len(), i: 0, next_free: vertices.len() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// The currently active vertex list, as clip-space positions.
    pub fn vertices(&self) -> impl Iterator<Item = Vec4<f32>> + '_ {
        self.p[self.i][..self.n].iter().map(move |&idx| self.b[idx])
    }

    pub fn vertex(&self, k: usize) -> Vec4<f32> {
        self.b[self.p[self.i][k]]
    }

    /// Run one clipping pass for a single plane's signed-distance
    /// function `dist`. Returns the new vertex count.
    pub(crate) fn clip_plane(&mut self, mut dist: impl FnMut(&Vec4<f32>) -> f32) -> usize {
        let input = self.p[self.i];
        let n = self.n;
        let mut t = 0usize;
        let mut output = [0usize; MAX_CLIPPED_VERTICES];

        for k in 0..n {
            let l = if k + 1 == n { 0 } else { k + 1 };
            let vi = self.b[input[k]];
            let vj = self.b[input[l]];
            let di = dist(&vi);
            let dj = dist(&vj);

            if di >= 0.0 {
                output[t] = input[k];
                t += 1;
                if dj < 0.0 {
                    output[t] = self.emit_interpolated(vi, vj, di, dj);
                    t += 1;
                }
            } else if dj > 0.0 {
                output[t] = self.emit_interpolated(vj, vi, dj, di);
                t += 1;
            }
        }

        self.i += 1;
        self.p[self.i] = output;
        self.n = t;
        t
    }

    fn emit_interpolated(&mut self, vi: Vec4<f32>, vj: Vec4<f32>, di: f32, dj: f32) -> usize {
        let d = 1.0 / (dj - di);
        let v = (vi * dj - vj * di) * d;
        let idx = self.next_free;
        self.b[idx] = v;
        self.next_free += 1;
        idx
    }
}
