//! Bit-exact geometry constants and the immutable pipeline configuration.
//!
//! The original renderer keeps a handful of process-wide globals
//! (`perspectiveCorrection`, `complementaryDepthBuffer`, the transcendental
//! precision knobs, ...). We fold all of that into one `Copy` struct that
//! the device builds once and every stage below borrows, rather than
//! reading through statics.

/// Number of fractional bits used for the subpixel-snapped window-space grid.
pub const SUBPIXEL_PRECISION_BITS: i32 = 4;
/// `1 << SUBPIXEL_PRECISION_BITS`.
pub const SUBPIXEL_PRECISION_FACTOR: i32 = 1 << SUBPIXEL_PRECISION_BITS;
/// `SUBPIXEL_PRECISION_FACTOR - 1`.
pub const SUBPIXEL_PRECISION_MASK: i32 = SUBPIXEL_PRECISION_FACTOR - 1;

/// Maximum vertical extent of a render target; also the size of a
/// primitive's span table.
pub const OUTLINE_RESOLUTION: usize = 8192;

pub const MAX_CLIP_DISTANCES: usize = 8;
pub const MAX_CULL_DISTANCES: usize = 8;
pub const MAX_COLOR_BUFFERS: usize = 8;
/// Must be a multiple of 4.
pub const MAX_INTERFACE_COMPONENTS: usize = 128;

/// Size of the draw-call ring. Power of two.
pub const DRAW_COUNT: usize = 16;
/// Size of the scheduler's task queue. Power of two.
pub const TASK_COUNT: usize = 32;
/// Maximum number of triangles processed by a single primitive task.
pub const BATCH_SIZE: usize = 128;

/// Implementation-defined clamp on `gl_PointSize`/`pointSize`.
pub const MAX_POINT_SIZE: f32 = 255.0;

/// Largest sample count this pipeline supports (spec §4.4: only 1x and
/// 4x are accepted by `PixelStateKey::canonicalize`).
pub const MAX_SAMPLES: usize = 4;

/// Standard per-sample offsets from the pixel center, in pixels, for a
/// given sample count. Used both to evaluate per-sample depth in the quad
/// rasterizer and to conservatively widen setup's span table so that no
/// sample position falls outside the coverage the single-sample-center
/// test would have computed.
pub fn sample_offsets(sample_count: u32) -> &'static [(f32, f32)] {
    const ONE: [(f32, f32); 1] = [(0.0, 0.0)];
    const TWO: [(f32, f32); 2] = [(0.25, 0.25), (-0.25, -0.25)];
    const FOUR: [(f32, f32); 4] = [(0.375, -0.125), (-0.125, -0.375), (0.125, 0.375), (-0.375, 0.125)];
    match sample_count {
        2 => &TWO,
        4 => &FOUR,
        _ => &ONE,
    }
}

/// Clip flag bit assignment (matches `Clipper::ClipFlags`).
pub const CLIP_RIGHT: u32 = 1 << 0;
pub const CLIP_TOP: u32 = 1 << 1;
pub const CLIP_FAR: u32 = 1 << 2;
pub const CLIP_LEFT: u32 = 1 << 3;
pub const CLIP_BOTTOM: u32 = 1 << 4;
pub const CLIP_NEAR: u32 = 1 << 5;
pub const CLIP_FRUSTUM: u32 = 0x3F;
pub const CLIP_FINITE: u32 = 1 << 7;

/// Immutable, device-wide configuration threaded by reference into the
/// clipper, setup stage and scheduler. Replaces the original's scattering
/// of global booleans.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineConfig {
    /// When set, depth is stored as `1.0 - z` so that a reversed depth
    /// range (infinite far plane style) uses the same `LESS` comparisons.
    pub complementary_depth_buffer: bool,
    /// Whether interpolants are divided by the interpolated `1/w` before
    /// being handed to the fragment kernel (perspective-correct) or lerped
    /// directly in screen space.
    pub perspective_correction: bool,
    /// Vulkan pixel centers are at half-integer coordinates; kept as a
    /// field (rather than hard-coded) so a test harness can probe the
    /// integer-center convention without touching setup's math.
    pub half_integer_coordinates: bool,
    /// A NaN `depthBiasClamp` is treated as if the clamp were disabled
    /// (0), per the source's own comment. This is always true; the field
    /// exists to document the decision at the call site rather than bury
    /// it in setup's arithmetic.
    pub depth_bias_clamp_nan_as_zero: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            complementary_depth_buffer: false,
            perspective_correction: true,
            half_integer_coordinates: true,
            depth_bias_clamp_nan_as_zero: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subpixel_constants_are_bit_exact() {
        assert_eq!(SUBPIXEL_PRECISION_FACTOR, 16);
        assert_eq!(SUBPIXEL_PRECISION_MASK, 15);
    }

    #[test]
    fn sample_offsets_counts_match_their_sample_count() {
        assert_eq!(sample_offsets(1).len(), 1);
        assert_eq!(sample_offsets(2).len(), 2);
        assert_eq!(sample_offsets(4).len(), 4);
        assert_eq!(sample_offsets(3).len(), 1);
    }

    #[test]
    fn clip_frustum_covers_the_six_planes() {
        assert_eq!(
            CLIP_FRUSTUM,
            CLIP_RIGHT | CLIP_TOP | CLIP_FAR | CLIP_LEFT | CLIP_BOTTOM | CLIP_NEAR
        );
    }
}
