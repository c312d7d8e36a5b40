//! The opaque vertex/pixel kernel contract and the per-fragment state
//! machine (spec §4.4): depth bounds, two-sided stencil, depth test,
//! shader invocation, sample mask/alpha-to-coverage, blend/logic-op,
//! write mask and occlusion counting.
//!
//! Kernels are supplied by the caller (they are what a real Vulkan driver
//! compiles from SPIR-V); this crate only defines the contract they must
//! satisfy and drives it per-fragment.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::blend::{BlendFactor, BlendOp, CanonicalBlendState};
use crate::config::{MAX_COLOR_BUFFERS, MAX_SAMPLES};
use crate::geometry::Vertex;
use crate::setup::Primitive;
use crate::state_key::{LogicOp, PixelStateKey};

/// Opaque per-vertex shader. `vertex_index` addresses into whatever
/// vertex-buffer state `buffers` carries; the kernel owns interpreting
/// both.
pub trait VertexKernel: Send + Sync {
    fn shade(&self, vertex_index: u32, buffers: &(dyn Any + Send + Sync)) -> Vertex;
}

impl<F> VertexKernel for F
where
    F: Fn(u32, &(dyn Any + Send + Sync)) -> Vertex + Send + Sync,
{
    fn shade(&self, vertex_index: u32, buffers: &(dyn Any + Send + Sync)) -> Vertex {
        self(vertex_index, buffers)
    }
}

/// What a primitive's plane equations evaluate to at one fragment,
/// handed to the pixel kernel. The shader itself runs once per fragment,
/// not once per sample (spec §4.4 step 5), so only depth varies per
/// sample here — interpolants are evaluated once, at the fragment's
/// single shading position.
pub struct FragmentInput<'a> {
    pub x: i32,
    pub y: i32,
    /// Interpolated (and, per `PipelineConfig::perspective_correction`,
    /// already perspective-corrected) depth in `[0, 1]`, one per active
    /// sample; only the first `sample_count` entries are meaningful.
    pub depth_samples: [f32; MAX_SAMPLES],
    pub sample_count: usize,
    pub interpolants: &'a [f32],
    pub front_facing: bool,
    pub primitive: &'a Primitive,
}

/// What the pixel kernel hands back for one fragment.
#[derive(Clone)]
pub struct FragmentOutput {
    pub color: [[f32; 4]; MAX_COLOR_BUFFERS],
    /// `Some` if the kernel writes `gl_FragDepth`/`SV_Depth`; `None` keeps
    /// the interpolated depth from `FragmentInput`.
    pub depth: Option<f32>,
    pub discard: bool,
}

impl Default for FragmentOutput {
    fn default() -> Self {
        Self { color: [[0.0; 4]; MAX_COLOR_BUFFERS], depth: None, discard: false }
    }
}

pub trait PixelKernel: Send + Sync {
    fn shade(&self, input: &FragmentInput) -> FragmentOutput;
}

impl<F> PixelKernel for F
where
    F: Fn(&FragmentInput) -> FragmentOutput + Send + Sync,
{
    fn shade(&self, input: &FragmentInput) -> FragmentOutput {
        self(input)
    }
}

/// Per-draw values that affect the fragment state machine's numeric
/// results but not the compiled routine itself, so they live outside
/// `PixelStateKey`.
#[derive(Clone, Copy, Debug)]
pub struct DynamicState {
    pub stencil_reference: [u8; 2], // [front, back]
    pub stencil_write_mask: [u8; 2],
    pub stencil_compare_mask: [u8; 2],
    pub blend_constant: [f32; 4],
    pub depth_bounds: (f32, f32),
}

impl Default for DynamicState {
    fn default() -> Self {
        Self {
            stencil_reference: [0, 0],
            stencil_write_mask: [0xFF, 0xFF],
            stencil_compare_mask: [0xFF, 0xFF],
            blend_constant: [0.0; 4],
            depth_bounds: (0.0, 1.0),
        }
    }
}

/// One fragment's worth of target access. All slices are indexed by
/// color-attachment slot.
pub struct FragmentTargets<'a> {
    pub color: &'a [Option<&'a (dyn crate::buffer::Target<Item = [f32; 4]> + Sync)>],
    pub depth: Option<&'a (dyn crate::buffer::Target<Item = f32> + Sync)>,
    pub stencil: Option<&'a (dyn crate::buffer::Target<Item = u8> + Sync)>,
}

/// Fixed alpha-to-coverage thresholds (spec §4.4 step 6): `sample_count`
/// ordered thresholds an output alpha is compared against, one per
/// sample, rather than a single ratio recomputed from whichever sample
/// happens to be live. Sample counts other than 1/2/4 fall back to a
/// single mid threshold; `PixelStateKey::canonicalize` never produces
/// one, but the key's fields are public and directly constructible.
fn alpha_to_coverage_thresholds(sample_count: u32) -> [f32; MAX_SAMPLES] {
    match sample_count {
        4 => [0.2, 0.4, 0.6, 0.8],
        2 => [0.25, 0.75, 0.0, 0.0],
        _ => [0.5, 0.0, 0.0, 0.0],
    }
}

/// Run the full per-fragment state machine for one fragment, per spec
/// §4.4: depth bounds, two-sided stencil, depth test and stencil write
/// run per sample; the shader itself runs once; sample-mask AND,
/// alpha-to-coverage, depth write and color blend/logic-op/write-mask
/// then run per surviving sample. Returns whether at least one sample
/// passed every test up to (and including) the shader's own discard.
pub fn shade_fragment(
    key: &PixelStateKey,
    dynamic: &DynamicState,
    kernel: &dyn PixelKernel,
    targets: &FragmentTargets,
    pos: [usize; 2],
    input: FragmentInput,
    occlusion: Option<&Arc<AtomicU64>>,
) -> bool {
    let sample_count = input.sample_count.clamp(1, MAX_SAMPLES);
    let all_samples: u32 = (1 << sample_count) - 1;
    let mut live = all_samples;

    if key.depth_bounds_test {
        let (lo, hi) = dynamic.depth_bounds;
        for s in 0..sample_count {
            let existing = targets.depth.map(|d| unsafe { d.read_exclusive_unchecked(pos, s) }).unwrap_or(0.0);
            if existing < lo || existing > hi {
                live &= !(1 << s);
            }
        }
        if live == 0 {
            return false;
        }
    }

    let clockwise = input.primitive.clockwise_mask != 0;
    let face = if input.front_facing { 0 } else { 1 };
    let _ = clockwise;

    let mut existing_stencil = [0u8; MAX_SAMPLES];
    for s in 0..sample_count {
        existing_stencil[s] = targets.stencil.map(|t| unsafe { t.read_exclusive_unchecked(pos, s) }).unwrap_or(0);
    }

    let mut stencil_passed = [true; MAX_SAMPLES];
    for s in 0..sample_count {
        stencil_passed[s] = match &key.stencil_test {
            None => true,
            Some(state) => {
                let face_state = if face == 0 { state.front } else { state.back };
                let masked_ref = dynamic.stencil_reference[face] & dynamic.stencil_compare_mask[face];
                let masked_existing = existing_stencil[s] & dynamic.stencil_compare_mask[face];
                face_state.compare_op.evaluate(masked_ref.cmp(&masked_existing))
            }
        };
    }

    // Complementary depth (spec §9 design note: fold the original's
    // `complementaryDepthBuffer` global into per-primitive state) stores
    // and compares `1 - z` instead of `z`, so a far plane at `z == 1`
    // round-trips through the same `LESS`-shaped comparisons a standard
    // depth buffer uses for its near plane.
    let encode_depth = |d: f32| if input.primitive.complementary_depth_buffer { 1.0 - d } else { d };

    let mut existing_depth = [encode_depth(1.0); MAX_SAMPLES];
    for s in 0..sample_count {
        existing_depth[s] = targets.depth.map(|d| unsafe { d.read_exclusive_unchecked(pos, s) }).unwrap_or(encode_depth(1.0));
    }

    let mut biased_depth = [0.0f32; MAX_SAMPLES];
    for s in 0..sample_count {
        biased_depth[s] = encode_depth((input.depth_samples[s] + input.primitive.depth_bias).clamp(0.0, 1.0));
    }

    let mut depth_passed = [true; MAX_SAMPLES];
    for s in 0..sample_count {
        depth_passed[s] = match key.depth_test {
            None => true,
            Some(op) => {
                stencil_passed[s] && op.evaluate(biased_depth[s].partial_cmp(&existing_depth[s]).unwrap_or(std::cmp::Ordering::Equal))
            }
        };
    }

    if let Some(stencil_state) = &key.stencil_test {
        let face_state = if face == 0 { stencil_state.front } else { stencil_state.back };
        if let Some(s_target) = targets.stencil {
            for s in 0..sample_count {
                if live & (1 << s) == 0 {
                    continue;
                }
                let op = if !stencil_passed[s] {
                    face_state.fail_op
                } else if !depth_passed[s] {
                    face_state.depth_fail_op
                } else {
                    face_state.pass_op
                };
                let new_value =
                    apply_stencil_op(op, existing_stencil[s], dynamic.stencil_reference[face], dynamic.stencil_write_mask[face]);
                unsafe { s_target.write_exclusive_unchecked(pos, s, new_value) };
            }
        }
    }

    for s in 0..sample_count {
        if !stencil_passed[s] || !depth_passed[s] {
            live &= !(1 << s);
        }
    }
    if live == 0 {
        return false;
    }

    let output = kernel.shade(&input);
    if output.discard {
        return false;
    }

    // Sample-mask AND (spec §4.4 step 6): a sample not set in
    // `multiSampleMask` never reaches blend regardless of how every
    // earlier test scored it.
    live &= key.sample_mask & all_samples;
    if live == 0 {
        return false;
    }

    if key.alpha_to_coverage {
        let thresholds = alpha_to_coverage_thresholds(sample_count as u32);
        for s in 0..sample_count {
            if live & (1 << s) != 0 && output.color[0][3] < thresholds[s] {
                live &= !(1 << s);
            }
        }
        if live == 0 {
            return false;
        }
    }

    if key.depth_write {
        if let Some(d) = targets.depth {
            for s in 0..sample_count {
                if live & (1 << s) == 0 {
                    continue;
                }
                let final_depth = output.depth.map(|v| encode_depth(v.clamp(0.0, 1.0))).unwrap_or(biased_depth[s]);
                unsafe { d.write_exclusive_unchecked(pos, s, final_depth) };
            }
        }
    }

    for (slot, color_target) in targets.color.iter().enumerate() {
        let Some(target) = color_target else { continue };
        let src = output.color[slot];
        for s in 0..sample_count {
            if live & (1 << s) == 0 {
                continue;
            }
            let existing = unsafe { target.read_exclusive_unchecked(pos, s) };
            // Blend and logic op are mutually exclusive (spec §4.4 step 7):
            // a logic op consumes the raw shader output, never a blended color.
            let final_color = if let Some(op) = key.logic_op {
                apply_logic_op_rgba(op, src, existing)
            } else {
                blend_color(&key.blend[slot], src, existing, dynamic.blend_constant)
            };
            let masked = apply_write_mask(key.write_mask[slot], final_color, existing);
            unsafe { target.write_exclusive_unchecked(pos, s, masked) };
        }
    }

    if let Some(counter) = occlusion {
        counter.fetch_add(live.count_ones() as u64, AtomicOrdering::Relaxed);
    }

    true
}

fn apply_stencil_op(op: crate::state_key::StencilOp, existing: u8, reference: u8, write_mask: u8) -> u8 {
    use crate::state_key::StencilOp::*;
    let new_value = match op {
        Keep => existing,
        Zero => 0,
        Replace => reference,
        IncrementClamp => existing.saturating_add(1),
        DecrementClamp => existing.saturating_sub(1),
        Invert => !existing,
        IncrementWrap => existing.wrapping_add(1),
        DecrementWrap => existing.wrapping_sub(1),
    };
    (new_value & write_mask) | (existing & !write_mask)
}

fn factor_value(f: BlendFactor, src: [f32; 4], dst: [f32; 4], constant: [f32; 4]) -> [f32; 4] {
    use BlendFactor::*;
    match f {
        Zero => [0.0; 4],
        One => [1.0; 4],
        SrcColor => src,
        OneMinusSrcColor => [1.0 - src[0], 1.0 - src[1], 1.0 - src[2], 1.0 - src[3]],
        DstColor => dst,
        OneMinusDstColor => [1.0 - dst[0], 1.0 - dst[1], 1.0 - dst[2], 1.0 - dst[3]],
        SrcAlpha => [src[3]; 4],
        OneMinusSrcAlpha => [1.0 - src[3]; 4],
        DstAlpha => [dst[3]; 4],
        OneMinusDstAlpha => [1.0 - dst[3]; 4],
        ConstantColor => constant,
        OneMinusConstantColor => [1.0 - constant[0], 1.0 - constant[1], 1.0 - constant[2], 1.0 - constant[3]],
        ConstantAlpha => [constant[3]; 4],
        OneMinusConstantAlpha => [1.0 - constant[3]; 4],
        SrcAlphaSaturate => {
            let f = src[3].min(1.0 - dst[3]);
            [f, f, f, 1.0]
        }
    }
}

fn apply_op(op: BlendOp, s: [f32; 4], d: [f32; 4]) -> [f32; 4] {
    use BlendOp::*;
    match op {
        Add => [s[0] + d[0], s[1] + d[1], s[2] + d[2], s[3] + d[3]],
        Subtract => [s[0] - d[0], s[1] - d[1], s[2] - d[2], s[3] - d[3]],
        ReverseSubtract => [d[0] - s[0], d[1] - s[1], d[2] - s[2], d[3] - s[3]],
        Min => [s[0].min(d[0]), s[1].min(d[1]), s[2].min(d[2]), s[3].min(d[3])],
        Max => [s[0].max(d[0]), s[1].max(d[1]), s[2].max(d[2]), s[3].max(d[3])],
        Multiply => [s[0] * d[0], s[1] * d[1], s[2] * d[2], s[3] * d[3]],
        Screen => [
            s[0] + d[0] - s[0] * d[0],
            s[1] + d[1] - s[1] * d[1],
            s[2] + d[2] - s[2] * d[2],
            s[3] + d[3] - s[3] * d[3],
        ],
        Darken => [s[0].min(d[0]), s[1].min(d[1]), s[2].min(d[2]), (s[3] + d[3] - s[3] * d[3])],
        Lighten => [s[0].max(d[0]), s[1].max(d[1]), s[2].max(d[2]), (s[3] + d[3] - s[3] * d[3])],
        Overlay => {
            let overlay = |a: f32, b: f32| if b <= 0.5 { 2.0 * a * b } else { 1.0 - 2.0 * (1.0 - a) * (1.0 - b) };
            [overlay(s[0], d[0]), overlay(s[1], d[1]), overlay(s[2], d[2]), s[3] + d[3] - s[3] * d[3]]
        }
        HslHue => hsl_blend(s, d, |sc, dc| set_sat(sc, sat(dc))).map_or(s, |c| hsl_result(c, s, d)),
        HslSaturation => hsl_blend(s, d, |sc, dc| set_sat(dc, sat(sc))).map_or(s, |c| hsl_result(c, s, d)),
        HslColor => hsl_blend(s, d, |sc, _dc| sc).map_or(s, |c| hsl_result(c, s, d)),
        HslLuminosity => hsl_blend(s, d, |_sc, dc| dc).map_or(s, |c| hsl_result(c, s, d)),
    }
}

fn hsl_blend(s: [f32; 4], d: [f32; 4], combine: impl Fn([f32; 3], [f32; 3]) -> [f32; 3]) -> Option<[f32; 3]> {
    let sc = [s[0], s[1], s[2]];
    let dc = [d[0], d[1], d[2]];
    Some(set_lum(combine(sc, dc), lum(dc)))
}

fn hsl_result(c: [f32; 3], s: [f32; 4], d: [f32; 4]) -> [f32; 4] {
    [c[0], c[1], c[2], s[3] + d[3] - s[3] * d[3]]
}

fn lum(c: [f32; 3]) -> f32 {
    0.3 * c[0] + 0.59 * c[1] + 0.11 * c[2]
}

fn sat(c: [f32; 3]) -> f32 {
    c[0].max(c[1]).max(c[2]) - c[0].min(c[1]).min(c[2])
}

fn clip_color(c: [f32; 3]) -> [f32; 3] {
    let l = lum(c);
    let n = c[0].min(c[1]).min(c[2]);
    let x = c[0].max(c[1]).max(c[2]);
    let mut out = c;
    if n < 0.0 && l != n {
        for v in out.iter_mut() {
            *v = l + (*v - l) * l / (l - n);
        }
    }
    if x > 1.0 && x != l {
        for v in out.iter_mut() {
            *v = l + (*v - l) * (1.0 - l) / (x - l);
        }
    }
    out
}

fn set_lum(c: [f32; 3], l: f32) -> [f32; 3] {
    let d = l - lum(c);
    clip_color([c[0] + d, c[1] + d, c[2] + d])
}

fn set_sat(mut c: [f32; 3], s: f32) -> [f32; 3] {
    let mut idx = [0usize, 1, 2];
    idx.sort_by(|&a, &b| c[a].partial_cmp(&c[b]).unwrap_or(std::cmp::Ordering::Equal));
    let (mn, md, mx) = (idx[0], idx[1], idx[2]);
    if c[mx] > c[mn] {
        c[md] = (c[md] - c[mn]) * s / (c[mx] - c[mn]);
        c[mx] = s;
    } else {
        c[md] = 0.0;
        c[mx] = 0.0;
    }
    c[mn] = 0.0;
    c
}

fn blend_color(state: &CanonicalBlendState, src: [f32; 4], dst: [f32; 4], constant: [f32; 4]) -> [f32; 4] {
    if !state.enable {
        return src;
    }

    let sf = factor_value(state.src_factor, src, dst, constant);
    let df = factor_value(state.dst_factor, src, dst, constant);
    let color = apply_op(state.color_op, [src[0] * sf[0], src[1] * sf[1], src[2] * sf[2], 0.0], [dst[0] * df[0], dst[1] * df[1], dst[2] * df[2], 0.0]);

    let saf = factor_value(state.src_factor_alpha, src, dst, constant);
    let daf = factor_value(state.dst_factor_alpha, src, dst, constant);
    let alpha = apply_op(state.alpha_op, [0.0, 0.0, 0.0, src[3] * saf[3]], [0.0, 0.0, 0.0, dst[3] * daf[3]]);

    [color[0].clamp(0.0, 1.0), color[1].clamp(0.0, 1.0), color[2].clamp(0.0, 1.0), alpha[3].clamp(0.0, 1.0)]
}

fn logic_op_u8(op: LogicOp, s: u8, d: u8) -> u8 {
    use LogicOp::*;
    match op {
        Clear => 0,
        And => s & d,
        AndReverse => s & !d,
        Copy => s,
        AndInverted => !s & d,
        NoOp => d,
        Xor => s ^ d,
        Or => s | d,
        Nor => !(s | d),
        Equivalent => !(s ^ d),
        Invert => !d,
        OrReverse => s | !d,
        CopyInverted => !s,
        OrInverted => !s | d,
        Nand => !(s & d),
        Set => 0xFF,
    }
}

fn apply_logic_op_rgba(op: LogicOp, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
    let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    let from_u8 = |v: u8| v as f32 / 255.0;
    let mut out = [0.0; 4];
    for i in 0..4 {
        out[i] = from_u8(logic_op_u8(op, to_u8(src[i]), to_u8(dst[i])));
    }
    out
}

fn apply_write_mask(mask: crate::state_key::ColorWriteMask, new: [f32; 4], existing: [f32; 4]) -> [f32; 4] {
    [
        if mask.r { new[0] } else { existing[0] },
        if mask.g { new[1] } else { existing[1] },
        if mask.b { new[2] } else { existing[2] },
        if mask.a { new[3] } else { existing[3] },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend::{BlendFactor, BlendOp};
    use crate::buffer::{Buffer2d, Target};
    use crate::geometry::{PlaneEquation, Vertex};
    use crate::state_key::{ColorWriteMask, CullMode, PolygonMode, Topology};
    use vek::Vec4;

    fn flat_primitive() -> Primitive {
        Primitive {
            y_min: 0,
            y_max: 1,
            outline: vec![],
            v0: Vertex::new(Vec4::new(0.0, 0.0, 0.5, 1.0), 0),
            v1: Vertex::new(Vec4::new(0.0, 0.0, 0.5, 1.0), 0),
            v2: Vertex::new(Vec4::new(0.0, 0.0, 0.5, 1.0), 0),
            z: PlaneEquation::flat(0.5),
            w: PlaneEquation::flat(1.0),
            interpolants: [PlaneEquation::ZERO; crate::config::MAX_INTERFACE_COMPONENTS],
            interpolant_count: 0,
            clip_distance: [PlaneEquation::ZERO; crate::config::MAX_CLIP_DISTANCES],
            cull_distance: [PlaneEquation::ZERO; crate::config::MAX_CULL_DISTANCES],
            clockwise_mask: !0,
            inv_clockwise_mask: 0,
            depth_bias: 0.0,
            pixel_center: 0.5,
            complementary_depth_buffer: false,
        }
    }

    fn key_with(sample_count: u32, sample_mask: u32, alpha_to_coverage: bool) -> PixelStateKey {
        PixelStateKey {
            topology: Topology::TriangleList,
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::None,
            depth_test: None,
            depth_write: false,
            depth_bounds_test: false,
            stencil_test: None,
            blend: [CanonicalBlendState::OFF; MAX_COLOR_BUFFERS],
            logic_op: None,
            write_mask: [ColorWriteMask::ALL; MAX_COLOR_BUFFERS],
            format: [None; MAX_COLOR_BUFFERS],
            sample_count,
            sample_mask,
            alpha_to_coverage,
            flat_interpolants: 0,
            occlusion_query: false,
        }
    }

    #[test]
    fn sample_mask_excludes_masked_out_samples_from_the_color_write() {
        let prim = flat_primitive();
        let key = key_with(4, 0b0101, false);
        let dynamic = DynamicState::default();
        let color = Buffer2d::new_multisampled([1, 1], 4, [0.0f32; 4]);
        let targets = FragmentTargets { color: &[Some(&color)], depth: None, stencil: None };
        let kernel = |_: &FragmentInput| FragmentOutput { color: [[1.0, 1.0, 1.0, 1.0]; MAX_COLOR_BUFFERS], depth: None, discard: false };
        let input = FragmentInput { x: 0, y: 0, depth_samples: [0.5; MAX_SAMPLES], sample_count: 4, interpolants: &[], front_facing: true, primitive: &prim };

        let passed = shade_fragment(&key, &dynamic, &kernel, &targets, [0, 0], input, None);
        assert!(passed);
        unsafe {
            assert_eq!(color.read_exclusive_unchecked([0, 0], 0), [1.0, 1.0, 1.0, 1.0]);
            assert_eq!(color.read_exclusive_unchecked([0, 0], 1), [0.0, 0.0, 0.0, 0.0]);
            assert_eq!(color.read_exclusive_unchecked([0, 0], 2), [1.0, 1.0, 1.0, 1.0]);
            assert_eq!(color.read_exclusive_unchecked([0, 0], 3), [0.0, 0.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn zero_sample_mask_drops_the_fragment_entirely() {
        let prim = flat_primitive();
        let key = key_with(4, 0, false);
        let dynamic = DynamicState::default();
        let color = Buffer2d::new_multisampled([1, 1], 4, [0.0f32; 4]);
        let targets = FragmentTargets { color: &[Some(&color)], depth: None, stencil: None };
        let kernel = |_: &FragmentInput| FragmentOutput { color: [[1.0, 1.0, 1.0, 1.0]; MAX_COLOR_BUFFERS], depth: None, discard: false };
        let input = FragmentInput { x: 0, y: 0, depth_samples: [0.5; MAX_SAMPLES], sample_count: 4, interpolants: &[], front_facing: true, primitive: &prim };

        assert!(!shade_fragment(&key, &dynamic, &kernel, &targets, [0, 0], input, None));
    }

    #[test]
    fn alpha_to_coverage_keeps_only_samples_below_their_threshold() {
        let prim = flat_primitive();
        let key = key_with(4, !0, true);
        let dynamic = DynamicState::default();
        let color = Buffer2d::new_multisampled([1, 1], 4, [0.0f32; 4]);
        let targets = FragmentTargets { color: &[Some(&color)], depth: None, stencil: None };
        // alpha 0.5 clears thresholds [0.2, 0.4] but not [0.6, 0.8].
        let kernel = |_: &FragmentInput| FragmentOutput { color: [[1.0, 1.0, 1.0, 0.5]; MAX_COLOR_BUFFERS], depth: None, discard: false };
        let input = FragmentInput { x: 0, y: 0, depth_samples: [0.5; MAX_SAMPLES], sample_count: 4, interpolants: &[], front_facing: true, primitive: &prim };

        assert!(shade_fragment(&key, &dynamic, &kernel, &targets, [0, 0], input, None));
        unsafe {
            assert_eq!(color.read_exclusive_unchecked([0, 0], 0), [0.0, 0.0, 0.0, 0.0]);
            assert_eq!(color.read_exclusive_unchecked([0, 0], 1), [0.0, 0.0, 0.0, 0.0]);
            assert_eq!(color.read_exclusive_unchecked([0, 0], 2), [1.0, 1.0, 1.0, 0.5]);
            assert_eq!(color.read_exclusive_unchecked([0, 0], 3), [1.0, 1.0, 1.0, 0.5]);
        }
    }

    #[test]
    fn occlusion_counts_one_per_live_sample() {
        let prim = flat_primitive();
        let key = key_with(4, !0, false);
        let dynamic = DynamicState::default();
        let color = Buffer2d::new_multisampled([1, 1], 4, [0.0f32; 4]);
        let targets = FragmentTargets { color: &[Some(&color)], depth: None, stencil: None };
        let kernel = |_: &FragmentInput| FragmentOutput::default();
        let input = FragmentInput { x: 0, y: 0, depth_samples: [0.5; MAX_SAMPLES], sample_count: 4, interpolants: &[], front_facing: true, primitive: &prim };
        let counter = Arc::new(AtomicU64::new(0));

        shade_fragment(&key, &dynamic, &kernel, &targets, [0, 0], input, Some(&counter));
        assert_eq!(counter.load(AtomicOrdering::Relaxed), 4);
    }

    #[test]
    fn disabled_blend_passes_source_through() {
        let c = blend_color(&CanonicalBlendState::OFF, [0.2, 0.4, 0.6, 1.0], [0.9, 0.9, 0.9, 1.0], [0.0; 4]);
        assert_eq!(c, [0.2, 0.4, 0.6, 1.0]);
    }

    #[test]
    fn standard_alpha_blend_mixes_toward_source() {
        let state = CanonicalBlendState {
            enable: true,
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            color_op: BlendOp::Add,
            src_factor_alpha: BlendFactor::One,
            dst_factor_alpha: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
        };
        let c = blend_color(&state, [1.0, 0.0, 0.0, 0.5], [0.0, 1.0, 0.0, 1.0], [0.0; 4]);
        assert!((c[0] - 0.5).abs() < 1e-5);
        assert!((c[1] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn logic_op_xor_round_trips_through_itself() {
        let c = apply_logic_op_rgba(LogicOp::Xor, [1.0, 0.0, 0.0, 1.0], [1.0, 0.0, 0.0, 1.0]);
        assert!(c[0].abs() < 1e-5);
    }

    #[test]
    fn set_sat_preserves_zero_when_channels_equal() {
        let c = set_sat([0.5, 0.5, 0.5], 0.3);
        assert_eq!(c, [0.0, 0.0, 0.0]);
    }
}
