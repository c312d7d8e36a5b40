//! Multisample resolve (spec §4.8): collapse a pixel's per-sample color
//! values down to one, format-aware.
//!
//! Integer (`UNORM`) attachments resolve with a branchless pairwise average
//! rather than a float sum-and-divide: `(a & b) + ((a ^ b) >> 1)` averages
//! two unsigned integers with the same rounding a fixed-point box filter
//! would produce, and composes associatively for any power-of-two sample
//! count. Non-power-of-two counts and floating-point attachments fall back
//! to a plain float average.

use crate::math::Denormalize;
use crate::state_key::AttachmentFormat;

pub fn resolve_color_samples(format: AttachmentFormat, samples: &[[f32; 4]]) -> [f32; 4] {
    match samples.len() {
        0 => [0.0; 4],
        1 => samples[0],
        n if format.is_unsigned_normalized() && n.is_power_of_two() => resolve_unorm_pairwise(format, samples),
        _ => resolve_float_average(samples),
    }
}

/// Depth resolves to the sample-zero value rather than an average: a
/// multisampled depth attachment is sampling one function value per
/// location, not a color to box-filter.
pub fn resolve_depth_samples(samples: &[f32]) -> f32 {
    samples.first().copied().unwrap_or(1.0)
}

fn resolve_float_average(samples: &[[f32; 4]]) -> [f32; 4] {
    let n = samples.len() as f32;
    let mut sum = [0.0f32; 4];
    for s in samples {
        for i in 0..4 {
            sum[i] += s[i];
        }
    }
    [sum[0] / n, sum[1] / n, sum[2] / n, sum[3] / n]
}

fn channel_scale(format: AttachmentFormat) -> [u32; 4] {
    match format {
        AttachmentFormat::R8g8b8a8Unorm | AttachmentFormat::B8g8r8a8Unorm => [255; 4],
        AttachmentFormat::R16g16b16a16Unorm => [65535; 4],
        AttachmentFormat::R16g16Unorm => [65535, 65535, 0, 0],
        AttachmentFormat::R5g6b5Unorm => [31, 63, 31, 0],
        _ => [255; 4],
    }
}

#[inline]
fn avg_u32(a: u32, b: u32) -> u32 {
    (a & b) + ((a ^ b) >> 1)
}

fn resolve_unorm_pairwise(format: AttachmentFormat, samples: &[[f32; 4]]) -> [f32; 4] {
    let scale = channel_scale(format);
    let mut ints: Vec<[u32; 4]> = samples
        .iter()
        .map(|s| {
            let mut v = [0u32; 4];
            for i in 0..4 {
                v[i] = if scale[i] == 0 { 0 } else { s[i].denormalize_to(scale[i]) };
            }
            v
        })
        .collect();

    while ints.len() > 1 {
        let mut next = Vec::with_capacity(ints.len() / 2);
        for pair in ints.chunks_exact(2) {
            let mut out = [0u32; 4];
            for i in 0..4 {
                out[i] = avg_u32(pair[0][i], pair[1][i]);
            }
            next.push(out);
        }
        ints = next;
    }

    let result = ints[0];
    let mut out = [0.0f32; 4];
    for i in 0..4 {
        out[i] = if scale[i] == 0 { 0.0 } else { result[i] as f32 / scale[i] as f32 };
    }
    out
}
