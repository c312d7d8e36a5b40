//! Blend-state resolution (spec §4.5): given per-attachment Vulkan-style
//! blend state and the attachment's format, produce a canonical effective
//! blend state such that logically-identical configurations always hash
//! and compare equal as part of a [`crate::state_key::PixelStateKey`].

/// Source/destination blend factors, matching the subset of
/// `VkBlendFactor` this software path needs to reason about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
    SrcAlphaSaturate,
}

/// Blend operations. `HslHue`..`HslLuminosity` stand in for the "advanced"
/// blend ops (`VK_BLEND_OP_*_EXT`) the spec groups together as forcing
/// `ONE`/`ONE` factors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
    HslHue,
    HslSaturation,
    HslColor,
    HslLuminosity,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
}

impl BlendOp {
    fn is_advanced(self) -> bool {
        !matches!(self, BlendOp::Add | BlendOp::Subtract | BlendOp::ReverseSubtract | BlendOp::Min | BlendOp::Max)
    }

    /// Subtractive ops can only ever produce a negative delta.
    fn is_subtractive(self) -> bool {
        matches!(self, BlendOp::Subtract | BlendOp::ReverseSubtract)
    }
}

/// Whether an attachment's format stores unsigned-normalized components
/// (`UNORM`), which cannot represent a negative blend result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatClass {
    UnsignedNormalized,
    Other,
}

/// Raw, caller-specified per-attachment blend configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub enable: bool,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub color_op: BlendOp,
    pub src_factor_alpha: BlendFactor,
    pub dst_factor_alpha: BlendFactor,
    pub alpha_op: BlendOp,
}

impl BlendState {
    pub const DISABLED: Self = Self {
        enable: false,
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::Zero,
        color_op: BlendOp::Add,
        src_factor_alpha: BlendFactor::One,
        dst_factor_alpha: BlendFactor::Zero,
        alpha_op: BlendOp::Add,
    };
}

/// The resolved, canonical blend state: what the pixel kernel actually
/// executes, and what goes into the pixel state key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CanonicalBlendState {
    pub enable: bool,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub color_op: BlendOp,
    pub src_factor_alpha: BlendFactor,
    pub dst_factor_alpha: BlendFactor,
    pub alpha_op: BlendOp,
}

impl CanonicalBlendState {
    pub const OFF: Self = Self {
        enable: false,
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::Zero,
        color_op: BlendOp::Add,
        src_factor_alpha: BlendFactor::One,
        dst_factor_alpha: BlendFactor::Zero,
        alpha_op: BlendOp::Add,
    };
}

fn canonicalize_op(op: BlendOp, src: BlendFactor, dst: BlendFactor, format: FormatClass) -> (BlendOp, BlendFactor, BlendFactor) {
    if op.is_advanced() {
        // Advanced HSL/multiply/screen/etc. force both factors to ONE;
        // the op itself reads both operands directly.
        return (op, BlendFactor::One, BlendFactor::One);
    }

    if op.is_subtractive() && format == FormatClass::UnsignedNormalized {
        // A subtractive op against a UNORM destination can only clamp to
        // zero: collapse it to a constant ZERO result via ADD(ZERO, ZERO).
        return (BlendOp::Add, BlendFactor::Zero, BlendFactor::Zero);
    }

    if op == BlendOp::Add {
        return match (src, dst) {
            (BlendFactor::Zero, BlendFactor::Zero) => (BlendOp::Add, BlendFactor::Zero, BlendFactor::Zero),
            (BlendFactor::One, BlendFactor::Zero) => (BlendOp::Add, BlendFactor::One, BlendFactor::Zero),
            (BlendFactor::Zero, BlendFactor::One) => (BlendOp::Add, BlendFactor::Zero, BlendFactor::One),
            _ => (op, src, dst),
        };
    }

    (op, src, dst)
}

/// Resolve a raw blend configuration to its canonical form. Idempotent:
/// `canonicalize(canonicalize(s)) == canonicalize(s)` for all `s`.
pub fn canonicalize(state: &BlendState, attachment_present: bool, format: FormatClass) -> CanonicalBlendState {
    if !state.enable || !attachment_present {
        return CanonicalBlendState::OFF;
    }

    let (color_op, src_factor, dst_factor) = canonicalize_op(state.color_op, state.src_factor, state.dst_factor, format);
    let (alpha_op, src_factor_alpha, dst_factor_alpha) =
        canonicalize_op(state.alpha_op, state.src_factor_alpha, state.dst_factor_alpha, format);

    let off = color_op == BlendOp::Add
        && src_factor == BlendFactor::One
        && dst_factor == BlendFactor::Zero
        && alpha_op == BlendOp::Add
        && src_factor_alpha == BlendFactor::One
        && dst_factor_alpha == BlendFactor::Zero;

    if off {
        return CanonicalBlendState::OFF;
    }

    CanonicalBlendState {
        enable: true,
        src_factor,
        dst_factor,
        color_op,
        src_factor_alpha,
        dst_factor_alpha,
        alpha_op,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recanonicalize(c: CanonicalBlendState) -> CanonicalBlendState {
        let raw = BlendState {
            enable: c.enable,
            src_factor: c.src_factor,
            dst_factor: c.dst_factor,
            color_op: c.color_op,
            src_factor_alpha: c.src_factor_alpha,
            dst_factor_alpha: c.dst_factor_alpha,
            alpha_op: c.alpha_op,
        };
        canonicalize(&raw, true, FormatClass::Other)
    }

    #[test]
    fn disabled_blend_is_off() {
        let c = canonicalize(&BlendState::DISABLED, true, FormatClass::Other);
        assert_eq!(c, CanonicalBlendState::OFF);
    }

    #[test]
    fn add_zero_zero_collapses_to_zero() {
        let raw = BlendState {
            enable: true,
            src_factor: BlendFactor::Zero,
            dst_factor: BlendFactor::Zero,
            color_op: BlendOp::Add,
            src_factor_alpha: BlendFactor::One,
            dst_factor_alpha: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
        };
        let c = canonicalize(&raw, true, FormatClass::Other);
        assert_eq!(c, CanonicalBlendState::OFF);
    }

    #[test]
    fn subtractive_unorm_collapses_to_zero() {
        let raw = BlendState {
            enable: true,
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::DstAlpha,
            color_op: BlendOp::Subtract,
            src_factor_alpha: BlendFactor::One,
            dst_factor_alpha: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
        };
        let c = canonicalize(&raw, true, FormatClass::UnsignedNormalized);
        assert_eq!(c.color_op, BlendOp::Add);
        assert_eq!(c.src_factor, BlendFactor::Zero);
        assert_eq!(c.dst_factor, BlendFactor::Zero);
    }

    #[test]
    fn advanced_ops_force_one_one() {
        let raw = BlendState {
            enable: true,
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::DstAlpha,
            color_op: BlendOp::Multiply,
            src_factor_alpha: BlendFactor::SrcAlpha,
            dst_factor_alpha: BlendFactor::DstAlpha,
            alpha_op: BlendOp::Screen,
        };
        let c = canonicalize(&raw, true, FormatClass::Other);
        assert_eq!(c.src_factor, BlendFactor::One);
        assert_eq!(c.dst_factor, BlendFactor::One);
        assert_eq!(c.src_factor_alpha, BlendFactor::One);
        assert_eq!(c.dst_factor_alpha, BlendFactor::One);
    }

    #[test]
    fn canonicalization_round_trips() {
        let states = [
            BlendState::DISABLED,
            BlendState {
                enable: true,
                src_factor: BlendFactor::SrcAlpha,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
                color_op: BlendOp::Add,
                src_factor_alpha: BlendFactor::One,
                dst_factor_alpha: BlendFactor::Zero,
                alpha_op: BlendOp::Add,
            },
        ];
        for s in states {
            let c1 = canonicalize(&s, true, FormatClass::Other);
            let c2 = recanonicalize(c1);
            assert_eq!(c1, c2);
        }
    }

    #[test]
    fn absent_attachment_is_off() {
        let raw = BlendState {
            enable: true,
            ..BlendState::DISABLED
        };
        let c = canonicalize(&raw, false, FormatClass::Other);
        assert_eq!(c, CanonicalBlendState::OFF);
    }
}
