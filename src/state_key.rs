//! Canonicalised per-draw pixel state, hashed and compared to select
//! (and cache) a compiled pixel kernel.
//!
//! The original packs this into a `Memset`-zeroed POD struct and hashes it
//! by xor-ing 32-bit words of the raw byte layout, relying on
//! `memset(0)` to neutralise padding. Per the spec's own redesign note we
//! instead give every field a name and derive `Hash`/`Eq` from those
//! fields: there is no padding hazard to begin with, and the key is
//! printable for debugging. Byte-equality and field-equality coincide
//! here because there is no padding, so this is a strict improvement, not
//! a behavioural change.

use crate::blend::CanonicalBlendState;
use crate::config::MAX_COLOR_BUFFERS;
use crate::error::{PipelineError, Result};
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    Fill,
    Line,
    Point,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
    FrontAndBack,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

impl CompareOp {
    pub fn evaluate(self, new: Ordering) -> bool {
        match self {
            CompareOp::Never => false,
            CompareOp::Less => new == Ordering::Less,
            CompareOp::Equal => new == Ordering::Equal,
            CompareOp::LessOrEqual => new != Ordering::Greater,
            CompareOp::Greater => new == Ordering::Greater,
            CompareOp::NotEqual => new != Ordering::Equal,
            CompareOp::GreaterOrEqual => new != Ordering::Less,
            CompareOp::Always => true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilFaceState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
}

impl StencilFaceState {
    pub const DISABLED: Self = Self {
        fail_op: StencilOp::Keep,
        pass_op: StencilOp::Keep,
        depth_fail_op: StencilOp::Keep,
        compare_op: CompareOp::Always,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilState {
    pub front: StencilFaceState,
    pub back: StencilFaceState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogicOp {
    Clear,
    And,
    AndReverse,
    Copy,
    AndInverted,
    NoOp,
    Xor,
    Or,
    Nor,
    Equivalent,
    Invert,
    OrReverse,
    CopyInverted,
    OrInverted,
    Nand,
    Set,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct ColorWriteMask {
    pub r: bool,
    pub g: bool,
    pub b: bool,
    pub a: bool,
}

impl ColorWriteMask {
    pub const ALL: Self = Self { r: true, g: true, b: true, a: true };
    pub const NONE: Self = Self { r: false, g: false, b: false, a: false };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttachmentFormat {
    R8g8b8a8Unorm,
    B8g8r8a8Unorm,
    R16g16b16a16Unorm,
    R16g16Unorm,
    R5g6b5Unorm,
    R32g32b32a32Sfloat,
    D32Sfloat,
    D24UnormS8Uint,
}

impl AttachmentFormat {
    pub fn is_unsigned_normalized(self) -> bool {
        matches!(
            self,
            AttachmentFormat::R8g8b8a8Unorm
                | AttachmentFormat::B8g8r8a8Unorm
                | AttachmentFormat::R16g16b16a16Unorm
                | AttachmentFormat::R16g16Unorm
                | AttachmentFormat::R5g6b5Unorm
        )
    }
}

/// Canonicalised per-draw pixel state. Every boolean, enum, factor and
/// bitmask that can affect pixel-kernel code generation lives here.
///
/// Construct via [`PixelStateKey::canonicalize`] rather than directly:
/// that constructor is what forces irrelevant fields (e.g. stencil ops
/// when stencil testing is disabled) to their canonical value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PixelStateKey {
    pub topology: Topology,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub depth_test: Option<CompareOp>,
    pub depth_write: bool,
    pub depth_bounds_test: bool,
    pub stencil_test: Option<StencilState>,
    pub blend: [CanonicalBlendState; MAX_COLOR_BUFFERS],
    pub logic_op: Option<LogicOp>,
    pub write_mask: [ColorWriteMask; MAX_COLOR_BUFFERS],
    pub format: [Option<AttachmentFormat>; MAX_COLOR_BUFFERS],
    pub sample_count: u32,
    pub sample_mask: u32,
    pub alpha_to_coverage: bool,
    /// Bit `i` set means interpolant `i` is flat-shaded.
    pub flat_interpolants: u128,
    pub occlusion_query: bool,
}

/// Raw, not-yet-canonical request for a pixel state key.
pub struct PixelStateRequest {
    pub topology: Topology,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub depth_test_enable: bool,
    pub depth_compare_op: CompareOp,
    pub depth_write: bool,
    pub depth_bounds_test_enable: bool,
    pub stencil_test_enable: bool,
    pub stencil: StencilState,
    pub blend: [CanonicalBlendState; MAX_COLOR_BUFFERS],
    pub logic_op_enable: bool,
    pub logic_op: LogicOp,
    pub write_mask: [ColorWriteMask; MAX_COLOR_BUFFERS],
    pub format: [Option<AttachmentFormat>; MAX_COLOR_BUFFERS],
    pub sample_count: u32,
    pub sample_mask: u32,
    pub alpha_to_coverage: bool,
    /// Vulkan's `alphaToOneEnable`. Unlike every other field here, a `true`
    /// never survives into a [`PixelStateKey`] — `canonicalize` turns it
    /// into an `Err` (spec §7.1 names it as an `UNSUPPORTED` example; this
    /// core's pixel kernel contract has no hook for it).
    pub alpha_to_one_enable: bool,
    pub flat_interpolants: u128,
    pub occlusion_query: bool,
}

impl PixelStateKey {
    /// Canonicalise a raw request into a hashable, comparable key.
    ///
    /// Fails fast (spec §7.1 "Unsupported configuration... enforced at
    /// draw-setup time, before any task is scheduled") for the two concrete
    /// examples the spec names: a sample count outside `{1, 4}`, and
    /// alpha-to-one (which this core's pixel kernel contract has no hook
    /// for — only alpha-to-coverage is modeled).
    pub fn canonicalize(req: &PixelStateRequest) -> Result<Self> {
        if req.sample_count != 1 && req.sample_count != 4 {
            return Err(PipelineError::UnsupportedSampleCount(req.sample_count));
        }
        if req.alpha_to_one_enable {
            return Err(PipelineError::AlphaToOneUnsupported);
        }

        let depth_test = if req.depth_test_enable { Some(req.depth_compare_op) } else { None };
        // Depth writes with no depth test active never observe anything:
        // still honour `depth_write` independently, Vulkan allows writing
        // without testing (compare op ALWAYS is the common idiom, but a
        // caller may disable the test outright and still want a write).
        let stencil_test = if req.stencil_test_enable { Some(req.stencil) } else { None };
        let logic_op = if req.logic_op_enable { Some(req.logic_op) } else { None };

        Ok(Self {
            topology: req.topology,
            polygon_mode: req.polygon_mode,
            cull_mode: req.cull_mode,
            depth_test,
            depth_write: req.depth_write,
            depth_bounds_test: req.depth_bounds_test_enable,
            stencil_test,
            blend: req.blend,
            logic_op,
            write_mask: req.write_mask,
            format: req.format,
            sample_count: req.sample_count,
            sample_mask: req.sample_mask,
            alpha_to_coverage: req.alpha_to_coverage,
            flat_interpolants: req.flat_interpolants,
            occlusion_query: req.occlusion_query,
        })
    }
}
