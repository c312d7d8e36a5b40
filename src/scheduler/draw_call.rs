//! `DrawCall`: a ring slot's contents (spec §3 DrawCall), plus the
//! topology/index-buffer plumbing that turns `(topology, indices, start,
//! count)` into a batch of triangle-equivalent vertex-index rows
//! (spec §4.6 "Topology -> batch mapping").
//!
//! Grounded on `Device/Renderer.hpp`'s `DrawCall`/`DrawData` pair and
//! `Renderer.cpp::setBatchIndices`. Where the original stores raw pointers
//! into caller-owned memory (`DrawData::indices`, attachment base
//! pointers), this crate owns everything a task needs through `Arc`, so a
//! `DrawCall` can sit in the ring for as long as tasks reference it
//! without borrowing back into the submitting thread's stack frame.

use std::any::Any;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use crate::config::MAX_COLOR_BUFFERS;
use crate::kernel::{DynamicState, PixelKernel, VertexKernel};
use crate::setup::{SetupContext, SetupKind};
use crate::state_key::{PixelStateKey, Topology};

/// Borrowed index buffer as handed to [`crate::scheduler::Scheduler::draw`].
/// Copied into an owned [`IndexData`] before the draw call is placed in
/// the ring, so the borrow only needs to live for the `draw()` call.
pub enum IndexSource<'a> {
    None,
    U16(&'a [u16]),
    U32(&'a [u32]),
}

/// Owned index buffer held by a ring slot's [`DrawCall`].
#[derive(Clone)]
pub(crate) enum IndexData {
    None,
    U16(Arc<[u16]>),
    U32(Arc<[u32]>),
}

impl From<IndexSource<'_>> for IndexData {
    fn from(src: IndexSource<'_>) -> Self {
        match src {
            IndexSource::None => IndexData::None,
            IndexSource::U16(s) => IndexData::U16(Arc::from(s)),
            IndexSource::U32(s) => IndexData::U32(Arc::from(s)),
        }
    }
}

impl IndexData {
    fn get(&self, i: usize) -> u32 {
        match self {
            IndexData::None => i as u32,
            IndexData::U16(s) => s[i] as u32,
            IndexData::U32(s) => s[i],
        }
    }

    pub(crate) fn len(&self, non_indexed_count: usize) -> usize {
        match self {
            IndexData::None => non_indexed_count,
            IndexData::U16(s) => s.len(),
            IndexData::U32(s) => s.len(),
        }
    }
}

/// Render targets a draw writes to. Reference-counted so a `DrawCall` can
/// outlive the stack frame that submitted it for as long as its tasks are
/// in flight; clusters never write the same row, so sharing these
/// read-only across worker threads is safe (`Target`'s own contract
/// covers the actual pixel-level exclusivity).
#[derive(Clone)]
pub struct DrawTargets {
    pub color: [Option<Arc<dyn crate::buffer::Target<Item = [f32; 4]> + Send + Sync>>; MAX_COLOR_BUFFERS],
    pub depth: Option<Arc<dyn crate::buffer::Target<Item = f32> + Send + Sync>>,
    pub stencil: Option<Arc<dyn crate::buffer::Target<Item = u8> + Send + Sync>>,
}

impl DrawTargets {
    pub fn none() -> Self {
        Self { color: [None, None, None, None, None, None, None, None], depth: None, stencil: None }
    }
}

/// Signaled once every task belonging to a draw call has retired
/// (spec §4.6 "signal the draw's event group"). A caller that wants to
/// wait for one specific draw, rather than blocking on
/// [`crate::scheduler::Scheduler::synchronize`] until every outstanding
/// draw completes, implements this.
pub trait DrawEvents: Send + Sync {
    fn signal(&self);
}

/// A slot in the scheduler's draw ring (spec §3 DrawCall).
pub struct DrawCall {
    pub(crate) vertex_kernel: Arc<dyn VertexKernel>,
    pub(crate) pixel_kernel: Arc<dyn PixelKernel>,
    pub(crate) setup_kind: SetupKind,
    pub(crate) setup_ctx: SetupContext,
    pub(crate) pixel_state_key: PixelStateKey,
    pub(crate) dynamic_state: DynamicState,
    pub(crate) targets: DrawTargets,
    pub(crate) vertex_buffers: Arc<dyn Any + Send + Sync>,
    pub(crate) indices: IndexData,
    pub(crate) topology: Topology,
    pub(crate) base_vertex: i32,
    /// Total triangle-equivalent primitives in this draw (spec's `count`).
    pub(crate) primitive_count: u32,
    pub(crate) rasterizer_discard: bool,
    pub(crate) occlusion: Option<Arc<AtomicU64>>,
    pub(crate) events: Option<Arc<dyn DrawEvents>>,
}

impl DrawCall {
    /// `batch = batchSize / sampleCount` (spec §4.6 "Batching").
    pub(crate) fn batch_primitive_count(&self) -> u32 {
        (crate::config::BATCH_SIZE as u32 / self.setup_ctx.sample_count.max(1)).max(1)
    }
}

/// Number of triangle-equivalent primitives a topology produces from
/// `element_count` vertices/indices.
pub fn primitive_count_for_topology(topology: Topology, element_count: usize) -> usize {
    match topology {
        Topology::PointList => element_count,
        Topology::LineList => element_count / 2,
        Topology::LineStrip => element_count.saturating_sub(1),
        Topology::TriangleList => element_count / 3,
        Topology::TriangleStrip => element_count.saturating_sub(2),
        Topology::TriangleFan => element_count.saturating_sub(2),
    }
}

/// Fill `primitive_count` rows of `(v0, v1, v2)` vertex indices for the
/// primitives `[start, start + primitive_count)` of `topology`, per
/// spec §4.6's per-topology mapping. `start`/`primitive_count` count
/// *primitives*, not raw indices; `vtx` below converts a primitive-local
/// element position to an index-buffer position before applying
/// `base_vertex`.
pub(crate) fn set_batch_indices(
    topology: Topology,
    indices: &IndexData,
    base_vertex: i32,
    start: usize,
    primitive_count: usize,
) -> Vec<[u32; 3]> {
    let vtx = |element: usize| -> u32 { (indices.get(element) as i64 + base_vertex as i64) as u32 };

    let mut batch = Vec::with_capacity(primitive_count);
    for p in 0..primitive_count {
        let i = start + p;
        let row = match topology {
            Topology::PointList => [vtx(i), vtx(i), vtx(i)],
            Topology::LineList => [vtx(2 * i), vtx(2 * i + 1), vtx(2 * i + 1)],
            Topology::LineStrip => [vtx(i), vtx(i + 1), vtx(i + 1)],
            Topology::TriangleList => [vtx(3 * i), vtx(3 * i + 1), vtx(3 * i + 2)],
            Topology::TriangleStrip => {
                let b = i + ((i) & 1) + 1;
                let c = i + (!(i) & 1) + 1;
                [vtx(i), vtx(b), vtx(c)]
            }
            Topology::TriangleFan => [vtx(i + 1), vtx(i + 2), vtx(0)],
        };
        batch.push(row);
    }
    batch
}

/// Pre-split an index buffer into maximal sub-runs that do not contain
/// `restart_index` (spec §4.6 "Primitive-restart"). Each returned
/// `(start, count)` (in index-buffer element units) is its own draw: the
/// caller issues one [`crate::scheduler::Scheduler::draw`] per sub-run
/// rather than the scheduler juggling multiple logical runs inside a
/// single `DrawCall`.
pub fn split_primitive_restart(indices: &IndexData, element_count: usize, restart_index: u32) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for i in 0..element_count {
        if indices.get(i) == restart_index {
            if let Some(s) = start.take() {
                runs.push((s, i - s));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        runs.push((s, element_count - s));
    }
    runs
}
