//! The binned, multi-threaded draw scheduler (spec §4.6): a ring of
//! `DrawCall` slots feeding a bounded task queue of `Primitives`/`Pixels`
//! tasks, consumed by one worker thread per logical CPU.
//!
//! Grounded on `Device/Renderer.hpp` (`Renderer::draw`, `threadLoop`,
//! `taskLoop`, `findAvailableTasks`, `scheduleTask`, `executeTask`,
//! `finishRendering`) and `Renderer.cpp`'s implementations of the same.
//! Differences from the original, each a direct application of the
//! "cyclic ownership... arena indices, no raw pointers" design note, are
//! recorded in `DESIGN.md`:
//!
//! - Ring slots hold `Arc<DrawCall>` rather than a pointer into a
//!   pre-allocated pool; a unit/cluster references a draw by its
//!   monotonic `u64` id (`id & (DRAW_COUNT - 1)` recovers the slot).
//! - One `parking_lot::Mutex<Inner>` plus two `Condvar`s stand in for the
//!   original's scheduler mutex and the per-thread suspend/resume event
//!   pairs; going idle is an ordinary condition-variable wait rather than
//!   a manually-counted semaphore, and waking sleepers uses
//!   `notify_all` rather than waking an exactly-computed number of
//!   threads. Behaviourally equivalent, and it removes an entire class
//!   of wake-count bookkeeping bugs.
//! - Worker threads hold only a `Weak<Scheduler>`, upgraded for the
//!   duration of each task; this is what lets `Scheduler` tear down on
//!   `Drop` without the thread pool keeping itself alive forever.

mod draw_call;

pub use draw_call::{primitive_count_for_topology, split_primitive_restart, DrawEvents, DrawTargets, IndexSource};

use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Weak};
use std::thread;

use fxhash::FxHashMap;
use parking_lot::{Condvar, Mutex};

use crate::config::{DRAW_COUNT, TASK_COUNT};
use crate::geometry::Vertex;
use crate::kernel::{DynamicState, PixelKernel, VertexKernel};
use crate::setup::{Primitive, SetupContext, SetupKind};
use crate::state_key::{PixelStateKey, Topology};

use draw_call::{set_batch_indices, DrawCall, IndexData};

#[derive(Clone, Copy)]
enum Task {
    Primitives { unit: usize },
    Pixels { unit: usize, cluster: usize },
}

struct RingSlot {
    draw: Arc<DrawCall>,
    /// Number of batches (`PrimitiveProgress` units) not yet fully
    /// consumed by every cluster. The slot is freed when this hits 0.
    references: i64,
    /// Next primitive index to hand out to a unit.
    primitive: u32,
}

struct PrimitiveProgress {
    draw_id: Option<u64>,
    first_primitive: u32,
    primitive_count: u32,
    visible: u32,
    /// `-1` reserved (Primitives task in flight), `0` free, `1..=cluster_count`
    /// ready, counting down as clusters consume it.
    references: i64,
    primitives: Arc<Vec<Primitive>>,
}

impl PrimitiveProgress {
    fn empty() -> Self {
        Self { draw_id: None, first_primitive: 0, primitive_count: 0, visible: 0, references: 0, primitives: Arc::new(Vec::new()) }
    }
}

struct PixelProgress {
    draw_id: u64,
    processed_primitives: u32,
    executing: bool,
}

impl PixelProgress {
    fn empty() -> Self {
        Self { draw_id: 0, processed_primitives: 0, executing: false }
    }
}

struct Inner {
    ring: [Option<RingSlot>; DRAW_COUNT],
    next_draw: u64,
    queue: VecDeque<Task>,
    units: Vec<PrimitiveProgress>,
    clusters: Vec<PixelProgress>,
    exit: bool,
}

/// Per-unit vertex-kernel memoisation, invalidated whenever the unit
/// starts a batch belonging to a different draw (spec §4.6 "a vertex
/// cache keyed by vertex index, invalidated when the draw call changes").
#[derive(Default)]
struct VertexCache {
    draw_id: Option<u64>,
    entries: FxHashMap<u32, Vertex>,
}

impl VertexCache {
    fn get_or_shade(&mut self, draw_id: u64, index: u32, kernel: &dyn VertexKernel, buffers: &(dyn Any + Send + Sync)) -> Vertex {
        if self.draw_id != Some(draw_id) {
            self.entries.clear();
            self.draw_id = Some(draw_id);
        }
        self.entries.entry(index).or_insert_with(|| kernel.shade(index, buffers)).clone()
    }
}

/// The multi-threaded draw scheduler (spec §4.6). Owns the draw ring,
/// task queue and progress records; `draw()` submits work, `synchronize()`
/// blocks until it has drained.
pub struct Scheduler {
    state: Mutex<Inner>,
    work_available: Condvar,
    slot_freed: Condvar,
    thread_count: usize,
    cluster_count: usize,
    vertex_caches: Vec<Mutex<VertexCache>>,
}

impl Scheduler {
    /// `unit_count` is the number of in-flight primitive batches the
    /// scheduler can track at once; it is clamped up to at least one per
    /// worker thread so every thread can always have a batch of its own
    /// in flight. Worker and cluster counts follow `num_cpus::get()`
    /// rounded up to a power of two, per spec §4.6's `ceil_pow2(cpu_affinity)`.
    pub fn new(unit_count: usize) -> Arc<Self> {
        let thread_count = num_cpus::get().max(1).next_power_of_two();
        let cluster_count = thread_count;
        let unit_count = unit_count.max(thread_count);

        let scheduler = Arc::new(Self {
            state: Mutex::new(Inner {
                ring: Default::default(),
                next_draw: 0,
                queue: VecDeque::with_capacity(TASK_COUNT),
                units: (0..unit_count).map(|_| PrimitiveProgress::empty()).collect(),
                clusters: (0..cluster_count).map(|_| PixelProgress::empty()).collect(),
                exit: false,
            }),
            work_available: Condvar::new(),
            slot_freed: Condvar::new(),
            thread_count,
            cluster_count,
            vertex_caches: (0..unit_count).map(|_| Mutex::new(VertexCache::default())).collect(),
        });

        for worker_index in 0..thread_count {
            let weak = Arc::downgrade(&scheduler);
            // Dropping the `JoinHandle` detaches the thread; it keeps
            // running as long as `weak` upgrades, which is exactly as
            // long as `scheduler` itself is alive.
            let _ = thread::Builder::new()
                .name(format!("rasta-worker-{worker_index}"))
                .spawn(move || Self::worker_loop(weak))
                .expect("failed to spawn rasterizer worker thread");
        }

        log::debug!("draw scheduler started with {thread_count} worker threads, {cluster_count} clusters, {unit_count} units");
        scheduler
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    /// Submit a draw call. Blocks if the ring has no free slot. Returns
    /// immediately once the draw call is queued; use `events` or
    /// [`Self::synchronize`] to observe completion.
    ///
    /// Fails fast, before any task is scheduled, on the "unsupported
    /// configuration" class of spec §7.1: a sample count outside `{1, 4}`.
    /// A `pixel_state_key` built through [`PixelStateKey::canonicalize`]
    /// cannot carry anything else this rejects, but the check is repeated
    /// here since the key's fields are public and nothing stops a caller
    /// from constructing one by hand.
    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        self: &Arc<Self>,
        vertex_kernel: Arc<dyn VertexKernel>,
        pixel_kernel: Arc<dyn PixelKernel>,
        vertex_buffers: Arc<dyn Any + Send + Sync>,
        topology: Topology,
        indices: IndexSource,
        base_vertex: i32,
        element_count: usize,
        setup_ctx: SetupContext,
        pixel_state_key: PixelStateKey,
        dynamic_state: DynamicState,
        targets: DrawTargets,
        rasterizer_discard: bool,
        occlusion: Option<Arc<AtomicU64>>,
        events: Option<Arc<dyn DrawEvents>>,
    ) -> crate::error::Result<()> {
        if pixel_state_key.sample_count != 1 && pixel_state_key.sample_count != 4 {
            return Err(crate::error::PipelineError::UnsupportedSampleCount(pixel_state_key.sample_count));
        }

        let primitive_count = primitive_count_for_topology(topology, element_count);
        if primitive_count == 0 {
            // Degenerate input (spec §7.3): complete the event group
            // immediately, no task is ever scheduled.
            if let Some(events) = &events {
                events.signal();
            }
            return Ok(());
        }

        let setup_kind = match topology {
            Topology::PointList => SetupKind::Point,
            Topology::LineList | Topology::LineStrip => SetupKind::Line,
            Topology::TriangleList | Topology::TriangleStrip | Topology::TriangleFan => SetupKind::Triangle,
        };

        let draw_call = Arc::new(DrawCall {
            vertex_kernel,
            pixel_kernel,
            setup_kind,
            setup_ctx,
            pixel_state_key,
            dynamic_state,
            targets,
            vertex_buffers,
            indices: IndexData::from(indices),
            topology,
            base_vertex,
            primitive_count: primitive_count as u32,
            rasterizer_discard,
            occlusion,
            events,
        });

        let batch = draw_call.batch_primitive_count();
        let references = (primitive_count as u32).div_ceil(batch);

        let mut inner = self.state.lock();
        loop {
            let slot_idx = (inner.next_draw & (DRAW_COUNT as u64 - 1)) as usize;
            if inner.ring[slot_idx].is_none() {
                break;
            }
            self.slot_freed.wait(&mut inner);
        }

        let slot_idx = (inner.next_draw & (DRAW_COUNT as u64 - 1)) as usize;
        inner.ring[slot_idx] = Some(RingSlot { draw: draw_call, references: references.max(1) as i64, primitive: 0 });
        inner.next_draw += 1;
        drop(inner);
        self.work_available.notify_all();
        Ok(())
    }

    /// Block until every outstanding draw has fully retired.
    pub fn synchronize(&self) {
        let mut inner = self.state.lock();
        while inner.ring.iter().any(Option::is_some) {
            self.slot_freed.wait(&mut inner);
        }
    }

    fn worker_loop(weak: Weak<Self>) {
        loop {
            let Some(scheduler) = weak.upgrade() else { return };

            let task = {
                let mut inner = scheduler.state.lock();
                loop {
                    if inner.exit {
                        return;
                    }
                    if inner.queue.is_empty() {
                        scheduler.find_available_tasks(&mut inner);
                    }
                    if let Some(task) = inner.queue.pop_front() {
                        break task;
                    }
                    scheduler.work_available.wait(&mut inner);
                }
            };

            scheduler.execute(task);
        }
    }

    /// Populate the task queue (spec §4.6 `find_available_tasks`): first
    /// clusters ready to consume an already-set-up unit, then units free
    /// to take the next primitive batch off the head draw.
    fn find_available_tasks(&self, inner: &mut Inner) {
        for cluster in 0..self.cluster_count {
            if inner.queue.len() >= TASK_COUNT {
                break;
            }
            if inner.clusters[cluster].executing {
                continue;
            }
            let draw_id = inner.clusters[cluster].draw_id;
            let processed = inner.clusters[cluster].processed_primitives;
            let ready_unit = inner.units.iter().position(|u| u.references > 0 && u.draw_id == Some(draw_id) && u.first_primitive == processed);
            if let Some(unit) = ready_unit {
                inner.clusters[cluster].executing = true;
                inner.queue.push_back(Task::Pixels { unit, cluster });
            }
        }

        loop {
            if inner.queue.len() >= TASK_COUNT {
                break;
            }

            let current_draw = find_current_draw(inner);
            let current_slot_idx = (current_draw & (DRAW_COUNT as u64 - 1)) as usize;
            let Some(slot) = inner.ring[current_slot_idx].as_mut() else { break };

            if slot.primitive >= slot.draw.primitive_count {
                // Every primitive of the head draw has already been
                // handed to a unit; nothing left to assign until this
                // slot retires and a later draw becomes the head.
                break;
            }

            let Some(free_unit) = inner.units.iter().position(|u| u.references == 0) else { break };

            let batch = slot.draw.batch_primitive_count();
            let remaining = slot.draw.primitive_count - slot.primitive;
            let count = batch.min(remaining);
            let first = slot.primitive;
            slot.primitive += count;

            let unit = &mut inner.units[free_unit];
            unit.draw_id = Some(current_draw);
            unit.first_primitive = first;
            unit.primitive_count = count;
            unit.visible = 0;
            unit.references = -1;
            unit.primitives = Arc::new(Vec::new());

            inner.queue.push_back(Task::Primitives { unit: free_unit });
        }
    }

    fn execute(&self, task: Task) {
        match task {
            Task::Primitives { unit } => self.execute_primitives(unit),
            Task::Pixels { unit, cluster } => self.execute_pixels(unit, cluster),
        }
    }

    fn execute_primitives(&self, unit: usize) {
        let (draw, draw_id, first, count) = {
            let inner = self.state.lock();
            let u = &inner.units[unit];
            let draw_id = u.draw_id.expect("Primitives task scheduled against an unassigned unit");
            let slot_idx = (draw_id & (DRAW_COUNT as u64 - 1)) as usize;
            let draw = inner.ring[slot_idx].as_ref().expect("Primitives task scheduled against a retired draw").draw.clone();
            (draw, draw_id, u.first_primitive, u.primitive_count)
        };

        let batch_indices = set_batch_indices(draw.topology, &draw.indices, draw.base_vertex, first as usize, count as usize);

        let mut primitives = Vec::with_capacity(count as usize);
        {
            let mut cache = self.vertex_caches[unit].lock();
            for [i0, i1, i2] in &batch_indices {
                let v0 = cache.get_or_shade(draw_id, *i0, draw.vertex_kernel.as_ref(), draw.vertex_buffers.as_ref());
                let v1 = cache.get_or_shade(draw_id, *i1, draw.vertex_kernel.as_ref(), draw.vertex_buffers.as_ref());
                let v2 = cache.get_or_shade(draw_id, *i2, draw.vertex_kernel.as_ref(), draw.vertex_buffers.as_ref());

                if draw.rasterizer_discard {
                    continue;
                }

                let prim = match draw.setup_kind {
                    SetupKind::Triangle => {
                        let mask = crate::clip::clip_flags(&v0.position) | crate::clip::clip_flags(&v1.position) | crate::clip::clip_flags(&v2.position);
                        crate::setup::setup_triangle(&draw.setup_ctx, &v0, &v1, &v2, mask)
                    }
                    SetupKind::Line => crate::setup::setup_line(&draw.setup_ctx, &v0, &v1),
                    SetupKind::Point => crate::setup::setup_point(&draw.setup_ctx, &v0),
                };
                if let Some(prim) = prim {
                    primitives.push(prim);
                }
            }
        }

        let visible = primitives.len() as u32;
        {
            let mut inner = self.state.lock();
            let u = &mut inner.units[unit];
            u.visible = visible;
            u.primitives = Arc::new(primitives);
            u.references = self.cluster_count as i64;
        }
        self.work_available.notify_all();
    }

    fn execute_pixels(&self, unit: usize, cluster: usize) {
        let (draw, primitives, visible) = {
            let inner = self.state.lock();
            let u = &inner.units[unit];
            let draw_id = u.draw_id.expect("Pixels task scheduled against an unassigned unit");
            let slot_idx = (draw_id & (DRAW_COUNT as u64 - 1)) as usize;
            let draw = inner.ring[slot_idx].as_ref().expect("Pixels task scheduled against a retired draw").draw.clone();
            (draw, u.primitives.clone(), u.visible)
        };

        if visible > 0 && !draw.rasterizer_discard {
            let color: [Option<&(dyn crate::buffer::Target<Item = [f32; 4]> + Sync)>; crate::config::MAX_COLOR_BUFFERS] = [
                draw.targets.color[0].as_deref().map(|t| t as &(dyn crate::buffer::Target<Item = [f32; 4]> + Sync)),
                draw.targets.color[1].as_deref().map(|t| t as &(dyn crate::buffer::Target<Item = [f32; 4]> + Sync)),
                draw.targets.color[2].as_deref().map(|t| t as &(dyn crate::buffer::Target<Item = [f32; 4]> + Sync)),
                draw.targets.color[3].as_deref().map(|t| t as &(dyn crate::buffer::Target<Item = [f32; 4]> + Sync)),
                draw.targets.color[4].as_deref().map(|t| t as &(dyn crate::buffer::Target<Item = [f32; 4]> + Sync)),
                draw.targets.color[5].as_deref().map(|t| t as &(dyn crate::buffer::Target<Item = [f32; 4]> + Sync)),
                draw.targets.color[6].as_deref().map(|t| t as &(dyn crate::buffer::Target<Item = [f32; 4]> + Sync)),
                draw.targets.color[7].as_deref().map(|t| t as &(dyn crate::buffer::Target<Item = [f32; 4]> + Sync)),
            ];
            let targets = crate::kernel::FragmentTargets {
                color: &color,
                depth: draw.targets.depth.as_deref().map(|t| t as &(dyn crate::buffer::Target<Item = f32> + Sync)),
                stencil: draw.targets.stencil.as_deref().map(|t| t as &(dyn crate::buffer::Target<Item = u8> + Sync)),
            };

            for prim in primitives.iter() {
                crate::rasterizer::rasterize_primitive_cluster(
                    prim,
                    &draw.pixel_state_key,
                    &draw.dynamic_state,
                    draw.pixel_kernel.as_ref(),
                    &targets,
                    cluster,
                    self.cluster_count,
                    draw.occlusion.as_ref(),
                );
            }
        }

        self.finish_rendering(unit, cluster);
    }

    /// Spec §4.6 "finishRendering": advance the cluster's progress,
    /// decrement the unit's and (transitively) the draw's reference
    /// counts, and free the ring slot once every batch of the draw has
    /// been consumed by every cluster.
    fn finish_rendering(&self, unit: usize, cluster: usize) {
        let mut inner = self.state.lock();

        let draw_id = inner.units[unit].draw_id.expect("finishRendering on an unassigned unit");
        let primitive_count = inner.units[unit].primitive_count;
        let slot_idx = (draw_id & (DRAW_COUNT as u64 - 1)) as usize;
        let total = inner.ring[slot_idx].as_ref().map(|s| s.draw.primitive_count).unwrap_or(0);

        {
            let c = &mut inner.clusters[cluster];
            c.processed_primitives += primitive_count;
            if c.processed_primitives >= total {
                c.draw_id += 1;
                c.processed_primitives = 0;
            }
            c.executing = false;
        }

        inner.units[unit].references -= 1;
        if inner.units[unit].references == 0 {
            inner.units[unit].draw_id = None;
            inner.units[unit].primitives = Arc::new(Vec::new());

            let slot_now_empty = if let Some(slot) = inner.ring[slot_idx].as_mut() {
                slot.references -= 1;
                slot.references == 0
            } else {
                false
            };
            if slot_now_empty {
                if let Some(slot) = inner.ring[slot_idx].take() {
                    if let Some(events) = &slot.draw.events {
                        events.signal();
                    }
                }
            }
        }

        drop(inner);
        self.work_available.notify_all();
        self.slot_freed.notify_all();
    }
}

/// The oldest draw call still present in the ring, i.e. the next one
/// units are assigned primitives from. A slot retiring out of ring order
/// is impossible by construction (a later slot's draw can't finish before
/// an earlier one starts), so scanning from the tail is always correct;
/// it is also simpler than maintaining a separate `current_draw` counter
/// by hand.
fn find_current_draw(inner: &Inner) -> u64 {
    let newest = inner.next_draw;
    let mut candidate = newest.saturating_sub(DRAW_COUNT as u64);
    while candidate < newest {
        let slot_idx = (candidate & (DRAW_COUNT as u64 - 1)) as usize;
        if inner.ring[slot_idx].is_some() {
            return candidate;
        }
        candidate += 1;
    }
    newest
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        {
            let mut inner = self.state.lock();
            inner.exit = true;
        }
        self.work_available.notify_all();
        log::debug!("draw scheduler dropped, {} worker threads releasing", self.thread_count);
    }
}
