//! End-to-end scenarios driven through the public `Scheduler` API,
//! covering the concrete scenarios and quantified invariants the core's
//! testable-properties section names for the scheduler/rasterizer path.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use vek::Vec4;

use rasta_core::buffer::{Buffer2d, Target};
use rasta_core::config::MAX_COLOR_BUFFERS;
use rasta_core::geometry::Vertex;
use rasta_core::kernel::{DynamicState, FragmentInput, FragmentOutput};
use rasta_core::scheduler::{DrawTargets, IndexSource};
use rasta_core::setup::{ScissorRect, SetupContext, Viewport};
use rasta_core::state_key::{
    CompareOp, CullMode, PixelStateKey, PolygonMode, Topology,
};
use rasta_core::Scheduler;

fn no_blend() -> [rasta_core::blend::CanonicalBlendState; MAX_COLOR_BUFFERS] {
    [rasta_core::blend::CanonicalBlendState::OFF; MAX_COLOR_BUFFERS]
}

fn no_write_mask() -> [rasta_core::state_key::ColorWriteMask; MAX_COLOR_BUFFERS] {
    [rasta_core::state_key::ColorWriteMask::ALL; MAX_COLOR_BUFFERS]
}

// Triangle fully inside the viewport (spec scenario 1): a 16x16 viewport,
// depth test ALWAYS, depth write on, clear depth 1. The three triangle
// corners land on pixels (1,1), (10,1) and (5,10); NDC is derived
// algebraically from those pixel targets under the viewport's standard
// (non-identity) mapping rather than copied verbatim, since the literal
// numbers the scenario names are an order of magnitude outside the
// [-1, 1] clip volume and would otherwise just be clipped away.
#[test]
fn triangle_fully_inside_viewport_writes_depth_everywhere_it_covers() {
    let viewport = Viewport { x: 0.0, y: 0.0, width: 16.0, height: 16.0, min_depth: 0.0, max_depth: 1.0 };
    let to_ndc = |px: f32| (px - 8.0) / 8.0;

    let ctx = SetupContext {
        viewport,
        scissor: ScissorRect { x0: 0, x1: 16, y0: 0, y1: 16 },
        cull_mode: CullMode::None,
        front_face_ccw: true,
        depth_bias_constant: 0.0,
        depth_bias_slope: 0.0,
        depth_bias_clamp: 0.0,
        depth_is_float: false,
        line_width: 1.0,
        sample_count: 1,
        flat_interpolants: 0,
        config: rasta_core::config::PipelineConfig::default(),
    };

    let corners = [(1.0f32, 1.0f32), (10.0, 1.0), (5.0, 10.0)];
    let positions: Vec<Vec4<f32>> = corners.iter().map(|&(x, y)| Vec4::new(to_ndc(x), to_ndc(y), 0.5, 1.0)).collect();

    let vertex_kernel = move |idx: u32, _: &(dyn Any + Send + Sync)| -> Vertex { Vertex::new(positions[idx as usize], 0) };
    let vertex_kernel: Arc<dyn rasta_core::kernel::VertexKernel> = Arc::new(vertex_kernel);
    let pixel_kernel: Arc<dyn rasta_core::kernel::PixelKernel> = Arc::new(|_: &FragmentInput| FragmentOutput::default());

    let key = PixelStateKey {
        topology: Topology::TriangleList,
        polygon_mode: PolygonMode::Fill,
        cull_mode: CullMode::None,
        depth_test: Some(CompareOp::Always),
        depth_write: true,
        depth_bounds_test: false,
        stencil_test: None,
        blend: no_blend(),
        logic_op: None,
        write_mask: no_write_mask(),
        format: [None; MAX_COLOR_BUFFERS],
        sample_count: 1,
        sample_mask: !0,
        alpha_to_coverage: false,
        flat_interpolants: 0,
        occlusion_query: false,
    };

    let depth = Arc::new(Buffer2d::new([16, 16], 1.0f32));
    let mut targets = DrawTargets::none();
    targets.depth = Some(depth.clone());

    let scheduler = Scheduler::new(4);
    scheduler
        .draw(
            vertex_kernel,
            pixel_kernel,
            Arc::new(()),
            Topology::TriangleList,
            IndexSource::None,
            0,
            3,
            ctx,
            key,
            DynamicState::default(),
            targets,
            false,
            None,
            None,
        )
        .unwrap();
    scheduler.synchronize();

    let mut touched = false;
    for y in 0..16usize {
        for x in 0..16usize {
            let d = unsafe { depth.read_exclusive_unchecked([x, y], 0) };
            assert!(d == 1.0 || d == 0.5, "depth at ({x},{y}) was neither the clear value nor the written one: {d}");
            touched |= d == 0.5;
        }
    }
    assert!(touched, "the triangle should have covered at least one pixel");

    // Corners of the buffer, well outside the triangle's bounding box,
    // must stay at the clear value.
    for pos in [[0, 0], [15, 0], [0, 15], [15, 15]] {
        assert_eq!(unsafe { depth.read_exclusive_unchecked(pos, 0) }, 1.0);
    }
}

// 1000 triangles drawn in a single draw call, all covering the same
// pixel, each carrying its triangle index as a flat color component
// (spec scenario 3). The per-pixel ordering invariant guarantees the
// surviving color is always the highest-index triangle's, independent
// of how many worker threads/clusters happened to be available.
#[test]
fn last_of_a_thousand_overlapping_triangles_wins_the_pixel() {
    const TRIANGLE_COUNT: u32 = 1000;

    let viewport = Viewport { x: 0.0, y: 0.0, width: 8.0, height: 8.0, min_depth: 0.0, max_depth: 1.0 };
    let ctx = SetupContext {
        viewport,
        scissor: ScissorRect { x0: 0, x1: 8, y0: 0, y1: 8 },
        cull_mode: CullMode::None,
        front_face_ccw: true,
        depth_bias_constant: 0.0,
        depth_bias_slope: 0.0,
        depth_bias_clamp: 0.0,
        depth_is_float: false,
        line_width: 1.0,
        sample_count: 1,
        flat_interpolants: 0,
        config: rasta_core::config::PipelineConfig::default(),
    };

    // A triangle well inside an 8x8 canvas, safely covering pixel (4, 4)
    // with margin rather than skimming its apex past it.
    let corners = [Vec4::new(-0.75f32, -0.75, 0.5, 1.0), Vec4::new(0.75, -0.75, 0.5, 1.0), Vec4::new(0.0, 0.75, 0.5, 1.0)];

    let vertex_kernel = move |idx: u32, _: &(dyn Any + Send + Sync)| -> Vertex {
        let triangle = idx / 3;
        let corner = (idx % 3) as usize;
        let mut v = Vertex::new(corners[corner], 1);
        v.interpolants[0] = triangle as f32;
        v
    };
    let vertex_kernel: Arc<dyn rasta_core::kernel::VertexKernel> = Arc::new(vertex_kernel);
    let pixel_kernel = |input: &FragmentInput| -> FragmentOutput {
        let mut out = FragmentOutput::default();
        out.color[0] = [input.interpolants[0], 0.0, 0.0, 1.0];
        out
    };
    let pixel_kernel: Arc<dyn rasta_core::kernel::PixelKernel> = Arc::new(pixel_kernel);

    let key = PixelStateKey {
        topology: Topology::TriangleList,
        polygon_mode: PolygonMode::Fill,
        cull_mode: CullMode::None,
        depth_test: None,
        depth_write: false,
        depth_bounds_test: false,
        stencil_test: None,
        blend: no_blend(),
        logic_op: None,
        write_mask: no_write_mask(),
        format: [None; MAX_COLOR_BUFFERS],
        sample_count: 1,
        sample_mask: !0,
        alpha_to_coverage: false,
        flat_interpolants: 0,
        occlusion_query: false,
    };

    let color = Arc::new(Buffer2d::new([8, 8], [0.0f32; 4]));
    let mut targets = DrawTargets::none();
    targets.color[0] = Some(color.clone());

    let scheduler = Scheduler::new(4);
    scheduler
        .draw(
            vertex_kernel,
            pixel_kernel,
            Arc::new(()),
            Topology::TriangleList,
            IndexSource::None,
            0,
            (TRIANGLE_COUNT * 3) as usize,
            ctx,
            key,
            DynamicState::default(),
            targets,
            false,
            None,
            None,
        )
        .unwrap();
    scheduler.synchronize();

    let got = unsafe { color.read_exclusive_unchecked([4, 4], 0) };
    assert_eq!(got, [(TRIANGLE_COUNT - 1) as f32, 0.0, 0.0, 1.0]);
}

// Occlusion query (spec scenario 4): a triangle covering the entire
// 100x100 viewport, drawn nearer, then again drawn farther with depth
// test LESS. Each draw's occlusion counter should equal exactly the
// fragment count that passed its own depth test.
#[test]
fn occluded_draw_contributes_nothing_to_its_occlusion_count() {
    let viewport = Viewport { x: 0.0, y: 0.0, width: 100.0, height: 100.0, min_depth: 0.0, max_depth: 1.0 };
    let ctx = SetupContext {
        viewport,
        scissor: ScissorRect { x0: 0, x1: 100, y0: 0, y1: 100 },
        cull_mode: CullMode::None,
        front_face_ccw: true,
        depth_bias_constant: 0.0,
        depth_bias_slope: 0.0,
        depth_bias_clamp: 0.0,
        depth_is_float: false,
        line_width: 1.0,
        sample_count: 1,
        flat_interpolants: 0,
        config: rasta_core::config::PipelineConfig::default(),
    };

    // Classic "fullscreen triangle": extends past the view frustum on two
    // sides so that after clipping, the polygon is exactly the visible
    // square.
    let fullscreen = |z: f32| -> Vec<Vec4<f32>> {
        vec![Vec4::new(-1.0, -1.0, z, 1.0), Vec4::new(3.0, -1.0, z, 1.0), Vec4::new(-1.0, 3.0, z, 1.0)]
    };

    let depth = Arc::new(Buffer2d::new([100, 100], 1.0f32));
    let scheduler = Scheduler::new(4);

    let key = |occlusion_query: bool| PixelStateKey {
        topology: Topology::TriangleList,
        polygon_mode: PolygonMode::Fill,
        cull_mode: CullMode::None,
        depth_test: Some(CompareOp::Less),
        depth_write: true,
        depth_bounds_test: false,
        stencil_test: None,
        blend: no_blend(),
        logic_op: None,
        write_mask: no_write_mask(),
        format: [None; MAX_COLOR_BUFFERS],
        sample_count: 1,
        sample_mask: !0,
        alpha_to_coverage: false,
        flat_interpolants: 0,
        occlusion_query,
    };

    let draw_at = |z: f32| -> u64 {
        let positions = fullscreen(z);
        let vertex_kernel = move |idx: u32, _: &(dyn Any + Send + Sync)| -> Vertex { Vertex::new(positions[idx as usize], 0) };
        let vertex_kernel: Arc<dyn rasta_core::kernel::VertexKernel> = Arc::new(vertex_kernel);
        let pixel_kernel: Arc<dyn rasta_core::kernel::PixelKernel> = Arc::new(|_: &FragmentInput| FragmentOutput::default());

        let mut targets = DrawTargets::none();
        targets.depth = Some(depth.clone());

        let counter = Arc::new(AtomicU64::new(0));
        scheduler
            .draw(
                vertex_kernel,
                pixel_kernel,
                Arc::new(()),
                Topology::TriangleList,
                IndexSource::None,
                0,
                3,
                ctx,
                key(true),
                DynamicState::default(),
                targets,
                false,
                Some(counter.clone()),
                None,
            )
            .unwrap();
        scheduler.synchronize();
        counter.load(Ordering::Relaxed)
    };

    let near_count = draw_at(0.3);
    assert_eq!(near_count, 100 * 100);

    let far_count = draw_at(0.7);
    assert_eq!(far_count, 0);
}
