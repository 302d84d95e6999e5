use super::*;

use kurbo::Rect;

use crate::foundation::color::Rgba;
use crate::foundation::geometry::RectInt;
use crate::render::software::{SOFTWARE_TOKEN, SoftwareBackend};
use crate::surface::resource::{SurfaceDesc, SurfaceHandle, SurfaceResource};
use crate::task::event::EventSignal;
use crate::task::node::Task;

fn red() -> Rgba {
    Rgba::from_straight(1.0, 0.0, 0.0, 1.0)
}

fn external(width: u32, height: u32) -> SurfaceHandle {
    SurfaceResource::new_external(SurfaceDesc { width, height }, SOFTWARE_TOKEN)
}

fn placed(task: TaskHandle, rect: RectInt, surface: &SurfaceHandle) -> TaskHandle {
    task.with_rects(Rect::new(0.0, 0.0, 1.0, 1.0), rect)
        .with_target_surface(Some(surface.clone()))
}

fn software_backends() -> HashMap<TargetToken, Arc<dyn PixelBackend>> {
    let backend: Arc<dyn PixelBackend> = SoftwareBackend::new();
    HashMap::from([(backend.token(), backend)])
}

fn software_mode() -> Mode {
    SoftwareBackend::new().mode()
}

#[test]
fn batches_are_producer_first_and_deduplicated() {
    let surface = external(4, 4);
    let shared = placed(Task::solid(red()), RectInt::new(0, 0, 4, 4), &surface);
    let root = placed(
        Task::list(vec![shared.clone(), shared]),
        RectInt::new(0, 0, 4, 4),
        &surface,
    );

    let batch = build_batch(&root, &software_mode());
    assert_eq!(batch.len(), 2);
    assert!(matches!(batch.tasks[0].kind(), TaskKind::Solid(_)));
    assert!(matches!(batch.tasks[1].kind(), TaskKind::List));
    assert_eq!(batch.params[1].deps, vec![0]);
    assert_eq!(batch.params[0].back_deps, vec![1]);
    assert_eq!(batch.params[0].batch_index, 0);
    assert_eq!(batch.params[1].batch_index, 1);
}

#[test]
fn writers_to_one_surface_are_ordered_unless_disjoint_writes_are_allowed() {
    let surface = external(8, 8);
    let first = placed(Task::solid(red()), RectInt::new(0, 0, 8, 4), &surface);
    let second = placed(Task::solid(red()), RectInt::new(0, 4, 8, 8), &surface);
    let root = placed(
        Task::list(vec![first, second]),
        RectInt::new(0, 0, 8, 8),
        &surface,
    );

    let mut serial = software_mode();
    serial.allow_simultaneous_write = false;
    let batch = build_batch(&root, &serial);
    // second solid waits for the first
    assert!(batch.params[1].deps.contains(&0));

    let batch = build_batch(&root, &software_mode());
    assert!(!batch.params[1].deps.contains(&0));
    // the rects are disjoint, so both solids land in the first wave
    assert_eq!(batch.params[0].batch_index, 0);
    assert_eq!(batch.params[1].batch_index, 0);
}

#[test]
fn overlapping_writers_stay_ordered_even_with_simultaneous_writes() {
    let surface = external(8, 8);
    let first = placed(Task::solid(red()), RectInt::new(0, 0, 8, 8), &surface);
    let second = placed(Task::solid(red()), RectInt::new(0, 4, 8, 8), &surface);
    let root = placed(
        Task::list(vec![first, second]),
        RectInt::new(0, 0, 8, 8),
        &surface,
    );
    let batch = build_batch(&root, &software_mode());
    assert!(batch.params[1].deps.contains(&0));
}

#[test]
fn surface_copies_wait_for_the_writer_of_their_source() {
    let stage = SurfaceResource::new_scratch(SurfaceDesc { width: 4, height: 4 }, SOFTWARE_TOKEN);
    let target = external(4, 4);
    let fill = placed(Task::solid(red()), RectInt::new(0, 0, 4, 4), &stage);
    let copy = placed(Task::surface(stage.clone()), RectInt::new(0, 0, 4, 4), &target);
    let root = placed(
        Task::list(vec![fill, copy]),
        RectInt::new(0, 0, 4, 4),
        &target,
    );

    let mode = software_mode();
    let batch = build_batch(&root, &mode);
    assert!(matches!(batch.tasks[0].kind(), TaskKind::Solid(_)));
    assert!(matches!(batch.tasks[1].kind(), TaskKind::Surface(_)));
    // the copy samples the stage, so it must wait for the fill even though
    // the fill is a sibling rather than one of its children
    assert!(batch.params[1].deps.contains(&0));
    assert_eq!(batch.params[0].batch_index, 0);
    assert_eq!(batch.params[1].batch_index, 1);

    let outcome = execute_batch(
        &batch,
        &software_backends(),
        &mode,
        &RenderThreading {
            parallel: true,
            threads: Some(4),
        },
    )
    .unwrap();
    assert!(outcome.success);
    let px = target.read().unwrap();
    assert!(px.iter().all(|p| p.approx_eq(red(), 1e-5)));
}

#[test]
fn event_tasks_are_never_a_dependency_of_others() {
    let surface = external(4, 4);
    let work = placed(Task::solid(red()), RectInt::new(0, 0, 4, 4), &surface);
    let event = Task::event(EventSignal::new(), vec![work.clone()]);
    let root = placed(
        Task::list(vec![work, event.clone()]),
        RectInt::new(0, 0, 4, 4),
        &surface,
    );

    let batch = build_batch(&root, &software_mode());
    let event_idx = batch
        .tasks
        .iter()
        .position(|t| matches!(t.kind(), TaskKind::Event(_)))
        .unwrap();
    // the event waits for the solid, but the list does not wait for the event
    assert!(!batch.params[event_idx].deps.is_empty());
    for (idx, params) in batch.params.iter().enumerate() {
        if idx != event_idx {
            assert!(!params.deps.contains(&event_idx));
        }
    }
}

#[test]
fn sequential_execution_renders_and_fires_events() {
    let surface = external(2, 2);
    let signal = EventSignal::new();
    let work = placed(Task::solid(red()), RectInt::new(0, 0, 2, 2), &surface);
    let event = Task::event(signal.clone(), vec![work.clone()]);
    let root = placed(
        Task::list(vec![work, event]),
        RectInt::new(0, 0, 2, 2),
        &surface,
    );

    let mode = software_mode();
    let batch = build_batch(&root, &mode);
    let outcome = execute_batch(&batch, &software_backends(), &mode, &RenderThreading::default())
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.tasks_failed, 0);
    assert_eq!(signal.try_get(), Some(true));
    let px = surface.read().unwrap();
    assert!(px[0].approx_eq(red(), 1e-5));
}

#[test]
fn parallel_execution_matches_the_sequential_result() {
    let mode = software_mode();
    let render = |threading: &RenderThreading| {
        let surface = external(8, 8);
        let left = placed(Task::solid(red()), RectInt::new(0, 0, 4, 8), &surface);
        let right = placed(
            Task::solid(Rgba::from_straight(0.0, 1.0, 0.0, 1.0)),
            RectInt::new(4, 0, 8, 8),
            &surface,
        );
        let root = placed(
            Task::list(vec![left, right]),
            RectInt::new(0, 0, 8, 8),
            &surface,
        );
        let batch = build_batch(&root, &mode);
        assert!(execute_batch(&batch, &software_backends(), &mode, threading).unwrap().success);
        surface.read().unwrap().clone()
    };

    let sequential = render(&RenderThreading::default());
    let parallel = render(&RenderThreading {
        parallel: true,
        threads: Some(4),
    });
    assert_eq!(sequential.len(), parallel.len());
    for (s, p) in sequential.iter().zip(&parallel) {
        assert!(s.approx_eq(*p, 1e-6));
    }
}

/// Reports failure for every task without erroring.
struct RefusingBackend;

const REFUSING_TOKEN: TargetToken = TargetToken("refusing");

impl PixelBackend for RefusingBackend {
    fn token(&self) -> TargetToken {
        REFUSING_TOKEN
    }

    fn mode(&self) -> Mode {
        Mode::strict(REFUSING_TOKEN)
    }

    fn run_task(&self, _task: &Task) -> crate::foundation::error::RasterResult<bool> {
        Ok(false)
    }
}

#[test]
fn failures_poison_dependents_and_settle_events_as_failed() {
    let surface = SurfaceResource::new_external(SurfaceDesc { width: 2, height: 2 }, REFUSING_TOKEN);
    let signal = EventSignal::new();
    let work = placed(Task::solid(red()), RectInt::new(0, 0, 2, 2), &surface);
    let event = Task::event(signal.clone(), vec![work.clone()]);
    let root = placed(
        Task::list(vec![work, event]),
        RectInt::new(0, 0, 2, 2),
        &surface,
    );

    let mode = Mode::strict(REFUSING_TOKEN);
    let backend: Arc<dyn PixelBackend> = Arc::new(RefusingBackend);
    let backends = HashMap::from([(REFUSING_TOKEN, backend)]);
    let batch = build_batch(&root, &mode);
    let outcome = execute_batch(&batch, &backends, &mode, &RenderThreading::default()).unwrap();
    assert!(!outcome.success);
    // the solid fails outright, the event and the list are poisoned
    assert_eq!(outcome.tasks_failed, 3);
    assert_eq!(signal.try_get(), Some(false));
}

#[test]
fn missing_backend_is_a_validation_error() {
    let surface = external(2, 2);
    let root = placed(Task::solid(red()), RectInt::new(0, 0, 2, 2), &surface);
    let mode = software_mode();
    let batch = build_batch(&root, &mode);
    let err = execute_batch(&batch, &HashMap::new(), &mode, &RenderThreading::default())
        .unwrap_err();
    assert!(err.to_string().contains("no backend registered"));
}

#[test]
fn zero_thread_pools_are_rejected() {
    assert!(build_thread_pool(Some(0)).is_err());
    assert!(build_thread_pool(Some(2)).is_ok());
    assert!(build_thread_pool(None).is_ok());
}
