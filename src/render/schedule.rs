use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::foundation::error::{RasterError, RasterResult};
use crate::render::backend::PixelBackend;
use crate::surface::resource::TargetToken;
use crate::task::mode::Mode;
use crate::task::node::{TaskHandle, TaskKind};

/// Per-task scheduling record, built once the tree is stable.
#[derive(Clone, Debug, Default)]
pub struct RunParams {
    /// Batch indices of tasks this one must wait for (it reads their
    /// surfaces, or writes a surface after them).
    pub deps: Vec<usize>,
    /// Inverse edges: tasks waiting on this one.
    pub back_deps: Vec<usize>,
    /// Longest dependency chain below this task; 0 for sources. Useful for
    /// reporting and wave sizing, not for correctness.
    pub batch_index: usize,
}

/// Flattened, deduplicated render batch over a stable tree.
#[derive(Debug, Default)]
pub struct Batch {
    pub tasks: Vec<TaskHandle>,
    pub params: Vec<RunParams>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Flatten reachable tasks children-first (so producers precede consumers),
/// deduplicating shared nodes by identity, then compute the dependency
/// partial order:
///
/// - a task depends on each of its children (it reads their surfaces);
/// - a surface task also reads its source resource, so it waits for that
///   resource's latest writer even when the writer is not a child;
/// - a writer depends on earlier readers of its surface, and on the previous
///   writer unless the mode allows simultaneous writes and the rects are
///   disjoint.
///
/// Event tasks keep their own deps (that is their whole purpose) but are
/// never recorded as anyone else's dependency.
pub fn build_batch(root: &TaskHandle, mode: &Mode) -> Batch {
    let mut tasks: Vec<TaskHandle> = Vec::new();
    let mut index_of: HashMap<usize, usize> = HashMap::new();

    fn walk(
        task: &TaskHandle,
        tasks: &mut Vec<TaskHandle>,
        index_of: &mut HashMap<usize, usize>,
    ) -> usize {
        let key = Arc::as_ptr(task) as usize;
        if let Some(&idx) = index_of.get(&key) {
            return idx;
        }
        for child in task.sub_tasks() {
            walk(child, tasks, index_of);
        }
        let idx = tasks.len();
        tasks.push(task.clone());
        index_of.insert(key, idx);
        idx
    }
    walk(root, &mut tasks, &mut index_of);

    let mut params: Vec<RunParams> = vec![RunParams::default(); tasks.len()];

    // Child edges.
    for (idx, task) in tasks.iter().enumerate() {
        for child in task.sub_tasks() {
            if matches!(child.kind(), TaskKind::Event(_)) {
                continue;
            }
            let child_idx = index_of[&(Arc::as_ptr(child) as usize)];
            if child_idx != idx && !params[idx].deps.contains(&child_idx) {
                params[idx].deps.push(child_idx);
            }
        }
    }

    // Surface hazards, in flattened (producer-first) order.
    let mut readers: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut writers: HashMap<usize, Vec<usize>> = HashMap::new();
    for (idx, task) in tasks.iter().enumerate() {
        // Events order on their children alone; they touch no pixels, so they
        // take part in no surface hazards.
        if matches!(task.kind(), TaskKind::Event(_)) {
            continue;
        }
        for child in task.sub_tasks() {
            if let Some(s) = child.target_surface() {
                let key = Arc::as_ptr(s) as usize;
                // Read-after-write: wait for the latest writer of every
                // surface this task samples, not only the child that owns it.
                if let Some(&w) = writers.get(&key).and_then(|ws| ws.last())
                    && w != idx
                    && !params[idx].deps.contains(&w)
                {
                    params[idx].deps.push(w);
                }
                readers.entry(key).or_default().push(idx);
            }
        }
        // A surface task samples its source resource without any child
        // producing it; register the read so the copy waits for the
        // resource's latest writer and later writers wait for the copy.
        if let TaskKind::Surface(source) = task.kind() {
            let key = Arc::as_ptr(source) as usize;
            if let Some(&w) = writers.get(&key).and_then(|ws| ws.last())
                && w != idx
                && !params[idx].deps.contains(&w)
            {
                params[idx].deps.push(w);
            }
            readers.entry(key).or_default().push(idx);
        }
        let Some(surface) = task.target_surface() else {
            continue;
        };
        let key = Arc::as_ptr(surface) as usize;
        let prior_writers = writers.entry(key).or_default();
        if let Some(&prev) = prior_writers.last() {
            let ordered = !mode.allow_simultaneous_write
                || !crate::foundation::geometry::rects_disjoint(
                    tasks[prev].target_rect(),
                    task.target_rect(),
                );
            if ordered && prev != idx && !params[idx].deps.contains(&prev) {
                params[idx].deps.push(prev);
            }
        }
        // Write-after-read: never clobber a surface a pending task still
        // reads from.
        if let Some(rs) = readers.get(&key) {
            for &r in rs {
                if r != idx && !params[idx].deps.contains(&r) {
                    params[idx].deps.push(r);
                }
            }
        }
        prior_writers.push(idx);
    }

    // Inverse edges and wave indices (tasks are producer-first, so deps
    // always point backwards).
    for idx in 0..tasks.len() {
        let deps = params[idx].deps.clone();
        let mut wave = 0usize;
        for d in deps {
            params[d].back_deps.push(idx);
            wave = wave.max(params[d].batch_index + 1);
        }
        params[idx].batch_index = wave;
    }

    Batch { tasks, params }
}

/// Threading controls for batch execution.
#[derive(Clone, Debug)]
pub struct RenderThreading {
    pub parallel: bool,
    pub threads: Option<usize>,
}

impl Default for RenderThreading {
    fn default() -> Self {
        Self {
            parallel: false,
            threads: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TaskState {
    Pending,
    Done(bool),
}

/// Result of one executed batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub success: bool,
    /// Tasks that reported failure, plus those poisoned by a failing
    /// dependency.
    pub tasks_failed: usize,
}

/// Execute a batch against the registered backends.
///
/// A task runs once all of its deps completed successfully. A failing task
/// (or one whose lock acquisition fails inside the kernel) poisons its
/// dependents but leaves unrelated work running; completed surfaces are
/// retained.
pub fn execute_batch(
    batch: &Batch,
    backends: &HashMap<TargetToken, Arc<dyn PixelBackend>>,
    mode: &Mode,
    threading: &RenderThreading,
) -> RasterResult<BatchOutcome> {
    let n = batch.len();
    let mut states = vec![TaskState::Pending; n];

    let pool = if threading.parallel {
        Some(build_thread_pool(threading.threads)?)
    } else {
        None
    };

    loop {
        let mut ready: Vec<usize> = Vec::new();
        let mut pending = 0usize;
        for idx in 0..n {
            if states[idx] != TaskState::Pending {
                continue;
            }
            pending += 1;
            let mut ok = true;
            let mut failed = false;
            for &d in &batch.params[idx].deps {
                match states[d] {
                    TaskState::Pending => ok = false,
                    TaskState::Done(false) => failed = true,
                    TaskState::Done(true) => {}
                }
            }
            if failed {
                // Poisoned path: the surface stays undefined, the signal (if
                // any) reports failure.
                if let TaskKind::Event(signal) = batch.tasks[idx].kind() {
                    signal.fire(false);
                }
                states[idx] = TaskState::Done(false);
                pending -= 1;
            } else if ok {
                ready.push(idx);
            }
        }

        if ready.is_empty() {
            if pending == 0 {
                break;
            }
            return Err(RasterError::pipeline(
                "dependency graph contains a cycle; no runnable task left",
            ));
        }

        match &pool {
            Some(pool) if mode.allow_multithreading && ready.len() > 1 => {
                let results: Vec<(usize, RasterResult<bool>)> = pool.install(|| {
                    ready
                        .par_iter()
                        .map(|&idx| (idx, run_one(&batch.tasks[idx], backends)))
                        .collect()
                });
                for (idx, result) in results {
                    states[idx] = TaskState::Done(result?);
                }
            }
            _ => {
                for idx in ready {
                    states[idx] = TaskState::Done(run_one(&batch.tasks[idx], backends)?);
                }
            }
        }
    }

    let failures = states
        .iter()
        .filter(|s| matches!(s, TaskState::Done(false)))
        .count();
    if failures > 0 {
        warn!(failures, total = n, "render completed with failed tasks");
    } else {
        debug!(total = n, "render completed");
    }
    Ok(BatchOutcome {
        success: failures == 0,
        tasks_failed: failures,
    })
}

fn run_one(
    task: &TaskHandle,
    backends: &HashMap<TargetToken, Arc<dyn PixelBackend>>,
) -> RasterResult<bool> {
    match task.kind() {
        TaskKind::Event(signal) => {
            // Deps settled successfully, otherwise the poison path would have
            // fired this already.
            signal.fire(true);
            Ok(true)
        }
        TaskKind::Empty | TaskKind::List | TaskKind::Layer => Ok(true),
        _ => {
            if !task.is_valid_coords() {
                // Nothing to draw; rewrites leave such nodes behind on
                // purpose rather than raising at runtime.
                return Ok(true);
            }
            let Some(surface) = task.target_surface() else {
                return Err(RasterError::validation(format!(
                    "'{}' task reached execution without a target surface",
                    task.kind().name()
                )));
            };
            let backend = backends.get(&surface.token()).ok_or_else(|| {
                RasterError::validation(format!(
                    "no backend registered for target token '{}'",
                    surface.token()
                ))
            })?;
            backend.run_task(task)
        }
    }
}

fn build_thread_pool(threads: Option<usize>) -> RasterResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(RasterError::validation(
            "render threading 'threads' must be >= 1 when set",
        ));
    }
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| RasterError::execution(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/render/schedule.rs"]
mod tests;
