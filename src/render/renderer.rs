use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::foundation::error::{RasterError, RasterResult};
use crate::optimizer::engine::{CategoryId, Optimizer, Phase, RewriteEngine};
use crate::optimizer::{CanonicalCategories, register_canonical};
use crate::render::backend::PixelBackend;
use crate::render::schedule::{Batch, RenderThreading, build_batch, execute_batch};
use crate::render::software::SoftwareBackend;
use crate::surface::resource::{SurfaceDesc, SurfaceHandle, SurfaceResource, TargetToken};
use crate::task::mode::Mode;
use crate::task::node::{TaskHandle, TaskKind};

/// Aggregated counters for one render.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RenderStats {
    pub tasks_total: u64,
    pub tasks_failed: u64,
    pub rewrites: u64,
    /// Depth of the dependency partial order (longest chain + 1).
    pub waves: u64,
}

/// Holds the optimizer registry, backend modes and the execution driver.
///
/// A caller assembles a quality tier purely by choosing what to register: the
/// canonical pipeline plus the software backend (`Renderer::software`), a
/// subset of categories for a draft tier, or a different backend entirely.
pub struct Renderer {
    engine: RewriteEngine,
    modes: Vec<Mode>,
    backends: HashMap<TargetToken, Arc<dyn PixelBackend>>,
    threading: RenderThreading,
    canonical: Option<CanonicalCategories>,
}

impl Renderer {
    /// Empty renderer: no categories, rules, modes or backends.
    pub fn new() -> Self {
        Self {
            engine: RewriteEngine::new(),
            modes: Vec::new(),
            backends: HashMap::new(),
            threading: RenderThreading::default(),
            canonical: None,
        }
    }

    /// Full-quality software tier: canonical categories and rule families
    /// plus the CPU reference backend.
    pub fn software() -> RasterResult<Self> {
        let mut renderer = Self::new();
        let canonical = register_canonical(&mut renderer.engine)?;
        renderer.canonical = Some(canonical);
        renderer.register_backend(SoftwareBackend::new());
        Ok(renderer)
    }

    pub fn canonical_categories(&self) -> Option<CanonicalCategories> {
        self.canonical
    }

    pub fn register_category(
        &mut self,
        name: &'static str,
        phase: Phase,
        depends_from: &[CategoryId],
    ) -> RasterResult<CategoryId> {
        self.engine.register_category(name, phase, depends_from)
    }

    pub fn register_optimizer(&mut self, rule: Arc<dyn Optimizer>) -> RasterResult<()> {
        self.engine.register_optimizer(rule)
    }

    /// Register a capability mode without a backend (useful for optimizing
    /// trees that another process will execute).
    pub fn register_mode(&mut self, mode: Mode) {
        self.modes.push(mode);
    }

    /// Register a backend; its mode is registered along with it.
    pub fn register_backend(&mut self, backend: Arc<dyn PixelBackend>) {
        self.modes.push(backend.mode());
        self.backends.insert(backend.token(), backend);
    }

    pub fn set_threading(&mut self, threading: RenderThreading) {
        self.threading = threading;
    }

    fn mode_for(&self, root: &TaskHandle) -> RasterResult<Mode> {
        if let Some(surface) = root.target_surface() {
            if let Some(mode) = self.modes.iter().find(|m| m.token == surface.token()) {
                return Ok(*mode);
            }
            return Err(RasterError::validation(format!(
                "no mode registered for target token '{}'",
                surface.token()
            )));
        }
        self.modes.first().copied().ok_or_else(|| {
            RasterError::validation("no mode registered; register a backend or mode first")
        })
    }

    /// Rewrite the tree to its fixed point and assign surfaces, without
    /// executing anything. Returns the stable tree and the rewrite count.
    pub fn prepare(&self, root: &TaskHandle) -> RasterResult<(TaskHandle, u64)> {
        let mode = self.mode_for(root)?;
        let (tree, structural) = self
            .engine
            .optimize(root.clone(), &mode, Phase::Structural)?;
        let tree = assign_surfaces(&tree, &mode)?;
        let (tree, surface_phase) = self.engine.optimize(tree, &mode, Phase::Surface)?;
        Ok((tree, (structural + surface_phase) as u64))
    }

    /// Optimize, schedule and execute a task tree. Returns the overall
    /// success flag: `false` means some path failed while completed
    /// independent subtrees keep their pixels.
    pub fn run(&self, root: &TaskHandle) -> RasterResult<bool> {
        self.run_with_stats(root).map(|(ok, _)| ok)
    }

    pub fn run_with_stats(&self, root: &TaskHandle) -> RasterResult<(bool, RenderStats)> {
        if root.target_surface().is_none() && root.needs_surface() {
            warn!("root task has no external target surface; output will not be observable");
        }
        let mode = self.mode_for(root)?;
        let (tree, rewrites) = self.prepare(root)?;
        let batch = build_batch(&tree, &mode);
        validate_batch(&batch)?;
        debug!(
            tasks = batch.len(),
            rewrites, "executing batch"
        );
        let outcome = execute_batch(&batch, &self.backends, &mode, &self.threading)?;
        let stats = RenderStats {
            tasks_total: batch.len() as u64,
            tasks_failed: outcome.tasks_failed as u64,
            rewrites,
            waves: batch
                .params
                .iter()
                .map(|p| p.batch_index + 1)
                .max()
                .unwrap_or(0) as u64,
        };
        Ok((outcome.success, stats))
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Structural validity gate run before execution: every pixel-producing task
/// with established coordinates must own a surface large enough for its
/// rect. Rewrites are supposed to guarantee this; a violation here is a bug
/// in a rule, reported rather than silently corrupting pixels.
fn validate_batch(batch: &Batch) -> RasterResult<()> {
    for task in &batch.tasks {
        if task.needs_surface() && task.is_valid_coords() && !task.is_valid() {
            return Err(RasterError::validation(format!(
                "'{}' task has coordinates but no containing surface",
                task.kind().name()
            )));
        }
        task.check_containment()?;
    }
    Ok(())
}

/// Give every pixel-producing task a target surface.
///
/// Members of a list (or layer) draw into the list's own surface; everything
/// else that lacks a surface gets a fresh scratch buffer covering its pixel
/// rect. Shared nodes are assigned once (first visit wins) so structural
/// sharing survives.
fn assign_surfaces(root: &TaskHandle, mode: &Mode) -> RasterResult<TaskHandle> {
    let mut memo: HashMap<usize, TaskHandle> = HashMap::new();
    assign_memo(root, None, mode, &mut memo)
}

fn assign_memo(
    task: &TaskHandle,
    inherited: Option<&SurfaceHandle>,
    mode: &Mode,
    memo: &mut HashMap<usize, TaskHandle>,
) -> RasterResult<TaskHandle> {
    let key = Arc::as_ptr(task) as usize;
    if let Some(done) = memo.get(&key) {
        return Ok(done.clone());
    }

    let surface: Option<SurfaceHandle> = if let Some(existing) = task.target_surface() {
        Some(existing.clone())
    } else if !task.needs_surface() || !task.is_valid_coords() {
        None
    } else if let Some(inh) = inherited
        && inh.contains(task.target_rect())
    {
        Some(inh.clone())
    } else {
        let rect = task.target_rect();
        Some(SurfaceResource::new_scratch(
            SurfaceDesc {
                width: rect.x1 as u32,
                height: rect.y1 as u32,
            },
            mode.token,
        ))
    };

    let pass_down = match task.kind() {
        TaskKind::List | TaskKind::Layer => surface.as_ref(),
        _ => None,
    };
    let mut children = Vec::with_capacity(task.sub_tasks().len());
    for child in task.sub_tasks() {
        children.push(assign_memo(child, pass_down, mode, memo)?);
    }

    let rebuilt = task
        .with_target_surface(surface)
        .with_sub_tasks(children);
    rebuilt.check_containment()?;
    memo.insert(key, rebuilt.clone());
    Ok(rebuilt)
}

#[cfg(test)]
#[path = "../../tests/unit/render/renderer.rs"]
mod tests;
