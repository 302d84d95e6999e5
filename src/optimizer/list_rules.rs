use std::sync::Arc;

use crate::foundation::geometry::RectInt;
use crate::optimizer::engine::{
    CategoryId, Optimizer, OptimizerInfo, RepeatFlags, Rewrite, RewriteCtx, Traversal,
};
use crate::surface::resource::SurfaceHandle;
use crate::task::node::{Task, TaskHandle, TaskKind};

/// A layer grouping has no pixel semantics of its own; it becomes a plain
/// list so the list rules below can work on it.
pub struct LayerDissolve {
    category: CategoryId,
}

impl LayerDissolve {
    pub fn new(category: CategoryId) -> Arc<dyn Optimizer> {
        Arc::new(Self { category })
    }
}

impl Optimizer for LayerDissolve {
    fn name(&self) -> &'static str {
        "layer-dissolve"
    }

    fn info(&self) -> OptimizerInfo {
        OptimizerInfo {
            category: self.category,
            traversal: Traversal::ForTask,
            deep_first: true,
            repeat: RepeatFlags::NONE,
        }
    }

    fn run(&self, ctx: &RewriteCtx<'_>) -> Rewrite {
        if matches!(ctx.task.kind(), TaskKind::Layer) {
            Rewrite::Replace(ctx.task.with_kind(TaskKind::List))
        } else {
            Rewrite::Unchanged
        }
    }
}

/// May the members of `child` be lifted into `parent`'s target? True when
/// the child has no surface yet, already shares the parent's surface, or
/// stages through an owned scratch buffer nobody external has observed.
fn splice_allowed(parent: &Task, child: &Task) -> bool {
    match (parent.target_surface(), child.target_surface()) {
        (_, None) => true,
        (Some(p), Some(c)) => Arc::ptr_eq(p, c) || c.is_scratch(),
        (None, Some(_)) => false,
    }
}

/// Move a task that wrote into `from` so it writes into `to` instead. All
/// rects live in one pixel space, so placement carries over unchanged;
/// declines when the placement does not fit the new surface.
fn retarget(task: &TaskHandle, from: &SurfaceHandle, to: &SurfaceHandle) -> Option<TaskHandle> {
    match task.target_surface() {
        Some(s) if Arc::ptr_eq(s, from) => {
            if task.target_rect().is_valid() && !to.contains(task.target_rect()) {
                return None;
            }
            Some(task.with_target_surface(Some(to.clone())))
        }
        _ => Some(task.clone()),
    }
}

/// Nested lists are spliced depth-first into their parent, preserving
/// left-to-right order. A child list that staged through a temporary surface
/// is folded to share the parent's target, removing the intermediate
/// allocation.
pub struct ListFlatten {
    category: CategoryId,
}

impl ListFlatten {
    pub fn new(category: CategoryId) -> Arc<dyn Optimizer> {
        Arc::new(Self { category })
    }
}

impl Optimizer for ListFlatten {
    fn name(&self) -> &'static str {
        "list-flatten"
    }

    fn info(&self) -> OptimizerInfo {
        OptimizerInfo {
            category: self.category,
            traversal: Traversal::ForTask,
            deep_first: true,
            repeat: RepeatFlags::REPEAT_LAST,
        }
    }

    fn run(&self, ctx: &RewriteCtx<'_>) -> Rewrite {
        let task = ctx.task;
        if !matches!(task.kind(), TaskKind::List) {
            return Rewrite::Unchanged;
        }
        let mut changed = false;
        let mut out: Vec<TaskHandle> = Vec::with_capacity(task.sub_tasks().len());
        for child in task.sub_tasks() {
            let spliceable = matches!(child.kind(), TaskKind::List)
                && child.blend_into().is_none()
                && splice_allowed(task, child);
            if !spliceable {
                out.push(child.clone());
                continue;
            }
            let mut lifted = Vec::with_capacity(child.sub_tasks().len());
            let mut ok = true;
            for member in child.sub_tasks() {
                let moved = match (child.target_surface(), task.target_surface()) {
                    (Some(from), Some(to)) if !Arc::ptr_eq(from, to) => {
                        retarget(member, from, to)
                    }
                    _ => Some(member.clone()),
                };
                match moved {
                    Some(m) => lifted.push(m),
                    None => {
                        ok = false;
                        break;
                    }
                }
            }
            if ok {
                out.extend(lifted);
                changed = true;
            } else {
                out.push(child.clone());
            }
        }
        if changed {
            Rewrite::Replace(task.with_sub_tasks(out))
        } else {
            Rewrite::Unchanged
        }
    }
}

/// A single-member list is the member itself, promoted into the list's slot.
pub struct ListUnwrap {
    category: CategoryId,
}

impl ListUnwrap {
    pub fn new(category: CategoryId) -> Arc<dyn Optimizer> {
        Arc::new(Self { category })
    }
}

impl Optimizer for ListUnwrap {
    fn name(&self) -> &'static str {
        "list-unwrap"
    }

    fn info(&self) -> OptimizerInfo {
        OptimizerInfo {
            category: self.category,
            traversal: Traversal::ForTask,
            deep_first: true,
            repeat: RepeatFlags::NONE,
        }
    }

    fn run(&self, ctx: &RewriteCtx<'_>) -> Rewrite {
        let task = ctx.task;
        if !matches!(task.kind(), TaskKind::List) || task.sub_tasks().len() != 1 {
            return Rewrite::Unchanged;
        }
        let child = &task.sub_tasks()[0];
        if matches!(child.kind(), TaskKind::Event(_)) {
            return Rewrite::Unchanged;
        }
        match crate::optimizer::blend_rules::into_slot(task, child) {
            Some(promoted) => Rewrite::Replace(promoted),
            None => Rewrite::Unchanged,
        }
    }
}

/// Drop list members that are identity surface copies: a `Surface` task
/// whose source is the very resource it targets moves no pixels.
pub struct StageCollapse {
    category: CategoryId,
}

impl StageCollapse {
    pub fn new(category: CategoryId) -> Arc<dyn Optimizer> {
        Arc::new(Self { category })
    }
}

impl Optimizer for StageCollapse {
    fn name(&self) -> &'static str {
        "stage-collapse"
    }

    fn info(&self) -> OptimizerInfo {
        OptimizerInfo {
            category: self.category,
            traversal: Traversal::ForTask,
            deep_first: true,
            repeat: RepeatFlags::NONE,
        }
    }

    fn run(&self, ctx: &RewriteCtx<'_>) -> Rewrite {
        let task = ctx.task;
        if !matches!(task.kind(), TaskKind::List) {
            return Rewrite::Unchanged;
        }
        let mut out = Vec::with_capacity(task.sub_tasks().len());
        let mut changed = false;
        for child in task.sub_tasks() {
            let identity_copy = child.blend_into().is_none()
                && matches!(
                    (child.kind(), child.target_surface()),
                    (TaskKind::Surface(src), Some(dst)) if Arc::ptr_eq(src, dst)
                );
            if identity_copy {
                changed = true;
            } else {
                out.push(child.clone());
            }
        }
        if changed {
            Rewrite::Replace(task.with_sub_tasks(out))
        } else {
            Rewrite::Unchanged
        }
    }
}

/// Partition a splittable task over a tall rect into row bands inside a
/// list. The bands share one surface and write disjoint rects, which the
/// simultaneous-write mode capability makes legal to run concurrently.
pub struct RegionSplit {
    category: CategoryId,
    band_height: i32,
}

impl RegionSplit {
    pub fn new(category: CategoryId) -> Arc<dyn Optimizer> {
        Arc::new(Self {
            category,
            band_height: 64,
        })
    }

    pub fn with_band_height(category: CategoryId, band_height: i32) -> Arc<dyn Optimizer> {
        Arc::new(Self {
            category,
            band_height: band_height.max(1),
        })
    }
}

impl Optimizer for RegionSplit {
    fn name(&self) -> &'static str {
        "region-split"
    }

    fn info(&self) -> OptimizerInfo {
        OptimizerInfo {
            category: self.category,
            traversal: Traversal::ForTask,
            deep_first: false,
            repeat: RepeatFlags::NONE,
        }
    }

    fn run(&self, ctx: &RewriteCtx<'_>) -> Rewrite {
        if !ctx.mode.allow_simultaneous_write {
            return Rewrite::Unchanged;
        }
        let task = ctx.task;
        if !task.kind().is_splittable() || task.target_surface().is_none() {
            return Rewrite::Unchanged;
        }
        let rect = task.target_rect();
        if !rect.is_valid() || rect.height() <= self.band_height {
            return Rewrite::Unchanged;
        }

        let mut bands = Vec::new();
        let mut y = rect.y0;
        while y < rect.y1 {
            let band = RectInt::new(rect.x0, y, rect.x1, (y + self.band_height).min(rect.y1));
            bands.push(task.trunc_target_rect(band));
            y += self.band_height;
        }
        Rewrite::Replace(task.with_kind(TaskKind::List).with_sub_tasks(bands))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/optimizer/list_rules.rs"]
mod tests;
