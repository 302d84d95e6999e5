use std::sync::Arc;

use crate::optimizer::engine::{
    CategoryId, Optimizer, OptimizerInfo, RepeatFlags, Rewrite, RewriteCtx, Traversal,
};
use crate::task::node::{Task, TaskHandle, TaskKind};

fn transformation_child(task: &Task) -> Option<&TaskHandle> {
    task.sub_tasks().first()
}

/// A transformation over a transform-invariant constant collapses to the
/// retargeted constant: the content is unchanged by the warp, so the child
/// simply takes over the transformation node's slot and coordinates.
pub struct TransformConstant {
    category: CategoryId,
}

impl TransformConstant {
    pub fn new(category: CategoryId) -> Arc<dyn Optimizer> {
        Arc::new(Self { category })
    }
}

impl Optimizer for TransformConstant {
    fn name(&self) -> &'static str {
        "transform-constant"
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
        if !matches!(task.kind(), TaskKind::Transformation(_)) {
            return Rewrite::Unchanged;
        }
        let Some(child) = transformation_child(task) else {
            return Rewrite::Unchanged;
        };
        if !child.kind().is_transform_invariant() {
            return Rewrite::Unchanged;
        }
        Rewrite::Replace(child.with_coords_of(task))
    }
}

/// A transformation over another mergeable transformation composes the two
/// matrices into one node. Mergeability is verified before anything is
/// rebuilt; the composition order is outer · inner (the inner matrix applies
/// first).
pub struct TransformMerge {
    category: CategoryId,
}

impl TransformMerge {
    pub fn new(category: CategoryId) -> Arc<dyn Optimizer> {
        Arc::new(Self { category })
    }
}

impl Optimizer for TransformMerge {
    fn name(&self) -> &'static str {
        "transform-merge"
    }

    fn info(&self) -> OptimizerInfo {
        OptimizerInfo {
            category: self.category,
            traversal: Traversal::ForTask,
            deep_first: false,
            repeat: RepeatFlags::REPEAT_LAST,
        }
    }

    fn run(&self, ctx: &RewriteCtx<'_>) -> Rewrite {
        let task = ctx.task;
        let TaskKind::Transformation(outer) = task.kind() else {
            return Rewrite::Unchanged;
        };
        let Some(child) = transformation_child(task) else {
            return Rewrite::Unchanged;
        };
        // Mergeability: the child must itself be a plain transformation that
        // nothing else has folded blending state into.
        let TaskKind::Transformation(inner) = child.kind() else {
            return Rewrite::Unchanged;
        };
        if child.blend_into().is_some() {
            return Rewrite::Unchanged;
        }
        let merged = task
            .with_kind(TaskKind::Transformation(*outer * *inner))
            .with_sub_tasks(child.sub_tasks().to_vec());
        Rewrite::Replace(merged)
    }
}

/// A transformation over a blend distributes into both operands: the blend
/// floats up to the transformation's slot and each operand gets its own
/// transformation wrapper.
pub struct TransformDistribute {
    category: CategoryId,
}

impl TransformDistribute {
    pub fn new(category: CategoryId) -> Arc<dyn Optimizer> {
        Arc::new(Self { category })
    }
}

impl Optimizer for TransformDistribute {
    fn name(&self) -> &'static str {
        "transform-distribute"
    }

    fn info(&self) -> OptimizerInfo {
        OptimizerInfo {
            category: self.category,
            traversal: Traversal::ForTask,
            deep_first: false,
            repeat: RepeatFlags::RECURSIVE,
        }
    }

    fn run(&self, ctx: &RewriteCtx<'_>) -> Rewrite {
        let task = ctx.task;
        let TaskKind::Transformation(m) = task.kind() else {
            return Rewrite::Unchanged;
        };
        let Some(child) = transformation_child(task) else {
            return Rewrite::Unchanged;
        };
        if !matches!(child.kind(), TaskKind::Blend(_)) || child.blend_into().is_some() {
            return Rewrite::Unchanged;
        }
        let (Some(a), Some(b)) = (child.sub_a(), child.sub_b()) else {
            return Rewrite::Unchanged;
        };

        let wrap_a = Task::transformation(*m, a.clone()).with_coords_of(task);
        let wrap_b = Task::transformation(*m, b.clone()).with_coords_of(task);
        let blend = child
            .with_coords_of(task)
            .with_sub_tasks(vec![wrap_a, wrap_b]);
        Rewrite::Replace(blend)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/optimizer/transform_rules.rs"]
mod tests;
