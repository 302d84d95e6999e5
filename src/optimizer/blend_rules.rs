use std::sync::Arc;

use crate::foundation::geometry::{approx_one, approx_zero, rects_disjoint};
use crate::optimizer::engine::{
    CategoryId, Optimizer, OptimizerInfo, RepeatFlags, Rewrite, RewriteCtx, Traversal,
};
use crate::task::blend::{BlendMethod, BlendParams};
use crate::task::node::{Task, TaskHandle, TaskKind};

/// Can this node stand in as a blend operand? Empty nodes and nodes whose
/// coordinates collapsed to nothing contribute no pixels.
pub(crate) fn operand_usable(task: &Task) -> bool {
    !matches!(task.kind(), TaskKind::Empty) && task.is_valid_coords()
}

/// Promote `replacement` into the tree slot currently occupied by `slot`:
/// the replacement keeps its own rects and placement but inherits the slot's
/// surface when the slot has one. Declines (returns `None`) when the
/// replacement's rect would escape that surface.
pub(crate) fn into_slot(slot: &Task, replacement: &TaskHandle) -> Option<TaskHandle> {
    match slot.target_surface() {
        None => Some(replacement.clone()),
        Some(surface) => {
            if replacement.target_rect().is_valid() && !surface.contains(replacement.target_rect())
            {
                return None;
            }
            Some(replacement.with_target_surface(Some(surface.clone())))
        }
    }
}

fn empty_slot(slot: &Task) -> TaskHandle {
    Task::empty().with_coords_of(slot)
}

/// Zero/identity elimination for blends.
///
/// - amount ≈ 0: the result is operand A alone (or an explicit empty node
///   when A is invalid).
/// - operand B invalid: the result is operand A alone.
/// - operand A invalid with amount ≈ 1: the result is operand B for methods
///   that degenerate to a plain write over nothing; for onto methods the
///   result is empty.
/// - amount ≈ 1, onto method, disjoint operand rects: operand A alone.
/// - onto and straight with disjoint rects: empty.
pub struct BlendZero {
    category: CategoryId,
}

impl BlendZero {
    pub fn new(category: CategoryId) -> Arc<dyn Optimizer> {
        Arc::new(Self { category })
    }
}

impl Optimizer for BlendZero {
    fn name(&self) -> &'static str {
        "blend-zero"
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
        let TaskKind::Blend(params) = task.kind() else {
            return Rewrite::Unchanged;
        };
        let (Some(a), Some(b)) = (task.sub_a(), task.sub_b()) else {
            return Rewrite::Unchanged;
        };
        let a_ok = operand_usable(a);
        let b_ok = operand_usable(b);

        if approx_zero(params.amount) || !b_ok {
            let replacement = if a_ok {
                into_slot(task, &a.clone())
            } else {
                Some(empty_slot(task))
            };
            return match replacement {
                Some(r) => Rewrite::Replace(r),
                None => Rewrite::Unchanged,
            };
        }

        if !a_ok && approx_one(params.amount) {
            if params.method.is_onto() {
                return Rewrite::Replace(empty_slot(task));
            }
            if matches!(
                params.method,
                BlendMethod::Composite
                    | BlendMethod::Straight
                    | BlendMethod::Add
                    | BlendMethod::Behind
            ) && let Some(r) = into_slot(task, &b.clone())
            {
                return Rewrite::Replace(r);
            }
            return Rewrite::Unchanged;
        }

        if a_ok && b_ok && rects_disjoint(a.target_rect(), b.target_rect()) {
            if params.method.is_onto() && params.method.is_straight() {
                return Rewrite::Replace(empty_slot(task));
            }
            if params.method.is_onto()
                && approx_one(params.amount)
                && let Some(r) = into_slot(task, &a.clone())
            {
                return Rewrite::Replace(r);
            }
        }

        Rewrite::Unchanged
    }
}

/// Blend-into-blend fusion: `blend(m, ao, A, blend(m, ai, ∅, Y))` collapses
/// to `blend(m, ao·ai, A, Y)`. Amounts multiply; operand placements (the
/// summed offsets) are carried over untouched, never re-derived.
pub struct BlendMerge {
    category: CategoryId,
}

impl BlendMerge {
    pub fn new(category: CategoryId) -> Arc<dyn Optimizer> {
        Arc::new(Self { category })
    }
}

impl Optimizer for BlendMerge {
    fn name(&self) -> &'static str {
        "blend-merge"
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
        let TaskKind::Blend(outer) = task.kind() else {
            return Rewrite::Unchanged;
        };
        let (Some(a), Some(inner_task)) = (task.sub_a(), task.sub_b()) else {
            return Rewrite::Unchanged;
        };
        let TaskKind::Blend(inner) = inner_task.kind() else {
            return Rewrite::Unchanged;
        };
        if inner.method != outer.method || !outer.method.is_associative() {
            return Rewrite::Unchanged;
        }
        let (Some(inner_a), Some(inner_b)) = (inner_task.sub_a(), inner_task.sub_b()) else {
            return Rewrite::Unchanged;
        };
        if operand_usable(inner_a) {
            return Rewrite::Unchanged;
        }
        let fused = task.with_kind(TaskKind::Blend(BlendParams::new(
            outer.method,
            outer.amount * inner.amount,
        )));
        Rewrite::Replace(fused.with_sub_tasks(vec![a.clone(), inner_b.clone()]))
    }
}

fn surfaces_compatible(a: &Task, b: &Task) -> bool {
    match (a.target_surface(), b.target_surface()) {
        (None, None) => true,
        (Some(x), Some(y)) => x.token() == y.token(),
        _ => false,
    }
}

/// Associativity: `blend1(a, blend0(b, list(...)))` turns into
/// `list(blend0(a, b), ...)` when blend0's method is associative, blend1's
/// opacity is effectively 1 and the operand surfaces are compatible. A binary
/// chain becomes a flat, further-fusible list.
pub struct BlendAssociative {
    category: CategoryId,
}

impl BlendAssociative {
    pub fn new(category: CategoryId) -> Arc<dyn Optimizer> {
        Arc::new(Self { category })
    }
}

impl Optimizer for BlendAssociative {
    fn name(&self) -> &'static str {
        "blend-associative"
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
        let TaskKind::Blend(outer) = task.kind() else {
            return Rewrite::Unchanged;
        };
        if !approx_one(outer.amount) {
            return Rewrite::Unchanged;
        }
        let (Some(a), Some(inner_task)) = (task.sub_a(), task.sub_b()) else {
            return Rewrite::Unchanged;
        };
        let TaskKind::Blend(inner) = inner_task.kind() else {
            return Rewrite::Unchanged;
        };
        if !inner.method.is_associative() {
            return Rewrite::Unchanged;
        }
        let (Some(b), Some(list)) = (inner_task.sub_a(), inner_task.sub_b()) else {
            return Rewrite::Unchanged;
        };
        if !matches!(list.kind(), TaskKind::List) {
            return Rewrite::Unchanged;
        }
        if !surfaces_compatible(task, inner_task) || !surfaces_compatible(task, list) {
            return Rewrite::Unchanged;
        }

        let first = Task::blend(*inner, a.clone(), b.clone()).with_coords_of(task);
        let mut children = Vec::with_capacity(1 + list.sub_tasks().len());
        children.push(first);
        children.extend(list.sub_tasks().iter().cloned());
        Rewrite::Replace(task.with_kind(TaskKind::List).with_sub_tasks(children))
    }
}

/// Blend-into-composite: when the upper operand can blend its output
/// directly into an existing surface and the mode permits aliasing a source
/// as target, the Blend node dissolves into a List whose members draw into
/// one shared target: A first, then B carrying the folded method and
/// opacity.
pub struct BlendComposite {
    category: CategoryId,
}

impl BlendComposite {
    pub fn new(category: CategoryId) -> Arc<dyn Optimizer> {
        Arc::new(Self { category })
    }
}

impl Optimizer for BlendComposite {
    fn name(&self) -> &'static str {
        "blend-composite"
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
        if !ctx.mode.allow_source_as_target {
            return Rewrite::Unchanged;
        }
        let task = ctx.task;
        let TaskKind::Blend(params) = task.kind() else {
            return Rewrite::Unchanged;
        };
        let (Some(a), Some(b)) = (task.sub_a(), task.sub_b()) else {
            return Rewrite::Unchanged;
        };
        if !b.kind().can_blend_into_target() || b.blend_into().is_some() {
            return Rewrite::Unchanged;
        }

        let folded = b.with_blend_into(Some(*params));
        let mut children = Vec::with_capacity(2);
        if operand_usable(a) {
            children.push(a.clone());
        }
        children.push(folded);
        Rewrite::Replace(task.with_kind(TaskKind::List).with_sub_tasks(children))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/optimizer/blend_rules.rs"]
mod tests;
