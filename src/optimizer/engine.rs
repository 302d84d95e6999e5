use std::sync::Arc;

use tracing::{debug, trace};

use crate::foundation::error::{RasterError, RasterResult};
use crate::task::mode::Mode;
use crate::task::node::TaskHandle;

/// Hard cap on rewrites per optimization run. A rule set that keeps
/// proposing changes past this is non-terminating; failing fast beats
/// hanging the render.
const MAX_REWRITES: usize = 10_000;

/// Handle to a registered rule category (a pipeline stage).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CategoryId(pub(crate) usize);

/// Which half of the pipeline a category runs in: before target surfaces are
/// assigned (purely structural rewrites) or after (rewrites that reason about
/// concrete surfaces, like stage collapsing and region splitting).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Structural,
    Surface,
}

#[derive(Debug)]
struct CategoryDef {
    name: &'static str,
    phase: Phase,
    depends_from: Vec<CategoryId>,
}

/// Repeat policy flags for a rule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RepeatFlags(u8);

impl RepeatFlags {
    pub const NONE: RepeatFlags = RepeatFlags(0);
    /// Re-run the rule on the replacement node it just produced.
    pub const REPEAT_LAST: RepeatFlags = RepeatFlags(1);
    /// After a node changes, re-run the rule on its parent.
    pub const REPEAT_PARENT: RepeatFlags = RepeatFlags(2);
    /// Re-descend into a freshly produced subtree.
    pub const RECURSIVE: RepeatFlags = RepeatFlags(4);

    pub fn contains(self, other: RepeatFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for RepeatFlags {
    type Output = RepeatFlags;

    fn bitor(self, rhs: RepeatFlags) -> RepeatFlags {
        RepeatFlags(self.0 | rhs.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Traversal {
    /// The rule applies to every node.
    ForTask,
    /// The rule applies only to the tree root.
    ForRootTask,
}

#[derive(Clone, Copy, Debug)]
pub struct OptimizerInfo {
    pub category: CategoryId,
    pub traversal: Traversal,
    /// Children are rewritten before the parent when set (bottom-up).
    pub deep_first: bool,
    pub repeat: RepeatFlags,
}

/// Everything a rule sees: the current node, its parent (or `None` at the
/// root) and the capability mode the tree is being optimized for.
pub struct RewriteCtx<'a> {
    pub task: &'a TaskHandle,
    pub parent: Option<&'a TaskHandle>,
    pub mode: &'a Mode,
}

/// Outcome of running a rule on one node.
pub enum Rewrite {
    Unchanged,
    Replace(TaskHandle),
}

/// A stateless rewrite rule. Rules are side-effect free: they either propose
/// a replacement subtree or decline. A rule that cannot prove a rewrite's
/// safety must not attempt it.
pub trait Optimizer: Send + Sync {
    fn name(&self) -> &'static str;
    fn info(&self) -> OptimizerInfo;
    fn run(&self, ctx: &RewriteCtx<'_>) -> Rewrite;
}

/// Ordered, categorized rule registry plus the fixed-point driver.
#[derive(Default)]
pub struct RewriteEngine {
    categories: Vec<CategoryDef>,
    rules: Vec<Arc<dyn Optimizer>>,
}

impl RewriteEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipeline stage. `depends_from` categories are guaranteed to
    /// have converged on a subtree before this category's rules see it; the
    /// dependencies must form a DAG.
    pub fn register_category(
        &mut self,
        name: &'static str,
        phase: Phase,
        depends_from: &[CategoryId],
    ) -> RasterResult<CategoryId> {
        for dep in depends_from {
            if dep.0 >= self.categories.len() {
                return Err(RasterError::pipeline(format!(
                    "category '{name}' depends on an unregistered category"
                )));
            }
        }
        let id = CategoryId(self.categories.len());
        self.categories.push(CategoryDef {
            name,
            phase,
            depends_from: depends_from.to_vec(),
        });
        Ok(id)
    }

    pub fn register_optimizer(&mut self, rule: Arc<dyn Optimizer>) -> RasterResult<()> {
        let category = rule.info().category;
        if category.0 >= self.categories.len() {
            return Err(RasterError::pipeline(format!(
                "optimizer '{}' references an unregistered category",
                rule.name()
            )));
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Topological order over the category DAG. Registration order breaks
    /// ties, so priority between independent categories is exactly the order
    /// they were registered in.
    pub fn topo_order(&self) -> RasterResult<Vec<CategoryId>> {
        let n = self.categories.len();
        let mut indegree = vec![0usize; n];
        // edge: dep -> category
        let mut forward: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (idx, def) in self.categories.iter().enumerate() {
            for dep in &def.depends_from {
                forward[dep.0].push(idx);
                indegree[idx] += 1;
            }
        }
        let mut order = Vec::with_capacity(n);
        let mut ready: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        while let Some(idx) = ready.first().copied() {
            ready.remove(0);
            order.push(CategoryId(idx));
            for &next in &forward[idx] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    // keep registration order among newly ready categories
                    let pos = ready.partition_point(|&r| r < next);
                    ready.insert(pos, next);
                }
            }
        }
        if order.len() != n {
            return Err(RasterError::pipeline("category dependencies form a cycle"));
        }
        Ok(order)
    }

    /// Drive the registered rules of the given phase to a fixed point over
    /// the tree. Returns the converged tree and the number of rewrites
    /// installed.
    pub fn optimize(
        &self,
        root: TaskHandle,
        mode: &Mode,
        phase: Phase,
    ) -> RasterResult<(TaskHandle, usize)> {
        let order = self.topo_order()?;
        let mut root = root;
        let mut total = 0usize;
        let mut budget = MAX_REWRITES;
        let mut sweeps = 0usize;

        loop {
            let mut sweep_changes = 0usize;
            for cat in &order {
                if self.categories[cat.0].phase != phase {
                    continue;
                }
                for rule in self.rules.iter().filter(|r| r.info().category == *cat) {
                    loop {
                        let app = RuleApp {
                            rule: rule.as_ref(),
                            info: rule.info(),
                            mode,
                        };
                        let (replacement, count) = app.visit(&root, None, &mut budget)?;
                        if let Some(new_root) = replacement {
                            root = new_root;
                        }
                        if count == 0 {
                            break;
                        }
                        trace!(
                            rule = rule.name(),
                            category = self.categories[cat.0].name,
                            rewrites = count,
                            "rule pass"
                        );
                        sweep_changes += count;
                    }
                }
            }
            sweeps += 1;
            total += sweep_changes;
            if sweep_changes == 0 {
                break;
            }
        }

        debug!(?phase, sweeps, rewrites = total, "optimization converged");
        Ok((root, total))
    }
}

struct RuleApp<'a> {
    rule: &'a dyn Optimizer,
    info: OptimizerInfo,
    mode: &'a Mode,
}

impl RuleApp<'_> {
    /// Apply the rule over the subtree rooted at `task`, honoring the rule's
    /// traversal and repeat policies. Returns the replacement (if the subtree
    /// changed) and the number of rewrites installed.
    fn visit(
        &self,
        task: &TaskHandle,
        parent: Option<&TaskHandle>,
        budget: &mut usize,
    ) -> RasterResult<(Option<TaskHandle>, usize)> {
        let mut current = task.clone();
        let mut count = 0usize;

        if self.info.deep_first {
            count += self.visit_children(&mut current, budget)?;
            count += self.run_here(&mut current, parent, budget)?;
        } else {
            let here = self.run_here(&mut current, parent, budget)?;
            count += here;
            let below = self.visit_children(&mut current, budget)?;
            count += below;
            if below > 0 && self.info.repeat.contains(RepeatFlags::REPEAT_PARENT) {
                count += self.run_here(&mut current, parent, budget)?;
            }
        }

        if count > 0 {
            Ok((Some(current), count))
        } else {
            Ok((None, 0))
        }
    }

    fn visit_children(&self, current: &mut TaskHandle, budget: &mut usize) -> RasterResult<usize> {
        if current.sub_tasks().is_empty() {
            return Ok(0);
        }
        let mut count = 0usize;
        let mut changed = false;
        let mut children = current.sub_tasks().to_vec();
        for child in children.iter_mut() {
            let (replacement, n) = self.visit(child, Some(current), budget)?;
            if let Some(new_child) = replacement {
                *child = new_child;
                changed = true;
            }
            count += n;
        }
        if changed {
            *current = current.with_sub_tasks(children);
        }
        Ok(count)
    }

    fn run_here(
        &self,
        current: &mut TaskHandle,
        parent: Option<&TaskHandle>,
        budget: &mut usize,
    ) -> RasterResult<usize> {
        if self.info.traversal == Traversal::ForRootTask && parent.is_some() {
            return Ok(0);
        }
        let mut count = 0usize;
        loop {
            let ctx = RewriteCtx {
                task: current,
                parent,
                mode: self.mode,
            };
            match self.rule.run(&ctx) {
                Rewrite::Unchanged => break,
                Rewrite::Replace(replacement) => {
                    if *budget == 0 {
                        return Err(RasterError::pipeline(format!(
                            "optimizer '{}' exceeded the rewrite budget (non-terminating rule set?)",
                            self.rule.name()
                        )));
                    }
                    *budget -= 1;
                    replacement.check_containment()?;
                    trace!(rule = self.rule.name(), kind = replacement.kind().name(), "rewrite");
                    *current = replacement;
                    count += 1;
                    if self.info.repeat.contains(RepeatFlags::RECURSIVE) {
                        count += self.visit_children(current, budget)?;
                    }
                    if !self.info.repeat.contains(RepeatFlags::REPEAT_LAST) {
                        break;
                    }
                }
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/optimizer/engine.rs"]
mod tests;
