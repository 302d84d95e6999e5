use std::sync::{Arc, OnceLock};

use kurbo::{Affine, BezPath, Point, Rect, Vec2};

use crate::foundation::color::Rgba;
use crate::foundation::error::{RasterError, RasterResult};
use crate::foundation::geometry::{RectInt, rect_is_finite_nonempty};
use crate::surface::resource::SurfaceHandle;
use crate::task::blend::BlendParams;
use crate::task::event::EventSignal;

pub type TaskHandle = Arc<Task>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BlurKind {
    Box,
    Gaussian,
    Disc,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlurSpec {
    pub kind: BlurKind,
    /// Kernel radius in vector-space units, per axis.
    pub size: Vec2,
}

impl BlurSpec {
    /// Margin the child task must be expanded by so the kernel has valid
    /// samples at the edges of the requested output.
    pub fn extra_size(&self) -> Vec2 {
        match self.kind {
            BlurKind::Box | BlurKind::Disc => self.size,
            // Three standard deviations cover the visible Gaussian support.
            BlurKind::Gaussian => self.size * 3.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ContourSpec {
    pub path: BezPath,
    pub color: Rgba,
    pub invert: bool,
    pub antialias: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Interpolation {
    Nearest,
    Linear,
    Cubic,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResampleSpec {
    pub transform: Affine,
    pub interpolation: Interpolation,
}

/// Warp grid for mesh-based distortion. Control points are laid out
/// row-major on a `(columns + 1) x (rows + 1)` lattice.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshSpec {
    pub columns: u32,
    pub rows: u32,
    pub points: Vec<Point>,
}

/// Operation semantics of a task node. A closed set: rule matching is
/// exhaustive and statically checked instead of downcast-driven.
#[derive(Clone, Debug)]
pub enum TaskKind {
    /// No pixels. The canonical "invalid operand" marker rewrites substitute
    /// when an operand contributes nothing.
    Empty,
    Solid(Rgba),
    /// Pixels already exist in the given resource; executing the task copies
    /// (or blends) them into the target if the two differ.
    Surface(SurfaceHandle),
    Contour(ContourSpec),
    Blur(BlurSpec),
    Transformation(Affine),
    /// Ordered siblings drawn into one shared target surface.
    List,
    /// Opaque grouping produced by the layer stack above this engine.
    /// Structurally a pass-through; the optimizer may dissolve it.
    Layer,
    Mesh(MeshSpec),
    Resample(ResampleSpec),
    Blend(BlendParams),
    /// Pixel-free sentinel that fires its signal once its children settle.
    Event(Arc<EventSignal>),
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Empty => "empty",
            TaskKind::Solid(_) => "solid",
            TaskKind::Surface(_) => "surface",
            TaskKind::Contour(_) => "contour",
            TaskKind::Blur(_) => "blur",
            TaskKind::Transformation(_) => "transformation",
            TaskKind::List => "list",
            TaskKind::Layer => "layer",
            TaskKind::Mesh(_) => "mesh",
            TaskKind::Resample(_) => "resample",
            TaskKind::Blend(_) => "blend",
            TaskKind::Event(_) => "event",
        }
    }

    /// May this task be partitioned by rectangle into independent bands?
    pub fn is_splittable(&self) -> bool {
        matches!(self, TaskKind::Solid(_) | TaskKind::Contour(_))
    }

    /// May this task blend its output directly into an existing surface
    /// instead of staging through its own?
    pub fn can_blend_into_target(&self) -> bool {
        matches!(
            self,
            TaskKind::Solid(_) | TaskKind::Surface(_) | TaskKind::Contour(_)
        )
    }

    /// Produces fixed content with no child inputs.
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            TaskKind::Empty | TaskKind::Solid(_) | TaskKind::Surface(_)
        )
    }

    /// Content unchanged by an affine warp (so a wrapping transformation
    /// collapses to a retarget).
    pub fn is_transform_invariant(&self) -> bool {
        matches!(self, TaskKind::Empty | TaskKind::Solid(_))
    }
}

/// Node of the compositing operation tree.
///
/// Nodes are immutable after construction and shared through `TaskHandle`
/// (`Arc`). Rewrite rules never mutate a node in place; they build a shallow
/// clone with one or two fields changed, so aliases of the old node elsewhere
/// in the tree are unaffected.
pub struct Task {
    kind: TaskKind,
    /// Vector-space extent of the output. May be empty/zero before
    /// `set_coords` establishes it.
    source_rect: Rect,
    /// Pixel-space extent, in the coordinate space of `target_surface`.
    target_rect: RectInt,
    target_surface: Option<SurfaceHandle>,
    /// When set, the kernel blends its output into the existing target
    /// content instead of overwriting it. Only meaningful for kinds with
    /// `can_blend_into_target`.
    blend_into: Option<BlendParams>,
    sub_tasks: Vec<TaskHandle>,
    bounds: OnceLock<Rect>,
}

impl Task {
    pub fn new(kind: TaskKind) -> TaskHandle {
        Self::with_children(kind, Vec::new())
    }

    pub fn with_children(kind: TaskKind, sub_tasks: Vec<TaskHandle>) -> TaskHandle {
        Arc::new(Task {
            kind,
            source_rect: Rect::ZERO,
            target_rect: RectInt::ZERO,
            target_surface: None,
            blend_into: None,
            sub_tasks,
            bounds: OnceLock::new(),
        })
    }

    pub fn empty() -> TaskHandle {
        Self::new(TaskKind::Empty)
    }

    pub fn solid(color: Rgba) -> TaskHandle {
        Self::new(TaskKind::Solid(color))
    }

    pub fn surface(source: SurfaceHandle) -> TaskHandle {
        Self::new(TaskKind::Surface(source))
    }

    pub fn list(children: Vec<TaskHandle>) -> TaskHandle {
        Self::with_children(TaskKind::List, children)
    }

    pub fn blend(params: BlendParams, a: TaskHandle, b: TaskHandle) -> TaskHandle {
        Self::with_children(TaskKind::Blend(params), vec![a, b])
    }

    pub fn transformation(transform: Affine, child: TaskHandle) -> TaskHandle {
        Self::with_children(TaskKind::Transformation(transform), vec![child])
    }

    pub fn blur(spec: BlurSpec, child: TaskHandle) -> TaskHandle {
        Self::with_children(TaskKind::Blur(spec), vec![child])
    }

    /// Sentinel waiting on `deps` (shared handles into the rest of the tree)
    /// before firing `signal`.
    pub fn event(signal: Arc<EventSignal>, deps: Vec<TaskHandle>) -> TaskHandle {
        Self::with_children(TaskKind::Event(signal), deps)
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn source_rect(&self) -> Rect {
        self.source_rect
    }

    pub fn target_rect(&self) -> RectInt {
        self.target_rect
    }

    pub fn target_surface(&self) -> Option<&SurfaceHandle> {
        self.target_surface.as_ref()
    }

    pub fn blend_into(&self) -> Option<BlendParams> {
        self.blend_into
    }

    pub fn sub_tasks(&self) -> &[TaskHandle] {
        &self.sub_tasks
    }

    /// First blend operand (the "underlying" content).
    pub fn sub_a(&self) -> Option<&TaskHandle> {
        self.sub_tasks.first()
    }

    /// Second blend operand (the content blended on top).
    pub fn sub_b(&self) -> Option<&TaskHandle> {
        self.sub_tasks.get(1)
    }

    // Shallow clone-with-change constructors. Every rewrite goes through
    // these; none of them touch `self`.

    pub fn with_kind(&self, kind: TaskKind) -> TaskHandle {
        Arc::new(Task {
            kind,
            source_rect: self.source_rect,
            target_rect: self.target_rect,
            target_surface: self.target_surface.clone(),
            blend_into: self.blend_into,
            sub_tasks: self.sub_tasks.clone(),
            bounds: OnceLock::new(),
        })
    }

    pub fn with_sub_tasks(&self, sub_tasks: Vec<TaskHandle>) -> TaskHandle {
        Arc::new(Task {
            kind: self.kind.clone(),
            source_rect: self.source_rect,
            target_rect: self.target_rect,
            target_surface: self.target_surface.clone(),
            blend_into: self.blend_into,
            sub_tasks,
            bounds: OnceLock::new(),
        })
    }

    pub fn with_rects(&self, source_rect: Rect, target_rect: RectInt) -> TaskHandle {
        Arc::new(Task {
            kind: self.kind.clone(),
            source_rect,
            target_rect,
            target_surface: self.target_surface.clone(),
            blend_into: self.blend_into,
            sub_tasks: self.sub_tasks.clone(),
            bounds: OnceLock::new(),
        })
    }

    pub fn with_target_surface(&self, target_surface: Option<SurfaceHandle>) -> TaskHandle {
        Arc::new(Task {
            kind: self.kind.clone(),
            source_rect: self.source_rect,
            target_rect: self.target_rect,
            target_surface,
            blend_into: self.blend_into,
            sub_tasks: self.sub_tasks.clone(),
            bounds: OnceLock::new(),
        })
    }

    pub fn with_blend_into(&self, blend_into: Option<BlendParams>) -> TaskHandle {
        Arc::new(Task {
            kind: self.kind.clone(),
            source_rect: self.source_rect,
            target_rect: self.target_rect,
            target_surface: self.target_surface.clone(),
            blend_into,
            sub_tasks: self.sub_tasks.clone(),
            bounds: OnceLock::new(),
        })
    }

    /// Copy coordinates and surface from another node (used when a rewrite
    /// substitutes a replacement that must occupy the original's slot).
    pub fn with_coords_of(&self, other: &Task) -> TaskHandle {
        Arc::new(Task {
            kind: self.kind.clone(),
            source_rect: other.source_rect,
            target_rect: other.target_rect,
            target_surface: other.target_surface.clone(),
            blend_into: self.blend_into,
            sub_tasks: self.sub_tasks.clone(),
            bounds: OnceLock::new(),
        })
    }

    /// Pixels per vector-space unit, derived from both rects. Recomputed on
    /// demand so it can never drift from the rects.
    pub fn pixels_per_unit(&self) -> Vec2 {
        if !rect_is_finite_nonempty(self.source_rect) {
            return Vec2::ZERO;
        }
        Vec2::new(
            f64::from(self.target_rect.width()) / self.source_rect.width(),
            f64::from(self.target_rect.height()) / self.source_rect.height(),
        )
    }

    pub fn units_per_pixel(&self) -> Vec2 {
        if !self.target_rect.is_valid() {
            return Vec2::ZERO;
        }
        Vec2::new(
            self.source_rect.width() / f64::from(self.target_rect.width()),
            self.source_rect.height() / f64::from(self.target_rect.height()),
        )
    }

    /// Does this kind produce pixels at all?
    pub fn needs_surface(&self) -> bool {
        !matches!(self.kind, TaskKind::Empty | TaskKind::Event(_))
    }

    /// Both rects established, finite and non-empty, with the pixel rect in
    /// the non-negative pixel space of the render.
    pub fn is_valid_coords(&self) -> bool {
        rect_is_finite_nonempty(self.source_rect)
            && self.target_rect.is_valid()
            && self.target_rect.x0 >= 0
            && self.target_rect.y0 >= 0
    }

    /// Ready for execution: valid coordinates and a surface large enough to
    /// hold the pixel rect. `Empty` is never valid; `Event` needs no pixels.
    pub fn is_valid(&self) -> bool {
        match self.kind {
            TaskKind::Empty => false,
            TaskKind::Event(_) => true,
            _ => {
                self.is_valid_coords()
                    && self
                        .target_surface
                        .as_ref()
                        .is_some_and(|s| s.contains(self.target_rect))
            }
        }
    }

    /// Containment check a rewrite's output must satisfy; a violation is a
    /// programmer error in the rule, not a runtime condition.
    pub fn check_containment(&self) -> RasterResult<()> {
        if self.target_rect.is_valid()
            && let Some(surface) = &self.target_surface
            && !surface.contains(self.target_rect)
        {
            return Err(RasterError::pipeline(format!(
                "task '{}' target rect {:?} escapes surface extent {:?}",
                self.kind.name(),
                self.target_rect,
                surface.extent()
            )));
        }
        Ok(())
    }

    /// Vector-space bounding box of this node and everything below it.
    /// Computed once per node; rewrites produce fresh nodes with fresh
    /// caches.
    pub fn bounds(&self) -> Rect {
        *self.bounds.get_or_init(|| {
            let mut acc = if rect_is_finite_nonempty(self.source_rect) {
                self.source_rect
            } else {
                Rect::ZERO
            };
            for child in &self.sub_tasks {
                let b = child.bounds();
                if rect_is_finite_nonempty(b) {
                    acc = if rect_is_finite_nonempty(acc) {
                        acc.union(b)
                    } else {
                        b
                    };
                }
            }
            acc
        })
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("kind", &self.kind.name())
            .field("source_rect", &self.source_rect)
            .field("target_rect", &self.target_rect)
            .field("surface", &self.target_surface.is_some())
            .field("blend_into", &self.blend_into)
            .field("sub_tasks", &self.sub_tasks.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/task/node.rs"]
mod tests;
