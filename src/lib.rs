//! Rasterflow is a task-graph compositing core: render work is described as
//! an immutable tree of raster tasks, rewritten to a cheaper equivalent form
//! by a categorized rule engine, then scheduled and executed over explicit
//! pixel surfaces.
//!
//! # Pipeline overview
//!
//! 1. **Describe**: build a [`Task`] tree (blends, transforms, lists,
//!    primitives) in continuous source units.
//! 2. **Place**: [`Task::set_coords`] establishes the source-to-pixel mapping
//!    for every node.
//! 3. **Rewrite**: a [`RewriteEngine`] drives categorized rules to a fixed
//!    point, first structurally, then again once surfaces are assigned.
//! 4. **Run**: the [`Renderer`] flattens the stable tree into a dependency
//!    batch and executes it against registered [`PixelBackend`]s, optionally
//!    in parallel.
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Immutable tasks**: rewrites clone-with-change; shared subtrees stay
//!   shared unless a rule decides otherwise.
//! - **Containment is an invariant**: every installed rewrite and every
//!   executed task keeps its pixel rect inside its surface.
//! - **Premultiplied RGBA** end-to-end.
#![forbid(unsafe_code)]

pub mod foundation;
pub mod optimizer;
pub mod render;
pub mod surface;
pub mod task;

pub use foundation::color::Rgba;
pub use foundation::error::{RasterError, RasterResult};
pub use foundation::geometry::RectInt;
pub use optimizer::engine::{
    CategoryId, Optimizer, OptimizerInfo, Phase, RepeatFlags, Rewrite, RewriteCtx, RewriteEngine,
    Traversal,
};
pub use optimizer::{CanonicalCategories, register_canonical};
pub use render::backend::PixelBackend;
pub use render::renderer::{RenderStats, Renderer};
pub use render::schedule::{Batch, BatchOutcome, RenderThreading, build_batch, execute_batch};
pub use render::software::{SOFTWARE_TOKEN, SoftwareBackend, blend_pixel};
pub use surface::resource::{
    Ownership, SurfaceDesc, SurfaceHandle, SurfaceResource, TargetToken,
};
pub use task::blend::{BlendMethod, BlendParams};
pub use task::event::EventSignal;
pub use task::mode::Mode;
pub use task::node::{
    BlurKind, BlurSpec, ContourSpec, Interpolation, MeshSpec, ResampleSpec, Task, TaskHandle,
    TaskKind,
};
