use crate::foundation::error::RasterResult;
use crate::surface::resource::TargetToken;
use crate::task::mode::Mode;
use crate::task::node::Task;

/// The pixel-kernel seam.
///
/// A backend owns the concrete per-primitive kernels for one target token.
/// The contract with the optimizer pipeline is narrow: every task handed to
/// `run_task` carries surfaces matching the backend's registered mode, and
/// the backend reports plain success/failure. A `false` marks the render
/// unsuccessful without invalidating completed independent work, while `Err`
/// is reserved for structural misuse (no kernel for a task kind, poisoned
/// locks are folded into the failure path by the runtime).
pub trait PixelBackend: Send + Sync {
    fn token(&self) -> TargetToken;

    /// Capability mode the backend's kernels were written against.
    fn mode(&self) -> Mode;

    fn run_task(&self, task: &Task) -> RasterResult<bool>;
}
