use crate::surface::resource::TargetToken;

/// Capability descriptor a backend registers with the renderer.
///
/// The flags gate both rewriting and scheduling:
/// - `allow_multithreading`: tasks for this backend may run off the calling
///   thread.
/// - `allow_source_as_target`: a task may legally alias a child's surface as
///   its own output, which unlocks the blend-into-target family of rewrites.
/// - `allow_simultaneous_write`: multiple tasks may hold write access to the
///   same surface, only for rectangle-disjoint append patterns (region
///   splitting relies on this).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mode {
    pub token: TargetToken,
    pub allow_multithreading: bool,
    pub allow_source_as_target: bool,
    pub allow_simultaneous_write: bool,
}

impl Mode {
    /// Fully serial, no-aliasing mode. Useful as a conservative draft tier.
    pub fn strict(token: TargetToken) -> Self {
        Self {
            token,
            allow_multithreading: false,
            allow_source_as_target: false,
            allow_simultaneous_write: false,
        }
    }
}
