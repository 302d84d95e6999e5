use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::foundation::color::Rgba;
use crate::foundation::error::{RasterError, RasterResult};
use crate::foundation::geometry::RectInt;

/// Identity of the backend a surface (and the tasks producing into it)
/// belongs to. Optimizers only hand tasks surfaces whose token matches the
/// registered mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TargetToken(pub &'static str);

impl std::fmt::Display for TargetToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Ownership state of a surface's storage.
///
/// `OwnedScratch` is an intermediate buffer no external holder has observed
/// yet; rewrite rules may alias it into another task's output. Aliasing a
/// `SharedExternal` surface is forbidden, and the distinction is part of the
/// type rather than a mutable flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Ownership {
    OwnedScratch,
    SharedExternal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SurfaceDesc {
    pub width: u32,
    pub height: u32,
}

impl SurfaceDesc {
    pub fn extent(self) -> RectInt {
        RectInt::from_size(self.width as i32, self.height as i32)
    }

    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Reference-counted pixel buffer with lock-based access.
///
/// Read locks may be held concurrently; write access is exclusive at the
/// storage level. Tasks running under an `allow_simultaneous_write` mode are
/// scheduled without ordering edges between them, but each kernel still takes
/// the storage lock for the duration of its pixel op, so rectangle-disjoint
/// writers serialize at the memory level while remaining order-free.
pub struct SurfaceResource {
    desc: SurfaceDesc,
    token: TargetToken,
    ownership: Ownership,
    pixels: RwLock<Vec<Rgba>>,
}

pub type SurfaceHandle = Arc<SurfaceResource>;

impl SurfaceResource {
    /// Intermediate buffer owned by the render, freely aliasable by rewrites.
    pub fn new_scratch(desc: SurfaceDesc, token: TargetToken) -> SurfaceHandle {
        Arc::new(Self {
            desc,
            token,
            ownership: Ownership::OwnedScratch,
            pixels: RwLock::new(vec![Rgba::TRANSPARENT; desc.pixel_count()]),
        })
    }

    /// Externally observed output buffer. Never aliased by rewrites.
    pub fn new_external(desc: SurfaceDesc, token: TargetToken) -> SurfaceHandle {
        Arc::new(Self {
            desc,
            token,
            ownership: Ownership::SharedExternal,
            pixels: RwLock::new(vec![Rgba::TRANSPARENT; desc.pixel_count()]),
        })
    }

    pub fn desc(&self) -> SurfaceDesc {
        self.desc
    }

    pub fn token(&self) -> TargetToken {
        self.token
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn is_scratch(&self) -> bool {
        self.ownership == Ownership::OwnedScratch
    }

    pub fn extent(&self) -> RectInt {
        self.desc.extent()
    }

    pub fn contains(&self, rect: RectInt) -> bool {
        self.extent().contains_rect(rect)
    }

    /// Acquire shared read access. A poisoned lock is an execution failure.
    pub fn read(&self) -> RasterResult<RwLockReadGuard<'_, Vec<Rgba>>> {
        self.pixels
            .read()
            .map_err(|_| RasterError::execution("surface read lock poisoned"))
    }

    /// Acquire exclusive write access. A poisoned lock is an execution failure.
    pub fn write(&self) -> RasterResult<RwLockWriteGuard<'_, Vec<Rgba>>> {
        self.pixels
            .write()
            .map_err(|_| RasterError::execution("surface write lock poisoned"))
    }

    /// Row-major pixel index for a coordinate inside the extent.
    pub fn index(&self, x: i32, y: i32) -> usize {
        y as usize * self.desc.width as usize + x as usize
    }
}

impl std::fmt::Debug for SurfaceResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceResource")
            .field("desc", &self.desc)
            .field("token", &self.token)
            .field("ownership", &self.ownership)
            .finish_non_exhaustive()
    }
}
