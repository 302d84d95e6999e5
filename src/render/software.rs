use std::sync::Arc;

use crate::foundation::color::Rgba;
use crate::foundation::error::{RasterError, RasterResult};
use crate::foundation::geometry::RectInt;
use crate::render::backend::PixelBackend;
use crate::surface::resource::{SurfaceHandle, TargetToken};
use crate::task::blend::{BlendMethod, BlendParams};
use crate::task::mode::Mode;
use crate::task::node::{Task, TaskKind};

pub const SOFTWARE_TOKEN: TargetToken = TargetToken("software");

/// CPU reference backend.
///
/// Implements the kernels the optimizer core itself needs (solid fill,
/// surface copy, binary blend, list/event plumbing). The heavy primitives
/// (contour scanline fill, convolution blurs, mesh and resampling kernels)
/// are external collaborators; handing one to this backend is a structural
/// error, not a render failure.
pub struct SoftwareBackend;

impl SoftwareBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl PixelBackend for SoftwareBackend {
    fn token(&self) -> TargetToken {
        SOFTWARE_TOKEN
    }

    fn mode(&self) -> Mode {
        Mode {
            token: SOFTWARE_TOKEN,
            allow_multithreading: true,
            allow_source_as_target: true,
            allow_simultaneous_write: true,
        }
    }

    fn run_task(&self, task: &Task) -> RasterResult<bool> {
        match task.kind() {
            TaskKind::Empty | TaskKind::List | TaskKind::Layer | TaskKind::Event(_) => Ok(true),
            TaskKind::Solid(color) => run_solid(task, *color),
            TaskKind::Surface(source) => run_surface_copy(task, source),
            TaskKind::Blend(params) => run_blend(task, *params),
            other => Err(RasterError::execution(format!(
                "no software kernel registered for '{}' tasks",
                other.name()
            ))),
        }
    }
}

/// Combine `src` into `dst` (both premultiplied) for one pixel.
pub fn blend_pixel(method: BlendMethod, amount: f64, dst: Rgba, src: Rgba) -> Rgba {
    let amount = amount as f32;
    match method {
        BlendMethod::Composite => {
            let s = src.scale(amount);
            s.add(dst.scale(1.0 - s.a))
        }
        BlendMethod::Straight => src.scale(amount).add(dst.scale(1.0 - amount)),
        BlendMethod::Behind => {
            let s = src.scale(amount);
            dst.add(s.scale(1.0 - dst.a))
        }
        BlendMethod::Onto => {
            // Confined to the destination's own alpha: a transparent
            // destination stays untouched.
            let s = src.scale(amount * dst.a);
            s.add(dst.scale(1.0 - s.a))
        }
        BlendMethod::StraightOnto => src.scale(amount * dst.a).add(dst.scale(1.0 - amount)),
        BlendMethod::Add => dst.add(src.scale(amount)),
        BlendMethod::Subtract => {
            let s = src.scale(amount);
            Rgba::new(
                (dst.r - s.r).max(0.0),
                (dst.g - s.g).max(0.0),
                (dst.b - s.b).max(0.0),
                (dst.a - s.a).max(0.0),
            )
        }
        BlendMethod::Multiply => {
            let m = Rgba::new(dst.r * src.r, dst.g * src.g, dst.b * src.b, dst.a * src.a);
            m.scale(amount).add(dst.scale(1.0 - amount))
        }
        BlendMethod::Alpha => dst.scale(src.a).scale(amount).add(dst.scale(1.0 - amount)),
    }
}

fn writable_region(task: &Task, surface: &SurfaceHandle) -> RectInt {
    task.target_rect().intersect(surface.extent())
}

fn run_solid(task: &Task, color: Rgba) -> RasterResult<bool> {
    let Some(surface) = task.target_surface() else {
        return Ok(false);
    };
    let region = writable_region(task, surface);
    if !region.is_valid() {
        return Ok(true);
    }
    let Ok(mut px) = surface.write() else {
        return Ok(false);
    };
    for y in region.y0..region.y1 {
        for x in region.x0..region.x1 {
            let i = surface.index(x, y);
            px[i] = match task.blend_into() {
                None => color,
                Some(BlendParams { method, amount }) => blend_pixel(method, amount, px[i], color),
            };
        }
    }
    Ok(true)
}

fn run_surface_copy(task: &Task, source: &SurfaceHandle) -> RasterResult<bool> {
    let Some(target) = task.target_surface() else {
        return Ok(false);
    };
    if Arc::ptr_eq(source, target) {
        // Identity staging; blending a surface onto itself is also a no-op
        // for the copy path.
        return Ok(true);
    }
    let region = writable_region(task, target).intersect(source.extent());
    if !region.is_valid() {
        return Ok(true);
    }
    let Ok(src) = source.read() else {
        return Ok(false);
    };
    let Ok(mut dst) = target.write() else {
        return Ok(false);
    };
    for y in region.y0..region.y1 {
        for x in region.x0..region.x1 {
            let si = source.index(x, y);
            let di = target.index(x, y);
            dst[di] = match task.blend_into() {
                None => src[si],
                Some(BlendParams { method, amount }) => {
                    blend_pixel(method, amount, dst[di], src[si])
                }
            };
        }
    }
    Ok(true)
}

fn run_blend(task: &Task, params: BlendParams) -> RasterResult<bool> {
    let Some(target) = task.target_surface() else {
        return Ok(false);
    };
    let (a, b) = (task.sub_a(), task.sub_b());

    // Base pass: bring operand A's pixels into the target.
    if let Some(a) = a
        && a.is_valid()
        && let Some(a_surface) = a.target_surface()
        && !Arc::ptr_eq(a_surface, target)
    {
        let region = a
            .target_rect()
            .intersect(task.target_rect())
            .intersect(target.extent())
            .intersect(a_surface.extent());
        if region.is_valid() {
            let Ok(src) = a_surface.read() else {
                return Ok(false);
            };
            let Ok(mut dst) = target.write() else {
                return Ok(false);
            };
            for y in region.y0..region.y1 {
                for x in region.x0..region.x1 {
                    dst[target.index(x, y)] = src[a_surface.index(x, y)];
                }
            }
        }
    }

    // Blend pass: fold operand B on top over its own placement.
    if let Some(b) = b
        && b.is_valid()
        && let Some(b_surface) = b.target_surface()
    {
        let region = b
            .target_rect()
            .intersect(task.target_rect())
            .intersect(target.extent())
            .intersect(b_surface.extent());
        if region.is_valid() {
            if Arc::ptr_eq(b_surface, target) {
                // Aliased: read and write through one guard, pixel by pixel.
                let Ok(mut dst) = target.write() else {
                    return Ok(false);
                };
                for y in region.y0..region.y1 {
                    for x in region.x0..region.x1 {
                        let i = target.index(x, y);
                        dst[i] = blend_pixel(params.method, params.amount, dst[i], dst[i]);
                    }
                }
            } else {
                let Ok(src) = b_surface.read() else {
                    return Ok(false);
                };
                let Ok(mut dst) = target.write() else {
                    return Ok(false);
                };
                for y in region.y0..region.y1 {
                    for x in region.x0..region.x1 {
                        let di = target.index(x, y);
                        dst[di] = blend_pixel(
                            params.method,
                            params.amount,
                            dst[di],
                            src[b_surface.index(x, y)],
                        );
                    }
                }
            }
        }
    }

    Ok(true)
}

#[cfg(test)]
#[path = "../../tests/unit/render/software.rs"]
mod tests;
