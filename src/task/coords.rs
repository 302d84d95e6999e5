use std::collections::HashMap;
use std::sync::Arc;

use kurbo::{Point, Rect, Vec2};

use crate::foundation::error::{RasterError, RasterResult};
use crate::foundation::geometry::{APPROX_EPS, RectInt, rect_is_finite_nonempty};
use crate::task::node::{Task, TaskHandle, TaskKind};

/// Map a vector-space rectangle into pixel space using the affine mapping
/// established by a parent's (source_rect, target_rect) pair. The result is
/// conservatively rounded outward and clamped to the non-negative pixel
/// space.
fn map_to_pixels(source: Rect, target: RectInt, ppu: Vec2, sub_source: Rect) -> RectInt {
    let x0 = f64::from(target.x0) + (sub_source.x0 - source.x0) * ppu.x;
    let y0 = f64::from(target.y0) + (sub_source.y0 - source.y0) * ppu.y;
    let x1 = f64::from(target.x0) + (sub_source.x1 - source.x0) * ppu.x;
    let y1 = f64::from(target.y0) + (sub_source.y1 - source.y0) * ppu.y;
    RectInt {
        x0: (x0.floor() as i32).max(0),
        y0: (y0.floor() as i32).max(0),
        x1: (x1.ceil() as i32).max(0),
        y1: (y1.ceil() as i32).max(0),
    }
}

fn transform_bbox(transform: kurbo::Affine, r: Rect) -> Rect {
    let corners = [
        Point::new(r.x0, r.y0),
        Point::new(r.x1, r.y0),
        Point::new(r.x0, r.y1),
        Point::new(r.x1, r.y1),
    ];
    let mut out: Option<Rect> = None;
    for c in corners {
        let p = transform * c;
        let pr = Rect::new(p.x, p.y, p.x, p.y);
        out = Some(match out {
            None => pr,
            Some(acc) => acc.union(pr),
        });
    }
    out.unwrap_or(Rect::ZERO)
}

impl Task {
    /// Establish both rectangles on this node and recompute each child's
    /// sub-rectangles, kind-specifically (a blur expands its child by the
    /// kernel margin; a transformation back-transforms the requested bounds
    /// through its matrix).
    ///
    /// Returns a rebuilt tree; shared children requested with identical
    /// coordinates stay shared in the result.
    pub fn set_coords(
        self: &TaskHandle,
        source_rect: Rect,
        target_rect: RectInt,
    ) -> RasterResult<TaskHandle> {
        let mut memo = HashMap::new();
        set_coords_memo(self, source_rect, target_rect, &mut memo)
    }

    /// Shrink the pixel rect to its intersection with `rect`, and the vector
    /// rect proportionally with it. An empty intersection leaves the node
    /// with empty coordinates (structurally invalid, removable by rewrites).
    pub fn trunc_target_rect(&self, rect: RectInt) -> TaskHandle {
        let new_target = self.target_rect().intersect(rect);
        if !new_target.is_valid() {
            return self.with_rects(Rect::ZERO, RectInt::ZERO);
        }
        let old_target = self.target_rect();
        let upp = self.units_per_pixel();
        let source = self.source_rect();
        let new_source = Rect::new(
            source.x0 + f64::from(new_target.x0 - old_target.x0) * upp.x,
            source.y0 + f64::from(new_target.y0 - old_target.y0) * upp.y,
            source.x1 + f64::from(new_target.x1 - old_target.x1) * upp.x,
            source.y1 + f64::from(new_target.y1 - old_target.y1) * upp.y,
        );
        self.with_rects(new_source, new_target)
    }

    /// Shrink the vector rect to its intersection with `rect`, with the pixel
    /// rect following through the established mapping.
    pub fn trunc_source_rect(&self, rect: Rect) -> TaskHandle {
        let source = self.source_rect();
        let new_source = source.intersect(rect);
        if !rect_is_finite_nonempty(new_source) {
            return self.with_rects(Rect::ZERO, RectInt::ZERO);
        }
        let mapped = map_to_pixels(
            source,
            self.target_rect(),
            self.pixels_per_unit(),
            new_source,
        );
        let new_target = self.target_rect().intersect(mapped);
        if !new_target.is_valid() {
            return self.with_rects(Rect::ZERO, RectInt::ZERO);
        }
        self.with_rects(new_source, new_target)
    }

    /// Relocate pixel placement of this node and its whole subtree without
    /// altering the vector mapping. Used when a subtree is spliced under a
    /// parent at a different offset.
    pub fn move_target_rect(&self, dx: i32, dy: i32) -> TaskHandle {
        if dx == 0 && dy == 0 {
            return self.with_sub_tasks(self.sub_tasks().to_vec());
        }
        let moved_children = self
            .sub_tasks()
            .iter()
            .map(|c| c.move_target_rect(dx, dy))
            .collect();
        self.with_rects(self.source_rect(), self.target_rect().offset(dx, dy))
            .with_sub_tasks(moved_children)
    }
}

type CoordsMemo = HashMap<usize, (Rect, RectInt, TaskHandle)>;

fn set_coords_memo(
    task: &TaskHandle,
    source_rect: Rect,
    target_rect: RectInt,
    memo: &mut CoordsMemo,
) -> RasterResult<TaskHandle> {
    if !rect_is_finite_nonempty(source_rect) {
        return Err(RasterError::validation(
            "set_coords requires a finite, non-empty source rect",
        ));
    }
    if !target_rect.is_valid() || target_rect.x0 < 0 || target_rect.y0 < 0 {
        return Err(RasterError::validation(
            "set_coords requires a non-empty, non-negative target rect",
        ));
    }
    if let Some(surface) = task.target_surface()
        && !surface.contains(target_rect)
    {
        return Err(RasterError::validation(
            "target rect does not fit the task's surface",
        ));
    }

    let key = Arc::as_ptr(task) as usize;
    if let Some((prev_source, prev_target, rebuilt)) = memo.get(&key)
        && *prev_target == target_rect
        && (prev_source.x0 - source_rect.x0).abs() < APPROX_EPS
        && (prev_source.y0 - source_rect.y0).abs() < APPROX_EPS
        && (prev_source.x1 - source_rect.x1).abs() < APPROX_EPS
        && (prev_source.y1 - source_rect.y1).abs() < APPROX_EPS
    {
        return Ok(rebuilt.clone());
    }

    let ppu = Vec2::new(
        f64::from(target_rect.width()) / source_rect.width(),
        f64::from(target_rect.height()) / source_rect.height(),
    );

    let mut children = Vec::with_capacity(task.sub_tasks().len());
    for child in task.sub_tasks() {
        let (child_source, child_target) =
            sub_task_coords(task.kind(), source_rect, target_rect, ppu)?;
        children.push(set_coords_memo(child, child_source, child_target, memo)?);
    }

    let rebuilt = task
        .with_rects(source_rect, target_rect)
        .with_sub_tasks(children);
    memo.insert(key, (source_rect, target_rect, rebuilt.clone()));
    Ok(rebuilt)
}

/// Kind-specific child coordinates for a parent with the given mapping.
fn sub_task_coords(
    kind: &TaskKind,
    source: Rect,
    target: RectInt,
    ppu: Vec2,
) -> RasterResult<(Rect, RectInt)> {
    match kind {
        TaskKind::Blur(spec) => {
            let extra = spec.extra_size();
            let child_source = source.inflate(extra.x, extra.y);
            let child_target = map_to_pixels(source, target, ppu, child_source);
            Ok((child_source, child_target))
        }
        TaskKind::Transformation(m) | TaskKind::Resample(crate::task::node::ResampleSpec {
            transform: m,
            ..
        }) => {
            if m.determinant().abs() < APPROX_EPS {
                return Err(RasterError::validation(
                    "transformation matrix is not invertible",
                ));
            }
            let child_source = transform_bbox(m.inverse(), source);
            let child_target = map_to_pixels(source, target, ppu, child_source);
            Ok((child_source, child_target))
        }
        // Blend operands, list members, layers, meshes and events all share
        // the parent's mapping.
        _ => Ok((source, target)),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/task/coords.rs"]
mod tests;
