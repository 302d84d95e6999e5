use kurbo::Rect;

pub use kurbo::{Affine, Point, Vec2};

/// Tolerance for "amount is effectively 0/1" and matrix comparisons in
/// rewrite rules.
pub const APPROX_EPS: f64 = 1e-6;

pub fn approx_zero(v: f64) -> bool {
    v.abs() < APPROX_EPS
}

pub fn approx_one(v: f64) -> bool {
    (v - 1.0).abs() < APPROX_EPS
}

/// Integer pixel-space rectangle, half-open on both axes.
///
/// `is_valid` means non-empty. Pixel rects used by tasks additionally live in
/// a single non-negative pixel space per render (see `Task::is_valid_coords`).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct RectInt {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl RectInt {
    pub const ZERO: RectInt = RectInt {
        x0: 0,
        y0: 0,
        x1: 0,
        y1: 0,
    };

    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn from_size(width: i32, height: i32) -> Self {
        Self {
            x0: 0,
            y0: 0,
            x1: width,
            y1: height,
        }
    }

    pub fn is_valid(self) -> bool {
        self.x0 < self.x1 && self.y0 < self.y1
    }

    pub fn width(self) -> i32 {
        self.x1 - self.x0
    }

    pub fn height(self) -> i32 {
        self.y1 - self.y0
    }

    pub fn contains_rect(self, other: RectInt) -> bool {
        self.x0 <= other.x0 && self.y0 <= other.y0 && other.x1 <= self.x1 && other.y1 <= self.y1
    }

    /// Intersection. May be invalid (empty) when the inputs do not overlap.
    pub fn intersect(self, other: RectInt) -> RectInt {
        RectInt {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        }
    }

    pub fn union(self, other: RectInt) -> RectInt {
        if !self.is_valid() {
            return other;
        }
        if !other.is_valid() {
            return self;
        }
        RectInt {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn offset(self, dx: i32, dy: i32) -> RectInt {
        RectInt {
            x0: self.x0 + dx,
            y0: self.y0 + dy,
            x1: self.x1 + dx,
            y1: self.y1 + dy,
        }
    }

    pub fn inflate(self, dx: i32, dy: i32) -> RectInt {
        RectInt {
            x0: self.x0 - dx,
            y0: self.y0 - dy,
            x1: self.x1 + dx,
            y1: self.y1 + dy,
        }
    }

    pub fn to_rect(self) -> Rect {
        Rect::new(
            f64::from(self.x0),
            f64::from(self.y0),
            f64::from(self.x1),
            f64::from(self.y1),
        )
    }
}

pub fn rects_disjoint(a: RectInt, b: RectInt) -> bool {
    !a.intersect(b).is_valid()
}

/// Finite and non-degenerate on both axes.
pub fn rect_is_finite_nonempty(r: Rect) -> bool {
    r.x0.is_finite()
        && r.y0.is_finite()
        && r.x1.is_finite()
        && r.y1.is_finite()
        && r.x1 > r.x0
        && r.y1 > r.y0
}
