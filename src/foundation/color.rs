/// Premultiplied RGBA with f32 channels in [0, 1] (r,g,b already multiplied
/// by a). All software kernels operate on this representation end-to-end.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_straight(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self {
            r: r * a,
            g: g * a,
            b: b * a,
            a,
        }
    }

    /// Uniform scale of all channels. Valid for premultiplied color.
    pub fn scale(self, k: f32) -> Self {
        Self {
            r: self.r * k,
            g: self.g * k,
            b: self.b * k,
            a: self.a * k,
        }
    }

    pub fn add(self, other: Rgba) -> Self {
        Self {
            r: self.r + other.r,
            g: self.g + other.g,
            b: self.b + other.b,
            a: self.a + other.a,
        }
    }

    pub fn approx_eq(self, other: Rgba, tol: f32) -> bool {
        (self.r - other.r).abs() <= tol
            && (self.g - other.g).abs() <= tol
            && (self.b - other.b).abs() <= tol
            && (self.a - other.a).abs() <= tol
    }
}
