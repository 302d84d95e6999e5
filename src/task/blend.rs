/// Binary pixel-combination operator selector.
///
/// The flag predicates drive rewrite-rule applicability; they are metadata
/// about the operator algebra, not about any particular kernel
/// implementation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BlendMethod {
    Composite,
    Straight,
    Onto,
    StraightOnto,
    Behind,
    Add,
    Subtract,
    Multiply,
    Alpha,
}

impl BlendMethod {
    /// Operators safe to refold across a flat list of operands.
    pub fn is_associative(self) -> bool {
        matches!(
            self,
            BlendMethod::Composite | BlendMethod::Behind | BlendMethod::Add
        )
    }

    /// Operators whose result is confined to the destination's own alpha.
    pub fn is_onto(self) -> bool {
        matches!(self, BlendMethod::Onto | BlendMethod::StraightOnto)
    }

    /// Operators that replace rather than accumulate the destination.
    pub fn is_straight(self) -> bool {
        matches!(self, BlendMethod::Straight | BlendMethod::StraightOnto)
    }
}

/// Method plus opacity amount, as carried by a `Blend` task or by a task
/// blending directly into its target surface.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlendParams {
    pub method: BlendMethod,
    pub amount: f64,
}

impl BlendParams {
    pub fn new(method: BlendMethod, amount: f64) -> Self {
        Self { method, amount }
    }
}
