pub mod blend_rules;
pub mod engine;
pub mod list_rules;
pub mod transform_rules;

use crate::foundation::error::RasterResult;
use engine::{CategoryId, Phase, RewriteEngine};

/// Category handles for the canonical rewrite pipeline. The dependency
/// edges encode the required firing order: zero/identity elimination strictly
/// before the fusion families, both before list shaping, splitting last.
#[derive(Clone, Copy, Debug)]
pub struct CanonicalCategories {
    pub zero: CategoryId,
    pub fuse: CategoryId,
    pub transform: CategoryId,
    pub list: CategoryId,
    pub split: CategoryId,
}

/// Register the canonical categories and rule families on an engine.
pub fn register_canonical(engine: &mut RewriteEngine) -> RasterResult<CanonicalCategories> {
    let zero = engine.register_category("zero", Phase::Structural, &[])?;
    let fuse = engine.register_category("fuse", Phase::Structural, &[zero])?;
    let transform = engine.register_category("transform", Phase::Structural, &[zero])?;
    let list = engine.register_category("list", Phase::Surface, &[fuse, transform])?;
    let split = engine.register_category("split", Phase::Surface, &[list])?;

    engine.register_optimizer(blend_rules::BlendZero::new(zero))?;
    engine.register_optimizer(blend_rules::BlendMerge::new(fuse))?;
    engine.register_optimizer(blend_rules::BlendAssociative::new(fuse))?;
    engine.register_optimizer(blend_rules::BlendComposite::new(fuse))?;
    engine.register_optimizer(transform_rules::TransformConstant::new(transform))?;
    engine.register_optimizer(transform_rules::TransformMerge::new(transform))?;
    engine.register_optimizer(transform_rules::TransformDistribute::new(transform))?;
    engine.register_optimizer(list_rules::LayerDissolve::new(list))?;
    engine.register_optimizer(list_rules::ListFlatten::new(list))?;
    engine.register_optimizer(list_rules::StageCollapse::new(list))?;
    engine.register_optimizer(list_rules::ListUnwrap::new(list))?;
    engine.register_optimizer(list_rules::RegionSplit::new(split))?;

    Ok(CanonicalCategories {
        zero,
        fuse,
        transform,
        list,
        split,
    })
}
