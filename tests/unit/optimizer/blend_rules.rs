use super::*;

use kurbo::Rect;

use crate::foundation::color::Rgba;
use crate::foundation::geometry::RectInt;
use crate::surface::resource::{SurfaceDesc, SurfaceResource, TargetToken};
use crate::task::mode::Mode;

const TOKEN: TargetToken = TargetToken("test");

fn strict() -> Mode {
    Mode::strict(TOKEN)
}

fn red() -> Rgba {
    Rgba::from_straight(1.0, 0.0, 0.0, 1.0)
}

fn placed_solid(rect: RectInt) -> TaskHandle {
    Task::solid(red()).with_rects(Rect::new(0.0, 0.0, 1.0, 1.0), rect)
}

fn run_rule(rule: &Arc<dyn Optimizer>, task: &TaskHandle, mode: &Mode) -> Option<TaskHandle> {
    let ctx = RewriteCtx {
        task,
        parent: None,
        mode,
    };
    match rule.run(&ctx) {
        Rewrite::Unchanged => None,
        Rewrite::Replace(t) => Some(t),
    }
}

#[test]
fn zero_amount_yields_the_lower_operand() {
    let a = placed_solid(RectInt::new(0, 0, 8, 8));
    let b = placed_solid(RectInt::new(0, 0, 8, 8));
    let blend = Task::blend(BlendParams::new(BlendMethod::Composite, 0.0), a.clone(), b)
        .with_rects(Rect::new(0.0, 0.0, 1.0, 1.0), RectInt::new(0, 0, 8, 8));

    let rule = BlendZero::new(CategoryId(0));
    let out = run_rule(&rule, &blend, &strict()).unwrap();
    assert!(Arc::ptr_eq(&out, &a));
}

#[test]
fn unusable_upper_operand_yields_the_lower_operand() {
    let a = placed_solid(RectInt::new(0, 0, 8, 8));
    let blend = Task::blend(
        BlendParams::new(BlendMethod::Multiply, 0.8),
        a.clone(),
        Task::empty(),
    );
    let rule = BlendZero::new(CategoryId(0));
    let out = run_rule(&rule, &blend, &strict()).unwrap();
    assert!(Arc::ptr_eq(&out, &a));
}

#[test]
fn full_amount_over_nothing_degenerates_to_the_upper_operand() {
    let b = placed_solid(RectInt::new(0, 0, 8, 8));
    let blend = Task::blend(
        BlendParams::new(BlendMethod::Composite, 1.0),
        Task::empty(),
        b.clone(),
    );
    let rule = BlendZero::new(CategoryId(0));
    let out = run_rule(&rule, &blend, &strict()).unwrap();
    assert!(Arc::ptr_eq(&out, &b));
}

#[test]
fn onto_over_nothing_is_empty() {
    let b = placed_solid(RectInt::new(0, 0, 8, 8));
    let blend = Task::blend(BlendParams::new(BlendMethod::Onto, 1.0), Task::empty(), b)
        .with_rects(Rect::new(0.0, 0.0, 1.0, 1.0), RectInt::new(0, 0, 8, 8));
    let rule = BlendZero::new(CategoryId(0));
    let out = run_rule(&rule, &blend, &strict()).unwrap();
    assert!(matches!(out.kind(), TaskKind::Empty));
    // the empty marker keeps the slot's placement
    assert_eq!(out.target_rect(), RectInt::new(0, 0, 8, 8));
}

#[test]
fn disjoint_straight_onto_is_empty_and_disjoint_onto_is_the_lower_operand() {
    let a = placed_solid(RectInt::new(0, 0, 8, 8));
    let b = placed_solid(RectInt::new(16, 0, 24, 8));
    let rule = BlendZero::new(CategoryId(0));

    let so = Task::blend(
        BlendParams::new(BlendMethod::StraightOnto, 0.5),
        a.clone(),
        b.clone(),
    );
    let out = run_rule(&rule, &so, &strict()).unwrap();
    assert!(matches!(out.kind(), TaskKind::Empty));

    let onto = Task::blend(BlendParams::new(BlendMethod::Onto, 1.0), a.clone(), b);
    let out = run_rule(&rule, &onto, &strict()).unwrap();
    assert!(Arc::ptr_eq(&out, &a));
}

#[test]
fn promotion_into_an_occupied_slot_inherits_the_surface() {
    let surface = SurfaceResource::new_external(SurfaceDesc { width: 8, height: 8 }, TOKEN);
    let b = placed_solid(RectInt::new(0, 0, 8, 8));
    let blend = Task::blend(
        BlendParams::new(BlendMethod::Composite, 1.0),
        Task::empty(),
        b,
    )
    .with_rects(Rect::new(0.0, 0.0, 1.0, 1.0), RectInt::new(0, 0, 8, 8))
    .with_target_surface(Some(surface.clone()));

    let rule = BlendZero::new(CategoryId(0));
    let out = run_rule(&rule, &blend, &strict()).unwrap();
    assert!(matches!(out.kind(), TaskKind::Solid(_)));
    assert!(Arc::ptr_eq(out.target_surface().unwrap(), &surface));
}

#[test]
fn promotion_declines_when_the_slot_surface_is_too_small() {
    let surface = SurfaceResource::new_external(SurfaceDesc { width: 4, height: 4 }, TOKEN);
    let b = placed_solid(RectInt::new(0, 0, 8, 8));
    let blend = Task::blend(
        BlendParams::new(BlendMethod::Composite, 1.0),
        Task::empty(),
        b,
    )
    .with_rects(Rect::new(0.0, 0.0, 1.0, 1.0), RectInt::new(0, 0, 4, 4))
    .with_target_surface(Some(surface));

    let rule = BlendZero::new(CategoryId(0));
    assert!(run_rule(&rule, &blend, &strict()).is_none());
}

#[test]
fn nested_blend_amounts_multiply() {
    let a = placed_solid(RectInt::new(0, 0, 8, 8));
    let y = placed_solid(RectInt::new(0, 0, 8, 8));
    let inner = Task::blend(
        BlendParams::new(BlendMethod::Composite, 0.5),
        Task::empty(),
        y.clone(),
    );
    let outer = Task::blend(BlendParams::new(BlendMethod::Composite, 0.5), a.clone(), inner);

    let rule = BlendMerge::new(CategoryId(0));
    let out = run_rule(&rule, &outer, &strict()).unwrap();
    let TaskKind::Blend(params) = out.kind() else {
        panic!("expected a blend, got {:?}", out.kind());
    };
    assert!((params.amount - 0.25).abs() < 1e-9);
    assert!(Arc::ptr_eq(out.sub_a().unwrap(), &a));
    assert!(Arc::ptr_eq(out.sub_b().unwrap(), &y));
}

#[test]
fn merge_requires_matching_associative_methods() {
    let a = placed_solid(RectInt::new(0, 0, 8, 8));
    let inner = Task::blend(
        BlendParams::new(BlendMethod::Straight, 0.5),
        Task::empty(),
        placed_solid(RectInt::new(0, 0, 8, 8)),
    );
    let outer = Task::blend(BlendParams::new(BlendMethod::Straight, 0.5), a, inner);
    let rule = BlendMerge::new(CategoryId(0));
    assert!(run_rule(&rule, &outer, &strict()).is_none());
}

#[test]
fn associative_chain_unfolds_into_a_list() {
    let a = placed_solid(RectInt::new(0, 0, 8, 8));
    let b = placed_solid(RectInt::new(0, 0, 8, 8));
    let tail = placed_solid(RectInt::new(0, 0, 8, 8));
    let list = Task::list(vec![tail.clone()])
        .with_rects(Rect::new(0.0, 0.0, 1.0, 1.0), RectInt::new(0, 0, 8, 8));
    let inner = Task::blend(BlendParams::new(BlendMethod::Add, 0.5), b.clone(), list);
    let outer = Task::blend(BlendParams::new(BlendMethod::Add, 1.0), a.clone(), inner)
        .with_rects(Rect::new(0.0, 0.0, 1.0, 1.0), RectInt::new(0, 0, 8, 8));

    let rule = BlendAssociative::new(CategoryId(0));
    let out = run_rule(&rule, &outer, &strict()).unwrap();
    assert!(matches!(out.kind(), TaskKind::List));
    assert_eq!(out.sub_tasks().len(), 2);
    let first = &out.sub_tasks()[0];
    assert!(matches!(first.kind(), TaskKind::Blend(p) if (p.amount - 0.5).abs() < 1e-9));
    assert!(Arc::ptr_eq(first.sub_a().unwrap(), &a));
    assert!(Arc::ptr_eq(first.sub_b().unwrap(), &b));
    assert!(Arc::ptr_eq(&out.sub_tasks()[1], &tail));
}

#[test]
fn blend_into_target_folding_is_mode_gated() {
    let a = placed_solid(RectInt::new(0, 0, 8, 8));
    let b = placed_solid(RectInt::new(0, 0, 8, 8));
    let params = BlendParams::new(BlendMethod::Composite, 0.7);
    let blend = Task::blend(params, a.clone(), b)
        .with_rects(Rect::new(0.0, 0.0, 1.0, 1.0), RectInt::new(0, 0, 8, 8));
    let rule = BlendComposite::new(CategoryId(0));

    assert!(run_rule(&rule, &blend, &strict()).is_none());

    let mut permissive = strict();
    permissive.allow_source_as_target = true;
    let out = run_rule(&rule, &blend, &permissive).unwrap();
    assert!(matches!(out.kind(), TaskKind::List));
    assert_eq!(out.sub_tasks().len(), 2);
    assert!(Arc::ptr_eq(&out.sub_tasks()[0], &a));
    let folded = &out.sub_tasks()[1];
    assert!(matches!(folded.kind(), TaskKind::Solid(_)));
    assert_eq!(folded.blend_into(), Some(params));
}
