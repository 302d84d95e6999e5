use super::*;

use kurbo::{Affine, Point, Rect};

use crate::foundation::color::Rgba;
use crate::foundation::geometry::RectInt;
use crate::optimizer::engine::CategoryId;
use crate::surface::resource::TargetToken;
use crate::task::blend::{BlendMethod, BlendParams};
use crate::task::mode::Mode;

fn strict() -> Mode {
    Mode::strict(TargetToken("test"))
}

fn red() -> Rgba {
    Rgba::from_straight(1.0, 0.0, 0.0, 1.0)
}

fn run_rule(rule: &Arc<dyn Optimizer>, task: &TaskHandle) -> Option<TaskHandle> {
    let mode = strict();
    let ctx = RewriteCtx {
        task,
        parent: None,
        mode: &mode,
    };
    match rule.run(&ctx) {
        Rewrite::Unchanged => None,
        Rewrite::Replace(t) => Some(t),
    }
}

#[test]
fn warping_a_solid_is_a_retarget() {
    let t = Task::transformation(Affine::rotate(0.3), Task::solid(red()))
        .with_rects(Rect::new(0.0, 0.0, 1.0, 1.0), RectInt::new(2, 2, 10, 10));
    let rule = TransformConstant::new(CategoryId(0));
    let out = run_rule(&rule, &t).unwrap();
    assert!(matches!(out.kind(), TaskKind::Solid(_)));
    assert_eq!(out.target_rect(), RectInt::new(2, 2, 10, 10));
}

#[test]
fn warping_content_that_moves_is_left_alone() {
    let surface_like = Task::blur(
        crate::task::node::BlurSpec {
            kind: crate::task::node::BlurKind::Box,
            size: kurbo::Vec2::new(0.1, 0.1),
        },
        Task::solid(red()),
    );
    let t = Task::transformation(Affine::rotate(0.3), surface_like);
    let rule = TransformConstant::new(CategoryId(0));
    assert!(run_rule(&rule, &t).is_none());
}

#[test]
fn stacked_transformations_compose_outer_times_inner() {
    let leaf = Task::blur(
        crate::task::node::BlurSpec {
            kind: crate::task::node::BlurKind::Box,
            size: kurbo::Vec2::new(0.1, 0.1),
        },
        Task::solid(red()),
    );
    let outer_m = Affine::translate((3.0, 0.0));
    let inner_m = Affine::scale(2.0);
    let t = Task::transformation(outer_m, Task::transformation(inner_m, leaf.clone()));

    let rule = TransformMerge::new(CategoryId(0));
    let out = run_rule(&rule, &t).unwrap();
    let TaskKind::Transformation(m) = out.kind() else {
        panic!("expected a transformation, got {:?}", out.kind());
    };
    // inner applies first: p -> outer(inner(p))
    let p = Point::new(1.0, 1.0);
    let expect = outer_m * (inner_m * p);
    let got = *m * p;
    assert!((got - expect).hypot() < 1e-9);
    assert!(Arc::ptr_eq(&out.sub_tasks()[0], &leaf));
}

#[test]
fn merge_refuses_children_with_folded_blend_state() {
    let inner = Task::transformation(Affine::scale(2.0), Task::solid(red()))
        .with_blend_into(Some(BlendParams::new(BlendMethod::Composite, 1.0)));
    let t = Task::transformation(Affine::IDENTITY, inner);
    let rule = TransformMerge::new(CategoryId(0));
    assert!(run_rule(&rule, &t).is_none());
}

#[test]
fn transformation_distributes_over_a_blend() {
    let a = Task::solid(red());
    let b = Task::solid(red());
    let m = Affine::scale(2.0);
    let blend = Task::blend(BlendParams::new(BlendMethod::Composite, 0.5), a.clone(), b.clone());
    let t = Task::transformation(m, blend)
        .with_rects(Rect::new(0.0, 0.0, 1.0, 1.0), RectInt::new(0, 0, 16, 16));

    let rule = TransformDistribute::new(CategoryId(0));
    let out = run_rule(&rule, &t).unwrap();
    assert!(matches!(out.kind(), TaskKind::Blend(p) if (p.amount - 0.5).abs() < 1e-9));
    // the blend takes the transformation's placement
    assert_eq!(out.target_rect(), RectInt::new(0, 0, 16, 16));
    for (wrapped, operand) in out.sub_tasks().iter().zip([&a, &b]) {
        let TaskKind::Transformation(wm) = wrapped.kind() else {
            panic!("operand not wrapped: {:?}", wrapped.kind());
        };
        assert_eq!(*wm, m);
        assert!(Arc::ptr_eq(&wrapped.sub_tasks()[0], operand));
    }
}
