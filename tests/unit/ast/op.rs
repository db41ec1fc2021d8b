use super::*;
use crate::foundation::core::BlendType;

fn plain_colour(size: [u16; 2]) -> Rc<AstOp> {
    AstOp::new(OpData::ImagePlainColour {
        colour: AstChild::none(),
        size,
    })
}

fn layer(base: &Rc<AstOp>, blended: &Rc<AstOp>, blend_type: BlendType) -> Rc<AstOp> {
    AstOp::new(OpData::ImageLayer {
        base: AstChild::new(base.clone()),
        mask: AstChild::none(),
        blended: AstChild::new(blended.clone()),
        blend_type,
    })
}

#[test]
fn equal_operations_hash_equal() {
    let base = plain_colour([8, 8]);
    let blended = plain_colour([4, 4]);
    let a = layer(&base, &blended, BlendType::Multiply);
    let b = layer(&base, &blended, BlendType::Multiply);

    assert!(a.is_equal(&b));
    assert_eq!(a.hash(), b.hash());
}

#[test]
fn different_children_or_scalars_break_equality() {
    let base = plain_colour([8, 8]);
    let blended = plain_colour([4, 4]);
    let a = layer(&base, &blended, BlendType::Multiply);
    let swapped = layer(&blended, &base, BlendType::Multiply);
    let other_blend = layer(&base, &blended, BlendType::Screen);

    assert!(!a.is_equal(&swapped));
    assert!(!a.is_equal(&other_blend));
    assert_ne!(a.hash(), other_blend.hash());
}

#[test]
fn mismatched_opcodes_are_never_equal() {
    let base = plain_colour([8, 8]);
    let invert = AstOp::new(OpData::ImageInvert {
        base: AstChild::new(base.clone()),
    });
    let luminance = AstOp::new(OpData::ImageLuminance {
        base: AstChild::new(base),
    });
    assert!(!invert.is_equal(&luminance));
}

#[test]
fn scalar_constants_compare_by_bit_pattern() {
    let a = AstOp::new(OpData::ScalarConstant { value: 0.25 });
    let b = AstOp::new(OpData::ScalarConstant { value: 0.25 });
    let c = AstOp::new(OpData::ScalarConstant { value: 0.75 });
    assert!(a.is_equal(&b));
    assert_eq!(a.hash(), b.hash());
    assert!(!a.is_equal(&c));
}

#[test]
fn clone_with_produces_an_unlinked_copy() {
    let base = plain_colour([8, 8]);
    let op = AstOp::new(OpData::ImageInvert {
        base: AstChild::new(base),
    });
    let clone = op.clone_with(&mut |c| c.clone());
    assert!(op.is_equal(&clone));
    assert!(!clone.is_linked());
    assert!(!Rc::ptr_eq(&op, &clone));
}

#[test]
fn clone_graph_preserves_diamond_sharing() {
    // P and Q both reference X; the cloned parents must share one X'.
    let x = plain_colour([8, 8]);
    let p = AstOp::new(OpData::ImageInvert {
        base: AstChild::new(x.clone()),
    });
    let q = AstOp::new(OpData::ImageLuminance {
        base: AstChild::new(x),
    });
    let root = AstOp::new(OpData::ImageSaturate {
        base: AstChild::new(p),
        factor: AstChild::new(q),
    });

    let cloned = clone_graph(&root);
    let (p2, q2) = match cloned.data() {
        OpData::ImageSaturate { base, factor } => (
            base.child().expect("cloned p").clone(),
            factor.child().expect("cloned q").clone(),
        ),
        other => panic!("unexpected payload {other:?}"),
    };
    let x_via_p = match p2.data() {
        OpData::ImageInvert { base } => base.child().expect("cloned x").clone(),
        other => panic!("unexpected payload {other:?}"),
    };
    let x_via_q = match q2.data() {
        OpData::ImageLuminance { base } => base.child().expect("cloned x").clone(),
        other => panic!("unexpected payload {other:?}"),
    };
    assert!(Rc::ptr_eq(&x_via_p, &x_via_q), "sharing must survive clone");

    // And the clone is a different allocation than the original subtree.
    let x_original = match root.data() {
        OpData::ImageSaturate { base, .. } => match base.child().expect("p").data() {
            OpData::ImageInvert { base } => base.child().expect("x").clone(),
            other => panic!("unexpected payload {other:?}"),
        },
        other => panic!("unexpected payload {other:?}"),
    };
    assert!(!Rc::ptr_eq(&x_original, &x_via_p));
}

#[test]
fn post_order_visits_children_before_parents_and_once() {
    let x = plain_colour([8, 8]);
    let p = AstOp::new(OpData::ImageInvert {
        base: AstChild::new(x.clone()),
    });
    let q = AstOp::new(OpData::ImageLuminance {
        base: AstChild::new(x.clone()),
    });
    let root = AstOp::new(OpData::ImageSaturate {
        base: AstChild::new(p.clone()),
        factor: AstChild::new(q.clone()),
    });

    let order = visit_post_order(std::slice::from_ref(&root));
    assert_eq!(order.len(), 4, "shared x must appear exactly once");

    let position = |op: &Rc<AstOp>| {
        order
            .iter()
            .position(|o| Rc::ptr_eq(o, op))
            .expect("op visited")
    };
    assert!(position(&x) < position(&p));
    assert!(position(&x) < position(&q));
    assert!(position(&p) < position(&root));
    assert!(position(&q) < position(&root));
}

#[test]
fn for_each_child_follows_fixed_field_order() {
    let base = plain_colour([1, 1]);
    let blended = plain_colour([2, 2]);
    let op = layer(&base, &blended, BlendType::Normal);

    let mut seen = Vec::new();
    op.for_each_child(&mut |c| seen.push(c.ptr_id()));
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], Rc::as_ptr(&base) as usize);
    assert_eq!(seen[1], 0, "absent mask slot still visits");
    assert_eq!(seen[2], Rc::as_ptr(&blended) as usize);
}

#[test]
fn image_desc_propagates_through_adjustments() {
    let image = Rc::new(crate::foundation::asset::Image::new(
        [32, 16],
        crate::foundation::asset::ImageFormat::Rgb8,
    ));
    let constant = AstOp::new(OpData::ImageConstant { image });
    let invert = AstOp::new(OpData::ImageInvert {
        base: AstChild::new(constant),
    });
    let luminance = AstOp::new(OpData::ImageLuminance {
        base: AstChild::new(invert.clone()),
    });

    let mut ctx = ImageDescContext::new();
    let desc = invert.image_desc(&mut ctx);
    assert_eq!(desc.size, [32, 16]);
    assert_eq!(desc.format, crate::foundation::asset::ImageFormat::Rgb8);

    let grey = luminance.image_desc(&mut ctx);
    assert_eq!(grey.size, [32, 16]);
    assert_eq!(grey.format, crate::foundation::asset::ImageFormat::L8);
}

#[test]
fn plain_constant_query_sees_through_constant_colours() {
    let colour = AstOp::new(OpData::ColourConstant {
        value: [0.5, 0.25, 0.0, 1.0],
    });
    let plain = AstOp::new(OpData::ImagePlainColour {
        colour: AstChild::new(colour),
        size: [8, 8],
    });
    assert_eq!(plain.image_plain_constant(), Some([0.5, 0.25, 0.0, 1.0]));

    let not_constant = plain_colour([8, 8]);
    assert_eq!(not_constant.image_plain_constant(), None);
}

#[test]
fn deep_graph_teardown_does_not_recurse() {
    // A chain far deeper than the call stack; drop must stay iterative.
    let mut op = plain_colour([1, 1]);
    for _ in 0..100_000 {
        op = AstOp::new(OpData::ImageInvert {
            base: AstChild::new(op),
        });
    }
    drop(op);
}
