use super::*;

#[test]
fn blend_type_codes_round_trip() {
    let all = [
        BlendType::Normal,
        BlendType::Multiply,
        BlendType::Screen,
        BlendType::Overlay,
        BlendType::SoftLight,
        BlendType::HardLight,
        BlendType::Burn,
        BlendType::Dodge,
    ];
    for blend in all {
        assert_eq!(BlendType::from_code(blend.code()), Some(blend));
    }
    assert_eq!(BlendType::from_code(8), None);
}

#[test]
fn colour_arithmetic_codes_round_trip() {
    let all = [
        ColourArithmeticOp::Add,
        ColourArithmeticOp::Subtract,
        ColourArithmeticOp::Multiply,
        ColourArithmeticOp::Divide,
    ];
    for op in all {
        assert_eq!(ColourArithmeticOp::from_code(op.code()), Some(op));
    }
    assert_eq!(ColourArithmeticOp::from_code(4), None);
}

#[test]
fn blend_codes_are_stable_and_distinct() {
    // These values are written into shipped bytecode.
    assert_eq!(BlendType::Normal.code(), 0);
    assert_eq!(BlendType::Multiply.code(), 1);
    assert_eq!(BlendType::Dodge.code(), 7);
}
