use super::*;
use crate::node::{ScalarKind, ScalarNode};

#[test]
fn primitives_round_trip() {
    let mut out = OutputArchive::new();
    out.write_u8(7);
    out.write_bool(true);
    out.write_u16(0xBEEF);
    out.write_u32(0xDEAD_BEEF);
    out.write_i32(-42);
    out.write_f32(1.5);
    out.write_str("protean");
    out.write_bytes(&[1, 2, 3]);
    out.write_str_list(&["a".to_string(), "b".to_string()]);

    let bytes = out.into_bytes();
    let mut input = InputArchive::new(&bytes);
    assert_eq!(input.read_u8().unwrap(), 7);
    assert!(input.read_bool().unwrap());
    assert_eq!(input.read_u16().unwrap(), 0xBEEF);
    assert_eq!(input.read_u32().unwrap(), 0xDEAD_BEEF);
    assert_eq!(input.read_i32().unwrap(), -42);
    assert_eq!(input.read_f32().unwrap(), 1.5);
    assert_eq!(input.read_str().unwrap(), "protean");
    assert_eq!(input.read_bytes().unwrap(), vec![1, 2, 3]);
    assert_eq!(input.read_str_list().unwrap(), vec!["a", "b"]);
    assert!(input.is_at_end());
}

#[test]
fn bool_bytes_other_than_zero_and_one_are_rejected() {
    let mut input = InputArchive::new(&[2]);
    assert!(input.read_bool().is_err());
}

#[test]
fn truncated_streams_fail() {
    let mut input = InputArchive::new(&[1, 2]);
    assert!(input.read_u32().is_err());
}

#[test]
fn unknown_reference_markers_fail() {
    let mut input = InputArchive::new(&[9]);
    assert!(input.read_node(NodeCategory::Scalar).is_err());
}

#[test]
fn shared_references_collapse_to_backrefs() {
    let shared = ScalarNode::new(ScalarKind::Constant { value: 3.5 });
    let mut out = OutputArchive::new();
    out.write_scalar(&Some(shared.clone()));
    out.write_scalar(&Some(shared));
    let bytes = out.into_bytes();

    let mut input = InputArchive::new(&bytes);
    let first = input.read_scalar().unwrap().expect("first instance");
    let second = input.read_scalar().unwrap().expect("backref instance");
    assert!(std::rc::Rc::ptr_eq(&first, &second));
    assert!(input.is_at_end());
}

#[test]
fn backrefs_to_the_wrong_category_are_a_schema_error() {
    let shared = ScalarNode::new(ScalarKind::Constant { value: 1.0 });
    let mut out = OutputArchive::new();
    out.write_scalar(&Some(shared.clone()));
    out.write_scalar(&Some(shared));
    let bytes = out.into_bytes();

    let mut input = InputArchive::new(&bytes);
    input.read_scalar().unwrap();
    // The second reference is a back-reference to a scalar; asking for an
    // image must fail rather than install a mistyped node.
    assert!(input.read_image().is_err());
}

#[test]
fn backrefs_to_unknown_ids_are_a_schema_error() {
    // marker 2 (backref), id 5 with no nodes decoded yet.
    let bytes = [2u8, 5, 0, 0, 0];
    let mut input = InputArchive::new(&bytes);
    assert!(input.read_node(NodeCategory::Scalar).is_err());
}

#[test]
fn invalid_utf8_strings_are_a_schema_error() {
    let mut out = OutputArchive::new();
    out.write_bytes(&[0xFF, 0xFE]);
    let bytes = out.into_bytes();
    let mut input = InputArchive::new(&bytes);
    assert!(input.read_str().is_err());
}
