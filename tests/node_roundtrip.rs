use std::rc::Rc;

use protean::node::archive::{InputArchive, OutputArchive};
use protean::node::{
    AnyNode, ColourKind, ColourNode, EnumOption, ImageKind, ImageNode, MeshKind, MeshNode,
    NodeCategory, NodeCloneMap, RangeKind, RangeNode, ScalarKind, ScalarNode, StringKind,
    StringNode, clone_node,
};
use protean::{ColourArithmeticOp, Image, ImageFormat, Mesh};

/// A graph touching every node category and most kinds, with one node
/// (the saturation factor parameter) shared from two places.
fn kitchen_sink() -> AnyNode {
    let factor = ScalarNode::new(ScalarKind::Parameter {
        name: "saturation".into(),
        uid: "uid-sat".into(),
        default_value: 1.0,
        ranges: vec![RangeNode::new(RangeKind::FromScalar {
            size: Some(ScalarNode::constant(4.0)),
            name: "variants".into(),
        })],
    });
    let tint = ColourNode::new(ColourKind::Arithmetic {
        op: ColourArithmeticOp::Multiply,
        a: Some(ColourNode::new(ColourKind::Constant {
            value: [1.0, 0.5, 0.25, 1.0],
        })),
        b: Some(ColourNode::new(ColourKind::FromScalars {
            x: Some(factor.clone()),
            y: Some(ScalarNode::constant(0.5)),
            z: None,
            w: None,
        })),
    });
    let base = ImageNode::new(ImageKind::Constant {
        image: Rc::new(Image::new([8, 4], ImageFormat::Rgba8)),
    });
    let layered = ImageNode::new(ImageKind::Layer {
        base: Some(base.clone()),
        mask: Some(ImageNode::new(ImageKind::Luminance {
            base: Some(base.clone()),
        })),
        blended: Some(ImageNode::new(ImageKind::PlainColour {
            colour: Some(tint),
            size: [8, 4],
        })),
        blend_type: protean::BlendType::SoftLight,
    });
    AnyNode::Image(ImageNode::new(ImageKind::Saturate {
        base: Some(layered),
        factor: Some(factor),
    }))
}

fn serialise(node: &AnyNode) -> Vec<u8> {
    let mut out = OutputArchive::new();
    out.write_node(Some(node));
    out.into_bytes()
}

#[test]
fn archives_round_trip_bytewise() {
    let original = kitchen_sink();
    let bytes = serialise(&original);

    let mut input = InputArchive::new(&bytes);
    let decoded = input
        .read_node(NodeCategory::Image)
        .expect("decode")
        .expect("non-null root");
    assert!(input.is_at_end());

    // Re-encoding the decoded graph reproduces the stream exactly:
    // field order, versions and back-reference ids are deterministic.
    assert_eq!(serialise(&decoded), bytes);
}

#[test]
fn shared_nodes_are_restored_as_shared() {
    let bytes = serialise(&kitchen_sink());
    let mut input = InputArchive::new(&bytes);
    let decoded = input
        .read_node(NodeCategory::Image)
        .expect("decode")
        .expect("root");

    // The base image feeds both the layer base and the mask's luminance;
    // decoding must restore one instance, not two equal copies.
    let root = decoded.as_image().expect("image root");
    let root = root.borrow();
    let layered = match root.kind() {
        ImageKind::Saturate { base, .. } => base.clone().expect("layer"),
        other => panic!("unexpected kind {other:?}"),
    };
    let layered = layered.borrow();
    let (base, mask) = match layered.kind() {
        ImageKind::Layer { base, mask, .. } => (
            base.clone().expect("base"),
            mask.clone().expect("mask"),
        ),
        other => panic!("unexpected kind {other:?}"),
    };
    let mask = mask.borrow();
    let mask_base = match mask.kind() {
        ImageKind::Luminance { base } => base.clone().expect("mask base"),
        other => panic!("unexpected kind {other:?}"),
    };
    assert!(Rc::ptr_eq(&base, &mask_base));
}

#[test]
fn every_leaf_kind_round_trips() {
    let nodes = [
        AnyNode::Scalar(ScalarNode::constant(2.25)),
        AnyNode::Scalar(ScalarNode::new(ScalarKind::EnumParameter {
            name: "preset".into(),
            uid: "uid-preset".into(),
            default_value: 2,
            options: vec![
                EnumOption {
                    name: "small".into(),
                    value: 1,
                },
                EnumOption {
                    name: "large".into(),
                    value: 2,
                },
            ],
        })),
        AnyNode::String(StringNode::new(StringKind::Constant {
            value: "badge".into(),
        })),
        AnyNode::String(StringNode::new(StringKind::Parameter {
            name: "label".into(),
            uid: "uid-label".into(),
            default_value: "hero".into(),
        })),
        AnyNode::Colour(ColourNode::new(ColourKind::Parameter {
            name: "skin".into(),
            uid: "uid-skin".into(),
            default_value: [0.8, 0.6, 0.5, 1.0],
        })),
        AnyNode::Mesh(MeshNode::new(MeshKind::Constant {
            mesh: Rc::new(Mesh {
                positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                indices: vec![0, 1, 2],
            }),
        })),
        AnyNode::Range(RangeNode::new(RangeKind::FromScalar {
            size: Some(ScalarNode::constant(3.0)),
            name: "copies".into(),
        })),
    ];

    for node in nodes {
        let bytes = serialise(&node);
        let mut input = InputArchive::new(&bytes);
        let decoded = input
            .read_node(node.category())
            .expect("decode")
            .expect("non-null");
        assert!(input.is_at_end());
        assert_eq!(serialise(&decoded), bytes);
    }
}

#[test]
fn mesh_round_trips_through_all_kinds() {
    let base = MeshNode::new(MeshKind::Constant {
        mesh: Rc::new(Mesh::default()),
    });
    let posed = MeshNode::new(MeshKind::ApplyPose {
        base: Some(base.clone()),
        pose: None,
    });
    let clipped = MeshNode::new(MeshKind::ClipDeform {
        base: Some(posed),
        clip_shape: Some(base.clone()),
    });
    let mut transform = [0.0f32; 16];
    for i in 0..4 {
        transform[i * 4 + i] = 1.0;
    }
    let transformed = MeshNode::new(MeshKind::Transform {
        source: Some(clipped),
        transform,
    });
    let morphed = MeshNode::new(MeshKind::Morph {
        factor: Some(ScalarNode::constant(0.75)),
        base: Some(transformed),
        morphs: vec![Some(base), None],
        vertex_indices_are_relative: true,
        reshape_skeleton: true,
        reshape_physics_volumes: false,
        deform_all_bones: false,
        deform_all_physics: true,
        bones_to_deform: vec!["spine".into(), "neck".into()],
        physics_to_deform: vec!["ragdoll".into()],
    });

    let node = AnyNode::Mesh(morphed);
    let bytes = serialise(&node);
    let mut input = InputArchive::new(&bytes);
    let decoded = input
        .read_node(NodeCategory::Mesh)
        .expect("decode")
        .expect("root");
    assert!(input.is_at_end());
    assert_eq!(serialise(&decoded), bytes);

    let decoded = decoded.as_mesh().expect("mesh");
    let decoded = decoded.borrow();
    match decoded.kind() {
        MeshKind::Morph {
            vertex_indices_are_relative,
            reshape_skeleton,
            bones_to_deform,
            physics_to_deform,
            morphs,
            ..
        } => {
            assert!(*vertex_indices_are_relative);
            assert!(*reshape_skeleton);
            assert_eq!(bones_to_deform, &["spine", "neck"]);
            assert_eq!(physics_to_deform, &["ragdoll"]);
            assert_eq!(morphs.len(), 2);
            assert!(morphs[0].is_some());
            assert!(morphs[1].is_none());
        }
        other => panic!("unexpected kind {other:?}"),
    }
}

// Version 1 morph records predate the reshape fields; readers must
// default them.
#[test]
fn morph_version_1_reads_with_defaults() {
    let mut out = OutputArchive::new();
    out.write_u32(0); // container version
    out.write_u32(1); // morph discriminator
    out.write_u32(1); // record version 1
    out.write_u8(0); // factor: null
    out.write_u8(0); // base: null
    out.write_u32(0); // no morph targets
    out.write_bool(true); // vertex_indices_are_relative
    let bytes = out.into_bytes();

    let mut input = InputArchive::new(&bytes);
    let node = MeshNode::static_unserialise(&mut input).expect("v1 record");
    assert!(input.is_at_end());

    let node = node.borrow();
    match node.kind() {
        MeshKind::Morph {
            vertex_indices_are_relative,
            reshape_skeleton,
            reshape_physics_volumes,
            deform_all_bones,
            deform_all_physics,
            bones_to_deform,
            physics_to_deform,
            ..
        } => {
            assert!(*vertex_indices_are_relative);
            assert!(!*reshape_skeleton);
            assert!(!*reshape_physics_volumes);
            assert!(!*deform_all_bones);
            assert!(!*deform_all_physics);
            assert!(bones_to_deform.is_empty());
            assert!(physics_to_deform.is_empty());
        }
        other => panic!("unexpected kind {other:?}"),
    }
}

// Version 2 archives double-wrote the reshape-physics flag; the reader
// must consume both bytes to stay aligned, keeping the second value.
#[test]
fn morph_version_2_consumes_the_double_written_flag() {
    let mut out = OutputArchive::new();
    out.write_u32(0); // container version
    out.write_u32(1); // morph discriminator
    out.write_u32(2); // record version 2
    out.write_u8(0); // factor: null
    out.write_u8(0); // base: null
    out.write_u32(0); // no morph targets
    out.write_bool(false); // vertex_indices_are_relative
    out.write_bool(true); // reshape_skeleton
    out.write_bool(false); // reshape_physics_volumes, first copy
    out.write_bool(true); // reshape_physics_volumes, doubled copy
    out.write_str_list(&["jaw".to_string()]);
    let bytes = out.into_bytes();

    let mut input = InputArchive::new(&bytes);
    let node = MeshNode::static_unserialise(&mut input).expect("v2 record");
    // Both copies consumed: nothing may remain in the stream.
    assert!(input.is_at_end());

    let node = node.borrow();
    match node.kind() {
        MeshKind::Morph {
            reshape_skeleton,
            reshape_physics_volumes,
            bones_to_deform,
            deform_all_bones,
            ..
        } => {
            assert!(*reshape_skeleton);
            assert!(*reshape_physics_volumes, "second copy wins");
            assert_eq!(bones_to_deform, &["jaw"]);
            assert!(!*deform_all_bones, "v3 fields default");
        }
        other => panic!("unexpected kind {other:?}"),
    }
}

#[test]
fn future_record_versions_are_rejected() {
    let mut out = OutputArchive::new();
    out.write_u32(0); // container version
    out.write_u32(1); // morph discriminator
    out.write_u32(4); // one past the newest known version
    let bytes = out.into_bytes();

    let mut input = InputArchive::new(&bytes);
    assert!(MeshNode::static_unserialise(&mut input).is_err());
}

#[test]
fn unknown_discriminators_are_rejected() {
    let mut out = OutputArchive::new();
    out.write_u32(0); // container version
    out.write_u32(99); // no such mesh kind
    let bytes = out.into_bytes();

    let mut input = InputArchive::new(&bytes);
    assert!(MeshNode::static_unserialise(&mut input).is_err());
}

#[test]
fn future_container_versions_are_rejected() {
    let mut out = OutputArchive::new();
    out.write_u32(7); // unknown container version
    out.write_u32(0);
    let bytes = out.into_bytes();

    let mut input = InputArchive::new(&bytes);
    assert!(ImageNode::static_unserialise(&mut input).is_err());
}

#[test]
fn wrong_category_inputs_keep_the_previous_value() {
    let original = ImageNode::new(ImageKind::PlainColour {
        colour: None,
        size: [2, 2],
    });
    let invert = ImageNode::new(ImageKind::Invert {
        base: Some(original.clone()),
    });

    // A scalar is not an image; the slot must keep its value.
    invert
        .borrow_mut()
        .set_input_node(0, Some(AnyNode::Scalar(ScalarNode::constant(1.0))));
    let guard = invert.borrow();
    match guard.kind() {
        ImageKind::Invert { base } => {
            let kept = base.clone().expect("slot still filled");
            assert!(Rc::ptr_eq(&kept, &original));
        }
        other => panic!("unexpected kind {other:?}"),
    }
}

#[test]
fn correct_category_inputs_install_and_clear() {
    let invert = ImageNode::new(ImageKind::Invert { base: None });
    let replacement = ImageNode::new(ImageKind::PlainColour {
        colour: None,
        size: [1, 1],
    });

    invert
        .borrow_mut()
        .set_input_node(0, Some(AnyNode::Image(replacement.clone())));
    assert!(matches!(
        invert.borrow().input_node(0),
        Some(AnyNode::Image(n)) if Rc::ptr_eq(&n, &replacement)
    ));

    invert.borrow_mut().set_input_node(0, None);
    assert!(invert.borrow().input_node(0).is_none());
}

#[test]
fn clone_node_preserves_sharing_with_one_map() {
    let original = kitchen_sink();
    let mut map = NodeCloneMap::new();
    let cloned = clone_node(&original, &mut map);

    // Structure is identical (same archive bytes) but every node is a
    // fresh allocation.
    assert_eq!(serialise(&cloned), serialise(&original));

    let root = cloned.as_image().expect("image root");
    let original_root = original.as_image().expect("image root");
    assert!(!Rc::ptr_eq(&root, &original_root));

    // The shared saturation factor parameter stays shared in the clone.
    let root = root.borrow();
    let (layered, factor) = match root.kind() {
        ImageKind::Saturate { base, factor } => (
            base.clone().expect("layer"),
            factor.clone().expect("factor"),
        ),
        other => panic!("unexpected kind {other:?}"),
    };
    let layered = layered.borrow();
    let blended = match layered.kind() {
        ImageKind::Layer { blended, .. } => blended.clone().expect("blended"),
        other => panic!("unexpected kind {other:?}"),
    };
    let blended = blended.borrow();
    let tint = match blended.kind() {
        ImageKind::PlainColour { colour, .. } => colour.clone().expect("tint"),
        other => panic!("unexpected kind {other:?}"),
    };
    let tint = tint.borrow();
    let from_scalars = match tint.kind() {
        ColourKind::Arithmetic { b, .. } => b.clone().expect("from scalars"),
        other => panic!("unexpected kind {other:?}"),
    };
    let from_scalars = from_scalars.borrow();
    let factor_via_colour = match from_scalars.kind() {
        ColourKind::FromScalars { x, .. } => x.clone().expect("x"),
        other => panic!("unexpected kind {other:?}"),
    };
    assert!(Rc::ptr_eq(&factor, &factor_via_colour));
}
