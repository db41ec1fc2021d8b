use std::rc::Rc;

use protean::OpAddress;
use protean::ast::{
    AstChild, AstOp, LinkerOptions, MAX_ADD_COUNT, MAX_MORPH_COUNT, OpData, OpType, Program,
    link_graph,
};

fn scalar(value: f32) -> Rc<AstOp> {
    AstOp::new(OpData::ScalarConstant { value })
}

#[test]
fn shared_children_link_exactly_once() {
    // Two parents share one child; linking the whole graph must emit the
    // child a single time and reuse its address.
    let shared = scalar(1.0);
    let left = AstOp::new(OpData::ColourFromScalars {
        x: AstChild::new(shared.clone()),
        y: AstChild::new(shared.clone()),
        z: AstChild::new(shared.clone()),
        w: AstChild::new(shared.clone()),
    });
    let right = AstOp::new(OpData::ColourArithmetic {
        op: protean::ColourArithmeticOp::Add,
        a: AstChild::new(left.clone()),
        b: AstChild::new(left.clone()),
    });

    let mut program = Program::new();
    let root_address = link_graph(&right, &mut program, &LinkerOptions::default());

    // Reserved entry + shared scalar + left + right.
    assert_eq!(program.op_count(), 4);
    assert_eq!(root_address, right.linked_address());

    // Re-linking is a no-op: no new entries, addresses unchanged.
    let before = shared.linked_address();
    shared.link(&mut program, &LinkerOptions::default());
    right.link(&mut program, &LinkerOptions::default());
    assert_eq!(program.op_count(), 4);
    assert_eq!(shared.linked_address(), before);
}

#[test]
fn every_child_address_precedes_its_parent() {
    let a = scalar(0.0);
    let b = scalar(1.0);
    let colour = AstOp::new(OpData::ColourFromScalars {
        x: AstChild::new(a.clone()),
        y: AstChild::new(b.clone()),
        z: AstChild::new(a),
        w: AstChild::new(b),
    });
    let plain = AstOp::new(OpData::ImagePlainColour {
        colour: AstChild::new(colour),
        size: [64, 64],
    });
    let root = AstOp::new(OpData::ImageLayer {
        base: AstChild::new(plain.clone()),
        mask: AstChild::none(),
        blended: AstChild::new(AstOp::new(OpData::ImageInvert {
            base: AstChild::new(plain),
        })),
        blend_type: protean::BlendType::Overlay,
    });

    let mut program = Program::new();
    link_graph(&root, &mut program, &LinkerOptions::default());

    let dis = program.disassemble().expect("disassemble");
    for op in &dis.ops {
        for &child in &op.children {
            assert!(
                child < op.address,
                "op {} at address {} references later address {}",
                format!("{:?}", op.op_type),
                op.address,
                child
            );
        }
    }
}

#[test]
fn add_lod_encodes_at_most_the_cap_in_insertion_order() {
    let lods: Vec<Rc<AstOp>> = (0..MAX_ADD_COUNT + 2)
        .map(|i| scalar(i as f32))
        .collect();
    let root = AstOp::new(OpData::AddLod {
        lods: lods.iter().map(|l| AstChild::new(l.clone())).collect(),
    });

    let mut program = Program::new();
    let root_address = link_graph(&root, &mut program, &LinkerOptions::default());

    let dis = program.disassemble().expect("disassemble");
    let entry = dis
        .ops
        .iter()
        .find(|op| op.address == root_address.0)
        .expect("root entry");
    assert_eq!(entry.op_type, OpType::AddLod);
    assert_eq!(entry.children.len(), MAX_ADD_COUNT);

    // The first MAX_ADD_COUNT children, in insertion order; the two
    // excess children are silently dropped from the record.
    for (slot, lod) in entry.children.iter().zip(&lods) {
        assert_ne!(*slot, 0);
        assert_eq!(*slot, lod.linked_address().0);
    }
    assert!(lods[MAX_ADD_COUNT..]
        .iter()
        .all(|dropped| !entry.children.contains(&dropped.linked_address().0)));
}

#[test]
fn add_lod_skips_absent_children_before_capping() {
    let present = scalar(1.0);
    let mut lods: Vec<AstChild> = vec![AstChild::none(), AstChild::new(present.clone())];
    lods.push(AstChild::none());
    let root = AstOp::new(OpData::AddLod {
        lods: lods.into_iter().collect(),
    });

    let mut program = Program::new();
    let root_address = link_graph(&root, &mut program, &LinkerOptions::default());

    let dis = program.disassemble().expect("disassemble");
    let entry = dis
        .ops
        .iter()
        .find(|op| op.address == root_address.0)
        .expect("root entry");
    // The one present child packs into slot 0; the rest stay sentinel.
    assert_eq!(entry.children[0], present.linked_address().0);
    assert!(entry.children[1..].iter().all(|&slot| slot == 0));
}

#[test]
fn mesh_morph_targets_share_the_bounded_record_shape() {
    let factor = scalar(0.5);
    let base = AstOp::new(OpData::MeshConstant {
        mesh: Rc::new(protean::Mesh::default()),
    });
    let targets: Vec<Rc<AstOp>> = (0..MAX_MORPH_COUNT + 2)
        .map(|_| {
            AstOp::new(OpData::MeshConstant {
                mesh: Rc::new(protean::Mesh::default()),
            })
        })
        .collect();
    let root = AstOp::new(OpData::MeshMorph {
        factor: AstChild::new(factor),
        base: AstChild::new(base),
        targets: targets.iter().map(|t| AstChild::new(t.clone())).collect(),
    });

    let mut program = Program::new();
    let root_address = link_graph(&root, &mut program, &LinkerOptions::default());

    let dis = program.disassemble().expect("disassemble");
    let entry = dis
        .ops
        .iter()
        .find(|op| op.address == root_address.0)
        .expect("root entry");
    // factor + base + the capped target slots.
    assert_eq!(entry.children.len(), 2 + MAX_MORPH_COUNT);
    for (slot, target) in entry.children[2..].iter().zip(&targets) {
        assert_eq!(*slot, target.linked_address().0);
    }
}

#[test]
fn linked_addresses_survive_cloning_as_unlinked() {
    let child = scalar(2.0);
    let root = AstOp::new(OpData::ImagePlainColour {
        colour: AstChild::new(AstOp::new(OpData::ColourFromScalars {
            x: AstChild::new(child.clone()),
            y: AstChild::new(child.clone()),
            z: AstChild::new(child.clone()),
            w: AstChild::new(child),
        })),
        size: [2, 2],
    });

    let mut program = Program::new();
    link_graph(&root, &mut program, &LinkerOptions::default());
    assert!(root.is_linked());

    let clone = protean::ast::clone_graph(&root);
    assert!(!clone.is_linked(), "clones start a fresh link lifecycle");
    assert_ne!(clone.linked_address(), root.linked_address());
    assert_eq!(clone.linked_address(), OpAddress::NONE);
}
