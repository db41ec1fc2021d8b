use super::*;

#[test]
fn new_programs_reserve_the_null_entry() {
    let program = Program::new();
    assert_eq!(program.version(), CODE_VERSION);
    assert_eq!(program.op_count(), 1);
    assert_eq!(program.offset_of(OpAddress::NONE), Some(0));
    assert_eq!(
        program.op_type_at(OpAddress::NONE).expect("reserved entry"),
        OpType::None
    );
    // Just the opcode tag: the reserved entry has no argument record.
    assert_eq!(
        program.byte_code(),
        (OpType::None as u16).to_le_bytes().as_slice()
    );
}

#[test]
fn addresses_outside_the_table_are_rejected() {
    let program = Program::new();
    assert!(program.op_type_at(OpAddress(3)).is_err());
}

#[test]
fn table_pushes_hand_out_sequential_indices() {
    let mut program = Program::new();
    assert_eq!(program.push_constant_string("a".into()), 0);
    assert_eq!(program.push_constant_string("b".into()), 1);
    let r0 = program.push_range(RangeDesc {
        name: "items".into(),
        size: OpAddress(1),
    });
    assert_eq!(r0, RangeIndex(0));
    assert_eq!(program.ranges().len(), 1);
    assert_eq!(program.constant_strings(), &["a", "b"]);
}

#[test]
fn disassembly_of_an_empty_program_holds_only_the_reserved_entry() {
    let program = Program::new();
    let dis = program.disassemble().expect("disassemble");
    assert_eq!(dis.version, CODE_VERSION);
    assert_eq!(dis.ops.len(), 1);
    assert_eq!(dis.ops[0].op_type, OpType::None);
    assert!(dis.ops[0].children.is_empty());
}

#[test]
fn disassembly_serialises_to_json() {
    let program = Program::new();
    let dis = program.disassemble().expect("disassemble");
    let json = serde_json::to_string(&dis).expect("serialise view");
    assert!(json.contains("\"ops\""));
}
