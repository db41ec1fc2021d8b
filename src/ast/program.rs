use std::rc::Rc;

use crate::ast::op::OpType;
use crate::foundation::asset::{Image, Mesh};
use crate::foundation::error::{ProteanError, ProteanResult};
use crate::foundation::ids::{OpAddress, RangeIndex};

/// Version of the bytecode format emitted by the linker.
pub const CODE_VERSION: u32 = 1;

/// Value category of a runtime parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ParameterType {
    /// A float scalar.
    Scalar,
    /// An integer, usually restricted to enum options.
    Int,
    /// An RGBA colour.
    Colour,
    /// A string.
    String,
}

impl ParameterType {
    pub(crate) fn code(self) -> u8 {
        match self {
            ParameterType::Scalar => 0,
            ParameterType::Int => 1,
            ParameterType::Colour => 2,
            ParameterType::String => 3,
        }
    }
}

/// Typed default value of a parameter.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ParameterValue {
    /// A float scalar.
    Scalar(f32),
    /// An integer.
    Int(i32),
    /// An RGBA colour.
    Colour([f32; 4]),
    /// A string.
    String(String),
}

/// One named option of an integer enum parameter.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EnumOptionDesc {
    /// Display name of the option.
    pub name: String,
    /// Value the parameter takes when this option is selected.
    pub value: i32,
}

/// Runtime-facing descriptor of one authored parameter.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParameterDesc {
    /// Display name, unique within a program.
    pub name: String,
    /// Stable external identifier carried from the authoring tool.
    pub uid: String,
    /// Value category.
    pub param_type: ParameterType,
    /// Default value; its variant matches `param_type`.
    pub default_value: ParameterValue,
    /// Named options for integer enum parameters, empty otherwise.
    pub possible_values: Vec<EnumOptionDesc>,
    /// Indices into the program's range table, filled in at link time.
    pub ranges: Vec<RangeIndex>,
}

/// Descriptor of one parameter-iteration range.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RangeDesc {
    /// Authored range name.
    pub name: String,
    /// Address of the scalar operation computing the range size.
    pub size: OpAddress,
}

/// A linked bytecode program.
///
/// `op_address[i]` is the byte offset of operation `i` inside the flat
/// byte buffer; each entry is an opcode tag followed by that opcode's
/// fixed-layout argument record. Entry 0 is a reserved no-op so that
/// address 0 can double as the absent-child sentinel. Every address
/// referenced by an argument record points at an operation emitted
/// strictly earlier.
#[derive(Debug)]
pub struct Program {
    version: u32,
    op_address: Vec<u32>,
    code: CodeBuf,
    root: OpAddress,
    parameters: Vec<ParameterDesc>,
    ranges: Vec<RangeDesc>,
    constant_strings: Vec<String>,
    constant_images: Vec<Rc<Image>>,
    constant_meshes: Vec<Rc<Mesh>>,
}

impl Program {
    /// Create an empty program holding only the reserved no-op entry.
    pub fn new() -> Self {
        let mut program = Self {
            version: CODE_VERSION,
            op_address: Vec::new(),
            code: CodeBuf::default(),
            root: OpAddress::NONE,
            parameters: Vec::new(),
            ranges: Vec::new(),
            constant_strings: Vec::new(),
            constant_images: Vec::new(),
            constant_meshes: Vec::new(),
        };
        program.begin_op(OpType::None);
        program
    }

    /// Bytecode format version of this program.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Number of linked operations, including the reserved entry 0.
    pub fn op_count(&self) -> usize {
        self.op_address.len()
    }

    /// The flat bytecode buffer.
    pub fn byte_code(&self) -> &[u8] {
        self.code.bytes()
    }

    /// Address of the program's root operation.
    pub fn root_address(&self) -> OpAddress {
        self.root
    }

    /// Parameter descriptors, in link order.
    pub fn parameters(&self) -> &[ParameterDesc] {
        &self.parameters
    }

    /// Range descriptors, in link order.
    pub fn ranges(&self) -> &[RangeDesc] {
        &self.ranges
    }

    /// String constants referenced by string-constant operations.
    pub fn constant_strings(&self) -> &[String] {
        &self.constant_strings
    }

    /// Image payloads referenced by image-constant operations.
    pub fn constant_images(&self) -> &[Rc<Image>] {
        &self.constant_images
    }

    /// Mesh payloads referenced by mesh-constant operations.
    pub fn constant_meshes(&self) -> &[Rc<Mesh>] {
        &self.constant_meshes
    }

    /// Byte offset of the operation at `address`.
    pub fn offset_of(&self, address: OpAddress) -> Option<u32> {
        self.op_address.get(address.0 as usize).copied()
    }

    /// Decoded opcode of the operation at `address`.
    pub fn op_type_at(&self, address: OpAddress) -> ProteanResult<OpType> {
        let offset = self.offset_of(address).ok_or_else(|| {
            ProteanError::schema(format!("address {} outside the address table", address.0))
        })? as usize;
        let mut reader = CodeReader::new(&self.code.bytes()[offset..]);
        let tag = reader.read_u16()?;
        OpType::from_u16(tag)
            .ok_or_else(|| ProteanError::schema(format!("unknown opcode tag {tag}")))
    }

    pub(crate) fn set_root(&mut self, root: OpAddress) {
        self.root = root;
    }

    /// Start a new table entry for `op` at the current end of the byte
    /// buffer and return its address.
    pub(crate) fn begin_op(&mut self, op: OpType) -> OpAddress {
        let address = OpAddress(self.op_address.len() as u32);
        self.op_address.push(self.code.len() as u32);
        self.code.write_u16(op as u16);
        address
    }

    pub(crate) fn code_mut(&mut self) -> &mut CodeBuf {
        &mut self.code
    }

    pub(crate) fn push_parameter(&mut self, desc: ParameterDesc) -> u32 {
        let index = self.parameters.len() as u32;
        self.parameters.push(desc);
        index
    }

    pub(crate) fn push_range(&mut self, desc: RangeDesc) -> RangeIndex {
        let index = RangeIndex(self.ranges.len() as u16);
        self.ranges.push(desc);
        index
    }

    pub(crate) fn last_parameter_mut(&mut self) -> Option<&mut ParameterDesc> {
        self.parameters.last_mut()
    }

    pub(crate) fn push_constant_string(&mut self, value: String) -> u32 {
        let index = self.constant_strings.len() as u32;
        self.constant_strings.push(value);
        index
    }

    pub(crate) fn push_constant_image(&mut self, image: Rc<Image>) -> u32 {
        let index = self.constant_images.len() as u32;
        self.constant_images.push(image);
        index
    }

    pub(crate) fn push_constant_mesh(&mut self, mesh: Rc<Mesh>) -> u32 {
        let index = self.constant_meshes.len() as u32;
        self.constant_meshes.push(mesh);
        index
    }

    /// Decode the whole program into an inspectable view.
    ///
    /// Fails on unknown opcode tags or truncated argument records; a
    /// malformed buffer invalidates all subsequent offsets, so decoding
    /// aborts at the first error.
    pub fn disassemble(&self) -> ProteanResult<Disassembly> {
        let mut ops = Vec::with_capacity(self.op_count());
        for (index, &offset) in self.op_address.iter().enumerate() {
            let mut reader = CodeReader::new(&self.code.bytes()[offset as usize..]);
            let tag = reader.read_u16()?;
            let op_type = OpType::from_u16(tag)
                .ok_or_else(|| ProteanError::schema(format!("unknown opcode tag {tag}")))?;
            let children = crate::ast::link::decode_child_addresses(op_type, &mut reader)?;
            ops.push(DisassembledOp {
                address: index as u32,
                offset,
                op_type,
                children,
            });
        }
        Ok(Disassembly {
            version: self.version,
            root: self.root.0,
            ops,
        })
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

/// Inspectable view of a linked program, decoded from the byte buffer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Disassembly {
    /// Bytecode format version.
    pub version: u32,
    /// Address of the root operation.
    pub root: u32,
    /// One entry per linked operation, in emission order.
    pub ops: Vec<DisassembledOp>,
}

/// One decoded operation entry.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DisassembledOp {
    /// Table index of the operation.
    pub address: u32,
    /// Byte offset of the entry inside the byte buffer.
    pub offset: u32,
    /// Decoded opcode.
    pub op_type: OpType,
    /// Raw child address slots, in argument-record order. Absent
    /// children keep the 0 sentinel.
    pub children: Vec<u32>,
}

/// Growing byte buffer the linker appends argument records to.
#[derive(Debug, Default)]
pub(crate) struct CodeBuf {
    bytes: Vec<u8>,
}

impl CodeBuf {
    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn write_u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    pub(crate) fn write_u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn write_u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    pub(crate) fn write_address(&mut self, a: OpAddress) {
        self.write_u32(a.0);
    }
}

/// Cursor decoding one operation entry out of the byte buffer.
#[derive(Debug)]
pub(crate) struct CodeReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> CodeReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> ProteanResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| ProteanError::schema("bytecode truncated"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self) -> ProteanResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> ProteanResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn read_u32(&mut self) -> ProteanResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn read_f32(&mut self) -> ProteanResult<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub(crate) fn skip(&mut self, n: usize) -> ProteanResult<()> {
        self.take(n).map(|_| ())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/ast/program.rs"]
mod tests;
