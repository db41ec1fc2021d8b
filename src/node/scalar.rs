use std::cell::RefCell;
use std::rc::Rc;

use crate::foundation::error::{ProteanError, ProteanResult};
use crate::node::archive::{InputArchive, OutputArchive};
use crate::node::{AnyNode, NodeCloneMap, RangeNodeRef, ScalarNodeRef};

pub(crate) const KIND_COUNT: usize = 3;

const DISC_CONSTANT: u32 = 0;
const DISC_PARAMETER: u32 = 1;
const DISC_ENUM_PARAMETER: u32 = 2;

const CONTAINER_VERSION: u32 = 0;

/// One selectable option of an enum parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumOption {
    /// Display name of the option.
    pub name: String,
    /// Value the parameter takes when this option is selected.
    pub value: i32,
}

/// Concrete scalar node kinds.
#[derive(Debug)]
pub enum ScalarKind {
    /// A constant scalar value.
    Constant {
        /// The value.
        value: f32,
    },
    /// A runtime scalar parameter.
    Parameter {
        /// Display name, unique within the compiled object.
        name: String,
        /// Stable external identifier.
        uid: String,
        /// Default value.
        default_value: f32,
        /// Iteration ranges this parameter varies over.
        ranges: Vec<RangeNodeRef>,
    },
    /// A runtime integer parameter restricted to named options.
    EnumParameter {
        /// Display name, unique within the compiled object.
        name: String,
        /// Stable external identifier.
        uid: String,
        /// Default option value.
        default_value: i32,
        /// The selectable options.
        options: Vec<EnumOption>,
    },
}

/// A scalar-valued authoring node.
#[derive(Debug)]
pub struct ScalarNode {
    kind: ScalarKind,
}

impl ScalarNode {
    /// Wrap a kind into a shared node handle.
    pub fn new(kind: ScalarKind) -> ScalarNodeRef {
        Rc::new(RefCell::new(Self { kind }))
    }

    /// Shorthand for a constant scalar node.
    pub fn constant(value: f32) -> ScalarNodeRef {
        Self::new(ScalarKind::Constant { value })
    }

    /// Concrete kind of this node.
    pub fn kind(&self) -> &ScalarKind {
        &self.kind
    }

    /// Mutable access to the concrete kind.
    pub fn kind_mut(&mut self) -> &mut ScalarKind {
        &mut self.kind
    }

    /// Name of the concrete kind, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            ScalarKind::Constant { .. } => "ScalarConstant",
            ScalarKind::Parameter { .. } => "ScalarParameter",
            ScalarKind::EnumParameter { .. } => "ScalarEnumParameter",
        }
    }

    /// Number of input slots, fixed per kind.
    ///
    /// Scalar nodes are leaves: parameter ranges are reached through
    /// [`ScalarNode::ranges`], not the indexed input protocol.
    pub fn input_count(&self) -> usize {
        0
    }

    /// Input node at slot `i`; scalar nodes have none.
    pub fn input_node(&self, i: usize) -> Option<AnyNode> {
        debug_assert!(false, "scalar input index {i} out of range");
        None
    }

    /// Install `node` into slot `i`; scalar nodes have none.
    pub fn set_input_node(&mut self, i: usize, _node: Option<AnyNode>) {
        debug_assert!(false, "scalar input index {i} out of range");
    }

    /// Iteration ranges of a parameter node, empty for other kinds.
    pub fn ranges(&self) -> &[RangeNodeRef] {
        match &self.kind {
            ScalarKind::Parameter { ranges, .. } => ranges,
            _ => &[],
        }
    }

    /// Attach an iteration range to a parameter node. No-op for other
    /// kinds.
    pub fn add_range(&mut self, range: RangeNodeRef) {
        if let ScalarKind::Parameter { ranges, .. } = &mut self.kind {
            ranges.push(range);
        }
    }

    /// Write `node` with container version and discriminator.
    pub fn serialise(node: &ScalarNodeRef, arch: &mut OutputArchive) {
        arch.write_u32(CONTAINER_VERSION);
        let guard = node.borrow();
        match guard.kind() {
            ScalarKind::Constant { value } => {
                arch.write_u32(DISC_CONSTANT);
                arch.write_u32(0);
                arch.write_f32(*value);
            }
            ScalarKind::Parameter {
                name,
                uid,
                default_value,
                ranges,
            } => {
                arch.write_u32(DISC_PARAMETER);
                arch.write_u32(0);
                arch.write_str(name);
                arch.write_str(uid);
                arch.write_f32(*default_value);
                arch.write_u32(ranges.len() as u32);
                for r in ranges {
                    arch.write_range(&Some(r.clone()));
                }
            }
            ScalarKind::EnumParameter {
                name,
                uid,
                default_value,
                options,
            } => {
                arch.write_u32(DISC_ENUM_PARAMETER);
                arch.write_u32(0);
                arch.write_str(name);
                arch.write_str(uid);
                arch.write_i32(*default_value);
                arch.write_u32(options.len() as u32);
                for o in options {
                    arch.write_str(&o.name);
                    arch.write_i32(o.value);
                }
            }
        }
    }

    /// Read a node written by [`ScalarNode::serialise`].
    ///
    /// Fails on unknown discriminators or unsupported versions.
    pub fn static_unserialise(arch: &mut InputArchive) -> ProteanResult<ScalarNodeRef> {
        let ver = arch.read_u32()?;
        if ver != CONTAINER_VERSION {
            return Err(ProteanError::schema(format!(
                "unsupported scalar node container version {ver}"
            )));
        }
        let id = arch.read_u32()?;
        let unserialise = crate::node::registry::scalar_unserialiser(id).ok_or_else(|| {
            ProteanError::schema(format!("unknown scalar node discriminator {id}"))
        })?;
        unserialise(arch)
    }
}

fn read_record_version(arch: &mut InputArchive, max: u32, what: &str) -> ProteanResult<u32> {
    let ver = arch.read_u32()?;
    if ver > max {
        return Err(ProteanError::schema(format!(
            "unsupported {what} record version {ver}"
        )));
    }
    Ok(ver)
}

pub(crate) fn unserialise_constant(arch: &mut InputArchive) -> ProteanResult<ScalarNodeRef> {
    read_record_version(arch, 0, "scalar constant")?;
    let value = arch.read_f32()?;
    Ok(ScalarNode::new(ScalarKind::Constant { value }))
}

pub(crate) fn unserialise_parameter(arch: &mut InputArchive) -> ProteanResult<ScalarNodeRef> {
    read_record_version(arch, 0, "scalar parameter")?;
    let name = arch.read_str()?;
    let uid = arch.read_str()?;
    let default_value = arch.read_f32()?;
    let range_count = arch.read_u32()? as usize;
    let mut ranges = Vec::with_capacity(range_count);
    for _ in 0..range_count {
        let range = arch.read_range()?.ok_or_else(|| {
            ProteanError::schema("scalar parameter range reference must not be null")
        })?;
        ranges.push(range);
    }
    Ok(ScalarNode::new(ScalarKind::Parameter {
        name,
        uid,
        default_value,
        ranges,
    }))
}

pub(crate) fn unserialise_enum_parameter(arch: &mut InputArchive) -> ProteanResult<ScalarNodeRef> {
    read_record_version(arch, 0, "scalar enum parameter")?;
    let name = arch.read_str()?;
    let uid = arch.read_str()?;
    let default_value = arch.read_i32()?;
    let option_count = arch.read_u32()? as usize;
    let mut options = Vec::with_capacity(option_count);
    for _ in 0..option_count {
        let name = arch.read_str()?;
        let value = arch.read_i32()?;
        options.push(EnumOption { name, value });
    }
    Ok(ScalarNode::new(ScalarKind::EnumParameter {
        name,
        uid,
        default_value,
        options,
    }))
}

pub(crate) fn clone_scalar(node: &ScalarNodeRef, map: &mut NodeCloneMap) -> ScalarNodeRef {
    let key = Rc::as_ptr(node) as usize;
    if let Some(AnyNode::Scalar(existing)) = map.get(key) {
        return existing.clone();
    }
    let kind = {
        let guard = node.borrow();
        match guard.kind() {
            ScalarKind::Constant { value } => ScalarKind::Constant { value: *value },
            ScalarKind::Parameter {
                name,
                uid,
                default_value,
                ranges,
            } => ScalarKind::Parameter {
                name: name.clone(),
                uid: uid.clone(),
                default_value: *default_value,
                ranges: ranges
                    .iter()
                    .map(|r| crate::node::range::clone_range(r, map))
                    .collect(),
            },
            ScalarKind::EnumParameter {
                name,
                uid,
                default_value,
                options,
            } => ScalarKind::EnumParameter {
                name: name.clone(),
                uid: uid.clone(),
                default_value: *default_value,
                options: options.clone(),
            },
        }
    };
    let clone = ScalarNode::new(kind);
    map.insert(key, AnyNode::Scalar(clone.clone()));
    clone
}
