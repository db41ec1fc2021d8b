use std::cell::RefCell;
use std::rc::Rc;

use crate::foundation::error::{ProteanError, ProteanResult};
use crate::node::archive::{InputArchive, OutputArchive};
use crate::node::{AnyNode, NodeCloneMap, StringNodeRef};

pub(crate) const KIND_COUNT: usize = 2;

const DISC_CONSTANT: u32 = 0;
const DISC_PARAMETER: u32 = 1;

const CONTAINER_VERSION: u32 = 0;

/// Concrete string node kinds.
#[derive(Debug)]
pub enum StringKind {
    /// A constant string value.
    Constant {
        /// The value.
        value: String,
    },
    /// A runtime string parameter.
    Parameter {
        /// Display name, unique within the compiled object.
        name: String,
        /// Stable external identifier.
        uid: String,
        /// Default value.
        default_value: String,
    },
}

/// A string-valued authoring node.
#[derive(Debug)]
pub struct StringNode {
    kind: StringKind,
}

impl StringNode {
    /// Wrap a kind into a shared node handle.
    pub fn new(kind: StringKind) -> StringNodeRef {
        Rc::new(RefCell::new(Self { kind }))
    }

    /// Concrete kind of this node.
    pub fn kind(&self) -> &StringKind {
        &self.kind
    }

    /// Mutable access to the concrete kind.
    pub fn kind_mut(&mut self) -> &mut StringKind {
        &mut self.kind
    }

    /// Name of the concrete kind, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            StringKind::Constant { .. } => "StringConstant",
            StringKind::Parameter { .. } => "StringParameter",
        }
    }

    /// Number of input slots; string nodes are leaves.
    pub fn input_count(&self) -> usize {
        0
    }

    /// Input node at slot `i`; string nodes have none.
    pub fn input_node(&self, i: usize) -> Option<AnyNode> {
        debug_assert!(false, "string input index {i} out of range");
        None
    }

    /// Install `node` into slot `i`; string nodes have none.
    pub fn set_input_node(&mut self, i: usize, _node: Option<AnyNode>) {
        debug_assert!(false, "string input index {i} out of range");
    }

    /// Write `node` with container version and discriminator.
    pub fn serialise(node: &StringNodeRef, arch: &mut OutputArchive) {
        arch.write_u32(CONTAINER_VERSION);
        let guard = node.borrow();
        match guard.kind() {
            StringKind::Constant { value } => {
                arch.write_u32(DISC_CONSTANT);
                arch.write_u32(0);
                arch.write_str(value);
            }
            StringKind::Parameter {
                name,
                uid,
                default_value,
            } => {
                arch.write_u32(DISC_PARAMETER);
                arch.write_u32(0);
                arch.write_str(name);
                arch.write_str(uid);
                arch.write_str(default_value);
            }
        }
    }

    /// Read a node written by [`StringNode::serialise`].
    ///
    /// Fails on unknown discriminators or unsupported versions.
    pub fn static_unserialise(arch: &mut InputArchive) -> ProteanResult<StringNodeRef> {
        let ver = arch.read_u32()?;
        if ver != CONTAINER_VERSION {
            return Err(ProteanError::schema(format!(
                "unsupported string node container version {ver}"
            )));
        }
        let id = arch.read_u32()?;
        let unserialise = crate::node::registry::string_unserialiser(id).ok_or_else(|| {
            ProteanError::schema(format!("unknown string node discriminator {id}"))
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

pub(crate) fn unserialise_constant(arch: &mut InputArchive) -> ProteanResult<StringNodeRef> {
    read_record_version(arch, 0, "string constant")?;
    let value = arch.read_str()?;
    Ok(StringNode::new(StringKind::Constant { value }))
}

pub(crate) fn unserialise_parameter(arch: &mut InputArchive) -> ProteanResult<StringNodeRef> {
    read_record_version(arch, 0, "string parameter")?;
    let name = arch.read_str()?;
    let uid = arch.read_str()?;
    let default_value = arch.read_str()?;
    Ok(StringNode::new(StringKind::Parameter {
        name,
        uid,
        default_value,
    }))
}

pub(crate) fn clone_string(node: &StringNodeRef, map: &mut NodeCloneMap) -> StringNodeRef {
    let key = Rc::as_ptr(node) as usize;
    if let Some(AnyNode::String(existing)) = map.get(key) {
        return existing.clone();
    }
    let kind = {
        let guard = node.borrow();
        match guard.kind() {
            StringKind::Constant { value } => StringKind::Constant {
                value: value.clone(),
            },
            StringKind::Parameter {
                name,
                uid,
                default_value,
            } => StringKind::Parameter {
                name: name.clone(),
                uid: uid.clone(),
                default_value: default_value.clone(),
            },
        }
    };
    let clone = StringNode::new(kind);
    map.insert(key, AnyNode::String(clone.clone()));
    clone
}
