use std::cell::RefCell;
use std::rc::Rc;

use crate::foundation::error::{ProteanError, ProteanResult};
use crate::node::archive::{InputArchive, OutputArchive};
use crate::node::{AnyNode, NodeCloneMap, RangeNodeRef, ScalarNodeRef, assign_scalar};

pub(crate) const KIND_COUNT: usize = 1;

const DISC_FROM_SCALAR: u32 = 0;

const CONTAINER_VERSION: u32 = 0;

/// Concrete range node kinds.
#[derive(Debug)]
pub enum RangeKind {
    /// A parameter-iteration range whose size is a scalar expression.
    FromScalar {
        /// Number of iterations.
        size: Option<ScalarNodeRef>,
        /// Authored range name.
        name: String,
    },
}

/// A parameter-iteration range node.
#[derive(Debug)]
pub struct RangeNode {
    kind: RangeKind,
}

impl RangeNode {
    /// Wrap a kind into a shared node handle.
    pub fn new(kind: RangeKind) -> RangeNodeRef {
        Rc::new(RefCell::new(Self { kind }))
    }

    /// Concrete kind of this node.
    pub fn kind(&self) -> &RangeKind {
        &self.kind
    }

    /// Mutable access to the concrete kind.
    pub fn kind_mut(&mut self) -> &mut RangeKind {
        &mut self.kind
    }

    /// Name of the concrete kind, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            RangeKind::FromScalar { .. } => "RangeFromScalar",
        }
    }

    /// Number of input slots, fixed per kind.
    pub fn input_count(&self) -> usize {
        match self.kind {
            RangeKind::FromScalar { .. } => 1,
        }
    }

    /// Input node at slot `i`, or `None` when the slot is empty.
    pub fn input_node(&self, i: usize) -> Option<AnyNode> {
        if i >= self.input_count() {
            debug_assert!(false, "range input index {i} out of range");
            return None;
        }
        match &self.kind {
            RangeKind::FromScalar { size, .. } => size.clone().map(AnyNode::Scalar),
        }
    }

    /// Install `node` into slot `i`.
    ///
    /// The node must match the slot's category; mismatches keep the
    /// previous value. Out-of-range indices are a programming error.
    pub fn set_input_node(&mut self, i: usize, node: Option<AnyNode>) {
        if i >= self.input_count() {
            debug_assert!(false, "range input index {i} out of range");
            return;
        }
        match &mut self.kind {
            RangeKind::FromScalar { size, .. } => assign_scalar(size, node),
        }
    }

    /// Write `node` with container version and discriminator.
    pub fn serialise(node: &RangeNodeRef, arch: &mut OutputArchive) {
        arch.write_u32(CONTAINER_VERSION);
        let guard = node.borrow();
        match guard.kind() {
            RangeKind::FromScalar { size, name } => {
                arch.write_u32(DISC_FROM_SCALAR);
                arch.write_u32(0);
                arch.write_scalar(size);
                arch.write_str(name);
            }
        }
    }

    /// Read a node written by [`RangeNode::serialise`].
    ///
    /// Fails on unknown discriminators or unsupported versions.
    pub fn static_unserialise(arch: &mut InputArchive) -> ProteanResult<RangeNodeRef> {
        let ver = arch.read_u32()?;
        if ver != CONTAINER_VERSION {
            return Err(ProteanError::schema(format!(
                "unsupported range node container version {ver}"
            )));
        }
        let id = arch.read_u32()?;
        let unserialise = crate::node::registry::range_unserialiser(id).ok_or_else(|| {
            ProteanError::schema(format!("unknown range node discriminator {id}"))
        })?;
        unserialise(arch)
    }
}

pub(crate) fn unserialise_from_scalar(arch: &mut InputArchive) -> ProteanResult<RangeNodeRef> {
    let ver = arch.read_u32()?;
    if ver > 0 {
        return Err(ProteanError::schema(format!(
            "unsupported range from-scalar record version {ver}"
        )));
    }
    let size = arch.read_scalar()?;
    let name = arch.read_str()?;
    Ok(RangeNode::new(RangeKind::FromScalar { size, name }))
}

pub(crate) fn clone_range(node: &RangeNodeRef, map: &mut NodeCloneMap) -> RangeNodeRef {
    let key = Rc::as_ptr(node) as usize;
    if let Some(AnyNode::Range(existing)) = map.get(key) {
        return existing.clone();
    }
    let kind = {
        let guard = node.borrow();
        match guard.kind() {
            RangeKind::FromScalar { size, name } => RangeKind::FromScalar {
                size: size
                    .as_ref()
                    .map(|n| crate::node::scalar::clone_scalar(n, map)),
                name: name.clone(),
            },
        }
    };
    let clone = RangeNode::new(kind);
    map.insert(key, AnyNode::Range(clone.clone()));
    clone
}
