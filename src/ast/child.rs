use std::rc::Rc;

use crate::ast::op::AstOp;
use crate::foundation::ids::OpAddress;

/// An owned edge from a parent operation to an optional child operation.
///
/// The referenced operation may be shared by many parents; its lifetime
/// is that of the longest-lived holder. Equality is identity of the
/// underlying operation, which is exactly what structural hashing needs:
/// after deduplication, equal subtrees are the same instance.
#[derive(Debug, Clone, Default)]
pub struct AstChild(Option<Rc<AstOp>>);

impl AstChild {
    /// An absent child edge.
    pub fn none() -> Self {
        Self(None)
    }

    /// An edge to `op`.
    pub fn new(op: Rc<AstOp>) -> Self {
        Self(Some(op))
    }

    /// The referenced operation, if any.
    pub fn child(&self) -> Option<&Rc<AstOp>> {
        self.0.as_ref()
    }

    /// Return `true` when an operation is attached.
    pub fn is_some(&self) -> bool {
        self.0.is_some()
    }

    /// Address of the referenced operation; the null sentinel when the
    /// edge is empty or the child is not linked yet.
    pub fn linked_address(&self) -> OpAddress {
        self.0
            .as_ref()
            .map(|op| op.linked_address())
            .unwrap_or(OpAddress::NONE)
    }

    /// Pointer identity of the referenced operation (0 when absent).
    pub(crate) fn ptr_id(&self) -> usize {
        self.0.as_ref().map(|op| Rc::as_ptr(op) as usize).unwrap_or(0)
    }

    /// Detach and return the operation this edge held.
    pub(crate) fn take(&mut self) -> Option<Rc<AstOp>> {
        self.0.take()
    }
}

impl PartialEq for AstChild {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for AstChild {}

impl From<Rc<AstOp>> for AstChild {
    fn from(op: Rc<AstOp>) -> Self {
        Self::new(op)
    }
}

impl From<Option<Rc<AstOp>>> for AstChild {
    fn from(op: Option<Rc<AstOp>>) -> Self {
        Self(op)
    }
}
