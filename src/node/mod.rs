/// Binary archive reader/writer for node graphs.
pub mod archive;
/// Colour-valued nodes.
pub mod colour;
/// Image-valued nodes.
pub mod image;
/// Mesh-valued nodes.
pub mod mesh;
/// Parameter-iteration range nodes.
pub mod range;
/// Static serialization registry: discriminator dispatch tables.
pub mod registry;
/// Scalar-valued nodes.
pub mod scalar;
/// String-valued nodes.
pub mod string;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub use self::colour::{ColourKind, ColourNode};
pub use self::image::{ImageKind, ImageNode};
pub use self::mesh::{MeshKind, MeshNode};
pub use self::range::{RangeKind, RangeNode};
pub use self::scalar::{EnumOption, ScalarKind, ScalarNode};
pub use self::string::{StringKind, StringNode};

/// Shared handle to an image node.
pub type ImageNodeRef = Rc<RefCell<ImageNode>>;
/// Shared handle to a colour node.
pub type ColourNodeRef = Rc<RefCell<ColourNode>>;
/// Shared handle to a mesh node.
pub type MeshNodeRef = Rc<RefCell<MeshNode>>;
/// Shared handle to a scalar node.
pub type ScalarNodeRef = Rc<RefCell<ScalarNode>>;
/// Shared handle to a string node.
pub type StringNodeRef = Rc<RefCell<StringNode>>;
/// Shared handle to a range node.
pub type RangeNodeRef = Rc<RefCell<RangeNode>>;

/// The value categories a node can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCategory {
    /// Image-valued nodes.
    Image,
    /// Colour-valued nodes.
    Colour,
    /// Mesh-valued nodes.
    Mesh,
    /// Scalar-valued nodes.
    Scalar,
    /// String-valued nodes.
    String,
    /// Parameter-iteration range nodes.
    Range,
}

/// A node reference of any category.
///
/// The indexed input protocol moves nodes across category boundaries
/// through this type; [`ImageNode::set_input_node`] and friends check the
/// category before installing a reference.
#[derive(Debug, Clone)]
pub enum AnyNode {
    /// An image node.
    Image(ImageNodeRef),
    /// A colour node.
    Colour(ColourNodeRef),
    /// A mesh node.
    Mesh(MeshNodeRef),
    /// A scalar node.
    Scalar(ScalarNodeRef),
    /// A string node.
    String(StringNodeRef),
    /// A range node.
    Range(RangeNodeRef),
}

impl AnyNode {
    /// Category of the referenced node.
    pub fn category(&self) -> NodeCategory {
        match self {
            AnyNode::Image(_) => NodeCategory::Image,
            AnyNode::Colour(_) => NodeCategory::Colour,
            AnyNode::Mesh(_) => NodeCategory::Mesh,
            AnyNode::Scalar(_) => NodeCategory::Scalar,
            AnyNode::String(_) => NodeCategory::String,
            AnyNode::Range(_) => NodeCategory::Range,
        }
    }

    /// Downcast to an image node reference.
    pub fn as_image(&self) -> Option<ImageNodeRef> {
        match self {
            AnyNode::Image(n) => Some(n.clone()),
            _ => None,
        }
    }

    /// Downcast to a colour node reference.
    pub fn as_colour(&self) -> Option<ColourNodeRef> {
        match self {
            AnyNode::Colour(n) => Some(n.clone()),
            _ => None,
        }
    }

    /// Downcast to a mesh node reference.
    pub fn as_mesh(&self) -> Option<MeshNodeRef> {
        match self {
            AnyNode::Mesh(n) => Some(n.clone()),
            _ => None,
        }
    }

    /// Downcast to a scalar node reference.
    pub fn as_scalar(&self) -> Option<ScalarNodeRef> {
        match self {
            AnyNode::Scalar(n) => Some(n.clone()),
            _ => None,
        }
    }

    /// Downcast to a string node reference.
    pub fn as_string(&self) -> Option<StringNodeRef> {
        match self {
            AnyNode::String(n) => Some(n.clone()),
            _ => None,
        }
    }

    /// Downcast to a range node reference.
    pub fn as_range(&self) -> Option<RangeNodeRef> {
        match self {
            AnyNode::Range(n) => Some(n.clone()),
            _ => None,
        }
    }

    /// Stable identity of the underlying allocation.
    pub(crate) fn ptr_id(&self) -> usize {
        match self {
            AnyNode::Image(n) => Rc::as_ptr(n) as usize,
            AnyNode::Colour(n) => Rc::as_ptr(n) as usize,
            AnyNode::Mesh(n) => Rc::as_ptr(n) as usize,
            AnyNode::Scalar(n) => Rc::as_ptr(n) as usize,
            AnyNode::String(n) => Rc::as_ptr(n) as usize,
            AnyNode::Range(n) => Rc::as_ptr(n) as usize,
        }
    }
}

/// Memoization map used by [`clone_node`].
///
/// One map instance must serve a whole traversal so shared nodes are
/// cloned once and stay shared in the clone.
#[derive(Debug, Default)]
pub struct NodeCloneMap {
    cloned: HashMap<usize, AnyNode>,
}

impl NodeCloneMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, key: usize) -> Option<&AnyNode> {
        self.cloned.get(&key)
    }

    pub(crate) fn insert(&mut self, key: usize, clone: AnyNode) {
        self.cloned.insert(key, clone);
    }
}

/// Deep-clone a node graph, preserving shared subtrees.
pub fn clone_node(node: &AnyNode, map: &mut NodeCloneMap) -> AnyNode {
    match node {
        AnyNode::Image(n) => AnyNode::Image(image::clone_image(n, map)),
        AnyNode::Colour(n) => AnyNode::Colour(colour::clone_colour(n, map)),
        AnyNode::Mesh(n) => AnyNode::Mesh(mesh::clone_mesh(n, map)),
        AnyNode::Scalar(n) => AnyNode::Scalar(scalar::clone_scalar(n, map)),
        AnyNode::String(n) => AnyNode::String(string::clone_string(n, map)),
        AnyNode::Range(n) => AnyNode::Range(range::clone_range(n, map)),
    }
}

/// Install an image reference into `slot`, keeping the prior value when
/// the supplied node has the wrong category.
pub(crate) fn assign_image(slot: &mut Option<ImageNodeRef>, node: Option<AnyNode>) {
    match node {
        None => *slot = None,
        Some(AnyNode::Image(n)) => *slot = Some(n),
        Some(other) => {
            tracing::warn!(
                got = ?other.category(),
                "set_input_node: expected an image node, slot unchanged"
            );
        }
    }
}

pub(crate) fn assign_colour(slot: &mut Option<ColourNodeRef>, node: Option<AnyNode>) {
    match node {
        None => *slot = None,
        Some(AnyNode::Colour(n)) => *slot = Some(n),
        Some(other) => {
            tracing::warn!(
                got = ?other.category(),
                "set_input_node: expected a colour node, slot unchanged"
            );
        }
    }
}

pub(crate) fn assign_mesh(slot: &mut Option<MeshNodeRef>, node: Option<AnyNode>) {
    match node {
        None => *slot = None,
        Some(AnyNode::Mesh(n)) => *slot = Some(n),
        Some(other) => {
            tracing::warn!(
                got = ?other.category(),
                "set_input_node: expected a mesh node, slot unchanged"
            );
        }
    }
}

pub(crate) fn assign_scalar(slot: &mut Option<ScalarNodeRef>, node: Option<AnyNode>) {
    match node {
        None => *slot = None,
        Some(AnyNode::Scalar(n)) => *slot = Some(n),
        Some(other) => {
            tracing::warn!(
                got = ?other.category(),
                "set_input_node: expected a scalar node, slot unchanged"
            );
        }
    }
}
