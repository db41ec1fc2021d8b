use std::cell::RefCell;
use std::rc::Rc;

use crate::foundation::core::ColourArithmeticOp;
use crate::foundation::error::{ProteanError, ProteanResult};
use crate::node::archive::{InputArchive, OutputArchive};
use crate::node::{
    AnyNode, ColourNodeRef, ImageNodeRef, NodeCloneMap, ScalarNodeRef, assign_colour, assign_image,
    assign_scalar,
};

pub(crate) const KIND_COUNT: usize = 5;

const DISC_CONSTANT: u32 = 0;
const DISC_PARAMETER: u32 = 1;
const DISC_SAMPLE_IMAGE: u32 = 2;
const DISC_FROM_SCALARS: u32 = 3;
const DISC_ARITHMETIC: u32 = 4;

const CONTAINER_VERSION: u32 = 0;

/// Concrete colour node kinds.
#[derive(Debug)]
pub enum ColourKind {
    /// A constant RGBA colour.
    Constant {
        /// Colour components in `[0, 1]`.
        value: [f32; 4],
    },
    /// A runtime colour parameter.
    Parameter {
        /// Display name, unique within the compiled object.
        name: String,
        /// Stable external identifier.
        uid: String,
        /// Default colour components.
        default_value: [f32; 4],
    },
    /// Sample a colour from an image at scalar coordinates.
    SampleImage {
        /// Image to sample.
        image: Option<ImageNodeRef>,
        /// Normalised horizontal coordinate.
        x: Option<ScalarNodeRef>,
        /// Normalised vertical coordinate.
        y: Option<ScalarNodeRef>,
    },
    /// Assemble a colour from four scalar channels.
    FromScalars {
        /// Red channel.
        x: Option<ScalarNodeRef>,
        /// Green channel.
        y: Option<ScalarNodeRef>,
        /// Blue channel.
        z: Option<ScalarNodeRef>,
        /// Alpha channel.
        w: Option<ScalarNodeRef>,
    },
    /// Component-wise arithmetic between two colours.
    Arithmetic {
        /// Operation to apply.
        op: ColourArithmeticOp,
        /// Left operand.
        a: Option<ColourNodeRef>,
        /// Right operand.
        b: Option<ColourNodeRef>,
    },
}

/// A colour-valued authoring node.
#[derive(Debug)]
pub struct ColourNode {
    kind: ColourKind,
}

impl ColourNode {
    /// Wrap a kind into a shared node handle.
    pub fn new(kind: ColourKind) -> ColourNodeRef {
        Rc::new(RefCell::new(Self { kind }))
    }

    /// Concrete kind of this node.
    pub fn kind(&self) -> &ColourKind {
        &self.kind
    }

    /// Mutable access to the concrete kind.
    pub fn kind_mut(&mut self) -> &mut ColourKind {
        &mut self.kind
    }

    /// Name of the concrete kind, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            ColourKind::Constant { .. } => "ColourConstant",
            ColourKind::Parameter { .. } => "ColourParameter",
            ColourKind::SampleImage { .. } => "ColourSampleImage",
            ColourKind::FromScalars { .. } => "ColourFromScalars",
            ColourKind::Arithmetic { .. } => "ColourArithmetic",
        }
    }

    /// Number of input slots, fixed per kind.
    pub fn input_count(&self) -> usize {
        match &self.kind {
            ColourKind::Constant { .. } | ColourKind::Parameter { .. } => 0,
            ColourKind::SampleImage { .. } => 3,
            ColourKind::FromScalars { .. } => 4,
            ColourKind::Arithmetic { .. } => 2,
        }
    }

    /// Input node at slot `i`, or `None` when the slot is empty.
    pub fn input_node(&self, i: usize) -> Option<AnyNode> {
        if i >= self.input_count() {
            debug_assert!(false, "colour input index {i} out of range");
            return None;
        }
        match (&self.kind, i) {
            (ColourKind::SampleImage { image, .. }, 0) => image.clone().map(AnyNode::Image),
            (ColourKind::SampleImage { x, .. }, 1) => x.clone().map(AnyNode::Scalar),
            (ColourKind::SampleImage { y, .. }, 2) => y.clone().map(AnyNode::Scalar),
            (ColourKind::FromScalars { x, .. }, 0) => x.clone().map(AnyNode::Scalar),
            (ColourKind::FromScalars { y, .. }, 1) => y.clone().map(AnyNode::Scalar),
            (ColourKind::FromScalars { z, .. }, 2) => z.clone().map(AnyNode::Scalar),
            (ColourKind::FromScalars { w, .. }, 3) => w.clone().map(AnyNode::Scalar),
            (ColourKind::Arithmetic { a, .. }, 0) => a.clone().map(AnyNode::Colour),
            (ColourKind::Arithmetic { b, .. }, 1) => b.clone().map(AnyNode::Colour),
            _ => None,
        }
    }

    /// Install `node` into slot `i`.
    ///
    /// The node must match the slot's category; mismatches keep the
    /// previous value. Out-of-range indices are a programming error.
    pub fn set_input_node(&mut self, i: usize, node: Option<AnyNode>) {
        if i >= self.input_count() {
            debug_assert!(false, "colour input index {i} out of range");
            return;
        }
        match (&mut self.kind, i) {
            (ColourKind::SampleImage { image, .. }, 0) => assign_image(image, node),
            (ColourKind::SampleImage { x, .. }, 1) => assign_scalar(x, node),
            (ColourKind::SampleImage { y, .. }, 2) => assign_scalar(y, node),
            (ColourKind::FromScalars { x, .. }, 0) => assign_scalar(x, node),
            (ColourKind::FromScalars { y, .. }, 1) => assign_scalar(y, node),
            (ColourKind::FromScalars { z, .. }, 2) => assign_scalar(z, node),
            (ColourKind::FromScalars { w, .. }, 3) => assign_scalar(w, node),
            (ColourKind::Arithmetic { a, .. }, 0) => assign_colour(a, node),
            (ColourKind::Arithmetic { b, .. }, 1) => assign_colour(b, node),
            _ => {}
        }
    }

    /// Write `node` with container version and discriminator.
    pub fn serialise(node: &ColourNodeRef, arch: &mut OutputArchive) {
        arch.write_u32(CONTAINER_VERSION);
        let guard = node.borrow();
        match guard.kind() {
            ColourKind::Constant { value } => {
                arch.write_u32(DISC_CONSTANT);
                arch.write_u32(0);
                for v in value {
                    arch.write_f32(*v);
                }
            }
            ColourKind::Parameter {
                name,
                uid,
                default_value,
            } => {
                arch.write_u32(DISC_PARAMETER);
                arch.write_u32(0);
                arch.write_str(name);
                arch.write_str(uid);
                for v in default_value {
                    arch.write_f32(*v);
                }
            }
            ColourKind::SampleImage { image, x, y } => {
                arch.write_u32(DISC_SAMPLE_IMAGE);
                arch.write_u32(0);
                arch.write_image(image);
                arch.write_scalar(x);
                arch.write_scalar(y);
            }
            ColourKind::FromScalars { x, y, z, w } => {
                arch.write_u32(DISC_FROM_SCALARS);
                arch.write_u32(0);
                arch.write_scalar(x);
                arch.write_scalar(y);
                arch.write_scalar(z);
                arch.write_scalar(w);
            }
            ColourKind::Arithmetic { op, a, b } => {
                arch.write_u32(DISC_ARITHMETIC);
                arch.write_u32(0);
                arch.write_u8(op.code());
                arch.write_colour(a);
                arch.write_colour(b);
            }
        }
    }

    /// Read a node written by [`ColourNode::serialise`].
    ///
    /// Fails on unknown discriminators or unsupported versions.
    pub fn static_unserialise(arch: &mut InputArchive) -> ProteanResult<ColourNodeRef> {
        let ver = arch.read_u32()?;
        if ver != CONTAINER_VERSION {
            return Err(ProteanError::schema(format!(
                "unsupported colour node container version {ver}"
            )));
        }
        let id = arch.read_u32()?;
        let unserialise = crate::node::registry::colour_unserialiser(id).ok_or_else(|| {
            ProteanError::schema(format!("unknown colour node discriminator {id}"))
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

pub(crate) fn unserialise_constant(arch: &mut InputArchive) -> ProteanResult<ColourNodeRef> {
    read_record_version(arch, 0, "colour constant")?;
    let mut value = [0.0f32; 4];
    for v in &mut value {
        *v = arch.read_f32()?;
    }
    Ok(ColourNode::new(ColourKind::Constant { value }))
}

pub(crate) fn unserialise_parameter(arch: &mut InputArchive) -> ProteanResult<ColourNodeRef> {
    read_record_version(arch, 0, "colour parameter")?;
    let name = arch.read_str()?;
    let uid = arch.read_str()?;
    let mut default_value = [0.0f32; 4];
    for v in &mut default_value {
        *v = arch.read_f32()?;
    }
    Ok(ColourNode::new(ColourKind::Parameter {
        name,
        uid,
        default_value,
    }))
}

pub(crate) fn unserialise_sample_image(arch: &mut InputArchive) -> ProteanResult<ColourNodeRef> {
    read_record_version(arch, 0, "colour sample image")?;
    let image = arch.read_image()?;
    let x = arch.read_scalar()?;
    let y = arch.read_scalar()?;
    Ok(ColourNode::new(ColourKind::SampleImage { image, x, y }))
}

pub(crate) fn unserialise_from_scalars(arch: &mut InputArchive) -> ProteanResult<ColourNodeRef> {
    read_record_version(arch, 0, "colour from scalars")?;
    let x = arch.read_scalar()?;
    let y = arch.read_scalar()?;
    let z = arch.read_scalar()?;
    let w = arch.read_scalar()?;
    Ok(ColourNode::new(ColourKind::FromScalars { x, y, z, w }))
}

pub(crate) fn unserialise_arithmetic(arch: &mut InputArchive) -> ProteanResult<ColourNodeRef> {
    read_record_version(arch, 0, "colour arithmetic")?;
    let code = arch.read_u8()?;
    let op = ColourArithmeticOp::from_code(code)
        .ok_or_else(|| ProteanError::schema(format!("unknown colour arithmetic code {code}")))?;
    let a = arch.read_colour()?;
    let b = arch.read_colour()?;
    Ok(ColourNode::new(ColourKind::Arithmetic { op, a, b }))
}

pub(crate) fn clone_colour(node: &ColourNodeRef, map: &mut NodeCloneMap) -> ColourNodeRef {
    let key = Rc::as_ptr(node) as usize;
    if let Some(AnyNode::Colour(existing)) = map.get(key) {
        return existing.clone();
    }
    let kind = {
        let guard = node.borrow();
        match guard.kind() {
            ColourKind::Constant { value } => ColourKind::Constant { value: *value },
            ColourKind::Parameter {
                name,
                uid,
                default_value,
            } => ColourKind::Parameter {
                name: name.clone(),
                uid: uid.clone(),
                default_value: *default_value,
            },
            ColourKind::SampleImage { image, x, y } => ColourKind::SampleImage {
                image: image
                    .as_ref()
                    .map(|n| crate::node::image::clone_image(n, map)),
                x: clone_opt_scalar(x, map),
                y: clone_opt_scalar(y, map),
            },
            ColourKind::FromScalars { x, y, z, w } => ColourKind::FromScalars {
                x: clone_opt_scalar(x, map),
                y: clone_opt_scalar(y, map),
                z: clone_opt_scalar(z, map),
                w: clone_opt_scalar(w, map),
            },
            ColourKind::Arithmetic { op, a, b } => ColourKind::Arithmetic {
                op: *op,
                a: a.as_ref().map(|n| clone_colour(n, map)),
                b: b.as_ref().map(|n| clone_colour(n, map)),
            },
        }
    };
    let clone = ColourNode::new(kind);
    map.insert(key, AnyNode::Colour(clone.clone()));
    clone
}

fn clone_opt_scalar(node: &Option<ScalarNodeRef>, map: &mut NodeCloneMap) -> Option<ScalarNodeRef> {
    node.as_ref()
        .map(|n| crate::node::scalar::clone_scalar(n, map))
}
