use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use smallvec::SmallVec;
use xxhash_rust::xxh3::Xxh3;

use crate::ast::child::AstChild;
use crate::ast::program::ParameterDesc;
use crate::foundation::asset::{Image, ImageFormat, Mesh};
use crate::foundation::core::{BlendType, ColourArithmeticOp};
use crate::foundation::ids::OpAddress;

const XXH3_SEED: u64 = 0x6f70e3a1d2c5b897;

/// Maximum number of LOD children an [`OpData::AddLod`] operation can
/// encode. The linker silently drops children beyond the cap.
pub const MAX_ADD_COUNT: usize = 8;

/// Maximum number of morph targets an [`OpData::MeshMorph`] operation can
/// encode. The linker silently drops targets beyond the cap.
pub const MAX_MORPH_COUNT: usize = 4;

/// Opcode tags. The numeric values are written into bytecode streams and
/// must never be renumbered, only appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[repr(u16)]
pub enum OpType {
    /// The reserved no-op at program address 0.
    None = 0,
    /// Constant scalar.
    ScalarConstant = 1,
    /// Constant RGBA colour.
    ColourConstant = 2,
    /// Constant string.
    StringConstant = 3,
    /// Constant image payload.
    ImageConstant = 4,
    /// Constant mesh payload.
    MeshConstant = 5,
    /// Runtime parameter reference.
    Parameter = 6,
    /// Colour assembled from four scalars.
    ColourFromScalars = 7,
    /// Component-wise colour arithmetic.
    ColourArithmetic = 8,
    /// Colour sampled from an image.
    ColourSampleImage = 9,
    /// Channel inversion.
    ImageInvert = 10,
    /// Saturation adjustment.
    ImageSaturate = 11,
    /// Luminance extraction.
    ImageLuminance = 12,
    /// Solid single-colour image.
    ImagePlainColour = 13,
    /// Masked blend of one image onto another.
    ImageLayer = 14,
    /// Per-channel image recombination.
    ImageSwizzle = 15,
    /// Block composition into a layout.
    ImageCompose = 16,
    /// Skeletal pose application.
    MeshApplyPose = 17,
    /// Clip-and-deform against a closed shape.
    MeshClipDeform = 18,
    /// Morph-target blending.
    MeshMorph = 19,
    /// Affine mesh transform.
    MeshTransform = 20,
    /// Extraction of layout blocks from a mesh.
    MeshExtractLayoutBlocks = 21,
    /// Combination of successive levels of detail.
    AddLod = 22,
}

impl OpType {
    /// Decode a stored opcode tag.
    pub fn from_u16(v: u16) -> Option<OpType> {
        match v {
            0 => Some(OpType::None),
            1 => Some(OpType::ScalarConstant),
            2 => Some(OpType::ColourConstant),
            3 => Some(OpType::StringConstant),
            4 => Some(OpType::ImageConstant),
            5 => Some(OpType::MeshConstant),
            6 => Some(OpType::Parameter),
            7 => Some(OpType::ColourFromScalars),
            8 => Some(OpType::ColourArithmetic),
            9 => Some(OpType::ColourSampleImage),
            10 => Some(OpType::ImageInvert),
            11 => Some(OpType::ImageSaturate),
            12 => Some(OpType::ImageLuminance),
            13 => Some(OpType::ImagePlainColour),
            14 => Some(OpType::ImageLayer),
            15 => Some(OpType::ImageSwizzle),
            16 => Some(OpType::ImageCompose),
            17 => Some(OpType::MeshApplyPose),
            18 => Some(OpType::MeshClipDeform),
            19 => Some(OpType::MeshMorph),
            20 => Some(OpType::MeshTransform),
            21 => Some(OpType::MeshExtractLayoutBlocks),
            22 => Some(OpType::AddLod),
            _ => None,
        }
    }
}

/// An iteration range attached to a parameter operation.
#[derive(Debug, PartialEq)]
pub struct RangeEdge {
    /// Scalar operation computing the range size.
    pub size: AstChild,
    /// Authored range name.
    pub name: String,
}

/// Operation payload: one variant per opcode, with the argument-record
/// layout colocated (see the matching arm in the linker).
#[derive(Debug)]
pub enum OpData {
    /// The reserved no-op.
    None,
    /// Constant scalar.
    ScalarConstant {
        /// The value.
        value: f32,
    },
    /// Constant RGBA colour.
    ColourConstant {
        /// Colour components in `[0, 1]`.
        value: [f32; 4],
    },
    /// Constant string.
    StringConstant {
        /// The value.
        value: String,
    },
    /// Constant image payload.
    ImageConstant {
        /// Shared image payload; compared and hashed by identity.
        image: Rc<Image>,
    },
    /// Constant mesh payload.
    MeshConstant {
        /// Shared mesh payload; compared and hashed by identity.
        mesh: Rc<Mesh>,
    },
    /// Runtime parameter reference. Linking appends the descriptor (and
    /// any range descriptors) to the program tables.
    Parameter {
        /// Descriptor copied into the program at link time.
        parameter: ParameterDesc,
        /// Iteration ranges the parameter varies over.
        ranges: Vec<RangeEdge>,
    },
    /// Colour assembled from four scalar channels.
    ColourFromScalars {
        /// Red channel.
        x: AstChild,
        /// Green channel.
        y: AstChild,
        /// Blue channel.
        z: AstChild,
        /// Alpha channel.
        w: AstChild,
    },
    /// Component-wise colour arithmetic.
    ColourArithmetic {
        /// Operation to apply.
        op: ColourArithmeticOp,
        /// Left operand.
        a: AstChild,
        /// Right operand.
        b: AstChild,
    },
    /// Colour sampled from an image at scalar coordinates.
    ColourSampleImage {
        /// Image to sample.
        image: AstChild,
        /// Normalised horizontal coordinate.
        x: AstChild,
        /// Normalised vertical coordinate.
        y: AstChild,
    },
    /// Invert the channels of an image.
    ImageInvert {
        /// Image to invert.
        base: AstChild,
    },
    /// Scale the saturation of an image.
    ImageSaturate {
        /// Image to adjust.
        base: AstChild,
        /// Saturation factor.
        factor: AstChild,
    },
    /// Collapse an image to single-channel luminance.
    ImageLuminance {
        /// Image to convert.
        base: AstChild,
    },
    /// A solid image of one colour.
    ImagePlainColour {
        /// Colour to fill with.
        colour: AstChild,
        /// Output size in pixels.
        size: [u16; 2],
    },
    /// Blend an image onto a base image through an optional mask.
    ImageLayer {
        /// Image to blend onto.
        base: AstChild,
        /// Single-channel blend weight mask.
        mask: AstChild,
        /// Image blended on top.
        blended: AstChild,
        /// Blend operation.
        blend_type: BlendType,
    },
    /// Rebuild an image by picking one channel from each source.
    ImageSwizzle {
        /// Output pixel format.
        format: ImageFormat,
        /// Source image per output channel.
        sources: [AstChild; 4],
        /// Channel index sampled from each source.
        source_channels: [u8; 4],
    },
    /// Compose a block image into a layout slot of a base image.
    ImageCompose {
        /// Layout operation assigning blocks.
        layout: AstChild,
        /// Image composed into.
        base: AstChild,
        /// Image for the block being composed.
        block_image: AstChild,
        /// Optional mask limiting the composition.
        mask: AstChild,
        /// Index of the layout block written.
        block_index: u32,
    },
    /// Apply a skeletal pose to a mesh.
    MeshApplyPose {
        /// Mesh to pose.
        base: AstChild,
        /// Mesh carrying the pose skeleton.
        pose: AstChild,
    },
    /// Clip a mesh with a closed clip shape, deforming the boundary.
    MeshClipDeform {
        /// Mesh to clip.
        mesh: AstChild,
        /// Closed mesh used as the clip shape.
        clip_shape: AstChild,
    },
    /// Blend morph targets onto a base mesh.
    MeshMorph {
        /// Blend weight.
        factor: AstChild,
        /// Mesh to deform.
        base: AstChild,
        /// Morph target meshes; only the first [`MAX_MORPH_COUNT`] are
        /// encoded.
        targets: SmallVec<[AstChild; MAX_MORPH_COUNT]>,
    },
    /// Apply an affine transform to a mesh.
    MeshTransform {
        /// Mesh to transform.
        source: AstChild,
        /// Column-major 4x4 transform matrix.
        transform: [f32; 16],
    },
    /// Extract the faces of a mesh belonging to a set of layout blocks.
    MeshExtractLayoutBlocks {
        /// Mesh to extract from.
        source: AstChild,
        /// Index of the layout queried.
        layout: u16,
        /// Ids of the blocks to keep.
        blocks: Vec<u32>,
    },
    /// Combine successive levels of detail into one object; only the
    /// first [`MAX_ADD_COUNT`] present children are encoded.
    AddLod {
        /// One child per level of detail, finest first.
        lods: SmallVec<[AstChild; MAX_ADD_COUNT]>,
    },
}

impl OpData {
    /// Constant opcode identity of this payload.
    pub fn op_type(&self) -> OpType {
        match self {
            OpData::None => OpType::None,
            OpData::ScalarConstant { .. } => OpType::ScalarConstant,
            OpData::ColourConstant { .. } => OpType::ColourConstant,
            OpData::StringConstant { .. } => OpType::StringConstant,
            OpData::ImageConstant { .. } => OpType::ImageConstant,
            OpData::MeshConstant { .. } => OpType::MeshConstant,
            OpData::Parameter { .. } => OpType::Parameter,
            OpData::ColourFromScalars { .. } => OpType::ColourFromScalars,
            OpData::ColourArithmetic { .. } => OpType::ColourArithmetic,
            OpData::ColourSampleImage { .. } => OpType::ColourSampleImage,
            OpData::ImageInvert { .. } => OpType::ImageInvert,
            OpData::ImageSaturate { .. } => OpType::ImageSaturate,
            OpData::ImageLuminance { .. } => OpType::ImageLuminance,
            OpData::ImagePlainColour { .. } => OpType::ImagePlainColour,
            OpData::ImageLayer { .. } => OpType::ImageLayer,
            OpData::ImageSwizzle { .. } => OpType::ImageSwizzle,
            OpData::ImageCompose { .. } => OpType::ImageCompose,
            OpData::MeshApplyPose { .. } => OpType::MeshApplyPose,
            OpData::MeshClipDeform { .. } => OpType::MeshClipDeform,
            OpData::MeshMorph { .. } => OpType::MeshMorph,
            OpData::MeshTransform { .. } => OpType::MeshTransform,
            OpData::MeshExtractLayoutBlocks { .. } => OpType::MeshExtractLayoutBlocks,
            OpData::AddLod { .. } => OpType::AddLod,
        }
    }
}

/// One operation of the lowered graph.
///
/// Operations are immutable after construction except for the one-time
/// linked-address assignment performed by the linker, so an instance can
/// safely be shared by many parents and across compiled graphs.
#[derive(Debug)]
pub struct AstOp {
    data: OpData,
    linked: Cell<OpAddress>,
}

impl AstOp {
    /// Wrap `data` into a shared, unlinked operation handle.
    pub fn new(data: OpData) -> Rc<AstOp> {
        Rc::new(AstOp {
            data,
            linked: Cell::new(OpAddress::NONE),
        })
    }

    /// Operation payload.
    pub fn data(&self) -> &OpData {
        &self.data
    }

    /// Constant opcode identity of this operation.
    pub fn op_type(&self) -> OpType {
        self.data.op_type()
    }

    /// Address assigned by the linker; the null sentinel while unlinked.
    pub fn linked_address(&self) -> OpAddress {
        self.linked.get()
    }

    /// Return `true` once the linker has assigned an address.
    pub fn is_linked(&self) -> bool {
        !self.linked.get().is_none()
    }

    pub(crate) fn set_linked_address(&self, address: OpAddress) {
        debug_assert!(!self.is_linked(), "operation linked twice");
        self.linked.set(address);
    }

    /// Structural equality: same opcode, children compared by identity,
    /// scalar parameters field by field.
    pub fn is_equal(&self, other: &AstOp) -> bool {
        match (&self.data, &other.data) {
            (OpData::None, OpData::None) => true,
            (OpData::ScalarConstant { value: a }, OpData::ScalarConstant { value: b }) => {
                a.to_bits() == b.to_bits()
            }
            (OpData::ColourConstant { value: a }, OpData::ColourConstant { value: b }) => a
                .iter()
                .zip(b)
                .all(|(x, y)| x.to_bits() == y.to_bits()),
            (OpData::StringConstant { value: a }, OpData::StringConstant { value: b }) => a == b,
            (OpData::ImageConstant { image: a }, OpData::ImageConstant { image: b }) => {
                Rc::ptr_eq(a, b)
            }
            (OpData::MeshConstant { mesh: a }, OpData::MeshConstant { mesh: b }) => {
                Rc::ptr_eq(a, b)
            }
            (
                OpData::Parameter {
                    parameter: pa,
                    ranges: ra,
                },
                OpData::Parameter {
                    parameter: pb,
                    ranges: rb,
                },
            ) => pa == pb && ra == rb,
            (
                OpData::ColourFromScalars {
                    x: xa,
                    y: ya,
                    z: za,
                    w: wa,
                },
                OpData::ColourFromScalars {
                    x: xb,
                    y: yb,
                    z: zb,
                    w: wb,
                },
            ) => xa == xb && ya == yb && za == zb && wa == wb,
            (
                OpData::ColourArithmetic {
                    op: opa,
                    a: aa,
                    b: ba,
                },
                OpData::ColourArithmetic {
                    op: opb,
                    a: ab,
                    b: bb,
                },
            ) => opa == opb && aa == ab && ba == bb,
            (
                OpData::ColourSampleImage {
                    image: ia,
                    x: xa,
                    y: ya,
                },
                OpData::ColourSampleImage {
                    image: ib,
                    x: xb,
                    y: yb,
                },
            ) => ia == ib && xa == xb && ya == yb,
            (OpData::ImageInvert { base: a }, OpData::ImageInvert { base: b }) => a == b,
            (
                OpData::ImageSaturate {
                    base: ba,
                    factor: fa,
                },
                OpData::ImageSaturate {
                    base: bb,
                    factor: fb,
                },
            ) => ba == bb && fa == fb,
            (OpData::ImageLuminance { base: a }, OpData::ImageLuminance { base: b }) => a == b,
            (
                OpData::ImagePlainColour {
                    colour: ca,
                    size: sa,
                },
                OpData::ImagePlainColour {
                    colour: cb,
                    size: sb,
                },
            ) => ca == cb && sa == sb,
            (
                OpData::ImageLayer {
                    base: ba,
                    mask: ma,
                    blended: la,
                    blend_type: ta,
                },
                OpData::ImageLayer {
                    base: bb,
                    mask: mb,
                    blended: lb,
                    blend_type: tb,
                },
            ) => ba == bb && ma == mb && la == lb && ta == tb,
            (
                OpData::ImageSwizzle {
                    format: fa,
                    sources: sa,
                    source_channels: ca,
                },
                OpData::ImageSwizzle {
                    format: fb,
                    sources: sb,
                    source_channels: cb,
                },
            ) => fa == fb && sa == sb && ca == cb,
            (
                OpData::ImageCompose {
                    layout: la,
                    base: ba,
                    block_image: ia,
                    mask: ma,
                    block_index: xa,
                },
                OpData::ImageCompose {
                    layout: lb,
                    base: bb,
                    block_image: ib,
                    mask: mb,
                    block_index: xb,
                },
            ) => la == lb && ba == bb && ia == ib && ma == mb && xa == xb,
            (
                OpData::MeshApplyPose { base: ba, pose: pa },
                OpData::MeshApplyPose { base: bb, pose: pb },
            ) => ba == bb && pa == pb,
            (
                OpData::MeshClipDeform {
                    mesh: ma,
                    clip_shape: ca,
                },
                OpData::MeshClipDeform {
                    mesh: mb,
                    clip_shape: cb,
                },
            ) => ma == mb && ca == cb,
            (
                OpData::MeshMorph {
                    factor: fa,
                    base: ba,
                    targets: ta,
                },
                OpData::MeshMorph {
                    factor: fb,
                    base: bb,
                    targets: tb,
                },
            ) => fa == fb && ba == bb && ta == tb,
            (
                OpData::MeshTransform {
                    source: sa,
                    transform: ta,
                },
                OpData::MeshTransform {
                    source: sb,
                    transform: tb,
                },
            ) => {
                sa == sb
                    && ta
                        .iter()
                        .zip(tb)
                        .all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (
                OpData::MeshExtractLayoutBlocks {
                    source: sa,
                    layout: la,
                    blocks: ba,
                },
                OpData::MeshExtractLayoutBlocks {
                    source: sb,
                    layout: lb,
                    blocks: bb,
                },
            ) => sa == sb && la == lb && ba == bb,
            (OpData::AddLod { lods: a }, OpData::AddLod { lods: b }) => a == b,
            _ => false,
        }
    }

    /// Structural hash combining the opcode with child identities and
    /// scalar parameters in fixed field order.
    ///
    /// Cheap (no recursion) and stable across operations that are
    /// [`AstOp::is_equal`]. Deep equality over shared children holds
    /// because children are deduplicated before their parents.
    pub fn hash(&self) -> u64 {
        let mut h = OpHasher::new();
        h.write_u16(self.op_type() as u16);
        self.for_each_child(&mut |c| h.write_u64(c.ptr_id() as u64));
        match &self.data {
            OpData::None => {}
            OpData::ScalarConstant { value } => h.write_f32(*value),
            OpData::ColourConstant { value } => {
                for v in value {
                    h.write_f32(*v);
                }
            }
            OpData::StringConstant { value } => h.write_bytes(value.as_bytes()),
            OpData::ImageConstant { image } => h.write_u64(Rc::as_ptr(image) as usize as u64),
            OpData::MeshConstant { mesh } => h.write_u64(Rc::as_ptr(mesh) as usize as u64),
            OpData::Parameter { parameter, .. } => {
                h.write_bytes(parameter.name.as_bytes());
                h.write_bytes(parameter.uid.as_bytes());
                h.write_u8(parameter.param_type.code());
            }
            OpData::ColourFromScalars { .. } => {}
            OpData::ColourArithmetic { op, .. } => h.write_u8(op.code()),
            OpData::ColourSampleImage { .. } => {}
            OpData::ImageInvert { .. } => {}
            OpData::ImageSaturate { .. } => {}
            OpData::ImageLuminance { .. } => {}
            OpData::ImagePlainColour { size, .. } => {
                h.write_u16(size[0]);
                h.write_u16(size[1]);
            }
            OpData::ImageLayer { blend_type, .. } => h.write_u8(blend_type.code()),
            OpData::ImageSwizzle {
                format,
                source_channels,
                ..
            } => {
                h.write_u8(format.code());
                h.write_bytes(source_channels);
            }
            OpData::ImageCompose { block_index, .. } => h.write_u32(*block_index),
            OpData::MeshApplyPose { .. } => {}
            OpData::MeshClipDeform { .. } => {}
            OpData::MeshMorph { .. } => {}
            OpData::MeshTransform { transform, .. } => {
                for v in transform {
                    h.write_f32(*v);
                }
            }
            OpData::MeshExtractLayoutBlocks { layout, blocks, .. } => {
                h.write_u16(*layout);
                for b in blocks {
                    h.write_u32(*b);
                }
            }
            OpData::AddLod { .. } => {}
        }
        h.finish()
    }

    /// Allocate a copy of the same opcode with every child edge replaced
    /// by `map_child`; scalar fields are copied directly.
    ///
    /// The caller owns the memoization that keeps a shared child mapped
    /// to one clone (see [`clone_graph`]).
    pub fn clone_with(&self, map_child: &mut dyn FnMut(&AstChild) -> AstChild) -> Rc<AstOp> {
        let data = match &self.data {
            OpData::None => OpData::None,
            OpData::ScalarConstant { value } => OpData::ScalarConstant { value: *value },
            OpData::ColourConstant { value } => OpData::ColourConstant { value: *value },
            OpData::StringConstant { value } => OpData::StringConstant {
                value: value.clone(),
            },
            OpData::ImageConstant { image } => OpData::ImageConstant {
                image: image.clone(),
            },
            OpData::MeshConstant { mesh } => OpData::MeshConstant { mesh: mesh.clone() },
            OpData::Parameter { parameter, ranges } => OpData::Parameter {
                parameter: parameter.clone(),
                ranges: ranges
                    .iter()
                    .map(|r| RangeEdge {
                        size: map_child(&r.size),
                        name: r.name.clone(),
                    })
                    .collect(),
            },
            OpData::ColourFromScalars { x, y, z, w } => OpData::ColourFromScalars {
                x: map_child(x),
                y: map_child(y),
                z: map_child(z),
                w: map_child(w),
            },
            OpData::ColourArithmetic { op, a, b } => OpData::ColourArithmetic {
                op: *op,
                a: map_child(a),
                b: map_child(b),
            },
            OpData::ColourSampleImage { image, x, y } => OpData::ColourSampleImage {
                image: map_child(image),
                x: map_child(x),
                y: map_child(y),
            },
            OpData::ImageInvert { base } => OpData::ImageInvert {
                base: map_child(base),
            },
            OpData::ImageSaturate { base, factor } => OpData::ImageSaturate {
                base: map_child(base),
                factor: map_child(factor),
            },
            OpData::ImageLuminance { base } => OpData::ImageLuminance {
                base: map_child(base),
            },
            OpData::ImagePlainColour { colour, size } => OpData::ImagePlainColour {
                colour: map_child(colour),
                size: *size,
            },
            OpData::ImageLayer {
                base,
                mask,
                blended,
                blend_type,
            } => OpData::ImageLayer {
                base: map_child(base),
                mask: map_child(mask),
                blended: map_child(blended),
                blend_type: *blend_type,
            },
            OpData::ImageSwizzle {
                format,
                sources,
                source_channels,
            } => OpData::ImageSwizzle {
                format: *format,
                sources: [
                    map_child(&sources[0]),
                    map_child(&sources[1]),
                    map_child(&sources[2]),
                    map_child(&sources[3]),
                ],
                source_channels: *source_channels,
            },
            OpData::ImageCompose {
                layout,
                base,
                block_image,
                mask,
                block_index,
            } => OpData::ImageCompose {
                layout: map_child(layout),
                base: map_child(base),
                block_image: map_child(block_image),
                mask: map_child(mask),
                block_index: *block_index,
            },
            OpData::MeshApplyPose { base, pose } => OpData::MeshApplyPose {
                base: map_child(base),
                pose: map_child(pose),
            },
            OpData::MeshClipDeform { mesh, clip_shape } => OpData::MeshClipDeform {
                mesh: map_child(mesh),
                clip_shape: map_child(clip_shape),
            },
            OpData::MeshMorph {
                factor,
                base,
                targets,
            } => OpData::MeshMorph {
                factor: map_child(factor),
                base: map_child(base),
                targets: targets.iter().map(|t| map_child(t)).collect(),
            },
            OpData::MeshTransform { source, transform } => OpData::MeshTransform {
                source: map_child(source),
                transform: *transform,
            },
            OpData::MeshExtractLayoutBlocks {
                source,
                layout,
                blocks,
            } => OpData::MeshExtractLayoutBlocks {
                source: map_child(source),
                layout: *layout,
                blocks: blocks.clone(),
            },
            OpData::AddLod { lods } => OpData::AddLod {
                lods: lods.iter().map(|l| map_child(l)).collect(),
            },
        };
        AstOp::new(data)
    }

    /// Invoke `f` once per child edge, in the type's fixed field order.
    ///
    /// This is the sole generic traversal primitive; dependency walks,
    /// post-order visits and the linker driver are built on it.
    pub fn for_each_child(&self, f: &mut dyn FnMut(&AstChild)) {
        match &self.data {
            OpData::None
            | OpData::ScalarConstant { .. }
            | OpData::ColourConstant { .. }
            | OpData::StringConstant { .. }
            | OpData::ImageConstant { .. }
            | OpData::MeshConstant { .. } => {}
            OpData::Parameter { ranges, .. } => {
                for r in ranges {
                    f(&r.size);
                }
            }
            OpData::ColourFromScalars { x, y, z, w } => {
                f(x);
                f(y);
                f(z);
                f(w);
            }
            OpData::ColourArithmetic { a, b, .. } => {
                f(a);
                f(b);
            }
            OpData::ColourSampleImage { image, x, y } => {
                f(image);
                f(x);
                f(y);
            }
            OpData::ImageInvert { base } => f(base),
            OpData::ImageSaturate { base, factor } => {
                f(base);
                f(factor);
            }
            OpData::ImageLuminance { base } => f(base),
            OpData::ImagePlainColour { colour, .. } => f(colour),
            OpData::ImageLayer {
                base,
                mask,
                blended,
                ..
            } => {
                f(base);
                f(mask);
                f(blended);
            }
            OpData::ImageSwizzle { sources, .. } => {
                for s in sources {
                    f(s);
                }
            }
            OpData::ImageCompose {
                layout,
                base,
                block_image,
                mask,
                ..
            } => {
                f(layout);
                f(base);
                f(block_image);
                f(mask);
            }
            OpData::MeshApplyPose { base, pose } => {
                f(base);
                f(pose);
            }
            OpData::MeshClipDeform { mesh, clip_shape } => {
                f(mesh);
                f(clip_shape);
            }
            OpData::MeshMorph {
                factor,
                base,
                targets,
            } => {
                f(factor);
                f(base);
                for t in targets {
                    f(t);
                }
            }
            OpData::MeshTransform { source, .. } => f(source),
            OpData::MeshExtractLayoutBlocks { source, .. } => f(source),
            OpData::AddLod { lods } => {
                for l in lods {
                    f(l);
                }
            }
        }
    }

    fn detach_children_into(&mut self, out: &mut Vec<Rc<AstOp>>) {
        match &mut self.data {
            OpData::None
            | OpData::ScalarConstant { .. }
            | OpData::ColourConstant { .. }
            | OpData::StringConstant { .. }
            | OpData::ImageConstant { .. }
            | OpData::MeshConstant { .. } => {}
            OpData::Parameter { ranges, .. } => {
                for r in ranges {
                    out.extend(r.size.take());
                }
            }
            OpData::ColourFromScalars { x, y, z, w } => {
                out.extend(x.take());
                out.extend(y.take());
                out.extend(z.take());
                out.extend(w.take());
            }
            OpData::ColourArithmetic { a, b, .. } => {
                out.extend(a.take());
                out.extend(b.take());
            }
            OpData::ColourSampleImage { image, x, y } => {
                out.extend(image.take());
                out.extend(x.take());
                out.extend(y.take());
            }
            OpData::ImageInvert { base } => out.extend(base.take()),
            OpData::ImageSaturate { base, factor } => {
                out.extend(base.take());
                out.extend(factor.take());
            }
            OpData::ImageLuminance { base } => out.extend(base.take()),
            OpData::ImagePlainColour { colour, .. } => out.extend(colour.take()),
            OpData::ImageLayer {
                base,
                mask,
                blended,
                ..
            } => {
                out.extend(base.take());
                out.extend(mask.take());
                out.extend(blended.take());
            }
            OpData::ImageSwizzle { sources, .. } => {
                for s in sources {
                    out.extend(s.take());
                }
            }
            OpData::ImageCompose {
                layout,
                base,
                block_image,
                mask,
                ..
            } => {
                out.extend(layout.take());
                out.extend(base.take());
                out.extend(block_image.take());
                out.extend(mask.take());
            }
            OpData::MeshApplyPose { base, pose } => {
                out.extend(base.take());
                out.extend(pose.take());
            }
            OpData::MeshClipDeform { mesh, clip_shape } => {
                out.extend(mesh.take());
                out.extend(clip_shape.take());
            }
            OpData::MeshMorph {
                factor,
                base,
                targets,
            } => {
                out.extend(factor.take());
                out.extend(base.take());
                for t in targets {
                    out.extend(t.take());
                }
            }
            OpData::MeshTransform { source, .. } => out.extend(source.take()),
            OpData::MeshExtractLayoutBlocks { source, .. } => out.extend(source.take()),
            OpData::AddLod { lods } => {
                for l in lods {
                    out.extend(l.take());
                }
            }
        }
    }
}

impl Drop for AstOp {
    fn drop(&mut self) {
        // Detach children through a work list instead of letting drop glue
        // recurse: a deep shared DAG would otherwise overflow the stack.
        let mut pending: Vec<Rc<AstOp>> = Vec::new();
        self.detach_children_into(&mut pending);
        while let Some(child) = pending.pop() {
            if let Some(mut op) = Rc::into_inner(child) {
                op.detach_children_into(&mut pending);
            }
        }
    }
}

struct OpHasher {
    inner: Xxh3,
}

impl OpHasher {
    fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_u16(&mut self, v: u16) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    fn finish(self) -> u64 {
        self.inner.digest()
    }
}

/// Description of the raster an image-valued operation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageDesc {
    /// Width and height in pixels.
    pub size: [u32; 2],
    /// Pixel format.
    pub format: ImageFormat,
}

/// Memo for [`AstOp::image_desc`] queries over shared subtrees.
#[derive(Debug, Default)]
pub struct ImageDescContext {
    results: HashMap<usize, ImageDesc>,
}

impl ImageDescContext {
    /// Create an empty memo.
    pub fn new() -> Self {
        Self::default()
    }
}

impl AstOp {
    /// Resulting image description of an image-valued operation.
    ///
    /// Query-only: never touches the linked address or child edges, and
    /// may be called before or after linking. Non-image operations
    /// report a default description.
    pub fn image_desc(&self, context: &mut ImageDescContext) -> ImageDesc {
        let key = self as *const AstOp as usize;
        if let Some(desc) = context.results.get(&key) {
            return *desc;
        }
        let desc = match &self.data {
            OpData::ImageConstant { image } => ImageDesc {
                size: image.size,
                format: image.format,
            },
            OpData::ImageInvert { base }
            | OpData::ImageSaturate { base, .. }
            | OpData::ImageLayer { base, .. }
            | OpData::ImageCompose { base, .. } => child_image_desc(base, context),
            OpData::ImageLuminance { base } => ImageDesc {
                size: child_image_desc(base, context).size,
                format: ImageFormat::L8,
            },
            OpData::ImagePlainColour { size, .. } => ImageDesc {
                size: [u32::from(size[0]), u32::from(size[1])],
                format: ImageFormat::Rgba8,
            },
            OpData::ImageSwizzle {
                format, sources, ..
            } => ImageDesc {
                size: child_image_desc(&sources[0], context).size,
                format: *format,
            },
            _ => ImageDesc::default(),
        };
        context.results.insert(key, desc);
        desc
    }

    /// Colour of an image subtree that is a constant plain colour, if
    /// any. Query-only.
    pub fn image_plain_constant(&self) -> Option<[f32; 4]> {
        match &self.data {
            OpData::ImagePlainColour { colour, .. } => match colour.child()?.data() {
                OpData::ColourConstant { value } => Some(*value),
                _ => None,
            },
            _ => None,
        }
    }

    /// Layout block size of an image-composition subtree, if known.
    /// Query-only.
    pub fn layout_block_size(&self) -> Option<[u16; 2]> {
        match &self.data {
            OpData::ImagePlainColour { size, .. } => Some(*size),
            OpData::ImageCompose { base, .. } => base.child()?.layout_block_size(),
            _ => None,
        }
    }
}

fn child_image_desc(child: &AstChild, context: &mut ImageDescContext) -> ImageDesc {
    child
        .child()
        .map(|op| op.image_desc(context))
        .unwrap_or_default()
}

/// Visit every operation reachable from `roots` exactly once and return
/// them children-before-parents.
///
/// Iterative: safe on DAGs deeper than the call stack.
pub fn visit_post_order(roots: &[Rc<AstOp>]) -> Vec<Rc<AstOp>> {
    let mut visited: HashSet<usize> = HashSet::new();
    let mut order: Vec<Rc<AstOp>> = Vec::new();
    let mut stack: Vec<(Rc<AstOp>, bool)> = roots
        .iter()
        .rev()
        .map(|r| (r.clone(), false))
        .collect();

    while let Some((op, expanded)) = stack.pop() {
        if expanded {
            order.push(op);
            continue;
        }
        if !visited.insert(Rc::as_ptr(&op) as usize) {
            continue;
        }
        stack.push((op.clone(), true));
        op.for_each_child(&mut |c| {
            if let Some(child) = c.child()
                && !visited.contains(&(Rc::as_ptr(child) as usize))
            {
                stack.push((child.clone(), false));
            }
        });
    }
    order
}

/// Deep-clone the graph under `root`, preserving sharing.
///
/// A single memo map serves the whole traversal, so an operation
/// referenced by several parents is cloned once and the cloned parents
/// share the one cloned instance.
pub fn clone_graph(root: &Rc<AstOp>) -> Rc<AstOp> {
    let order = visit_post_order(std::slice::from_ref(root));
    let mut clones: HashMap<usize, Rc<AstOp>> = HashMap::with_capacity(order.len());
    for op in &order {
        let clone = op.clone_with(&mut |c| match c.child() {
            None => AstChild::none(),
            Some(child) => match clones.get(&(Rc::as_ptr(child) as usize)) {
                Some(mapped) => AstChild::new(mapped.clone()),
                None => {
                    debug_assert!(false, "post-order clone visited a parent before its child");
                    AstChild::none()
                }
            },
        });
        clones.insert(Rc::as_ptr(op) as usize, clone);
    }
    match clones.get(&(Rc::as_ptr(root) as usize)) {
        Some(clone) => clone.clone(),
        None => root.clone_with(&mut |c| c.clone()),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/ast/op.rs"]
mod tests;
