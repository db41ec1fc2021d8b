use std::cell::RefCell;
use std::rc::Rc;

use crate::foundation::asset::{Image, ImageFormat};
use crate::foundation::core::BlendType;
use crate::foundation::error::{ProteanError, ProteanResult};
use crate::node::archive::{InputArchive, OutputArchive};
use crate::node::{
    AnyNode, ColourNodeRef, ImageNodeRef, NodeCloneMap, ScalarNodeRef, assign_colour, assign_image,
    assign_scalar,
};

pub(crate) const KIND_COUNT: usize = 7;

const DISC_CONSTANT: u32 = 0;
const DISC_INVERT: u32 = 1;
const DISC_SATURATE: u32 = 2;
const DISC_LUMINANCE: u32 = 3;
const DISC_PLAIN_COLOUR: u32 = 4;
const DISC_LAYER: u32 = 5;
const DISC_SWIZZLE: u32 = 6;

const CONTAINER_VERSION: u32 = 0;

/// Concrete image node kinds.
#[derive(Debug)]
pub enum ImageKind {
    /// A constant raster payload.
    Constant {
        /// The referenced image payload.
        image: Rc<Image>,
    },
    /// Invert the colour channels of the base image.
    Invert {
        /// Image to invert.
        base: Option<ImageNodeRef>,
    },
    /// Scale the saturation of the base image by a scalar factor.
    Saturate {
        /// Image to adjust.
        base: Option<ImageNodeRef>,
        /// Saturation factor; `0` desaturates fully.
        factor: Option<ScalarNodeRef>,
    },
    /// Collapse the base image to single-channel luminance.
    Luminance {
        /// Image to convert.
        base: Option<ImageNodeRef>,
    },
    /// A solid image of one colour.
    PlainColour {
        /// Colour to fill with.
        colour: Option<ColourNodeRef>,
        /// Output size in pixels.
        size: [u16; 2],
    },
    /// Blend an image onto a base image, optionally through a mask.
    Layer {
        /// Image to blend onto.
        base: Option<ImageNodeRef>,
        /// Single-channel blend weight mask.
        mask: Option<ImageNodeRef>,
        /// Image blended on top.
        blended: Option<ImageNodeRef>,
        /// Blend operation.
        blend_type: BlendType,
    },
    /// Rebuild an image by picking one channel from each source image.
    Swizzle {
        /// Output pixel format; decides how many sources are used.
        format: ImageFormat,
        /// Source image per output channel.
        sources: [Option<ImageNodeRef>; 4],
        /// Channel index sampled from each source.
        source_channels: [u8; 4],
    },
}

/// An image-valued authoring node.
#[derive(Debug)]
pub struct ImageNode {
    kind: ImageKind,
}

impl ImageNode {
    /// Wrap a kind into a shared node handle.
    pub fn new(kind: ImageKind) -> ImageNodeRef {
        Rc::new(RefCell::new(Self { kind }))
    }

    /// Concrete kind of this node.
    pub fn kind(&self) -> &ImageKind {
        &self.kind
    }

    /// Mutable access to the concrete kind.
    pub fn kind_mut(&mut self) -> &mut ImageKind {
        &mut self.kind
    }

    /// Name of the concrete kind, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            ImageKind::Constant { .. } => "ImageConstant",
            ImageKind::Invert { .. } => "ImageInvert",
            ImageKind::Saturate { .. } => "ImageSaturate",
            ImageKind::Luminance { .. } => "ImageLuminance",
            ImageKind::PlainColour { .. } => "ImagePlainColour",
            ImageKind::Layer { .. } => "ImageLayer",
            ImageKind::Swizzle { .. } => "ImageSwizzle",
        }
    }

    /// Number of input slots, fixed per kind.
    pub fn input_count(&self) -> usize {
        match &self.kind {
            ImageKind::Constant { .. } => 0,
            ImageKind::Invert { .. } => 1,
            ImageKind::Saturate { .. } => 2,
            ImageKind::Luminance { .. } => 1,
            ImageKind::PlainColour { .. } => 1,
            ImageKind::Layer { .. } => 3,
            ImageKind::Swizzle { sources, .. } => sources.len(),
        }
    }

    /// Input node at slot `i`, or `None` when the slot is empty.
    pub fn input_node(&self, i: usize) -> Option<AnyNode> {
        if i >= self.input_count() {
            debug_assert!(false, "image input index {i} out of range");
            return None;
        }
        match (&self.kind, i) {
            (ImageKind::Invert { base }, 0)
            | (ImageKind::Luminance { base }, 0)
            | (ImageKind::Saturate { base, .. }, 0)
            | (ImageKind::Layer { base, .. }, 0) => base.clone().map(AnyNode::Image),
            (ImageKind::Saturate { factor, .. }, 1) => factor.clone().map(AnyNode::Scalar),
            (ImageKind::PlainColour { colour, .. }, 0) => colour.clone().map(AnyNode::Colour),
            (ImageKind::Layer { mask, .. }, 1) => mask.clone().map(AnyNode::Image),
            (ImageKind::Layer { blended, .. }, 2) => blended.clone().map(AnyNode::Image),
            (ImageKind::Swizzle { sources, .. }, _) => sources[i].clone().map(AnyNode::Image),
            _ => None,
        }
    }

    /// Install `node` into slot `i`.
    ///
    /// The node must match the slot's category; mismatches keep the
    /// previous value. Out-of-range indices are a programming error.
    pub fn set_input_node(&mut self, i: usize, node: Option<AnyNode>) {
        if i >= self.input_count() {
            debug_assert!(false, "image input index {i} out of range");
            return;
        }
        match (&mut self.kind, i) {
            (ImageKind::Invert { base }, 0)
            | (ImageKind::Luminance { base }, 0)
            | (ImageKind::Saturate { base, .. }, 0)
            | (ImageKind::Layer { base, .. }, 0) => assign_image(base, node),
            (ImageKind::Saturate { factor, .. }, 1) => assign_scalar(factor, node),
            (ImageKind::PlainColour { colour, .. }, 0) => assign_colour(colour, node),
            (ImageKind::Layer { mask, .. }, 1) => assign_image(mask, node),
            (ImageKind::Layer { blended, .. }, 2) => assign_image(blended, node),
            (ImageKind::Swizzle { sources, .. }, _) => assign_image(&mut sources[i], node),
            _ => {}
        }
    }

    /// Base image of a layer node; `None` for other kinds.
    pub fn layer_base(&self) -> Option<ImageNodeRef> {
        match &self.kind {
            ImageKind::Layer { base, .. } => base.clone(),
            _ => None,
        }
    }

    /// Set the base image of a layer node. No-op for other kinds.
    pub fn set_layer_base(&mut self, node: Option<ImageNodeRef>) {
        if let ImageKind::Layer { base, .. } = &mut self.kind {
            *base = node;
        }
    }

    /// Set the blended image of a layer node. No-op for other kinds.
    pub fn set_layer_blended(&mut self, node: Option<ImageNodeRef>) {
        if let ImageKind::Layer { blended, .. } = &mut self.kind {
            *blended = node;
        }
    }

    /// Write `node` with container version and discriminator.
    pub fn serialise(node: &ImageNodeRef, arch: &mut OutputArchive) {
        arch.write_u32(CONTAINER_VERSION);
        let guard = node.borrow();
        match guard.kind() {
            ImageKind::Constant { image } => {
                arch.write_u32(DISC_CONSTANT);
                arch.write_u32(0);
                write_image_payload(arch, image);
            }
            ImageKind::Invert { base } => {
                arch.write_u32(DISC_INVERT);
                arch.write_u32(0);
                arch.write_image(base);
            }
            ImageKind::Saturate { base, factor } => {
                arch.write_u32(DISC_SATURATE);
                arch.write_u32(0);
                arch.write_image(base);
                arch.write_scalar(factor);
            }
            ImageKind::Luminance { base } => {
                arch.write_u32(DISC_LUMINANCE);
                arch.write_u32(0);
                arch.write_image(base);
            }
            ImageKind::PlainColour { colour, size } => {
                arch.write_u32(DISC_PLAIN_COLOUR);
                arch.write_u32(0);
                arch.write_colour(colour);
                arch.write_u16(size[0]);
                arch.write_u16(size[1]);
            }
            ImageKind::Layer {
                base,
                mask,
                blended,
                blend_type,
            } => {
                arch.write_u32(DISC_LAYER);
                arch.write_u32(0);
                arch.write_image(base);
                arch.write_image(mask);
                arch.write_image(blended);
                arch.write_u8(blend_type.code());
            }
            ImageKind::Swizzle {
                format,
                sources,
                source_channels,
            } => {
                arch.write_u32(DISC_SWIZZLE);
                arch.write_u32(0);
                arch.write_u8(format.code());
                for (source, channel) in sources.iter().zip(source_channels) {
                    arch.write_image(source);
                    arch.write_u8(*channel);
                }
            }
        }
    }

    /// Read a node written by [`ImageNode::serialise`].
    ///
    /// Fails on unknown discriminators or unsupported versions.
    pub fn static_unserialise(arch: &mut InputArchive) -> ProteanResult<ImageNodeRef> {
        let ver = arch.read_u32()?;
        if ver != CONTAINER_VERSION {
            return Err(ProteanError::schema(format!(
                "unsupported image node container version {ver}"
            )));
        }
        let id = arch.read_u32()?;
        let unserialise = crate::node::registry::image_unserialiser(id).ok_or_else(|| {
            ProteanError::schema(format!("unknown image node discriminator {id}"))
        })?;
        unserialise(arch)
    }
}

fn write_image_payload(arch: &mut OutputArchive, image: &Image) {
    arch.write_u32(image.size[0]);
    arch.write_u32(image.size[1]);
    arch.write_u8(image.format.code());
    arch.write_bytes(&image.data);
}

fn read_image_payload(arch: &mut InputArchive) -> ProteanResult<Image> {
    let size = [arch.read_u32()?, arch.read_u32()?];
    let code = arch.read_u8()?;
    let format = ImageFormat::from_code(code)
        .ok_or_else(|| ProteanError::schema(format!("unknown image format code {code}")))?;
    let data = arch.read_bytes()?;
    Ok(Image { size, format, data })
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

pub(crate) fn unserialise_constant(arch: &mut InputArchive) -> ProteanResult<ImageNodeRef> {
    read_record_version(arch, 0, "image constant")?;
    let image = Rc::new(read_image_payload(arch)?);
    Ok(ImageNode::new(ImageKind::Constant { image }))
}

pub(crate) fn unserialise_invert(arch: &mut InputArchive) -> ProteanResult<ImageNodeRef> {
    read_record_version(arch, 0, "image invert")?;
    let base = arch.read_image()?;
    Ok(ImageNode::new(ImageKind::Invert { base }))
}

pub(crate) fn unserialise_saturate(arch: &mut InputArchive) -> ProteanResult<ImageNodeRef> {
    read_record_version(arch, 0, "image saturate")?;
    let base = arch.read_image()?;
    let factor = arch.read_scalar()?;
    Ok(ImageNode::new(ImageKind::Saturate { base, factor }))
}

pub(crate) fn unserialise_luminance(arch: &mut InputArchive) -> ProteanResult<ImageNodeRef> {
    read_record_version(arch, 0, "image luminance")?;
    let base = arch.read_image()?;
    Ok(ImageNode::new(ImageKind::Luminance { base }))
}

pub(crate) fn unserialise_plain_colour(arch: &mut InputArchive) -> ProteanResult<ImageNodeRef> {
    read_record_version(arch, 0, "image plain colour")?;
    let colour = arch.read_colour()?;
    let size = [arch.read_u16()?, arch.read_u16()?];
    Ok(ImageNode::new(ImageKind::PlainColour { colour, size }))
}

pub(crate) fn unserialise_layer(arch: &mut InputArchive) -> ProteanResult<ImageNodeRef> {
    read_record_version(arch, 0, "image layer")?;
    let base = arch.read_image()?;
    let mask = arch.read_image()?;
    let blended = arch.read_image()?;
    let code = arch.read_u8()?;
    let blend_type = BlendType::from_code(code)
        .ok_or_else(|| ProteanError::schema(format!("unknown blend type code {code}")))?;
    Ok(ImageNode::new(ImageKind::Layer {
        base,
        mask,
        blended,
        blend_type,
    }))
}

pub(crate) fn unserialise_swizzle(arch: &mut InputArchive) -> ProteanResult<ImageNodeRef> {
    read_record_version(arch, 0, "image swizzle")?;
    let code = arch.read_u8()?;
    let format = ImageFormat::from_code(code)
        .ok_or_else(|| ProteanError::schema(format!("unknown image format code {code}")))?;
    let mut sources: [Option<ImageNodeRef>; 4] = [None, None, None, None];
    let mut source_channels = [0u8; 4];
    for i in 0..4 {
        sources[i] = arch.read_image()?;
        source_channels[i] = arch.read_u8()?;
    }
    Ok(ImageNode::new(ImageKind::Swizzle {
        format,
        sources,
        source_channels,
    }))
}

pub(crate) fn clone_image(node: &ImageNodeRef, map: &mut NodeCloneMap) -> ImageNodeRef {
    let key = Rc::as_ptr(node) as usize;
    if let Some(AnyNode::Image(existing)) = map.get(key) {
        return existing.clone();
    }
    let kind = {
        let guard = node.borrow();
        match guard.kind() {
            ImageKind::Constant { image } => ImageKind::Constant {
                image: image.clone(),
            },
            ImageKind::Invert { base } => ImageKind::Invert {
                base: clone_opt_image(base, map),
            },
            ImageKind::Saturate { base, factor } => ImageKind::Saturate {
                base: clone_opt_image(base, map),
                factor: factor
                    .as_ref()
                    .map(|n| crate::node::scalar::clone_scalar(n, map)),
            },
            ImageKind::Luminance { base } => ImageKind::Luminance {
                base: clone_opt_image(base, map),
            },
            ImageKind::PlainColour { colour, size } => ImageKind::PlainColour {
                colour: colour
                    .as_ref()
                    .map(|n| crate::node::colour::clone_colour(n, map)),
                size: *size,
            },
            ImageKind::Layer {
                base,
                mask,
                blended,
                blend_type,
            } => ImageKind::Layer {
                base: clone_opt_image(base, map),
                mask: clone_opt_image(mask, map),
                blended: clone_opt_image(blended, map),
                blend_type: *blend_type,
            },
            ImageKind::Swizzle {
                format,
                sources,
                source_channels,
            } => {
                let mut cloned: [Option<ImageNodeRef>; 4] = [None, None, None, None];
                for (slot, source) in cloned.iter_mut().zip(sources) {
                    *slot = clone_opt_image(source, map);
                }
                ImageKind::Swizzle {
                    format: *format,
                    sources: cloned,
                    source_channels: *source_channels,
                }
            }
        }
    };
    let clone = ImageNode::new(kind);
    map.insert(key, AnyNode::Image(clone.clone()));
    clone
}

fn clone_opt_image(node: &Option<ImageNodeRef>, map: &mut NodeCloneMap) -> Option<ImageNodeRef> {
    node.as_ref().map(|n| clone_image(n, map))
}
