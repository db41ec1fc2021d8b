use std::rc::Rc;

use crate::ast::op::{AstOp, MAX_ADD_COUNT, MAX_MORPH_COUNT, OpData, OpType, visit_post_order};
use crate::ast::program::{CodeReader, Program, RangeDesc};
use crate::foundation::error::ProteanResult;
use crate::foundation::ids::OpAddress;

/// Options for the link step.
///
/// No knobs exist yet; the struct keeps the `link(program, options)`
/// call-site contract stable for when they do.
#[derive(Debug, Clone, Default)]
pub struct LinkerOptions {}

impl AstOp {
    /// Link this operation into `program`: append its table entry,
    /// opcode and argument record, and assign the linked address.
    ///
    /// Idempotent: an already-linked operation returns immediately, so a
    /// child shared by many parents is emitted exactly once. Children
    /// must already be linked when this runs; [`link_graph`] guarantees
    /// that by walking in post-order.
    pub fn link(&self, program: &mut Program, _options: &LinkerOptions) {
        if self.is_linked() {
            return;
        }

        match self.data() {
            OpData::None => {
                let address = program.begin_op(OpType::None);
                self.set_linked_address(address);
            }
            OpData::ScalarConstant { value } => {
                let address = program.begin_op(OpType::ScalarConstant);
                program.code_mut().write_f32(*value);
                self.set_linked_address(address);
            }
            OpData::ColourConstant { value } => {
                let address = program.begin_op(OpType::ColourConstant);
                for v in value {
                    program.code_mut().write_f32(*v);
                }
                self.set_linked_address(address);
            }
            OpData::StringConstant { value } => {
                let index = program.push_constant_string(value.clone());
                let address = program.begin_op(OpType::StringConstant);
                program.code_mut().write_u32(index);
                self.set_linked_address(address);
            }
            OpData::ImageConstant { image } => {
                let index = program.push_constant_image(image.clone());
                let address = program.begin_op(OpType::ImageConstant);
                program.code_mut().write_u32(index);
                self.set_linked_address(address);
            }
            OpData::MeshConstant { mesh } => {
                let index = program.push_constant_mesh(mesh.clone());
                let address = program.begin_op(OpType::MeshConstant);
                program.code_mut().write_u32(index);
                self.set_linked_address(address);
            }
            OpData::Parameter { parameter, ranges } => {
                let index = program.push_parameter(parameter.clone());
                for edge in ranges {
                    let range_index = program.push_range(RangeDesc {
                        name: edge.name.clone(),
                        size: edge.size.linked_address(),
                    });
                    if let Some(desc) = program.last_parameter_mut() {
                        desc.ranges.push(range_index);
                    }
                }
                let address = program.begin_op(OpType::Parameter);
                program.code_mut().write_u32(index);
                self.set_linked_address(address);
            }
            OpData::ColourFromScalars { x, y, z, w } => {
                let address = program.begin_op(OpType::ColourFromScalars);
                for c in [x, y, z, w] {
                    program.code_mut().write_address(c.linked_address());
                }
                self.set_linked_address(address);
            }
            OpData::ColourArithmetic { op, a, b } => {
                let address = program.begin_op(OpType::ColourArithmetic);
                program.code_mut().write_u8(op.code());
                program.code_mut().write_address(a.linked_address());
                program.code_mut().write_address(b.linked_address());
                self.set_linked_address(address);
            }
            OpData::ColourSampleImage { image, x, y } => {
                let address = program.begin_op(OpType::ColourSampleImage);
                program.code_mut().write_address(image.linked_address());
                program.code_mut().write_address(x.linked_address());
                program.code_mut().write_address(y.linked_address());
                self.set_linked_address(address);
            }
            OpData::ImageInvert { base } => {
                let address = program.begin_op(OpType::ImageInvert);
                program.code_mut().write_address(base.linked_address());
                self.set_linked_address(address);
            }
            OpData::ImageSaturate { base, factor } => {
                let address = program.begin_op(OpType::ImageSaturate);
                program.code_mut().write_address(base.linked_address());
                program.code_mut().write_address(factor.linked_address());
                self.set_linked_address(address);
            }
            OpData::ImageLuminance { base } => {
                let address = program.begin_op(OpType::ImageLuminance);
                program.code_mut().write_address(base.linked_address());
                self.set_linked_address(address);
            }
            OpData::ImagePlainColour { colour, size } => {
                let address = program.begin_op(OpType::ImagePlainColour);
                program.code_mut().write_address(colour.linked_address());
                program.code_mut().write_u16(size[0]);
                program.code_mut().write_u16(size[1]);
                self.set_linked_address(address);
            }
            OpData::ImageLayer {
                base,
                mask,
                blended,
                blend_type,
            } => {
                let address = program.begin_op(OpType::ImageLayer);
                program.code_mut().write_address(base.linked_address());
                program.code_mut().write_address(mask.linked_address());
                program.code_mut().write_address(blended.linked_address());
                program.code_mut().write_u8(blend_type.code());
                self.set_linked_address(address);
            }
            OpData::ImageSwizzle {
                format,
                sources,
                source_channels,
            } => {
                let address = program.begin_op(OpType::ImageSwizzle);
                program.code_mut().write_u8(format.code());
                for (source, channel) in sources.iter().zip(source_channels) {
                    program.code_mut().write_address(source.linked_address());
                    program.code_mut().write_u8(*channel);
                }
                self.set_linked_address(address);
            }
            OpData::ImageCompose {
                layout,
                base,
                block_image,
                mask,
                block_index,
            } => {
                let address = program.begin_op(OpType::ImageCompose);
                program.code_mut().write_address(layout.linked_address());
                program.code_mut().write_address(base.linked_address());
                program
                    .code_mut()
                    .write_address(block_image.linked_address());
                program.code_mut().write_address(mask.linked_address());
                program.code_mut().write_u32(*block_index);
                self.set_linked_address(address);
            }
            OpData::MeshApplyPose { base, pose } => {
                let address = program.begin_op(OpType::MeshApplyPose);
                program.code_mut().write_address(base.linked_address());
                program.code_mut().write_address(pose.linked_address());
                self.set_linked_address(address);
            }
            OpData::MeshClipDeform { mesh, clip_shape } => {
                let address = program.begin_op(OpType::MeshClipDeform);
                program.code_mut().write_address(mesh.linked_address());
                program.code_mut().write_address(clip_shape.linked_address());
                self.set_linked_address(address);
            }
            OpData::MeshMorph {
                factor,
                base,
                targets,
            } => {
                // Fixed-size slot array, zeroed first: absent targets and
                // anything past the cap stay at the 0 sentinel.
                let mut slots = [OpAddress::NONE; MAX_MORPH_COUNT];
                let mut filled = 0;
                for t in targets {
                    if t.is_some() {
                        slots[filled] = t.linked_address();
                        filled += 1;
                        if filled >= MAX_MORPH_COUNT {
                            break;
                        }
                    }
                }
                let address = program.begin_op(OpType::MeshMorph);
                program.code_mut().write_address(factor.linked_address());
                program.code_mut().write_address(base.linked_address());
                for slot in slots {
                    program.code_mut().write_address(slot);
                }
                self.set_linked_address(address);
            }
            OpData::MeshTransform { source, transform } => {
                let address = program.begin_op(OpType::MeshTransform);
                program.code_mut().write_address(source.linked_address());
                for v in transform {
                    program.code_mut().write_f32(*v);
                }
                self.set_linked_address(address);
            }
            OpData::MeshExtractLayoutBlocks {
                source,
                layout,
                blocks,
            } => {
                debug_assert!(blocks.len() < u16::MAX as usize);
                let address = program.begin_op(OpType::MeshExtractLayoutBlocks);
                program.code_mut().write_address(source.linked_address());
                program.code_mut().write_u16(*layout);
                program.code_mut().write_u16(blocks.len() as u16);
                for block in blocks {
                    program.code_mut().write_u32(*block);
                }
                self.set_linked_address(address);
            }
            OpData::AddLod { lods } => {
                let mut slots = [OpAddress::NONE; MAX_ADD_COUNT];
                let mut filled = 0;
                for lod in lods {
                    if lod.is_some() {
                        slots[filled] = lod.linked_address();
                        filled += 1;
                        if filled >= MAX_ADD_COUNT {
                            break;
                        }
                    }
                }
                let address = program.begin_op(OpType::AddLod);
                for slot in slots {
                    program.code_mut().write_address(slot);
                }
                self.set_linked_address(address);
            }
        }
    }
}

/// Link every operation reachable from `root`, children before parents,
/// and return the root's address.
pub fn link_graph(root: &Rc<AstOp>, program: &mut Program, options: &LinkerOptions) -> OpAddress {
    debug_assert_links_resolvable(root);
    for op in visit_post_order(std::slice::from_ref(root)) {
        op.link(program, options);
    }
    root.linked_address()
}

#[cfg(debug_assertions)]
fn debug_assert_links_resolvable(root: &Rc<AstOp>) {
    // Shared subtrees may already be linked from an earlier graph, but a
    // parent must never be linked while a child is not: its record would
    // hold a stale 0 sentinel.
    for op in visit_post_order(std::slice::from_ref(root)) {
        if op.is_linked() {
            op.for_each_child(&mut |c| {
                if let Some(child) = c.child() {
                    debug_assert!(
                        child.is_linked(),
                        "linked operation holds an unlinked child"
                    );
                }
            });
        }
    }
}

#[cfg(not(debug_assertions))]
fn debug_assert_links_resolvable(_root: &Rc<AstOp>) {}

/// Decode the child-address slots of one argument record, skipping the
/// scalar fields. Mirrors the encoding in [`AstOp::link`].
pub(crate) fn decode_child_addresses(
    op: OpType,
    reader: &mut CodeReader<'_>,
) -> ProteanResult<Vec<u32>> {
    let mut children = Vec::new();
    match op {
        OpType::None => {}
        OpType::ScalarConstant => reader.skip(4)?,
        OpType::ColourConstant => reader.skip(16)?,
        OpType::StringConstant | OpType::ImageConstant | OpType::MeshConstant => reader.skip(4)?,
        OpType::Parameter => reader.skip(4)?,
        OpType::ColourFromScalars => {
            for _ in 0..4 {
                children.push(reader.read_u32()?);
            }
        }
        OpType::ColourArithmetic => {
            reader.skip(1)?;
            children.push(reader.read_u32()?);
            children.push(reader.read_u32()?);
        }
        OpType::ColourSampleImage => {
            for _ in 0..3 {
                children.push(reader.read_u32()?);
            }
        }
        OpType::ImageInvert | OpType::ImageLuminance => children.push(reader.read_u32()?),
        OpType::ImageSaturate => {
            children.push(reader.read_u32()?);
            children.push(reader.read_u32()?);
        }
        OpType::ImagePlainColour => {
            children.push(reader.read_u32()?);
            reader.skip(4)?;
        }
        OpType::ImageLayer => {
            for _ in 0..3 {
                children.push(reader.read_u32()?);
            }
            reader.skip(1)?;
        }
        OpType::ImageSwizzle => {
            reader.skip(1)?;
            for _ in 0..4 {
                children.push(reader.read_u32()?);
                reader.skip(1)?;
            }
        }
        OpType::ImageCompose => {
            for _ in 0..4 {
                children.push(reader.read_u32()?);
            }
            reader.skip(4)?;
        }
        OpType::MeshApplyPose | OpType::MeshClipDeform => {
            children.push(reader.read_u32()?);
            children.push(reader.read_u32()?);
        }
        OpType::MeshMorph => {
            for _ in 0..2 + MAX_MORPH_COUNT {
                children.push(reader.read_u32()?);
            }
        }
        OpType::MeshTransform => {
            children.push(reader.read_u32()?);
            reader.skip(16 * 4)?;
        }
        OpType::MeshExtractLayoutBlocks => {
            children.push(reader.read_u32()?);
            reader.skip(2)?;
            let count = reader.read_u16()? as usize;
            reader.skip(count * 4)?;
        }
        OpType::AddLod => {
            for _ in 0..MAX_ADD_COUNT {
                children.push(reader.read_u32()?);
            }
        }
    }
    Ok(children)
}
