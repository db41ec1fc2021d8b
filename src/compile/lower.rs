use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::child::AstChild;
use crate::ast::op::{AstOp, OpData, RangeEdge};
use crate::ast::program::{EnumOptionDesc, ParameterDesc, ParameterType, ParameterValue};
use crate::node::{
    AnyNode, ColourKind, ColourNodeRef, ImageKind, ImageNodeRef, MeshKind, MeshNodeRef, RangeKind,
    RangeNodeRef, ScalarKind, ScalarNodeRef, StringKind, StringNodeRef,
};

/// Per-compile lowering state.
///
/// Memoizes node to operation so that node-level sharing becomes
/// op-level sharing: a node feeding several parents lowers to one
/// operation instance, before any dedup pass runs.
#[derive(Default)]
pub(crate) struct LowerContext {
    lowered: HashMap<usize, Rc<AstOp>>,
}

impl LowerContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn memo<T>(&self, node: &Rc<T>) -> Option<Rc<AstOp>> {
        self.lowered.get(&(Rc::as_ptr(node) as usize)).cloned()
    }

    fn remember<T>(&mut self, node: &Rc<T>, op: Rc<AstOp>) -> Rc<AstOp> {
        self.lowered.insert(Rc::as_ptr(node) as usize, op.clone());
        op
    }
}

pub(crate) fn lower_node(node: &AnyNode, ctx: &mut LowerContext) -> Rc<AstOp> {
    match node {
        AnyNode::Image(n) => lower_image(n, ctx),
        AnyNode::Colour(n) => lower_colour(n, ctx),
        AnyNode::Mesh(n) => lower_mesh(n, ctx),
        AnyNode::Scalar(n) => lower_scalar(n, ctx),
        AnyNode::String(n) => lower_string(n, ctx),
        // A bare range has no value of its own; it lowers to the scalar
        // computing its size.
        AnyNode::Range(n) => lower_range_size(n, ctx),
    }
}

pub(crate) fn lower_image(node: &ImageNodeRef, ctx: &mut LowerContext) -> Rc<AstOp> {
    if let Some(op) = ctx.memo(node) {
        return op;
    }
    let data = {
        let guard = node.borrow();
        match guard.kind() {
            ImageKind::Constant { image } => OpData::ImageConstant {
                image: image.clone(),
            },
            ImageKind::Invert { base } => OpData::ImageInvert {
                base: lower_opt_image(base, ctx),
            },
            ImageKind::Saturate { base, factor } => OpData::ImageSaturate {
                base: lower_opt_image(base, ctx),
                factor: lower_opt_scalar(factor, ctx),
            },
            ImageKind::Luminance { base } => OpData::ImageLuminance {
                base: lower_opt_image(base, ctx),
            },
            ImageKind::PlainColour { colour, size } => OpData::ImagePlainColour {
                colour: lower_opt_colour(colour, ctx),
                size: *size,
            },
            ImageKind::Layer {
                base,
                mask,
                blended,
                blend_type,
            } => OpData::ImageLayer {
                base: lower_opt_image(base, ctx),
                mask: lower_opt_image(mask, ctx),
                blended: lower_opt_image(blended, ctx),
                blend_type: *blend_type,
            },
            ImageKind::Swizzle {
                format,
                sources,
                source_channels,
            } => OpData::ImageSwizzle {
                format: *format,
                sources: [
                    lower_opt_image(&sources[0], ctx),
                    lower_opt_image(&sources[1], ctx),
                    lower_opt_image(&sources[2], ctx),
                    lower_opt_image(&sources[3], ctx),
                ],
                source_channels: *source_channels,
            },
        }
    };
    ctx.remember(node, AstOp::new(data))
}

pub(crate) fn lower_colour(node: &ColourNodeRef, ctx: &mut LowerContext) -> Rc<AstOp> {
    if let Some(op) = ctx.memo(node) {
        return op;
    }
    let data = {
        let guard = node.borrow();
        match guard.kind() {
            ColourKind::Constant { value } => OpData::ColourConstant { value: *value },
            ColourKind::Parameter {
                name,
                uid,
                default_value,
            } => OpData::Parameter {
                parameter: ParameterDesc {
                    name: name.clone(),
                    uid: uid.clone(),
                    param_type: ParameterType::Colour,
                    default_value: ParameterValue::Colour(*default_value),
                    possible_values: Vec::new(),
                    ranges: Vec::new(),
                },
                ranges: Vec::new(),
            },
            ColourKind::SampleImage { image, x, y } => OpData::ColourSampleImage {
                image: lower_opt_image(image, ctx),
                x: lower_opt_scalar(x, ctx),
                y: lower_opt_scalar(y, ctx),
            },
            ColourKind::FromScalars { x, y, z, w } => OpData::ColourFromScalars {
                x: lower_opt_scalar(x, ctx),
                y: lower_opt_scalar(y, ctx),
                z: lower_opt_scalar(z, ctx),
                w: lower_opt_scalar(w, ctx),
            },
            ColourKind::Arithmetic { op, a, b } => OpData::ColourArithmetic {
                op: *op,
                a: lower_opt_colour(a, ctx),
                b: lower_opt_colour(b, ctx),
            },
        }
    };
    ctx.remember(node, AstOp::new(data))
}

pub(crate) fn lower_mesh(node: &MeshNodeRef, ctx: &mut LowerContext) -> Rc<AstOp> {
    if let Some(op) = ctx.memo(node) {
        return op;
    }
    let data = {
        let guard = node.borrow();
        match guard.kind() {
            MeshKind::Constant { mesh } => OpData::MeshConstant { mesh: mesh.clone() },
            MeshKind::Morph {
                factor,
                base,
                morphs,
                ..
            } => OpData::MeshMorph {
                factor: lower_opt_scalar(factor, ctx),
                base: lower_opt_mesh(base, ctx),
                targets: morphs.iter().map(|m| lower_opt_mesh(m, ctx)).collect(),
            },
            MeshKind::Transform { source, transform } => OpData::MeshTransform {
                source: lower_opt_mesh(source, ctx),
                transform: *transform,
            },
            MeshKind::ClipDeform { base, clip_shape } => OpData::MeshClipDeform {
                mesh: lower_opt_mesh(base, ctx),
                clip_shape: lower_opt_mesh(clip_shape, ctx),
            },
            MeshKind::ApplyPose { base, pose } => OpData::MeshApplyPose {
                base: lower_opt_mesh(base, ctx),
                pose: lower_opt_mesh(pose, ctx),
            },
        }
    };
    ctx.remember(node, AstOp::new(data))
}

pub(crate) fn lower_scalar(node: &ScalarNodeRef, ctx: &mut LowerContext) -> Rc<AstOp> {
    if let Some(op) = ctx.memo(node) {
        return op;
    }
    let data = {
        let guard = node.borrow();
        match guard.kind() {
            ScalarKind::Constant { value } => OpData::ScalarConstant { value: *value },
            ScalarKind::Parameter {
                name,
                uid,
                default_value,
                ranges,
            } => OpData::Parameter {
                parameter: ParameterDesc {
                    name: name.clone(),
                    uid: uid.clone(),
                    param_type: ParameterType::Scalar,
                    default_value: ParameterValue::Scalar(*default_value),
                    possible_values: Vec::new(),
                    ranges: Vec::new(),
                },
                ranges: ranges.iter().map(|r| lower_range_edge(r, ctx)).collect(),
            },
            ScalarKind::EnumParameter {
                name,
                uid,
                default_value,
                options,
            } => OpData::Parameter {
                parameter: ParameterDesc {
                    name: name.clone(),
                    uid: uid.clone(),
                    param_type: ParameterType::Int,
                    default_value: ParameterValue::Int(*default_value),
                    possible_values: options
                        .iter()
                        .map(|o| EnumOptionDesc {
                            name: o.name.clone(),
                            value: o.value,
                        })
                        .collect(),
                    ranges: Vec::new(),
                },
                ranges: Vec::new(),
            },
        }
    };
    ctx.remember(node, AstOp::new(data))
}

pub(crate) fn lower_string(node: &StringNodeRef, ctx: &mut LowerContext) -> Rc<AstOp> {
    if let Some(op) = ctx.memo(node) {
        return op;
    }
    let data = {
        let guard = node.borrow();
        match guard.kind() {
            StringKind::Constant { value } => OpData::StringConstant {
                value: value.clone(),
            },
            StringKind::Parameter {
                name,
                uid,
                default_value,
            } => OpData::Parameter {
                parameter: ParameterDesc {
                    name: name.clone(),
                    uid: uid.clone(),
                    param_type: ParameterType::String,
                    default_value: ParameterValue::String(default_value.clone()),
                    possible_values: Vec::new(),
                    ranges: Vec::new(),
                },
                ranges: Vec::new(),
            },
        }
    };
    ctx.remember(node, AstOp::new(data))
}

fn lower_range_edge(node: &RangeNodeRef, ctx: &mut LowerContext) -> RangeEdge {
    let guard = node.borrow();
    match guard.kind() {
        RangeKind::FromScalar { size, name } => RangeEdge {
            size: size
                .as_ref()
                .map(|s| AstChild::new(lower_scalar(s, ctx)))
                .unwrap_or_default(),
            name: name.clone(),
        },
    }
}

fn lower_range_size(node: &RangeNodeRef, ctx: &mut LowerContext) -> Rc<AstOp> {
    let edge = lower_range_edge(node, ctx);
    edge.size
        .child()
        .cloned()
        .unwrap_or_else(|| AstOp::new(OpData::ScalarConstant { value: 0.0 }))
}

fn lower_opt_image(node: &Option<ImageNodeRef>, ctx: &mut LowerContext) -> AstChild {
    node.as_ref()
        .map(|n| AstChild::new(lower_image(n, ctx)))
        .unwrap_or_default()
}

fn lower_opt_colour(node: &Option<ColourNodeRef>, ctx: &mut LowerContext) -> AstChild {
    node.as_ref()
        .map(|n| AstChild::new(lower_colour(n, ctx)))
        .unwrap_or_default()
}

fn lower_opt_mesh(node: &Option<MeshNodeRef>, ctx: &mut LowerContext) -> AstChild {
    node.as_ref()
        .map(|n| AstChild::new(lower_mesh(n, ctx)))
        .unwrap_or_default()
}

fn lower_opt_scalar(node: &Option<ScalarNodeRef>, ctx: &mut LowerContext) -> AstChild {
    node.as_ref()
        .map(|n| AstChild::new(lower_scalar(n, ctx)))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::op::OpType;
    use crate::node::{ImageKind, ImageNode, ScalarNode};

    #[test]
    fn shared_nodes_lower_to_one_operation() {
        let factor = ScalarNode::constant(0.5);
        let base = ImageNode::new(ImageKind::PlainColour {
            colour: None,
            size: [8, 8],
        });
        // The same base feeds two different image adjustments.
        let left = ImageNode::new(ImageKind::Saturate {
            base: Some(base.clone()),
            factor: Some(factor),
        });
        let right = ImageNode::new(ImageKind::Invert {
            base: Some(base),
        });

        let mut ctx = LowerContext::new();
        let left_op = lower_image(&left, &mut ctx);
        let right_op = lower_image(&right, &mut ctx);

        let left_base = match left_op.data() {
            crate::ast::op::OpData::ImageSaturate { base, .. } => {
                base.child().expect("base lowered").clone()
            }
            other => panic!("unexpected payload {other:?}"),
        };
        let right_base = match right_op.data() {
            crate::ast::op::OpData::ImageInvert { base } => {
                base.child().expect("base lowered").clone()
            }
            other => panic!("unexpected payload {other:?}"),
        };
        assert!(std::rc::Rc::ptr_eq(&left_base, &right_base));
    }

    #[test]
    fn enum_parameter_lowers_to_int_parameter_op() {
        let node = ScalarNode::new(ScalarKind::EnumParameter {
            name: "eyes".into(),
            uid: "uid-eyes".into(),
            default_value: 1,
            options: vec![
                crate::node::EnumOption {
                    name: "round".into(),
                    value: 0,
                },
                crate::node::EnumOption {
                    name: "narrow".into(),
                    value: 1,
                },
            ],
        });
        let mut ctx = LowerContext::new();
        let op = lower_scalar(&node, &mut ctx);
        assert_eq!(op.op_type(), OpType::Parameter);
        match op.data() {
            OpData::Parameter { parameter, .. } => {
                assert_eq!(parameter.param_type, ParameterType::Int);
                assert_eq!(parameter.possible_values.len(), 2);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
