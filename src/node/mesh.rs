use std::cell::RefCell;
use std::rc::Rc;

use crate::foundation::asset::Mesh;
use crate::foundation::error::{ProteanError, ProteanResult};
use crate::node::archive::{InputArchive, OutputArchive};
use crate::node::{
    AnyNode, MeshNodeRef, NodeCloneMap, ScalarNodeRef, assign_mesh, assign_scalar,
};

pub(crate) const KIND_COUNT: usize = 5;

const DISC_CONSTANT: u32 = 0;
const DISC_MORPH: u32 = 1;
const DISC_TRANSFORM: u32 = 2;
const DISC_CLIP_DEFORM: u32 = 3;
const DISC_APPLY_POSE: u32 = 4;

const CONTAINER_VERSION: u32 = 0;

/// Current version of the morph record. See [`unserialise_morph`] for the
/// compatibility branches of older versions.
const MORPH_VERSION: u32 = 3;

/// Concrete mesh node kinds.
#[derive(Debug)]
pub enum MeshKind {
    /// A constant mesh payload.
    Constant {
        /// The referenced mesh payload.
        mesh: Rc<Mesh>,
    },
    /// Blend one or more morph targets onto a base mesh.
    Morph {
        /// Blend weight selecting and scaling the morph targets.
        factor: Option<ScalarNodeRef>,
        /// Mesh to deform.
        base: Option<MeshNodeRef>,
        /// Morph target meshes, blended in order.
        morphs: Vec<Option<MeshNodeRef>>,
        /// Morph vertex indices are relative to the base mesh.
        vertex_indices_are_relative: bool,
        /// Deform the skeleton along with the vertices.
        reshape_skeleton: bool,
        /// Deform physics volumes along with the vertices.
        reshape_physics_volumes: bool,
        /// Deform every bone, ignoring `bones_to_deform`.
        deform_all_bones: bool,
        /// Deform every physics body, ignoring `physics_to_deform`.
        deform_all_physics: bool,
        /// Bones deformed when `deform_all_bones` is off.
        bones_to_deform: Vec<String>,
        /// Physics bodies deformed when `deform_all_physics` is off.
        physics_to_deform: Vec<String>,
    },
    /// Apply an affine transform to a mesh.
    Transform {
        /// Mesh to transform.
        source: Option<MeshNodeRef>,
        /// Column-major 4x4 transform matrix.
        transform: [f32; 16],
    },
    /// Clip a mesh with a closed clip shape, deforming the boundary.
    ClipDeform {
        /// Mesh to clip.
        base: Option<MeshNodeRef>,
        /// Closed mesh used as the clip shape.
        clip_shape: Option<MeshNodeRef>,
    },
    /// Apply a skeletal pose to a mesh.
    ApplyPose {
        /// Mesh to pose.
        base: Option<MeshNodeRef>,
        /// Mesh carrying the pose skeleton.
        pose: Option<MeshNodeRef>,
    },
}

/// A mesh-valued authoring node.
#[derive(Debug)]
pub struct MeshNode {
    kind: MeshKind,
}

impl MeshNode {
    /// Wrap a kind into a shared node handle.
    pub fn new(kind: MeshKind) -> MeshNodeRef {
        Rc::new(RefCell::new(Self { kind }))
    }

    /// Concrete kind of this node.
    pub fn kind(&self) -> &MeshKind {
        &self.kind
    }

    /// Mutable access to the concrete kind.
    pub fn kind_mut(&mut self) -> &mut MeshKind {
        &mut self.kind
    }

    /// Name of the concrete kind, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            MeshKind::Constant { .. } => "MeshConstant",
            MeshKind::Morph { .. } => "MeshMorph",
            MeshKind::Transform { .. } => "MeshTransform",
            MeshKind::ClipDeform { .. } => "MeshClipDeform",
            MeshKind::ApplyPose { .. } => "MeshApplyPose",
        }
    }

    /// Number of input slots, fixed per kind.
    ///
    /// Morph nodes expose the factor, the base, then one slot per morph
    /// target.
    pub fn input_count(&self) -> usize {
        match &self.kind {
            MeshKind::Constant { .. } => 0,
            MeshKind::Morph { morphs, .. } => 2 + morphs.len(),
            MeshKind::Transform { .. } => 1,
            MeshKind::ClipDeform { .. } => 2,
            MeshKind::ApplyPose { .. } => 2,
        }
    }

    /// Input node at slot `i`, or `None` when the slot is empty.
    pub fn input_node(&self, i: usize) -> Option<AnyNode> {
        if i >= self.input_count() {
            debug_assert!(false, "mesh input index {i} out of range");
            return None;
        }
        match (&self.kind, i) {
            (MeshKind::Morph { factor, .. }, 0) => factor.clone().map(AnyNode::Scalar),
            (MeshKind::Morph { base, .. }, 1) => base.clone().map(AnyNode::Mesh),
            (MeshKind::Morph { morphs, .. }, _) => morphs[i - 2].clone().map(AnyNode::Mesh),
            (MeshKind::Transform { source, .. }, 0) => source.clone().map(AnyNode::Mesh),
            (MeshKind::ClipDeform { base, .. }, 0) => base.clone().map(AnyNode::Mesh),
            (MeshKind::ClipDeform { clip_shape, .. }, 1) => clip_shape.clone().map(AnyNode::Mesh),
            (MeshKind::ApplyPose { base, .. }, 0) => base.clone().map(AnyNode::Mesh),
            (MeshKind::ApplyPose { pose, .. }, 1) => pose.clone().map(AnyNode::Mesh),
            _ => None,
        }
    }

    /// Install `node` into slot `i`.
    ///
    /// The node must match the slot's category; mismatches keep the
    /// previous value. Out-of-range indices are a programming error.
    pub fn set_input_node(&mut self, i: usize, node: Option<AnyNode>) {
        if i >= self.input_count() {
            debug_assert!(false, "mesh input index {i} out of range");
            return;
        }
        match (&mut self.kind, i) {
            (MeshKind::Morph { factor, .. }, 0) => assign_scalar(factor, node),
            (MeshKind::Morph { base, .. }, 1) => assign_mesh(base, node),
            (MeshKind::Morph { morphs, .. }, _) => assign_mesh(&mut morphs[i - 2], node),
            (MeshKind::Transform { source, .. }, 0) => assign_mesh(source, node),
            (MeshKind::ClipDeform { base, .. }, 0) => assign_mesh(base, node),
            (MeshKind::ClipDeform { clip_shape, .. }, 1) => assign_mesh(clip_shape, node),
            (MeshKind::ApplyPose { base, .. }, 0) => assign_mesh(base, node),
            (MeshKind::ApplyPose { pose, .. }, 1) => assign_mesh(pose, node),
            _ => {}
        }
    }

    /// Blend factor of a morph node; `None` for other kinds.
    pub fn morph_factor(&self) -> Option<ScalarNodeRef> {
        match &self.kind {
            MeshKind::Morph { factor, .. } => factor.clone(),
            _ => None,
        }
    }

    /// Set the blend factor of a morph node. No-op for other kinds.
    pub fn set_morph_factor(&mut self, node: Option<ScalarNodeRef>) {
        if let MeshKind::Morph { factor, .. } = &mut self.kind {
            *factor = node;
        }
    }

    /// Append a morph target slot to a morph node. No-op for other kinds.
    pub fn add_morph_target(&mut self, node: Option<MeshNodeRef>) {
        if let MeshKind::Morph { morphs, .. } = &mut self.kind {
            morphs.push(node);
        }
    }

    /// Write `node` with container version and discriminator.
    pub fn serialise(node: &MeshNodeRef, arch: &mut OutputArchive) {
        arch.write_u32(CONTAINER_VERSION);
        let guard = node.borrow();
        match guard.kind() {
            MeshKind::Constant { mesh } => {
                arch.write_u32(DISC_CONSTANT);
                arch.write_u32(0);
                write_mesh_payload(arch, mesh);
            }
            MeshKind::Morph {
                factor,
                base,
                morphs,
                vertex_indices_are_relative,
                reshape_skeleton,
                reshape_physics_volumes,
                deform_all_bones,
                deform_all_physics,
                bones_to_deform,
                physics_to_deform,
            } => {
                arch.write_u32(DISC_MORPH);
                arch.write_u32(MORPH_VERSION);
                arch.write_scalar(factor);
                arch.write_mesh(base);
                arch.write_u32(morphs.len() as u32);
                for m in morphs {
                    arch.write_mesh(m);
                }
                arch.write_bool(*vertex_indices_are_relative);
                arch.write_bool(*reshape_skeleton);
                arch.write_bool(*reshape_physics_volumes);
                arch.write_str_list(bones_to_deform);
                arch.write_bool(*deform_all_bones);
                arch.write_bool(*deform_all_physics);
                arch.write_str_list(physics_to_deform);
            }
            MeshKind::Transform { source, transform } => {
                arch.write_u32(DISC_TRANSFORM);
                arch.write_u32(0);
                arch.write_mesh(source);
                for v in transform {
                    arch.write_f32(*v);
                }
            }
            MeshKind::ClipDeform { base, clip_shape } => {
                arch.write_u32(DISC_CLIP_DEFORM);
                arch.write_u32(0);
                arch.write_mesh(base);
                arch.write_mesh(clip_shape);
            }
            MeshKind::ApplyPose { base, pose } => {
                arch.write_u32(DISC_APPLY_POSE);
                arch.write_u32(0);
                arch.write_mesh(base);
                arch.write_mesh(pose);
            }
        }
    }

    /// Read a node written by [`MeshNode::serialise`].
    ///
    /// Fails on unknown discriminators or unsupported versions.
    pub fn static_unserialise(arch: &mut InputArchive) -> ProteanResult<MeshNodeRef> {
        let ver = arch.read_u32()?;
        if ver != CONTAINER_VERSION {
            return Err(ProteanError::schema(format!(
                "unsupported mesh node container version {ver}"
            )));
        }
        let id = arch.read_u32()?;
        let unserialise = crate::node::registry::mesh_unserialiser(id)
            .ok_or_else(|| ProteanError::schema(format!("unknown mesh node discriminator {id}")))?;
        unserialise(arch)
    }
}

fn write_mesh_payload(arch: &mut OutputArchive, mesh: &Mesh) {
    arch.write_u32(mesh.positions.len() as u32);
    for p in &mesh.positions {
        arch.write_f32(p[0]);
        arch.write_f32(p[1]);
        arch.write_f32(p[2]);
    }
    arch.write_u32(mesh.indices.len() as u32);
    for i in &mesh.indices {
        arch.write_u32(*i);
    }
}

fn read_mesh_payload(arch: &mut InputArchive) -> ProteanResult<Mesh> {
    let position_count = arch.read_u32()? as usize;
    let mut positions = Vec::with_capacity(position_count);
    for _ in 0..position_count {
        positions.push([arch.read_f32()?, arch.read_f32()?, arch.read_f32()?]);
    }
    let index_count = arch.read_u32()? as usize;
    let mut indices = Vec::with_capacity(index_count);
    for _ in 0..index_count {
        indices.push(arch.read_u32()?);
    }
    Ok(Mesh { positions, indices })
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

pub(crate) fn unserialise_constant(arch: &mut InputArchive) -> ProteanResult<MeshNodeRef> {
    read_record_version(arch, 0, "mesh constant")?;
    let mesh = Rc::new(read_mesh_payload(arch)?);
    Ok(MeshNode::new(MeshKind::Constant { mesh }))
}

pub(crate) fn unserialise_morph(arch: &mut InputArchive) -> ProteanResult<MeshNodeRef> {
    let ver = read_record_version(arch, MORPH_VERSION, "mesh morph")?;

    let factor = arch.read_scalar()?;
    let base = arch.read_mesh()?;
    let morph_count = arch.read_u32()? as usize;
    let mut morphs = Vec::with_capacity(morph_count);
    for _ in 0..morph_count {
        morphs.push(arch.read_mesh()?);
    }
    let vertex_indices_are_relative = arch.read_bool()?;

    let mut reshape_skeleton = false;
    let mut reshape_physics_volumes = false;
    let mut bones_to_deform = Vec::new();
    if ver >= 2 {
        reshape_skeleton = arch.read_bool()?;
        reshape_physics_volumes = arch.read_bool()?;
        // Version 2 archives carry this flag twice; both bytes must be
        // consumed to stay aligned with the rest of the record.
        if ver == 2 {
            reshape_physics_volumes = arch.read_bool()?;
        }
        bones_to_deform = arch.read_str_list()?;
    }

    let mut deform_all_bones = false;
    let mut deform_all_physics = false;
    let mut physics_to_deform = Vec::new();
    if ver >= 3 {
        deform_all_bones = arch.read_bool()?;
        deform_all_physics = arch.read_bool()?;
        physics_to_deform = arch.read_str_list()?;
    }

    Ok(MeshNode::new(MeshKind::Morph {
        factor,
        base,
        morphs,
        vertex_indices_are_relative,
        reshape_skeleton,
        reshape_physics_volumes,
        deform_all_bones,
        deform_all_physics,
        bones_to_deform,
        physics_to_deform,
    }))
}

pub(crate) fn unserialise_transform(arch: &mut InputArchive) -> ProteanResult<MeshNodeRef> {
    read_record_version(arch, 0, "mesh transform")?;
    let source = arch.read_mesh()?;
    let mut transform = [0.0f32; 16];
    for v in &mut transform {
        *v = arch.read_f32()?;
    }
    Ok(MeshNode::new(MeshKind::Transform { source, transform }))
}

pub(crate) fn unserialise_clip_deform(arch: &mut InputArchive) -> ProteanResult<MeshNodeRef> {
    read_record_version(arch, 0, "mesh clip deform")?;
    let base = arch.read_mesh()?;
    let clip_shape = arch.read_mesh()?;
    Ok(MeshNode::new(MeshKind::ClipDeform { base, clip_shape }))
}

pub(crate) fn unserialise_apply_pose(arch: &mut InputArchive) -> ProteanResult<MeshNodeRef> {
    read_record_version(arch, 0, "mesh apply pose")?;
    let base = arch.read_mesh()?;
    let pose = arch.read_mesh()?;
    Ok(MeshNode::new(MeshKind::ApplyPose { base, pose }))
}

pub(crate) fn clone_mesh(node: &MeshNodeRef, map: &mut NodeCloneMap) -> MeshNodeRef {
    let key = Rc::as_ptr(node) as usize;
    if let Some(AnyNode::Mesh(existing)) = map.get(key) {
        return existing.clone();
    }
    let kind = {
        let guard = node.borrow();
        match guard.kind() {
            MeshKind::Constant { mesh } => MeshKind::Constant { mesh: mesh.clone() },
            MeshKind::Morph {
                factor,
                base,
                morphs,
                vertex_indices_are_relative,
                reshape_skeleton,
                reshape_physics_volumes,
                deform_all_bones,
                deform_all_physics,
                bones_to_deform,
                physics_to_deform,
            } => MeshKind::Morph {
                factor: factor
                    .as_ref()
                    .map(|n| crate::node::scalar::clone_scalar(n, map)),
                base: clone_opt_mesh(base, map),
                morphs: morphs.iter().map(|m| clone_opt_mesh(m, map)).collect(),
                vertex_indices_are_relative: *vertex_indices_are_relative,
                reshape_skeleton: *reshape_skeleton,
                reshape_physics_volumes: *reshape_physics_volumes,
                deform_all_bones: *deform_all_bones,
                deform_all_physics: *deform_all_physics,
                bones_to_deform: bones_to_deform.clone(),
                physics_to_deform: physics_to_deform.clone(),
            },
            MeshKind::Transform { source, transform } => MeshKind::Transform {
                source: clone_opt_mesh(source, map),
                transform: *transform,
            },
            MeshKind::ClipDeform { base, clip_shape } => MeshKind::ClipDeform {
                base: clone_opt_mesh(base, map),
                clip_shape: clone_opt_mesh(clip_shape, map),
            },
            MeshKind::ApplyPose { base, pose } => MeshKind::ApplyPose {
                base: clone_opt_mesh(base, map),
                pose: clone_opt_mesh(pose, map),
            },
        }
    };
    let clone = MeshNode::new(kind);
    map.insert(key, AnyNode::Mesh(clone.clone()));
    clone
}

fn clone_opt_mesh(node: &Option<MeshNodeRef>, map: &mut NodeCloneMap) -> Option<MeshNodeRef> {
    node.as_ref().map(|n| clone_mesh(n, map))
}
