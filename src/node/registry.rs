use crate::foundation::error::ProteanResult;
use crate::node::archive::InputArchive;
use crate::node::{
    ColourNodeRef, ImageNodeRef, MeshNodeRef, NodeCategory, RangeNodeRef, ScalarNodeRef,
    StringNodeRef, colour, image, mesh, range, scalar, string,
};

/// Function decoding one concrete node record from an archive.
pub type Unserialiser<T> = fn(&mut InputArchive) -> ProteanResult<T>;

// Table position is the stream discriminator: entries must never be
// reordered, only appended.
const IMAGE_TABLE: &[Unserialiser<ImageNodeRef>] = &[
    image::unserialise_constant,
    image::unserialise_invert,
    image::unserialise_saturate,
    image::unserialise_luminance,
    image::unserialise_plain_colour,
    image::unserialise_layer,
    image::unserialise_swizzle,
];

const COLOUR_TABLE: &[Unserialiser<ColourNodeRef>] = &[
    colour::unserialise_constant,
    colour::unserialise_parameter,
    colour::unserialise_sample_image,
    colour::unserialise_from_scalars,
    colour::unserialise_arithmetic,
];

const MESH_TABLE: &[Unserialiser<MeshNodeRef>] = &[
    mesh::unserialise_constant,
    mesh::unserialise_morph,
    mesh::unserialise_transform,
    mesh::unserialise_clip_deform,
    mesh::unserialise_apply_pose,
];

const SCALAR_TABLE: &[Unserialiser<ScalarNodeRef>] = &[
    scalar::unserialise_constant,
    scalar::unserialise_parameter,
    scalar::unserialise_enum_parameter,
];

const STRING_TABLE: &[Unserialiser<StringNodeRef>] =
    &[string::unserialise_constant, string::unserialise_parameter];

const RANGE_TABLE: &[Unserialiser<RangeNodeRef>] = &[range::unserialise_from_scalar];

pub(crate) fn image_unserialiser(id: u32) -> Option<Unserialiser<ImageNodeRef>> {
    IMAGE_TABLE.get(id as usize).copied()
}

pub(crate) fn colour_unserialiser(id: u32) -> Option<Unserialiser<ColourNodeRef>> {
    COLOUR_TABLE.get(id as usize).copied()
}

pub(crate) fn mesh_unserialiser(id: u32) -> Option<Unserialiser<MeshNodeRef>> {
    MESH_TABLE.get(id as usize).copied()
}

pub(crate) fn scalar_unserialiser(id: u32) -> Option<Unserialiser<ScalarNodeRef>> {
    SCALAR_TABLE.get(id as usize).copied()
}

pub(crate) fn string_unserialiser(id: u32) -> Option<Unserialiser<StringNodeRef>> {
    STRING_TABLE.get(id as usize).copied()
}

pub(crate) fn range_unserialiser(id: u32) -> Option<Unserialiser<RangeNodeRef>> {
    RANGE_TABLE.get(id as usize).copied()
}

/// Display name of a node category.
pub fn category_name(category: NodeCategory) -> &'static str {
    match category {
        NodeCategory::Image => "NodeImage",
        NodeCategory::Colour => "NodeColour",
        NodeCategory::Mesh => "NodeMesh",
        NodeCategory::Scalar => "NodeScalar",
        NodeCategory::String => "NodeString",
        NodeCategory::Range => "NodeRange",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Every kind of every category must have a registered unserialiser;
    // a table that falls out of sync with its kind enum corrupts the
    // discriminator space.
    #[test]
    fn every_kind_has_a_registered_unserialiser() {
        assert_eq!(IMAGE_TABLE.len(), image::KIND_COUNT);
        assert_eq!(COLOUR_TABLE.len(), colour::KIND_COUNT);
        assert_eq!(MESH_TABLE.len(), mesh::KIND_COUNT);
        assert_eq!(SCALAR_TABLE.len(), scalar::KIND_COUNT);
        assert_eq!(STRING_TABLE.len(), string::KIND_COUNT);
        assert_eq!(RANGE_TABLE.len(), range::KIND_COUNT);
    }

    #[test]
    fn unknown_discriminators_have_no_handler() {
        assert!(image_unserialiser(image::KIND_COUNT as u32).is_none());
        assert!(colour_unserialiser(u32::MAX).is_none());
        assert!(range_unserialiser(1).is_none());
    }

    #[test]
    fn category_names_are_distinct() {
        let names = [
            category_name(NodeCategory::Image),
            category_name(NodeCategory::Colour),
            category_name(NodeCategory::Mesh),
            category_name(NodeCategory::Scalar),
            category_name(NodeCategory::String),
            category_name(NodeCategory::Range),
        ];
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
