use std::collections::HashMap;

use crate::foundation::error::{ProteanError, ProteanResult};
use crate::node::{
    AnyNode, ColourNode, ColourNodeRef, ImageNode, ImageNodeRef, MeshNode, MeshNodeRef,
    NodeCategory, RangeNode, RangeNodeRef, ScalarNode, ScalarNodeRef, StringNode, StringNodeRef,
};

// Child reference markers. Inline assigns the next stream-local id;
// back-references resolve against the ids assigned so far.
const MARKER_NULL: u8 = 0;
const MARKER_INLINE: u8 = 1;
const MARKER_BACKREF: u8 = 2;

/// Write-side binary archive for node graphs.
///
/// Primitives are little-endian; strings are u32-length-prefixed UTF-8.
/// Shared nodes are written once: later references collapse into
/// back-references keyed by a stream-local id.
#[derive(Debug, Default)]
pub struct OutputArchive {
    buf: Vec<u8>,
    ids_by_node: HashMap<usize, u32>,
}

impl OutputArchive {
    /// Create an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the archive, returning the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Append one byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Append a bool as one byte.
    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    /// Append a little-endian u16.
    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a little-endian u32.
    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a little-endian i32.
    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Append an f32 by bit pattern.
    pub fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    /// Append a length-prefixed UTF-8 string.
    pub fn write_str(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    /// Append a length-prefixed byte blob.
    pub fn write_bytes(&mut self, b: &[u8]) {
        self.write_u32(b.len() as u32);
        self.buf.extend_from_slice(b);
    }

    /// Append a length-prefixed list of strings.
    pub fn write_str_list(&mut self, list: &[String]) {
        self.write_u32(list.len() as u32);
        for s in list {
            self.write_str(s);
        }
    }

    /// Append a possibly-absent node reference of any category.
    pub fn write_node(&mut self, node: Option<&AnyNode>) {
        let Some(node) = node else {
            self.write_u8(MARKER_NULL);
            return;
        };
        if let Some(&id) = self.ids_by_node.get(&node.ptr_id()) {
            self.write_u8(MARKER_BACKREF);
            self.write_u32(id);
            return;
        }
        let id = self.ids_by_node.len() as u32;
        self.ids_by_node.insert(node.ptr_id(), id);
        self.write_u8(MARKER_INLINE);
        match node {
            AnyNode::Image(n) => ImageNode::serialise(n, self),
            AnyNode::Colour(n) => ColourNode::serialise(n, self),
            AnyNode::Mesh(n) => MeshNode::serialise(n, self),
            AnyNode::Scalar(n) => ScalarNode::serialise(n, self),
            AnyNode::String(n) => StringNode::serialise(n, self),
            AnyNode::Range(n) => RangeNode::serialise(n, self),
        }
    }

    /// Append a possibly-absent image reference.
    pub fn write_image(&mut self, node: &Option<ImageNodeRef>) {
        self.write_node(node.clone().map(AnyNode::Image).as_ref());
    }

    /// Append a possibly-absent colour reference.
    pub fn write_colour(&mut self, node: &Option<ColourNodeRef>) {
        self.write_node(node.clone().map(AnyNode::Colour).as_ref());
    }

    /// Append a possibly-absent mesh reference.
    pub fn write_mesh(&mut self, node: &Option<MeshNodeRef>) {
        self.write_node(node.clone().map(AnyNode::Mesh).as_ref());
    }

    /// Append a possibly-absent scalar reference.
    pub fn write_scalar(&mut self, node: &Option<ScalarNodeRef>) {
        self.write_node(node.clone().map(AnyNode::Scalar).as_ref());
    }

    /// Append a possibly-absent string reference.
    pub fn write_string_node(&mut self, node: &Option<StringNodeRef>) {
        self.write_node(node.clone().map(AnyNode::String).as_ref());
    }

    /// Append a possibly-absent range reference.
    pub fn write_range(&mut self, node: &Option<RangeNodeRef>) {
        self.write_node(node.clone().map(AnyNode::Range).as_ref());
    }
}

/// Read-side binary archive for node graphs.
#[derive(Debug)]
pub struct InputArchive<'a> {
    buf: &'a [u8],
    pos: usize,
    nodes_by_id: Vec<Option<AnyNode>>,
}

impl<'a> InputArchive<'a> {
    /// Wrap an encoded byte stream.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            nodes_by_id: Vec::new(),
        }
    }

    /// Return `true` once the whole stream has been consumed.
    pub fn is_at_end(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn take(&mut self, n: usize) -> ProteanResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| ProteanError::schema("archive truncated"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> ProteanResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a bool; bytes other than 0 and 1 are a schema error.
    pub fn read_bool(&mut self) -> ProteanResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProteanError::schema(format!(
                "invalid bool byte {other} in archive"
            ))),
        }
    }

    /// Read a little-endian u16.
    pub fn read_u16(&mut self) -> ProteanResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> ProteanResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a little-endian i32.
    pub fn read_i32(&mut self) -> ProteanResult<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read an f32 by bit pattern.
    pub fn read_f32(&mut self) -> ProteanResult<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> ProteanResult<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| ProteanError::schema("invalid UTF-8 in archive string"))
    }

    /// Read a length-prefixed byte blob.
    pub fn read_bytes(&mut self) -> ProteanResult<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Read a length-prefixed list of strings.
    pub fn read_str_list(&mut self) -> ProteanResult<Vec<String>> {
        let len = self.read_u32()? as usize;
        let mut list = Vec::with_capacity(len);
        for _ in 0..len {
            list.push(self.read_str()?);
        }
        Ok(list)
    }

    /// Read a node reference, requiring `expected` category.
    ///
    /// Restores sharing: a back-reference resolves to the instance
    /// decoded for that stream-local id earlier.
    pub fn read_node(&mut self, expected: NodeCategory) -> ProteanResult<Option<AnyNode>> {
        match self.read_u8()? {
            MARKER_NULL => Ok(None),
            MARKER_INLINE => {
                // Reserve the id before decoding the record: nested inline
                // children must get later ids, mirroring the writer.
                let id = self.nodes_by_id.len();
                self.nodes_by_id.push(None);
                let node = match expected {
                    NodeCategory::Image => AnyNode::Image(ImageNode::static_unserialise(self)?),
                    NodeCategory::Colour => AnyNode::Colour(ColourNode::static_unserialise(self)?),
                    NodeCategory::Mesh => AnyNode::Mesh(MeshNode::static_unserialise(self)?),
                    NodeCategory::Scalar => AnyNode::Scalar(ScalarNode::static_unserialise(self)?),
                    NodeCategory::String => AnyNode::String(StringNode::static_unserialise(self)?),
                    NodeCategory::Range => AnyNode::Range(RangeNode::static_unserialise(self)?),
                };
                self.nodes_by_id[id] = Some(node.clone());
                Ok(Some(node))
            }
            MARKER_BACKREF => {
                let id = self.read_u32()? as usize;
                let node = self
                    .nodes_by_id
                    .get(id)
                    .and_then(|n| n.clone())
                    .ok_or_else(|| {
                        ProteanError::schema(format!("back-reference to unknown node id {id}"))
                    })?;
                if node.category() != expected {
                    return Err(ProteanError::schema(format!(
                        "back-reference to a {:?} node where a {:?} node was expected",
                        node.category(),
                        expected
                    )));
                }
                Ok(Some(node))
            }
            other => Err(ProteanError::schema(format!(
                "invalid node reference marker {other}"
            ))),
        }
    }

    /// Read a possibly-absent image reference.
    pub fn read_image(&mut self) -> ProteanResult<Option<ImageNodeRef>> {
        Ok(self
            .read_node(NodeCategory::Image)?
            .and_then(|n| n.as_image()))
    }

    /// Read a possibly-absent colour reference.
    pub fn read_colour(&mut self) -> ProteanResult<Option<ColourNodeRef>> {
        Ok(self
            .read_node(NodeCategory::Colour)?
            .and_then(|n| n.as_colour()))
    }

    /// Read a possibly-absent mesh reference.
    pub fn read_mesh(&mut self) -> ProteanResult<Option<MeshNodeRef>> {
        Ok(self.read_node(NodeCategory::Mesh)?.and_then(|n| n.as_mesh()))
    }

    /// Read a possibly-absent scalar reference.
    pub fn read_scalar(&mut self) -> ProteanResult<Option<ScalarNodeRef>> {
        Ok(self
            .read_node(NodeCategory::Scalar)?
            .and_then(|n| n.as_scalar()))
    }

    /// Read a possibly-absent string reference.
    pub fn read_string_node(&mut self) -> ProteanResult<Option<StringNodeRef>> {
        Ok(self
            .read_node(NodeCategory::String)?
            .and_then(|n| n.as_string()))
    }

    /// Read a possibly-absent range reference.
    pub fn read_range(&mut self) -> ProteanResult<Option<RangeNodeRef>> {
        Ok(self
            .read_node(NodeCategory::Range)?
            .and_then(|n| n.as_range()))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/node/archive.rs"]
mod tests;
