/// Child edges between operations.
pub mod child;
/// Hash-consing deduplication pass.
pub mod dedup;
/// The link step: operations into address-indexed bytecode.
pub mod link;
/// Operation types and the graph protocol.
pub mod op;
/// The linked program and its encoding buffers.
pub mod program;

pub use self::child::AstChild;
pub use self::dedup::dedup_graph;
pub use self::link::{LinkerOptions, link_graph};
pub use self::op::{
    AstOp, ImageDesc, ImageDescContext, MAX_ADD_COUNT, MAX_MORPH_COUNT, OpData, OpType, RangeEdge,
    clone_graph, visit_post_order,
};
pub use self::program::{
    CODE_VERSION, Disassembly, DisassembledOp, EnumOptionDesc, ParameterDesc, ParameterType,
    ParameterValue, Program, RangeDesc,
};
