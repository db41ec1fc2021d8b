use std::rc::Rc;

use crate::ast::dedup::dedup_graph;
use crate::ast::link::{LinkerOptions, link_graph};
use crate::ast::op::{AstOp, OpData};
use crate::ast::program::Program;
use crate::compile::lower::{LowerContext, lower_mesh, lower_node};
use crate::foundation::error::{ProteanError, ProteanResult};
use crate::node::{AnyNode, MeshNodeRef};

/// Options controlling a [`Compiler`].
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Run the structural dedup pass before linking. On by default;
    /// turning it off links the lowered graph as-is, which keeps
    /// node-level sharing but not structural deduplication.
    pub optimize: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self { optimize: true }
    }
}

/// Compiles authored node graphs into linked bytecode programs.
#[derive(Debug, Default)]
pub struct Compiler {
    options: CompilerOptions,
}

impl Compiler {
    /// Create a compiler with `options`.
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    /// Compile a single-root node graph into a program.
    #[tracing::instrument(skip(self, root))]
    pub fn compile(&self, root: &AnyNode) -> ProteanResult<Program> {
        let mut ctx = LowerContext::new();
        let op_root = lower_node(root, &mut ctx);
        self.compile_ops(op_root)
    }

    /// Compile mesh roots as successive levels of detail, combined by a
    /// single add-LOD operation. `lods[0]` is the finest level.
    #[tracing::instrument(skip(self, lods))]
    pub fn compile_lods(&self, lods: &[MeshNodeRef]) -> ProteanResult<Program> {
        if lods.is_empty() {
            return Err(ProteanError::validation(
                "compile_lods requires at least one level of detail",
            ));
        }
        let mut ctx = LowerContext::new();
        let lowered = lods
            .iter()
            .map(|lod| lower_mesh(lod, &mut ctx).into())
            .collect();
        self.compile_ops(AstOp::new(OpData::AddLod { lods: lowered }))
    }

    fn compile_ops(&self, root: Rc<AstOp>) -> ProteanResult<Program> {
        let root = if self.options.optimize {
            dedup_graph(&root)
        } else {
            root
        };

        let mut program = Program::new();
        let root_address = link_graph(&root, &mut program, &LinkerOptions::default());
        program.set_root(root_address);
        tracing::debug!(
            ops = program.op_count(),
            bytes = program.byte_code().len(),
            parameters = program.parameters().len(),
            "linked program"
        );
        Ok(program)
    }
}
