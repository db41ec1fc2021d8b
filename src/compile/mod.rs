/// The compilation pipeline driver.
pub mod compiler;
/// Lowering from node graphs to operation graphs.
pub mod lower;

pub use self::compiler::{Compiler, CompilerOptions};
