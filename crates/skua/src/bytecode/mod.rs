//! Bytecode layer: instruction set, emitter, compiler and program container.
//!
//! The compiler lowers a parsed program into a linear instruction stream
//! plus constant pool and source map; the VM in [`crate::vm`] executes it.

pub use codegen::compile;
pub use emitter::CodeEmitter;
pub use op::{Imm, Opcode};
pub use program::Program;

mod codegen;
mod emitter;
mod op;
mod program;
