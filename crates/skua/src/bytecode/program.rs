//! Compiler output: bytecode, constant pool and source map.

use std::collections::HashMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::{
    bytecode::op::{Imm, Opcode},
    lexer::Position,
};

/// A compiled program.
///
/// The byte stream holds `u16` opcodes, each optionally followed by a `u32`
/// or `f64` immediate (little-endian). Constants are deduplicated strings
/// referenced by 32-bit index. The source map records the source position of
/// pc sites that produce diagnostics (call sites, `new`, iteration entry).
/// The layout is internal and never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub filename: String,
    /// Original source text, held for `toString` and stack traces.
    pub source: String,
    pub constants: Vec<String>,
    pub code: Vec<u8>,
    pub source_map: HashMap<u32, Position>,
}

impl Program {
    pub fn constant(&self, index: u32) -> &str {
        &self.constants[index as usize]
    }

    pub fn lookup_position(&self, pc: u32) -> Option<Position> {
        self.source_map.get(&pc).copied()
    }

    /// Renders the bytecode as assembly text, one instruction per line.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let mut pc = 0usize;
        while pc + 2 <= self.code.len() {
            let at = pc;
            let raw = u16::from_le_bytes([self.code[pc], self.code[pc + 1]]);
            pc += 2;
            let Some(op) = Opcode::from_repr(raw) else {
                let _ = writeln!(out, "{at:6}  <bad opcode {raw}>");
                break;
            };
            match op.immediate() {
                Imm::None => {
                    let _ = writeln!(out, "{at:6}  {op}");
                }
                Imm::U32 => {
                    let value = u32::from_le_bytes(self.code[pc..pc + 4].try_into().expect("u32 immediate"));
                    pc += 4;
                    if uses_constant(op) {
                        let _ = writeln!(out, "{at:6}  {op} {value} ({:?})", self.constant(value));
                    } else {
                        let _ = writeln!(out, "{at:6}  {op} {value}");
                    }
                }
                Imm::F64 => {
                    let value = f64::from_le_bytes(self.code[pc..pc + 8].try_into().expect("f64 immediate"));
                    pc += 8;
                    let _ = writeln!(out, "{at:6}  {op} {value}");
                }
            }
        }
        out
    }
}

fn uses_constant(op: Opcode) -> bool {
    matches!(
        op,
        Opcode::LoadConst
            | Opcode::PushBigint
            | Opcode::PushRegex
            | Opcode::SetFuncName
            | Opcode::SetFuncSource
            | Opcode::SetClosure
            | Opcode::StoreConst
            | Opcode::Store
            | Opcode::Load
    )
}
