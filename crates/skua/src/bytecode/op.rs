//! Opcode definitions.
//!
//! Each instruction is a `u16` opcode optionally followed by one immediate:
//! a `u32` (constant index, pc target, count or flag) or an `f64` (number
//! literal), determined solely by the opcode. Encoding is little-endian.

use serde::{Deserialize, Serialize};
use strum::{Display, FromRepr, IntoStaticStr};

/// Immediate operand shape of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Imm {
    None,
    U32,
    F64,
}

/// The instruction set of the virtual machine.
#[repr(u16)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    // Stack and constant pushers.
    PushNull = 0,
    PushUndefined,
    PushTrue,
    PushFalse,
    PushUninitialized,
    /// `f64` immediate: push a number.
    Push,
    PushObject,
    PushArray,
    PushFunction,
    PushGenerator,
    PushArrow,
    PushThis,
    PushSuper,
    /// Constant index: push a bigint parsed from the pool string.
    PushBigint,
    /// Constant index: push a regex object from the pool source.
    PushRegex,
    /// Duplicate the element `k` positions from the top.
    PushValue,
    /// Constant index: push a string from the pool.
    LoadConst,

    // Function shaping; all operate on the function at TOS without popping.
    SetFuncAddress,
    SetFuncAsync,
    SetFuncName,
    SetFuncLen,
    SetFuncSource,
    /// Constant index: capture the named binding into the closure map.
    SetClosure,

    // Properties.
    SetField,
    GetField,
    GetKeys,
    /// `1` attaches a getter, `0` a setter.
    SetAccessor,
    Delete,
    Merge,

    // Regex flag setters; each consumes one boolean.
    SetRegexHasIndices,
    SetRegexGlobal,
    SetRegexIgnoreCases,
    SetRegexMultiline,
    SetRegexDotAll,
    SetRegexSticky,

    /// Pop `n` values.
    Pop,
    /// Constant index: initialize a const binding.
    StoreConst,
    /// Constant index: store into the nearest declared binding.
    Store,
    /// Constant index: load through the scope chain.
    Load,

    Ret,
    Throw,
    Yield,
    YieldDelegate,
    Await,

    Void,
    TypeOf,
    /// Construct with `n` arguments.
    New,

    PushScope,
    PopScope,

    /// Call with `n` arguments.
    Call,
    /// Method call with `n` arguments: receiver and key below the arguments.
    MemberCall,
    OptionalCall,
    MemberOptionalCall,

    // Jumps; the tested value is read, not popped.
    Jmp,
    Jtrue,
    Jfalse,
    /// Branch if null or undefined.
    Jnull,
    JnotNull,

    // Exceptions.
    /// Open an error frame with the catch pc.
    Try,
    /// Install a finally pc on the current error frame.
    Defer,
    EndDefer,
    EndTry,

    // Iteration driver.
    Next,
    RestArray,
    /// Pops `n` excluded keys, then builds the rest object.
    RestObject,

    // Arithmetic, comparison, logic.
    Pow,
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    /// `1` = postfix (push the old value), `0` = prefix (push the new one).
    Inc,
    Dec,
    Plus,
    Neta,
    Not,
    Lnot,
    Ushr,
    Shr,
    Shl,
    Ge,
    Le,
    Gt,
    Lt,
    Seq,
    Sne,
    Eq,
    Ne,
    And,
    Or,
    Xor,
    In,
    InstanceOf,
}

impl Opcode {
    /// The immediate shape following this opcode in the byte stream.
    pub fn immediate(self) -> Imm {
        match self {
            Self::Push => Imm::F64,
            Self::PushBigint
            | Self::PushRegex
            | Self::PushValue
            | Self::LoadConst
            | Self::SetFuncAddress
            | Self::SetFuncAsync
            | Self::SetFuncName
            | Self::SetFuncLen
            | Self::SetFuncSource
            | Self::SetClosure
            | Self::SetAccessor
            | Self::Pop
            | Self::StoreConst
            | Self::Store
            | Self::Load
            | Self::New
            | Self::Call
            | Self::MemberCall
            | Self::OptionalCall
            | Self::MemberOptionalCall
            | Self::Jmp
            | Self::Jtrue
            | Self::Jfalse
            | Self::Jnull
            | Self::JnotNull
            | Self::Try
            | Self::Defer
            | Self::RestObject
            | Self::Inc
            | Self::Dec => Imm::U32,
            _ => Imm::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trips_through_repr() {
        let op = Opcode::MemberCall;
        assert_eq!(Opcode::from_repr(op as u16), Some(op));
        assert_eq!(Opcode::from_repr(0), Some(Opcode::PushNull));
        assert_eq!(Opcode::from_repr(u16::MAX), None);
    }

    #[test]
    fn display_matches_assembly_names() {
        assert_eq!(Opcode::PushUndefined.to_string(), "PUSH_UNDEFINED");
        assert_eq!(Opcode::JnotNull.to_string(), "JNOT_NULL");
        assert_eq!(Opcode::InstanceOf.to_string(), "INSTANCE_OF");
    }
}
