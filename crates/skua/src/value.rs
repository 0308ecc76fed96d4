//! Entity kinds: the payloads owned by heap cells.
//!
//! An entity is a tagged variant rather than a class hierarchy. Object-like
//! payloads (objects, arrays, functions, symbols, promises, exceptions,
//! tasks) have identity: they live in exactly one cell, and every other
//! holder references that cell through the `Ref` arm. Primitive payloads are
//! copied on assignment. Pure per-kind operations (`typeof` names, kind
//! names) are a dispatch keyed on the tag.

use indexmap::IndexMap;
use num_bigint::BigInt;

use crate::{
    error::{ErrorKind, RunResult, StackFrame},
    heap::CellId,
    vm::Coroutine,
};

/// Host function callback: `(context, self, argv) -> value`.
///
/// Host functions may create cells only through the context, may raise typed
/// errors, and may read their bound self and closure map.
pub type NativeFn = fn(&mut crate::context::Context, CellId, &[CellId]) -> RunResult<CellId>;

/// A property is either a data slot or an accessor pair, plus the common
/// attribute flags.
#[derive(Debug, Clone)]
pub(crate) struct Property {
    pub configurable: bool,
    pub enumerable: bool,
    pub kind: PropertyKind,
}

#[derive(Debug, Clone)]
pub(crate) enum PropertyKind {
    Data { value: CellId, writable: bool },
    Accessor { get: Option<CellId>, set: Option<CellId> },
}

impl Property {
    pub fn data(value: CellId) -> Self {
        Self {
            configurable: true,
            enumerable: true,
            kind: PropertyKind::Data { value, writable: true },
        }
    }

    /// A non-enumerable data property, used for installed intrinsics.
    pub fn hidden(value: CellId) -> Self {
        Self {
            configurable: true,
            enumerable: false,
            kind: PropertyKind::Data { value, writable: true },
        }
    }

    /// The cells this property pins on the owning object.
    pub fn edges(&self) -> impl Iterator<Item = CellId> {
        let cells: smallvec::SmallVec<[CellId; 2]> = match &self.kind {
            PropertyKind::Data { value, .. } => smallvec::smallvec![*value],
            PropertyKind::Accessor { get, set } => get.iter().chain(set.iter()).copied().collect(),
        };
        cells.into_iter()
    }
}

/// Internal slot of an object: engine state invisible to scripts.
#[derive(Debug)]
pub(crate) enum InternalSlot {
    /// Suspension record backing a generator or async function object.
    Coroutine(Box<Coroutine>),
    /// State of a host-built iterator (`Array.prototype.values`,
    /// enumerable-key iteration).
    VecIter { items: Vec<CellId>, index: usize },
}

/// Shared shape of every object-like entity.
#[derive(Debug, Default)]
pub(crate) struct ObjectData {
    pub prototype: Option<CellId>,
    pub properties: IndexMap<String, Property>,
    pub symbol_properties: IndexMap<CellId, Property>,
    pub extensible: bool,
    pub sealed: bool,
    pub frozen: bool,
    pub internal: Option<InternalSlot>,
}

impl ObjectData {
    pub fn with_prototype(prototype: Option<CellId>) -> Self {
        Self {
            prototype,
            extensible: true,
            ..Self::default()
        }
    }

    /// Every cell referenced from this object's shape.
    pub fn edges(&self, out: &mut Vec<CellId>) {
        if let Some(prototype) = self.prototype {
            out.push(prototype);
        }
        for property in self.properties.values() {
            out.extend(property.edges());
        }
        for (key, property) in &self.symbol_properties {
            out.push(*key);
            out.extend(property.edges());
        }
        match &self.internal {
            Some(InternalSlot::VecIter { items, .. }) => out.extend(items.iter().copied()),
            Some(InternalSlot::Coroutine(coroutine)) => coroutine.edges(out),
            None => {}
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ArrayData {
    pub object: ObjectData,
    pub items: Vec<CellId>,
}

#[derive(Debug, Default)]
pub(crate) struct ArgumentData {
    pub object: ObjectData,
    pub items: Vec<CellId>,
}

#[derive(Debug)]
pub(crate) struct FunctionData {
    pub object: ObjectData,
    pub is_async: bool,
    pub is_generator: bool,
    pub is_arrow: bool,
    pub address: u32,
    pub length: u32,
    pub name: String,
    pub source: String,
    pub closure: IndexMap<String, CellId>,
    pub bound_self: Option<CellId>,
    pub program: std::rc::Rc<crate::bytecode::Program>,
}

#[derive(Debug)]
pub(crate) struct NativeFunctionData {
    pub object: ObjectData,
    pub callee: NativeFn,
    pub name: String,
    pub closure: IndexMap<String, CellId>,
    pub bound_self: Option<CellId>,
}

#[derive(Debug, Clone)]
pub(crate) struct ExceptionData {
    pub kind: ErrorKind,
    pub message: String,
    /// Call frames captured when the exception was created.
    pub frames: Vec<StackFrame>,
    /// The original thrown value when a non-exception was thrown.
    pub target: Option<CellId>,
}

/// Which suspension produced a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskKind {
    Yield,
    Await,
}

/// A suspension marker: the would-be-yielded value and the pc to resume at.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TaskData {
    pub value: CellId,
    pub resume: u32,
    pub kind: TaskKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

#[derive(Debug)]
pub(crate) struct PromiseData {
    pub object: ObjectData,
    pub state: PromiseState,
    pub value: Option<CellId>,
    pub on_fulfilled: Vec<CellId>,
    pub on_rejected: Vec<CellId>,
    pub on_finally: Vec<CellId>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SymbolData {
    pub description: Option<String>,
}

/// The kind-tagged payload of a cell.
#[derive(Debug)]
pub(crate) enum Entity {
    Undefined,
    Null,
    /// Temporal-dead-zone marker for `let`/`const` before initialization.
    Uninitialized,
    Boolean(bool),
    /// A finite number; non-finite values use the singleton kinds below.
    Number(f64),
    NaN,
    Infinity {
        negative: bool,
    },
    String(String),
    BigInt(BigInt),
    Symbol(SymbolData),
    Object(ObjectData),
    Array(ArrayData),
    Function(FunctionData),
    NativeFunction(NativeFunctionData),
    Exception(ExceptionData),
    Task(TaskData),
    Argument(ArgumentData),
    Promise(PromiseData),
    /// Root marker; reachability probes terminate on it.
    Internal,
    /// Reference to an identity cell. Never points at another `Ref`.
    Ref(CellId),
}

impl Entity {
    /// `typeof` result for this kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined | Self::Uninitialized => "undefined",
            Self::Null | Self::Object(_) | Self::Array(_) | Self::Argument(_) | Self::Promise(_)
            | Self::Exception(_) | Self::Task(_) | Self::Internal | Self::Ref(_) => "object",
            Self::Boolean(_) => "boolean",
            Self::Number(_) | Self::NaN | Self::Infinity { .. } => "number",
            Self::String(_) => "string",
            Self::BigInt(_) => "bigint",
            Self::Symbol(_) => "symbol",
            Self::Function(_) | Self::NativeFunction(_) => "function",
        }
    }

    /// Variant name for diagnostics and heap statistics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Uninitialized => "uninitialized",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::NaN => "nan",
            Self::Infinity { .. } => "infinity",
            Self::String(_) => "string",
            Self::BigInt(_) => "bigint",
            Self::Symbol(_) => "symbol",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Function(_) => "function",
            Self::NativeFunction(_) => "native-function",
            Self::Exception(_) => "exception",
            Self::Task(_) => "task",
            Self::Argument(_) => "argument",
            Self::Promise(_) => "promise",
            Self::Internal => "internal",
            Self::Ref(_) => "ref",
        }
    }

    /// Whether this payload has identity (lives in exactly one cell).
    pub fn is_identity(&self) -> bool {
        matches!(
            self,
            Self::Symbol(_)
                | Self::Object(_)
                | Self::Array(_)
                | Self::Function(_)
                | Self::NativeFunction(_)
                | Self::Exception(_)
                | Self::Task(_)
                | Self::Argument(_)
                | Self::Promise(_)
        )
    }

    /// Every cell this entity references, used to rebuild liveness edges on
    /// whole-entity replacement and on destruction.
    pub fn edges(&self, out: &mut Vec<CellId>) {
        match self {
            Self::Ref(target) => out.push(*target),
            Self::Object(object) => object.edges(out),
            Self::Array(array) => {
                array.object.edges(out);
                out.extend(array.items.iter().copied());
            }
            Self::Argument(argument) => {
                argument.object.edges(out);
                out.extend(argument.items.iter().copied());
            }
            Self::Function(function) => {
                function.object.edges(out);
                out.extend(function.closure.values().copied());
                out.extend(function.bound_self);
            }
            Self::NativeFunction(native) => {
                native.object.edges(out);
                out.extend(native.closure.values().copied());
                out.extend(native.bound_self);
            }
            Self::Exception(exception) => out.extend(exception.target),
            Self::Task(task) => out.push(task.value),
            Self::Promise(promise) => {
                promise.object.edges(out);
                out.extend(promise.value);
                out.extend(promise.on_fulfilled.iter().copied());
                out.extend(promise.on_rejected.iter().copied());
                out.extend(promise.on_finally.iter().copied());
            }
            _ => {}
        }
    }

    /// Mutable access to the object shape of an object-like entity.
    pub fn object_data_mut(&mut self) -> Option<&mut ObjectData> {
        match self {
            Self::Object(object) => Some(object),
            Self::Array(array) => Some(&mut array.object),
            Self::Argument(argument) => Some(&mut argument.object),
            Self::Function(function) => Some(&mut function.object),
            Self::NativeFunction(native) => Some(&mut native.object),
            Self::Promise(promise) => Some(&mut promise.object),
            _ => None,
        }
    }

    pub fn object_data(&self) -> Option<&ObjectData> {
        match self {
            Self::Object(object) => Some(object),
            Self::Array(array) => Some(&array.object),
            Self::Argument(argument) => Some(&argument.object),
            Self::Function(function) => Some(&function.object),
            Self::NativeFunction(native) => Some(&native.object),
            Self::Promise(promise) => Some(&promise.object),
            _ => None,
        }
    }
}

/// ECMAScript number-to-string: integral values print without a fraction,
/// everything else uses the shortest round-trip form.
pub(crate) fn number_to_string(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_owned();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-Infinity" } else { "Infinity" }.to_owned();
    }
    if value == 0.0 {
        return "0".to_owned();
    }
    if value.fract() == 0.0 && value.abs() < 1e21 {
        return format!("{value:.0}");
    }
    let mut buffer = ryu::Buffer::new();
    let repr = buffer.format(value).to_owned();
    // ryu prints `1e21`; the language wants `1e+21`.
    if let Some(pos) = repr.find('e')
        && !repr[pos + 1..].starts_with('-')
    {
        return format!("{}e+{}", &repr[..pos], &repr[pos + 1..]);
    }
    repr
}

/// ECMAScript string-to-number: trimmed decimal or `0x`/`0o` forms; empty
/// strings are zero and anything else is NaN.
pub(crate) fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |v| v as f64);
    }
    if let Some(oct) = trimmed.strip_prefix("0o").or_else(|| trimmed.strip_prefix("0O")) {
        return u64::from_str_radix(oct, 8).map_or(f64::NAN, |v| v as f64);
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_formatting_matches_the_language() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(1.5), "1.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1e20), "100000000000000000000");
    }

    #[test]
    fn string_coercion_accepts_radix_prefixes() {
        assert_eq!(string_to_number("  42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x10"), 16.0);
        assert_eq!(string_to_number("0o17"), 15.0);
        assert!(string_to_number("4n2").is_nan());
    }

    #[test]
    fn typeof_dispatch_table() {
        assert_eq!(Entity::Null.type_name(), "object");
        assert_eq!(Entity::NaN.type_name(), "number");
        assert_eq!(Entity::Symbol(SymbolData::default()).type_name(), "symbol");
    }
}
