//! Host-facing value surface.
//!
//! Engine results convert into plain `Object` values for embedding and
//! tests: primitives map directly, arrays and objects convert their
//! contents recursively with a depth guard against cycles.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::{
    context::Context,
    error::RunResult,
    heap::CellId,
    value::{Entity, PromiseState, PropertyKind},
};

/// A host-side snapshot of an engine value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Object {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    BigInt(BigInt),
    Symbol(Option<String>),
    Array(Vec<Object>),
    /// Plain objects as ordered key/value pairs.
    Map(Vec<(String, Object)>),
    Function(String),
    Error {
        name: String,
        message: String,
    },
    Promise {
        state: String,
        value: Option<Box<Object>>,
    },
}

impl Object {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

/// Converts a cell into a host object. `depth` bounds recursion through
/// arrays and objects; deeper structure collapses to `Undefined`.
pub(crate) fn from_cell(ctx: &mut Context, cell: CellId, depth: usize) -> RunResult<Object> {
    if depth == 0 {
        return Ok(Object::Undefined);
    }
    let id = ctx.heap.resolve(cell);
    let object = match ctx.heap.entity(id) {
        Entity::Undefined | Entity::Uninitialized | Entity::Internal | Entity::Task(_) => Object::Undefined,
        Entity::Null => Object::Null,
        Entity::Boolean(value) => Object::Bool(*value),
        Entity::Number(value) => Object::Number(*value),
        Entity::NaN => Object::Number(f64::NAN),
        Entity::Infinity { negative } => Object::Number(if *negative {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        }),
        Entity::String(value) => Object::String(value.clone()),
        Entity::BigInt(value) => Object::BigInt(value.clone()),
        Entity::Symbol(symbol) => Object::Symbol(symbol.description.clone()),
        Entity::Function(function) => Object::Function(function.name.clone()),
        Entity::NativeFunction(native) => Object::Function(native.name.clone()),
        Entity::Exception(exception) => Object::Error {
            name: exception.kind.to_string(),
            message: exception.message.clone(),
        },
        Entity::Array(array) => {
            let items = array.items.clone();
            let mut converted = Vec::with_capacity(items.len());
            for item in items {
                converted.push(from_cell(ctx, item, depth - 1)?);
            }
            Object::Array(converted)
        }
        Entity::Argument(argument) => {
            let items = argument.items.clone();
            let mut converted = Vec::with_capacity(items.len());
            for item in items {
                converted.push(from_cell(ctx, item, depth - 1)?);
            }
            Object::Array(converted)
        }
        Entity::Promise(promise) => {
            let state = match promise.state {
                PromiseState::Pending => "pending",
                PromiseState::Fulfilled => "fulfilled",
                PromiseState::Rejected => "rejected",
            };
            let value = promise.value;
            let converted = match value {
                Some(value) => Some(Box::new(from_cell(ctx, value, depth - 1)?)),
                None => None,
            };
            Object::Promise {
                state: state.to_owned(),
                value: converted,
            }
        }
        Entity::Object(object) => {
            let entries: Vec<(String, CellId)> = object
                .properties
                .iter()
                .filter(|(_, property)| property.enumerable)
                .filter_map(|(key, property)| match &property.kind {
                    PropertyKind::Data { value, .. } => Some((key.clone(), *value)),
                    PropertyKind::Accessor { .. } => None,
                })
                .collect();
            let mut converted = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                converted.push((key, from_cell(ctx, value, depth - 1)?));
            }
            Object::Map(converted)
        }
        Entity::Ref(_) => Object::Undefined,
    };
    Ok(object)
}
