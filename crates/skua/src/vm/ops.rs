//! Value operations: coercions, property access and the arithmetic,
//! comparison and bitwise groups, per the ECMAScript abstract operations
//! with number/string/BigInt rules and NaN propagation.

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::{
    bytecode::Opcode,
    context::Context,
    error::{ErrorKind, RunError, RunResult},
    heap::CellId,
    value::{
        Entity, ExceptionData, InternalSlot, ObjectData, Property, PropertyKind, number_to_string,
        string_to_number,
    },
    vm::call,
};

/// A resolved property key: a string or a symbol identity cell.
#[derive(Debug, Clone)]
pub(crate) enum PropKey {
    String(String),
    Symbol(CellId),
}

pub(crate) fn to_property_key(ctx: &mut Context, key: CellId) -> RunResult<PropKey> {
    let id = ctx.heap.resolve(key);
    if matches!(ctx.heap.entity(id), Entity::Symbol(_)) {
        return Ok(PropKey::Symbol(id));
    }
    Ok(PropKey::String(to_string_value(ctx, key)?))
}

/// Numeric value of a cell: a double or an arbitrary-precision integer.
#[derive(Debug, Clone)]
pub(crate) enum Numeric {
    Number(f64),
    BigInt(BigInt),
}

// ---- coercions ----

pub(crate) fn to_boolean(ctx: &Context, cell: CellId) -> bool {
    let id = ctx.heap.resolve(cell);
    match ctx.heap.entity(id) {
        Entity::Undefined | Entity::Null | Entity::Uninitialized | Entity::NaN => false,
        Entity::Boolean(value) => *value,
        Entity::Number(value) => *value != 0.0,
        Entity::String(value) => !value.is_empty(),
        Entity::BigInt(value) => !value.is_zero(),
        _ => true,
    }
}

pub(crate) fn to_number(ctx: &mut Context, cell: CellId) -> RunResult<f64> {
    let id = ctx.heap.resolve(cell);
    match ctx.heap.entity(id) {
        Entity::Undefined | Entity::Uninitialized => Ok(f64::NAN),
        Entity::Null => Ok(0.0),
        Entity::Boolean(value) => Ok(f64::from(*value)),
        Entity::Number(value) => Ok(*value),
        Entity::NaN => Ok(f64::NAN),
        Entity::Infinity { negative } => Ok(if *negative { f64::NEG_INFINITY } else { f64::INFINITY }),
        Entity::String(value) => Ok(string_to_number(value)),
        Entity::BigInt(_) => Err(RunError::type_error("Cannot convert a BigInt value to a number")),
        Entity::Symbol(_) => Err(RunError::type_error("Cannot convert a Symbol value to a number")),
        Entity::Array(array) => match array.items.len() {
            0 => Ok(0.0),
            1 => {
                let item = array.items[0];
                to_number(ctx, item)
            }
            _ => Ok(f64::NAN),
        },
        _ => Ok(f64::NAN),
    }
}

pub(crate) fn to_numeric(ctx: &mut Context, cell: CellId) -> RunResult<Numeric> {
    let id = ctx.heap.resolve(cell);
    if let Entity::BigInt(value) = ctx.heap.entity(id) {
        return Ok(Numeric::BigInt(value.clone()));
    }
    Ok(Numeric::Number(to_number(ctx, cell)?))
}

/// Rendered string value; symbols refuse implicit coercion.
pub(crate) fn to_string_value(ctx: &mut Context, cell: CellId) -> RunResult<String> {
    let id = ctx.heap.resolve(cell);
    match ctx.heap.entity(id) {
        Entity::Undefined | Entity::Uninitialized => Ok("undefined".to_owned()),
        Entity::Null => Ok("null".to_owned()),
        Entity::Boolean(value) => Ok(value.to_string()),
        Entity::Number(value) => Ok(number_to_string(*value)),
        Entity::NaN => Ok("NaN".to_owned()),
        Entity::Infinity { negative } => Ok(if *negative { "-Infinity" } else { "Infinity" }.to_owned()),
        Entity::String(value) => Ok(value.clone()),
        Entity::BigInt(value) => Ok(value.to_string()),
        Entity::Symbol(_) => Err(RunError::type_error("Cannot convert a Symbol value to a string")),
        Entity::Array(array) => {
            let items = array.items.clone();
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                let resolved = ctx.heap.resolve(item);
                if matches!(ctx.heap.entity(resolved), Entity::Undefined | Entity::Null) {
                    parts.push(String::new());
                } else {
                    parts.push(to_string_value(ctx, item)?);
                }
            }
            Ok(parts.join(","))
        }
        Entity::Function(function) => Ok(function.source.clone()),
        Entity::NativeFunction(native) => Ok(format!("function {}() {{ [native code] }}", native.name)),
        Entity::Exception(exception) => Ok(format!("{}: {}", exception.kind, exception.message)),
        Entity::Object(object) => {
            // Prefer an explicit error shape (own message, name possibly on
            // the prototype) over the generic tag.
            if let Some(message) = property_value(object, "message") {
                let name = chain_data_property(ctx, id, "name");
                if let Some(name) = name {
                    let name = to_string_value(ctx, name)?;
                    let message = to_string_value(ctx, message)?;
                    if message.is_empty() {
                        return Ok(name);
                    }
                    return Ok(format!("{name}: {message}"));
                }
            }
            Ok("[object Object]".to_owned())
        }
        _ => Ok("[object Object]".to_owned()),
    }
}

fn property_value(object: &ObjectData, key: &str) -> Option<CellId> {
    match &object.properties.get(key)?.kind {
        PropertyKind::Data { value, .. } => Some(*value),
        PropertyKind::Accessor { .. } => None,
    }
}

/// Data-property lookup along the prototype chain without invoking any
/// accessors; used by rendering paths that must not re-enter the VM.
fn chain_data_property(ctx: &Context, start: CellId, key: &str) -> Option<CellId> {
    let mut current = start;
    for _ in 0..64 {
        let data = ctx.heap.entity(current).object_data()?;
        if let Some(value) = property_value(data, key) {
            return Some(value);
        }
        current = data.prototype?;
    }
    None
}

/// A storeable snapshot of a value: identity kinds resolve to their identity
/// cell, primitives are copied into a fresh cell. This keeps structures
/// (properties, items, closures) from aliasing variable cells.
pub(crate) fn reify(ctx: &mut Context, cell: CellId) -> RunResult<CellId> {
    let id = ctx.heap.resolve(cell);
    if ctx.heap.entity(id).is_identity() {
        return Ok(id);
    }
    let shared = ctx.heap.share(id);
    ctx.create_value(shared)
}

pub(crate) fn is_nullish(ctx: &Context, cell: CellId) -> bool {
    let id = ctx.heap.resolve(cell);
    matches!(ctx.heap.entity(id), Entity::Undefined | Entity::Null | Entity::Uninitialized)
}

pub(crate) fn is_callable(ctx: &Context, cell: CellId) -> bool {
    let id = ctx.heap.resolve(cell);
    matches!(ctx.heap.entity(id), Entity::Function(_) | Entity::NativeFunction(_))
}

pub(crate) fn is_object_like(ctx: &Context, cell: CellId) -> bool {
    let id = ctx.heap.resolve(cell);
    matches!(
        ctx.heap.entity(id),
        Entity::Object(_)
            | Entity::Array(_)
            | Entity::Argument(_)
            | Entity::Function(_)
            | Entity::NativeFunction(_)
            | Entity::Promise(_)
    )
}

// ---- property access ----

/// `GET_FIELD`: reads a property through the prototype chain, invoking
/// accessors against the original receiver.
pub(crate) fn get_property(ctx: &mut Context, object: CellId, key: CellId) -> RunResult<CellId> {
    let receiver = ctx.heap.resolve(object);
    let key = to_property_key(ctx, key)?;
    get_property_by_key(ctx, receiver, &key)
}

pub(crate) fn get_property_by_key(ctx: &mut Context, object: CellId, key: &PropKey) -> RunResult<CellId> {
    let receiver = ctx.heap.resolve(object);
    match ctx.heap.entity(receiver) {
        Entity::Undefined | Entity::Null | Entity::Uninitialized => {
            let rendered = match key {
                PropKey::String(name) => name.clone(),
                PropKey::Symbol(_) => "Symbol()".to_owned(),
            };
            Err(RunError::type_error(format!(
                "Cannot read properties of undefined (reading '{rendered}')"
            )))
        }
        Entity::String(value) => {
            if let PropKey::String(name) = key {
                if name == "length" {
                    let length = value.chars().count() as f64;
                    return ctx.number(length);
                }
                if let Ok(index) = name.parse::<usize>() {
                    let ch = value.chars().nth(index);
                    return match ch {
                        Some(ch) => ctx.string(ch.to_string()),
                        None => Ok(ctx.undefined()),
                    };
                }
            }
            let prototype = ctx.intrinsics.string_prototype;
            lookup_chain(ctx, prototype, receiver, key)
        }
        Entity::Symbol(symbol) => {
            if let PropKey::String(name) = key
                && name == "description"
            {
                return match symbol.description.clone() {
                    Some(description) => ctx.string(description),
                    None => Ok(ctx.undefined()),
                };
            }
            Ok(ctx.undefined())
        }
        Entity::Array(array) => {
            if let PropKey::String(name) = key {
                if name == "length" {
                    let length = array.items.len() as f64;
                    return ctx.number(length);
                }
                if let Ok(index) = name.parse::<usize>() {
                    return Ok(array.items.get(index).copied().unwrap_or(ctx.undefined()));
                }
            }
            lookup_chain(ctx, receiver, receiver, key)
        }
        Entity::Argument(argument) => {
            if let PropKey::String(name) = key {
                if name == "length" {
                    let length = argument.items.len() as f64;
                    return ctx.number(length);
                }
                if let Ok(index) = name.parse::<usize>() {
                    return Ok(argument.items.get(index).copied().unwrap_or(ctx.undefined()));
                }
            }
            lookup_chain(ctx, receiver, receiver, key)
        }
        Entity::Function(function) => {
            if let PropKey::String(name) = key {
                match name.as_str() {
                    "name" => {
                        let name = function.name.clone();
                        return ctx.string(name);
                    }
                    "length" => {
                        let length = f64::from(function.length);
                        return ctx.number(length);
                    }
                    _ => {}
                }
            }
            lookup_chain(ctx, receiver, receiver, key)
        }
        Entity::NativeFunction(native) => {
            if let PropKey::String(name) = key
                && name == "name"
            {
                let name = native.name.clone();
                return ctx.string(name);
            }
            lookup_chain(ctx, receiver, receiver, key)
        }
        Entity::Exception(exception) => {
            if let PropKey::String(name) = key {
                match name.as_str() {
                    "name" => {
                        let name = exception.kind.to_string();
                        return ctx.string(name);
                    }
                    "message" => {
                        let message = exception.message.clone();
                        return ctx.string(message);
                    }
                    _ => {}
                }
            }
            Ok(ctx.undefined())
        }
        Entity::Object(_) | Entity::Promise(_) => lookup_chain(ctx, receiver, receiver, key),
        _ => Ok(ctx.undefined()),
    }
}

/// Walks the prototype chain starting at `start`, binding accessor calls to
/// `receiver`.
fn lookup_chain(ctx: &mut Context, start: CellId, receiver: CellId, key: &PropKey) -> RunResult<CellId> {
    if let PropKey::String(name) = key
        && name == "__proto__"
    {
        let data = ctx.heap.entity(start).object_data();
        return Ok(data.and_then(|d| d.prototype).unwrap_or(ctx.null()));
    }
    let mut current = start;
    let mut guard = 0;
    loop {
        guard += 1;
        if guard > 1024 {
            return Err(RunError::internal("prototype chain too deep"));
        }
        let Some(data) = ctx.heap.entity(current).object_data() else {
            return Ok(ctx.undefined());
        };
        let found = match key {
            PropKey::String(name) => data.properties.get(name.as_str()).cloned(),
            PropKey::Symbol(symbol) => data.symbol_properties.get(symbol).cloned(),
        };
        if let Some(property) = found {
            return match property.kind {
                PropertyKind::Data { value, .. } => Ok(value),
                PropertyKind::Accessor { get: Some(getter), .. } => {
                    call::apply_simple(ctx, getter, receiver, Vec::new())
                }
                PropertyKind::Accessor { get: None, .. } => Ok(ctx.undefined()),
            };
        }
        match data.prototype {
            Some(prototype) => current = prototype,
            None => return Ok(ctx.undefined()),
        }
    }
}

/// `SET_FIELD`: writes an own property, honoring `__proto__`, array
/// indices, setters on the chain and the frozen/sealed bits.
pub(crate) fn set_property(ctx: &mut Context, object: CellId, key: CellId, value: CellId) -> RunResult<()> {
    let target = ctx.heap.resolve(object);
    let key = to_property_key(ctx, key)?;
    set_property_by_key(ctx, target, &key, value)
}

pub(crate) fn set_property_by_key(
    ctx: &mut Context,
    object: CellId,
    key: &PropKey,
    value: CellId,
) -> RunResult<()> {
    let target = ctx.heap.resolve(object);
    let value = reify(ctx, value)?;

    if let PropKey::String(name) = key
        && name == "__proto__"
    {
        let new_prototype = if is_nullish(ctx, value) {
            None
        } else {
            Some(ctx.heap.resolve(value))
        };
        let old = ctx
            .heap
            .entity(target)
            .object_data()
            .and_then(|data| data.prototype);
        if let Some(data) = ctx.heap.entity_mut(target).object_data_mut() {
            data.prototype = new_prototype;
        } else {
            return Ok(());
        }
        if let Some(old) = old {
            ctx.heap.unlink(target, old);
        }
        if let Some(new) = new_prototype {
            ctx.heap.link(target, new);
        }
        return Ok(());
    }

    // Array element and length writes.
    if let Entity::Array(array) = ctx.heap.entity(target)
        && let PropKey::String(name) = key
    {
        if name == "length" {
            let new_length = to_number(ctx, value)? as usize;
            let Entity::Array(array) = ctx.heap.entity_mut(target) else {
                unreachable!("checked above");
            };
            let removed: Vec<CellId> = array.items.drain(new_length.min(array.items.len())..).collect();
            for item in removed {
                ctx.heap.unlink(target, item);
            }
            return Ok(());
        }
        if let Ok(index) = name.parse::<usize>() {
            let length = array.items.len();
            let undefined = ctx.undefined();
            let Entity::Array(array) = ctx.heap.entity_mut(target) else {
                unreachable!("checked above");
            };
            if index >= length {
                array.items.resize(index + 1, undefined);
                for _ in length..=index {
                    ctx.heap.link(target, undefined);
                }
            }
            let Entity::Array(array) = ctx.heap.entity_mut(target) else {
                unreachable!("checked above");
            };
            let old = std::mem::replace(&mut array.items[index], value);
            ctx.heap.unlink(target, old);
            ctx.heap.link(target, value);
            return Ok(());
        }
    }

    // A setter anywhere on the chain wins.
    if let Some(setter) = find_setter(ctx, target, key) {
        call::apply_simple(ctx, setter, target, vec![value])?;
        return Ok(());
    }

    let Some(data) = ctx.heap.entity(target).object_data() else {
        // Property writes on primitives are silently dropped.
        return Ok(());
    };
    if data.frozen || (data.sealed && !has_own(data, key)) {
        return Ok(());
    }
    let replaced = insert_property(ctx, target, key, Property::data(value));
    for old in replaced {
        ctx.heap.unlink(target, old);
    }
    ctx.heap.link(target, value);
    if let PropKey::Symbol(symbol) = key {
        ctx.heap.link(target, *symbol);
    }
    Ok(())
}

fn has_own(data: &ObjectData, key: &PropKey) -> bool {
    match key {
        PropKey::String(name) => data.properties.contains_key(name.as_str()),
        PropKey::Symbol(symbol) => data.symbol_properties.contains_key(symbol),
    }
}

/// Inserts a property, returning the cells pinned by the replaced one.
fn insert_property(ctx: &mut Context, target: CellId, key: &PropKey, property: Property) -> Vec<CellId> {
    let Some(data) = ctx.heap.entity_mut(target).object_data_mut() else {
        return Vec::new();
    };
    let replaced = match key {
        PropKey::String(name) => data.properties.insert(name.clone(), property),
        PropKey::Symbol(symbol) => data.symbol_properties.insert(*symbol, property),
    };
    replaced.map(|p| p.edges().collect()).unwrap_or_default()
}

fn find_setter(ctx: &Context, start: CellId, key: &PropKey) -> Option<CellId> {
    let mut current = start;
    let mut guard = 0;
    loop {
        guard += 1;
        if guard > 1024 {
            return None;
        }
        let data = ctx.heap.entity(current).object_data()?;
        let found = match key {
            PropKey::String(name) => data.properties.get(name.as_str()),
            PropKey::Symbol(symbol) => data.symbol_properties.get(symbol),
        };
        if let Some(property) = found {
            return match &property.kind {
                PropertyKind::Accessor { set, .. } => *set,
                PropertyKind::Data { .. } => None,
            };
        }
        current = data.prototype?;
    }
}

/// `SET_ACCESSOR`: attaches a getter (`is_getter`) or setter to an own
/// property, replacing any data slot.
pub(crate) fn set_accessor(
    ctx: &mut Context,
    object: CellId,
    key: CellId,
    accessor: CellId,
    is_getter: bool,
) -> RunResult<()> {
    let target = ctx.heap.resolve(object);
    let key = to_property_key(ctx, key)?;
    let accessor = ctx.heap.resolve(accessor);

    let existing = {
        let Some(data) = ctx.heap.entity(target).object_data() else {
            return Err(RunError::type_error("Cannot define an accessor on a non-object"));
        };
        match &key {
            PropKey::String(name) => data.properties.get(name.as_str()).cloned(),
            PropKey::Symbol(symbol) => data.symbol_properties.get(symbol).cloned(),
        }
    };
    let (mut get, mut set, old_edges) = match existing {
        Some(property) => {
            let edges: Vec<CellId> = property.edges().collect();
            match property.kind {
                PropertyKind::Accessor { get, set } => (get, set, Vec::new()),
                PropertyKind::Data { .. } => (None, None, edges),
            }
        }
        None => (None, None, Vec::new()),
    };
    if is_getter {
        get = Some(accessor);
    } else {
        set = Some(accessor);
    }
    let property = Property {
        configurable: true,
        enumerable: true,
        kind: PropertyKind::Accessor { get, set },
    };
    insert_property(ctx, target, &key, property);
    for old in old_edges {
        ctx.heap.unlink(target, old);
    }
    ctx.heap.link(target, accessor);
    if let PropKey::Symbol(symbol) = key {
        ctx.heap.link(target, symbol);
    }
    Ok(())
}

/// `DELETE`: removes an own property, pushing whether it succeeded.
pub(crate) fn delete_property(ctx: &mut Context, object: CellId, key: CellId) -> RunResult<bool> {
    let target = ctx.heap.resolve(object);
    let key = to_property_key(ctx, key)?;
    if let Entity::Array(_) = ctx.heap.entity(target)
        && let PropKey::String(name) = &key
        && let Ok(index) = name.parse::<usize>()
    {
        let Entity::Array(array) = ctx.heap.entity_mut(target) else {
            unreachable!("checked above");
        };
        if index < array.items.len() {
            let undefined = ctx.undefined();
            let Entity::Array(array) = ctx.heap.entity_mut(target) else {
                unreachable!("checked above");
            };
            let old = std::mem::replace(&mut array.items[index], undefined);
            ctx.heap.unlink(target, old);
            ctx.heap.link(target, undefined);
        }
        return Ok(true);
    }
    let Some(data) = ctx.heap.entity_mut(target).object_data_mut() else {
        return Ok(true);
    };
    if data.frozen || data.sealed {
        return Ok(false);
    }
    let removed = match &key {
        PropKey::String(name) => data.properties.shift_remove(name.as_str()),
        PropKey::Symbol(symbol) => data.symbol_properties.shift_remove(symbol),
    };
    if let Some(property) = removed {
        let edges: Vec<CellId> = property.edges().collect();
        for edge in edges {
            ctx.heap.unlink(target, edge);
        }
        if let PropKey::Symbol(symbol) = key {
            ctx.heap.unlink(target, symbol);
        }
        Ok(true)
    } else {
        Ok(true)
    }
}

/// Own enumerable string keys, in insertion order (array and argument
/// indices first).
pub(crate) fn own_enumerable_keys(ctx: &Context, object: CellId) -> Vec<String> {
    let target = ctx.heap.resolve(object);
    let mut keys = Vec::new();
    match ctx.heap.entity(target) {
        Entity::Array(array) => {
            keys.extend((0..array.items.len()).map(|i| i.to_string()));
        }
        Entity::Argument(argument) => {
            keys.extend((0..argument.items.len()).map(|i| i.to_string()));
        }
        Entity::String(value) => {
            keys.extend((0..value.chars().count()).map(|i| i.to_string()));
        }
        _ => {}
    }
    if let Some(data) = ctx.heap.entity(target).object_data() {
        for (name, property) in &data.properties {
            if property.enumerable {
                keys.push(name.clone());
            }
        }
    }
    keys
}

/// Installs a non-enumerable data property; the installer idiom of the host
/// layer.
pub(crate) fn define_hidden(ctx: &mut Context, object: CellId, name: &str, value: CellId) {
    let target = ctx.heap.resolve(object);
    let replaced = insert_property(ctx, target, &PropKey::String(name.to_owned()), Property::hidden(value));
    for old in replaced {
        ctx.heap.unlink(target, old);
    }
    ctx.heap.link(target, value);
}

pub(crate) fn define_hidden_symbol(ctx: &mut Context, object: CellId, symbol: CellId, value: CellId) {
    let target = ctx.heap.resolve(object);
    let replaced = insert_property(ctx, target, &PropKey::Symbol(symbol), Property::hidden(value));
    for old in replaced {
        ctx.heap.unlink(target, old);
    }
    ctx.heap.link(target, value);
    ctx.heap.link(target, symbol);
}

// ---- equality and relational operators ----

/// Strict equality: identity for object-likes, value equality for
/// primitives, NaN never equal to anything.
pub(crate) fn strict_equals(ctx: &Context, left: CellId, right: CellId) -> bool {
    let a = ctx.heap.resolve(left);
    let b = ctx.heap.resolve(right);
    match (ctx.heap.entity(a), ctx.heap.entity(b)) {
        (Entity::Undefined | Entity::Uninitialized, Entity::Undefined | Entity::Uninitialized) => true,
        (Entity::Null, Entity::Null) => true,
        (Entity::Boolean(x), Entity::Boolean(y)) => x == y,
        (Entity::Number(x), Entity::Number(y)) => x == y,
        (Entity::Infinity { negative: x }, Entity::Infinity { negative: y }) => x == y,
        (Entity::NaN, _) | (_, Entity::NaN) => false,
        (Entity::String(x), Entity::String(y)) => x == y,
        (Entity::BigInt(x), Entity::BigInt(y)) => x == y,
        _ => a == b,
    }
}

/// Loose equality with the cross-type coercions of the language.
pub(crate) fn loose_equals(ctx: &mut Context, left: CellId, right: CellId) -> RunResult<bool> {
    let a = ctx.heap.resolve(left);
    let b = ctx.heap.resolve(right);
    let a_nullish = matches!(ctx.heap.entity(a), Entity::Undefined | Entity::Null | Entity::Uninitialized);
    let b_nullish = matches!(ctx.heap.entity(b), Entity::Undefined | Entity::Null | Entity::Uninitialized);
    if a_nullish || b_nullish {
        return Ok(a_nullish && b_nullish);
    }
    let same_family = matches!(
        (ctx.heap.entity(a), ctx.heap.entity(b)),
        (Entity::String(_), Entity::String(_))
            | (Entity::Boolean(_), Entity::Boolean(_))
            | (Entity::BigInt(_), Entity::BigInt(_))
            | (Entity::Symbol(_), Entity::Symbol(_))
    );
    let both_objects = is_object_like(ctx, a) && is_object_like(ctx, b);
    if same_family || both_objects {
        return Ok(strict_equals(ctx, a, b));
    }
    let a_number_like = matches!(
        ctx.heap.entity(a),
        Entity::Number(_) | Entity::NaN | Entity::Infinity { .. }
    );
    let b_number_like = matches!(
        ctx.heap.entity(b),
        Entity::Number(_) | Entity::NaN | Entity::Infinity { .. }
    );
    if a_number_like && b_number_like {
        return Ok(strict_equals(ctx, a, b));
    }
    // BigInt against number or numeric string.
    if let Entity::BigInt(value) = ctx.heap.entity(a) {
        let value = value.clone();
        let other = to_number(ctx, b).unwrap_or(f64::NAN);
        return Ok(bigint_equals_number(&value, other));
    }
    if let Entity::BigInt(value) = ctx.heap.entity(b) {
        let value = value.clone();
        let other = to_number(ctx, a).unwrap_or(f64::NAN);
        return Ok(bigint_equals_number(&value, other));
    }
    // Everything else funnels through numbers, objects through ToPrimitive.
    let x = if is_object_like(ctx, a) {
        string_to_number(&to_string_value(ctx, a)?)
    } else {
        to_number(ctx, a)?
    };
    let y = if is_object_like(ctx, b) {
        string_to_number(&to_string_value(ctx, b)?)
    } else {
        to_number(ctx, b)?
    };
    Ok(x == y)
}

fn bigint_equals_number(value: &BigInt, other: f64) -> bool {
    if other.is_nan() || other.is_infinite() || other.fract() != 0.0 {
        return false;
    }
    BigInt::from(other as i64) == *value
}

// ---- binary operator dispatch ----

pub(crate) fn binary(ctx: &mut Context, op: Opcode, left: CellId, right: CellId) -> RunResult<CellId> {
    match op {
        Opcode::Add => add(ctx, left, right),
        Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod | Opcode::Pow => {
            numeric_binary(ctx, op, left, right)
        }
        Opcode::Shl | Opcode::Shr | Opcode::Ushr | Opcode::And | Opcode::Or | Opcode::Xor => {
            bitwise_binary(ctx, op, left, right)
        }
        Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => relational(ctx, op, left, right),
        Opcode::Seq => {
            let result = strict_equals(ctx, left, right);
            ctx.boolean(result)
        }
        Opcode::Sne => {
            let result = !strict_equals(ctx, left, right);
            ctx.boolean(result)
        }
        Opcode::Eq => {
            let result = loose_equals(ctx, left, right)?;
            ctx.boolean(result)
        }
        Opcode::Ne => {
            let result = !loose_equals(ctx, left, right)?;
            ctx.boolean(result)
        }
        Opcode::In => {
            let result = has_property(ctx, right, left)?;
            ctx.boolean(result)
        }
        Opcode::InstanceOf => {
            let result = instance_of(ctx, left, right)?;
            ctx.boolean(result)
        }
        _ => Err(RunError::internal(format!("not a binary opcode: {op}"))),
    }
}

/// `+`: string concatenation when either primitive side is a string,
/// BigInt addition for two BigInts, numeric addition otherwise.
fn add(ctx: &mut Context, left: CellId, right: CellId) -> RunResult<CellId> {
    let a = ctx.heap.resolve(left);
    let b = ctx.heap.resolve(right);
    let a_string = matches!(ctx.heap.entity(a), Entity::String(_)) || is_object_like(ctx, a);
    let b_string = matches!(ctx.heap.entity(b), Entity::String(_)) || is_object_like(ctx, b);
    if a_string || b_string {
        // Objects convert through their string form here.
        let lhs = to_string_or_number_repr(ctx, a)?;
        let rhs = to_string_or_number_repr(ctx, b)?;
        if let (Repr::Number(x), Repr::Number(y)) = (&lhs, &rhs) {
            return ctx.number(x + y);
        }
        let value = format!("{}{}", lhs.into_string(), rhs.into_string());
        return ctx.string(value);
    }
    match (to_numeric(ctx, a)?, to_numeric(ctx, b)?) {
        (Numeric::BigInt(x), Numeric::BigInt(y)) => ctx.create_value(Entity::BigInt(x + y)),
        (Numeric::Number(x), Numeric::Number(y)) => ctx.number(x + y),
        _ => Err(RunError::type_error("Cannot mix BigInt and other types, use explicit conversions")),
    }
}

enum Repr {
    String(String),
    Number(f64),
}

impl Repr {
    fn into_string(self) -> String {
        match self {
            Self::String(value) => value,
            Self::Number(value) => number_to_string(value),
        }
    }
}

fn to_string_or_number_repr(ctx: &mut Context, cell: CellId) -> RunResult<Repr> {
    let id = ctx.heap.resolve(cell);
    match ctx.heap.entity(id) {
        Entity::String(_) => Ok(Repr::String(to_string_value(ctx, id)?)),
        Entity::Object(_) | Entity::Array(_) | Entity::Function(_) | Entity::NativeFunction(_) => {
            Ok(Repr::String(to_string_value(ctx, id)?))
        }
        Entity::BigInt(value) => Ok(Repr::String(value.to_string())),
        _ => Ok(Repr::Number(to_number(ctx, id)?)),
    }
}

fn numeric_binary(ctx: &mut Context, op: Opcode, left: CellId, right: CellId) -> RunResult<CellId> {
    match (to_numeric(ctx, left)?, to_numeric(ctx, right)?) {
        (Numeric::BigInt(x), Numeric::BigInt(y)) => {
            let value = match op {
                Opcode::Sub => x - y,
                Opcode::Mul => x * y,
                Opcode::Div => {
                    if y.is_zero() {
                        return Err(RunError::range_error("Division by zero"));
                    }
                    x / y
                }
                Opcode::Mod => {
                    if y.is_zero() {
                        return Err(RunError::range_error("Division by zero"));
                    }
                    x % y
                }
                Opcode::Pow => {
                    let exponent = y
                        .to_u32()
                        .ok_or_else(|| RunError::range_error("Exponent must be non-negative"))?;
                    x.pow(exponent)
                }
                _ => unreachable!("numeric opcodes only"),
            };
            ctx.create_value(Entity::BigInt(value))
        }
        (Numeric::Number(x), Numeric::Number(y)) => {
            let value = match op {
                Opcode::Sub => x - y,
                Opcode::Mul => x * y,
                Opcode::Div => x / y,
                Opcode::Mod => {
                    // ECMAScript remainder keeps the dividend's sign.
                    if y == 0.0 { f64::NAN } else { x % y }
                }
                Opcode::Pow => x.powf(y),
                _ => unreachable!("numeric opcodes only"),
            };
            ctx.number(value)
        }
        _ => Err(RunError::type_error("Cannot mix BigInt and other types, use explicit conversions")),
    }
}

fn bitwise_binary(ctx: &mut Context, op: Opcode, left: CellId, right: CellId) -> RunResult<CellId> {
    match (to_numeric(ctx, left)?, to_numeric(ctx, right)?) {
        (Numeric::BigInt(x), Numeric::BigInt(y)) => {
            let value = match op {
                Opcode::And => x & y,
                Opcode::Or => x | y,
                Opcode::Xor => x ^ y,
                Opcode::Shl => {
                    let shift = y.to_u64().ok_or_else(|| RunError::range_error("Invalid shift count"))?;
                    x << shift
                }
                Opcode::Shr => {
                    let shift = y.to_u64().ok_or_else(|| RunError::range_error("Invalid shift count"))?;
                    x >> shift
                }
                Opcode::Ushr => {
                    return Err(RunError::type_error("BigInts have no unsigned right shift"));
                }
                _ => unreachable!("bitwise opcodes only"),
            };
            ctx.create_value(Entity::BigInt(value))
        }
        (Numeric::Number(x), Numeric::Number(y)) => {
            let value = match op {
                Opcode::And => f64::from(to_int32(x) & to_int32(y)),
                Opcode::Or => f64::from(to_int32(x) | to_int32(y)),
                Opcode::Xor => f64::from(to_int32(x) ^ to_int32(y)),
                Opcode::Shl => f64::from(to_int32(x).wrapping_shl(to_uint32(y) & 31)),
                Opcode::Shr => f64::from(to_int32(x).wrapping_shr(to_uint32(y) & 31)),
                Opcode::Ushr => f64::from(to_uint32(x).wrapping_shr(to_uint32(y) & 31)),
                _ => unreachable!("bitwise opcodes only"),
            };
            ctx.number(value)
        }
        _ => Err(RunError::type_error("Cannot mix BigInt and other types, use explicit conversions")),
    }
}

fn relational(ctx: &mut Context, op: Opcode, left: CellId, right: CellId) -> RunResult<CellId> {
    let a = ctx.heap.resolve(left);
    let b = ctx.heap.resolve(right);
    // Two strings compare lexicographically.
    if let (Entity::String(x), Entity::String(y)) = (ctx.heap.entity(a), ctx.heap.entity(b)) {
        let result = match op {
            Opcode::Lt => x < y,
            Opcode::Le => x <= y,
            Opcode::Gt => x > y,
            Opcode::Ge => x >= y,
            _ => unreachable!("relational opcodes only"),
        };
        return ctx.boolean(result);
    }
    match (to_numeric(ctx, a)?, to_numeric(ctx, b)?) {
        (Numeric::BigInt(x), Numeric::BigInt(y)) => {
            let result = match op {
                Opcode::Lt => x < y,
                Opcode::Le => x <= y,
                Opcode::Gt => x > y,
                Opcode::Ge => x >= y,
                _ => unreachable!("relational opcodes only"),
            };
            ctx.boolean(result)
        }
        (lhs, rhs) => {
            let x = numeric_to_f64(lhs);
            let y = numeric_to_f64(rhs);
            if x.is_nan() || y.is_nan() {
                return ctx.boolean(false);
            }
            let result = match op {
                Opcode::Lt => x < y,
                Opcode::Le => x <= y,
                Opcode::Gt => x > y,
                Opcode::Ge => x >= y,
                _ => unreachable!("relational opcodes only"),
            };
            ctx.boolean(result)
        }
    }
}

fn numeric_to_f64(value: Numeric) -> f64 {
    match value {
        Numeric::Number(v) => v,
        Numeric::BigInt(v) => v.to_f64().unwrap_or(f64::NAN),
    }
}

pub(crate) fn to_int32(value: f64) -> i32 {
    if !value.is_finite() {
        return 0;
    }
    (value.trunc() as i64 as u32) as i32
}

pub(crate) fn to_uint32(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    value.trunc() as i64 as u32
}

/// `in`: property existence on the object or its prototype chain.
pub(crate) fn has_property(ctx: &mut Context, object: CellId, key: CellId) -> RunResult<bool> {
    let target = ctx.heap.resolve(object);
    if !is_object_like(ctx, target) {
        return Err(RunError::type_error(
            "Cannot use 'in' operator to search for a property in a non-object",
        ));
    }
    let key = to_property_key(ctx, key)?;
    // Index membership on arrays and arguments.
    if let PropKey::String(name) = &key
        && let Ok(index) = name.parse::<usize>()
    {
        match ctx.heap.entity(target) {
            Entity::Array(array) => return Ok(index < array.items.len()),
            Entity::Argument(argument) => return Ok(index < argument.items.len()),
            _ => {}
        }
    }
    let mut current = target;
    loop {
        let Some(data) = ctx.heap.entity(current).object_data() else {
            return Ok(false);
        };
        if has_own(data, &key) {
            return Ok(true);
        }
        match data.prototype {
            Some(prototype) => current = prototype,
            None => return Ok(false),
        }
    }
}

/// `instanceof`: walks the value's prototype chain looking for the
/// constructor's `prototype` object.
pub(crate) fn instance_of(ctx: &mut Context, value: CellId, constructor: CellId) -> RunResult<bool> {
    let constructor = ctx.heap.resolve(constructor);
    if !is_callable(ctx, constructor) {
        return Err(RunError::type_error("Right-hand side of 'instanceof' is not callable"));
    }
    let key = PropKey::String("prototype".to_owned());
    let prototype = get_property_by_key(ctx, constructor, &key)?;
    let prototype = ctx.heap.resolve(prototype);
    let mut current = ctx.heap.resolve(value);
    let mut guard = 0;
    loop {
        guard += 1;
        if guard > 1024 {
            return Ok(false);
        }
        let Some(data) = ctx.heap.entity(current).object_data() else {
            return Ok(false);
        };
        match data.prototype {
            Some(next) if next == prototype => return Ok(true),
            Some(next) => current = next,
            None => return Ok(false),
        }
    }
}

/// `THROW` on a non-exception value wraps it into an exception cell that
/// keeps the original as its target, so `catch` receives it back unchanged.
/// The stack snapshot is captured here, at raise time.
pub(crate) fn wrap_thrown(ctx: &mut Context, value: CellId) -> RunResult<CellId> {
    let id = ctx.heap.resolve(value);
    if matches!(ctx.heap.entity(id), Entity::Exception(_)) {
        return Ok(id);
    }
    let target = reify(ctx, value)?;
    let message = to_string_value(ctx, value).unwrap_or_else(|_| "exception".to_owned());
    let frames = ctx.capture_stack();
    ctx.create_value(Entity::Exception(ExceptionData {
        kind: ErrorKind::InternalError,
        message,
        frames,
        target: Some(target),
    }))
}

/// The value bound in a `catch` clause: the original thrown value when the
/// exception wraps one, otherwise an error object built from the exception.
pub(crate) fn unwrap_exception(ctx: &mut Context, exception: CellId) -> RunResult<CellId> {
    let id = ctx.heap.resolve(exception);
    let Entity::Exception(data) = ctx.heap.entity(id) else {
        return Ok(id);
    };
    if let Some(target) = data.target {
        return Ok(target);
    }
    let kind = data.kind;
    let message = data.message.clone();
    let prototype = ctx.intrinsics.error_prototype;
    let error = ctx.create_value(Entity::Object(ObjectData::with_prototype(Some(prototype))))?;
    let name_cell = ctx.string(kind.to_string())?;
    let message_cell = ctx.string(message.clone())?;
    let stack_cell = ctx.string(format!("{kind}: {message}"))?;
    define_hidden(ctx, error, "name", name_cell);
    define_hidden(ctx, error, "message", message_cell);
    define_hidden(ctx, error, "stack", stack_cell);
    Ok(error)
}

/// Builds a host iterator object over `items`, with `next` and
/// `@@iterator` coming from the iterator prototype. The allocation records
/// the item edges from the internal slot.
pub(crate) fn make_vec_iterator(ctx: &mut Context, items: Vec<CellId>) -> RunResult<CellId> {
    let prototype = ctx.intrinsics.iterator_prototype;
    let mut object = ObjectData::with_prototype(Some(prototype));
    object.internal = Some(InternalSlot::VecIter { items, index: 0 });
    ctx.create_value(Entity::Object(object))
}
