//! Iterator-protocol driver used by compiled loops and patterns.
//!
//! `NEXT`, `REST_ARRAY` and `REST_OBJECT` are invoked by `for..of`,
//! `for..in`, array patterns, array spread and parameter binding. The
//! three-cell suspend state `(iterator, result, done)` lives on the
//! evaluation stack; when the iterator slot is still undefined the driver
//! fetches the `@@iterator` method, calls it (with typed failures when it is
//! not a function or does not return an object), and replaces the slot.

use crate::{
    context::Context,
    error::{RunError, RunResult},
    heap::CellId,
    value::Entity,
    vm::{call, ops},
};

/// Resolves the iterator for `iterable`, calling its `@@iterator` method.
pub(crate) fn open_iterator(ctx: &mut Context, iterable: CellId) -> RunResult<CellId> {
    let symbol = ctx.intrinsics.symbol_iterator;
    let key = ops::PropKey::Symbol(symbol);
    let method = ops::get_property_by_key(ctx, iterable, &key)?;
    if !ops::is_callable(ctx, method) {
        let rendered = ops::to_string_value(ctx, iterable).unwrap_or_else(|_| "value".to_owned());
        return Err(RunError::type_error(format!("{rendered} is not iterable")));
    }
    let iterator = call::apply_simple(ctx, method, iterable, Vec::new())?;
    if let Entity::Exception(_) = ctx.heap.entity(ctx.heap.resolve(iterator)) {
        return Err(RunError::Thrown(iterator));
    }
    if !ops::is_object_like(ctx, iterator) {
        return Err(RunError::type_error(
            "Result of the Symbol.iterator method is not an object",
        ));
    }
    Ok(iterator)
}

/// One protocol step: calls `next()` and extracts `(value, done)`.
pub(crate) fn iterator_step(ctx: &mut Context, iterator: CellId) -> RunResult<(CellId, CellId)> {
    let next_key = ops::PropKey::String("next".to_owned());
    let next = ops::get_property_by_key(ctx, iterator, &next_key)?;
    if !ops::is_callable(ctx, next) {
        return Err(RunError::type_error("The iterator does not provide a 'next' method"));
    }
    iterator_step_with(ctx, iterator, next, Vec::new())
}

pub(crate) fn iterator_step_with(
    ctx: &mut Context,
    iterator: CellId,
    next: CellId,
    args: Vec<CellId>,
) -> RunResult<(CellId, CellId)> {
    let result = call::apply_simple(ctx, next, iterator, args)?;
    if let Entity::Exception(_) = ctx.heap.entity(ctx.heap.resolve(result)) {
        return Err(RunError::Thrown(result));
    }
    if !ops::is_object_like(ctx, result) {
        let rendered = ops::to_string_value(ctx, result).unwrap_or_else(|_| "value".to_owned());
        return Err(RunError::type_error(format!("Iterator result '{rendered}' is not an object")));
    }
    let value_key = ops::PropKey::String("value".to_owned());
    let done_key = ops::PropKey::String("done".to_owned());
    let value = ops::get_property_by_key(ctx, result, &value_key)?;
    let done = ops::get_property_by_key(ctx, result, &done_key)?;
    Ok((value, done))
}

/// `NEXT`: with TOS the (possibly still undefined) iterator slot and the
/// iterable beneath it, pushes `(value, done)`.
pub(crate) fn next_step(ctx: &mut Context, stack: &mut Vec<CellId>) -> RunResult<()> {
    let generator = *stack.last().ok_or_else(|| RunError::internal("NEXT on an empty stack"))?;
    let generator = if ops::is_nullish(ctx, generator) {
        stack.pop();
        let iterable = *stack
            .last()
            .ok_or_else(|| RunError::internal("NEXT without an iterable"))?;
        let iterator = open_iterator(ctx, iterable)?;
        stack.push(iterator);
        iterator
    } else {
        generator
    };
    let (value, done) = iterator_step(ctx, generator)?;
    stack.push(value);
    stack.push(done);
    Ok(())
}

/// `REST_ARRAY`: drains the rest of the iterator into a fresh array.
pub(crate) fn rest_array(ctx: &mut Context, stack: &mut Vec<CellId>) -> RunResult<()> {
    let generator = *stack.last().ok_or_else(|| RunError::internal("REST_ARRAY on an empty stack"))?;
    let generator = if ops::is_nullish(ctx, generator) {
        stack.pop();
        let iterable = *stack
            .last()
            .ok_or_else(|| RunError::internal("REST_ARRAY without an iterable"))?;
        let iterator = open_iterator(ctx, iterable)?;
        stack.push(iterator);
        iterator
    } else {
        generator
    };
    let array = ctx.array()?;
    loop {
        let (value, done) = iterator_step(ctx, generator)?;
        if ops::to_boolean(ctx, done) {
            break;
        }
        push_array_item(ctx, array, value)?;
    }
    stack.push(array);
    Ok(())
}

pub(crate) fn push_array_item(ctx: &mut Context, array: CellId, value: CellId) -> RunResult<()> {
    let value = ops::reify(ctx, value)?;
    let target = ctx.heap.resolve(array);
    let Entity::Array(data) = ctx.heap.entity_mut(target) else {
        return Err(RunError::internal("not an array"));
    };
    data.items.push(value);
    ctx.heap.link(target, value);
    Ok(())
}

/// `REST_OBJECT`: pops `count` matched keys, then builds an object holding
/// the source's remaining own enumerable properties.
pub(crate) fn rest_object(ctx: &mut Context, stack: &mut Vec<CellId>, count: u32) -> RunResult<()> {
    let mut excluded = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key = stack.pop().ok_or_else(|| RunError::internal("REST_OBJECT key underflow"))?;
        excluded.push(ops::to_string_value(ctx, key)?);
    }
    let source = *stack
        .last()
        .ok_or_else(|| RunError::internal("REST_OBJECT without a source"))?;
    let result = ctx.object()?;
    for key in ops::own_enumerable_keys(ctx, source) {
        if excluded.contains(&key) {
            continue;
        }
        let prop_key = ops::PropKey::String(key);
        let value = ops::get_property_by_key(ctx, source, &prop_key)?;
        ops::set_property_by_key(ctx, result, &prop_key, value)?;
    }
    stack.push(result);
    Ok(())
}

/// `MERGE`: spreads `source` into the object or array at TOS.
pub(crate) fn merge(ctx: &mut Context, destination: CellId, source: CellId) -> RunResult<()> {
    let target = ctx.heap.resolve(destination);
    match ctx.heap.entity(target) {
        Entity::Array(_) => {
            let iterator = open_iterator(ctx, source)?;
            loop {
                let (value, done) = iterator_step(ctx, iterator)?;
                if ops::to_boolean(ctx, done) {
                    break;
                }
                push_array_item(ctx, target, value)?;
            }
            Ok(())
        }
        _ => {
            // Object spread copies own enumerable properties.
            for key in ops::own_enumerable_keys(ctx, source) {
                let prop_key = ops::PropKey::String(key);
                let value = ops::get_property_by_key(ctx, source, &prop_key)?;
                ops::set_property_by_key(ctx, target, &prop_key, value)?;
            }
            Ok(())
        }
    }
}

/// `GET_KEYS`: an iterable over the enumerable own keys, for `for..in`.
pub(crate) fn make_keys_iterable(ctx: &mut Context, object: CellId) -> RunResult<CellId> {
    let keys = ops::own_enumerable_keys(ctx, object);
    let mut cells = Vec::with_capacity(keys.len());
    for key in keys {
        cells.push(ctx.string(key)?);
    }
    ops::make_vec_iterator(ctx, cells)
}
