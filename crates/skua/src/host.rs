//! Host bindings: thin installers of native-function properties on the root
//! scope and the intrinsic prototypes.
//!
//! Only the surface the engine core itself depends on lives here — the
//! iteration protocol (`Symbol.iterator`, iterator/generator prototypes,
//! array and string iteration), `Function.prototype.call`/`apply`, the
//! `Error` constructor family, `Promise`, and `console.log`. Each installer
//! attaches properties and nothing more.

use crate::{
    context::Context,
    error::{RunError, RunResult},
    heap::CellId,
    value::{Entity, InternalSlot, ObjectData},
    vm::{
        CoroutineState, call,
        call::{CoInput, closure_cell},
        ops,
    },
};

/// Installs every host binding. Called once per context before running any
/// program.
pub(crate) fn install(ctx: &mut Context) -> RunResult<()> {
    install_function_prototype(ctx)?;
    install_iterator_protocol(ctx)?;
    install_generator(ctx)?;
    install_array(ctx)?;
    install_string(ctx)?;
    install_object(ctx)?;
    install_symbol(ctx)?;
    install_errors(ctx)?;
    install_promise(ctx)?;
    install_console(ctx)?;
    Ok(())
}

/// Binds `name` at the root scope and mirrors it onto `globalThis`.
fn install_global(ctx: &mut Context, name: &str, cell: CellId) {
    ctx.define(name, cell, false);
    let global = ctx.intrinsics.global;
    ops::define_hidden(ctx, global, name, cell);
}

// ---- Function.prototype ----

fn install_function_prototype(ctx: &mut Context) -> RunResult<()> {
    let prototype = ctx.intrinsics.function_prototype;
    let fn_call = ctx.native_function(function_call, "call")?;
    ops::define_hidden(ctx, prototype, "call", fn_call);
    let fn_apply = ctx.native_function(function_apply, "apply")?;
    ops::define_hidden(ctx, prototype, "apply", fn_apply);
    let fn_to_string = ctx.native_function(function_to_string, "toString")?;
    ops::define_hidden(ctx, prototype, "toString", fn_to_string);
    Ok(())
}

fn function_call(ctx: &mut Context, this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let receiver = args.first().copied().unwrap_or(ctx.undefined());
    let rest = args.get(1..).unwrap_or_default().to_vec();
    call::apply_simple(ctx, this, receiver, rest)
}

fn function_apply(ctx: &mut Context, this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let receiver = args.first().copied().unwrap_or(ctx.undefined());
    let mut rest = Vec::new();
    if let Some(&list) = args.get(1) {
        let resolved = ctx.heap.resolve(list);
        if let Entity::Array(array) = ctx.heap.entity(resolved) {
            rest = array.items.clone();
        } else if let Entity::Argument(argument) = ctx.heap.entity(resolved) {
            rest = argument.items.clone();
        }
    }
    call::apply_simple(ctx, this, receiver, rest)
}

fn function_to_string(ctx: &mut Context, this: CellId, _args: &[CellId]) -> RunResult<CellId> {
    let rendered = ops::to_string_value(ctx, this)?;
    ctx.string(rendered)
}

// ---- iteration protocol ----

fn install_iterator_protocol(ctx: &mut Context) -> RunResult<()> {
    let prototype = ctx.intrinsics.iterator_prototype;
    let next = ctx.native_function(vec_iter_next, "next")?;
    ops::define_hidden(ctx, prototype, "next", next);
    let identity = ctx.native_function(self_iterator, "[Symbol.iterator]")?;
    let symbol = ctx.intrinsics.symbol_iterator;
    ops::define_hidden_symbol(ctx, prototype, symbol, identity);
    Ok(())
}

fn self_iterator(ctx: &mut Context, this: CellId, _args: &[CellId]) -> RunResult<CellId> {
    Ok(ctx.heap.resolve(this))
}

/// `next` over a host vector iterator (array values, enumerable keys).
fn vec_iter_next(ctx: &mut Context, this: CellId, _args: &[CellId]) -> RunResult<CellId> {
    let target = ctx.heap.resolve(this);
    let item = {
        let Some(data) = ctx.heap.entity_mut(target).object_data_mut() else {
            return Err(RunError::type_error("next called on a non-iterator"));
        };
        let Some(InternalSlot::VecIter { items, index }) = &mut data.internal else {
            return Err(RunError::type_error("next called on a non-iterator"));
        };
        let item = items.get(*index).copied();
        if item.is_some() {
            *index += 1;
        }
        item
    };
    match item {
        Some(value) => call::make_iter_result(ctx, value, false),
        None => {
            let undefined = ctx.undefined();
            call::make_iter_result(ctx, undefined, true)
        }
    }
}

// ---- generator prototype ----

fn install_generator(ctx: &mut Context) -> RunResult<()> {
    let prototype = ctx.intrinsics.generator_prototype;
    let next = ctx.native_function(generator_next, "next")?;
    ops::define_hidden(ctx, prototype, "next", next);
    let ret = ctx.native_function(generator_return, "return")?;
    ops::define_hidden(ctx, prototype, "return", ret);
    let throw = ctx.native_function(generator_throw, "throw")?;
    ops::define_hidden(ctx, prototype, "throw", throw);
    Ok(())
}

fn generator_next(ctx: &mut Context, this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let Some(status) = call::coroutine_status(ctx, this) else {
        return Err(RunError::type_error("next called on a non-generator"));
    };
    if matches!(status, CoroutineState::Completed) {
        let undefined = ctx.undefined();
        return call::make_iter_result(ctx, undefined, true);
    }
    let input = args.first().copied().unwrap_or(ctx.undefined());
    let result = call::resume_coroutine(ctx, this, CoInput::Next(input))?;
    wrap_resume_result(ctx, result)
}

fn generator_return(ctx: &mut Context, this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let Some(status) = call::coroutine_status(ctx, this) else {
        return Err(RunError::type_error("return called on a non-generator"));
    };
    let value = args.first().copied().unwrap_or(ctx.undefined());
    if matches!(status, CoroutineState::Completed) {
        return call::make_iter_result(ctx, value, true);
    }
    let result = call::resume_coroutine(ctx, this, CoInput::Return(value))?;
    wrap_resume_result(ctx, result)
}

fn generator_throw(ctx: &mut Context, this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let Some(status) = call::coroutine_status(ctx, this) else {
        return Err(RunError::type_error("throw called on a non-generator"));
    };
    let value = args.first().copied().unwrap_or(ctx.undefined());
    if matches!(status, CoroutineState::Completed) {
        let exception = ops::wrap_thrown(ctx, value)?;
        return Err(RunError::Thrown(exception));
    }
    let result = call::resume_coroutine(ctx, this, CoInput::Throw(value))?;
    wrap_resume_result(ctx, result)
}

/// Converts a raw coroutine result into an iterator result, re-raising
/// uncaught exceptions.
fn wrap_resume_result(ctx: &mut Context, result: CellId) -> RunResult<CellId> {
    let resolved = ctx.heap.resolve(result);
    match ctx.heap.entity(resolved) {
        Entity::Task(task) => {
            let value = task.value;
            call::make_iter_result(ctx, value, false)
        }
        Entity::Exception(_) => Err(RunError::Thrown(resolved)),
        _ => call::make_iter_result(ctx, result, true),
    }
}

// ---- arrays ----

fn install_array(ctx: &mut Context) -> RunResult<()> {
    let prototype = ctx.intrinsics.array_prototype;
    let values = ctx.native_function(array_values, "values")?;
    ops::define_hidden(ctx, prototype, "values", values);
    let symbol = ctx.intrinsics.symbol_iterator;
    ops::define_hidden_symbol(ctx, prototype, symbol, values);
    let push = ctx.native_function(array_push, "push")?;
    ops::define_hidden(ctx, prototype, "push", push);
    let join = ctx.native_function(array_join, "join")?;
    ops::define_hidden(ctx, prototype, "join", join);
    let index_of = ctx.native_function(array_index_of, "indexOf")?;
    ops::define_hidden(ctx, prototype, "indexOf", index_of);

    let constructor = ctx.native_function(array_constructor, "Array")?;
    ops::define_hidden(ctx, constructor, "prototype", prototype);
    ops::define_hidden(ctx, prototype, "constructor", constructor);
    let is_array = ctx.native_function(array_is_array, "isArray")?;
    ops::define_hidden(ctx, constructor, "isArray", is_array);
    install_global(ctx, "Array", constructor);
    Ok(())
}

/// Items iterated by `values`: arrays, arguments objects and strings.
fn iteration_items(ctx: &mut Context, this: CellId) -> RunResult<Vec<CellId>> {
    let target = ctx.heap.resolve(this);
    match ctx.heap.entity(target) {
        Entity::Array(array) => Ok(array.items.clone()),
        Entity::Argument(argument) => Ok(argument.items.clone()),
        Entity::String(value) => {
            let chars: Vec<String> = value.chars().map(|c| c.to_string()).collect();
            let mut cells = Vec::with_capacity(chars.len());
            for ch in chars {
                cells.push(ctx.string(ch)?);
            }
            Ok(cells)
        }
        _ => Err(RunError::type_error("values called on a non-iterable receiver")),
    }
}

fn array_values(ctx: &mut Context, this: CellId, _args: &[CellId]) -> RunResult<CellId> {
    let items = iteration_items(ctx, this)?;
    ops::make_vec_iterator(ctx, items)
}

fn array_push(ctx: &mut Context, this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let target = ctx.heap.resolve(this);
    for &arg in args {
        crate::vm::iter::push_array_item(ctx, target, arg)?;
    }
    let Entity::Array(array) = ctx.heap.entity(target) else {
        return Err(RunError::type_error("push called on a non-array"));
    };
    let length = array.items.len() as f64;
    ctx.number(length)
}

fn array_join(ctx: &mut Context, this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let separator = match args.first() {
        Some(&cell) if !ops::is_nullish(ctx, cell) => ops::to_string_value(ctx, cell)?,
        _ => ",".to_owned(),
    };
    let target = ctx.heap.resolve(this);
    let Entity::Array(array) = ctx.heap.entity(target) else {
        return Err(RunError::type_error("join called on a non-array"));
    };
    let items = array.items.clone();
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        if ops::is_nullish(ctx, item) {
            parts.push(String::new());
        } else {
            parts.push(ops::to_string_value(ctx, item)?);
        }
    }
    ctx.string(parts.join(&separator))
}

fn array_index_of(ctx: &mut Context, this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let needle = args.first().copied().unwrap_or(ctx.undefined());
    let target = ctx.heap.resolve(this);
    let Entity::Array(array) = ctx.heap.entity(target) else {
        return Err(RunError::type_error("indexOf called on a non-array"));
    };
    let items = array.items.clone();
    for (index, item) in items.into_iter().enumerate() {
        if ops::strict_equals(ctx, item, needle) {
            return ctx.number(index as f64);
        }
    }
    ctx.number(-1.0)
}

fn array_constructor(ctx: &mut Context, _this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let array = ctx.array()?;
    for &arg in args {
        crate::vm::iter::push_array_item(ctx, array, arg)?;
    }
    Ok(array)
}

fn array_is_array(ctx: &mut Context, _this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let value = args.first().copied().unwrap_or(ctx.undefined());
    let resolved = ctx.heap.resolve(value);
    let result = matches!(ctx.heap.entity(resolved), Entity::Array(_));
    ctx.boolean(result)
}

// ---- strings ----

fn install_string(ctx: &mut Context) -> RunResult<()> {
    let prototype = ctx.intrinsics.string_prototype;
    let iterator = ctx.native_function(array_values, "[Symbol.iterator]")?;
    let symbol = ctx.intrinsics.symbol_iterator;
    ops::define_hidden_symbol(ctx, prototype, symbol, iterator);
    Ok(())
}

// ---- objects ----

fn install_object(ctx: &mut Context) -> RunResult<()> {
    let prototype = ctx.intrinsics.object_prototype;
    let to_string = ctx.native_function(object_to_string, "toString")?;
    ops::define_hidden(ctx, prototype, "toString", to_string);
    let has_own = ctx.native_function(object_has_own_property, "hasOwnProperty")?;
    ops::define_hidden(ctx, prototype, "hasOwnProperty", has_own);

    let constructor = ctx.native_function(object_constructor, "Object")?;
    ops::define_hidden(ctx, constructor, "prototype", prototype);
    let keys = ctx.native_function(object_keys, "keys")?;
    ops::define_hidden(ctx, constructor, "keys", keys);
    let freeze = ctx.native_function(object_freeze, "freeze")?;
    ops::define_hidden(ctx, constructor, "freeze", freeze);
    install_global(ctx, "Object", constructor);
    Ok(())
}

fn object_to_string(ctx: &mut Context, _this: CellId, _args: &[CellId]) -> RunResult<CellId> {
    ctx.string("[object Object]")
}

fn object_has_own_property(ctx: &mut Context, this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let key = args.first().copied().unwrap_or(ctx.undefined());
    let name = ops::to_string_value(ctx, key)?;
    let result = ops::own_enumerable_keys(ctx, this).contains(&name);
    ctx.boolean(result)
}

fn object_constructor(ctx: &mut Context, _this: CellId, args: &[CellId]) -> RunResult<CellId> {
    match args.first() {
        Some(&value) if ops::is_object_like(ctx, value) => Ok(ctx.heap.resolve(value)),
        _ => ctx.object(),
    }
}

fn object_keys(ctx: &mut Context, _this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let source = args.first().copied().unwrap_or(ctx.undefined());
    let keys = ops::own_enumerable_keys(ctx, source);
    let array = ctx.array()?;
    for key in keys {
        let cell = ctx.string(key)?;
        crate::vm::iter::push_array_item(ctx, array, cell)?;
    }
    Ok(array)
}

fn object_freeze(ctx: &mut Context, _this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let value = args.first().copied().unwrap_or(ctx.undefined());
    let target = ctx.heap.resolve(value);
    if let Some(data) = ctx.heap.entity_mut(target).object_data_mut() {
        data.frozen = true;
        data.sealed = true;
        data.extensible = false;
    }
    Ok(target)
}

// ---- symbols ----

fn install_symbol(ctx: &mut Context) -> RunResult<()> {
    let constructor = ctx.native_function(symbol_constructor, "Symbol")?;
    let iterator = ctx.intrinsics.symbol_iterator;
    ops::define_hidden(ctx, constructor, "iterator", iterator);
    install_global(ctx, "Symbol", constructor);
    Ok(())
}

fn symbol_constructor(ctx: &mut Context, _this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let description = match args.first() {
        Some(&cell) if !ops::is_nullish(ctx, cell) => Some(ops::to_string_value(ctx, cell)?),
        _ => None,
    };
    ctx.create_value(Entity::Symbol(crate::value::SymbolData { description }))
}

// ---- errors ----

const ERROR_NAMES: [&str; 8] = [
    "Error",
    "TypeError",
    "RangeError",
    "ReferenceError",
    "SyntaxError",
    "URIError",
    "AggregateError",
    "InternalError",
];

fn install_errors(ctx: &mut Context) -> RunResult<()> {
    let base_prototype = ctx.intrinsics.error_prototype;
    let to_string = ctx.native_function(error_to_string, "toString")?;
    ops::define_hidden(ctx, base_prototype, "toString", to_string);

    for name in ERROR_NAMES {
        let constructor = ctx.native_function(error_constructor, name)?;
        let prototype = if name == "Error" {
            base_prototype
        } else {
            ctx.create_value(Entity::Object(ObjectData::with_prototype(Some(base_prototype))))?
        };
        let name_cell = ctx.string(name)?;
        ops::define_hidden(ctx, prototype, "name", name_cell);
        ops::define_hidden(ctx, constructor, "prototype", prototype);
        ops::define_hidden(ctx, prototype, "constructor", constructor);
        call::attach_closure(ctx, constructor, "__error_name__", name_cell);
        install_global(ctx, name, constructor);
    }
    Ok(())
}

fn error_constructor(ctx: &mut Context, this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let receiver = if ops::is_object_like(ctx, this) {
        ctx.heap.resolve(this)
    } else {
        let prototype = ctx.intrinsics.error_prototype;
        ctx.create_value(Entity::Object(ObjectData::with_prototype(Some(prototype))))?
    };
    let message = match args.first() {
        Some(&cell) if !ops::is_nullish(ctx, cell) => ops::to_string_value(ctx, cell)?,
        _ => String::new(),
    };
    let name = closure_cell(ctx, "__error_name__")
        .and_then(|cell| ops::to_string_value(ctx, cell))
        .unwrap_or_else(|_| "Error".to_owned());
    let message_cell = ctx.string(message.clone())?;
    ops::define_hidden(ctx, receiver, "message", message_cell);
    let mut stack = format!("{name}: {message}");
    for frame in ctx.capture_stack().iter().rev() {
        stack.push_str(&format!("\n    at {}", frame.funcname));
    }
    let stack_cell = ctx.string(stack)?;
    ops::define_hidden(ctx, receiver, "stack", stack_cell);
    Ok(receiver)
}

fn error_to_string(ctx: &mut Context, this: CellId, _args: &[CellId]) -> RunResult<CellId> {
    let name_key = ops::PropKey::String("name".to_owned());
    let message_key = ops::PropKey::String("message".to_owned());
    let name = ops::get_property_by_key(ctx, this, &name_key)?;
    let message = ops::get_property_by_key(ctx, this, &message_key)?;
    let name = ops::to_string_value(ctx, name)?;
    let message = ops::to_string_value(ctx, message)?;
    if message.is_empty() || message == "undefined" {
        return ctx.string(name);
    }
    ctx.string(format!("{name}: {message}"))
}

// ---- promises ----

fn install_promise(ctx: &mut Context) -> RunResult<()> {
    let prototype = ctx.intrinsics.promise_prototype;
    let then = ctx.native_function(promise_then, "then")?;
    ops::define_hidden(ctx, prototype, "then", then);
    let catch = ctx.native_function(promise_catch, "catch")?;
    ops::define_hidden(ctx, prototype, "catch", catch);
    let finally = ctx.native_function(promise_finally, "finally")?;
    ops::define_hidden(ctx, prototype, "finally", finally);

    let constructor = ctx.native_function(promise_constructor, "Promise")?;
    ops::define_hidden(ctx, constructor, "prototype", prototype);
    ops::define_hidden(ctx, prototype, "constructor", constructor);
    let resolve = ctx.native_function(promise_resolve_static, "resolve")?;
    ops::define_hidden(ctx, constructor, "resolve", resolve);
    let reject = ctx.native_function(promise_reject_static, "reject")?;
    ops::define_hidden(ctx, constructor, "reject", reject);
    install_global(ctx, "Promise", constructor);
    Ok(())
}

fn promise_constructor(ctx: &mut Context, _this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let Some(&executor) = args.first() else {
        return Err(RunError::type_error("Promise resolver is not a function"));
    };
    if !ops::is_callable(ctx, executor) {
        return Err(RunError::type_error("Promise resolver is not a function"));
    }
    let promise = call::create_promise(ctx)?;
    let resolve = call::make_settler(ctx, promise, true)?;
    let reject = call::make_settler(ctx, promise, false)?;
    let undefined = ctx.undefined();
    let result = call::apply_simple(ctx, executor, undefined, vec![resolve, reject])?;
    let resolved = ctx.heap.resolve(result);
    if matches!(ctx.heap.entity(resolved), Entity::Exception(_)) {
        let error = ops::unwrap_exception(ctx, resolved)?;
        call::settle_promise(ctx, promise, Err(error))?;
    }
    Ok(promise)
}

fn promise_resolve_static(ctx: &mut Context, _this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let value = args.first().copied().unwrap_or(ctx.undefined());
    let promise = call::create_promise(ctx)?;
    call::settle_promise(ctx, promise, Ok(value))?;
    Ok(promise)
}

fn promise_reject_static(ctx: &mut Context, _this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let value = args.first().copied().unwrap_or(ctx.undefined());
    let promise = call::create_promise(ctx)?;
    call::settle_promise(ctx, promise, Err(value))?;
    Ok(promise)
}

fn promise_then(ctx: &mut Context, this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let on_fulfilled = args.first().copied();
    let on_rejected = args.get(1).copied();
    promise_register(ctx, this, on_fulfilled, on_rejected)
}

fn promise_catch(ctx: &mut Context, this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let on_rejected = args.first().copied();
    promise_register(ctx, this, None, on_rejected)
}

fn promise_finally(ctx: &mut Context, this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let callback = args.first().copied().unwrap_or(ctx.undefined());
    if ops::is_callable(ctx, callback) {
        call::subscribe_promise(ctx, this, None, None, Some(callback))?;
    }
    Ok(ctx.heap.resolve(this))
}

/// Wires `then` reactions: each reaction settles the derived promise with
/// the callback's result (or passes the value/error through when the
/// callback is absent).
fn promise_register(
    ctx: &mut Context,
    promise: CellId,
    on_fulfilled: Option<CellId>,
    on_rejected: Option<CellId>,
) -> RunResult<CellId> {
    let derived = call::create_promise(ctx)?;
    let fulfill = make_reaction(ctx, derived, on_fulfilled, true)?;
    let reject = make_reaction(ctx, derived, on_rejected, false)?;
    call::subscribe_promise(ctx, promise, Some(fulfill), Some(reject), None)?;
    Ok(derived)
}

fn make_reaction(
    ctx: &mut Context,
    derived: CellId,
    callback: Option<CellId>,
    fulfill: bool,
) -> RunResult<CellId> {
    let native = if fulfill {
        ctx.native_function(reaction_fulfill, "")?
    } else {
        ctx.native_function(reaction_reject, "")?
    };
    call::attach_closure(ctx, native, "__derived__", derived);
    if let Some(callback) = callback
        && ops::is_callable(ctx, callback)
    {
        call::attach_closure(ctx, native, "__callback__", callback);
    }
    Ok(native)
}

fn reaction_fulfill(ctx: &mut Context, _this: CellId, args: &[CellId]) -> RunResult<CellId> {
    run_reaction(ctx, args, true)
}

fn reaction_reject(ctx: &mut Context, _this: CellId, args: &[CellId]) -> RunResult<CellId> {
    run_reaction(ctx, args, false)
}

fn run_reaction(ctx: &mut Context, args: &[CellId], fulfill: bool) -> RunResult<CellId> {
    let derived = closure_cell(ctx, "__derived__")?;
    let value = args.first().copied().unwrap_or(ctx.undefined());
    match closure_cell(ctx, "__callback__") {
        Ok(callback) => {
            let undefined = ctx.undefined();
            let result = call::apply_simple(ctx, callback, undefined, vec![value])?;
            let resolved = ctx.heap.resolve(result);
            if matches!(ctx.heap.entity(resolved), Entity::Exception(_)) {
                let error = ops::unwrap_exception(ctx, resolved)?;
                call::settle_promise(ctx, derived, Err(error))?;
            } else {
                call::settle_promise(ctx, derived, Ok(result))?;
            }
        }
        Err(_) => {
            let outcome = if fulfill { Ok(value) } else { Err(value) };
            call::settle_promise(ctx, derived, outcome)?;
        }
    }
    Ok(ctx.undefined())
}

// ---- console ----

fn install_console(ctx: &mut Context) -> RunResult<()> {
    let console = ctx.object()?;
    let log = ctx.native_function(console_log, "log")?;
    ops::define_hidden(ctx, console, "log", log);
    ops::define_hidden(ctx, console, "error", log);
    ops::define_hidden(ctx, console, "warn", log);
    install_global(ctx, "console", console);
    Ok(())
}

fn console_log(ctx: &mut Context, _this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let mut parts = Vec::with_capacity(args.len());
    for &arg in args {
        let rendered = match ops::to_string_value(ctx, arg) {
            Ok(text) => text,
            Err(_) => "Symbol()".to_owned(),
        };
        parts.push(rendered);
    }
    let line = parts.join(" ");
    ctx.print.print(&line);
    Ok(ctx.undefined())
}
