//! Function application, construction, coroutines and the microtask pump.
//!
//! Script calls run a fresh VM state against the callee's program; native
//! calls invoke the host callback with closure bindings installed in a call
//! scope. Generator functions do not run on call — they produce a generator
//! object carrying a coroutine record that `next`/`throw`/`return` resume.
//! Async functions run as coroutines wrapped in a promise and are pumped
//! through the FIFO microtask queue.

use crate::{
    context::{Context, Frame, Job},
    error::{ErrorKind, RunError, RunResult},
    heap::CellId,
    value::{
        ArgumentData, Entity, InternalSlot, ObjectData, PromiseData, PromiseState, TaskKind,
    },
    vm::{Coroutine, CoroutineState, VmState, ops, run},
};

/// How a coroutine is re-entered.
#[derive(Debug, Clone, Copy)]
pub(crate) enum CoInput {
    Next(CellId),
    Throw(CellId),
    Return(CellId),
}

/// Applies `func` with an anonymous call-site frame; used by accessors, the
/// iteration driver and host helpers.
pub(crate) fn apply_simple(ctx: &mut Context, func: CellId, this: CellId, args: Vec<CellId>) -> RunResult<CellId> {
    let funcname = callee_name(ctx, func);
    let frame = Frame {
        filename: 0,
        line: 0,
        column: 0,
        funcname,
    };
    apply(ctx, func, this, args, frame)
}

pub(crate) fn callee_name(ctx: &Context, func: CellId) -> String {
    match ctx.heap.entity(ctx.heap.resolve(func)) {
        Entity::Function(data) if !data.name.is_empty() => data.name.clone(),
        Entity::NativeFunction(data) if !data.name.is_empty() => data.name.clone(),
        _ => "<anonymous>".to_owned(),
    }
}

/// Applies a callable. The result is a plain value cell, an exception cell
/// (callee raised), a generator object (generator callee) or a promise
/// (async callee).
pub(crate) fn apply(
    ctx: &mut Context,
    func: CellId,
    this: CellId,
    args: Vec<CellId>,
    frame: Frame,
) -> RunResult<CellId> {
    let callee = ctx.heap.resolve(func);
    match ctx.heap.entity(callee) {
        Entity::NativeFunction(data) => {
            let native = data.callee;
            let closure: Vec<(String, CellId)> = data.closure.iter().map(|(k, v)| (k.clone(), *v)).collect();
            let bound = data.bound_self;
            ctx.push_frame(frame)?;
            let caller_scope = ctx.current_scope();
            ctx.push_scope()?;
            for (name, cell) in closure {
                ctx.define(&name, cell, false);
            }
            let self_cell = bound.unwrap_or(this);
            let result = match native(ctx, self_cell, &args) {
                Ok(value) => value,
                Err(RunError::Thrown(cell)) => cell,
                Err(error) => ctx.exception_from_error(error)?,
            };
            ctx.pin_in_scope(caller_scope, result);
            while ctx.current_scope() != caller_scope {
                ctx.pop_scope();
            }
            ctx.pop_frame();
            Ok(result)
        }
        Entity::Function(data) => {
            if data.is_generator || data.is_async {
                let generator = make_coroutine_object(ctx, callee, this, &args)?;
                let is_async = {
                    let Entity::Function(data) = ctx.heap.entity(callee) else {
                        unreachable!("checked above");
                    };
                    data.is_async && !data.is_generator
                };
                if is_async {
                    return start_async(ctx, generator);
                }
                return Ok(generator);
            }
            let address = data.address;
            let program = data.program.clone();
            let is_arrow = data.is_arrow;
            let bound = data.bound_self;
            let closure: Vec<(String, CellId)> = data.closure.iter().map(|(k, v)| (k.clone(), *v)).collect();

            ctx.push_frame(frame)?;
            let caller_scope = ctx.current_scope();
            ctx.push_scope()?;
            for (name, cell) in closure {
                ctx.define(&name, cell, false);
            }
            // Parameter binding iterates the arguments object, so every
            // call gets one; arrows keep the `this` captured at creation.
            let arguments = make_arguments(ctx, &args)?;
            ctx.define("arguments", arguments, false);
            if !is_arrow {
                let self_cell = bound.unwrap_or(this);
                ctx.define("this", self_cell, false);
            }
            let mut state = VmState::new(address as usize);
            let result = run(ctx, &program, &mut state);
            let result = match result {
                Ok(value) => value,
                Err(error) => {
                    let exception = ctx.exception_from_error(error)?;
                    exception
                }
            };
            // A task escaping a plain call means `yield` outside a
            // generator body.
            let result = if matches!(ctx.heap.entity(ctx.heap.resolve(result)), Entity::Task(_)) {
                ctx.make_exception(ErrorKind::TypeError, "yield is only valid inside a generator")?
            } else {
                result
            };
            ctx.pin_in_scope(caller_scope, result);
            while ctx.current_scope() != caller_scope {
                ctx.pop_scope();
            }
            ctx.pop_frame();
            Ok(result)
        }
        _ => {
            let rendered = ops::to_string_value(ctx, func).unwrap_or_else(|_| "value".to_owned());
            Err(RunError::type_error(format!("{rendered} is not a function")))
        }
    }
}

/// `NEW`: builds the receiver from `callee.prototype`, applies the callee,
/// and keeps the receiver unless the callee returned an object.
pub(crate) fn construct(ctx: &mut Context, callee: CellId, args: Vec<CellId>, frame: Frame) -> RunResult<CellId> {
    if !ops::is_callable(ctx, callee) {
        let rendered = ops::to_string_value(ctx, callee).unwrap_or_else(|_| "value".to_owned());
        return Err(RunError::type_error(format!("{rendered} is not a constructor")));
    }
    let key = ops::PropKey::String("prototype".to_owned());
    let prototype = ops::get_property_by_key(ctx, callee, &key)?;
    let prototype = if ops::is_object_like(ctx, prototype) {
        ctx.heap.resolve(prototype)
    } else {
        ctx.intrinsics.object_prototype
    };
    let receiver = ctx.create_value(Entity::Object(ObjectData::with_prototype(Some(prototype))))?;
    let result = apply(ctx, callee, receiver, args, frame)?;
    if matches!(ctx.heap.entity(ctx.heap.resolve(result)), Entity::Exception(_)) {
        return Ok(result);
    }
    if ops::is_object_like(ctx, result) {
        Ok(ctx.heap.resolve(result))
    } else {
        Ok(receiver)
    }
}

/// The arguments object: indexable, with a length and an `@@iterator`.
fn make_arguments(ctx: &mut Context, args: &[CellId]) -> RunResult<CellId> {
    let mut items = Vec::with_capacity(args.len());
    for &arg in args {
        items.push(ops::reify(ctx, arg)?);
    }
    let prototype = ctx.intrinsics.object_prototype;
    // The allocation records the item edges from the entity payload.
    let arguments = ctx.create_value(Entity::Argument(ArgumentData {
        object: ObjectData::with_prototype(Some(prototype)),
        items,
    }))?;
    let values_key = ops::PropKey::String("values".to_owned());
    let array_prototype = ctx.intrinsics.array_prototype;
    let values = ops::get_property_by_key(ctx, array_prototype, &values_key)?;
    if ops::is_callable(ctx, values) {
        let symbol = ctx.intrinsics.symbol_iterator;
        ops::define_hidden_symbol(ctx, arguments, symbol, values);
    }
    Ok(arguments)
}

/// Builds a generator/async-coroutine object: prototype chain onto the
/// generator prototype and a coroutine record rooted in a fresh scope under
/// the root scope, holding the closure, `this` and `arguments` bindings.
fn make_coroutine_object(ctx: &mut Context, callee: CellId, this: CellId, args: &[CellId]) -> RunResult<CellId> {
    let (address, program, funcname, is_async, bound, closure) = {
        let Entity::Function(data) = ctx.heap.entity(callee) else {
            return Err(RunError::internal("coroutine callee is not a function"));
        };
        (
            data.address,
            data.program.clone(),
            if data.name.is_empty() {
                "<anonymous>".to_owned()
            } else {
                data.name.clone()
            },
            data.is_async,
            data.bound_self,
            data.closure
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect::<Vec<_>>(),
        )
    };
    let root = ctx.root_scope();
    let base_scope = ctx.push_scope_under(root)?;
    for (name, cell) in closure {
        ctx.define_in(base_scope, &name, cell, false);
    }
    let arguments = make_arguments(ctx, args)?;
    ctx.define_in(base_scope, "arguments", arguments, false);
    let self_cell = bound.unwrap_or(this);
    ctx.define_in(base_scope, "this", self_cell, false);

    let coroutine = Coroutine {
        state: CoroutineState::Created { address },
        base_scope,
        program,
        funcname,
        is_async,
    };
    let prototype = ctx.intrinsics.generator_prototype;
    let mut object = ObjectData::with_prototype(Some(prototype));
    object.internal = Some(InternalSlot::Coroutine(Box::new(coroutine)));
    let generator = ctx.create_value(Entity::Object(object))?;
    Ok(generator)
}

/// The state a coroutine is in, read without resuming it.
pub(crate) fn coroutine_status(ctx: &Context, generator: CellId) -> Option<&CoroutineState> {
    let target = ctx.heap.resolve(generator);
    let data = ctx.heap.entity(target).object_data()?;
    match &data.internal {
        Some(InternalSlot::Coroutine(coroutine)) => Some(&coroutine.state),
        _ => None,
    }
}

/// Resumes a coroutine and returns the raw result cell: a task (suspended
/// again), an exception cell, or the completion value.
pub(crate) fn resume_coroutine(ctx: &mut Context, generator: CellId, input: CoInput) -> RunResult<CellId> {
    let target = ctx.heap.resolve(generator);
    let taken = {
        let Some(data) = ctx.heap.entity_mut(target).object_data_mut() else {
            return Err(RunError::type_error("not a generator object"));
        };
        match data.internal.take() {
            Some(InternalSlot::Coroutine(coroutine)) => coroutine,
            other => {
                data.internal = other;
                return Err(RunError::type_error("not a generator object"));
            }
        }
    };
    let mut coroutine = taken;
    let program = coroutine.program.clone();
    let funcname = coroutine.funcname.clone();

    let (mut state, entry_scope) = match coroutine.state {
        CoroutineState::Running => {
            restore_coroutine(ctx, target, coroutine);
            return Err(RunError::type_error("Generator is already running"));
        }
        CoroutineState::Completed => {
            restore_coroutine(ctx, target, coroutine);
            return Ok(ctx.undefined());
        }
        CoroutineState::Created { address } => match input {
            CoInput::Next(_) => (VmState::new(address as usize), coroutine.base_scope),
            CoInput::Return(value) => {
                coroutine.state = CoroutineState::Completed;
                let base = coroutine.base_scope;
                restore_coroutine(ctx, target, coroutine);
                ctx.destroy_scope(base);
                return Ok(value);
            }
            CoInput::Throw(value) => {
                coroutine.state = CoroutineState::Completed;
                let base = coroutine.base_scope;
                restore_coroutine(ctx, target, coroutine);
                ctx.destroy_scope(base);
                let exception = ops::wrap_thrown(ctx, value)?;
                return Ok(exception);
            }
        },
        CoroutineState::Suspended(saved) => {
            let mut state = *saved;
            let scope = state.suspend_scope;
            match input {
                CoInput::Next(value) => state.stack.push(value),
                CoInput::Return(value) => {
                    // Force completion; the unwinder still visits finally
                    // handlers on the way out.
                    state.stack.push(value);
                    state.pc = program.code.len();
                }
                CoInput::Throw(value) => {
                    let exception = ops::wrap_thrown(ctx, value)?;
                    state.stack.push(exception);
                    state.pc = program.code.len();
                }
            }
            (state, scope)
        }
    };

    coroutine.state = CoroutineState::Running;
    restore_coroutine(ctx, target, coroutine);

    let caller_scope = ctx.current_scope();
    ctx.set_current_scope(entry_scope);
    ctx.push_frame(Frame {
        filename: 0,
        line: 0,
        column: 0,
        funcname,
    })?;
    let outcome = run(ctx, &program, &mut state);
    ctx.pop_frame();
    let resumed_scope = ctx.current_scope();
    ctx.set_current_scope(caller_scope);
    let result = match outcome {
        Ok(value) => value,
        Err(error) => ctx.exception_from_error(error)?,
    };
    ctx.pin_in_scope(caller_scope, result);

    let suspended = matches!(ctx.heap.entity(ctx.heap.resolve(result)), Entity::Task(_));
    let mut coroutine = {
        let Some(data) = ctx.heap.entity_mut(target).object_data_mut() else {
            return Err(RunError::internal("generator object vanished during resume"));
        };
        match data.internal.take() {
            Some(InternalSlot::Coroutine(coroutine)) => coroutine,
            _ => return Err(RunError::internal("coroutine record vanished during resume")),
        }
    };
    if suspended {
        state.suspend_scope = resumed_scope;
        coroutine.state = CoroutineState::Suspended(Box::new(state));
        restore_coroutine(ctx, target, coroutine);
    } else {
        coroutine.state = CoroutineState::Completed;
        let base = coroutine.base_scope;
        restore_coroutine(ctx, target, coroutine);
        ctx.destroy_scope(base);
    }
    Ok(result)
}

fn restore_coroutine(ctx: &mut Context, target: CellId, coroutine: Box<Coroutine>) {
    if let Some(data) = ctx.heap.entity_mut(target).object_data_mut() {
        data.internal = Some(InternalSlot::Coroutine(coroutine));
    }
}

/// Builds a `{value, done}` iterator result object.
pub(crate) fn make_iter_result(ctx: &mut Context, value: CellId, done: bool) -> RunResult<CellId> {
    let object = ctx.object()?;
    let value_key = ops::PropKey::String("value".to_owned());
    ops::set_property_by_key(ctx, object, &value_key, value)?;
    let done_cell = ctx.boolean(done)?;
    let done_key = ops::PropKey::String("done".to_owned());
    ops::set_property_by_key(ctx, object, &done_key, done_cell)?;
    Ok(object)
}

// ---- promises and the async driver ----

pub(crate) fn create_promise(ctx: &mut Context) -> RunResult<CellId> {
    let prototype = ctx.intrinsics.promise_prototype;
    ctx.create_value(Entity::Promise(PromiseData {
        object: ObjectData::with_prototype(Some(prototype)),
        state: PromiseState::Pending,
        value: None,
        on_fulfilled: Vec::new(),
        on_rejected: Vec::new(),
        on_finally: Vec::new(),
    }))
}

/// Settles a pending promise and schedules its reactions in FIFO order.
/// Fulfilling with a promise adopts that promise's eventual state instead.
pub(crate) fn settle_promise(ctx: &mut Context, promise: CellId, outcome: Result<CellId, CellId>) -> RunResult<()> {
    let target = ctx.heap.resolve(promise);
    if let Ok(value) = outcome {
        let inner = ctx.heap.resolve(value);
        if matches!(ctx.heap.entity(inner), Entity::Promise(_)) && inner != target {
            return adopt_promise(ctx, target, inner);
        }
    }
    let value = match outcome {
        Ok(value) | Err(value) => ops::reify(ctx, value)?,
    };
    let fulfilled = outcome.is_ok();
    let (callbacks, finals) = {
        let Entity::Promise(data) = ctx.heap.entity_mut(target) else {
            return Err(RunError::type_error("not a promise"));
        };
        if data.state != PromiseState::Pending {
            return Ok(());
        }
        data.state = if fulfilled {
            PromiseState::Fulfilled
        } else {
            PromiseState::Rejected
        };
        data.value = Some(value);
        let callbacks = if fulfilled {
            std::mem::take(&mut data.on_fulfilled)
        } else {
            std::mem::take(&mut data.on_rejected)
        };
        let dropped = if fulfilled {
            std::mem::take(&mut data.on_rejected)
        } else {
            std::mem::take(&mut data.on_fulfilled)
        };
        let finals = std::mem::take(&mut data.on_finally);
        for cell in dropped {
            ctx.heap.unlink(target, cell);
        }
        (callbacks, finals)
    };
    ctx.heap.link(target, value);
    let undefined = ctx.undefined();
    for callback in callbacks {
        ctx.heap.unlink(target, callback);
        ctx.enqueue_job(Job::Call {
            func: callback,
            this: undefined,
            args: vec![value],
        });
    }
    for callback in finals {
        ctx.heap.unlink(target, callback);
        ctx.enqueue_job(Job::Call {
            func: callback,
            this: undefined,
            args: Vec::new(),
        });
    }
    Ok(())
}

/// Registers callbacks on a promise, scheduling immediately when it is
/// already settled.
pub(crate) fn subscribe_promise(
    ctx: &mut Context,
    promise: CellId,
    on_fulfilled: Option<CellId>,
    on_rejected: Option<CellId>,
    on_finally: Option<CellId>,
) -> RunResult<()> {
    let target = ctx.heap.resolve(promise);
    let (state, value) = {
        let Entity::Promise(data) = ctx.heap.entity(target) else {
            return Err(RunError::type_error("not a promise"));
        };
        (data.state, data.value)
    };
    let undefined = ctx.undefined();
    match state {
        PromiseState::Pending => {
            let Entity::Promise(data) = ctx.heap.entity_mut(target) else {
                unreachable!("checked above");
            };
            if let Some(callback) = on_fulfilled {
                data.on_fulfilled.push(callback);
            }
            if let Some(callback) = on_rejected {
                data.on_rejected.push(callback);
            }
            if let Some(callback) = on_finally {
                data.on_finally.push(callback);
            }
            for callback in [on_fulfilled, on_rejected, on_finally].into_iter().flatten() {
                ctx.heap.link(target, callback);
            }
        }
        PromiseState::Fulfilled => {
            let value = value.unwrap_or(undefined);
            if let Some(callback) = on_fulfilled {
                ctx.enqueue_job(Job::Call {
                    func: callback,
                    this: undefined,
                    args: vec![value],
                });
            }
            if let Some(callback) = on_finally {
                ctx.enqueue_job(Job::Call {
                    func: callback,
                    this: undefined,
                    args: Vec::new(),
                });
            }
        }
        PromiseState::Rejected => {
            let value = value.unwrap_or(undefined);
            if let Some(callback) = on_rejected {
                ctx.enqueue_job(Job::Call {
                    func: callback,
                    this: undefined,
                    args: vec![value],
                });
            }
            if let Some(callback) = on_finally {
                ctx.enqueue_job(Job::Call {
                    func: callback,
                    this: undefined,
                    args: Vec::new(),
                });
            }
        }
    }
    Ok(())
}

/// Makes `outer` follow `inner`'s eventual state.
fn adopt_promise(ctx: &mut Context, outer: CellId, inner: CellId) -> RunResult<()> {
    let (state, value) = {
        let Entity::Promise(data) = ctx.heap.entity(inner) else {
            return Err(RunError::type_error("not a promise"));
        };
        (data.state, data.value)
    };
    match state {
        PromiseState::Fulfilled => {
            let value = value.unwrap_or(ctx.undefined());
            settle_promise(ctx, outer, Ok(value))
        }
        PromiseState::Rejected => {
            let value = value.unwrap_or(ctx.undefined());
            settle_promise(ctx, outer, Err(value))
        }
        PromiseState::Pending => {
            let fulfill = make_settler(ctx, outer, true)?;
            let reject = make_settler(ctx, outer, false)?;
            subscribe_promise(ctx, inner, Some(fulfill), Some(reject), None)
        }
    }
}

/// A native that settles its closed-over promise when invoked.
pub(crate) fn make_settler(ctx: &mut Context, promise: CellId, fulfill: bool) -> RunResult<CellId> {
    let native = if fulfill {
        ctx.native_function(settler_fulfill, "resolve")?
    } else {
        ctx.native_function(settler_reject, "reject")?
    };
    attach_closure(ctx, native, "__promise__", promise);
    Ok(native)
}

fn settler_fulfill(ctx: &mut Context, _self: CellId, args: &[CellId]) -> RunResult<CellId> {
    let promise = closure_cell(ctx, "__promise__")?;
    let value = args.first().copied().unwrap_or(ctx.undefined());
    settle_promise(ctx, promise, Ok(value))?;
    Ok(ctx.undefined())
}

fn settler_reject(ctx: &mut Context, _self: CellId, args: &[CellId]) -> RunResult<CellId> {
    let promise = closure_cell(ctx, "__promise__")?;
    let value = args.first().copied().unwrap_or(ctx.undefined());
    settle_promise(ctx, promise, Err(value))?;
    Ok(ctx.undefined())
}

/// Stores a closure binding on a native function cell.
pub(crate) fn attach_closure(ctx: &mut Context, native: CellId, name: &str, cell: CellId) {
    let target = ctx.heap.resolve(native);
    if let Entity::NativeFunction(data) = ctx.heap.entity_mut(target) {
        data.closure.insert(name.to_owned(), cell);
        ctx.heap.link(target, cell);
    }
}

/// Reads a closure binding from the current call scope.
pub(crate) fn closure_cell(ctx: &Context, name: &str) -> RunResult<CellId> {
    ctx.lookup(name)
        .map(|binding| binding.cell)
        .ok_or_else(|| RunError::internal(format!("missing closure binding {name}")))
}

/// Starts an async function: runs the coroutine synchronously until its
/// first suspension and returns the wrapping promise.
fn start_async(ctx: &mut Context, generator: CellId) -> RunResult<CellId> {
    let promise = create_promise(ctx)?;
    let undefined = ctx.undefined();
    drive_async_step(ctx, generator, promise, Ok(undefined))?;
    Ok(promise)
}

/// One resumption of an async coroutine; wires the next continuation or
/// settles the wrapping promise.
pub(crate) fn drive_async_step(
    ctx: &mut Context,
    generator: CellId,
    promise: CellId,
    input: Result<CellId, CellId>,
) -> RunResult<()> {
    let co_input = match input {
        Ok(value) => CoInput::Next(value),
        Err(value) => CoInput::Throw(value),
    };
    let result = resume_coroutine(ctx, generator, co_input)?;
    let resolved = ctx.heap.resolve(result);
    match ctx.heap.entity(resolved) {
        Entity::Task(task) => {
            let task = *task;
            if task.kind != TaskKind::Await {
                let error = ctx.make_exception(ErrorKind::TypeError, "yield is only valid inside a generator")?;
                return settle_promise(ctx, promise, Err(error));
            }
            let awaited = ctx.heap.resolve(task.value);
            if matches!(ctx.heap.entity(awaited), Entity::Promise(_)) {
                let fulfill = make_async_reaction(ctx, generator, promise, true)?;
                let reject = make_async_reaction(ctx, generator, promise, false)?;
                subscribe_promise(ctx, awaited, Some(fulfill), Some(reject), None)
            } else {
                // Awaiting a plain value resumes on the next tick.
                ctx.enqueue_job(Job::ResumeAsync {
                    generator,
                    promise,
                    input: Ok(task.value),
                });
                Ok(())
            }
        }
        Entity::Exception(_) => {
            let error = ops::unwrap_exception(ctx, resolved)?;
            settle_promise(ctx, promise, Err(error))
        }
        _ => settle_promise(ctx, promise, Ok(result)),
    }
}

fn make_async_reaction(ctx: &mut Context, generator: CellId, promise: CellId, fulfill: bool) -> RunResult<CellId> {
    let native = if fulfill {
        ctx.native_function(async_on_fulfilled, "")?
    } else {
        ctx.native_function(async_on_rejected, "")?
    };
    attach_closure(ctx, native, "__generator__", generator);
    attach_closure(ctx, native, "__promise__", promise);
    Ok(native)
}

fn async_on_fulfilled(ctx: &mut Context, _self: CellId, args: &[CellId]) -> RunResult<CellId> {
    let generator = closure_cell(ctx, "__generator__")?;
    let promise = closure_cell(ctx, "__promise__")?;
    let value = args.first().copied().unwrap_or(ctx.undefined());
    drive_async_step(ctx, generator, promise, Ok(value))?;
    Ok(ctx.undefined())
}

fn async_on_rejected(ctx: &mut Context, _self: CellId, args: &[CellId]) -> RunResult<CellId> {
    let generator = closure_cell(ctx, "__generator__")?;
    let promise = closure_cell(ctx, "__promise__")?;
    let value = args.first().copied().unwrap_or(ctx.undefined());
    drive_async_step(ctx, generator, promise, Err(value))?;
    Ok(ctx.undefined())
}

/// Drains the microtask queue in FIFO order. Runs after every synchronous
/// top-level segment, before control returns to the embedder.
pub(crate) fn drain_microtasks(ctx: &mut Context) -> RunResult<()> {
    while let Some(job) = ctx.dequeue_job() {
        match job {
            Job::Call { func, this, args } => {
                let frame = Frame {
                    filename: 0,
                    line: 0,
                    column: 0,
                    funcname: callee_name(ctx, func),
                };
                // Unhandled rejections inside reactions are dropped.
                let _ = apply(ctx, func, this, args, frame)?;
            }
            Job::ResumeAsync {
                generator,
                promise,
                input,
            } => {
                drive_async_step(ctx, generator, promise, input)?;
            }
        }
    }
    Ok(())
}
