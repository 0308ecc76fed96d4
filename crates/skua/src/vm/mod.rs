//! The bytecode interpreter.
//!
//! Per-call state: an evaluation stack of cells, a stack of stack-top marks
//! (one per pushed scope), an error-frame stack, a deferred-resume pc stack
//! and the program counter. Every opcode that can fail produces an exception
//! cell rather than a host unwind: the step result is a uniform "ok" /
//! "unwind" discriminator, and the loop head walks the error frames —
//! visiting deferred finally handlers on every exit path — until a handler
//! takes the exception or it crosses to the caller as the call result.
//!
//! `YIELD`, `YIELD_DELEGATE` and `AWAIT` exit the loop with a task marker on
//! the stack; the whole state is parked in a coroutine record and re-entered
//! by `next()`/`throw()`/`return()` or by the async driver.

pub(crate) mod call;
pub(crate) mod iter;
pub(crate) mod ops;

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    bytecode::{Opcode, Program},
    context::{Context, Frame, ScopeId},
    error::{ErrorKind, RunError, RunResult},
    heap::CellId,
    value::{Entity, FunctionData, ObjectData, TaskData, TaskKind},
};

/// One open `TRY` region.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ErrorFrame {
    /// The scope active when the frame was opened; unwinding restores it.
    pub scope: ScopeId,
    /// Catch handler pc, or 0 when the region has no handler.
    pub catch_pc: u32,
    /// Deferred finally pc, or 0.
    pub defer_pc: u32,
}

/// The complete interpreter state of one activation. Suspending a coroutine
/// parks this whole structure.
#[derive(Debug)]
pub(crate) struct VmState {
    pub stack: Vec<CellId>,
    pub stack_tops: Vec<usize>,
    pub err_frames: Vec<ErrorFrame>,
    pub defer_stack: Vec<u32>,
    pub pc: usize,
    /// The scope that was current at the moment of suspension.
    pub suspend_scope: ScopeId,
}

impl VmState {
    pub fn new(pc: usize) -> Self {
        Self {
            stack: Vec::new(),
            stack_tops: Vec::new(),
            err_frames: Vec::new(),
            defer_stack: Vec::new(),
            pc,
            suspend_scope: ScopeId::root_id(),
        }
    }
}

/// Lifecycle of a generator/async coroutine.
#[derive(Debug)]
pub(crate) enum CoroutineState {
    Created { address: u32 },
    Running,
    Suspended(Box<VmState>),
    Completed,
}

/// A suspendable activation: saved eval state, scope, program handle and
/// display name.
#[derive(Debug)]
pub(crate) struct Coroutine {
    pub state: CoroutineState,
    pub base_scope: ScopeId,
    pub program: Rc<Program>,
    pub funcname: String,
    pub is_async: bool,
}

impl Coroutine {
    /// Cells pinned by a suspended activation.
    pub(crate) fn edges(&self, out: &mut Vec<CellId>) {
        if let CoroutineState::Suspended(state) = &self.state {
            out.extend(state.stack.iter().copied());
        }
    }
}

// ---- decoding ----

fn fetch_op(program: &Program, pc: &mut usize) -> RunResult<Opcode> {
    let code = &program.code;
    let bytes: [u8; 2] = code
        .get(*pc..*pc + 2)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| RunError::internal("truncated instruction"))?;
    *pc += 2;
    Opcode::from_repr(u16::from_le_bytes(bytes)).ok_or_else(|| RunError::internal("unknown opcode"))
}

fn fetch_u32(program: &Program, pc: &mut usize) -> RunResult<u32> {
    let bytes: [u8; 4] = program
        .code
        .get(*pc..*pc + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| RunError::internal("truncated immediate"))?;
    *pc += 4;
    Ok(u32::from_le_bytes(bytes))
}

fn fetch_f64(program: &Program, pc: &mut usize) -> RunResult<f64> {
    let bytes: [u8; 8] = program
        .code
        .get(*pc..*pc + 8)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| RunError::internal("truncated immediate"))?;
    *pc += 8;
    Ok(f64::from_le_bytes(bytes))
}

fn fetch_const<'a>(program: &'a Program, pc: &mut usize) -> RunResult<&'a str> {
    let index = fetch_u32(program, pc)?;
    program
        .constants
        .get(index as usize)
        .map(String::as_str)
        .ok_or_else(|| RunError::internal("constant index out of range"))
}

fn number_entity(value: f64) -> Entity {
    if value.is_nan() {
        Entity::NaN
    } else if value.is_infinite() {
        Entity::Infinity { negative: value < 0.0 }
    } else {
        Entity::Number(value)
    }
}

/// Runs bytecode until completion or suspension. The returned cell is the
/// final value, an exception cell (uncaught), or a task marker (suspended).
pub(crate) fn run(ctx: &mut Context, program: &Rc<Program>, state: &mut VmState) -> RunResult<CellId> {
    let end = program.code.len();
    loop {
        // Unwinding: entered whenever the pc runs off the end with error
        // frames still open (RET, THROW, forced completion).
        while state.pc >= end {
            if state.err_frames.is_empty() {
                let result = state.stack.last().copied().unwrap_or_else(|| ctx.undefined());
                if matches!(ctx.heap.entity(ctx.heap.resolve(result)), Entity::Task(_)) {
                    // Suspending: the task is the signal, not part of the
                    // parked stack. Popping it here lets the resume push
                    // the sent value exactly where the yield result
                    // belongs, so a yield nested in a larger expression
                    // finds its operands intact. The task cell stays
                    // pinned under the coroutine scope.
                    state.stack.pop();
                }
                return Ok(result);
            }
            let result = state.stack.last().copied().unwrap_or_else(|| ctx.undefined());
            if matches!(ctx.heap.entity(ctx.heap.resolve(result)), Entity::Task(_)) {
                // Suspension crosses protected regions untouched; the frames
                // stay parked with the rest of the state.
                state.stack.pop();
                return Ok(result);
            }
            let frame = state.err_frames.pop().expect("checked non-empty");
            ctx.pin_in_scope(frame.scope, result);
            state.stack.pop();
            while ctx.current_scope() != frame.scope {
                if let Some(mark) = state.stack_tops.pop() {
                    state.stack.truncate(mark);
                }
                ctx.pop_scope();
            }
            state.stack.push(result);
            let is_exception = matches!(ctx.heap.entity(ctx.heap.resolve(result)), Entity::Exception(_));
            if is_exception && frame.catch_pc != 0 {
                state.stack.pop();
                let bound = ops::unwrap_exception(ctx, result)?;
                state.stack.push(bound);
                state.pc = frame.catch_pc as usize;
                if frame.defer_pc != 0 {
                    // The finally still guards the catch body.
                    state.err_frames.push(ErrorFrame {
                        scope: frame.scope,
                        catch_pc: 0,
                        defer_pc: frame.defer_pc,
                    });
                }
            } else if frame.defer_pc != 0 {
                state.defer_stack.push(state.pc as u32);
                state.pc = frame.defer_pc as usize;
            }
        }

        let op_pc = state.pc;
        let op = fetch_op(program, &mut state.pc)?;
        ctx.tracer.on_op(op_pc as u32, op);
        if let Err(error) = step(ctx, program, state, op, op_pc) {
            let exception = ctx.exception_from_error(error)?;
            if let Entity::Exception(data) = ctx.heap.entity(exception) {
                let message = data.message.clone();
                ctx.tracer.on_throw(&message);
            }
            state.stack.push(exception);
            state.pc = end;
        }
    }
}

fn pop(state: &mut VmState) -> RunResult<CellId> {
    state
        .stack
        .pop()
        .ok_or_else(|| RunError::internal("evaluation stack underflow"))
}

fn top(state: &VmState) -> RunResult<CellId> {
    state
        .stack
        .last()
        .copied()
        .ok_or_else(|| RunError::internal("evaluation stack underflow"))
}

fn pop_args(state: &mut VmState, count: u32) -> RunResult<Vec<CellId>> {
    let mut args = Vec::with_capacity(count as usize);
    for _ in 0..count {
        args.push(pop(state)?);
    }
    args.reverse();
    Ok(args)
}

fn call_frame(ctx: &mut Context, program: &Program, op_pc: usize, funcname: String) -> Frame {
    let filename = ctx.filename_id(&program.filename);
    let position = program.lookup_position(op_pc as u32);
    Frame {
        filename,
        line: position.map_or(0, |p| p.line + 1),
        column: position.map_or(0, |p| p.column + 1),
        funcname,
    }
}

#[expect(clippy::too_many_lines, reason = "one arm per opcode")]
fn step(ctx: &mut Context, program: &Rc<Program>, state: &mut VmState, op: Opcode, op_pc: usize) -> RunResult<()> {
    let end = program.code.len();
    match op {
        Opcode::PushNull => state.stack.push(ctx.null()),
        Opcode::PushUndefined => state.stack.push(ctx.undefined()),
        Opcode::PushTrue => {
            let cell = ctx.boolean(true)?;
            state.stack.push(cell);
        }
        Opcode::PushFalse => {
            let cell = ctx.boolean(false)?;
            state.stack.push(cell);
        }
        Opcode::PushUninitialized => {
            let cell = ctx.create_value(Entity::Uninitialized)?;
            state.stack.push(cell);
        }
        Opcode::Push => {
            let value = fetch_f64(program, &mut state.pc)?;
            let cell = ctx.number(value)?;
            state.stack.push(cell);
        }
        Opcode::PushObject => {
            let cell = ctx.object()?;
            state.stack.push(cell);
        }
        Opcode::PushArray => {
            let cell = ctx.array()?;
            state.stack.push(cell);
        }
        Opcode::PushFunction => {
            let cell = make_function(ctx, program, false, false)?;
            state.stack.push(cell);
        }
        Opcode::PushGenerator => {
            let cell = make_function(ctx, program, true, false)?;
            state.stack.push(cell);
        }
        Opcode::PushArrow => {
            let cell = make_function(ctx, program, false, true)?;
            state.stack.push(cell);
        }
        Opcode::PushThis => {
            let cell = load_name(ctx, "this")?;
            state.stack.push(cell);
        }
        Opcode::PushSuper => {
            // The parent prototype of the receiver: `this.[[proto]].[[proto]]`.
            let this = load_name(ctx, "this")?;
            let base = ctx.heap.resolve(this);
            let prototype = ctx.heap.entity(base).object_data().and_then(|data| data.prototype);
            let parent = prototype.and_then(|proto| {
                ctx.heap.entity(proto).object_data().and_then(|data| data.prototype)
            });
            state.stack.push(parent.unwrap_or_else(|| ctx.undefined()));
        }
        Opcode::PushBigint => {
            let digits = fetch_const(program, &mut state.pc)?.to_owned();
            let value = parse_bigint(&digits)
                .ok_or_else(|| RunError::new(ErrorKind::SyntaxError, format!("Cannot convert {digits} to a BigInt")))?;
            let cell = ctx.create_value(Entity::BigInt(value))?;
            state.stack.push(cell);
        }
        Opcode::PushRegex => {
            let source = fetch_const(program, &mut state.pc)?.to_owned();
            let cell = make_regex(ctx, &source)?;
            state.stack.push(cell);
        }
        Opcode::SetRegexHasIndices
        | Opcode::SetRegexGlobal
        | Opcode::SetRegexIgnoreCases
        | Opcode::SetRegexMultiline
        | Opcode::SetRegexDotAll
        | Opcode::SetRegexSticky => {
            let flag = pop(state)?;
            let enabled = ops::to_boolean(ctx, flag);
            let name = match op {
                Opcode::SetRegexHasIndices => "hasIndices",
                Opcode::SetRegexGlobal => "global",
                Opcode::SetRegexIgnoreCases => "ignoreCase",
                Opcode::SetRegexMultiline => "multiline",
                Opcode::SetRegexDotAll => "dotAll",
                _ => "sticky",
            };
            let object = top(state)?;
            let value = ctx.boolean(enabled)?;
            ops::define_hidden(ctx, object, name, value);
        }
        Opcode::PushValue => {
            let offset = fetch_u32(program, &mut state.pc)? as usize;
            if offset != 0 && offset <= state.stack.len() {
                let cell = state.stack[state.stack.len() - offset];
                let shared = ctx.heap.share(cell);
                let copy = ctx.create_value(shared)?;
                state.stack.push(copy);
            } else {
                state.stack.push(ctx.undefined());
            }
        }
        Opcode::LoadConst => {
            let value = fetch_const(program, &mut state.pc)?.to_owned();
            let cell = ctx.string(value)?;
            state.stack.push(cell);
        }
        Opcode::SetFuncAddress => {
            let address = fetch_u32(program, &mut state.pc)?;
            with_function(ctx, state, |data| data.address = address)?;
        }
        Opcode::SetFuncAsync => {
            let flag = fetch_u32(program, &mut state.pc)?;
            with_function(ctx, state, |data| data.is_async = flag != 0)?;
        }
        Opcode::SetFuncName => {
            let name = fetch_const(program, &mut state.pc)?.to_owned();
            with_function(ctx, state, |data| {
                if data.name.is_empty() {
                    data.name = name;
                }
            })?;
        }
        Opcode::SetFuncLen => {
            let length = fetch_u32(program, &mut state.pc)?;
            with_function(ctx, state, |data| data.length = length)?;
        }
        Opcode::SetFuncSource => {
            let source = fetch_const(program, &mut state.pc)?.to_owned();
            with_function(ctx, state, |data| data.source = source)?;
        }
        Opcode::SetClosure => {
            let name = fetch_const(program, &mut state.pc)?.to_owned();
            let cell = top(state)?;
            let target = ctx.heap.resolve(cell);
            if let Some(binding) = ctx.lookup(&name) {
                let mut attached = false;
                if let Entity::Function(data) = ctx.heap.entity_mut(target) {
                    data.closure.insert(name, binding.cell);
                    attached = true;
                }
                if attached {
                    ctx.heap.link(target, binding.cell);
                }
            }
        }
        Opcode::SetField => {
            let key = pop(state)?;
            let value = pop(state)?;
            let object = top(state)?;
            ops::set_property(ctx, object, key, value)?;
            state.stack.push(value);
        }
        Opcode::GetField => {
            let key = pop(state)?;
            let object = pop(state)?;
            let value = ops::get_property(ctx, object, key)?;
            state.stack.push(value);
        }
        Opcode::GetKeys => {
            let object = pop(state)?;
            let iterable = iter::make_keys_iterable(ctx, object)?;
            state.stack.push(iterable);
        }
        Opcode::SetAccessor => {
            let is_getter = fetch_u32(program, &mut state.pc)? != 0;
            let key = pop(state)?;
            let accessor = pop(state)?;
            let object = top(state)?;
            ops::set_accessor(ctx, object, key, accessor, is_getter)?;
            let cell = ctx.boolean(true)?;
            state.stack.push(cell);
        }
        Opcode::Delete => {
            let key = pop(state)?;
            let object = pop(state)?;
            let removed = ops::delete_property(ctx, object, key)?;
            let cell = ctx.boolean(removed)?;
            state.stack.push(cell);
        }
        Opcode::Merge => {
            let source = pop(state)?;
            let destination = top(state)?;
            iter::merge(ctx, destination, source)?;
        }
        Opcode::Pop => {
            let count = fetch_u32(program, &mut state.pc)? as usize;
            let new_len = state.stack.len().saturating_sub(count);
            state.stack.truncate(new_len);
        }
        Opcode::StoreConst => {
            let name = fetch_const(program, &mut state.pc)?.to_owned();
            let value = pop(state)?;
            store_const_name(ctx, &name, value)?;
        }
        Opcode::Store => {
            let name = fetch_const(program, &mut state.pc)?.to_owned();
            let value = pop(state)?;
            store_name(ctx, &name, value)?;
        }
        Opcode::Load => {
            let name = fetch_const(program, &mut state.pc)?.to_owned();
            let cell = load_name(ctx, &name)?;
            state.stack.push(cell);
        }
        Opcode::Ret => state.pc = end,
        Opcode::Throw => {
            let value = pop(state)?;
            let exception = ops::wrap_thrown(ctx, value)?;
            if let Entity::Exception(data) = ctx.heap.entity(exception) {
                let message = data.message.clone();
                ctx.tracer.on_throw(&message);
            }
            state.stack.push(exception);
            state.pc = end;
        }
        Opcode::Yield => {
            let value = pop(state)?;
            let value = ops::reify(ctx, value)?;
            let task = ctx.create_value(Entity::Task(TaskData {
                value,
                resume: state.pc as u32,
                kind: TaskKind::Yield,
            }))?;
            state.stack.push(task);
            state.pc = end;
        }
        Opcode::YieldDelegate => yield_delegate(ctx, state, op_pc, end)?,
        Opcode::Await => {
            let value = pop(state)?;
            let value = ops::reify(ctx, value)?;
            let task = ctx.create_value(Entity::Task(TaskData {
                value,
                resume: state.pc as u32,
                kind: TaskKind::Await,
            }))?;
            state.stack.push(task);
            state.pc = end;
        }
        Opcode::Void => {
            pop(state)?;
            state.stack.push(ctx.undefined());
        }
        Opcode::TypeOf => {
            let value = pop(state)?;
            let resolved = ctx.heap.resolve(value);
            let name = ctx.heap.entity(resolved).type_name();
            let cell = ctx.string(name)?;
            state.stack.push(cell);
        }
        Opcode::New => {
            let count = fetch_u32(program, &mut state.pc)?;
            let args = pop_args(state, count)?;
            let callee = pop(state)?;
            let funcname = call::callee_name(ctx, callee);
            let frame = call_frame(ctx, program, op_pc, funcname);
            let result = call::construct(ctx, callee, args, frame)?;
            state.stack.push(result);
            if matches!(ctx.heap.entity(ctx.heap.resolve(result)), Entity::Exception(_)) {
                state.pc = end;
            }
        }
        Opcode::PushScope => {
            ctx.push_scope()?;
            state.stack_tops.push(state.stack.len());
        }
        Opcode::PopScope => {
            if let Some(mark) = state.stack_tops.pop() {
                state.stack.truncate(mark);
            }
            ctx.pop_scope();
        }
        Opcode::Call | Opcode::OptionalCall => {
            let count = fetch_u32(program, &mut state.pc)?;
            let args = pop_args(state, count)?;
            let callee = pop(state)?;
            if op == Opcode::OptionalCall && ops::is_nullish(ctx, callee) {
                state.stack.push(ctx.undefined());
            } else {
                let funcname = call::callee_name(ctx, callee);
                let frame = call_frame(ctx, program, op_pc, funcname);
                let undefined = ctx.undefined();
                let result = call::apply(ctx, callee, undefined, args, frame)?;
                state.stack.push(result);
                if matches!(ctx.heap.entity(ctx.heap.resolve(result)), Entity::Exception(_)) {
                    state.pc = end;
                }
            }
        }
        Opcode::MemberCall | Opcode::MemberOptionalCall => {
            let count = fetch_u32(program, &mut state.pc)?;
            let args = pop_args(state, count)?;
            let key = pop(state)?;
            let receiver = pop(state)?;
            let callee = ops::get_property(ctx, receiver, key)?;
            if op == Opcode::MemberOptionalCall && ops::is_nullish(ctx, callee) {
                state.stack.push(ctx.undefined());
            } else {
                if !ops::is_callable(ctx, callee) {
                    let rendered = ops::to_string_value(ctx, key).unwrap_or_else(|_| "property".to_owned());
                    return Err(RunError::type_error(format!("{rendered} is not a function")));
                }
                let funcname = call::callee_name(ctx, callee);
                let frame = call_frame(ctx, program, op_pc, funcname);
                let result = call::apply(ctx, callee, receiver, args, frame)?;
                state.stack.push(result);
                if matches!(ctx.heap.entity(ctx.heap.resolve(result)), Entity::Exception(_)) {
                    state.pc = end;
                }
            }
        }
        Opcode::Jmp => {
            let target = fetch_u32(program, &mut state.pc)?;
            state.pc = target as usize;
        }
        Opcode::Jtrue => {
            let target = fetch_u32(program, &mut state.pc)?;
            if ops::to_boolean(ctx, top(state)?) {
                state.pc = target as usize;
            }
        }
        Opcode::Jfalse => {
            let target = fetch_u32(program, &mut state.pc)?;
            if !ops::to_boolean(ctx, top(state)?) {
                state.pc = target as usize;
            }
        }
        Opcode::Jnull => {
            let target = fetch_u32(program, &mut state.pc)?;
            if ops::is_nullish(ctx, top(state)?) {
                state.pc = target as usize;
            }
        }
        Opcode::JnotNull => {
            let target = fetch_u32(program, &mut state.pc)?;
            if !ops::is_nullish(ctx, top(state)?) {
                state.pc = target as usize;
            }
        }
        Opcode::Try => {
            let catch_pc = fetch_u32(program, &mut state.pc)?;
            state.err_frames.push(ErrorFrame {
                scope: ctx.current_scope(),
                catch_pc,
                defer_pc: 0,
            });
        }
        Opcode::Defer => {
            let defer_pc = fetch_u32(program, &mut state.pc)?;
            let frame = state
                .err_frames
                .last_mut()
                .ok_or_else(|| RunError::internal("DEFER without an open TRY"))?;
            frame.defer_pc = defer_pc;
        }
        Opcode::EndTry => {
            let frame = state
                .err_frames
                .pop()
                .ok_or_else(|| RunError::internal("END_TRY without an open TRY"))?;
            if frame.defer_pc != 0 {
                state.defer_stack.push(state.pc as u32);
                state.pc = frame.defer_pc as usize;
            }
        }
        Opcode::EndDefer => {
            let resume = state
                .defer_stack
                .pop()
                .ok_or_else(|| RunError::internal("END_DEFER without a pending defer"))?;
            state.pc = resume as usize;
        }
        Opcode::Next => iter::next_step(ctx, &mut state.stack)?,
        Opcode::RestArray => iter::rest_array(ctx, &mut state.stack)?,
        Opcode::RestObject => {
            let count = fetch_u32(program, &mut state.pc)?;
            iter::rest_object(ctx, &mut state.stack, count)?;
        }
        Opcode::Inc | Opcode::Dec => {
            let postfix = fetch_u32(program, &mut state.pc)? != 0;
            let delta = if op == Opcode::Inc { 1.0 } else { -1.0 };
            increment(ctx, state, delta, postfix)?;
        }
        Opcode::Plus => {
            let value = pop(state)?;
            let number = ops::to_number(ctx, value)?;
            let cell = ctx.number(number)?;
            state.stack.push(cell);
        }
        Opcode::Neta => {
            let value = pop(state)?;
            let cell = match ops::to_numeric(ctx, value)? {
                ops::Numeric::Number(n) => ctx.number(-n)?,
                ops::Numeric::BigInt(b) => ctx.create_value(Entity::BigInt(-b))?,
            };
            state.stack.push(cell);
        }
        Opcode::Not => {
            let value = pop(state)?;
            let cell = match ops::to_numeric(ctx, value)? {
                ops::Numeric::Number(n) => ctx.number(f64::from(!ops::to_int32(n)))?,
                ops::Numeric::BigInt(b) => ctx.create_value(Entity::BigInt(-b - 1))?,
            };
            state.stack.push(cell);
        }
        Opcode::Lnot => {
            let value = pop(state)?;
            let result = !ops::to_boolean(ctx, value);
            let cell = ctx.boolean(result)?;
            state.stack.push(cell);
        }
        Opcode::Pow
        | Opcode::Mul
        | Opcode::Div
        | Opcode::Mod
        | Opcode::Add
        | Opcode::Sub
        | Opcode::Ushr
        | Opcode::Shr
        | Opcode::Shl
        | Opcode::Ge
        | Opcode::Le
        | Opcode::Gt
        | Opcode::Lt
        | Opcode::Seq
        | Opcode::Sne
        | Opcode::Eq
        | Opcode::Ne
        | Opcode::And
        | Opcode::Or
        | Opcode::Xor
        | Opcode::In
        | Opcode::InstanceOf => {
            let right = pop(state)?;
            let left = pop(state)?;
            let result = ops::binary(ctx, op, left, right)?;
            state.stack.push(result);
        }
    }
    Ok(())
}

// ---- opcode helpers ----

fn make_function(ctx: &mut Context, program: &Rc<Program>, is_generator: bool, is_arrow: bool) -> RunResult<CellId> {
    let prototype = ctx.intrinsics.function_prototype;
    let data = FunctionData {
        object: ObjectData::with_prototype(Some(prototype)),
        is_async: false,
        is_generator,
        is_arrow,
        address: 0,
        length: 0,
        name: String::new(),
        source: String::new(),
        closure: IndexMap::new(),
        bound_self: None,
        program: program.clone(),
    };
    let cell = ctx.create_value(Entity::Function(data))?;
    if is_arrow {
        // Arrows capture `this` lexically at creation; the call sequence
        // never rebinds it for them.
        if let Some(binding) = ctx.lookup("this") {
            let mut attached = false;
            if let Entity::Function(data) = ctx.heap.entity_mut(cell) {
                data.closure.insert("this".to_owned(), binding.cell);
                attached = true;
            }
            if attached {
                ctx.heap.link(cell, binding.cell);
            }
        }
    } else {
        let proto = ctx.object()?;
        ops::define_hidden(ctx, proto, "constructor", cell);
        ops::define_hidden(ctx, cell, "prototype", proto);
    }
    Ok(cell)
}

fn make_regex(ctx: &mut Context, source: &str) -> RunResult<CellId> {
    let cell = ctx.object()?;
    let source_cell = ctx.string(source)?;
    ops::define_hidden(ctx, cell, "source", source_cell);
    let zero = ctx.number(0.0)?;
    ops::define_hidden(ctx, cell, "lastIndex", zero);
    for flag in ["hasIndices", "global", "ignoreCase", "multiline", "dotAll", "sticky"] {
        let value = ctx.boolean(false)?;
        ops::define_hidden(ctx, cell, flag, value);
    }
    Ok(cell)
}

fn parse_bigint(digits: &str) -> Option<num_bigint::BigInt> {
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        return num_bigint::BigInt::parse_bytes(hex.as_bytes(), 16);
    }
    if let Some(oct) = digits.strip_prefix("0o").or_else(|| digits.strip_prefix("0O")) {
        return num_bigint::BigInt::parse_bytes(oct.as_bytes(), 8);
    }
    num_bigint::BigInt::parse_bytes(digits.as_bytes(), 10)
}

fn with_function(ctx: &mut Context, state: &VmState, apply: impl FnOnce(&mut FunctionData)) -> RunResult<()> {
    let cell = top(state)?;
    let target = ctx.heap.resolve(cell);
    match ctx.heap.entity_mut(target) {
        Entity::Function(data) => {
            apply(data);
            Ok(())
        }
        _ => Err(RunError::internal("SET_FUNC_* on a non-function")),
    }
}

/// `STORE`: binds the name in the nearest scope where it is declared, or
/// creates a binding in the current scope. Storing the uninitialized marker
/// is the allocation idiom and always creates in the current scope, which is
/// what makes shadowing work.
fn store_name(ctx: &mut Context, name: &str, value: CellId) -> RunResult<()> {
    if matches!(ctx.heap.entity(value), Entity::Uninitialized) {
        ctx.define(name, value, false);
        return Ok(());
    }
    if let Some(binding) = ctx.lookup(name) {
        if binding.constant {
            return Err(RunError::type_error("Assignment to constant variable."));
        }
        let shared = ctx.heap.share(value);
        ctx.heap.set_entity(binding.cell, shared);
        return Ok(());
    }
    let shared = ctx.heap.share(value);
    let cell = ctx.create_value(shared)?;
    ctx.define(name, cell, false);
    Ok(())
}

/// `STORE_CONST`: requires the binding to still be uninitialized and flips
/// it to initialized-const.
fn store_const_name(ctx: &mut Context, name: &str, value: CellId) -> RunResult<()> {
    if let Some(binding) = ctx.lookup(name) {
        if !matches!(ctx.heap.entity(binding.cell), Entity::Uninitialized) {
            return Err(RunError::type_error("Assignment to constant variable."));
        }
        let shared = ctx.heap.share(value);
        ctx.heap.set_entity(binding.cell, shared);
        ctx.set_binding_constant(name);
        return Ok(());
    }
    let shared = ctx.heap.share(value);
    let cell = ctx.create_value(shared)?;
    ctx.define(name, cell, true);
    Ok(())
}

/// `LOAD`: scope-chain lookup; undeclared names and temporal-dead-zone
/// bindings raise `ReferenceError`.
fn load_name(ctx: &mut Context, name: &str) -> RunResult<CellId> {
    let Some(binding) = ctx.lookup(name) else {
        return Err(RunError::reference_error(format!("{name} is not defined")));
    };
    if matches!(ctx.heap.entity(binding.cell), Entity::Uninitialized) {
        return Err(RunError::reference_error(format!(
            "Cannot access '{name}' before initialization"
        )));
    }
    Ok(binding.cell)
}

/// `INC`/`DEC`: mutates the cell in place (closures and properties holding
/// the cell observe the update); pushes the old value for postfix forms and
/// the new one for prefix forms.
fn increment(ctx: &mut Context, state: &mut VmState, delta: f64, postfix: bool) -> RunResult<()> {
    let cell = pop(state)?;
    let numeric = ops::to_numeric(ctx, cell)?;
    if postfix {
        let old = match &numeric {
            ops::Numeric::Number(n) => ctx.number(*n)?,
            ops::Numeric::BigInt(b) => ctx.create_value(Entity::BigInt(b.clone()))?,
        };
        state.stack.push(old);
    }
    let new_entity = match numeric {
        ops::Numeric::Number(n) => number_entity(n + delta),
        ops::Numeric::BigInt(b) => Entity::BigInt(b + num_bigint::BigInt::from(delta as i64)),
    };
    ctx.heap.set_entity(cell, new_entity);
    if !postfix {
        let new = ctx.heap.share(cell);
        let copy = ctx.create_value(new)?;
        state.stack.push(copy);
    }
    Ok(())
}

/// `YIELD_DELEGATE`: drives one step of the delegated iterator. When the
/// inner iterator is not done, the produced value is wrapped in a task whose
/// resume address points back at this instruction, so resuming re-enters the
/// delegation loop.
fn yield_delegate(ctx: &mut Context, state: &mut VmState, op_pc: usize, end: usize) -> RunResult<()> {
    let argument = pop(state)?;
    let generator = pop(state)?;
    let iterable = pop(state)?;
    let generator = if ops::is_nullish(ctx, generator) {
        iter::open_iterator(ctx, iterable)?
    } else {
        generator
    };
    let next_key = ops::PropKey::String("next".to_owned());
    let next = ops::get_property_by_key(ctx, generator, &next_key)?;
    if !ops::is_callable(ctx, next) {
        return Err(RunError::type_error("yield* requires an iterator with a 'next' method"));
    }
    let args = if matches!(ctx.heap.entity(ctx.heap.resolve(argument)), Entity::Undefined) {
        Vec::new()
    } else {
        vec![argument]
    };
    let (value, done) = iter::iterator_step_with(ctx, generator, next, args)?;
    if ops::to_boolean(ctx, done) {
        state.stack.push(value);
        return Ok(());
    }
    state.stack.push(iterable);
    state.stack.push(generator);
    let value = ops::reify(ctx, value)?;
    let task = ctx.create_value(Entity::Task(TaskData {
        value,
        resume: op_pc as u32,
        kind: TaskKind::Yield,
    }))?;
    state.stack.push(task);
    state.pc = end;
    Ok(())
}
