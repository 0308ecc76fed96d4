//! Public interface for running source text.
//!
//! `Runner` parses and compiles once, then executes against a fresh context
//! per run: source text → lexer → parser → compiler → program → VM. Runs
//! drain the microtask queue before returning and drive top-level `await`
//! to completion.

use std::rc::Rc;

use crate::{
    bytecode::{Program, compile},
    context::{Context, EngineLimits, Frame},
    error::{ErrorKind, Exception, RunError},
    heap::CellId,
    host,
    io::{CollectStringPrint, PrintWriter, StdPrint},
    object::{Object, from_cell},
    parser::parse,
    tracer::{NoopTracer, VmTracer},
    value::{Entity, PromiseState, TaskKind},
    vm::{self, VmState, call},
};

/// Parses, compiles and runs programs.
///
/// # Example
/// ```
/// use skua::{Object, Runner};
///
/// let runner = Runner::new("1 + 2", "test.js").unwrap();
/// assert_eq!(runner.run().unwrap(), Object::Number(3.0));
/// ```
#[derive(Debug, Clone)]
pub struct Runner {
    program: Rc<Program>,
    limits: EngineLimits,
}

impl Runner {
    /// Parses and compiles `source`. Syntax errors from either stage are
    /// reported with their caret context.
    pub fn new(source: &str, filename: &str) -> Result<Self, Exception> {
        let parsed = parse(source, filename).map_err(Exception::from)?;
        let program = compile(&parsed, filename, source).map_err(Exception::from)?;
        Ok(Self {
            program: Rc::new(program),
            limits: EngineLimits::default(),
        })
    }

    pub fn with_limits(mut self, limits: EngineLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Assembly rendering of the compiled program.
    pub fn disassemble(&self) -> String {
        self.program.disassemble()
    }

    /// Runs the program, printing through standard output.
    pub fn run(&self) -> Result<Object, Exception> {
        self.run_with(Box::new(StdPrint), Box::new(NoopTracer))
    }

    /// Runs the program, returning the result together with everything the
    /// program printed.
    pub fn run_collect(&self) -> Result<(Object, String), Exception> {
        let collector = CollectStringPrint::new();
        let handle = collector.handle();
        let result = self.run_with(Box::new(collector), Box::new(NoopTracer))?;
        let output = handle.borrow().clone();
        Ok((result, output))
    }

    /// Runs with an explicit print writer and tracer.
    pub fn run_with(&self, print: Box<dyn PrintWriter>, tracer: Box<dyn VmTracer>) -> Result<Object, Exception> {
        let mut ctx = Context::new(self.limits).map_err(plain_exception)?;
        host::install(&mut ctx).map_err(plain_exception)?;
        ctx.print = print;
        ctx.tracer = tracer;

        let filename = ctx.filename_id(&self.program.filename);
        ctx.push_frame(Frame {
            filename,
            line: 1,
            column: 1,
            funcname: "<module>".to_owned(),
        })
        .map_err(plain_exception)?;

        let mut state = VmState::new(0);
        let mut result = vm::run(&mut ctx, &self.program, &mut state).map_err(plain_exception)?;

        // Drive top-level `await` and drain the microtask queue until the
        // run settles into a plain value or an uncaught exception.
        loop {
            let resolved = ctx.heap.resolve(result);
            match ctx.heap.entity(resolved) {
                Entity::Task(task) if task.kind == TaskKind::Await => {
                    let task = *task;
                    call::drain_microtasks(&mut ctx).map_err(plain_exception)?;
                    let awaited = ctx.heap.resolve(task.value);
                    let resume = match ctx.heap.entity(awaited) {
                        Entity::Promise(promise) => match promise.state {
                            PromiseState::Fulfilled => Ok(promise.value.unwrap_or(ctx.undefined())),
                            PromiseState::Rejected => Err(promise.value.unwrap_or(ctx.undefined())),
                            PromiseState::Pending => {
                                return Err(Exception::new(
                                    ErrorKind::TypeError,
                                    "Top-level await did not settle",
                                ));
                            }
                        },
                        _ => Ok(task.value),
                    };
                    match resume {
                        Ok(value) => {
                            state.stack.push(value);
                            state.pc = task.resume as usize;
                        }
                        Err(value) => {
                            let exception = vm::ops::wrap_thrown(&mut ctx, value).map_err(plain_exception)?;
                            state.stack.push(exception);
                            state.pc = self.program.code.len();
                        }
                    }
                    result = vm::run(&mut ctx, &self.program, &mut state).map_err(plain_exception)?;
                }
                Entity::Task(_) => {
                    return Err(Exception::new(
                        ErrorKind::TypeError,
                        "yield is only valid inside a generator",
                    ));
                }
                Entity::Exception(_) => {
                    return Err(host_exception(&ctx, resolved));
                }
                _ => {
                    // Snapshot the completion value before reactions run;
                    // the cell may be a binding a reaction mutates.
                    let object = from_cell(&mut ctx, result, 24).map_err(plain_exception)?;
                    call::drain_microtasks(&mut ctx).map_err(plain_exception)?;
                    ctx.pop_frame();
                    return Ok(object);
                }
            }
        }
    }
}

/// An exception from an internal error with no live context.
fn plain_exception(error: RunError) -> Exception {
    match error {
        RunError::Raise { kind, message, loc } => {
            let mut exception = Exception::new(kind, message);
            exception.loc = loc;
            exception
        }
        RunError::Thrown(_) => Exception::new(ErrorKind::InternalError, "unhandled thrown value"),
    }
}

/// Renders an exception cell as a host exception with its captured stack.
fn host_exception(ctx: &Context, cell: CellId) -> Exception {
    let Entity::Exception(data) = ctx.heap.entity(cell) else {
        return Exception::new(ErrorKind::InternalError, "not an exception");
    };
    Exception {
        kind: data.kind,
        message: data.message.clone(),
        loc: None,
        frames: data.frames.clone(),
        filenames: ctx.filenames(),
    }
}
