//! Execution context: the scope tree, call stack and runtime singletons.
//!
//! A context owns the heap, a slab of runtime scope records with parent
//! indices, the call-frame stack used for stack traces, the microtask
//! queue, and the intrinsic cells the engine core itself depends on. One
//! context is active at a time; coroutines swap the current scope in and
//! out on suspension and resumption.

use std::collections::VecDeque;

use ahash::AHashMap;

use crate::{
    error::{ErrorKind, RunError, RunResult, StackFrame},
    heap::{CellId, Heap},
    io::{PrintWriter, StdPrint},
    tracer::{NoopTracer, VmTracer},
    value::{ArrayData, Entity, ExceptionData, NativeFn, NativeFunctionData, ObjectData, SymbolData},
};

/// Index of a runtime scope record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    /// The root scope is always slot zero.
    pub(crate) fn root_id() -> Self {
        Self(0)
    }
}

/// A named binding in a scope.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScopeBinding {
    pub cell: CellId,
    pub constant: bool,
}

#[derive(Debug)]
struct ScopeRecord {
    parent: Option<ScopeId>,
    children: Vec<ScopeId>,
    /// The internal-kind root cell owning everything created in this scope.
    root: CellId,
    values: AHashMap<String, ScopeBinding>,
}

/// One entry of the call stack, surfaced in stack traces.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub filename: u32,
    pub line: u32,
    pub column: u32,
    pub funcname: String,
}

/// A queued microtask. Jobs run in FIFO order after the current synchronous
/// run completes.
#[derive(Debug)]
pub(crate) enum Job {
    /// Invoke a callback (promise reactions).
    Call {
        func: CellId,
        this: CellId,
        args: Vec<CellId>,
    },
    /// Resume a suspended async-function coroutine with a settled value.
    ResumeAsync {
        generator: CellId,
        promise: CellId,
        input: Result<CellId, CellId>,
    },
}

impl Job {
    fn cells(&self) -> Vec<CellId> {
        match self {
            Self::Call { func, this, args } => {
                let mut cells = vec![*func, *this];
                cells.extend(args.iter().copied());
                cells
            }
            Self::ResumeAsync {
                generator,
                promise,
                input,
            } => {
                let value = match input {
                    Ok(v) | Err(v) => *v,
                };
                vec![*generator, *promise, value]
            }
        }
    }
}

/// Engine resource limits, checked at call and allocation boundaries.
#[derive(Debug, Clone, Copy)]
pub struct EngineLimits {
    pub max_call_depth: usize,
    pub max_cells: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_call_depth: 192,
            max_cells: 1 << 22,
        }
    }
}

/// The intrinsic cells the engine core depends on. All of them are pinned
/// under the root scope for the lifetime of the context.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Intrinsics {
    pub undefined: CellId,
    pub null: CellId,
    pub nan: CellId,
    pub infinity: CellId,
    pub neg_infinity: CellId,
    pub global: CellId,
    pub object_prototype: CellId,
    pub function_prototype: CellId,
    pub array_prototype: CellId,
    pub string_prototype: CellId,
    pub iterator_prototype: CellId,
    pub generator_prototype: CellId,
    pub promise_prototype: CellId,
    pub error_prototype: CellId,
    /// The well-known `Symbol.iterator` symbol cell.
    pub symbol_iterator: CellId,
}

/// Per-execution facade over heap, scopes, call stack and runtime roots.
pub struct Context {
    pub(crate) heap: Heap,
    scopes: Vec<Option<ScopeRecord>>,
    scope_free: Vec<u32>,
    current: ScopeId,
    root: ScopeId,
    pub(crate) frames: Vec<Frame>,
    pub(crate) microtasks: VecDeque<Job>,
    filenames: Vec<String>,
    filename_ids: AHashMap<String, u32>,
    pub(crate) intrinsics: Intrinsics,
    pub(crate) limits: EngineLimits,
    pub(crate) print: Box<dyn PrintWriter>,
    pub(crate) tracer: Box<dyn VmTracer>,
}

impl Context {
    /// Creates a context with its root scope, singletons and intrinsic
    /// shells. Callers normally follow up with the host installers in
    /// [`crate::host`].
    pub(crate) fn new(limits: EngineLimits) -> RunResult<Self> {
        let mut heap = Heap::new(limits.max_cells);
        let root_cell = heap.alloc(Entity::Internal)?;

        let mut make = |entity| -> RunResult<CellId> {
            let id = heap.alloc(entity)?;
            heap.link(root_cell, id);
            Ok(id)
        };
        let undefined = make(Entity::Undefined)?;
        let null = make(Entity::Null)?;
        let nan = make(Entity::NaN)?;
        let infinity = make(Entity::Infinity { negative: false })?;
        let neg_infinity = make(Entity::Infinity { negative: true })?;
        let object_prototype = make(Entity::Object(ObjectData::with_prototype(None)))?;
        let function_prototype = make(Entity::Object(ObjectData::with_prototype(Some(object_prototype))))?;
        let array_prototype = make(Entity::Object(ObjectData::with_prototype(Some(object_prototype))))?;
        let string_prototype = make(Entity::Object(ObjectData::with_prototype(Some(object_prototype))))?;
        let iterator_prototype = make(Entity::Object(ObjectData::with_prototype(Some(object_prototype))))?;
        let generator_prototype = make(Entity::Object(ObjectData::with_prototype(Some(iterator_prototype))))?;
        let promise_prototype = make(Entity::Object(ObjectData::with_prototype(Some(object_prototype))))?;
        let error_prototype = make(Entity::Object(ObjectData::with_prototype(Some(object_prototype))))?;
        let global = make(Entity::Object(ObjectData::with_prototype(Some(object_prototype))))?;
        let symbol_iterator = make(Entity::Symbol(SymbolData {
            description: Some("Symbol.iterator".to_owned()),
        }))?;

        let intrinsics = Intrinsics {
            undefined,
            null,
            nan,
            infinity,
            neg_infinity,
            global,
            object_prototype,
            function_prototype,
            array_prototype,
            string_prototype,
            iterator_prototype,
            generator_prototype,
            promise_prototype,
            error_prototype,
            symbol_iterator,
        };

        let root = ScopeId(0);
        let mut context = Self {
            heap,
            scopes: vec![Some(ScopeRecord {
                parent: None,
                children: Vec::new(),
                root: root_cell,
                values: AHashMap::new(),
            })],
            scope_free: Vec::new(),
            current: root,
            root,
            frames: Vec::new(),
            microtasks: VecDeque::new(),
            filenames: Vec::new(),
            filename_ids: AHashMap::new(),
            intrinsics,
            limits,
            print: Box::new(StdPrint),
            tracer: Box::new(NoopTracer),
        };

        // Root bindings for the singleton values and the global receiver.
        context.define("undefined", undefined, true);
        context.define("NaN", nan, true);
        context.define("Infinity", infinity, true);
        context.define("globalThis", global, true);
        context.define("this", global, false);
        Ok(context)
    }

    // ---- scopes ----

    fn scope(&self, id: ScopeId) -> &ScopeRecord {
        self.scopes[id.0 as usize].as_ref().expect("scope is live")
    }

    fn scope_mut(&mut self, id: ScopeId) -> &mut ScopeRecord {
        self.scopes[id.0 as usize].as_mut().expect("scope is live")
    }

    pub(crate) fn current_scope(&self) -> ScopeId {
        self.current
    }

    pub(crate) fn root_scope(&self) -> ScopeId {
        self.root
    }

    /// Swaps the active scope; used by coroutine suspension and resumption.
    pub(crate) fn set_current_scope(&mut self, scope: ScopeId) {
        self.current = scope;
    }

    /// Pushes a scope as a child of the current one and makes it current.
    pub(crate) fn push_scope(&mut self) -> RunResult<ScopeId> {
        let parent = self.current;
        let id = self.push_scope_under(parent)?;
        self.current = id;
        Ok(id)
    }

    /// Creates a scope under an explicit parent without entering it; used
    /// for coroutine base scopes rooted at the root scope.
    pub(crate) fn push_scope_under(&mut self, parent: ScopeId) -> RunResult<ScopeId> {
        let root_cell = self.heap.alloc(Entity::Internal)?;
        let parent_root = self.scope(parent).root;
        self.heap.link(parent_root, root_cell);
        let record = ScopeRecord {
            parent: Some(parent),
            children: Vec::new(),
            root: root_cell,
            values: AHashMap::new(),
        };
        let id = if let Some(index) = self.scope_free.pop() {
            self.scopes[index as usize] = Some(record);
            ScopeId(index)
        } else {
            self.scopes.push(Some(record));
            ScopeId(self.scopes.len() as u32 - 1)
        };
        self.scope_mut(parent).children.push(id);
        Ok(id)
    }

    /// Destroys the current scope and re-enters its parent, sweeping cells
    /// that became unreachable.
    pub(crate) fn pop_scope(&mut self) {
        let id = self.current;
        let parent = self.scope(id).parent.expect("cannot pop the root scope");
        self.current = parent;
        self.destroy_scope(id);
    }

    /// Destroys a scope subtree: children first, then this scope's edges are
    /// severed and a reachability sweep reclaims what no other root reaches.
    pub(crate) fn destroy_scope(&mut self, id: ScopeId) {
        let children = self.scope(id).children.clone();
        for child in children {
            self.destroy_scope(child);
        }
        let record = self.scopes[id.0 as usize].take().expect("scope is live");
        if let Some(parent) = record.parent
            && let Some(parent_record) = self.scopes[parent.0 as usize].as_mut()
        {
            parent_record.children.retain(|&c| c != id);
            let parent_root = parent_record.root;
            self.heap.unlink(parent_root, record.root);
        }
        let detached = self.heap.detach_children(record.root);
        self.heap.destroy(record.root);
        self.heap.sweep_detached(detached);
        self.scope_free.push(id.0);
    }

    // ---- values ----

    /// Allocates a cell pinned under the current scope root.
    pub(crate) fn create_value(&mut self, entity: Entity) -> RunResult<CellId> {
        let id = self.heap.alloc(entity)?;
        let root = self.scope(self.current).root;
        self.heap.link(root, id);
        Ok(id)
    }

    /// Pins an existing cell under `scope`, keeping it alive across the
    /// teardown of inner scopes.
    pub(crate) fn pin_in_scope(&mut self, scope: ScopeId, cell: CellId) {
        let root = self.scope(scope).root;
        self.heap.link(root, cell);
    }

    /// Binds `name` to `cell` in the current scope (pinning the cell).
    pub(crate) fn define(&mut self, name: &str, cell: CellId, constant: bool) {
        self.define_in(self.current, name, cell, constant);
    }

    pub(crate) fn define_in(&mut self, scope: ScopeId, name: &str, cell: CellId, constant: bool) {
        let root = self.scope(scope).root;
        self.heap.link(root, cell);
        self.scope_mut(scope)
            .values
            .insert(name.to_owned(), ScopeBinding { cell, constant });
    }

    /// Name lookup along the scope chain.
    pub(crate) fn lookup(&self, name: &str) -> Option<ScopeBinding> {
        let mut scope = self.current;
        loop {
            let record = self.scope(scope);
            if let Some(binding) = record.values.get(name) {
                return Some(*binding);
            }
            scope = record.parent?;
        }
    }

    /// Marks an existing binding as const-initialized.
    pub(crate) fn set_binding_constant(&mut self, name: &str) {
        let mut scope = self.current;
        loop {
            let record = self.scope_mut(scope);
            if let Some(binding) = record.values.get_mut(name) {
                binding.constant = true;
                return;
            }
            let Some(parent) = self.scope(scope).parent else { return };
            scope = parent;
        }
    }

    // ---- singletons and constructors ----

    pub(crate) fn undefined(&self) -> CellId {
        self.intrinsics.undefined
    }

    pub(crate) fn null(&self) -> CellId {
        self.intrinsics.null
    }

    pub(crate) fn boolean(&mut self, value: bool) -> RunResult<CellId> {
        self.create_value(Entity::Boolean(value))
    }

    /// Numbers route non-finite values to the runtime singletons.
    pub(crate) fn number(&mut self, value: f64) -> RunResult<CellId> {
        if value.is_nan() {
            return Ok(self.intrinsics.nan);
        }
        if value.is_infinite() {
            return Ok(if value < 0.0 {
                self.intrinsics.neg_infinity
            } else {
                self.intrinsics.infinity
            });
        }
        self.create_value(Entity::Number(value))
    }

    pub(crate) fn string(&mut self, value: impl Into<String>) -> RunResult<CellId> {
        self.create_value(Entity::String(value.into()))
    }

    pub(crate) fn object(&mut self) -> RunResult<CellId> {
        let prototype = self.intrinsics.object_prototype;
        self.create_value(Entity::Object(ObjectData::with_prototype(Some(prototype))))
    }

    pub(crate) fn array(&mut self) -> RunResult<CellId> {
        let prototype = self.intrinsics.array_prototype;
        self.create_value(Entity::Array(ArrayData {
            object: ObjectData::with_prototype(Some(prototype)),
            items: Vec::new(),
        }))
    }

    pub(crate) fn native_function(&mut self, callee: NativeFn, name: &str) -> RunResult<CellId> {
        let prototype = self.intrinsics.function_prototype;
        self.create_value(Entity::NativeFunction(NativeFunctionData {
            object: ObjectData::with_prototype(Some(prototype)),
            callee,
            name: name.to_owned(),
            closure: indexmap::IndexMap::new(),
            bound_self: None,
        }))
    }

    /// Creates an exception cell, snapshotting the live call frames.
    pub(crate) fn make_exception(&mut self, kind: ErrorKind, message: impl Into<String>) -> RunResult<CellId> {
        let frames = self.capture_stack();
        self.create_value(Entity::Exception(ExceptionData {
            kind,
            message: message.into(),
            frames,
            target: None,
        }))
    }

    pub(crate) fn capture_stack(&self) -> Vec<StackFrame> {
        self.frames
            .iter()
            .map(|frame| StackFrame {
                filename: frame.filename,
                line: frame.line,
                column: frame.column,
                funcname: frame.funcname.clone(),
            })
            .collect()
    }

    /// Converts an internal error into an exception cell on the heap.
    pub(crate) fn exception_from_error(&mut self, error: RunError) -> RunResult<CellId> {
        match error {
            RunError::Thrown(cell) => Ok(cell),
            RunError::Raise { kind, message, .. } => self.make_exception(kind, message),
        }
    }

    // ---- call stack ----

    pub(crate) fn push_frame(&mut self, frame: Frame) -> RunResult<()> {
        if self.frames.len() >= self.limits.max_call_depth {
            return Err(RunError::range_error("Maximum call stack size exceeded"));
        }
        self.tracer.on_call(&frame.funcname);
        self.frames.push(frame);
        Ok(())
    }

    pub(crate) fn pop_frame(&mut self) {
        if let Some(frame) = self.frames.pop() {
            self.tracer.on_return(&frame.funcname);
        }
    }

    // ---- filenames and microtasks ----

    pub(crate) fn filename_id(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.filename_ids.get(name) {
            return id;
        }
        let id = self.filenames.len() as u32;
        self.filenames.push(name.to_owned());
        self.filename_ids.insert(name.to_owned(), id);
        id
    }

    pub(crate) fn filenames(&self) -> Vec<String> {
        self.filenames.clone()
    }

    /// Queues a microtask, pinning its cells under the root scope until it
    /// runs.
    pub(crate) fn enqueue_job(&mut self, job: Job) {
        let root = self.scope(self.root).root;
        for cell in job.cells() {
            self.heap.link(root, cell);
        }
        self.microtasks.push_back(job);
    }

    /// Dequeues the next microtask, releasing its pins.
    pub(crate) fn dequeue_job(&mut self) -> Option<Job> {
        let job = self.microtasks.pop_front()?;
        let root = self.scope(self.root).root;
        for cell in job.cells() {
            self.heap.unlink(root, cell);
        }
        Some(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_chain_lookup_and_shadowing() {
        let mut context = Context::new(EngineLimits::default()).unwrap();
        let outer = context.create_value(Entity::Number(1.0)).unwrap();
        context.define("x", outer, false);
        context.push_scope().unwrap();
        let inner = context.create_value(Entity::Number(2.0)).unwrap();
        context.define("x", inner, false);
        assert_eq!(context.lookup("x").unwrap().cell, inner);
        context.pop_scope();
        assert_eq!(context.lookup("x").unwrap().cell, outer);
    }

    #[test]
    fn scope_teardown_reclaims_unreferenced_cells() {
        let mut context = Context::new(EngineLimits::default()).unwrap();
        context.push_scope().unwrap();
        let temp = context.create_value(Entity::String("temp".to_owned())).unwrap();
        let kept = context.create_value(Entity::Number(7.0)).unwrap();
        let root_scope = context.root_scope();
        context.pin_in_scope(root_scope, kept);
        let before = context.heap.live_count();
        context.pop_scope();
        // The scope root and the temp string die; the pinned number stays.
        assert_eq!(context.heap.live_count(), before - 2);
        assert!(matches!(context.heap.entity(kept), Entity::Number(v) if *v == 7.0));
        let _ = temp;
    }

    #[test]
    fn call_depth_is_limited() {
        let mut context = Context::new(EngineLimits {
            max_call_depth: 1,
            max_cells: 1 << 16,
        })
        .unwrap();
        let frame = Frame {
            filename: 0,
            line: 1,
            column: 1,
            funcname: "f".to_owned(),
        };
        assert!(context.push_frame(frame.clone()).is_ok());
        assert!(context.push_frame(frame).is_err());
    }
}
