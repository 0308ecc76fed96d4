//! Tree-directed lowering of the syntax tree into bytecode.
//!
//! The compiler walks the parsed program once, emitting position-independent
//! instructions. Scope entry pre-hoists declarations, function bodies are
//! emitted after the enclosing function's `RET` with their addresses
//! backpatched, labelled break/continue rewind scopes and open try frames
//! before jumping, and all optional-chain segments of one chain share a
//! single short-circuit target.

use ahash::AHashMap;

use crate::{
    ast::{
        AccessorKind, AssignOp, BinaryOp, DeclKind, Node, NodeKind, RegexFlags, SwitchCase, UnaryOp,
        UpdateOp,
    },
    bytecode::{
        emitter::{CodeEmitter, Patch},
        op::Opcode,
        program::Program,
    },
    error::SyntaxError,
    lexer::{Loc, Position},
    parser::ParsedProgram,
    scope::{DeclarationCategory, ScopeTree, SourceScopeId},
    value::number_to_string,
};

type CResult<T> = Result<T, SyntaxError>;

/// Compiles a parsed program into bytecode.
pub fn compile(parsed: &ParsedProgram, filename: &str, source: &str) -> CResult<Program> {
    let mut compiler = Compiler {
        emitter: CodeEmitter::new(),
        scopes: &parsed.scopes,
        filename,
        source,
        chars: source.chars().collect(),
        labels: Vec::new(),
        scope_depth: 0,
        open_tries: 0,
        frames: vec![FunctionFrame::default()],
    };
    compiler.compile_program(&parsed.root)?;
    Ok(compiler.emitter.build(filename, source))
}

/// Whether a store initializes a const binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreKind {
    Normal,
    Const,
}

impl StoreKind {
    fn opcode(self) -> Opcode {
        match self {
            Self::Normal => Opcode::Store,
            Self::Const => Opcode::StoreConst,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelKind {
    Loop,
    Switch,
    Plain,
}

/// One frame of the labelled control-flow stack.
struct LabelFrame {
    label: Option<String>,
    kind: LabelKind,
    /// Scope depth outside the construct; `break` rewinds to it.
    break_depth: u32,
    /// Scope depth at the loop head; `continue` rewinds to it.
    continue_depth: u32,
    /// Open error frames outside the construct; jumps close the excess.
    try_depth: u32,
    breaks: Vec<Patch>,
    continues: Vec<Patch>,
}

/// Per-function emission state: bodies pending emission after the current
/// function's `RET`, and their address patches.
#[derive(Default)]
struct FunctionFrame<'a> {
    pending: Vec<&'a Node>,
    addr_patches: AHashMap<u32, Patch>,
}

struct Compiler<'a> {
    emitter: CodeEmitter,
    scopes: &'a ScopeTree,
    filename: &'a str,
    source: &'a str,
    chars: Vec<char>,
    labels: Vec<LabelFrame>,
    scope_depth: u32,
    open_tries: u32,
    frames: Vec<FunctionFrame<'a>>,
}

impl<'a> Compiler<'a> {
    fn error(&self, message: impl Into<String>, position: Position) -> SyntaxError {
        SyntaxError::new(message, self.filename, self.source, position)
    }

    fn source_slice(&self, loc: Loc) -> String {
        loc.to_string(&self.chars)
    }

    fn frame(&mut self) -> &mut FunctionFrame<'a> {
        self.frames.last_mut().expect("at least the program frame")
    }

    // ---- scope entry / exit ----

    /// Emits `PUSH_SCOPE` followed by the allocation of every declaration of
    /// `scope`, then the closure captures of its hoisted functions.
    ///
    /// `let`/`const` allocate an uninitialized marker; `var` allocates the
    /// marker first so the binding is created in this scope, then overwrites
    /// it with `undefined`.
    fn enter_scope(&mut self, scope: SourceScopeId) {
        self.emitter.emit(Opcode::PushScope);
        self.scope_depth += 1;
        let record = self.scopes.get(scope);
        let declarations = record.declarations.clone();
        for decl in &declarations {
            match decl.category {
                DeclarationCategory::Argument | DeclarationCategory::Catch => continue,
                DeclarationCategory::UndefinedInit => {
                    self.emitter.emit(Opcode::PushUninitialized);
                    self.emitter.emit_const(Opcode::Store, &decl.name);
                    self.emitter.emit(Opcode::PushUndefined);
                    self.emitter.emit_const(Opcode::Store, &decl.name);
                }
                DeclarationCategory::Uninitialized => {
                    self.emitter.emit(Opcode::PushUninitialized);
                    self.emitter.emit_const(Opcode::Store, &decl.name);
                }
                DeclarationCategory::Function => {
                    let info = decl.function.expect("function declarations carry their info");
                    if info.is_generator {
                        self.emitter.emit(Opcode::PushGenerator);
                    } else {
                        self.emitter.emit(Opcode::PushFunction);
                    }
                    let patch = self.emitter.emit_patch(Opcode::SetFuncAddress);
                    self.frame().addr_patches.insert(decl.node.0, patch);
                    if info.is_async {
                        self.emitter.emit_u32(Opcode::SetFuncAsync, 1);
                    }
                    self.emitter.emit_const(Opcode::SetFuncName, &decl.name);
                    let source = self.source_slice(info.loc);
                    self.emitter.emit_const(Opcode::SetFuncSource, &source);
                    self.emitter.emit_const(Opcode::Store, &decl.name);
                }
            }
        }
        // After every declaration is stored, attach closure captures so
        // mutually recursive functions see each other.
        for decl in &declarations {
            if decl.category != DeclarationCategory::Function {
                continue;
            }
            let info = decl.function.expect("function declarations carry their info");
            let names = self.scopes.closure_names(info.scope);
            if names.is_empty() {
                continue;
            }
            self.emitter.emit_const(Opcode::Load, &decl.name);
            for name in &names {
                self.emitter.emit_const(Opcode::SetClosure, name);
            }
            self.emitter.emit_u32(Opcode::Pop, 1);
        }
    }

    fn leave_scope(&mut self) {
        self.emitter.emit(Opcode::PopScope);
        self.scope_depth -= 1;
    }

    // ---- program and statements ----

    fn compile_program(&mut self, node: &'a Node) -> CResult<()> {
        let NodeKind::Program { body, scope } = &node.kind else {
            return Err(self.error("Expected a program", node.loc.start));
        };
        self.enter_scope(*scope);
        let last = body.len().checked_sub(1);
        for (index, statement) in body.iter().enumerate() {
            // The completion value of the program is the value of its last
            // top-level expression statement.
            if Some(index) == last
                && let NodeKind::ExpressionStatement(expression) = &statement.kind
            {
                self.compile_expression(expression)?;
                self.emitter.emit(Opcode::Ret);
                continue;
            }
            self.compile_statement(statement)?;
        }
        self.emitter.emit(Opcode::PushUndefined);
        self.emitter.emit(Opcode::Ret);
        self.flush_pending()?;
        self.leave_scope();
        Ok(())
    }

    fn compile_statement(&mut self, node: &'a Node) -> CResult<()> {
        match &node.kind {
            NodeKind::Empty | NodeKind::Debugger => Ok(()),
            NodeKind::ExpressionStatement(expression) => {
                self.compile_expression(expression)?;
                self.emitter.emit_u32(Opcode::Pop, 1);
                Ok(())
            }
            NodeKind::Block { body, scope } => {
                self.enter_scope(*scope);
                for statement in body {
                    self.compile_statement(statement)?;
                }
                self.leave_scope();
                Ok(())
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.compile_if(condition, then_branch, else_branch.as_deref()),
            NodeKind::Switch {
                discriminant,
                cases,
                scope,
            } => self.compile_switch(discriminant, cases, *scope, None),
            NodeKind::While { condition, body } => self.compile_while(condition, body, None),
            NodeKind::DoWhile { condition, body } => self.compile_do_while(condition, body, None),
            NodeKind::For { .. } => self.compile_for(node, None),
            NodeKind::ForIn { .. } | NodeKind::ForOf { .. } => self.compile_for_each(node, None),
            NodeKind::Return(value) => {
                match value {
                    Some(value) => self.compile_expression(value)?,
                    None => self.emitter.emit(Opcode::PushUndefined),
                }
                self.emitter.emit(Opcode::Ret);
                Ok(())
            }
            NodeKind::Throw(value) => {
                self.compile_expression(value)?;
                self.emitter.emit(Opcode::Throw);
                Ok(())
            }
            NodeKind::Try { block, catch, finally } => self.compile_try(block, catch.as_ref(), finally.as_deref()),
            NodeKind::Label { label, statement } => self.compile_label(label, statement),
            NodeKind::Break(label) => self.compile_break(label.as_deref(), node.loc.start),
            NodeKind::Continue(label) => self.compile_continue(label.as_deref(), node.loc.start),
            NodeKind::VariableDeclaration { kind, declarators } => {
                let store = if *kind == DeclKind::Const {
                    StoreKind::Const
                } else {
                    StoreKind::Normal
                };
                for declarator in declarators {
                    let NodeKind::Declarator { target, init } = &declarator.kind else {
                        continue;
                    };
                    match init {
                        Some(init) => self.compile_expression(init)?,
                        None => self.emitter.emit(Opcode::PushUndefined),
                    }
                    self.compile_store(target, store)?;
                }
                Ok(())
            }
            NodeKind::Function { is_declaration: true, .. } => {
                // The object was hoisted on scope entry; only the body is
                // still owed.
                self.frame().pending.push(node);
                Ok(())
            }
            NodeKind::Class {
                is_declaration: true,
                name,
                ..
            } => {
                self.compile_class(node)?;
                let name = name.clone().expect("class declarations are named");
                self.emitter.emit_const(Opcode::Store, &name);
                Ok(())
            }
            NodeKind::ImportDeclaration { .. } | NodeKind::ExportDeclaration { .. } | NodeKind::ExportDefault(_) => {
                Err(self.error("Modules are not supported in script evaluation", node.loc.start))
            }
            _ => {
                // An expression in statement position (e.g. from a `for`
                // init re-dispatch).
                self.compile_expression(node)?;
                self.emitter.emit_u32(Opcode::Pop, 1);
                Ok(())
            }
        }
    }

    fn compile_if(&mut self, condition: &'a Node, then_branch: &'a Node, else_branch: Option<&'a Node>) -> CResult<()> {
        self.compile_expression(condition)?;
        let to_else = self.emitter.emit_patch(Opcode::Jfalse);
        self.emitter.emit_u32(Opcode::Pop, 1);
        self.compile_statement(then_branch)?;
        let to_end = self.emitter.emit_patch(Opcode::Jmp);
        self.emitter.patch_here(to_else);
        self.emitter.emit_u32(Opcode::Pop, 1);
        if let Some(else_branch) = else_branch {
            self.compile_statement(else_branch)?;
        }
        self.emitter.patch_here(to_end);
        Ok(())
    }

    fn compile_while(&mut self, condition: &'a Node, body: &'a Node, label: Option<String>) -> CResult<()> {
        self.labels.push(LabelFrame {
            label,
            kind: LabelKind::Loop,
            break_depth: self.scope_depth,
            continue_depth: self.scope_depth,
            try_depth: self.open_tries,
            breaks: Vec::new(),
            continues: Vec::new(),
        });
        let start = self.emitter.pc();
        self.compile_expression(condition)?;
        let exit = self.emitter.emit_patch(Opcode::Jfalse);
        self.emitter.emit_u32(Opcode::Pop, 1);
        self.compile_statement(body)?;
        self.emitter.emit_u32(Opcode::Jmp, start);
        self.emitter.patch_here(exit);
        self.emitter.emit_u32(Opcode::Pop, 1);
        let after = self.emitter.pc();
        let frame = self.labels.pop().expect("loop frame pushed above");
        for patch in frame.breaks {
            self.emitter.patch_to(patch, after);
        }
        for patch in frame.continues {
            self.emitter.patch_to(patch, start);
        }
        Ok(())
    }

    fn compile_do_while(&mut self, condition: &'a Node, body: &'a Node, label: Option<String>) -> CResult<()> {
        self.labels.push(LabelFrame {
            label,
            kind: LabelKind::Loop,
            break_depth: self.scope_depth,
            continue_depth: self.scope_depth,
            try_depth: self.open_tries,
            breaks: Vec::new(),
            continues: Vec::new(),
        });
        let start = self.emitter.pc();
        self.compile_statement(body)?;
        let cont = self.emitter.pc();
        self.compile_expression(condition)?;
        let exit = self.emitter.emit_patch(Opcode::Jfalse);
        self.emitter.emit_u32(Opcode::Pop, 1);
        self.emitter.emit_u32(Opcode::Jmp, start);
        self.emitter.patch_here(exit);
        self.emitter.emit_u32(Opcode::Pop, 1);
        let after = self.emitter.pc();
        let frame = self.labels.pop().expect("loop frame pushed above");
        for patch in frame.breaks {
            self.emitter.patch_to(patch, after);
        }
        for patch in frame.continues {
            self.emitter.patch_to(patch, cont);
        }
        Ok(())
    }

    fn compile_for(&mut self, node: &'a Node, label: Option<String>) -> CResult<()> {
        let NodeKind::For {
            init,
            condition,
            update,
            body,
            scope,
        } = &node.kind
        else {
            return Err(self.error("Expected a for statement", node.loc.start));
        };
        self.labels.push(LabelFrame {
            label,
            kind: LabelKind::Loop,
            break_depth: self.scope_depth,
            continue_depth: self.scope_depth + 1,
            try_depth: self.open_tries,
            breaks: Vec::new(),
            continues: Vec::new(),
        });
        self.enter_scope(*scope);
        if let Some(init) = init {
            self.compile_statement(init)?;
        }
        let start = self.emitter.pc();
        match condition {
            Some(condition) => self.compile_expression(condition)?,
            None => self.emitter.emit(Opcode::PushTrue),
        }
        let exit = self.emitter.emit_patch(Opcode::Jfalse);
        self.emitter.emit_u32(Opcode::Pop, 1);
        self.compile_statement(body)?;
        let cont = self.emitter.pc();
        if let Some(update) = update {
            self.compile_expression(update)?;
            self.emitter.emit_u32(Opcode::Pop, 1);
        }
        self.emitter.emit_u32(Opcode::Jmp, start);
        self.emitter.patch_here(exit);
        self.emitter.emit_u32(Opcode::Pop, 1);
        self.leave_scope();
        let after = self.emitter.pc();
        let frame = self.labels.pop().expect("loop frame pushed above");
        for patch in frame.breaks {
            self.emitter.patch_to(patch, after);
        }
        for patch in frame.continues {
            self.emitter.patch_to(patch, cont);
        }
        Ok(())
    }

    /// `for..of` and `for..in`: a three-cell iteration state
    /// `(iterator, result, done)` above the iterable, driven by `NEXT`.
    fn compile_for_each(&mut self, node: &'a Node, label: Option<String>) -> CResult<()> {
        let (kind, target, expression, body, scope, awaited, is_in) = match &node.kind {
            NodeKind::ForIn {
                kind,
                target,
                expression,
                body,
                scope,
            } => (*kind, target, expression, body, *scope, false, true),
            NodeKind::ForOf {
                kind,
                target,
                expression,
                body,
                awaited,
                scope,
            } => (*kind, target, expression, body, *scope, *awaited, false),
            _ => return Err(self.error("Expected a for..of or for..in statement", node.loc.start)),
        };
        self.compile_expression(expression)?;
        if is_in {
            self.emitter.emit(Opcode::GetKeys);
        }
        self.emitter.emit(Opcode::PushUndefined);
        self.emitter.emit(Opcode::PushUndefined);
        self.emitter.emit(Opcode::PushUndefined);
        self.labels.push(LabelFrame {
            label,
            kind: LabelKind::Loop,
            break_depth: self.scope_depth,
            continue_depth: self.scope_depth,
            try_depth: self.open_tries,
            breaks: Vec::new(),
            continues: Vec::new(),
        });
        let head = self.emitter.pc();
        self.emitter.emit_u32(Opcode::Pop, 1);
        self.emitter.emit_u32(Opcode::Pop, 1);
        self.emitter.record_location(node.loc.start);
        self.emitter.emit(Opcode::Next);
        let exit = self.emitter.emit_patch(Opcode::Jtrue);
        self.enter_scope(scope);
        self.emitter.emit_u32(Opcode::PushValue, 2);
        if awaited {
            self.emitter.emit(Opcode::Await);
        }
        let store = if kind == DeclKind::Const {
            StoreKind::Const
        } else {
            StoreKind::Normal
        };
        self.compile_store(target, store)?;
        self.compile_statement(body)?;
        self.leave_scope();
        self.emitter.emit_u32(Opcode::Jmp, head);
        self.emitter.patch_here(exit);
        let cleanup = self.emitter.pc();
        self.emitter.emit_u32(Opcode::Pop, 4);
        let frame = self.labels.pop().expect("loop frame pushed above");
        for patch in frame.breaks {
            self.emitter.patch_to(patch, cleanup);
        }
        for patch in frame.continues {
            self.emitter.patch_to(patch, head);
        }
        Ok(())
    }

    fn compile_switch(
        &mut self,
        discriminant: &'a Node,
        cases: &'a [SwitchCase],
        scope: SourceScopeId,
        label: Option<String>,
    ) -> CResult<()> {
        self.compile_expression(discriminant)?;
        self.labels.push(LabelFrame {
            label,
            kind: LabelKind::Switch,
            break_depth: self.scope_depth,
            continue_depth: self.scope_depth,
            try_depth: self.open_tries,
            breaks: Vec::new(),
            continues: Vec::new(),
        });
        self.enter_scope(scope);
        // Dispatch: duplicate the discriminant, compare strictly, and jump
        // to the matching body. Each body chunk is preceded by `POP 2`.
        let mut case_patches: Vec<Option<Patch>> = Vec::with_capacity(cases.len());
        let mut default_patch = None;
        for case in cases {
            if let Some(test) = &case.test {
                self.emitter.emit_u32(Opcode::PushValue, 1);
                self.compile_expression(test)?;
                self.emitter.emit(Opcode::Seq);
                case_patches.push(Some(self.emitter.emit_patch(Opcode::Jtrue)));
                self.emitter.emit_u32(Opcode::Pop, 1);
            } else {
                case_patches.push(None);
            }
        }
        if cases.iter().any(|c| c.test.is_none()) {
            self.emitter.emit(Opcode::PushUndefined);
            default_patch = Some(self.emitter.emit_patch(Opcode::Jmp));
        }
        self.emitter.emit_u32(Opcode::Pop, 1);
        let no_match = self.emitter.emit_patch(Opcode::Jmp);

        // Body chunks in source order; fall-through jumps over the next
        // chunk's `POP 2`.
        let mut entry_patches: Vec<Patch> = Vec::new();
        for (index, case) in cases.iter().enumerate() {
            let pop2 = self.emitter.pc();
            self.emitter.emit_u32(Opcode::Pop, 2);
            let entry = self.emitter.pc();
            for patch in entry_patches.drain(..) {
                self.emitter.patch_to(patch, entry);
            }
            match &case.test {
                Some(_) => {
                    let patch = case_patches[index].expect("tested cases have a dispatch patch");
                    self.emitter.patch_to(patch, pop2);
                }
                None => {
                    let patch = default_patch.take().expect("a default case records its patch");
                    self.emitter.patch_to(patch, pop2);
                }
            }
            for statement in &case.body {
                self.compile_statement(statement)?;
            }
            if index + 1 < cases.len() {
                entry_patches.push(self.emitter.emit_patch(Opcode::Jmp));
            }
        }
        let done = self.emitter.pc();
        for patch in entry_patches.drain(..) {
            self.emitter.patch_to(patch, done);
        }
        self.emitter.patch_here(no_match);
        self.leave_scope();
        let after = self.emitter.pc();
        let frame = self.labels.pop().expect("switch frame pushed above");
        for patch in frame.breaks {
            self.emitter.patch_to(patch, after);
        }
        Ok(())
    }

    fn compile_try(
        &mut self,
        block: &'a Node,
        catch: Option<&'a crate::ast::CatchClause>,
        finally: Option<&'a Node>,
    ) -> CResult<()> {
        let catch_patch = self.emitter.emit_patch(Opcode::Try);
        self.open_tries += 1;
        let defer_patch = finally.map(|_| self.emitter.emit_patch(Opcode::Defer));
        self.compile_statement(block)?;
        self.emitter.emit(Opcode::EndTry);
        self.open_tries -= 1;
        let done = self.emitter.emit_patch(Opcode::Jmp);

        if let Some(clause) = catch {
            self.emitter.patch_here(catch_patch);
            // When a finally exists, the unwinder re-opens a defer-only
            // frame on entry to the catch; close it on normal completion.
            if finally.is_some() {
                self.open_tries += 1;
            }
            self.emitter.emit(Opcode::PushScope);
            self.scope_depth += 1;
            if let Some(binding) = &clause.binding {
                if let NodeKind::Identifier(name) = &binding.kind {
                    // Allocate the binding in the catch scope, then store
                    // the error value the unwinder left on the stack.
                    self.emitter.emit(Opcode::PushUninitialized);
                    self.emitter.emit_const(Opcode::Store, name);
                    self.emitter.emit_const(Opcode::Store, name);
                } else {
                    self.compile_store(binding, StoreKind::Normal)?;
                }
            } else {
                self.emitter.emit_u32(Opcode::Pop, 1);
            }
            self.compile_statement(&clause.body)?;
            self.scope_depth -= 1;
            self.emitter.emit(Opcode::PopScope);
            if finally.is_some() {
                self.emitter.emit(Opcode::EndTry);
                self.open_tries -= 1;
            }
        } else {
            // No handler: patch the catch target to the none-sentinel.
            self.emitter.patch_to(catch_patch, 0);
        }
        self.emitter.patch_here(done);

        if let Some(finally_block) = finally {
            let skip = self.emitter.emit_patch(Opcode::Jmp);
            let defer_patch = defer_patch.expect("defer emitted alongside finally");
            self.emitter.patch_here(defer_patch);
            self.compile_statement(finally_block)?;
            self.emitter.emit(Opcode::EndDefer);
            self.emitter.patch_here(skip);
        }
        Ok(())
    }

    fn compile_label(&mut self, label: &str, statement: &'a Node) -> CResult<()> {
        match &statement.kind {
            NodeKind::While { condition, body } => self.compile_while(condition, body, Some(label.to_owned())),
            NodeKind::DoWhile { condition, body } => self.compile_do_while(condition, body, Some(label.to_owned())),
            NodeKind::For { .. } => self.compile_for(statement, Some(label.to_owned())),
            NodeKind::ForIn { .. } | NodeKind::ForOf { .. } => {
                self.compile_for_each(statement, Some(label.to_owned()))
            }
            NodeKind::Switch {
                discriminant,
                cases,
                scope,
            } => self.compile_switch(discriminant, cases, *scope, Some(label.to_owned())),
            _ => {
                self.labels.push(LabelFrame {
                    label: Some(label.to_owned()),
                    kind: LabelKind::Plain,
                    break_depth: self.scope_depth,
                    continue_depth: self.scope_depth,
                    try_depth: self.open_tries,
                    breaks: Vec::new(),
                    continues: Vec::new(),
                });
                self.compile_statement(statement)?;
                let after = self.emitter.pc();
                let frame = self.labels.pop().expect("label frame pushed above");
                for patch in frame.breaks {
                    self.emitter.patch_to(patch, after);
                }
                if !frame.continues.is_empty() {
                    return Err(self.error(
                        "Illegal continue statement: no surrounding iteration statement",
                        statement.loc.start,
                    ));
                }
                Ok(())
            }
        }
    }

    /// Finds the target frame for a break/continue, emits the `END_TRY` and
    /// `POP_SCOPE` rewind, and records the jump for backpatching.
    fn compile_break(&mut self, label: Option<&str>, position: Position) -> CResult<()> {
        let index = self.find_label(label, false);
        let Some(index) = index else {
            return Err(match label {
                Some(label) => self.error(format!("Undefined label '{label}'"), position),
                None => self.error("Illegal break statement", position),
            });
        };
        let (break_depth, try_depth) = {
            let frame = &self.labels[index];
            (frame.break_depth, frame.try_depth)
        };
        for _ in try_depth..self.open_tries {
            self.emitter.emit(Opcode::EndTry);
        }
        for _ in break_depth..self.scope_depth {
            self.emitter.emit(Opcode::PopScope);
        }
        let patch = self.emitter.emit_patch(Opcode::Jmp);
        self.labels[index].breaks.push(patch);
        Ok(())
    }

    fn compile_continue(&mut self, label: Option<&str>, position: Position) -> CResult<()> {
        let index = self.find_label(label, true);
        let Some(index) = index else {
            return Err(match label {
                Some(label) => self.error(format!("Undefined label '{label}'"), position),
                None => self.error("Illegal continue statement", position),
            });
        };
        let (continue_depth, try_depth) = {
            let frame = &self.labels[index];
            (frame.continue_depth, frame.try_depth)
        };
        for _ in try_depth..self.open_tries {
            self.emitter.emit(Opcode::EndTry);
        }
        for _ in continue_depth..self.scope_depth {
            self.emitter.emit(Opcode::PopScope);
        }
        let patch = self.emitter.emit_patch(Opcode::Jmp);
        self.labels[index].continues.push(patch);
        Ok(())
    }

    fn find_label(&self, label: Option<&str>, for_continue: bool) -> Option<usize> {
        for (index, frame) in self.labels.iter().enumerate().rev() {
            let matches = match label {
                Some(label) => frame.label.as_deref() == Some(label),
                None => frame.kind != LabelKind::Plain,
            };
            if !matches {
                continue;
            }
            if for_continue && frame.kind != LabelKind::Loop {
                continue;
            }
            return Some(index);
        }
        None
    }

    // ---- stores ----

    /// Stores the value at TOS into `target`, consuming it. `target` may be
    /// an identifier, a member expression, or a destructuring pattern.
    fn compile_store(&mut self, target: &'a Node, kind: StoreKind) -> CResult<()> {
        match &target.kind {
            NodeKind::Identifier(name) => {
                self.emitter.emit_const(kind.opcode(), name);
                Ok(())
            }
            NodeKind::Member {
                object,
                property,
                computed,
                optional,
            } => {
                if *optional {
                    return Err(self.error("Invalid left-hand side in assignment", target.loc.start));
                }
                let mut pins = Vec::new();
                self.compile_member_chain(object, &mut pins)?;
                if !pins.is_empty() {
                    return Err(self.error("Invalid left-hand side in assignment", target.loc.start));
                }
                self.emitter.emit_u32(Opcode::PushValue, 2);
                if *computed {
                    self.compile_expression(property)?;
                } else {
                    let NodeKind::Identifier(name) = &property.kind else {
                        return Err(self.error("Invalid member name", property.loc.start));
                    };
                    self.emitter.emit_const(Opcode::LoadConst, name);
                }
                self.emitter.emit(Opcode::SetField);
                self.emitter.emit_u32(Opcode::Pop, 3);
                Ok(())
            }
            NodeKind::ArrayPattern { items } => self.compile_array_pattern(items, kind),
            NodeKind::ObjectPattern { items } => self.compile_object_pattern(items, kind),
            NodeKind::Parameter { target, default } => {
                if let Some(default) = default {
                    let taken = self.emitter.emit_patch(Opcode::JnotNull);
                    self.emitter.emit_u32(Opcode::Pop, 1);
                    self.compile_expression(default)?;
                    self.emitter.patch_here(taken);
                }
                self.compile_store(target, kind)
            }
            NodeKind::ArrayPatternItem { target, default } => {
                if let Some(default) = default {
                    let taken = self.emitter.emit_patch(Opcode::JnotNull);
                    self.emitter.emit_u32(Opcode::Pop, 1);
                    self.compile_expression(default)?;
                    self.emitter.patch_here(taken);
                }
                self.compile_store(target, kind)
            }
            NodeKind::RestElement(target) => self.compile_store(target, kind),
            _ => Err(self.error("Invalid left-hand side in assignment", target.loc.start)),
        }
    }

    /// Array patterns drive the iterator protocol over the value at TOS.
    fn compile_array_pattern(&mut self, items: &'a [Option<Node>], kind: StoreKind) -> CResult<()> {
        self.emitter.emit(Opcode::PushUndefined);
        for item in items {
            match item {
                None => {
                    // A hole still consumes one iteration result.
                    self.emitter.emit(Opcode::Next);
                    self.emitter.emit_u32(Opcode::Pop, 2);
                }
                Some(node) => match &node.kind {
                    NodeKind::RestElement(target) => {
                        self.emitter.emit(Opcode::RestArray);
                        self.compile_store(target, kind)?;
                    }
                    _ => {
                        self.emitter.emit(Opcode::Next);
                        self.emitter.emit_u32(Opcode::Pop, 1);
                        self.compile_store(node, kind)?;
                    }
                },
            }
        }
        self.emitter.emit_u32(Opcode::Pop, 2);
        Ok(())
    }

    /// Object patterns fetch by key; matched keys stay on the stack so a
    /// rest item can exclude them.
    fn compile_object_pattern(&mut self, items: &'a [Node], kind: StoreKind) -> CResult<()> {
        let mut rest: Option<&'a Node> = None;
        let mut index: u32 = 0;
        for item in items {
            match &item.kind {
                NodeKind::RestElement(target) => rest = Some(target),
                NodeKind::ObjectPatternItem {
                    key,
                    computed,
                    target,
                    default,
                } => {
                    self.compile_property_key(key, *computed)?;
                    self.emitter.emit_u32(Opcode::PushValue, 2 + index);
                    self.emitter.emit_u32(Opcode::PushValue, 2);
                    self.emitter.emit(Opcode::GetField);
                    if let Some(default) = default {
                        let taken = self.emitter.emit_patch(Opcode::JnotNull);
                        self.emitter.emit_u32(Opcode::Pop, 1);
                        self.compile_expression(default)?;
                        self.emitter.patch_here(taken);
                    }
                    self.compile_store(target, kind)?;
                    index += 1;
                }
                _ => return Err(self.error("Invalid object pattern item", item.loc.start)),
            }
        }
        if let Some(target) = rest {
            self.emitter.emit_u32(Opcode::RestObject, index);
            self.compile_store(target, kind)?;
            self.emitter.emit_u32(Opcode::Pop, 1);
        } else {
            self.emitter.emit_u32(Opcode::Pop, index);
            self.emitter.emit_u32(Opcode::Pop, 1);
        }
        Ok(())
    }

    /// Pushes a property key: `LOAD_CONST` for literal keys, the evaluated
    /// expression for computed ones.
    fn compile_property_key(&mut self, key: &'a Node, computed: bool) -> CResult<()> {
        if computed {
            return self.compile_expression(key);
        }
        match &key.kind {
            NodeKind::Identifier(name) | NodeKind::StringLiteral(name) => {
                self.emitter.emit_const(Opcode::LoadConst, name);
            }
            NodeKind::NumberLiteral(value) => {
                let name = number_to_string(*value);
                self.emitter.emit_const(Opcode::LoadConst, &name);
            }
            _ => return Err(self.error("Invalid property key", key.loc.start)),
        }
        Ok(())
    }

    // ---- expressions ----

    fn compile_expression(&mut self, node: &'a Node) -> CResult<()> {
        match &node.kind {
            NodeKind::NullLiteral => {
                self.emitter.emit(Opcode::PushNull);
                Ok(())
            }
            NodeKind::UndefinedLiteral => {
                self.emitter.emit(Opcode::PushUndefined);
                Ok(())
            }
            NodeKind::BooleanLiteral(value) => {
                self.emitter.emit(if *value { Opcode::PushTrue } else { Opcode::PushFalse });
                Ok(())
            }
            NodeKind::NumberLiteral(value) => {
                self.emitter.emit_f64(Opcode::Push, *value);
                Ok(())
            }
            NodeKind::StringLiteral(value) => {
                self.emitter.emit_const(Opcode::LoadConst, value);
                Ok(())
            }
            NodeKind::BigIntLiteral(digits) => {
                self.emitter.emit_const(Opcode::PushBigint, digits);
                Ok(())
            }
            NodeKind::RegexLiteral { pattern, flags } => {
                self.compile_regex(pattern, *flags);
                Ok(())
            }
            NodeKind::TemplateLiteral {
                tag,
                quasis,
                raw_quasis,
                expressions,
            } => self.compile_template(node, tag.as_deref(), quasis, raw_quasis, expressions),
            NodeKind::Identifier(name) => {
                self.emitter.emit_const(Opcode::Load, name);
                Ok(())
            }
            NodeKind::This => {
                self.emitter.emit(Opcode::PushThis);
                Ok(())
            }
            NodeKind::Super => {
                self.emitter.emit(Opcode::PushSuper);
                Ok(())
            }
            NodeKind::Group(inner) => self.compile_expression(inner),
            NodeKind::Sequence(items) => {
                let last = items.len() - 1;
                for (index, item) in items.iter().enumerate() {
                    self.compile_expression(item)?;
                    if index != last {
                        self.emitter.emit_u32(Opcode::Pop, 1);
                    }
                }
                Ok(())
            }
            NodeKind::ArrayLiteral { items } => self.compile_array_literal(items),
            NodeKind::ObjectLiteral { properties } => self.compile_object_literal(properties),
            NodeKind::Unary { op, operand } => {
                self.compile_expression(operand)?;
                match op {
                    UnaryOp::LogicalNot => self.emitter.emit(Opcode::Lnot),
                    UnaryOp::BitwiseNot => self.emitter.emit(Opcode::Not),
                    UnaryOp::Plus => self.emitter.emit(Opcode::Plus),
                    UnaryOp::Negate => self.emitter.emit(Opcode::Neta),
                    UnaryOp::Increment => self.emitter.emit_u32(Opcode::Inc, 0),
                    UnaryOp::Decrement => self.emitter.emit_u32(Opcode::Dec, 0),
                }
                Ok(())
            }
            NodeKind::Update { op, operand } => {
                self.compile_expression(operand)?;
                match op {
                    UpdateOp::Increment => self.emitter.emit_u32(Opcode::Inc, 1),
                    UpdateOp::Decrement => self.emitter.emit_u32(Opcode::Dec, 1),
                }
                Ok(())
            }
            NodeKind::Binary { op, left, right } => self.compile_binary(*op, left, right),
            NodeKind::Conditional {
                condition,
                consequent,
                alternate,
            } => {
                self.compile_expression(condition)?;
                let to_alt = self.emitter.emit_patch(Opcode::Jfalse);
                self.emitter.emit_u32(Opcode::Pop, 1);
                self.compile_expression(consequent)?;
                let to_end = self.emitter.emit_patch(Opcode::Jmp);
                self.emitter.patch_here(to_alt);
                self.emitter.emit_u32(Opcode::Pop, 1);
                self.compile_expression(alternate)?;
                self.emitter.patch_here(to_end);
                Ok(())
            }
            NodeKind::Assignment { op, target, value } => self.compile_assignment(*op, target, value),
            NodeKind::Member { .. } => {
                let mut pins = Vec::new();
                self.compile_member_chain(node, &mut pins)?;
                self.finish_chain(pins);
                Ok(())
            }
            NodeKind::Call { .. } => self.compile_call(node),
            NodeKind::New { callee, arguments } => {
                self.compile_expression(callee)?;
                for argument in arguments {
                    if matches!(argument.kind, NodeKind::Spread(_)) {
                        return Err(self.error("Spread arguments are not supported", argument.loc.start));
                    }
                    self.compile_expression(argument)?;
                }
                self.emitter.record_location(node.loc.start);
                self.emitter.emit_u32(Opcode::New, arguments.len() as u32);
                Ok(())
            }
            NodeKind::TypeOf(operand) => {
                self.compile_expression(operand)?;
                self.emitter.emit(Opcode::TypeOf);
                Ok(())
            }
            NodeKind::Void(operand) => {
                self.compile_expression(operand)?;
                self.emitter.emit(Opcode::Void);
                Ok(())
            }
            NodeKind::Delete(operand) => self.compile_delete(operand),
            NodeKind::Await(operand) => {
                self.compile_expression(operand)?;
                self.emitter.emit(Opcode::Await);
                Ok(())
            }
            NodeKind::Yield { argument, delegate } => {
                match argument {
                    Some(argument) => self.compile_expression(argument)?,
                    None => self.emitter.emit(Opcode::PushUndefined),
                }
                if *delegate {
                    self.emitter.emit(Opcode::PushUndefined);
                    self.emitter.emit(Opcode::PushUndefined);
                    self.emitter.emit(Opcode::YieldDelegate);
                } else {
                    self.emitter.emit(Opcode::Yield);
                }
                Ok(())
            }
            NodeKind::Function { is_declaration, name, .. } => {
                if *is_declaration {
                    // Reached through an expression position re-dispatch;
                    // the hoisted object is already bound to the name.
                    let name = name.clone().expect("declarations are named");
                    self.emitter.emit_const(Opcode::Load, &name);
                    return Ok(());
                }
                self.compile_function_value(node)
            }
            NodeKind::Arrow { .. } => self.compile_function_value(node),
            NodeKind::Class { .. } => self.compile_class(node),
            NodeKind::Spread(_) => Err(self.error("Unexpected spread element", node.loc.start)),
            _ => Err(self.error("Unexpected expression", node.loc.start)),
        }
    }

    fn compile_regex(&mut self, pattern: &str, flags: RegexFlags) {
        self.emitter.emit_const(Opcode::PushRegex, pattern);
        let setters = [
            (flags.has_indices, Opcode::SetRegexHasIndices),
            (flags.global, Opcode::SetRegexGlobal),
            (flags.ignore_case, Opcode::SetRegexIgnoreCases),
            (flags.multiline, Opcode::SetRegexMultiline),
            (flags.dot_all, Opcode::SetRegexDotAll),
            (flags.sticky, Opcode::SetRegexSticky),
        ];
        for (enabled, op) in setters {
            if enabled {
                self.emitter.emit(Opcode::PushTrue);
                self.emitter.emit(op);
            }
        }
    }

    fn compile_binary(&mut self, op: BinaryOp, left: &'a Node, right: &'a Node) -> CResult<()> {
        // Short-circuit forms: the jump reads the tested value without
        // popping, so the left value is itself the result.
        let short_circuit = match op {
            BinaryOp::LogicalAnd => Some(Opcode::Jfalse),
            BinaryOp::LogicalOr => Some(Opcode::Jtrue),
            BinaryOp::Nullish => Some(Opcode::JnotNull),
            _ => None,
        };
        if let Some(jump) = short_circuit {
            self.compile_expression(left)?;
            let end = self.emitter.emit_patch(jump);
            self.emitter.emit_u32(Opcode::Pop, 1);
            self.compile_expression(right)?;
            self.emitter.patch_here(end);
            return Ok(());
        }
        self.compile_expression(left)?;
        self.compile_expression(right)?;
        let opcode = match op {
            BinaryOp::Pow => Opcode::Pow,
            BinaryOp::Mul => Opcode::Mul,
            BinaryOp::Div => Opcode::Div,
            BinaryOp::Mod => Opcode::Mod,
            BinaryOp::Add => Opcode::Add,
            BinaryOp::Sub => Opcode::Sub,
            BinaryOp::Ushr => Opcode::Ushr,
            BinaryOp::Shr => Opcode::Shr,
            BinaryOp::Shl => Opcode::Shl,
            BinaryOp::Ge => Opcode::Ge,
            BinaryOp::Le => Opcode::Le,
            BinaryOp::Gt => Opcode::Gt,
            BinaryOp::Lt => Opcode::Lt,
            BinaryOp::In => Opcode::In,
            BinaryOp::InstanceOf => Opcode::InstanceOf,
            BinaryOp::StrictEq => Opcode::Seq,
            BinaryOp::StrictNe => Opcode::Sne,
            BinaryOp::Eq => Opcode::Eq,
            BinaryOp::Ne => Opcode::Ne,
            BinaryOp::BitAnd => Opcode::And,
            BinaryOp::BitOr => Opcode::Or,
            BinaryOp::BitXor => Opcode::Xor,
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::Nullish => unreachable!("handled above"),
        };
        self.emitter.emit(opcode);
        Ok(())
    }

    fn compile_assignment(&mut self, op: AssignOp, target: &'a Node, value: &'a Node) -> CResult<()> {
        match op {
            AssignOp::Assign => {
                self.compile_expression(value)?;
                self.emitter.emit_u32(Opcode::PushValue, 1);
                self.compile_store(target, StoreKind::Normal)?;
                Ok(())
            }
            AssignOp::LogicalAnd | AssignOp::LogicalOr | AssignOp::Nullish => {
                let jump = match op {
                    AssignOp::LogicalAnd => Opcode::Jfalse,
                    AssignOp::LogicalOr => Opcode::Jtrue,
                    _ => Opcode::JnotNull,
                };
                self.compile_expression(target)?;
                let end = self.emitter.emit_patch(jump);
                self.emitter.emit_u32(Opcode::Pop, 1);
                self.compile_expression(value)?;
                self.emitter.emit_u32(Opcode::PushValue, 1);
                self.compile_store(target, StoreKind::Normal)?;
                self.emitter.patch_here(end);
                Ok(())
            }
            _ => {
                let binary = op.binary().expect("compound assignments map to a binary op");
                self.compile_expression(target)?;
                self.compile_expression(value)?;
                self.compile_binary_opcode(binary);
                self.emitter.emit_u32(Opcode::PushValue, 1);
                self.compile_store(target, StoreKind::Normal)?;
                Ok(())
            }
        }
    }

    fn compile_binary_opcode(&mut self, op: BinaryOp) {
        let opcode = match op {
            BinaryOp::Pow => Opcode::Pow,
            BinaryOp::Mul => Opcode::Mul,
            BinaryOp::Div => Opcode::Div,
            BinaryOp::Mod => Opcode::Mod,
            BinaryOp::Add => Opcode::Add,
            BinaryOp::Sub => Opcode::Sub,
            BinaryOp::Ushr => Opcode::Ushr,
            BinaryOp::Shr => Opcode::Shr,
            BinaryOp::Shl => Opcode::Shl,
            BinaryOp::BitAnd => Opcode::And,
            BinaryOp::BitOr => Opcode::Or,
            BinaryOp::BitXor => Opcode::Xor,
            _ => unreachable!("not a compound-assignment operator"),
        };
        self.emitter.emit(opcode);
    }

    /// Emits a member chain, collecting the short-circuit jumps of optional
    /// segments into `pins`.
    fn compile_member_chain(&mut self, node: &'a Node, pins: &mut Vec<Patch>) -> CResult<()> {
        match &node.kind {
            NodeKind::Member {
                object,
                property,
                computed,
                optional,
            } => {
                self.compile_member_chain(object, pins)?;
                if *optional {
                    pins.push(self.emitter.emit_patch(Opcode::Jnull));
                }
                if *computed {
                    self.compile_expression(property)?;
                } else {
                    let NodeKind::Identifier(name) = &property.kind else {
                        return Err(self.error("Invalid member name", property.loc.start));
                    };
                    self.emitter.emit_const(Opcode::LoadConst, name);
                }
                self.emitter.emit(Opcode::GetField);
                Ok(())
            }
            _ => self.compile_expression(node),
        }
    }

    /// Lands every optional-chain short-circuit of one chain on a shared
    /// `undefined` result.
    fn finish_chain(&mut self, pins: Vec<Patch>) {
        if pins.is_empty() {
            return;
        }
        let done = self.emitter.emit_patch(Opcode::Jmp);
        for patch in pins {
            self.emitter.patch_here(patch);
        }
        self.emitter.emit_u32(Opcode::Pop, 1);
        self.emitter.emit(Opcode::PushUndefined);
        self.emitter.patch_here(done);
    }

    fn compile_call(&mut self, node: &'a Node) -> CResult<()> {
        let NodeKind::Call {
            callee,
            arguments,
            optional,
        } = &node.kind
        else {
            return Err(self.error("Expected a call expression", node.loc.start));
        };
        let mut pins = Vec::new();
        let op = match &callee.kind {
            NodeKind::Member {
                object,
                property,
                computed,
                optional: member_optional,
            } => {
                if let NodeKind::Super = object.kind {
                    // `super.m(args)`: fetch from the parent prototype but
                    // call with the current receiver.
                    self.compile_expression(object)?;
                    if *computed {
                        self.compile_expression(property)?;
                    } else {
                        let NodeKind::Identifier(name) = &property.kind else {
                            return Err(self.error("Invalid member name", property.loc.start));
                        };
                        self.emitter.emit_const(Opcode::LoadConst, name);
                    }
                    self.emitter.emit(Opcode::GetField);
                    self.emitter.emit_const(Opcode::LoadConst, "call");
                    self.emitter.emit_const(Opcode::Load, "this");
                    for argument in arguments {
                        if matches!(argument.kind, NodeKind::Spread(_)) {
                            return Err(self.error("Spread arguments are not supported", argument.loc.start));
                        }
                        self.compile_expression(argument)?;
                    }
                    self.emitter.record_location(node.loc.start);
                    self.emitter.emit_u32(Opcode::MemberCall, arguments.len() as u32 + 1);
                    self.finish_chain(pins);
                    return Ok(());
                }
                self.compile_member_chain(object, &mut pins)?;
                if *member_optional {
                    pins.push(self.emitter.emit_patch(Opcode::Jnull));
                }
                if *computed {
                    self.compile_expression(property)?;
                } else {
                    let NodeKind::Identifier(name) = &property.kind else {
                        return Err(self.error("Invalid member name", property.loc.start));
                    };
                    self.emitter.emit_const(Opcode::LoadConst, name);
                }
                if *optional {
                    Opcode::MemberOptionalCall
                } else {
                    Opcode::MemberCall
                }
            }
            NodeKind::Super => {
                // `super(args)`: the parent constructor applied to `this`.
                self.compile_expression(callee)?;
                self.emitter.emit_const(Opcode::LoadConst, "constructor");
                self.emitter.emit(Opcode::GetField);
                self.emitter.emit_const(Opcode::LoadConst, "call");
                self.emitter.emit_const(Opcode::Load, "this");
                for argument in arguments {
                    if matches!(argument.kind, NodeKind::Spread(_)) {
                        return Err(self.error("Spread arguments are not supported", argument.loc.start));
                    }
                    self.compile_expression(argument)?;
                }
                self.emitter.record_location(node.loc.start);
                self.emitter.emit_u32(Opcode::MemberCall, arguments.len() as u32 + 1);
                return Ok(());
            }
            _ => {
                self.compile_expression(callee)?;
                if *optional { Opcode::OptionalCall } else { Opcode::Call }
            }
        };
        for argument in arguments {
            if matches!(argument.kind, NodeKind::Spread(_)) {
                return Err(self.error("Spread arguments are not supported", argument.loc.start));
            }
            self.compile_expression(argument)?;
        }
        self.emitter.record_location(node.loc.start);
        self.emitter.emit_u32(op, arguments.len() as u32);
        self.finish_chain(pins);
        Ok(())
    }

    fn compile_delete(&mut self, operand: &'a Node) -> CResult<()> {
        match &operand.kind {
            NodeKind::Identifier(name) => {
                Err(self.error(format!("Cannot delete identifier: '{name}'"), operand.loc.start))
            }
            NodeKind::Member {
                object,
                property,
                computed,
                optional,
            } => {
                let mut pins = Vec::new();
                self.compile_member_chain(object, &mut pins)?;
                if *optional {
                    pins.push(self.emitter.emit_patch(Opcode::Jnull));
                }
                if *computed {
                    self.compile_expression(property)?;
                } else {
                    let NodeKind::Identifier(name) = &property.kind else {
                        return Err(self.error("Invalid member name", property.loc.start));
                    };
                    self.emitter.emit_const(Opcode::LoadConst, name);
                }
                self.emitter.emit(Opcode::Delete);
                self.finish_chain(pins);
                Ok(())
            }
            _ => {
                self.compile_expression(operand)?;
                self.emitter.emit_u32(Opcode::Pop, 1);
                self.emitter.emit(Opcode::PushTrue);
                Ok(())
            }
        }
    }

    fn compile_array_literal(&mut self, items: &'a [Option<Node>]) -> CResult<()> {
        self.emitter.emit(Opcode::PushArray);
        let mut seen_spread = false;
        for (index, item) in items.iter().enumerate() {
            let Some(item) = item else { continue };
            if let NodeKind::Spread(value) = &item.kind {
                self.compile_expression(value)?;
                self.emitter.emit(Opcode::Merge);
                seen_spread = true;
                continue;
            }
            if seen_spread {
                // After a spread the element index no longer matches the
                // array length, so append through `push`.
                self.compile_expression(item)?;
                self.emitter.emit_u32(Opcode::PushValue, 2);
                self.emitter.emit_const(Opcode::LoadConst, "push");
                self.emitter.emit_u32(Opcode::PushValue, 3);
                self.emitter.record_location(item.loc.start);
                self.emitter.emit_u32(Opcode::MemberCall, 1);
                self.emitter.emit_u32(Opcode::Pop, 2);
            } else {
                self.compile_expression(item)?;
                self.emitter.emit_f64(Opcode::Push, index as f64);
                self.emitter.emit(Opcode::SetField);
                self.emitter.emit_u32(Opcode::Pop, 1);
            }
        }
        Ok(())
    }

    fn compile_object_literal(&mut self, properties: &'a [Node]) -> CResult<()> {
        self.emitter.emit(Opcode::PushObject);
        for property in properties {
            match &property.kind {
                NodeKind::Spread(value) => {
                    self.compile_expression(value)?;
                    self.emitter.emit(Opcode::Merge);
                }
                NodeKind::Property { key, value, computed } => {
                    match value {
                        Some(value) => self.compile_expression(value)?,
                        // Shorthand: the value is the binding of the key.
                        None => {
                            let NodeKind::Identifier(name) = &key.kind else {
                                return Err(self.error("Invalid shorthand property", key.loc.start));
                            };
                            self.emitter.emit_const(Opcode::Load, name);
                        }
                    }
                    self.compile_property_key(key, *computed)?;
                    self.emitter.emit(Opcode::SetField);
                    self.emitter.emit_u32(Opcode::Pop, 1);
                }
                NodeKind::ObjectMethod {
                    key,
                    computed,
                    is_async,
                    is_generator,
                    ..
                } => {
                    self.compile_method_value(property, *is_async, *is_generator)?;
                    if let NodeKind::Identifier(name) = &key.kind
                        && !*computed
                    {
                        self.emitter.emit_const(Opcode::SetFuncName, name);
                    }
                    self.compile_property_key(key, *computed)?;
                    self.emitter.emit(Opcode::SetField);
                    self.emitter.emit_u32(Opcode::Pop, 1);
                }
                NodeKind::ObjectAccessor { key, computed, kind, .. } => {
                    self.compile_method_value(property, false, false)?;
                    self.compile_property_key(key, *computed)?;
                    let flag = match kind {
                        AccessorKind::Get => 1,
                        AccessorKind::Set => 0,
                    };
                    self.emitter.emit_u32(Opcode::SetAccessor, flag);
                    self.emitter.emit_u32(Opcode::Pop, 1);
                }
                _ => return Err(self.error("Invalid object literal member", property.loc.start)),
            }
        }
        Ok(())
    }

    /// Emits the function object for a method-like node and registers its
    /// body for deferred emission.
    fn compile_method_value(&mut self, node: &'a Node, is_async: bool, is_generator: bool) -> CResult<()> {
        if is_generator {
            self.emitter.emit(Opcode::PushGenerator);
        } else {
            self.emitter.emit(Opcode::PushFunction);
        }
        let patch = self.emitter.emit_patch(Opcode::SetFuncAddress);
        self.frame().addr_patches.insert(node.id.0, patch);
        if is_async {
            self.emitter.emit_u32(Opcode::SetFuncAsync, 1);
        }
        let source = self.source_slice(node.loc);
        self.emitter.emit_const(Opcode::SetFuncSource, &source);
        let scope = match &node.kind {
            NodeKind::ObjectMethod { scope, .. }
            | NodeKind::ObjectAccessor { scope, .. }
            | NodeKind::ClassMethod { scope, .. }
            | NodeKind::ClassAccessor { scope, .. } => Some(*scope),
            _ => None,
        };
        if let Some(scope) = scope {
            for closure_name in self.scopes.closure_names(scope) {
                self.emitter.emit_const(Opcode::SetClosure, &closure_name);
            }
        }
        self.frame().pending.push(node);
        Ok(())
    }

    /// Emits a function or arrow expression value, including its closure
    /// captures.
    fn compile_function_value(&mut self, node: &'a Node) -> CResult<()> {
        let (scope, is_async, is_generator, is_arrow, name) = match &node.kind {
            NodeKind::Function {
                scope,
                is_async,
                is_generator,
                name,
                ..
            } => (*scope, *is_async, *is_generator, false, name.clone()),
            NodeKind::Arrow { scope, is_async, .. } => (*scope, *is_async, false, true, None),
            _ => return Err(self.error("Expected a function", node.loc.start)),
        };
        if is_arrow {
            self.emitter.emit(Opcode::PushArrow);
        } else if is_generator {
            self.emitter.emit(Opcode::PushGenerator);
        } else {
            self.emitter.emit(Opcode::PushFunction);
        }
        let patch = self.emitter.emit_patch(Opcode::SetFuncAddress);
        self.frame().addr_patches.insert(node.id.0, patch);
        if is_async {
            self.emitter.emit_u32(Opcode::SetFuncAsync, 1);
        }
        if let Some(name) = &name {
            self.emitter.emit_const(Opcode::SetFuncName, name);
        }
        let source = self.source_slice(node.loc);
        self.emitter.emit_const(Opcode::SetFuncSource, &source);
        for closure_name in self.scopes.closure_names(scope) {
            self.emitter.emit_const(Opcode::SetClosure, &closure_name);
        }
        self.frame().pending.push(node);
        Ok(())
    }

    fn compile_template(
        &mut self,
        node: &'a Node,
        tag: Option<&'a Node>,
        quasis: &[String],
        raw_quasis: &[String],
        expressions: &'a [Node],
    ) -> CResult<()> {
        let Some(tag) = tag else {
            // Untagged: fold into string concatenation.
            self.emitter.emit_const(Opcode::LoadConst, &quasis[0]);
            for (index, expression) in expressions.iter().enumerate() {
                self.compile_expression(expression)?;
                self.emitter.emit(Opcode::Add);
                self.emitter.emit_const(Opcode::LoadConst, &quasis[index + 1]);
                self.emitter.emit(Opcode::Add);
            }
            return Ok(());
        };

        // Tagged: call the tag with the strings array (carrying `raw`)
        // followed by the expression values.
        let op = match &tag.kind {
            NodeKind::Member {
                object,
                property,
                computed,
                optional,
            } => {
                if *optional {
                    return Err(self.error("Invalid tagged template on an optional chain", tag.loc.start));
                }
                let mut pins = Vec::new();
                self.compile_member_chain(object, &mut pins)?;
                if !pins.is_empty() {
                    return Err(self.error("Invalid tagged template on an optional chain", tag.loc.start));
                }
                if *computed {
                    self.compile_expression(property)?;
                } else {
                    let NodeKind::Identifier(name) = &property.kind else {
                        return Err(self.error("Invalid member name", property.loc.start));
                    };
                    self.emitter.emit_const(Opcode::LoadConst, name);
                }
                Opcode::MemberCall
            }
            _ => {
                self.compile_expression(tag)?;
                Opcode::Call
            }
        };

        self.emitter.emit(Opcode::PushArray);
        for (index, quasi) in quasis.iter().enumerate() {
            self.emitter.emit_const(Opcode::LoadConst, quasi);
            self.emitter.emit_f64(Opcode::Push, index as f64);
            self.emitter.emit(Opcode::SetField);
            self.emitter.emit_u32(Opcode::Pop, 1);
        }
        self.emitter.emit(Opcode::PushArray);
        for (index, raw) in raw_quasis.iter().enumerate() {
            self.emitter.emit_const(Opcode::LoadConst, raw);
            self.emitter.emit_f64(Opcode::Push, index as f64);
            self.emitter.emit(Opcode::SetField);
            self.emitter.emit_u32(Opcode::Pop, 1);
        }
        self.emitter.emit_const(Opcode::LoadConst, "raw");
        self.emitter.emit(Opcode::SetField);
        self.emitter.emit_u32(Opcode::Pop, 1);
        for expression in expressions {
            self.compile_expression(expression)?;
        }
        self.emitter.record_location(node.loc.start);
        self.emitter.emit_u32(op, expressions.len() as u32 + 1);
        Ok(())
    }

    // ---- classes ----

    /// Lowers a class to a constructor function plus prototype wiring.
    fn compile_class(&mut self, node: &'a Node) -> CResult<()> {
        let NodeKind::Class {
            name,
            superclass,
            members,
            ..
        } = &node.kind
        else {
            return Err(self.error("Expected a class", node.loc.start));
        };

        // Constructor.
        let constructor = members.iter().find(|member| {
            matches!(
                &member.kind,
                NodeKind::ClassMethod { key, computed: false, .. }
                    if matches!(&key.kind, NodeKind::Identifier(k) if k == "constructor")
            )
        });
        match constructor {
            Some(ctor) => {
                self.emitter.emit(Opcode::PushFunction);
                let patch = self.emitter.emit_patch(Opcode::SetFuncAddress);
                self.frame().addr_patches.insert(ctor.id.0, patch);
                self.frame().pending.push(ctor);
            }
            None => {
                // Synthesize an empty constructor body inline.
                let skip = self.emitter.emit_patch(Opcode::Jmp);
                let address = self.emitter.pc();
                self.emitter.emit(Opcode::PushUndefined);
                self.emitter.emit(Opcode::Ret);
                self.emitter.patch_here(skip);
                self.emitter.emit(Opcode::PushFunction);
                self.emitter.emit_u32(Opcode::SetFuncAddress, address);
            }
        }
        if let Some(name) = name {
            self.emitter.emit_const(Opcode::SetFuncName, name);
        }
        let source = self.source_slice(node.loc);
        self.emitter.emit_const(Opcode::SetFuncSource, &source);
        if let Some(ctor) = constructor {
            let NodeKind::ClassMethod { scope, .. } = &ctor.kind else {
                unreachable!("constructor is a class method");
            };
            for closure_name in self.scopes.closure_names(*scope) {
                self.emitter.emit_const(Opcode::SetClosure, &closure_name);
            }
        }

        // Inheritance wiring: constructor and prototype chains.
        if let Some(superclass) = superclass {
            self.compile_expression(superclass)?;
            self.emitter.emit_const(Opcode::LoadConst, "__proto__");
            self.emitter.emit(Opcode::SetField);
            self.emitter.emit_u32(Opcode::Pop, 1);

            self.emitter.emit_u32(Opcode::PushValue, 1);
            self.emitter.emit_const(Opcode::LoadConst, "prototype");
            self.emitter.emit(Opcode::GetField);
            self.emitter.emit_u32(Opcode::PushValue, 2);
            self.emitter.emit_const(Opcode::LoadConst, "__proto__");
            self.emitter.emit(Opcode::GetField);
            self.emitter.emit_const(Opcode::LoadConst, "prototype");
            self.emitter.emit(Opcode::GetField);
            self.emitter.emit_const(Opcode::LoadConst, "__proto__");
            self.emitter.emit(Opcode::SetField);
            self.emitter.emit_u32(Opcode::Pop, 2);
        }

        // Members land on the prototype; statics on the constructor.
        self.emitter.emit_u32(Opcode::PushValue, 1);
        self.emitter.emit_const(Opcode::LoadConst, "prototype");
        self.emitter.emit(Opcode::GetField);
        for member in members {
            match &member.kind {
                NodeKind::ClassMethod {
                    key,
                    computed,
                    is_static,
                    is_async,
                    is_generator,
                    ..
                } => {
                    if !*computed
                        && let NodeKind::Identifier(k) = &key.kind
                        && k == "constructor"
                    {
                        continue;
                    }
                    if *is_static {
                        self.emitter.emit_u32(Opcode::PushValue, 2);
                    }
                    self.compile_method_value(member, *is_async, *is_generator)?;
                    if let NodeKind::Identifier(k) = &key.kind
                        && !*computed
                    {
                        self.emitter.emit_const(Opcode::SetFuncName, k);
                    }
                    self.compile_property_key(key, *computed)?;
                    self.emitter.emit(Opcode::SetField);
                    self.emitter.emit_u32(Opcode::Pop, if *is_static { 2 } else { 1 });
                }
                NodeKind::ClassAccessor {
                    key,
                    computed,
                    is_static,
                    kind,
                    ..
                } => {
                    if *is_static {
                        self.emitter.emit_u32(Opcode::PushValue, 2);
                    }
                    self.compile_method_value(member, false, false)?;
                    self.compile_property_key(key, *computed)?;
                    let flag = match kind {
                        AccessorKind::Get => 1,
                        AccessorKind::Set => 0,
                    };
                    self.emitter.emit_u32(Opcode::SetAccessor, flag);
                    self.emitter.emit_u32(Opcode::Pop, if *is_static { 2 } else { 1 });
                }
                NodeKind::ClassProperty {
                    key,
                    computed,
                    is_static,
                    value,
                } => {
                    if *is_static {
                        self.emitter.emit_u32(Opcode::PushValue, 2);
                    }
                    match value {
                        Some(value) => self.compile_expression(value)?,
                        None => self.emitter.emit(Opcode::PushUndefined),
                    }
                    self.compile_property_key(key, *computed)?;
                    self.emitter.emit(Opcode::SetField);
                    self.emitter.emit_u32(Opcode::Pop, if *is_static { 2 } else { 1 });
                }
                _ => return Err(self.error("Invalid class member", member.loc.start)),
            }
        }
        self.emitter.emit_u32(Opcode::Pop, 1);
        Ok(())
    }

    // ---- deferred function bodies ----

    /// Emits every pending function body of the current frame, patching the
    /// recorded addresses. Bodies emitted here may register further pending
    /// functions into their own frames.
    fn flush_pending(&mut self) -> CResult<()> {
        let mut index = 0;
        while index < self.frames.last().map_or(0, |f| f.pending.len()) {
            let node = self.frames.last().expect("frame exists").pending[index];
            index += 1;
            self.emit_function_body(node)?;
        }
        Ok(())
    }

    fn emit_function_body(&mut self, node: &'a Node) -> CResult<()> {
        let (scope, params, body, expression_body) = match &node.kind {
            NodeKind::Function { scope, params, body, .. }
            | NodeKind::ObjectMethod { scope, params, body, .. }
            | NodeKind::ObjectAccessor { scope, params, body, .. }
            | NodeKind::ClassMethod { scope, params, body, .. }
            | NodeKind::ClassAccessor { scope, params, body, .. } => (*scope, params, body.as_ref(), false),
            NodeKind::Arrow { scope, params, body, .. } => {
                let expression_body = !matches!(body.kind, NodeKind::FunctionBody { .. });
                (*scope, params, body.as_ref(), expression_body)
            }
            _ => return Err(self.error("Expected a function body", node.loc.start)),
        };

        if let Some(patch) = self.frame().addr_patches.remove(&node.id.0) {
            self.emitter.patch_here(patch);
        }

        // Fresh control-flow state: labels and try frames do not cross
        // function boundaries.
        let saved_labels = std::mem::take(&mut self.labels);
        let saved_depth = self.scope_depth;
        let saved_tries = self.open_tries;
        self.open_tries = 0;
        self.frames.push(FunctionFrame::default());

        self.enter_scope(scope);
        if !params.is_empty() {
            // Parameters are bound by iterating the arguments object.
            self.emitter.emit_const(Opcode::Load, "arguments");
            self.emitter.emit(Opcode::PushUndefined);
            for param in params {
                match &param.kind {
                    NodeKind::RestElement(target) => {
                        self.emitter.emit(Opcode::RestArray);
                        self.compile_store(target, StoreKind::Normal)?;
                    }
                    _ => {
                        self.emitter.emit(Opcode::Next);
                        self.emitter.emit_u32(Opcode::Pop, 1);
                        self.compile_store(param, StoreKind::Normal)?;
                    }
                }
            }
            self.emitter.emit_u32(Opcode::Pop, 2);
        }
        if expression_body {
            self.compile_expression(body)?;
            self.emitter.emit(Opcode::Ret);
        } else {
            let NodeKind::FunctionBody { statements } = &body.kind else {
                return Err(self.error("Expected a function body", body.loc.start));
            };
            for statement in statements {
                self.compile_statement(statement)?;
            }
            self.emitter.emit(Opcode::PushUndefined);
            self.emitter.emit(Opcode::Ret);
        }
        self.flush_pending()?;
        self.leave_scope();

        self.frames.pop();
        self.labels = saved_labels;
        self.scope_depth = saved_depth;
        self.open_tries = saved_tries;
        Ok(())
    }
}
