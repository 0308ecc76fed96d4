//! Lexical-scope records built alongside parsing.
//!
//! The parser records a declaration the moment its syntax is recognized.
//! After the tree is complete, a second walk binds every identifier leaf to
//! the nearest enclosing declaration of the same name, appending the leaf to
//! the binding's reference list. The bytecode generator later consumes the
//! records twice: once to pre-hoist allocations on scope entry, and once to
//! compute the free variables a function closes over.
//!
//! Scopes live in a slab with parent indices; a scope id is an index into
//! the slab.

use serde::{Deserialize, Serialize};

use crate::{
    ast::{Node, NodeId, NodeKind},
    lexer::Loc,
};

/// Index of a lexical scope in the scope slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceScopeId(pub u32);

/// What kind of storage a declaration receives on scope entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclarationCategory {
    /// `var`: allocated as `undefined`.
    UndefinedInit,
    /// `let`/`const`: allocated uninitialized (temporal dead zone).
    Uninitialized,
    /// Hoisted function declaration.
    Function,
    /// Function parameter; bound by the call sequence, not by scope entry.
    Argument,
    /// Catch binding; bound by the unwinder, not by scope entry.
    Catch,
}

/// Shape of a hoisted function declaration, used by the bytecode generator
/// to pre-allocate the function object on scope entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub is_async: bool,
    pub is_generator: bool,
    /// The function's own scope, the root of its closure subtree.
    pub scope: SourceScopeId,
    /// Source span of the whole function, kept for `toString`.
    pub loc: Loc,
}

/// One declaration recorded in a scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub category: DeclarationCategory,
    pub is_const: bool,
    /// The declaring node (a function node for `Function`, the identifier
    /// node otherwise).
    pub node: NodeId,
    /// Present only for `Function` declarations.
    pub function: Option<FunctionInfo>,
}

/// A resolved association between a declaration and the identifier leaves
/// that refer to it, recorded on the scope where the references occur.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    /// `(scope, declaration index)` of the resolved declaration; `None` when
    /// the name resolves to nothing in the source (a global access).
    pub declaration: Option<(SourceScopeId, usize)>,
    pub references: Vec<NodeId>,
}

/// One lexical scope record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceScope {
    pub parent: Option<SourceScopeId>,
    pub children: Vec<SourceScopeId>,
    pub declarations: Vec<Declaration>,
    pub bindings: Vec<Binding>,
}

/// The slab of scope records for one parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeTree {
    scopes: Vec<SourceScope>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scope with `parent`, linking it into the parent's child
    /// list, and returns its id.
    pub fn push(&mut self, parent: Option<SourceScopeId>) -> SourceScopeId {
        let id = SourceScopeId(self.scopes.len() as u32);
        self.scopes.push(SourceScope {
            parent,
            ..SourceScope::default()
        });
        if let Some(parent) = parent {
            self.scopes[parent.0 as usize].children.push(id);
        }
        id
    }

    pub fn get(&self, id: SourceScopeId) -> &SourceScope {
        &self.scopes[id.0 as usize]
    }

    pub fn declare(&mut self, scope: SourceScopeId, declaration: Declaration) {
        self.scopes[scope.0 as usize].declarations.push(declaration);
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Resolves `name` from `scope` outwards to the nearest declaration.
    fn resolve(&self, mut scope: SourceScopeId, name: &str) -> Option<(SourceScopeId, usize)> {
        loop {
            let record = self.get(scope);
            if let Some(index) = record.declarations.iter().position(|d| d.name == name) {
                return Some((scope, index));
            }
            scope = record.parent?;
        }
    }

    fn bind_identifier(&mut self, scope: SourceScopeId, name: &str, node: NodeId) {
        let declaration = self.resolve(scope, name);
        let record = &mut self.scopes[scope.0 as usize];
        if let Some(binding) = record
            .bindings
            .iter_mut()
            .find(|b| b.name == name && b.declaration == declaration)
        {
            binding.references.push(node);
        } else {
            record.bindings.push(Binding {
                name: name.to_owned(),
                declaration,
                references: vec![node],
            });
        }
    }

    /// The free variables of the function owning `scope`: names referenced
    /// anywhere inside the scope subtree whose declaration lives outside of
    /// it. These are the names the generator emits `SET_CLOSURE` for.
    pub fn closure_names(&self, function_scope: SourceScopeId) -> Vec<String> {
        let mut inside = Vec::new();
        let mut work = vec![function_scope];
        while let Some(scope) = work.pop() {
            inside.push(scope);
            work.extend(self.get(scope).children.iter().copied());
        }
        let mut names = Vec::new();
        for &scope in &inside {
            for binding in &self.get(scope).bindings {
                let Some((decl_scope, _)) = binding.declaration else {
                    continue;
                };
                if !inside.contains(&decl_scope) && !names.contains(&binding.name) {
                    names.push(binding.name.clone());
                }
            }
        }
        names
    }

    /// Total number of identifier references recorded across all bindings.
    pub fn reference_count(&self) -> usize {
        self.scopes
            .iter()
            .flat_map(|s| &s.bindings)
            .map(|b| b.references.len())
            .sum()
    }
}

/// Runs the binding pass over a parsed program.
///
/// Every identifier leaf reachable in reference position lands in exactly
/// one binding of the scope it occurs in. Property names, import/export
/// names and labels are not references.
pub fn bind_program(tree: &mut ScopeTree, program: &Node) {
    let NodeKind::Program { scope, .. } = &program.kind else {
        return;
    };
    bind_node(tree, program, *scope);
}

fn bind_node(tree: &mut ScopeTree, node: &Node, current: SourceScopeId) {
    let scope = owned_scope(node).unwrap_or(current);
    match &node.kind {
        NodeKind::Identifier(name) => tree.bind_identifier(current, name, node.id),
        NodeKind::Program { body, .. } | NodeKind::Block { body, .. } => {
            for item in body {
                bind_node(tree, item, scope);
            }
        }
        NodeKind::ExpressionStatement(inner)
        | NodeKind::Group(inner)
        | NodeKind::Throw(inner)
        | NodeKind::Spread(inner)
        | NodeKind::Await(inner)
        | NodeKind::TypeOf(inner)
        | NodeKind::Void(inner)
        | NodeKind::Delete(inner) => bind_node(tree, inner, scope),
        NodeKind::Return(value) => {
            if let Some(value) = value {
                bind_node(tree, value, scope);
            }
        }
        NodeKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            bind_node(tree, condition, scope);
            bind_node(tree, then_branch, scope);
            if let Some(branch) = else_branch {
                bind_node(tree, branch, scope);
            }
        }
        NodeKind::Switch {
            discriminant, cases, ..
        } => {
            bind_node(tree, discriminant, scope);
            for case in cases {
                if let Some(test) = &case.test {
                    bind_node(tree, test, scope);
                }
                for item in &case.body {
                    bind_node(tree, item, scope);
                }
            }
        }
        NodeKind::While { condition, body } | NodeKind::DoWhile { condition, body } => {
            bind_node(tree, condition, scope);
            bind_node(tree, body, scope);
        }
        NodeKind::For {
            init,
            condition,
            update,
            body,
            ..
        } => {
            for part in [init, condition, update].into_iter().flatten() {
                bind_node(tree, part, scope);
            }
            bind_node(tree, body, scope);
        }
        NodeKind::ForIn {
            target,
            expression,
            body,
            ..
        }
        | NodeKind::ForOf {
            target,
            expression,
            body,
            ..
        } => {
            // The iteration expression evaluates outside the per-iteration
            // scope.
            bind_node(tree, expression, current);
            bind_node(tree, target, scope);
            bind_node(tree, body, scope);
        }
        NodeKind::Try { block, catch, finally } => {
            bind_node(tree, block, scope);
            if let Some(catch) = catch {
                if let Some(binding) = &catch.binding {
                    bind_node(tree, binding, catch.scope);
                }
                bind_node(tree, &catch.body, catch.scope);
            }
            if let Some(finally) = finally {
                bind_node(tree, finally, scope);
            }
        }
        NodeKind::Label { statement, .. } => bind_node(tree, statement, scope),
        NodeKind::VariableDeclaration { declarators, .. } => {
            for declarator in declarators {
                bind_node(tree, declarator, scope);
            }
        }
        NodeKind::Declarator { target, init } => {
            bind_node(tree, target, scope);
            if let Some(init) = init {
                bind_node(tree, init, scope);
            }
        }
        NodeKind::Unary { operand, .. } | NodeKind::Update { operand, .. } => bind_node(tree, operand, scope),
        NodeKind::Binary { left, right, .. } => {
            bind_node(tree, left, scope);
            bind_node(tree, right, scope);
        }
        NodeKind::Assignment { target, value, .. } => {
            bind_node(tree, target, scope);
            bind_node(tree, value, scope);
        }
        NodeKind::Conditional {
            condition,
            consequent,
            alternate,
        } => {
            bind_node(tree, condition, scope);
            bind_node(tree, consequent, scope);
            bind_node(tree, alternate, scope);
        }
        NodeKind::Sequence(items) => {
            for item in items {
                bind_node(tree, item, scope);
            }
        }
        NodeKind::Member {
            object,
            property,
            computed,
            ..
        } => {
            bind_node(tree, object, scope);
            if *computed {
                bind_node(tree, property, scope);
            }
        }
        NodeKind::Call { callee, arguments, .. } | NodeKind::New { callee, arguments } => {
            bind_node(tree, callee, scope);
            for argument in arguments {
                bind_node(tree, argument, scope);
            }
        }
        NodeKind::Yield { argument, .. } => {
            if let Some(argument) = argument {
                bind_node(tree, argument, scope);
            }
        }
        NodeKind::Function { params, body, .. }
        | NodeKind::Arrow { params, body, .. }
        | NodeKind::ObjectMethod { params, body, .. }
        | NodeKind::ObjectAccessor { params, body, .. }
        | NodeKind::ClassMethod { params, body, .. }
        | NodeKind::ClassAccessor { params, body, .. } => {
            for param in params {
                bind_node(tree, param, scope);
            }
            bind_node(tree, body, scope);
        }
        NodeKind::FunctionBody { statements } => {
            for statement in statements {
                bind_node(tree, statement, scope);
            }
        }
        NodeKind::Parameter { target, default } => {
            bind_node(tree, target, scope);
            if let Some(default) = default {
                bind_node(tree, default, scope);
            }
        }
        NodeKind::RestElement(target) => bind_node(tree, target, scope),
        NodeKind::ObjectLiteral { properties } => {
            for property in properties {
                bind_node(tree, property, scope);
            }
        }
        NodeKind::Property { key, value, computed } => {
            if let Some(value) = value {
                if *computed {
                    bind_node(tree, key, scope);
                }
                bind_node(tree, value, scope);
            } else {
                // Shorthand: the key is itself the reference.
                bind_node(tree, key, scope);
            }
        }
        NodeKind::ArrayLiteral { items } => {
            for item in items.iter().flatten() {
                bind_node(tree, item, scope);
            }
        }
        NodeKind::ObjectPattern { items } => {
            for item in items {
                bind_node(tree, item, scope);
            }
        }
        NodeKind::ObjectPatternItem {
            key,
            computed,
            target,
            default,
        } => {
            if *computed {
                bind_node(tree, key, scope);
            }
            bind_node(tree, target, scope);
            if let Some(default) = default {
                bind_node(tree, default, scope);
            }
        }
        NodeKind::ArrayPattern { items } => {
            for item in items.iter().flatten() {
                bind_node(tree, item, scope);
            }
        }
        NodeKind::ArrayPatternItem { target, default } => {
            bind_node(tree, target, scope);
            if let Some(default) = default {
                bind_node(tree, default, scope);
            }
        }
        NodeKind::Class {
            superclass, members, ..
        } => {
            if let Some(superclass) = superclass {
                bind_node(tree, superclass, current);
            }
            for member in members {
                bind_node(tree, member, scope);
            }
        }
        NodeKind::ClassProperty { key, computed, value, .. } => {
            if *computed {
                bind_node(tree, key, scope);
            }
            if let Some(value) = value {
                bind_node(tree, value, scope);
            }
        }
        NodeKind::ExportDefault(value) => bind_node(tree, value, scope),
        NodeKind::TemplateLiteral { tag, expressions, .. } => {
            if let Some(tag) = tag {
                bind_node(tree, tag, scope);
            }
            for expression in expressions {
                bind_node(tree, expression, scope);
            }
        }
        NodeKind::StringLiteral(_)
        | NodeKind::NumberLiteral(_)
        | NodeKind::BigIntLiteral(_)
        | NodeKind::BooleanLiteral(_)
        | NodeKind::NullLiteral
        | NodeKind::UndefinedLiteral
        | NodeKind::RegexLiteral { .. }
        | NodeKind::This
        | NodeKind::Super
        | NodeKind::Empty
        | NodeKind::Debugger
        | NodeKind::Break(_)
        | NodeKind::Continue(_)
        | NodeKind::ImportDeclaration { .. }
        | NodeKind::ImportSpecifier { .. }
        | NodeKind::ImportDefaultSpecifier { .. }
        | NodeKind::ImportNamespaceSpecifier { .. }
        | NodeKind::ExportDeclaration { .. }
        | NodeKind::ExportSpecifier { .. }
        | NodeKind::ExportAll { .. } => {}
    }
}

/// The scope a node introduces, if any. Entering the node switches the
/// binding walk to this scope.
fn owned_scope(node: &Node) -> Option<SourceScopeId> {
    match &node.kind {
        NodeKind::Program { scope, .. }
        | NodeKind::Block { scope, .. }
        | NodeKind::Switch { scope, .. }
        | NodeKind::For { scope, .. }
        | NodeKind::ForIn { scope, .. }
        | NodeKind::ForOf { scope, .. }
        | NodeKind::Function { scope, .. }
        | NodeKind::Arrow { scope, .. }
        | NodeKind::ObjectMethod { scope, .. }
        | NodeKind::ObjectAccessor { scope, .. }
        | NodeKind::Class { scope, .. }
        | NodeKind::ClassMethod { scope, .. }
        | NodeKind::ClassAccessor { scope, .. } => Some(*scope),
        _ => None,
    }
}
