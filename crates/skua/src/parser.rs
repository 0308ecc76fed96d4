//! Recursive-descent parser with Pratt-style operator precedence.
//!
//! Every production is speculative: it either commits, advancing the
//! position, or restores the position unchanged so the caller can try the
//! next alternative. Scope construction is interleaved with parsing — each
//! scope-introducing node pushes a lexical scope record and declarations are
//! recorded the moment their syntax is recognized. A post-parse walk binds
//! identifier references (see [`crate::scope::bind_program`]).

use crate::{
    ast::{
        AccessorKind, AssignOp, BinaryOp, CatchClause, DeclKind, Node, NodeId, NodeKind, RegexFlags,
        SwitchCase, UnaryOp, UpdateOp,
    },
    error::SyntaxError,
    lexer::{Lexer, Loc, Position, TemplateShape, Token},
    scope::{Declaration, DeclarationCategory, FunctionInfo, ScopeTree, SourceScopeId, bind_program},
};

type PResult<T> = Result<T, SyntaxError>;

/// A parsed program together with its scope records.
#[derive(Debug)]
pub struct ParsedProgram {
    pub root: Node,
    pub scopes: ScopeTree,
}

/// Parses `source` into a scoped syntax tree.
pub fn parse(source: &str, filename: &str) -> PResult<ParsedProgram> {
    let mut parser = Parser::new(source, filename);
    let root = parser.parse_program()?;
    let mut scopes = std::mem::take(&mut parser.scopes);
    bind_program(&mut scopes, &root);
    Ok(ParsedProgram { root, scopes })
}

struct Parser {
    chars: Vec<char>,
    source: String,
    filename: String,
    pos: Position,
    /// Whether the most recent skip crossed a line terminator.
    newline_before: bool,
    node_counter: u32,
    scopes: ScopeTree,
    current_scope: SourceScopeId,
}

impl Parser {
    fn new(source: &str, filename: &str) -> Self {
        let mut scopes = ScopeTree::new();
        let root_scope = scopes.push(None);
        Self {
            chars: source.chars().collect(),
            source: source.to_owned(),
            filename: filename.to_owned(),
            pos: Position::default(),
            newline_before: false,
            node_counter: 0,
            scopes,
            current_scope: root_scope,
        }
    }

    // ---- infrastructure ----

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(message, &self.filename, &self.source, self.pos)
    }

    fn error_at(&self, message: impl Into<String>, position: Position) -> SyntaxError {
        SyntaxError::new(message, &self.filename, &self.source, position)
    }

    fn node(&mut self, start: Position, kind: NodeKind) -> Node {
        self.node_counter += 1;
        Node {
            id: NodeId(self.node_counter),
            loc: Loc::new(start, self.pos),
            kind,
        }
    }

    fn skip(&mut self) -> PResult<()> {
        let lexer = Lexer::new(&self.chars);
        let mut pos = self.pos;
        match lexer.skip_invisible(&mut pos) {
            Ok(newline) => {
                self.newline_before = newline;
                self.pos = pos;
                Ok(())
            }
            Err(err) => Err(SyntaxError::new(err.message, &self.filename, &self.source, err.position)),
        }
    }

    fn is_end(&mut self) -> PResult<bool> {
        self.skip()?;
        Ok(self.pos.offset as usize >= self.chars.len())
    }

    fn token_text(&self, token: Token) -> String {
        token.loc.to_string(&self.chars)
    }

    /// Consumes the symbol `text` if it is next, skipping invisibles first.
    fn try_symbol(&mut self, text: &str) -> PResult<bool> {
        self.skip()?;
        let lexer = Lexer::new(&self.chars);
        let mut pos = self.pos;
        if let Some(token) = lexer.read_symbol(&mut pos).map_err(|e| self.lex_error(e))?
            && token.loc.to_string(&self.chars) == text
        {
            self.pos = pos;
            return Ok(true);
        }
        Ok(false)
    }

    fn expect_symbol(&mut self, text: &str) -> PResult<()> {
        if self.try_symbol(text)? {
            Ok(())
        } else {
            Err(self.error(format!("Unexpected token, expected '{text}'")))
        }
    }

    /// Peeks whether the symbol `text` is next without consuming it.
    fn peek_symbol(&mut self, text: &str) -> PResult<bool> {
        self.skip()?;
        let lexer = Lexer::new(&self.chars);
        let mut pos = self.pos;
        Ok(lexer
            .read_symbol(&mut pos)
            .map_err(|e| self.lex_error(e))?
            .is_some_and(|t| t.loc.to_string(&self.chars) == text))
    }

    fn try_keyword(&mut self, word: &str) -> PResult<bool> {
        self.skip()?;
        let lexer = Lexer::new(&self.chars);
        let mut pos = self.pos;
        if let Some(token) = lexer.read_keyword(&mut pos).map_err(|e| self.lex_error(e))?
            && token.loc.to_string(&self.chars) == word
        {
            self.pos = pos;
            return Ok(true);
        }
        Ok(false)
    }

    fn peek_keyword(&mut self, word: &str) -> PResult<bool> {
        self.skip()?;
        let lexer = Lexer::new(&self.chars);
        let mut pos = self.pos;
        Ok(lexer
            .read_keyword(&mut pos)
            .map_err(|e| self.lex_error(e))?
            .is_some_and(|t| t.loc.to_string(&self.chars) == word))
    }

    /// Consumes the contextual word `word` (an identifier such as `async`,
    /// `of`, `get`) if it is next.
    fn try_word(&mut self, word: &str) -> PResult<bool> {
        self.skip()?;
        let lexer = Lexer::new(&self.chars);
        let mut pos = self.pos;
        if let Some(token) = lexer.read_identifier(&mut pos).map_err(|e| self.lex_error(e))?
            && token.loc.to_string(&self.chars) == word
        {
            self.pos = pos;
            return Ok(true);
        }
        Ok(false)
    }

    fn try_identifier(&mut self) -> PResult<Option<(String, Position)>> {
        self.skip()?;
        let start = self.pos;
        let lexer = Lexer::new(&self.chars);
        let mut pos = self.pos;
        if let Some(token) = lexer.read_identifier(&mut pos).map_err(|e| self.lex_error(e))? {
            self.pos = pos;
            Ok(Some((self.token_text(token), start)))
        } else {
            Ok(None)
        }
    }

    fn lex_error(&self, err: crate::lexer::LexError) -> SyntaxError {
        SyntaxError::new(err.message, &self.filename, &self.source, err.position)
    }

    // ---- scope plumbing ----

    fn push_scope(&mut self) -> SourceScopeId {
        let scope = self.scopes.push(Some(self.current_scope));
        self.current_scope = scope;
        scope
    }

    fn pop_scope(&mut self) {
        let parent = self
            .scopes
            .get(self.current_scope)
            .parent
            .expect("cannot pop the root scope");
        self.current_scope = parent;
    }

    fn declare(&mut self, name: &str, category: DeclarationCategory, is_const: bool, node: NodeId) {
        self.scopes.declare(
            self.current_scope,
            Declaration {
                name: name.to_owned(),
                category,
                is_const,
                node,
                function: None,
            },
        );
    }

    fn declare_function(&mut self, name: &str, node: NodeId, function: FunctionInfo) {
        self.scopes.declare(
            self.current_scope,
            Declaration {
                name: name.to_owned(),
                category: DeclarationCategory::Function,
                is_const: false,
                node,
                function: Some(function),
            },
        );
    }

    /// Declares every identifier bound by a pattern (`Parameter`,
    /// `RestElement`, object/array patterns, plain identifiers).
    fn declare_pattern(&mut self, pattern: &Node, category: DeclarationCategory, is_const: bool) {
        match &pattern.kind {
            NodeKind::Identifier(name) => {
                let name = name.clone();
                self.declare(&name, category, is_const, pattern.id);
            }
            NodeKind::Parameter { target, .. } | NodeKind::RestElement(target) => {
                self.declare_pattern(target, category, is_const);
            }
            NodeKind::ObjectPattern { items } => {
                for item in items {
                    self.declare_pattern(item, category, is_const);
                }
            }
            NodeKind::ObjectPatternItem { target, .. } => self.declare_pattern(target, category, is_const),
            NodeKind::ArrayPattern { items } => {
                for item in items.iter().flatten() {
                    self.declare_pattern(item, category, is_const);
                }
            }
            NodeKind::ArrayPatternItem { target, .. } => self.declare_pattern(target, category, is_const),
            _ => {}
        }
    }

    // ---- program ----

    fn parse_program(&mut self) -> PResult<Node> {
        let start = self.pos;
        let scope = self.current_scope;
        let mut body = Vec::new();
        while !self.is_end()? {
            body.push(self.read_statement()?);
        }
        Ok(self.node(start, NodeKind::Program { body, scope }))
    }

    // ---- statements ----

    fn read_statement(&mut self) -> PResult<Node> {
        self.skip()?;
        let start = self.pos;

        if self.try_symbol(";")? {
            return Ok(self.node(start, NodeKind::Empty));
        }
        if self.peek_symbol("{")? {
            return self.read_block();
        }
        if self.try_keyword("debugger")? {
            let node = self.node(start, NodeKind::Debugger);
            self.expect_statement_end()?;
            return Ok(node);
        }
        if self.try_keyword("if")? {
            return self.read_if(start);
        }
        if self.try_keyword("switch")? {
            return self.read_switch(start);
        }
        if self.try_keyword("while")? {
            return self.read_while(start);
        }
        if self.try_keyword("do")? {
            return self.read_do_while(start);
        }
        if self.try_keyword("for")? {
            return self.read_for(start);
        }
        if self.try_keyword("try")? {
            return self.read_try(start);
        }
        if self.try_keyword("break")? {
            let label = self.read_label_operand()?;
            let node = self.node(start, NodeKind::Break(label));
            self.expect_statement_end()?;
            return Ok(node);
        }
        if self.try_keyword("continue")? {
            let label = self.read_label_operand()?;
            let node = self.node(start, NodeKind::Continue(label));
            self.expect_statement_end()?;
            return Ok(node);
        }
        if self.try_keyword("return")? {
            self.skip()?;
            let value = if self.newline_before || self.peek_symbol(";")? || self.peek_symbol("}")? || self.is_end()? {
                None
            } else {
                Some(Box::new(self.read_expression(18)?))
            };
            let node = self.node(start, NodeKind::Return(value));
            self.expect_statement_end()?;
            return Ok(node);
        }
        if self.try_keyword("throw")? {
            self.skip()?;
            if self.newline_before {
                return Err(self.error("Illegal newline after throw"));
            }
            let value = Box::new(self.read_expression(18)?);
            let node = self.node(start, NodeKind::Throw(value));
            self.expect_statement_end()?;
            return Ok(node);
        }
        if let Some(node) = self.try_variable_declaration()? {
            self.expect_statement_end()?;
            return Ok(node);
        }
        if let Some(node) = self.try_function(start, true)? {
            // Function and class declarations never require a terminator.
            return Ok(node);
        }
        if self.peek_keyword("class")? {
            return self.read_class(true);
        }
        if self.try_keyword("import")? {
            return self.read_import(start);
        }
        if self.try_keyword("export")? {
            return self.read_export(start);
        }
        if let Some(node) = self.try_label(start)? {
            return Ok(node);
        }

        let expression = self.read_expression(19)?;
        let node = self.node(start, NodeKind::ExpressionStatement(Box::new(expression)));
        self.expect_statement_end()?;
        Ok(node)
    }

    /// Automatic semicolon insertion: a statement must be followed by `;`,
    /// `}`, end of input, or a crossed line terminator.
    fn expect_statement_end(&mut self) -> PResult<()> {
        self.skip()?;
        if self.try_symbol(";")? {
            return Ok(());
        }
        if self.pos.offset as usize >= self.chars.len() || self.peek_symbol("}")? || self.newline_before {
            return Ok(());
        }
        Err(self.error("Unexpected token"))
    }

    fn read_label_operand(&mut self) -> PResult<Option<String>> {
        self.skip()?;
        if self.newline_before {
            return Ok(None);
        }
        Ok(self.try_identifier()?.map(|(name, _)| name))
    }

    fn try_label(&mut self, start: Position) -> PResult<Option<Node>> {
        let saved = self.pos;
        if let Some((name, _)) = self.try_identifier()?
            && self.try_symbol(":")?
        {
            let statement = Box::new(self.read_statement()?);
            return Ok(Some(self.node(start, NodeKind::Label { label: name, statement })));
        }
        self.pos = saved;
        Ok(None)
    }

    fn read_block(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.expect_symbol("{")?;
        let scope = self.push_scope();
        let mut body = Vec::new();
        while !self.try_symbol("}")? {
            if self.is_end()? {
                self.pop_scope();
                return Err(self.error("Unexpected end of input"));
            }
            body.push(self.read_statement()?);
        }
        self.pop_scope();
        Ok(self.node(start, NodeKind::Block { body, scope }))
    }

    fn read_if(&mut self, start: Position) -> PResult<Node> {
        self.expect_symbol("(")?;
        let condition = Box::new(self.read_expression(19)?);
        self.expect_symbol(")")?;
        let then_branch = Box::new(self.read_statement()?);
        let else_branch = if self.try_keyword("else")? {
            Some(Box::new(self.read_statement()?))
        } else {
            None
        };
        Ok(self.node(
            start,
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            },
        ))
    }

    fn read_switch(&mut self, start: Position) -> PResult<Node> {
        self.expect_symbol("(")?;
        let discriminant = Box::new(self.read_expression(19)?);
        self.expect_symbol(")")?;
        self.expect_symbol("{")?;
        let scope = self.push_scope();
        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.try_symbol("}")? {
            let test = if self.try_keyword("case")? {
                Some(self.read_expression(18)?)
            } else if self.try_keyword("default")? {
                if seen_default {
                    self.pop_scope();
                    return Err(self.error("More than one default clause in switch statement"));
                }
                seen_default = true;
                None
            } else {
                self.pop_scope();
                return Err(self.error("Unexpected token"));
            };
            self.expect_symbol(":")?;
            let mut body = Vec::new();
            loop {
                if self.peek_keyword("case")? || self.peek_keyword("default")? || self.peek_symbol("}")? {
                    break;
                }
                if self.is_end()? {
                    self.pop_scope();
                    return Err(self.error("Unexpected end of input"));
                }
                body.push(self.read_statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        self.pop_scope();
        Ok(self.node(
            start,
            NodeKind::Switch {
                discriminant,
                cases,
                scope,
            },
        ))
    }

    fn read_while(&mut self, start: Position) -> PResult<Node> {
        self.expect_symbol("(")?;
        let condition = Box::new(self.read_expression(19)?);
        self.expect_symbol(")")?;
        let body = Box::new(self.read_statement()?);
        Ok(self.node(start, NodeKind::While { condition, body }))
    }

    fn read_do_while(&mut self, start: Position) -> PResult<Node> {
        let body = Box::new(self.read_statement()?);
        if !self.try_keyword("while")? {
            return Err(self.error("Missing while after do-while body"));
        }
        self.expect_symbol("(")?;
        let condition = Box::new(self.read_expression(19)?);
        self.expect_symbol(")")?;
        let node = self.node(start, NodeKind::DoWhile { condition, body });
        self.expect_statement_end()?;
        Ok(node)
    }

    /// `for` variant trial order: for-of (including `for await of`), then
    /// for-in, then C-style, rewinding on each failure.
    fn read_for(&mut self, start: Position) -> PResult<Node> {
        let awaited = self.try_keyword("await")?;
        self.expect_symbol("(")?;
        let head = self.pos;
        let head_scope = self.current_scope;

        if let Some(node) = self.try_for_of(start, head, awaited)? {
            return Ok(node);
        }
        self.pos = head;
        self.current_scope = head_scope;
        if !awaited && let Some(node) = self.try_for_in(start, head)? {
            return Ok(node);
        }
        self.pos = head;
        self.current_scope = head_scope;
        if awaited {
            return Err(self.error("for await is only valid with of"));
        }

        let scope = self.push_scope();
        let init = if self.peek_symbol(";")? {
            None
        } else if let Some(declaration) = self.try_variable_declaration()? {
            Some(Box::new(declaration))
        } else {
            let expression = self.read_expression(19)?;
            let expr_start = expression.loc.start;
            Some(Box::new(self.node(expr_start, NodeKind::ExpressionStatement(Box::new(expression)))))
        };
        self.expect_symbol(";")?;
        let condition = if self.peek_symbol(";")? {
            None
        } else {
            Some(Box::new(self.read_expression(19)?))
        };
        self.expect_symbol(";")?;
        let update = if self.peek_symbol(")")? {
            None
        } else {
            Some(Box::new(self.read_expression(19)?))
        };
        self.expect_symbol(")")?;
        let body = Box::new(self.read_statement()?);
        self.pop_scope();
        Ok(self.node(
            start,
            NodeKind::For {
                init,
                condition,
                update,
                body,
                scope,
            },
        ))
    }

    fn read_for_head_target(&mut self) -> PResult<Option<(DeclKind, Node)>> {
        let kind = if self.try_keyword("const")? {
            DeclKind::Const
        } else if self.try_keyword("let")? {
            DeclKind::Let
        } else if self.try_keyword("var")? {
            DeclKind::Var
        } else {
            DeclKind::None
        };
        let target = if kind == DeclKind::None {
            // An existing lvalue.
            let Some(target) = self.try_pattern_or_lvalue()? else {
                return Ok(None);
            };
            target
        } else {
            let Some(target) = self.try_pattern()? else {
                return Ok(None);
            };
            target
        };
        Ok(Some((kind, target)))
    }

    fn try_for_of(&mut self, start: Position, head: Position, awaited: bool) -> PResult<Option<Node>> {
        let scope = self.push_scope();
        let result = (|| -> PResult<Option<Node>> {
            let Some((kind, target)) = self.read_for_head_target()? else {
                return Ok(None);
            };
            if !self.try_word("of")? {
                return Ok(None);
            }
            if kind != DeclKind::None {
                let category = if kind == DeclKind::Var {
                    DeclarationCategory::UndefinedInit
                } else {
                    DeclarationCategory::Uninitialized
                };
                self.declare_pattern(&target, category, kind == DeclKind::Const);
            }
            let expression = Box::new(self.read_expression(18)?);
            self.expect_symbol(")")?;
            let body = Box::new(self.read_statement()?);
            Ok(Some(self.node(
                start,
                NodeKind::ForOf {
                    kind,
                    target: Box::new(target),
                    expression,
                    body,
                    awaited,
                    scope,
                },
            )))
        })();
        self.pop_scope();
        match result {
            Ok(Some(node)) => Ok(Some(node)),
            Ok(None) => {
                self.pos = head;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn try_for_in(&mut self, start: Position, head: Position) -> PResult<Option<Node>> {
        let scope = self.push_scope();
        let result = (|| -> PResult<Option<Node>> {
            let Some((kind, target)) = self.read_for_head_target()? else {
                return Ok(None);
            };
            if !self.try_keyword("in")? {
                return Ok(None);
            }
            if kind != DeclKind::None {
                let category = if kind == DeclKind::Var {
                    DeclarationCategory::UndefinedInit
                } else {
                    DeclarationCategory::Uninitialized
                };
                self.declare_pattern(&target, category, kind == DeclKind::Const);
            }
            let expression = Box::new(self.read_expression(18)?);
            self.expect_symbol(")")?;
            let body = Box::new(self.read_statement()?);
            Ok(Some(self.node(
                start,
                NodeKind::ForIn {
                    kind,
                    target: Box::new(target),
                    expression,
                    body,
                    scope,
                },
            )))
        })();
        self.pop_scope();
        match result {
            Ok(Some(node)) => Ok(Some(node)),
            Ok(None) => {
                self.pos = head;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn read_try(&mut self, start: Position) -> PResult<Node> {
        let block = Box::new(self.read_block()?);
        let catch = if self.try_keyword("catch")? {
            let scope = self.push_scope();
            let binding = if self.try_symbol("(")? {
                let Some(pattern) = self.try_pattern()? else {
                    self.pop_scope();
                    return Err(self.error("Unexpected token in catch binding"));
                };
                self.declare_pattern(&pattern, DeclarationCategory::Catch, false);
                self.expect_symbol(")")?;
                Some(Box::new(pattern))
            } else {
                None
            };
            let body = Box::new(self.read_block()?);
            self.pop_scope();
            Some(CatchClause { binding, body, scope })
        } else {
            None
        };
        let finally = if self.try_keyword("finally")? {
            Some(Box::new(self.read_block()?))
        } else {
            None
        };
        if catch.is_none() && finally.is_none() {
            return Err(self.error("Missing catch or finally after try"));
        }
        Ok(self.node(start, NodeKind::Try { block, catch, finally }))
    }

    fn try_variable_declaration(&mut self) -> PResult<Option<Node>> {
        let start = self.pos;
        let kind = if self.try_keyword("const")? {
            DeclKind::Const
        } else if self.try_keyword("let")? {
            DeclKind::Let
        } else if self.try_keyword("var")? {
            DeclKind::Var
        } else {
            return Ok(None);
        };
        let category = if kind == DeclKind::Var {
            DeclarationCategory::UndefinedInit
        } else {
            DeclarationCategory::Uninitialized
        };
        let mut declarators = Vec::new();
        loop {
            self.skip()?;
            let item_start = self.pos;
            let Some(target) = self.try_pattern()? else {
                return Err(self.error("Unexpected token in variable declaration"));
            };
            self.declare_pattern(&target, category, kind == DeclKind::Const);
            let init = if self.try_symbol("=")? {
                Some(Box::new(self.read_expression(18)?))
            } else if kind == DeclKind::Const {
                return Err(self.error("Missing initializer in const declaration"));
            } else {
                None
            };
            declarators.push(self.node(
                item_start,
                NodeKind::Declarator {
                    target: Box::new(target),
                    init,
                },
            ));
            if !self.try_symbol(",")? {
                break;
            }
        }
        Ok(Some(self.node(start, NodeKind::VariableDeclaration { kind, declarators })))
    }

    // ---- patterns ----

    /// A binding pattern: identifier, object pattern or array pattern.
    fn try_pattern(&mut self) -> PResult<Option<Node>> {
        if let Some(pattern) = self.try_object_pattern()? {
            return Ok(Some(pattern));
        }
        if let Some(pattern) = self.try_array_pattern()? {
            return Ok(Some(pattern));
        }
        self.skip()?;
        let start = self.pos;
        if let Some((name, _)) = self.try_identifier()? {
            return Ok(Some(self.node(start, NodeKind::Identifier(name))));
        }
        Ok(None)
    }

    /// A pattern or an existing lvalue (member expression) for `for` heads.
    fn try_pattern_or_lvalue(&mut self) -> PResult<Option<Node>> {
        if let Some(pattern) = self.try_object_pattern()? {
            return Ok(Some(pattern));
        }
        if let Some(pattern) = self.try_array_pattern()? {
            return Ok(Some(pattern));
        }
        let saved = self.pos;
        let Ok(expression) = self.read_expression(1) else {
            self.pos = saved;
            return Ok(None);
        };
        if expression.is_lvalue() {
            Ok(Some(expression))
        } else {
            self.pos = saved;
            Ok(None)
        }
    }

    fn try_object_pattern(&mut self) -> PResult<Option<Node>> {
        self.skip()?;
        let start = self.pos;
        if !self.try_symbol("{")? {
            return Ok(None);
        }
        let mut items = Vec::new();
        loop {
            if self.try_symbol("}")? {
                break;
            }
            self.skip()?;
            let item_start = self.pos;
            if self.try_symbol("...")? {
                let Some(target) = self.try_pattern()? else {
                    return Err(self.error("Invalid rest element in object pattern"));
                };
                items.push(self.node(item_start, NodeKind::RestElement(Box::new(target))));
            } else {
                let (key, computed) = self.read_property_key()?;
                let target = if self.try_symbol(":")? {
                    let Some(target) = self.try_pattern()? else {
                        return Err(self.error("Unexpected token in object pattern"));
                    };
                    target
                } else {
                    // Shorthand: the key is the binding target.
                    let NodeKind::Identifier(_) = &key.kind else {
                        return Err(self.error("Unexpected token in object pattern"));
                    };
                    key.clone()
                };
                let default = if self.try_symbol("=")? {
                    Some(Box::new(self.read_expression(18)?))
                } else {
                    None
                };
                items.push(self.node(
                    item_start,
                    NodeKind::ObjectPatternItem {
                        key: Box::new(key),
                        computed,
                        target: Box::new(target),
                        default,
                    },
                ));
            }
            if !self.try_symbol(",")? {
                self.expect_symbol("}")?;
                break;
            }
        }
        Ok(Some(self.node(start, NodeKind::ObjectPattern { items })))
    }

    fn try_array_pattern(&mut self) -> PResult<Option<Node>> {
        self.skip()?;
        let start = self.pos;
        if !self.try_symbol("[")? {
            return Ok(None);
        }
        let mut items = Vec::new();
        loop {
            if self.try_symbol("]")? {
                break;
            }
            if self.try_symbol(",")? {
                items.push(None);
                continue;
            }
            self.skip()?;
            let item_start = self.pos;
            if self.try_symbol("...")? {
                let Some(target) = self.try_pattern()? else {
                    return Err(self.error("Invalid rest element in array pattern"));
                };
                items.push(Some(self.node(item_start, NodeKind::RestElement(Box::new(target)))));
            } else {
                let Some(target) = self.try_pattern()? else {
                    return Err(self.error("Unexpected token in array pattern"));
                };
                let default = if self.try_symbol("=")? {
                    Some(Box::new(self.read_expression(18)?))
                } else {
                    None
                };
                items.push(Some(self.node(
                    item_start,
                    NodeKind::ArrayPatternItem {
                        target: Box::new(target),
                        default,
                    },
                )));
            }
            if !self.try_symbol(",")? {
                self.expect_symbol("]")?;
                break;
            }
        }
        Ok(Some(self.node(start, NodeKind::ArrayPattern { items })))
    }

    /// Converts an expression parsed in value position into a pattern, for
    /// assignment targets like `[a, b] = pair`.
    fn expression_to_pattern(&mut self, node: Node) -> PResult<Node> {
        let id = node.id;
        let loc = node.loc;
        let kind = match node.kind {
            NodeKind::ObjectLiteral { properties } => {
                let mut items = Vec::new();
                for property in properties {
                    let item_id = property.id;
                    let item_loc = property.loc;
                    match property.kind {
                        NodeKind::Property { key, value, computed } => {
                            let (target, default) = match value {
                                Some(value) => match value.kind {
                                    // Shorthand-with-default parsed as an
                                    // assignment in value position.
                                    NodeKind::Assignment {
                                        op: AssignOp::Assign,
                                        target,
                                        value,
                                    } => (self.expression_to_pattern(*target)?, Some(value)),
                                    kind => (
                                        self.expression_to_pattern(Node {
                                            id: value.id,
                                            loc: value.loc,
                                            kind,
                                        })?,
                                        None,
                                    ),
                                },
                                None => (key.as_ref().clone(), None),
                            };
                            items.push(Node {
                                id: item_id,
                                loc: item_loc,
                                kind: NodeKind::ObjectPatternItem {
                                    key,
                                    computed,
                                    target: Box::new(target),
                                    default,
                                },
                            });
                        }
                        NodeKind::Spread(target) => {
                            let target = self.expression_to_pattern(*target)?;
                            items.push(Node {
                                id: item_id,
                                loc: item_loc,
                                kind: NodeKind::RestElement(Box::new(target)),
                            });
                        }
                        _ => return Err(self.error_at("Invalid destructuring assignment target", loc.start)),
                    }
                }
                NodeKind::ObjectPattern { items }
            }
            NodeKind::ArrayLiteral { items } => {
                let mut pattern_items = Vec::new();
                for item in items {
                    match item {
                        None => pattern_items.push(None),
                        Some(node) => {
                            let item_id = node.id;
                            let item_loc = node.loc;
                            match node.kind {
                                NodeKind::Spread(target) => {
                                    let target = self.expression_to_pattern(*target)?;
                                    pattern_items.push(Some(Node {
                                        id: item_id,
                                        loc: item_loc,
                                        kind: NodeKind::RestElement(Box::new(target)),
                                    }));
                                }
                                NodeKind::Assignment {
                                    op: AssignOp::Assign,
                                    target,
                                    value,
                                } => {
                                    let target = self.expression_to_pattern(*target)?;
                                    pattern_items.push(Some(Node {
                                        id: item_id,
                                        loc: item_loc,
                                        kind: NodeKind::ArrayPatternItem {
                                            target: Box::new(target),
                                            default: Some(value),
                                        },
                                    }));
                                }
                                kind => {
                                    let target = self.expression_to_pattern(Node {
                                        id: item_id,
                                        loc: item_loc,
                                        kind,
                                    })?;
                                    pattern_items.push(Some(Node {
                                        id: item_id,
                                        loc: item_loc,
                                        kind: NodeKind::ArrayPatternItem {
                                            target: Box::new(target),
                                            default: None,
                                        },
                                    }));
                                }
                            }
                        }
                    }
                }
                NodeKind::ArrayPattern { items: pattern_items }
            }
            kind @ (NodeKind::Identifier(_) | NodeKind::Member { .. }) => kind,
            _ => return Err(self.error_at("Invalid assignment target", loc.start)),
        };
        Ok(Node { id, loc, kind })
    }

    // ---- expressions ----

    /// Reads an expression, attaching infix operators whose precedence level
    /// is at most `max_level`.
    fn read_expression(&mut self, max_level: i32) -> PResult<Node> {
        self.skip()?;
        let start = self.pos;

        let mut left = self.read_unary_or_primary(max_level)?;

        loop {
            self.skip()?;
            // Postfix update binds at level 3 and does not cross a newline.
            if max_level >= 3
                && !self.newline_before
                && left.level() <= 3
                && let Some(op) = self.try_update_operator()?
            {
                left = self.node(
                    start,
                    NodeKind::Update {
                        op,
                        operand: Box::new(left),
                    },
                );
                continue;
            }
            match self.try_postfix(start, left, max_level)? {
                Ok(next) => left = next,
                Err(unchanged) => {
                    left = unchanged;
                    break;
                }
            }
        }
        Ok(left)
    }

    fn try_update_operator(&mut self) -> PResult<Option<UpdateOp>> {
        if self.try_symbol("++")? {
            Ok(Some(UpdateOp::Increment))
        } else if self.try_symbol("--")? {
            Ok(Some(UpdateOp::Decrement))
        } else {
            Ok(None)
        }
    }

    /// One climb step: member access, call, tagged template, binary
    /// operator, conditional, assignment or sequence. `Ok(Err(left))` hands
    /// the operand back untouched when nothing attaches.
    fn try_postfix(&mut self, start: Position, left: Node, max_level: i32) -> PResult<Result<Node, Node>> {
        // Member access and calls (level 1).
        if max_level >= 1 {
            if self.try_symbol("?.")? {
                // `?.(`, `?.[` and plain `?.name`.
                if self.peek_symbol("(")? {
                    let arguments = self.read_arguments()?;
                    return Ok(Ok(self.node(
                        start,
                        NodeKind::Call {
                            callee: Box::new(left),
                            arguments,
                            optional: true,
                        },
                    )));
                }
                if self.try_symbol("[")? {
                    let property = self.read_expression(19)?;
                    self.expect_symbol("]")?;
                    return Ok(Ok(self.node(
                        start,
                        NodeKind::Member {
                            object: Box::new(left),
                            property: Box::new(property),
                            computed: true,
                            optional: true,
                        },
                    )));
                }
                let property = self.read_member_name()?;
                return Ok(Ok(self.node(
                    start,
                    NodeKind::Member {
                        object: Box::new(left),
                        property: Box::new(property),
                        computed: false,
                        optional: true,
                    },
                )));
            }
            if self.try_symbol(".")? {
                let property = self.read_member_name()?;
                return Ok(Ok(self.node(
                    start,
                    NodeKind::Member {
                        object: Box::new(left),
                        property: Box::new(property),
                        computed: false,
                        optional: false,
                    },
                )));
            }
            if self.try_symbol("[")? {
                let property = self.read_expression(19)?;
                self.expect_symbol("]")?;
                return Ok(Ok(self.node(
                    start,
                    NodeKind::Member {
                        object: Box::new(left),
                        property: Box::new(property),
                        computed: true,
                        optional: false,
                    },
                )));
            }
            if self.peek_symbol("(")? {
                let arguments = self.read_arguments()?;
                return Ok(Ok(self.node(
                    start,
                    NodeKind::Call {
                        callee: Box::new(left),
                        arguments,
                        optional: false,
                    },
                )));
            }
            self.skip()?;
            if self.chars.get(self.pos.offset as usize) == Some(&'`') {
                let template = self.read_template(Some(Box::new(left)))?;
                return Ok(Ok(template));
            }
        }

        // Binary operators, levels 5..16.
        if let Some((op, op_end)) = self.peek_binary_operator()? {
            let level = op.level();
            if level <= max_level && left.level() <= level {
                self.pos = op_end;
                // `**` is right-associative; the rest are left-associative.
                let right_cap = if op == BinaryOp::Pow { level } else { level - 1 };
                let right = self.read_expression(right_cap)?;
                return Ok(Ok(self.node(
                    start,
                    NodeKind::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                )));
            }
            return Ok(Err(left));
        }

        // Conditional (level 17). `?.` and `??` were consumed above.
        if max_level >= 17 && self.try_symbol("?")? {
            let consequent = self.read_expression(18)?;
            self.expect_symbol(":")?;
            let alternate = self.read_expression(18)?;
            return Ok(Ok(self.node(
                start,
                NodeKind::Conditional {
                    condition: Box::new(left),
                    consequent: Box::new(consequent),
                    alternate: Box::new(alternate),
                },
            )));
        }

        // Assignment (level 18, right-associative).
        if max_level >= 18
            && let Some((op, op_end)) = self.peek_assignment_operator()?
        {
            self.pos = op_end;
            let target = self.expression_to_pattern(left)?;
            let value = self.read_expression(18)?;
            return Ok(Ok(self.node(
                start,
                NodeKind::Assignment {
                    op,
                    target: Box::new(target),
                    value: Box::new(value),
                },
            )));
        }

        // Sequence (level 19).
        if max_level >= 19 && self.try_symbol(",")? {
            let right = self.read_expression(18)?;
            let mut items = match left.kind {
                NodeKind::Sequence(items) => items,
                kind => vec![Node {
                    id: left.id,
                    loc: left.loc,
                    kind,
                }],
            };
            items.push(right);
            return Ok(Ok(self.node(start, NodeKind::Sequence(items))));
        }

        Ok(Err(left))
    }

    fn read_member_name(&mut self) -> PResult<Node> {
        self.skip()?;
        let start = self.pos;
        let lexer = Lexer::new(&self.chars);
        let mut pos = self.pos;
        // Member names may be reserved words (`x.default`).
        if let Some(token) = lexer.read_identifier(&mut pos).map_err(|e| self.lex_error(e))? {
            self.pos = pos;
            let name = self.token_text(token);
            return Ok(self.node(start, NodeKind::Identifier(name)));
        }
        let mut pos = self.pos;
        if let Some(token) = lexer.read_keyword(&mut pos).map_err(|e| self.lex_error(e))? {
            self.pos = pos;
            let name = self.token_text(token);
            return Ok(self.node(start, NodeKind::Identifier(name)));
        }
        Err(self.error("Unexpected token, expected property name"))
    }

    fn peek_binary_operator(&mut self) -> PResult<Option<(BinaryOp, Position)>> {
        self.skip()?;
        let lexer = Lexer::new(&self.chars);
        let mut pos = self.pos;
        if let Some(token) = lexer.read_symbol(&mut pos).map_err(|e| self.lex_error(e))? {
            let text = self.token_text(token);
            if let Some(op) = BinaryOp::from_symbol(&text) {
                return Ok(Some((op, pos)));
            }
            return Ok(None);
        }
        let mut pos = self.pos;
        if let Some(token) = lexer.read_keyword(&mut pos).map_err(|e| self.lex_error(e))? {
            let text = self.token_text(token);
            if text == "in" || text == "instanceof" {
                return Ok(Some((BinaryOp::from_symbol(&text).expect("keyword operator"), pos)));
            }
        }
        Ok(None)
    }

    fn peek_assignment_operator(&mut self) -> PResult<Option<(AssignOp, Position)>> {
        self.skip()?;
        let lexer = Lexer::new(&self.chars);
        let mut pos = self.pos;
        if let Some(token) = lexer.read_symbol(&mut pos).map_err(|e| self.lex_error(e))? {
            let text = self.token_text(token);
            if text == "=>" {
                return Ok(None);
            }
            if let Some(op) = AssignOp::from_symbol(&text) {
                return Ok(Some((op, pos)));
            }
        }
        Ok(None)
    }

    fn read_arguments(&mut self) -> PResult<Vec<Node>> {
        self.expect_symbol("(")?;
        let mut arguments = Vec::new();
        loop {
            if self.try_symbol(")")? {
                break;
            }
            self.skip()?;
            let start = self.pos;
            if self.try_symbol("...")? {
                let value = self.read_expression(18)?;
                arguments.push(self.node(start, NodeKind::Spread(Box::new(value))));
            } else {
                arguments.push(self.read_expression(18)?);
            }
            if !self.try_symbol(",")? {
                self.expect_symbol(")")?;
                break;
            }
        }
        Ok(arguments)
    }

    fn read_unary_or_primary(&mut self, max_level: i32) -> PResult<Node> {
        self.skip()?;
        let start = self.pos;

        if max_level >= 4 {
            let unary = if self.try_symbol("!")? {
                Some(UnaryOp::LogicalNot)
            } else if self.try_symbol("~")? {
                Some(UnaryOp::BitwiseNot)
            } else if self.try_symbol("++")? {
                Some(UnaryOp::Increment)
            } else if self.try_symbol("--")? {
                Some(UnaryOp::Decrement)
            } else if self.try_symbol("+")? {
                Some(UnaryOp::Plus)
            } else if self.try_symbol("-")? {
                Some(UnaryOp::Negate)
            } else {
                None
            };
            if let Some(op) = unary {
                let operand = Box::new(self.read_expression(4)?);
                return Ok(self.node(start, NodeKind::Unary { op, operand }));
            }
            if self.try_keyword("typeof")? {
                let operand = Box::new(self.read_expression(4)?);
                return Ok(self.node(start, NodeKind::TypeOf(operand)));
            }
            if self.try_keyword("void")? {
                let operand = Box::new(self.read_expression(4)?);
                return Ok(self.node(start, NodeKind::Void(operand)));
            }
            if self.try_keyword("delete")? {
                let operand = Box::new(self.read_expression(4)?);
                return Ok(self.node(start, NodeKind::Delete(operand)));
            }
            if self.try_keyword("await")? {
                let operand = Box::new(self.read_expression(4)?);
                return Ok(self.node(start, NodeKind::Await(operand)));
            }
        }

        if self.try_keyword("yield")? {
            let delegate = self.try_symbol("*")?;
            self.skip()?;
            let argument = if self.newline_before
                || self.peek_symbol(")")?
                || self.peek_symbol("]")?
                || self.peek_symbol("}")?
                || self.peek_symbol(";")?
                || self.peek_symbol(",")?
                || self.is_end()?
            {
                None
            } else {
                Some(Box::new(self.read_expression(18)?))
            };
            if delegate && argument.is_none() {
                return Err(self.error("yield* requires an iterable operand"));
            }
            return Ok(self.node(start, NodeKind::Yield { argument, delegate }));
        }

        if self.try_keyword("new")? {
            return self.read_new(start);
        }

        self.read_primary()
    }

    /// `new callee(args)` — the callee is a member chain without calls.
    fn read_new(&mut self, start: Position) -> PResult<Node> {
        let mut callee = self.read_primary()?;
        loop {
            let callee_start = callee.loc.start;
            if self.try_symbol(".")? {
                let property = self.read_member_name()?;
                callee = self.node(
                    callee_start,
                    NodeKind::Member {
                        object: Box::new(callee),
                        property: Box::new(property),
                        computed: false,
                        optional: false,
                    },
                );
            } else if self.try_symbol("[")? {
                let property = self.read_expression(19)?;
                self.expect_symbol("]")?;
                callee = self.node(
                    callee_start,
                    NodeKind::Member {
                        object: Box::new(callee),
                        property: Box::new(property),
                        computed: true,
                        optional: false,
                    },
                );
            } else {
                break;
            }
        }
        let arguments = if self.peek_symbol("(")? {
            self.read_arguments()?
        } else {
            Vec::new()
        };
        Ok(self.node(
            start,
            NodeKind::New {
                callee: Box::new(callee),
                arguments,
            },
        ))
    }

    fn read_primary(&mut self) -> PResult<Node> {
        self.skip()?;
        let start = self.pos;

        // Literal keywords.
        if self.try_keyword("null")? {
            return Ok(self.node(start, NodeKind::NullLiteral));
        }
        if self.try_keyword("true")? {
            return Ok(self.node(start, NodeKind::BooleanLiteral(true)));
        }
        if self.try_keyword("false")? {
            return Ok(self.node(start, NodeKind::BooleanLiteral(false)));
        }
        if self.try_keyword("this")? {
            return Ok(self.node(start, NodeKind::This));
        }
        if self.try_keyword("super")? {
            return Ok(self.node(start, NodeKind::Super));
        }

        // String.
        let mut pos = self.pos;
        if let Some(token) = Lexer::new(&self.chars)
            .read_string(&mut pos)
            .map_err(|e| self.lex_error(e))?
        {
            self.pos = pos;
            let raw = self.token_text(token);
            let value = unescape_string(&raw[1..raw.len() - 1]);
            return Ok(self.node(start, NodeKind::StringLiteral(value)));
        }

        // BigInt before number: the number reader would also accept the
        // digits and stop before the `n`.
        let mut pos = self.pos;
        if let Some(token) = Lexer::new(&self.chars)
            .read_bigint(&mut pos)
            .map_err(|e| self.lex_error(e))?
        {
            self.pos = pos;
            let mut digits = self.token_text(token);
            digits.pop();
            return Ok(self.node(start, NodeKind::BigIntLiteral(digits)));
        }

        let mut pos = self.pos;
        if let Some(token) = Lexer::new(&self.chars)
            .read_number(&mut pos)
            .map_err(|e| self.lex_error(e))?
        {
            self.pos = pos;
            let text = self.token_text(token);
            let value = parse_number_literal(&text).ok_or_else(|| self.error_at("Invalid number", start))?;
            return Ok(self.node(start, NodeKind::NumberLiteral(value)));
        }

        // Regex.
        let mut pos = self.pos;
        if let Some(token) = Lexer::new(&self.chars)
            .read_regex(&mut pos)
            .map_err(|e| self.lex_error(e))?
        {
            self.pos = pos;
            let raw = self.token_text(token);
            let close = raw.rfind('/').expect("regex token contains a slash");
            let pattern = raw[1..close].to_owned();
            let mut flags = RegexFlags::default();
            for flag in raw[close + 1..].chars() {
                match flag {
                    'd' => flags.has_indices = true,
                    'g' => flags.global = true,
                    'i' => flags.ignore_case = true,
                    'm' => flags.multiline = true,
                    's' => flags.dot_all = true,
                    'y' => flags.sticky = true,
                    'u' | 'v' => {}
                    _ => return Err(self.error_at("Invalid regular expression flags", start)),
                }
            }
            return Ok(self.node(start, NodeKind::RegexLiteral { pattern, flags }));
        }

        // Template literal.
        if self.chars.get(self.pos.offset as usize) == Some(&'`') {
            return self.read_template(None);
        }

        // `async` function or arrow.
        if self.peek_word_is("async")? {
            let saved = self.pos;
            let _ = self.try_word("async")?;
            self.skip()?;
            if !self.newline_before {
                if self.peek_keyword("function")? {
                    let _ = self.try_keyword("function")?;
                    return self.read_function_tail(start, false, true);
                }
                if let Some(node) = self.try_arrow(start, true)? {
                    return Ok(node);
                }
            }
            self.pos = saved;
        }

        if self.try_keyword("function")? {
            return self.read_function_tail(start, false, false);
        }
        if self.peek_keyword("class")? {
            return self.read_class(false);
        }

        // Arrow function, tried speculatively before grouping.
        if let Some(node) = self.try_arrow(start, false)? {
            return Ok(node);
        }

        if self.try_symbol("(")? {
            let expression = self.read_expression(19)?;
            self.expect_symbol(")")?;
            return Ok(self.node(start, NodeKind::Group(Box::new(expression))));
        }

        if let Some(node) = self.try_array_literal(start)? {
            return Ok(node);
        }
        if let Some(node) = self.try_object_literal(start)? {
            return Ok(node);
        }

        if let Some((name, _)) = self.try_identifier()? {
            if name == "undefined" {
                return Ok(self.node(start, NodeKind::UndefinedLiteral));
            }
            return Ok(self.node(start, NodeKind::Identifier(name)));
        }

        Err(self.error("Unexpected token"))
    }

    fn peek_word_is(&mut self, word: &str) -> PResult<bool> {
        self.skip()?;
        let lexer = Lexer::new(&self.chars);
        let mut pos = self.pos;
        Ok(lexer
            .read_identifier(&mut pos)
            .map_err(|e| self.lex_error(e))?
            .is_some_and(|t| t.loc.to_string(&self.chars) == word))
    }

    // ---- template literals ----

    fn read_template(&mut self, tag: Option<Box<Node>>) -> PResult<Node> {
        let start = tag.as_ref().map_or(self.pos, |t| t.loc.start);
        let lexer = Lexer::new(&self.chars);
        let mut pos = self.pos;
        let Some((token, shape)) = lexer.read_template_open(&mut pos).map_err(|e| self.lex_error(e))? else {
            return Err(self.error("Unexpected token"));
        };
        self.pos = pos;
        let mut quasis = Vec::new();
        let mut raw_quasis = Vec::new();
        let mut expressions = Vec::new();
        let mut push_quasi = |raw: &str| {
            raw_quasis.push(raw.to_owned());
            quasis.push(unescape_string(raw));
        };
        let raw = self.token_text(token);
        match shape {
            TemplateShape::Full => push_quasi(&raw[1..raw.len() - 1]),
            TemplateShape::Head => {
                push_quasi(&raw[1..raw.len() - 2]);
                loop {
                    expressions.push(self.read_expression(19)?);
                    self.skip()?;
                    let lexer = Lexer::new(&self.chars);
                    let mut pos = self.pos;
                    let Some((token, shape)) =
                        lexer.read_template_part(&mut pos).map_err(|e| self.lex_error(e))?
                    else {
                        return Err(self.error("Unterminated template literal"));
                    };
                    self.pos = pos;
                    let raw = self.token_text(token);
                    match shape {
                        TemplateShape::Middle => push_quasi(&raw[1..raw.len() - 2]),
                        TemplateShape::Tail => {
                            push_quasi(&raw[1..raw.len() - 1]);
                            break;
                        }
                        TemplateShape::Full | TemplateShape::Head => unreachable!("continuation shapes only"),
                    }
                }
            }
            TemplateShape::Middle | TemplateShape::Tail => unreachable!("open shapes only"),
        }
        Ok(self.node(
            start,
            NodeKind::TemplateLiteral {
                tag,
                quasis,
                raw_quasis,
                expressions,
            },
        ))
    }

    // ---- functions, arrows, classes ----

    /// Reads a function declaration in statement position, or returns
    /// `None`. Expressions go through [`Self::read_primary`].
    fn try_function(&mut self, start: Position, is_declaration: bool) -> PResult<Option<Node>> {
        let saved = self.pos;
        let is_async = if self.peek_word_is("async")? {
            let _ = self.try_word("async")?;
            self.skip()?;
            if self.newline_before || !self.peek_keyword("function")? {
                self.pos = saved;
                return Ok(None);
            }
            true
        } else {
            false
        };
        if !self.try_keyword("function")? {
            self.pos = saved;
            return Ok(None);
        }
        let node = self.read_function_tail(start, is_declaration, is_async)?;
        Ok(Some(node))
    }

    /// Everything after the `function` keyword.
    fn read_function_tail(&mut self, start: Position, is_declaration: bool, is_async: bool) -> PResult<Node> {
        let is_generator = self.try_symbol("*")?;
        let name = self.try_identifier()?.map(|(name, _)| name);
        if is_declaration && name.is_none() {
            return Err(self.error("Function declarations require a name"));
        }
        let scope = self.push_scope();
        let params = match self.read_parameters() {
            Ok(params) => params,
            Err(err) => {
                self.pop_scope();
                return Err(err);
            }
        };
        let body = match self.read_function_body() {
            Ok(body) => body,
            Err(err) => {
                self.pop_scope();
                return Err(err);
            }
        };
        self.pop_scope();
        let node = self.node(
            start,
            NodeKind::Function {
                name: name.clone(),
                params,
                body: Box::new(body),
                is_async,
                is_generator,
                is_declaration,
                scope,
            },
        );
        if is_declaration {
            let name = name.expect("declaration name checked above");
            self.declare_function(
                &name,
                node.id,
                FunctionInfo {
                    is_async,
                    is_generator,
                    scope,
                    loc: node.loc,
                },
            );
        }
        Ok(node)
    }

    /// Reads `( params )`, declaring each parameter in the current scope.
    fn read_parameters(&mut self) -> PResult<Vec<Node>> {
        self.expect_symbol("(")?;
        let mut params = Vec::new();
        loop {
            if self.try_symbol(")")? {
                break;
            }
            self.skip()?;
            let start = self.pos;
            if self.try_symbol("...")? {
                let Some(target) = self.try_pattern()? else {
                    return Err(self.error("Invalid rest parameter"));
                };
                let node = self.node(start, NodeKind::RestElement(Box::new(target)));
                self.declare_pattern(&node, DeclarationCategory::Argument, false);
                params.push(node);
            } else {
                let Some(target) = self.try_pattern()? else {
                    return Err(self.error("Unexpected token in parameter list"));
                };
                let default = if self.try_symbol("=")? {
                    Some(Box::new(self.read_expression(18)?))
                } else {
                    None
                };
                let node = self.node(
                    start,
                    NodeKind::Parameter {
                        target: Box::new(target),
                        default,
                    },
                );
                self.declare_pattern(&node, DeclarationCategory::Argument, false);
                params.push(node);
            }
            if !self.try_symbol(",")? {
                self.expect_symbol(")")?;
                break;
            }
        }
        Ok(params)
    }

    fn read_function_body(&mut self) -> PResult<Node> {
        self.skip()?;
        let start = self.pos;
        self.expect_symbol("{")?;
        let mut statements = Vec::new();
        while !self.try_symbol("}")? {
            if self.is_end()? {
                return Err(self.error("Unexpected end of input"));
            }
            statements.push(self.read_statement()?);
        }
        Ok(self.node(start, NodeKind::FunctionBody { statements }))
    }

    /// Speculative arrow-function recognition: `( params ) =>` or a bare
    /// `identifier =>`, rewound without effect on failure.
    fn try_arrow(&mut self, start: Position, is_async: bool) -> PResult<Option<Node>> {
        let saved = self.pos;
        let saved_counter = self.node_counter;

        // Bare identifier form.
        if let Some((name, ident_start)) = self.try_identifier()? {
            self.skip()?;
            if !self.newline_before && self.try_symbol("=>")? {
                let scope = self.push_scope();
                let target = self.node(ident_start, NodeKind::Identifier(name));
                let param = self.node(
                    ident_start,
                    NodeKind::Parameter {
                        target: Box::new(target),
                        default: None,
                    },
                );
                self.declare_pattern(&param, DeclarationCategory::Argument, false);
                let body = self.read_arrow_body();
                self.pop_scope();
                let body = body?;
                return Ok(Some(self.node(
                    start,
                    NodeKind::Arrow {
                        params: vec![param],
                        body: Box::new(body),
                        is_async,
                        scope,
                    },
                )));
            }
            self.pos = saved;
            self.node_counter = saved_counter;
            return Ok(None);
        }

        if !self.peek_symbol("(")? {
            return Ok(None);
        }

        // Parenthesized parameter list: parse the raw parameter shapes
        // first; the scope is created only once `=>` confirms an arrow.
        let params = match self.try_arrow_parameters() {
            Ok(Some(params)) => params,
            Ok(None) | Err(_) => {
                self.pos = saved;
                self.node_counter = saved_counter;
                return Ok(None);
            }
        };
        self.skip()?;
        if self.newline_before || !self.try_symbol("=>")? {
            self.pos = saved;
            self.node_counter = saved_counter;
            return Ok(None);
        }
        let scope = self.push_scope();
        for param in &params {
            self.declare_pattern(param, DeclarationCategory::Argument, false);
        }
        let body = self.read_arrow_body();
        self.pop_scope();
        let body = body?;
        Ok(Some(self.node(
            start,
            NodeKind::Arrow {
                params,
                body: Box::new(body),
                is_async,
                scope,
            },
        )))
    }

    fn try_arrow_parameters(&mut self) -> PResult<Option<Vec<Node>>> {
        if !self.try_symbol("(")? {
            return Ok(None);
        }
        let mut params = Vec::new();
        loop {
            if self.try_symbol(")")? {
                break;
            }
            self.skip()?;
            let start = self.pos;
            if self.try_symbol("...")? {
                let Some(target) = self.try_pattern()? else {
                    return Ok(None);
                };
                params.push(self.node(start, NodeKind::RestElement(Box::new(target))));
            } else {
                let Some(target) = self.try_pattern()? else {
                    return Ok(None);
                };
                let default = if self.try_symbol("=")? {
                    Some(Box::new(self.read_expression(18)?))
                } else {
                    None
                };
                params.push(self.node(
                    start,
                    NodeKind::Parameter {
                        target: Box::new(target),
                        default,
                    },
                ));
            }
            if !self.try_symbol(",")? {
                if self.try_symbol(")")? {
                    break;
                }
                return Ok(None);
            }
        }
        Ok(Some(params))
    }

    /// Block body or expression body.
    fn read_arrow_body(&mut self) -> PResult<Node> {
        self.skip()?;
        if self.peek_symbol("{")? {
            let start = self.pos;
            self.expect_symbol("{")?;
            let mut statements = Vec::new();
            while !self.try_symbol("}")? {
                if self.is_end()? {
                    return Err(self.error("Unexpected end of input"));
                }
                statements.push(self.read_statement()?);
            }
            Ok(self.node(start, NodeKind::FunctionBody { statements }))
        } else {
            self.read_expression(18)
        }
    }

    fn read_class(&mut self, is_declaration: bool) -> PResult<Node> {
        self.skip()?;
        let start = self.pos;
        if !self.try_keyword("class")? {
            return Err(self.error("Unexpected token"));
        }
        let name = self.try_identifier()?.map(|(name, _)| name);
        if is_declaration && name.is_none() {
            return Err(self.error("Class declarations require a name"));
        }
        let superclass = if self.try_keyword("extends")? {
            Some(Box::new(self.read_expression(2)?))
        } else {
            None
        };
        self.expect_symbol("{")?;
        let scope = self.push_scope();
        let mut members = Vec::new();
        loop {
            if self.try_symbol("}")? {
                break;
            }
            if self.try_symbol(";")? {
                continue;
            }
            if self.is_end()? {
                self.pop_scope();
                return Err(self.error("Unexpected end of input"));
            }
            match self.read_class_member() {
                Ok(member) => members.push(member),
                Err(err) => {
                    self.pop_scope();
                    return Err(err);
                }
            }
        }
        self.pop_scope();
        let node = self.node(
            start,
            NodeKind::Class {
                name: name.clone(),
                superclass,
                members,
                is_declaration,
                scope,
            },
        );
        if is_declaration {
            let name = name.expect("declaration name checked above");
            self.declare(&name, DeclarationCategory::Uninitialized, false, node.id);
        }
        Ok(node)
    }

    fn read_class_member(&mut self) -> PResult<Node> {
        self.skip()?;
        let start = self.pos;
        let is_static = {
            let saved = self.pos;
            if self.try_keyword("static")? {
                // `static` may itself be a member name.
                if self.peek_symbol("(")? || self.peek_symbol("=")? {
                    self.pos = saved;
                    false
                } else {
                    true
                }
            } else {
                false
            }
        };

        // Accessors.
        for (word, kind) in [("get", AccessorKind::Get), ("set", AccessorKind::Set)] {
            let saved = self.pos;
            if self.try_word(word)? {
                if self.peek_symbol("(")? || self.peek_symbol("=")? {
                    self.pos = saved;
                } else {
                    let (key, computed) = self.read_property_key()?;
                    let scope = self.push_scope();
                    let result = self
                        .read_parameters()
                        .and_then(|params| self.read_function_body().map(|body| (params, body)));
                    self.pop_scope();
                    let (params, body) = result?;
                    return Ok(self.node(
                        start,
                        NodeKind::ClassAccessor {
                            key: Box::new(key),
                            computed,
                            is_static,
                            kind,
                            params,
                            body: Box::new(body),
                            scope,
                        },
                    ));
                }
            }
        }

        let is_async = {
            let saved = self.pos;
            if self.try_word("async")? {
                if self.peek_symbol("(")? || self.peek_symbol("=")? {
                    self.pos = saved;
                    false
                } else {
                    true
                }
            } else {
                false
            }
        };
        let is_generator = self.try_symbol("*")?;

        let (key, computed) = self.read_property_key()?;
        if self.peek_symbol("(")? {
            let scope = self.push_scope();
            let result = self
                .read_parameters()
                .and_then(|params| self.read_function_body().map(|body| (params, body)));
            self.pop_scope();
            let (params, body) = result?;
            return Ok(self.node(
                start,
                NodeKind::ClassMethod {
                    key: Box::new(key),
                    computed,
                    is_static,
                    params,
                    body: Box::new(body),
                    is_async,
                    is_generator,
                    scope,
                },
            ));
        }
        let value = if self.try_symbol("=")? {
            Some(Box::new(self.read_expression(18)?))
        } else {
            None
        };
        let node = self.node(
            start,
            NodeKind::ClassProperty {
                key: Box::new(key),
                computed,
                is_static,
                value,
            },
        );
        self.expect_statement_end()?;
        Ok(node)
    }

    // ---- object and array literals ----

    fn try_array_literal(&mut self, start: Position) -> PResult<Option<Node>> {
        if !self.try_symbol("[")? {
            return Ok(None);
        }
        let mut items = Vec::new();
        loop {
            if self.try_symbol("]")? {
                break;
            }
            if self.try_symbol(",")? {
                items.push(None);
                continue;
            }
            self.skip()?;
            let item_start = self.pos;
            if self.try_symbol("...")? {
                let value = self.read_expression(18)?;
                items.push(Some(self.node(item_start, NodeKind::Spread(Box::new(value)))));
            } else {
                items.push(Some(self.read_expression(18)?));
            }
            if !self.try_symbol(",")? {
                self.expect_symbol("]")?;
                break;
            }
        }
        Ok(Some(self.node(start, NodeKind::ArrayLiteral { items })))
    }

    fn try_object_literal(&mut self, start: Position) -> PResult<Option<Node>> {
        if !self.try_symbol("{")? {
            return Ok(None);
        }
        let mut properties = Vec::new();
        loop {
            if self.try_symbol("}")? {
                break;
            }
            self.skip()?;
            let item_start = self.pos;
            if self.try_symbol("...")? {
                let value = self.read_expression(18)?;
                properties.push(self.node(item_start, NodeKind::Spread(Box::new(value))));
            } else {
                properties.push(self.read_object_member(item_start)?);
            }
            if !self.try_symbol(",")? {
                self.expect_symbol("}")?;
                break;
            }
        }
        Ok(Some(self.node(start, NodeKind::ObjectLiteral { properties })))
    }

    fn read_object_member(&mut self, start: Position) -> PResult<Node> {
        // Accessors.
        for (word, kind) in [("get", AccessorKind::Get), ("set", AccessorKind::Set)] {
            let saved = self.pos;
            if self.try_word(word)? {
                if self.peek_symbol(":")? || self.peek_symbol("(")? || self.peek_symbol(",")? || self.peek_symbol("}")? {
                    self.pos = saved;
                } else {
                    let (key, computed) = self.read_property_key()?;
                    let scope = self.push_scope();
                    let result = self
                        .read_parameters()
                        .and_then(|params| self.read_function_body().map(|body| (params, body)));
                    self.pop_scope();
                    let (params, body) = result?;
                    return Ok(self.node(
                        start,
                        NodeKind::ObjectAccessor {
                            key: Box::new(key),
                            computed,
                            kind,
                            params,
                            body: Box::new(body),
                            scope,
                        },
                    ));
                }
            }
        }

        let is_async = {
            let saved = self.pos;
            if self.try_word("async")? {
                if self.peek_symbol(":")? || self.peek_symbol("(")? || self.peek_symbol(",")? || self.peek_symbol("}")? {
                    self.pos = saved;
                    false
                } else {
                    true
                }
            } else {
                false
            }
        };
        let is_generator = self.try_symbol("*")?;

        let (key, computed) = self.read_property_key()?;
        if self.peek_symbol("(")? {
            let scope = self.push_scope();
            let result = self
                .read_parameters()
                .and_then(|params| self.read_function_body().map(|body| (params, body)));
            self.pop_scope();
            let (params, body) = result?;
            return Ok(self.node(
                start,
                NodeKind::ObjectMethod {
                    key: Box::new(key),
                    computed,
                    params,
                    body: Box::new(body),
                    is_async,
                    is_generator,
                    scope,
                },
            ));
        }
        if is_async || is_generator {
            return Err(self.error("Unexpected token"));
        }
        let value = if self.try_symbol(":")? {
            Some(Box::new(self.read_expression(18)?))
        } else {
            let NodeKind::Identifier(_) = &key.kind else {
                return Err(self.error("Unexpected token in object literal"));
            };
            // Shorthand or shorthand-with-default (destructuring context).
            if self.try_symbol("=")? {
                let default = self.read_expression(18)?;
                let target = key.clone();
                let assignment = self.node(
                    start,
                    NodeKind::Assignment {
                        op: AssignOp::Assign,
                        target: Box::new(target),
                        value: Box::new(default),
                    },
                );
                return Ok(self.node(
                    start,
                    NodeKind::Property {
                        key: Box::new(key),
                        value: Some(Box::new(assignment)),
                        computed: false,
                    },
                ));
            }
            None
        };
        Ok(self.node(start, NodeKind::Property {
            key: Box::new(key),
            value,
            computed,
        }))
    }

    /// A property key: identifier, reserved word, string, number or a
    /// computed `[expr]` form. Returns the key node and the computed flag.
    fn read_property_key(&mut self) -> PResult<(Node, bool)> {
        self.skip()?;
        let start = self.pos;
        if self.try_symbol("[")? {
            let key = self.read_expression(18)?;
            self.expect_symbol("]")?;
            return Ok((key, true));
        }
        let lexer = Lexer::new(&self.chars);
        let mut pos = self.pos;
        if let Some(token) = lexer.read_string(&mut pos).map_err(|e| self.lex_error(e))? {
            self.pos = pos;
            let raw = self.token_text(token);
            let value = unescape_string(&raw[1..raw.len() - 1]);
            return Ok((self.node(start, NodeKind::StringLiteral(value)), false));
        }
        let mut pos = self.pos;
        if let Some(token) = lexer.read_number(&mut pos).map_err(|e| self.lex_error(e))? {
            self.pos = pos;
            let text = self.token_text(token);
            let value = parse_number_literal(&text).ok_or_else(|| self.error_at("Invalid number", start))?;
            return Ok((self.node(start, NodeKind::NumberLiteral(value)), false));
        }
        let mut pos = self.pos;
        if let Some(token) = lexer.read_identifier(&mut pos).map_err(|e| self.lex_error(e))? {
            self.pos = pos;
            let name = self.token_text(token);
            return Ok((self.node(start, NodeKind::Identifier(name)), false));
        }
        let mut pos = self.pos;
        if let Some(token) = lexer.read_keyword(&mut pos).map_err(|e| self.lex_error(e))? {
            self.pos = pos;
            let name = self.token_text(token);
            return Ok((self.node(start, NodeKind::Identifier(name)), false));
        }
        Err(self.error("Unexpected token, expected property key"))
    }

    // ---- modules (parse-only) ----

    fn read_import(&mut self, start: Position) -> PResult<Node> {
        let mut items = Vec::new();
        self.skip()?;
        let lexer = Lexer::new(&self.chars);
        let mut pos = self.pos;
        if let Some(token) = lexer.read_string(&mut pos).map_err(|e| self.lex_error(e))? {
            // Bare `import "module"`.
            self.pos = pos;
            let raw = self.token_text(token);
            let source = unescape_string(&raw[1..raw.len() - 1]);
            let node = self.node(start, NodeKind::ImportDeclaration { source, items });
            self.expect_statement_end()?;
            return Ok(node);
        }

        loop {
            self.skip()?;
            let item_start = self.pos;
            if self.try_symbol("*")? {
                if !self.try_word("as")? {
                    return Err(self.error("Expected 'as' after import *"));
                }
                let Some((alias, _)) = self.try_identifier()? else {
                    return Err(self.error("Expected namespace alias"));
                };
                items.push(self.node(item_start, NodeKind::ImportNamespaceSpecifier { alias }));
            } else if self.try_symbol("{")? {
                loop {
                    if self.try_symbol("}")? {
                        break;
                    }
                    self.skip()?;
                    let spec_start = self.pos;
                    let Some((name, _)) = self.try_identifier()? else {
                        return Err(self.error("Expected import specifier"));
                    };
                    let alias = if self.try_word("as")? {
                        let Some((alias, _)) = self.try_identifier()? else {
                            return Err(self.error("Expected import alias"));
                        };
                        Some(alias)
                    } else {
                        None
                    };
                    items.push(self.node(spec_start, NodeKind::ImportSpecifier { name, alias }));
                    if !self.try_symbol(",")? {
                        self.expect_symbol("}")?;
                        break;
                    }
                }
            } else if let Some((name, _)) = self.try_identifier()? {
                items.push(self.node(item_start, NodeKind::ImportDefaultSpecifier { name }));
            } else {
                return Err(self.error("Unexpected token in import declaration"));
            }
            if !self.try_symbol(",")? {
                break;
            }
        }

        if !self.try_word("from")? {
            return Err(self.error("Expected 'from' in import declaration"));
        }
        self.skip()?;
        let lexer = Lexer::new(&self.chars);
        let mut pos = self.pos;
        let Some(token) = lexer.read_string(&mut pos).map_err(|e| self.lex_error(e))? else {
            return Err(self.error("Expected module specifier string"));
        };
        self.pos = pos;
        let raw = self.token_text(token);
        let source = unescape_string(&raw[1..raw.len() - 1]);
        let node = self.node(start, NodeKind::ImportDeclaration { source, items });
        self.expect_statement_end()?;
        Ok(node)
    }

    fn read_export(&mut self, start: Position) -> PResult<Node> {
        if self.try_keyword("default")? {
            let value = self.read_expression(18)?;
            let node = self.node(start, NodeKind::ExportDefault(Box::new(value)));
            self.expect_statement_end()?;
            return Ok(node);
        }
        if self.try_symbol("*")? {
            let alias = if self.try_word("as")? {
                let Some((alias, _)) = self.try_identifier()? else {
                    return Err(self.error("Expected export alias"));
                };
                Some(alias)
            } else {
                None
            };
            if !self.try_word("from")? {
                return Err(self.error("Expected 'from' in export declaration"));
            }
            self.skip()?;
            let lexer = Lexer::new(&self.chars);
            let mut pos = self.pos;
            let Some(token) = lexer.read_string(&mut pos).map_err(|e| self.lex_error(e))? else {
                return Err(self.error("Expected module specifier string"));
            };
            self.pos = pos;
            let raw = self.token_text(token);
            let source = unescape_string(&raw[1..raw.len() - 1]);
            let all = self.node(start, NodeKind::ExportAll { alias });
            let node = self.node(
                start,
                NodeKind::ExportDeclaration {
                    items: vec![all],
                    source: Some(source),
                },
            );
            self.expect_statement_end()?;
            return Ok(node);
        }
        if self.peek_symbol("{")? {
            self.expect_symbol("{")?;
            let mut items = Vec::new();
            loop {
                if self.try_symbol("}")? {
                    break;
                }
                self.skip()?;
                let spec_start = self.pos;
                let Some((name, _)) = self.try_identifier()? else {
                    return Err(self.error("Expected export specifier"));
                };
                let alias = if self.try_word("as")? {
                    let Some((alias, _)) = self.try_identifier()? else {
                        return Err(self.error("Expected export alias"));
                    };
                    Some(alias)
                } else {
                    None
                };
                items.push(self.node(spec_start, NodeKind::ExportSpecifier { name, alias }));
                if !self.try_symbol(",")? {
                    self.expect_symbol("}")?;
                    break;
                }
            }
            let source = if self.try_word("from")? {
                self.skip()?;
                let lexer = Lexer::new(&self.chars);
                let mut pos = self.pos;
                let Some(token) = lexer.read_string(&mut pos).map_err(|e| self.lex_error(e))? else {
                    return Err(self.error("Expected module specifier string"));
                };
                self.pos = pos;
                let raw = self.token_text(token);
                Some(unescape_string(&raw[1..raw.len() - 1]))
            } else {
                None
            };
            let node = self.node(start, NodeKind::ExportDeclaration { items, source });
            self.expect_statement_end()?;
            return Ok(node);
        }
        // `export <declaration>`.
        let declaration = self.read_statement()?;
        Ok(self.node(
            start,
            NodeKind::ExportDeclaration {
                items: vec![declaration],
                source: None,
            },
        ))
    }
}

/// Decodes string-literal escape sequences into the cooked value.
fn unescape_string(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut index = 0;
    while index < chars.len() {
        let ch = chars[index];
        if ch != '\\' {
            out.push(ch);
            index += 1;
            continue;
        }
        index += 1;
        let Some(&escape) = chars.get(index) else { break };
        index += 1;
        match escape {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            'x' => {
                let digits: String = chars.iter().skip(index).take(2).collect();
                if let Ok(code) = u32::from_str_radix(&digits, 16)
                    && let Some(decoded) = char::from_u32(code)
                {
                    out.push(decoded);
                    index += 2;
                }
            }
            'u' => {
                if chars.get(index) == Some(&'{') {
                    let end = chars[index..].iter().position(|&c| c == '}');
                    if let Some(end) = end {
                        let digits: String = chars[index + 1..index + end].iter().collect();
                        if let Ok(code) = u32::from_str_radix(&digits, 16)
                            && let Some(decoded) = char::from_u32(code)
                        {
                            out.push(decoded);
                        }
                        index += end + 1;
                    }
                } else {
                    let digits: String = chars.iter().skip(index).take(4).collect();
                    if let Ok(code) = u32::from_str_radix(&digits, 16)
                        && let Some(decoded) = char::from_u32(code)
                    {
                        out.push(decoded);
                        index += 4;
                    }
                }
            }
            '\n' | '\r' | '\u{2028}' | '\u{2029}' => {}
            other => out.push(other),
        }
    }
    out
}

/// Parses a number-literal spelling (decimal, hex `0x`, octal `0o`).
fn parse_number_literal(text: &str) -> Option<f64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().map(|v| v as f64);
    }
    if let Some(oct) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
        return u64::from_str_radix(oct, 8).ok().map(|v| v as f64);
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;

    fn parse_one(source: &str) -> Node {
        let parsed = parse(source, "test.js").expect(source);
        let NodeKind::Program { mut body, .. } = parsed.root.kind else {
            panic!("expected program");
        };
        assert_eq!(body.len(), 1, "expected a single statement in {source}");
        body.remove(0)
    }

    #[test]
    fn precedence_ladder_binds_as_expected() {
        let node = parse_one("1 + 2 * 3;");
        let NodeKind::ExpressionStatement(expr) = node.kind else {
            panic!("expected expression statement")
        };
        let NodeKind::Binary { op, right, .. } = expr.kind else {
            panic!("expected binary")
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(right.kind, NodeKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn exponent_is_right_associative() {
        let node = parse_one("2 ** 3 ** 2;");
        let NodeKind::ExpressionStatement(expr) = node.kind else {
            panic!("expected expression statement")
        };
        let NodeKind::Binary { op, left, right } = expr.kind else {
            panic!("expected binary")
        };
        assert_eq!(op, BinaryOp::Pow);
        assert!(matches!(left.kind, NodeKind::NumberLiteral(v) if v == 2.0));
        assert!(matches!(right.kind, NodeKind::Binary { op: BinaryOp::Pow, .. }));
    }

    #[test]
    fn arrow_recognition_rewinds_groups() {
        let node = parse_one("(a, b) => a + b;");
        let NodeKind::ExpressionStatement(expr) = node.kind else {
            panic!("expected expression statement")
        };
        assert!(matches!(expr.kind, NodeKind::Arrow { ref params, .. } if params.len() == 2));

        let node = parse_one("(a + b);");
        let NodeKind::ExpressionStatement(expr) = node.kind else {
            panic!("expected expression statement")
        };
        assert!(matches!(expr.kind, NodeKind::Group(_)));
    }

    #[test]
    fn bare_identifier_arrow() {
        let node = parse_one("x => x * 2;");
        let NodeKind::ExpressionStatement(expr) = node.kind else {
            panic!("expected expression statement")
        };
        assert!(matches!(expr.kind, NodeKind::Arrow { ref params, .. } if params.len() == 1));
    }

    #[test]
    fn optional_chain_nodes() {
        let node = parse_one("a?.b?.[0]?.();");
        let NodeKind::ExpressionStatement(expr) = node.kind else {
            panic!("expected expression statement")
        };
        let NodeKind::Call { callee, optional, .. } = expr.kind else {
            panic!("expected call")
        };
        assert!(optional);
        assert!(matches!(
            callee.kind,
            NodeKind::Member {
                computed: true,
                optional: true,
                ..
            }
        ));
    }

    #[test]
    fn asi_rejects_same_line_statements() {
        assert!(parse("let a = 1 let b = 2", "test.js").is_err());
        assert!(parse("let a = 1\nlet b = 2", "test.js").is_ok());
        assert!(parse("let a = 1; let b = 2", "test.js").is_ok());
    }

    #[test]
    fn function_declarations_need_no_terminator() {
        assert!(parse("function f() {} function g() {}", "test.js").is_ok());
    }

    #[test]
    fn for_of_and_for_in_rewind_correctly() {
        let node = parse_one("for (const x of xs) {}");
        assert!(matches!(node.kind, NodeKind::ForOf { kind: DeclKind::Const, .. }));
        let node = parse_one("for (const k in o) {}");
        assert!(matches!(node.kind, NodeKind::ForIn { kind: DeclKind::Const, .. }));
        let node = parse_one("for (;;) break;");
        assert!(matches!(node.kind, NodeKind::For { .. }));
        let node = parse_one("for await (const x of xs) {}");
        assert!(matches!(node.kind, NodeKind::ForOf { awaited: true, .. }));
    }

    #[test]
    fn labelled_loops_and_operands() {
        let node = parse_one("outer: for (;;) break outer;");
        let NodeKind::Label { label, statement } = node.kind else {
            panic!("expected label")
        };
        assert_eq!(label, "outer");
        assert!(matches!(statement.kind, NodeKind::For { .. }));
    }

    #[test]
    fn destructuring_declarations_declare_innermost_identifiers() {
        let parsed = parse("const {a, b = 2, ...rest} = source;", "test.js").unwrap();
        let NodeKind::Program { scope, .. } = parsed.root.kind else {
            panic!("expected program")
        };
        let names: Vec<_> = parsed
            .scopes
            .get(scope)
            .declarations
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert_eq!(names, ["a", "b", "rest"]);
    }

    #[test]
    fn template_literals_parse_into_quasis_and_expressions() {
        let node = parse_one("`a${x}b${y}c`;");
        let NodeKind::ExpressionStatement(expr) = node.kind else {
            panic!("expected expression statement")
        };
        let NodeKind::TemplateLiteral {
            quasis, expressions, tag, ..
        } = expr.kind
        else {
            panic!("expected template")
        };
        assert!(tag.is_none());
        assert_eq!(quasis, ["a", "b", "c"]);
        assert_eq!(expressions.len(), 2);
    }

    #[test]
    fn syntax_errors_render_a_caret() {
        let err = parse("let x = @;", "test.js").unwrap_err();
        assert!(err.context.contains('^'), "{}", err.context);
    }

    #[test]
    fn scope_completeness_every_identifier_is_bound_once() {
        let source = "let a = 1; { let b = a; (c) => a + b + c; }";
        let parsed = parse(source, "test.js").unwrap();
        // Identifier leaves: the declarator targets `a` and `b`, the
        // parameter `c`, the initializer reference `a`, and `a + b + c` in
        // the arrow body.
        assert_eq!(parsed.scopes.reference_count(), 7);
    }

    #[test]
    fn classes_and_modules_parse() {
        assert!(parse("class A extends B { constructor(x) { super(x); } get v() { return 1; } static m() {} }", "t.js").is_ok());
        assert!(parse("import def, {a as b} from 'mod'; export {a}; export default 1;", "t.js").is_ok());
    }
}
