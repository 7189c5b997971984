//! Static pass between parsing and execution.
//!
//! One walk over the tree does three jobs:
//! 1. Build lexical scopes (stack of `HashMap<&str, Binding>` tracking
//!    declared/defined names), starting with one scope for the top level.
//! 2. Report static errors (redeclaration, forward‑read in initializer,
//!    misplaced `return`/`this`/`super`/`break`/`continue`) and, once the
//!    walk is over, one warning per binding nobody reads.
//! 3. Record, for *each* binding occurrence, how many scopes out its
//!    declaration lives, and link uses to declarations in a [`SymbolGraph`].
//!
//! Resolution never stops at the first problem: everything is reported
//! through the [`ErrorReporter`] and the walk carries on.

use std::collections::HashMap;
use std::mem;

use log::{debug, info};
use serde::Serialize;

use crate::ast::{Expr, ExprId, FunctionDecl, Stmt};
use crate::error::{ErrorReporter, LoxError};
use crate::token::{Token, TokenId};

/// What kind of thing a declaration introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Class,
    Function,
    Variable,
    Parameter,
}

/// A declaration together with every token that reads or writes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Definition {
    pub token: Token,
    pub kind: SymbolKind,
    pub references: Vec<Token>,
}

/// Definitions in declaration order plus the reverse map use → definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SymbolGraph {
    definitions: Vec<Definition>,
    #[serde(skip)]
    by_definition: HashMap<TokenId, usize>,
    #[serde(skip)]
    by_reference: HashMap<TokenId, usize>,
}

impl SymbolGraph {
    fn define(&mut self, token: &Token, kind: SymbolKind) {
        self.by_definition.insert(token.id, self.definitions.len());
        self.definitions.push(Definition {
            token: token.clone(),
            kind,
            references: Vec::new(),
        });
    }

    fn add_reference(&mut self, definition: TokenId, reference: &Token) {
        if let Some(&index) = self.by_definition.get(&definition) {
            self.definitions[index].references.push(reference.clone());
            self.by_reference.insert(reference.id, index);
        }
    }

    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }

    /// The definition whose declaring token is `id`.
    pub fn definition(&self, id: TokenId) -> Option<&Definition> {
        self.by_definition
            .get(&id)
            .map(|&index| &self.definitions[index])
    }

    /// The definition that the use `id` was resolved to.
    pub fn definition_of(&self, id: TokenId) -> Option<&Definition> {
        self.by_reference
            .get(&id)
            .map(|&index| &self.definitions[index])
    }

    /// Either of the above: `id` may be a declaration or a use.
    pub fn lookup(&self, id: TokenId) -> Option<&Definition> {
        self.definition(id).or_else(|| self.definition_of(id))
    }

    /// Definitions that were never referenced, in declaration order.
    pub fn unused(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.iter().filter(|d| d.references.is_empty())
    }
}

/// Everything the resolver hands to later stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Scope distance for every binding expression resolved to a tracked
    /// scope. Missing ids are globals.
    pub locals: HashMap<ExprId, usize>,
    pub symbols: SymbolGraph,
}

/// State of a name within one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    /// Declared, initializer still being resolved.
    Uninitialized,
    Declared(TokenId),
    /// `this` / `super`: bound by the runtime, not by a declaration.
    Implicit,
}

/// What kind of function body are we in? Used to validate `return`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Initializer,
    Method,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// Resolver: tracks scopes, enforces static rules, and records binding
/// distances plus the symbol graph.
pub struct Resolver<'s, 'r> {
    reporter: &'r mut dyn ErrorReporter,
    scopes: Vec<HashMap<&'s str, Binding>>,
    resolution: Resolution,
    current_function: FunctionType,
    current_class: ClassType,
    loop_depth: usize,
}

impl<'s, 'r> Resolver<'s, 'r> {
    pub fn new(reporter: &'r mut dyn ErrorReporter) -> Self {
        info!("Resolver instantiated");

        Resolver {
            reporter,
            scopes: vec![HashMap::new()],
            resolution: Resolution::default(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            loop_depth: 0,
        }
    }

    /// Walk all top‑level statements, then warn about unused bindings.
    pub fn resolve(mut self, statements: &'s [Stmt]) -> Resolution {
        info!(
            "Beginning resolve pass over {} statement(s)",
            statements.len()
        );

        for stmt in statements {
            self.resolve_stmt(stmt);
        }

        for definition in self.resolution.symbols.unused() {
            let message = format!(
                "Variable '{}' is declared but never used.",
                definition.token.lexeme
            );
            self.reporter.warn(definition.token.position(), &message);
        }

        info!(
            "Resolved {} local(s), {} definition(s)",
            self.resolution.locals.len(),
            self.resolution.symbols.definitions().len()
        );

        self.resolution
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statement resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_stmt(&mut self, stmt: &'s Stmt) {
        match stmt {
            Stmt::Class(class) => {
                let enclosing_class = mem::replace(&mut self.current_class, ClassType::Class);

                self.declare(&class.name);
                self.define(&class.name, SymbolKind::Class);

                if let Some(superclass) = &class.superclass {
                    if let Expr::Variable { name, .. } = superclass {
                        if name.lexeme == class.name.lexeme {
                            self.error(name, "A class can't inherit from itself.");
                        }
                    }

                    self.current_class = ClassType::Subclass;
                    self.resolve_expr(superclass);

                    self.begin_scope();
                    self.implicit("super");
                }

                self.begin_scope();
                self.implicit("this");

                for method in &class.methods {
                    let kind = if method.name.lexeme == "init" {
                        FunctionType::Initializer
                    } else {
                        FunctionType::Method
                    };
                    self.resolve_function(method, kind);
                }

                self.end_scope();

                if class.superclass.is_some() {
                    self.end_scope();
                }

                self.current_class = enclosing_class;
            }

            Stmt::Block(statements) => {
                self.begin_scope();
                for s in statements {
                    self.resolve_stmt(s);
                }
                self.end_scope();
            }

            Stmt::Var { name, initializer } => {
                // declare → resolve initializer → define
                self.declare(name);
                if let Some(expr) = initializer {
                    self.resolve_expr(expr);
                }
                self.define(name, SymbolKind::Variable);
            }

            Stmt::Function(decl) => {
                // the name is visible inside its own body
                self.declare(&decl.name);
                self.define(&decl.name, SymbolKind::Function);
                self.resolve_function(decl, FunctionType::Function);
            }

            Stmt::Expression(expr) | Stmt::Print(expr) => self.resolve_expr(expr),

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(eb) = else_branch.as_deref() {
                    self.resolve_stmt(eb);
                }
            }

            Stmt::While { condition, body } => {
                self.resolve_expr(condition);

                self.loop_depth += 1;
                self.resolve_stmt(body);
                self.loop_depth -= 1;
            }

            Stmt::For {
                initializer,
                condition,
                increment,
                body,
            } => {
                // one scope for the clauses; a block body opens its own
                self.begin_scope();

                if let Some(init) = initializer.as_deref() {
                    self.resolve_stmt(init);
                }
                if let Some(cond) = condition {
                    self.resolve_expr(cond);
                }
                if let Some(inc) = increment {
                    self.resolve_expr(inc);
                }

                self.loop_depth += 1;
                self.resolve_stmt(body);
                self.loop_depth -= 1;

                self.end_scope();
            }

            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.error(keyword, "Can't return from top-level code.");
                }

                if let Some(expr) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.error(keyword, "Can't return a value from an initializer.");
                    }
                    self.resolve_expr(expr);
                }
            }

            Stmt::Break(keyword) => {
                if self.loop_depth == 0 {
                    self.error(keyword, "Can't break outside of a loop.");
                }
            }

            Stmt::Continue(keyword) => {
                if self.loop_depth == 0 {
                    self.error(keyword, "Can't continue outside of a loop.");
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expression resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &'s Expr) {
        match expr {
            Expr::Literal(_) => {}

            Expr::Grouping(inner) => self.resolve_expr(inner),

            Expr::Unary { right, .. } => self.resolve_expr(right),

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }

            Expr::Variable { id, name } => {
                let in_own_initializer = self
                    .scopes
                    .last()
                    .and_then(|scope| scope.get(name.lexeme.as_str()))
                    == Some(&Binding::Uninitialized);

                if in_own_initializer {
                    self.error(name, "Can't read local variable in its own initializer.");
                }

                self.resolve_local(*id, name);
            }

            Expr::Assign { id, name, value } => {
                // RHS first, then bind the target
                self.resolve_expr(value);
                self.resolve_local(*id, name);
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);
                for arg in arguments {
                    self.resolve_expr(arg);
                }
            }

            Expr::Get { object, .. } => self.resolve_expr(object),

            Expr::Set { object, value, .. } => {
                self.resolve_expr(object);
                self.resolve_expr(value);
            }

            Expr::This { id, keyword } => {
                if self.current_class == ClassType::None {
                    self.error(keyword, "Can't use 'this' outside of a class.");
                    return;
                }

                self.resolve_local(*id, keyword);
            }

            Expr::Super { id, keyword, .. } => match self.current_class {
                ClassType::None => {
                    self.error(keyword, "Can't use 'super' outside of a class.");
                }
                ClassType::Class => {
                    self.error(keyword, "Can't use 'super' in a class with no superclass.");
                }
                ClassType::Subclass => self.resolve_local(*id, keyword),
            },
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Function helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Enter a fresh scope for a function's parameters + body.
    ///
    /// Loop depth does not leak into the body: `break` inside a function
    /// declared in a loop is still outside any loop.
    fn resolve_function(&mut self, decl: &'s FunctionDecl, kind: FunctionType) {
        let enclosing_function = mem::replace(&mut self.current_function, kind);
        let enclosing_loops = mem::replace(&mut self.loop_depth, 0);

        self.begin_scope();
        for param in &decl.params {
            self.declare(param);
            self.define(param, SymbolKind::Parameter);
        }
        for stmt in &decl.body {
            self.resolve_stmt(stmt);
        }
        self.end_scope();

        self.loop_depth = enclosing_loops;
        self.current_function = enclosing_function;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scope management
    // ─────────────────────────────────────────────────────────────────────────

    #[inline]
    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    #[inline]
    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &'s Token) {
        let redeclared = self
            .scopes
            .last()
            .is_some_and(|scope| scope.contains_key(name.lexeme.as_str()));

        if redeclared {
            self.error(name, "Already a variable with this name in this scope.");
        }

        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.as_str(), Binding::Uninitialized);
        }
    }

    fn define(&mut self, name: &'s Token, kind: SymbolKind) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.as_str(), Binding::Declared(name.id));
            self.resolution.symbols.define(name, kind);
        }
    }

    fn implicit(&mut self, name: &'static str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, Binding::Implicit);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Binding‑distance helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Record this occurrence as a local at depth `d`, or leave it out of
    /// the table (global) if no tracked scope declares it.
    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if let Some(binding) = scope.get(name.lexeme.as_str()) {
                debug!("Resolved '{}' at depth {}", name.lexeme, depth);

                self.resolution.locals.insert(id, depth);
                if let Binding::Declared(definition) = *binding {
                    self.resolution.symbols.add_reference(definition, name);
                }
                return;
            }
        }

        debug!("Resolved '{}' as global", name.lexeme);
    }

    fn error(&mut self, token: &Token, message: &str) {
        let error = LoxError::resolve(token.position(), message);
        debug!("{}", error);

        self.reporter.report(&error);
    }
}
