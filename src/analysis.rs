//! Editor‑tooling view of one document.
//!
//! [`analyze`] scans, parses and resolves the text with fresh state every
//! time and returns plain data: diagnostics, the symbol graph, a semantic
//! token list and an outline. Navigation queries (definition, references,
//! rename) are answered from that data by byte offset.
//!
//! Semantic tokens and the outline are only computed for documents without
//! errors; warnings are fine.

use log::info;
use serde::Serialize;

use crate::ast::{Expr, FunctionDecl, Stmt};
use crate::error::{Diagnostic, DiagnosticCollector, Position};
use crate::parser::Parser;
use crate::resolver::{Definition, Resolver, SymbolGraph, SymbolKind};
use crate::scanner::Scanner;
use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticCategory {
    Class,
    Function,
    Variable,
    Parameter,
    Property,
}

impl From<SymbolKind> for SemanticCategory {
    fn from(kind: SymbolKind) -> Self {
        match kind {
            SymbolKind::Class => SemanticCategory::Class,
            SymbolKind::Function => SemanticCategory::Function,
            SymbolKind::Variable => SemanticCategory::Variable,
            SymbolKind::Parameter => SemanticCategory::Parameter,
        }
    }
}

/// Classification of one identifier occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SemanticToken {
    pub start: usize,
    pub end: usize,
    pub category: SemanticCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlineKind {
    Class,
    Method,
    Function,
    Variable,
}

/// One outline entry. `range` covers the whole declaration, `selection`
/// just its name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSymbol {
    pub name: String,
    pub kind: OutlineKind,
    pub range: Position,
    pub selection: Position,
    pub children: Vec<DocumentSymbol>,
}

/// Replace the text at `position` with `new_text`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextEdit {
    pub position: Position,
    pub new_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Analysis {
    pub diagnostics: Vec<Diagnostic>,
    pub symbols: SymbolGraph,
    pub semantic_tokens: Vec<SemanticToken>,
    pub outline: Vec<DocumentSymbol>,
}

/// Analyse `source` from scratch.
pub fn analyze(source: &str) -> Analysis {
    info!("Analysing document of {} byte(s)", source.len());

    let mut collector = DiagnosticCollector::new();

    let statements = Parser::new(Scanner::new(source), &mut collector).parse();

    if collector.has_errors() {
        return Analysis {
            diagnostics: collector.into_diagnostics(),
            ..Analysis::default()
        };
    }

    let resolution = Resolver::new(&mut collector).resolve(&statements);

    let (semantic_tokens, outline) = if collector.has_errors() {
        (Vec::new(), Vec::new())
    } else {
        let mut classifier = Classifier {
            symbols: &resolution.symbols,
            tokens: Vec::new(),
        };
        classifier.statements(&statements);
        classifier.tokens.sort_by_key(|t| (t.start, t.end));

        (classifier.tokens, outline(&statements))
    };

    Analysis {
        diagnostics: collector.into_diagnostics(),
        symbols: resolution.symbols,
        semantic_tokens,
        outline,
    }
}

impl Analysis {
    /// The definition whose declaration or one of whose uses covers
    /// `offset`.
    pub fn definition_at(&self, offset: usize) -> Option<&Definition> {
        self.symbols.definitions().iter().find(|definition| {
            covers(&definition.token, offset)
                || definition.references.iter().any(|r| covers(r, offset))
        })
    }

    /// Declaration first, then every use.
    pub fn references_at(&self, offset: usize) -> Vec<&Token> {
        match self.definition_at(offset) {
            Some(definition) => std::iter::once(&definition.token)
                .chain(definition.references.iter())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Edits renaming every occurrence of the symbol at `offset`.
    pub fn rename(&self, offset: usize, new_name: &str) -> Vec<TextEdit> {
        self.references_at(offset)
            .into_iter()
            .map(|token| TextEdit {
                position: token.position(),
                new_text: new_name.to_string(),
            })
            .collect()
    }
}

#[inline]
fn covers(token: &Token, offset: usize) -> bool {
    token.position().contains(offset)
}

// ─────────────────────────────────────────────────────────────────────────────
// Semantic tokens
// ─────────────────────────────────────────────────────────────────────────────

struct Classifier<'g> {
    symbols: &'g SymbolGraph,
    tokens: Vec<SemanticToken>,
}

impl Classifier<'_> {
    fn push(&mut self, token: &Token, category: SemanticCategory) {
        self.tokens.push(SemanticToken {
            start: token.start,
            end: token.end,
            category,
        });
    }

    /// A use takes the category of whatever it resolved to.
    fn push_use(&mut self, token: &Token) {
        let category = self
            .symbols
            .definition_of(token.id)
            .map_or(SemanticCategory::Variable, |d| d.kind.into());
        self.push(token, category);
    }

    fn statements(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            self.statement(stmt);
        }
    }

    fn statement(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression(expr) | Stmt::Print(expr) => self.expression(expr),

            Stmt::Var { name, initializer } => {
                self.push(name, SemanticCategory::Variable);
                if let Some(init) = initializer {
                    self.expression(init);
                }
            }

            Stmt::Block(statements) => self.statements(statements),

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expression(condition);
                self.statement(then_branch);
                if let Some(other) = else_branch {
                    self.statement(other);
                }
            }

            Stmt::While { condition, body } => {
                self.expression(condition);
                self.statement(body);
            }

            Stmt::For {
                initializer,
                condition,
                increment,
                body,
            } => {
                if let Some(init) = initializer {
                    self.statement(init);
                }
                if let Some(cond) = condition {
                    self.expression(cond);
                }
                if let Some(inc) = increment {
                    self.expression(inc);
                }
                self.statement(body);
            }

            Stmt::Function(decl) => {
                self.push(&decl.name, SemanticCategory::Function);
                self.function(decl);
            }

            Stmt::Class(class) => {
                self.push(&class.name, SemanticCategory::Class);
                if let Some(superclass) = &class.superclass {
                    self.expression(superclass);
                }
                for method in &class.methods {
                    self.push(&method.name, SemanticCategory::Property);
                    self.function(method);
                }
            }

            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.expression(value);
                }
            }

            Stmt::Break(_) | Stmt::Continue(_) => {}
        }
    }

    fn function(&mut self, decl: &FunctionDecl) {
        for param in &decl.params {
            self.push(param, SemanticCategory::Parameter);
        }
        self.statements(&decl.body);
    }

    fn expression(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) | Expr::This { .. } => {}

            Expr::Grouping(inner) => self.expression(inner),

            Expr::Unary { right, .. } => self.expression(right),

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.expression(left);
                self.expression(right);
            }

            Expr::Variable { name, .. } => self.push_use(name),

            Expr::Assign { name, value, .. } => {
                self.push_use(name);
                self.expression(value);
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.expression(callee);
                for argument in arguments {
                    self.expression(argument);
                }
            }

            Expr::Get { object, name } => {
                self.expression(object);
                self.push(name, SemanticCategory::Property);
            }

            Expr::Set {
                object,
                name,
                value,
            } => {
                self.expression(object);
                self.push(name, SemanticCategory::Property);
                self.expression(value);
            }

            Expr::Super { method, .. } => self.push(method, SemanticCategory::Property),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outline
// ─────────────────────────────────────────────────────────────────────────────

fn outline(statements: &[Stmt]) -> Vec<DocumentSymbol> {
    let mut symbols = Vec::new();
    collect(statements, &mut symbols);
    symbols
}

/// Declarations reachable from `statements` without entering a function.
fn collect(statements: &[Stmt], out: &mut Vec<DocumentSymbol>) {
    for stmt in statements {
        collect_one(stmt, out);
    }
}

fn collect_one(stmt: &Stmt, out: &mut Vec<DocumentSymbol>) {
    match stmt {
        Stmt::Var { name, .. } => out.push(DocumentSymbol {
            name: name.lexeme.clone(),
            kind: OutlineKind::Variable,
            range: name.position(),
            selection: name.position(),
            children: Vec::new(),
        }),

        Stmt::Function(decl) => out.push(function_symbol(decl, OutlineKind::Function)),

        Stmt::Class(class) => out.push(DocumentSymbol {
            name: class.name.lexeme.clone(),
            kind: OutlineKind::Class,
            range: class.span,
            selection: class.name.position(),
            children: class
                .methods
                .iter()
                .map(|method| function_symbol(method, OutlineKind::Method))
                .collect(),
        }),

        Stmt::Block(statements) => collect(statements, out),

        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            collect_one(then_branch, out);
            if let Some(other) = else_branch {
                collect_one(other, out);
            }
        }

        Stmt::While { body, .. } => collect_one(body, out),

        Stmt::For {
            initializer, body, ..
        } => {
            if let Some(init) = initializer {
                collect_one(init, out);
            }
            collect_one(body, out);
        }

        Stmt::Expression(_)
        | Stmt::Print(_)
        | Stmt::Return { .. }
        | Stmt::Break(_)
        | Stmt::Continue(_) => {}
    }
}

fn function_symbol(decl: &FunctionDecl, kind: OutlineKind) -> DocumentSymbol {
    let mut children = Vec::new();
    collect(&decl.body, &mut children);

    DocumentSymbol {
        name: decl.name.lexeme.clone(),
        kind,
        range: decl.span,
        selection: decl.name.position(),
        children,
    }
}
