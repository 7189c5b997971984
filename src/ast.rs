//! Abstract syntax tree.
//!
//! Two closed families, [`Expr`] and [`Stmt`]. Every pass (resolver,
//! interpreter, pretty‑printer, semantic classifier) matches on them
//! exhaustively, so a new node kind is a compile error in each pass until
//! it is handled.
//!
//! Nodes own their children and are never mutated after the parser builds
//! them. Expressions that read or write a binding (`Variable`, `Assign`,
//! `This`, `Super`) carry an [`ExprId`] issued once by the parser; the
//! resolver keys its distance table by that id, never by structure.

use std::rc::Rc;

use crate::error::Position;
use crate::token::Token;

/// Identity of a binding‑related expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub usize);

/// A **literal constant** that appears directly in the source code.
///
/// The parser copies the value out of the token so the AST does not depend
/// on the token's payload.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// Numeric literal ‑ stored as IEEE‑754 `f64`.
    Number(f64),

    /// String literal without surrounding quotes.
    Str(String),

    True,

    False,

    Nil,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal constant: number, string, `true`, `false`, or `nil`.
    Literal(LiteralValue),

    /// Parenthesised sub‑expression: `"(" expression ")"`.
    Grouping(Box<Expr>),

    /// Prefix unary operator expression: `!ready`, `-42`.
    Unary { operator: Token, right: Box<Expr> },

    /// Infix arithmetic, comparison or equality operator.
    Binary {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },

    /// Short‑circuiting `and` / `or`.
    Logical {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },

    /// Variable read.
    Variable { id: ExprId, name: Token },

    /// Assignment to a variable: `name = value`.
    Assign {
        id: ExprId,
        name: Token,
        value: Box<Expr>,
    },

    /// Call expression: `callee(arguments)`.
    Call {
        callee: Box<Expr>,
        /// The closing `)` token, retained for error reporting.
        paren: Token,
        arguments: Vec<Expr>,
    },

    /// object.property
    Get { object: Box<Expr>, name: Token },

    /// object.property = value
    Set {
        object: Box<Expr>,
        name: Token,
        value: Box<Expr>,
    },

    /// The `this` keyword inside a method.
    This { id: ExprId, keyword: Token },

    /// `super.method`
    Super {
        id: ExprId,
        keyword: Token,
        method: Token,
    },
}

/// A function or method declaration.
///
/// Shared behind an `Rc` so that every closure created from it can keep the
/// body alive without copying it.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Token,
    pub params: Vec<Token>,
    pub body: Vec<Stmt>,
    /// From the first token of the declaration to the closing brace.
    pub span: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Token,
    /// Always an [`Expr::Variable`] when present.
    pub superclass: Option<Expr>,
    pub methods: Vec<Rc<FunctionDecl>>,
    pub span: Position,
}

/// Statement nodes. A program is a sequence of these.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Stand‑alone expression terminated by a semicolon.
    Expression(Expr),

    Print(Expr),

    /// Variable declaration: `"var" IDENT ("=" initializer)? ";"`.
    Var {
        name: Token,
        initializer: Option<Expr>,
    },

    /// Braced scope containing zero or more declarations/statements.
    Block(Vec<Stmt>),

    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    While {
        condition: Expr,
        body: Box<Stmt>,
    },

    For {
        initializer: Option<Box<Stmt>>,
        condition: Option<Expr>,
        increment: Option<Expr>,
        body: Box<Stmt>,
    },

    Function(Rc<FunctionDecl>),

    Class(ClassDecl),

    Return {
        /// The `return` keyword token (for error locations).
        keyword: Token,

        /// Absent ⇒ `nil` is returned.
        value: Option<Expr>,
    },

    Break(Token),

    Continue(Token),
}
