/*!
Recursive‑descent parser.

Consumes the scanner lazily with exactly one token of lookahead and builds
the AST defined in [`crate::ast`]. Lexical errors yielded by the scanner are
forwarded to the [`ErrorReporter`] as they are pulled, so every diagnostic
of a document arrives in source order.

### Error recovery

A grammar violation is reported once, at the offending token, and then
unwinds as `Err(LoxError::Parse)` up to `declaration`, which
discards tokens until a statement boundary (`;` or a statement keyword)
and carries on. One typo therefore never hides the diagnostics that follow
it. A few problems (`Invalid assignment target.`, more than 255
parameters/arguments) are reported without unwinding at all.

### Grammar

Declarations are `class`, `fun`, `var` or a statement. Statements are
expression, `print`, `if`, `while`, `for`, `return`, `break`, `continue`
and blocks. Expressions climb the usual precedence ladder, loosest first:

```text
assignment  : (call ".")? IDENT "=" assignment | or
or, and     : left-associative, short-circuit
== !=       : equality
> >= < <=   : comparison
+ -         : term
* /         : factor
! -         : prefix unary
call        : primary ( "(" args ")" | "." IDENT )*
primary     : literal | IDENT | this | super "." IDENT | "(" expr ")"
```

`for` is kept as its own statement rather than desugared into `while`,
so `continue` can still run the increment.
*/

use std::mem;
use std::rc::Rc;

use crate::ast::{ClassDecl, Expr, ExprId, FunctionDecl, LiteralValue, Stmt};
use crate::error::{ErrorReporter, LoxError, Position, Result};
use crate::scanner::Scanner;
use crate::token::{Token, TokenType};

use log::{debug, info};

const MAX_ARITY: usize = 255;

/// Top‑level parser over a lazily scanned token stream.
pub struct Parser<'a, 'r> {
    tokens: Scanner<'a>,
    reporter: &'r mut dyn ErrorReporter,
    current: Token,
    previous: Token,
    next_expr_id: usize,
}

impl<'a, 'r> Parser<'a, 'r> {
    /// Construct a new parser and prime the one‑token lookahead.
    pub fn new(tokens: Scanner<'a>, reporter: &'r mut dyn ErrorReporter) -> Self {
        info!("Parser created");

        let mut tokens = tokens;
        let first = Self::pull(&mut tokens, reporter, None);

        Self {
            tokens,
            reporter,
            previous: first.clone(),
            current: first,
            next_expr_id: 0,
        }
    }

    /// Start numbering expression nodes at `first`.
    ///
    /// A long‑lived interpreter merges the distance tables of many parses;
    /// giving each parse a fresh range keeps their keys disjoint.
    pub fn with_first_expr_id(mut self, first: usize) -> Self {
        self.next_expr_id = first;
        self
    }

    /// First id not handed out yet.
    pub fn next_expr_id(&self) -> usize {
        self.next_expr_id
    }

    // ───────────────────────── public API ─────────────────────────

    /// Parse an entire program.
    ///
    /// Statements that failed to parse are dropped after being reported;
    /// callers decide from their reporter whether the result is usable.
    pub fn parse(&mut self) -> Vec<Stmt> {
        info!("Beginning parse phase");

        let mut statements: Vec<Stmt> = Vec::new();

        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }

        info!("Parsed {} statement(s)", statements.len());

        statements
    }

    /// Parse the whole input as exactly one expression.
    pub fn parse_expression(&mut self) -> Option<Expr> {
        info!("Beginning expression parse");

        let expr = self.expression().ok()?;

        if !self.is_at_end() {
            let token = self.current.clone();
            self.error(&token, "Expect end of expression.");
            return None;
        }

        Some(expr)
    }

    // ──────────────────────── declaration rules ───────────────────

    fn declaration(&mut self) -> Option<Stmt> {
        debug!("Entering declaration at line {}", self.current.line);

        let result = if self.matches(TokenType::CLASS) {
            self.class_declaration()
        } else if self.matches(TokenType::FUN) {
            self.function("function").map(|f| Stmt::Function(Rc::new(f)))
        } else if self.matches(TokenType::VAR) {
            self.var_declaration()
        } else {
            self.statement()
        };

        match result {
            Ok(stmt) => Some(stmt),
            Err(e) => {
                debug!("Recovering from parse error: {}", e);
                self.synchronize();
                None
            }
        }
    }

    fn class_declaration(&mut self) -> Result<Stmt> {
        let keyword: Token = self.previous.clone();
        let name: Token = self.consume(TokenType::IDENTIFIER, "Expect class name.")?;

        let superclass: Option<Expr> = if self.matches(TokenType::LESS) {
            let super_name = self.consume(TokenType::IDENTIFIER, "Expect superclass name.")?;

            Some(Expr::Variable {
                id: self.new_id(),
                name: super_name,
            })
        } else {
            None
        };

        self.consume(TokenType::LEFT_BRACE, "Expect '{' before class body.")?;

        let mut methods: Vec<Rc<FunctionDecl>> = Vec::new();

        while !self.check(TokenType::RIGHT_BRACE) && !self.is_at_end() {
            methods.push(Rc::new(self.function("method")?));
        }

        self.consume(TokenType::RIGHT_BRACE, "Expect '}' after class body.")?;

        debug!("Parsed class '{}' with {} method(s)", name.lexeme, methods.len());

        Ok(Stmt::Class(ClassDecl {
            name,
            superclass,
            methods,
            span: self.span_from(&keyword),
        }))
    }

    /// `kind` is "function" or "method"; it only flavours the messages.
    fn function(&mut self, kind: &str) -> Result<FunctionDecl> {
        // Functions span from their `fun` keyword, methods from their name.
        let first: Token = if kind == "method" {
            self.current.clone()
        } else {
            self.previous.clone()
        };

        let name: Token =
            self.consume(TokenType::IDENTIFIER, &format!("Expect {} name.", kind))?;

        self.consume(
            TokenType::LEFT_PAREN,
            &format!("Expect '(' after {} name.", kind),
        )?;

        let mut params: Vec<Token> = Vec::new();

        if !self.check(TokenType::RIGHT_PAREN) {
            loop {
                if params.len() >= MAX_ARITY {
                    let token = self.current.clone();
                    self.error(&token, "Can't have more than 255 parameters.");
                }

                params.push(self.consume(TokenType::IDENTIFIER, "Expect parameter name.")?);

                if !self.matches(TokenType::COMMA) {
                    break;
                }
            }
        }

        self.consume(TokenType::RIGHT_PAREN, "Expect ')' after parameters.")?;
        self.consume(
            TokenType::LEFT_BRACE,
            &format!("Expect '{{' before {} body.", kind),
        )?;

        let body: Vec<Stmt> = self.block()?;

        Ok(FunctionDecl {
            name,
            params,
            body,
            span: self.span_from(&first),
        })
    }

    fn var_declaration(&mut self) -> Result<Stmt> {
        let name: Token = self.consume(TokenType::IDENTIFIER, "Expect variable name.")?;

        let initializer: Option<Expr> = if self.matches(TokenType::EQUAL) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(
            TokenType::SEMICOLON,
            "Expect ';' after variable declaration.",
        )?;

        Ok(Stmt::Var { name, initializer })
    }

    // ───────────────────────── statement rules ────────────────────

    fn statement(&mut self) -> Result<Stmt> {
        if self.matches(TokenType::FOR) {
            self.for_statement()
        } else if self.matches(TokenType::IF) {
            self.if_statement()
        } else if self.matches(TokenType::WHILE) {
            self.while_statement()
        } else if self.matches(TokenType::RETURN) {
            self.return_statement()
        } else if self.matches(TokenType::BREAK) {
            let keyword = self.previous.clone();
            self.consume(TokenType::SEMICOLON, "Expect ';' after 'break'.")?;
            Ok(Stmt::Break(keyword))
        } else if self.matches(TokenType::CONTINUE) {
            let keyword = self.previous.clone();
            self.consume(TokenType::SEMICOLON, "Expect ';' after 'continue'.")?;
            Ok(Stmt::Continue(keyword))
        } else if self.matches(TokenType::LEFT_BRACE) {
            Ok(Stmt::Block(self.block()?))
        } else if self.matches(TokenType::PRINT) {
            self.print_statement()
        } else {
            self.expression_statement()
        }
    }

    fn for_statement(&mut self) -> Result<Stmt> {
        debug!("Parsing for statement");

        self.consume(TokenType::LEFT_PAREN, "Expect '(' after 'for'.")?;

        let initializer = if self.matches(TokenType::SEMICOLON) {
            None
        } else if self.matches(TokenType::VAR) {
            Some(Box::new(self.var_declaration()?))
        } else {
            Some(Box::new(self.expression_statement()?))
        };

        let condition = if !self.check(TokenType::SEMICOLON) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::SEMICOLON, "Expect ';' after loop condition.")?;

        let increment = if !self.check(TokenType::RIGHT_PAREN) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::RIGHT_PAREN, "Expect ')' after for clauses.")?;

        let body = Box::new(self.statement()?);

        Ok(Stmt::For {
            initializer,
            condition,
            increment,
            body,
        })
    }

    fn print_statement(&mut self) -> Result<Stmt> {
        let value: Expr = self.expression()?;

        self.consume(TokenType::SEMICOLON, "Expect ';' after value.")?;

        Ok(Stmt::Print(value))
    }

    fn expression_statement(&mut self) -> Result<Stmt> {
        let expr: Expr = self.expression()?;
        self.consume(TokenType::SEMICOLON, "Expect ';' after expression.")?;
        Ok(Stmt::Expression(expr))
    }

    fn if_statement(&mut self) -> Result<Stmt> {
        self.consume(TokenType::LEFT_PAREN, "Expect '(' after 'if'.")?;
        let condition: Expr = self.expression()?;
        self.consume(TokenType::RIGHT_PAREN, "Expect ')' after if condition.")?;

        let then_branch: Box<Stmt> = Box::new(self.statement()?);
        let else_branch: Option<Box<Stmt>> = if self.matches(TokenType::ELSE) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt> {
        self.consume(TokenType::LEFT_PAREN, "Expect '(' after 'while'.")?;
        let condition: Expr = self.expression()?;
        self.consume(TokenType::RIGHT_PAREN, "Expect ')' after while condition.")?;
        let body: Box<Stmt> = Box::new(self.statement()?);

        Ok(Stmt::While { condition, body })
    }

    fn return_statement(&mut self) -> Result<Stmt> {
        let keyword: Token = self.previous.clone();
        let value: Option<Expr> = if !self.check(TokenType::SEMICOLON) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(TokenType::SEMICOLON, "Expect ';' after return value.")?;
        Ok(Stmt::Return { keyword, value })
    }

    fn block(&mut self) -> Result<Vec<Stmt>> {
        let mut statements: Vec<Stmt> = Vec::new();

        while !self.check(TokenType::RIGHT_BRACE) && !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }

        self.consume(TokenType::RIGHT_BRACE, "Expect '}' after block.")?;
        Ok(statements)
    }

    // ───────────────────────── expression rules ───────────────────

    fn expression(&mut self) -> Result<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr> {
        let expr: Expr = self.logical_or()?;

        if self.matches(TokenType::EQUAL) {
            let equals: Token = self.previous.clone();
            let value: Expr = self.assignment()?;

            return match expr {
                Expr::Variable { name, .. } => Ok(Expr::Assign {
                    id: self.new_id(),
                    name,
                    value: Box::new(value),
                }),

                Expr::Get { object, name } => Ok(Expr::Set {
                    object,
                    name,
                    value: Box::new(value),
                }),

                other => {
                    // Reported, but the parser is not confused: keep going.
                    self.error(&equals, "Invalid assignment target.");
                    Ok(other)
                }
            };
        }

        Ok(expr)
    }

    fn logical_or(&mut self) -> Result<Expr> {
        let mut expr: Expr = self.logical_and()?;

        while self.matches(TokenType::OR) {
            let operator: Token = self.previous.clone();
            let right: Expr = self.logical_and()?;

            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn logical_and(&mut self) -> Result<Expr> {
        let mut expr: Expr = self.equality()?;

        while self.matches(TokenType::AND) {
            let operator: Token = self.previous.clone();
            let right: Expr = self.equality()?;

            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr> {
        let mut expr: Expr = self.comparison()?;

        while self.matches(TokenType::BANG_EQUAL) || self.matches(TokenType::EQUAL_EQUAL) {
            let operator: Token = self.previous.clone();
            let right: Expr = self.comparison()?;

            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut expr = self.term()?;

        while self.matches(TokenType::GREATER)
            || self.matches(TokenType::GREATER_EQUAL)
            || self.matches(TokenType::LESS)
            || self.matches(TokenType::LESS_EQUAL)
        {
            let operator: Token = self.previous.clone();
            let right: Expr = self.term()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut expr: Expr = self.factor()?;

        while self.matches(TokenType::MINUS) || self.matches(TokenType::PLUS) {
            let operator: Token = self.previous.clone();
            let right: Expr = self.factor()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr> {
        let mut expr: Expr = self.unary()?;

        while self.matches(TokenType::STAR) || self.matches(TokenType::SLASH) {
            let operator: Token = self.previous.clone();
            let right: Expr = self.unary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.matches(TokenType::BANG) || self.matches(TokenType::MINUS) {
            let operator: Token = self.previous.clone();
            let right: Expr = self.unary()?;
            return Ok(Expr::Unary {
                operator,
                right: Box::new(right),
            });
        }

        self.call()
    }

    fn call(&mut self) -> Result<Expr> {
        let mut expr: Expr = self.primary()?;

        loop {
            if self.matches(TokenType::LEFT_PAREN) {
                expr = self.finish_call(expr)?;
            } else if self.matches(TokenType::DOT) {
                let name: Token =
                    self.consume(TokenType::IDENTIFIER, "Expect property name after '.'.")?;

                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr> {
        let mut arguments: Vec<Expr> = Vec::new();

        if !self.check(TokenType::RIGHT_PAREN) {
            loop {
                if arguments.len() >= MAX_ARITY {
                    let token = self.current.clone();
                    self.error(&token, "Can't have more than 255 arguments.");
                }

                arguments.push(self.expression()?);

                if !self.matches(TokenType::COMMA) {
                    break;
                }
            }
        }

        let paren: Token = self.consume(TokenType::RIGHT_PAREN, "Expect ')' after arguments.")?;

        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }

    fn primary(&mut self) -> Result<Expr> {
        if self.matches(TokenType::FALSE) {
            return Ok(Expr::Literal(LiteralValue::False));
        }
        if self.matches(TokenType::TRUE) {
            return Ok(Expr::Literal(LiteralValue::True));
        }
        if self.matches(TokenType::NIL) {
            return Ok(Expr::Literal(LiteralValue::Nil));
        }

        match &self.current.token_type {
            TokenType::NUMBER(n) => {
                let n = *n;
                self.advance();
                return Ok(Expr::Literal(LiteralValue::Number(n)));
            }
            TokenType::STRING(s) => {
                let s = s.clone();
                self.advance();
                return Ok(Expr::Literal(LiteralValue::Str(s)));
            }
            _ => {}
        }

        if self.matches(TokenType::IDENTIFIER) {
            return Ok(Expr::Variable {
                id: self.new_id(),
                name: self.previous.clone(),
            });
        }

        if self.matches(TokenType::THIS) {
            return Ok(Expr::This {
                id: self.new_id(),
                keyword: self.previous.clone(),
            });
        }

        if self.matches(TokenType::SUPER) {
            let keyword: Token = self.previous.clone();
            self.consume(TokenType::DOT, "Expect '.' after 'super'.")?;
            let method: Token =
                self.consume(TokenType::IDENTIFIER, "Expect superclass method name.")?;

            return Ok(Expr::Super {
                id: self.new_id(),
                keyword,
                method,
            });
        }

        if self.matches(TokenType::LEFT_PAREN) {
            let expr: Expr = self.expression()?;

            self.consume(TokenType::RIGHT_PAREN, "Expect ')' after expression.")?;

            return Ok(Expr::Grouping(Box::new(expr)));
        }

        let token = self.current.clone();
        Err(self.error(&token, "Expect expression."))
    }

    // ────────────────────── utility helpers ───────────────────────

    /// Pull the next well‑formed token, reporting lexical errors on the way.
    fn pull(
        tokens: &mut Scanner<'a>,
        reporter: &mut dyn ErrorReporter,
        fallback: Option<&Token>,
    ) -> Token {
        loop {
            match tokens.next() {
                Some(Ok(token)) => return token,
                Some(Err(e)) => {
                    debug!("Forwarding lexical error: {}", e);
                    reporter.error(e.position().unwrap_or_default(), &e.message());
                }
                // The scanner always ends in EOF, and we never advance past
                // it; this arm only keeps the function total.
                None => {
                    return fallback.cloned().unwrap_or_else(|| {
                        Token::new(TokenType::EOF, "", 1, 0, 0, Default::default())
                    })
                }
            }
        }
    }

    #[inline(always)]
    fn new_id(&mut self) -> ExprId {
        let id = ExprId(self.next_expr_id);
        self.next_expr_id += 1;
        id
    }

    #[inline(always)]
    fn matches(&mut self, ttype: TokenType) -> bool {
        if self.check(ttype) {
            self.advance();

            return true;
        }

        false
    }

    fn consume(&mut self, ttype: TokenType, message: &str) -> Result<Token> {
        if self.check(ttype) {
            return Ok(self.advance());
        }

        debug!(
            "consume failed: wanted {}, found '{}'",
            message, self.current.lexeme
        );

        let token = self.current.clone();
        Err(self.error(&token, message))
    }

    #[inline(always)]
    fn check(&self, ttype: TokenType) -> bool {
        if self.is_at_end() {
            return false;
        }

        self.current.token_type == ttype
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            let next = Self::pull(&mut self.tokens, self.reporter, Some(&self.current));
            self.previous = mem::replace(&mut self.current, next);
        }

        self.previous.clone()
    }

    #[inline(always)]
    fn is_at_end(&self) -> bool {
        matches!(self.current.token_type, TokenType::EOF)
    }

    /// Report `message` at `token` and build the unwinding error.
    fn error(&mut self, token: &Token, message: &str) -> LoxError {
        let error = LoxError::parse(token.position(), message);
        self.reporter.report(&error);

        error
    }

    /// Span from `first` to the most recently consumed token.
    fn span_from(&self, first: &Token) -> Position {
        Position::new(first.line, first.start, self.previous.end)
    }

    /// Discards tokens until it thinks it is at a statement boundary.
    fn synchronize(&mut self) {
        self.advance(); // skip the token that caused the error

        while !self.is_at_end() {
            if matches!(self.previous.token_type, TokenType::SEMICOLON) {
                return;
            }

            match self.current.token_type {
                TokenType::CLASS
                | TokenType::FUN
                | TokenType::VAR
                | TokenType::FOR
                | TokenType::IF
                | TokenType::WHILE
                | TokenType::PRINT
                | TokenType::RETURN => return,
                _ => {}
            }

            self.advance();
        }
    }
}
