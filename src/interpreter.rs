//! Tree‑walking evaluator.
//!
//! Statements produce a [`Completion`] instead of unwinding: `return`,
//! `break` and `continue` travel back up the call chain as ordinary values
//! and are consumed at the function call or loop that owns them. Only
//! genuine runtime failures travel as `Err(LoxError::Runtime)`.
//!
//! Variable access uses the distances computed by the resolver; an
//! expression the resolver did not record is a global.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::mem;
use std::rc::Rc;

use log::{debug, info, trace};

use crate::ast::{ClassDecl, Expr, ExprId, LiteralValue, Stmt};
use crate::environment::{EnvRef, Environment};
use crate::error::{ErrorReporter, LoxError, Result};
use crate::token::{Token, TokenType};
use crate::value::{natives, Callable, LoxClass, LoxFunction, LoxInstance, Value};

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Interpreter {
    globals: EnvRef,
    environment: EnvRef,
    locals: HashMap<ExprId, usize>,
    output: Box<dyn Write>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Creates a new Interpreter with the native functions defined.
    pub fn new() -> Self {
        info!("Initializing Interpreter");

        let globals: EnvRef = Rc::new(RefCell::new(Environment::new()));

        for native in natives() {
            debug!("Defining native function '{}'", native.name);
            globals
                .borrow_mut()
                .define(native.name, Value::Native(Rc::new(native)));
        }

        Self {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            output: Box::new(io::stdout()),
        }
    }

    /// Send `print` output to `output` instead of stdout.
    pub fn with_output(mut self, output: Box<dyn Write>) -> Self {
        self.output = output;
        self
    }

    /// Merge a resolver's distance table into the one in use.
    pub fn add_locals(&mut self, locals: HashMap<ExprId, usize>) {
        debug!("Adding {} resolved local(s)", locals.len());
        self.locals.extend(locals);
    }

    /// Current value of a global binding, if any.
    pub fn global(&self, name: &str) -> Option<Value> {
        Environment::get_at(&self.globals, 0, name)
    }

    /// Run a program.
    ///
    /// Stops at the first runtime error, which is reported once. Returns
    /// whether every statement ran.
    pub fn interpret(&mut self, statements: &[Stmt], reporter: &mut dyn ErrorReporter) -> bool {
        debug!("Interpreting {} statements", statements.len());

        for stmt in statements {
            if let Err(error) = self.execute(stmt) {
                info!("Interpretation aborted: {}", error.message());
                reporter.runtime_error(&error);
                return false;
            }
        }

        info!("Interpretation completed successfully");
        true
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────────

    pub fn execute(&mut self, stmt: &Stmt) -> Result<Completion> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(Completion::Normal)
            }

            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;
                writeln!(self.output, "{}", value)?;
                trace!("Printed value: {}", value);
                Ok(Completion::Normal)
            }

            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                debug!("Defining variable '{}' = {}", name.lexeme, value);
                self.environment.borrow_mut().define(&name.lexeme, value);
                Ok(Completion::Normal)
            }

            Stmt::Block(statements) => {
                let environment = Environment::nested(&self.environment);
                self.execute_block(statements, environment)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_stmt) = else_branch {
                    self.execute(else_stmt)
                } else {
                    Ok(Completion::Normal)
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    match self.execute(body)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Normal | Completion::Continue => {}
                    }
                }
                Ok(Completion::Normal)
            }

            Stmt::For {
                initializer,
                condition,
                increment,
                body,
            } => {
                // the clauses get one scope of their own
                let environment = Environment::nested(&self.environment);
                let previous = mem::replace(&mut self.environment, environment);

                let result = self.run_for(
                    initializer.as_deref(),
                    condition.as_ref(),
                    increment.as_ref(),
                    body,
                );

                self.environment = previous;
                result
            }

            Stmt::Function(decl) => {
                debug!("Defining function '{}'", decl.name.lexeme);
                let function = LoxFunction::new(Rc::clone(decl), Rc::clone(&self.environment), false);
                self.environment
                    .borrow_mut()
                    .define(&decl.name.lexeme, Value::Function(Rc::new(function)));
                Ok(Completion::Normal)
            }

            Stmt::Class(class) => {
                self.define_class(class)?;
                Ok(Completion::Normal)
            }

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                Ok(Completion::Return(value))
            }

            Stmt::Break(_) => Ok(Completion::Break),

            Stmt::Continue(_) => Ok(Completion::Continue),
        }
    }

    /// Run `statements` in `environment`, restoring the current scope
    /// afterwards whether or not they fail.
    pub fn execute_block(&mut self, statements: &[Stmt], environment: EnvRef) -> Result<Completion> {
        let previous = mem::replace(&mut self.environment, environment);

        let result = self.execute_all(statements);

        self.environment = previous;
        result
    }

    fn execute_all(&mut self, statements: &[Stmt]) -> Result<Completion> {
        for stmt in statements {
            match self.execute(stmt)? {
                Completion::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Completion::Normal)
    }

    fn run_for(
        &mut self,
        initializer: Option<&Stmt>,
        condition: Option<&Expr>,
        increment: Option<&Expr>,
        body: &Stmt,
    ) -> Result<Completion> {
        if let Some(init) = initializer {
            self.execute(init)?;
        }

        loop {
            if let Some(cond) = condition {
                if !self.evaluate(cond)?.is_truthy() {
                    break;
                }
            }

            match self.execute(body)? {
                Completion::Break => break,
                Completion::Return(value) => return Ok(Completion::Return(value)),
                // `continue` still runs the increment
                Completion::Normal | Completion::Continue => {}
            }

            if let Some(inc) = increment {
                self.evaluate(inc)?;
            }
        }

        Ok(Completion::Normal)
    }

    fn define_class(&mut self, class: &ClassDecl) -> Result<()> {
        debug!("Defining class '{}'", class.name.lexeme);

        let superclass = match &class.superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Class(superclass) => Some(superclass),
                _ => {
                    let position = match expr {
                        Expr::Variable { name, .. } => name.position(),
                        _ => class.name.position(),
                    };
                    return Err(LoxError::runtime(position, "Superclass must be a class."));
                }
            },
            None => None,
        };

        // methods of a subclass close over a scope holding `super`
        let method_env = match &superclass {
            Some(superclass) => {
                let environment = Environment::nested(&self.environment);
                environment
                    .borrow_mut()
                    .define("super", Value::Class(Rc::clone(superclass)));
                environment
            }
            None => Rc::clone(&self.environment),
        };

        let methods = class
            .methods
            .iter()
            .map(|method| {
                let is_initializer = method.name.lexeme == "init";
                let function = LoxFunction::new(Rc::clone(method), Rc::clone(&method_env), is_initializer);
                (method.name.lexeme.clone(), Rc::new(function))
            })
            .collect();

        let class_value = LoxClass::new(class.name.lexeme.clone(), superclass, methods);

        self.environment
            .borrow_mut()
            .define(&class.name.lexeme, Value::Class(Rc::new(class_value)));

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────────

    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        let value = match expr {
            Expr::Literal(literal) => literal_value(literal),

            Expr::Grouping(inner) => self.evaluate(inner)?,

            Expr::Unary { operator, right } => {
                let right = self.evaluate(right)?;
                match operator.token_type {
                    TokenType::MINUS => match right {
                        Value::Number(n) => Value::Number(-n),
                        other => {
                            return Err(LoxError::runtime(
                                operator.position(),
                                format!("Operand must be a number but found {}.", other.kind()),
                            ))
                        }
                    },
                    _ => Value::Bool(!right.is_truthy()),
                }
            }

            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                binary(operator, left, right)?
            }

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                // yields the operand that decided, not a coerced boolean
                let left = self.evaluate(left)?;
                let decided = match operator.token_type {
                    TokenType::OR => left.is_truthy(),
                    _ => !left.is_truthy(),
                };
                if decided {
                    left
                } else {
                    self.evaluate(right)?
                }
            }

            Expr::Variable { id, name } => self.look_up_variable(*id, name)?,

            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value)?;
                self.assign_variable(*id, name, value.clone())?;
                value
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee)?;

                let mut values = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(self.evaluate(argument)?);
                }

                self.call(&callee, paren, values)?
            }

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => LoxInstance::get(&instance, name)?,
                _ => {
                    return Err(LoxError::runtime(
                        name.position(),
                        "Only instances have properties.",
                    ))
                }
            },

            Expr::Set {
                object,
                name,
                value,
            } => {
                let Value::Instance(instance) = self.evaluate(object)? else {
                    return Err(LoxError::runtime(
                        name.position(),
                        "Only instances have fields.",
                    ));
                };

                let value = self.evaluate(value)?;
                instance.borrow_mut().set(name, value.clone());
                value
            }

            Expr::This { id, keyword } => self.look_up_variable(*id, keyword)?,

            Expr::Super {
                id,
                keyword,
                method,
            } => self.super_method(*id, keyword, method)?,
        };

        trace!("Expression evaluated to: {}", value);
        Ok(value)
    }

    fn call(&mut self, callee: &Value, paren: &Token, arguments: Vec<Value>) -> Result<Value> {
        let callable: &dyn Callable = match callee {
            Value::Function(function) => function.as_ref(),
            Value::Native(native) => native.as_ref(),
            Value::Class(class) => class,
            _ => {
                return Err(LoxError::runtime(
                    paren.position(),
                    "Can only call functions and classes.",
                ))
            }
        };

        if arguments.len() != callable.arity() {
            return Err(LoxError::runtime(
                paren.position(),
                format!(
                    "Expected {} arguments but got {}.",
                    callable.arity(),
                    arguments.len()
                ),
            ));
        }

        callable.call(self, arguments)
    }

    /// `super.method`: the method is looked up from the superclass stored
    /// by the class declaration and bound to the current `this`, which
    /// lives one scope closer.
    fn super_method(&mut self, id: ExprId, keyword: &Token, method: &Token) -> Result<Value> {
        let distance = self
            .locals
            .get(&id)
            .copied()
            .ok_or_else(|| undefined_variable(keyword))?;

        let Some(Value::Class(superclass)) = Environment::get_at(&self.environment, distance, "super")
        else {
            return Err(undefined_variable(keyword));
        };

        let this = distance
            .checked_sub(1)
            .and_then(|d| Environment::get_at(&self.environment, d, "this"))
            .ok_or_else(|| {
                LoxError::runtime(keyword.position(), "Undefined variable 'this'.")
            })?;

        match superclass.find_method(&method.lexeme) {
            Some(found) => Ok(Value::Function(Rc::new(found.bind(this)))),
            None => Err(LoxError::runtime(
                method.position(),
                format!("Undefined property '{}'.", method.lexeme),
            )),
        }
    }

    fn look_up_variable(&self, id: ExprId, name: &Token) -> Result<Value> {
        match self.locals.get(&id) {
            Some(&distance) => {
                trace!("'{}' found {} scope(s) out", name.lexeme, distance);
                Environment::get_at(&self.environment, distance, &name.lexeme)
                    .ok_or_else(|| undefined_variable(name))
            }
            None => self.globals.borrow().get(name),
        }
    }

    fn assign_variable(&mut self, id: ExprId, name: &Token, value: Value) -> Result<()> {
        match self.locals.get(&id) {
            Some(&distance) => {
                if Environment::assign_at(&self.environment, distance, &name.lexeme, value) {
                    Ok(())
                } else {
                    Err(undefined_variable(name))
                }
            }
            None => self.globals.borrow_mut().assign(name, value),
        }
    }
}

fn literal_value(literal: &LiteralValue) -> Value {
    match literal {
        LiteralValue::Number(n) => Value::Number(*n),
        LiteralValue::Str(s) => Value::String(s.clone()),
        LiteralValue::True => Value::Bool(true),
        LiteralValue::False => Value::Bool(false),
        LiteralValue::Nil => Value::Nil,
    }
}

fn binary(operator: &Token, left: Value, right: Value) -> Result<Value> {
    let value = match operator.token_type {
        TokenType::EQUAL_EQUAL => Value::Bool(left == right),
        TokenType::BANG_EQUAL => Value::Bool(left != right),

        TokenType::PLUS => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (Value::String(a), Value::String(b)) => Value::String(a + &b),
            _ => {
                return Err(LoxError::runtime(
                    operator.position(),
                    "Operands must be two numbers or two strings.",
                ))
            }
        },

        _ => {
            let (a, b) = number_operands(operator, &left, &right)?;
            match operator.token_type {
                TokenType::MINUS => Value::Number(a - b),
                TokenType::STAR => Value::Number(a * b),
                TokenType::SLASH => {
                    if b == 0.0 {
                        return Err(LoxError::runtime(operator.position(), "Division by zero."));
                    }
                    Value::Number(a / b)
                }
                TokenType::GREATER => Value::Bool(a > b),
                TokenType::GREATER_EQUAL => Value::Bool(a >= b),
                TokenType::LESS => Value::Bool(a < b),
                TokenType::LESS_EQUAL => Value::Bool(a <= b),
                _ => {
                    return Err(LoxError::runtime(
                        operator.position(),
                        format!("Unknown binary operator '{}'.", operator.lexeme),
                    ))
                }
            }
        }
    };

    Ok(value)
}

fn number_operands(operator: &Token, left: &Value, right: &Value) -> Result<(f64, f64)> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
        (Value::Number(_), other) | (other, _) => Err(LoxError::runtime(
            operator.position(),
            format!(
                "Operands of '{}' must be numbers but found {}.",
                operator.lexeme,
                other.kind()
            ),
        )),
    }
}

fn undefined_variable(name: &Token) -> LoxError {
    LoxError::runtime(
        name.position(),
        format!("Undefined variable '{}'.", name.lexeme),
    )
}
