use crate::ast::{Expr, LiteralValue, Stmt};

/// Converts AST nodes to a parenthesised prefix form, mostly for tests and
/// the `parse` subcommand. `(1 + 2 * 6) - 13` prints as
/// `(- ((+ 1 (* 2 6))) 13)`.
pub struct AstPrinter;

impl AstPrinter {
    pub fn print(expr: &Expr) -> String {
        match expr {
            // ── literals ────────────────────────────────────────────────
            Expr::Literal(lit) => Self::literal(lit),

            // ── grouping ────────────────────────────────────────────────
            Expr::Grouping(inner) => format!("({})", Self::print(inner)),

            // ── unary operator ──────────────────────────────────────────
            Expr::Unary { operator, right } => {
                format!("({} {})", operator.lexeme, Self::print(right))
            }

            // ── binary / logical operator ───────────────────────────────
            Expr::Binary {
                left,
                operator,
                right,
            }
            | Expr::Logical {
                left,
                operator,
                right,
            } => format!(
                "({} {} {})",
                operator.lexeme,
                Self::print(left),
                Self::print(right)
            ),

            // ── bindings ────────────────────────────────────────────────
            Expr::Variable { name, .. } => name.lexeme.clone(),

            Expr::Assign { name, value, .. } => {
                format!("(= {} {})", name.lexeme, Self::print(value))
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                let mut s = format!("(call {}", Self::print(callee));
                for arg in arguments {
                    s.push(' ');
                    s.push_str(&Self::print(arg));
                }
                s.push(')');
                s
            }

            // ── objects ─────────────────────────────────────────────────
            Expr::Get { object, name } => {
                format!("(get {} {})", Self::print(object), name.lexeme)
            }

            Expr::Set {
                object,
                name,
                value,
            } => format!(
                "(set {} {} {})",
                Self::print(object),
                name.lexeme,
                Self::print(value)
            ),

            Expr::This { .. } => "this".into(),

            Expr::Super { method, .. } => format!("(super {})", method.lexeme),
        }
    }

    pub fn print_stmt(stmt: &Stmt) -> String {
        match stmt {
            Stmt::Expression(expr) => Self::print(expr),

            Stmt::Print(expr) => format!("(print {})", Self::print(expr)),

            Stmt::Var { name, initializer } => match initializer {
                Some(init) => format!("(var {} {})", name.lexeme, Self::print(init)),
                None => format!("(var {})", name.lexeme),
            },

            Stmt::Block(statements) => Self::list("block", statements),

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => match else_branch {
                Some(other) => format!(
                    "(if {} {} {})",
                    Self::print(condition),
                    Self::print_stmt(then_branch),
                    Self::print_stmt(other)
                ),
                None => format!(
                    "(if {} {})",
                    Self::print(condition),
                    Self::print_stmt(then_branch)
                ),
            },

            Stmt::While { condition, body } => format!(
                "(while {} {})",
                Self::print(condition),
                Self::print_stmt(body)
            ),

            Stmt::For {
                initializer,
                condition,
                increment,
                body,
            } => format!(
                "(for {} {} {} {})",
                initializer
                    .as_deref()
                    .map_or_else(|| "nil".to_string(), Self::print_stmt),
                condition
                    .as_ref()
                    .map_or_else(|| "nil".to_string(), Self::print),
                increment
                    .as_ref()
                    .map_or_else(|| "nil".to_string(), Self::print),
                Self::print_stmt(body)
            ),

            Stmt::Function(decl) => {
                let params: Vec<&str> = decl.params.iter().map(|p| p.lexeme.as_str()).collect();
                let mut s = format!("(fun {} ({})", decl.name.lexeme, params.join(" "));
                for stmt in &decl.body {
                    s.push(' ');
                    s.push_str(&Self::print_stmt(stmt));
                }
                s.push(')');
                s
            }

            Stmt::Class(class) => {
                let mut s = format!("(class {}", class.name.lexeme);
                if let Some(superclass) = &class.superclass {
                    s.push_str(" < ");
                    s.push_str(&Self::print(superclass));
                }
                for method in &class.methods {
                    s.push(' ');
                    s.push_str(&Self::print_stmt(&Stmt::Function(method.clone())));
                }
                s.push(')');
                s
            }

            Stmt::Return { value, .. } => match value {
                Some(value) => format!("(return {})", Self::print(value)),
                None => "(return)".into(),
            },

            Stmt::Break(_) => "(break)".into(),

            Stmt::Continue(_) => "(continue)".into(),
        }
    }

    /// One line per top‑level statement.
    pub fn print_program(statements: &[Stmt]) -> String {
        statements
            .iter()
            .map(Self::print_stmt)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn literal(lit: &LiteralValue) -> String {
        match lit {
            LiteralValue::True => "true".into(),

            LiteralValue::False => "false".into(),

            LiteralValue::Nil => "nil".into(),

            LiteralValue::Str(s) => s.clone(),

            // 3.0 → "3", 2.5 → "2.5"
            LiteralValue::Number(n) => n.to_string(),
        }
    }

    fn list(head: &str, statements: &[Stmt]) -> String {
        let mut s = format!("({}", head);
        for stmt in statements {
            s.push(' ');
            s.push_str(&Self::print_stmt(stmt));
        }
        s.push(')');
        s
    }
}
