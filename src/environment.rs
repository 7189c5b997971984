use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::trace;

use crate::error::{LoxError, Result};
use crate::token::Token;
use crate::value::Value;

/// Shared handle to one scope's bindings. Closures keep these alive.
pub type EnvRef = Rc<RefCell<Environment>>;

#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<EnvRef>,
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    pub fn with_enclosing(enclosing: EnvRef) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Wrap a fresh scope nested in `enclosing` into a shared handle.
    pub fn nested(enclosing: &EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(enclosing))))
    }

    pub fn enclosing(&self) -> Option<EnvRef> {
        self.enclosing.clone()
    }

    /// Bind `name` in this scope, shadowing any outer binding and
    /// replacing an existing one here.
    pub fn define(&mut self, name: &str, value: Value) {
        trace!("define '{}' = {}", name, value);
        self.values.insert(name.to_string(), value);
    }

    /// Dynamic lookup along the whole chain. Used for globals.
    pub fn get(&self, name: &Token) -> Result<Value> {
        if let Some(value) = self.values.get(&name.lexeme) {
            Ok(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name)
        } else {
            Err(undefined(name))
        }
    }

    pub fn assign(&mut self, name: &Token, value: Value) -> Result<()> {
        if let Some(slot) = self.values.get_mut(&name.lexeme) {
            *slot = value;
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            Err(undefined(name))
        }
    }

    /// The scope exactly `distance` links out from `env`.
    pub fn ancestor(env: &EnvRef, distance: usize) -> Option<EnvRef> {
        let mut current = Rc::clone(env);
        for _ in 0..distance {
            let next = current.borrow().enclosing()?;
            current = next;
        }
        Some(current)
    }

    /// Read `name` from the scope `distance` links out, without searching.
    pub fn get_at(env: &EnvRef, distance: usize, name: &str) -> Option<Value> {
        let scope = Self::ancestor(env, distance)?;
        let value = scope.borrow().values.get(name).cloned();
        value
    }

    /// Overwrite `name` in the scope `distance` links out. Returns `false`
    /// when that scope has no such binding.
    pub fn assign_at(env: &EnvRef, distance: usize, name: &str, value: Value) -> bool {
        let Some(scope) = Self::ancestor(env, distance) else {
            return false;
        };
        let mut scope = scope.borrow_mut();
        match scope.values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

fn undefined(name: &Token) -> LoxError {
    LoxError::runtime(
        name.position(),
        format!("Undefined variable '{}'.", name.lexeme),
    )
}

#[cfg(test)]
mod environment_tests {
    use super::*;
    use crate::token::{TokenId, TokenType};

    fn ident(name: &str) -> Token {
        Token::new(TokenType::IDENTIFIER, name, 1, 0, name.len(), TokenId(0))
    }

    #[test]
    fn test_inner_define_shadows_outer() {
        let outer: EnvRef = Rc::new(RefCell::new(Environment::new()));
        outer.borrow_mut().define("a", Value::Number(1.0));

        let inner = Environment::nested(&outer);
        inner.borrow_mut().define("a", Value::Number(2.0));

        assert_eq!(inner.borrow().get(&ident("a")).unwrap(), Value::Number(2.0));
        assert_eq!(outer.borrow().get(&ident("a")).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_assign_walks_the_chain() {
        let outer: EnvRef = Rc::new(RefCell::new(Environment::new()));
        outer.borrow_mut().define("a", Value::Number(1.0));

        let inner = Environment::nested(&outer);
        inner
            .borrow_mut()
            .assign(&ident("a"), Value::Number(3.0))
            .unwrap();

        assert_eq!(outer.borrow().get(&ident("a")).unwrap(), Value::Number(3.0));
    }

    #[test]
    fn test_undefined_variable_is_a_runtime_error() {
        let env = Environment::new();
        let err = env.get(&ident("missing")).unwrap_err();

        assert_eq!(err.message(), "Undefined variable 'missing'.");
        assert!(matches!(err, LoxError::Runtime { .. }));
    }

    #[test]
    fn test_get_at_skips_closer_bindings() {
        let outer: EnvRef = Rc::new(RefCell::new(Environment::new()));
        outer.borrow_mut().define("a", Value::String("outer".into()));

        let inner = Environment::nested(&outer);
        inner
            .borrow_mut()
            .define("a", Value::String("inner".into()));

        assert_eq!(
            Environment::get_at(&inner, 1, "a"),
            Some(Value::String("outer".into()))
        );
        assert_eq!(
            Environment::get_at(&inner, 0, "a"),
            Some(Value::String("inner".into()))
        );
        assert_eq!(Environment::get_at(&inner, 2, "a"), None);
    }

    #[test]
    fn test_assign_at_only_touches_target_scope() {
        let outer: EnvRef = Rc::new(RefCell::new(Environment::new()));
        outer.borrow_mut().define("a", Value::Number(1.0));

        let inner = Environment::nested(&outer);
        inner.borrow_mut().define("a", Value::Number(2.0));

        assert!(Environment::assign_at(&inner, 1, "a", Value::Number(9.0)));
        assert!(!Environment::assign_at(&inner, 0, "b", Value::Nil));

        assert_eq!(Environment::get_at(&inner, 0, "a"), Some(Value::Number(2.0)));
        assert_eq!(Environment::get_at(&outer, 0, "a"), Some(Value::Number(9.0)));
    }
}
