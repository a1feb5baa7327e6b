use crate::error::PebbleError;
use crate::position::{Position, Span};
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SymbolKind {
    Let,
    Const,
    Function,
}

/// A binding in a symbol table. The parser records names with no value; the evaluator fills them in.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub value: Option<Value>,
}

impl Symbol {
    pub fn new(kind: SymbolKind, value: Value) -> Self {
        Self {
            kind,
            value: Some(value),
        }
    }

    pub fn declared(kind: SymbolKind) -> Self {
        Self { kind, value: None }
    }
}

pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
    parent: Option<Scope>,
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut names: Vec<&String> = self.symbols.keys().collect();
        names.sort();
        f.debug_struct("SymbolTable")
            .field("names", &names)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// Shared handle to a symbol table. Closures and call frames hold it by reference,
/// so later writes are visible to everything that captured the table.
#[derive(Debug, Clone)]
pub struct Scope(Rc<RefCell<SymbolTable>>);

impl Scope {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(SymbolTable {
            symbols: HashMap::new(),
            parent: None,
        })))
    }

    /// A fresh table whose lookups fall back to `self`.
    pub fn child(&self) -> Self {
        Self(Rc::new(RefCell::new(SymbolTable {
            symbols: HashMap::new(),
            parent: Some(self.clone()),
        })))
    }

    pub fn parent(&self) -> Option<Scope> {
        self.0.borrow().parent.clone()
    }

    /// Looks `name` up here, then in each enclosing table.
    pub fn get(&self, name: &str) -> Option<Symbol> {
        let table = self.0.borrow();
        match table.symbols.get(name) {
            Some(symbol) => Some(symbol.clone()),
            None => table.parent.as_ref().and_then(|parent| parent.get(name)),
        }
    }

    /// Binds `name` in this table, replacing any previous binding.
    pub fn define(&self, name: &str, symbol: Symbol) {
        self.0.borrow_mut().symbols.insert(name.to_string(), symbol);
    }

    /// Records that `name` is declared here without giving it a value.
    /// An existing binding is left alone.
    pub fn declare(&self, name: &str, kind: SymbolKind) {
        self.0
            .borrow_mut()
            .symbols
            .entry(name.to_string())
            .or_insert_with(|| Symbol::declared(kind));
    }

    /// Replaces the value of the nearest binding of `name`; constants refuse the write.
    pub fn update(
        &self,
        name: &str,
        value: Value,
        span: &Span,
        context: &Rc<Context>,
    ) -> Result<(), PebbleError> {
        let parent = {
            let mut table = self.0.borrow_mut();
            if let Some(symbol) = table.symbols.get_mut(name) {
                if symbol.kind == SymbolKind::Const {
                    return Err(PebbleError::runtime_error(
                        span.clone(),
                        format!("Constant variable '{}' is immutable", name),
                        Some(context.clone()),
                    ));
                }
                symbol.value = Some(value);
                return Ok(());
            }
            table.parent.clone()
        };

        match parent {
            Some(parent) => parent.update(name, value, span, context),
            None => Err(PebbleError::runtime_error(
                span.clone(),
                format!("Unknown Variable or Function '{}'", name),
                Some(context.clone()),
            )),
        }
    }

    /// Names bound directly in this table, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.borrow().symbols.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

/// One activation record: the program itself or a function call.
pub struct Context {
    pub display_name: String,
    pub parent: Option<Rc<Context>>,
    /// Where the call that created this frame starts.
    pub parent_entry_position: Option<Position>,
    pub scope: Scope,
}

impl Context {
    pub fn main(scope: Scope) -> Self {
        Self {
            display_name: "<main>".to_string(),
            parent: None,
            parent_entry_position: None,
            scope,
        }
    }

    pub fn call(
        display_name: &str,
        parent: &Rc<Context>,
        entry_position: Position,
        scope: Scope,
    ) -> Self {
        Self {
            display_name: display_name.to_string(),
            parent: Some(parent.clone()),
            parent_entry_position: Some(entry_position),
            scope,
        }
    }

    /// Number of frames from here to the outermost one, inclusive.
    pub fn depth(&self) -> usize {
        1 + self.parent.as_ref().map_or(0, |parent| parent.depth())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Context")
            .field("display_name", &self.display_name)
            .field("depth", &self.depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Number, Value};

    fn main_context(scope: &Scope) -> Rc<Context> {
        Rc::new(Context::main(scope.clone()))
    }

    #[test]
    fn inner_bindings_shadow_outer_ones() {
        let outer = Scope::new();
        outer.define("x", Symbol::new(SymbolKind::Let, Value::number(Number::Int(1))));
        let inner = outer.child();
        inner.define("x", Symbol::new(SymbolKind::Let, Value::number(Number::Int(2))));

        let seen = inner.get("x").and_then(|s| s.value).map(|v| v.to_string());
        assert_eq!(seen.as_deref(), Some("2"));
        let seen = outer.get("x").and_then(|s| s.value).map(|v| v.to_string());
        assert_eq!(seen.as_deref(), Some("1"));
    }

    #[test]
    fn update_writes_through_to_the_defining_table() {
        let outer = Scope::new();
        outer.define("x", Symbol::new(SymbolKind::Let, Value::number(Number::Int(1))));
        let inner = outer.child();
        let ctx = main_context(&outer);

        inner
            .update("x", Value::number(Number::Int(5)), &Span::default(), &ctx)
            .unwrap();
        assert!(inner.names().is_empty());
        let seen = outer.get("x").and_then(|s| s.value).map(|v| v.to_string());
        assert_eq!(seen.as_deref(), Some("5"));
    }

    #[test]
    fn constants_reject_updates() {
        let scope = Scope::new();
        scope.define("c", Symbol::new(SymbolKind::Const, Value::number(Number::Int(1))));
        let ctx = main_context(&scope);

        let error = scope
            .update("c", Value::number(Number::Int(2)), &Span::default(), &ctx)
            .unwrap_err();
        assert_eq!(error.message, "Constant variable 'c' is immutable");
    }

    #[test]
    fn declare_keeps_an_existing_binding() {
        let scope = Scope::new();
        scope.define("len", Symbol::new(SymbolKind::Let, Value::number(Number::Int(3))));
        scope.declare("len", SymbolKind::Const);

        let symbol = scope.get("len").unwrap();
        assert_eq!(symbol.kind, SymbolKind::Let);
        assert!(symbol.value.is_some());
    }
}
