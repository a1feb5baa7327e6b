// Pebble Language Interpreter Library
//
// Lexer, scope-threading parser, tagged value runtime and tree-walking
// evaluator for the pebble scripting language.

// Public modules
pub mod ast;
pub mod builtins;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod position;
pub mod runner;
pub mod scope;
pub mod value;

// Re-export commonly used items
pub use ast::{Expr, Program, Stmt};
pub use error::{ErrorKind, PebbleError};
pub use evaluator::Evaluator;
pub use lexer::{Lexer, Token, TokenType};
pub use parser::Parser;
pub use position::{Position, Span};
pub use scope::{Context, Scope};
pub use value::{Number, Value};

// Re-export main functions
pub use runner::{execute, global_scope, run};
