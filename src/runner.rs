use crate::builtins;
use crate::error::PebbleError;
use crate::evaluator::Evaluator;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::scope::Scope;
use crate::value::Value;
use log::trace;

/// A fresh top-level scope with the built-in functions and constants bound.
pub fn global_scope() -> Scope {
    let scope = Scope::new();
    builtins::install(&scope);
    scope
}

/// Lexes, parses and evaluates `source` against the evaluator's globals.
/// The parser and the evaluator share that one scope.
pub fn execute(
    source: &str,
    file_name: &str,
    evaluator: &mut Evaluator,
) -> Result<Option<Value>, PebbleError> {
    trace!("lexing {}", file_name);
    let tokens = Lexer::new(file_name, source).tokenize()?;

    trace!("parsing {} tokens", tokens.len());
    let program = Parser::new(tokens, evaluator.globals().clone()).parse()?;

    trace!("interpreting {} statements", program.statements.len());
    evaluator.evaluate_program(&program)
}

/// Runs a whole program on stdin/stdout. Returns `false` if a diagnostic was reported.
pub fn run(source: &str, file_name: &str, pretty: bool) -> bool {
    let mut evaluator = Evaluator::new(global_scope());
    match execute(source, file_name, &mut evaluator) {
        Ok(_) => true,
        Err(error) => {
            report(&error, pretty);
            false
        }
    }
}

fn report(error: &PebbleError, pretty: bool) {
    if pretty && error.report().is_ok() {
        return;
    }
    println!("{}", error.as_string());
}
