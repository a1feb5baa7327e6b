use crate::error::PebbleError;
use crate::position::Span;
use crate::scope::{Context, Scope, Symbol, SymbolKind};
use crate::value::{Number, Value, ValueKind};
use log::debug;
use rand::Rng;
use std::io::{BufRead, Write};
use std::rc::Rc;

/// Largest bound `range` will materialize into a list.
pub const MAX_RANGE_LEN: i64 = 1 << 22;

/// Natively implemented functions available to every program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Builtin {
    Input,
    Range,
    Len,
    IsNumber,
    IsString,
    IsList,
    ToNumber,
    String,
    List,
    Type,
    Prompt,
    Random,
}

struct BuiltinDef {
    name: &'static str,
    builtin: Builtin,
    params: &'static [&'static str],
}

static BUILTIN_TABLE: &[BuiltinDef] = &[
    BuiltinDef { name: "input", builtin: Builtin::Input, params: &[] },
    BuiltinDef { name: "range", builtin: Builtin::Range, params: &["end"] },
    BuiltinDef { name: "len", builtin: Builtin::Len, params: &["value"] },
    BuiltinDef { name: "is_number", builtin: Builtin::IsNumber, params: &["value"] },
    BuiltinDef { name: "is_string", builtin: Builtin::IsString, params: &["value"] },
    BuiltinDef { name: "is_list", builtin: Builtin::IsList, params: &["value"] },
    BuiltinDef { name: "to_number", builtin: Builtin::ToNumber, params: &["value"] },
    BuiltinDef { name: "string", builtin: Builtin::String, params: &["value"] },
    BuiltinDef { name: "list", builtin: Builtin::List, params: &["value"] },
    BuiltinDef { name: "type", builtin: Builtin::Type, params: &["value"] },
    BuiltinDef { name: "prompt", builtin: Builtin::Prompt, params: &["message"] },
    BuiltinDef { name: "random", builtin: Builtin::Random, params: &["end"] },
];

/// Binds every built-in function and the predefined constants in `scope`.
pub fn install(scope: &Scope) {
    for def in BUILTIN_TABLE {
        scope.define(
            def.name,
            Symbol::new(SymbolKind::Function, Value::builtin(def.builtin)),
        );
    }

    let constants = [
        ("MATH_PI", Number::Float(std::f64::consts::PI)),
        ("TRUE", Number::Int(1)),
        ("FALSE", Number::Int(0)),
        ("NULL", Number::Null),
    ];
    for (name, number) in constants {
        scope.define(name, Symbol::new(SymbolKind::Const, Value::number(number)));
    }
}

impl Builtin {
    fn def(&self) -> &'static BuiltinDef {
        // Every variant has exactly one table entry.
        BUILTIN_TABLE
            .iter()
            .find(|def| def.builtin == *self)
            .unwrap_or(&BUILTIN_TABLE[0])
    }

    pub fn name(&self) -> &'static str {
        self.def().name
    }

    pub fn params(&self) -> &'static [&'static str] {
        self.def().params
    }

    pub fn from_name(name: &str) -> Option<Builtin> {
        BUILTIN_TABLE
            .iter()
            .find(|def| def.name == name)
            .map(|def| def.builtin)
    }

    /// Runs the built-in. `args` has already been checked against `params()`.
    pub fn call(
        &self,
        args: &[Value],
        input: &mut dyn BufRead,
        output: &mut dyn Write,
        span: &Span,
        context: &Rc<Context>,
    ) -> Result<Value, PebbleError> {
        debug!("calling built-in {} with {} argument(s)", self.name(), args.len());
        let error = |message: String| {
            PebbleError::runtime_error(span.clone(), message, Some(context.clone()))
        };
        let arg = || args.first().cloned().unwrap_or_else(Value::null);

        let result = match self {
            Builtin::Input => Value::string(read_line(input).map_err(error)?),
            Builtin::Prompt => {
                write!(output, "{}", arg())
                    .and_then(|_| output.flush())
                    .map_err(|e| error(format!("Could not write prompt: {}", e)))?;
                Value::string(read_line(input).map_err(error)?)
            }
            Builtin::Range => {
                let end = match arg().kind {
                    ValueKind::Number(n) => n.as_integer(),
                    _ => None,
                };
                match end {
                    Some(end) if end > MAX_RANGE_LEN => {
                        return Err(error(format!(
                            "'range' argument must not exceed {}",
                            MAX_RANGE_LEN
                        )))
                    }
                    Some(end) => Value::list((0..end.max(0)).map(Value::int).collect()),
                    None => {
                        return Err(error(
                            "'range' function argument must be an integer".to_string(),
                        ))
                    }
                }
            }
            Builtin::Len => {
                let value = arg();
                match value.kind {
                    ValueKind::Number(_) | ValueKind::String(_) | ValueKind::List(_) => {
                        value.length()?
                    }
                    _ => {
                        return Err(error(format!(
                            "'len' is not defined for {}",
                            value.type_name()
                        )))
                    }
                }
            }
            Builtin::IsNumber => Value::boolean(matches!(arg().kind, ValueKind::Number(_))),
            Builtin::IsString => Value::boolean(matches!(arg().kind, ValueKind::String(_))),
            Builtin::IsList => Value::boolean(matches!(arg().kind, ValueKind::List(_))),
            Builtin::ToNumber => {
                let value = arg();
                match &value.kind {
                    ValueKind::Number(n) => Value::number(*n),
                    ValueKind::String(text) => match Number::parse(text) {
                        Some(n) => Value::number(n),
                        None => {
                            return Err(error(format!(
                                "Can not convert '{}' to type Number",
                                text
                            )))
                        }
                    },
                    _ => {
                        return Err(error(format!(
                            "Can not convert '{}' to Number.",
                            value.type_name()
                        )))
                    }
                }
            }
            Builtin::String => Value::string(arg().to_string()),
            Builtin::List => {
                let value = arg();
                match &value.kind {
                    ValueKind::Number(_) => Value::list(vec![value.clone()]),
                    ValueKind::String(text) => {
                        Value::list(text.chars().map(|c| Value::string(c.to_string())).collect())
                    }
                    ValueKind::List(_) => value.clone(),
                    _ => {
                        return Err(error(format!(
                            "Can not convert '{}' to List.",
                            value.type_name()
                        )))
                    }
                }
            }
            Builtin::Type => {
                let name = match arg().kind {
                    ValueKind::Number(_) => "Number",
                    ValueKind::String(_) => "String",
                    ValueKind::List(_) => "List",
                    ValueKind::Function(_) | ValueKind::BuiltIn(_) => "Function",
                };
                Value::string(format!("<Type {}>", name))
            }
            Builtin::Random => match arg().kind {
                ValueKind::Number(n) => match n.as_integer() {
                    Some(end) if end >= 1 => Value::int(rand::thread_rng().gen_range(1..=end)),
                    Some(_) => return Err(error("'random' argument must be at least 1".to_string())),
                    None => return Err(error("'random' argument should be an integer".to_string())),
                },
                _ => return Err(error("'random' argument should be number".to_string())),
            },
        };

        Ok(result.with_context(context))
    }
}

/// One line of input without its trailing line break. End of input reads as "".
fn read_line(input: &mut dyn BufRead) -> Result<String, String> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .map_err(|e| format!("Could not read input: {}", e))?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_a_table_entry() {
        for def in BUILTIN_TABLE {
            assert_eq!(Builtin::from_name(def.name), Some(def.builtin));
            assert_eq!(def.builtin.name(), def.name);
        }
        assert_eq!(BUILTIN_TABLE.len(), 12);
    }

    #[test]
    fn install_binds_constants_as_const() {
        let scope = Scope::new();
        install(&scope);
        assert_eq!(scope.get("TRUE").map(|s| s.kind), Some(SymbolKind::Const));
        assert_eq!(scope.get("len").map(|s| s.kind), Some(SymbolKind::Function));
        let null = scope.get("NULL").and_then(|s| s.value).map(|v| v.to_string());
        assert_eq!(null.as_deref(), Some("null"));
    }

    #[test]
    fn read_line_strips_the_line_break() {
        let mut input = std::io::Cursor::new("hello\r\nworld\n");
        assert_eq!(read_line(&mut input).unwrap(), "hello");
        assert_eq!(read_line(&mut input).unwrap(), "world");
        assert_eq!(read_line(&mut input).unwrap(), "");
    }
}
