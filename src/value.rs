use crate::ast::{Block, Expr};
use crate::builtins::Builtin;
use crate::error::PebbleError;
use crate::position::Span;
use crate::scope::{Context, Scope};
use std::fmt;
use std::rc::Rc;

/// Longest string, in bytes, that repetition may build.
pub const MAX_STRING_LEN: usize = 1 << 28;

/// Numeric payload. The literal's integer/float form is kept; `Null` is the value-less number behind `NULL`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
    Null,
}

enum NumberError {
    Null,
    Overflow,
}

impl Number {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Number::Int(n) => Some(*n as f64),
            Number::Float(n) => Some(*n),
            Number::Null => None,
        }
    }

    /// The integer this number denotes, if it has no fractional part.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Number::Int(n) => Some(*n),
            Number::Float(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Number::Int(n) => *n == 0,
            Number::Float(n) => *n == 0.0,
            Number::Null => false,
        }
    }

    pub fn is_truthy(&self) -> bool {
        !self.is_zero() && *self != Number::Null
    }

    /// Parses `to_number` input: text with a `.` becomes a float, anything else an integer.
    pub fn parse(text: &str) -> Option<Number> {
        let text = text.trim();
        if text.contains('.') {
            text.parse::<f64>().ok().map(Number::Float)
        } else {
            text.parse::<i64>().ok().map(Number::Int)
        }
    }

    /// Character count of the number's text, not counting a float's decimal point.
    pub fn length(&self) -> usize {
        let text = self.to_string();
        match self {
            Number::Float(_) if text.contains('.') => text.chars().count() - 1,
            _ => text.chars().count(),
        }
    }

    fn combine(
        self,
        other: Number,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Number, NumberError> {
        match (self, other) {
            (Number::Null, _) | (_, Number::Null) => Err(NumberError::Null),
            (Number::Int(a), Number::Int(b)) => {
                int_op(a, b).map(Number::Int).ok_or(NumberError::Overflow)
            }
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => Ok(Number::Float(float_op(a, b))),
                _ => Err(NumberError::Null),
            },
        }
    }

    fn floor_mod(self, other: Number) -> Result<Number, NumberError> {
        self.combine(
            other,
            |a, b| {
                let r = a.checked_rem(b)?;
                Some(if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
            },
            |a, b| {
                let r = a % b;
                if r != 0.0 && (r < 0.0) != (b < 0.0) {
                    r + b
                } else {
                    r
                }
            },
        )
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Number::Int(n) => write!(f, "{}", n),
            Number::Float(n) => write!(f, "{}", format_float(*n)),
            Number::Null => write!(f, "null"),
        }
    }
}

/// Floats always show a decimal part (`2.0`); very large whole values use exponent form (`1e+20`).
pub fn format_float(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "" } else { "-" };
        format!("{}inf", sign)
    } else if n.fract() == 0.0 && n.abs() < 1e16 {
        format!("{:.1}", n)
    } else if n.abs() >= 1e16 {
        let text = format!("{:e}", n);
        match text.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{}e+{}", mantissa, exponent)
            }
            _ => text,
        }
    } else {
        format!("{}", n)
    }
}

/// Removes every left-to-right, non-overlapping occurrence of `pattern`.
/// When nothing would remain, the original text is returned unchanged.
pub fn remove_occurrences(text: &str, pattern: &str) -> String {
    if pattern.is_empty() {
        return text.to_string();
    }
    let result = text.replace(pattern, "");
    if result.is_empty() {
        text.to_string()
    } else {
        result
    }
}

pub enum FunctionBody {
    /// `func name(..) { .. }`
    Block(Rc<Block>),
    /// `inline (..) -> expr`
    Expr(Rc<Expr>),
}

/// A user-defined function together with the scope it closes over.
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: FunctionBody,
    pub scope: Scope,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum ValueKind {
    Number(Number),
    String(String),
    List(Vec<Value>),
    Function(Rc<Function>),
    BuiltIn(Builtin),
}

/// A runtime value. Operations never mutate their receiver; they build new values.
#[derive(Debug, Clone)]
pub struct Value {
    pub kind: ValueKind,
    pub span: Option<Span>,
    pub context: Option<Rc<Context>>,
}

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            span: None,
            context: None,
        }
    }

    pub fn number(number: Number) -> Self {
        Self::new(ValueKind::Number(number))
    }

    pub fn int(n: i64) -> Self {
        Self::number(Number::Int(n))
    }

    pub fn boolean(b: bool) -> Self {
        Self::int(if b { 1 } else { 0 })
    }

    pub fn null() -> Self {
        Self::number(Number::Null)
    }

    pub fn string(text: impl Into<String>) -> Self {
        Self::new(ValueKind::String(text.into()))
    }

    pub fn list(elements: Vec<Value>) -> Self {
        Self::new(ValueKind::List(elements))
    }

    pub fn function(function: Function) -> Self {
        Self::new(ValueKind::Function(Rc::new(function)))
    }

    pub fn builtin(builtin: Builtin) -> Self {
        Self::new(ValueKind::BuiltIn(builtin))
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_context(mut self, context: &Rc<Context>) -> Self {
        self.context = Some(context.clone());
        self
    }

    /// A result value produced from `self`: it inherits the context, not the position.
    fn derive(&self, kind: ValueKind) -> Value {
        Value {
            kind,
            span: None,
            context: self.context.clone(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            ValueKind::Number(_) => "Number",
            ValueKind::String(_) => "String",
            ValueKind::List(_) => "List",
            ValueKind::Function(_) => "Function",
            ValueKind::BuiltIn(_) => "BuiltInFunction",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match &self.kind {
            ValueKind::Number(n) => n.is_truthy(),
            ValueKind::String(s) => !s.is_empty(),
            ValueKind::List(l) => !l.is_empty(),
            ValueKind::Function(_) | ValueKind::BuiltIn(_) => true,
        }
    }

    fn span_or_default(&self) -> Span {
        self.span.clone().unwrap_or_default()
    }

    /// From the start of `self` to the end of `other`, when both are known.
    fn operand_span(&self, other: &Value) -> Span {
        match (&self.span, &other.span) {
            (Some(left), Some(right)) => left.to(right),
            (Some(left), None) => left.clone(),
            (None, Some(right)) => right.clone(),
            (None, None) => Span::default(),
        }
    }

    fn error(&self, span: Span, message: String) -> PebbleError {
        PebbleError::runtime_error(span, message, self.context.clone())
    }

    fn unsupported(&self, operator: &str, other: &Value) -> PebbleError {
        self.error(
            self.operand_span(other),
            format!(
                "Unsupported operation '{}' between {} and {}",
                operator,
                self.type_name(),
                other.type_name()
            ),
        )
    }

    fn unsupported_unary(&self, operator: &str) -> PebbleError {
        self.error(
            self.span_or_default(),
            format!("Unsupported operation '{}' on {}", operator, self.type_name()),
        )
    }

    fn number_error(&self, error: NumberError, operator: &str, other: &Value) -> PebbleError {
        match error {
            NumberError::Null => self.error(
                self.operand_span(other),
                format!("Unsupported operation '{}' on NULL", operator),
            ),
            NumberError::Overflow => {
                self.error(self.operand_span(other), "Integer overflow".to_string())
            }
        }
    }

    fn arithmetic(
        &self,
        other: &Value,
        operator: &str,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Value, PebbleError> {
        match (&self.kind, &other.kind) {
            (ValueKind::Number(a), ValueKind::Number(b)) => a
                .combine(*b, int_op, float_op)
                .map(|n| self.derive(ValueKind::Number(n)))
                .map_err(|e| self.number_error(e, operator, other)),
            _ => Err(self.unsupported(operator, other)),
        }
    }

    /// Applies `op` to every element of a list with the scalar `other`.
    fn broadcast(
        &self,
        elements: &[Value],
        other: &Value,
        op: fn(&Value, &Value) -> Result<Value, PebbleError>,
    ) -> Result<Value, PebbleError> {
        let result = elements
            .iter()
            .map(|element| op(element, other))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.derive(ValueKind::List(result)))
    }

    /// Combines two lists pairwise; both must have the same length.
    fn zip_with(
        &self,
        left: &[Value],
        right: &[Value],
        other: &Value,
        verb: &str,
        op: fn(&Value, &Value) -> Result<Value, PebbleError>,
    ) -> Result<Value, PebbleError> {
        if left.len() != right.len() {
            return Err(self.error(
                self.operand_span(other),
                format!("Two lists must be of the same size when {} together", verb),
            ));
        }
        let result = left
            .iter()
            .zip(right)
            .map(|(a, b)| op(a, b))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.derive(ValueKind::List(result)))
    }

    pub fn add(&self, other: &Value) -> Result<Value, PebbleError> {
        match (&self.kind, &other.kind) {
            (ValueKind::String(_), _) => self.concat(other),
            (ValueKind::List(elements), ValueKind::Number(_)) => {
                self.broadcast(elements, other, Value::add)
            }
            (ValueKind::List(left), ValueKind::List(right)) => {
                self.zip_with(left, right, other, "adding", Value::add)
            }
            _ => self.arithmetic(other, "+", i64::checked_add, |a, b| a + b),
        }
    }

    pub fn sub(&self, other: &Value) -> Result<Value, PebbleError> {
        match (&self.kind, &other.kind) {
            (
                ValueKind::String(text),
                ValueKind::String(_) | ValueKind::Number(_) | ValueKind::List(_),
            ) => Ok(self.derive(ValueKind::String(remove_occurrences(
                text,
                &other.to_string(),
            )))),
            (ValueKind::List(elements), ValueKind::Number(_)) => {
                self.broadcast(elements, other, Value::sub)
            }
            (ValueKind::List(left), ValueKind::List(right)) => {
                self.zip_with(left, right, other, "subtracting", Value::sub)
            }
            _ => self.arithmetic(other, "-", i64::checked_sub, |a, b| a - b),
        }
    }

    pub fn mul(&self, other: &Value) -> Result<Value, PebbleError> {
        match (&self.kind, &other.kind) {
            (ValueKind::String(text), ValueKind::Number(count)) => match count.as_integer() {
                Some(count) => {
                    let count = usize::try_from(count.max(0)).unwrap_or(usize::MAX);
                    match text.len().checked_mul(count) {
                        Some(len) if len <= MAX_STRING_LEN => {
                            Ok(self.derive(ValueKind::String(text.repeat(count))))
                        }
                        _ => Err(self.error(
                            self.operand_span(other),
                            "Repeat count too large".to_string(),
                        )),
                    }
                }
                None => Err(self.unsupported("*", other)),
            },
            _ => self.arithmetic(other, "*", i64::checked_mul, |a, b| a * b),
        }
    }

    fn check_divisor(&self, other: &Value) -> Result<(), PebbleError> {
        match &other.kind {
            ValueKind::Number(n) if n.is_zero() => Err(self.error(
                other.span_or_default(),
                "Division by zero".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn div(&self, other: &Value) -> Result<Value, PebbleError> {
        self.check_divisor(other)?;
        match (&self.kind, &other.kind) {
            (ValueKind::Number(a), ValueKind::Number(b)) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => Ok(self.derive(ValueKind::Number(Number::Float(a / b)))),
                _ => Err(self.number_error(NumberError::Null, "/", other)),
            },
            _ => Err(self.unsupported("/", other)),
        }
    }

    pub fn modulo(&self, other: &Value) -> Result<Value, PebbleError> {
        self.check_divisor(other)?;
        match (&self.kind, &other.kind) {
            (ValueKind::Number(a), ValueKind::Number(b)) => a
                .floor_mod(*b)
                .map(|n| self.derive(ValueKind::Number(n)))
                .map_err(|e| self.number_error(e, "%", other)),
            _ => Err(self.unsupported("%", other)),
        }
    }

    /// `..`: strings stringify the other operand, lists append it.
    pub fn concat(&self, other: &Value) -> Result<Value, PebbleError> {
        match (&self.kind, &other.kind) {
            (
                ValueKind::String(text),
                ValueKind::String(_) | ValueKind::Number(_) | ValueKind::List(_),
            ) => Ok(self.derive(ValueKind::String(format!("{}{}", text, other)))),
            (ValueKind::List(left), ValueKind::List(right)) => {
                let mut elements = left.clone();
                elements.extend(right.iter().cloned());
                Ok(self.derive(ValueKind::List(elements)))
            }
            (ValueKind::List(left), ValueKind::Number(_) | ValueKind::String(_)) => {
                let mut elements = left.clone();
                elements.push(other.clone());
                Ok(self.derive(ValueKind::List(elements)))
            }
            _ => Err(self.unsupported("..", other)),
        }
    }

    /// Structural equality; `None` when the two kinds cannot be compared.
    fn equals(&self, other: &Value) -> Option<bool> {
        match (&self.kind, &other.kind) {
            (ValueKind::Number(Number::Null), ValueKind::Number(b)) => Some(*b == Number::Null),
            (ValueKind::Number(_), ValueKind::Number(Number::Null)) => Some(false),
            (ValueKind::Number(a), ValueKind::Number(b)) => Some(a.as_f64() == b.as_f64()),
            (ValueKind::String(a), ValueKind::String(b)) => Some(a == b),
            (ValueKind::List(a), ValueKind::List(b)) => Some(
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y) == Some(true)),
            ),
            _ => None,
        }
    }

    pub fn compare_eq(&self, other: &Value) -> Result<Value, PebbleError> {
        match self.equals(other) {
            Some(equal) => Ok(self.derive(Value::boolean(equal).kind)),
            None => Err(self.unsupported("==", other)),
        }
    }

    pub fn compare_neq(&self, other: &Value) -> Result<Value, PebbleError> {
        match self.equals(other) {
            Some(equal) => Ok(self.derive(Value::boolean(!equal).kind)),
            None => Err(self.unsupported("!=", other)),
        }
    }

    fn ordering(
        &self,
        other: &Value,
        operator: &str,
        test: fn(f64, f64) -> bool,
    ) -> Result<Value, PebbleError> {
        match (&self.kind, &other.kind) {
            (ValueKind::Number(a), ValueKind::Number(b)) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => Ok(self.derive(Value::boolean(test(a, b)).kind)),
                _ => Err(self.number_error(NumberError::Null, operator, other)),
            },
            _ => Err(self.unsupported(operator, other)),
        }
    }

    pub fn compare_lt(&self, other: &Value) -> Result<Value, PebbleError> {
        self.ordering(other, "<", |a, b| a < b)
    }

    pub fn compare_gt(&self, other: &Value) -> Result<Value, PebbleError> {
        self.ordering(other, ">", |a, b| a > b)
    }

    pub fn compare_lte(&self, other: &Value) -> Result<Value, PebbleError> {
        self.ordering(other, "<=", |a, b| a <= b)
    }

    pub fn compare_gte(&self, other: &Value) -> Result<Value, PebbleError> {
        self.ordering(other, ">=", |a, b| a >= b)
    }

    pub fn compare_and(&self, other: &Value) -> Result<Value, PebbleError> {
        match (&self.kind, &other.kind) {
            (ValueKind::Number(a), ValueKind::Number(b)) => {
                Ok(self.derive(Value::boolean(a.is_truthy() && b.is_truthy()).kind))
            }
            _ => Err(self.unsupported("&&", other)),
        }
    }

    pub fn compare_or(&self, other: &Value) -> Result<Value, PebbleError> {
        match (&self.kind, &other.kind) {
            (ValueKind::Number(a), ValueKind::Number(b)) => {
                Ok(self.derive(Value::boolean(a.is_truthy() || b.is_truthy()).kind))
            }
            _ => Err(self.unsupported("||", other)),
        }
    }

    /// `self in other`: list membership or substring search.
    pub fn contained_in(&self, other: &Value) -> Result<Value, PebbleError> {
        match (&self.kind, &other.kind) {
            (_, ValueKind::List(elements)) => {
                let found = elements.iter().any(|e| self.equals(e) == Some(true));
                Ok(self.derive(Value::boolean(found).kind))
            }
            (ValueKind::String(needle), ValueKind::String(haystack)) => {
                Ok(self.derive(Value::boolean(haystack.contains(needle.as_str())).kind))
            }
            _ => Err(self.unsupported("in", other)),
        }
    }

    pub fn unary_not(&self) -> Result<Value, PebbleError> {
        match &self.kind {
            ValueKind::Number(n) => Ok(self.derive(Value::boolean(!n.is_truthy()).kind)),
            _ => Err(self.unsupported_unary("!")),
        }
    }

    pub fn length(&self) -> Result<Value, PebbleError> {
        let length = match &self.kind {
            ValueKind::Number(n) => n.length(),
            ValueKind::String(s) => s.chars().count(),
            ValueKind::List(l) => l.len(),
            _ => return Err(self.unsupported_unary("#")),
        };
        Ok(self.derive(ValueKind::Number(Number::Int(length as i64))))
    }

    /// Element `index` of a String or List; out-of-range on either side is an error.
    pub fn index(&self, index: &Value, span: &Span) -> Result<Value, PebbleError> {
        let length = match &self.kind {
            ValueKind::String(s) => s.chars().count(),
            ValueKind::List(l) => l.len(),
            _ => {
                return Err(self.error(
                    span.clone(),
                    format!("Variable '{}' does not support member expression.", self),
                ))
            }
        };

        let position = match &index.kind {
            ValueKind::Number(n) => n.as_integer().ok_or_else(|| {
                self.error(span.clone(), "Index must be an integer".to_string())
            })?,
            _ => {
                return Err(self.error(
                    span.clone(),
                    format!("Index must be a Number, not {}", index.type_name()),
                ))
            }
        };

        if position < 0 || position as usize >= length {
            return Err(self.error(span.clone(), "Index out of range".to_string()));
        }

        let element = match &self.kind {
            ValueKind::String(s) => s
                .chars()
                .nth(position as usize)
                .map(|c| self.derive(ValueKind::String(c.to_string()))),
            ValueKind::List(l) => l.get(position as usize).cloned(),
            _ => None,
        };
        element.ok_or_else(|| self.error(span.clone(), "Index out of range".to_string()))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ValueKind::Number(n) => write!(f, "{}", n),
            ValueKind::String(s) => write!(f, "{}", s),
            ValueKind::List(l) => {
                write!(f, "[")?;
                for (i, item) in l.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            ValueKind::Function(function) => write!(f, "<Function {}>", function.name),
            ValueKind::BuiltIn(builtin) => write!(f, "<Built-in function {}>", builtin.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_keep_a_decimal_part() {
        assert_eq!(format_float(2.0), "2.0");
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(1e20), "1e+20");
        assert_eq!(format_float(-3.0), "-3.0");
    }

    #[test]
    fn removing_occurrences_scans_left_to_right() {
        assert_eq!(remove_occurrences("ab", "a"), "b");
        assert_eq!(remove_occurrences("abcab", "ab"), "c");
        assert_eq!(remove_occurrences("hello", "z"), "hello");
        assert_eq!(remove_occurrences("aaa", "aa"), "a");
    }

    #[test]
    fn removing_everything_falls_back_to_the_original() {
        assert_eq!(remove_occurrences("aaa", "a"), "aaa");
        assert_eq!(remove_occurrences("abab", "ab"), "abab");
    }

    #[test]
    fn number_length_ignores_the_decimal_point() {
        assert_eq!(Number::Int(12345).length(), 5);
        assert_eq!(Number::Int(-12).length(), 3);
        assert_eq!(Number::Float(2.5).length(), 2);
    }

    #[test]
    fn modulo_takes_the_sign_of_the_divisor() {
        let result = Value::int(-7).modulo(&Value::int(3)).unwrap();
        assert_eq!(result.to_string(), "2");
        let result = Value::int(7).modulo(&Value::int(-3)).unwrap();
        assert_eq!(result.to_string(), "-2");
    }

    #[test]
    fn list_broadcast_dispatches_per_element() {
        let list = Value::list(vec![Value::int(1), Value::string("a"), Value::list(vec![Value::int(2)])]);
        let result = list.add(&Value::int(10)).unwrap();
        assert_eq!(result.to_string(), "[11, a10, [12]]");
    }

    #[test]
    fn mismatched_list_lengths_are_an_error() {
        let left = Value::list(vec![Value::int(1), Value::int(2)]);
        let right = Value::list(vec![Value::int(1)]);
        let error = left.add(&right).unwrap_err();
        assert!(error.message.contains("same size"));
    }

    #[test]
    fn concat_appends_scalars_to_lists() {
        let list = Value::list(vec![Value::int(1)]);
        let result = list.concat(&Value::string("x")).unwrap();
        assert_eq!(result.to_string(), "[1, x]");
    }

    #[test]
    fn string_repetition_and_negation() {
        let text = Value::string("ab");
        assert_eq!(text.mul(&Value::int(3)).unwrap().to_string(), "ababab");
        assert_eq!(text.mul(&Value::int(-1)).unwrap().to_string(), "");
        assert_eq!(text.mul(&Value::int(0)).unwrap().to_string(), "");
    }

    #[test]
    fn oversized_repetition_is_an_error() {
        let text = Value::string("ab");
        let error = text.mul(&Value::int(i64::MAX)).unwrap_err();
        assert_eq!(error.message, "Repeat count too large");
        let limit = (MAX_STRING_LEN / 2 + 1) as i64;
        assert!(text.mul(&Value::int(limit)).is_err());
    }

    #[test]
    fn unsupported_pairs_are_typed_errors() {
        let error = Value::int(1).add(&Value::string("a")).unwrap_err();
        assert_eq!(
            error.message,
            "Unsupported operation '+' between Number and String"
        );
    }
}
