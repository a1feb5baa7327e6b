use crate::ast::{AssignOp, BinaryOp, DeclarationKind, Expr, Program, Stmt, UnaryOp, UpdateOp};
use crate::builtins::Builtin;
use crate::error::PebbleError;
use crate::position::Span;
use crate::scope::{Context, Scope, Symbol, SymbolKind};
use crate::value::{Function, FunctionBody, Value, ValueKind};
use log::debug;
use std::io::{self, BufRead, BufReader, Write};
use std::rc::Rc;

/// Deepest chain of nested calls before evaluation gives up.
const MAX_CALL_DEPTH: usize = 512;

/// Remaining host stack that triggers growth before evaluating an expression.
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each freshly allocated stack segment.
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// How a statement finished: normally (maybe with a value) or via `ret`.
#[derive(Debug)]
pub enum Flow {
    Normal(Option<Value>),
    Return(Value),
}

pub struct Evaluator {
    globals: Scope,
    output: Box<dyn Write>,
    input: Box<dyn BufRead>,
}

impl Evaluator {
    /// An evaluator over `globals` that talks to stdin and stdout.
    pub fn new(globals: Scope) -> Self {
        Self::with_io(
            globals,
            Box::new(io::stdout()),
            Box::new(BufReader::new(io::stdin())),
        )
    }

    pub fn with_io(globals: Scope, output: Box<dyn Write>, input: Box<dyn BufRead>) -> Self {
        Self {
            globals,
            output,
            input,
        }
    }

    pub fn globals(&self) -> &Scope {
        &self.globals
    }

    /// Runs every top-level statement and yields the value of the last one, if it had one.
    pub fn evaluate_program(&mut self, program: &Program) -> Result<Option<Value>, PebbleError> {
        let context = Rc::new(Context::main(self.globals.clone()));
        match self.execute_block(&program.statements, &context)? {
            Flow::Normal(value) => Ok(value),
            Flow::Return(value) => Ok(Some(value)),
        }
    }

    /// Runs statements in order. Stops at the first `ret`; otherwise the result is
    /// the value of the last statement.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        context: &Rc<Context>,
    ) -> Result<Flow, PebbleError> {
        let mut last = None;
        for statement in statements {
            match self.execute_statement(statement, context)? {
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal(value) => last = value,
            }
        }
        Ok(Flow::Normal(last))
    }

    pub fn execute_statement(
        &mut self,
        stmt: &Stmt,
        context: &Rc<Context>,
    ) -> Result<Flow, PebbleError> {
        match stmt {
            Stmt::Expression { expr, .. } => {
                let value = self.evaluate_expression(expr, context)?;
                Ok(Flow::Normal(Some(value)))
            }
            Stmt::VariableDeclaration {
                kind, declarators, ..
            } => {
                let symbol_kind = match kind {
                    DeclarationKind::Let => SymbolKind::Let,
                    DeclarationKind::Const => SymbolKind::Const,
                };
                for declarator in declarators {
                    let value = self.evaluate_expression(&declarator.init, context)?;
                    context
                        .scope
                        .define(&declarator.name, Symbol::new(symbol_kind, value));
                }
                Ok(Flow::Normal(None))
            }
            Stmt::Function {
                name,
                params,
                body,
                span,
            } => {
                let function = Function {
                    name: name.clone(),
                    params: params.clone(),
                    body: FunctionBody::Block(body.clone()),
                    scope: context.scope.clone(),
                };
                let value = Value::function(function).with_span(span.clone());
                context
                    .scope
                    .define(name, Symbol::new(SymbolKind::Function, value));
                Ok(Flow::Normal(None))
            }
            Stmt::If {
                test,
                body,
                alternative,
                ..
            } => {
                if self.evaluate_expression(test, context)?.is_truthy() {
                    self.execute_block(&body.statements, context)
                } else if let Some(alternative) = alternative {
                    self.execute_statement(alternative, context)
                } else {
                    Ok(Flow::Normal(None))
                }
            }
            Stmt::While { test, body, .. } => {
                let mut last = None;
                while self.evaluate_expression(test, context)?.is_truthy() {
                    match self.execute_block(&body.statements, context)? {
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal(value) => last = value,
                    }
                }
                Ok(Flow::Normal(last))
            }
            Stmt::For {
                init,
                iterable,
                body,
                ..
            } => {
                let start = self.evaluate_expression(&init.init, context)?;
                context
                    .scope
                    .define(&init.name, Symbol::new(SymbolKind::Let, start));

                let sequence = self.evaluate_expression(iterable, context)?;
                let items = match &sequence.kind {
                    ValueKind::List(elements) => elements.clone(),
                    ValueKind::String(text) => {
                        text.chars().map(|c| Value::string(c.to_string())).collect()
                    }
                    _ => {
                        return Err(PebbleError::runtime_error_with_help(
                            iterable.span().clone(),
                            format!("{} is not iterable", sequence.type_name()),
                            "Loop over a List or a String, e.g. for (let i : range(10)) { ... }"
                                .to_string(),
                            Some(context.clone()),
                        ))
                    }
                };

                let mut last = None;
                for item in items {
                    context
                        .scope
                        .define(&init.name, Symbol::new(SymbolKind::Let, item));
                    match self.execute_block(&body.statements, context)? {
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal(value) => last = value,
                    }
                }
                Ok(Flow::Normal(last))
            }
            Stmt::Block(block) => self.execute_block(&block.statements, context),
            Stmt::Return { value, .. } => {
                let value = self.evaluate_expression(value, context)?;
                Ok(Flow::Return(value))
            }
            Stmt::Put { arguments, span } => {
                let mut line = String::new();
                for argument in arguments {
                    line.push_str(&self.evaluate_expression(argument, context)?.to_string());
                }
                writeln!(self.output, "{}", line).map_err(|e| {
                    PebbleError::runtime_error(
                        span.clone(),
                        format!("Could not write output: {}", e),
                        Some(context.clone()),
                    )
                })?;
                Ok(Flow::Normal(None))
            }
        }
    }

    pub fn evaluate_expression(
        &mut self,
        expr: &Expr,
        context: &Rc<Context>,
    ) -> Result<Value, PebbleError> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.evaluate_expression_inner(expr, context)
        })
    }

    fn evaluate_expression_inner(
        &mut self,
        expr: &Expr,
        context: &Rc<Context>,
    ) -> Result<Value, PebbleError> {
        match expr {
            Expr::Identifier { name, span } => self.lookup(name, span, context),
            Expr::Literal { value, span } => Ok(Value::string(value.clone())
                .with_span(span.clone())
                .with_context(context)),
            Expr::Number { value, span } => Ok(Value::number(*value)
                .with_span(span.clone())
                .with_context(context)),
            Expr::InlineFunction {
                name,
                params,
                body,
                span,
                ..
            } => {
                let function = Function {
                    name: name.clone().unwrap_or_else(|| "<inline>".to_string()),
                    params: params.clone(),
                    body: FunctionBody::Expr(body.clone()),
                    scope: context.scope.clone(),
                };
                Ok(Value::function(function)
                    .with_span(span.clone())
                    .with_context(context))
            }
            Expr::Unary {
                operator,
                operand,
                span,
            } => {
                let value = self.evaluate_expression(operand, context)?;
                let result = match operator {
                    UnaryOp::Negate => {
                        value.mul(&Value::int(-1).with_span(span.clone()))?
                    }
                    UnaryOp::Plus => value,
                    UnaryOp::Not => value.unary_not()?,
                    UnaryOp::Length => value.length()?,
                };
                Ok(result.with_span(span.clone()).with_context(context))
            }
            Expr::Binary {
                left,
                operator,
                right,
                span,
            } => {
                let left = self.evaluate_expression(left, context)?;
                let right = self.evaluate_expression(right, context)?;
                let result = match operator {
                    BinaryOp::Add => left.add(&right)?,
                    BinaryOp::Subtract => left.sub(&right)?,
                    BinaryOp::Multiply => left.mul(&right)?,
                    BinaryOp::Divide => left.div(&right)?,
                    BinaryOp::Modulo => left.modulo(&right)?,
                    BinaryOp::Concat => left.concat(&right)?,
                    BinaryOp::Equal => left.compare_eq(&right)?,
                    BinaryOp::NotEqual => left.compare_neq(&right)?,
                    BinaryOp::Less => left.compare_lt(&right)?,
                    BinaryOp::Greater => left.compare_gt(&right)?,
                    BinaryOp::LessEqual => left.compare_lte(&right)?,
                    BinaryOp::GreaterEqual => left.compare_gte(&right)?,
                    BinaryOp::And => left.compare_and(&right)?,
                    BinaryOp::Or => left.compare_or(&right)?,
                    BinaryOp::In => left.contained_in(&right)?,
                };
                Ok(result.with_span(span.clone()).with_context(context))
            }
            Expr::Update {
                operator,
                target,
                span,
            } => {
                let name = target_name(target)?;
                let current = self.lookup(name, target.span(), context)?;
                if !matches!(current.kind, ValueKind::Number(_)) {
                    return Err(PebbleError::runtime_error(
                        span.clone(),
                        format!("Variable '{}' does not support update expression", name),
                        Some(context.clone()),
                    ));
                }
                let step = Value::int(1).with_span(span.clone());
                let updated = match operator {
                    UpdateOp::Increment => current.add(&step)?,
                    UpdateOp::Decrement => current.sub(&step)?,
                }
                .with_span(span.clone());
                context.scope.update(name, updated.clone(), span, context)?;
                Ok(updated)
            }
            Expr::Assignment {
                target,
                operator,
                value,
                span,
            } => {
                let name = target_name(target)?;
                let updated = if *operator == AssignOp::Assign {
                    self.evaluate_expression(value, context)?
                } else {
                    let current = self.lookup(name, target.span(), context)?;
                    let value = self.evaluate_expression(value, context)?;
                    let result = match operator {
                        AssignOp::Add => current.add(&value)?,
                        AssignOp::Subtract => current.sub(&value)?,
                        AssignOp::Multiply => current.mul(&value)?,
                        AssignOp::Divide => current.div(&value)?,
                        AssignOp::Modulo => current.modulo(&value)?,
                        AssignOp::Assign => value,
                    };
                    result.with_span(span.clone())
                };
                context.scope.update(name, updated.clone(), span, context)?;
                Ok(updated)
            }
            Expr::Call { callee, args, span } => {
                let callee = self.evaluate_expression(callee, context)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate_expression(arg, context)?);
                }
                let result = self.call(&callee, values, span, context)?;
                Ok(result.with_span(span.clone()).with_context(context))
            }
            Expr::Member {
                object,
                index,
                span,
            } => {
                let object = self.evaluate_expression(object, context)?;
                let index = self.evaluate_expression(index, context)?;
                let element = object.index(&index, span)?;
                Ok(element.with_span(span.clone()).with_context(context))
            }
            Expr::List { elements, span } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.evaluate_expression(element, context)?);
                }
                Ok(Value::list(values)
                    .with_span(span.clone())
                    .with_context(context))
            }
        }
    }

    /// Resolves `name` through the active scope chain, falling back to the built-in table.
    fn lookup(&self, name: &str, span: &Span, context: &Rc<Context>) -> Result<Value, PebbleError> {
        match context.scope.get(name) {
            Some(Symbol {
                value: Some(value), ..
            }) => Ok(value.with_span(span.clone()).with_context(context)),
            Some(Symbol { value: None, .. }) => Err(PebbleError::runtime_error(
                span.clone(),
                format!("Variable '{}' accessed before initialization", name),
                Some(context.clone()),
            )),
            None => match Builtin::from_name(name) {
                Some(builtin) => Ok(Value::builtin(builtin)
                    .with_span(span.clone())
                    .with_context(context)),
                None => Err(PebbleError::runtime_error(
                    span.clone(),
                    format!("Unknown Variable or Function '{}'", name),
                    Some(context.clone()),
                )),
            },
        }
    }

    /// Invokes a function value in a fresh call frame chained to `caller`.
    pub fn call(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        span: &Span,
        caller: &Rc<Context>,
    ) -> Result<Value, PebbleError> {
        let (name, params, scope) = match &callee.kind {
            ValueKind::Function(function) => (
                function.name.clone(),
                function.params.len(),
                function.scope.child(),
            ),
            ValueKind::BuiltIn(builtin) => (
                builtin.name().to_string(),
                builtin.params().len(),
                caller.scope.child(),
            ),
            _ => {
                return Err(PebbleError::runtime_error(
                    span.clone(),
                    format!("'{}' is not callable", callee),
                    Some(caller.clone()),
                ))
            }
        };

        let context = Rc::new(Context::call(
            &name,
            caller,
            span.start.clone(),
            scope.clone(),
        ));

        if context.depth() > MAX_CALL_DEPTH {
            return Err(PebbleError::runtime_error(
                span.clone(),
                "Maximum recursion depth exceeded".to_string(),
                Some(caller.clone()),
            ));
        }
        check_arity(&name, params, args.len(), span, &context)?;

        match &callee.kind {
            ValueKind::Function(function) => {
                debug!("calling {} with {} argument(s)", name, args.len());
                for (param, arg) in function.params.iter().zip(args) {
                    scope.define(param, Symbol::new(SymbolKind::Let, arg));
                }
                let result = match &function.body {
                    FunctionBody::Block(body) => {
                        match self.execute_block(&body.statements, &context)? {
                            Flow::Return(value) | Flow::Normal(Some(value)) => value,
                            Flow::Normal(None) => Value::null(),
                        }
                    }
                    FunctionBody::Expr(body) => self.evaluate_expression(body, &context)?,
                };
                Ok(result)
            }
            ValueKind::BuiltIn(builtin) => {
                builtin.call(&args, &mut *self.input, &mut *self.output, span, &context)
            }
            _ => Ok(Value::null()),
        }
    }
}

fn check_arity(
    name: &str,
    expected: usize,
    given: usize,
    span: &Span,
    context: &Rc<Context>,
) -> Result<(), PebbleError> {
    if given > expected {
        return Err(PebbleError::runtime_error(
            span.clone(),
            format!(
                "Function '{}' requires {} arguments, {} more provided",
                name,
                expected,
                given - expected
            ),
            Some(context.clone()),
        ));
    }
    if given < expected {
        return Err(PebbleError::runtime_error(
            span.clone(),
            format!(
                "Function '{}' requires {} arguments, {} provided, needs {} more arguments",
                name,
                expected,
                given,
                expected - given
            ),
            Some(context.clone()),
        ));
    }
    Ok(())
}

fn target_name(target: &Expr) -> Result<&str, PebbleError> {
    match target {
        Expr::Identifier { name, .. } => Ok(name),
        other => Err(PebbleError::runtime_error(
            other.span().clone(),
            "Invalid assignment target".to_string(),
            None,
        )),
    }
}
