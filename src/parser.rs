use crate::ast::{
    AssignOp, BinaryOp, Block, DeclarationKind, Declarator, Expr, Program, Stmt, UnaryOp,
    UpdateOp,
};
use crate::error::PebbleError;
use crate::lexer::{Literal, Token, TokenType};
use crate::position::Span;
use crate::scope::{Scope, Symbol, SymbolKind};
use crate::value::{Function, FunctionBody, Number, Value};
use std::rc::Rc;

/// Recursive-descent parser. Declarations are recorded in `scope` as they are
/// parsed, so the tables it builds describe the program before it runs.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    scope: Scope,
    function_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, scope: Scope) -> Self {
        Self {
            tokens,
            current: 0,
            scope,
            function_depth: 0,
        }
    }

    pub fn parse(&mut self) -> Result<Program, PebbleError> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            statements.push(self.statement()?);
        }

        Ok(Program { statements })
    }

    fn statement(&mut self) -> Result<Stmt, PebbleError> {
        match self.peek().token_type {
            TokenType::Let | TokenType::Const => self.variable_declaration(),
            TokenType::Func => self.function_declaration(),
            TokenType::Ret => self.return_statement(),
            TokenType::If => self.if_statement(),
            TokenType::For => self.for_statement(),
            TokenType::While => self.while_statement(),
            TokenType::Puts => self.puts_statement(),
            TokenType::LeftBrace => Ok(Stmt::Block(self.block()?)),
            TokenType::Identifier => self.identifier_statement(),
            _ => self.expression_statement(),
        }
    }

    fn block(&mut self) -> Result<Block, PebbleError> {
        let start = self
            .consume_with_help(
                TokenType::LeftBrace,
                "Expected '{'",
                "Bodies of 'if', 'for', 'while' and 'func' are enclosed in braces: { ... }"
                    .to_string(),
            )?
            .pos_start
            .clone();

        let mut statements = Vec::new();
        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            statements.push(self.statement()?);
        }

        let end = self
            .consume_with_help(
                TokenType::RightBrace,
                "Expected '}' after block",
                "Block statements must be closed with '}' after the opening '{'.".to_string(),
            )?
            .pos_end
            .clone();

        Ok(Block {
            statements,
            span: Span::new(start, end),
        })
    }

    /// `let a, b = 1, 2;` / `const c = 3;` / `let z;`
    fn variable_declaration(&mut self) -> Result<Stmt, PebbleError> {
        let keyword = self.advance().clone();
        let (kind, symbol_kind) = match keyword.token_type {
            TokenType::Const => (DeclarationKind::Const, SymbolKind::Const),
            _ => (DeclarationKind::Let, SymbolKind::Let),
        };

        let mut names = Vec::new();
        loop {
            let name = self.consume_with_help(
                TokenType::Identifier,
                "Expected identifier",
                format!("Declarations name their variables: {} x = 1;", keyword.lexeme),
            )?;
            names.push((name.lexeme.clone(), name.span()));
            if !self.match_types(&[TokenType::Comma]) {
                break;
            }
        }

        let mut values = Vec::new();
        if self.match_types(&[TokenType::Equal]) {
            loop {
                values.push(self.expression()?);
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        if values.len() > names.len() {
            return Err(PebbleError::syntax_error_with_help(
                values[names.len()].span().clone(),
                "Too many values to unpack".to_string(),
                format!(
                    "{} names are declared but {} values are given",
                    names.len(),
                    values.len()
                ),
            ));
        }

        let end = self.consume(TokenType::Semicolon, "Expected ';'")?.pos_end.clone();

        let mut declarators = Vec::new();
        for (i, (name, name_span)) in names.into_iter().enumerate() {
            let init = match values.get(i).or_else(|| values.last()) {
                Some(value) => name_inline_function(value.clone(), &name),
                None => Expr::Number {
                    value: Number::Int(0),
                    span: name_span.clone(),
                },
            };
            self.scope.declare(&name, symbol_kind);
            declarators.push(Declarator {
                span: name_span.to(init.span()),
                name,
                name_span,
                init,
            });
        }

        Ok(Stmt::VariableDeclaration {
            kind,
            declarators,
            span: Span::new(keyword.pos_start, end),
        })
    }

    /// `func name(a, b) { ... }`. The function is bound as soon as it is parsed.
    fn function_declaration(&mut self) -> Result<Stmt, PebbleError> {
        let start = self.advance().pos_start.clone();
        let name = self
            .consume_with_help(
                TokenType::Identifier,
                "Expected function name",
                "Functions are declared as: func name(a, b) { ... }".to_string(),
            )?
            .lexeme
            .clone();

        self.consume(TokenType::LeftParen, "Expected '('")?;
        let params = self.parameters()?;

        let body_scope = self.scope.child();
        for param in &params {
            body_scope.declare(param, SymbolKind::Let);
        }

        self.function_depth += 1;
        let body = self.in_scope(body_scope, |parser| parser.block());
        self.function_depth -= 1;
        let body = Rc::new(body?);

        let function = Function {
            name: name.clone(),
            params: params.clone(),
            body: FunctionBody::Block(body.clone()),
            scope: self.scope.clone(),
        };
        self.scope
            .define(&name, Symbol::new(SymbolKind::Function, Value::function(function)));

        let span = Span::new(start, body.span.end.clone());
        Ok(Stmt::Function {
            name,
            params,
            body,
            span,
        })
    }

    fn return_statement(&mut self) -> Result<Stmt, PebbleError> {
        let keyword = self.advance().clone();
        if self.function_depth == 0 {
            return Err(PebbleError::syntax_error_with_help(
                keyword.span(),
                "'ret' outside of a function".to_string(),
                "'ret' can only be used inside a 'func' body".to_string(),
            ));
        }

        let value = if self.check(&TokenType::Semicolon) {
            Expr::Number {
                value: Number::Null,
                span: keyword.span(),
            }
        } else {
            self.expression()?
        };
        let end = self.consume(TokenType::Semicolon, "Expected ';'")?.pos_end.clone();

        Ok(Stmt::Return {
            value,
            span: Span::new(keyword.pos_start, end),
        })
    }

    /// `if (test) { ... } elif (test) { ... } else { ... }`
    fn if_statement(&mut self) -> Result<Stmt, PebbleError> {
        let start = self.advance().pos_start.clone();

        self.consume_with_help(
            TokenType::LeftParen,
            "Expected '('",
            "If statements require parentheses around the condition: if (condition) { ... }"
                .to_string(),
        )?;
        let test = self.expression()?;
        self.consume_with_help(
            TokenType::RightParen,
            "Expected ')'",
            "If conditions must be enclosed in parentheses: if (condition) { ... }".to_string(),
        )?;
        let body = self.block()?;

        let alternative = if self.check(&TokenType::Elif) {
            Some(Box::new(self.if_statement()?))
        } else if self.match_types(&[TokenType::Else]) {
            Some(Box::new(Stmt::Block(self.block()?)))
        } else {
            None
        };

        let end = match &alternative {
            Some(stmt) => stmt.span().end.clone(),
            None => body.span.end.clone(),
        };

        Ok(Stmt::If {
            test,
            body,
            alternative,
            span: Span::new(start, end),
        })
    }

    fn while_statement(&mut self) -> Result<Stmt, PebbleError> {
        let start = self.advance().pos_start.clone();

        self.consume(TokenType::LeftParen, "Expected '('")?;
        let test = self.expression()?;
        self.consume(TokenType::RightParen, "Expected ')'")?;
        let body = self.block()?;

        let span = Span::new(start, body.span.end.clone());
        Ok(Stmt::While { test, body, span })
    }

    /// `for (let x : iterable) { ... }`
    fn for_statement(&mut self) -> Result<Stmt, PebbleError> {
        let start = self.advance().pos_start.clone();

        self.consume(TokenType::LeftParen, "Expected '('")?;
        self.consume_with_help(
            TokenType::Let,
            "Expected 'let'",
            "For loops declare their variable: for (let x : range(10)) { ... }".to_string(),
        )?;
        let name_token = self.consume(TokenType::Identifier, "Expected identifier")?.clone();
        let name = name_token.lexeme.clone();
        let name_span = name_token.span();
        self.consume_with_help(
            TokenType::Colon,
            "Expected ':'",
            "For loops separate the variable from what it iterates with ':'".to_string(),
        )?;
        let iterable = self.expression()?;
        self.consume(TokenType::RightParen, "Expected ')'")?;

        self.scope.declare(&name, SymbolKind::Let);
        let body = self.block()?;

        let target = Expr::Identifier {
            name: name.clone(),
            span: name_span.clone(),
        };
        let update = Expr::Update {
            operator: UpdateOp::Increment,
            target: Box::new(target),
            span: name_span.clone(),
        };
        let init = Declarator {
            name,
            name_span: name_span.clone(),
            init: Expr::Number {
                value: Number::Int(0),
                span: name_span.clone(),
            },
            span: name_span,
        };

        let span = Span::new(start, body.span.end.clone());
        Ok(Stmt::For {
            init,
            iterable,
            update,
            body,
            span,
        })
    }

    /// `puts a, b;` or `puts(a, b);`
    fn puts_statement(&mut self) -> Result<Stmt, PebbleError> {
        let start = self.advance().pos_start.clone();

        if self.check(&TokenType::LeftParen) {
            let checkpoint = self.current;
            self.advance();
            if let Ok(arguments) = self.arguments() {
                if self.check(&TokenType::Semicolon) {
                    let end = self.advance().pos_end.clone();
                    return Ok(Stmt::Put {
                        arguments,
                        span: Span::new(start, end),
                    });
                }
            }
            // Not a bare argument list, e.g. `puts (1 + 2) * 3;`
            self.current = checkpoint;
        }

        let mut arguments = vec![self.expression()?];
        while self.match_types(&[TokenType::Comma]) {
            arguments.push(self.expression()?);
        }
        let end = self.consume(TokenType::Semicolon, "Expected ';'")?.pos_end.clone();

        Ok(Stmt::Put {
            arguments,
            span: Span::new(start, end),
        })
    }

    /// Statements starting with an identifier: assignment, `x++`/`x--`, or a plain expression.
    fn identifier_statement(&mut self) -> Result<Stmt, PebbleError> {
        let checkpoint = self.current;
        let target = self.postfix()?;

        let expr = if let Some(operator) = self.assignment_operator() {
            let operator_token = self.previous().clone();
            if !matches!(target, Expr::Identifier { .. }) {
                return Err(PebbleError::syntax_error_with_help(
                    operator_token.span(),
                    "Invalid assignment target".to_string(),
                    "Only variables can be assigned to: x = value;".to_string(),
                ));
            }
            let value = self.expression()?;
            let span = target.span().to(value.span());
            Expr::Assignment {
                target: Box::new(target),
                operator,
                value: Box::new(value),
                span,
            }
        } else if self.match_types(&[TokenType::PlusPlus, TokenType::MinusMinus]) {
            let operator_token = self.previous().clone();
            if !matches!(target, Expr::Identifier { .. }) {
                return Err(PebbleError::syntax_error(
                    operator_token.span(),
                    format!("'{}' can only be applied to a variable", operator_token.lexeme),
                ));
            }
            let operator = match operator_token.token_type {
                TokenType::PlusPlus => UpdateOp::Increment,
                _ => UpdateOp::Decrement,
            };
            let span = target.span().to(&operator_token.span());
            Expr::Update {
                operator,
                target: Box::new(target),
                span,
            }
        } else {
            self.current = checkpoint;
            self.expression()?
        };

        let end = self.consume(TokenType::Semicolon, "Expected ';'")?.pos_end.clone();
        let span = Span::new(expr.span().start.clone(), end);
        Ok(Stmt::Expression { expr, span })
    }

    fn assignment_operator(&mut self) -> Option<AssignOp> {
        let operator = match self.peek().token_type {
            TokenType::Equal => AssignOp::Assign,
            TokenType::PlusEqual => AssignOp::Add,
            TokenType::MinusEqual => AssignOp::Subtract,
            TokenType::StarEqual => AssignOp::Multiply,
            TokenType::SlashEqual => AssignOp::Divide,
            TokenType::PercentEqual => AssignOp::Modulo,
            _ => return None,
        };
        self.advance();
        Some(operator)
    }

    fn expression_statement(&mut self) -> Result<Stmt, PebbleError> {
        let expr = self.expression()?;
        let end = self.consume(TokenType::Semicolon, "Expected ';'")?.pos_end.clone();
        let span = Span::new(expr.span().start.clone(), end);
        Ok(Stmt::Expression { expr, span })
    }

    pub fn expression(&mut self) -> Result<Expr, PebbleError> {
        self.or()
    }

    fn or(&mut self) -> Result<Expr, PebbleError> {
        self.binary(&[(TokenType::OrOr, BinaryOp::Or)], Self::and)
    }

    fn and(&mut self) -> Result<Expr, PebbleError> {
        self.binary(&[(TokenType::AndAnd, BinaryOp::And)], Self::comparison)
    }

    fn comparison(&mut self) -> Result<Expr, PebbleError> {
        self.binary(
            &[
                (TokenType::In, BinaryOp::In),
                (TokenType::EqualEqual, BinaryOp::Equal),
                (TokenType::BangEqual, BinaryOp::NotEqual),
                (TokenType::Less, BinaryOp::Less),
                (TokenType::Greater, BinaryOp::Greater),
                (TokenType::LessEqual, BinaryOp::LessEqual),
                (TokenType::GreaterEqual, BinaryOp::GreaterEqual),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, PebbleError> {
        self.binary(
            &[
                (TokenType::DotDot, BinaryOp::Concat),
                (TokenType::Plus, BinaryOp::Add),
                (TokenType::Minus, BinaryOp::Subtract),
            ],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr, PebbleError> {
        self.binary(
            &[
                (TokenType::Star, BinaryOp::Multiply),
                (TokenType::Slash, BinaryOp::Divide),
                (TokenType::Percent, BinaryOp::Modulo),
            ],
            Self::unary,
        )
    }

    /// Left-associative fold of `operand (op operand)*`.
    fn binary(
        &mut self,
        operators: &[(TokenType, BinaryOp)],
        operand: fn(&mut Self) -> Result<Expr, PebbleError>,
    ) -> Result<Expr, PebbleError> {
        let mut expr = operand(self)?;

        while let Some(operator) = operators
            .iter()
            .find(|(token_type, _)| self.check(token_type))
            .map(|(_, operator)| *operator)
        {
            self.advance();
            let right = operand(self)?;
            let span = expr.span().to(right.span());
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
                span,
            };
        }

        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, PebbleError> {
        let operator = match self.peek().token_type {
            TokenType::Hash => UnaryOp::Length,
            TokenType::Plus => UnaryOp::Plus,
            TokenType::Minus => UnaryOp::Negate,
            TokenType::Bang => UnaryOp::Not,
            _ => return self.atom(),
        };

        let start = self.advance().pos_start.clone();
        let operand = self.unary()?;
        let end = operand.span().end.clone();

        Ok(Expr::Unary {
            operator,
            operand: Box::new(operand),
            span: Span::new(start, end),
        })
    }

    fn atom(&mut self) -> Result<Expr, PebbleError> {
        let token = self.peek().clone();

        match (&token.token_type, &token.literal) {
            (TokenType::Number, Literal::Number(value)) => {
                self.advance();
                Ok(Expr::Number {
                    value: *value,
                    span: token.span(),
                })
            }
            (TokenType::String, Literal::Text(value)) => {
                self.advance();
                Ok(Expr::Literal {
                    value: value.clone(),
                    span: token.span(),
                })
            }
            (TokenType::Inline, _) => self.inline_function(),
            (TokenType::Identifier, _) => self.postfix(),
            (TokenType::LeftParen, _) => {
                self.advance();
                let expr = self.expression()?;
                self.consume_with_help(
                    TokenType::RightParen,
                    "Expected ')'",
                    "Parenthesized expressions must be closed with ')'".to_string(),
                )?;
                Ok(expr)
            }
            (TokenType::LeftBracket, _) => self.list_literal(),
            (TokenType::Eof, _) => Err(PebbleError::syntax_error_with_help(
                self.error_span(),
                "Unexpected end of input".to_string(),
                "An expression was expected here".to_string(),
            )),
            _ => Err(PebbleError::syntax_error_with_help(
                token.span(),
                format!("Unexpected '{}'", token.lexeme),
                "Expected a number, string, identifier, list, '(' or 'inline'".to_string(),
            )),
        }
    }

    /// An identifier followed by any chain of `(args)` and `[index]`.
    fn postfix(&mut self) -> Result<Expr, PebbleError> {
        let name = self.consume(TokenType::Identifier, "Expected identifier")?.clone();
        let mut expr = Expr::Identifier {
            name: name.lexeme.clone(),
            span: name.span(),
        };

        loop {
            if self.match_types(&[TokenType::LeftParen]) {
                let args = self.arguments()?;
                let span = Span::new(expr.span().start.clone(), self.previous().pos_end.clone());
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    span,
                };
            } else if self.match_types(&[TokenType::LeftBracket]) {
                let index = self.expression()?;
                let end = self
                    .consume_with_help(
                        TokenType::RightBracket,
                        "Expected ']'",
                        "Indexing is written as name[index]".to_string(),
                    )?
                    .pos_end
                    .clone();
                let span = Span::new(expr.span().start.clone(), end);
                expr = Expr::Member {
                    object: Box::new(expr),
                    index: Box::new(index),
                    span,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    /// Comma-separated expressions up to and including the closing `)`.
    fn arguments(&mut self) -> Result<Vec<Expr>, PebbleError> {
        let mut args = Vec::new();

        if !self.check(&TokenType::RightParen) {
            loop {
                args.push(self.expression()?);
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        self.consume_with_help(
            TokenType::RightParen,
            "Expected ')'",
            "Function calls must be closed with ')' after the arguments. Example: f(a, b)"
                .to_string(),
        )?;
        Ok(args)
    }

    /// Parameter names up to and including the closing `)`.
    fn parameters(&mut self) -> Result<Vec<String>, PebbleError> {
        let mut params = Vec::new();

        if !self.check(&TokenType::RightParen) {
            loop {
                let param = self.consume(TokenType::Identifier, "Expected identifier")?;
                params.push(param.lexeme.clone());
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        self.consume(TokenType::RightParen, "Expected ')'")?;
        Ok(params)
    }

    /// `inline (a, b) -> a + b`
    fn inline_function(&mut self) -> Result<Expr, PebbleError> {
        let start = self.advance().pos_start.clone();
        self.consume_with_help(
            TokenType::LeftParen,
            "Expected '('",
            "Inline functions are written as: inline (a, b) -> a + b".to_string(),
        )?;
        let params = self.parameters()?;
        self.consume_with_help(
            TokenType::Arrow,
            "Expected '->'",
            "Inline functions are written as: inline (a, b) -> a + b".to_string(),
        )?;

        let scope = self.scope.child();
        for param in &params {
            scope.declare(param, SymbolKind::Let);
        }
        let body = self.in_scope(scope.clone(), |parser| parser.expression())?;
        let span = Span::new(start, body.span().end.clone());

        Ok(Expr::InlineFunction {
            name: None,
            params,
            body: Rc::new(body),
            scope,
            span,
        })
    }

    fn list_literal(&mut self) -> Result<Expr, PebbleError> {
        let start = self.advance().pos_start.clone();
        let mut elements = Vec::new();

        if !self.check(&TokenType::RightBracket) {
            loop {
                elements.push(self.expression()?);
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        let end = self
            .consume_with_help(
                TokenType::RightBracket,
                "Expected ']'",
                "List literals are closed with ']': [1, 2, 3]".to_string(),
            )?
            .pos_end
            .clone();

        Ok(Expr::List {
            elements,
            span: Span::new(start, end),
        })
    }

    /// Runs `f` with `scope` as the current table, restoring the previous one afterwards.
    fn in_scope<T>(
        &mut self,
        scope: Scope,
        f: impl FnOnce(&mut Self) -> Result<T, PebbleError>,
    ) -> Result<T, PebbleError> {
        let outer = std::mem::replace(&mut self.scope, scope);
        let result = f(self);
        self.scope = outer;
        result
    }

    fn match_types(&mut self, types: &[TokenType]) -> bool {
        for token_type in types {
            if self.check(token_type) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, token_type: &TokenType) -> bool {
        if self.is_at_end() {
            false
        } else {
            &self.peek().token_type == token_type
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    /// The unexpected token, or the end of the last real token when input ran out.
    fn error_span(&self) -> Span {
        if self.is_at_end() && self.current > 0 {
            let end = self.previous().pos_end.clone();
            Span::new(end.clone(), end)
        } else {
            self.peek().span()
        }
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> Result<&Token, PebbleError> {
        if self.check(&token_type) {
            Ok(self.advance())
        } else {
            Err(PebbleError::syntax_error(
                self.error_span(),
                message.to_string(),
            ))
        }
    }

    fn consume_with_help(
        &mut self,
        token_type: TokenType,
        message: &str,
        help: String,
    ) -> Result<&Token, PebbleError> {
        if self.check(&token_type) {
            Ok(self.advance())
        } else {
            Err(PebbleError::syntax_error_with_help(
                self.error_span(),
                message.to_string(),
                help,
            ))
        }
    }
}

/// Gives an anonymous `inline` function the name it is declared under.
fn name_inline_function(expr: Expr, declared_name: &str) -> Expr {
    match expr {
        Expr::InlineFunction {
            name: None,
            params,
            body,
            scope,
            span,
        } => Expr::InlineFunction {
            name: Some(declared_name.to_string()),
            params,
            body,
            scope,
            span,
        },
        other => other,
    }
}
