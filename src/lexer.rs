use crate::error::PebbleError;
use crate::position::{Position, Span};
use crate::value::Number;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Colon,
    Semicolon,
    Hash,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Equal,
    Less,
    Greater,

    // Two-character tokens
    EqualEqual,
    BangEqual,
    LessEqual,
    GreaterEqual,
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    PercentEqual,
    PlusPlus,
    MinusMinus,
    Arrow,
    AndAnd,
    OrOr,
    DotDot,

    // Literals
    Identifier,
    String,
    Number,

    // Keywords
    Let,
    Const,
    If,
    Elif,
    Else,
    For,
    While,
    Ret,
    Package,
    Func,
    In,
    Inline,
    Given,
    When,
    Default,
    Puts,

    // Special
    Eof,
}

/// The decoded payload of a literal token.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Number(Number),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub literal: Literal,
    pub pos_start: Position,
    pub pos_end: Position,
}

impl Token {
    pub fn new(
        token_type: TokenType,
        lexeme: String,
        literal: Literal,
        pos_start: Position,
        pos_end: Position,
    ) -> Self {
        Self {
            token_type,
            lexeme,
            literal,
            pos_start,
            pos_end,
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.pos_start.clone(), self.pos_end.clone())
    }
}

pub struct Lexer {
    chars: Vec<char>,
    tokens: Vec<Token>,
    start: Position,
    pos: Position,
    keywords: HashMap<&'static str, TokenType>,
}

impl Lexer {
    pub fn new(file_name: &str, source: &str) -> Self {
        let mut keywords = HashMap::new();
        keywords.insert("let", TokenType::Let);
        keywords.insert("const", TokenType::Const);
        keywords.insert("if", TokenType::If);
        keywords.insert("elif", TokenType::Elif);
        keywords.insert("else", TokenType::Else);
        keywords.insert("for", TokenType::For);
        keywords.insert("while", TokenType::While);
        keywords.insert("ret", TokenType::Ret);
        keywords.insert("package", TokenType::Package);
        keywords.insert("func", TokenType::Func);
        keywords.insert("in", TokenType::In);
        keywords.insert("inline", TokenType::Inline);
        keywords.insert("given", TokenType::Given);
        keywords.insert("when", TokenType::When);
        keywords.insert("default", TokenType::Default);
        keywords.insert("puts", TokenType::Puts);

        let pos = Position::new(file_name, source);
        Self {
            chars: source.chars().collect(),
            tokens: Vec::new(),
            start: pos.clone(),
            pos,
            keywords,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, PebbleError> {
        while !self.is_at_end() {
            self.start = self.pos.clone();
            self.scan_token()?;
        }

        self.start = self.pos.clone();
        self.add_token(TokenType::Eof, Literal::None);
        Ok(std::mem::take(&mut self.tokens))
    }

    fn is_at_end(&self) -> bool {
        self.pos.index >= self.chars.len()
    }

    fn scan_token(&mut self) -> Result<(), PebbleError> {
        let c = self.advance();

        match c {
            '(' => self.add_token(TokenType::LeftParen, Literal::None),
            ')' => self.add_token(TokenType::RightParen, Literal::None),
            '{' => self.add_token(TokenType::LeftBrace, Literal::None),
            '}' => self.add_token(TokenType::RightBrace, Literal::None),
            '[' => self.add_token(TokenType::LeftBracket, Literal::None),
            ']' => self.add_token(TokenType::RightBracket, Literal::None),
            ',' => self.add_token(TokenType::Comma, Literal::None),
            ':' => self.add_token(TokenType::Colon, Literal::None),
            ';' => self.add_token(TokenType::Semicolon, Literal::None),
            '#' => self.add_token(TokenType::Hash, Literal::None),
            '+' => {
                let token_type = if self.match_char('+') {
                    TokenType::PlusPlus
                } else if self.match_char('=') {
                    TokenType::PlusEqual
                } else {
                    TokenType::Plus
                };
                self.add_token(token_type, Literal::None);
            }
            '-' => {
                let token_type = if self.match_char('-') {
                    TokenType::MinusMinus
                } else if self.match_char('=') {
                    TokenType::MinusEqual
                } else if self.match_char('>') {
                    TokenType::Arrow
                } else {
                    TokenType::Minus
                };
                self.add_token(token_type, Literal::None);
            }
            '*' => {
                let token_type = if self.match_char('=') {
                    TokenType::StarEqual
                } else {
                    TokenType::Star
                };
                self.add_token(token_type, Literal::None);
            }
            '%' => {
                let token_type = if self.match_char('=') {
                    TokenType::PercentEqual
                } else {
                    TokenType::Percent
                };
                self.add_token(token_type, Literal::None);
            }
            '!' => {
                let token_type = if self.match_char('=') {
                    TokenType::BangEqual
                } else {
                    TokenType::Bang
                };
                self.add_token(token_type, Literal::None);
            }
            '=' => {
                let token_type = if self.match_char('=') {
                    TokenType::EqualEqual
                } else {
                    TokenType::Equal
                };
                self.add_token(token_type, Literal::None);
            }
            '<' => {
                let token_type = if self.match_char('=') {
                    TokenType::LessEqual
                } else {
                    TokenType::Less
                };
                self.add_token(token_type, Literal::None);
            }
            '>' => {
                let token_type = if self.match_char('=') {
                    TokenType::GreaterEqual
                } else {
                    TokenType::Greater
                };
                self.add_token(token_type, Literal::None);
            }
            '&' if self.match_char('&') => self.add_token(TokenType::AndAnd, Literal::None),
            '|' if self.match_char('|') => self.add_token(TokenType::OrOr, Literal::None),
            '.' if self.match_char('.') => self.add_token(TokenType::DotDot, Literal::None),
            '/' => {
                if self.match_char('/') {
                    // Comment goes until end of line
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else if self.match_char('*') {
                    self.block_comment()?;
                } else if self.match_char('=') {
                    self.add_token(TokenType::SlashEqual, Literal::None);
                } else {
                    self.add_token(TokenType::Slash, Literal::None);
                }
            }
            ' ' | '\r' | '\t' | '\n' => {}
            '"' | '\'' => self.string(c)?,
            c if c.is_ascii_digit() => self.number()?,
            c if c.is_alphabetic() || c == '_' => self.identifier(),
            _ => {
                return Err(PebbleError::illegal_character(
                    self.current_span(),
                    format!("'{}'", c),
                ));
            }
        }

        Ok(())
    }

    fn advance(&mut self) -> char {
        let c = self.peek();
        if !self.is_at_end() {
            self.pos.advance(c);
        }
        c
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.peek() != expected {
            false
        } else {
            self.advance();
            true
        }
    }

    fn peek(&self) -> char {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> char {
        self.chars
            .get(self.pos.index + offset)
            .copied()
            .unwrap_or('\0')
    }

    fn current_span(&self) -> Span {
        Span::new(self.start.clone(), self.pos.clone())
    }

    fn text(&self) -> String {
        self.chars[self.start.index..self.pos.index].iter().collect()
    }

    fn block_comment(&mut self) -> Result<(), PebbleError> {
        while !(self.peek() == '*' && self.peek_at(1) == '/') {
            if self.is_at_end() {
                return Err(PebbleError::illegal_character(
                    self.current_span(),
                    "Unterminated block comment".to_string(),
                ));
            }
            self.advance();
        }
        self.advance();
        self.advance();
        Ok(())
    }

    fn string(&mut self, quote: char) -> Result<(), PebbleError> {
        let mut content = String::new();

        while self.peek() != quote {
            if self.is_at_end() {
                return Err(PebbleError::illegal_character(
                    self.current_span(),
                    "Unterminated string literal".to_string(),
                ));
            }
            match self.advance() {
                '\u{8}' => content.push_str("\\b"),
                '\u{c}' => content.push_str("\\f"),
                '\n' => content.push_str("\\n"),
                '\r' => content.push_str("\\r"),
                '\t' => content.push_str("\\t"),
                '\\' => content.push_str("\\\\"),
                c => content.push(c),
            }
        }

        // The closing quote
        self.advance();
        self.add_token(TokenType::String, Literal::Text(content));
        Ok(())
    }

    fn number(&mut self) -> Result<(), PebbleError> {
        loop {
            let c = self.peek();
            if c == '.' && self.peek_at(1) == '.' {
                break;
            }
            let exponent_sign = (c == '-' || c == '+') && self.text().contains('e');
            if c.is_ascii_digit() || matches!(c, '.' | 'x' | 'c' | 'b' | 'e') || exponent_sign {
                self.advance();
            } else {
                break;
            }
        }

        let text = self.text();
        match classify_number(&text) {
            Some(number) => {
                self.add_token(TokenType::Number, Literal::Number(number));
                Ok(())
            }
            None => Err(PebbleError::illegal_character(
                self.current_span(),
                format!("Malformed number literal '{}'", text),
            )),
        }
    }

    fn identifier(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text = self.text();
        let token_type = self
            .keywords
            .get(text.as_str())
            .cloned()
            .unwrap_or(TokenType::Identifier);

        self.add_token(token_type, Literal::None);
    }

    fn add_token(&mut self, token_type: TokenType, literal: Literal) {
        self.tokens.push(Token::new(
            token_type,
            self.text(),
            literal,
            self.start.clone(),
            self.pos.clone(),
        ));
    }
}

/// Decodes a number literal: `0x`/`0c`/`0b` prefixes select the base, then an `e`
/// means scientific notation and a `.` means a float.
///
/// The prefix is checked before `e` so that hex digits stay hex: `0x1e` is 30.
fn classify_number(text: &str) -> Option<Number> {
    if let Some(digits) = text.strip_prefix("0x") {
        return i64::from_str_radix(digits, 16).ok().map(Number::Int);
    }
    if let Some(digits) = text.strip_prefix("0c") {
        return i64::from_str_radix(digits, 8).ok().map(Number::Int);
    }
    if let Some(digits) = text.strip_prefix("0b") {
        return i64::from_str_radix(digits, 2).ok().map(Number::Int);
    }
    if text.contains('e') || text.contains('.') {
        return text.parse::<f64>().ok().map(Number::Float);
    }
    text.parse::<i64>().ok().map(Number::Int)
}
