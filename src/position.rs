use std::fmt;
use std::rc::Rc;

/// A snapshot of the lexer cursor. Tokens and AST nodes keep their own copy.
///
/// `index` and `column` count characters, `line` starts at 1 and `column` at 0.
#[derive(Clone)]
pub struct Position {
    pub index: usize,
    pub line: usize,
    pub column: usize,
    pub file_name: Rc<str>,
    pub file_text: Rc<str>,
}

impl Position {
    pub fn new(file_name: &str, file_text: &str) -> Self {
        Self {
            index: 0,
            line: 1,
            column: 0,
            file_name: Rc::from(file_name),
            file_text: Rc::from(file_text),
        }
    }

    /// Moves past `current`, the character the cursor was sitting on.
    pub fn advance(&mut self, current: char) {
        self.index += 1;
        if current == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.line == other.line
            && self.column == other.column
            && self.file_name == other.file_name
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file_name, self.line, self.column)
    }
}

/// Half-open source range: `start` is the first character, `end` is one past the last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// The span running from the start of `self` to the end of `other`.
    pub fn to(&self, other: &Span) -> Span {
        Span::new(self.start.clone(), other.end.clone())
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.start.index..self.end.index.max(self.start.index + 1)
    }
}
