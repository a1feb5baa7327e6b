use crate::position::Span;
use crate::scope::Scope;
use crate::value::Number;
use std::rc::Rc;

/// AST produced by the parser. Every node's span is computed once from its
/// first and last token and always covers its children.

#[derive(Debug, Clone)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeclarationKind {
    Let,
    Const,
}

#[derive(Debug, Clone)]
pub struct Declarator {
    pub name: String,
    pub name_span: Span,
    /// Defaults to the number `0` when the declaration has no values.
    pub init: Expr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expression {
        expr: Expr,
        span: Span,
    },
    VariableDeclaration {
        kind: DeclarationKind,
        declarators: Vec<Declarator>,
        span: Span,
    },
    Function {
        name: String,
        params: Vec<String>,
        body: Rc<Block>,
        span: Span,
    },
    If {
        test: Expr,
        body: Block,
        /// Either another `If` (for `elif`) or a `Block` (for `else`).
        alternative: Option<Box<Stmt>>,
        span: Span,
    },
    While {
        test: Expr,
        body: Block,
        span: Span,
    },
    For {
        init: Declarator,
        iterable: Expr,
        /// Synthesized `x++`; iteration is driven by the iterable instead.
        update: Expr,
        body: Block,
        span: Span,
    },
    Block(Block),
    Return {
        value: Expr,
        span: Span,
    },
    Put {
        arguments: Vec<Expr>,
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> &Span {
        match self {
            Stmt::Expression { span, .. } => span,
            Stmt::VariableDeclaration { span, .. } => span,
            Stmt::Function { span, .. } => span,
            Stmt::If { span, .. } => span,
            Stmt::While { span, .. } => span,
            Stmt::For { span, .. } => span,
            Stmt::Block(block) => &block.span,
            Stmt::Return { span, .. } => span,
            Stmt::Put { span, .. } => span,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Identifier {
        name: String,
        span: Span,
    },
    Literal {
        value: String,
        span: Span,
    },
    Number {
        value: Number,
        span: Span,
    },
    /// `inline (params) -> body`, with the child scope its parameters live in.
    InlineFunction {
        name: Option<String>,
        params: Vec<String>,
        body: Rc<Expr>,
        scope: Scope,
        span: Span,
    },
    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
        span: Span,
    },
    Update {
        operator: UpdateOp,
        target: Box<Expr>,
        span: Span,
    },
    Assignment {
        target: Box<Expr>,
        operator: AssignOp,
        value: Box<Expr>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Member {
        object: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    List {
        elements: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::Identifier { span, .. } => span,
            Expr::Literal { span, .. } => span,
            Expr::Number { span, .. } => span,
            Expr::InlineFunction { span, .. } => span,
            Expr::Unary { span, .. } => span,
            Expr::Binary { span, .. } => span,
            Expr::Update { span, .. } => span,
            Expr::Assignment { span, .. } => span,
            Expr::Call { span, .. } => span,
            Expr::Member { span, .. } => span,
            Expr::List { span, .. } => span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Concat,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    And,
    Or,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Negate,
    Plus,
    Not,
    Length,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignOp {
    Assign,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}
