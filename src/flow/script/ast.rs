// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree for code fragments

/// A parsed fragment: its top-level statements
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

/// A single statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// import module [as alias]
    Import { module: String, alias: Option<String> },
    /// target = value
    Assign { target: Target, value: Expr },
    /// target op= value; `read` is the target as an expression
    AugAssign {
        target: Target,
        read: Expr,
        op: BinaryOp,
        value: Expr,
    },
    /// if/elif branches in order, then the else block
    If {
        branches: Vec<(Expr, Vec<Statement>)>,
        otherwise: Vec<Statement>,
    },
    /// for a[, b...] in iter: body
    For {
        targets: Vec<String>,
        iter: Expr,
        body: Vec<Statement>,
    },
    While { cond: Expr, body: Vec<Statement> },
    Break,
    Continue,
    /// return [value]
    Return(Option<Expr>),
    /// pass
    Pass,
    /// Bare expression, evaluated for errors and discarded
    Expr(Expr),
}

/// Left-hand side of an assignment
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// name = ...
    Name(String),
    /// name[i][j] = ...
    Index { name: String, path: Vec<Expr> },
}

/// An expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    /// object[index]
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    /// object.attr
    Attribute {
        object: Box<Expr>,
        attr: String,
    },
    /// func(args)
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    /// Short-circuit and
    And(Box<Expr>, Box<Expr>),
    /// Short-circuit or
    Or(Box<Expr>, Box<Expr>),
    /// then if cond else otherwise
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

/// Literal values in fragments
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Mul => write!(f, "*"),
            BinaryOp::Div => write!(f, "/"),
            BinaryOp::FloorDiv => write!(f, "//"),
            BinaryOp::Mod => write!(f, "%"),
            BinaryOp::Pow => write!(f, "**"),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::NotEq => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
            CompareOp::In => write!(f, "in"),
            CompareOp::NotIn => write!(f, "not in"),
        }
    }
}
