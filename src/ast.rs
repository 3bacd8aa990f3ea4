use crate::lexer::Token;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Identifier, number, string/char literal or `TRUE`/`FALSE`.
    Literal(Token),
    // Binary(left, op, right, line of the operator)
    Binary(Box<Expr>, BinOp, Box<Expr>, usize),
    Grouping(Box<Expr>),
    Negation(Box<Expr>),
    ArrayAccess(Token, Vec<Expr>), // a[i][j] or a[i, j]
    ProcedureCall(Token, Vec<Expr>),
    Empty,
}

impl Expr {
    /// Best-effort source line, used when an error has no better anchor.
    pub fn line(&self) -> usize {
        match self {
            Expr::Literal(token) | Expr::ArrayAccess(token, _) | Expr::ProcedureCall(token, _) => {
                token.line
            }
            Expr::Binary(_, _, _, line) => *line,
            Expr::Grouping(inner) | Expr::Negation(inner) => inner.line(),
            Expr::Empty => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::IntDiv | BinOp::Mod
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::IntDiv => "DIV",
            BinOp::Mod => "MOD",
            BinOp::Eq => "=",
            BinOp::Ne => "#",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "AND",
            BinOp::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: Token,
    pub declared_type: Token,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub name: Token,
    pub return_type: Option<Token>,
    pub params: Vec<VarDecl>,
    /// Local declarations, nested procedures and statements in source order.
    pub body: Vec<Stmt>,
}

impl Procedure {
    pub fn nested(&self) -> impl Iterator<Item = &Rc<Procedure>> {
        self.body.iter().filter_map(|stmt| match stmt {
            Stmt::Procedure(proc) => Some(proc),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Elsif {
    pub condition: Expr,
    pub body: Vec<Stmt>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseBranch {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseBranch {
    pub labels: BTreeSet<i64>,
    pub body: Vec<Stmt>,
}

/// Inclusive index range per dimension, keyed by dimension position.
pub type Dimensions = BTreeMap<usize, BTreeSet<i64>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    // Declarations
    Module(Token),
    Import(Token, Vec<Token>),
    Const(Token, Expr),
    Var(VarDecl),
    VarArray(Token, Token, Dimensions), // name, element type, ranges
    Procedure(Rc<Procedure>),

    // Statements
    Assign(Expr, Expr), // target is a Literal or an ArrayAccess
    Call(Token, Vec<Expr>),
    If(Expr, Vec<Stmt>, Vec<Elsif>, Option<ElseBranch>),
    While(Expr, Vec<Stmt>),
    // For(index assignment, bound, step, body, line)
    For(Box<Stmt>, Expr, Option<Expr>, Vec<Stmt>, usize),
    Case(Token, Vec<CaseBranch>, Vec<Stmt>),
    Read(Token, Vec<Expr>),  // ?x or ?a[i]
    Write(Token, Vec<Expr>), // !x or !a[i]
    Return(Expr),

    Main(Vec<Stmt>),
}

impl Stmt {
    pub fn is_declaration(&self) -> bool {
        matches!(
            self,
            Stmt::Module(_)
                | Stmt::Import(..)
                | Stmt::Const(..)
                | Stmt::Var(_)
                | Stmt::VarArray(..)
                | Stmt::Procedure(_)
        )
    }
}

/// A whole parsed module, top-level statements in source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

impl Block {
    pub fn module_name(&self) -> Option<&Token> {
        self.statements.iter().find_map(|stmt| match stmt {
            Stmt::Module(name) => Some(name),
            _ => None,
        })
    }

    pub fn procedures(&self) -> impl Iterator<Item = &Rc<Procedure>> {
        self.statements.iter().filter_map(|stmt| match stmt {
            Stmt::Procedure(proc) => Some(proc),
            _ => None,
        })
    }

    pub fn main(&self) -> Option<&[Stmt]> {
        self.statements.iter().find_map(|stmt| match stmt {
            Stmt::Main(body) => Some(body.as_slice()),
            _ => None,
        })
    }
}
