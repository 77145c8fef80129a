use crate::{expr::Expr, log::Severity, Pos};

/// A code argument as written in the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Expr(Expr),
    /// `[a, b, ...]`
    List(Vec<Expr>),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Label(String),
    Equ(String, Expr),
    /// An invocation of the registry code with this declaration index.
    Code {
        code: usize,
        args: Vec<Arg>,
    },
    /// `BYTE`, `SHORT` or `WORD`.
    Data {
        width: usize,
        values: Vec<Expr>,
    },
    /// `POIN`
    Pointer(Vec<Expr>),
    Org(Expr),
    Push,
    Pop,
    Align(Expr),
    Fill {
        count: Expr,
        value: Expr,
    },
    Protect {
        start: Expr,
        end: Option<Expr>,
    },
    Assert(Expr),
    Message(Severity, String),
    /// `#incbin`
    Bytes(Vec<u8>),
}

impl Stmt {
    /// Every expression the statement evaluates, in source order.
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Stmt::Equ(_, expr) | Stmt::Org(expr) | Stmt::Align(expr) | Stmt::Assert(expr) => {
                vec![expr]
            }
            Stmt::Code { args, .. } => args
                .iter()
                .flat_map(|arg| match arg {
                    Arg::Expr(expr) => vec![expr],
                    Arg::List(items) => items.iter().collect(),
                    Arg::Str(_) => Vec::new(),
                })
                .collect(),
            Stmt::Data { values, .. } | Stmt::Pointer(values) => values.iter().collect(),
            Stmt::Fill { count, value } => vec![count, value],
            Stmt::Protect { start, end } => std::iter::once(start).chain(end).collect(),
            Stmt::Label(_) | Stmt::Push | Stmt::Pop | Stmt::Message(..) | Stmt::Bytes(_) => {
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub pos: Pos,
    pub stmt: Stmt,
}

/// Parsed script, in source order with includes and macros spliced in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Statement> {
        self.statements.iter()
    }
}
