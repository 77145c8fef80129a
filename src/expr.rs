//! Integer expressions kept in postfix form.
//!
//! The parser feeds tokens to an [`ExprBuilder`] (shunting-yard), and the
//! resulting [`Expr`] is evaluated against whatever symbols are known at the
//! time. An expression that names a symbol that is not known yet evaluates to
//! [`Value::Deferred`], which the assemblers retry once every label has an
//! address.

use std::collections::HashMap;

use crate::{error::EvalError, Tok};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Binary(Tok),
    Unary(Tok),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprNode {
    Const(i64),
    Op(Op),
    Label(String),
    /// `CURRENTOFFSET`
    Here,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    nodes: Vec<ExprNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Known(i64),
    /// Names the first symbol that could not be looked up.
    Deferred(String),
}

pub trait Symbols {
    fn lookup(&self, name: &str) -> Option<i64>;
}

impl Symbols for HashMap<String, i64> {
    fn lookup(&self, name: &str) -> Option<i64> {
        self.get(name).copied()
    }
}

/// Symbol source with nothing in it.
pub struct NoSymbols;

impl Symbols for NoSymbols {
    fn lookup(&self, _name: &str) -> Option<i64> {
        None
    }
}

impl Expr {
    pub fn constant(value: i64) -> Self {
        Self {
            nodes: vec![ExprNode::Const(value)],
        }
    }

    pub fn label(name: &str) -> Self {
        Self {
            nodes: vec![ExprNode::Label(name.to_string())],
        }
    }

    pub fn nodes(&self) -> &[ExprNode] {
        &self.nodes
    }

    /// The value when the expression is a plain number.
    pub fn as_const(&self) -> Option<i64> {
        match self.nodes.as_slice() {
            [ExprNode::Const(value)] => Some(*value),
            _ => None,
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().filter_map(|node| match node {
            ExprNode::Label(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Like [`Expr::eval`], but a missing symbol is an error.
    pub fn resolve(&self, syms: &dyn Symbols, here: u32) -> Result<i64, EvalError> {
        match self.eval(syms, here)? {
            Value::Known(value) => Ok(value),
            Value::Deferred(name) => Err(EvalError::Unresolved(name)),
        }
    }

    pub fn eval(&self, syms: &dyn Symbols, here: u32) -> Result<Value, EvalError> {
        let mut scratch: Vec<i64> = Vec::with_capacity(self.nodes.len());
        let mut deferred = None;
        for node in &self.nodes {
            match node {
                ExprNode::Const(value) => scratch.push(*value),
                ExprNode::Here => scratch.push(here as i64),
                ExprNode::Label(name) => match syms.lookup(name) {
                    Some(value) => scratch.push(value),
                    None => {
                        // keep walking so malformed input is still reported
                        if deferred.is_none() {
                            deferred = Some(name.clone());
                        }
                        scratch.push(0);
                    }
                },
                ExprNode::Op(op) => {
                    let rhs = scratch.pop().ok_or(EvalError::Malformed)?;
                    let value = match *op {
                        Op::Unary(Tok::PLUS) => rhs,
                        Op::Unary(Tok::MINUS) => rhs.wrapping_neg(),
                        Op::Unary(Tok::TILDE) => !rhs,
                        Op::Unary(Tok::BANG) => (rhs == 0) as i64,
                        Op::Unary(_) => return Err(EvalError::Malformed),
                        Op::Binary(tok) => {
                            let lhs = scratch.pop().ok_or(EvalError::Malformed)?;
                            binary(tok, lhs, rhs, deferred.is_some())?
                        }
                    };
                    scratch.push(value);
                }
            }
        }
        if scratch.len() != 1 {
            return Err(EvalError::Malformed);
        }
        match deferred {
            Some(name) => Ok(Value::Deferred(name)),
            None => Ok(Value::Known(scratch[0])),
        }
    }
}

fn binary(tok: Tok, lhs: i64, rhs: i64, placeholder: bool) -> Result<i64, EvalError> {
    Ok(match tok {
        Tok::PLUS => lhs.wrapping_add(rhs),
        Tok::MINUS => lhs.wrapping_sub(rhs),
        Tok::STAR => lhs.wrapping_mul(rhs),
        Tok::SOLIDUS | Tok::MODULUS if rhs == 0 => {
            // an unresolved operand reads as 0 until it is known
            if placeholder {
                0
            } else {
                return Err(EvalError::DivisionByZero);
            }
        }
        Tok::SOLIDUS => lhs.wrapping_div(rhs),
        Tok::MODULUS => lhs.wrapping_rem(rhs),
        Tok::ASL => lhs.wrapping_shl(rhs as u32),
        Tok::ASR => lhs.wrapping_shr(rhs as u32),
        Tok::LT => (lhs < rhs) as i64,
        Tok::LTE => (lhs <= rhs) as i64,
        Tok::GT => (lhs > rhs) as i64,
        Tok::GTE => (lhs >= rhs) as i64,
        Tok::LEQ => (lhs == rhs) as i64,
        Tok::NEQ => (lhs != rhs) as i64,
        Tok::AMP => lhs & rhs,
        Tok::PIPE => lhs | rhs,
        Tok::CARET => lhs ^ rhs,
        Tok::AND => ((lhs != 0) && (rhs != 0)) as i64,
        Tok::LOR => ((lhs != 0) || (rhs != 0)) as i64,
        _ => return Err(EvalError::Malformed),
    })
}

/// Incremental shunting-yard conversion from infix tokens to an [`Expr`].
#[derive(Debug, Default)]
pub struct ExprBuilder {
    output: Vec<ExprNode>,
    operators: Vec<Op>,
    seen_val: bool,
    depth: usize,
}

impl ExprBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the next token has to be an operator (or the end).
    pub fn seen_val(&self) -> bool {
        self.seen_val
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn value(&mut self, node: ExprNode) -> Result<(), &'static str> {
        if self.seen_val {
            return Err("expected operator");
        }
        self.output.push(node);
        self.seen_val = true;
        Ok(())
    }

    /// Returns `false` when `tok` is not an expression operator.
    pub fn operator(&mut self, tok: Tok) -> Result<bool, &'static str> {
        match tok {
            // these are optionally unary
            Tok::PLUS | Tok::MINUS => {
                if self.seen_val {
                    self.push_apply(Op::Binary(tok));
                } else {
                    self.operators.push(Op::Unary(tok));
                }
            }
            // always unary
            Tok::BANG | Tok::TILDE => {
                if self.seen_val {
                    return Err("expected operator");
                }
                self.operators.push(Op::Unary(tok));
            }
            #[rustfmt::skip]
            Tok::STAR | Tok::SOLIDUS | Tok::MODULUS | Tok::ASL | Tok::ASR | Tok::LT | Tok::LTE
            | Tok::GT | Tok::GTE | Tok::LEQ | Tok::NEQ | Tok::AMP | Tok::CARET | Tok::PIPE
            | Tok::AND | Tok::LOR => {
                if !self.seen_val {
                    return Err("expected value");
                }
                self.push_apply(Op::Binary(tok));
            }
            _ => return Ok(false),
        }
        self.seen_val = false;
        Ok(true)
    }

    pub fn open(&mut self) -> Result<(), &'static str> {
        if self.seen_val {
            return Err("expected operator");
        }
        self.depth += 1;
        self.operators.push(Op::Unary(Tok::LPAREN));
        Ok(())
    }

    /// Returns `false` when the paren does not belong to this expression.
    pub fn close(&mut self) -> Result<bool, &'static str> {
        if self.depth == 0 {
            return Ok(false);
        }
        if !self.seen_val {
            return Err("expected value");
        }
        self.depth -= 1;
        // we apply ops until we see the start of this grouping
        loop {
            match self.operators.pop() {
                Some(Op::Unary(Tok::LPAREN)) => break,
                Some(op) => self.output.push(ExprNode::Op(op)),
                None => return Err("unbalanced parens"),
            }
        }
        Ok(true)
    }

    pub fn finish(mut self) -> Result<Expr, &'static str> {
        if !self.seen_val {
            return Err("expected value");
        }
        if self.depth != 0 {
            return Err("unbalanced parens");
        }
        while let Some(top) = self.operators.pop() {
            self.output.push(ExprNode::Op(top));
        }
        Ok(Expr {
            nodes: self.output,
        })
    }

    fn precedence(op: Op) -> u8 {
        match op {
            Op::Unary(Tok::LPAREN) => 0xFF, // lparen is lowest precedence
            Op::Unary(_) => 0,              // other unary is highest precedence
            Op::Binary(Tok::SOLIDUS | Tok::MODULUS | Tok::STAR) => 1,
            Op::Binary(Tok::PLUS | Tok::MINUS) => 2,
            Op::Binary(Tok::ASL | Tok::ASR) => 3,
            Op::Binary(Tok::LT | Tok::LTE | Tok::GT | Tok::GTE) => 4,
            Op::Binary(Tok::LEQ | Tok::NEQ) => 5,
            Op::Binary(Tok::AMP) => 6,
            Op::Binary(Tok::CARET) => 7,
            Op::Binary(Tok::PIPE) => 8,
            Op::Binary(Tok::AND) => 9,
            Op::Binary(_) => 10,
        }
    }

    fn push_apply(&mut self, op: Op) {
        while let Some(top) = self.operators.last().copied() {
            if Self::precedence(top) > Self::precedence(op) {
                break;
            }
            self.operators.pop();
            self.output.push(ExprNode::Op(top));
        }
        self.operators.push(op);
    }
}
