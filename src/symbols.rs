use indexmap::IndexMap;

use crate::{
    error::{AssembleError, EvalError},
    expr::{Expr, Symbols, Value},
    program::Stmt,
    Pos,
};

/// A constant whose value could not be computed where it was declared.
#[derive(Debug, Clone)]
pub struct PendingEqu {
    pub name: String,
    pub expr: Expr,
    pub here: u32,
    pub pos: Pos,
}

/// Label and constant values for one assembly, plus where each name was
/// first referenced.
#[derive(Debug, Default)]
pub struct SymbolTable {
    values: IndexMap<String, i64>,
    uses: IndexMap<String, Pos>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: &str, value: i64) -> Result<(), AssembleError> {
        if self.values.contains_key(name) {
            return Err(AssembleError::DuplicateSymbol(name.to_string()));
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Records `pos` as the first use of every name `stmt` refers to that
    /// has not been seen before.
    pub fn note_uses(&mut self, stmt: &Stmt, pos: &Pos) {
        for expr in stmt.exprs() {
            for name in expr.labels() {
                if !self.uses.contains_key(name) {
                    self.uses.insert(name.to_string(), pos.clone());
                }
            }
        }
    }

    pub fn first_use(&self, name: &str) -> Option<&Pos> {
        self.uses.get(name)
    }

    /// Names that were referenced but never given a value.
    pub fn unresolved(&self) -> impl Iterator<Item = (&str, &Pos)> {
        self.uses
            .iter()
            .filter(|(name, _)| !self.values.contains_key(*name))
            .map(|(name, pos)| (name.as_str(), pos))
    }

    /// Converts an evaluation failure, naming the first use of a missing
    /// symbol.
    pub fn eval_error(&self, e: EvalError) -> AssembleError {
        match e {
            EvalError::Unresolved(name) => AssembleError::UnresolvedSymbol {
                first_use: self
                    .first_use(&name)
                    .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
                name,
            },
            e => AssembleError::Eval(e),
        }
    }

    /// Evaluates `expr` now that every label is known.
    pub fn resolve(&self, expr: &Expr, here: u32) -> Result<i64, AssembleError> {
        expr.resolve(self, here).map_err(|e| self.eval_error(e))
    }

    /// Gives values to the pending constants that can now be computed,
    /// repeating until nothing changes. Constants that still depend on
    /// unknown names are returned as errors.
    pub fn settle(&mut self, pending: Vec<PendingEqu>) -> Vec<(Pos, AssembleError)> {
        let mut pending = pending;
        let mut errors = Vec::new();
        loop {
            let before = pending.len();
            let mut waiting = Vec::new();
            for equ in pending {
                match equ.expr.eval(&*self, equ.here) {
                    Ok(Value::Known(value)) => {
                        if let Err(e) = self.declare(&equ.name, value) {
                            errors.push((equ.pos, e));
                        }
                    }
                    Ok(Value::Deferred(_)) => waiting.push(equ),
                    Err(e) => errors.push((equ.pos, AssembleError::Eval(e))),
                }
            }
            pending = waiting;
            if pending.len() == before || pending.is_empty() {
                break;
            }
        }
        for equ in pending {
            if let Err(e) = equ.expr.resolve(&*self, equ.here) {
                errors.push((equ.pos, self.eval_error(e)));
            }
        }
        errors
    }
}

impl Symbols for SymbolTable {
    fn lookup(&self, name: &str) -> Option<i64> {
        self.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equ(name: &str, expr: Expr) -> PendingEqu {
        PendingEqu {
            name: name.to_string(),
            expr,
            here: 0,
            pos: Pos::new("t.event", 1, 1),
        }
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut syms = SymbolTable::new();
        syms.declare("start", 0x100).unwrap();
        assert_eq!(
            syms.declare("start", 0x200),
            Err(AssembleError::DuplicateSymbol("start".to_string()))
        );
        assert_eq!(syms.get("start"), Some(0x100));
    }

    #[test]
    fn chained_constants_settle() {
        let mut syms = SymbolTable::new();
        // B depends on A which depends on a label declared last
        let errors = {
            let pending = vec![equ("B", Expr::label("A")), equ("A", Expr::label("end"))];
            syms.declare("end", 0x40).unwrap();
            syms.settle(pending)
        };
        assert!(errors.is_empty());
        assert_eq!(syms.get("A"), Some(0x40));
        assert_eq!(syms.get("B"), Some(0x40));
    }

    #[test]
    fn unresolved_names_report_first_use() {
        let mut syms = SymbolTable::new();
        let pos = Pos::new("t.event", 4, 2);
        syms.note_uses(&Stmt::Assert(Expr::label("missing")), &pos);
        syms.note_uses(
            &Stmt::Assert(Expr::label("missing")),
            &Pos::new("t.event", 9, 1),
        );
        let errors = syms.settle(vec![equ("X", Expr::label("missing"))]);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].1.to_string(),
            "undefined symbol \"missing\"\n\tfirst used at t.event:4:2"
        );
        assert_eq!(syms.unresolved().collect::<Vec<_>>(), [("missing", &pos)]);
    }
}
