use std::ops::Range;

use crate::{
    alloc::Allocator,
    expr::Value,
    log::{Log, Severity},
    program::{Arg, Program, Stmt},
    rom::Rom,
    symbols::{PendingEqu, SymbolTable},
    Pos,
};

use super::{
    assertion, check_align, check_write, inline_bytes, inline_len, layout, protected, put, Context,
    Cursor, Engine, Report, Source, Span,
};

/// The two pass assembler: lay everything out, then emit.
pub struct Classic;

struct Slot {
    here: u32,
    span: Option<Span>,
}

struct Inline<'a> {
    arg: &'a Arg,
    element: usize,
    pos: &'a Pos,
    offset: Option<u32>,
}

impl Engine for Classic {
    fn name(&self) -> &'static str {
        "classic"
    }

    fn assemble(&self, program: &Program, ctx: &Context, rom: &mut Rom, log: &mut Log) {
        let base = ctx.config.pointer_base;
        let mut report = Report::new(log);
        let mut syms = SymbolTable::new();
        let mut cursor = Cursor::new(ctx.origin, base, rom.len());
        let mut slots = Vec::with_capacity(program.len());
        let mut pending = Vec::new();

        tracing::trace!("starting pass 1");
        for statement in program.iter() {
            let (pos, stmt) = (&statement.pos, &statement.stmt);
            let here = cursor.offset;
            syms.note_uses(stmt, pos);
            match stmt {
                Stmt::Label(name) => {
                    if let Err(e) = syms.declare(name, here as i64) {
                        report.error(pos, e);
                    }
                }
                Stmt::Equ(name, expr) => match expr.eval(&syms, here) {
                    Ok(Value::Known(value)) => {
                        if let Err(e) = syms.declare(name, value) {
                            report.error(pos, e);
                        }
                    }
                    Ok(Value::Deferred(_)) => pending.push(PendingEqu {
                        name: name.clone(),
                        expr: expr.clone(),
                        here,
                        pos: pos.clone(),
                    }),
                    Err(e) => report.error(pos, e.into()),
                },
                _ => {}
            }
            let span = cursor.step(stmt, ctx.registry, &syms).unwrap_or_else(|e| {
                report.error(pos, e);
                None
            });
            slots.push(Slot { here, span });
        }
        for (pos, e) in syms.settle(pending) {
            report.error(&pos, e);
        }
        tracing::debug!("{} symbols", syms.len());

        let mut protects: Vec<Range<u32>> = Vec::new();
        for (statement, slot) in program.iter().zip(&slots) {
            if let Stmt::Protect { start, end } = &statement.stmt {
                match protected(start, end.as_ref(), slot.here, &syms, base) {
                    Ok(range) => protects.push(range),
                    Err(e) => report.error(&statement.pos, e),
                }
            }
        }

        tracing::trace!("allocating free space");
        let mut alloc = Allocator::new(rom.as_bytes(), &ctx.config.free_space);
        for span in slots.iter().filter_map(|slot| slot.span) {
            alloc.reserve(span.range());
        }
        for range in &protects {
            alloc.reserve(range.start as usize..range.end as usize);
        }
        let mut inline = Vec::new();
        for (statement, slot) in program.iter().zip(&slots) {
            let Some(span) = slot.span else {
                continue;
            };
            // reported again in pass 2
            let Ok((_, fields)) = layout(&statement.stmt, span.len, ctx.registry) else {
                continue;
            };
            for field in fields {
                if let Source::Inline { arg, element } = field.source {
                    let len = inline_len(arg, element);
                    let offset = if len == 0 {
                        Some(0)
                    } else {
                        match alloc.allocate(len) {
                            Ok(offset) => Some(offset),
                            Err(e) => {
                                report.error(&statement.pos, e);
                                None
                            }
                        }
                    };
                    inline.push(Inline {
                        arg,
                        element,
                        pos: &statement.pos,
                        offset,
                    });
                }
            }
        }

        tracing::trace!("starting pass 2");
        let mut image = rom.as_bytes().to_vec();
        let mut next_inline = 0;
        for (statement, slot) in program.iter().zip(&slots) {
            let (pos, stmt) = (&statement.pos, &statement.stmt);
            match stmt {
                Stmt::Assert(expr) => {
                    if let Err(e) = syms.resolve(expr, slot.here).and_then(assertion) {
                        report.error(pos, e);
                    }
                }
                Stmt::Message(severity, text) => report.push(*severity, pos, text),
                _ => {}
            }
            let Some(span) = slot.span else {
                continue;
            };
            if let Some(warning) = check_align(stmt, span.offset, ctx.registry) {
                report.push(Severity::Warning, pos, &warning);
            }
            let (mut bytes, fields) = match layout(stmt, span.len, ctx.registry) {
                Ok(layout) => layout,
                Err(e) => {
                    report.error(pos, e);
                    continue;
                }
            };
            for field in fields {
                let value = match field.source {
                    Source::Expr(expr) => syms.resolve(expr, span.offset),
                    Source::Inline { .. } => {
                        let offset = inline.get(next_inline).and_then(|i| i.offset);
                        next_inline += 1;
                        Ok(offset.unwrap_or(0) as i64)
                    }
                };
                let result = value.and_then(|value| {
                    put(&mut bytes, field.at, field.width, field.fixup, value, base)
                });
                if let Err(e) = result {
                    report.error(pos, e);
                }
            }
            match check_write(span, image.len(), &protects) {
                Ok(()) => image[span.range()].copy_from_slice(&bytes),
                Err(e) => report.error(pos, e),
            }
        }

        for data in &inline {
            let Some(offset) = data.offset else {
                continue;
            };
            match inline_bytes(data.arg, data.element, offset, &syms) {
                Ok(bytes) => {
                    let at = offset as usize;
                    image[at..at + bytes.len()].copy_from_slice(&bytes);
                }
                Err(e) => report.error(data.pos, e),
            }
        }

        if report.failed() {
            tracing::trace!("errors recorded, image left untouched");
            return;
        }
        tracing::trace!("committing {} bytes", image.len());
        rom.replace(image);
    }
}
