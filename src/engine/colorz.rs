use std::ops::Range;

use crate::{
    alloc::Allocator,
    expr::{Expr, Value},
    log::{Log, Severity},
    program::{Arg, Program, Stmt},
    rom::Rom,
    symbols::{PendingEqu, SymbolTable},
    Pos,
};

use super::{
    assertion, check_align, check_write, inline_bytes, inline_len, layout, protected, put, Context,
    Cursor, Engine, Fixup, Report, Source, Span,
};

/// Single pass assembler. Values that are not known when a statement is
/// reached are left as placeholders and patched once the whole script
/// has been read.
pub struct Colorz;

struct Chunk<'a> {
    span: Span,
    bytes: Vec<u8>,
    pos: &'a Pos,
}

enum RelocValue<'a> {
    Expr(&'a Expr),
    /// Address of the k-th inline data block.
    Inline(usize),
}

struct Reloc<'a> {
    chunk: usize,
    at: usize,
    width: usize,
    fixup: Fixup,
    value: RelocValue<'a>,
    here: u32,
}

struct Inline<'a> {
    arg: &'a Arg,
    element: usize,
    pos: &'a Pos,
}

impl Engine for Colorz {
    fn name(&self) -> &'static str {
        "colorz"
    }

    fn assemble(&self, program: &Program, ctx: &Context, rom: &mut Rom, log: &mut Log) {
        let base = ctx.config.pointer_base;
        let mut report = Report::new(log);
        let mut syms = SymbolTable::new();
        let mut cursor = Cursor::new(ctx.origin, base, rom.len());
        let mut pending = Vec::new();
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut relocs = Vec::new();
        let mut inline: Vec<Inline> = Vec::new();
        let mut asserts = Vec::new();
        let mut protects = Vec::new();

        tracing::trace!("emitting {} statements", program.len());
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
                Stmt::Assert(expr) => match expr.eval(&syms, here) {
                    Ok(Value::Known(value)) => {
                        if let Err(e) = assertion(value) {
                            report.error(pos, e);
                        }
                    }
                    Ok(Value::Deferred(_)) => asserts.push((expr, here, pos)),
                    Err(e) => report.error(pos, e.into()),
                },
                Stmt::Protect { start, end } => protects.push((start, end.as_ref(), here, pos)),
                Stmt::Message(severity, text) => report.push(*severity, pos, text),
                _ => {}
            }

            let span = match cursor.step(stmt, ctx.registry, &syms) {
                Ok(Some(span)) => span,
                Ok(None) => continue,
                Err(e) => {
                    report.error(pos, e);
                    continue;
                }
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
                    Source::Expr(expr) => match expr.eval(&syms, here) {
                        Ok(Value::Known(value)) => Some(value),
                        Ok(Value::Deferred(_)) => {
                            relocs.push(Reloc {
                                chunk: chunks.len(),
                                at: field.at,
                                width: field.width,
                                fixup: field.fixup,
                                value: RelocValue::Expr(expr),
                                here,
                            });
                            None
                        }
                        Err(e) => {
                            report.error(pos, e.into());
                            None
                        }
                    },
                    Source::Inline { arg, element } => {
                        relocs.push(Reloc {
                            chunk: chunks.len(),
                            at: field.at,
                            width: field.width,
                            fixup: field.fixup,
                            value: RelocValue::Inline(inline.len()),
                            here,
                        });
                        inline.push(Inline { arg, element, pos });
                        None
                    }
                };
                if let Some(value) = value {
                    if let Err(e) = put(&mut bytes, field.at, field.width, field.fixup, value, base) {
                        report.error(pos, e);
                    }
                }
            }
            chunks.push(Chunk { span, bytes, pos });
        }

        for (pos, e) in syms.settle(pending) {
            report.error(&pos, e);
        }
        tracing::debug!("{} symbols, {} relocations", syms.len(), relocs.len());

        let mut protected_ranges: Vec<Range<u32>> = Vec::new();
        for (start, end, here, pos) in protects {
            match protected(start, end, here, &syms, base) {
                Ok(range) => protected_ranges.push(range),
                Err(e) => report.error(pos, e),
            }
        }

        tracing::trace!("allocating free space");
        let mut alloc = Allocator::new(rom.as_bytes(), &ctx.config.free_space);
        for chunk in &chunks {
            alloc.reserve(chunk.span.range());
        }
        for range in &protected_ranges {
            alloc.reserve(range.start as usize..range.end as usize);
        }
        let offsets: Vec<Option<u32>> = inline
            .iter()
            .map(|data| {
                let len = inline_len(data.arg, data.element);
                if len == 0 {
                    return Some(0);
                }
                alloc
                    .allocate(len)
                    .map_err(|e| report.error(data.pos, e))
                    .ok()
            })
            .collect();

        tracing::trace!("patching {} relocations", relocs.len());
        for reloc in relocs {
            let Some(chunk) = chunks.get_mut(reloc.chunk) else {
                continue;
            };
            let value = match reloc.value {
                RelocValue::Expr(expr) => syms.resolve(expr, reloc.here),
                RelocValue::Inline(k) => Ok(offsets.get(k).copied().flatten().unwrap_or(0) as i64),
            };
            let result = value.and_then(|value| {
                put(&mut chunk.bytes, reloc.at, reloc.width, reloc.fixup, value, base)
            });
            if let Err(e) = result {
                report.error(chunk.pos, e);
            }
        }
        for (expr, here, pos) in asserts {
            if let Err(e) = syms.resolve(expr, here).and_then(assertion) {
                report.error(pos, e);
            }
        }

        let mut image = rom.as_bytes().to_vec();
        for chunk in &chunks {
            match check_write(chunk.span, image.len(), &protected_ranges) {
                Ok(()) => image[chunk.span.range()].copy_from_slice(&chunk.bytes),
                Err(e) => report.error(chunk.pos, e),
            }
        }
        for (data, offset) in inline.iter().zip(offsets) {
            let Some(offset) = offset else {
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
