//! The assemblers. Both engines lay out a [`Program`] with the same
//! [`Cursor`] rules and encode statements through [`layout`], so they
//! agree byte for byte; they differ only in when values are computed.

use std::{
    collections::HashSet,
    fmt::{self, Display, Formatter},
    ops::Range,
    str::FromStr,
};

use serde_derive::Deserialize;

use crate::{
    code::{CodeDefinition, FieldKind, Registry},
    config::Config,
    disasm::{self, DisassembleRequest},
    encode,
    error::{AssembleError, ConfigError},
    expr::{Expr, Symbols, Value},
    log::{Location, Log, Severity},
    program::{Arg, Program, Stmt},
    rom::Rom,
    symbols::SymbolTable,
};

mod classic;
mod colorz;

pub use classic::Classic;
pub use colorz::Colorz;

/// Everything an engine needs besides the program and the image.
pub struct Context<'a> {
    pub registry: &'a Registry,
    pub game: &'a str,
    pub config: &'a Config,
    /// Cursor position before the first `ORG`.
    pub origin: u32,
}

pub trait Engine {
    fn name(&self) -> &'static str;

    /// Writes `program` into `rom`. The image is only changed when no
    /// failing diagnostic was recorded.
    fn assemble(&self, program: &Program, ctx: &Context, rom: &mut Rom, log: &mut Log);

    fn disassemble(
        &self,
        rom: &Rom,
        ctx: &Context,
        request: &DisassembleRequest,
        log: &mut Log,
    ) -> String {
        disasm::disassemble(rom.as_bytes(), ctx, request, log)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Two pass assembler.
    #[default]
    Classic,
    /// Single pass with relocations.
    Colorz,
}

impl EngineKind {
    pub fn engine(self) -> Box<dyn Engine> {
        match self {
            EngineKind::Classic => Box::new(Classic),
            EngineKind::Colorz => Box::new(Colorz),
        }
    }
}

impl FromStr for EngineKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "classic" => Ok(EngineKind::Classic),
            "colorz" => Ok(EngineKind::Colorz),
            _ => Err(ConfigError::UnknownEngine(s.to_string())),
        }
    }
}

impl Display for EngineKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Classic => write!(f, "classic"),
            EngineKind::Colorz => write!(f, "colorz"),
        }
    }
}

/// Bytes a statement occupies in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub offset: u32,
    pub len: usize,
}

impl Span {
    pub fn range(&self) -> Range<usize> {
        self.offset as usize..self.offset as usize + self.len
    }
}

/// Script values may be written as image offsets or as addresses.
fn to_offset(value: i64, base: u32) -> Result<u32, AssembleError> {
    if value < 0 || value > u32::MAX as i64 {
        return Err(AssembleError::Range { value, width: 4 });
    }
    Ok(encode::unpointer(value as u64, base).unwrap_or(value as u32))
}

fn constant(
    expr: &Expr,
    syms: &dyn Symbols,
    here: u32,
    what: &'static str,
) -> Result<i64, AssembleError> {
    match expr.eval(syms, here)? {
        Value::Known(value) => Ok(value),
        Value::Deferred(_) => Err(AssembleError::NotConstant(what)),
    }
}

pub(crate) fn definition(registry: &Registry, index: usize) -> Result<&CodeDefinition, AssembleError> {
    registry
        .by_index(index)
        .ok_or_else(|| AssembleError::User(format!("no code with index {index}")))
}

/// Tracks the output position through `ORG`, `PUSH`, `POP` and the sizes
/// of the statements in between.
pub(crate) struct Cursor {
    pub offset: u32,
    stack: Vec<u32>,
    base: u32,
    /// Image length, `FILL` may not run past it.
    limit: usize,
}

impl Cursor {
    pub fn new(origin: u32, base: u32, limit: usize) -> Self {
        Self {
            offset: origin,
            stack: Vec::new(),
            base,
            limit,
        }
    }

    /// Moves past `stmt`, returning the bytes it writes, if any.
    pub fn step(
        &mut self,
        stmt: &Stmt,
        registry: &Registry,
        syms: &dyn Symbols,
    ) -> Result<Option<Span>, AssembleError> {
        let here = self.offset;
        let len = match stmt {
            Stmt::Code { code, .. } => definition(registry, *code)?.len,
            Stmt::Data { width, values } => width * values.len(),
            Stmt::Pointer(values) => 4 * values.len(),
            Stmt::Fill { count, .. } => {
                let count = constant(count, syms, here, "FILL")?;
                let len = usize::try_from(count).map_err(|_| AssembleError::Range {
                    value: count,
                    width: 4,
                })?;
                if (here as usize).saturating_add(len) > self.limit {
                    return Err(AssembleError::OutOfBounds { offset: here, len });
                }
                len
            }
            Stmt::Bytes(bytes) => bytes.len(),
            Stmt::Org(expr) => {
                self.offset = to_offset(constant(expr, syms, here, "ORG")?, self.base)?;
                return Ok(None);
            }
            Stmt::Align(expr) => {
                let align = constant(expr, syms, here, "ALIGN")?;
                if align > 0 {
                    let align = align as u64;
                    self.offset = ((here as u64).div_ceil(align) * align) as u32;
                }
                return Ok(None);
            }
            Stmt::Push => {
                self.stack.push(here);
                return Ok(None);
            }
            Stmt::Pop => {
                self.offset = self.stack.pop().ok_or(AssembleError::EmptyStack)?;
                return Ok(None);
            }
            Stmt::Label(_)
            | Stmt::Equ(..)
            | Stmt::Protect { .. }
            | Stmt::Assert(_)
            | Stmt::Message(..) => return Ok(None),
        };
        self.offset = here.wrapping_add(len as u32);
        Ok(Some(Span { offset: here, len }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fixup {
    Int,
    Pointer,
}

#[derive(Debug)]
pub(crate) enum Source<'a> {
    Expr(&'a Expr),
    /// Data placed in free space, the field holds its address.
    Inline { arg: &'a Arg, element: usize },
}

/// A value still to be written into a statement's bytes.
#[derive(Debug)]
pub(crate) struct Field<'a> {
    pub at: usize,
    pub width: usize,
    pub fixup: Fixup,
    pub source: Source<'a>,
}

fn int_field(at: usize, width: usize, expr: &Expr) -> Field<'_> {
    Field {
        at,
        width,
        fixup: Fixup::Int,
        source: Source::Expr(expr),
    }
}

fn mismatch(code: &CodeDefinition, param: &str) -> AssembleError {
    AssembleError::User(format!(
        "argument for \"{}\" parameter \"{param}\" has the wrong type",
        code.name
    ))
}

/// The fixed bytes of a writing statement plus the fields left to fill
/// in. `len` is the size the cursor gave it.
pub(crate) fn layout<'a>(
    stmt: &'a Stmt,
    len: usize,
    registry: &Registry,
) -> Result<(Vec<u8>, Vec<Field<'a>>), AssembleError> {
    let mut bytes = vec![0; len];
    let mut fields = Vec::new();
    match stmt {
        Stmt::Code { code, args } => {
            let code = definition(registry, *code)?;
            bytes[..code.id_len].copy_from_slice(&code.id_bytes());
            for (param, arg) in code.params.iter().zip(args) {
                match (&param.kind, arg) {
                    (FieldKind::Int { .. }, Arg::Expr(expr)) => {
                        fields.push(int_field(param.offset, param.len, expr));
                    }
                    (FieldKind::Pointer { .. } | FieldKind::Struct { .. }, Arg::Expr(expr)) => {
                        fields.push(Field {
                            at: param.offset,
                            width: param.len,
                            fixup: Fixup::Pointer,
                            source: Source::Expr(expr),
                        });
                    }
                    (FieldKind::Pointer { .. } | FieldKind::Struct { .. }, arg) => {
                        fields.push(Field {
                            at: param.offset,
                            width: param.len,
                            fixup: Fixup::Pointer,
                            source: Source::Inline {
                                arg,
                                element: param.kind.element(),
                            },
                        });
                    }
                    (FieldKind::Str, Arg::Str(text)) => {
                        let text = encode::text(text.as_bytes(), param.len)?;
                        bytes[param.offset..param.end()].copy_from_slice(&text);
                    }
                    (FieldKind::Str, Arg::List(items)) if items.len() <= param.len => {
                        for (i, item) in items.iter().enumerate() {
                            fields.push(int_field(param.offset + i, 1, item));
                        }
                    }
                    (FieldKind::Array { count, .. }, Arg::List(items)) if items.len() == *count => {
                        let width = param.len / count;
                        for (i, item) in items.iter().enumerate() {
                            fields.push(int_field(param.offset + i * width, width, item));
                        }
                    }
                    _ => return Err(mismatch(code, &param.name)),
                }
            }
        }
        Stmt::Data { width, values } => {
            for (i, value) in values.iter().enumerate() {
                fields.push(int_field(i * width, *width, value));
            }
        }
        Stmt::Pointer(values) => {
            for (i, value) in values.iter().enumerate() {
                fields.push(Field {
                    at: i * 4,
                    width: 4,
                    fixup: Fixup::Pointer,
                    source: Source::Expr(value),
                });
            }
        }
        Stmt::Fill { value, .. } => {
            for i in 0..len {
                fields.push(int_field(i, 1, value));
            }
        }
        Stmt::Bytes(data) => bytes.copy_from_slice(data),
        _ => {}
    }
    Ok((bytes, fields))
}

/// Encodes a computed field value into `bytes`.
pub(crate) fn put(
    bytes: &mut [u8],
    field_at: usize,
    width: usize,
    fixup: Fixup,
    value: i64,
    base: u32,
) -> Result<(), AssembleError> {
    let encoded = match fixup {
        Fixup::Int => encode::int(value, width)?,
        Fixup::Pointer => encode::int(encode::pointer(value, base), width)?,
    };
    bytes[field_at..field_at + width].copy_from_slice(&encoded);
    Ok(())
}

pub(crate) fn inline_len(arg: &Arg, element: usize) -> usize {
    match arg {
        Arg::List(items) => items.len() * element,
        Arg::Str(text) => text.len() + 1,
        Arg::Expr(_) => 0,
    }
}

/// Bytes of inline data placed at `at`. `CURRENTOFFSET` inside a list is
/// the address of that element.
pub(crate) fn inline_bytes(
    arg: &Arg,
    element: usize,
    at: u32,
    syms: &SymbolTable,
) -> Result<Vec<u8>, AssembleError> {
    match arg {
        Arg::List(items) => {
            let mut bytes = Vec::with_capacity(items.len() * element);
            for (i, item) in items.iter().enumerate() {
                let value = syms.resolve(item, at + (i * element) as u32)?;
                bytes.extend(encode::int(value, element)?);
            }
            Ok(bytes)
        }
        Arg::Str(text) => {
            let mut bytes = text.as_bytes().to_vec();
            bytes.push(0);
            Ok(bytes)
        }
        Arg::Expr(_) => Ok(Vec::new()),
    }
}

/// A `PROTECT` range. A single address protects one word.
pub(crate) fn protected(
    start: &Expr,
    end: Option<&Expr>,
    here: u32,
    syms: &SymbolTable,
    base: u32,
) -> Result<Range<u32>, AssembleError> {
    let start = to_offset(syms.resolve(start, here)?, base)?;
    let end = match end {
        Some(end) => to_offset(syms.resolve(end, here)?, base)?,
        None => start.saturating_add(4),
    };
    if end < start {
        return Err(AssembleError::User(format!(
            "PROTECT end ${end:08X} is before its start ${start:08X}"
        )));
    }
    Ok(start..end)
}

pub(crate) fn check_write(
    span: Span,
    image_len: usize,
    protects: &[Range<u32>],
) -> Result<(), AssembleError> {
    let range = span.range();
    if range.end > image_len {
        return Err(AssembleError::OutOfBounds {
            offset: span.offset,
            len: span.len,
        });
    }
    for p in protects {
        if (p.start as usize) < range.end && range.start < p.end as usize {
            return Err(AssembleError::Protected {
                offset: span.offset,
                start: p.start,
                end: p.end,
            });
        }
    }
    Ok(())
}

/// Checks an `ASSERT` value: negative fails.
pub(crate) fn assertion(value: i64) -> Result<(), AssembleError> {
    if value < 0 {
        Err(AssembleError::Assertion)
    } else {
        Ok(())
    }
}

/// Warns about a code placed off its alignment.
pub(crate) fn check_align(stmt: &Stmt, offset: u32, registry: &Registry) -> Option<String> {
    let Stmt::Code { code, .. } = stmt else {
        return None;
    };
    let code = registry.by_index(*code)?;
    (code.align > 1 && offset % code.align != 0).then(|| {
        format!(
            "code \"{}\" at ${offset:08X} is not aligned to {} bytes",
            code.name, code.align
        )
    })
}

/// Wraps the job log so each missing symbol is reported once and the
/// engine can tell whether it recorded a failure.
pub(crate) struct Report<'a> {
    log: &'a mut Log,
    unresolved: HashSet<String>,
    start: usize,
}

impl<'a> Report<'a> {
    pub fn new(log: &'a mut Log) -> Self {
        let start = log.error_count();
        Self {
            log,
            unresolved: HashSet::new(),
            start,
        }
    }

    pub fn error(&mut self, location: impl Into<Location>, e: AssembleError) {
        if let AssembleError::UnresolvedSymbol { name, .. } = &e {
            if !self.unresolved.insert(name.clone()) {
                return;
            }
        }
        self.log.error(location, e);
    }

    pub fn push(&mut self, severity: Severity, location: impl Into<Location>, msg: &str) {
        self.log.push(severity, location, msg);
    }

    pub fn failed(&self) -> bool {
        self.log.error_count() > self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::NoSymbols;

    #[test]
    fn engine_names() {
        assert_eq!("classic".parse::<EngineKind>().unwrap(), EngineKind::Classic);
        assert_eq!("ColorZ".parse::<EngineKind>().unwrap(), EngineKind::Colorz);
        assert!(matches!(
            "fast".parse::<EngineKind>(),
            Err(ConfigError::UnknownEngine(name)) if name == "fast"
        ));
        assert_eq!(EngineKind::Colorz.engine().name(), "colorz");
        assert_eq!(EngineKind::Classic.to_string(), "classic");
    }

    #[test]
    fn cursor_moves() {
        let registry = Registry::new();
        let mut cursor = Cursor::new(0x100, 0x0800_0000, 0x1000);
        let data = Stmt::Data {
            width: 2,
            values: vec![Expr::constant(1), Expr::constant(2), Expr::constant(3)],
        };
        let steps = [
            (Stmt::Push, None),
            (Stmt::Org(Expr::constant(0x0800_0200)), None),
            (data.clone(), Some(Span { offset: 0x200, len: 6 })),
            (Stmt::Align(Expr::constant(4)), None),
            (Stmt::Bytes(vec![1]), Some(Span { offset: 0x208, len: 1 })),
            (Stmt::Pop, None),
            (data, Some(Span { offset: 0x100, len: 6 })),
        ];
        for (stmt, span) in steps {
            assert_eq!(cursor.step(&stmt, &registry, &NoSymbols), Ok(span));
        }
        assert_eq!(cursor.step(&Stmt::Pop, &registry, &NoSymbols), Err(AssembleError::EmptyStack));
        assert_eq!(
            cursor.step(&Stmt::Org(Expr::label("later")), &registry, &NoSymbols),
            Err(AssembleError::NotConstant("ORG"))
        );
        let fill = Stmt::Fill {
            count: Expr::constant(0x7FFF_FFFF),
            value: Expr::constant(0),
        };
        assert_eq!(
            cursor.step(&fill, &registry, &NoSymbols),
            Err(AssembleError::OutOfBounds {
                offset: 0x106,
                len: 0x7FFF_FFFF
            })
        );
        assert_eq!(cursor.offset, 0x106);
    }

    #[test]
    fn writes_are_checked() {
        let protects = [0x10..0x14];
        assert_eq!(check_write(Span { offset: 0x0C, len: 4 }, 0x20, &protects), Ok(()));
        assert_eq!(
            check_write(Span { offset: 0x12, len: 4 }, 0x20, &protects),
            Err(AssembleError::Protected {
                offset: 0x12,
                start: 0x10,
                end: 0x14
            })
        );
        assert_eq!(
            check_write(Span { offset: 0x1E, len: 4 }, 0x20, &protects),
            Err(AssembleError::OutOfBounds { offset: 0x1E, len: 4 })
        );
    }

    #[test]
    fn inline_data() {
        let syms = SymbolTable::new();
        let list = Arg::List(vec![Expr::constant(1), Expr::constant(-1)]);
        assert_eq!(inline_len(&list, 2), 4);
        assert_eq!(inline_bytes(&list, 2, 0x40, &syms), Ok(vec![1, 0, 0xFF, 0xFF]));
        let text = Arg::Str("hi".to_string());
        assert_eq!(inline_len(&text, 1), 3);
        assert_eq!(inline_bytes(&text, 1, 0, &syms), Ok(b"hi\0".to_vec()));
    }
}
