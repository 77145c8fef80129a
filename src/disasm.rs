//! Turns bytes back into script text.
//!
//! At every cursor the best matching [`CodeDefinition`] is picked (highest
//! priority, then the most fixed id bytes, then the earliest declared).
//! In [`DisassemblyMode::Structure`] mode the addresses held in `-struct`
//! parameters are queued and decoded as their own blocks, each at most
//! once, so shared and cyclic pointer graphs terminate.

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet, HashSet, VecDeque},
    fmt::{self, Display, Formatter, Write},
    str::FromStr,
};

use crate::{
    code::{CodeDefinition, FieldKind, Param},
    encode,
    engine::Context,
    error::{ConfigError, DisassembleError},
    log::{Location, Log},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisassemblyMode {
    /// Follow `-struct` pointers and decode what they point at.
    #[default]
    Structure,
    /// Decode one linear run, pointers are only printed.
    ToEnd,
}

impl FromStr for DisassemblyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "structure" => Ok(DisassemblyMode::Structure),
            "to-end" | "toend" => Ok(DisassemblyMode::ToEnd),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

impl Display for DisassemblyMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DisassemblyMode::Structure => write!(f, "structure"),
            DisassemblyMode::ToEnd => write!(f, "to-end"),
        }
    }
}

pub const DEFAULT_SIZE_LIMIT: usize = 0x1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassembleRequest {
    pub offset: u32,
    pub mode: DisassemblyMode,
    /// Bytes decoded per block before giving up on finding a terminator.
    pub size_limit: usize,
    /// Restricts the first block to codes of this group.
    pub group: Option<String>,
}

impl DisassembleRequest {
    pub fn new(offset: u32, mode: DisassemblyMode) -> Self {
        Self {
            offset,
            mode,
            size_limit: DEFAULT_SIZE_LIMIT,
            group: None,
        }
    }
}

pub fn label(offset: u32) -> String {
    format!("label_{offset:06X}")
}

struct Block {
    start: u32,
    lines: Vec<(u32, String)>,
}

struct Disassembler<'a> {
    image: &'a [u8],
    ctx: &'a Context<'a>,
    mode: DisassemblyMode,
    size_limit: usize,
    queue: VecDeque<(u32, Option<String>)>,
    queued: HashSet<u32>,
    /// Decoded codes, start to end.
    decoded: BTreeMap<u32, u32>,
    labels: BTreeSet<u32>,
    blocks: Vec<Block>,
}

/// Decodes the image at `request.offset`. Problems are logged at the
/// image offset they were found at; whatever was decoded is still
/// returned.
pub fn disassemble(
    image: &[u8],
    ctx: &Context,
    request: &DisassembleRequest,
    log: &mut Log,
) -> String {
    let base = ctx.config.pointer_base;
    let start = encode::unpointer(request.offset as u64, base)
        .filter(|_| request.offset >= base)
        .unwrap_or(request.offset);
    if start as usize >= image.len() {
        log.error(Location::Offset(start), DisassembleError::OutOfBounds(start));
        return String::new();
    }
    let mut dis = Disassembler {
        image,
        ctx,
        mode: request.mode,
        size_limit: request.size_limit,
        queue: VecDeque::from([(start, request.group.clone())]),
        queued: HashSet::from([start]),
        decoded: BTreeMap::new(),
        labels: BTreeSet::new(),
        blocks: Vec::new(),
    };
    tracing::trace!("disassembling ${start:08X} in {} mode", request.mode);
    while let Some((offset, group)) = dis.queue.pop_front() {
        dis.block(offset, group.as_deref(), log);
    }
    tracing::debug!("decoded {} blocks", dis.blocks.len());
    dis.render()
}

impl<'a> Disassembler<'a> {
    fn base(&self) -> u32 {
        self.ctx.config.pointer_base
    }

    fn block(&mut self, start: u32, group: Option<&str>, log: &mut Log) {
        let mut block = Block {
            start,
            lines: Vec::new(),
        };
        let mut cursor = start;
        loop {
            if cursor != start
                && (self.decoded.contains_key(&cursor) || self.queued.contains(&cursor))
            {
                break;
            }
            if cursor as usize >= self.image.len() {
                break;
            }
            if (cursor - start) as usize >= self.size_limit {
                log.warning(
                    Location::Offset(start),
                    DisassembleError::SizeLimit {
                        offset: start,
                        limit: self.size_limit,
                    },
                );
                break;
            }
            let Some(code) = self.best(cursor, group) else {
                log.error(Location::Offset(cursor), DisassembleError::NoMatch(cursor));
                break;
            };
            let end = cursor + code.len as u32;
            if (cursor + 1..end).any(|at| self.queued.contains(&at)) {
                break;
            }
            self.decoded.insert(cursor, end);
            let image = self.image;
            let bytes = &image[cursor as usize..cursor as usize + code.len];
            let text = self.render_code(code, bytes);
            block.lines.push((cursor, text));
            cursor = end;
            if code.end {
                break;
            }
        }
        self.blocks.push(block);
    }

    /// The code that decodes the bytes at `offset`, if any.
    fn best(&self, offset: u32, group: Option<&str>) -> Option<&'a CodeDefinition> {
        let registry = self.ctx.registry;
        let at = offset as usize;
        registry
            .for_game(self.ctx.game)
            .filter(|code| code.disassemble)
            .filter(|code| group.map_or(true, |g| code.group == g))
            .filter(|code| at + code.len <= self.image.len())
            .filter(|code| offset % code.align.max(1) == 0)
            .filter(|code| self.fits(code, &self.image[at..at + code.len]))
            .max_by_key(|code| (code.priority, code.id_len, Reverse(code.index)))
    }

    /// Checks the id, that bytes no parameter covers are zero, and that
    /// sub-structure pointers are null or point into the image.
    fn fits(&self, code: &CodeDefinition, bytes: &[u8]) -> bool {
        if !code.matches_id(bytes) {
            return false;
        }
        let covered = |i: usize| {
            i < code.id_len || code.params.iter().any(|p| (p.offset..p.end()).contains(&i))
        };
        if (0..code.len).any(|i| !covered(i) && bytes[i] != 0) {
            return false;
        }
        code.params
            .iter()
            .filter(|p| matches!(p.kind, FieldKind::Struct { .. }))
            .all(|p| {
                let raw = encode::read_uint(&bytes[p.offset..p.end()]);
                raw == 0
                    || encode::unpointer(raw, self.base())
                        .is_some_and(|target| (target as usize) < self.image.len())
            })
    }

    /// Whether `offset` falls after the start of an already decoded code.
    fn inside_code(&self, offset: u32) -> bool {
        self.decoded
            .range(..offset)
            .next_back()
            .is_some_and(|(_, &end)| offset < end)
    }

    fn render_code(&mut self, code: &CodeDefinition, bytes: &[u8]) -> String {
        if code.params.is_empty() {
            return code.name.clone();
        }
        let args: Vec<String> = code
            .params
            .iter()
            .map(|param| self.render_param(param, &bytes[param.offset..param.end()]))
            .collect();
        format!("{}({})", code.name, args.join(", "))
    }

    fn render_param(&mut self, param: &Param, bytes: &[u8]) -> String {
        match &param.kind {
            FieldKind::Int { signed, hex } => number(encode::read_int(bytes, *signed), *hex),
            FieldKind::Pointer { .. } => address(encode::read_uint(bytes), self.base()),
            FieldKind::Struct { group, .. } => {
                let raw = encode::read_uint(bytes);
                match encode::unpointer(raw, self.base()) {
                    Some(target)
                        if target != 0
                            && self.mode == DisassemblyMode::Structure
                            && !self.inside_code(target) =>
                    {
                        self.labels.insert(target);
                        if !self.decoded.contains_key(&target) && self.queued.insert(target) {
                            self.queue.push_back((target, Some(group.clone())));
                        }
                        label(target)
                    }
                    _ => address(raw, self.base()),
                }
            }
            FieldKind::Str => match encode::read_text(bytes) {
                Some(text) => format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\"")),
                None => list(bytes.iter().map(|&b| number(b as i64, true))),
            },
            FieldKind::Array { count, signed, hex } => {
                let width = param.len / count;
                list(
                    bytes
                        .chunks(width)
                        .take(*count)
                        .map(|element| number(encode::read_int(element, *signed), *hex)),
                )
            }
        }
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for (i, block) in self.blocks.iter().enumerate() {
            if i != 0 {
                out.push('\n');
            }
            let _ = writeln!(out, "ORG 0x{:X}", block.start);
            let _ = writeln!(out, "{}:", label(block.start));
            for (offset, text) in &block.lines {
                if *offset != block.start && self.labels.contains(offset) {
                    let _ = writeln!(out, "{}:", label(*offset));
                }
                let _ = writeln!(out, "{text}");
            }
        }
        out
    }
}

fn number(value: i64, hex: bool) -> String {
    match (hex, value < 0) {
        (false, _) => value.to_string(),
        (true, false) => format!("0x{value:X}"),
        (true, true) => format!("-0x{:X}", value.unsigned_abs()),
    }
}

/// Renders a pointer so that it encodes back to the same bytes.
fn address(raw: u64, base: u32) -> String {
    match encode::unpointer(raw, base) {
        Some(offset) if offset != 0 => format!("0x{offset:X}"),
        _ if raw == 0 => "0".to_string(),
        _ => format!("0x{raw:X}"),
    }
}

fn list(items: impl Iterator<Item = String>) -> String {
    format!("[{}]", items.collect::<Vec<_>>().join(", "))
}
