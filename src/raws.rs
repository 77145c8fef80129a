//! Loader for code definition files ("raws").
//!
//! ```text
//! ## Loads a unit group
//! LOAD1, 0x2C, 8, -priority:2 -game:FE8
//!     Units, 4, 4, -struct:units
//! ```

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    code::{CodeDefinition, FieldKind, Param, Registry},
    error::LoadError,
    parse_number,
};

impl Registry {
    /// Loads every file ending in `ext` inside `dir`, in file name order.
    pub fn load_dir(dir: impl AsRef<Path>, ext: &str) -> Result<Self, LoadError> {
        let dir = dir.as_ref();
        let ext = ext.trim_start_matches('.');
        let entries = fs::read_dir(dir).map_err(|source| LoadError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| LoadError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|e| e == ext) {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(LoadError::Empty(dir.to_path_buf()));
        }
        paths.sort();
        let mut loader = Loader::new();
        for path in paths {
            loader.load_path(&path)?;
        }
        tracing::debug!("loaded {} codes from {}", loader.registry.len(), dir.display());
        Ok(loader.registry)
    }

    /// Loads one definition file (and whatever it includes).
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let mut loader = Loader::new();
        loader.load_path(path.as_ref())?;
        tracing::debug!(
            "loaded {} codes from {}",
            loader.registry.len(),
            path.as_ref().display()
        );
        Ok(loader.registry)
    }

    /// Loads definitions from memory. Includes are resolved against the
    /// working directory.
    pub fn load_str(name: &str, text: &str) -> Result<Self, LoadError> {
        let mut loader = Loader::new();
        loader.load_text(name, text, Path::new("."))?;
        Ok(loader.registry)
    }
}

struct Loader {
    registry: Registry,
    stack: Vec<PathBuf>,
    loaded: HashSet<PathBuf>,
}

struct Pending {
    code: CodeDefinition,
    len: Option<usize>,
    line: usize,
}

impl Loader {
    fn new() -> Self {
        Self {
            registry: Registry::new(),
            stack: Vec::new(),
            loaded: HashSet::new(),
        }
    }

    fn load_path(&mut self, path: &Path) -> Result<(), LoadError> {
        let canon = fs::canonicalize(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if self.stack.contains(&canon) {
            return Err(LoadError::IncludeCycle(canon));
        }
        // a manifest and a directory scan may name the same file
        if !self.loaded.insert(canon.clone()) {
            return Ok(());
        }
        let text = fs::read_to_string(&canon).map_err(|source| LoadError::Io {
            path: canon.clone(),
            source,
        })?;
        let base = canon.parent().map(Path::to_path_buf).unwrap_or_default();
        self.stack.push(canon.clone());
        let result = self.load_text(&path.display().to_string(), &text, &base);
        self.stack.pop();
        result
    }

    fn load_text(&mut self, file: &str, text: &str, base: &Path) -> Result<(), LoadError> {
        let mut pending: Option<Pending> = None;
        let mut doc: Option<String> = None;
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if let Some(text) = trimmed.strip_prefix("##") {
                let text = text.trim();
                match &mut doc {
                    Some(doc) => {
                        doc.push('\n');
                        doc.push_str(text);
                    }
                    None => doc = Some(text.to_string()),
                }
                continue;
            }
            if trimmed.is_empty() || trimmed.starts_with("//") || trimmed.starts_with(';') {
                continue;
            }
            if let Some(rest) = trimmed.strip_prefix("#include") {
                self.finish(file, pending.take())?;
                let name = quoted(rest).ok_or_else(|| malformed(file, line, "expected \"file\""))?;
                self.load_path(&base.join(name))?;
                continue;
            }
            if raw.starts_with(|c: char| c.is_whitespace()) {
                let Some(pending) = pending.as_mut() else {
                    return Err(malformed(file, line, "parameter outside of a code"));
                };
                let param = parse_param(file, line, trimmed)?;
                pending.code.params.push(param);
                continue;
            }
            self.finish(file, pending.take())?;
            let mut next = parse_code(file, line, trimmed)?;
            next.code.doc = doc.take();
            pending = Some(next);
        }
        self.finish(file, pending)
    }

    fn finish(&mut self, file: &str, pending: Option<Pending>) -> Result<(), LoadError> {
        let Some(Pending { mut code, len, line }) = pending else {
            return Ok(());
        };
        let computed = code
            .params
            .iter()
            .map(Param::end)
            .chain(std::iter::once(code.id_len))
            .max()
            .unwrap_or(0);
        code.len = len.unwrap_or(computed);
        if code.len == 0 {
            return Err(malformed(file, line, "code has no length"));
        }
        if code.id_len > code.len {
            return Err(malformed(file, line, "id is longer than the code"));
        }
        if code.id_len < 4 && u64::from(code.id) >> (8 * code.id_len) != 0 {
            return Err(malformed(file, line, "id does not fit in its id length"));
        }
        for (i, param) in code.params.iter().enumerate() {
            if param.end() > code.len {
                return Err(malformed(
                    file,
                    line,
                    &format!("parameter \"{}\" extends past the end of the code", param.name),
                ));
            }
            if param.offset < code.id_len {
                return Err(malformed(
                    file,
                    line,
                    &format!("parameter \"{}\" overlaps the code id", param.name),
                ));
            }
            if let Some(other) = code.params[..i]
                .iter()
                .find(|other| other.offset < param.end() && param.offset < other.end())
            {
                return Err(malformed(
                    file,
                    line,
                    &format!("parameters \"{}\" and \"{}\" overlap", other.name, param.name),
                ));
            }
            if code.params[..i].iter().any(|other| other.name == param.name) {
                return Err(malformed(
                    file,
                    line,
                    &format!("parameter \"{}\" declared twice", param.name),
                ));
            }
        }
        let name = code.name.clone();
        self.registry
            .insert(code)
            .map_err(|prev| LoadError::Duplicate {
                file: file.to_string(),
                line,
                name,
                prev,
            })
    }
}

fn malformed(file: &str, line: usize, msg: &str) -> LoadError {
    LoadError::Malformed {
        file: file.to_string(),
        line,
        msg: msg.to_string(),
    }
}

fn quoted(s: &str) -> Option<&str> {
    let s = s.trim();
    let s = s.strip_prefix('"')?;
    let end = s.find('"')?;
    s[end + 1..].trim().is_empty().then(|| &s[..end])
}

/// Splits a record into its positional fields and its `-flags`.
fn fields(line: &str) -> (Vec<&str>, Vec<&str>) {
    let mut positional = Vec::new();
    let mut flags = Vec::new();
    for part in line.split(',') {
        for word in part.split_whitespace() {
            if word.starts_with('-') && word[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
                flags.push(&word[1..]);
            } else {
                positional.push(word);
            }
        }
    }
    (positional, flags)
}

fn number(file: &str, line: usize, what: &str, s: &str) -> Result<i64, LoadError> {
    parse_number(s).ok_or_else(|| malformed(file, line, &format!("malformed {what} \"{s}\"")))
}

fn size(file: &str, line: usize, what: &str, s: &str) -> Result<usize, LoadError> {
    let value = number(file, line, what, s)?;
    usize::try_from(value).map_err(|_| malformed(file, line, &format!("negative {what}")))
}

fn is_name(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_code(file: &str, line: usize, text: &str) -> Result<Pending, LoadError> {
    let (positional, flags) = fields(text);
    let (name, id, len) = match positional.as_slice() {
        [name, id] => (*name, *id, None),
        [name, id, len] => (*name, *id, Some(*len)),
        _ => return Err(malformed(file, line, "expected NAME, ID[, LENGTH]")),
    };
    if !is_name(name) {
        return Err(malformed(file, line, &format!("invalid code name \"{name}\"")));
    }
    let id = number(file, line, "id", id)?;
    let id = u32::try_from(id).map_err(|_| malformed(file, line, "id out of range"))?;
    let len = len.map(|len| size(file, line, "length", len)).transpose()?;
    let mut code = CodeDefinition::new(name, id, 0);
    code.origin = format!("{file}:{line}");
    for flag in flags {
        let (key, value) = flag.split_once(':').unwrap_or((flag, ""));
        match key {
            "priority" => {
                let value = number(file, line, "priority", value)?;
                code.priority = i32::try_from(value)
                    .map_err(|_| malformed(file, line, "priority out of range"))?;
            }
            "group" if is_name(value) => code.group = value.to_string(),
            "game" if !value.is_empty() => {
                code.games = value.split(':').map(str::to_string).collect();
            }
            "end" => code.end = true,
            "noDisassembly" => code.disassemble = false,
            "idLength" => code.id_len = size(file, line, "id length", value)?,
            "align" => {
                let align = size(file, line, "alignment", value)?;
                if align == 0 {
                    return Err(malformed(file, line, "alignment of 0"));
                }
                code.align = align as u32;
            }
            _ => return Err(malformed(file, line, &format!("unknown code flag \"-{flag}\""))),
        }
    }
    Ok(Pending { code, len, line })
}

fn parse_param(file: &str, line: usize, text: &str) -> Result<Param, LoadError> {
    let (positional, flags) = fields(text);
    let [name, offset, len] = positional.as_slice() else {
        return Err(malformed(file, line, "expected NAME, POSITION, LENGTH"));
    };
    if !is_name(name) {
        return Err(malformed(file, line, &format!("invalid parameter name \"{name}\"")));
    }
    let offset = size(file, line, "position", offset)?;
    let len = size(file, line, "length", len)?;
    if len == 0 {
        return Err(malformed(file, line, "parameter of length 0"));
    }

    let mut signed = false;
    let mut hex = false;
    let mut element = 1;
    let mut kind: Option<FieldKind> = None;
    let mut set_kind = |new: FieldKind| -> Result<(), LoadError> {
        if kind.replace(new).is_some() {
            return Err(malformed(file, line, "conflicting parameter types"));
        }
        Ok(())
    };
    for flag in flags {
        let (key, value) = flag.split_once(':').unwrap_or((flag, ""));
        match key {
            "signed" => signed = true,
            "hex" => hex = true,
            "element" => element = size(file, line, "element width", value)?,
            "pointer" => set_kind(FieldKind::Pointer { element: 1 })?,
            "struct" if is_name(value) => set_kind(FieldKind::Struct {
                group: value.to_string(),
                element: 1,
            })?,
            "string" => set_kind(FieldKind::Str)?,
            "coordinates" => {
                let count = size(file, line, "coordinate count", value)?;
                if count == 0 || len % count != 0 {
                    return Err(malformed(
                        file,
                        line,
                        "coordinate count must divide the parameter length",
                    ));
                }
                set_kind(FieldKind::Array {
                    count,
                    signed: false,
                    hex: false,
                })?
            }
            _ => {
                return Err(malformed(
                    file,
                    line,
                    &format!("unknown parameter flag \"-{flag}\""),
                ))
            }
        }
    }
    if !(1..=8).contains(&element) {
        return Err(malformed(file, line, "element width must be 1 to 8"));
    }
    let kind = match kind {
        None => FieldKind::Int { signed, hex },
        Some(FieldKind::Array { count, .. }) => FieldKind::Array { count, signed, hex },
        Some(FieldKind::Pointer { .. }) => FieldKind::Pointer { element },
        Some(FieldKind::Struct { group, .. }) => FieldKind::Struct { group, element },
        Some(kind) => kind,
    };
    let width_ok = match &kind {
        FieldKind::Int { .. } | FieldKind::Pointer { .. } | FieldKind::Struct { .. } => len <= 8,
        FieldKind::Array { count, .. } => len / count <= 8,
        FieldKind::Str => true,
    };
    if !width_ok {
        return Err(malformed(file, line, "numeric parameters are at most 8 bytes"));
    }
    Ok(Param {
        name: name.to_string(),
        offset,
        len,
        kind,
    })
}
