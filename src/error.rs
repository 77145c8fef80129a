use std::{io, path::PathBuf};

use thiserror::Error;

/// Definition ("raws") files that cannot be turned into a registry.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{path}: cant read definitions: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{file}:{line}: {msg}")]
    Malformed {
        file: String,
        line: usize,
        msg: String,
    },
    #[error("{file}:{line}: code \"{name}\" is already defined at {prev}")]
    Duplicate {
        file: String,
        line: usize,
        name: String,
        prev: String,
    },
    #[error("{0}: definition include cycle")]
    IncludeCycle(PathBuf),
    #[error("{0}: no definition files found")]
    Empty(PathBuf),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{0}")]
    Syntax(String),
    #[error("include cycle through \"{0}\"")]
    IncludeCycle(String),
    #[error("file not found: \"{0}\"")]
    FileNotFound(String),
    #[error("unknown code \"{0}\"")]
    UnknownCode(String),
    #[error("code \"{name}\" takes {expected} argument(s), found {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("code \"{name}\" parameter \"{param}\": expected {expected}")]
    ArgType {
        name: String,
        param: String,
        expected: &'static str,
    },
    #[error("macro \"{name}\" takes {expected} argument(s), found {found}")]
    MacroArity {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("{0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("malformed expression")]
    Malformed,
    #[error("undefined symbol \"{0}\"")]
    Unresolved(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    #[error("undefined symbol \"{name}\"\n\tfirst used at {first_use}")]
    UnresolvedSymbol { name: String, first_use: String },
    #[error("symbol \"{0}\" already defined")]
    DuplicateSymbol(String),
    #[error("no free space for {0} bytes")]
    FreeSpaceExhausted(usize),
    #[error("write of {len} bytes at ${offset:08X} is outside the image")]
    OutOfBounds { offset: u32, len: usize },
    #[error("write at ${offset:08X} overlaps protected region ${start:08X}..${end:08X}")]
    Protected { offset: u32, start: u32, end: u32 },
    #[error("value {value} does not fit in {width} byte(s)")]
    Range { value: i64, width: usize },
    #[error("{0} requires a value known at this point")]
    NotConstant(&'static str),
    #[error("POP without matching PUSH")]
    EmptyStack,
    #[error("assertion failed")]
    Assertion,
    #[error("{0}")]
    User(String),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisassembleError {
    #[error("no matching code at ${0:08X}")]
    NoMatch(u32),
    #[error("size limit of {limit} bytes reached at ${offset:08X} without a terminator")]
    SizeLimit { offset: u32, limit: usize },
    #[error("offset ${0:08X} is outside the image")]
    OutOfBounds(u32),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported game: \"{0}\"")]
    UnknownGame(String),
    #[error("image is too small to carry a game code")]
    NoGameCode,
    #[error("{0}: image is already opened by another operation")]
    ImageInUse(PathBuf),
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("unknown engine \"{0}\"")]
    UnknownEngine(String),
    #[error("unknown disassembly mode \"{0}\"")]
    UnknownMode(String),
    #[error("{0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    #[error(transparent)]
    Disassemble(#[from] DisassembleError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
}
