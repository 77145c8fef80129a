use std::{
    error::Error as StdError,
    fmt::{self, Display, Formatter},
    str::FromStr,
    sync::Arc,
};

pub mod alloc;
pub mod code;
pub mod config;
pub mod disasm;
pub mod encode;
pub mod engine;
pub mod error;
pub mod expr;
pub mod lexer;
pub mod log;
pub mod parser;
pub mod program;
pub mod raws;
pub mod rom;
pub mod session;
pub mod symbols;

pub use code::{CodeDefinition, FieldKind, Param, Registry};
pub use config::Config;
pub use disasm::{DisassembleRequest, DisassemblyMode};
pub use engine::{Engine, EngineKind};
pub use error::{
    AssembleError, ConfigError, DisassembleError, Error, EvalError, LoadError, ParseError,
};
pub use log::{Diagnostic, Location, Log, Severity};
pub use rom::{Game, IdTable, Rom, RomFile};
pub use session::{assemble_file, assemble_str, disassemble, Options, Outcome};

pub fn parse_defines<T, U>(s: &str) -> Result<(T, U), Box<dyn StdError + Send + Sync + 'static>>
where
    T: FromStr,
    T::Err: StdError + Send + Sync + 'static,
    U: FromStr,
    U::Err: StdError + Send + Sync + 'static,
{
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid SYMBOL=value: no `=` found in `{s}`"))?;
    Ok((s[..pos].parse()?, s[pos + 1..].parse()?))
}

/// Integer that accepts `$hex`, `0x` hex, `%bin`, `0b` bin and decimal,
/// for command line offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Number(pub i64);

impl FromStr for Number {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_number(s)
            .map(Number)
            .ok_or_else(|| format!("{s} is not a valid number"))
    }
}

pub fn parse_number(s: &str) -> Option<i64> {
    let s = s.trim();
    let (neg, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let s = s.replace('_', "");
    let value = if let Some(hex) = s.strip_prefix('$') {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = s.strip_prefix('%') {
        i64::from_str_radix(bin, 2).ok()?
    } else if let Some(bin) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()?
    } else {
        s.parse::<i64>().ok()?
    };
    Some(if neg { -value } else { value })
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pos {
    pub file: Arc<str>,
    pub line: usize,
    pub column: usize,
}

impl Pos {
    pub fn new(file: &str, line: usize, column: usize) -> Self {
        Self {
            file: Arc::from(file),
            line,
            column,
        }
    }
}

impl Display for Pos {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Tok(pub u8);

impl Tok {
    pub const NEWLINE: Self = Self(b'\n');
    pub const MODULUS: Self = Self(b'%');
    pub const SOLIDUS: Self = Self(b'/');
    pub const STAR: Self = Self(b'*');
    pub const PLUS: Self = Self(b'+');
    pub const MINUS: Self = Self(b'-');
    pub const LT: Self = Self(b'<');
    pub const GT: Self = Self(b'>');
    pub const AMP: Self = Self(b'&');
    pub const CARET: Self = Self(b'^');
    pub const PIPE: Self = Self(b'|');
    pub const LPAREN: Self = Self(b'(');
    pub const RPAREN: Self = Self(b')');
    pub const LBRACKET: Self = Self(b'[');
    pub const RBRACKET: Self = Self(b']');
    pub const BANG: Self = Self(b'!');
    pub const TILDE: Self = Self(b'~');
    pub const COMMA: Self = Self(b',');
    pub const COLON: Self = Self(b':');
    pub const EQU: Self = Self(b'=');

    pub const EOF: Self = Self(0x80);
    pub const ID: Self = Self(0x81);
    pub const NUM: Self = Self(0x82);
    pub const STR: Self = Self(0x83);

    pub const INCLUDE: Self = Self(0x90);
    pub const INCBIN: Self = Self(0x91);
    pub const DEFINE: Self = Self(0x92);
    pub const UNDEF: Self = Self(0x93);
    pub const IFDEF: Self = Self(0x94);
    pub const IFNDEF: Self = Self(0x95);
    pub const ELSE: Self = Self(0x96);
    pub const ENDIF: Self = Self(0x97);

    pub const ASL: Self = Self(0xC0); // <<
    pub const ASR: Self = Self(0xC1); // >>
    pub const LTE: Self = Self(0xC3); // <=
    pub const GTE: Self = Self(0xC4); // >=
    pub const LEQ: Self = Self(0xC5); // ==
    pub const NEQ: Self = Self(0xC6); // !=
    pub const AND: Self = Self(0xC7); // &&
    pub const LOR: Self = Self(0xC8); // ||
}

impl Display for Tok {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            Tok::NEWLINE => write!(f, "end of line"),
            Tok::EOF => write!(f, "end of file"),
            Tok::ID => write!(f, "identifier"),
            Tok::NUM => write!(f, "number"),
            Tok::STR => write!(f, "string"),
            Tok::INCLUDE => write!(f, "#include"),
            Tok::INCBIN => write!(f, "#incbin"),
            Tok::DEFINE => write!(f, "#define"),
            Tok::UNDEF => write!(f, "#undef"),
            Tok::IFDEF => write!(f, "#ifdef"),
            Tok::IFNDEF => write!(f, "#ifndef"),
            Tok::ELSE => write!(f, "#else"),
            Tok::ENDIF => write!(f, "#endif"),
            Tok::ASL => write!(f, "<<"),
            Tok::ASR => write!(f, ">>"),
            Tok::LTE => write!(f, "<="),
            Tok::GTE => write!(f, ">="),
            Tok::LEQ => write!(f, "=="),
            Tok::NEQ => write!(f, "!="),
            Tok::AND => write!(f, "&&"),
            Tok::LOR => write!(f, "||"),
            Tok(c) => write!(f, "`{}`", c as char),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_in_every_base() {
        assert_eq!(parse_number("$FF"), Some(255));
        assert_eq!(parse_number("0x10"), Some(16));
        assert_eq!(parse_number("%101"), Some(5));
        assert_eq!(parse_number("0b11"), Some(3));
        assert_eq!(parse_number("-12"), Some(-12));
        assert_eq!(parse_number("1_000"), Some(1000));
        assert_eq!(parse_number("zz"), None);
    }

    #[test]
    fn defines() {
        let (name, value) = parse_defines::<String, i32>("DEBUG=1").unwrap();
        assert_eq!(name, "DEBUG");
        assert_eq!(value, 1);
        assert!(parse_defines::<String, i32>("DEBUG").is_err());
    }
}
