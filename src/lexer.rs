use std::{io::Read, sync::Arc};

use crate::{error::ParseError, Pos, Tok};

const DIRECTIVES: &[(&str, Tok)] = &[
    ("include", Tok::INCLUDE),
    ("incbin", Tok::INCBIN),
    ("define", Tok::DEFINE),
    ("undef", Tok::UNDEF),
    ("ifdef", Tok::IFDEF),
    ("ifndef", Tok::IFNDEF),
    ("else", Tok::ELSE),
    ("endif", Tok::ENDIF),
];

const DIGRAPHS: &[(&[u8; 2], Tok)] = &[
    (b"<<", Tok::ASL),
    (b">>", Tok::ASR),
    (b"<=", Tok::LTE),
    (b">=", Tok::GTE),
    (b"==", Tok::LEQ),
    (b"!=", Tok::NEQ),
    (b"&&", Tok::AND),
    (b"||", Tok::LOR),
];

pub trait TokStream {
    fn peek(&mut self) -> Result<Tok, ParseError>;

    fn eat(&mut self);

    fn str(&self) -> &str;

    fn num(&self) -> i64;

    fn pos(&self) -> Pos;

    /// Whether identifiers from this stream may start a macro expansion.
    fn expands(&self) -> bool {
        true
    }

    /// Name of the file or macro this stream reads from.
    fn source(&self) -> &str;
}

struct PeekReader {
    buf: Vec<u8>,
    index: usize,
    line: usize,
    column: usize,
}

impl PeekReader {
    fn new(buf: Vec<u8>) -> Self {
        Self {
            buf,
            index: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.buf.get(self.index + 1).copied()
    }

    fn eat(&mut self) {
        if let Some(c) = self.peek() {
            self.index += 1;
            self.column += 1;
            if c == b'\n' {
                self.line += 1;
                self.column = 1;
            }
        }
    }
}

pub struct Lexer {
    reader: PeekReader,
    string: String,
    number: i64,
    stash: Option<Tok>,
    pos: Pos,
}

impl Lexer {
    pub fn new(text: impl Into<Vec<u8>>, file: &str) -> Self {
        Self {
            reader: PeekReader::new(text.into()),
            string: String::new(),
            number: 0,
            stash: None,
            pos: Pos::new(file, 1, 1),
        }
    }

    pub fn from_reader<R: Read>(mut reader: R, file: &str) -> std::io::Result<Self> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(Self::new(buf, file))
    }

    fn err(&self, msg: &str) -> ParseError {
        ParseError::Syntax(msg.to_string())
    }

    fn skip_blank(&mut self) -> Result<(), ParseError> {
        loop {
            match (self.reader.peek(), self.reader.peek_next()) {
                (Some(b' ' | b'\t' | b'\r'), _) => self.reader.eat(),
                // line continuation
                (Some(b'\\'), Some(b'\n')) => {
                    self.reader.eat();
                    self.reader.eat();
                }
                (Some(b'\\'), Some(b'\r')) => {
                    self.reader.eat();
                    self.reader.eat();
                    if self.reader.peek() == Some(b'\n') {
                        self.reader.eat();
                    }
                }
                (Some(b'/'), Some(b'/')) => {
                    while !matches!(self.reader.peek(), Some(b'\n') | None) {
                        self.reader.eat();
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    self.pos.line = self.reader.line;
                    self.pos.column = self.reader.column;
                    self.reader.eat();
                    self.reader.eat();
                    loop {
                        match (self.reader.peek(), self.reader.peek_next()) {
                            (Some(b'*'), Some(b'/')) => {
                                self.reader.eat();
                                self.reader.eat();
                                break;
                            }
                            (Some(_), _) => self.reader.eat(),
                            (None, _) => return Err(self.err("unterminated comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn escape(&mut self) -> Result<char, ParseError> {
        let c = match self.reader.peek() {
            Some(b'n') => '\n',
            Some(b'r') => '\r',
            Some(b't') => '\t',
            Some(b'\\') => '\\',
            Some(b'"') => '"',
            Some(b'\'') => '\'',
            Some(b'0') => '\0',
            _ => return Err(self.err("invalid escape")),
        };
        self.reader.eat();
        Ok(c)
    }

    fn number(&mut self) -> Result<Tok, ParseError> {
        let mut radix = 10;
        if self.reader.peek() == Some(b'$') {
            self.reader.eat();
            radix = 16;
        } else if self.reader.peek() == Some(b'0') {
            match self.reader.peek_next() {
                Some(b'x' | b'X') => {
                    self.reader.eat();
                    self.reader.eat();
                    radix = 16;
                }
                Some(b'b' | b'B') => {
                    self.reader.eat();
                    self.reader.eat();
                    radix = 2;
                }
                _ => {}
            }
        }
        while let Some(c) = self.reader.peek() {
            if c == b'_' {
                self.reader.eat();
                continue; // allow '_' separators in numbers
            }
            if !c.is_ascii_alphanumeric() {
                break;
            }
            self.string.push(c as char);
            self.reader.eat();
        }
        self.number = i64::from_str_radix(&self.string, radix)
            .map_err(|e| self.err(&format!("malformed number \"{}\": {e}", self.string)))?;
        self.string.clear();
        self.stash = Some(Tok::NUM);
        Ok(Tok::NUM)
    }
}

impl TokStream for Lexer {
    fn peek(&mut self) -> Result<Tok, ParseError> {
        if let Some(tok) = self.stash {
            return Ok(tok);
        }
        self.skip_blank()?;
        self.pos.line = self.reader.line;
        self.pos.column = self.reader.column;
        match self.reader.peek() {
            None => {
                self.stash = Some(Tok::EOF);
                Ok(Tok::EOF)
            }
            // statement separators
            Some(b'\n' | b';') => {
                self.reader.eat();
                self.stash = Some(Tok::NEWLINE);
                Ok(Tok::NEWLINE)
            }
            // preprocessor directive
            Some(b'#') => {
                self.reader.eat();
                while let Some(c) = self.reader.peek() {
                    if !c.is_ascii_alphanumeric() {
                        break;
                    }
                    self.reader.eat();
                    self.string.push(c.to_ascii_lowercase() as char);
                }
                if let Some(tok) = DIRECTIVES
                    .iter()
                    .find_map(|(s, tok)| (*s == self.string).then_some(tok))
                    .copied()
                {
                    self.string.clear();
                    self.stash = Some(tok);
                    return Ok(tok);
                }
                let msg = format!("unrecognized directive \"#{}\"", self.string);
                self.string.clear();
                Err(self.err(&msg))
            }
            // number
            Some(c) if c.is_ascii_digit() || c == b'$' => self.number(),
            // string
            Some(b'"') => {
                self.reader.eat();
                let mut bytes = Vec::new();
                loop {
                    match self.reader.peek() {
                        Some(b'"') => {
                            self.reader.eat();
                            break;
                        }
                        Some(b'\\') => {
                            self.reader.eat();
                            bytes.push(self.escape()? as u8);
                        }
                        Some(b'\n') | None => return Err(self.err("unterminated string")),
                        Some(c) => {
                            bytes.push(c);
                            self.reader.eat();
                        }
                    }
                }
                self.string = String::from_utf8(bytes)
                    .map_err(|_| self.err("string is not valid UTF-8"))?;
                self.stash = Some(Tok::STR);
                Ok(Tok::STR)
            }
            // char
            Some(b'\'') => {
                self.reader.eat();
                self.number = match self.reader.peek() {
                    Some(b'\\') => {
                        self.reader.eat();
                        self.escape()? as i64
                    }
                    Some(c) => {
                        self.reader.eat();
                        c as i64
                    }
                    None => return Err(self.err("invalid character")),
                };
                if self.reader.peek() != Some(b'\'') {
                    return Err(self.err("invalid character"));
                }
                self.reader.eat();
                self.stash = Some(Tok::NUM);
                Ok(Tok::NUM)
            }
            // idents
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => {
                while let Some(c) = self.reader.peek() {
                    if !c.is_ascii_alphanumeric() && c != b'_' {
                        break;
                    }
                    self.reader.eat();
                    self.string.push(c as char);
                }
                self.stash = Some(Tok::ID);
                Ok(Tok::ID)
            }
            // digraphs and single chars
            Some(c) => {
                self.reader.eat();
                if let Some(nc) = self.reader.peek() {
                    if let Some(tok) = DIGRAPHS
                        .iter()
                        .find_map(|(bs, tok)| (**bs == [c, nc]).then_some(tok))
                        .copied()
                    {
                        self.reader.eat();
                        self.stash = Some(tok);
                        return Ok(tok);
                    }
                }
                if !c.is_ascii_graphic() {
                    return Err(self.err(&format!("unexpected character 0x{c:02X}")));
                }
                self.stash = Some(Tok(c));
                Ok(Tok(c))
            }
        }
    }

    fn eat(&mut self) {
        self.string.clear();
        self.stash.take();
    }

    fn str(&self) -> &str {
        &self.string
    }

    fn num(&self) -> i64 {
        self.number
    }

    fn pos(&self) -> Pos {
        self.pos.clone()
    }

    fn source(&self) -> &str {
        &self.pos.file
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroTok {
    Tok(Tok),
    Str(String),
    Id(String),
    Num(i64),
    Arg(usize),
}

/// Token list recorded by `#define`.
#[derive(Debug, Clone)]
pub struct Macro {
    pub name: String,
    pub params: Option<Vec<String>>,
    pub body: Vec<(Pos, MacroTok)>,
}

/// Replays a macro body with its arguments substituted. Also used to push
/// back tokens the parser already consumed.
pub struct Expansion {
    name: Arc<str>,
    body: Vec<(Pos, MacroTok)>,
    args: Vec<Vec<(Pos, MacroTok)>>,
    index: usize,
    arg_index: usize,
    expands: bool,
}

impl Expansion {
    pub fn new(mac: &Macro, args: Vec<Vec<(Pos, MacroTok)>>) -> Self {
        Self {
            name: Arc::from(mac.name.as_str()),
            body: mac.body.clone(),
            args,
            index: 0,
            arg_index: 0,
            expands: true,
        }
    }

    /// Tokens that are handed back verbatim and never expanded again.
    pub fn replay(source: &str, toks: Vec<(Pos, MacroTok)>) -> Self {
        Self {
            name: Arc::from(source),
            body: toks,
            args: Vec::new(),
            index: 0,
            arg_index: 0,
            expands: false,
        }
    }

    fn current(&self) -> Option<&(Pos, MacroTok)> {
        match self.body.get(self.index)? {
            (_, MacroTok::Arg(arg)) => self.args.get(*arg)?.get(self.arg_index),
            tok => Some(tok),
        }
    }

    /// Moves past empty arguments so `current` always has a token.
    fn settle(&mut self) {
        while let Some((_, MacroTok::Arg(arg))) = self.body.get(self.index) {
            let len = self.args.get(*arg).map_or(0, Vec::len);
            if self.arg_index < len {
                return;
            }
            self.arg_index = 0;
            self.index += 1;
        }
    }
}

impl TokStream for Expansion {
    fn peek(&mut self) -> Result<Tok, ParseError> {
        self.settle();
        Ok(match self.current() {
            None => Tok::EOF,
            Some((_, MacroTok::Tok(tok))) => *tok,
            Some((_, MacroTok::Str(_))) => Tok::STR,
            Some((_, MacroTok::Id(_))) => Tok::ID,
            Some((_, MacroTok::Num(_))) => Tok::NUM,
            Some((_, MacroTok::Arg(_))) => {
                return Err(ParseError::Syntax(format!(
                    "in macro \"{}\": nested argument reference",
                    self.name
                )))
            }
        })
    }

    fn eat(&mut self) {
        self.settle();
        if let Some((_, MacroTok::Arg(_))) = self.body.get(self.index) {
            self.arg_index += 1;
            self.settle();
            return;
        }
        if self.index < self.body.len() {
            self.index += 1;
        }
    }

    fn str(&self) -> &str {
        match self.current() {
            Some((_, MacroTok::Str(string) | MacroTok::Id(string))) => string,
            _ => "",
        }
    }

    fn num(&self) -> i64 {
        match self.current() {
            Some((_, MacroTok::Num(value))) => *value,
            _ => 0,
        }
    }

    fn pos(&self) -> Pos {
        match self.current().or_else(|| self.body.last()) {
            Some((pos, _)) => pos.clone(),
            None => Pos::new(&self.name, 0, 0),
        }
    }

    fn expands(&self) -> bool {
        self.expands
    }

    fn source(&self) -> &str {
        &self.name
    }
}
