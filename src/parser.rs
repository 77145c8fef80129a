//! Script front end: preprocessor, macro expansion and statement parsing.
//!
//! Tokens come from a stack of streams. The bottom one reads the root
//! script; `#include` pushes another [`Lexer`] and every macro use pushes an
//! [`Expansion`]. A stream that runs dry is popped and reading continues
//! in the one below it.
//!
//! Errors are logged and parsing resumes at the next line so that a whole
//! script is checked in one go. Only an include cycle stops the parse.

use std::{
    fs, mem,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;

use crate::{
    code::{CodeDefinition, FieldKind, Registry},
    error::ParseError,
    expr::{Expr, ExprBuilder, ExprNode},
    lexer::{Expansion, Lexer, Macro, MacroTok, TokStream},
    log::{Log, Severity},
    program::{Arg, Program, Statement, Stmt},
    Pos, Tok,
};

enum Source {
    /// Canonical path, when the text came from disk.
    File(Option<PathBuf>),
    Macro(String),
    Replay,
}

struct Frame {
    stream: Box<dyn TokStream>,
    source: Source,
}

fn syntax(msg: impl Into<String>) -> ParseError {
    ParseError::Syntax(msg.into())
}

pub struct Parser<'a> {
    root: Frame,
    toks: Vec<Frame>,
    registry: &'a Registry,
    game: &'a str,
    includes: Vec<PathBuf>,
    macros: IndexMap<String, Macro>,
    conds: usize,
    // an included file ended, which terminates its last statement
    pending_newline: bool,
    statements: Vec<Statement>,
    log: Log,
}

impl<'a> Parser<'a> {
    pub fn new(lexer: Lexer, registry: &'a Registry, game: &'a str) -> Self {
        Self {
            root: Frame {
                stream: Box::new(lexer),
                source: Source::File(None),
            },
            toks: Vec::new(),
            registry,
            game,
            includes: Vec::new(),
            macros: IndexMap::new(),
            conds: 0,
            pending_newline: false,
            statements: Vec::new(),
            log: Log::new(),
        }
    }

    pub fn from_file(
        path: &Path,
        registry: &'a Registry,
        game: &'a str,
    ) -> Result<Self, ParseError> {
        let text = fs::read(path).map_err(|e| ParseError::Io(format!("{}: {e}", path.display())))?;
        let mut parser = Self::new(Lexer::new(text, &path.display().to_string()), registry, game);
        parser.root.source = Source::File(fs::canonicalize(path).ok());
        Ok(parser)
    }

    /// Directories searched by `#include` and `#incbin` after the directory
    /// of the including file.
    pub fn include_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.includes.extend(dirs);
        self
    }

    /// Pre-defines `name` as a macro expanding to `value`.
    pub fn define(&mut self, name: &str, value: i64) {
        let pos = Pos::new("<command line>", 0, 0);
        self.macros.insert(
            name.to_string(),
            Macro {
                name: name.to_string(),
                params: None,
                body: vec![(pos, MacroTok::Num(value))],
            },
        );
    }

    /// Parses the whole script. Every problem found goes into `log`; the
    /// error return is reserved for failures that stop the parse early.
    pub fn parse(mut self, log: &mut Log) -> Result<Program, ParseError> {
        tracing::trace!("parsing {}", self.root.stream.source());
        let result = self.run();
        log.extend(mem::take(&mut self.log));
        result?;
        tracing::debug!("parsed {} statements", self.statements.len());
        Ok(Program {
            statements: self.statements,
        })
    }

    fn run(&mut self) -> Result<(), ParseError> {
        loop {
            match self.statement() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    let pos = self.top().pos();
                    self.log.error(pos, &e);
                    if let ParseError::IncludeCycle(_) = e {
                        return Err(e);
                    }
                    self.recover();
                }
            }
        }
        if self.conds != 0 {
            let pos = self.top().pos();
            self.log.error(pos, "missing #endif");
        }
        Ok(())
    }

    fn top(&self) -> &dyn TokStream {
        match self.toks.last() {
            Some(frame) => frame.stream.as_ref(),
            None => self.root.stream.as_ref(),
        }
    }

    fn top_mut(&mut self) -> &mut dyn TokStream {
        match self.toks.last_mut() {
            Some(frame) => frame.stream.as_mut(),
            None => self.root.stream.as_mut(),
        }
    }

    fn frames(&self) -> impl DoubleEndedIterator<Item = &Frame> {
        std::iter::once(&self.root).chain(self.toks.iter())
    }

    fn push(&mut self, stream: impl TokStream + 'static, source: Source) {
        self.toks.push(Frame {
            stream: Box::new(stream),
            source,
        });
    }

    /// Next token without macro expansion.
    fn peek_raw(&mut self) -> Result<Tok, ParseError> {
        if self.pending_newline {
            return Ok(Tok::NEWLINE);
        }
        loop {
            let tok = self.top_mut().peek()?;
            if tok != Tok::EOF || self.toks.is_empty() {
                return Ok(tok);
            }
            if let Some(Frame {
                source: Source::File(_),
                ..
            }) = self.toks.pop()
            {
                self.pending_newline = true;
                return Ok(Tok::NEWLINE);
            }
        }
    }

    fn peek(&mut self) -> Result<Tok, ParseError> {
        loop {
            let tok = self.peek_raw()?;
            if tok != Tok::ID || self.pending_newline || !self.top().expands() {
                return Ok(tok);
            }
            let mac = match self.macros.get(self.top().str()) {
                Some(mac) if !self.expanding(&mac.name) => mac.clone(),
                _ => return Ok(tok),
            };
            self.expand(mac)?;
        }
    }

    fn eat(&mut self) {
        if self.pending_newline {
            self.pending_newline = false;
        } else {
            self.top_mut().eat();
        }
    }

    fn expanding(&self, name: &str) -> bool {
        self.frames()
            .any(|frame| matches!(&frame.source, Source::Macro(active) if active == name))
    }

    fn capture(&self, tok: Tok) -> MacroTok {
        match tok {
            Tok::ID => MacroTok::Id(self.top().str().to_string()),
            Tok::STR => MacroTok::Str(self.top().str().to_string()),
            Tok::NUM => MacroTok::Num(self.top().num()),
            tok => MacroTok::Tok(tok),
        }
    }

    fn recover(&mut self) {
        loop {
            match self.peek_raw() {
                Ok(Tok::EOF) => return,
                Ok(Tok::NEWLINE) => {
                    self.eat();
                    return;
                }
                _ => self.eat(),
            }
        }
    }

    fn eol(&mut self) -> Result<(), ParseError> {
        match self.peek()? {
            Tok::NEWLINE => {
                self.eat();
                Ok(())
            }
            Tok::EOF => Ok(()),
            tok => Err(syntax(format!("expected end of line, found {tok}"))),
        }
    }

    fn name(&mut self, what: &str) -> Result<String, ParseError> {
        if self.peek_raw()? != Tok::ID {
            return Err(syntax(format!("expected {what}")));
        }
        let name = self.top().str().to_string();
        self.eat();
        Ok(name)
    }

    fn expand(&mut self, mac: Macro) -> Result<(), ParseError> {
        let pos = self.top().pos();
        self.eat();
        let args = match &mac.params {
            None => Vec::new(),
            Some(params) => {
                // a function-like macro without arguments is left alone
                if self.peek_raw()? != Tok::LPAREN {
                    let toks = vec![(pos, MacroTok::Id(mac.name.clone()))];
                    self.push(Expansion::replay(&mac.name, toks), Source::Replay);
                    return Ok(());
                }
                self.eat();
                let args = self.macro_args(params.len())?;
                if args.len() != params.len() {
                    return Err(ParseError::MacroArity {
                        name: mac.name.clone(),
                        expected: params.len(),
                        found: args.len(),
                    });
                }
                args
            }
        };
        let expansion = Expansion::new(&mac, args);
        self.push(expansion, Source::Macro(mac.name));
        Ok(())
    }

    fn macro_args(&mut self, expected: usize) -> Result<Vec<Vec<(Pos, MacroTok)>>, ParseError> {
        let mut args = Vec::new();
        let mut arg = Vec::new();
        let mut depth = 0usize;
        loop {
            let tok = self.peek_raw()?;
            let pos = self.top().pos();
            match tok {
                Tok::NEWLINE | Tok::EOF => return Err(syntax("unterminated macro arguments")),
                Tok::LPAREN | Tok::LBRACKET => depth += 1,
                Tok::RPAREN if depth == 0 => {
                    self.eat();
                    if !arg.is_empty() || !args.is_empty() || expected > 0 {
                        args.push(arg);
                    }
                    return Ok(args);
                }
                Tok::RPAREN | Tok::RBRACKET => depth = depth.saturating_sub(1),
                Tok::COMMA if depth == 0 => {
                    self.eat();
                    args.push(mem::take(&mut arg));
                    continue;
                }
                _ => {}
            }
            arg.push((pos, self.capture(tok)));
            self.eat();
        }
    }

    fn statement(&mut self) -> Result<bool, ParseError> {
        let tok = self.peek()?;
        let pos = self.top().pos();
        match tok {
            Tok::EOF => return Ok(false),
            Tok::NEWLINE => self.eat(),
            Tok::INCLUDE | Tok::INCBIN => self.include(pos, tok == Tok::INCBIN)?,
            Tok::DEFINE => self.define_directive()?,
            Tok::UNDEF => {
                self.eat();
                let name = self.name("macro name")?;
                self.macros.shift_remove(&name);
                self.eol()?;
            }
            Tok::IFDEF | Tok::IFNDEF => self.conditional(tok)?,
            Tok::ELSE => {
                if self.conds == 0 {
                    return Err(syntax("#else without #ifdef"));
                }
                self.eat();
                self.skip_block(false)?;
                self.conds -= 1;
            }
            Tok::ENDIF => {
                if self.conds == 0 {
                    return Err(syntax("#endif without #ifdef"));
                }
                self.eat();
                self.conds -= 1;
            }
            Tok::ID => self.named(pos)?,
            tok => return Err(syntax(format!("unexpected {tok}"))),
        }
        Ok(true)
    }

    fn include(&mut self, pos: Pos, binary: bool) -> Result<(), ParseError> {
        self.eat();
        if self.peek_raw()? != Tok::STR {
            return Err(syntax("expected file name"));
        }
        let name = self.top().str().to_string();
        self.eat();
        self.eol()?;
        let path = self
            .find_file(&name)
            .ok_or_else(|| ParseError::FileNotFound(name.clone()))?;
        let io = |e: std::io::Error| ParseError::Io(format!("{}: {e}", path.display()));
        if binary {
            let bytes = fs::read(&path).map_err(io)?;
            self.statements.push(Statement {
                pos,
                stmt: Stmt::Bytes(bytes),
            });
            return Ok(());
        }
        let canon = fs::canonicalize(&path).map_err(io)?;
        if self
            .frames()
            .any(|frame| matches!(&frame.source, Source::File(Some(open)) if *open == canon))
        {
            return Err(ParseError::IncludeCycle(name));
        }
        let text = fs::read(&path).map_err(io)?;
        tracing::trace!("including {}", path.display());
        let lexer = Lexer::new(text, &path.display().to_string());
        self.push(lexer, Source::File(Some(canon)));
        Ok(())
    }

    fn find_file(&self, name: &str) -> Option<PathBuf> {
        let dir = self.frames().rev().find_map(|frame| match &frame.source {
            Source::File(Some(path)) => path.parent().map(Path::to_path_buf),
            _ => None,
        });
        let first = match dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        };
        std::iter::once(first)
            .chain(self.includes.iter().map(|dir| dir.join(name)))
            .find(|path| path.is_file())
    }

    fn define_directive(&mut self) -> Result<(), ParseError> {
        self.eat();
        if self.peek_raw()? != Tok::ID {
            return Err(syntax("expected macro name"));
        }
        let name = self.top().str().to_string();
        let pos = self.top().pos();
        self.eat();

        // `NAME(` with no space declares parameters
        let mut params = None;
        if self.peek_raw()? == Tok::LPAREN {
            let next = self.top().pos();
            if next.line == pos.line && next.column == pos.column + name.len() {
                self.eat();
                let mut list = Vec::new();
                if self.peek_raw()? == Tok::RPAREN {
                    self.eat();
                } else {
                    loop {
                        list.push(self.name("parameter name")?);
                        match self.peek_raw()? {
                            Tok::COMMA => self.eat(),
                            Tok::RPAREN => {
                                self.eat();
                                break;
                            }
                            tok => return Err(syntax(format!("expected `,` or `)`, found {tok}"))),
                        }
                    }
                }
                params = Some(list);
            }
        }

        let mut body = Vec::new();
        loop {
            let tok = self.peek_raw()?;
            if tok == Tok::NEWLINE || tok == Tok::EOF {
                break;
            }
            let pos = self.top().pos();
            let arg = match (&params, tok) {
                (Some(params), Tok::ID) => {
                    let string = self.top().str();
                    params.iter().position(|param| param == string)
                }
                _ => None,
            };
            let mac_tok = match arg {
                Some(index) => MacroTok::Arg(index),
                None => self.capture(tok),
            };
            body.push((pos, mac_tok));
            self.eat();
        }
        if self.macros.contains_key(&name) {
            self.log.warning(pos, format!("macro \"{name}\" redefined"));
        }
        self.macros.insert(name.clone(), Macro { name, params, body });
        Ok(())
    }

    fn conditional(&mut self, tok: Tok) -> Result<(), ParseError> {
        self.eat();
        let name = self.name("macro name")?;
        self.eol()?;
        let defined = self.macros.contains_key(&name);
        if defined == (tok == Tok::IFDEF) || self.skip_block(true)? == Tok::ELSE {
            self.conds += 1;
        }
        Ok(())
    }

    /// Skips to the `#endif` (or `#else`) closing the current block and
    /// returns which one it found.
    fn skip_block(&mut self, stop_at_else: bool) -> Result<Tok, ParseError> {
        let mut depth = 0usize;
        loop {
            let tok = match self.top_mut().peek() {
                Ok(tok) => tok,
                Err(_) => {
                    self.top_mut().eat();
                    continue;
                }
            };
            match tok {
                Tok::EOF => return Err(syntax("unterminated conditional block")),
                Tok::IFDEF | Tok::IFNDEF => depth += 1,
                Tok::ELSE if depth == 0 && stop_at_else => {
                    self.top_mut().eat();
                    return Ok(tok);
                }
                Tok::ENDIF if depth == 0 => {
                    self.top_mut().eat();
                    return Ok(tok);
                }
                Tok::ENDIF => depth -= 1,
                _ => {}
            }
            self.top_mut().eat();
        }
    }

    fn named(&mut self, pos: Pos) -> Result<(), ParseError> {
        let name = self.top().str().to_string();
        self.eat();
        let stmt = match name.as_str() {
            "ORG" => Stmt::Org(self.expr()?),
            "PUSH" => Stmt::Push,
            "POP" => Stmt::Pop,
            "ALIGN" => Stmt::Align(self.expr()?),
            "BYTE" => Stmt::Data {
                width: 1,
                values: self.data(true)?,
            },
            "SHORT" => Stmt::Data {
                width: 2,
                values: self.data(false)?,
            },
            "WORD" => Stmt::Data {
                width: 4,
                values: self.data(false)?,
            },
            "POIN" => Stmt::Pointer(self.data(false)?),
            "FILL" => {
                let count = self.expr()?;
                let value = self.optional_expr()?.unwrap_or_else(|| Expr::constant(0));
                Stmt::Fill { count, value }
            }
            "PROTECT" => {
                let start = self.expr()?;
                let end = self.optional_expr()?;
                Stmt::Protect { start, end }
            }
            "ASSERT" => Stmt::Assert(self.expr()?),
            "MESSAGE" | "WARNING" | "ERROR" => {
                let severity = match name.as_str() {
                    "MESSAGE" => Severity::Message,
                    "WARNING" => Severity::Warning,
                    _ => Severity::Error,
                };
                if self.peek()? != Tok::STR {
                    return Err(syntax(format!("{name} expects a string")));
                }
                let text = self.top().str().to_string();
                self.eat();
                Stmt::Message(severity, text)
            }
            _ => match self.peek()? {
                Tok::COLON => {
                    self.eat();
                    // another statement may follow on the same line
                    self.statements.push(Statement {
                        pos,
                        stmt: Stmt::Label(name),
                    });
                    return Ok(());
                }
                Tok::EQU => {
                    self.eat();
                    Stmt::Equ(name, self.expr()?)
                }
                _ => return self.invoke(pos, name),
            },
        };
        self.eol()?;
        self.statements.push(Statement { pos, stmt });
        Ok(())
    }

    fn invoke(&mut self, pos: Pos, name: String) -> Result<(), ParseError> {
        let registry = self.registry;
        let Some(code) = registry.get(&name, self.game) else {
            let e = if registry.contains_name(&name) {
                syntax(format!("code \"{name}\" is not available for {}", self.game))
            } else {
                ParseError::UnknownCode(name)
            };
            self.log.error(pos, e);
            self.recover();
            return Ok(());
        };
        let args = if self.peek()? == Tok::LPAREN {
            self.eat();
            self.args()?
        } else {
            Vec::new()
        };
        self.eol()?;
        match check_args(code, &args) {
            Ok(()) => self.statements.push(Statement {
                pos,
                stmt: Stmt::Code {
                    code: code.index,
                    args,
                },
            }),
            Err(e) => self.log.error(pos, e),
        }
        Ok(())
    }

    fn args(&mut self) -> Result<Vec<Arg>, ParseError> {
        let mut args = Vec::new();
        if self.peek()? == Tok::RPAREN {
            self.eat();
            return Ok(args);
        }
        loop {
            args.push(self.arg()?);
            match self.peek()? {
                Tok::COMMA => self.eat(),
                Tok::RPAREN => {
                    self.eat();
                    return Ok(args);
                }
                tok => return Err(syntax(format!("expected `,` or `)`, found {tok}"))),
            }
        }
    }

    fn arg(&mut self) -> Result<Arg, ParseError> {
        match self.peek()? {
            Tok::STR => {
                let string = self.top().str().to_string();
                self.eat();
                Ok(Arg::Str(string))
            }
            Tok::LBRACKET => {
                self.eat();
                if self.peek()? == Tok::RBRACKET {
                    return Err(syntax("empty list"));
                }
                let mut items = Vec::new();
                loop {
                    items.push(self.expr()?);
                    match self.peek()? {
                        Tok::COMMA => self.eat(),
                        Tok::RBRACKET => {
                            self.eat();
                            return Ok(Arg::List(items));
                        }
                        tok => return Err(syntax(format!("expected `,` or `]`, found {tok}"))),
                    }
                }
            }
            _ => Ok(Arg::Expr(self.expr()?)),
        }
    }

    /// Comma separated values. Strings count as one value per byte when
    /// `strings` is set.
    fn data(&mut self, strings: bool) -> Result<Vec<Expr>, ParseError> {
        let mut values = Vec::new();
        loop {
            if strings && self.peek()? == Tok::STR {
                values.extend(self.top().str().bytes().map(|b| Expr::constant(b as i64)));
                self.eat();
            } else {
                values.push(self.expr()?);
            }
            if self.peek()? != Tok::COMMA {
                return Ok(values);
            }
            self.eat();
        }
    }

    fn optional_expr(&mut self) -> Result<Option<Expr>, ParseError> {
        if self.peek()? != Tok::COMMA {
            return Ok(None);
        }
        self.eat();
        self.expr().map(Some)
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let mut builder = ExprBuilder::new();
        loop {
            let tok = self.peek()?;
            match tok {
                Tok::NUM => builder.value(ExprNode::Const(self.top().num())).map_err(syntax)?,
                Tok::ID => {
                    let node = match self.top().str() {
                        "CURRENTOFFSET" => ExprNode::Here,
                        name => ExprNode::Label(name.to_string()),
                    };
                    builder.value(node).map_err(syntax)?;
                }
                Tok::LPAREN => builder.open().map_err(syntax)?,
                Tok::RPAREN => {
                    if !builder.close().map_err(syntax)? {
                        break;
                    }
                }
                tok => {
                    if !builder.operator(tok).map_err(syntax)? {
                        break;
                    }
                }
            }
            self.eat();
        }
        builder.finish().map_err(syntax)
    }
}

/// Checks an invocation against the code's parameter list.
fn check_args(code: &CodeDefinition, args: &[Arg]) -> Result<(), ParseError> {
    if args.len() != code.params.len() {
        return Err(ParseError::Arity {
            name: code.name.clone(),
            expected: code.params.len(),
            found: args.len(),
        });
    }
    for (param, arg) in code.params.iter().zip(args) {
        match (&param.kind, arg) {
            (FieldKind::Int { .. }, Arg::Expr(_)) => {}
            (FieldKind::Pointer { .. } | FieldKind::Struct { .. }, _) => {}
            (FieldKind::Str, Arg::Str(text)) => {
                if text.len() > param.len {
                    return Err(syntax(format!(
                        "code \"{}\" parameter \"{}\": string is longer than {} bytes",
                        code.name, param.name, param.len
                    )));
                }
            }
            // raw bytes for text that is not printable
            (FieldKind::Str, Arg::List(items)) => {
                if items.len() > param.len {
                    return Err(syntax(format!(
                        "code \"{}\" parameter \"{}\": more than {} bytes",
                        code.name, param.name, param.len
                    )));
                }
            }
            (FieldKind::Array { count, .. }, Arg::List(items)) => {
                if items.len() != *count {
                    return Err(syntax(format!(
                        "code \"{}\" parameter \"{}\": expected {count} values, found {}",
                        code.name,
                        param.name,
                        items.len()
                    )));
                }
            }
            (kind, _) => {
                return Err(ParseError::ArgType {
                    name: code.name.clone(),
                    param: param.name.clone(),
                    expected: kind.describe(),
                })
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::NoSymbols;

    const RAWS: &str = "\
ENDA, 0x0120, 4, -end
MOVE, 0x2A, 8
    Unit, 2, 2
    Position, 4, 4, -coordinates:2
TEXT, 0x30, 8
    Text, 4, 4, -pointer
NAME, 0x31, 12
    Name, 4, 8, -string
FE8ONLY, 0x40, 4, -game:FE8
";

    fn parse(text: &str) -> (Program, Log) {
        let registry = Registry::load_str("raws.txt", RAWS).unwrap();
        let mut log = Log::new();
        let program = Parser::new(Lexer::new(text, "test.event"), &registry, "FE7")
            .parse(&mut log)
            .unwrap();
        (program, log)
    }

    fn value(expr: &Expr) -> i64 {
        expr.resolve(&NoSymbols, 0).unwrap()
    }

    #[test]
    fn statements() {
        let (program, log) = parse(
            "ORG 0x100\nstart: MOVE(3, [1, 2]); ENDA\nTEXT(start)\nX = 4 * 2\nPUSH\nBYTE 1, \"ab\"\nPOP\n",
        );
        assert!(log.is_empty(), "{log}");
        let stmts: Vec<&Stmt> = program.iter().map(|s| &s.stmt).collect();
        assert_eq!(stmts.len(), 9);
        assert!(matches!(stmts[0], Stmt::Org(e) if value(e) == 0x100));
        assert_eq!(stmts[1], &Stmt::Label("start".to_string()));
        assert!(matches!(stmts[2], Stmt::Code { code: 1, args } if args.len() == 2));
        assert!(matches!(stmts[3], Stmt::Code { code: 0, args } if args.is_empty()));
        assert!(matches!(stmts[4], Stmt::Code { code: 2, args } if args == &[Arg::Expr(Expr::label("start"))]));
        assert!(matches!(stmts[5], Stmt::Equ(name, e) if name == "X" && value(e) == 8));
        assert_eq!(stmts[6], &Stmt::Push);
        match stmts[7] {
            Stmt::Data { width: 1, values } => {
                assert_eq!(values.iter().map(value).collect::<Vec<_>>(), [1, 97, 98])
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(program.statements[2].pos, Pos::new("test.event", 2, 8));
    }

    #[test]
    fn macros() {
        let (program, log) = parse(
            "#define BASE 0x10\n#define ADD(a, b) (a + b)\n#define NEG (-1)\nWORD ADD(BASE, 2) * 2, NEG, ADD\n",
        );
        assert!(log.is_empty(), "{log}");
        let Stmt::Data { width: 4, values } = &program.statements[0].stmt else {
            panic!("expected WORD");
        };
        assert_eq!(value(&values[0]), 0x24);
        assert_eq!(value(&values[1]), -1);
        // without arguments a function-like macro is just a name
        assert_eq!(values[2], Expr::label("ADD"));
    }

    #[test]
    fn self_referencing_macro_stops() {
        let (program, log) = parse("#define A A + 1\nBYTE A\n");
        assert!(log.is_empty(), "{log}");
        let Stmt::Data { values, .. } = &program.statements[0].stmt else {
            panic!("expected BYTE");
        };
        assert_eq!(values[0].labels().collect::<Vec<_>>(), ["A"]);
    }

    #[test]
    fn conditionals() {
        let (program, log) = parse(
            "#define DEBUG\n#ifdef DEBUG\nBYTE 1\n#else\nBYTE 2\n#endif\n#ifndef DEBUG\nBYTE 3\n#ifdef X\n#endif\n#else\nBYTE 4\n#endif\n",
        );
        assert!(log.is_empty(), "{log}");
        let bytes: Vec<i64> = program
            .iter()
            .map(|s| match &s.stmt {
                Stmt::Data { values, .. } => value(&values[0]),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(bytes, [1, 4]);
    }

    #[test]
    fn errors_are_collected() {
        let (program, log) = parse(
            "BOGUS(1)\nMOVE(1)\nBYTE 1\nNAME(5)\nMOVE(1, [1, 2, 3])\nFE8ONLY\nBYTE (1\nENDA\n",
        );
        let messages: Vec<String> = log.diagnostics().iter().map(|d| d.to_string()).collect();
        assert_eq!(
            messages,
            [
                "test.event:1:1: error: unknown code \"BOGUS\"",
                "test.event:2:1: error: code \"MOVE\" takes 2 argument(s), found 1",
                "test.event:4:1: error: code \"NAME\" parameter \"Name\": expected a string",
                "test.event:5:1: error: code \"MOVE\" parameter \"Position\": expected 2 values, found 3",
                "test.event:6:1: error: code \"FE8ONLY\" is not available for FE7",
                "test.event:7:8: error: unbalanced parens",
            ]
        );
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn include_cycle_is_fatal() {
        let dir = std::env::temp_dir().join(format!("eventasm-parse-{}", std::process::id()));
        fs::create_dir_all(dir.join("lib")).unwrap();
        fs::write(dir.join("a.event"), "BYTE 1\n#include \"lib/b.event\"\nBYTE 3").unwrap();
        fs::write(dir.join("lib/b.event"), "BYTE 2\n#include \"../a.event\"\n").unwrap();
        fs::write(dir.join("ok.event"), "#include \"lib/c.event\"\nBYTE 9\n#incbin \"blob.bin\"").unwrap();
        fs::write(dir.join("lib/c.event"), "BYTE 8").unwrap();
        fs::write(dir.join("blob.bin"), [1u8, 2, 3]).unwrap();

        let registry = Registry::new();
        let mut log = Log::new();
        let result = Parser::from_file(&dir.join("a.event"), &registry, "FE8")
            .unwrap()
            .parse(&mut log);
        assert!(matches!(result, Err(ParseError::IncludeCycle(name)) if name == "../a.event"));
        assert_eq!(log.error_count(), 1);

        let mut log = Log::new();
        let program = Parser::from_file(&dir.join("ok.event"), &registry, "FE8")
            .unwrap()
            .parse(&mut log)
            .unwrap();
        assert!(log.is_empty(), "{log}");
        assert_eq!(program.len(), 3);
        assert_eq!(program.statements[2].stmt, Stmt::Bytes(vec![1, 2, 3]));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn command_line_defines() {
        let registry = Registry::new();
        let mut log = Log::new();
        let mut parser = Parser::new(Lexer::new("BYTE LEVEL", "t"), &registry, "FE8");
        parser.define("LEVEL", 3);
        let program = parser.parse(&mut log).unwrap();
        let Stmt::Data { values, .. } = &program.statements[0].stmt else {
            panic!("expected BYTE");
        };
        assert_eq!(value(&values[0]), 3);
    }
}
