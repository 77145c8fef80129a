//! Entry points that run a whole job and report it as an [`Outcome`].

use std::{
    fmt::{self, Display, Formatter},
    path::{Path, PathBuf},
};

use crate::{
    code::Registry,
    config::Config,
    disasm::DisassembleRequest,
    engine::{Context, EngineKind},
    lexer::Lexer,
    log::{Location, Log},
    parser::Parser,
    rom::{Game, Rom},
};

/// Per job settings that do not belong in the configuration file.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub include_dirs: Vec<PathBuf>,
    /// Symbols defined before the script is read, like `-D NAME=1`.
    pub defines: Vec<(String, i64)>,
    pub origin: u32,
    /// Overrides the configured engine.
    pub engine: Option<EngineKind>,
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub success: bool,
    pub log: Log,
}

impl From<Log> for Outcome {
    fn from(log: Log) -> Self {
        Self {
            success: !log.has_errors(),
            log,
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.log)
    }
}

fn identify(rom: &Rom, config: &Config, log: &mut Log) -> Option<Game> {
    match Game::identify(rom.as_bytes(), &config.id_table()) {
        Ok(game) => {
            tracing::debug!("target is {} ({})", game.name, game.code);
            Some(game)
        }
        Err(e) => {
            log.error(Location::None, e);
            None
        }
    }
}

/// Assembles the script at `path` into `rom`.
pub fn assemble_file(
    path: impl AsRef<Path>,
    registry: &Registry,
    rom: &mut Rom,
    config: &Config,
    options: &Options,
) -> Outcome {
    let mut log = Log::with_warnings_as_errors(config.warnings_are_errors);
    let Some(game) = identify(rom, config, &mut log) else {
        return log.into();
    };
    match Parser::from_file(path.as_ref(), registry, &game.name) {
        Ok(parser) => run(parser, &game, registry, rom, config, options, log),
        Err(e) => {
            log.error(Location::None, e);
            log.into()
        }
    }
}

/// Assembles script text held in memory. `name` is used in diagnostics.
pub fn assemble_str(
    name: &str,
    text: &str,
    registry: &Registry,
    rom: &mut Rom,
    config: &Config,
    options: &Options,
) -> Outcome {
    let mut log = Log::with_warnings_as_errors(config.warnings_are_errors);
    let Some(game) = identify(rom, config, &mut log) else {
        return log.into();
    };
    let parser = Parser::new(Lexer::new(text, name), registry, &game.name);
    run(parser, &game, registry, rom, config, options, log)
}

fn run(
    parser: Parser,
    game: &Game,
    registry: &Registry,
    rom: &mut Rom,
    config: &Config,
    options: &Options,
    mut log: Log,
) -> Outcome {
    let mut parser = parser.include_dirs(options.include_dirs.iter().cloned());
    for (name, value) in &options.defines {
        parser.define(name, *value);
    }
    let Ok(program) = parser.parse(&mut log) else {
        return log.into();
    };
    if log.has_errors() {
        tracing::trace!("not assembling, the script has errors");
        return log.into();
    }
    let engine = options.engine.unwrap_or(config.engine).engine();
    tracing::debug!("assembling {} statements with {}", program.len(), engine.name());
    let ctx = Context {
        registry,
        game: &game.name,
        config,
        origin: options.origin,
    };
    engine.assemble(&program, &ctx, rom, &mut log);
    log.into()
}

/// Decodes `rom` as described by `request`.
pub fn disassemble(
    rom: &Rom,
    registry: &Registry,
    config: &Config,
    request: &DisassembleRequest,
) -> (String, Outcome) {
    let mut log = Log::with_warnings_as_errors(config.warnings_are_errors);
    let Some(game) = identify(rom, config, &mut log) else {
        return (String::new(), log.into());
    };
    let ctx = Context {
        registry,
        game: &game.name,
        config,
        origin: 0,
    };
    let text = config.engine.engine().disassemble(rom, &ctx, request, &mut log);
    (text, log.into())
}
