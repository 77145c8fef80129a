#![allow(dead_code)]

use eventasm::{
    assemble_str, rom::GAME_CODE_OFFSET, Config, EngineKind, Options, Outcome, Registry, Rom,
};

pub const RAWS: &str = "\
## Loads a group of units
LOAD, 0x01, 8, -align:4
    units, 4, 4, -struct:units
## Runs the events at an address
CALL, 0x02, 8
    events, 4, 4, -struct:main
GOTO, 0x03, 8, -end
    events, 4, 4, -struct:main
END, 0x04, 4, -end
SET, 0x05, 4
    value, 2, 2, -signed
TEXT, 0x06, 4
    id, 2, 2, -hex
NAME, 0x07, 12
    text, 4, 8, -string
TABLE, 0x08, 8
    data, 4, 4, -pointer -element:2
MOVE, 0x09, 4
    to, 2, 2, -coordinates:2

UNIT, 0, 4, -group:units
    class, 0, 1
    level, 1, 1
    pos, 2, 2, -coordinates:2
UNITEND, 0, 4, -group:units -end -idLength:4
";

pub const SCRIPT: &str = "test.event";

/// Start of the free space in [`image`].
pub const FREE: usize = 0x200;

pub fn registry() -> Registry {
    Registry::load_str("test.txt", RAWS).unwrap()
}

/// An FE8 image: zeros up to [`FREE`], then free bytes.
pub fn image() -> Rom {
    let mut data = vec![0; 0x400];
    data[FREE..].fill(0xFF);
    data[GAME_CODE_OFFSET..GAME_CODE_OFFSET + 4].copy_from_slice(b"BE8E");
    Rom::new(data)
}

/// An FE8 image whose only free bytes are `free`.
pub fn image_with_free(free: std::ops::Range<usize>) -> Rom {
    let mut data = vec![0; 0x400];
    data[free].fill(0xFF);
    data[GAME_CODE_OFFSET..GAME_CODE_OFFSET + 4].copy_from_slice(b"BE8E");
    Rom::new(data)
}

pub fn config(engine: EngineKind) -> Config {
    Config {
        engine,
        ..Config::default()
    }
}

pub fn assemble(engine: EngineKind, script: &str, rom: &mut Rom) -> Outcome {
    assemble_str(
        SCRIPT,
        script,
        &registry(),
        rom,
        &config(engine),
        &Options::default(),
    )
}

/// Assembles into a fresh [`image`], failing the test on any error.
pub fn assembled(engine: EngineKind, script: &str) -> Rom {
    let mut rom = image();
    let outcome = assemble(engine, script, &mut rom);
    assert!(outcome.success, "{outcome}");
    rom
}
