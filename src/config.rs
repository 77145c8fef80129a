use std::{fs, path::Path};

use indexmap::IndexMap;
use serde::{de, Deserialize, Deserializer};
use serde_derive::Deserialize;

use crate::{
    alloc::FreeSpace,
    engine::EngineKind,
    error::{ConfigError, Error},
    parse_number,
    rom::IdTable,
};

/// Settings shared by every assembly and disassembly of a session,
/// normally read from a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub engine: EngineKind,

    pub warnings_are_errors: bool,

    /// Added to image offsets written into pointer parameters.
    #[serde(deserialize_with = "deserialize_bases_u32")]
    pub pointer_base: u32,

    pub free_space: FreeSpace,

    /// Extra header game codes, on top of the built in ones.
    pub games: IndexMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            warnings_are_errors: false,
            pointer_base: 0x0800_0000,
            free_space: FreeSpace::default(),
            games: IndexMap::new(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = fs::read_to_string(path.as_ref())?;
        tracing::trace!("loaded config {}", path.as_ref().display());
        Ok(Self::from_toml(&text)?)
    }

    pub fn id_table(&self) -> IdTable {
        let mut table = IdTable::default();
        for (code, name) in &self.games {
            table.insert(code, name);
        }
        table
    }
}

/// A number written either bare or as a `$hex`, `%bin`, `0x` or decimal
/// string.
#[derive(Deserialize)]
#[serde(untagged)]
enum Bases {
    Int(i64),
    Str(String),
}

fn deserialize_bases<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Bases::deserialize(deserializer)? {
        Bases::Int(value) => Ok(value),
        Bases::Str(buf) => {
            parse_number(&buf).ok_or_else(|| de::Error::custom(format!("{buf} is not a valid number")))
        }
    }
}

pub(crate) fn deserialize_bases_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = deserialize_bases(deserializer)?;
    u32::try_from(value)
        .map_err(|_| de::Error::custom(format!("{value} is not a valid address")))
}

pub(crate) fn deserialize_bases_u8<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = deserialize_bases(deserializer)?;
    u8::try_from(value).map_err(|_| de::Error::custom(format!("{value} is not a valid byte")))
}

pub(crate) fn deserialize_bases_usize<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = deserialize_bases(deserializer)?;
    usize::try_from(value).map_err(|_| de::Error::custom(format!("{value} is not a valid size")))
}
