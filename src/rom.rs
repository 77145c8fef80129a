use std::{
    fs::{self, File, TryLockError},
    io::{Read, Seek, SeekFrom, Write},
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use indexmap::IndexMap;

use crate::error::{AssembleError, ConfigError, Error};

/// A fixed size image in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rom {
    data: Vec<u8>,
}

impl Rom {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn read(&self, offset: u32, len: usize) -> Option<&[u8]> {
        self.data.get(offset as usize..(offset as usize).checked_add(len)?)
    }

    pub fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), AssembleError> {
        let start = offset as usize;
        let end = start + bytes.len();
        if end > self.data.len() {
            return Err(AssembleError::OutOfBounds {
                offset,
                len: bytes.len(),
            });
        }
        self.data[start..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Swaps in a new buffer of the same contents length.
    pub fn replace(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

/// Canonical paths of every image currently opened through [`RomFile`].
static OPEN: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

struct Claim {
    path: PathBuf,
}

impl Claim {
    fn take(path: PathBuf) -> Result<Self, ConfigError> {
        let mut open = OPEN.lock().unwrap_or_else(PoisonError::into_inner);
        if open.contains(&path) {
            return Err(ConfigError::ImageInUse(path));
        }
        open.push(path.clone());
        Ok(Self { path })
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut open = OPEN.lock().unwrap_or_else(PoisonError::into_inner);
        open.retain(|p| p != &self.path);
    }
}

/// An image loaded from disk for the exclusive use of one operation.
/// Opening the same file again before this handle is dropped fails, in
/// this process or any other that honors the file lock.
pub struct RomFile {
    rom: Rom,
    file: File,
    claim: Claim,
}

impl RomFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = fs::canonicalize(path.as_ref())?;
        let claim = Claim::take(path)?;
        let mut file = File::options().read(true).write(true).open(&claim.path)?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(ConfigError::ImageInUse(claim.path.clone()).into())
            }
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        tracing::debug!("opened {} ({} bytes)", claim.path.display(), data.len());
        Ok(Self {
            rom: Rom::new(data),
            file,
            claim,
        })
    }

    pub fn path(&self) -> &Path {
        &self.claim.path
    }

    /// Writes the buffer back through the locked handle.
    pub fn save(&self) -> Result<(), Error> {
        tracing::trace!("writing {}", self.claim.path.display());
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(self.rom.as_bytes())?;
        file.set_len(self.rom.len() as u64)?;
        file.flush()?;
        Ok(())
    }

    pub fn save_as(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        tracing::trace!("writing {}", path.as_ref().display());
        fs::write(path, self.rom.as_bytes())?;
        Ok(())
    }
}

impl Deref for RomFile {
    type Target = Rom;

    fn deref(&self) -> &Rom {
        &self.rom
    }
}

impl DerefMut for RomFile {
    fn deref_mut(&mut self) -> &mut Rom {
        &mut self.rom
    }
}

/// Offset of the 4 byte game code in the cartridge header.
pub const GAME_CODE_OFFSET: usize = 0xAC;

/// Maps header game codes to the names used by `-game` flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdTable {
    games: IndexMap<String, String>,
}

impl Default for IdTable {
    fn default() -> Self {
        let games = [
            ("AFEJ", "FE6"),
            ("AE7E", "FE7"),
            ("BE8E", "FE8"),
            ("AE7J", "FE7J"),
            ("BE8J", "FE8J"),
        ]
        .into_iter()
        .map(|(code, name)| (code.to_string(), name.to_string()))
        .collect();
        Self { games }
    }
}

impl IdTable {
    pub fn insert(&mut self, code: &str, name: &str) {
        self.games.insert(code.to_string(), name.to_string());
    }

    pub fn get(&self, code: &str) -> Option<&str> {
        self.games.get(code).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    pub code: String,
    pub name: String,
}

impl Game {
    /// Reads the game code from the header and looks it up.
    pub fn identify(image: &[u8], table: &IdTable) -> Result<Self, ConfigError> {
        let raw = image
            .get(GAME_CODE_OFFSET..GAME_CODE_OFFSET + 4)
            .ok_or(ConfigError::NoGameCode)?;
        let code = String::from_utf8_lossy(raw).into_owned();
        match table.get(&code) {
            Some(name) => Ok(Self {
                name: name.to_string(),
                code,
            }),
            None => Err(ConfigError::UnknownGame(code)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use super::*;

    fn header(code: &[u8; 4]) -> Vec<u8> {
        let mut image = vec![0; 0x100];
        image[GAME_CODE_OFFSET..GAME_CODE_OFFSET + 4].copy_from_slice(code);
        image
    }

    #[test]
    fn identification() {
        let table = IdTable::default();
        let game = Game::identify(&header(b"BE8E"), &table).unwrap();
        assert_eq!(game.name, "FE8");
        assert!(matches!(
            Game::identify(&header(b"ZZZZ"), &table),
            Err(ConfigError::UnknownGame(code)) if code == "ZZZZ"
        ));
        assert!(matches!(
            Game::identify(&[0; 0xAE], &table),
            Err(ConfigError::NoGameCode)
        ));

        let mut table = table;
        table.insert("ZZZZ", "HACK");
        assert_eq!(Game::identify(&header(b"ZZZZ"), &table).unwrap().name, "HACK");
    }

    #[test]
    fn writes_are_bounded() {
        let mut rom = Rom::new(vec![0; 8]);
        rom.write(4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(rom.read(4, 4), Some(&[1, 2, 3, 4][..]));
        assert_eq!(
            rom.write(6, &[1, 2, 3]),
            Err(AssembleError::OutOfBounds { offset: 6, len: 3 })
        );
        assert_eq!(rom.read(6, 3), None);
        assert_eq!(rom.read(u32::MAX, 2), None);
    }

    #[test]
    fn exclusive_open() {
        let path = env::temp_dir().join(format!("eventasm-rom-{}.gba", std::process::id()));
        fs::write(&path, header(b"BE8E")).unwrap();
        {
            let mut first = RomFile::open(&path).unwrap();
            assert!(matches!(
                RomFile::open(&path),
                Err(Error::Config(ConfigError::ImageInUse(_)))
            ));
            first.write(0, &[0xAA]).unwrap();
            first.save().unwrap();
        }
        let again = RomFile::open(&path).unwrap();
        assert_eq!(again.as_bytes()[0], 0xAA);
        drop(again);

        // a lock held through another handle also keeps the image busy
        let other = File::open(&path).unwrap();
        other.lock().unwrap();
        assert!(matches!(
            RomFile::open(&path),
            Err(Error::Config(ConfigError::ImageInUse(_)))
        ));
        other.unlock().unwrap();
        drop(other);
        assert!(RomFile::open(&path).is_ok());
        fs::remove_file(&path).unwrap();
    }
}
