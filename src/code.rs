use indexmap::IndexMap;

/// How a parameter's bytes are read and written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Int {
        signed: bool,
        hex: bool,
    },
    /// An address that is written but never followed.
    Pointer {
        element: usize,
    },
    /// An address of a sub-structure made of codes from `group`.
    Struct {
        group: String,
        element: usize,
    },
    /// Fixed-length NUL padded text.
    Str,
    /// `count` equal-width values, written `[a, b]`.
    Array {
        count: usize,
        signed: bool,
        hex: bool,
    },
}

impl FieldKind {
    pub fn is_pointer(&self) -> bool {
        matches!(self, FieldKind::Pointer { .. } | FieldKind::Struct { .. })
    }

    /// Width of one inline data element when a pointer is given a list.
    pub fn element(&self) -> usize {
        match self {
            FieldKind::Pointer { element } | FieldKind::Struct { element, .. } => *element,
            _ => 1,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            FieldKind::Int { .. } => "a value",
            FieldKind::Pointer { .. } | FieldKind::Struct { .. } => "an address or inline data",
            FieldKind::Str => "a string",
            FieldKind::Array { .. } => "a list",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub offset: usize,
    pub len: usize,
    pub kind: FieldKind,
}

impl Param {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// One code (mnemonic) loaded from the definition files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeDefinition {
    pub name: String,
    pub id: u32,
    pub id_len: usize,
    pub len: usize,
    pub params: Vec<Param>,
    pub priority: i32,
    pub group: String,
    /// Empty means every game.
    pub games: Vec<String>,
    /// Terminates a list of codes when disassembling.
    pub end: bool,
    pub disassemble: bool,
    pub align: u32,
    pub doc: Option<String>,
    /// Declaration order across the whole registry.
    pub index: usize,
    pub origin: String,
}

impl CodeDefinition {
    pub fn new(name: &str, id: u32, len: usize) -> Self {
        Self {
            name: name.to_string(),
            id,
            id_len: if id != 0 { 2 } else { 0 },
            len,
            params: Vec::new(),
            priority: 0,
            group: DEFAULT_GROUP.to_string(),
            games: Vec::new(),
            end: false,
            disassemble: true,
            align: 1,
            doc: None,
            index: 0,
            origin: String::new(),
        }
    }

    pub fn for_game(&self, game: &str) -> bool {
        self.games.is_empty() || self.games.iter().any(|g| g.eq_ignore_ascii_case(game))
    }

    fn shares_game(&self, other: &CodeDefinition) -> bool {
        self.games.is_empty()
            || other.games.is_empty()
            || self.games.iter().any(|g| other.for_game(g))
    }

    /// The fixed bytes at the start of every instance of this code.
    pub fn id_bytes(&self) -> Vec<u8> {
        let id = self.id.to_le_bytes();
        (0..self.id_len)
            .map(|i| id.get(i).copied().unwrap_or(0))
            .collect()
    }

    pub fn matches_id(&self, bytes: &[u8]) -> bool {
        bytes.len() >= self.id_len && bytes[..self.id_len] == self.id_bytes()[..]
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }
}

pub const DEFAULT_GROUP: &str = "main";

/// Every loaded code, keyed by mnemonic. Names may repeat only for
/// disjoint game sets, so a `(name, game)` lookup is unambiguous.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    codes: Vec<CodeDefinition>,
    names: IndexMap<String, Vec<usize>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a code, returning the origin of the clashing definition on
    /// a duplicate.
    pub fn insert(&mut self, mut code: CodeDefinition) -> Result<(), String> {
        if let Some(indices) = self.names.get(&code.name) {
            if let Some(prev) = indices
                .iter()
                .map(|&i| &self.codes[i])
                .find(|prev| prev.shares_game(&code))
            {
                return Err(prev.origin.clone());
            }
        }
        code.index = self.codes.len();
        self.names
            .entry(code.name.clone())
            .or_default()
            .push(code.index);
        self.codes.push(code);
        Ok(())
    }

    pub fn get(&self, name: &str, game: &str) -> Option<&CodeDefinition> {
        self.names
            .get(name)?
            .iter()
            .map(|&i| &self.codes[i])
            .find(|code| code.for_game(game))
    }

    /// Looks up a code by its declaration index.
    pub fn by_index(&self, index: usize) -> Option<&CodeDefinition> {
        self.codes.get(index)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Codes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &CodeDefinition> {
        self.codes.iter()
    }

    pub fn for_game<'a>(&'a self, game: &'a str) -> impl Iterator<Item = &'a CodeDefinition> {
        self.codes.iter().filter(move |code| code.for_game(game))
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
