use std::{
    fmt,
    path::{Path, PathBuf},
};

/// Where something in the project originates.
///
/// `line` is 1-based. `byte_offset` is only known for positions produced by the byte layout, e.g.
/// the ROM offset of a data line or the RAM address of a `.ds` reservation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourcePosition {
    pub file: PathBuf,
    pub line: usize,
    pub byte_offset: Option<usize>,
}

impl SourcePosition {
    pub fn new(file: impl Into<PathBuf>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
            byte_offset: None,
        }
    }

    pub fn with_offset(file: impl Into<PathBuf>, line: usize, byte_offset: usize) -> Self {
        Self {
            file: file.into(),
            line,
            byte_offset: Some(byte_offset),
        }
    }

    /// Same file and line, ignoring any byte offset.
    pub fn same_line(&self, other: &SourcePosition) -> bool {
        self.file == other.file && self.line == other.line
    }

    pub fn is_in(&self, file: &Path) -> bool {
        self.file == file
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.byte_offset {
            Some(offset) => write!(f, "{}:{} (${:04X})", self.file.display(), self.line, offset),
            None => write!(f, "{}:{}", self.file.display(), self.line),
        }
    }
}
