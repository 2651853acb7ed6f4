use std::{
    collections::{BTreeSet, HashMap},
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::config::ProjectConfig;

/// File, line and optional byte offset of a definition or a byte contributing line.
pub mod position;

pub use position::SourcePosition;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("File not found: {0}")]
    Missing(PathBuf),
    #[error("Unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Text before the first `;`, without surrounding whitespace.
pub fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(index) => line[..index].trim(),
        None => line.trim(),
    }
}

/// Unsaved editor buffers, keyed by path relative to the project root.
///
/// Whatever is in here is used instead of the file on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalCopies {
    texts: HashMap<PathBuf, String>,
}

impl LocalCopies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> Option<String> {
        self.texts.insert(path.into(), text.into())
    }

    pub fn remove(&mut self, path: &Path) -> Option<String> {
        self.texts.remove(path)
    }

    pub fn get(&self, path: &Path) -> Option<&str> {
        self.texts.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.texts.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.texts.keys().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

impl<P: Into<PathBuf>, S: Into<String>> FromIterator<(P, S)> for LocalCopies {
    fn from_iter<I: IntoIterator<Item = (P, S)>>(iter: I) -> Self {
        let mut copies = LocalCopies::new();
        for (path, text) in iter {
            copies.insert(path, text);
        }
        copies
    }
}

/// Read access to the project's assembly files.
///
/// Files are addressed by their path relative to the project root. Local copies take precedence
/// over the disk. Without a root, only the local copies exist.
#[derive(Debug, Clone, Default)]
pub struct SourceFiles {
    root: Option<PathBuf>,
    local_copies: LocalCopies,
}

impl SourceFiles {
    pub fn on_disk(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            local_copies: LocalCopies::new(),
        }
    }

    pub fn in_memory(files: LocalCopies) -> Self {
        Self {
            root: None,
            local_copies: files,
        }
    }

    /// The same files, with `local_copies` taking precedence over the copies already present.
    pub fn overlaid(&self, local_copies: LocalCopies) -> Self {
        let mut merged = self.local_copies.clone();
        merged.texts.extend(local_copies.texts);

        Self {
            root: self.root.clone(),
            local_copies: merged,
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn local_copies(&self) -> &LocalCopies {
        &self.local_copies
    }

    pub fn exists(&self, path: &Path) -> bool {
        if self.local_copies.contains(path) {
            return true;
        }

        self.root
            .as_ref()
            .is_some_and(|root| root.join(path).is_file())
    }

    #[tracing::instrument(skip(self))]
    pub fn read(&self, path: &Path) -> Result<String, SourceError> {
        if let Some(text) = self.local_copies.get(path) {
            return Ok(text.to_owned());
        }

        let root = match &self.root {
            Some(root) => root,
            None => return Err(SourceError::Missing(path.to_path_buf())),
        };

        let absolute = root.join(path);
        if !absolute.is_file() {
            return Err(SourceError::Missing(path.to_path_buf()));
        }

        fs::read_to_string(&absolute).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// All bank files, sorted by path. Disk and local copies are merged.
    pub fn bank_files(&self, config: &ProjectConfig) -> Result<Vec<PathBuf>, SourceError> {
        let mut files: BTreeSet<PathBuf> = self
            .local_copies
            .paths()
            .filter(|path| config.is_bank_file(path))
            .map(Path::to_path_buf)
            .collect();

        if let Some(root) = &self.root {
            let bank_dir = root.join(&config.bank_dir);
            if bank_dir.is_dir() {
                let entries = fs::read_dir(&bank_dir).map_err(|source| SourceError::Io {
                    path: config.bank_dir.clone(),
                    source,
                })?;
                for entry in entries {
                    let entry = entry.map_err(|source| SourceError::Io {
                        path: config.bank_dir.clone(),
                        source,
                    })?;
                    let relative = config.bank_dir.join(entry.file_name());
                    if config.is_bank_file(&relative) && entry.path().is_file() {
                        files.insert(relative);
                    }
                }
            }
        }

        Ok(files.into_iter().collect())
    }

    /// The entry file followed by all bank files.
    pub fn project_files(&self, config: &ProjectConfig) -> Result<Vec<PathBuf>, SourceError> {
        let mut files = vec![config.entry_file.clone()];
        files.extend(self.bank_files(config)?);
        Ok(files)
    }
}
